use chess_core::{Board, Outcome, piece::{PieceType, Color}};

use crate::config::{EngineConfig, SearchMethod};
use crate::error::EngineError;
use crate::oracle::OracleEvaluator;

/// Scores are signed integers in material units (a pawn is 10).
pub type Score = i32;

pub const DEFAULT_WIN_SCORE: Score = 10_000;
pub const DRAW_SCORE: Score = 0;

// Material weights
const PAWN_VALUE: Score = 10;
const KNIGHT_VALUE: Score = 30;
const BISHOP_VALUE: Score = 30;
const ROOK_VALUE: Score = 50;
const QUEEN_VALUE: Score = 100;
const KING_VALUE: Score = 0;     // Both kings are always on the board

/// Returns the material value of a piece
pub fn get_piece_value(piece_type: PieceType) -> Score {
    match piece_type {
        PieceType::Pawn => PAWN_VALUE,
        PieceType::Knight => KNIGHT_VALUE,
        PieceType::Bishop => BISHOP_VALUE,
        PieceType::Rook => ROOK_VALUE,
        PieceType::Queen => QUEEN_VALUE,
        PieceType::King => KING_VALUE,
    }
}

/// Material of `side` minus material of its opponent.
pub fn material_balance(board: &Board, side: Color) -> Score {
    board.pieces()
        .map(|(_, piece)| {
            let value = get_piece_value(piece.piece_type);
            if piece.color == side { value } else { -value }
        })
        .sum()
}

/// Static evaluation: a drawn position is 0, a mate is `±win_score`, and
/// anything else is the material balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialEvaluator {
    win_score: Score,
}

impl Default for MaterialEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_WIN_SCORE)
    }
}

impl MaterialEvaluator {
    pub fn new(win_score: Score) -> Self {
        Self { win_score }
    }

    pub fn win_score(&self) -> Score {
        self.win_score
    }

    /// Scores `board` from `side`'s point of view.
    pub fn evaluate(&self, board: &Board, side: Color) -> Score {
        match board.outcome() {
            Some(outcome) if outcome.is_draw() => DRAW_SCORE,
            // The side to move is the one that has been mated
            Some(Outcome::Checkmate { .. }) => {
                if board.current_turn() != side { self.win_score } else { -self.win_score }
            }
            _ => material_balance(board, side),
        }
    }
}

/// Leaf-scoring strategy, chosen once when the engine is configured.
pub enum Evaluator {
    Heuristic(MaterialEvaluator),
    Oracle(OracleEvaluator),
}

impl Evaluator {
    /// Builds the evaluator `config.method` names. Starting an oracle spawns
    /// its engine process.
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        match config.method {
            SearchMethod::HeuristicSearch => Ok(Evaluator::Heuristic(MaterialEvaluator::new(config.win_score))),
            SearchMethod::Oracle => Ok(Evaluator::Oracle(OracleEvaluator::spawn(&config.oracle)?)),
        }
    }

    pub fn method(&self) -> SearchMethod {
        match self {
            Evaluator::Heuristic(_) => SearchMethod::HeuristicSearch,
            Evaluator::Oracle(_) => SearchMethod::Oracle,
        }
    }

    pub fn evaluate(&mut self, board: &Board, side: Color) -> Result<Score, EngineError> {
        match self {
            Evaluator::Heuristic(material) => Ok(material.evaluate(board, side)),
            Evaluator::Oracle(oracle) => Ok(oracle.evaluate(board, side)?),
        }
    }
}

// Fixed-depth alpha-beta over the legal move list, in generation order.
// Scores are always White minus Black: White maximizes, Black minimizes.
use chess_core::{Board, Move, piece::Color};
use log::debug;

use crate::error::EngineError;
use crate::evaluation::{Evaluator, Score};

// Window bounds; negating either stays in range
pub const SCORE_INFINITY: Score = Score::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOutcome {
    pub score: Score,
    /// None at leaves and terminal positions.
    pub best_move: Option<Move>,
}

// Counters for one search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub nodes: u64,      // Every position visited
    pub leaves: u64,     // Positions handed to the evaluator
    pub cutoffs: u64,    // Sibling loops stopped early
}

pub struct Searcher<'a> {
    evaluator: &'a mut Evaluator,
    stats: SearchStats,
}

impl<'a> Searcher<'a> {
    pub fn new(evaluator: &'a mut Evaluator) -> Self {
        Self { evaluator, stats: SearchStats::default() }
    }

    pub fn stats(&self) -> SearchStats {
        self.stats
    }

    pub fn alpha_beta(
        &mut self,
        board: &Board,
        depth: u8,
        mut alpha: Score,
        mut beta: Score,
    ) -> Result<SearchOutcome, EngineError> {
        self.stats.nodes += 1;

        if depth == 0 || board.is_game_over() {
            self.stats.leaves += 1;
            let score = self.evaluator.evaluate(board, Color::White)?;
            return Ok(SearchOutcome { score, best_move: None });
        }

        let maximizing = board.current_turn() == Color::White;
        let mut best: Option<SearchOutcome> = None;

        for mv in board.legal_moves() {
            let child = board.after(mv);
            let score = self.alpha_beta(&child, depth - 1, alpha, beta)?.score;

            // Strict improvement keeps the earliest move among equals
            let improves = match best {
                None => true,
                Some(current) if maximizing => score > current.score,
                Some(current) => score < current.score,
            };
            if improves {
                best = Some(SearchOutcome { score, best_move: Some(mv) });
            }

            if maximizing {
                alpha = alpha.max(score);
            } else {
                beta = beta.min(score);
            }
            if beta <= alpha {
                self.stats.cutoffs += 1;
                break;
            }
        }

        // is_game_over already covers the no-legal-move case
        match best {
            Some(outcome) => Ok(outcome),
            None => {
                self.stats.leaves += 1;
                let score = self.evaluator.evaluate(board, Color::White)?;
                Ok(SearchOutcome { score, best_move: None })
            }
        }
    }
}

/// Searches `board` to `depth` plies with a full window.
pub fn search_best_move(board: &Board, depth: u8, evaluator: &mut Evaluator) -> Result<SearchOutcome, EngineError> {
    let mut searcher = Searcher::new(evaluator);
    let outcome = searcher.alpha_beta(board, depth, -SCORE_INFINITY, SCORE_INFINITY)?;
    let stats = searcher.stats();
    debug!(
        "Searched depth {} from {}: score {}, {} nodes, {} leaves, {} cutoffs",
        depth, board.to_fen(), outcome.score, stats.nodes, stats.leaves, stats.cutoffs
    );
    Ok(outcome)
}

//! Root move selection: one child per legal move, scored across the pool.

use chess_core::{Board, Move, piece::Color};
use log::debug;

use crate::config::ConfigError;
use crate::error::EngineError;
use crate::evaluation::Score;
use crate::pool::{RoundParams, WorkerPool};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootDecision {
    pub best_move: Move,
    pub score: Score,
    /// Every root move with its score, in generation order.
    pub scored: Vec<(Move, Score)>,
}

/// Picks the root move for the side to move on `board`, with each child
/// searched to `depth - 1`. Returns `None` when there is nothing to play.
pub fn choose_root_move(board: &Board, depth: u8, pool: &mut WorkerPool) -> Result<Option<RootDecision>, EngineError> {
    if depth == 0 {
        return Err(ConfigError::ZeroDepth.into());
    }
    let moves = board.legal_moves();
    if moves.is_empty() {
        return Ok(None);
    }

    let children = moves.iter().map(|&mv| board.after(mv)).collect();
    let results = pool.run_round(children, RoundParams { depth: depth - 1 })?;

    // Results are matched to moves by position; replies are not used
    let scored: Vec<(Move, Score)> = moves
        .into_iter()
        .zip(results.iter().map(|result| result.score))
        .collect();

    let Some((best_move, score)) = select_extremal(board.current_turn(), &scored) else {
        return Ok(None);
    };
    debug!("Root scores for {}: {:?}", board.current_turn(), scored.iter().map(|(m, s)| (m.uci(), *s)).collect::<Vec<_>>());
    Ok(Some(RootDecision { best_move, score, scored }))
}

/// The highest score for White, the lowest for Black. The first of equal
/// scores wins.
pub fn select_extremal(side: Color, scored: &[(Move, Score)]) -> Option<(Move, Score)> {
    let mut best: Option<(Move, Score)> = None;
    for &(mv, score) in scored {
        let better = match best {
            None => true,
            Some((_, current)) => match side {
                Color::White => score > current,
                Color::Black => score < current,
            },
        };
        if better {
            best = Some((mv, score));
        }
    }
    best
}

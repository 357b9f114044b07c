use chess_core::{Board, Move};
use log::info;
use std::time::Instant;

use crate::aggregator::{choose_root_move, RootDecision};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::pool::WorkerPool;

/// A configured engine: the settings plus the worker pool that runs them.
pub struct ChessAI {
    config: EngineConfig,
    pool: WorkerPool,
}

impl ChessAI {
    /// Validates `config` and starts its worker pool.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let pool = WorkerPool::from_config(&config)?;
        Ok(Self::with_pool(config, pool))
    }

    /// Uses an already running pool, e.g. one built from custom evaluators.
    pub fn with_pool(config: EngineConfig, pool: WorkerPool) -> Self {
        ChessAI { config, pool }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pool_size(&self) -> usize {
        self.pool.size()
    }

    /// Full decision for the side to move, or `None` if the game is over.
    pub fn decide(&mut self, board: &Board) -> Result<Option<RootDecision>, EngineError> {
        let start_time = Instant::now();
        let decision = choose_root_move(board, self.config.depth, &mut self.pool)?;
        if let Some(decision) = &decision {
            info!(
                "{} plays {} (score {}, depth {}, {} workers, {} in {:?})",
                board.current_turn(),
                decision.best_move,
                decision.score,
                self.config.depth,
                self.pool.size(),
                self.pool.method(),
                start_time.elapsed()
            );
        }
        Ok(decision)
    }

    pub fn get_move(&mut self, board: &Board) -> Result<Option<Move>, EngineError> {
        Ok(self.decide(board)?.map(|decision| decision.best_move))
    }
}

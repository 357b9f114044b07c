use thiserror::Error;

use crate::config::ConfigError;
use crate::distributor::ProtocolError;
use crate::oracle::OracleError;

/// Every failure inside the engine is fatal for the current round.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error("rank {rank} failed: {source}")]
    Worker {
        rank: usize,
        #[source]
        source: Box<EngineError>,
    },
}

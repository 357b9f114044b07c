pub mod codec;
pub mod distributor;
pub mod pool;
pub mod evaluation;
pub mod oracle;
pub mod search;
pub mod aggregator;
pub mod config;
pub mod error;
pub mod ai;

pub use aggregator::{choose_root_move, RootDecision};
pub use ai::ChessAI;
pub use config::{ConfigError, EngineConfig, OracleConfig, SearchMethod};
pub use error::EngineError;
pub use evaluation::{Evaluator, MaterialEvaluator, Score};
pub use pool::WorkerPool;
pub use search::search_best_move;

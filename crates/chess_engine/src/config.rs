use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::evaluation::{Score, DEFAULT_WIN_SCORE};
use crate::oracle::DEFAULT_MATE_SCORE;
use crate::search::SCORE_INFINITY;

const DEFAULT_DEPTH: u8 = 3;
const DEFAULT_ORACLE_DEPTH: u8 = 10;
const DEFAULT_ENGINE_PATH: &str = "stockfish";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown search method {0:?} (expected \"heuristic-search\" or \"oracle\")")]
    UnknownMethod(String),
    #[error("search depth must be at least 1")]
    ZeroDepth,
    #[error("the worker pool needs at least one participant")]
    NoWorkers,
    #[error("win score must be positive and below the search bound, got {0}")]
    InvalidWinScore(Score),
    #[error("oracle mate score must be positive and below the search bound, got {0}")]
    InvalidMateScore(Score),
    #[error("oracle depth hint must be at least 1")]
    ZeroOracleDepth,
}

/// How workers score the root children they are handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMethod {
    /// Alpha-beta search over the material evaluator.
    HeuristicSearch,
    /// One query per child to an external UCI engine.
    Oracle,
}

impl FromStr for SearchMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "heuristic-search" | "heuristic" => Ok(SearchMethod::HeuristicSearch),
            "oracle" => Ok(SearchMethod::Oracle),
            other => Err(ConfigError::UnknownMethod(other.to_string())),
        }
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SearchMethod::HeuristicSearch => "heuristic-search",
            SearchMethod::Oracle => "oracle",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleConfig {
    /// Executable speaking UCI on stdin/stdout.
    pub engine_path: PathBuf,
    /// Depth hint passed with every `go`.
    pub depth: u8,
    /// Magnitude reported for a forced mate.
    pub mate_score: Score,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            engine_path: PathBuf::from(DEFAULT_ENGINE_PATH),
            depth: DEFAULT_ORACLE_DEPTH,
            mate_score: DEFAULT_MATE_SCORE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub method: SearchMethod,
    /// Root depth; workers search each child to `depth - 1`.
    pub depth: u8,
    /// Pool size, coordinator included.
    pub workers: usize,
    pub win_score: Score,
    pub oracle: OracleConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            method: SearchMethod::HeuristicSearch,
            depth: DEFAULT_DEPTH,
            workers: default_workers(),
            win_score: DEFAULT_WIN_SCORE,
            oracle: OracleConfig::default(),
        }
    }
}

pub fn default_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.depth == 0 {
            return Err(ConfigError::ZeroDepth);
        }
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        // A terminal score must stay strictly inside the initial window
        if !(1..SCORE_INFINITY).contains(&self.win_score) {
            return Err(ConfigError::InvalidWinScore(self.win_score));
        }
        if self.method == SearchMethod::Oracle {
            if !(1..SCORE_INFINITY).contains(&self.oracle.mate_score) {
                return Err(ConfigError::InvalidMateScore(self.oracle.mate_score));
            }
            if self.oracle.depth == 0 {
                return Err(ConfigError::ZeroOracleDepth);
            }
        }
        Ok(())
    }
}

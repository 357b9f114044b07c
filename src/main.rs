use std::path::PathBuf;

use anyhow::{Context, Result};
use chess_core::{Board, START_FEN};
use chess_engine::config::default_workers;
use chess_engine::{EngineConfig, OracleConfig, Score, SearchMethod};
use clap::Parser;
use log::info;

mod game;
mod players;

use game::GameOptions;
use players::{Player, PlayerKind};

#[derive(Parser, Debug)]
#[command(name = "distchess")]
#[command(about = "Chess with a distributed alpha-beta engine", long_about = None)]
struct Args {
    /// Who plays White
    #[arg(long, value_enum, default_value_t = PlayerKind::Random)]
    white: PlayerKind,

    /// Who plays Black
    #[arg(long, value_enum, default_value_t = PlayerKind::Engine)]
    black: PlayerKind,

    /// Leaf evaluator: heuristic-search or oracle
    #[arg(long, default_value_t = SearchMethod::HeuristicSearch)]
    method: SearchMethod,

    /// Root search depth
    #[arg(short, long, default_value_t = 3)]
    depth: u8,

    /// Pool size, coordinator included [default: available parallelism]
    #[arg(short, long)]
    workers: Option<usize>,

    /// Seed for random players
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Start position
    #[arg(long)]
    fen: Option<String>,

    /// UCI engine used by the oracle
    #[arg(long, default_value = "stockfish")]
    engine_path: PathBuf,

    /// Depth hint sent to the oracle
    #[arg(long, default_value_t = 10)]
    oracle_depth: u8,

    /// Score of a won position
    #[arg(long, default_value_t = 10_000)]
    win_score: Score,

    /// Stop the game after this many plies
    #[arg(long)]
    max_plies: Option<u32>,

    /// Draw boards with chess symbols
    #[arg(long)]
    unicode: bool,

    /// Only print the outcome
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            method: self.method,
            depth: self.depth,
            workers: self.workers.unwrap_or_else(default_workers),
            win_score: self.win_score,
            oracle: OracleConfig {
                engine_path: self.engine_path.clone(),
                depth: self.oracle_depth,
                ..OracleConfig::default()
            },
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("distchess=info,chess_engine=info,chess_core=info"),
    )
    .init();

    let args = Args::parse();
    let config = args.engine_config();
    config.validate().context("invalid engine settings")?;

    let fen = args.fen.as_deref().unwrap_or(START_FEN);
    let board = Board::from_fen(fen).with_context(|| format!("invalid start position {fen:?}"))?;

    info!(
        "White: {:?}, Black: {:?}, method {}, depth {}, {} workers",
        args.white, args.black, config.method, config.depth, config.workers
    );
    let mut white = Player::new(args.white, &config, args.seed).context("failed to set up White")?;
    // Distinct stream so two random players do not mirror each other
    let mut black = Player::new(args.black, &config, args.seed.wrapping_add(1)).context("failed to set up Black")?;

    let options = GameOptions {
        max_plies: args.max_plies,
        unicode: args.unicode,
        quiet: args.quiet,
    };
    let mut stdout = std::io::stdout();
    game::play(board, &mut white, &mut black, options, &mut stdout)?;
    Ok(())
}

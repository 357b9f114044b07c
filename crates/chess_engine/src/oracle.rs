//! External-engine evaluation over UCI.
//!
//! The oracle hands a FEN and a depth hint to an engine process and turns
//! its verdict into a material-unit score. Scores reported by the engine are
//! relative to the side to move; [`OracleVerdict::for_side`] re-orients them.

use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use chess_core::{Board, Move, Outcome, piece::Color};
use log::{debug, info, warn};
use thiserror::Error;

use crate::config::OracleConfig;
use crate::evaluation::{Score, DRAW_SCORE};

pub const DEFAULT_MATE_SCORE: Score = 20_000;

/// Centipawns per material unit.
const CENTIPAWNS_PER_UNIT: i32 = 10;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("failed to start engine {path:?}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("engine i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("engine closed its output while waiting for {0:?}")]
    Closed(&'static str),
    #[error("engine answered with an unreadable move {0:?}")]
    BadMove(String),
}

/// Evaluation as the engine reports it, from the mover's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineScore {
    Centipawns(i32),
    /// Mate in N moves; negative when the mover is getting mated, 0 when
    /// already mated.
    Mate(i32),
}

/// Everything the engine said about one position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OracleReply {
    pub score: Option<EngineScore>,
    pub best_move: Option<String>,
}

/// Something that can analyse a position. `UciEngine` is the real one.
pub trait OracleEngine: Send {
    fn analyse(&mut self, fen: &str, depth: u8) -> Result<OracleReply, OracleError>;
}

/// Reads one search's worth of engine output. The last `info ... score`
/// line wins; `bestmove (none)` and `bestmove 0000` mean no move.
pub fn parse_uci_reply<'a, I>(lines: I) -> OracleReply
where
    I: IntoIterator<Item = &'a str>,
{
    let mut reply = OracleReply::default();
    for line in lines {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("info") => {
                let tokens: Vec<&str> = tokens.collect();
                if let Some(score) = parse_info_score(&tokens) {
                    reply.score = Some(score);
                }
            }
            Some("bestmove") => {
                reply.best_move = match tokens.next() {
                    Some("(none)") | Some("0000") | None => None,
                    Some(uci) => Some(uci.to_string()),
                };
            }
            _ => {}
        }
    }
    reply
}

fn parse_info_score(tokens: &[&str]) -> Option<EngineScore> {
    // Only the principal line counts when the engine runs with MultiPV
    if let Some(pos) = tokens.iter().position(|&t| t == "multipv") {
        if tokens.get(pos + 1).copied() != Some("1") {
            return None;
        }
    }
    let pos = tokens.iter().position(|&t| t == "score")?;
    let value = tokens.get(pos + 2)?.parse::<i32>().ok()?;
    match *tokens.get(pos + 1)? {
        "cp" => Some(EngineScore::Centipawns(value)),
        "mate" => Some(EngineScore::Mate(value)),
        _ => None,
    }
}

/// A UCI engine running as a child process.
pub struct UciEngine {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl UciEngine {
    /// Starts the engine and completes the `uci` / `isready` handshake.
    pub fn spawn(path: &Path) -> Result<Self, OracleError> {
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| OracleError::Spawn { path: path.to_path_buf(), source })?;

        let stdin = child.stdin.take().ok_or(OracleError::Closed("stdin"))?;
        let stdout = child.stdout.take().ok_or(OracleError::Closed("stdout"))?;
        let mut engine = Self { child, stdin, stdout: BufReader::new(stdout) };

        engine.send("uci")?;
        engine.read_until("uciok")?;
        engine.send("isready")?;
        engine.read_until("readyok")?;
        Ok(engine)
    }

    fn send(&mut self, command: &str) -> Result<(), OracleError> {
        writeln!(self.stdin, "{command}")?;
        self.stdin.flush()?;
        Ok(())
    }

    /// Collects lines up to and including the first one starting with
    /// `token`.
    fn read_until(&mut self, token: &'static str) -> Result<Vec<String>, OracleError> {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            if self.stdout.read_line(&mut line)? == 0 {
                return Err(OracleError::Closed(token));
            }
            let line = line.trim_end().to_string();
            let done = line.split_whitespace().next() == Some(token);
            lines.push(line);
            if done {
                return Ok(lines);
            }
        }
    }
}

impl OracleEngine for UciEngine {
    fn analyse(&mut self, fen: &str, depth: u8) -> Result<OracleReply, OracleError> {
        self.send(&format!("position fen {fen}"))?;
        self.send(&format!("go depth {depth}"))?;
        let lines = self.read_until("bestmove")?;
        Ok(parse_uci_reply(lines.iter().map(String::as_str)))
    }
}

impl Drop for UciEngine {
    fn drop(&mut self) {
        if self.send("quit").is_err() {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

/// The oracle's judgement of a position, relative to the side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OracleVerdict {
    pub score: Score,
    pub best_move: Option<Move>,
}

impl OracleVerdict {
    /// The score from `side`'s point of view, given who was to move.
    pub fn for_side(&self, mover: Color, side: Color) -> Score {
        if mover == side { self.score } else { -self.score }
    }
}

pub struct OracleEvaluator {
    engine: Box<dyn OracleEngine>,
    depth: u8,
    mate_score: Score,
}

impl OracleEvaluator {
    pub fn new(engine: Box<dyn OracleEngine>, depth: u8, mate_score: Score) -> Self {
        Self { engine, depth, mate_score }
    }

    pub fn spawn(config: &OracleConfig) -> Result<Self, OracleError> {
        let engine = UciEngine::spawn(&config.engine_path)?;
        info!("Started oracle engine {}", config.engine_path.display());
        Ok(Self::new(Box::new(engine), config.depth, config.mate_score))
    }

    pub fn analyse(&mut self, board: &Board) -> Result<OracleVerdict, OracleError> {
        // A FEN carries no game record, so the engine cannot see these draws
        if let Some(Outcome::FivefoldRepetition | Outcome::SeventyFiveMoves) = board.outcome() {
            return Ok(OracleVerdict { score: DRAW_SCORE, best_move: None });
        }
        let fen = board.to_fen();
        let reply = self.engine.analyse(&fen, self.depth)?;
        debug!("Oracle on {fen}: {reply:?}");

        let best_move = reply
            .best_move
            .as_deref()
            .map(|uci| Move::from_uci(uci).map_err(|_| OracleError::BadMove(uci.to_string())))
            .transpose()?;

        let (score, best_move) = match reply.score {
            Some(EngineScore::Mate(n)) if n > 0 => (self.mate_score, best_move),
            Some(EngineScore::Mate(_)) => (-self.mate_score, None),
            _ if best_move.is_none() => (DRAW_SCORE, None),
            Some(EngineScore::Centipawns(cp)) => (cp / CENTIPAWNS_PER_UNIT, best_move),
            None => {
                warn!("Oracle gave a move but no score for {fen}");
                (DRAW_SCORE, best_move)
            }
        };
        Ok(OracleVerdict { score, best_move })
    }

    /// Scores `board` from `side`'s point of view.
    pub fn evaluate(&mut self, board: &Board, side: Color) -> Result<Score, OracleError> {
        let verdict = self.analyse(board)?;
        Ok(verdict.for_side(board.current_turn(), side))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Replays canned engine output keyed by FEN.
    struct ScriptedEngine {
        transcripts: HashMap<String, Vec<&'static str>>,
    }

    impl ScriptedEngine {
        fn new(entries: &[(&str, Vec<&'static str>)]) -> Self {
            let transcripts = entries
                .iter()
                .map(|(fen, lines)| (fen.to_string(), lines.clone()))
                .collect();
            Self { transcripts }
        }
    }

    impl OracleEngine for ScriptedEngine {
        fn analyse(&mut self, fen: &str, _depth: u8) -> Result<OracleReply, OracleError> {
            let lines = self.transcripts.get(fen).ok_or(OracleError::Closed("bestmove"))?;
            Ok(parse_uci_reply(lines.iter().copied()))
        }
    }

    fn oracle(entries: &[(&str, Vec<&'static str>)]) -> OracleEvaluator {
        OracleEvaluator::new(Box::new(ScriptedEngine::new(entries)), 10, DEFAULT_MATE_SCORE)
    }

    #[test]
    fn parses_last_score_and_best_move() {
        let reply = parse_uci_reply([
            "info string NNUE evaluation enabled",
            "info depth 1 seldepth 1 multipv 1 score cp 31 nodes 20 pv e2e4",
            "info depth 2 seldepth 2 multipv 1 score cp 45 upperbound nodes 60 pv d2d4",
            "info depth 2 multipv 2 score cp -12 nodes 60 pv a2a3",
            "bestmove d2d4 ponder d7d5",
        ]);
        assert_eq!(reply.score, Some(EngineScore::Centipawns(45)));
        assert_eq!(reply.best_move.as_deref(), Some("d2d4"));
    }

    #[test]
    fn parses_mate_and_missing_move() {
        let reply = parse_uci_reply(["info depth 0 score mate 0", "bestmove (none)"]);
        assert_eq!(reply, OracleReply { score: Some(EngineScore::Mate(0)), best_move: None });

        let reply = parse_uci_reply(["info depth 5 score mate -3 pv e1e2", "bestmove 0000"]);
        assert_eq!(reply.score, Some(EngineScore::Mate(-3)));
        assert_eq!(reply.best_move, None);
    }

    #[test]
    fn mate_in_one_returns_mate_score_and_mating_move() {
        let fen = "6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1";
        let mut oracle = oracle(&[(
            fen,
            vec!["info depth 1 seldepth 2 score mate 1 nodes 31 pv a1a8", "bestmove a1a8"],
        )]);
        let board = Board::from_fen(fen).unwrap();

        let verdict = oracle.analyse(&board).unwrap();
        assert_eq!(verdict.score, DEFAULT_MATE_SCORE);
        let mating = verdict.best_move.unwrap();
        assert_eq!(mating.uci(), "a1a8");
        assert!(board.after(mating).is_checkmate());

        // Black's view of the same position
        assert_eq!(oracle.evaluate(&board, Color::Black).unwrap(), -DEFAULT_MATE_SCORE);
    }

    #[test]
    fn mated_mover_gets_negative_mate_score() {
        let fen = "R5k1/5ppp/8/8/8/8/8/6K1 b - - 0 1";
        let mut oracle = oracle(&[(fen, vec!["info depth 0 score mate 0", "bestmove (none)"])]);
        let board = Board::from_fen(fen).unwrap();

        let verdict = oracle.analyse(&board).unwrap();
        assert_eq!(verdict, OracleVerdict { score: -DEFAULT_MATE_SCORE, best_move: None });
        assert_eq!(oracle.evaluate(&board, Color::White).unwrap(), DEFAULT_MATE_SCORE);
    }

    #[test]
    fn stalemate_is_zero_without_move() {
        let fen = "7k/5Q2/6K1/8/8/8/8/8 b - - 0 1";
        let mut oracle = oracle(&[(fen, vec!["info depth 0 score cp 0", "bestmove (none)"])]);
        let verdict = oracle.analyse(&Board::from_fen(fen).unwrap()).unwrap();
        assert_eq!(verdict, OracleVerdict { score: 0, best_move: None });
    }

    #[test]
    fn repetition_draw_is_scored_without_the_engine() {
        // No transcripts: any engine call would fail
        let mut oracle = oracle(&[]);
        let board = Board::from_fen("r3k3/8/8/8/8/8/8/R3K1NR w - - 0 1").unwrap().with_repetitions(5);
        assert_eq!(oracle.analyse(&board).unwrap(), OracleVerdict { score: 0, best_move: None });
    }

    #[test]
    fn centipawns_convert_to_material_units() {
        let fen = "4k3/8/8/8/8/8/4P3/4K3 b - - 0 1";
        let mut oracle = oracle(&[(fen, vec!["info depth 12 score cp -157 pv e8d7", "bestmove e8d7"])]);
        let board = Board::from_fen(fen).unwrap();

        let verdict = oracle.analyse(&board).unwrap();
        assert_eq!(verdict.score, -15);
        assert_eq!(verdict.best_move.map(|m| m.uci()), Some("e8d7".to_string()));
        // Black to move and worse off, so White is ahead
        assert_eq!(oracle.evaluate(&board, Color::White).unwrap(), 15);
    }

    #[test]
    fn unreadable_best_move_is_an_error() {
        let fen = Board::new().to_fen();
        let mut oracle = oracle(&[(fen.as_str(), vec!["info depth 1 score cp 20", "bestmove z9z9"])]);
        let result = oracle.analyse(&Board::new());
        assert!(matches!(result, Err(OracleError::BadMove(uci)) if uci == "z9z9"));
    }

    #[test]
    fn missing_engine_fails_to_spawn() {
        let config = OracleConfig {
            engine_path: PathBuf::from("/nonexistent/uci-engine"),
            ..OracleConfig::default()
        };
        assert!(matches!(OracleEvaluator::spawn(&config), Err(OracleError::Spawn { .. })));
    }

    #[test]
    #[ignore = "requires stockfish on PATH"]
    fn stockfish_finds_back_rank_mate() {
        let mut oracle = OracleEvaluator::spawn(&OracleConfig::default()).unwrap();
        let board = Board::from_fen("6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1").unwrap();
        let verdict = oracle.analyse(&board).unwrap();
        assert_eq!(verdict.score, DEFAULT_MATE_SCORE);
        assert_eq!(verdict.best_move.map(|m| m.uci()), Some("a1a8".to_string()));
    }
}

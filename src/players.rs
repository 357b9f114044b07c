use std::io::{BufRead, Write};

use anyhow::{bail, Context, Result};
use chess_core::{Board, Move};
use chess_engine::{ChessAI, EngineConfig};
use clap::ValueEnum;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlayerKind {
    /// Distributed alpha-beta at the configured depth
    Engine,
    /// The engine at depth 1
    Greedy,
    /// A uniformly random legal move
    Random,
    /// Moves typed on stdin in UCI notation
    Human,
}

pub enum Player {
    Engine(ChessAI),
    Random(StdRng),
    Human,
}

impl Player {
    pub fn new(kind: PlayerKind, config: &EngineConfig, seed: u64) -> Result<Self> {
        let player = match kind {
            PlayerKind::Engine => Player::Engine(ChessAI::new(config.clone())?),
            PlayerKind::Greedy => {
                let config = EngineConfig { depth: 1, ..config.clone() };
                Player::Engine(ChessAI::new(config)?)
            }
            PlayerKind::Random => Player::Random(StdRng::seed_from_u64(seed)),
            PlayerKind::Human => Player::Human,
        };
        Ok(player)
    }

    /// The move to play, or `None` if there is none.
    pub fn choose(&mut self, board: &Board) -> Result<Option<Move>> {
        match self {
            Player::Engine(ai) => Ok(ai.get_move(board)?),
            Player::Random(rng) => Ok(board.legal_moves().choose(rng).copied()),
            Player::Human => {
                let stdin = std::io::stdin();
                let mut stdout = std::io::stdout();
                read_human_move(board, &mut stdin.lock(), &mut stdout)
            }
        }
    }
}

/// Prompts until the input names a legal move. Fails if the input ends.
pub fn read_human_move<R: BufRead, W: Write>(board: &Board, input: &mut R, output: &mut W) -> Result<Option<Move>> {
    let legal = board.legal_moves();
    if legal.is_empty() {
        return Ok(None);
    }
    loop {
        write!(output, "Your move ({}): ", board.current_turn())?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line).context("failed to read a move")? == 0 {
            bail!("input closed before a move was entered");
        }
        let text = line.trim();
        match Move::from_uci(text) {
            Ok(parsed) => match legal.iter().find(|mv| **mv == parsed) {
                Some(mv) => return Ok(Some(*mv)),
                None => writeln!(output, "Illegal move: {text}")?,
            },
            Err(e) => writeln!(output, "{e}")?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn human_input_retries_until_legal() {
        let board = Board::new();
        let mut input = Cursor::new("hello\ne2e5\ne2e4\n");
        let mut output = Vec::new();
        let mv = read_human_move(&board, &mut input, &mut output).unwrap();
        assert_eq!(mv.map(|m| m.uci()), Some("e2e4".to_string()));

        let shown = String::from_utf8(output).unwrap();
        assert_eq!(shown.matches("Your move (White): ").count(), 3);
        assert!(shown.contains("Illegal move: e2e5"));
    }

    #[test]
    fn human_input_ending_is_an_error() {
        let mut input = Cursor::new("e7e5\n");
        let result = read_human_move(&Board::new(), &mut input, &mut Vec::new());
        assert!(result.is_err());
    }

    #[test]
    fn random_player_is_reproducible() {
        let config = EngineConfig::default();
        let board = Board::new();
        let mut first = Player::new(PlayerKind::Random, &config, 42).unwrap();
        let mut second = Player::new(PlayerKind::Random, &config, 42).unwrap();
        for _ in 0..5 {
            let mv = first.choose(&board).unwrap();
            assert!(mv.is_some_and(|m| m.is_valid(&board)));
            assert_eq!(mv, second.choose(&board).unwrap());
        }
    }
}

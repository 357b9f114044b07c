use std::io::Write;

use anyhow::{bail, Result};
use chess_core::{piece::Color, Board, Outcome};
use log::info;

use crate::players::Player;

#[derive(Debug, Clone, Copy, Default)]
pub struct GameOptions {
    pub max_plies: Option<u32>,
    pub unicode: bool,
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEnd {
    Finished(Outcome),
    PlyLimit(u32),
}

impl GameEnd {
    pub fn message(&self) -> String {
        match self {
            GameEnd::Finished(Outcome::Checkmate { winner: Color::White }) => "White Won.".to_string(),
            GameEnd::Finished(Outcome::Checkmate { winner: Color::Black }) => "Black Won.".to_string(),
            GameEnd::Finished(Outcome::Stalemate) => "Stalemate.".to_string(),
            GameEnd::Finished(Outcome::InsufficientMaterial) => "Draw due to insufficient material.".to_string(),
            GameEnd::Finished(Outcome::FivefoldRepetition) => "Draw due to five-fold repetition.".to_string(),
            GameEnd::Finished(Outcome::SeventyFiveMoves) => "Draw due to seventy-five moves.".to_string(),
            GameEnd::PlyLimit(plies) => format!("Stopped after {plies} plies."),
        }
    }

    pub fn result(&self) -> &'static str {
        match self {
            GameEnd::Finished(outcome) => outcome.result(),
            GameEnd::PlyLimit(_) => "*",
        }
    }
}

pub struct GameReport {
    pub end: GameEnd,
    pub plies: u32,
    pub board: Board,
}

/// Plays from `board` until the game ends or the ply limit is hit, then
/// writes the ending, the result and the final FEN to `out`.
pub fn play<W: Write>(
    mut board: Board,
    white: &mut Player,
    black: &mut Player,
    options: GameOptions,
    out: &mut W,
) -> Result<GameReport> {
    let mut plies = 0;
    let end = loop {
        if let Some(outcome) = board.outcome() {
            break GameEnd::Finished(outcome);
        }
        if options.max_plies.is_some_and(|limit| plies >= limit) {
            break GameEnd::PlyLimit(plies);
        }

        if !options.quiet {
            writeln!(out, "Current Number of Moves: {}", board.fullmove_number())?;
            writeln!(out, "{}", board.render(options.unicode))?;
        }

        let player = match board.current_turn() {
            Color::White => &mut *white,
            Color::Black => &mut *black,
        };
        let Some(mv) = player.choose(&board)? else {
            bail!("{} has no move in an unfinished game: {}", board.current_turn(), board.to_fen());
        };
        info!("Ply {}: {} {}", plies + 1, board.current_turn(), mv);
        board.make_move(mv)?;
        plies += 1;
    };

    if !options.quiet {
        writeln!(out, "{}", board.render(options.unicode))?;
    }
    writeln!(out, "{}", end.message())?;
    writeln!(out, "{}", end.result())?;
    writeln!(out, "{}", board.to_fen())?;
    Ok(GameReport { end, plies, board })
}

use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use crate::{Position, piece::PieceType, Board};

#[derive(Debug, Clone, Copy)]
pub struct Move {
    pub from: Position,
    pub to: Position,
    pub move_type: MoveType,
    pub promotion: Option<PieceType>,
}

// The move type is metadata filled in by move generation; two moves are the
// same move when they agree on squares and promotion.
impl PartialEq for Move {
    fn eq(&self, other: &Self) -> bool {
        self.from == other.from &&
        self.to == other.to &&
        self.promotion == other.promotion
    }
}

impl Eq for Move {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveType {
    Normal,
    Capture,
    EnPassant,
    Castle,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseMoveError {
    #[error("move string must be 4 or 5 characters, got {0:?}")]
    BadLength(String),
    #[error("invalid square in move {0:?}")]
    BadSquare(String),
    #[error("invalid promotion piece in move {0:?}")]
    BadPromotion(String),
}

impl Move {
    pub fn new(from: Position, to: Position) -> Self {
        Self {
            from,
            to,
            promotion: None,
            move_type: MoveType::Normal,
        }
    }

    pub fn with_promotion(from: Position, to: Position, promotion: PieceType) -> Self {
        Self {
            from,
            to,
            promotion: Some(promotion),
            move_type: MoveType::Normal,
        }
    }

    pub fn castle(from: Position, to: Position) -> Self {
        Self {
            from,
            to,
            promotion: None,
            move_type: MoveType::Castle,
        }
    }

    pub(crate) fn with_type(mut self, move_type: MoveType) -> Self {
        self.move_type = move_type;
        self
    }

    /// UCI long algebraic form, e.g. `e2e4` or `e7e8q`.
    pub fn uci(&self) -> String {
        let mut uci = format!("{}{}", self.from, self.to);
        if let Some(promotion) = self.promotion {
            uci.push(promotion.symbol());
        }
        uci
    }

    pub fn from_uci(uci: &str) -> Result<Self, ParseMoveError> {
        if !uci.is_ascii() || !(4..=5).contains(&uci.len()) {
            return Err(ParseMoveError::BadLength(uci.to_string()));
        }

        let from = Position::from_algebraic(&uci[0..2])
            .ok_or_else(|| ParseMoveError::BadSquare(uci.to_string()))?;
        let to = Position::from_algebraic(&uci[2..4])
            .ok_or_else(|| ParseMoveError::BadSquare(uci.to_string()))?;

        match uci[4..].chars().next() {
            None => Ok(Move::new(from, to)),
            Some(symbol) => {
                let promotion = PieceType::from_symbol(symbol)
                    .filter(|p| PieceType::PROMOTIONS.contains(p) && symbol.is_ascii_lowercase())
                    .ok_or_else(|| ParseMoveError::BadPromotion(uci.to_string()))?;
                Ok(Move::with_promotion(from, to, promotion))
            }
        }
    }

    /// True if this move is legal on `board`.
    pub fn is_valid(&self, board: &Board) -> bool {
        board.legal_moves().contains(self)
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uci())
    }
}

impl FromStr for Move {
    type Err = ParseMoveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Move::from_uci(s)
    }
}

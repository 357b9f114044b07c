// Position keys used for repetition detection.
use once_cell::sync::Lazy;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{Color, Piece, Position};
use crate::board::CastlingRights;

const SEED: u64 = 0x5EED_C4E5_5B0A_4D00;

pub(crate) struct ZobristKeys {
    pieces: [[u64; 64]; 12],
    black_to_move: u64,
    castling: [u64; 4],
    en_passant_file: [u64; 8],
}

pub(crate) static KEYS: Lazy<ZobristKeys> = Lazy::new(|| {
    let mut rng = StdRng::seed_from_u64(SEED);
    let mut pieces = [[0u64; 64]; 12];
    for table in pieces.iter_mut() {
        for key in table.iter_mut() {
            *key = rng.gen();
        }
    }
    ZobristKeys {
        pieces,
        black_to_move: rng.gen(),
        castling: [rng.gen(), rng.gen(), rng.gen(), rng.gen()],
        en_passant_file: [
            rng.gen(), rng.gen(), rng.gen(), rng.gen(),
            rng.gen(), rng.gen(), rng.gen(), rng.gen(),
        ],
    }
});

impl ZobristKeys {
    pub(crate) fn hash(
        &self,
        squares: &[Option<Piece>; 64],
        turn: Color,
        castling: CastlingRights,
        en_passant: Option<Position>,
    ) -> u64 {
        let mut key = 0;
        for (index, piece) in squares.iter().enumerate() {
            if let Some(piece) = piece {
                let table = piece.color.index() * 6 + piece.piece_type.index();
                key ^= self.pieces[table][index];
            }
        }
        if turn == Color::Black {
            key ^= self.black_to_move;
        }
        let bits = castling.bits();
        for (i, castle_key) in self.castling.iter().enumerate() {
            if bits & (1 << i) != 0 {
                key ^= castle_key;
            }
        }
        if let Some(square) = en_passant {
            key ^= self.en_passant_file[square.file as usize - 1];
        }
        key
    }
}

//! Fixed-width integer records for shipping boards, moves and scores between
//! the coordinator and the workers.
//!
//! Board record (69 values): 64 cells in square order a1..h8 holding the
//! character code of the piece letter (uppercase White, lowercase Black, 0
//! when empty), then the side to move (1 White, -1 Black), the castling mask
//! (1 K, 2 Q, 4 k, 8 q), the en passant square index or -1, the halfmove
//! clock, and how many times the position has occurred since the last
//! irreversible move.
//!
//! Move record (5 values): the character codes of the UCI string, padded
//! with spaces. No move is sent as the null move `0000`.

use std::fmt;
use chess_core::{Board, CastlingRights, Color, Move, Piece, Position, PositionError};
use thiserror::Error;

pub const BOARD_CELLS: usize = 64;
pub const BOARD_RECORD_LEN: usize = 69;
pub const MOVE_RECORD_LEN: usize = 5;
pub const SCORE_RECORD_LEN: usize = 1;

const SIDE_FIELD: usize = 64;
const CASTLING_FIELD: usize = 65;
const EN_PASSANT_FIELD: usize = 66;
const HALFMOVE_FIELD: usize = 67;
const REPETITION_FIELD: usize = 68;

const PAD: i32 = b' ' as i32;
const NULL_MOVE: &str = "0000";

pub type BoardRecord = [i32; BOARD_RECORD_LEN];
pub type MoveRecord = [i32; MOVE_RECORD_LEN];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Board,
    Move,
    Score,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordKind::Board => "board",
            RecordKind::Move => "move",
            RecordKind::Score => "score",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedRecordError {
    #[error("{kind} record must hold {expected} values, got {actual}")]
    WrongLength { kind: RecordKind, expected: usize, actual: usize },
    #[error("{kind} batch of {actual} values is not a whole number of records")]
    RaggedBatch { kind: RecordKind, actual: usize },
    #[error("cell {index} holds {code}, which is not a piece code")]
    BadPieceCode { index: usize, code: i32 },
    #[error("side field must be 1 or -1, got {0}")]
    BadSide(i32),
    #[error("castling field {0} is not a 4-bit mask")]
    BadCastling(i32),
    #[error("en passant field {0} is not a square index")]
    BadEnPassant(i32),
    #[error("halfmove clock {0} is negative")]
    BadClock(i32),
    #[error("repetition count must be at least 1, got {0}")]
    BadRepetitions(i32),
    #[error("board record is not a playable position: {0}")]
    BadPosition(#[from] PositionError),
    #[error("move record {0:?} is not a move")]
    BadMove(String),
}

fn check_len(kind: RecordKind, record: &[i32], expected: usize) -> Result<(), MalformedRecordError> {
    if record.len() != expected {
        return Err(MalformedRecordError::WrongLength { kind, expected, actual: record.len() });
    }
    Ok(())
}

fn encode_cells(board: &Board) -> [i32; BOARD_CELLS] {
    let mut cells = [0; BOARD_CELLS];
    for (cell, piece) in cells.iter_mut().zip(board.squares().iter()) {
        if let Some(piece) = piece {
            *cell = piece.symbol() as i32;
        }
    }
    cells
}

fn decode_cells(cells: &[i32]) -> Result<[Option<Piece>; 64], MalformedRecordError> {
    let mut squares = [None; 64];
    for (index, &code) in cells.iter().enumerate().take(BOARD_CELLS) {
        if code == 0 {
            continue;
        }
        let piece = u8::try_from(code)
            .ok()
            .map(char::from)
            .and_then(Piece::from_symbol)
            .ok_or(MalformedRecordError::BadPieceCode { index, code })?;
        squares[index] = Some(piece);
    }
    Ok(squares)
}

pub fn encode_board(board: &Board) -> BoardRecord {
    let mut record = [0; BOARD_RECORD_LEN];
    record[..BOARD_CELLS].copy_from_slice(&encode_cells(board));
    record[SIDE_FIELD] = match board.current_turn() {
        Color::White => 1,
        Color::Black => -1,
    };
    record[CASTLING_FIELD] = board.castling_rights().bits() as i32;
    record[EN_PASSANT_FIELD] = board.en_passant().map_or(-1, |pos| pos.index() as i32);
    record[HALFMOVE_FIELD] = board.halfmove_clock().min(i32::MAX as u32) as i32;
    record[REPETITION_FIELD] = board.repetition_count().min(i32::MAX as usize) as i32;
    record
}

pub fn decode_board(record: &[i32]) -> Result<Board, MalformedRecordError> {
    check_len(RecordKind::Board, record, BOARD_RECORD_LEN)?;
    let squares = decode_cells(&record[..BOARD_CELLS])?;

    let turn = match record[SIDE_FIELD] {
        1 => Color::White,
        -1 => Color::Black,
        other => return Err(MalformedRecordError::BadSide(other)),
    };

    let castling = record[CASTLING_FIELD];
    if !(0..16).contains(&castling) {
        return Err(MalformedRecordError::BadCastling(castling));
    }

    let en_passant = match record[EN_PASSANT_FIELD] {
        -1 => None,
        index => Some(
            usize::try_from(index)
                .ok()
                .and_then(Position::from_index)
                .ok_or(MalformedRecordError::BadEnPassant(index))?,
        ),
    };

    let halfmove = u32::try_from(record[HALFMOVE_FIELD])
        .map_err(|_| MalformedRecordError::BadClock(record[HALFMOVE_FIELD]))?;

    let repetitions = usize::try_from(record[REPETITION_FIELD])
        .ok()
        .filter(|&count| count >= 1)
        .ok_or(MalformedRecordError::BadRepetitions(record[REPETITION_FIELD]))?;

    let board = Board::try_from_parts(
        squares,
        turn,
        CastlingRights::from_bits(castling as u8),
        en_passant,
        halfmove,
        1,
    )?;
    Ok(board.with_repetitions(repetitions))
}

pub fn encode_move(chess_move: Option<Move>) -> MoveRecord {
    let uci = chess_move.map_or_else(|| NULL_MOVE.to_string(), |mv| mv.uci());
    let mut record = [PAD; MOVE_RECORD_LEN];
    for (slot, byte) in record.iter_mut().zip(uci.bytes()) {
        *slot = byte as i32;
    }
    record
}

pub fn decode_move(record: &[i32]) -> Result<Option<Move>, MalformedRecordError> {
    check_len(RecordKind::Move, record, MOVE_RECORD_LEN)?;
    let text: String = record
        .iter()
        .map(|&code| u8::try_from(code).ok().filter(u8::is_ascii).map(char::from).unwrap_or('\u{fffd}'))
        .collect();
    let uci = text.strip_suffix(' ').unwrap_or(&text);
    if uci == NULL_MOVE {
        return Ok(None);
    }
    Move::from_uci(uci)
        .map(Some)
        .map_err(|_| MalformedRecordError::BadMove(text.clone()))
}

/// Concatenated board records, in order.
pub fn encode_boards(boards: &[Board]) -> Vec<i32> {
    boards.iter().flat_map(encode_board).collect()
}

pub fn decode_boards(values: &[i32]) -> Result<Vec<Board>, MalformedRecordError> {
    if values.len() % BOARD_RECORD_LEN != 0 {
        return Err(MalformedRecordError::RaggedBatch { kind: RecordKind::Board, actual: values.len() });
    }
    values.chunks_exact(BOARD_RECORD_LEN).map(decode_board).collect()
}

pub fn encode_moves<I>(moves: I) -> Vec<i32>
where
    I: IntoIterator<Item = Option<Move>>,
{
    moves.into_iter().flat_map(encode_move).collect()
}

pub fn decode_moves(values: &[i32]) -> Result<Vec<Option<Move>>, MalformedRecordError> {
    if values.len() % MOVE_RECORD_LEN != 0 {
        return Err(MalformedRecordError::RaggedBatch { kind: RecordKind::Move, actual: values.len() });
    }
    values.chunks_exact(MOVE_RECORD_LEN).map(decode_move).collect()
}

/// Legacy 64-value form: the side to move is folded into the cells by
/// negating all of them when Black is to move.
pub fn encode_folded(board: &Board) -> [i32; BOARD_CELLS] {
    let sign = match board.current_turn() {
        Color::White => 1,
        Color::Black => -1,
    };
    encode_cells(board).map(|cell| cell * sign)
}

/// Inverse of [`encode_folded`]. The side to move is read from the sign of
/// the cell sum, so a zero sum (an empty board) cannot be told apart and
/// decodes as Black to move. Castling rights, en passant and the clocks are
/// not part of this form.
pub fn decode_folded(cells: &[i32]) -> Result<Board, MalformedRecordError> {
    check_len(RecordKind::Board, cells, BOARD_CELLS)?;
    let sum: i64 = cells.iter().map(|&cell| cell as i64).sum();
    let (turn, sign) = if sum > 0 { (Color::White, 1) } else { (Color::Black, -1) };
    let unfolded: Vec<i32> = cells.iter().map(|&cell| cell * sign).collect();
    let squares = decode_cells(&unfolded)?;
    Ok(Board::from_parts(squares, turn, CastlingRights::none(), None, 0, 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess_core::PieceType;
    use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

    #[test]
    fn start_position_record_layout() {
        let record = encode_board(&Board::new());
        assert_eq!(record[0], 'R' as i32);
        assert_eq!(record[4], 'K' as i32);
        assert_eq!(record[8], 'P' as i32);
        assert_eq!(record[20], 0);
        assert_eq!(record[60], 'k' as i32);
        assert_eq!(record[SIDE_FIELD], 1);
        assert_eq!(record[CASTLING_FIELD], 15);
        assert_eq!(record[EN_PASSANT_FIELD], -1);
        assert_eq!(record[HALFMOVE_FIELD], 0);
        assert_eq!(record[REPETITION_FIELD], 1);
    }

    #[test]
    fn round_trips_random_playouts() {
        let mut rng = StdRng::seed_from_u64(7);
        for _game in 0..8 {
            let mut board = Board::new();
            for _ply in 0..120 {
                assert_eq!(decode_board(&encode_board(&board)).unwrap(), board);
                let moves = board.legal_moves();
                let Some(&mv) = moves.choose(&mut rng) else { break };
                board.make_move_unchecked(mv);
                if board.is_game_over() {
                    break;
                }
            }
        }
    }

    #[test]
    fn batch_round_trip_preserves_order() {
        let board = Board::new();
        let children: Vec<Board> = board.legal_moves().into_iter().map(|mv| board.after(mv)).collect();
        let values = encode_boards(&children);
        assert_eq!(values.len(), children.len() * BOARD_RECORD_LEN);
        assert_eq!(decode_boards(&values).unwrap(), children);
    }

    #[test]
    fn move_records_are_space_padded() {
        let plain = Move::from_uci("e2e4").unwrap();
        let record = encode_move(Some(plain));
        assert_eq!(record, ['e' as i32, '2' as i32, 'e' as i32, '4' as i32, 32]);
        assert_eq!(decode_move(&record).unwrap(), Some(plain));

        let promotion = Move::from_uci("b7b8q").unwrap();
        let record = encode_move(Some(promotion));
        assert_eq!(record[4], 'q' as i32);
        assert_eq!(decode_move(&record).unwrap().unwrap().promotion, Some(PieceType::Queen));
    }

    #[test]
    fn missing_move_uses_null_record() {
        let record = encode_move(None);
        assert_eq!(record, ['0' as i32, '0' as i32, '0' as i32, '0' as i32, 32]);
        assert_eq!(decode_move(&record).unwrap(), None);
    }

    #[test]
    fn rejects_malformed_records() {
        let record = encode_board(&Board::new());
        assert_eq!(
            decode_board(&record[..64]),
            Err(MalformedRecordError::WrongLength { kind: RecordKind::Board, expected: 69, actual: 64 })
        );

        let mut bad_piece = record;
        bad_piece[10] = 'x' as i32;
        assert_eq!(decode_board(&bad_piece), Err(MalformedRecordError::BadPieceCode { index: 10, code: 'x' as i32 }));

        let mut bad_side = record;
        bad_side[SIDE_FIELD] = 0;
        assert_eq!(decode_board(&bad_side), Err(MalformedRecordError::BadSide(0)));

        let mut bad_ep = record;
        bad_ep[EN_PASSANT_FIELD] = 64;
        assert_eq!(decode_board(&bad_ep), Err(MalformedRecordError::BadEnPassant(64)));

        let mut ep_on_fourth_rank = record;
        ep_on_fourth_rank[EN_PASSANT_FIELD] = 28;
        assert!(matches!(
            decode_board(&ep_on_fourth_rank),
            Err(MalformedRecordError::BadPosition(PositionError::EnPassantRank { .. }))
        ));

        let mut no_kings = [0; BOARD_RECORD_LEN];
        no_kings[SIDE_FIELD] = 1;
        no_kings[EN_PASSANT_FIELD] = -1;
        no_kings[REPETITION_FIELD] = 1;
        assert_eq!(
            decode_board(&no_kings),
            Err(MalformedRecordError::BadPosition(PositionError::KingCount(Color::White)))
        );

        let mut no_repetitions = record;
        no_repetitions[REPETITION_FIELD] = 0;
        assert_eq!(decode_board(&no_repetitions), Err(MalformedRecordError::BadRepetitions(0)));

        assert!(matches!(decode_move(&[101, 50, 101]), Err(MalformedRecordError::WrongLength { .. })));
        assert!(matches!(decode_move(&[122, 57, 101, 52, 32]), Err(MalformedRecordError::BadMove(_))));
        assert!(matches!(
            decode_boards(&[0; 70]),
            Err(MalformedRecordError::RaggedBatch { kind: RecordKind::Board, actual: 70 })
        ));
    }

    #[test]
    fn folded_form_round_trips_placement_and_side() {
        let mut board = Board::new();
        board.make_move(Move::from_uci("g1f3").unwrap()).unwrap();
        let folded = encode_folded(&board);
        assert!(folded.iter().all(|&cell| cell <= 0));
        let decoded = decode_folded(&folded).unwrap();
        assert_eq!(decoded.squares(), board.squares());
        assert_eq!(decoded.current_turn(), Color::Black);
    }

    #[test]
    fn folded_form_is_ambiguous_at_zero_sum() {
        // An empty board sums to zero for either side to move; the sign
        // heuristic cannot recover White here.
        let empty = Board::empty();
        assert_eq!(empty.current_turn(), Color::White);
        let decoded = decode_folded(&encode_folded(&empty)).unwrap();
        assert_eq!(decoded.current_turn(), Color::Black);
        assert_ne!(decoded, empty);

        // Kings alone also sum to zero. The explicit side field has no such
        // boundary.
        let kings = Board::from_fen("4k3/8/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        assert_eq!(decode_folded(&encode_folded(&kings)).unwrap().current_turn(), Color::Black);
        assert_eq!(decode_board(&encode_board(&kings)).unwrap(), kings);
    }

    #[test]
    fn repetition_count_survives_the_record() {
        let mut board = Board::from_fen("r3k3/8/8/8/8/8/8/R3K1NR w - - 0 1").unwrap();
        for _ in 0..3 {
            for uci in ["g1f3", "a8a7", "f3g1", "a7a8"] {
                board.make_move(Move::from_uci(uci).unwrap()).unwrap();
            }
        }
        assert_eq!(board.repetition_count(), 4);

        let decoded = decode_board(&encode_board(&board)).unwrap();
        assert_eq!(decoded.repetition_count(), 4);
        assert!(!decoded.is_game_over());

        // One more cycle ends the game on both sides of the wire
        let mut ended = board.clone();
        for uci in ["g1f3", "a8a7", "f3g1", "a7a8"] {
            ended.make_move(Move::from_uci(uci).unwrap()).unwrap();
        }
        let decoded = decode_board(&encode_board(&ended)).unwrap();
        assert_eq!(decoded.outcome(), Some(chess_core::Outcome::FivefoldRepetition));
    }
}

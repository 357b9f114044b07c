use std::fmt;
use log::trace;
use thiserror::Error;
use crate::{Piece, Position, piece::{PieceType, Color}, Move, moves::MoveType};
use crate::zobrist::KEYS;

pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

const KNIGHT_OFFSETS: [(i8, i8); 8] = [(1, 2), (2, 1), (2, -1), (1, -2), (-1, -2), (-2, -1), (-2, 1), (-1, 2)];
const KING_OFFSETS: [(i8, i8); 8] = [(0, 1), (1, 1), (1, 0), (1, -1), (0, -1), (-1, -1), (-1, 0), (-1, 1)];
const BISHOP_DIRECTIONS: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, -1), (-1, 1)];
const ROOK_DIRECTIONS: [(i8, i8); 4] = [(0, 1), (1, 0), (0, -1), (-1, 0)];

// Halfmove clock value at which the seventy-five-move rule ends the game.
const SEVENTY_FIVE_MOVE_PLIES: u32 = 150;
const FIVEFOLD: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CastlingRights {
    pub white_kingside: bool,
    pub white_queenside: bool,
    pub black_kingside: bool,
    pub black_queenside: bool,
}

impl Default for CastlingRights {
    fn default() -> Self {
        Self {
            white_kingside: true,
            white_queenside: true,
            black_kingside: true,
            black_queenside: true,
        }
    }
}

impl CastlingRights {
    pub fn none() -> Self {
        Self::from_bits(0)
    }

    /// Bitmask: 1 = K, 2 = Q, 4 = k, 8 = q.
    pub fn bits(&self) -> u8 {
        (self.white_kingside as u8)
            | (self.white_queenside as u8) << 1
            | (self.black_kingside as u8) << 2
            | (self.black_queenside as u8) << 3
    }

    pub fn from_bits(bits: u8) -> Self {
        Self {
            white_kingside: bits & 1 != 0,
            white_queenside: bits & 2 != 0,
            black_kingside: bits & 4 != 0,
            black_queenside: bits & 8 != 0,
        }
    }

    fn kingside(&self, color: Color) -> bool {
        match color {
            Color::White => self.white_kingside,
            Color::Black => self.black_kingside,
        }
    }

    fn queenside(&self, color: Color) -> bool {
        match color {
            Color::White => self.white_queenside,
            Color::Black => self.black_queenside,
        }
    }

    fn clear(&mut self, color: Color) {
        match color {
            Color::White => {
                self.white_kingside = false;
                self.white_queenside = false;
            }
            Color::Black => {
                self.black_kingside = false;
                self.black_queenside = false;
            }
        }
    }

    // A move touching a rook's home corner loses that side's right.
    fn touch(&mut self, pos: Position) {
        match (pos.file, pos.rank) {
            (1, 1) => self.white_queenside = false,
            (8, 1) => self.white_kingside = false,
            (1, 8) => self.black_queenside = false,
            (8, 8) => self.black_kingside = false,
            _ => {}
        }
    }
}

impl fmt::Display for CastlingRights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bits() == 0 {
            return f.write_str("-");
        }
        for (flag, symbol) in [
            (self.white_kingside, 'K'),
            (self.white_queenside, 'Q'),
            (self.black_kingside, 'k'),
            (self.black_queenside, 'q'),
        ] {
            if flag {
                write!(f, "{}", symbol)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("no piece at {0}")]
    NoPiece(Position),
    #[error("it is not {0:?}'s turn")]
    WrongTurn(Color),
    #[error("illegal move {0}")]
    Illegal(Move),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FenError {
    #[error("expected 4 to 6 FEN fields, found {0}")]
    WrongFieldCount(usize),
    #[error("invalid piece placement {0:?}")]
    BadPlacement(String),
    #[error("invalid side to move {0:?}")]
    BadSide(String),
    #[error("invalid castling field {0:?}")]
    BadCastling(String),
    #[error("invalid en passant square {0:?}")]
    BadEnPassant(String),
    #[error("invalid move counter {0:?}")]
    BadCounter(String),
    #[error(transparent)]
    Position(#[from] PositionError),
}

/// A placement that cannot arise in a game.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("{0} must have exactly one king")]
    KingCount(Color),
    #[error("en passant square {square} does not follow a double push with {to_move} to move")]
    EnPassantRank { square: Position, to_move: Color },
}

/// How a finished game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Checkmate { winner: Color },
    Stalemate,
    InsufficientMaterial,
    SeventyFiveMoves,
    FivefoldRepetition,
}

impl Outcome {
    pub fn winner(&self) -> Option<Color> {
        match self {
            Outcome::Checkmate { winner } => Some(*winner),
            _ => None,
        }
    }

    pub fn is_draw(&self) -> bool {
        self.winner().is_none()
    }

    /// PGN-style result string.
    pub fn result(&self) -> &'static str {
        match self.winner() {
            Some(Color::White) => "1-0",
            Some(Color::Black) => "0-1",
            None => "1/2-1/2",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Board {
    squares: [Option<Piece>; 64],
    current_turn: Color,
    castling_rights: CastlingRights,
    en_passant: Option<Position>,
    halfmove_clock: u32,
    fullmove_number: u32,
    // Position keys since the last irreversible move, current position last.
    history: Vec<u64>,
}

// Two boards are equal when they describe the same position. Move counters
// and the repetition history are bookkeeping, not position.
impl PartialEq for Board {
    fn eq(&self, other: &Self) -> bool {
        self.squares == other.squares &&
        self.current_turn == other.current_turn &&
        self.castling_rights == other.castling_rights &&
        self.en_passant == other.en_passant &&
        self.halfmove_clock == other.halfmove_clock
    }
}

impl Eq for Board {}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    pub fn new() -> Self {
        let mut board = Self::empty();
        board.castling_rights = CastlingRights::default();
        board.setup_initial_position();
        board.reset_history();
        board
    }

    /// A board with no pieces, White to move and no castling rights.
    pub fn empty() -> Self {
        let mut board = Self {
            squares: [None; 64],
            current_turn: Color::White,
            castling_rights: CastlingRights::none(),
            en_passant: None,
            halfmove_clock: 0,
            fullmove_number: 1,
            history: Vec::new(),
        };
        board.reset_history();
        board
    }

    pub fn from_parts(
        squares: [Option<Piece>; 64],
        current_turn: Color,
        castling_rights: CastlingRights,
        en_passant: Option<Position>,
        halfmove_clock: u32,
        fullmove_number: u32,
    ) -> Self {
        let mut board = Self {
            squares,
            current_turn,
            castling_rights,
            en_passant,
            halfmove_clock,
            fullmove_number,
            history: Vec::new(),
        };
        board.reset_history();
        board
    }

    /// Like [`Board::from_parts`], but rejects positions with a missing or
    /// extra king, or an en passant square on the wrong rank.
    pub fn try_from_parts(
        squares: [Option<Piece>; 64],
        current_turn: Color,
        castling_rights: CastlingRights,
        en_passant: Option<Position>,
        halfmove_clock: u32,
        fullmove_number: u32,
    ) -> Result<Self, PositionError> {
        for color in [Color::White, Color::Black] {
            let kings = squares.iter()
                .filter(|p| **p == Some(Piece::new(PieceType::King, color)))
                .count();
            if kings != 1 {
                return Err(PositionError::KingCount(color));
            }
        }
        if let Some(square) = en_passant {
            // The target sits behind the pawn the other side just pushed
            let expected_rank = match current_turn {
                Color::White => 6,
                Color::Black => 3,
            };
            if square.rank != expected_rank {
                return Err(PositionError::EnPassantRank { square, to_move: current_turn });
            }
        }
        Ok(Self::from_parts(squares, current_turn, castling_rights, en_passant, halfmove_clock, fullmove_number))
    }

    /// Replaces the history with `count` occurrences of the current position,
    /// for boards rebuilt without their game record. Counts are kept between
    /// one and the fivefold limit.
    pub fn with_repetitions(mut self, count: usize) -> Self {
        let key = self.compute_key();
        self.history = vec![key; count.clamp(1, FIVEFOLD)];
        self
    }

    fn setup_initial_position(&mut self) {
        // Setup pawns
        for file in 1..=8 {
            self.put(Position { file, rank: 2 }, Piece::new(PieceType::Pawn, Color::White));
            self.put(Position { file, rank: 7 }, Piece::new(PieceType::Pawn, Color::Black));
        }

        // Setup other pieces
        let piece_order = [
            PieceType::Rook,
            PieceType::Knight,
            PieceType::Bishop,
            PieceType::Queen,
            PieceType::King,
            PieceType::Bishop,
            PieceType::Knight,
            PieceType::Rook,
        ];

        for (file, &piece_type) in (1..=8).zip(piece_order.iter()) {
            self.put(Position { file, rank: 1 }, Piece::new(piece_type, Color::White));
            self.put(Position { file, rank: 8 }, Piece::new(piece_type, Color::Black));
        }
    }

    fn put(&mut self, pos: Position, piece: Piece) {
        self.squares[pos.index()] = Some(piece);
    }

    fn compute_key(&self) -> u64 {
        KEYS.hash(&self.squares, self.current_turn, self.castling_rights, self.en_passant)
    }

    fn reset_history(&mut self) {
        self.history.clear();
        let key = self.compute_key();
        self.history.push(key);
    }

    /// Places or removes a piece. Starts a fresh repetition history.
    pub fn set_piece(&mut self, pos: Position, piece: Option<Piece>) {
        self.squares[pos.index()] = piece;
        self.reset_history();
    }

    pub fn get_piece(&self, pos: Position) -> Option<&Piece> {
        self.squares[pos.index()].as_ref()
    }

    pub fn squares(&self) -> &[Option<Piece>; 64] {
        &self.squares
    }

    /// Occupied squares in index order (a1, b1, ..., h8).
    pub fn pieces(&self) -> impl Iterator<Item = (Position, Piece)> + '_ {
        self.squares.iter().enumerate().filter_map(|(index, piece)| {
            let piece = (*piece)?;
            Position::from_index(index).map(|pos| (pos, piece))
        })
    }

    pub fn piece_count(&self, piece_type: PieceType, color: Color) -> usize {
        self.pieces()
            .filter(|(_, p)| p.piece_type == piece_type && p.color == color)
            .count()
    }

    pub fn current_turn(&self) -> Color {
        self.current_turn
    }

    pub fn castling_rights(&self) -> CastlingRights {
        self.castling_rights
    }

    pub fn en_passant(&self) -> Option<Position> {
        self.en_passant
    }

    pub fn halfmove_clock(&self) -> u32 {
        self.halfmove_clock
    }

    pub fn fullmove_number(&self) -> u32 {
        self.fullmove_number
    }

    /// Key of the current position, equal for repeated positions.
    pub fn position_key(&self) -> u64 {
        self.history.last().copied().unwrap_or_else(|| self.compute_key())
    }

    pub fn king_position(&self, color: Color) -> Option<Position> {
        self.pieces()
            .find(|(_, piece)| piece.piece_type == PieceType::King && piece.color == color)
            .map(|(pos, _)| pos)
    }

    pub fn is_in_check(&self, color: Color) -> bool {
        match self.king_position(color) {
            Some(king_pos) => self.is_position_under_attack(king_pos, color),
            None => false,
        }
    }

    pub fn is_position_under_attack(&self, pos: Position, defending_color: Color) -> bool {
        square_attacked(&self.squares, pos, defending_color.opposite())
    }

    /// Validates `chess_move` against the legal moves and plays it.
    pub fn make_move(&mut self, chess_move: Move) -> Result<(), MoveError> {
        let piece = *self.get_piece(chess_move.from).ok_or(MoveError::NoPiece(chess_move.from))?;

        if piece.color != self.current_turn {
            return Err(MoveError::WrongTurn(piece.color));
        }

        let legal = self.get_valid_moves(chess_move.from)
            .into_iter()
            .find(|mv| *mv == chess_move)
            .ok_or(MoveError::Illegal(chess_move))?;

        trace!("{} plays {}", self.current_turn, legal);
        self.make_move_unchecked(legal);
        Ok(())
    }

    /// Plays a move taken from [`Board::legal_moves`] without validating it.
    pub fn make_move_unchecked(&mut self, chess_move: Move) {
        let piece = match self.squares[chess_move.from.index()] {
            Some(piece) => piece,
            None => return,
        };
        debug_assert_eq!(piece.color, self.current_turn);

        let is_capture = self.squares[chess_move.to.index()].is_some() ||
            (piece.piece_type == PieceType::Pawn && chess_move.from.file != chess_move.to.file);

        self.squares = self.squares_after(chess_move);

        if piece.piece_type == PieceType::King {
            self.castling_rights.clear(piece.color);
        }
        self.castling_rights.touch(chess_move.from);
        self.castling_rights.touch(chess_move.to);

        self.en_passant = None;
        if piece.piece_type == PieceType::Pawn && chess_move.from.rank.abs_diff(chess_move.to.rank) == 2 {
            // Only record the target when an enemy pawn could actually take.
            let enemy_pawn = Piece::new(PieceType::Pawn, piece.color.opposite());
            let capturable = [-1, 1].iter().any(|&df| {
                chess_move.to.offset(df, 0)
                    .map_or(false, |pos| self.squares[pos.index()] == Some(enemy_pawn))
            });
            if capturable {
                self.en_passant = chess_move.from.offset(0, piece.color.pawn_direction());
            }
        }

        if piece.piece_type == PieceType::Pawn || is_capture {
            self.halfmove_clock = 0;
        } else {
            self.halfmove_clock += 1;
        }

        if self.current_turn == Color::Black {
            self.fullmove_number += 1;
        }
        self.current_turn = self.current_turn.opposite();

        if self.halfmove_clock == 0 {
            self.history.clear();
        }
        let key = self.compute_key();
        self.history.push(key);
    }

    /// The position after a legal move, leaving `self` untouched.
    pub fn after(&self, chess_move: Move) -> Board {
        let mut child = self.clone();
        child.make_move_unchecked(chess_move);
        child
    }

    // Piece placement after a move; no clocks, rights or side are touched.
    fn squares_after(&self, chess_move: Move) -> [Option<Piece>; 64] {
        let mut squares = self.squares;
        let piece = match squares[chess_move.from.index()].take() {
            Some(piece) => piece,
            None => return squares,
        };

        if piece.piece_type == PieceType::Pawn &&
           chess_move.from.file != chess_move.to.file &&
           squares[chess_move.to.index()].is_none() {
            // En passant: the captured pawn sits beside the origin square
            if let Some(captured) = Position::new(chess_move.to.file, chess_move.from.rank) {
                squares[captured.index()] = None;
            }
        }

        if piece.piece_type == PieceType::King && chess_move.from.file.abs_diff(chess_move.to.file) == 2 {
            let rank = chess_move.from.rank;
            let (rook_from, rook_to) = if chess_move.to.file == 7 { (8, 6) } else { (1, 4) };
            if let (Some(rook_from), Some(rook_to)) = (Position::new(rook_from, rank), Position::new(rook_to, rank)) {
                squares[rook_to.index()] = squares[rook_from.index()].take();
            }
        }

        let final_piece = match chess_move.promotion {
            Some(promotion_type) => Piece::new(promotion_type, piece.color),
            None => piece,
        };
        squares[chess_move.to.index()] = Some(final_piece);
        squares
    }

    fn leaves_king_in_check(&self, chess_move: Move) -> bool {
        let squares = self.squares_after(chess_move);
        let mover = self.current_turn;
        let king = squares.iter().position(|p| *p == Some(Piece::new(PieceType::King, mover)));
        match king.and_then(Position::from_index) {
            Some(king_pos) => square_attacked(&squares, king_pos, mover.opposite()),
            None => false,
        }
    }

    /// All legal moves for the side to move, in a fixed order: origin squares
    /// a1..h8, then each piece's targets in generation order.
    pub fn legal_moves(&self) -> Vec<Move> {
        self.pseudo_legal_moves()
            .into_iter()
            .filter(|mv| !self.leaves_king_in_check(*mv))
            .collect()
    }

    pub fn has_legal_moves(&self) -> bool {
        self.pseudo_legal_moves()
            .into_iter()
            .any(|mv| !self.leaves_king_in_check(mv))
    }

    pub fn get_valid_moves(&self, pos: Position) -> Vec<Move> {
        self.legal_moves()
            .into_iter()
            .filter(|mv| mv.from == pos)
            .collect()
    }

    fn pseudo_legal_moves(&self) -> Vec<Move> {
        let mut moves = Vec::with_capacity(48);
        for (from, piece) in self.pieces() {
            if piece.color != self.current_turn {
                continue;
            }
            match piece.piece_type {
                PieceType::Pawn => self.pawn_moves(from, piece.color, &mut moves),
                PieceType::Knight => self.leaper_moves(from, piece.color, &KNIGHT_OFFSETS, &mut moves),
                PieceType::Bishop => self.slider_moves(from, piece.color, &BISHOP_DIRECTIONS, &mut moves),
                PieceType::Rook => self.slider_moves(from, piece.color, &ROOK_DIRECTIONS, &mut moves),
                PieceType::Queen => {
                    self.slider_moves(from, piece.color, &ROOK_DIRECTIONS, &mut moves);
                    self.slider_moves(from, piece.color, &BISHOP_DIRECTIONS, &mut moves);
                }
                PieceType::King => {
                    self.leaper_moves(from, piece.color, &KING_OFFSETS, &mut moves);
                    self.castling_moves(from, piece.color, &mut moves);
                }
            }
        }
        moves
    }

    fn pawn_moves(&self, from: Position, color: Color, moves: &mut Vec<Move>) {
        let direction = color.pawn_direction();
        let promotion_rank = color.opposite().back_rank();
        let mut push = |to: Position, move_type: MoveType| {
            if to.rank == promotion_rank {
                for promotion in PieceType::PROMOTIONS {
                    moves.push(Move::with_promotion(from, to, promotion).with_type(move_type));
                }
            } else {
                moves.push(Move::new(from, to).with_type(move_type));
            }
        };

        if let Some(one) = from.offset(0, direction) {
            if self.get_piece(one).is_none() {
                push(one, MoveType::Normal);
                let start_rank = if color == Color::White { 2 } else { 7 };
                if from.rank == start_rank {
                    if let Some(two) = from.offset(0, 2 * direction) {
                        if self.get_piece(two).is_none() {
                            push(two, MoveType::Normal);
                        }
                    }
                }
            }
        }

        for file_delta in [-1, 1] {
            let target = match from.offset(file_delta, direction) {
                Some(target) => target,
                None => continue,
            };
            match self.get_piece(target) {
                Some(victim) if victim.color != color => push(target, MoveType::Capture),
                None if self.en_passant == Some(target) => push(target, MoveType::EnPassant),
                _ => {}
            }
        }
    }

    fn leaper_moves(&self, from: Position, color: Color, offsets: &[(i8, i8)], moves: &mut Vec<Move>) {
        for &(file_delta, rank_delta) in offsets {
            if let Some(to) = from.offset(file_delta, rank_delta) {
                match self.get_piece(to) {
                    None => moves.push(Move::new(from, to)),
                    Some(victim) if victim.color != color => {
                        moves.push(Move::new(from, to).with_type(MoveType::Capture))
                    }
                    Some(_) => {}
                }
            }
        }
    }

    fn slider_moves(&self, from: Position, color: Color, directions: &[(i8, i8)], moves: &mut Vec<Move>) {
        for &(file_step, rank_step) in directions {
            let mut current = from;
            while let Some(to) = current.offset(file_step, rank_step) {
                match self.get_piece(to) {
                    None => moves.push(Move::new(from, to)),
                    Some(victim) => {
                        if victim.color != color {
                            moves.push(Move::new(from, to).with_type(MoveType::Capture));
                        }
                        break;
                    }
                }
                current = to;
            }
        }
    }

    fn castling_moves(&self, from: Position, color: Color, moves: &mut Vec<Move>) {
        let rank = color.back_rank();
        if from != (Position { file: 5, rank }) || self.is_in_check(color) {
            return;
        }
        let rook = Some(Piece::new(PieceType::Rook, color));
        let empty = |files: &[u8]| files.iter().all(|&file| self.squares[Position { file, rank }.index()].is_none());
        let safe = |files: &[u8]| files.iter().all(|&file| !self.is_position_under_attack(Position { file, rank }, color));

        if self.castling_rights.kingside(color) &&
           self.squares[Position { file: 8, rank }.index()] == rook &&
           empty(&[6, 7]) && safe(&[6, 7]) {
            moves.push(Move::castle(from, Position { file: 7, rank }));
        }
        if self.castling_rights.queenside(color) &&
           self.squares[Position { file: 1, rank }.index()] == rook &&
           empty(&[2, 3, 4]) && safe(&[3, 4]) {
            moves.push(Move::castle(from, Position { file: 3, rank }));
        }
    }

    pub fn is_checkmate(&self) -> bool {
        self.is_in_check(self.current_turn) && !self.has_legal_moves()
    }

    pub fn is_stalemate(&self) -> bool {
        !self.is_in_check(self.current_turn) && !self.has_legal_moves()
    }

    /// Neither side can possibly deliver mate: no pawns, rooks or queens, and
    /// at most one minor piece or only bishops on one square color.
    pub fn has_insufficient_material(&self) -> bool {
        let mut minors = 0;
        let mut knights = 0;
        let mut bishop_colors = [false; 2];

        for (pos, piece) in self.pieces() {
            match piece.piece_type {
                PieceType::Pawn | PieceType::Rook | PieceType::Queen => return false,
                PieceType::Knight => {
                    minors += 1;
                    knights += 1;
                }
                PieceType::Bishop => {
                    minors += 1;
                    bishop_colors[pos.is_dark() as usize] = true;
                }
                PieceType::King => {}
            }
        }

        minors <= 1 || (knights == 0 && !(bishop_colors[0] && bishop_colors[1]))
    }

    pub fn is_seventyfive_moves(&self) -> bool {
        self.halfmove_clock >= SEVENTY_FIVE_MOVE_PLIES && self.has_legal_moves()
    }

    /// Occurrences of the current position since the last irreversible
    /// move, this one included.
    pub fn repetition_count(&self) -> usize {
        let key = self.position_key();
        self.history.iter().filter(|&&k| k == key).count()
    }

    pub fn is_fivefold_repetition(&self) -> bool {
        self.repetition_count() >= FIVEFOLD
    }

    /// The game-ending condition of this position, if any. Checkmate takes
    /// priority over every draw.
    pub fn outcome(&self) -> Option<Outcome> {
        let has_moves = self.has_legal_moves();
        if !has_moves && self.is_in_check(self.current_turn) {
            return Some(Outcome::Checkmate { winner: self.current_turn.opposite() });
        }
        if self.has_insufficient_material() {
            return Some(Outcome::InsufficientMaterial);
        }
        if !has_moves {
            return Some(Outcome::Stalemate);
        }
        if self.halfmove_clock >= SEVENTY_FIVE_MOVE_PLIES {
            return Some(Outcome::SeventyFiveMoves);
        }
        if self.is_fivefold_repetition() {
            return Some(Outcome::FivefoldRepetition);
        }
        None
    }

    pub fn is_game_over(&self) -> bool {
        self.outcome().is_some()
    }

    pub fn from_fen(fen: &str) -> Result<Self, FenError> {
        let fields: Vec<&str> = fen.split_whitespace().collect();
        if !(4..=6).contains(&fields.len()) {
            return Err(FenError::WrongFieldCount(fields.len()));
        }

        let squares = parse_placement(fields[0])?;

        let current_turn = match fields[1] {
            "w" => Color::White,
            "b" => Color::Black,
            other => return Err(FenError::BadSide(other.to_string())),
        };

        let mut castling_rights = CastlingRights::none();
        if fields[2] != "-" {
            for symbol in fields[2].chars() {
                match symbol {
                    'K' => castling_rights.white_kingside = true,
                    'Q' => castling_rights.white_queenside = true,
                    'k' => castling_rights.black_kingside = true,
                    'q' => castling_rights.black_queenside = true,
                    _ => return Err(FenError::BadCastling(fields[2].to_string())),
                }
            }
        }

        let en_passant = match fields[3] {
            "-" => None,
            square => {
                let pos = Position::from_algebraic(square)
                    .filter(|pos| pos.rank == 3 || pos.rank == 6)
                    .ok_or_else(|| FenError::BadEnPassant(square.to_string()))?;
                Some(pos)
            }
        };

        let counter = |index: usize, default: u32| -> Result<u32, FenError> {
            match fields.get(index) {
                Some(value) => value.parse().map_err(|_| FenError::BadCounter(value.to_string())),
                None => Ok(default),
            }
        };
        let halfmove_clock = counter(4, 0)?;
        let fullmove_number = counter(5, 1)?;

        Ok(Self::try_from_parts(squares, current_turn, castling_rights, en_passant, halfmove_clock, fullmove_number)?)
    }

    pub fn to_fen(&self) -> String {
        let mut placement = String::new();
        for rank in (1..=8).rev() {
            let mut empty = 0;
            for file in 1..=8 {
                match self.squares[Position { file, rank }.index()] {
                    Some(piece) => {
                        if empty > 0 {
                            placement.push_str(&empty.to_string());
                            empty = 0;
                        }
                        placement.push(piece.symbol());
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                placement.push_str(&empty.to_string());
            }
            if rank > 1 {
                placement.push('/');
            }
        }

        let side = match self.current_turn {
            Color::White => "w",
            Color::Black => "b",
        };
        let en_passant = self.en_passant.map_or_else(|| "-".to_string(), |pos| pos.to_algebraic());

        format!(
            "{} {} {} {} {} {}",
            placement, side, self.castling_rights, en_passant, self.halfmove_clock, self.fullmove_number
        )
    }

    /// Text diagram with rank 8 on top; empty squares are dots.
    pub fn render(&self, unicode: bool) -> String {
        let mut out = String::new();
        for rank in (1..=8).rev() {
            let row: Vec<String> = (1..=8)
                .map(|file| match self.squares[Position { file, rank }.index()] {
                    Some(piece) if unicode => piece.unicode_symbol().to_string(),
                    Some(piece) => piece.symbol().to_string(),
                    None => ".".to_string(),
                })
                .collect();
            out.push_str(&row.join(" "));
            if rank > 1 {
                out.push('\n');
            }
        }
        out
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(false))
    }
}

fn parse_placement(placement: &str) -> Result<[Option<Piece>; 64], FenError> {
    let bad = || FenError::BadPlacement(placement.to_string());
    let rows: Vec<&str> = placement.split('/').collect();
    if rows.len() != 8 {
        return Err(bad());
    }

    let mut squares = [None; 64];
    for (row, text) in rows.iter().enumerate() {
        let rank = 8 - row as u8;
        let mut file = 1u8;
        for symbol in text.chars() {
            if let Some(skip) = symbol.to_digit(10) {
                if !(1..=8).contains(&skip) {
                    return Err(bad());
                }
                file += skip as u8;
            } else {
                let piece = Piece::from_symbol(symbol).ok_or_else(bad)?;
                let pos = Position::new(file, rank).ok_or_else(bad)?;
                squares[pos.index()] = Some(piece);
                file += 1;
            }
            if file > 9 {
                return Err(bad());
            }
        }
        if file != 9 {
            return Err(bad());
        }
    }
    Ok(squares)
}

fn square_attacked(squares: &[Option<Piece>; 64], target: Position, by: Color) -> bool {
    let holds = |pos: Option<Position>, types: &[PieceType]| {
        pos.and_then(|pos| squares[pos.index()])
            .map_or(false, |piece| piece.color == by && types.contains(&piece.piece_type))
    };

    // Pawns attack diagonally forward, so look backwards from the target
    let back = -by.pawn_direction();
    if holds(target.offset(-1, back), &[PieceType::Pawn]) || holds(target.offset(1, back), &[PieceType::Pawn]) {
        return true;
    }

    if KNIGHT_OFFSETS.iter().any(|&(df, dr)| holds(target.offset(df, dr), &[PieceType::Knight])) {
        return true;
    }

    if KING_OFFSETS.iter().any(|&(df, dr)| holds(target.offset(df, dr), &[PieceType::King])) {
        return true;
    }

    let ray_hits = |directions: &[(i8, i8)], types: &[PieceType]| {
        directions.iter().any(|&(df, dr)| {
            let mut current = target;
            while let Some(next) = current.offset(df, dr) {
                if let Some(piece) = squares[next.index()] {
                    return piece.color == by && types.contains(&piece.piece_type);
                }
                current = next;
            }
            false
        })
    };

    ray_hits(&BISHOP_DIRECTIONS, &[PieceType::Bishop, PieceType::Queen]) ||
        ray_hits(&ROOK_DIRECTIONS, &[PieceType::Rook, PieceType::Queen])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play(board: &mut Board, moves: &[&str]) {
        for uci in moves {
            let mv = Move::from_uci(uci).unwrap();
            board.make_move(mv).unwrap_or_else(|e| panic!("{} rejected: {}", uci, e));
        }
    }

    #[test]
    fn start_position_has_twenty_moves() {
        let board = Board::new();
        assert_eq!(board.legal_moves().len(), 20);
        assert_eq!(board.to_fen(), START_FEN);
        assert_eq!(Board::from_fen(START_FEN).unwrap(), board);
    }

    #[test]
    fn move_order_is_deterministic() {
        let board = Board::new();
        let first: Vec<String> = board.legal_moves().iter().map(Move::uci).collect();
        let second: Vec<String> = board.clone().legal_moves().iter().map(Move::uci).collect();
        assert_eq!(first, second);
        // b1 knight comes before the pawns on rank 2
        assert_eq!(first[0], "b1c3");
    }

    #[test]
    fn rejects_illegal_and_out_of_turn_moves() {
        let mut board = Board::new();
        let e7e5 = Move::from_uci("e7e5").unwrap();
        assert_eq!(board.make_move(e7e5), Err(MoveError::WrongTurn(Color::Black)));
        let e2e5 = Move::from_uci("e2e5").unwrap();
        assert_eq!(board.make_move(e2e5), Err(MoveError::Illegal(e2e5)));
        let empty = Move::from_uci("e4e5").unwrap();
        assert!(matches!(board.make_move(empty), Err(MoveError::NoPiece(_))));
    }

    #[test]
    fn fools_mate_is_checkmate() {
        let mut board = Board::new();
        play(&mut board, &["f2f3", "e7e5", "g2g4", "d8h4"]);
        assert!(board.is_checkmate());
        assert!(!board.is_stalemate());
        assert_eq!(board.outcome(), Some(Outcome::Checkmate { winner: Color::Black }));
        assert_eq!(board.outcome().unwrap().result(), "0-1");
    }

    #[test]
    fn detects_stalemate() {
        let board = Board::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
        assert!(board.is_stalemate());
        assert_eq!(board.outcome(), Some(Outcome::Stalemate));
    }

    #[test]
    fn detects_insufficient_material() {
        for fen in [
            "8/8/4k3/8/8/3K4/8/8 w - - 0 1",
            "8/8/4k3/8/8/3KN3/8/8 w - - 0 1",
            "8/8/4k3/8/8/3KB3/8/8 w - - 0 1",
            "8/8/3bk3/8/8/3KB3/8/8 w - - 0 1",
        ] {
            let board = Board::from_fen(fen).unwrap();
            assert!(board.has_insufficient_material(), "{}", fen);
            assert_eq!(board.outcome(), Some(Outcome::InsufficientMaterial));
        }
        for fen in [
            "8/8/4k3/8/8/3KP3/8/8 w - - 0 1",
            "8/8/4k3/8/8/2NKN3/8/8 w - - 0 1",
            "8/8/2b1k3/8/8/3KB3/8/8 w - - 0 1",
        ] {
            assert!(!Board::from_fen(fen).unwrap().has_insufficient_material(), "{}", fen);
        }
    }

    #[test]
    fn detects_seventy_five_move_rule() {
        let board = Board::from_fen("8/8/8/8/4k3/8/8/R3K3 w - - 150 90").unwrap();
        assert!(board.is_seventyfive_moves());
        assert_eq!(board.outcome(), Some(Outcome::SeventyFiveMoves));
        let board = Board::from_fen("8/8/8/8/4k3/8/8/R3K3 w - - 149 90").unwrap();
        assert!(!board.is_seventyfive_moves());
    }

    #[test]
    fn detects_fivefold_repetition() {
        let mut board = Board::new();
        let shuffle = ["g1f3", "g8f6", "f3g1", "f6g8"];
        for _ in 0..3 {
            play(&mut board, &shuffle);
        }
        assert!(!board.is_fivefold_repetition());
        play(&mut board, &shuffle);
        assert!(board.is_fivefold_repetition());
        assert_eq!(board.outcome(), Some(Outcome::FivefoldRepetition));
    }

    #[test]
    fn repetitions_can_be_restored_without_history() {
        let mut board = Board::new();
        play(&mut board, &["g1f3", "g8f6", "f3g1", "f6g8", "g1f3", "g8f6", "f3g1", "f6g8"]);
        assert_eq!(board.repetition_count(), 3);

        let fresh = Board::from_fen(&board.to_fen()).unwrap();
        assert_eq!(fresh.repetition_count(), 1);
        let restored = fresh.with_repetitions(board.repetition_count());
        assert_eq!(restored.repetition_count(), 3);
        assert!(!restored.is_fivefold_repetition());

        assert_eq!(Board::new().with_repetitions(0).repetition_count(), 1);
        let capped = Board::new().with_repetitions(40);
        assert_eq!(capped.repetition_count(), 5);
        assert_eq!(capped.outcome(), Some(Outcome::FivefoldRepetition));
    }

    #[test]
    fn checked_parts_reject_impossible_positions() {
        let start = Board::new();
        let parts = |squares: [Option<Piece>; 64], turn, ep: Option<&str>| {
            Board::try_from_parts(
                squares,
                turn,
                CastlingRights::none(),
                ep.and_then(Position::from_algebraic),
                0,
                1,
            )
        };
        assert!(parts(*start.squares(), Color::White, None).is_ok());
        assert_eq!(parts([None; 64], Color::White, None), Err(PositionError::KingCount(Color::White)));

        let mut two_black_kings = *start.squares();
        two_black_kings[Position::from_algebraic("e4").unwrap().index()] = Some(Piece::new(PieceType::King, Color::Black));
        assert_eq!(parts(two_black_kings, Color::White, None), Err(PositionError::KingCount(Color::Black)));

        assert!(parts(*start.squares(), Color::Black, Some("e3")).is_ok());
        for (turn, square) in [(Color::White, "e3"), (Color::Black, "e6"), (Color::White, "e4")] {
            assert!(matches!(
                parts(*start.squares(), turn, Some(square)),
                Err(PositionError::EnPassantRank { .. })
            ));
        }
    }

    #[test]
    fn castling_moves_the_rook() {
        let mut board = Board::new();
        play(&mut board, &["e2e4", "e7e5", "g1f3", "b8c6", "f1c4", "g8f6", "e1g1"]);
        assert_eq!(board.get_piece(Position::from_algebraic("g1").unwrap()).map(|p| p.piece_type), Some(PieceType::King));
        assert_eq!(board.get_piece(Position::from_algebraic("f1").unwrap()).map(|p| p.piece_type), Some(PieceType::Rook));
        assert!(board.get_piece(Position::from_algebraic("h1").unwrap()).is_none());
        assert!(!board.castling_rights().white_kingside);
        assert!(board.castling_rights().black_kingside);
    }

    #[test]
    fn cannot_castle_through_check() {
        let board = Board::from_fen("4k3/8/8/8/8/8/5r2/4K2R w K - 0 1").unwrap();
        assert!(!board.legal_moves().iter().any(|mv| mv.uci() == "e1g1"));
    }

    #[test]
    fn en_passant_capture_removes_pawn() {
        let mut board = Board::new();
        play(&mut board, &["e2e4", "a7a6", "e4e5", "d7d5"]);
        assert_eq!(board.en_passant(), Position::from_algebraic("d6"));
        play(&mut board, &["e5d6"]);
        assert!(board.get_piece(Position::from_algebraic("d5").unwrap()).is_none());
        assert_eq!(board.halfmove_clock(), 0);
    }

    #[test]
    fn promotion_generates_four_choices() {
        let board = Board::from_fen("8/P6k/8/8/8/8/8/K7 w - - 0 1").unwrap();
        let promotions: Vec<String> = board.get_valid_moves(Position::from_algebraic("a7").unwrap())
            .iter()
            .map(Move::uci)
            .collect();
        assert_eq!(promotions, vec!["a7a8q", "a7a8r", "a7a8b", "a7a8n"]);
    }

    #[test]
    fn fen_round_trip() {
        for fen in [
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
            "rnbqkbnr/ppp1pppp/8/3pP3/8/8/PPPP1PPP/RNBQKBNR w KQkq d6 0 3",
        ] {
            assert_eq!(Board::from_fen(fen).unwrap().to_fen(), fen);
        }
    }

    #[test]
    fn fen_errors() {
        assert_eq!(Board::from_fen("8/8/8 w - -"), Err(FenError::BadPlacement("8/8/8".to_string())));
        assert!(matches!(Board::from_fen("8/8/8/8/8/8/8/8 w - - 0 1"), Err(FenError::Position(PositionError::KingCount(Color::White)))));
        assert_eq!(
            Board::from_fen(&START_FEN.replace(" - ", " e3 ")),
            Err(FenError::Position(PositionError::EnPassantRank {
                square: Position::from_algebraic("e3").unwrap(),
                to_move: Color::White,
            }))
        );
        assert!(matches!(Board::from_fen(&START_FEN.replace(" w ", " x ")), Err(FenError::BadSide(_))));
        assert!(matches!(Board::from_fen("bad"), Err(FenError::WrongFieldCount(1))));
    }

    #[test]
    fn renders_like_a_diagram() {
        let text = Board::new().to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "r n b q k b n r");
        assert_eq!(lines[3], ". . . . . . . .");
        assert_eq!(lines[7], "R N B Q K B N R");
    }
}

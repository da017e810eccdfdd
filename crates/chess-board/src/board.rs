//! The board abstraction driven by the game loop.

use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::uci::Uci;
use shakmaty::zobrist::{Zobrist64, ZobristHash};
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Position, Role, Square};
use thiserror::Error;

use crate::moves::GenericMove;
use crate::result::GameResult;
use crate::side::Side;
use crate::variant::Variant;

/// Errors produced by board construction and move application.
#[derive(Error, Debug)]
pub enum BoardError {
    /// No board implementation exists for the named variant.
    #[error("unknown variant: {0}")]
    UnknownVariant(String),
    /// The FEN string could not be parsed or describes an invalid position.
    #[error("invalid FEN string: {0}")]
    InvalidFen(String),
    /// The move is not legal in the current position.
    #[error("illegal move: {0}")]
    IllegalMove(String),
}

/// The rules-engine surface the match layers consume.
///
/// Implementations own the position, legality checking, notation and result
/// detection for one variant. Position keys are Polyglot-compatible Zobrist
/// hashes so the same key feeds both repetition tracking and opening-book
/// probes.
pub trait Board {
    /// The variant this board implements.
    fn variant(&self) -> Variant;

    /// The variant's conventional starting position.
    fn default_fen(&self) -> String;

    /// Resets the board to the given position and clears move history.
    fn set_fen(&mut self, fen: &str) -> Result<(), BoardError>;

    /// The current position in FEN.
    fn fen(&self) -> String;

    /// The position the current game started from, in FEN.
    fn starting_fen(&self) -> String;

    /// Zobrist key of the current position.
    fn key(&self) -> u64;

    fn side_to_move(&self) -> Side;

    /// The side to move in the starting position of this game.
    fn starting_side(&self) -> Side;

    /// Half-moves played since the starting position.
    fn ply_count(&self) -> u32;

    /// Half-moves since the last irreversible move (capture or pawn push).
    fn reversible_move_count(&self) -> u32;

    fn is_legal(&self, mv: &GenericMove) -> bool;

    /// Applies a legal move.
    fn make_move(&mut self, mv: &GenericMove) -> Result<(), BoardError>;

    /// Whether playing `mv` would recreate a position already seen in this
    /// game.
    fn is_repetition(&self, mv: &GenericMove) -> bool;

    /// Standard Algebraic Notation for a legal move in the current position.
    fn san_string(&self, mv: &GenericMove) -> Option<String>;

    /// Resolves a SAN token against the current position.
    fn move_from_san(&self, san: &str) -> Option<GenericMove>;

    /// The game's verdict in the current position, or a none-result while
    /// play continues. Fifty-move and threefold draws are claimed
    /// automatically.
    fn result(&self) -> GameResult;

    /// An endgame-tablebase verdict for the current position, if one is
    /// available. The default implementation knows none.
    fn tablebase_result(&self) -> GameResult {
        GameResult::none()
    }
}

/// Standard chess, backed by `shakmaty`.
pub struct StandardBoard {
    pos: Chess,
    start_fen: String,
    starting_side: Side,
    /// Keys of every position seen this game, the current one included.
    key_history: Vec<u64>,
    ply: u32,
}

impl StandardBoard {
    pub fn new() -> Self {
        let pos = Chess::default();
        let start_fen = Fen::from_position(pos.clone(), EnPassantMode::Legal).to_string();
        let key = hash(&pos);
        Self {
            pos,
            start_fen,
            starting_side: Side::White,
            key_history: vec![key],
            ply: 0,
        }
    }

    /// Translates a coordinate move into a shakmaty move, accepting the
    /// king-takes-rook castling form used by Polyglot books.
    fn to_board_move(&self, mv: &GenericMove) -> Option<Move> {
        let uci = Uci::Normal {
            from: mv.from,
            to: mv.to,
            promotion: mv.promotion,
        };
        if let Ok(m) = uci.to_move(&self.pos) {
            return Some(m);
        }

        let board = self.pos.board();
        let us = self.pos.turn();
        let king = board.piece_at(mv.from)?;
        let rook = board.piece_at(mv.to)?;
        if king.color != us || rook.color != us {
            return None;
        }
        if king.role != Role::King || rook.role != Role::Rook {
            return None;
        }
        let file = if mv.to.file() > mv.from.file() {
            shakmaty::File::G
        } else {
            shakmaty::File::C
        };
        let target = Square::from_coords(file, mv.from.rank());
        Uci::Normal {
            from: mv.from,
            to: target,
            promotion: None,
        }
        .to_move(&self.pos)
        .ok()
    }

    fn repetition_count(&self) -> usize {
        let current = *self.key_history.last().unwrap_or(&0);
        self.key_history.iter().filter(|&&k| k == current).count()
    }
}

impl Default for StandardBoard {
    fn default() -> Self {
        Self::new()
    }
}

fn hash(pos: &Chess) -> u64 {
    pos.zobrist_hash::<Zobrist64>(EnPassantMode::Legal).0
}

fn side_from(color: Color) -> Side {
    match color {
        Color::White => Side::White,
        Color::Black => Side::Black,
    }
}

fn generic_from(m: &Move, pos: &Chess) -> GenericMove {
    match m.to_uci(pos.castles().mode()) {
        Uci::Normal {
            from,
            to,
            promotion,
        } => GenericMove {
            from,
            to,
            promotion,
        },
        // Null moves never reach us through legal-move translation.
        Uci::Null => GenericMove::new(Square::A1, Square::A1),
        // Drop moves do not occur in standard chess.
        Uci::Put { .. } => GenericMove::new(Square::A1, Square::A1),
    }
}

impl Board for StandardBoard {
    fn variant(&self) -> Variant {
        Variant::standard()
    }

    fn default_fen(&self) -> String {
        Fen::from_position(Chess::default(), EnPassantMode::Legal).to_string()
    }

    fn set_fen(&mut self, fen: &str) -> Result<(), BoardError> {
        let parsed: Fen = fen
            .parse()
            .map_err(|_| BoardError::InvalidFen(fen.to_string()))?;
        let pos: Chess = parsed
            .into_position(CastlingMode::Standard)
            .map_err(|_| BoardError::InvalidFen(fen.to_string()))?;

        self.start_fen = Fen::from_position(pos.clone(), EnPassantMode::Legal).to_string();
        self.starting_side = side_from(pos.turn());
        self.key_history = vec![hash(&pos)];
        self.ply = 0;
        self.pos = pos;
        Ok(())
    }

    fn fen(&self) -> String {
        Fen::from_position(self.pos.clone(), EnPassantMode::Legal).to_string()
    }

    fn starting_fen(&self) -> String {
        self.start_fen.clone()
    }

    fn key(&self) -> u64 {
        hash(&self.pos)
    }

    fn side_to_move(&self) -> Side {
        side_from(self.pos.turn())
    }

    fn starting_side(&self) -> Side {
        self.starting_side
    }

    fn ply_count(&self) -> u32 {
        self.ply
    }

    fn reversible_move_count(&self) -> u32 {
        self.pos.halfmoves()
    }

    fn is_legal(&self, mv: &GenericMove) -> bool {
        self.to_board_move(mv).is_some()
    }

    fn make_move(&mut self, mv: &GenericMove) -> Result<(), BoardError> {
        let m = self
            .to_board_move(mv)
            .ok_or_else(|| BoardError::IllegalMove(mv.to_string()))?;
        self.pos.play_unchecked(&m);
        self.key_history.push(hash(&self.pos));
        self.ply += 1;
        Ok(())
    }

    fn is_repetition(&self, mv: &GenericMove) -> bool {
        let Some(m) = self.to_board_move(mv) else {
            return false;
        };
        let mut next = self.pos.clone();
        next.play_unchecked(&m);
        let key = hash(&next);
        self.key_history.iter().any(|&k| k == key)
    }

    fn san_string(&self, mv: &GenericMove) -> Option<String> {
        let m = self.to_board_move(mv)?;
        Some(SanPlus::from_move(self.pos.clone(), &m).to_string())
    }

    fn move_from_san(&self, san: &str) -> Option<GenericMove> {
        let parsed: SanPlus = san.parse().ok()?;
        let m = parsed.san.to_move(&self.pos).ok()?;
        Some(generic_from(&m, &self.pos))
    }

    fn result(&self) -> GameResult {
        if self.pos.is_checkmate() {
            let winner = self.side_to_move().opposite();
            return GameResult::win(winner, &format!("{winner} mates"));
        }
        if self.pos.is_stalemate() {
            return GameResult::draw("stalemate");
        }
        if self.pos.is_insufficient_material() {
            return GameResult::draw("insufficient mating material");
        }
        if self.pos.halfmoves() >= 100 {
            return GameResult::draw("fifty moves rule");
        }
        if self.repetition_count() >= 3 {
            return GameResult::draw("3-fold repetition");
        }
        GameResult::none()
    }
}

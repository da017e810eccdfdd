//! Board abstraction for engine match play.
//!
//! This crate provides the value types shared by the match orchestration
//! layers (sides, coordinate moves, game results, variants) and the [`Board`]
//! trait the game loop drives. The standard-chess implementation is backed
//! by `shakmaty`; everything above this crate talks to the trait only.

pub mod board;
pub mod moves;
pub mod result;
pub mod side;
pub mod variant;

pub use shakmaty;
pub use shakmaty::{Role, Square};

pub use board::{Board, BoardError, StandardBoard};
pub use moves::GenericMove;
pub use result::{GameResult, ResultKind};
pub use side::Side;
pub use variant::Variant;

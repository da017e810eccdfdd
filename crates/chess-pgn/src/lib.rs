//! PGN (Portable Game Notation) reading and writing.
//!
//! [`PgnStream`] tokenizes a PGN text stream; [`PgnGame`] holds one game's
//! tag pairs and move list and knows how to read itself from a stream and
//! write itself back out with the seven-tag roster and 80-column movetext
//! wrapping.

pub mod game;
pub mod stream;

pub use game::{MoveData, PgnGame, PgnMode};
pub use stream::{PgnStream, PgnToken};

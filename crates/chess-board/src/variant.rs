//! Chess variant identifiers.

use crate::board::{Board, BoardError, StandardBoard};

/// Identifies a chess variant by name.
///
/// Only `standard` has a board implementation today; the type exists so the
/// match layers validate variant names once, up front, instead of failing
/// deep inside a game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant(String);

impl Variant {
    /// Standard chess.
    pub fn standard() -> Self {
        Self("standard".to_string())
    }

    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn is_standard(&self) -> bool {
        self.0 == "standard"
    }

    /// Creates a board for this variant.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::UnknownVariant`] for any variant without a board
    /// implementation.
    pub fn create_board(&self) -> Result<Box<dyn Board>, BoardError> {
        if self.is_standard() {
            Ok(Box::new(StandardBoard::new()))
        } else {
            Err(BoardError::UnknownVariant(self.0.clone()))
        }
    }
}

impl Default for Variant {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_has_a_board() {
        assert!(Variant::standard().create_board().is_ok());
    }

    #[test]
    fn unknown_variant_is_rejected() {
        let err = match Variant::new("suicide").create_board() {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert!(matches!(err, BoardError::UnknownVariant(name) if name == "suicide"));
    }
}

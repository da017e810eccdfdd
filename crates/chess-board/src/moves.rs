//! Coordinate-form move representation.

use shakmaty::{Role, Square};

/// A move in plain coordinate form, independent of the side to move and of
/// any particular board state.
///
/// This is the currency exchanged between the game loop, the engine drivers
/// and the opening book: a source square, a destination square and an
/// optional promotion piece. Castling uses the king-destination form
/// (`e1g1`, `e1c1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenericMove {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<Role>,
}

impl GenericMove {
    /// Creates a move between two squares without promotion.
    pub const fn new(from: Square, to: Square) -> Self {
        Self {
            from,
            to,
            promotion: None,
        }
    }

    /// Parses a move from long algebraic (UCI) notation, e.g. `e2e4` or
    /// `e7e8q`.
    pub fn from_uci(s: &str) -> Option<Self> {
        let s = s.as_bytes();
        if s.len() < 4 || s.len() > 5 {
            return None;
        }
        let from = Square::from_ascii(&s[0..2]).ok()?;
        let to = Square::from_ascii(&s[2..4]).ok()?;
        let promotion = match s.get(4) {
            Some(c) => Some(Role::from_char(char::from(*c))?),
            None => None,
        };
        Some(Self {
            from,
            to,
            promotion,
        })
    }
}

impl std::fmt::Display for GenericMove {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let Some(role) = self.promotion {
            write!(f, "{}", role.char())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_move() {
        let m = GenericMove::from_uci("e2e4").unwrap();
        assert_eq!(m.from, Square::E2);
        assert_eq!(m.to, Square::E4);
        assert_eq!(m.promotion, None);
    }

    #[test]
    fn parse_promotion() {
        let m = GenericMove::from_uci("e7e8q").unwrap();
        assert_eq!(m.from, Square::E7);
        assert_eq!(m.to, Square::E8);
        assert_eq!(m.promotion, Some(Role::Queen));
    }

    #[test]
    fn reject_garbage() {
        assert!(GenericMove::from_uci("").is_none());
        assert!(GenericMove::from_uci("e2").is_none());
        assert!(GenericMove::from_uci("e2e4qq").is_none());
        assert!(GenericMove::from_uci("z9z9").is_none());
    }

    #[test]
    fn display_roundtrip() {
        for s in ["e2e4", "g1f3", "a7a8n"] {
            assert_eq!(GenericMove::from_uci(s).unwrap().to_string(), s);
        }
    }
}

//! Game outcome representation.

use crate::side::Side;

/// How a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    /// The game is still running (or never produced a verdict).
    None,
    /// Win by the rules of the variant (checkmate or equivalent).
    Win,
    /// Draw by the rules of the variant.
    Draw,
    /// Outcome decided from evaluation history or tablebases.
    Adjudication,
    /// Loss on time.
    Timeout,
    /// The losing player's process terminated.
    Disconnection,
    /// The losing player stopped responding without terminating.
    StalledConnection,
    /// The losing player produced an illegal move.
    IllegalMove,
    /// The losing player resigned.
    Resignation,
    /// Both players agreed on the outcome.
    Agreement,
    /// The game was aborted without a verdict.
    NoResult,
    /// An unrecoverable error ended the game.
    Error,
}

impl ResultKind {
    /// Kinds for which a winning side may be recorded.
    fn takes_winner(self) -> bool {
        matches!(
            self,
            ResultKind::Win
                | ResultKind::Adjudication
                | ResultKind::Timeout
                | ResultKind::Disconnection
                | ResultKind::StalledConnection
                | ResultKind::IllegalMove
                | ResultKind::Resignation
        )
    }
}

/// The outcome of a game: a kind, an optional winner and a human-readable
/// description.
///
/// A winner is only ever present for the winner-bearing kinds
/// ([`ResultKind::takes_winner`]); constructing a result through the public
/// constructors maintains this invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameResult {
    kind: ResultKind,
    winner: Option<Side>,
    description: String,
}

impl Default for GameResult {
    fn default() -> Self {
        Self::none()
    }
}

impl GameResult {
    /// A game with no verdict yet.
    pub fn none() -> Self {
        Self {
            kind: ResultKind::None,
            winner: None,
            description: String::new(),
        }
    }

    /// Creates a result of the given kind. The winner is dropped for kinds
    /// that cannot carry one.
    pub fn new(kind: ResultKind, winner: Option<Side>, description: &str) -> Self {
        Self {
            kind,
            winner: if kind.takes_winner() { winner } else { None },
            description: description.to_string(),
        }
    }

    /// Win by the rules of the variant.
    pub fn win(winner: Side, description: &str) -> Self {
        Self::new(ResultKind::Win, Some(winner), description)
    }

    /// Draw by the rules of the variant.
    pub fn draw(description: &str) -> Self {
        Self::new(ResultKind::Draw, None, description)
    }

    /// Adjudicated outcome; `winner` of `None` means an adjudicated draw.
    pub fn adjudication(winner: Option<Side>, description: &str) -> Self {
        Self::new(ResultKind::Adjudication, winner, description)
    }

    /// Loss on time by `loser`.
    pub fn timeout(loser: Side) -> Self {
        Self::new(ResultKind::Timeout, Some(loser.opposite()), "time forfeit")
    }

    /// Loss by disconnection of `loser`.
    pub fn disconnection(loser: Side) -> Self {
        Self::new(
            ResultKind::Disconnection,
            Some(loser.opposite()),
            "disconnection",
        )
    }

    /// Loss by a stalled connection of `loser`.
    pub fn stalled_connection(loser: Side) -> Self {
        Self::new(
            ResultKind::StalledConnection,
            Some(loser.opposite()),
            "stalled connection",
        )
    }

    /// Loss by an illegal move from `loser`.
    pub fn illegal_move(loser: Side, mv: &str) -> Self {
        Self::new(
            ResultKind::IllegalMove,
            Some(loser.opposite()),
            &format!("illegal move: {mv}"),
        )
    }

    /// Loss by resignation of `loser`.
    pub fn resignation(loser: Side) -> Self {
        Self::new(
            ResultKind::Resignation,
            Some(loser.opposite()),
            "resignation",
        )
    }

    /// An unrecoverable error.
    pub fn error(description: &str) -> Self {
        Self::new(ResultKind::Error, None, description)
    }

    pub fn kind(&self) -> ResultKind {
        self.kind
    }

    pub fn winner(&self) -> Option<Side> {
        self.winner
    }

    pub fn loser(&self) -> Option<Side> {
        self.winner.map(Side::opposite)
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// True while no verdict has been reached.
    pub fn is_none(&self) -> bool {
        self.kind == ResultKind::None
    }

    /// True for any drawn outcome, by rule or by adjudication.
    pub fn is_draw(&self) -> bool {
        match self.kind {
            ResultKind::Draw | ResultKind::Agreement => true,
            ResultKind::Adjudication => self.winner.is_none(),
            _ => false,
        }
    }

    /// The PGN result token: `1-0`, `0-1`, `1/2-1/2` or `*`.
    pub fn to_pgn(&self) -> &'static str {
        match self.winner {
            Some(Side::White) => "1-0",
            Some(Side::Black) => "0-1",
            None => {
                if self.is_draw() {
                    "1/2-1/2"
                } else {
                    "*"
                }
            }
        }
    }

    /// The PGN `Termination` tag value, when one applies to this kind.
    pub fn termination(&self) -> Option<&'static str> {
        match self.kind {
            ResultKind::Adjudication => Some("adjudication"),
            ResultKind::Timeout => Some("time forfeit"),
            ResultKind::Disconnection => Some("abandoned"),
            ResultKind::NoResult => Some("unterminated"),
            _ => None,
        }
    }
}

impl std::fmt::Display for GameResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.kind, self.winner) {
            (ResultKind::None, _) => write!(f, "no result"),
            (ResultKind::NoResult, _) => write!(f, "unterminated"),
            (ResultKind::Error, _) => write!(f, "error: {}", self.description),
            (_, Some(side)) if !self.description.is_empty() => {
                write!(f, "{side} wins ({})", self.description)
            }
            (_, Some(side)) => write!(f, "{side} wins"),
            (_, None) if !self.description.is_empty() => {
                write!(f, "draw ({})", self.description)
            }
            (_, None) => write!(f, "draw"),
        }
    }
}

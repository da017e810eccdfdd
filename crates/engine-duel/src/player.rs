//! The player endpoint abstraction.
//!
//! A [`Player`] is one side of a game: usually a chess engine process behind
//! a protocol driver, but anything implementing the trait can sit at the
//! board (the tests use scripted players). Players communicate with the game
//! loop through [`PlayerEvent`]s produced while digesting I/O.

use std::time::Instant;

use chess_board::{Board, GameResult, GenericMove, Side};

use crate::eval::MoveEvaluation;

/// Identifies one engine endpoint for event routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineId(pub usize);

/// Raw input from an engine process, delivered on the match event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoEvent {
    /// One line of engine output, newline stripped.
    Line(String),
    /// The engine's output stream closed.
    Eof,
}

/// A notification produced by a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    /// The player confirmed readiness after a synchronization request.
    Ready,
    /// The player produced a move.
    MoveMade(GenericMove),
    /// The player ended the game: time loss, disconnection, resignation or
    /// another non-natural termination.
    Forfeit(GameResult),
    /// A line of raw engine output, for debug relay to stderr.
    Debug(String),
}

/// One endpoint in a game.
///
/// Players are long-lived: they span a match and are handed to each game in
/// turn. The game loop calls the command methods ([`new_game`](Self::new_game),
/// [`go`](Self::go), [`make_move`](Self::make_move), …) and feeds engine
/// output back through [`handle_io`](Self::handle_io), collecting the events
/// that result.
pub trait Player {
    /// The player's display name.
    fn name(&self) -> &str;

    /// Overrides the display name.
    fn set_name(&mut self, name: &str);

    /// Whether the player is idle and in sync. A disconnected player counts
    /// as ready so that termination is never stalled by a dead engine.
    fn is_ready(&self) -> bool;

    /// Prepares for a new game playing `side` from the board's current
    /// (starting) position.
    fn new_game(&mut self, side: Side, board: &dyn Board);

    /// Asks the player to produce the next move. `opponent_time_ms` is the
    /// opponent's remaining clock, for protocols that report both clocks.
    fn go(&mut self, opponent_time_ms: i64);

    /// Relays the opponent's move.
    fn make_move(&mut self, mv: &GenericMove);

    /// Announces a forced book move the player itself is deemed to have
    /// made.
    fn make_book_move(&mut self, mv: &GenericMove);

    /// Delivers the final result and requests a readiness re-sync, so that
    /// trailing output is absorbed before the game is archived.
    fn end_game(&mut self, result: &GameResult);

    /// The evaluation behind the player's most recent move.
    fn evaluation(&self) -> &MoveEvaluation;

    /// Remaining clock time in milliseconds.
    fn time_left_ms(&self) -> i64;

    /// Digests one raw I/O event into player events.
    fn handle_io(&mut self, io: IoEvent) -> Vec<PlayerEvent>;

    /// Polls clock and responsiveness deadlines; returns a forfeit when one
    /// has passed.
    fn check_deadlines(&mut self, now: Instant) -> Option<GameResult>;

    /// Called when the initialization waiting period elapses. Protocols
    /// whose handshake is optional may assume readiness here.
    fn init_timeout(&mut self) -> Vec<PlayerEvent> {
        Vec::new()
    }

    /// Asks the underlying engine to terminate.
    fn quit(&mut self);
}

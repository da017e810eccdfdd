//! The game loop: one game between two players.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use chess_board::{Board, BoardError, GameResult, GenericMove, Side, Variant};
use chess_pgn::{MoveData, PgnGame};
use thiserror::Error;
use tracing::{debug, warn};

use crate::adjudicator::GameAdjudicator;
use crate::book::PolyglotBook;
use crate::player::{EngineId, IoEvent, Player, PlayerEvent};

/// Poll interval for clock and responsiveness deadlines.
const EVENT_TICK: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum GameError {
    #[error("both players must be set before the game starts")]
    MissingPlayer,
    #[error(transparent)]
    Board(#[from] BoardError),
}

/// A player bound to a game, tagged with its event-routing id.
pub struct PlayerSlot<'a> {
    pub id: EngineId,
    pub player: &'a mut dyn Player,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GameState {
    /// Players may still be installed.
    Armed,
    /// Waiting for both players to confirm readiness before play.
    Syncing,
    /// The move loop is running.
    Playing,
    /// A result is set; waiting for both players to quiesce.
    Ending,
    /// The game is over and archived state is final.
    Ended,
}

/// Conducts a single game: readiness synchronization, the forced opening
/// prefix, the move loop with legality checking and adjudication, and
/// orderly termination.
///
/// The conductor owns the board and the game record; players are borrowed
/// from the match for the duration of the game. Engine I/O arrives on the
/// shared match event channel and is routed to the owning player; the
/// resulting [`PlayerEvent`]s drive the state machine.
pub struct Game<'a> {
    variant: Variant,
    board: Box<dyn Board>,
    pgn: PgnGame,
    players: [Option<PlayerSlot<'a>>; 2],
    adjudicator: GameAdjudicator,
    result: GameResult,
    state: GameState,
    opening: Vec<GenericMove>,
    start_fen: Option<String>,
    in_progress: bool,
    debug: bool,
}

impl<'a> Game<'a> {
    pub fn new(variant: Variant) -> Result<Self, GameError> {
        let board = variant.create_board()?;
        Ok(Self {
            variant,
            board,
            pgn: PgnGame::new(),
            players: [None, None],
            adjudicator: GameAdjudicator::new(),
            result: GameResult::none(),
            state: GameState::Armed,
            opening: Vec::new(),
            start_fen: None,
            in_progress: false,
            debug: false,
        })
    }

    /// Installs the player for one side. Must happen before
    /// [`play`](Self::play).
    pub fn set_player(&mut self, side: Side, slot: PlayerSlot<'a>) {
        self.players[side.index()] = Some(slot);
    }

    /// Overrides the starting position.
    pub fn set_fen(&mut self, fen: &str) -> Result<(), BoardError> {
        self.board.set_fen(fen)?;
        self.start_fen = Some(self.board.starting_fen());
        Ok(())
    }

    /// Injects an exact forced opening prefix.
    pub fn set_opening_moves(&mut self, moves: Vec<GenericMove>) {
        self.opening = moves;
    }

    pub fn set_adjudicator(&mut self, adjudicator: GameAdjudicator) {
        self.adjudicator = adjudicator;
    }

    /// Relay raw engine output to stderr while the game runs.
    pub fn set_debug_mode(&mut self, debug: bool) {
        self.debug = debug;
    }

    /// Precomputes a forced opening by probing the book from the starting
    /// position: at most `max_plies` probes, stopping at the first miss,
    /// illegal move or immediate repetition. Probing failures are not
    /// errors — the opening is simply as long as the book allowed.
    pub fn set_opening_book(
        &mut self,
        book: &PolyglotBook,
        max_plies: usize,
    ) -> Result<(), BoardError> {
        self.reset_board()?;
        let mut opening = Vec::new();
        for _ in 0..max_plies {
            let Some(mv) = book.probe(self.board.key()) else {
                break;
            };
            if !self.board.is_legal(&mv) {
                warn!(%mv, "illegal opening book move");
                break;
            }
            if self.board.is_repetition(&mv) {
                break;
            }
            self.board.make_move(&mv)?;
            if !self.board.result().is_none() {
                break;
            }
            opening.push(mv);
        }
        self.opening = opening;
        Ok(())
    }

    /// The explicit starting position, when one was set.
    pub fn starting_fen(&self) -> Option<String> {
        self.start_fen.clone()
    }

    /// The forced opening prefix.
    pub fn opening_moves(&self) -> &[GenericMove] {
        &self.opening
    }

    pub fn result(&self) -> &GameResult {
        &self.result
    }

    pub fn pgn(&self) -> &PgnGame {
        &self.pgn
    }

    pub fn pgn_mut(&mut self) -> &mut PgnGame {
        &mut self.pgn
    }

    /// Runs the game to completion, consuming engine I/O from `events`.
    ///
    /// Returns the final result once both players have confirmed readiness
    /// after termination (so trailing engine output has been absorbed).
    pub fn play(
        &mut self,
        events: &Receiver<(EngineId, IoEvent)>,
    ) -> Result<GameResult, GameError> {
        if self.players.iter().any(Option::is_none) {
            return Err(GameError::MissingPlayer);
        }

        self.state = GameState::Syncing;
        self.check_sync();

        while self.state != GameState::Ended {
            match events.recv_timeout(EVENT_TICK) {
                Ok((id, io)) => {
                    let Some(side) = self.side_of(id) else {
                        continue;
                    };
                    let player_events = self.slot_mut(side).player.handle_io(io);
                    for event in player_events {
                        self.handle_player_event(side, event);
                    }
                }
                Err(RecvTimeoutError::Timeout) => self.on_tick(),
                Err(RecvTimeoutError::Disconnected) => {
                    if self.result.is_none() {
                        self.result = GameResult::error("engine event channel closed");
                    }
                    self.state = GameState::Ended;
                }
            }
        }
        Ok(self.result.clone())
    }

    fn slot_mut(&mut self, side: Side) -> &mut PlayerSlot<'a> {
        self.players[side.index()]
            .as_mut()
            .expect("player installed")
    }

    fn player(&self, side: Side) -> &dyn Player {
        self.players[side.index()]
            .as_ref()
            .expect("player installed")
            .player
    }

    fn side_of(&self, id: EngineId) -> Option<Side> {
        for (i, slot) in self.players.iter().enumerate() {
            if slot.as_ref().is_some_and(|s| s.id == id) {
                return Some(if i == 0 { Side::White } else { Side::Black });
            }
        }
        None
    }

    fn both_ready(&self) -> bool {
        self.players
            .iter()
            .flatten()
            .all(|slot| slot.player.is_ready())
    }

    fn handle_player_event(&mut self, side: Side, event: PlayerEvent) {
        match event {
            PlayerEvent::Ready => self.check_sync(),
            PlayerEvent::MoveMade(mv) => {
                if self.state == GameState::Playing {
                    self.on_move_made(side, mv);
                } else {
                    debug!(%mv, "move discarded outside play");
                }
            }
            PlayerEvent::Forfeit(result) => self.on_forfeit(result),
            PlayerEvent::Debug(message) => {
                if self.debug {
                    eprintln!("{message}");
                }
            }
        }
    }

    /// Advances the state machine whenever a waiting span may have ended.
    fn check_sync(&mut self) {
        match self.state {
            GameState::Syncing if self.both_ready() => self.begin(),
            GameState::Ending if self.both_ready() => self.state = GameState::Ended,
            _ => {}
        }
    }

    fn on_tick(&mut self) {
        let now = Instant::now();
        let mut forfeits = Vec::new();
        for slot in self.players.iter_mut().flatten() {
            if let Some(result) = slot.player.check_deadlines(now) {
                forfeits.push(result);
            }
        }
        for result in forfeits {
            self.on_forfeit(result);
        }
        // A player marked disconnected by a deadline counts as ready.
        self.check_sync();
    }

    /// Both players are ready: set up the board and record, play the forced
    /// prefix and hand the move to the side on move.
    fn begin(&mut self) {
        self.state = GameState::Playing;
        self.in_progress = true;

        if let Err(e) = self.reset_board() {
            self.result = GameResult::error(&e.to_string());
            self.state = GameState::Ended;
            return;
        }

        self.pgn = PgnGame::new();
        self.pgn.set_variant(&self.variant);
        self.pgn
            .set_date(&chrono::Utc::now().format("%Y.%m.%d").to_string());
        let white_name = self.player(Side::White).name().to_string();
        let black_name = self.player(Side::Black).name().to_string();
        self.pgn.set_player_name(Side::White, &white_name);
        self.pgn.set_player_name(Side::Black, &black_name);
        if self.start_fen.is_some() {
            let fen = self.board.starting_fen();
            self.pgn.set_starting_fen(self.board.starting_side(), &fen);
        } else {
            self.pgn.set_starting_side(self.board.starting_side());
        }

        let board = self.board.as_ref();
        for (i, slot) in self.players.iter_mut().enumerate() {
            let side = if i == 0 { Side::White } else { Side::Black };
            if let Some(slot) = slot {
                slot.player.new_game(side, board);
            }
        }

        let opening = self.opening.clone();
        for mv in &opening {
            if !self.board.is_legal(mv) {
                warn!(%mv, "skipping illegal forced opening move");
                break;
            }
            let san = self
                .board
                .san_string(mv)
                .unwrap_or_else(|| mv.to_string());
            self.pgn.add_move(MoveData {
                key: self.board.key(),
                mov: *mv,
                san,
                comment: "book".to_string(),
            });

            let maker = self.board.side_to_move();
            self.slot_mut(maker).player.make_book_move(mv);
            self.slot_mut(maker.opposite()).player.make_move(mv);
            if self.board.make_move(mv).is_err() {
                break;
            }

            if !self.board.result().is_none() {
                debug!("every move was played from the book");
                self.result = self.board.result();
                self.enter_ending();
                return;
            }
        }

        self.request_move();
    }

    fn request_move(&mut self) {
        let stm = self.board.side_to_move();
        let opponent_time = self.player(stm.opposite()).time_left_ms();
        self.slot_mut(stm).player.go(opponent_time);
    }

    fn on_move_made(&mut self, side: Side, mv: GenericMove) {
        if side != self.board.side_to_move() {
            warn!(
                "{} tried to make a move on the opponent's turn",
                self.player(side).name()
            );
            return;
        }
        if !self.board.is_legal(&mv) {
            self.result = GameResult::illegal_move(side, &mv.to_string());
            self.enter_ending();
            return;
        }

        let eval = self.player(side).evaluation().clone();
        let san = self
            .board
            .san_string(&mv)
            .unwrap_or_else(|| mv.to_string());
        self.pgn.add_move(MoveData {
            key: self.board.key(),
            mov: mv,
            san,
            comment: eval.comment(),
        });

        self.slot_mut(side.opposite()).player.make_move(&mv);
        if self.board.make_move(&mv).is_err() {
            self.result = GameResult::error(&format!("move application failed: {mv}"));
            self.enter_ending();
            return;
        }

        self.result = self.board.result();
        if self.result.is_none() {
            if self.board.reversible_move_count() == 0 {
                self.adjudicator.reset_draw_counter();
            }
            self.adjudicator.add_eval(self.board.as_ref(), &eval);
            self.result = self.adjudicator.result().clone();
        }

        if self.result.is_none() {
            self.request_move();
        } else {
            self.enter_ending();
        }
    }

    fn on_forfeit(&mut self, result: GameResult) {
        match self.state {
            GameState::Playing => {
                self.result = result;
                self.enter_ending();
            }
            GameState::Syncing => {
                // The game never started; there is nothing to tear down.
                self.result = result;
                self.state = GameState::Ended;
            }
            GameState::Ending => self.check_sync(),
            _ => {}
        }
    }

    /// Delivers the result to both players and re-enters readiness sync.
    /// Archival and the next game wait until the engines have quiesced.
    fn enter_ending(&mut self) {
        if !self.in_progress {
            return;
        }
        self.in_progress = false;

        self.pgn
            .set_tag("PlyCount", &self.pgn.moves().len().to_string());
        self.pgn.set_result(&self.result);
        self.pgn.set_result_description(self.result.description());

        let result = self.result.clone();
        self.slot_mut(Side::White).player.end_game(&result);
        self.slot_mut(Side::Black).player.end_game(&result);

        self.state = GameState::Ending;
        self.check_sync();
    }

    fn reset_board(&mut self) -> Result<(), BoardError> {
        match &self.start_fen {
            Some(fen) => self.board.set_fen(&fen.clone()),
            None => {
                let fen = self.board.default_fen();
                self.board.set_fen(&fen)
            }
        }
    }
}

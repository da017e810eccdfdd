//! The match loop: repeated games with color alternation and scoring.

use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use chess_board::{GameResult, GenericMove, ResultKind, Side, Variant};
use chess_pgn::{PgnGame, PgnMode, PgnStream};
use thiserror::Error;
use tracing::{info, warn};

use crate::adjudicator::GameAdjudicator;
use crate::book::PolyglotBook;
use crate::config::{AdjudicationConfig, EngineConfig, Protocol};
use crate::game::{Game, GameError, PlayerSlot};
use crate::player::{EngineId, IoEvent, Player, PlayerEvent};
use crate::process::EngineProcess;
use crate::uci::UciEngine;
use crate::xboard::XboardEngine;

/// Pause between games so engine processes can drain.
const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// How long engines get to complete their protocol handshake.
const INIT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("two engines are needed")]
    TwoEnginesRequired,
    #[error("invalid or missing time control: {0}")]
    InvalidTimeControl(String),
    #[error("cannot start engine {command}: {source}")]
    Spawn {
        command: String,
        source: io::Error,
    },
    #[error("engine {0} failed during initialization")]
    EngineStart(String),
    #[error("engine {0} did not complete its protocol handshake")]
    InitTimeout(String),
    #[error("match is not initialized")]
    NotInitialized,
    #[error(transparent)]
    Game(#[from] GameError),
}

/// Aggregate score of a finished match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchSummary {
    /// Wins per engine, in registration order.
    pub wins: [u32; 2],
    pub draws: u32,
    pub games_played: u32,
}

/// Runs a sequence of games between two engines.
///
/// Colors alternate every game (`white = engines[game % 2]`), openings are
/// seeded by priority — an explicit repeat memo, then the Polyglot book,
/// then the PGN opening bank — and each finished game is appended to the
/// PGN archive. The match stops early when a game ends in an unrecoverable
/// engine failure.
pub struct MatchRunner {
    configs: Vec<EngineConfig>,
    players: Vec<Box<dyn Player>>,
    rx: Option<Receiver<(EngineId, IoEvent)>>,
    wins: [u32; 2],
    draw_count: u32,
    game_count: u32,
    current_game: u32,
    variant: Variant,
    book: Option<PolyglotBook>,
    book_depth: usize,
    pgn_in: Option<PgnStream<io::BufReader<std::fs::File>>>,
    pgn_games_read: u32,
    pgn_out: Option<std::path::PathBuf>,
    event: String,
    site: String,
    repeat_opening: bool,
    seed_fen: Option<String>,
    seed_moves: Vec<GenericMove>,
    adjudication: Option<AdjudicationConfig>,
    debug: bool,
    settle_delay: Duration,
}

impl MatchRunner {
    pub fn new() -> Self {
        Self {
            configs: Vec::new(),
            players: Vec::new(),
            rx: None,
            wins: [0, 0],
            draw_count: 0,
            game_count: 1,
            current_game: 0,
            variant: Variant::standard(),
            book: None,
            book_depth: 30,
            pgn_in: None,
            pgn_games_read: 0,
            pgn_out: None,
            event: String::new(),
            site: String::new(),
            repeat_opening: false,
            seed_fen: None,
            seed_moves: Vec::new(),
            adjudication: None,
            debug: false,
            settle_delay: SETTLE_DELAY,
        }
    }

    /// Registers one engine. At most two are accepted; further entries are
    /// logged and dropped.
    ///
    /// # Arguments
    ///
    /// * `config` - The engine's command, protocol and time control.
    pub fn add_engine(&mut self, config: EngineConfig) {
        if self.configs.len() >= 2 {
            warn!("only two engines can be added");
            return;
        }
        if config.command.is_empty() {
            warn!("ignoring engine with an empty command");
            return;
        }
        self.configs.push(config);
    }

    pub fn set_game_count(&mut self, games: u32) {
        self.game_count = games.max(1);
    }

    pub fn set_variant(&mut self, variant: Variant) {
        self.variant = variant;
    }

    pub fn set_event(&mut self, event: &str) {
        self.event = event.to_string();
    }

    pub fn set_site(&mut self, site: &str) {
        self.site = site.to_string();
    }

    pub fn set_repeat_opening(&mut self, repeat: bool) {
        self.repeat_opening = repeat;
    }

    /// Loads a Polyglot book, replacing any previous one. An unreadable
    /// file logs a warning and leaves the match bookless.
    pub fn set_book_file(&mut self, path: &std::path::Path) {
        match PolyglotBook::open(path) {
            Ok(book) => self.book = Some(book),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "can't open book file");
                self.book = None;
            }
        }
    }

    /// Caps the number of book plies per game. Zero is rejected.
    pub fn set_book_depth(&mut self, depth: usize) {
        if depth == 0 {
            warn!("book depth must be bigger than zero");
            return;
        }
        self.book_depth = depth;
    }

    /// Opens a PGN file as the opening bank.
    pub fn set_pgn_input(&mut self, path: &std::path::Path) {
        match std::fs::File::open(path) {
            Ok(file) => {
                self.pgn_in = PgnStream::with_variant(
                    io::BufReader::new(file),
                    self.variant.clone(),
                );
                if self.pgn_in.is_none() {
                    warn!(variant = %self.variant, "no board for the PGN input variant");
                }
            }
            Err(e) => warn!(path = %path.display(), error = %e, "can't open PGN file"),
        }
    }

    pub fn set_pgn_output(&mut self, path: &std::path::Path) {
        self.pgn_out = Some(path.to_path_buf());
    }

    pub fn set_adjudication(&mut self, rules: AdjudicationConfig) {
        self.adjudication = Some(rules);
    }

    /// Relays raw engine output to stderr while games run.
    pub fn set_debug_mode(&mut self, debug: bool) {
        self.debug = debug;
    }

    /// Shortens the inter-game settling delay (used by tests).
    pub fn set_settle_delay(&mut self, delay: Duration) {
        self.settle_delay = delay;
    }

    /// Spawns both engine processes and completes their protocol
    /// handshakes.
    ///
    /// Each child is started with an explicit working directory (the
    /// engine's configured one, or a process-global temporary directory)
    /// and its stdout is pumped onto the shared match event channel.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than two engines are registered, a time
    /// control is invalid, a process cannot be spawned, or an engine dies
    /// or stays silent during its protocol handshake.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use engine_duel::{MatchConfig, MatchRunner};
    ///
    /// let config = MatchConfig::load("match.toml")?;
    /// let mut runner = MatchRunner::new();
    /// runner.set_game_count(config.games);
    /// for engine in config.engines.clone() {
    ///     runner.add_engine(engine);
    /// }
    /// runner.initialize()?;
    /// let summary = runner.run()?;
    /// println!("{} - {} - {}", summary.wins[0], summary.wins[1], summary.draws);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn initialize(&mut self) -> Result<(), MatchError> {
        if self.configs.len() != 2 {
            return Err(MatchError::TwoEnginesRequired);
        }

        let (tx, rx) = mpsc::channel();
        let mut players: Vec<Box<dyn Player>> = Vec::new();
        for (i, config) in self.configs.iter().enumerate() {
            let tc = config
                .parsed_time_control()
                .map_err(|e| MatchError::InvalidTimeControl(e.to_string()))?;
            let cwd = config
                .working_directory
                .clone()
                .unwrap_or_else(std::env::temp_dir);
            let proc = EngineProcess::spawn(
                &config.command,
                &config.args,
                &cwd,
                EngineId(i),
                tx.clone(),
            )
            .map_err(|e| MatchError::Spawn {
                command: config.command.clone(),
                source: e,
            })?;

            let mut player: Box<dyn Player> = match config.protocol {
                Protocol::Uci => Box::new(UciEngine::new(proc, tc).map_err(|e| {
                    MatchError::Spawn {
                        command: config.command.clone(),
                        source: e,
                    }
                })?),
                Protocol::Xboard => Box::new(XboardEngine::new(proc, tc).map_err(|e| {
                    MatchError::Spawn {
                        command: config.command.clone(),
                        source: e,
                    }
                })?),
            };
            if let Some(name) = &config.name {
                player.set_name(name);
            }
            players.push(player);
        }
        drop(tx);

        let deadline = Instant::now() + INIT_TIMEOUT;
        while !players.iter().all(|p| p.is_ready()) {
            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok((id, io)) => {
                    for event in players[id.0].handle_io(io) {
                        match event {
                            PlayerEvent::Forfeit(_) => {
                                return Err(MatchError::EngineStart(
                                    self.configs[id.0].command.clone(),
                                ));
                            }
                            PlayerEvent::Debug(message) => {
                                if self.debug {
                                    eprintln!("{message}");
                                }
                            }
                            _ => {}
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if Instant::now() >= deadline {
                        for player in &mut players {
                            if !player.is_ready() {
                                player.init_timeout();
                            }
                        }
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(MatchError::EngineStart("engine output closed".to_string()));
                }
            }
        }
        if let Some(stuck) = players.iter().position(|p| !p.is_ready()) {
            return Err(MatchError::InitTimeout(self.configs[stuck].command.clone()));
        }

        self.install_players(players, rx)
    }

    /// Installs already-constructed players and their event channel. This
    /// is the seam the engine-less tests drive; [`initialize`](Self::initialize)
    /// funnels through it.
    ///
    /// # Arguments
    ///
    /// * `players` - Exactly two players, in registration order.
    /// * `rx` - Receiving half of the event channel the players send on.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::TwoEnginesRequired`] unless exactly two
    /// players are supplied.
    pub fn install_players(
        &mut self,
        players: Vec<Box<dyn Player>>,
        rx: Receiver<(EngineId, IoEvent)>,
    ) -> Result<(), MatchError> {
        if players.len() != 2 {
            return Err(MatchError::TwoEnginesRequired);
        }
        self.players = players;
        self.rx = Some(rx);
        Ok(())
    }

    /// Plays the whole match.
    ///
    /// # Returns
    ///
    /// The aggregate [`MatchSummary`]: wins per engine, draws, and how
    /// many games were actually played (fewer than requested when an
    /// engine failure aborted the match).
    ///
    /// # Errors
    ///
    /// Returns an error if the runner was never initialized or a game
    /// could not be constructed.
    pub fn run(&mut self) -> Result<MatchSummary, MatchError> {
        let rx = self.rx.take().ok_or(MatchError::NotInitialized)?;
        let mut games_played = 0;

        for g in 0..self.game_count {
            self.current_game = g;
            info!("started game {} of {}", g + 1, self.game_count);

            let result = self.play_one(g, &rx)?;
            games_played += 1;
            info!("game {} ended: {}", g + 1, result);

            if result.is_draw() {
                self.draw_count += 1;
            } else if let Some(winner) = result.winner() {
                let engine = if (g % 2 == 0) == (winner == Side::White) {
                    0
                } else {
                    1
                };
                self.wins[engine] += 1;
                info!("{} wins the game as {}", self.players[engine].name(), winner);
            }
            info!(
                "score of {} vs {}: {} - {} - {}",
                self.players[0].name(),
                self.players[1].name(),
                self.wins[0],
                self.wins[1],
                self.draw_count
            );

            if matches!(
                result.kind(),
                ResultKind::Error | ResultKind::Disconnection
            ) {
                warn!("unrecoverable engine failure, aborting the match");
                break;
            }
            if g + 1 < self.game_count {
                thread::sleep(self.settle_delay);
            }
        }

        self.quit_engines();
        info!("finished match");
        Ok(MatchSummary {
            wins: self.wins,
            draws: self.draw_count,
            games_played,
        })
    }

    /// Builds, seeds and plays game `g`.
    fn play_one(
        &mut self,
        g: u32,
        rx: &Receiver<(EngineId, IoEvent)>,
    ) -> Result<GameResult, MatchError> {
        let clocks = self.time_control_tags(g);
        let mut game = Game::new(self.variant.clone())?;

        let mut adjudicator = GameAdjudicator::new();
        if let Some(rules) = &self.adjudication {
            if rules.draw_move_number > 0 {
                adjudicator.set_draw_threshold(
                    rules.draw_move_number,
                    rules.draw_move_count,
                    rules.draw_score,
                );
            }
            if rules.resign_move_count > 0 {
                adjudicator.set_resign_threshold(rules.resign_move_count, rules.resign_score);
            }
            adjudicator.set_tablebase_adjudication(rules.tablebase);
        }
        game.set_adjudicator(adjudicator);
        game.set_debug_mode(self.debug);

        // Color parity: the first engine takes White in even games.
        let (first, second) = self.players.split_at_mut(1);
        let (white, white_id, black, black_id) = if g % 2 == 0 {
            (&mut first[0], EngineId(0), &mut second[0], EngineId(1))
        } else {
            (&mut second[0], EngineId(1), &mut first[0], EngineId(0))
        };
        game.set_player(
            Side::White,
            PlayerSlot {
                id: white_id,
                player: white.as_mut(),
            },
        );
        game.set_player(
            Side::Black,
            PlayerSlot {
                id: black_id,
                player: black.as_mut(),
            },
        );

        // Opening priority: repeat memo, then book, then the PGN bank.
        if self.seed_fen.is_some() || !self.seed_moves.is_empty() {
            if let Some(fen) = self.seed_fen.take() {
                if let Err(e) = game.set_fen(&fen) {
                    warn!(error = %e, "dropping invalid repeat opening");
                }
            }
            let moves = std::mem::take(&mut self.seed_moves);
            if !moves.is_empty() {
                game.set_opening_moves(moves);
            }
        } else if let Some(book) = &self.book {
            if let Err(e) = game.set_opening_book(book, self.book_depth) {
                warn!(error = %e, "opening book seeding failed");
            }
        } else if let Some(stream) = self.pgn_in.as_mut() {
            match PgnGame::read_from(stream, self.book_depth) {
                Some(seed) => {
                    apply_pgn_seed(&mut game, &seed);
                    self.pgn_games_read += 1;
                }
                // Cyclic replay: rewind once after at least one good read.
                None if self.pgn_games_read > 0 => {
                    if stream.rewind().is_ok() {
                        match PgnGame::read_from(stream, self.book_depth) {
                            Some(seed) => {
                                apply_pgn_seed(&mut game, &seed);
                                self.pgn_games_read += 1;
                            }
                            None => warn!("no openings available in the PGN input"),
                        }
                    }
                }
                None => warn!("cannot read an opening from the PGN input"),
            }
        }

        // Memorize the opening of even games so odd games replay it with
        // colors swapped.
        if self.repeat_opening && g % 2 == 0 {
            self.seed_fen = game.starting_fen();
            self.seed_moves = game.opening_moves().to_vec();
        }

        let result = game.play(rx)?;

        if let Some(path) = self.pgn_out.clone() {
            let event = self.event.clone();
            let site = self.site.clone();
            let pgn = game.pgn_mut();
            pgn.set_event(&event);
            pgn.set_site(&site);
            pgn.set_round(g + 1);
            for (tag, value) in &clocks {
                pgn.set_tag(tag, value);
            }
            if let Err(e) = pgn.write_to_file(&path, PgnMode::Verbose) {
                warn!(path = %path.display(), error = %e, "failed to write PGN output");
            }
        }

        Ok(result)
    }

    /// The `TimeControl` tag values for game `g`, split per color when the
    /// engines play under different controls.
    fn time_control_tags(&self, g: u32) -> Vec<(String, String)> {
        if self.configs.len() != 2 {
            return Vec::new();
        }
        let (w, b) = if g % 2 == 0 { (0, 1) } else { (1, 0) };
        let (Ok(white), Ok(black)) = (
            self.configs[w].parsed_time_control(),
            self.configs[b].parsed_time_control(),
        ) else {
            return Vec::new();
        };
        if white == black {
            vec![("TimeControl".to_string(), white.to_string())]
        } else {
            vec![
                ("WhiteTimeControl".to_string(), white.to_string()),
                ("BlackTimeControl".to_string(), black.to_string()),
            ]
        }
    }

    fn quit_engines(&mut self) {
        for player in &mut self.players {
            player.quit();
        }
    }
}

impl Default for MatchRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Seeds a game from an opening-bank entry: its starting position (if any)
/// plus its move prefix.
fn apply_pgn_seed(game: &mut Game<'_>, seed: &PgnGame) {
    if let Some(fen) = seed.starting_fen() {
        if let Err(e) = game.set_fen(fen) {
            warn!(error = %e, "ignoring opening with invalid FEN");
            return;
        }
    }
    let moves: Vec<GenericMove> = seed.moves().iter().map(|m| m.mov).collect();
    if !moves.is_empty() {
        game.set_opening_moves(moves);
    }
}

//! UCI protocol driver.
//!
//! Drives a UCI engine process through the match event loop: the `uci` /
//! `uciok` handshake, `isready` synchronization, `position` + `go` move
//! requests and `bestmove` / `info` parsing. Time accounting happens here;
//! an overdrawn clock or an unresponsive engine surfaces as a forfeit.

use std::io;
use std::time::{Duration, Instant};

use chess_board::{Board, GameResult, GenericMove, Side};
use tracing::debug;

use crate::eval::MoveEvaluation;
use crate::player::{IoEvent, Player, PlayerEvent};
use crate::process::EngineProcess;
use crate::timecontrol::TimeControl;

/// Slack added to the clock before declaring a timeout, covering process
/// scheduling and pipe latency.
const CLOCK_GRACE_MS: i64 = 1000;

/// How long an engine may leave a readiness request unanswered.
const PING_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverState {
    Initializing,
    Idle,
    Thinking,
    Disconnected,
}

/// A UCI engine endpoint.
pub struct UciEngine {
    proc: EngineProcess,
    name: String,
    name_overridden: bool,
    side: Side,
    tc: TimeControl,
    eval: MoveEvaluation,
    state: DriverState,
    ready: bool,
    ping_sent: Option<Instant>,
    /// Moves played since the starting position, in UCI notation.
    moves: Vec<String>,
    position_cmd: String,
    search_start: Option<Instant>,
}

impl UciEngine {
    /// Wraps a spawned process and opens the UCI handshake. The engine
    /// reports ready once `uciok` and the follow-up `readyok` arrive on the
    /// match event channel.
    ///
    /// # Arguments
    ///
    /// * `proc` - The spawned engine process.
    /// * `tc` - The engine's time control for the match.
    ///
    /// # Errors
    ///
    /// Returns an error if the opening `uci` command cannot be written to
    /// the engine's stdin.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::path::Path;
    /// use std::sync::mpsc;
    /// use engine_duel::player::EngineId;
    /// use engine_duel::process::EngineProcess;
    /// use engine_duel::timecontrol::TimeControl;
    /// use engine_duel::uci::UciEngine;
    ///
    /// let (tx, _rx) = mpsc::channel();
    /// let proc = EngineProcess::spawn("stockfish", &[], Path::new("/tmp"), EngineId(0), tx)?;
    /// let tc: TimeControl = "40/60+0.5".parse()?;
    /// let engine = UciEngine::new(proc, tc)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(mut proc: EngineProcess, tc: TimeControl) -> io::Result<Self> {
        proc.send("uci")?;
        Ok(Self {
            proc,
            name: String::new(),
            name_overridden: false,
            side: Side::White,
            tc,
            eval: MoveEvaluation::empty(),
            state: DriverState::Initializing,
            ready: false,
            ping_sent: Some(Instant::now()),
            moves: Vec::new(),
            position_cmd: "position startpos".to_string(),
            search_start: None,
        })
    }

    fn sync(&mut self) {
        if self.state == DriverState::Disconnected {
            return;
        }
        self.ready = false;
        self.ping_sent = Some(Instant::now());
        let _ = self.proc.send("isready");
    }

    fn handle_line(&mut self, line: &str) -> Vec<PlayerEvent> {
        let line = line.trim();
        let mut events = vec![PlayerEvent::Debug(format!("<{}: {line}", self.name))];

        if let Some(rest) = line.strip_prefix("id name ") {
            if !self.name_overridden && self.state == DriverState::Initializing {
                self.name = rest.to_string();
            }
        } else if line == "uciok" {
            if self.state == DriverState::Initializing {
                self.sync();
            }
        } else if line == "readyok" {
            self.ready = true;
            self.ping_sent = None;
            if self.state == DriverState::Initializing {
                self.state = DriverState::Idle;
            }
            events.push(PlayerEvent::Ready);
        } else if let Some(rest) = line.strip_prefix("bestmove") {
            events.extend(self.on_bestmove(rest));
        } else if line.starts_with("info ") {
            if self.state == DriverState::Thinking {
                self.parse_info(line);
            }
        }
        events
    }

    fn on_bestmove(&mut self, rest: &str) -> Vec<PlayerEvent> {
        if self.state != DriverState::Thinking {
            debug!(name = %self.name, "discarding bestmove outside a search");
            return Vec::new();
        }
        self.state = DriverState::Idle;

        let elapsed = self
            .search_start
            .take()
            .map(|t| t.elapsed())
            .unwrap_or_default();
        if self.eval.time_ms == 0 {
            self.eval.time_ms = elapsed.as_millis() as u64;
        }
        self.tc.on_move_made(elapsed);
        if self.tc.expired() {
            return vec![PlayerEvent::Forfeit(GameResult::timeout(self.side))];
        }

        let token = rest.split_whitespace().next().unwrap_or("");
        if token.is_empty() || token == "(none)" || token == "0000" {
            return vec![PlayerEvent::Forfeit(GameResult::resignation(self.side))];
        }
        match GenericMove::from_uci(token) {
            Some(mv) => {
                self.moves.push(token.to_string());
                vec![PlayerEvent::MoveMade(mv)]
            }
            None => vec![PlayerEvent::Forfeit(GameResult::illegal_move(
                self.side, token,
            ))],
        }
    }

    /// Folds a UCI `info` line into the pending evaluation.
    fn parse_info(&mut self, line: &str) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let mut i = 1;
        while i < parts.len() {
            match parts[i] {
                "depth" => {
                    i += 1;
                    if let Some(depth) = parts.get(i).and_then(|s| s.parse().ok()) {
                        self.eval.depth = depth;
                    }
                }
                "score" => {
                    i += 1;
                    match parts.get(i) {
                        Some(&"cp") => {
                            i += 1;
                            if let Some(score) = parts.get(i).and_then(|s| s.parse().ok()) {
                                self.eval.score = score;
                            }
                        }
                        Some(&"mate") => {
                            i += 1;
                            if let Some(plies) = parts.get(i).and_then(|s| s.parse().ok()) {
                                self.eval.score = MoveEvaluation::mate_score(plies);
                            }
                        }
                        _ => {}
                    }
                }
                "time" => {
                    i += 1;
                    if let Some(time) = parts.get(i).and_then(|s| s.parse().ok()) {
                        self.eval.time_ms = time;
                    }
                }
                "pv" => {
                    self.eval.pv = parts[i + 1..].join(" ");
                    break;
                }
                _ => {}
            }
            i += 1;
        }
    }
}

impl Player for UciEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
        self.name_overridden = true;
    }

    fn is_ready(&self) -> bool {
        self.state == DriverState::Disconnected || self.ready
    }

    fn new_game(&mut self, side: Side, board: &dyn Board) {
        self.side = side;
        self.moves.clear();
        self.eval = MoveEvaluation::empty();
        self.tc.start_game();

        let fen = board.fen();
        self.position_cmd = if fen == board.default_fen() {
            "position startpos".to_string()
        } else {
            format!("position fen {fen}")
        };

        let _ = self.proc.send("ucinewgame");
        self.sync();
    }

    fn go(&mut self, opponent_time_ms: i64) {
        if self.state == DriverState::Disconnected {
            return;
        }

        let position = if self.moves.is_empty() {
            self.position_cmd.clone()
        } else {
            format!("{} moves {}", self.position_cmd, self.moves.join(" "))
        };
        let _ = self.proc.send(&position);

        let go_cmd = if self.tc.move_time_ms() > 0 {
            format!("go movetime {}", self.tc.move_time_ms())
        } else {
            let own = self.tc.time_left_ms().max(0);
            let opp = opponent_time_ms.max(0);
            let (wtime, btime) = match self.side {
                Side::White => (own, opp),
                Side::Black => (opp, own),
            };
            let mut cmd = format!("go wtime {wtime} btime {btime}");
            let inc = self.tc.increment_ms();
            if inc > 0 {
                cmd.push_str(&format!(" winc {inc} binc {inc}"));
            }
            if self.tc.moves_left() > 0 {
                cmd.push_str(&format!(" movestogo {}", self.tc.moves_left()));
            }
            cmd
        };
        let _ = self.proc.send(&go_cmd);

        self.eval = MoveEvaluation::empty();
        self.search_start = Some(Instant::now());
        self.state = DriverState::Thinking;
    }

    fn make_move(&mut self, mv: &GenericMove) {
        self.moves.push(mv.to_string());
    }

    fn make_book_move(&mut self, mv: &GenericMove) {
        self.moves.push(mv.to_string());
        self.eval = MoveEvaluation::empty();
    }

    fn end_game(&mut self, _result: &GameResult) {
        if self.state == DriverState::Thinking {
            let _ = self.proc.send("stop");
            self.state = DriverState::Idle;
            self.search_start = None;
        }
        self.sync();
    }

    fn evaluation(&self) -> &MoveEvaluation {
        &self.eval
    }

    fn time_left_ms(&self) -> i64 {
        self.tc.time_left_ms()
    }

    fn handle_io(&mut self, io: IoEvent) -> Vec<PlayerEvent> {
        match io {
            IoEvent::Line(line) => self.handle_line(&line),
            IoEvent::Eof => {
                if self.state == DriverState::Disconnected {
                    return Vec::new();
                }
                self.state = DriverState::Disconnected;
                vec![PlayerEvent::Forfeit(GameResult::disconnection(self.side))]
            }
        }
    }

    fn check_deadlines(&mut self, now: Instant) -> Option<GameResult> {
        if self.state == DriverState::Thinking {
            if let Some(start) = self.search_start {
                let budget = self.tc.next_move_budget_ms() + CLOCK_GRACE_MS;
                if now.duration_since(start).as_millis() as i64 > budget {
                    self.state = DriverState::Idle;
                    self.search_start = None;
                    return Some(GameResult::timeout(self.side));
                }
            }
        }
        if let Some(sent) = self.ping_sent {
            if now.duration_since(sent) > PING_TIMEOUT {
                self.ping_sent = None;
                self.state = DriverState::Disconnected;
                return Some(GameResult::stalled_connection(self.side));
            }
        }
        None
    }

    fn quit(&mut self) {
        let _ = self.proc.send("quit");
        self.proc.shutdown();
    }
}

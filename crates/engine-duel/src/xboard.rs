//! Xboard (CECP) protocol driver.
//!
//! Speaks protocol version 2: feature negotiation on startup, `force`-mode
//! position setup, `level`/`st` clocks and `usermove` relays. Readiness
//! synchronization uses `ping`/`pong` when the engine offers the feature;
//! engines without it simply count as always in sync.

use std::io;
use std::time::{Duration, Instant};

use chess_board::{Board, GameResult, GenericMove, Side};
use tracing::{debug, warn};

use crate::eval::MoveEvaluation;
use crate::player::{IoEvent, Player, PlayerEvent};
use crate::process::EngineProcess;
use crate::timecontrol::TimeControl;

const CLOCK_GRACE_MS: i64 = 1000;
const PING_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initializing,
    Idle,
    Thinking,
    Disconnected,
}

/// An Xboard engine endpoint.
pub struct XboardEngine {
    proc: EngineProcess,
    name: String,
    name_overridden: bool,
    side: Side,
    tc: TimeControl,
    eval: MoveEvaluation,
    state: State,
    ready: bool,
    ping_sent: Option<Instant>,
    ping_counter: u32,
    expected_pong: Option<u32>,
    feature_ping: bool,
    feature_setboard: bool,
    feature_usermove: bool,
    force_mode: bool,
    /// An opponent move held back until `go`, so clock updates precede it.
    pending_move: Option<GenericMove>,
    search_start: Option<Instant>,
}

impl XboardEngine {
    /// Wraps a spawned process and opens feature negotiation. The engine
    /// reports ready when its features end with `done=1`; engines that never
    /// negotiate are promoted by the initialization timeout.
    ///
    /// # Arguments
    ///
    /// * `proc` - The spawned engine process.
    /// * `tc` - The engine's time control for the match.
    ///
    /// # Errors
    ///
    /// Returns an error if the `xboard`/`protover 2` greeting cannot be
    /// written to the engine's stdin.
    pub fn new(mut proc: EngineProcess, tc: TimeControl) -> io::Result<Self> {
        proc.send("xboard")?;
        proc.send("protover 2")?;
        Ok(Self {
            proc,
            name: String::new(),
            name_overridden: false,
            side: Side::White,
            tc,
            eval: MoveEvaluation::empty(),
            state: State::Initializing,
            ready: false,
            ping_sent: None,
            ping_counter: 0,
            expected_pong: None,
            feature_ping: false,
            feature_setboard: false,
            feature_usermove: false,
            force_mode: true,
            pending_move: None,
            search_start: None,
        })
    }

    fn finish_init(&mut self) -> Vec<PlayerEvent> {
        if self.state != State::Initializing {
            return Vec::new();
        }
        self.state = State::Idle;
        self.ready = true;
        vec![PlayerEvent::Ready]
    }

    fn sync(&mut self) {
        if self.state == State::Disconnected {
            return;
        }
        if !self.feature_ping {
            self.ready = true;
            return;
        }
        self.ping_counter += 1;
        self.expected_pong = Some(self.ping_counter);
        self.ready = false;
        self.ping_sent = Some(Instant::now());
        let _ = self.proc.send(&format!("ping {}", self.ping_counter));
    }

    fn send_move(&mut self, mv: &GenericMove) {
        let line = if self.feature_usermove {
            format!("usermove {mv}")
        } else {
            mv.to_string()
        };
        let _ = self.proc.send(&line);
    }

    fn send_clocks(&mut self, opponent_time_ms: i64) {
        // Xboard clocks tick in centiseconds.
        let own = self.tc.time_left_ms().max(0) / 10;
        let opp = opponent_time_ms.max(0) / 10;
        let _ = self.proc.send(&format!("time {own}"));
        let _ = self.proc.send(&format!("otim {opp}"));
    }

    fn handle_line(&mut self, line: &str) -> Vec<PlayerEvent> {
        let line = line.trim();
        let mut events = vec![PlayerEvent::Debug(format!("<{}: {line}", self.name))];

        if let Some(rest) = line.strip_prefix("feature ") {
            events.extend(self.parse_features(rest));
        } else if let Some(rest) = line.strip_prefix("pong ") {
            if self.expected_pong == rest.trim().parse().ok() {
                self.expected_pong = None;
                self.ping_sent = None;
                self.ready = true;
                events.push(PlayerEvent::Ready);
            }
        } else if let Some(rest) = line.strip_prefix("move ") {
            events.extend(self.on_move(rest.trim()));
        } else if line == "resign" {
            events.push(PlayerEvent::Forfeit(GameResult::resignation(self.side)));
        } else if line.starts_with("Illegal move") {
            warn!(name = %self.name, line, "engine rejected a relayed move");
        } else if self.state == State::Thinking
            && line
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit() || c == '-')
        {
            self.parse_post_line(line);
        }
        events
    }

    /// Parses one `feature` line, replying `accepted`/`rejected` per item.
    fn parse_features(&mut self, rest: &str) -> Vec<PlayerEvent> {
        let mut events = Vec::new();
        for (key, value) in feature_pairs(rest) {
            let accepted = match key.as_str() {
                "ping" => {
                    self.feature_ping = value == "1";
                    true
                }
                "setboard" => {
                    self.feature_setboard = value == "1";
                    true
                }
                "usermove" => {
                    self.feature_usermove = value == "1";
                    true
                }
                "myname" => {
                    if !self.name_overridden {
                        self.name = value.clone();
                    }
                    true
                }
                "done" => {
                    if value == "1" {
                        events = self.finish_init();
                    }
                    continue;
                }
                _ => false,
            };
            let reply = if accepted { "accepted" } else { "rejected" };
            let _ = self.proc.send(&format!("{reply} {key}"));
        }
        events
    }

    fn on_move(&mut self, token: &str) -> Vec<PlayerEvent> {
        if self.state != State::Thinking {
            debug!(name = %self.name, token, "discarding move outside a search");
            return Vec::new();
        }
        self.state = State::Idle;

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

        match GenericMove::from_uci(token) {
            Some(mv) => vec![PlayerEvent::MoveMade(mv)],
            None => vec![PlayerEvent::Forfeit(GameResult::illegal_move(
                self.side, token,
            ))],
        }
    }

    /// Parses a thinking-output line: `depth score time nodes [pv...]`,
    /// score in centipawns and time in centiseconds.
    fn parse_post_line(&mut self, line: &str) {
        let mut parts = line.split_whitespace();
        let (Some(depth), Some(score), Some(time)) = (parts.next(), parts.next(), parts.next())
        else {
            return;
        };
        let (Ok(depth), Ok(score), Ok(time)) = (
            depth.parse::<i32>(),
            score.parse::<i32>(),
            time.parse::<u64>(),
        ) else {
            return;
        };
        let _nodes = parts.next();
        self.eval.depth = depth;
        self.eval.score = score;
        self.eval.time_ms = time * 10;
        self.eval.pv = parts.collect::<Vec<_>>().join(" ");
    }
}

/// Splits a feature list into key/value pairs, honoring quoted values.
fn feature_pairs(rest: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut chars = rest.chars().peekable();
    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c.is_whitespace() {
                break;
            }
            key.push(c);
            chars.next();
        }
        if key.is_empty() {
            break;
        }
        let mut value = String::new();
        if chars.peek() == Some(&'=') {
            chars.next();
            if chars.peek() == Some(&'"') {
                chars.next();
                for c in chars.by_ref() {
                    if c == '"' {
                        break;
                    }
                    value.push(c);
                }
            } else {
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() {
                        break;
                    }
                    value.push(c);
                    chars.next();
                }
            }
        }
        pairs.push((key, value));
    }
    pairs
}

impl Player for XboardEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
        self.name_overridden = true;
    }

    fn is_ready(&self) -> bool {
        self.state == State::Disconnected || self.ready
    }

    fn new_game(&mut self, side: Side, board: &dyn Board) {
        self.side = side;
        self.eval = MoveEvaluation::empty();
        self.tc.start_game();
        self.force_mode = true;
        self.pending_move = None;

        let _ = self.proc.send("new");
        let _ = self.proc.send("force");

        let fen = board.fen();
        if fen != board.default_fen() {
            if self.feature_setboard {
                let _ = self.proc.send(&format!("setboard {fen}"));
            } else {
                warn!(name = %self.name, "engine cannot start from an arbitrary position");
            }
        }

        if self.tc.move_time_ms() > 0 {
            let secs = (self.tc.move_time_ms() / 1000).max(1);
            let _ = self.proc.send(&format!("st {secs}"));
        } else {
            let base = self.tc.base_time_ms();
            let minutes = base / 60_000;
            let seconds = (base % 60_000) / 1000;
            let clock = if seconds > 0 {
                format!("{minutes}:{seconds:02}")
            } else {
                minutes.to_string()
            };
            let increment = self.tc.increment_ms() / 1000;
            let _ = self
                .proc
                .send(&format!("level {} {clock} {increment}", self.tc.moves_per_tc()));
        }

        let _ = self.proc.send("post");
        let _ = self.proc.send("easy");
        let _ = self.proc.send("computer");
        self.sync();
    }

    fn go(&mut self, opponent_time_ms: i64) {
        if self.state == State::Disconnected {
            return;
        }
        self.send_clocks(opponent_time_ms);
        if let Some(mv) = self.pending_move.take() {
            self.send_move(&mv);
        } else if self.force_mode {
            let _ = self.proc.send("go");
            self.force_mode = false;
        }
        self.eval = MoveEvaluation::empty();
        self.search_start = Some(Instant::now());
        self.state = State::Thinking;
    }

    fn make_move(&mut self, mv: &GenericMove) {
        if self.force_mode {
            self.send_move(mv);
        } else {
            // Held back so `go` can put clock updates on the wire first.
            self.pending_move = Some(*mv);
        }
    }

    fn make_book_move(&mut self, mv: &GenericMove) {
        self.eval = MoveEvaluation::empty();
        if !self.force_mode {
            let _ = self.proc.send("force");
            self.force_mode = true;
        }
        self.send_move(mv);
    }

    fn end_game(&mut self, result: &GameResult) {
        if self.state == State::Thinking {
            let _ = self.proc.send("force");
            self.state = State::Idle;
            self.search_start = None;
            self.force_mode = true;
        }
        let _ = self.proc.send(&format!(
            "result {} {{{}}}",
            result.to_pgn(),
            result.description()
        ));
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
                if self.state == State::Disconnected {
                    return Vec::new();
                }
                self.state = State::Disconnected;
                vec![PlayerEvent::Forfeit(GameResult::disconnection(self.side))]
            }
        }
    }

    fn check_deadlines(&mut self, now: Instant) -> Option<GameResult> {
        if self.state == State::Thinking {
            if let Some(start) = self.search_start {
                let budget = self.tc.next_move_budget_ms() + CLOCK_GRACE_MS;
                if now.duration_since(start).as_millis() as i64 > budget {
                    self.state = State::Idle;
                    self.search_start = None;
                    return Some(GameResult::timeout(self.side));
                }
            }
        }
        if let Some(sent) = self.ping_sent {
            if now.duration_since(sent) > PING_TIMEOUT {
                self.ping_sent = None;
                self.state = State::Disconnected;
                return Some(GameResult::stalled_connection(self.side));
            }
        }
        None
    }

    fn init_timeout(&mut self) -> Vec<PlayerEvent> {
        // Protocol version 1 engines never send features.
        self.finish_init()
    }

    fn quit(&mut self) {
        let _ = self.proc.send("quit");
        self.proc.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_pairs_handle_quotes() {
        let pairs = feature_pairs("ping=1 setboard=1 myname=\"Crafty 25.2\" done=1");
        assert_eq!(pairs.len(), 4);
        assert_eq!(pairs[0], ("ping".to_string(), "1".to_string()));
        assert_eq!(pairs[2], ("myname".to_string(), "Crafty 25.2".to_string()));
        assert_eq!(pairs[3], ("done".to_string(), "1".to_string()));
    }

    #[test]
    fn feature_pairs_tolerate_bare_keys() {
        let pairs = feature_pairs("sigint done=0");
        assert_eq!(pairs[0], ("sigint".to_string(), String::new()));
        assert_eq!(pairs[1], ("done".to_string(), "0".to_string()));
    }
}

//! Test doubles: a scripted player that moves from a fixed script.

use std::sync::mpsc::Sender;
use std::time::Instant;

use chess_board::{Board, GameResult, GenericMove, Role, Side};
use engine_duel::eval::MoveEvaluation;
use engine_duel::player::{EngineId, IoEvent, Player, PlayerEvent};

/// A player that plays a predetermined move list for each color.
///
/// `go` pushes the next scripted move onto the match event channel exactly
/// like an engine process would; an exhausted script (or a scheduled
/// disconnection) closes the stream instead.
pub struct ScriptedPlayer {
    name: String,
    id: EngineId,
    tx: Sender<(EngineId, IoEvent)>,
    white_script: Vec<String>,
    black_script: Vec<String>,
    cursor: usize,
    side: Side,
    eval: MoveEvaluation,
    eval_template: MoveEvaluation,
    pub games_started: u32,
    pub disconnect_in_game: Option<u32>,
}

impl ScriptedPlayer {
    pub fn new(
        name: &str,
        id: EngineId,
        tx: Sender<(EngineId, IoEvent)>,
        white_script: &[&str],
        black_script: &[&str],
    ) -> Self {
        Self {
            name: name.to_string(),
            id,
            tx,
            white_script: white_script.iter().map(|s| s.to_string()).collect(),
            black_script: black_script.iter().map(|s| s.to_string()).collect(),
            cursor: 0,
            side: Side::White,
            eval: MoveEvaluation::empty(),
            eval_template: MoveEvaluation {
                depth: 12,
                score: 5,
                time_ms: 100,
                pv: String::new(),
            },
            games_started: 0,
            disconnect_in_game: None,
        }
    }

    pub fn with_eval(mut self, eval: MoveEvaluation) -> Self {
        self.eval_template = eval;
        self
    }
}

impl Player for ScriptedPlayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn new_game(&mut self, side: Side, _board: &dyn Board) {
        self.side = side;
        self.cursor = 0;
        self.games_started += 1;
    }

    fn go(&mut self, _opponent_time_ms: i64) {
        if self.disconnect_in_game == Some(self.games_started) {
            let _ = self.tx.send((self.id, IoEvent::Eof));
            return;
        }
        let script = match self.side {
            Side::White => &self.white_script,
            Side::Black => &self.black_script,
        };
        match script.get(self.cursor) {
            Some(mv) => {
                self.cursor += 1;
                let _ = self.tx.send((self.id, IoEvent::Line(mv.clone())));
            }
            None => {
                let _ = self.tx.send((self.id, IoEvent::Eof));
            }
        }
    }

    fn make_move(&mut self, _mv: &GenericMove) {}

    fn make_book_move(&mut self, _mv: &GenericMove) {}

    fn end_game(&mut self, _result: &GameResult) {}

    fn evaluation(&self) -> &MoveEvaluation {
        &self.eval
    }

    fn time_left_ms(&self) -> i64 {
        60_000
    }

    fn handle_io(&mut self, io: IoEvent) -> Vec<PlayerEvent> {
        match io {
            IoEvent::Line(line) => match GenericMove::from_uci(&line) {
                Some(mv) => {
                    self.eval = self.eval_template.clone();
                    vec![PlayerEvent::MoveMade(mv)]
                }
                // Anything that is not a move is chatter for debug relay.
                None => vec![PlayerEvent::Debug(format!("<{}: {line}", self.name))],
            },
            IoEvent::Eof => vec![PlayerEvent::Forfeit(GameResult::disconnection(self.side))],
        }
    }

    fn check_deadlines(&mut self, _now: Instant) -> Option<GameResult> {
        None
    }

    fn quit(&mut self) {}
}

/// Encodes one Polyglot record for building in-memory/temp-file test books.
pub fn polyglot_record(key: u64, mv: &str, weight: u16) -> Vec<u8> {
    let m = GenericMove::from_uci(mv).expect("valid uci move");
    let promo = match m.promotion {
        Some(Role::Knight) => 1u16,
        Some(Role::Bishop) => 2,
        Some(Role::Rook) => 3,
        Some(Role::Queen) => 4,
        _ => 0,
    };
    let packed = (promo << 12)
        | ((m.from.rank() as u16) << 9)
        | ((m.from.file() as u16) << 6)
        | ((m.to.rank() as u16) << 3)
        | (m.to.file() as u16);

    let mut bytes = Vec::with_capacity(16);
    bytes.extend_from_slice(&key.to_be_bytes());
    bytes.extend_from_slice(&packed.to_be_bytes());
    bytes.extend_from_slice(&weight.to_be_bytes());
    bytes.extend_from_slice(&0u32.to_be_bytes());
    bytes
}

//! Time control parsing and clock accounting.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TimeControlError {
    #[error("invalid time control: {0}")]
    Invalid(String),
}

/// One player's clock discipline and remaining time.
///
/// Parsed from `moves/time+increment` (seconds, possibly fractional; the
/// `moves/` and `+increment` parts are optional) or `st=seconds` for a fixed
/// time per move. Examples: `40/60+0.6`, `300+2`, `120`, `st=5`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeControl {
    /// Moves per time period; 0 means sudden death.
    moves_per_tc: u32,
    /// Time per period in milliseconds.
    time_per_tc_ms: u64,
    increment_ms: u64,
    /// Fixed time per move in milliseconds; 0 unless `st=` form.
    move_time_ms: u64,
    /// Remaining time; may go negative on overdraft.
    time_left_ms: i64,
    moves_left: u32,
}

impl TimeControl {
    /// A sudden-death control with the given base time and increment.
    pub fn sudden_death(time_ms: u64, increment_ms: u64) -> Self {
        Self {
            moves_per_tc: 0,
            time_per_tc_ms: time_ms,
            increment_ms,
            move_time_ms: 0,
            time_left_ms: time_ms as i64,
            moves_left: 0,
        }
    }

    /// A fixed time-per-move control.
    pub fn fixed_move_time(move_time_ms: u64) -> Self {
        Self {
            moves_per_tc: 0,
            time_per_tc_ms: 0,
            increment_ms: 0,
            move_time_ms,
            time_left_ms: move_time_ms as i64,
            moves_left: 0,
        }
    }

    /// Whether the control describes any positive allotment of time.
    pub fn is_valid(&self) -> bool {
        self.move_time_ms > 0 || self.time_per_tc_ms > 0
    }

    /// Resets the clock for a new game.
    pub fn start_game(&mut self) {
        if self.move_time_ms > 0 {
            self.time_left_ms = self.move_time_ms as i64;
        } else {
            self.time_left_ms = self.time_per_tc_ms as i64;
        }
        self.moves_left = self.moves_per_tc;
    }

    /// Debits the clock for one move and applies increment and period
    /// refresh. Call after the player produced a move.
    pub fn on_move_made(&mut self, elapsed: Duration) {
        let elapsed_ms = elapsed.as_millis() as i64;
        if self.move_time_ms > 0 {
            self.time_left_ms = self.move_time_ms as i64 - elapsed_ms;
            return;
        }

        self.time_left_ms -= elapsed_ms;
        if self.expired() {
            return;
        }
        self.time_left_ms += self.increment_ms as i64;
        if self.moves_per_tc > 0 {
            self.moves_left -= 1;
            if self.moves_left == 0 {
                self.moves_left = self.moves_per_tc;
                self.time_left_ms += self.time_per_tc_ms as i64;
            }
        }
    }

    /// True once the clock has been overdrawn.
    pub fn expired(&self) -> bool {
        self.time_left_ms < 0
    }

    pub fn time_left_ms(&self) -> i64 {
        self.time_left_ms
    }

    pub fn increment_ms(&self) -> u64 {
        self.increment_ms
    }

    pub fn base_time_ms(&self) -> u64 {
        self.time_per_tc_ms
    }

    pub fn moves_per_tc(&self) -> u32 {
        self.moves_per_tc
    }

    pub fn moves_left(&self) -> u32 {
        self.moves_left
    }

    pub fn move_time_ms(&self) -> u64 {
        self.move_time_ms
    }

    /// The budget for the next move, used for response deadlines: the fixed
    /// move time, or whatever is left on the clock.
    pub fn next_move_budget_ms(&self) -> i64 {
        if self.move_time_ms > 0 {
            self.move_time_ms as i64
        } else {
            self.time_left_ms.max(0)
        }
    }
}

fn parse_seconds(s: &str) -> Result<u64, TimeControlError> {
    let secs: f64 = s
        .parse()
        .map_err(|_| TimeControlError::Invalid(s.to_string()))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(TimeControlError::Invalid(s.to_string()));
    }
    Ok((secs * 1000.0).round() as u64)
}

fn format_seconds(ms: u64) -> String {
    format!("{}", ms as f64 / 1000.0)
}

impl FromStr for TimeControl {
    type Err = TimeControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TimeControlError::Invalid(s.to_string()));
        }

        if let Some(rest) = s.strip_prefix("st=") {
            return Ok(Self::fixed_move_time(parse_seconds(rest)?));
        }

        let (moves, rest) = match s.split_once('/') {
            Some((m, rest)) => (
                m.parse::<u32>()
                    .map_err(|_| TimeControlError::Invalid(s.to_string()))?,
                rest,
            ),
            None => (0, s),
        };
        let (time, increment) = match rest.split_once('+') {
            Some((t, i)) => (parse_seconds(t)?, parse_seconds(i)?),
            None => (parse_seconds(rest)?, 0),
        };

        let mut tc = Self::sudden_death(time, increment);
        tc.moves_per_tc = moves;
        tc.moves_left = moves;
        Ok(tc)
    }
}

impl std::fmt::Display for TimeControl {
    /// Renders the PGN `TimeControl` tag form.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.move_time_ms > 0 {
            return write!(f, "{}/move", format_seconds(self.move_time_ms));
        }
        if self.moves_per_tc > 0 {
            write!(f, "{}/", self.moves_per_tc)?;
        }
        write!(f, "{}", format_seconds(self.time_per_tc_ms))?;
        if self.increment_ms > 0 {
            write!(f, "+{}", format_seconds(self.increment_ms))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_common_forms() {
        let tc: TimeControl = "40/60+0.6".parse().unwrap();
        assert_eq!(tc.moves_per_tc, 40);
        assert_eq!(tc.time_per_tc_ms, 60_000);
        assert_eq!(tc.increment_ms, 600);
        assert!(tc.is_valid());

        let tc: TimeControl = "300+2".parse().unwrap();
        assert_eq!(tc.moves_per_tc, 0);
        assert_eq!(tc.time_per_tc_ms, 300_000);
        assert_eq!(tc.increment_ms, 2_000);

        let tc: TimeControl = "120".parse().unwrap();
        assert_eq!(tc.time_per_tc_ms, 120_000);

        let tc: TimeControl = "st=5".parse().unwrap();
        assert_eq!(tc.move_time_ms(), 5_000);
        assert!(tc.is_valid());
    }

    #[test]
    fn rejects_nonsense() {
        assert!("".parse::<TimeControl>().is_err());
        assert!("abc".parse::<TimeControl>().is_err());
        assert!("40/".parse::<TimeControl>().is_err());
        assert!("st=".parse::<TimeControl>().is_err());
        assert!("-5".parse::<TimeControl>().is_err());
    }

    #[test]
    fn zero_time_is_invalid() {
        let tc: TimeControl = "0".parse().unwrap();
        assert!(!tc.is_valid());
    }

    #[test]
    fn clock_debits_and_increments() {
        let mut tc: TimeControl = "10+1".parse().unwrap();
        tc.start_game();
        tc.on_move_made(Duration::from_millis(3000));
        assert_eq!(tc.time_left_ms(), 8_000);
        assert!(!tc.expired());

        tc.on_move_made(Duration::from_millis(9000));
        assert!(tc.expired());
    }

    #[test]
    fn period_refresh_after_the_move_quota() {
        let mut tc: TimeControl = "2/10".parse().unwrap();
        tc.start_game();
        tc.on_move_made(Duration::from_millis(1000));
        assert_eq!(tc.moves_left(), 1);
        tc.on_move_made(Duration::from_millis(1000));
        assert_eq!(tc.moves_left(), 2);
        assert_eq!(tc.time_left_ms(), 18_000);
    }

    #[test]
    fn fixed_move_time_resets_each_move() {
        let mut tc: TimeControl = "st=2".parse().unwrap();
        tc.start_game();
        tc.on_move_made(Duration::from_millis(1500));
        assert!(!tc.expired());
        tc.on_move_made(Duration::from_millis(2500));
        assert!(tc.expired());
    }

    #[test]
    fn display_forms() {
        assert_eq!("40/60+0.6".parse::<TimeControl>().unwrap().to_string(), "40/60+0.6");
        assert_eq!("300+2".parse::<TimeControl>().unwrap().to_string(), "300+2");
        assert_eq!("120".parse::<TimeControl>().unwrap().to_string(), "120");
        assert_eq!("st=5".parse::<TimeControl>().unwrap().to_string(), "5/move");
    }
}

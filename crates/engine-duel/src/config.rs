//! Match configuration loading.
//!
//! A match is described by a TOML file: two `[[engine]]` tables plus the
//! match-level options (game count, opening sources, PGN paths,
//! adjudication rules). Scalar options can be overridden from the command
//! line.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::timecontrol::TimeControl;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// The wire dialect an engine speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Uci,
    Xboard,
}

impl Default for Protocol {
    fn default() -> Self {
        Protocol::Uci
    }
}

/// One engine entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct EngineConfig {
    /// Display name; defaults to whatever the engine reports about itself.
    pub name: Option<String>,
    /// Executable to spawn.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the child process; a process-global temporary
    /// directory when unset.
    pub working_directory: Option<PathBuf>,
    #[serde(default)]
    pub protocol: Protocol,
    /// Time control string, e.g. `40/60+0.5` or `st=2`.
    pub time_control: String,
}

impl EngineConfig {
    /// Parses and validates the engine's time control.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the string does not parse or
    /// grants no time at all.
    pub fn parsed_time_control(&self) -> Result<TimeControl, ConfigError> {
        let tc: TimeControl = self
            .time_control
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("{e}")))?;
        if !tc.is_valid() {
            return Err(ConfigError::Invalid(format!(
                "time control grants no time: {}",
                self.time_control
            )));
        }
        Ok(tc)
    }
}

/// Evaluation-based adjudication thresholds.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AdjudicationConfig {
    /// Full move number from which the draw rule may fire.
    #[serde(default)]
    pub draw_move_number: u32,
    /// Consecutive quiet full moves required from both sides.
    #[serde(default)]
    pub draw_move_count: u32,
    /// Absolute centipawn bound for a "quiet" evaluation.
    #[serde(default)]
    pub draw_score: i32,
    /// Consecutive hopeless own moves before a side is resigned.
    #[serde(default)]
    pub resign_move_count: u32,
    /// Centipawn score at or below which a move counts as hopeless.
    #[serde(default)]
    pub resign_score: i32,
    /// Take tablebase verdicts when the board offers them.
    #[serde(default)]
    pub tablebase: bool,
}

fn default_games() -> u32 {
    1
}

fn default_book_depth() -> usize {
    30
}

fn default_variant() -> String {
    "standard".to_string()
}

/// The full match description.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct MatchConfig {
    /// PGN `Event` tag for archived games.
    #[serde(default)]
    pub event: String,
    /// PGN `Site` tag for archived games.
    #[serde(default)]
    pub site: String,
    #[serde(default = "default_games")]
    pub games: u32,
    #[serde(default = "default_variant")]
    pub variant: String,
    /// Play each opening twice with colors swapped.
    #[serde(default)]
    pub repeat_opening: bool,
    /// Polyglot opening book.
    pub book_file: Option<PathBuf>,
    /// Maximum book plies per game.
    #[serde(default = "default_book_depth")]
    pub book_depth: usize,
    /// PGN opening bank, cycled on exhaustion.
    pub pgn_in: Option<PathBuf>,
    /// Append target for the result archive.
    pub pgn_out: Option<PathBuf>,
    /// Relay engine protocol traffic to stderr.
    #[serde(default)]
    pub debug: bool,
    #[serde(default, rename = "engine")]
    pub engines: Vec<EngineConfig>,
    pub adjudication: Option<AdjudicationConfig>,
}

impl MatchConfig {
    /// Loads and parses a match file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the TOML match description.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read, or
    /// [`ConfigError::Parse`] if it is not valid TOML for this schema.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use engine_duel::MatchConfig;
    ///
    /// let config = MatchConfig::load("match.toml")?;
    /// config.validate()?;
    /// println!("{} games between {} engines", config.games, config.engines.len());
    /// # Ok::<(), engine_duel::ConfigError>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Checks the invariants initialization depends on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when there are not exactly two
    /// engines, an engine command is empty, a time control does not parse
    /// or grants no time, the game count is zero, the book depth is zero,
    /// or the variant has no board implementation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engines.len() != 2 {
            return Err(ConfigError::Invalid(format!(
                "two engines are needed, found {}",
                self.engines.len()
            )));
        }
        for engine in &self.engines {
            if engine.command.is_empty() {
                return Err(ConfigError::Invalid("engine command is empty".to_string()));
            }
            engine.parsed_time_control()?;
        }
        if self.games < 1 {
            return Err(ConfigError::Invalid("games must be at least 1".to_string()));
        }
        if let Err(e) = chess_board::Variant::new(&self.variant).create_board() {
            return Err(ConfigError::Invalid(e.to_string()));
        }
        if self.book_depth == 0 {
            return Err(ConfigError::Invalid(
                "book depth must be bigger than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_engine_config(extra: &str) -> String {
        format!(
            r#"
games = 4
{extra}

[[engine]]
name = "Alpha"
command = "./alpha"
protocol = "uci"
time-control = "40/60+0.5"

[[engine]]
command = "./beta"
protocol = "xboard"
time-control = "st=2"
"#
        )
    }

    #[test]
    fn parses_a_full_match_file() {
        let text = two_engine_config(
            "event = \"Nightly\"\nsite = \"Lab\"\nrepeat-opening = true\n\
             book-file = \"book.bin\"\nbook-depth = 8\npgn-out = \"out.pgn\"\n",
        );
        let config: MatchConfig = toml::from_str(&text).unwrap();
        assert_eq!(config.games, 4);
        assert_eq!(config.event, "Nightly");
        assert!(config.repeat_opening);
        assert_eq!(config.book_depth, 8);
        assert_eq!(config.engines.len(), 2);
        assert_eq!(config.engines[0].name.as_deref(), Some("Alpha"));
        assert_eq!(config.engines[1].protocol, Protocol::Xboard);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn defaults_apply() {
        let config: MatchConfig = toml::from_str(&two_engine_config("")).unwrap();
        assert_eq!(config.variant, "standard");
        assert_eq!(config.book_depth, 30);
        assert!(!config.repeat_opening);
        assert!(config.engines[0].args.is_empty());
        assert_eq!(config.engines[0].protocol, Protocol::Uci);
    }

    #[test]
    fn one_engine_fails_validation() {
        let text = r#"
[[engine]]
command = "./alpha"
time-control = "60"
"#;
        let config: MatchConfig = toml::from_str(text).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_time_control_fails_validation() {
        let text = r#"
[[engine]]
command = "./alpha"
time-control = "60"

[[engine]]
command = "./beta"
time-control = "banana"
"#;
        let config: MatchConfig = toml::from_str(text).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_book_depth_fails_validation() {
        let config: MatchConfig =
            toml::from_str(&two_engine_config("book-depth = 0")).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_variant_fails_validation() {
        let config: MatchConfig =
            toml::from_str(&two_engine_config("variant = \"crazyhouse\"")).unwrap();
        assert!(config.validate().is_err());
    }
}

//! The `engine-duel` command line.
//!
//! Loads a TOML match description, applies command-line overrides, runs
//! the match and exits 0 when all games complete (non-zero on
//! initialization failure):
//!
//! ```text
//! engine-duel match.toml --games 100 --pgn-out results.pgn
//! ```
//!
//! With `--debug`, raw engine output is relayed to stderr while the match
//! runs.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chess_board::Variant;
use engine_duel::{MatchConfig, MatchRunner};

/// Run an automated match between two chess engines.
#[derive(Parser)]
#[command(name = "engine-duel", version)]
struct Cli {
    /// TOML match description (engines, time controls, options).
    match_file: PathBuf,

    /// Number of games to play.
    #[arg(long)]
    games: Option<u32>,

    /// PGN Event tag.
    #[arg(long)]
    event: Option<String>,

    /// PGN Site tag.
    #[arg(long)]
    site: Option<String>,

    /// Polyglot opening book file.
    #[arg(long)]
    book_file: Option<PathBuf>,

    /// Maximum book plies per game.
    #[arg(long)]
    book_depth: Option<usize>,

    /// PGN opening bank, cycled on exhaustion.
    #[arg(long)]
    pgn_in: Option<PathBuf>,

    /// Append finished games to this PGN file.
    #[arg(long)]
    pgn_out: Option<PathBuf>,

    /// Play each opening twice with colors swapped.
    #[arg(long)]
    repeat_opening: bool,

    /// Chess variant.
    #[arg(long)]
    variant: Option<String>,

    /// Relay engine protocol traffic to stderr.
    #[arg(long)]
    debug: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match MatchConfig::load(&cli.match_file) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {e}", cli.match_file.display());
            return ExitCode::FAILURE;
        }
    };
    apply_overrides(&mut config, &cli);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if config.debug { "debug" } else { "info" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = config.validate() {
        error!("{e}");
        return ExitCode::FAILURE;
    }

    let mut runner = MatchRunner::new();
    runner.set_game_count(config.games);
    runner.set_variant(Variant::new(&config.variant));
    runner.set_event(&config.event);
    runner.set_site(&config.site);
    runner.set_repeat_opening(config.repeat_opening);
    if let Some(book) = &config.book_file {
        runner.set_book_file(book);
    }
    runner.set_book_depth(config.book_depth);
    if let Some(path) = &config.pgn_in {
        runner.set_pgn_input(path);
    }
    if let Some(path) = &config.pgn_out {
        runner.set_pgn_output(path);
    }
    if let Some(rules) = config.adjudication.clone() {
        runner.set_adjudication(rules);
    }
    runner.set_debug_mode(config.debug);
    for engine in config.engines.clone() {
        runner.add_engine(engine);
    }

    if let Err(e) = runner.initialize() {
        error!("{e}");
        return ExitCode::FAILURE;
    }
    match runner.run() {
        Ok(summary) => {
            info!(
                "final score: {} - {} - {} in {} games",
                summary.wins[0], summary.wins[1], summary.draws, summary.games_played
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn apply_overrides(config: &mut MatchConfig, cli: &Cli) {
    if let Some(games) = cli.games {
        config.games = games;
    }
    if let Some(event) = &cli.event {
        config.event = event.clone();
    }
    if let Some(site) = &cli.site {
        config.site = site.clone();
    }
    if let Some(book) = &cli.book_file {
        config.book_file = Some(book.clone());
    }
    if let Some(depth) = cli.book_depth {
        config.book_depth = depth;
    }
    if let Some(path) = &cli.pgn_in {
        config.pgn_in = Some(path.clone());
    }
    if let Some(path) = &cli.pgn_out {
        config.pgn_out = Some(path.clone());
    }
    if cli.repeat_opening {
        config.repeat_opening = true;
    }
    if let Some(variant) = &cli.variant {
        config.variant = variant.clone();
    }
    if cli.debug {
        config.debug = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_overrides() {
        let cli = Cli::try_parse_from([
            "engine-duel",
            "match.toml",
            "--games",
            "8",
            "--repeat-opening",
            "--pgn-out",
            "out.pgn",
        ])
        .unwrap();
        assert_eq!(cli.match_file, PathBuf::from("match.toml"));
        assert_eq!(cli.games, Some(8));
        assert!(cli.repeat_opening);
        assert_eq!(cli.pgn_out, Some(PathBuf::from("out.pgn")));
        assert!(!cli.debug);
    }

    #[test]
    fn cli_requires_the_match_file() {
        assert!(Cli::try_parse_from(["engine-duel"]).is_err());
    }

    #[test]
    fn cli_help_renders() {
        let mut cmd = Cli::command();
        let help = cmd.render_help().to_string();
        assert!(help.contains("match"));
    }
}

//! Match-level behavior: color alternation, scoring, seeding, teardown.

mod common;

use std::io::Write;
use std::sync::mpsc;
use std::time::Duration;

use chess_board::Variant;
use engine_duel::config::AdjudicationConfig;
use engine_duel::match_runner::MatchRunner;
use engine_duel::player::{EngineId, Player};

use common::{polyglot_record, ScriptedPlayer};

/// Every White walks into the fool's mate, so the engine holding Black wins
/// each game.
const WHITE_SCRIPT: [&str; 2] = ["f2f3", "g2g4"];
const BLACK_SCRIPT: [&str; 2] = ["e7e5", "d8h4"];

fn fools_mate_pair(
    tx: &mpsc::Sender<(EngineId, engine_duel::IoEvent)>,
) -> (ScriptedPlayer, ScriptedPlayer) {
    let a = ScriptedPlayer::new("A", EngineId(0), tx.clone(), &WHITE_SCRIPT, &BLACK_SCRIPT);
    let b = ScriptedPlayer::new("B", EngineId(1), tx.clone(), &WHITE_SCRIPT, &BLACK_SCRIPT);
    (a, b)
}

#[test]
fn colors_alternate_and_scores_aggregate() {
    let dir = tempfile::tempdir().unwrap();
    let pgn_path = dir.path().join("out.pgn");

    let (tx, rx) = mpsc::channel();
    let (a, b) = fools_mate_pair(&tx);

    let mut runner = MatchRunner::new();
    runner.set_game_count(4);
    runner.set_event("Alternation");
    runner.set_site("Lab");
    runner.set_pgn_output(&pgn_path);
    runner.set_settle_delay(Duration::from_millis(0));
    runner
        .install_players(vec![Box::new(a), Box::new(b)], rx)
        .unwrap();

    let summary = runner.run().unwrap();
    assert_eq!(summary.games_played, 4);
    // Black always wins, and each engine held Black twice.
    assert_eq!(summary.wins, [2, 2]);
    assert_eq!(summary.draws, 0);

    let text = std::fs::read_to_string(&pgn_path).unwrap();
    let whites: Vec<&str> = text
        .lines()
        .filter(|l| l.starts_with("[White "))
        .collect();
    assert_eq!(
        whites,
        [
            "[White \"A\"]",
            "[White \"B\"]",
            "[White \"A\"]",
            "[White \"B\"]"
        ]
    );
    let rounds: Vec<&str> = text
        .lines()
        .filter(|l| l.starts_with("[Round "))
        .collect();
    assert_eq!(
        rounds,
        ["[Round \"1\"]", "[Round \"2\"]", "[Round \"3\"]", "[Round \"4\"]"]
    );
    assert!(text.contains("[Event \"Alternation\"]"));
    assert!(text.contains("[Site \"Lab\"]"));
}

#[test]
fn disconnection_aborts_the_match() {
    let dir = tempfile::tempdir().unwrap();
    let pgn_path = dir.path().join("out.pgn");

    let (tx, rx) = mpsc::channel();
    let (a, mut b) = fools_mate_pair(&tx);
    // Engine B dies at its first move of game 2.
    b.disconnect_in_game = Some(2);

    let mut runner = MatchRunner::new();
    runner.set_game_count(10);
    runner.set_pgn_output(&pgn_path);
    runner.set_settle_delay(Duration::from_millis(0));
    runner
        .install_players(vec![Box::new(a), Box::new(b)], rx)
        .unwrap();

    let summary = runner.run().unwrap();
    assert_eq!(summary.games_played, 2);

    let text = std::fs::read_to_string(&pgn_path).unwrap();
    let games = text.matches("[Event ").count();
    assert_eq!(games, 2);
    assert!(text.contains("[Termination \"abandoned\"]"));
}

#[test]
fn repeat_opening_replays_the_book_prefix_with_swapped_colors() {
    let dir = tempfile::tempdir().unwrap();
    let pgn_path = dir.path().join("out.pgn");
    let book_path = dir.path().join("book.bin");

    // A two-ply deterministic book: 1. d4 d5.
    let mut board = Variant::standard().create_board().unwrap();
    let mut data = polyglot_record(board.key(), "d2d4", 1);
    board
        .make_move(&chess_board::GenericMove::from_uci("d2d4").unwrap())
        .unwrap();
    data.extend(polyglot_record(board.key(), "d7d5", 1));
    std::fs::File::create(&book_path)
        .unwrap()
        .write_all(&data)
        .unwrap();

    let (tx, rx) = mpsc::channel();
    let a = ScriptedPlayer::new("A", EngineId(0), tx.clone(), &["c1f4"], &["c8f5"]);
    let b = ScriptedPlayer::new("B", EngineId(1), tx.clone(), &["c1f4"], &["c8f5"]);

    let mut runner = MatchRunner::new();
    runner.set_game_count(2);
    runner.set_repeat_opening(true);
    runner.set_book_file(&book_path);
    runner.set_book_depth(8);
    runner.set_pgn_output(&pgn_path);
    runner.set_settle_delay(Duration::from_millis(0));
    runner.set_adjudication(AdjudicationConfig {
        draw_move_number: 1,
        draw_move_count: 1,
        draw_score: 10,
        ..Default::default()
    });
    runner
        .install_players(vec![Box::new(a), Box::new(b)], rx)
        .unwrap();

    let summary = runner.run().unwrap();
    assert_eq!(summary.games_played, 2);
    assert_eq!(summary.draws, 2);

    let text = std::fs::read_to_string(&pgn_path).unwrap();
    // Both games open with the same forced prefix.
    assert_eq!(text.matches("1. d4 {book} d5 {book}").count(), 2);
    let whites: Vec<&str> = text
        .lines()
        .filter(|l| l.starts_with("[White "))
        .collect();
    assert_eq!(whites, ["[White \"A\"]", "[White \"B\"]"]);
}

#[test]
fn pgn_bank_seeds_games_and_cycles() {
    let dir = tempfile::tempdir().unwrap();
    let bank_path = dir.path().join("openings.pgn");
    let pgn_path = dir.path().join("out.pgn");
    std::fs::write(
        &bank_path,
        "[Event \"Bank\"]\n\n1. e4 e5 *\n\n[Event \"Bank\"]\n\n1. c4 c5 *\n",
    )
    .unwrap();

    let (tx, rx) = mpsc::channel();
    // Continuations that are legal after either bank opening.
    let a = ScriptedPlayer::new("A", EngineId(0), tx.clone(), &["g1f3"], &["g8f6"]);
    let b = ScriptedPlayer::new("B", EngineId(1), tx.clone(), &["g1f3"], &["g8f6"]);

    let mut runner = MatchRunner::new();
    runner.set_game_count(3);
    runner.set_pgn_input(&bank_path);
    runner.set_pgn_output(&pgn_path);
    runner.set_settle_delay(Duration::from_millis(0));
    runner.set_adjudication(AdjudicationConfig {
        draw_move_number: 1,
        draw_move_count: 1,
        draw_score: 10,
        ..Default::default()
    });
    runner
        .install_players(vec![Box::new(a), Box::new(b)], rx)
        .unwrap();

    let summary = runner.run().unwrap();
    assert_eq!(summary.games_played, 3);

    let text = std::fs::read_to_string(&pgn_path).unwrap();
    // Game 3 wraps around to the first bank entry.
    assert_eq!(text.matches("1. e4 {book} e5 {book}").count(), 2);
    assert_eq!(text.matches("1. c4 {book} c5 {book}").count(), 1);
}

#[test]
fn installing_one_player_is_rejected() {
    let (tx, rx) = mpsc::channel();
    let only: Box<dyn Player> =
        Box::new(ScriptedPlayer::new("A", EngineId(0), tx.clone(), &[], &[]));
    let mut runner = MatchRunner::new();
    assert!(runner.install_players(vec![only], rx).is_err());
}

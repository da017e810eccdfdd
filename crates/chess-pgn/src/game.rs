//! One game's tags and moves, and how they read and write.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{self, BufRead, Write};
use std::path::Path;

use chess_board::{GameResult, GenericMove, Side, Variant};
use tracing::warn;

use crate::stream::{PgnStream, PgnToken};

/// The seven tags every archived game must carry, in emission order.
const TAG_ROSTER: [&str; 7] = ["Event", "Site", "Date", "Round", "White", "Black", "Result"];

/// How much of a game to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgnMode {
    /// All tags and move comments.
    Verbose,
    /// The roster plus `FEN`/`SetUp` when present; bare movetext.
    Minimal,
}

/// One recorded move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveData {
    /// Zobrist key of the position the move was played in.
    pub key: u64,
    /// The move in coordinate form.
    pub mov: GenericMove,
    /// The move's SAN token in that position.
    pub san: String,
    pub comment: String,
}

/// A single game: tag pairs plus the move list.
///
/// Tags are kept sorted by key so that supplementary tags are emitted in a
/// stable, deterministic order.
#[derive(Debug, Clone)]
pub struct PgnGame {
    tags: BTreeMap<String, String>,
    moves: Vec<MoveData>,
    starting_side: Side,
}

impl Default for PgnGame {
    fn default() -> Self {
        Self::new()
    }
}

impl PgnGame {
    pub fn new() -> Self {
        Self {
            tags: BTreeMap::new(),
            moves: Vec::new(),
            starting_side: Side::White,
        }
    }

    /// True when the game holds neither tags nor moves.
    pub fn is_null(&self) -> bool {
        self.tags.is_empty() && self.moves.is_empty()
    }

    pub fn moves(&self) -> &[MoveData] {
        &self.moves
    }

    pub fn add_move(&mut self, data: MoveData) {
        self.moves.push(data);
    }

    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }

    /// Sets a tag; an empty value removes it.
    pub fn set_tag(&mut self, name: &str, value: &str) {
        if value.is_empty() {
            self.tags.remove(name);
        } else {
            self.tags.insert(name.to_string(), value.to_string());
        }
    }

    pub fn set_event(&mut self, event: &str) {
        self.set_tag("Event", event);
    }

    pub fn set_site(&mut self, site: &str) {
        self.set_tag("Site", site);
    }

    /// Sets the `Date` tag; the value is expected in `YYYY.MM.DD` form.
    pub fn set_date(&mut self, date: &str) {
        self.set_tag("Date", date);
    }

    pub fn set_round(&mut self, round: u32) {
        self.set_tag("Round", &round.to_string());
    }

    pub fn set_player_name(&mut self, side: Side, name: &str) {
        match side {
            Side::White => self.set_tag("White", name),
            Side::Black => self.set_tag("Black", name),
        }
    }

    /// Records the result tag and the `Termination` tag for the kinds that
    /// carry one; other kinds clear any stale marker.
    pub fn set_result(&mut self, result: &GameResult) {
        self.set_tag("Result", result.to_pgn());
        match result.termination() {
            Some(t) => self.set_tag("Termination", t),
            None => {
                self.tags.remove("Termination");
            }
        }
    }

    /// Appends a description to the final move's comment.
    pub fn set_result_description(&mut self, description: &str) {
        if description.is_empty() {
            return;
        }
        if let Some(last) = self.moves.last_mut() {
            if !last.comment.is_empty() {
                last.comment.push_str(", ");
            }
            last.comment.push_str(description);
        }
    }

    /// Records the variant tag; standard chess carries no tag.
    pub fn set_variant(&mut self, variant: &Variant) {
        if variant.is_standard() {
            self.tags.remove("Variant");
        } else {
            self.set_tag("Variant", variant.name());
        }
    }

    pub fn variant(&self) -> Variant {
        match self.tags.get("Variant") {
            Some(name) => Variant::new(name),
            None => Variant::standard(),
        }
    }

    pub fn starting_side(&self) -> Side {
        self.starting_side
    }

    pub fn set_starting_side(&mut self, side: Side) {
        self.starting_side = side;
    }

    /// The starting position, when the game did not begin from the variant
    /// default.
    pub fn starting_fen(&self) -> Option<&str> {
        self.tag_value("FEN")
    }

    /// Records a non-default starting position (`FEN` plus `SetUp`), or
    /// clears both when `fen` is empty.
    pub fn set_starting_fen(&mut self, side: Side, fen: &str) {
        self.starting_side = side;
        if fen.is_empty() {
            self.tags.remove("FEN");
            self.tags.remove("SetUp");
        } else {
            self.set_tag("FEN", fen);
            self.set_tag("SetUp", "1");
        }
    }

    /// Reads the next game from the stream.
    ///
    /// Returns `None` when the stream holds no further game or the game is
    /// unreadable; parse problems are logged with their line number. At most
    /// `max_moves` moves are consumed — when the limit stops the read
    /// mid-game the termination marker is left unread and the game carries
    /// no `Result` tag.
    pub fn read_from<R: BufRead>(stream: &mut PgnStream<R>, max_moves: usize) -> Option<PgnGame> {
        if !stream.next_game() {
            return None;
        }

        let mut game = PgnGame::new();
        loop {
            match stream.read_token() {
                PgnToken::Tag(name, value) => {
                    game.tags.insert(name, value);
                }
                PgnToken::Move(token) => {
                    if !game.parse_move(stream, &token) {
                        return None;
                    }
                    if game.moves.len() >= max_moves {
                        break;
                    }
                }
                PgnToken::Comment(text) => {
                    if let Some(last) = game.moves.last_mut() {
                        last.comment.push_str(&text);
                    }
                }
                PgnToken::Result(marker) => {
                    if let Some(tag) = game.tags.get("Result") {
                        if !tag.is_empty() && *tag != marker {
                            warn!(
                                line = stream.line_number(),
                                "termination marker differs from the result tag"
                            );
                        }
                    }
                    game.tags.insert("Result".to_string(), marker);
                    break;
                }
                PgnToken::Nag(text) => match text.parse::<i64>() {
                    Ok(nag) if (0..=255).contains(&nag) => {}
                    _ => warn!(line = stream.line_number(), nag = %text, "invalid NAG"),
                },
                PgnToken::End => break,
            }
        }

        if game.tags.is_empty() {
            return None;
        }
        game.tags
            .insert("PlyCount".to_string(), game.moves.len().to_string());
        Some(game)
    }

    /// Translates and applies one movetext token. The first move resolves
    /// the variant and starting position.
    fn parse_move<R: BufRead>(&mut self, stream: &mut PgnStream<R>, token: &str) -> bool {
        if self.tags.is_empty() {
            warn!(line = stream.line_number(), "no tags found");
            return false;
        }

        if self.moves.is_empty() {
            if let Some(name) = self.tags.get("Variant").cloned() {
                if !name.is_empty() && !stream.set_variant(&name) {
                    warn!(line = stream.line_number(), variant = %name, "unknown variant");
                    return false;
                }
            }
            let fen = match self.tags.get("FEN") {
                Some(fen) => fen.clone(),
                None => stream.board().default_fen(),
            };
            if stream.board().set_fen(&fen).is_err() {
                warn!(line = stream.line_number(), fen = %fen, "invalid FEN string");
                return false;
            }
            self.starting_side = stream.board().starting_side();
        }

        let board = stream.board();
        let Some(mov) = board.move_from_san(token) else {
            warn!(line = stream.line_number(), san = %token, "illegal move");
            return false;
        };
        let data = MoveData {
            key: board.key(),
            mov,
            san: token.to_string(),
            comment: String::new(),
        };
        if board.make_move(&mov).is_err() {
            return false;
        }
        self.add_move(data);
        true
    }

    /// Writes the game: seven-tag roster, supplementary tags per mode, then
    /// movetext wrapped below 80 columns and terminated with a blank line.
    pub fn write<W: Write>(&self, out: &mut W, mode: PgnMode) -> io::Result<()> {
        if self.tags.is_empty() {
            return Ok(());
        }

        for name in TAG_ROSTER {
            write_tag(out, name, self.tag_value(name).unwrap_or(""))?;
        }
        match mode {
            PgnMode::Verbose => {
                for (name, value) in &self.tags {
                    if !TAG_ROSTER.contains(&name.as_str()) && !value.is_empty() {
                        write_tag(out, name, value)?;
                    }
                }
            }
            PgnMode::Minimal => {
                if let Some(fen) = self.tag_value("FEN") {
                    write_tag(out, "FEN", fen)?;
                    write_tag(out, "SetUp", self.tag_value("SetUp").unwrap_or(""))?;
                }
            }
        }

        let mut line_len = 0usize;
        let mut movenum = 0u32;
        let mut side = self.starting_side;
        for (i, data) in self.moves.iter().enumerate() {
            let mut token = String::new();
            if side == Side::White || i == 0 {
                movenum += 1;
                token.push_str(&movenum.to_string());
                token.push_str(". ");
            }
            token.push_str(&data.san);
            if mode == PgnMode::Verbose && !data.comment.is_empty() {
                token.push_str(" {");
                token.push_str(&data.comment);
                token.push('}');
            }

            if line_len == 0 || line_len + token.len() >= 80 {
                write!(out, "\n{token}")?;
                line_len = token.len();
            } else {
                write!(out, " {token}")?;
                line_len += token.len() + 1;
            }
            side = side.opposite();
        }

        let marker = self.tag_value("Result").unwrap_or("*");
        if line_len == 0 || line_len + marker.len() >= 80 {
            write!(out, "\n{marker}\n\n")?;
        } else {
            write!(out, " {marker}\n\n")?;
        }
        Ok(())
    }

    /// Appends the game to a file, creating it when missing.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P, mode: PgnMode) -> io::Result<()> {
        let mut file = OpenOptions::new().append(true).create(true).open(path)?;
        self.write(&mut file, mode)
    }
}

fn write_tag<W: Write>(out: &mut W, name: &str, value: &str) -> io::Result<()> {
    if value.is_empty() {
        writeln!(out, "[{name} \"?\"]")
    } else {
        writeln!(out, "[{name} \"{value}\"]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read_one(text: &str) -> Option<PgnGame> {
        let mut stream = PgnStream::new(Cursor::new(text.as_bytes().to_vec()));
        PgnGame::read_from(&mut stream, usize::MAX)
    }

    fn write_verbose(game: &PgnGame) -> String {
        let mut out = Vec::new();
        game.write(&mut out, PgnMode::Verbose).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn reads_tags_moves_and_result() {
        let game = read_one(
            "[Event \"Test\"]\n[White \"A\"]\n[Black \"B\"]\n\n1. e4 e5 2. Nf3 1-0\n",
        )
        .unwrap();
        assert_eq!(game.tag_value("Event"), Some("Test"));
        assert_eq!(game.tag_value("Result"), Some("1-0"));
        assert_eq!(game.tag_value("PlyCount"), Some("3"));
        assert_eq!(game.moves().len(), 3);
        assert_eq!(game.moves()[2].san, "Nf3");
        assert_eq!(game.moves()[2].mov, GenericMove::from_uci("g1f3").unwrap());
    }

    #[test]
    fn comments_attach_to_the_previous_move() {
        let game = read_one("[A \"1\"]\n\n1. e4 {best by test} e5 *\n").unwrap();
        assert_eq!(game.moves()[0].comment, "best by test");
        assert_eq!(game.moves()[1].comment, "");
    }

    #[test]
    fn illegal_movetext_fails_the_game() {
        assert!(read_one("[A \"1\"]\n\n1. e4 e4 1-0\n").is_none());
        assert!(read_one("[A \"1\"]\n\n1. Qq9 1-0\n").is_none());
    }

    #[test]
    fn game_without_tags_is_invalid() {
        assert!(read_one("1. e4 e5 1-0\n").is_none());
        assert!(read_one("").is_none());
    }

    #[test]
    fn fen_tag_sets_the_starting_position() {
        let game = read_one(
            "[A \"1\"]\n[FEN \"rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1\"]\n\
             \n1. e5 2. Nf3 *\n",
        )
        .unwrap();
        assert_eq!(game.starting_side(), Side::Black);
        assert_eq!(game.moves().len(), 2);
    }

    #[test]
    fn unknown_variant_fails_the_game() {
        assert!(read_one("[Variant \"atomic\"]\n\n1. e4 *\n").is_none());
    }

    #[test]
    fn max_moves_stops_mid_game_without_result() {
        let mut stream = PgnStream::new(Cursor::new(
            b"[A \"1\"]\n\n1. e4 e5 2. Nf3 Nc6 1-0\n".to_vec(),
        ));
        let game = PgnGame::read_from(&mut stream, 2).unwrap();
        assert_eq!(game.moves().len(), 2);
        assert_eq!(game.tag_value("Result"), None);
        assert_eq!(game.tag_value("PlyCount"), Some("2"));
    }

    #[test]
    fn roster_is_emitted_in_order_with_placeholders() {
        let mut game = PgnGame::new();
        game.set_event("Test");
        game.set_player_name(Side::White, "A");
        let text = write_verbose(&game);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "[Event \"Test\"]");
        assert_eq!(lines[1], "[Site \"?\"]");
        assert_eq!(lines[2], "[Date \"?\"]");
        assert_eq!(lines[3], "[Round \"?\"]");
        assert_eq!(lines[4], "[White \"A\"]");
        assert_eq!(lines[5], "[Black \"?\"]");
        assert_eq!(lines[6], "[Result \"?\"]");
    }

    #[test]
    fn supplementary_tags_follow_in_sorted_order() {
        let mut game = PgnGame::new();
        game.set_event("Test");
        game.set_tag("Zebra", "z");
        game.set_tag("Annotator", "a");
        let text = write_verbose(&game);
        let annotator = text.find("[Annotator").unwrap();
        let zebra = text.find("[Zebra").unwrap();
        assert!(annotator < zebra);
    }

    #[test]
    fn minimal_mode_drops_supplementary_tags() {
        let mut game = PgnGame::new();
        game.set_event("Test");
        game.set_tag("Annotator", "a");
        game.set_starting_fen(
            Side::White,
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
        );
        let mut out = Vec::new();
        game.write(&mut out, PgnMode::Minimal).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(!text.contains("[Annotator"));
        assert!(text.contains("[FEN"));
        assert!(text.contains("[SetUp \"1\"]"));
    }

    #[test]
    fn movetext_lines_stay_below_80_columns() {
        let game = read_one(concat!(
            "[A \"1\"]\n\n",
            "1. e4 e5 2. Nf3 Nc6 3. Bb5 a6 4. Ba4 Nf6 5. O-O Be7 6. Re1 b5 7. Bb3 d6 ",
            "8. c3 O-O 9. h3 Nb8 10. d4 Nbd7 11. Nbd2 Bb7 12. Bc2 Re8 13. Nf1 Bf8 ",
            "14. Ng3 g6 15. a4 c5 16. d5 c4 1/2-1/2\n",
        ))
        .unwrap();
        let text = write_verbose(&game);
        for line in text.lines() {
            assert!(line.len() < 80, "line too long: {line:?}");
        }
    }

    #[test]
    fn termination_marker_follows_the_movetext() {
        let mut game = read_one("[A \"1\"]\n\n1. e4 e5 0-1\n").unwrap();
        game.set_result(&GameResult::win(Side::Black, "mates"));
        let text = write_verbose(&game);
        assert!(text.ends_with("1. e4 e5 0-1\n\n"), "got: {text:?}");
    }

    #[test]
    fn write_then_read_preserves_roster_and_moves() {
        let mut game = PgnGame::new();
        game.set_event("Test");
        game.set_site("Lab");
        game.set_player_name(Side::White, "A");
        game.set_player_name(Side::Black, "B");

        let mut board = Variant::standard().create_board().unwrap();
        for san in ["e4", "e5", "Nf3"] {
            let mov = board.move_from_san(san).unwrap();
            game.add_move(MoveData {
                key: board.key(),
                mov,
                san: san.to_string(),
                comment: String::new(),
            });
            board.make_move(&mov).unwrap();
        }
        game.set_result(&GameResult::win(Side::White, "adjudged"));

        let text = write_verbose(&game);
        let reread = read_one(&text).unwrap();
        assert_eq!(reread.tag_value("Event"), Some("Test"));
        assert_eq!(reread.tag_value("Site"), Some("Lab"));
        assert_eq!(reread.tag_value("White"), Some("A"));
        assert_eq!(reread.tag_value("Black"), Some("B"));
        assert_eq!(reread.tag_value("Result"), Some("1-0"));
        assert_eq!(reread.tag_value("PlyCount"), Some("3"));
        let sans: Vec<&str> = reread.moves().iter().map(|m| m.san.as_str()).collect();
        assert_eq!(sans, ["e4", "e5", "Nf3"]);
    }

    #[test]
    fn file_writes_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("games.pgn");

        let mut game = PgnGame::new();
        game.set_event("One");
        game.write_to_file(&path, PgnMode::Verbose).unwrap();
        game.set_event("Two");
        game.write_to_file(&path, PgnMode::Verbose).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("[Event \"One\"]"));
        assert!(text.contains("[Event \"Two\"]"));
    }
}

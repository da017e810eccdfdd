//! Polyglot opening book reading.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use chess_board::shakmaty::{File as BoardFile, Rank, Role, Square};
use chess_board::GenericMove;
use rand::Rng;

/// One 16-byte book record.
#[derive(Debug, Clone, Copy)]
struct BookEntry {
    key: u64,
    mov: u16,
    weight: u16,
}

/// A read-only Polyglot opening book.
///
/// The on-disk format is a flat array of big-endian records
/// `(key: u64, move: u16, weight: u16, learn: u32)` sorted by key. Probing
/// picks among the entries for a position key with weight-proportional
/// randomness, so repeated matches explore the book instead of replaying one
/// line.
pub struct PolyglotBook {
    entries: Vec<BookEntry>,
}

impl PolyglotBook {
    /// Decodes a book from any byte stream. A trailing partial record is
    /// ignored.
    pub fn read_from<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut entries = Vec::new();
        let mut record = [0u8; 16];
        loop {
            match read_record(&mut reader, &mut record) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => return Err(e),
            }
            entries.push(BookEntry {
                key: u64::from_be_bytes(record[0..8].try_into().unwrap()),
                mov: u16::from_be_bytes(record[8..10].try_into().unwrap()),
                weight: u16::from_be_bytes(record[10..12].try_into().unwrap()),
            });
        }
        // Books are conventionally sorted; make sure of it so probing can
        // binary search.
        entries.sort_by_key(|e| e.key);
        Ok(Self { entries })
    }

    /// Opens and decodes a book file.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::read_from(BufReader::new(File::open(path)?))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Draws a move for the position with the given key, weighted by the
    /// book's move weights. Returns `None` for positions out of book.
    pub fn probe(&self, key: u64) -> Option<GenericMove> {
        let start = self.entries.partition_point(|e| e.key < key);
        let matches = self.entries[start..]
            .iter()
            .take_while(|e| e.key == key)
            .collect::<Vec<_>>();
        if matches.is_empty() {
            return None;
        }

        let mut rng = rand::thread_rng();
        let total: u32 = matches.iter().map(|e| u32::from(e.weight)).sum();
        let picked = if total == 0 {
            matches[rng.gen_range(0..matches.len())]
        } else {
            let mut roll = rng.gen_range(0..total);
            let mut picked = matches[0];
            for entry in &matches {
                let weight = u32::from(entry.weight);
                if roll < weight {
                    picked = entry;
                    break;
                }
                roll -= weight;
            }
            picked
        };
        Some(decode_move(picked.mov))
    }
}

fn read_record<R: Read>(reader: &mut R, record: &mut [u8; 16]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < record.len() {
        match reader.read(&mut record[filled..]) {
            // EOF: either a clean end or a truncated trailing record.
            Ok(0) => return Ok(false),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

/// Decodes the packed Polyglot move field.
///
/// Bits 0-2 are the target file, 3-5 the target rank, 6-8 the source file,
/// 9-11 the source rank and 12-14 the promotion piece. Castling arrives in
/// king-takes-rook form (`e1h1`), which the board layer accepts directly.
fn decode_move(raw: u16) -> GenericMove {
    let to_file = u32::from(raw) & 7;
    let to_rank = (u32::from(raw) >> 3) & 7;
    let from_file = (u32::from(raw) >> 6) & 7;
    let from_rank = (u32::from(raw) >> 9) & 7;
    let promotion = match (raw >> 12) & 7 {
        1 => Some(Role::Knight),
        2 => Some(Role::Bishop),
        3 => Some(Role::Rook),
        4 => Some(Role::Queen),
        _ => None,
    };
    GenericMove {
        from: Square::from_coords(BoardFile::new(from_file), Rank::new(from_rank)),
        to: Square::from_coords(BoardFile::new(to_file), Rank::new(to_rank)),
        promotion,
    }
}

//! Loads a fixed set of starting positions once, optionally shuffles them deterministically,
//! then hands them out by index. EPD loading is grounded on `original_source/app/src/epd/
//! epd_builder.hpp` and the six-token heuristic spec.md §9 flags as a best-effort EPD/FEN
//! discriminator. PGN loading hand-parses headers and SAN movetext through the `shakmaty`
//! rules capability directly (no separate PGN crate: the movetext grammar needed here is a
//! small, fixed subset — headers plus a SAN token stream — and reusing `shakmaty::san::San`
//! for move application keeps the dependency surface the same as the rest of this crate).
//! The seeded shuffle uses `rand::SeedableRng` (`StdRng::seed_from_u64`), the same way
//! `monitors` already depends on `rand` for its own randomness, swapped for a seeded,
//! deterministic source per spec.md §8's "Opening determinism" property.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{BookFormat, BookOrder, OpeningBookOptions};
use crate::error::Res;
use crate::rules::{Board, Stm, STANDARD_STARTPOS_FEN};

/// A starting position plus the prefix of moves already played from it (spec.md §3).
#[derive(Debug, Clone)]
pub struct Opening {
    pub fen: String,
    pub moves: Vec<String>,
    pub stm: Stm,
}

/// Whether a book line looked like a full EPD record or a bare FEN/PGN-derived position.
/// Exposed for testability per spec.md §9's Open Question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClassification {
    Epd,
    Fen,
}

/// Best-effort heuristic from spec.md §6: exactly six space-separated fields and no `;` means
/// plain FEN; anything else containing no `;` is treated as EPD regardless of field count.
pub fn classify_line(line: &str) -> LineClassification {
    let fields = line.split_whitespace().count();
    if fields == 6 && !line.contains(';') {
        LineClassification::Fen
    } else {
        LineClassification::Epd
    }
}

pub struct OpeningBook {
    entries: Vec<Opening>,
    start: u64,
    next_id: AtomicU64,
}

impl OpeningBook {
    pub fn load(opts: &OpeningBookOptions) -> Res<Self> {
        let entries = match opts.format {
            BookFormat::Epd => load_epd(&opts.file)?,
            BookFormat::Pgn => load_pgn(&opts.file)?,
        };
        let mut entries = entries;
        if opts.order == BookOrder::Random {
            shuffle_fisher_yates(&mut entries, seed_for(opts));
        }
        Ok(Self { entries, start: opts.start, next_id: AtomicU64::new(0) })
    }

    /// `fetch(opening_id)` returns the entry at index `(start + opening_id) mod len`.
    pub fn fetch(&self, opening_id: u64) -> &Opening {
        let len = self.entries.len() as u64;
        let idx = (self.start + opening_id) % len;
        &self.entries[idx as usize]
    }

    /// Atomically returns and post-increments the opening-id counter, starting from
    /// `initial_matchcount` so reruns after interruption line up with the prior sequence.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds a book directly from in-memory entries, bypassing file I/O. Used by other
    /// modules' tests that need a `TournamentState` without a book file on disk.
    #[cfg(test)]
    pub fn from_entries(entries: Vec<Opening>) -> Self {
        Self { entries, start: 0, next_id: AtomicU64::new(0) }
    }
}

/// The tournament's 64-bit seed is used directly: the book has no independent seed of its own.
fn seed_for(opts: &OpeningBookOptions) -> u64 {
    opts.seed
}

fn shuffle_fisher_yates(entries: &mut [Opening], seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    for i in (1..entries.len()).rev() {
        let j = rng.gen_range(0..=i);
        entries.swap(i, j);
    }
}

fn load_epd(path: &Path) -> Res<Vec<Opening>> {
    let content = fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for raw in content.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let fen = match classify_line(line) {
            LineClassification::Fen => line.to_string(),
            LineClassification::Epd => {
                // An EPD record's first four fields are the board/stm/castling/ep part of a
                // FEN; append placeholder halfmove/fullmove counters to make it FEN-parseable.
                let fields: Vec<&str> = line.split_whitespace().take(4).collect();
                format!("{} 0 1", fields.join(" "))
            }
        };
        let stm = if fen.split_whitespace().nth(1) == Some("b") { Stm::Black } else { Stm::White };
        entries.push(Opening { fen, moves: Vec::new(), stm });
    }
    Ok(entries)
}

/// A minimal PGN reader: `[Tag "value"]` headers, then a SAN movetext stream terminated by a
/// result token or blank line, one game per entry.
fn load_pgn(path: &Path) -> Res<Vec<Opening>> {
    let content = fs::read_to_string(path)?;
    let mut entries = Vec::new();
    let mut fen: Option<String> = None;
    let mut movetext = String::new();
    let mut in_game = false;

    let flush = |fen: &mut Option<String>, movetext: &mut String, entries: &mut Vec<Opening>| {
        if !movetext.trim().is_empty() {
            let start_fen = fen.clone().unwrap_or_else(|| STANDARD_STARTPOS_FEN.to_string());
            if let Some(opening) = parse_movetext(&start_fen, movetext) {
                entries.push(opening);
            }
        }
        *fen = None;
        movetext.clear();
    };

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            if in_game {
                flush(&mut fen, &mut movetext, &mut entries);
                in_game = false;
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix('[') {
            in_game = true;
            if let Some(rest) = rest.strip_prefix("FEN \"") {
                if let Some(end) = rest.find('"') {
                    fen = Some(rest[..end].to_string());
                }
            }
            continue;
        }
        in_game = true;
        movetext.push(' ');
        movetext.push_str(line);
    }
    flush(&mut fen, &mut movetext, &mut entries);
    Ok(entries)
}

fn parse_movetext(start_fen: &str, movetext: &str) -> Option<Opening> {
    let mut board = Board::from_fen(start_fen).ok()?;
    let mut moves = Vec::new();
    for token in movetext.split_whitespace() {
        // Strip move numbers ("12.", "12...") and result tags.
        if token.ends_with('.') || matches!(token, "1-0" | "0-1" | "1/2-1/2" | "*") {
            continue;
        }
        let token = token.trim_start_matches(|c: char| c.is_ascii_digit() || c == '.');
        if token.is_empty() {
            continue;
        }
        let Some(uci) = board.san_to_uci(token) else { continue };
        board.push_uci_unchecked(&uci).ok()?;
        moves.push(uci);
    }
    Some(Opening { fen: start_fen.to_string(), moves, stm: board.stm() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_six_token_line_without_semicolon_as_fen() {
        assert_eq!(
            classify_line("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"),
            LineClassification::Fen
        );
    }

    #[test]
    fn classifies_epd_with_operations_as_epd() {
        assert_eq!(
            classify_line("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq -  id \"start\";"),
            LineClassification::Epd
        );
    }

    #[test]
    fn fisher_yates_shuffle_is_deterministic_given_a_seed() {
        let mut a: Vec<Opening> =
            (0..10).map(|i| Opening { fen: i.to_string(), moves: vec![], stm: Stm::White }).collect();
        let mut b = a.clone();
        shuffle_fisher_yates(&mut a, 42);
        shuffle_fisher_yates(&mut b, 42);
        let fens_a: Vec<_> = a.iter().map(|o| o.fen.clone()).collect();
        let fens_b: Vec<_> = b.iter().map(|o| o.fen.clone()).collect();
        assert_eq!(fens_a, fens_b);
    }

    #[test]
    fn sequential_fetch_wraps_at_book_length() {
        let opts = OpeningBookOptions {
            file: Path::new("/dev/null").to_path_buf(),
            format: BookFormat::Epd,
            order: BookOrder::Sequential,
            start: 3256,
            seed: 0,
        };
        let entries: Vec<Opening> =
            (0..10).map(|i| Opening { fen: i.to_string(), moves: vec![], stm: Stm::White }).collect();
        let book = OpeningBook { entries, start: opts.start, next_id: AtomicU64::new(0) };
        for i in 0u64..9 {
            let opening = book.fetch(book.next_id());
            assert_eq!(opening.fen, ((3256 + i) % 10).to_string());
        }
    }
}

//! Append-only PGN writer and periodic JSON stats snapshot. PGN formatting is grounded on
//! `original_source/src/pgn_builder.hpp` (`PgnBuilder::getPGN`, one append per finished game);
//! the JSON snapshot format follows the same `serde`/`serde_json` idiom `pliers` (the teacher's
//! sibling SPSA tuner) already uses for its own working-data persistence.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Res;
use crate::match_runner::GameRecord;
use crate::stats::Stats;

/// How many times a persistence write is retried before the policy escalates to a fatal abort
/// (spec.md §7's `IoError` clause).
pub const IO_RETRY_COUNT: u32 = 3;

pub struct PgnWriter {
    path: PathBuf,
}

impl PgnWriter {
    pub fn create(path: &Path) -> Self {
        Self { path: path.to_path_buf() }
    }

    /// Appends one game in PGN form with bounded retry, per the `IoError` policy.
    pub fn append(&mut self, record: &GameRecord, white: &str, black: &str) -> Res<()> {
        let pgn = format_pgn(record, white, black);
        with_retry(IO_RETRY_COUNT, || {
            let mut f = OpenOptions::new().create(true).append(true).open(&self.path)?;
            f.write_all(pgn.as_bytes())?;
            Ok(())
        })
    }
}

fn format_pgn(record: &GameRecord, white: &str, black: &str) -> String {
    let mut out = String::new();
    let result_tag = match (record.white_result, record.black_result) {
        (crate::match_runner::PlayerOutcome::Win, _) => "1-0",
        (_, crate::match_runner::PlayerOutcome::Win) => "0-1",
        (crate::match_runner::PlayerOutcome::Draw, _) => "1/2-1/2",
        _ => "*",
    };
    out.push_str(&format!("[Event \"Tournament\"]\n"));
    out.push_str(&format!("[Round \"{}\"]\n", record.round_id));
    out.push_str(&format!("[White \"{white}\"]\n"));
    out.push_str(&format!("[Black \"{black}\"]\n"));
    out.push_str(&format!("[Result \"{result_tag}\"]\n"));
    out.push_str(&format!("[FEN \"{}\"]\n", record.fen));
    out.push_str(&format!("[Termination \"{}\"]\n", record.termination_reason));
    out.push('\n');
    let mut ply = 1u32;
    for mv in &record.moves {
        if ply % 2 == 1 {
            out.push_str(&format!("{}. ", ply.div_ceil(2)));
        }
        out.push_str(&mv.san);
        out.push(' ');
        ply += 1;
    }
    out.push_str(result_tag);
    out.push_str("\n\n");
    out
}

fn with_retry<F: FnMut() -> Res<()>>(retries: u32, mut f: F) -> Res<()> {
    let mut last_err = None;
    for _ in 0..retries {
        match f() {
            Ok(()) => return Ok(()),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("persistence write failed with no error recorded")))
}

/// Flattened, JSON-friendly form of a `StatsMap` snapshot: composite tuple keys don't serialize
/// to JSON object keys directly, so each pair becomes one record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairStatsRecord {
    pub engine_a: String,
    pub engine_b: String,
    pub stats: Stats,
}

pub fn save_snapshot(snapshot: &HashMap<(String, String), Stats>) -> Res<()> {
    let records: Vec<PairStatsRecord> = snapshot
        .iter()
        .map(|((a, b), stats)| PairStatsRecord { engine_a: a.clone(), engine_b: b.clone(), stats: *stats })
        .collect();
    with_retry(IO_RETRY_COUNT, || {
        let f = OpenOptions::new().create(true).write(true).truncate(true).open("tourney_stats.json")?;
        serde_json::to_writer_pretty(f, &records)?;
        Ok(())
    })
}

pub fn load_snapshot(path: &Path) -> Res<HashMap<(String, String), Stats>> {
    let content = std::fs::read_to_string(path)?;
    let records: Vec<PairStatsRecord> = serde_json::from_str(&content)?;
    Ok(records.into_iter().map(|r| ((r.engine_a, r.engine_b), r.stats)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::match_runner::{MoveRecord, PlayerOutcome};

    fn sample_record() -> GameRecord {
        GameRecord {
            round_id: 1,
            game_id: 2,
            fen: crate::rules::STANDARD_STARTPOS_FEN.to_string(),
            moves: vec![MoveRecord {
                uci: "e2e4".to_string(),
                san: "e4".to_string(),
                legal: true,
                score: None,
                depth: None,
                seldepth: None,
                nodes: None,
                elapsed_ms: 10,
            }],
            white_name: "A".to_string(),
            black_name: "B".to_string(),
            white_result: PlayerOutcome::Win,
            black_result: PlayerOutcome::Loss,
            termination_reason: "checkmate".to_string(),
            start_time_ms: 0,
            end_time_ms: 1,
            needs_restart: false,
        }
    }

    #[test]
    fn pgn_includes_result_and_moves() {
        let record = sample_record();
        let pgn = format_pgn(&record, "A", "B");
        assert!(pgn.contains("[White \"A\"]"));
        assert!(pgn.contains("1-0"));
        assert!(pgn.contains("e4"));
        assert!(!pgn.contains("e2e4"));
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut map = HashMap::new();
        map.insert(("a".to_string(), "b".to_string()), Stats { wins: 3, ..Default::default() });
        let records: Vec<PairStatsRecord> = map
            .iter()
            .map(|((a, b), stats)| PairStatsRecord { engine_a: a.clone(), engine_b: b.clone(), stats: *stats })
            .collect();
        let json = serde_json::to_string(&records).unwrap();
        let back: Vec<PairStatsRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(back[0].stats.wins, 3);
    }
}

//! Stateful UCI protocol wrapper over a [`ProcessPipe`]. The `go`-command construction follows
//! both `monitors::play::player::limit_to_ugi` (wtime/btime/winc/binc/nodes/depth/movetime
//! assembly) and `original_source`'s `UciEngine::buildGoInput`/`Player::buildGoInput` — same
//! field priority: nodes, then depth, then fixed-time/movetime, else clock-based.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::config::{EngineConfiguration, Limits, TimeControl};
use crate::error::{Res, TerminationReason};
use crate::process_pipe::{default_stderr_path, ProcessPipe};
use crate::rules::{Board, Stm};

/// 60 seconds, the handshake/`isready` timeout used throughout the original (`ping_time_`).
pub const PING_TIME_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    NotStarted,
    Ready,
    Searching,
    Broken,
    Exited,
}

/// Tagged score as reported by the most recent `info` line: either centipawns or a mate count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Cp(i32),
    Mate(i32),
}

/// Parsed fields of the most recent `info` line. Recorded, not authoritative: a missing field
/// just stays `None`.
#[derive(Debug, Clone, Default)]
pub struct InfoLine {
    pub depth: Option<u32>,
    pub seldepth: Option<u32>,
    pub score: Option<Score>,
    pub nodes: Option<u64>,
}

fn parse_info(line: &str) -> InfoLine {
    let mut info = InfoLine::default();
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let mut i = 0;
    while i < tokens.len() {
        match tokens[i] {
            "depth" => {
                info.depth = tokens.get(i + 1).and_then(|v| v.parse().ok());
                i += 2;
            }
            "seldepth" => {
                info.seldepth = tokens.get(i + 1).and_then(|v| v.parse().ok());
                i += 2;
            }
            "nodes" => {
                info.nodes = tokens.get(i + 1).and_then(|v| v.parse().ok());
                i += 2;
            }
            "score" => {
                let kind = tokens.get(i + 1).copied();
                let value = tokens.get(i + 2).and_then(|v| v.parse::<i32>().ok());
                if let (Some(kind), Some(value)) = (kind, value) {
                    info.score = match kind {
                        "cp" => Some(Score::Cp(value)),
                        "mate" => Some(Score::Mate(value)),
                        _ => None,
                    };
                }
                i += 3;
            }
            _ => i += 1,
        }
    }
    info
}

pub struct UciEngine {
    name: String,
    pipe: ProcessPipe,
    limits: Limits,
    options: Vec<(String, String)>,
    state: EngineState,
    last_info: InfoLine,
    last_bestmove: Option<String>,
}

impl UciEngine {
    pub fn new(config: &EngineConfiguration, grace: Duration) -> Res<Self> {
        let stderr_path = default_stderr_path(&config.name);
        let pipe = ProcessPipe::start(
            &config.command,
            &config.args,
            config.working_dir.as_deref(),
            &stderr_path,
            grace,
        )?;
        Ok(Self {
            name: config.name.clone(),
            pipe,
            limits: config.limits,
            options: config.options.clone(),
            state: EngineState::NotStarted,
            last_info: InfoLine::default(),
            last_bestmove: None,
        })
    }

    #[cfg(test)]
    pub fn from_parts(config: EngineConfiguration, pipe: ProcessPipe) -> Self {
        Self {
            name: config.name,
            pipe,
            limits: config.limits,
            options: config.options,
            state: EngineState::NotStarted,
            last_info: InfoLine::default(),
            last_bestmove: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_alive(&mut self) -> bool {
        self.pipe.is_alive()
    }

    /// Handshake: `uci` -> `uciok`, `setoption`s in configured order, then `isready` -> `readyok`.
    /// Transitions to `Broken` and returns `HandshakeError`-tagged failure on any timeout.
    pub fn start(&mut self) -> Result<(), TerminationReason> {
        self.state = EngineState::NotStarted;
        if self.pipe.write("uci").is_err() {
            self.state = EngineState::Broken;
            return Err(TerminationReason::EngineStartFailed);
        }
        let result = self.pipe.read_until("uciok", PING_TIME_MS);
        if result.timed_out {
            self.state = EngineState::Broken;
            return Err(TerminationReason::Handshake);
        }
        // option advertisements are recorded but non-authoritative (spec.md §4.2); nothing to
        // capture beyond what the engine already told us it supports.
        for (name, value) in &self.options.clone() {
            if self.pipe.write(&format!("setoption name {name} value {value}")).is_err() {
                self.state = EngineState::Broken;
                return Err(TerminationReason::Handshake);
            }
        }
        if !self.is_responsive(PING_TIME_MS) {
            self.state = EngineState::Broken;
            return Err(TerminationReason::Handshake);
        }
        self.state = EngineState::Ready;
        Ok(())
    }

    /// `ucinewgame` followed by an `isready`/`readyok` probe, per spec.md §4.2.
    pub fn new_game(&mut self) -> bool {
        if self.pipe.write("ucinewgame").is_err() {
            self.state = EngineState::Broken;
            return false;
        }
        self.is_responsive(PING_TIME_MS)
    }

    /// `isready` -> `readyok` within `threshold_ms`. Used both by the handshake and as the
    /// per-move responsiveness probe (spec.md §4.5 step 3).
    pub fn is_responsive(&mut self, threshold_ms: u64) -> bool {
        if self.pipe.write("isready").is_err() {
            self.state = EngineState::Broken;
            return false;
        }
        let result = self.pipe.read_until("readyok", threshold_ms);
        if result.timed_out {
            self.state = EngineState::Broken;
            return false;
        }
        true
    }

    /// `position startpos [moves ...]` | `position fen <fen> [moves ...]`.
    pub fn set_position(&mut self, start_fen: &str, moves: &[String]) -> Res<()> {
        let mut cmd = if Board::is_standard_startpos(start_fen) {
            "position startpos".to_string()
        } else {
            format!("position fen {start_fen}")
        };
        if !moves.is_empty() {
            write!(cmd, " moves {}", moves.join(" "))?;
        }
        self.pipe.write(&cmd)
    }

    /// Builds and sends `go ...` per the priority order: nodes, then depth, then fixed time,
    /// else clock-based (own/opponent remaining + increment + movestogo). `opponent_tc` is the
    /// other side's own time control, needed because the two engines may run different
    /// increments/periods (`original_source/src/matchmaking/player.hpp::buildGoInput`).
    pub fn go(
        &mut self,
        stm: Stm,
        opponent_tc: TimeControl,
        own_remaining_ms: u64,
        opp_remaining_ms: u64,
    ) -> Res<u64> {
        let mut cmd = "go".to_string();
        let read_timeout_ms;
        if self.limits.nodes > 0 {
            write!(cmd, " nodes {}", self.limits.nodes)?;
            read_timeout_ms = 0;
        } else if self.limits.depth > 0 {
            write!(cmd, " depth {}", self.limits.depth)?;
            read_timeout_ms = 0;
        } else if self.limits.fixed_time_ms > 0 {
            write!(cmd, " movetime {}", self.limits.fixed_time_ms)?;
            read_timeout_ms = 0;
        } else {
            let own_tc = self.limits.tc;
            let (w, b) = match stm {
                Stm::White => (own_remaining_ms, opp_remaining_ms),
                Stm::Black => (opp_remaining_ms, own_remaining_ms),
            };
            write!(cmd, " wtime {w} btime {b}")?;
            let (white_tc, black_tc) = match stm {
                Stm::White => (own_tc, opponent_tc),
                Stm::Black => (opponent_tc, own_tc),
            };
            if white_tc.increment_ms > 0 || black_tc.increment_ms > 0 {
                write!(cmd, " winc {} binc {}", white_tc.increment_ms, black_tc.increment_ms)?;
            }
            if own_tc.moves > 0 {
                write!(cmd, " movestogo {}", own_tc.moves)?;
            }
            read_timeout_ms = own_remaining_ms + own_tc.timemargin_ms.max(100);
        }
        self.pipe.write(&cmd)?;
        self.state = EngineState::Searching;
        Ok(read_timeout_ms)
    }

    /// Reads until `bestmove`, per the timeout computed by [`Self::go`]. Populates `last_info`
    /// from the most recent `info` line seen along the way.
    pub fn read_bestmove(&mut self, timeout_ms: u64) -> Result<String, TerminationReason> {
        let result = self.pipe.read_until("bestmove", timeout_ms);
        for line in &result.lines {
            if line.starts_with("info") {
                self.last_info = parse_info(line);
            }
        }
        if result.timed_out {
            self.state = EngineState::Broken;
            return Err(TerminationReason::Timeout);
        }
        let bestmove_line = result.lines.iter().rev().find(|l| l.starts_with("bestmove"));
        let Some(line) = bestmove_line else {
            self.state = EngineState::Broken;
            return Err(TerminationReason::Protocol);
        };
        let token = line.split_whitespace().nth(1);
        let Some(token) = token else {
            self.state = EngineState::Broken;
            return Err(TerminationReason::Protocol);
        };
        self.state = EngineState::Ready;
        self.last_bestmove = Some(token.to_string());
        Ok(token.to_string())
    }

    pub fn last_info(&self) -> &InfoLine {
        &self.last_info
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Best-effort `quit`, then tears down the underlying pipe.
    pub fn quit(&mut self) {
        let _ = self.pipe.write("quit");
        self.pipe.terminate();
        self.state = EngineState::Exited;
    }

    pub fn path(&self) -> PathBuf {
        Path::new(&self.name).to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_info_line_with_cp_score() {
        let info = parse_info("info depth 12 seldepth 18 score cp 34 nodes 98765 nps 500000");
        assert_eq!(info.depth, Some(12));
        assert_eq!(info.seldepth, Some(18));
        assert_eq!(info.score, Some(Score::Cp(34)));
        assert_eq!(info.nodes, Some(98765));
    }

    #[test]
    fn parses_info_line_with_mate_score() {
        let info = parse_info("info depth 5 score mate 3");
        assert_eq!(info.score, Some(Score::Mate(3)));
    }
}

//! Pairs a [`UciEngine`] with its mutable per-game clock. `update_time` mirrors both
//! `original_source/src/matchmaking/player.hpp::updateTime` and
//! `monitors::play::player::Player::update_clock_and_check_for_time_loss` +
//! `TimeControl::update`: subtract elapsed, compare against the margin, clamp then add the
//! increment, roll over `movestogo`.

use crate::config::{EngineConfiguration, TimeControl};
use crate::rules::Stm;
use crate::uci_engine::UciEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    Win,
    Loss,
    Draw,
    None,
}

pub struct Player {
    pub engine: UciEngine,
    pub config: EngineConfiguration,
    pub color: Stm,
    pub result: GameResult,
    /// Signed so the margin check (step 2 below) can see a true negative deficit before the
    /// value gets clamped back to zero in step 3.
    time_left_ms: i64,
    /// Moves played since the last time-control period reset, used when `tc.moves > 0`.
    moves_since_period: u32,
}

impl Player {
    pub fn new(engine: UciEngine, config: EngineConfiguration, color: Stm) -> Self {
        let tc = config.limits.tc;
        let time_left_ms = if tc.fixed_time_ms != 0 { tc.fixed_time_ms } else { tc.time_ms } as i64;
        Self { engine, config, color, result: GameResult::None, time_left_ms, moves_since_period: 0 }
    }

    fn tc(&self) -> TimeControl {
        self.config.limits.tc
    }

    pub fn time_left_ms(&self) -> u64 {
        self.time_left_ms.max(0) as u64
    }

    /// `false` means the player lost on time; the caller records the `Timeout` termination
    /// reason. No-op (always `true`) for node/depth/fixed-time limits, which don't track a
    /// clock (spec.md §4.3).
    pub fn update_time(&mut self, elapsed_ms: u64) -> bool {
        let tc = self.tc();
        if tc.time_ms == 0 {
            return true;
        }

        // 1. subtract elapsed
        self.time_left_ms -= elapsed_ms as i64;

        // 2. compare against the margin before any clamping
        if self.time_left_ms < -(tc.timemargin_ms as i64) {
            return false;
        }

        // 3. clamp to zero from below, then add the increment
        self.time_left_ms = self.time_left_ms.max(0);
        self.time_left_ms += tc.increment_ms as i64;

        // 4. roll over the control period
        if tc.moves > 0 {
            self.moves_since_period += 1;
            if self.moves_since_period >= tc.moves {
                self.time_left_ms += tc.time_ms as i64;
                self.moves_since_period = 0;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfiguration, Limits};
    use crate::process_pipe::ProcessPipe;
    use std::path::PathBuf;
    use std::time::Duration;

    fn dummy_player(tc: TimeControl) -> Player {
        let config = EngineConfiguration {
            name: "dummy".to_string(),
            command: PathBuf::from("/bin/true"),
            args: vec![],
            working_dir: None,
            options: vec![],
            limits: Limits { nodes: 0, depth: 0, fixed_time_ms: 0, tc },
            recover: false,
        };
        // UciEngine::new spawns a real process; build one against /bin/true directly via the
        // same path ProcessPipe uses, since we only need a Player to exercise `update_time`.
        let pipe = ProcessPipe::start(&config.command, &config.args, None, PathBuf::from("/tmp/_t.log").as_path(), Duration::from_millis(10))
            .expect("spawn /bin/true");
        let engine = UciEngine::from_parts(config.clone(), pipe);
        Player::new(engine, config, Stm::White)
    }

    #[test]
    fn time_left_never_exceeds_tc_plus_k_increments() {
        let tc = TimeControl { moves: 0, time_ms: 60_000, increment_ms: 1000, timemargin_ms: 100, fixed_time_ms: 0 };
        let mut player = dummy_player(tc);
        for k in 1..=5u64 {
            assert!(player.update_time(500));
            assert!(player.time_left_ms() <= tc.time_ms + k * tc.increment_ms);
        }
    }

    #[test]
    fn exceeding_margin_reports_timeout() {
        let tc = TimeControl { moves: 0, time_ms: 1000, increment_ms: 0, timemargin_ms: 50, fixed_time_ms: 0 };
        let mut player = dummy_player(tc);
        assert!(!player.update_time(2000));
    }
}

//! Draw and resign adjudication trackers. Grounded on
//! `monitors::play::adjudication::Adjudicator` (independent resign/draw counters, reset-to-zero
//! on break) and `original_source/src/matchmaking/match.cpp`'s
//! `updateDrawTracker`/`updateResignTracker`/`adjudicate`, specialized to spec.md §4.5's exact
//! field names (`draw.move_number`/`draw.move_count`/`draw.score`,
//! `resign.move_count`/`resign.score`).

use crate::config::{DrawAdjudicationOptions, ResignAdjudicationOptions};
use crate::rules::Stm;
use crate::uci_engine::Score;

#[derive(Debug, Default)]
pub struct DrawTracker {
    opts: DrawAdjudicationOptions,
    draw_plies: usize,
}

impl DrawTracker {
    pub fn new(opts: DrawAdjudicationOptions) -> Self {
        Self { opts, draw_plies: 0 }
    }

    /// Called once per ply with the mover's reported score. Returns `true` once adjudication
    /// fires (`draw_plies >= draw.move_count`).
    pub fn update(&mut self, ply: usize, score: Option<Score>) -> bool {
        if !self.opts.enabled {
            return false;
        }
        let qualifies = ply >= self.opts.move_number
            && matches!(score, Some(Score::Cp(cp)) if cp.abs() <= self.opts.score_cp);
        if qualifies {
            self.draw_plies += 1;
        } else {
            self.draw_plies = 0;
        }
        self.draw_plies >= self.opts.move_count
    }
}

#[derive(Debug, Default)]
pub struct ResignTracker {
    opts: ResignAdjudicationOptions,
    resign_plies: usize,
    /// Which side's last qualifying score was negative — that side is the one who resigns.
    losing_side: Option<Stm>,
}

impl ResignTracker {
    pub fn new(opts: ResignAdjudicationOptions) -> Self {
        Self { opts, resign_plies: 0, losing_side: None }
    }

    /// `mover` is whoever just moved and reported `score` from their own point of view.
    /// Returns `Some(loser)` once `resign_plies >= resign.move_count`.
    pub fn update(&mut self, mover: Stm, score: Option<Score>) -> Option<Stm> {
        if !self.opts.enabled {
            return None;
        }
        let Some(Score::Cp(cp)) = score else {
            self.resign_plies = 0;
            self.losing_side = None;
            return None;
        };
        if cp.abs() >= self.opts.score_cp {
            let side_losing = if cp < 0 { mover } else { mover.other() };
            if self.losing_side == Some(side_losing) {
                self.resign_plies += 1;
            } else {
                self.resign_plies = 1;
                self.losing_side = Some(side_losing);
            }
        } else {
            self.resign_plies = 0;
            self.losing_side = None;
        }
        if self.resign_plies >= self.opts.move_count {
            self.losing_side
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_adjudicates_after_sustained_low_score() {
        let mut tracker = DrawTracker::new(DrawAdjudicationOptions {
            enabled: true,
            move_number: 40,
            move_count: 8,
            score_cp: 10,
        });
        let mut fired = false;
        for ply in 1..=48 {
            fired = tracker.update(ply, Some(Score::Cp(5)));
        }
        assert!(fired);
    }

    #[test]
    fn resign_adjudicates_losing_side_after_sustained_deficit() {
        let mut tracker = ResignTracker::new(ResignAdjudicationOptions {
            enabled: true,
            move_count: 3,
            score_cp: 600,
        });
        assert!(tracker.update(Stm::White, Some(Score::Cp(-800))).is_none());
        assert!(tracker.update(Stm::White, Some(Score::Cp(-800))).is_none());
        assert_eq!(tracker.update(Stm::White, Some(Score::Cp(-800))), Some(Stm::White));
    }

    #[test]
    fn resign_counter_resets_on_non_qualifying_score() {
        let mut tracker = ResignTracker::new(ResignAdjudicationOptions {
            enabled: true,
            move_count: 3,
            score_cp: 600,
        });
        assert!(tracker.update(Stm::White, Some(Score::Cp(-800))).is_none());
        assert!(tracker.update(Stm::White, Some(Score::Cp(10))).is_none());
        assert!(tracker.update(Stm::White, Some(Score::Cp(-800))).is_none());
    }
}

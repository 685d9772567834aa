//! Per-engine-pair result accounting: trinomial (wins/losses/draws) and pentanomial
//! (paired-game) counts, canonicalized by lexicographic engine-name order with involutive
//! negation used when folding a (B,A) completion into the canonical (A,B) entry.

use std::collections::HashMap;
use std::ops::AddAssign;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOutcome {
    Win,
    Draw,
    Loss,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub wins: u64,
    pub losses: u64,
    pub draws: u64,
    pub ww: u64,
    pub wd: u64,
    pub wl_or_dd: u64,
    pub ld: u64,
    pub ll: u64,
}

impl Stats {
    /// Records a single (non-paired) game result from A's point of view.
    pub fn record_single(&mut self, outcome: GameOutcome) {
        match outcome {
            GameOutcome::Win => self.wins += 1,
            GameOutcome::Draw => self.draws += 1,
            GameOutcome::Loss => self.losses += 1,
        }
    }

    /// Folds a completed pair of games (same opening, colors swapped) into both the trinomial
    /// and pentanomial buckets, per spec.md §4.6.
    pub fn record_pair(&mut self, first: GameOutcome, second: GameOutcome) {
        self.record_single(first);
        self.record_single(second);
        use GameOutcome::*;
        match (first, second) {
            (Win, Win) => self.ww += 1,
            (Win, Draw) | (Draw, Win) => self.wd += 1,
            (Win, Loss) | (Loss, Win) | (Draw, Draw) => self.wl_or_dd += 1,
            (Loss, Draw) | (Draw, Loss) => self.ld += 1,
            (Loss, Loss) => self.ll += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.wins + self.losses + self.draws
    }

    pub fn draw_ratio(&self) -> f64 {
        let n = self.total();
        if n == 0 {
            0.0
        } else {
            self.draws as f64 / n as f64
        }
    }

    /// Elo difference estimated from the score percentage, `original_source/src/elo.hpp`'s
    /// `Elo::getDiff(wins, losses, draws)` logistic inversion.
    pub fn elo_diff(&self) -> f64 {
        let n = self.total();
        if n == 0 {
            return 0.0;
        }
        let score = (self.wins as f64 + 0.5 * self.draws as f64) / n as f64;
        elo_diff_from_percentage(score)
    }

    /// Likelihood Of Superiority: `Phi(elo_diff / (sqrt(2) * std_error))`, `Elo::getLos`'s
    /// normal-approximation form.
    pub fn los(&self) -> f64 {
        let n = self.total();
        if n == 0 {
            return 0.5;
        }
        let score = (self.wins as f64 + 0.5 * self.draws as f64) / n as f64;
        let win_rate = self.wins as f64 / n as f64;
        let loss_rate = self.losses as f64 / n as f64;
        let variance = (win_rate + loss_rate - (win_rate - loss_rate).powi(2)).max(1e-9) / n as f64;
        let z = (score - 0.5) / variance.sqrt();
        0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
    }
}

/// `-400 * log10(1/p - 1)`, clamped away from the asymptotes at `p = 0` and `p = 1`.
fn elo_diff_from_percentage(percentage: f64) -> f64 {
    let p = percentage.clamp(1e-6, 1.0 - 1e-6);
    -400.0 * (1.0 / p - 1.0).log10()
}

/// Abramowitz & Stegun 7.1.26 rational approximation, accurate to ~1.5e-7.
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;
    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();
    sign * y
}

impl AddAssign for Stats {
    fn add_assign(&mut self, rhs: Self) {
        self.wins += rhs.wins;
        self.losses += rhs.losses;
        self.draws += rhs.draws;
        self.ww += rhs.ww;
        self.wd += rhs.wd;
        self.wl_or_dd += rhs.wl_or_dd;
        self.ld += rhs.ld;
        self.ll += rhs.ll;
    }
}

impl std::ops::Not for Stats {
    type Output = Stats;

    /// Involutive negation (`~`): swaps wins/losses and mirrors the pentanomial distribution
    /// (ww<->ll, wd<->ld), leaving draws/wl_or_dd fixed. `~~s == s`.
    fn not(self) -> Stats {
        Stats {
            wins: self.losses,
            losses: self.wins,
            draws: self.draws,
            ww: self.ll,
            wd: self.ld,
            wl_or_dd: self.wl_or_dd,
            ld: self.wd,
            ll: self.ww,
        }
    }
}

/// Canonicalizes an unordered engine pair by lexicographic name order, returning the key plus
/// whether the caller's (first, second) order needs negating to match it.
pub fn canonical_pair<'a>(a: &'a str, b: &'a str) -> ((&'a str, &'a str), bool) {
    if a <= b {
        ((a, b), false)
    } else {
        ((b, a), true)
    }
}

#[derive(Default)]
pub struct StatsMap {
    inner: Mutex<HashMap<(String, String), Stats>>,
}

impl StatsMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a completed game's contribution to (a, b)'s entry, canonicalizing and negating
    /// as needed so (A,B) and (B,A) fold into the same bucket.
    pub fn record_single(&self, a: &str, b: &str, outcome_for_a: GameOutcome) {
        let (key, flip) = canonical_pair(a, b);
        let mut guard = self.inner.lock().unwrap();
        let entry = guard.entry((key.0.to_string(), key.1.to_string())).or_default();
        let mut delta = Stats::default();
        delta.record_single(outcome_for_a);
        if flip {
            delta = !delta;
        }
        *entry += delta;
    }

    pub fn record_pair(&self, a: &str, b: &str, first_for_a: GameOutcome, second_for_a: GameOutcome) {
        let (key, flip) = canonical_pair(a, b);
        let mut guard = self.inner.lock().unwrap();
        let entry = guard.entry((key.0.to_string(), key.1.to_string())).or_default();
        let mut delta = Stats::default();
        delta.record_pair(first_for_a, second_for_a);
        if flip {
            delta = !delta;
        }
        *entry += delta;
    }

    /// A snapshot returned by value, so the caller never holds the lock during I/O.
    pub fn snapshot(&self) -> HashMap<(String, String), Stats> {
        self.inner.lock().unwrap().clone()
    }

    pub fn get(&self, a: &str, b: &str) -> Stats {
        let (key, flip) = canonical_pair(a, b);
        let guard = self.inner.lock().unwrap();
        let stats = guard.get(&(key.0.to_string(), key.1.to_string())).copied().unwrap_or_default();
        if flip {
            !stats
        } else {
            stats
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negation_is_involutive() {
        let s = Stats { wins: 3, losses: 1, draws: 2, ww: 2, wd: 1, wl_or_dd: 3, ld: 0, ll: 1 };
        assert_eq!(!!s, s);
    }

    #[test]
    fn elo_diff_is_zero_at_even_score() {
        let s = Stats { wins: 50, losses: 50, draws: 0, ..Default::default() };
        assert!(s.elo_diff().abs() < 1e-6);
    }

    #[test]
    fn elo_diff_is_positive_when_winning_more() {
        let s = Stats { wins: 60, losses: 40, draws: 0, ..Default::default() };
        assert!(s.elo_diff() > 0.0);
    }

    #[test]
    fn los_favors_the_stronger_side() {
        let s = Stats { wins: 60, losses: 40, draws: 0, ..Default::default() };
        assert!(s.los() > 0.5);
    }

    #[test]
    fn stats_symmetry_under_canonicalization() {
        let map = StatsMap::new();
        map.record_single("zeta", "alpha", GameOutcome::Win);
        let ab = map.get("alpha", "zeta");
        let ba = map.get("zeta", "alpha");
        assert_eq!(ab.losses, ba.wins);
        assert_eq!(ab.draws, ba.draws);
    }

    #[test]
    fn pentanomial_consistency_when_pairs_complete() {
        let map = StatsMap::new();
        map.record_pair("a", "b", GameOutcome::Win, GameOutcome::Draw);
        map.record_pair("a", "b", GameOutcome::Loss, GameOutcome::Loss);
        let s = map.get("a", "b");
        assert_eq!(2 * (s.ww + s.wd + s.wl_or_dd + s.ld + s.ll), s.wins + s.draws + s.losses);
    }
}

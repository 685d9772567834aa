//! Sequential probability ratio test over accumulated trinomial or pentanomial counts.
//! Elo/LLR formulae grounded on `original_source/src/elo.hpp` (trinomial Elo/LOS/draw-ratio)
//! and spec.md §9's Open Question noting the source has two distinct LLR formulations
//! (trinomial vs pentanomial parameterization) — this crate resolves that by never feeding
//! partial pentanomial pairs to SPRT, only completed ones (see `DESIGN.md`).

use crate::stats::Stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SprtModel {
    Normalized,
    BayesElo,
    Logistic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SprtDecision {
    Continue,
    AcceptH0,
    AcceptH1,
}

#[derive(Debug, Clone, Copy)]
pub struct SprtState {
    pub alpha: f64,
    pub beta: f64,
    pub elo0: f64,
    pub elo1: f64,
    pub model: SprtModel,
}

impl SprtState {
    pub fn lower_bound(&self) -> f64 {
        (self.beta / (1.0 - self.alpha)).ln()
    }

    pub fn upper_bound(&self) -> f64 {
        ((1.0 - self.beta) / self.alpha).ln()
    }

    /// Computes the LLR from a `Stats` snapshot, choosing pentanomial or trinomial buckets
    /// according to `report_penta`, then applies the decision rule.
    pub fn evaluate(&self, stats: &Stats, report_penta: bool) -> (f64, SprtDecision) {
        let llr = if report_penta {
            self.llr_pentanomial(stats)
        } else {
            self.llr_trinomial(stats.wins, stats.draws, stats.losses)
        };
        let decision = if llr <= self.lower_bound() {
            SprtDecision::AcceptH0
        } else if llr >= self.upper_bound() {
            SprtDecision::AcceptH1
        } else {
            SprtDecision::Continue
        };
        (llr, decision)
    }

    fn llr_pentanomial(&self, stats: &Stats) -> f64 {
        let n = stats.ww + stats.wd + stats.wl_or_dd + stats.ld + stats.ll;
        if n == 0 {
            return 0.0;
        }
        let n = n as f64;
        // Each paired game scores in {0, 0.25, 0.5, 0.75, 1.0} from A's POV.
        let probs = [
            (stats.ww as f64 / n, 1.0),
            (stats.wd as f64 / n, 0.75),
            (stats.wl_or_dd as f64 / n, 0.5),
            (stats.ld as f64 / n, 0.25),
            (stats.ll as f64 / n, 0.0),
        ];
        self.normal_approx_llr(2.0 * n, &probs)
    }

    fn llr_trinomial(&self, wins: u64, draws: u64, losses: u64) -> f64 {
        let n = wins + draws + losses;
        if n == 0 {
            return 0.0;
        }
        let n = n as f64;
        let probs = [
            (wins as f64 / n, 1.0),
            (draws as f64 / n, 0.5),
            (losses as f64 / n, 0.0),
        ];
        match self.model {
            SprtModel::Normalized => self.normal_approx_llr(n, &probs),
            SprtModel::BayesElo => self.bayeselo_llr(wins, draws, losses),
            SprtModel::Logistic => self.logistic_llr(n, &probs),
        }
    }

    /// Shared normal-approximation LLR used by the Normalized-Elo model (and, generalized to a
    /// 5-point score distribution, the pentanomial model): `n * (s1-s0) * (2*mean - s0 - s1) /
    /// (2*var)`, where `s0`/`s1` are the expected per-game score under `elo0`/`elo1`.
    fn normal_approx_llr(&self, n: f64, probs: &[(f64, f64)]) -> f64 {
        let mean: f64 = probs.iter().map(|(p, v)| p * v).sum();
        let var: f64 = probs.iter().map(|(p, v)| p * (v - mean).powi(2)).sum();
        if var <= 0.0 {
            return 0.0;
        }
        let s0 = expected_score(self.elo0);
        let s1 = expected_score(self.elo1);
        n * (s1 - s0) * (2.0 * mean - s0 - s1) / (2.0 * var)
    }

    /// Classical BayesElo LLR: a draw-elo offset is fit from the observed draw ratio, then the
    /// multinomial log-likelihood ratio is summed directly over the three categories, rather
    /// than through the Normalized model's single-parameter normal approximation.
    fn bayeselo_llr(&self, wins: u64, draws: u64, losses: u64) -> f64 {
        let n = (wins + draws + losses) as f64;
        if n == 0.0 {
            return 0.0;
        }
        let draw_ratio = draws as f64 / n;
        let draw_elo = draw_elo_from_ratio(draw_ratio);

        let p_h0 = bayeselo_probs(self.elo0, draw_elo);
        let p_h1 = bayeselo_probs(self.elo1, draw_elo);

        let counts = [wins as f64, draws as f64, losses as f64];
        counts
            .iter()
            .zip(p_h1.iter().zip(p_h0.iter()))
            .map(|(count, (p1, p0))| count * (p1 / p0).ln())
            .sum()
    }

    /// Logistic-scoring LLR: treats the score rate itself (rather than a fitted normal) as
    /// logistic-distributed, using the standard logistic variance `mean*(1-mean)` scaled by 3
    /// for the {0, 0.5, 1} outcome spacing.
    fn logistic_llr(&self, n: f64, probs: &[(f64, f64)]) -> f64 {
        let mean: f64 = probs.iter().map(|(p, v)| p * v).sum();
        let var = (mean * (1.0 - mean) * 3.0).max(1e-9);
        let s0 = expected_score(self.elo0);
        let s1 = expected_score(self.elo1);
        n * (s1 - s0) * (2.0 * mean - s0 - s1) / (2.0 * var)
    }
}

/// Expected per-game score for an elo difference, logistic model: `1 / (1 + 10^(-elo/400))`.
fn expected_score(elo: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf(-elo / 400.0))
}

fn draw_elo_from_ratio(draw_ratio: f64) -> f64 {
    let draw_ratio = draw_ratio.clamp(1e-6, 1.0 - 1e-6);
    200.0 * ((1.0 - draw_ratio) / draw_ratio).log10()
}

fn bayeselo_probs(elo: f64, draw_elo: f64) -> [f64; 3] {
    let p_win = 1.0 / (1.0 + 10f64.powf(-(elo - draw_elo) / 400.0));
    let p_loss = 1.0 / (1.0 + 10f64.powf((elo + draw_elo) / 400.0));
    let p_draw = (1.0 - p_win - p_loss).max(1e-9);
    [p_win.max(1e-9), p_draw, p_loss.max(1e-9)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sprt(model: SprtModel) -> SprtState {
        SprtState { alpha: 0.05, beta: 0.05, elo0: 0.0, elo1: 5.0, model }
    }

    #[test]
    fn llr_is_zero_with_no_games() {
        let state = sprt(SprtModel::Normalized);
        let stats = Stats::default();
        let (llr, decision) = state.evaluate(&stats, false);
        assert_eq!(llr, 0.0);
        assert_eq!(decision, SprtDecision::Continue);
    }

    #[test]
    fn normalized_model_accepts_h1_on_strong_sample() {
        let state = sprt(SprtModel::Normalized);
        let stats = Stats { wins: 200, draws: 600, losses: 100, ..Default::default() };
        let (llr, decision) = state.evaluate(&stats, false);
        assert!(llr >= state.upper_bound(), "llr={llr} upper={}", state.upper_bound());
        assert_eq!(decision, SprtDecision::AcceptH1);
    }

    #[test]
    fn llr_is_monotone_with_score_share() {
        let state = sprt(SprtModel::Normalized);
        let worse = Stats { wins: 100, draws: 600, losses: 200, ..Default::default() };
        let better = Stats { wins: 200, draws: 600, losses: 100, ..Default::default() };
        let (llr_worse, _) = state.evaluate(&worse, false);
        let (llr_better, _) = state.evaluate(&better, false);
        assert!(llr_better > llr_worse);
    }
}

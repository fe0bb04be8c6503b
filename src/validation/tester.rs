//! Statistical Tester
//!
//! Hypothesis tests used to decide whether a candidate effect is real:
//! - Welch's unequal-variance t-test (active vs baseline returns)
//! - Chi-square goodness of fit for win/loss counts
//! - Percentile bootstrap confidence interval of the mean
//! - Two-tailed power under the normal approximation

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal, StudentsT};
use statrs::statistics::Statistics;

/// Default number of bootstrap resamples
pub const DEFAULT_BOOTSTRAP_RESAMPLES: usize = 10_000;
/// Default significance level for power calculations
pub const DEFAULT_ALPHA: f64 = 0.05;

/// Result of a two-sample t-test
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TTestResult {
    pub t_statistic: f64,
    /// Two-sided p-value
    pub p_value: f64,
    /// Welch-Satterthwaite degrees of freedom
    pub degrees_of_freedom: f64,
}

/// Result of a chi-square goodness-of-fit test
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChiSquareResult {
    pub statistic: f64,
    pub p_value: f64,
}

/// Statistical tests with a reproducible bootstrap
#[derive(Debug, Clone)]
pub struct StatisticalTester {
    n_resamples: usize,
    seed: u64,
}

impl Default for StatisticalTester {
    fn default() -> Self {
        Self {
            n_resamples: DEFAULT_BOOTSTRAP_RESAMPLES,
            seed: 42,
        }
    }
}

impl StatisticalTester {
    pub fn new(n_resamples: usize, seed: u64) -> Self {
        Self {
            n_resamples: n_resamples.max(1),
            seed,
        }
    }

    pub fn n_resamples(&self) -> usize {
        self.n_resamples
    }

    /// Welch's two-sample t-test of `a` against `b`.
    ///
    /// Returns `None` when either sample has fewer than two observations.
    pub fn t_test(&self, a: &[f64], b: &[f64]) -> Option<TTestResult> {
        welch_t_test(a, b)
    }

    /// Compare an observed win rate over `n` trials against `baseline_rate`
    pub fn chi_square_test(
        &self,
        win_rate: f64,
        n: usize,
        baseline_rate: f64,
    ) -> Option<ChiSquareResult> {
        if n == 0 || !(0.0..=1.0).contains(&win_rate) || baseline_rate <= 0.0 || baseline_rate >= 1.0
        {
            return None;
        }

        let n = n as f64;
        let observed = [win_rate * n, (1.0 - win_rate) * n];
        let expected = [baseline_rate * n, (1.0 - baseline_rate) * n];

        let statistic: f64 = observed
            .iter()
            .zip(expected.iter())
            .map(|(o, e)| (o - e).powi(2) / e)
            .sum();

        let dist = ChiSquared::new(1.0).ok()?;
        Some(ChiSquareResult {
            statistic,
            p_value: (1.0 - dist.cdf(statistic)).clamp(0.0, 1.0),
        })
    }

    /// Percentile bootstrap interval for the mean of `returns` at `level` (e.g. 0.95)
    pub fn bootstrap_confidence_interval(&self, returns: &[f64], level: f64) -> Option<(f64, f64)> {
        if returns.is_empty() || level <= 0.0 || level >= 1.0 {
            return None;
        }

        let n = returns.len();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut means: Vec<f64> = (0..self.n_resamples)
            .map(|_| {
                let sum: f64 = (0..n).map(|_| returns[rng.gen_range(0..n)]).sum();
                sum / n as f64
            })
            .collect();
        means.sort_by(|a, b| a.total_cmp(b));

        let alpha = 1.0 - level;
        let last = means.len() - 1;
        let lower_idx = ((alpha / 2.0) * means.len() as f64).floor() as usize;
        let upper_idx = (((1.0 - alpha / 2.0) * means.len() as f64).ceil() as usize).saturating_sub(1);

        Some((means[lower_idx.min(last)], means[upper_idx.min(last)]))
    }

    /// Probability of detecting `effect_size` with `n` observations per group
    pub fn calculate_statistical_power(&self, effect_size: f64, n: usize, alpha: f64) -> f64 {
        statistical_power(effect_size, n, alpha)
    }
}

/// Welch's unequal-variance t-test
pub fn welch_t_test(a: &[f64], b: &[f64]) -> Option<TTestResult> {
    if a.len() < 2 || b.len() < 2 {
        return None;
    }

    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let (mean1, mean2) = (a.iter().mean(), b.iter().mean());
    let v1 = a.iter().variance() / n1;
    let v2 = b.iter().variance() / n2;
    let se = (v1 + v2).sqrt();

    if !se.is_finite() || se <= 0.0 {
        // Degenerate: constant samples
        let p_value = if (mean1 - mean2).abs() > f64::EPSILON { 0.0 } else { 1.0 };
        let t_statistic = if p_value == 0.0 {
            (mean1 - mean2).signum() * f64::INFINITY
        } else {
            0.0
        };
        return Some(TTestResult {
            t_statistic,
            p_value,
            degrees_of_freedom: n1 + n2 - 2.0,
        });
    }

    let t_statistic = (mean1 - mean2) / se;
    let df = (v1 + v2).powi(2) / (v1.powi(2) / (n1 - 1.0) + v2.powi(2) / (n2 - 1.0));

    let dist = StudentsT::new(0.0, 1.0, df).ok()?;
    let p_value = (2.0 * (1.0 - dist.cdf(t_statistic.abs()))).clamp(0.0, 1.0);

    Some(TTestResult {
        t_statistic,
        p_value,
        degrees_of_freedom: df,
    })
}

/// Two-tailed power using the noncentrality parameter `d * sqrt(n / 2)`
pub fn statistical_power(effect_size: f64, n: usize, alpha: f64) -> f64 {
    if n == 0 || !effect_size.is_finite() || alpha <= 0.0 || alpha >= 1.0 {
        return 0.0;
    }

    let Ok(normal) = Normal::new(0.0, 1.0) else {
        return 0.0;
    };
    let z_crit = normal.inverse_cdf(1.0 - alpha / 2.0);
    let ncp = effect_size * (n as f64 / 2.0).sqrt();

    let power = 1.0 - normal.cdf(z_crit - ncp) + normal.cdf(-z_crit - ncp);
    power.clamp(0.0, 1.0)
}

//! Classical Additive Decomposition
//!
//! `series = trend + seasonal + residual` where the trend is a centered moving
//! average of one period (2 x m for even periods) and the seasonal component
//! is the zero-mean average detrended value at each phase. Trend and residual
//! are NaN where the moving average window does not fit.

use statrs::statistics::Statistics;

/// Trend / seasonal / residual split of a series
#[derive(Debug, Clone)]
pub struct Decomposition {
    pub period: usize,
    pub trend: Vec<f64>,
    pub seasonal: Vec<f64>,
    pub residual: Vec<f64>,
}

impl Decomposition {
    /// `1 - Var(residual) / Var(seasonal + residual)` over the points where the
    /// residual is defined; 0 when the denominator is 0 or too few points remain.
    pub fn seasonal_strength(&self) -> f64 {
        let (resid, combined): (Vec<f64>, Vec<f64>) = self
            .residual
            .iter()
            .zip(self.seasonal.iter())
            .filter(|(r, s)| r.is_finite() && s.is_finite())
            .map(|(r, s)| (*r, r + s))
            .unzip();

        if resid.len() < 2 {
            return 0.0;
        }

        let var_combined = combined.iter().variance();
        if !var_combined.is_finite() || var_combined == 0.0 {
            return 0.0;
        }
        1.0 - resid.iter().variance() / var_combined
    }

    /// Seasonal value at a phase of the cycle
    pub fn seasonal_index(&self, phase: usize) -> f64 {
        self.seasonal.get(phase % self.period.max(1)).copied().unwrap_or(0.0)
    }
}

/// Decompose `series` at `period`. Needs at least two full periods.
pub fn decompose(series: &[f64], period: usize) -> Option<Decomposition> {
    if period < 2 || series.len() < 2 * period {
        return None;
    }

    let trend = centered_moving_average(series, period);

    let mut phase_sum = vec![0.0; period];
    let mut phase_count = vec![0usize; period];
    for (i, (x, t)) in series.iter().zip(trend.iter()).enumerate() {
        if t.is_finite() {
            phase_sum[i % period] += x - t;
            phase_count[i % period] += 1;
        }
    }

    let mut indices: Vec<f64> = phase_sum
        .iter()
        .zip(phase_count.iter())
        .map(|(s, &c)| if c > 0 { s / c as f64 } else { 0.0 })
        .collect();
    let level = indices.iter().sum::<f64>() / period as f64;
    indices.iter_mut().for_each(|v| *v -= level);

    let seasonal: Vec<f64> = (0..series.len()).map(|i| indices[i % period]).collect();
    let residual: Vec<f64> = series
        .iter()
        .zip(trend.iter())
        .zip(seasonal.iter())
        .map(|((x, t), s)| x - t - s)
        .collect();

    Some(Decomposition {
        period,
        trend,
        seasonal,
        residual,
    })
}

/// Centered moving average of width `period`; NaN at the edges
pub fn centered_moving_average(series: &[f64], period: usize) -> Vec<f64> {
    let n = series.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < period + 1 {
        return out;
    }

    let half = period / 2;
    if period % 2 == 1 {
        for (t, slot) in out.iter_mut().enumerate().take(n - half).skip(half) {
            *slot = series[t - half..=t + half].iter().sum::<f64>() / period as f64;
        }
    } else {
        // 2 x m: half weight on the two end points
        for (t, slot) in out.iter_mut().enumerate().take(n - half).skip(half) {
            let inner: f64 = series[t - half + 1..t + half].iter().sum();
            let ends = 0.5 * (series[t - half] + series[t + half]);
            *slot = (inner + ends) / period as f64;
        }
    }
    out
}

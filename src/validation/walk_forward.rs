//! Walk-Forward Validation
//!
//! Rolling in-sample / out-of-sample backtest of a boolean signal over daily bars.
//!
//! Windows are laid out by calendar date:
//! - in-sample `[cursor, cursor + IS)`, out-of-sample `[IS end, IS end + OS)`
//! - the cursor advances by IS / 2 (50% overlap) while the out-of-sample end stays inside the series
//! - a window is kept only with >= 100 in-sample rows and >= 20 out-of-sample rows
//!
//! Walk-forward efficiency (WFE) is `mean(out-of-sample) / mean(in-sample)` of the
//! per-window average active return, floored to 0 when the in-sample mean is not positive.
//! Sharpe, drawdown and win rate are computed once over the whole series.

use std::ops::Range;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use super::ValidationError;
use crate::domain::MarketBar;

/// Trading days per year used for annualization
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;
/// Default annual risk-free rate
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.02;

/// Walk-forward window configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardConfig {
    /// In-sample length in calendar days
    pub in_sample_days: i64,
    /// Out-of-sample length in calendar days
    pub out_sample_days: i64,
    /// Minimum number of usable windows
    pub min_windows: usize,
    /// Minimum rows for an in-sample half
    pub min_in_sample_rows: usize,
    /// Minimum rows for an out-of-sample half
    pub min_out_sample_rows: usize,
    /// Annual risk-free rate for the Sharpe ratio
    pub risk_free_rate: f64,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            in_sample_days: 730,
            out_sample_days: 90,
            min_windows: 3,
            min_in_sample_rows: 100,
            min_out_sample_rows: 20,
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
        }
    }
}

impl WalkForwardConfig {
    pub fn with_periods(mut self, in_sample_days: i64, out_sample_days: i64) -> Self {
        self.in_sample_days = in_sample_days;
        self.out_sample_days = out_sample_days;
        self
    }

    pub fn with_min_windows(mut self, min_windows: usize) -> Self {
        self.min_windows = min_windows;
        self
    }

    pub fn with_risk_free_rate(mut self, rate: f64) -> Self {
        self.risk_free_rate = rate;
        self
    }
}

/// Side taken while the signal is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalDirection {
    Long,
    Short,
}

impl SignalDirection {
    pub fn sign(&self) -> f64 {
        match self {
            SignalDirection::Long => 1.0,
            SignalDirection::Short => -1.0,
        }
    }

    /// Direction implied by the sign of an effect
    pub fn from_effect(effect: f64) -> Self {
        if effect < 0.0 {
            SignalDirection::Short
        } else {
            SignalDirection::Long
        }
    }
}

/// One in-sample / out-of-sample split
#[derive(Debug, Clone, PartialEq)]
pub struct WalkForwardWindow {
    pub in_sample_start: NaiveDate,
    pub in_sample_end: NaiveDate,
    pub out_sample_start: NaiveDate,
    pub out_sample_end: NaiveDate,
    /// Row range of the in-sample half
    pub in_rows: Range<usize>,
    /// Row range of the out-of-sample half
    pub out_rows: Range<usize>,
}

/// Aggregate result of a walk-forward run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardReport {
    /// Windows that passed the row minimums
    pub windows: usize,
    /// Windows with active days in both halves
    pub evaluated_windows: usize,
    pub in_sample_return: f64,
    pub out_sample_return: f64,
    pub walk_forward_efficiency: f64,
    pub sharpe_ratio: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub win_rate: Option<f64>,
    pub active_days: usize,
}

/// Rolling walk-forward validator
#[derive(Debug, Clone, Default)]
pub struct WalkForwardValidator {
    config: WalkForwardConfig,
}

impl WalkForwardValidator {
    pub fn new(config: WalkForwardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WalkForwardConfig {
        &self.config
    }

    /// Lay out windows over `bars` (sorted by date), dropping those below the row minimums
    pub fn generate_windows(&self, bars: &[MarketBar]) -> Vec<WalkForwardWindow> {
        let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
            return Vec::new();
        };
        if self.config.in_sample_days <= 0 || self.config.out_sample_days <= 0 {
            return Vec::new();
        }

        let in_len = Duration::days(self.config.in_sample_days);
        let out_len = Duration::days(self.config.out_sample_days);
        let step = Duration::days((self.config.in_sample_days / 2).max(1));

        let mut windows = Vec::new();
        let mut cursor = first.date;

        loop {
            let in_end = cursor + in_len;
            let out_end = in_end + out_len;
            if out_end > last.date {
                break;
            }

            let in_rows = row_range(bars, cursor, in_end);
            let out_rows = row_range(bars, in_end, out_end);

            if in_rows.len() >= self.config.min_in_sample_rows
                && out_rows.len() >= self.config.min_out_sample_rows
            {
                windows.push(WalkForwardWindow {
                    in_sample_start: cursor,
                    in_sample_end: in_end,
                    out_sample_start: in_end,
                    out_sample_end: out_end,
                    in_rows,
                    out_rows,
                });
            }

            cursor += step;
        }

        windows
    }

    /// Run the walk-forward backtest of `signal` trading in `direction`.
    ///
    /// `signal` is called once per window half with that slice, and once with the
    /// whole series for the risk statistics; it must return one flag per bar.
    pub fn validate<F>(
        &self,
        bars: &[MarketBar],
        signal: F,
        direction: SignalDirection,
    ) -> Result<WalkForwardReport, ValidationError>
    where
        F: Fn(&[MarketBar]) -> Vec<bool>,
    {
        let windows = self.generate_windows(bars);
        if windows.len() < self.config.min_windows {
            return Err(ValidationError::InsufficientWindows {
                found: windows.len(),
                required: self.config.min_windows,
            });
        }

        let sign = direction.sign();
        let mut in_returns = Vec::with_capacity(windows.len());
        let mut out_returns = Vec::with_capacity(windows.len());

        for window in &windows {
            let in_slice = &bars[window.in_rows.clone()];
            let out_slice = &bars[window.out_rows.clone()];

            let in_avg = average_active_return(in_slice, &evaluate(&signal, in_slice)?, sign);
            let out_avg = average_active_return(out_slice, &evaluate(&signal, out_slice)?, sign);

            // Windows where one half never triggers carry no information
            if let (Some(i), Some(o)) = (in_avg, out_avg) {
                in_returns.push(i);
                out_returns.push(o);
            }
        }

        let (in_sample_return, out_sample_return) = if in_returns.is_empty() {
            (0.0, 0.0)
        } else {
            (in_returns.iter().mean(), out_returns.iter().mean())
        };

        let walk_forward_efficiency = if in_sample_return > 0.0 {
            out_sample_return / in_sample_return
        } else {
            0.0
        };

        let mask = evaluate(&signal, bars)?;
        let strategy_returns = strategy_returns(bars, &mask, sign);
        let active: Vec<f64> = strategy_returns
            .iter()
            .zip(mask.iter())
            .filter(|(_, on)| **on)
            .map(|(r, _)| *r)
            .collect();

        let win_rate = if active.is_empty() {
            None
        } else {
            Some(active.iter().filter(|r| **r > 0.0).count() as f64 / active.len() as f64)
        };

        tracing::debug!(
            windows = windows.len(),
            evaluated = in_returns.len(),
            wfe = walk_forward_efficiency,
            "walk-forward complete"
        );

        Ok(WalkForwardReport {
            windows: windows.len(),
            evaluated_windows: in_returns.len(),
            in_sample_return,
            out_sample_return,
            walk_forward_efficiency,
            sharpe_ratio: sharpe_ratio(&strategy_returns, self.config.risk_free_rate),
            max_drawdown: max_drawdown(&strategy_returns),
            win_rate,
            active_days: active.len(),
        })
    }
}

fn row_range(bars: &[MarketBar], start: NaiveDate, end: NaiveDate) -> Range<usize> {
    let lo = bars.partition_point(|b| b.date < start);
    let hi = bars.partition_point(|b| b.date < end);
    lo..hi.max(lo)
}

fn evaluate<F>(signal: &F, bars: &[MarketBar]) -> Result<Vec<bool>, ValidationError>
where
    F: Fn(&[MarketBar]) -> Vec<bool>,
{
    let mask = signal(bars);
    if mask.len() != bars.len() {
        return Err(ValidationError::SignalLength {
            expected: bars.len(),
            got: mask.len(),
        });
    }
    Ok(mask)
}

fn average_active_return(bars: &[MarketBar], mask: &[bool], sign: f64) -> Option<f64> {
    let active: Vec<f64> = bars
        .iter()
        .zip(mask.iter())
        .filter(|(_, on)| **on)
        .map(|(b, _)| sign * b.returns)
        .collect();

    if active.is_empty() {
        None
    } else {
        Some(active.iter().mean())
    }
}

/// Directional return while active, flat otherwise
pub fn strategy_returns(bars: &[MarketBar], mask: &[bool], sign: f64) -> Vec<f64> {
    bars.iter()
        .zip(mask.iter())
        .map(|(b, &on)| if on { sign * b.returns } else { 0.0 })
        .collect()
}

/// Annualized Sharpe ratio of daily returns against an annual risk-free rate
pub fn sharpe_ratio(daily_returns: &[f64], risk_free_rate: f64) -> Option<f64> {
    if daily_returns.len() < 2 {
        return None;
    }

    let daily_rf = (1.0 + risk_free_rate).powf(1.0 / TRADING_DAYS_PER_YEAR) - 1.0;
    let excess_mean = daily_returns.iter().map(|r| r - daily_rf).mean();
    let std = daily_returns.iter().std_dev();

    if !std.is_finite() || std <= 0.0 {
        return None;
    }
    Some(excess_mean / std * TRADING_DAYS_PER_YEAR.sqrt())
}

/// Largest peak-to-trough decline of the compounded equity curve, as a fraction
pub fn max_drawdown(daily_returns: &[f64]) -> Option<f64> {
    if daily_returns.is_empty() {
        return None;
    }

    let mut equity = 1.0;
    let mut peak = 1.0_f64;
    let mut worst = 0.0_f64;

    for r in daily_returns {
        equity *= 1.0 + r;
        peak = peak.max(equity);
        if peak > 0.0 {
            worst = worst.max((peak - equity) / peak);
        }
    }

    Some(worst)
}

//! Detector Parameters
//!
//! Gating thresholds shared by every detector plus the calendar and seasonal
//! detector settings. All structs deserialize from the TOML config sections.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{Frequency, ValidationMetrics};
use crate::models::OrderBounds;
use crate::validation::{WalkForwardConfig, DEFAULT_BOOTSTRAP_RESAMPLES};

/// Maximum age of the last occurrence for recent confirmation
pub const RECENT_CONFIRMATION_DAYS: i64 = 365;

/// Minimum evidence a candidate must show before it becomes a pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionThresholds {
    pub min_occurrences: usize,
    pub min_years: f64,
    /// Largest acceptable (corrected) p-value
    pub min_p_value: f64,
    /// Smallest acceptable walk-forward efficiency
    pub min_wfe: f64,
    /// Require a profitable occurrence within the last year
    pub require_recent_confirmation: bool,
}

impl Default for DetectionThresholds {
    fn default() -> Self {
        Self {
            min_occurrences: 10,
            min_years: 5.0,
            min_p_value: 0.05,
            min_wfe: 0.5,
            require_recent_confirmation: true,
        }
    }
}

impl DetectionThresholds {
    pub fn with_min_occurrences(mut self, n: usize) -> Self {
        self.min_occurrences = n;
        self
    }

    pub fn with_min_years(mut self, years: f64) -> Self {
        self.min_years = years;
        self
    }

    pub fn with_min_p_value(mut self, p: f64) -> Self {
        self.min_p_value = p;
        self
    }

    pub fn with_min_wfe(mut self, wfe: f64) -> Self {
        self.min_wfe = wfe;
        self
    }

    pub fn with_recent_confirmation(mut self, required: bool) -> Self {
        self.require_recent_confirmation = required;
        self
    }

    /// Gate a candidate's metrics. Recency is judged against `as_of`.
    pub fn meets_minimum_criteria(&self, metrics: &ValidationMetrics, as_of: NaiveDate) -> bool {
        // NaN never passes
        if metrics.p_value.is_nan() || metrics.p_value > self.min_p_value {
            return false;
        }
        if metrics.walk_forward_efficiency.is_nan() || metrics.walk_forward_efficiency < self.min_wfe {
            return false;
        }
        if metrics.sample_size < self.min_occurrences || metrics.years_of_data < self.min_years {
            return false;
        }

        if self.require_recent_confirmation {
            let Some(last) = metrics.last_occurrence_date else {
                return false;
            };
            if (as_of - last).num_days() > RECENT_CONFIRMATION_DAYS {
                return false;
            }
            if metrics.recent_performance <= 0.0 {
                return false;
            }
        }

        true
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        if !(self.min_p_value > 0.0 && self.min_p_value <= 1.0) {
            return Err(ParamError::InvalidPValue(self.min_p_value));
        }
        if !self.min_years.is_finite() || self.min_years < 0.0 {
            return Err(ParamError::InvalidMinYears(self.min_years));
        }
        if !self.min_wfe.is_finite() {
            return Err(ParamError::InvalidMinWfe(self.min_wfe));
        }
        Ok(())
    }
}

/// Calendar anomaly families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarEffect {
    January,
    Monday,
    TurnOfMonth,
    /// Declared family with no test behind it yet
    Holiday,
    DayOfWeek,
}

impl CalendarEffect {
    pub const ALL: [CalendarEffect; 5] = [
        CalendarEffect::January,
        CalendarEffect::Monday,
        CalendarEffect::TurnOfMonth,
        CalendarEffect::Holiday,
        CalendarEffect::DayOfWeek,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CalendarEffect::January => "january",
            CalendarEffect::Monday => "monday",
            CalendarEffect::TurnOfMonth => "turn_of_month",
            CalendarEffect::Holiday => "holiday",
            CalendarEffect::DayOfWeek => "day_of_week",
        }
    }
}

impl fmt::Display for CalendarEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CalendarEffect {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CalendarEffect::ALL
            .into_iter()
            .find(|e| e.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| ParamError::UnknownEffect(s.to_string()))
    }
}

/// Calendar detector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// Families to test; the count drives the Bonferroni factor
    pub effects: Vec<CalendarEffect>,
    pub bootstrap_resamples: usize,
    pub bootstrap_seed: u64,
    /// Level of the bootstrap interval on active-day returns
    pub confidence_level: f64,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            effects: CalendarEffect::ALL.to_vec(),
            bootstrap_resamples: DEFAULT_BOOTSTRAP_RESAMPLES,
            bootstrap_seed: 42,
            confidence_level: 0.95,
        }
    }
}

impl CalendarConfig {
    pub fn with_effects(mut self, effects: Vec<CalendarEffect>) -> Self {
        self.effects = effects;
        self
    }

    pub fn with_bootstrap(mut self, resamples: usize, seed: u64) -> Self {
        self.bootstrap_resamples = resamples;
        self.bootstrap_seed = seed;
        self
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        if self.effects.is_empty() {
            return Err(ParamError::NoEffects);
        }
        if self.bootstrap_resamples == 0 {
            return Err(ParamError::InvalidBootstrap(self.bootstrap_resamples));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(ParamError::InvalidConfidenceLevel(self.confidence_level));
        }
        Ok(())
    }
}

/// Candidate seasonal periods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeasonalPeriod {
    Annual,
    Quarterly,
    Monthly,
}

impl SeasonalPeriod {
    pub const ALL: [SeasonalPeriod; 3] = [
        SeasonalPeriod::Annual,
        SeasonalPeriod::Quarterly,
        SeasonalPeriod::Monthly,
    ];

    /// Period length in trading days
    pub fn trading_days(&self) -> usize {
        match self {
            SeasonalPeriod::Annual => 252,
            SeasonalPeriod::Quarterly => 63,
            SeasonalPeriod::Monthly => 21,
        }
    }

    /// Period length in calendar days; next-occurrence projection steps by this
    /// since 252 weekdays fall short of a year once holidays are ignored
    pub fn calendar_days(&self) -> i64 {
        match self {
            SeasonalPeriod::Annual => 365,
            SeasonalPeriod::Quarterly => 91,
            SeasonalPeriod::Monthly => 30,
        }
    }

    pub fn frequency(&self) -> Frequency {
        match self {
            SeasonalPeriod::Annual => Frequency::Annual,
            SeasonalPeriod::Quarterly => Frequency::Quarterly,
            SeasonalPeriod::Monthly => Frequency::Monthly,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SeasonalPeriod::Annual => "annual",
            SeasonalPeriod::Quarterly => "quarterly",
            SeasonalPeriod::Monthly => "monthly",
        }
    }

    /// Inverse of `trading_days`
    pub fn from_trading_days(days: usize) -> Option<Self> {
        SeasonalPeriod::ALL.into_iter().find(|p| p.trading_days() == days)
    }
}

impl fmt::Display for SeasonalPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeasonalPeriod {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SeasonalPeriod::ALL
            .into_iter()
            .find(|p| p.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| ParamError::UnknownPeriod(s.to_string()))
    }
}

/// Seasonal detector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonalConfig {
    pub min_seasonal_strength: f64,
    pub max_p: usize,
    pub max_q: usize,
    pub max_seasonal_p: usize,
    pub max_seasonal_q: usize,
    /// Wall-clock budget for one period's order search
    pub fit_deadline_secs: u64,
    pub periods: Vec<SeasonalPeriod>,
}

impl Default for SeasonalConfig {
    fn default() -> Self {
        Self {
            min_seasonal_strength: 0.3,
            max_p: 2,
            max_q: 2,
            max_seasonal_p: 1,
            max_seasonal_q: 1,
            fit_deadline_secs: 30,
            periods: SeasonalPeriod::ALL.to_vec(),
        }
    }
}

impl SeasonalConfig {
    pub fn with_min_strength(mut self, strength: f64) -> Self {
        self.min_seasonal_strength = strength;
        self
    }

    pub fn with_order_bounds(mut self, max_p: usize, max_q: usize, max_sp: usize, max_sq: usize) -> Self {
        self.max_p = max_p;
        self.max_q = max_q;
        self.max_seasonal_p = max_sp;
        self.max_seasonal_q = max_sq;
        self
    }

    pub fn with_periods(mut self, periods: Vec<SeasonalPeriod>) -> Self {
        self.periods = periods;
        self
    }

    pub fn with_fit_deadline(mut self, secs: u64) -> Self {
        self.fit_deadline_secs = secs;
        self
    }

    pub fn order_bounds(&self) -> OrderBounds {
        OrderBounds {
            max_p: self.max_p,
            max_q: self.max_q,
            max_seasonal_p: self.max_seasonal_p,
            max_seasonal_q: self.max_seasonal_q,
            ..OrderBounds::default()
        }
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        if !self.min_seasonal_strength.is_finite() || self.min_seasonal_strength > 1.0 {
            return Err(ParamError::InvalidSeasonalStrength(self.min_seasonal_strength));
        }
        if self.periods.is_empty() {
            return Err(ParamError::NoPeriods);
        }
        if self.fit_deadline_secs == 0 {
            return Err(ParamError::InvalidDeadline);
        }
        Ok(())
    }
}

/// Check a walk-forward configuration
pub fn validate_walk_forward(config: &WalkForwardConfig) -> Result<(), ParamError> {
    if config.in_sample_days <= 0 || config.out_sample_days <= 0 {
        return Err(ParamError::InvalidWalkForward(format!(
            "periods must be positive (in={}, out={})",
            config.in_sample_days, config.out_sample_days
        )));
    }
    if config.min_windows == 0 {
        return Err(ParamError::InvalidWalkForward("min_windows must be at least 1".into()));
    }
    if !config.risk_free_rate.is_finite() || config.risk_free_rate <= -1.0 {
        return Err(ParamError::InvalidWalkForward(format!(
            "risk-free rate {} out of range",
            config.risk_free_rate
        )));
    }
    Ok(())
}

/// Parameter validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamError {
    #[error("Invalid p-value threshold: {0} (must be 0 < p <= 1)")]
    InvalidPValue(f64),
    #[error("Invalid minimum years: {0} (must be >= 0)")]
    InvalidMinYears(f64),
    #[error("Invalid minimum walk-forward efficiency: {0}")]
    InvalidMinWfe(f64),
    #[error("Unknown calendar effect: {0}")]
    UnknownEffect(String),
    #[error("No calendar effects configured")]
    NoEffects,
    #[error("Invalid bootstrap resample count: {0}")]
    InvalidBootstrap(usize),
    #[error("Invalid confidence level: {0} (must be 0 < level < 1)")]
    InvalidConfidenceLevel(f64),
    #[error("Unknown seasonal period: {0}")]
    UnknownPeriod(String),
    #[error("Invalid seasonal strength threshold: {0} (must be <= 1)")]
    InvalidSeasonalStrength(f64),
    #[error("No seasonal periods configured")]
    NoPeriods,
    #[error("Fit deadline must be at least one second")]
    InvalidDeadline,
    #[error("Invalid walk-forward config: {0}")]
    InvalidWalkForward(String),
}

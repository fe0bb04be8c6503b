//! Pattern result types
//!
//! Immutable value objects produced by a detection pass:
//! - `Pattern`: a validated, scored recurring effect
//! - `PatternOccurrence`: one historical instance of the effect
//! - `ValidationMetrics`: the statistical evidence behind a pattern

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Family a pattern belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternType {
    Seasonal,
    Calendar,
    Cycle,
    Regime,
    Behavioral,
    Politician,
    Earnings,
    Economic,
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PatternType::Seasonal => "SEASONAL",
            PatternType::Calendar => "CALENDAR",
            PatternType::Cycle => "CYCLE",
            PatternType::Regime => "REGIME",
            PatternType::Behavioral => "BEHAVIORAL",
            PatternType::Politician => "POLITICIAN",
            PatternType::Earnings => "EARNINGS",
            PatternType::Economic => "ECONOMIC",
        };
        write!(f, "{}", label)
    }
}

/// How often a pattern recurs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Annual,
    Irregular,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::Annual => "annual",
            Frequency::Irregular => "irregular",
        };
        write!(f, "{}", label)
    }
}

/// One concrete historical instance of a pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternOccurrence {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Realized fractional return over the window (0.01 = 1%)
    pub return_pct: f64,
    /// Confidence in this instance (0-100)
    pub confidence: f64,
    /// Average volume in the window relative to the series average, minus one
    pub volume_change: Option<f64>,
    pub notes: Option<String>,
}

impl PatternOccurrence {
    /// Create an occurrence, swapping the dates if they arrive reversed
    pub fn new(start_date: NaiveDate, end_date: NaiveDate, return_pct: f64) -> Self {
        let (start_date, end_date) = if start_date <= end_date {
            (start_date, end_date)
        } else {
            (end_date, start_date)
        };
        Self {
            start_date,
            end_date,
            return_pct,
            confidence: 0.0,
            volume_change: None,
            notes: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 100.0);
        self
    }

    pub fn with_volume_change(mut self, volume_change: f64) -> Self {
        self.volume_change = Some(volume_change);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Calendar days covered by the occurrence (inclusive)
    pub fn duration_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }
}

/// Statistical evidence for a candidate pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    /// Significance after any multiple-testing correction
    pub p_value: f64,
    /// Signed Cohen's d of active vs baseline returns
    pub effect_size: f64,
    pub statistical_power: f64,
    /// Out-of-sample / in-sample average active return
    pub walk_forward_efficiency: f64,
    pub in_sample_return: f64,
    pub out_sample_return: f64,
    pub consistency_score: f64,
    /// Number of historical occurrences
    pub sample_size: usize,
    pub years_of_data: f64,
    /// Average directional return of the most recent occurrences
    pub recent_performance: f64,
    pub last_occurrence_date: Option<NaiveDate>,
    pub sharpe_ratio: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub win_rate: Option<f64>,
}

impl ValidationMetrics {
    /// Copy of these metrics with a replaced p-value
    pub fn with_p_value(&self, p_value: f64) -> Self {
        Self {
            p_value,
            ..self.clone()
        }
    }
}

/// A validated, scored recurring effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Stable identifier, e.g. `calendar:january:SPY`
    pub id: String,
    pub pattern_type: PatternType,
    pub name: String,
    pub description: String,

    pub ticker: Option<String>,
    pub sector: Option<String>,
    pub market_cap: Option<String>,

    pub cycle_length_days: Option<u32>,
    pub frequency: Frequency,
    pub next_occurrence: Option<NaiveDate>,
    /// First day of the active window within its period (negative counts from period end)
    pub window_start_day: Option<i32>,
    pub window_end_day: Option<i32>,

    pub validation_metrics: Option<ValidationMetrics>,
    /// Composite reliability (0-100)
    pub reliability_score: f64,
    /// Statistical confidence (0-100)
    pub confidence: f64,

    pub historical_occurrences: Vec<PatternOccurrence>,

    pub economic_rationale: Option<String>,
    pub risk_factors: Vec<String>,

    pub detected_at: DateTime<Utc>,
    pub detector_version: String,
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl Pattern {
    /// Number of recorded historical occurrences
    pub fn occurrence_count(&self) -> usize {
        self.historical_occurrences.len()
    }

    /// Most recent occurrence by start date
    pub fn last_occurrence(&self) -> Option<&PatternOccurrence> {
        self.historical_occurrences.iter().max_by_key(|o| o.start_date)
    }

    /// Look up a string parameter recorded by the detector
    pub fn parameter_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(|v| v.as_str())
    }

    /// Look up a numeric parameter recorded by the detector
    pub fn parameter_f64(&self, key: &str) -> Option<f64> {
        self.parameters.get(key).and_then(|v| v.as_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_occurrence_orders_dates() {
        let occ = PatternOccurrence::new(date(2024, 1, 31), date(2024, 1, 2), 0.02);
        assert_eq!(occ.start_date, date(2024, 1, 2));
        assert_eq!(occ.end_date, date(2024, 1, 31));
        assert_eq!(occ.duration_days(), 30);
    }

    #[test]
    fn test_occurrence_confidence_clamped() {
        let occ = PatternOccurrence::new(date(2024, 1, 2), date(2024, 1, 2), 0.0)
            .with_confidence(140.0);
        assert_eq!(occ.confidence, 100.0);
    }

    #[test]
    fn test_pattern_type_serializes_uppercase() {
        let json = serde_json::to_string(&PatternType::Calendar).unwrap();
        assert_eq!(json, "\"CALENDAR\"");
        assert_eq!(PatternType::Seasonal.to_string(), "SEASONAL");
    }

    #[test]
    fn test_frequency_serializes_lowercase() {
        let json = serde_json::to_string(&Frequency::Quarterly).unwrap();
        assert_eq!(json, "\"quarterly\"");
        let back: Frequency = serde_json::from_str("\"weekly\"").unwrap();
        assert_eq!(back, Frequency::Weekly);
    }
}

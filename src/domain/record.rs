//! Pattern Storage Shape
//!
//! Flat, persistence-friendly representation of a `Pattern`. Validation metrics
//! are flattened into top-level columns and every date is an ISO-8601 string so
//! the record maps directly onto a table row or a JSON document.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::pattern::{Frequency, Pattern, PatternOccurrence, PatternType, ValidationMetrics};

/// Record conversion errors
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Invalid date in field {field}: {value}")]
    InvalidDate { field: &'static str, value: String },
    #[error("Incomplete validation metrics: missing {0}")]
    IncompleteMetrics(&'static str),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stored occurrence with ISO-8601 dates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccurrenceRecord {
    pub start_date: String,
    pub end_date: String,
    pub return_pct: f64,
    pub confidence: f64,
    pub volume_change: Option<f64>,
    pub notes: Option<String>,
}

/// Storage shape of a detected pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRecord {
    pub pattern_id: String,
    pub pattern_type: PatternType,
    pub name: String,
    pub description: String,
    pub ticker: Option<String>,
    pub sector: Option<String>,
    pub market_cap: Option<String>,
    pub cycle_length_days: Option<u32>,
    pub frequency: Frequency,
    pub next_occurrence: Option<String>,
    pub window_start_day: Option<i32>,
    pub window_end_day: Option<i32>,

    // Flattened validation metrics
    pub p_value: Option<f64>,
    pub effect_size: Option<f64>,
    pub statistical_power: Option<f64>,
    pub walk_forward_efficiency: Option<f64>,
    pub in_sample_return: Option<f64>,
    pub out_sample_return: Option<f64>,
    pub consistency_score: Option<f64>,
    pub sample_size: Option<usize>,
    pub years_of_data: Option<f64>,
    pub recent_performance: Option<f64>,
    pub last_occurrence_date: Option<String>,
    pub sharpe_ratio: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub win_rate: Option<f64>,

    pub reliability_score: f64,
    pub confidence: f64,
    pub historical_occurrences: Vec<OccurrenceRecord>,
    pub economic_rationale: Option<String>,
    pub risk_factors: Vec<String>,
    pub detected_at: String,
    pub detector_version: String,
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl PatternRecord {
    pub fn to_json(&self) -> Result<String, RecordError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, RecordError> {
        Ok(serde_json::from_str(json)?)
    }
}

fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate, RecordError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| RecordError::InvalidDate {
        field,
        value: value.to_string(),
    })
}

fn parse_optional_date(
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<NaiveDate>, RecordError> {
    value.map(|v| parse_date(field, v)).transpose()
}

impl From<&PatternOccurrence> for OccurrenceRecord {
    fn from(occ: &PatternOccurrence) -> Self {
        Self {
            start_date: iso(occ.start_date),
            end_date: iso(occ.end_date),
            return_pct: occ.return_pct,
            confidence: occ.confidence,
            volume_change: occ.volume_change,
            notes: occ.notes.clone(),
        }
    }
}

impl TryFrom<&OccurrenceRecord> for PatternOccurrence {
    type Error = RecordError;

    fn try_from(rec: &OccurrenceRecord) -> Result<Self, Self::Error> {
        Ok(PatternOccurrence {
            start_date: parse_date("historical_occurrences.start_date", &rec.start_date)?,
            end_date: parse_date("historical_occurrences.end_date", &rec.end_date)?,
            return_pct: rec.return_pct,
            confidence: rec.confidence,
            volume_change: rec.volume_change,
            notes: rec.notes.clone(),
        })
    }
}

impl From<&Pattern> for PatternRecord {
    fn from(pattern: &Pattern) -> Self {
        let m = pattern.validation_metrics.as_ref();
        Self {
            pattern_id: pattern.id.clone(),
            pattern_type: pattern.pattern_type,
            name: pattern.name.clone(),
            description: pattern.description.clone(),
            ticker: pattern.ticker.clone(),
            sector: pattern.sector.clone(),
            market_cap: pattern.market_cap.clone(),
            cycle_length_days: pattern.cycle_length_days,
            frequency: pattern.frequency,
            next_occurrence: pattern.next_occurrence.map(iso),
            window_start_day: pattern.window_start_day,
            window_end_day: pattern.window_end_day,
            p_value: m.map(|m| m.p_value),
            effect_size: m.map(|m| m.effect_size),
            statistical_power: m.map(|m| m.statistical_power),
            walk_forward_efficiency: m.map(|m| m.walk_forward_efficiency),
            in_sample_return: m.map(|m| m.in_sample_return),
            out_sample_return: m.map(|m| m.out_sample_return),
            consistency_score: m.map(|m| m.consistency_score),
            sample_size: m.map(|m| m.sample_size),
            years_of_data: m.map(|m| m.years_of_data),
            recent_performance: m.map(|m| m.recent_performance),
            last_occurrence_date: m.and_then(|m| m.last_occurrence_date).map(iso),
            sharpe_ratio: m.and_then(|m| m.sharpe_ratio),
            max_drawdown: m.and_then(|m| m.max_drawdown),
            win_rate: m.and_then(|m| m.win_rate),
            reliability_score: pattern.reliability_score,
            confidence: pattern.confidence,
            historical_occurrences: pattern
                .historical_occurrences
                .iter()
                .map(OccurrenceRecord::from)
                .collect(),
            economic_rationale: pattern.economic_rationale.clone(),
            risk_factors: pattern.risk_factors.clone(),
            detected_at: pattern.detected_at.to_rfc3339(),
            detector_version: pattern.detector_version.clone(),
            parameters: pattern.parameters.clone(),
        }
    }
}

impl PatternRecord {
    /// Rebuild the flattened metrics; `None` when the pattern was stored without any
    fn metrics(&self) -> Result<Option<ValidationMetrics>, RecordError> {
        let Some(p_value) = self.p_value else {
            return Ok(None);
        };

        Ok(Some(ValidationMetrics {
            p_value,
            effect_size: self
                .effect_size
                .ok_or(RecordError::IncompleteMetrics("effect_size"))?,
            statistical_power: self
                .statistical_power
                .ok_or(RecordError::IncompleteMetrics("statistical_power"))?,
            walk_forward_efficiency: self
                .walk_forward_efficiency
                .ok_or(RecordError::IncompleteMetrics("walk_forward_efficiency"))?,
            in_sample_return: self
                .in_sample_return
                .ok_or(RecordError::IncompleteMetrics("in_sample_return"))?,
            out_sample_return: self
                .out_sample_return
                .ok_or(RecordError::IncompleteMetrics("out_sample_return"))?,
            consistency_score: self
                .consistency_score
                .ok_or(RecordError::IncompleteMetrics("consistency_score"))?,
            sample_size: self
                .sample_size
                .ok_or(RecordError::IncompleteMetrics("sample_size"))?,
            years_of_data: self
                .years_of_data
                .ok_or(RecordError::IncompleteMetrics("years_of_data"))?,
            recent_performance: self
                .recent_performance
                .ok_or(RecordError::IncompleteMetrics("recent_performance"))?,
            last_occurrence_date: parse_optional_date(
                "last_occurrence_date",
                self.last_occurrence_date.as_deref(),
            )?,
            sharpe_ratio: self.sharpe_ratio,
            max_drawdown: self.max_drawdown,
            win_rate: self.win_rate,
        }))
    }
}

impl TryFrom<&PatternRecord> for Pattern {
    type Error = RecordError;

    fn try_from(rec: &PatternRecord) -> Result<Self, Self::Error> {
        let detected_at = DateTime::parse_from_rfc3339(&rec.detected_at)
            .map_err(|_| RecordError::InvalidDate {
                field: "detected_at",
                value: rec.detected_at.clone(),
            })?
            .with_timezone(&Utc);

        let historical_occurrences = rec
            .historical_occurrences
            .iter()
            .map(PatternOccurrence::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Pattern {
            id: rec.pattern_id.clone(),
            pattern_type: rec.pattern_type,
            name: rec.name.clone(),
            description: rec.description.clone(),
            ticker: rec.ticker.clone(),
            sector: rec.sector.clone(),
            market_cap: rec.market_cap.clone(),
            cycle_length_days: rec.cycle_length_days,
            frequency: rec.frequency,
            next_occurrence: parse_optional_date("next_occurrence", rec.next_occurrence.as_deref())?,
            window_start_day: rec.window_start_day,
            window_end_day: rec.window_end_day,
            validation_metrics: rec.metrics()?,
            reliability_score: rec.reliability_score,
            confidence: rec.confidence,
            historical_occurrences,
            economic_rationale: rec.economic_rationale.clone(),
            risk_factors: rec.risk_factors.clone(),
            detected_at,
            detector_version: rec.detector_version.clone(),
            parameters: rec.parameters.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_pattern() -> Pattern {
        let mut parameters = BTreeMap::new();
        parameters.insert("effect".to_string(), serde_json::json!("january"));
        parameters.insert("families_tested".to_string(), serde_json::json!(4));

        Pattern {
            id: "calendar:january:SPY".to_string(),
            pattern_type: PatternType::Calendar,
            name: "January Effect".to_string(),
            description: "Returns in January exceed the rest of the year".to_string(),
            ticker: Some("SPY".to_string()),
            sector: None,
            market_cap: Some("large".to_string()),
            cycle_length_days: Some(365),
            frequency: Frequency::Annual,
            next_occurrence: Some(date(2027, 1, 1)),
            window_start_day: Some(1),
            window_end_day: Some(31),
            validation_metrics: Some(ValidationMetrics {
                p_value: 0.0004,
                effect_size: 0.93,
                statistical_power: 0.99,
                walk_forward_efficiency: 0.87,
                in_sample_return: 0.0101,
                out_sample_return: 0.0088,
                consistency_score: 0.25,
                sample_size: 10,
                years_of_data: 10.0,
                recent_performance: 0.21,
                last_occurrence_date: Some(date(2026, 1, 30)),
                sharpe_ratio: Some(1.4),
                max_drawdown: Some(0.12),
                win_rate: None,
            }),
            reliability_score: 81.5,
            confidence: 99.0,
            historical_occurrences: vec![
                PatternOccurrence::new(date(2025, 1, 2), date(2025, 1, 31), 0.19)
                    .with_confidence(99.0),
                PatternOccurrence::new(date(2026, 1, 2), date(2026, 1, 30), 0.22)
                    .with_confidence(99.0)
                    .with_volume_change(0.05)
                    .with_notes("strong start"),
            ],
            economic_rationale: Some("Tax-loss selling reverses".to_string()),
            risk_factors: vec!["Effect may be arbitraged away".to_string()],
            detected_at: Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap(),
            detector_version: "calendar-1.0".to_string(),
            parameters,
        }
    }

    #[test]
    fn test_round_trip_is_lossless() {
        let pattern = sample_pattern();
        let record = PatternRecord::from(&pattern);
        let json = record.to_json().unwrap();
        let restored_record = PatternRecord::from_json(&json).unwrap();
        let restored = Pattern::try_from(&restored_record).unwrap();

        assert_eq!(restored, pattern);
        assert_eq!(restored.reliability_score, pattern.reliability_score);
        assert_eq!(restored.confidence, pattern.confidence);
        assert_eq!(restored.occurrence_count(), 2);
    }

    #[test]
    fn test_dates_are_iso_8601() {
        let record = PatternRecord::from(&sample_pattern());
        assert_eq!(record.next_occurrence.as_deref(), Some("2027-01-01"));
        assert_eq!(record.last_occurrence_date.as_deref(), Some("2026-01-30"));
        assert_eq!(record.historical_occurrences[0].start_date, "2025-01-02");
    }

    #[test]
    fn test_pattern_without_metrics() {
        let mut pattern = sample_pattern();
        pattern.validation_metrics = None;
        let record = PatternRecord::from(&pattern);
        assert!(record.p_value.is_none());

        let restored = Pattern::try_from(&record).unwrap();
        assert!(restored.validation_metrics.is_none());
    }

    #[test]
    fn test_invalid_date_rejected() {
        let mut record = PatternRecord::from(&sample_pattern());
        record.next_occurrence = Some("01/01/2027".to_string());
        let result = Pattern::try_from(&record);
        assert!(matches!(result, Err(RecordError::InvalidDate { field: "next_occurrence", .. })));
    }

    #[test]
    fn test_partial_metrics_rejected() {
        let mut record = PatternRecord::from(&sample_pattern());
        record.walk_forward_efficiency = None;
        let result = Pattern::try_from(&record);
        assert!(matches!(
            result,
            Err(RecordError::IncompleteMetrics("walk_forward_efficiency"))
        ));
    }
}

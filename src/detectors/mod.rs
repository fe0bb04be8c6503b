//! Pattern Detectors
//!
//! Each detector fetches history through the `MarketDataSource` port, proposes
//! candidates, validates them and emits scored `Pattern`s. Scoring and gating
//! live in `scoring` and `params` and are shared through the `PatternDetector` trait.

pub mod calendar;
pub mod params;
pub mod scoring;
pub mod seasonal;

pub use calendar::CalendarEffectsDetector;
pub use params::{
    CalendarConfig, CalendarEffect, DetectionThresholds, ParamError, SeasonalConfig,
    SeasonalPeriod,
};
pub use scoring::{
    bonferroni_correction, calculate_confidence, calculate_effect_size,
    calculate_reliability_score,
};
pub use seasonal::{SeasonalCandidate, SeasonalCycleDetector};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use thiserror::Error;

use crate::domain::{MarketFrame, Pattern, ValidationMetrics};
use crate::models::ModelError;
use crate::ports::{MarketDataError, MarketDataSource};
use crate::validation::ValidationError;

/// Detection errors
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("no market data for {ticker}")]
    DataUnavailable { ticker: String },

    #[error("insufficient history: need {required} trading days, have {available}")]
    InsufficientHistory { required: usize, available: usize },

    #[error("insufficient walk-forward windows: found {found}, need {required}")]
    InsufficientWindows { found: usize, required: usize },

    #[error("seasonal strength {strength:.3} below minimum {min:.3}")]
    WeakSeasonality { strength: f64, min: f64 },

    #[error("model fit failed: {0}")]
    ModelFit(#[from] ModelError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("market data error: {0}")]
    MarketData(#[from] MarketDataError),

    #[error("detection task failed: {0}")]
    TaskFailed(String),
}

impl From<ValidationError> for DetectionError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::InsufficientWindows { found, required } => {
                DetectionError::InsufficientWindows { found, required }
            }
            other => DetectionError::InvalidInput(other.to_string()),
        }
    }
}

/// Shared detector capability
#[async_trait]
pub trait PatternDetector: Send + Sync {
    /// Short detector name used in ids and logs
    fn name(&self) -> &'static str;

    fn thresholds(&self) -> &DetectionThresholds;

    /// Reference date for recency gating and next-occurrence projection
    fn as_of(&self) -> NaiveDate;

    /// Fetch history for `ticker` and return every pattern that survives validation.
    ///
    /// Missing data yields an empty list rather than an error.
    async fn detect(
        &self,
        ticker: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Pattern>, DetectionError>;

    /// Recompute metrics for a previously detected pattern against `frame`
    fn validate_pattern(
        &self,
        pattern: &Pattern,
        frame: &MarketFrame,
    ) -> Result<ValidationMetrics, DetectionError>;

    fn meets_minimum_criteria(&self, metrics: &ValidationMetrics) -> bool {
        self.thresholds().meets_minimum_criteria(metrics, self.as_of())
    }
}

/// Today's date in UTC
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Fetch bars through the port and derive returns and calendar features.
///
/// An empty result maps to `DataUnavailable`.
pub async fn fetch_market_data(
    source: &dyn MarketDataSource,
    ticker: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<MarketFrame, DetectionError> {
    let mut raw = match source.fetch(ticker, start, end).await {
        Ok(raw) => raw,
        Err(MarketDataError::NoData { .. }) => {
            return Err(DetectionError::DataUnavailable {
                ticker: ticker.to_string(),
            })
        }
        Err(e) => return Err(e.into()),
    };

    raw.sort_by_key(|bar| bar.date);
    raw.dedup_by_key(|bar| bar.date);

    let frame = MarketFrame::from_ohlcv(ticker, &raw);
    if frame.is_empty() {
        return Err(DetectionError::DataUnavailable {
            ticker: ticker.to_string(),
        });
    }

    tracing::debug!(
        ticker,
        bars = frame.len(),
        first = ?frame.first_date(),
        last = ?frame.last_date(),
        "market data loaded"
    );
    Ok(frame)
}

/// Run CPU-bound detection work off the async executor, re-raising panics
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T, DetectionError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(value) => Ok(value),
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(DetectionError::TaskFailed(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::market_data::{MockMarketDataSource, Ohlcv};

    fn bar(d: u32, close: f64) -> Ohlcv {
        Ohlcv {
            date: NaiveDate::from_ymd_opt(2024, 4, d).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000.0,
        }
    }

    #[tokio::test]
    async fn test_fetch_sorts_and_derives() {
        let mut mock = MockMarketDataSource::new();
        mock.expect_fetch()
            .returning(|_, _, _| Ok(vec![bar(3, 102.0), bar(1, 100.0), bar(2, 101.0), bar(2, 101.0)]));

        let frame = fetch_market_data(&mock, "SPY", None, None).await.unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.ticker(), "SPY");
        assert!((frame.bars()[0].returns - 0.01).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_fetch_no_data_is_unavailable() {
        let mut mock = MockMarketDataSource::new();
        mock.expect_fetch().returning(|t, _, _| {
            Err(MarketDataError::NoData {
                ticker: t.to_string(),
            })
        });

        let result = fetch_market_data(&mock, "SPY", None, None).await;
        assert!(matches!(result, Err(DetectionError::DataUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_fetch_single_bar_is_unavailable() {
        let mut mock = MockMarketDataSource::new();
        mock.expect_fetch().returning(|_, _, _| Ok(vec![bar(1, 100.0)]));

        let result = fetch_market_data(&mock, "SPY", None, None).await;
        assert!(matches!(result, Err(DetectionError::DataUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_fetch_propagates_parse_errors() {
        let mut mock = MockMarketDataSource::new();
        mock.expect_fetch()
            .returning(|_, _, _| Err(MarketDataError::Parse("bad row".into())));

        let result = fetch_market_data(&mock, "SPY", None, None).await;
        assert!(matches!(result, Err(DetectionError::MarketData(_))));
    }

    #[test]
    fn test_validation_error_conversion() {
        let err: DetectionError = ValidationError::InsufficientWindows { found: 1, required: 3 }.into();
        assert!(matches!(err, DetectionError::InsufficientWindows { found: 1, required: 3 }));

        let err: DetectionError = ValidationError::SignalLength { expected: 2, got: 1 }.into();
        assert!(matches!(err, DetectionError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_run_blocking_returns_value() {
        let value = run_blocking(|| 21 * 2).await.unwrap();
        assert_eq!(value, 42);
    }
}

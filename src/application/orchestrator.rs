//! Detection Orchestrator
//!
//! Runs a set of detectors over a list of tickers with bounded concurrency.
//! Each (detector, ticker) job is isolated: failures are logged and collected
//! in the report, never aborting the batch. Panics are re-raised.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::detectors::{
    calculate_confidence, calculate_reliability_score, fetch_market_data, run_blocking,
    DetectionError, PatternDetector,
};
use crate::domain::{Pattern, PatternType, ValidationMetrics};
use crate::ports::MarketDataSource;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("No detectors configured")]
    NoDetectors,
    #[error("No detector handles {0} patterns")]
    NoDetectorFor(PatternType),
    #[error("Pattern {0} has no ticker")]
    MissingTicker(String),
    #[error(transparent)]
    Detection(#[from] DetectionError),
}

/// One failed (detector, ticker) job
#[derive(Debug, Clone, Serialize)]
pub struct DetectionFailure {
    pub ticker: String,
    pub detector: String,
    pub error: String,
}

/// Outcome of a batch run
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// Patterns per ticker, every requested ticker present
    pub patterns: BTreeMap<String, Vec<Pattern>>,
    pub failures: Vec<DetectionFailure>,
    pub jobs: usize,
}

impl BatchReport {
    pub fn total_patterns(&self) -> usize {
        self.patterns.values().map(Vec::len).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// All patterns, highest reliability first
    pub fn ranked(&self) -> Vec<&Pattern> {
        let mut all: Vec<&Pattern> = self.patterns.values().flatten().collect();
        all.sort_by(|a, b| b.reliability_score.total_cmp(&a.reliability_score));
        all
    }
}

/// Fresh metrics and scores for a stored pattern
#[derive(Debug, Clone, Serialize)]
pub struct Revalidation {
    pub pattern_id: String,
    pub metrics: ValidationMetrics,
    pub reliability_score: f64,
    pub confidence: f64,
    pub meets_criteria: bool,
}

/// Runs detectors over tickers
pub struct DetectionOrchestrator {
    detectors: Vec<Arc<dyn PatternDetector>>,
    max_concurrency: usize,
}

impl DetectionOrchestrator {
    pub fn new(detectors: Vec<Arc<dyn PatternDetector>>) -> Self {
        Self {
            detectors,
            max_concurrency: 4,
        }
    }

    /// Set maximum number of concurrent jobs (at least 1)
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn detectors(&self) -> &[Arc<dyn PatternDetector>] {
        &self.detectors
    }

    /// Run every detector on every ticker
    pub async fn run(
        &self,
        tickers: &[String],
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<BatchReport, OrchestratorError> {
        if self.detectors.is_empty() {
            return Err(OrchestratorError::NoDetectors);
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut jobs = JoinSet::new();
        let mut report = BatchReport::default();

        for ticker in tickers {
            report.patterns.entry(ticker.clone()).or_default();

            for detector in &self.detectors {
                let detector = Arc::clone(detector);
                let semaphore = Arc::clone(&semaphore);
                let ticker = ticker.clone();
                report.jobs += 1;

                jobs.spawn(async move {
                    let _permit = semaphore.acquire_owned().await;
                    let result = detector.detect(&ticker, start, end).await;
                    (ticker, detector.name(), result)
                });
            }
        }

        tracing::info!(
            tickers = tickers.len(),
            detectors = self.detectors.len(),
            jobs = report.jobs,
            "batch detection started"
        );

        while let Some(joined) = jobs.join_next().await {
            let (ticker, detector, result) = match joined {
                Ok(done) => done,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => {
                    tracing::error!(error = %e, "detection job cancelled");
                    report.failures.push(DetectionFailure {
                        ticker: String::new(),
                        detector: String::new(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            match result {
                Ok(patterns) => {
                    tracing::debug!(%ticker, detector, found = patterns.len(), "job finished");
                    report.patterns.entry(ticker).or_default().extend(patterns);
                }
                Err(e) => {
                    tracing::warn!(%ticker, detector, error = %e, "detection failed");
                    report.failures.push(DetectionFailure {
                        ticker,
                        detector: detector.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        for patterns in report.patterns.values_mut() {
            patterns.sort_by(|a, b| b.reliability_score.total_cmp(&a.reliability_score));
        }

        tracing::info!(
            patterns = report.total_patterns(),
            failures = report.failures.len(),
            "batch detection complete"
        );
        Ok(report)
    }

    /// Re-run validation of a stored pattern against current data
    pub async fn revalidate(
        &self,
        pattern: &Pattern,
        source: &dyn MarketDataSource,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Revalidation, OrchestratorError> {
        let detector = self
            .detector_for(pattern.pattern_type)
            .ok_or(OrchestratorError::NoDetectorFor(pattern.pattern_type))?;
        let ticker = pattern
            .ticker
            .clone()
            .ok_or_else(|| OrchestratorError::MissingTicker(pattern.id.clone()))?;

        let frame = fetch_market_data(source, &ticker, start, end).await?;

        let owned = pattern.clone();
        let worker = Arc::clone(&detector);
        let metrics = run_blocking(move || worker.validate_pattern(&owned, &frame)).await??;

        let revalidation = Revalidation {
            pattern_id: pattern.id.clone(),
            reliability_score: calculate_reliability_score(&metrics),
            confidence: calculate_confidence(metrics.p_value, metrics.effect_size),
            meets_criteria: detector.meets_minimum_criteria(&metrics),
            metrics,
        };

        tracing::info!(
            id = %revalidation.pattern_id,
            reliability = revalidation.reliability_score,
            meets_criteria = revalidation.meets_criteria,
            "pattern revalidated"
        );
        Ok(revalidation)
    }

    fn detector_for(&self, pattern_type: PatternType) -> Option<Arc<dyn PatternDetector>> {
        let name = match pattern_type {
            PatternType::Calendar => "calendar",
            PatternType::Seasonal => "seasonal",
            _ => return None,
        };
        self.detectors.iter().find(|d| d.name() == name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::DetectionThresholds;
    use crate::domain::MarketFrame;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Detector returning canned results per ticker and tracking concurrency
    struct StubDetector {
        thresholds: DetectionThresholds,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl StubDetector {
        fn new() -> Self {
            Self {
                thresholds: DetectionThresholds::default(),
                active: Arc::new(AtomicUsize::new(0)),
                peak: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    fn pattern(ticker: &str, reliability: f64) -> Pattern {
        let json = format!(
            r#"{{"id":"calendar:january:{t}","pattern_type":"CALENDAR","name":"January Effect",
            "description":"","ticker":"{t}","sector":null,"market_cap":null,"cycle_length_days":365,
            "frequency":"annual","next_occurrence":null,"window_start_day":1,"window_end_day":31,
            "validation_metrics":null,"reliability_score":{r},"confidence":50.0,
            "historical_occurrences":[],"economic_rationale":null,"risk_factors":[],
            "detected_at":"2024-12-31T00:00:00Z","detector_version":"test","parameters":{{}}}}"#,
            t = ticker,
            r = reliability
        );
        serde_json::from_str(&json).unwrap()
    }

    #[async_trait]
    impl PatternDetector for StubDetector {
        fn name(&self) -> &'static str {
            "calendar"
        }

        fn thresholds(&self) -> &DetectionThresholds {
            &self.thresholds
        }

        fn as_of(&self) -> NaiveDate {
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()
        }

        async fn detect(
            &self,
            ticker: &str,
            _start: Option<NaiveDate>,
            _end: Option<NaiveDate>,
        ) -> Result<Vec<Pattern>, DetectionError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            match ticker {
                "FAIL" => Err(DetectionError::InvalidInput("broken feed".into())),
                "EMPTY" => Ok(Vec::new()),
                t => Ok(vec![pattern(t, 40.0), pattern(t, 80.0)]),
            }
        }

        fn validate_pattern(
            &self,
            _pattern: &Pattern,
            _frame: &MarketFrame,
        ) -> Result<ValidationMetrics, DetectionError> {
            Err(DetectionError::InvalidInput("not supported".into()))
        }
    }

    fn tickers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let orchestrator = DetectionOrchestrator::new(vec![Arc::new(StubDetector::new())]);
        let report = orchestrator
            .run(&tickers(&["SPY", "FAIL", "EMPTY"]), None, None)
            .await
            .unwrap();

        assert_eq!(report.jobs, 3);
        assert_eq!(report.total_patterns(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].ticker, "FAIL");
        assert_eq!(report.failures[0].detector, "calendar");
        assert!(report.patterns["EMPTY"].is_empty());
        assert!(report.patterns.contains_key("FAIL"));
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn test_patterns_sorted_by_reliability() {
        let orchestrator = DetectionOrchestrator::new(vec![Arc::new(StubDetector::new())]);
        let report = orchestrator.run(&tickers(&["QQQ"]), None, None).await.unwrap();

        let scores: Vec<f64> = report.patterns["QQQ"].iter().map(|p| p.reliability_score).collect();
        assert_eq!(scores, vec![80.0, 40.0]);
        assert_eq!(report.ranked()[0].reliability_score, 80.0);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let stub = StubDetector::new();
        let peak = Arc::clone(&stub.peak);
        let orchestrator = DetectionOrchestrator::new(vec![Arc::new(stub)]).with_max_concurrency(2);

        let names: Vec<String> = (0..8).map(|i| format!("T{}", i)).collect();
        let report = orchestrator.run(&names, None, None).await.unwrap();

        assert_eq!(report.jobs, 8);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_no_detectors() {
        let orchestrator = DetectionOrchestrator::new(Vec::new());
        let result = orchestrator.run(&tickers(&["SPY"]), None, None).await;
        assert!(matches!(result, Err(OrchestratorError::NoDetectors)));
    }

    #[tokio::test]
    async fn test_revalidate_requires_matching_detector() {
        let orchestrator = DetectionOrchestrator::new(vec![Arc::new(StubDetector::new())]);
        let source = crate::ports::InMemoryMarketData::new();

        let mut seasonal = pattern("SPY", 50.0);
        seasonal.pattern_type = PatternType::Seasonal;
        let result = orchestrator.revalidate(&seasonal, &source, None, None).await;
        assert!(matches!(result, Err(OrchestratorError::NoDetectorFor(PatternType::Seasonal))));

        let mut orphan = pattern("SPY", 50.0);
        orphan.ticker = None;
        let result = orchestrator.revalidate(&orphan, &source, None, None).await;
        assert!(matches!(result, Err(OrchestratorError::MissingTicker(_))));

        let result = orchestrator.revalidate(&pattern("SPY", 50.0), &source, None, None).await;
        assert!(matches!(
            result,
            Err(OrchestratorError::Detection(DetectionError::DataUnavailable { .. }))
        ));
    }
}

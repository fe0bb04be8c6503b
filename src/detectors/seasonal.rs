//! Seasonal Cycle Detector
//!
//! For each candidate period (annual, quarterly, monthly in trading days):
//! 1. additive decomposition of closes; reject weak seasonality
//! 2. SARIMA order search at the period (deadline bounded)
//! 3. cycle peaks of the seasonal component; each cycle's rising leg
//!    (trough to peak) becomes an occurrence
//! 4. Welch test of rising-leg returns vs the rest, walk-forward on the
//!    rising-leg signal, scoring and gating
//!
//! A failed fit, weak seasonality, short history or missing walk-forward
//! windows drop only the affected period.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde_json::json;
use statrs::statistics::Statistics;

use super::params::{DetectionThresholds, SeasonalConfig, SeasonalPeriod};
use super::scoring::{calculate_confidence, calculate_effect_size, calculate_reliability_score};
use super::{fetch_market_data, run_blocking, today, DetectionError, PatternDetector};
use crate::domain::{MarketBar, MarketFrame, Pattern, PatternOccurrence, PatternType, ValidationMetrics};
use crate::models::{auto_fit, decompose, Decomposition, SarimaFit};
use crate::ports::MarketDataSource;
use crate::validation::{
    statistical_power, welch_t_test, ConsistencyAnalyzer, RecentPerformanceAnalyzer,
    SignalDirection, WalkForwardConfig, WalkForwardReport, WalkForwardValidator, DEFAULT_ALPHA,
    DEFAULT_RECENT_OCCURRENCES,
};

pub const SEASONAL_DETECTOR_VERSION: &str = concat!("seasonal/", env!("CARGO_PKG_VERSION"));

/// History must span this many periods
const MIN_PERIODS_OF_HISTORY: usize = 3;
/// A peak this far (in periods) from the last cycle start opens a new cycle
const CYCLE_GAP_RATIO: f64 = 0.8;

/// Decomposition, model and cycles found at one period
#[derive(Debug, Clone)]
pub struct SeasonalCandidate {
    pub period: SeasonalPeriod,
    pub strength: f64,
    pub fit: SarimaFit,
    pub decomposition: Decomposition,
    /// Bar indices of the cycle peaks
    pub peaks: Vec<usize>,
    pub occurrences: Vec<PatternOccurrence>,
}

/// Statistics of the rising-leg signal
struct Measurement {
    metrics: ValidationMetrics,
    report: WalkForwardReport,
    mean_active: f64,
    mean_baseline: f64,
    t_statistic: f64,
}

/// Detects multi-period seasonality for a ticker
#[derive(Clone)]
pub struct SeasonalCycleDetector {
    source: Arc<dyn MarketDataSource>,
    thresholds: DetectionThresholds,
    config: SeasonalConfig,
    walk_forward: WalkForwardConfig,
    as_of: Option<NaiveDate>,
}

impl SeasonalCycleDetector {
    pub fn new(source: Arc<dyn MarketDataSource>) -> Self {
        Self {
            source,
            thresholds: DetectionThresholds::default(),
            config: SeasonalConfig::default(),
            walk_forward: WalkForwardConfig::default(),
            as_of: None,
        }
    }

    pub fn with_thresholds(mut self, thresholds: DetectionThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_config(mut self, config: SeasonalConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_walk_forward(mut self, walk_forward: WalkForwardConfig) -> Self {
        self.walk_forward = walk_forward;
        self
    }

    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = Some(as_of);
        self
    }

    pub fn config(&self) -> &SeasonalConfig {
        &self.config
    }

    /// Run every configured period over an already loaded frame
    pub fn detect_in_frame(&self, frame: &MarketFrame) -> Result<Vec<Pattern>, DetectionError> {
        let patterns = collect_periods(frame.ticker(), &self.config.periods, |period| {
            self.evaluate_period(frame, period)
        })?;

        tracing::info!(
            ticker = frame.ticker(),
            patterns = patterns.len(),
            "seasonal detection complete"
        );
        Ok(patterns)
    }

    /// Decompose, fit and extract cycles at one period without any gating beyond
    /// the strength threshold.
    pub fn analyze_period(
        &self,
        frame: &MarketFrame,
        period: SeasonalPeriod,
    ) -> Result<SeasonalCandidate, DetectionError> {
        let decomposition = decompose_frame(frame, period)?;
        let strength = decomposition.seasonal_strength();
        if strength < self.config.min_seasonal_strength {
            return Err(DetectionError::WeakSeasonality {
                strength,
                min: self.config.min_seasonal_strength,
            });
        }

        let deadline = Instant::now() + StdDuration::from_secs(self.config.fit_deadline_secs);
        let fit = auto_fit(
            &frame.closes(),
            period.trading_days(),
            &self.config.order_bounds(),
            Some(deadline),
        )?;
        tracing::debug!(
            ticker = frame.ticker(),
            %period,
            strength,
            order = %fit.order,
            aic = fit.aic,
            "seasonal model selected"
        );

        let peaks = find_cycle_peaks(&decomposition.seasonal, period.trading_days());
        let occurrences = rising_legs(frame.bars(), &decomposition.seasonal, &peaks, period.trading_days())
            .into_iter()
            .map(|o| o.with_confidence(strength * 100.0))
            .collect();

        Ok(SeasonalCandidate {
            period,
            strength,
            fit,
            decomposition,
            peaks,
            occurrences,
        })
    }

    fn evaluate_period(
        &self,
        frame: &MarketFrame,
        period: SeasonalPeriod,
    ) -> Result<Option<Pattern>, DetectionError> {
        let candidate = self.analyze_period(frame, period)?;

        if candidate.occurrences.len() < self.thresholds.min_occurrences {
            tracing::debug!(
                ticker = frame.ticker(),
                %period,
                occurrences = candidate.occurrences.len(),
                "too few seasonal cycles"
            );
            return Ok(None);
        }

        let measurement = match self.measure(frame, period, &candidate.occurrences) {
            Ok(m) => m,
            Err(DetectionError::InsufficientWindows { found, required }) => {
                tracing::debug!(ticker = frame.ticker(), %period, found, required, "walk-forward unavailable, rejecting");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if !self.thresholds.meets_minimum_criteria(&measurement.metrics, self.as_of()) {
            tracing::debug!(
                ticker = frame.ticker(),
                %period,
                p = measurement.metrics.p_value,
                wfe = measurement.metrics.walk_forward_efficiency,
                "seasonal candidate below thresholds"
            );
            return Ok(None);
        }

        Ok(Some(self.build_pattern(frame, candidate, measurement)))
    }

    fn measure(
        &self,
        frame: &MarketFrame,
        period: SeasonalPeriod,
        occurrences: &[PatternOccurrence],
    ) -> Result<Measurement, DetectionError> {
        let bars = frame.bars();
        let windows: Vec<(NaiveDate, NaiveDate)> =
            occurrences.iter().map(|o| (o.start_date, o.end_date)).collect();
        let signal = |slice: &[MarketBar]| in_windows_mask(slice, &windows);

        let mask = signal(bars);
        let (active, baseline): (Vec<f64>, Vec<f64>) = {
            let mut active = Vec::new();
            let mut baseline = Vec::new();
            for (bar, on) in bars.iter().zip(mask.iter()) {
                if *on {
                    active.push(bar.returns);
                } else {
                    baseline.push(bar.returns);
                }
            }
            (active, baseline)
        };

        let t_test = welch_t_test(&active, &baseline).ok_or(DetectionError::InsufficientHistory {
            required: 4,
            available: active.len().min(baseline.len()),
        })?;
        let effect_size = calculate_effect_size(&active, &baseline);

        let validator = WalkForwardValidator::new(self.walk_forward.clone());
        let report = validator.validate(bars, signal, SignalDirection::Long)?;

        let expected_cycles = bars.len() / period.trading_days();
        let metrics = ValidationMetrics {
            p_value: t_test.p_value,
            effect_size,
            statistical_power: statistical_power(effect_size.abs(), active.len(), DEFAULT_ALPHA),
            walk_forward_efficiency: report.walk_forward_efficiency,
            in_sample_return: report.in_sample_return,
            out_sample_return: report.out_sample_return,
            consistency_score: ConsistencyAnalyzer::consistency_score(occurrences.len(), expected_cycles),
            sample_size: occurrences.len(),
            years_of_data: frame.years_of_data(),
            recent_performance: RecentPerformanceAnalyzer::recent_performance(
                occurrences,
                DEFAULT_RECENT_OCCURRENCES,
            ),
            last_occurrence_date: occurrences.iter().map(|o| o.end_date).max(),
            sharpe_ratio: report.sharpe_ratio,
            max_drawdown: report.max_drawdown,
            win_rate: report.win_rate,
        };

        Ok(Measurement {
            metrics,
            report,
            mean_active: active.iter().mean(),
            mean_baseline: baseline.iter().mean(),
            t_statistic: t_test.t_statistic,
        })
    }

    fn build_pattern(
        &self,
        frame: &MarketFrame,
        candidate: SeasonalCandidate,
        measurement: Measurement,
    ) -> Pattern {
        let ticker = frame.ticker();
        let period = candidate.period;
        let trading_days = period.trading_days();
        let metrics = measurement.metrics;

        let confidence = calculate_confidence(metrics.p_value, metrics.effect_size);
        let reliability = calculate_reliability_score(&metrics);

        let phase = &candidate.decomposition.seasonal[..trading_days.min(candidate.decomposition.seasonal.len())];
        let trough_phase = argmin(phase).unwrap_or(0);
        let peak_phase = argmax(phase).unwrap_or(0);
        let amplitude = phase.iter().copied().fold(f64::NEG_INFINITY, f64::max)
            - phase.iter().copied().fold(f64::INFINITY, f64::min);

        let mut parameters = BTreeMap::new();
        parameters.insert("period".to_string(), json!(period.as_str()));
        parameters.insert("period_trading_days".to_string(), json!(trading_days));
        parameters.insert("seasonal_strength".to_string(), json!(candidate.strength));
        parameters.insert("seasonal_amplitude".to_string(), json!(amplitude));
        parameters.insert("sarima_order".to_string(), json!(candidate.fit.order.to_string()));
        parameters.insert("aic".to_string(), json!(candidate.fit.aic));
        parameters.insert("bic".to_string(), json!(candidate.fit.bic));
        parameters.insert("mean_active_return".to_string(), json!(measurement.mean_active));
        parameters.insert("mean_baseline_return".to_string(), json!(measurement.mean_baseline));
        parameters.insert(
            "t_statistic".to_string(),
            json!(measurement.t_statistic.is_finite().then_some(measurement.t_statistic)),
        );
        parameters.insert("active_days".to_string(), json!(measurement.report.active_days));

        let next = candidate
            .occurrences
            .iter()
            .map(|o| o.end_date)
            .max()
            .map(|last| project_next(last, period.calendar_days(), self.as_of()));

        let name = format!("{} Seasonal Cycle", capitalize(period.as_str()));
        let id = format!("seasonal:{}:{}", period, ticker);
        let description = format!(
            "{}-trading-day cycle in {} (strength {:.2}, {}): rising legs average {:.3}% per day vs {:.3}%",
            trading_days,
            ticker,
            candidate.strength,
            candidate.fit.order,
            measurement.mean_active * 100.0,
            measurement.mean_baseline * 100.0
        );

        tracing::info!(ticker, id = %id, reliability, confidence, "seasonal pattern detected");

        Pattern {
            id,
            pattern_type: PatternType::Seasonal,
            name,
            description,
            ticker: Some(ticker.to_string()),
            sector: None,
            market_cap: None,
            cycle_length_days: Some(period.calendar_days() as u32),
            frequency: period.frequency(),
            next_occurrence: next,
            window_start_day: Some(trough_phase as i32 + 1),
            window_end_day: Some(peak_phase as i32),
            validation_metrics: Some(metrics),
            reliability_score: reliability,
            confidence,
            historical_occurrences: candidate.occurrences,
            economic_rationale: Some(
                "Recurring flows (fiscal calendars, earnings seasons, fund rebalancing) repeat at this period"
                    .to_string(),
            ),
            risk_factors: vec![
                "Seasonal phase can drift as market structure changes".to_string(),
                "Decomposition on prices mixes trend regimes into the seasonal estimate".to_string(),
            ],
            detected_at: Utc::now(),
            detector_version: SEASONAL_DETECTOR_VERSION.to_string(),
            parameters,
        }
    }
}

#[async_trait]
impl PatternDetector for SeasonalCycleDetector {
    fn name(&self) -> &'static str {
        "seasonal"
    }

    fn thresholds(&self) -> &DetectionThresholds {
        &self.thresholds
    }

    fn as_of(&self) -> NaiveDate {
        self.as_of.unwrap_or_else(today)
    }

    async fn detect(
        &self,
        ticker: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Pattern>, DetectionError> {
        let frame = match fetch_market_data(self.source.as_ref(), ticker, start, end).await {
            Ok(frame) => frame,
            Err(DetectionError::DataUnavailable { ticker }) => {
                tracing::warn!(%ticker, "no market data, skipping seasonal detection");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let detector = self.clone();
        run_blocking(move || detector.detect_in_frame(&frame)).await?
    }

    fn validate_pattern(
        &self,
        pattern: &Pattern,
        frame: &MarketFrame,
    ) -> Result<ValidationMetrics, DetectionError> {
        let period = pattern
            .parameters
            .get("period_trading_days")
            .and_then(|v| v.as_u64())
            .and_then(|days| SeasonalPeriod::from_trading_days(days as usize))
            .ok_or_else(|| {
                DetectionError::InvalidInput(format!("{}: missing or unknown seasonal period", pattern.id))
            })?;

        let trading_days = period.trading_days();
        let decomposition = decompose_frame(frame, period)?;
        let peaks = find_cycle_peaks(&decomposition.seasonal, trading_days);
        let occurrences = rising_legs(frame.bars(), &decomposition.seasonal, &peaks, trading_days);

        Ok(self.measure(frame, period, &occurrences)?.metrics)
    }
}

/// Evaluate each period in turn. Fit failures, short history and weak seasonality
/// drop only their own period; anything else aborts the ticker.
fn collect_periods<F>(
    ticker: &str,
    periods: &[SeasonalPeriod],
    mut evaluate: F,
) -> Result<Vec<Pattern>, DetectionError>
where
    F: FnMut(SeasonalPeriod) -> Result<Option<Pattern>, DetectionError>,
{
    let mut patterns = Vec::new();
    for period in periods {
        match evaluate(*period) {
            Ok(Some(pattern)) => patterns.push(pattern),
            Ok(None) => {}
            Err(DetectionError::ModelFit(e)) => {
                tracing::warn!(ticker, %period, error = %e, "seasonal model fit failed");
            }
            Err(
                e @ (DetectionError::InsufficientHistory { .. }
                | DetectionError::WeakSeasonality { .. }),
            ) => {
                tracing::debug!(ticker, %period, reason = %e, "period skipped");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(patterns)
}

fn decompose_frame(frame: &MarketFrame, period: SeasonalPeriod) -> Result<Decomposition, DetectionError> {
    let required = period.trading_days() * MIN_PERIODS_OF_HISTORY;
    if frame.len() < required {
        return Err(DetectionError::InsufficientHistory {
            required,
            available: frame.len(),
        });
    }
    decompose(&frame.closes(), period.trading_days()).ok_or(DetectionError::InsufficientHistory {
        required,
        available: frame.len(),
    })
}

/// Local maxima over a centered window of `period / 4`, one per cycle.
///
/// A maximum opens a new cycle only once it is at least 0.8 periods past the
/// previous cycle's peak. Maxima whose window runs off either end are ignored.
pub fn find_cycle_peaks(seasonal: &[f64], period: usize) -> Vec<usize> {
    let n = seasonal.len();
    let half = (period / 4).max(1) / 2;
    let min_gap = CYCLE_GAP_RATIO * period as f64;

    let mut peaks: Vec<usize> = Vec::new();
    if n < 2 * half + 1 {
        return peaks;
    }

    for i in half..n - half {
        let window_max = seasonal[i - half..=i + half]
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        if seasonal[i] < window_max {
            continue;
        }
        match peaks.last() {
            Some(&last) if ((i - last) as f64) < min_gap => {}
            _ => peaks.push(i),
        }
    }
    peaks
}

/// Rising leg of each cycle: from the day after the trough preceding a peak to the peak
fn rising_legs(bars: &[MarketBar], seasonal: &[f64], peaks: &[usize], period: usize) -> Vec<PatternOccurrence> {
    let mut out = Vec::with_capacity(peaks.len());
    let mut previous: Option<usize> = None;

    for &peak in peaks {
        let from = previous.unwrap_or_else(|| peak.saturating_sub(period));
        previous = Some(peak);
        if from >= peak || peak >= bars.len() {
            continue;
        }

        let Some(trough) = argmin(&seasonal[from..peak]).map(|i| i + from) else {
            continue;
        };
        let first = trough + 1;
        if first > peak {
            continue;
        }

        let total: f64 = bars[first..=peak].iter().map(|b| b.returns).sum();
        out.push(PatternOccurrence::new(bars[first].date, bars[peak].date, total));
    }
    out
}

fn in_windows_mask(bars: &[MarketBar], windows: &[(NaiveDate, NaiveDate)]) -> Vec<bool> {
    bars.iter()
        .map(|b| {
            // Windows are sorted; find the last one starting on or before this bar
            let idx = windows.partition_point(|(start, _)| *start <= b.date);
            idx > 0 && b.date <= windows[idx - 1].1
        })
        .collect()
}

/// Step `last + period` forward by whole periods until it reaches `as_of`
fn project_next(last: NaiveDate, period_days: i64, as_of: NaiveDate) -> NaiveDate {
    let step = Duration::days(period_days.max(1));
    let mut next = last + step;
    if next < as_of {
        let behind = (as_of - next).num_days();
        let periods = (behind + period_days.max(1) - 1) / period_days.max(1);
        next += Duration::days(periods * period_days.max(1));
    }
    next
}

fn argmin(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
}

fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelError;
    use crate::ports::{InMemoryMarketData, Ohlcv};
    use chrono::{Datelike, Weekday};
    use std::f64::consts::PI;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Weekday closes following a sine of `period` trading days plus a small wobble
    fn sine_bars(start: NaiveDate, count: usize, period: usize, amplitude: f64) -> Vec<Ohlcv> {
        let mut out = Vec::with_capacity(count);
        let mut d = start;
        while out.len() < count {
            if !matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
                let i = out.len();
                let wobble = [0.3, -0.2, 0.1, -0.2][i % 4];
                let close = 100.0 + amplitude * (2.0 * PI * i as f64 / period as f64).sin() + wobble;
                out.push(Ohlcv {
                    date: d,
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 1_000.0,
                });
            }
            d += Duration::days(1);
        }
        out
    }

    fn fast_config() -> SeasonalConfig {
        SeasonalConfig::default()
            .with_periods(vec![SeasonalPeriod::Monthly])
            .with_order_bounds(1, 1, 1, 1)
    }

    fn detector(bars: Vec<Ohlcv>) -> SeasonalCycleDetector {
        SeasonalCycleDetector::new(Arc::new(InMemoryMarketData::new().with_bars("GLD", bars)))
            .with_config(fast_config())
    }

    #[test]
    fn test_peaks_one_per_cycle() {
        let seasonal: Vec<f64> = (0..21 * 6)
            .map(|i| (2.0 * PI * i as f64 / 21.0).sin())
            .collect();
        let peaks = find_cycle_peaks(&seasonal, 21);
        assert_eq!(peaks.len(), 6);
        for pair in peaks.windows(2) {
            assert_eq!(pair[1] - pair[0], 21);
        }
    }

    #[test]
    fn test_rising_legs_span_trough_to_peak() {
        let raw = sine_bars(date(2020, 1, 1), 21 * 8, 21, 5.0);
        let frame = MarketFrame::from_ohlcv("GLD", &raw);
        let seasonal: Vec<f64> = (1..=frame.len())
            .map(|i| (2.0 * PI * i as f64 / 21.0).sin())
            .collect();
        let peaks = find_cycle_peaks(&seasonal, 21);
        let legs = rising_legs(frame.bars(), &seasonal, &peaks, 21);

        assert!(!legs.is_empty());
        for leg in &legs {
            assert!(leg.start_date <= leg.end_date);
            assert!(leg.return_pct > 0.0, "rising leg lost money: {:?}", leg);
        }
    }

    #[test]
    fn test_window_mask() {
        let raw = sine_bars(date(2024, 1, 1), 10, 21, 1.0);
        let frame = MarketFrame::from_ohlcv("GLD", &raw);
        let windows = vec![(date(2024, 1, 3), date(2024, 1, 4)), (date(2024, 1, 10), date(2024, 1, 10))];
        let mask = in_windows_mask(frame.bars(), &windows);
        let active: Vec<NaiveDate> = frame
            .bars()
            .iter()
            .zip(mask.iter())
            .filter(|(_, on)| **on)
            .map(|(b, _)| b.date)
            .collect();
        assert_eq!(active, vec![date(2024, 1, 3), date(2024, 1, 4), date(2024, 1, 10)]);
    }

    #[test]
    fn test_project_next() {
        let last = date(2023, 1, 31);
        assert_eq!(project_next(last, 30, date(2023, 1, 31)), date(2023, 3, 2));
        assert_eq!(project_next(last, 30, date(2023, 3, 2)), date(2023, 3, 2));
        assert_eq!(project_next(last, 30, date(2023, 3, 3)), date(2023, 4, 1));
        assert!(project_next(last, 365, date(2026, 6, 1)) >= date(2026, 6, 1));
    }

    #[test]
    fn test_analyze_period_on_injected_cycle() {
        let raw = sine_bars(date(2018, 1, 1), 21 * 40, 21, 5.0);
        let frame = MarketFrame::from_ohlcv("GLD", &raw);
        let detector = detector(raw);

        let candidate = detector.analyze_period(&frame, SeasonalPeriod::Monthly).unwrap();
        assert!(candidate.strength > 0.3, "strength {}", candidate.strength);
        assert!(!candidate.occurrences.is_empty());
        assert_eq!(candidate.fit.order.period, 21);
        assert!(candidate.fit.aic.is_finite());
        assert!(candidate.occurrences.iter().all(|o| o.confidence > 30.0));
    }

    #[test]
    fn test_short_history_is_skipped() {
        let raw = sine_bars(date(2024, 1, 1), 40, 21, 5.0);
        let frame = MarketFrame::from_ohlcv("GLD", &raw);
        let detector = detector(raw);

        let result = detector.analyze_period(&frame, SeasonalPeriod::Monthly);
        assert!(matches!(result, Err(DetectionError::InsufficientHistory { required: 63, .. })));
        assert!(detector.detect_in_frame(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_weak_seasonality_rejected() {
        let raw = sine_bars(date(2018, 1, 1), 21 * 40, 21, 5.0);
        let frame = MarketFrame::from_ohlcv("GLD", &raw);
        let detector = detector(raw).with_config(fast_config().with_min_strength(1.01));
        let result = detector.analyze_period(&frame, SeasonalPeriod::Monthly);
        assert!(matches!(result, Err(DetectionError::WeakSeasonality { .. })));
    }

    #[test]
    fn test_detects_monthly_cycle() {
        // ~10 years of a 21-day cycle
        let raw = sine_bars(date(2015, 1, 1), 2_600, 21, 5.0);
        let frame = MarketFrame::from_ohlcv("GLD", &raw);
        let as_of = frame.last_date().unwrap();
        let detector = detector(raw).with_as_of(as_of);

        let patterns = detector.detect_in_frame(&frame).unwrap();
        assert_eq!(patterns.len(), 1);

        let pattern = &patterns[0];
        assert_eq!(pattern.id, "seasonal:monthly:GLD");
        assert_eq!(pattern.pattern_type, PatternType::Seasonal);
        assert!(pattern.parameter_str("sarima_order").is_some());
        assert!(pattern.parameter_f64("aic").is_some());
        let next = pattern.next_occurrence.unwrap();
        assert!(next >= as_of);
        let last_end = pattern.historical_occurrences.iter().map(|o| o.end_date).max().unwrap();
        let gap = (next - last_end).num_days();
        assert!(gap > 0 && gap % SeasonalPeriod::Monthly.calendar_days() == 0, "gap {}", gap);

        let metrics = pattern.validation_metrics.as_ref().unwrap();
        assert!(metrics.walk_forward_efficiency > 0.5);
        assert!(metrics.p_value < 0.001);

        let fresh = detector.validate_pattern(pattern, &frame).unwrap();
        assert_eq!(fresh.sample_size, metrics.sample_size);
    }

    #[test]
    fn test_fit_failure_skips_only_its_period() {
        let raw = sine_bars(date(2015, 1, 1), 2_600, 21, 5.0);
        let frame = MarketFrame::from_ohlcv("GLD", &raw);
        let detector = detector(raw).with_as_of(frame.last_date().unwrap());

        let mut evaluated = Vec::new();
        let periods = [SeasonalPeriod::Annual, SeasonalPeriod::Monthly];
        let patterns = collect_periods("GLD", &periods, |period| {
            evaluated.push(period);
            match period {
                SeasonalPeriod::Monthly => detector.evaluate_period(&frame, period),
                _ => Err(ModelError::DeadlineExceeded.into()),
            }
        })
        .unwrap();

        assert_eq!(evaluated, periods.to_vec());
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].id, "seasonal:monthly:GLD");
    }

    #[test]
    fn test_unexpected_error_aborts_periods() {
        let mut evaluated = 0;
        let periods = [SeasonalPeriod::Annual, SeasonalPeriod::Monthly];
        let result = collect_periods("GLD", &periods, |_| {
            evaluated += 1;
            Err(DetectionError::InvalidInput("bad frame".into()))
        });

        assert!(matches!(result, Err(DetectionError::InvalidInput(_))));
        assert_eq!(evaluated, 1);
    }

    #[test]
    fn test_expired_deadline_drops_period() {
        let raw = sine_bars(date(2018, 1, 1), 21 * 40, 21, 5.0);
        let frame = MarketFrame::from_ohlcv("GLD", &raw);
        let detector = detector(raw).with_config(SeasonalConfig {
            fit_deadline_secs: 0,
            ..fast_config()
        });

        let result = detector.analyze_period(&frame, SeasonalPeriod::Monthly);
        assert!(matches!(result, Err(DetectionError::ModelFit(ModelError::DeadlineExceeded))));
        assert!(detector.detect_in_frame(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_insufficient_windows_rejects_candidate() {
        // 20 monthly cycles: strong seasonality, well under two years of dates
        let raw = sine_bars(date(2020, 1, 1), 21 * 20, 21, 5.0);
        let frame = MarketFrame::from_ohlcv("GLD", &raw);
        let detector = detector(raw)
            .with_thresholds(DetectionThresholds::default().with_min_occurrences(5))
            .with_as_of(frame.last_date().unwrap());

        let candidate = detector.analyze_period(&frame, SeasonalPeriod::Monthly).unwrap();
        assert!(candidate.occurrences.len() >= 10);

        let measured = detector.measure(&frame, SeasonalPeriod::Monthly, &candidate.occurrences);
        assert!(matches!(
            measured,
            Err(DetectionError::InsufficientWindows { found: 0, required: 3 })
        ));
        assert!(detector.detect_in_frame(&frame).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_detect_missing_ticker_is_empty() {
        let detector = detector(Vec::new());
        assert!(detector.detect("GLD", None, None).await.unwrap().is_empty());
    }
}

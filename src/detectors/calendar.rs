//! Calendar Effects Detector
//!
//! Tests fixed calendar anomalies against the rest of the trading days:
//! - January: January returns beat the other months
//! - Monday: Monday returns differ from the rest of the week (either sign)
//! - Turn of month: first three trading days plus the last trading day of each month
//! - Day of week: each weekday on its own (either sign)
//!
//! Each family is a boolean mask over trading days. Survivors of the first gate
//! are Bonferroni-corrected by the number of families tested and gated again.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use serde_json::json;
use statrs::statistics::Statistics;

use super::params::{CalendarConfig, CalendarEffect, DetectionThresholds};
use super::scoring::{
    bonferroni_correction, calculate_confidence, calculate_effect_size,
    calculate_reliability_score,
};
use super::{fetch_market_data, run_blocking, today, DetectionError, PatternDetector};
use crate::domain::{
    Frequency, MarketBar, MarketFrame, Pattern, PatternOccurrence, PatternType, ValidationMetrics,
};
use crate::ports::MarketDataSource;
use crate::validation::{
    statistical_power, welch_t_test, ConsistencyAnalyzer, RecentPerformanceAnalyzer,
    SignalDirection, StatisticalTester, TTestResult, ValidationError, WalkForwardConfig,
    WalkForwardReport, WalkForwardValidator, DEFAULT_ALPHA, DEFAULT_RECENT_OCCURRENCES,
};

pub const CALENDAR_DETECTOR_VERSION: &str = concat!("calendar/", env!("CARGO_PKG_VERSION"));

/// Added to the occurrence count to form the consistency denominator
const CONSISTENCY_PADDING: usize = 50;
/// Leading trading days of a month counted as turn of month
const TURN_OF_MONTH_LEADING_DAYS: usize = 3;

const TRADING_WEEKDAYS: [Weekday; 5] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
];

/// Which trading days a calendar family marks as active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CalendarSignal {
    January,
    Weekday(Weekday),
    TurnOfMonth,
}

impl CalendarSignal {
    fn mask(&self, bars: &[MarketBar]) -> Vec<bool> {
        match self {
            CalendarSignal::January => bars.iter().map(|b| b.month == 1).collect(),
            CalendarSignal::Weekday(day) => {
                let idx = day.num_days_from_monday();
                bars.iter().map(|b| b.day_of_week == idx).collect()
            }
            CalendarSignal::TurnOfMonth => turn_of_month_mask(bars),
        }
    }

    /// Key of the occurrence a bar belongs to
    fn occurrence_key(&self, bar: &MarketBar) -> (i32, u32) {
        match self {
            CalendarSignal::January => (bar.date.year(), 1),
            CalendarSignal::Weekday(_) => bar.iso_week(),
            CalendarSignal::TurnOfMonth => bar.year_month(),
        }
    }

    /// January and turn of month only count as effects when they beat the baseline
    fn positive_only(&self) -> bool {
        !matches!(self, CalendarSignal::Weekday(_))
    }
}

/// First three and last trading day of every (year, month) in `bars`.
///
/// A month cut off by the start of `bars` only keeps its last day, one cut off by
/// the end only keeps its first three: those edges were never observed.
pub fn turn_of_month_mask(bars: &[MarketBar]) -> Vec<bool> {
    let mut mask = vec![false; bars.len()];
    let mut start = 0;
    while start < bars.len() {
        let key = bars[start].year_month();
        let mut end = start;
        while end < bars.len() && bars[end].year_month() == key {
            end += 1;
        }
        if start > 0 || opens_month(bars[start].date) {
            for flag in mask.iter_mut().take(end).skip(start).take(TURN_OF_MONTH_LEADING_DAYS) {
                *flag = true;
            }
        }
        if end < bars.len() || closes_month(bars[end - 1].date) {
            mask[end - 1] = true;
        }
        start = end;
    }
    mask
}

/// No weekday of the month precedes `date`
fn opens_month(date: NaiveDate) -> bool {
    (1..date.day())
        .filter_map(|day| date.with_day(day))
        .all(is_weekend)
}

/// No weekday of the month follows `date`
fn closes_month(date: NaiveDate) -> bool {
    let last = last_day_of_month(date);
    date.iter_days()
        .skip(1)
        .take_while(|d| *d <= last)
        .all(is_weekend)
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Raw comparison of active vs baseline days
struct SignalTest {
    active: Vec<f64>,
    t_test: TTestResult,
    effect_size: f64,
    mean_active: f64,
    mean_baseline: f64,
}

fn test_signal(bars: &[MarketBar], mask: &[bool]) -> Option<SignalTest> {
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

    let t_test = welch_t_test(&active, &baseline)?;
    Some(SignalTest {
        effect_size: calculate_effect_size(&active, &baseline),
        mean_active: active.iter().mean(),
        mean_baseline: baseline.iter().mean(),
        active,
        t_test,
    })
}

/// A candidate with uncorrected metrics
struct Candidate {
    effect: CalendarEffect,
    signal: CalendarSignal,
    direction: SignalDirection,
    test: SignalTest,
    report: Option<WalkForwardReport>,
    occurrences: Vec<PatternOccurrence>,
    metrics: ValidationMetrics,
}

/// Detects calendar anomalies for a ticker
#[derive(Clone)]
pub struct CalendarEffectsDetector {
    source: Arc<dyn MarketDataSource>,
    thresholds: DetectionThresholds,
    config: CalendarConfig,
    walk_forward: WalkForwardConfig,
    as_of: Option<NaiveDate>,
}

impl CalendarEffectsDetector {
    pub fn new(source: Arc<dyn MarketDataSource>) -> Self {
        Self {
            source,
            thresholds: DetectionThresholds::default(),
            config: CalendarConfig::default(),
            walk_forward: WalkForwardConfig::default(),
            as_of: None,
        }
    }

    pub fn with_thresholds(mut self, thresholds: DetectionThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_config(mut self, config: CalendarConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_walk_forward(mut self, walk_forward: WalkForwardConfig) -> Self {
        self.walk_forward = walk_forward;
        self
    }

    /// Pin the reference date instead of using today
    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = Some(as_of);
        self
    }

    pub fn config(&self) -> &CalendarConfig {
        &self.config
    }

    /// Run every configured family over an already loaded frame
    pub fn detect_in_frame(&self, frame: &MarketFrame) -> Result<Vec<Pattern>, DetectionError> {
        let bars = frame.bars();
        let mut candidates = Vec::new();

        for effect in &self.config.effects {
            match effect {
                CalendarEffect::January => {
                    candidates.extend(self.evaluate(frame, *effect, CalendarSignal::January, false)?);
                }
                CalendarEffect::Monday => {
                    let signal = CalendarSignal::Weekday(Weekday::Mon);
                    candidates.extend(self.evaluate(frame, *effect, signal, false)?);
                }
                CalendarEffect::TurnOfMonth => {
                    candidates.extend(self.evaluate(frame, *effect, CalendarSignal::TurnOfMonth, false)?);
                }
                CalendarEffect::DayOfWeek => {
                    for day in TRADING_WEEKDAYS {
                        let signal = CalendarSignal::Weekday(day);
                        candidates.extend(self.evaluate(frame, *effect, signal, true)?);
                    }
                }
                CalendarEffect::Holiday => {
                    tracing::debug!(ticker = frame.ticker(), "holiday effect has no test, skipping");
                }
            }
        }

        let families = self.config.effects.len();
        let as_of = self.as_of();
        let mut patterns = Vec::new();

        for candidate in candidates {
            let corrected = bonferroni_correction(candidate.metrics.p_value, families);
            let metrics = candidate.metrics.with_p_value(corrected);
            if !self.thresholds.meets_minimum_criteria(&metrics, as_of) {
                tracing::debug!(
                    ticker = frame.ticker(),
                    effect = %candidate.effect,
                    raw_p = candidate.metrics.p_value,
                    corrected_p = corrected,
                    "candidate rejected after Bonferroni correction"
                );
                continue;
            }
            patterns.push(self.build_pattern(frame.ticker(), bars, candidate, metrics, families));
        }

        tracing::info!(
            ticker = frame.ticker(),
            patterns = patterns.len(),
            families,
            "calendar detection complete"
        );
        Ok(patterns)
    }

    /// Test one signal; `prefilter` drops it early on an uncorrected p above the threshold
    fn evaluate(
        &self,
        frame: &MarketFrame,
        effect: CalendarEffect,
        signal: CalendarSignal,
        prefilter: bool,
    ) -> Result<Option<Candidate>, DetectionError> {
        let bars = frame.bars();
        let mask = signal.mask(bars);
        let Some(test) = test_signal(bars, &mask) else {
            tracing::debug!(ticker = frame.ticker(), %effect, ?signal, "not enough active or baseline days");
            return Ok(None);
        };

        if signal.positive_only() && test.mean_active <= test.mean_baseline {
            tracing::debug!(ticker = frame.ticker(), %effect, "no positive edge over baseline");
            return Ok(None);
        }
        if prefilter && test.t_test.p_value > self.thresholds.min_p_value {
            tracing::debug!(
                ticker = frame.ticker(),
                ?signal,
                p = test.t_test.p_value,
                "weekday not significant"
            );
            return Ok(None);
        }

        let candidate = self.measure(frame, effect, signal, &mask, test)?;
        if !self.thresholds.meets_minimum_criteria(&candidate.metrics, self.as_of()) {
            tracing::debug!(
                ticker = frame.ticker(),
                %effect,
                ?signal,
                p = candidate.metrics.p_value,
                wfe = candidate.metrics.walk_forward_efficiency,
                occurrences = candidate.metrics.sample_size,
                "candidate below thresholds"
            );
            return Ok(None);
        }
        Ok(Some(candidate))
    }

    /// Walk-forward validate a tested signal and assemble its uncorrected metrics
    fn measure(
        &self,
        frame: &MarketFrame,
        effect: CalendarEffect,
        signal: CalendarSignal,
        mask: &[bool],
        test: SignalTest,
    ) -> Result<Candidate, DetectionError> {
        let bars = frame.bars();
        let direction = if signal.positive_only() {
            SignalDirection::Long
        } else {
            SignalDirection::from_effect(test.mean_active - test.mean_baseline)
        };
        let sign = direction.sign();

        let validator = WalkForwardValidator::new(self.walk_forward.clone());
        let report = match validator.validate(bars, |slice| signal.mask(slice), direction) {
            Ok(report) => Some(report),
            Err(ValidationError::InsufficientWindows { found, required }) => {
                tracing::debug!(
                    ticker = frame.ticker(),
                    %effect,
                    found,
                    required,
                    "walk-forward unavailable, using fallback metrics"
                );
                None
            }
            Err(e) => return Err(e.into()),
        };

        let occurrences = group_occurrences(bars, mask, signal);
        let (wfe, in_sample, out_sample) = match &report {
            Some(r) => (r.walk_forward_efficiency, r.in_sample_return, r.out_sample_return),
            None => (0.0, sign * test.mean_active, 0.0),
        };

        let metrics = ValidationMetrics {
            p_value: test.t_test.p_value,
            effect_size: test.effect_size,
            statistical_power: statistical_power(test.effect_size.abs(), test.active.len(), DEFAULT_ALPHA),
            walk_forward_efficiency: wfe,
            in_sample_return: in_sample,
            out_sample_return: out_sample,
            consistency_score: ConsistencyAnalyzer::consistency_score(
                occurrences.len(),
                occurrences.len() + CONSISTENCY_PADDING,
            ),
            sample_size: occurrences.len(),
            years_of_data: frame.years_of_data(),
            recent_performance: sign
                * RecentPerformanceAnalyzer::recent_performance(&occurrences, DEFAULT_RECENT_OCCURRENCES),
            last_occurrence_date: occurrences.iter().map(|o| o.end_date).max(),
            sharpe_ratio: report.as_ref().and_then(|r| r.sharpe_ratio),
            max_drawdown: report.as_ref().and_then(|r| r.max_drawdown),
            win_rate: report.as_ref().and_then(|r| r.win_rate),
        };

        Ok(Candidate {
            effect,
            signal,
            direction,
            test,
            report,
            occurrences,
            metrics,
        })
    }

    fn build_pattern(
        &self,
        ticker: &str,
        bars: &[MarketBar],
        candidate: Candidate,
        metrics: ValidationMetrics,
        families: usize,
    ) -> Pattern {
        let Candidate {
            effect,
            signal,
            direction,
            test,
            report,
            occurrences,
            ..
        } = candidate;

        let confidence = calculate_confidence(metrics.p_value, metrics.effect_size);
        let reliability = calculate_reliability_score(&metrics);
        let occurrences: Vec<PatternOccurrence> = occurrences
            .into_iter()
            .map(|o| o.with_confidence(confidence))
            .collect();

        let mut parameters = BTreeMap::new();
        parameters.insert("effect".to_string(), json!(effect.as_str()));
        parameters.insert("families_tested".to_string(), json!(families));
        parameters.insert("direction".to_string(), json!(direction));
        parameters.insert("mean_active_return".to_string(), json!(test.mean_active));
        parameters.insert("mean_baseline_return".to_string(), json!(test.mean_baseline));
        parameters.insert("t_statistic".to_string(), json!(finite_or_null(test.t_test.t_statistic)));
        parameters.insert("uncorrected_p_value".to_string(), json!(test.t_test.p_value));
        parameters.insert("active_days".to_string(), json!(test.active.len()));
        if let CalendarSignal::Weekday(day) = signal {
            parameters.insert("weekday".to_string(), json!(weekday_name(day)));
        }

        let tester = StatisticalTester::new(self.config.bootstrap_resamples, self.config.bootstrap_seed);
        let directional: Vec<f64> = test.active.iter().map(|r| direction.sign() * r).collect();
        if let Some((lower, upper)) =
            tester.bootstrap_confidence_interval(&directional, self.config.confidence_level)
        {
            parameters.insert("bootstrap_ci_lower".to_string(), json!(lower));
            parameters.insert("bootstrap_ci_upper".to_string(), json!(upper));
            parameters.insert("bootstrap_level".to_string(), json!(self.config.confidence_level));
        }
        if let Some(r) = &report {
            if let Some(chi) = r
                .win_rate
                .and_then(|w| tester.chi_square_test(w, r.active_days, 0.5))
            {
                parameters.insert("win_rate_chi_square".to_string(), json!(chi.statistic));
                parameters.insert("win_rate_p_value".to_string(), json!(chi.p_value));
            }
        }

        let (name, frequency, cycle, window) = match signal {
            CalendarSignal::January => ("January Effect".to_string(), Frequency::Annual, 365, (1, 31)),
            CalendarSignal::TurnOfMonth => {
                ("Turn-of-Month Effect".to_string(), Frequency::Monthly, 30, (-1, 3))
            }
            CalendarSignal::Weekday(day) => {
                let n = day.number_from_monday() as i32;
                (format!("{} Effect", capitalize(weekday_name(day))), Frequency::Weekly, 7, (n, n))
            }
        };

        let id = match signal {
            CalendarSignal::Weekday(day) if effect == CalendarEffect::DayOfWeek => {
                format!("calendar:{}:{}:{}", effect, weekday_name(day), ticker)
            }
            _ => format!("calendar:{}:{}", effect, ticker),
        };

        let description = format!(
            "{} in {}: active days average {:.3}% vs {:.3}% otherwise ({} trading days, {} occurrences)",
            name,
            ticker,
            test.mean_active * 100.0,
            test.mean_baseline * 100.0,
            bars.len(),
            occurrences.len()
        );

        tracing::info!(
            ticker,
            id = %id,
            reliability,
            confidence,
            p = metrics.p_value,
            "calendar pattern detected"
        );

        Pattern {
            id,
            pattern_type: PatternType::Calendar,
            name,
            description,
            ticker: Some(ticker.to_string()),
            sector: None,
            market_cap: None,
            cycle_length_days: Some(cycle),
            frequency,
            next_occurrence: Some(next_occurrence(signal, self.as_of())),
            window_start_day: Some(window.0),
            window_end_day: Some(window.1),
            validation_metrics: Some(metrics),
            reliability_score: reliability,
            confidence,
            historical_occurrences: occurrences,
            economic_rationale: Some(rationale(signal).to_string()),
            risk_factors: risk_factors(signal),
            detected_at: Utc::now(),
            detector_version: CALENDAR_DETECTOR_VERSION.to_string(),
            parameters,
        }
    }

    /// Rebuild the signal a stored pattern was detected with
    fn signal_for(pattern: &Pattern) -> Result<(CalendarEffect, CalendarSignal), DetectionError> {
        let effect: CalendarEffect = pattern
            .parameter_str("effect")
            .ok_or_else(|| DetectionError::InvalidInput(format!("{}: missing effect parameter", pattern.id)))?
            .parse()
            .map_err(|e: super::params::ParamError| DetectionError::InvalidInput(e.to_string()))?;

        let signal = match effect {
            CalendarEffect::January => CalendarSignal::January,
            CalendarEffect::Monday => CalendarSignal::Weekday(Weekday::Mon),
            CalendarEffect::TurnOfMonth => CalendarSignal::TurnOfMonth,
            CalendarEffect::DayOfWeek => {
                let name = pattern.parameter_str("weekday").ok_or_else(|| {
                    DetectionError::InvalidInput(format!("{}: missing weekday parameter", pattern.id))
                })?;
                let day = TRADING_WEEKDAYS
                    .into_iter()
                    .find(|d| weekday_name(*d) == name)
                    .ok_or_else(|| DetectionError::InvalidInput(format!("unknown weekday {}", name)))?;
                CalendarSignal::Weekday(day)
            }
            CalendarEffect::Holiday => {
                return Err(DetectionError::InvalidInput("holiday effect cannot be validated".into()))
            }
        };
        Ok((effect, signal))
    }
}

#[async_trait]
impl PatternDetector for CalendarEffectsDetector {
    fn name(&self) -> &'static str {
        "calendar"
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
                tracing::warn!(%ticker, "no market data, skipping calendar detection");
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
        let (effect, signal) = Self::signal_for(pattern)?;
        let bars = frame.bars();
        let mask = signal.mask(bars);
        let test = test_signal(bars, &mask).ok_or(DetectionError::InsufficientHistory {
            required: 4,
            available: bars.len(),
        })?;

        let families = pattern
            .parameters
            .get("families_tested")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(self.config.effects.len());

        let candidate = self.measure(frame, effect, signal, &mask, test)?;
        let corrected = bonferroni_correction(candidate.metrics.p_value, families);
        Ok(candidate.metrics.with_p_value(corrected))
    }
}

/// Group active bars into occurrences, summing returns within each group
fn group_occurrences(bars: &[MarketBar], mask: &[bool], signal: CalendarSignal) -> Vec<PatternOccurrence> {
    let avg_volume = bars.iter().map(|b| b.volume).mean();
    let mut groups: BTreeMap<(i32, u32), Vec<&MarketBar>> = BTreeMap::new();
    for (bar, on) in bars.iter().zip(mask.iter()) {
        if *on {
            groups.entry(signal.occurrence_key(bar)).or_default().push(bar);
        }
    }

    groups
        .into_values()
        .filter_map(|group| {
            let first = group.first()?;
            let last = group.last()?;
            let total: f64 = group.iter().map(|b| b.returns).sum();
            let mut occurrence = PatternOccurrence::new(first.date, last.date, total);
            if avg_volume.is_finite() && avg_volume > 0.0 {
                let group_volume = group.iter().map(|b| b.volume).sum::<f64>() / group.len() as f64;
                occurrence = occurrence.with_volume_change(group_volume / avg_volume - 1.0);
            }
            Some(occurrence)
        })
        .collect()
}

/// Next start of the calendar window on or after `as_of`
fn next_occurrence(signal: CalendarSignal, as_of: NaiveDate) -> NaiveDate {
    match signal {
        CalendarSignal::January => {
            if as_of.month() == 1 && as_of.day() == 1 {
                as_of
            } else {
                NaiveDate::from_ymd_opt(as_of.year() + 1, 1, 1).unwrap_or(as_of)
            }
        }
        CalendarSignal::Weekday(day) => (0..7)
            .map(|i| as_of + Duration::days(i))
            .find(|d| d.weekday() == day)
            .unwrap_or(as_of),
        CalendarSignal::TurnOfMonth => {
            if as_of.day() as usize <= TURN_OF_MONTH_LEADING_DAYS {
                as_of
            } else {
                last_day_of_month(as_of)
            }
        }
    }
}

fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.pred_opt())
        .unwrap_or(date)
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn finite_or_null(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

fn rationale(signal: CalendarSignal) -> &'static str {
    match signal {
        CalendarSignal::January => {
            "Year-end tax-loss selling reverses in January as investors rebuild positions"
        }
        CalendarSignal::TurnOfMonth => {
            "Month-end pension contributions and payroll inflows concentrate buying around the turn of the month"
        }
        CalendarSignal::Weekday(Weekday::Mon) => {
            "Weekend news accumulates and is priced in at the Monday open"
        }
        CalendarSignal::Weekday(_) => "Recurring weekly flows concentrate on this weekday",
    }
}

fn risk_factors(signal: CalendarSignal) -> Vec<String> {
    let mut risks = vec![
        "Calendar anomalies weaken once widely traded".to_string(),
        "Transaction costs can exceed the per-occurrence edge".to_string(),
    ];
    match signal {
        CalendarSignal::January => {
            risks.push("Tax law changes alter year-end selling pressure".to_string())
        }
        CalendarSignal::TurnOfMonth => {
            risks.push("Holiday-shifted month ends move the active window".to_string())
        }
        CalendarSignal::Weekday(_) => {
            risks.push("Single-day edges are sensitive to market-wide shocks".to_string())
        }
    }
    risks
}

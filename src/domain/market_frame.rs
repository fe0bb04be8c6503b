//! Market Frame
//!
//! Daily bars enriched with returns and calendar features. Built from raw
//! OHLCV history; every statistical component downstream works on slices of
//! `MarketBar`.

use chrono::{Datelike, NaiveDate};

use crate::ports::market_data::Ohlcv;

/// Average days per year used when converting a date span to years
pub const DAYS_PER_YEAR: f64 = 365.25;

/// One trading day with derived columns
#[derive(Debug, Clone, PartialEq)]
pub struct MarketBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Simple close-to-close return
    pub returns: f64,
    pub log_returns: f64,
    /// Monday = 0 .. Sunday = 6
    pub day_of_week: u32,
    pub day_of_month: u32,
    pub month: u32,
    pub quarter: u32,
    pub day_of_year: u32,
}

impl MarketBar {
    /// ISO (year, week) key of the bar's date
    pub fn iso_week(&self) -> (i32, u32) {
        let week = self.date.iso_week();
        (week.year(), week.week())
    }

    /// (year, month) key of the bar's date
    pub fn year_month(&self) -> (i32, u32) {
        (self.date.year(), self.month)
    }
}

/// Ordered daily bars for one ticker
#[derive(Debug, Clone, Default)]
pub struct MarketFrame {
    ticker: String,
    bars: Vec<MarketBar>,
}

impl MarketFrame {
    /// Derive returns and calendar features from raw bars.
    ///
    /// The first bar has no prior close and is dropped, as are bars whose
    /// previous close is not positive.
    pub fn from_ohlcv(ticker: impl Into<String>, raw: &[Ohlcv]) -> Self {
        let bars = raw
            .windows(2)
            .filter(|w| w[0].close > 0.0 && w[1].close > 0.0)
            .map(|w| {
                let (prev, cur) = (&w[0], &w[1]);
                let returns = cur.close / prev.close - 1.0;
                MarketBar {
                    date: cur.date,
                    open: cur.open,
                    high: cur.high,
                    low: cur.low,
                    close: cur.close,
                    volume: cur.volume,
                    returns,
                    log_returns: (cur.close / prev.close).ln(),
                    day_of_week: cur.date.weekday().num_days_from_monday(),
                    day_of_month: cur.date.day(),
                    month: cur.date.month(),
                    quarter: (cur.date.month() - 1) / 3 + 1,
                    day_of_year: cur.date.ordinal(),
                }
            })
            .collect();

        Self {
            ticker: ticker.into(),
            bars,
        }
    }

    /// Wrap already-derived bars
    pub fn from_bars(ticker: impl Into<String>, bars: Vec<MarketBar>) -> Self {
        Self {
            ticker: ticker.into(),
            bars,
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn bars(&self) -> &[MarketBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    pub fn returns(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.returns).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// Calendar span of the frame in years
    pub fn years_of_data(&self) -> f64 {
        years_between(self.bars())
    }
}

/// Calendar span of a bar slice in years
pub fn years_between(bars: &[MarketBar]) -> f64 {
    match (bars.first(), bars.last()) {
        (Some(first), Some(last)) => (last.date - first.date).num_days() as f64 / DAYS_PER_YEAR,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn raw(y: i32, m: u32, d: u32, close: f64) -> Ohlcv {
        Ohlcv {
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 500.0,
        }
    }

    #[test]
    fn test_returns_and_features() {
        let frame = MarketFrame::from_ohlcv(
            "SPY",
            &[raw(2024, 1, 5, 100.0), raw(2024, 1, 8, 102.0), raw(2024, 1, 9, 99.96)],
        );

        assert_eq!(frame.len(), 2);
        let first = &frame.bars()[0];
        assert_relative_eq!(first.returns, 0.02, epsilon = 1e-12);
        assert_relative_eq!(first.log_returns, (1.02f64).ln(), epsilon = 1e-12);
        // 2024-01-08 is a Monday
        assert_eq!(first.day_of_week, 0);
        assert_eq!(first.day_of_month, 8);
        assert_eq!(first.month, 1);
        assert_eq!(first.quarter, 1);
        assert_eq!(first.day_of_year, 8);

        assert_relative_eq!(frame.bars()[1].returns, -0.02, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_and_single_bar() {
        assert!(MarketFrame::from_ohlcv("SPY", &[]).is_empty());
        assert!(MarketFrame::from_ohlcv("SPY", &[raw(2024, 1, 5, 100.0)]).is_empty());
    }

    #[test]
    fn test_years_of_data() {
        let frame = MarketFrame::from_ohlcv(
            "SPY",
            &[raw(2020, 1, 1, 1.0), raw(2020, 1, 2, 1.0), raw(2022, 1, 1, 1.0)],
        );
        assert_relative_eq!(frame.years_of_data(), 730.0 / DAYS_PER_YEAR, epsilon = 1e-12);
    }
}

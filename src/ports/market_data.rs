//! Market Data Port
//!
//! Daily OHLCV history for a ticker. Implementations live in the adapters layer
//! (JSON files on disk, in-memory fixtures); vendors and caching are the
//! caller's concern.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Market data error type
#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("No market data for {ticker}")]
    NoData { ticker: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Data parsing error: {0}")]
    Parse(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// One trading day of OHLCV data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ohlcv {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Historical data source for daily bars
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch daily bars for `ticker`, ordered by date, bounded by the optional range (inclusive).
    ///
    /// Returns `MarketDataError::NoData` when nothing matches.
    async fn fetch(
        &self,
        ticker: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Ohlcv>, MarketDataError>;
}

/// Keep bars inside `[start, end]` and sort them by date
pub fn clip_to_range(
    mut bars: Vec<Ohlcv>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Vec<Ohlcv> {
    bars.retain(|b| start.map_or(true, |s| b.date >= s) && end.map_or(true, |e| b.date <= e));
    bars.sort_by_key(|b| b.date);
    bars.dedup_by_key(|b| b.date);
    bars
}

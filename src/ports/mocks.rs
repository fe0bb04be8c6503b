//! In-memory market data source for tests and offline runs

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::NaiveDate;

use super::market_data::{clip_to_range, MarketDataError, MarketDataSource, Ohlcv};

/// Market data source backed by a map of ticker -> bars. Records every fetch.
#[derive(Debug, Default, Clone)]
pub struct InMemoryMarketData {
    calls: Arc<Mutex<Vec<String>>>,
    bars: Arc<Mutex<HashMap<String, Vec<Ohlcv>>>>,
}

impl InMemoryMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to register history for a ticker
    pub fn with_bars(self, ticker: &str, bars: Vec<Ohlcv>) -> Self {
        self.bars
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(ticker.to_string(), bars);
        self
    }

    /// Get all recorded calls
    pub fn get_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl MarketDataSource for InMemoryMarketData {
    async fn fetch(
        &self,
        ticker: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Ohlcv>, MarketDataError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ticker.to_string());

        let stored = self
            .bars
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(ticker)
            .cloned()
            .unwrap_or_default();

        let bars = clip_to_range(stored, start, end);
        if bars.is_empty() {
            return Err(MarketDataError::NoData {
                ticker: ticker.to_string(),
            });
        }
        Ok(bars)
    }
}

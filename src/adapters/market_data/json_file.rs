//! JSON file market data source
//!
//! Reads `<data_dir>/<TICKER>.json`, a JSON array of daily bars:
//!
//! ```json
//! [{"date": "2024-01-02", "open": 1.0, "high": 1.1, "low": 0.9, "close": 1.05, "volume": 1200}]
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::ports::{clip_to_range, MarketDataError, MarketDataSource, Ohlcv};

/// Environment variable overriding the configured data directory
pub const DATA_DIR_ENV: &str = "CYCLESCOPE_DATA_DIR";

/// Market data backed by per-ticker JSON files
#[derive(Debug, Clone)]
pub struct JsonFileMarketData {
    data_dir: PathBuf,
}

impl JsonFileMarketData {
    /// Create a source rooted at `data_dir` (`~` and `$VARS` are expanded)
    pub fn new(data_dir: impl AsRef<str>) -> Self {
        let expanded = shellexpand::full(data_dir.as_ref())
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| data_dir.as_ref().to_string());
        Self {
            data_dir: PathBuf::from(expanded),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the file holding `ticker`'s history
    pub fn ticker_path(&self, ticker: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", ticker.trim().to_uppercase()))
    }
}

#[async_trait]
impl MarketDataSource for JsonFileMarketData {
    async fn fetch(
        &self,
        ticker: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Ohlcv>, MarketDataError> {
        let path = self.ticker_path(ticker);

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(ticker, path = %path.display(), "no data file");
                return Err(MarketDataError::NoData {
                    ticker: ticker.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let bars: Vec<Ohlcv> = serde_json::from_str(&content)
            .map_err(|e| MarketDataError::Parse(format!("{}: {}", path.display(), e)))?;

        if let Some(bad) = bars.iter().find(|b| !b.close.is_finite() || b.close <= 0.0) {
            return Err(MarketDataError::Parse(format!(
                "{}: invalid close {} on {}",
                path.display(),
                bad.close,
                bad.date
            )));
        }

        let bars = clip_to_range(bars, start, end);
        if bars.is_empty() {
            return Err(MarketDataError::NoData {
                ticker: ticker.to_string(),
            });
        }

        tracing::debug!(ticker, bars = bars.len(), "loaded bars from disk");
        Ok(bars)
    }
}

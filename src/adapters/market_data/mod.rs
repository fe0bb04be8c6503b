//! Market Data Adapters
//!
//! Concrete `MarketDataSource` implementations:
//! - `JsonFileMarketData`: one JSON document of daily bars per ticker on disk

mod json_file;

pub use json_file::{JsonFileMarketData, DATA_DIR_ENV};

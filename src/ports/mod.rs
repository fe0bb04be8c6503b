//! Ports Layer - Trait definitions for external dependencies
//!
//! Following hexagonal architecture, detectors only see the market data port;
//! concrete sources live in `adapters`.

pub mod market_data;
pub mod mocks;

pub use market_data::{clip_to_range, MarketDataError, MarketDataSource, Ohlcv};
pub use mocks::InMemoryMarketData;

//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - Market Data: per-ticker JSON files on disk
//! - CLI: Command-line interface handlers

pub mod cli;
pub mod market_data;

pub use cli::CliApp;
pub use market_data::JsonFileMarketData;

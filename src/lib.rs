//! Cyclescope - Cyclical Pattern Detection Library
//!
//! Finds calendar anomalies and seasonal cycles in daily market data and keeps
//! only those that survive significance testing, walk-forward validation and
//! multiple-testing correction.
//!
//! # Modules
//!
//! - `domain`: Pattern, ValidationMetrics, PatternOccurrence, enriched market bars
//! - `ports`: Trait abstractions (MarketDataSource)
//! - `validation`: Walk-forward validation, statistical tests, consistency scoring
//! - `models`: Seasonal decomposition and SARIMA fitting
//! - `detectors`: Calendar effects and seasonal cycle detectors, scoring and gating
//! - `adapters`: External implementations (JSON market data, CLI)
//! - `config`: Configuration loading and validation
//! - `application`: Batch orchestration

pub mod domain;
pub mod ports;
pub mod validation;
pub mod models;
pub mod detectors;
pub mod adapters;
pub mod config;
pub mod application;

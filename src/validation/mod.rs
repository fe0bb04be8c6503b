//! Validation Framework
//!
//! Statistical machinery shared by all detectors:
//! - `tester`: hypothesis tests, bootstrap, power
//! - `walk_forward`: rolling out-of-sample backtest
//! - `consistency`: occurrence regularity and recency scoring

pub mod consistency;
pub mod tester;
pub mod walk_forward;

pub use consistency::{ConsistencyAnalyzer, RecentPerformanceAnalyzer, DEFAULT_RECENT_OCCURRENCES};
pub use tester::{
    statistical_power, welch_t_test, ChiSquareResult, StatisticalTester, TTestResult,
    DEFAULT_ALPHA, DEFAULT_BOOTSTRAP_RESAMPLES,
};
pub use walk_forward::{
    max_drawdown, sharpe_ratio, SignalDirection, WalkForwardConfig, WalkForwardReport,
    WalkForwardValidator, WalkForwardWindow,
};

use thiserror::Error;

/// Errors raised while validating a signal
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("insufficient walk-forward windows: found {found}, need {required}")]
    InsufficientWindows { found: usize, required: usize },

    #[error("signal length mismatch: expected {expected} flags, got {got}")]
    SignalLength { expected: usize, got: usize },
}

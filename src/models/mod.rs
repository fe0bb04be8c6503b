//! Time-Series Models
//!
//! Decomposition and seasonal ARIMA fitting used by the seasonal cycle detector.

pub mod decomposition;
pub mod optimization;
pub mod sarima;

pub use decomposition::{centered_moving_average, decompose, Decomposition};
pub use optimization::{minimize, SimplexConfig, SimplexResult};
pub use sarima::{auto_fit, fit, OrderBounds, SarimaFit, SarimaOrder};

use thiserror::Error;

/// Model fitting errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("insufficient data: need {needed} observations, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("invalid model order {0}")]
    InvalidOrder(String),

    #[error("fit did not converge: {0}")]
    NoConvergence(String),

    #[error("order search exceeded its deadline")]
    DeadlineExceeded,
}

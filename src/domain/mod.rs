//! Domain Layer - Pattern result types and enriched market data
//!
//! Pure value types with no I/O. Detectors produce them, the service layer
//! stores them through `PatternRecord`.

pub mod market_frame;
pub mod pattern;
pub mod record;

pub use market_frame::{years_between, MarketBar, MarketFrame, DAYS_PER_YEAR};
pub use pattern::{Frequency, Pattern, PatternOccurrence, PatternType, ValidationMetrics};
pub use record::{OccurrenceRecord, PatternRecord, RecordError};

//! Consistency and Recency Scoring
//!
//! - `ConsistencyAnalyzer`: how regularly a pattern shows up across the periods it could have
//! - `RecentPerformanceAnalyzer`: how the pattern did in its latest occurrences

use crate::domain::PatternOccurrence;

/// Default number of recent occurrences averaged for recency
pub const DEFAULT_RECENT_OCCURRENCES: usize = 3;

/// Scores the occurrence rate of a pattern
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsistencyAnalyzer;

impl ConsistencyAnalyzer {
    /// Piecewise score of `occurrences / total_periods`.
    ///
    /// The low branch (`rate * 1.5`) is left unclamped; with the bands checked
    /// first it only sees rates below 0.4.
    pub fn consistency_score(occurrences: usize, total_periods: usize) -> f64 {
        if total_periods == 0 {
            return 0.0;
        }

        let rate = occurrences as f64 / total_periods as f64;
        if rate >= 0.8 {
            1.0
        } else if rate >= 0.6 {
            0.8 + (rate - 0.6)
        } else if rate >= 0.4 {
            0.6 + (rate - 0.4)
        } else {
            rate * 1.5
        }
    }
}

/// Scores the latest occurrences of a pattern
#[derive(Debug, Clone, Copy, Default)]
pub struct RecentPerformanceAnalyzer;

impl RecentPerformanceAnalyzer {
    /// Mean return of the `k` most recent occurrences by start date, 0 if none
    pub fn recent_performance(occurrences: &[PatternOccurrence], k: usize) -> f64 {
        if occurrences.is_empty() || k == 0 {
            return 0.0;
        }

        let mut sorted: Vec<&PatternOccurrence> = occurrences.iter().collect();
        sorted.sort_by_key(|o| std::cmp::Reverse(o.start_date));

        let recent: Vec<f64> = sorted.iter().take(k).map(|o| o.return_pct).collect();
        recent.iter().sum::<f64>() / recent.len() as f64
    }
}

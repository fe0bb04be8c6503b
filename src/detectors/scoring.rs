//! Pattern Scoring
//!
//! Composite reliability and confidence scores shared by every detector,
//! plus the effect-size and multiple-testing helpers they lean on.
//!
//! Reliability (0-100) accumulates capped components:
//! - significance: up to 30 (p-value bands plus an effect-size bonus)
//! - walk-forward efficiency: up to 25, running total capped at 55
//! - sample: occurrences and years of data, running total capped at 75
//! - recent performance: up to 15 when positive, running total capped at 90
//! - consistency: up to 10

use statrs::statistics::Statistics;

use crate::domain::ValidationMetrics;

/// Composite reliability score in [0, 100]
pub fn calculate_reliability_score(metrics: &ValidationMetrics) -> f64 {
    let p = sanitize_p(metrics.p_value);
    let effect = finite_or_zero(metrics.effect_size);

    let mut significance = if p <= 0.001 {
        30.0
    } else if p <= 0.01 {
        25.0
    } else if p <= 0.05 {
        20.0
    } else {
        (20.0 * (1.0 - p / 0.05)).max(0.0)
    };
    if effect > 0.8 {
        significance += 5.0;
    } else if effect > 0.5 {
        significance += 3.0;
    }
    let mut score = significance.min(30.0);

    let wfe = finite_or_zero(metrics.walk_forward_efficiency);
    score += if wfe >= 1.0 {
        25.0
    } else if wfe >= 0.8 {
        20.0
    } else if wfe >= 0.5 {
        15.0
    } else {
        15.0 * wfe / 0.5
    };
    score = score.min(55.0);

    let occurrences = (metrics.sample_size as f64 * 2.0).min(20.0);
    let years = finite_or_zero(metrics.years_of_data).min(10.0);
    score += occurrences * 0.6 + years * 0.4;
    score = score.min(75.0);

    let recent = finite_or_zero(metrics.recent_performance);
    if recent > 0.0 {
        score += (recent * 100.0).min(15.0);
    }
    score = score.min(90.0);

    score += finite_or_zero(metrics.consistency_score) * 10.0;

    score.clamp(0.0, 100.0)
}

/// Statistical confidence in [0, 100] from a p-value and effect size
pub fn calculate_confidence(p_value: f64, effect_size: f64) -> f64 {
    let p = sanitize_p(p_value);
    let mut confidence = if p <= 0.001 {
        99.0
    } else if p <= 0.01 {
        95.0
    } else if p <= 0.05 {
        90.0
    } else {
        (90.0 * (1.0 - p / 0.05)).max(0.0)
    };

    let effect = finite_or_zero(effect_size);
    if effect < 0.2 {
        confidence *= 0.8;
    } else if effect < 0.5 {
        confidence *= 0.9;
    }

    confidence.clamp(0.0, 100.0)
}

/// Cohen's d of `active` against `baseline` with the average of both sample variances.
///
/// 0 when either side has fewer than two values or the pooled deviation is 0.
pub fn calculate_effect_size(active: &[f64], baseline: &[f64]) -> f64 {
    if active.len() < 2 || baseline.len() < 2 {
        return 0.0;
    }
    let pooled = ((active.iter().variance() + baseline.iter().variance()) / 2.0).sqrt();
    if !pooled.is_finite() || pooled == 0.0 {
        return 0.0;
    }
    (active.iter().mean() - baseline.iter().mean()) / pooled
}

/// Bonferroni-adjusted p-value `min(1, p * n)`
pub fn bonferroni_correction(p_value: f64, n_tests: usize) -> f64 {
    (sanitize_p(p_value) * n_tests.max(1) as f64).min(1.0)
}

/// NaN and out-of-range p-values count as "no evidence"
fn sanitize_p(p: f64) -> f64 {
    if p.is_nan() {
        1.0
    } else {
        p.clamp(0.0, 1.0)
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn metrics() -> ValidationMetrics {
        ValidationMetrics {
            p_value: 0.0005,
            effect_size: 0.9,
            statistical_power: 0.95,
            walk_forward_efficiency: 1.2,
            in_sample_return: 0.01,
            out_sample_return: 0.012,
            consistency_score: 1.0,
            sample_size: 15,
            years_of_data: 12.0,
            recent_performance: 0.2,
            last_occurrence_date: None,
            sharpe_ratio: None,
            max_drawdown: None,
            win_rate: None,
        }
    }

    #[test]
    fn test_best_case_score() {
        // 30 + 25 + (12 + 4) + 15 + 10
        assert_relative_eq!(calculate_reliability_score(&metrics()), 96.0, epsilon = 1e-9);
    }

    #[test]
    fn test_reliability_components() {
        // p=0.03 -> 20, d=0.6 -> +3 = 23; wfe 0.6 -> 15 (38);
        // sample: min(20, 8)*0.6 + 6*0.4 = 7.2 (45.2); recent 0.05 -> 5 (50.2); consistency 0.5 -> 5
        let m = ValidationMetrics {
            p_value: 0.03,
            effect_size: 0.6,
            walk_forward_efficiency: 0.6,
            sample_size: 4,
            years_of_data: 6.0,
            recent_performance: 0.05,
            consistency_score: 0.5,
            ..metrics()
        };
        assert_relative_eq!(calculate_reliability_score(&m), 55.2, epsilon = 1e-9);
    }

    #[test]
    fn test_reliability_partial_bands() {
        // p=0.1 -> 0; wfe 0.25 -> 7.5; no sample; negative recency ignored
        let m = ValidationMetrics {
            p_value: 0.1,
            effect_size: 0.1,
            walk_forward_efficiency: 0.25,
            sample_size: 0,
            years_of_data: 0.0,
            recent_performance: -1.0,
            consistency_score: 0.0,
            ..metrics()
        };
        assert_relative_eq!(calculate_reliability_score(&m), 7.5, epsilon = 1e-9);
    }

    #[test]
    fn test_reliability_bounded() {
        let extremes = [
            ValidationMetrics {
                walk_forward_efficiency: -50.0,
                consistency_score: -3.0,
                ..metrics()
            },
            ValidationMetrics {
                p_value: f64::NAN,
                walk_forward_efficiency: f64::INFINITY,
                consistency_score: 40.0,
                ..metrics()
            },
        ];
        for m in extremes {
            let score = calculate_reliability_score(&m);
            assert!((0.0..=100.0).contains(&score), "score {}", score);
        }
    }

    #[test]
    fn test_confidence_bands() {
        assert_relative_eq!(calculate_confidence(0.0001, 1.0), 99.0);
        assert_relative_eq!(calculate_confidence(0.005, 1.0), 95.0);
        assert_relative_eq!(calculate_confidence(0.04, 1.0), 90.0);
        assert_relative_eq!(calculate_confidence(0.1, 1.0), 0.0);
        assert_relative_eq!(calculate_confidence(0.04, 0.1), 72.0, epsilon = 1e-9);
        assert_relative_eq!(calculate_confidence(0.04, -0.3), 72.0, epsilon = 1e-9);
        assert_eq!(calculate_confidence(f64::NAN, 1.0), 0.0);
        assert_eq!(calculate_confidence(2.0, 1.0), 0.0);
    }

    #[test]
    fn test_negative_effect_gets_no_bonus() {
        assert_relative_eq!(calculate_confidence(0.0005, -1.0), 79.2, epsilon = 1e-9);
        assert_relative_eq!(calculate_confidence(0.0005, f64::NAN), 79.2, epsilon = 1e-9);

        let negative = ValidationMetrics {
            p_value: 0.02,
            effect_size: -0.9,
            ..metrics()
        };
        let positive = ValidationMetrics {
            effect_size: 0.9,
            ..negative.clone()
        };
        // p=0.02 -> 20, +5 only for the positive side
        assert_relative_eq!(
            calculate_reliability_score(&positive) - calculate_reliability_score(&negative),
            5.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_effect_size() {
        let a = [0.01, 0.02, -0.01, 0.03];
        assert_eq!(calculate_effect_size(&a, &a), 0.0);
        assert_eq!(calculate_effect_size(&[1.0, 1.0], &[1.0, 1.0]), 0.0);
        assert_eq!(calculate_effect_size(&[1.0], &a), 0.0);

        // means 2 and 1, both variances 1 -> d = 1
        let d = calculate_effect_size(&[1.0, 2.0, 3.0], &[0.0, 1.0, 2.0]);
        assert_relative_eq!(d, 1.0, epsilon = 1e-12);
        assert_relative_eq!(calculate_effect_size(&[0.0, 1.0, 2.0], &[1.0, 2.0, 3.0]), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_bonferroni() {
        assert_relative_eq!(bonferroni_correction(0.04, 10), 0.4, epsilon = 1e-12);
        assert_eq!(bonferroni_correction(0.5, 10), 1.0);
        assert_eq!(bonferroni_correction(f64::NAN, 3), 1.0);

        let mut previous = 0.0;
        for n in 1..30 {
            let corrected = bonferroni_correction(0.003, n);
            assert!(corrected >= previous);
            previous = corrected;
        }
    }
}

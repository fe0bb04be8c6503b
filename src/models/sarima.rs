//! Seasonal ARIMA
//!
//! SARIMA(p,d,q)(P,D,Q)[s] estimated by conditional sum of squares (CSS) with a
//! bounded simplex search, plus an exhaustive order search ranked by AIC.
//!
//! After differencing, the model predicts
//! `w_t = c + sum a_k (w_{t-k} - c) + sum m_k e_{t-k}` where `a` and `m` are the
//! expanded products of the regular and seasonal lag polynomials:
//! - AR: `(1 - phi(B)) (1 - Phi(B^s))`
//! - MA: `(1 + theta(B)) (1 + Theta(B^s))`

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use super::optimization::{minimize, SimplexConfig};
use super::ModelError;

/// Coefficient bound keeping the polynomials stationary/invertible in practice
const COEFFICIENT_BOUND: f64 = 0.99;
/// Seasonal differencing is applied when it cuts variance below this ratio
const SEASONAL_DIFF_VARIANCE_RATIO: f64 = 0.7;

/// Model order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SarimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
    pub seasonal_p: usize,
    pub seasonal_d: usize,
    pub seasonal_q: usize,
    /// Seasonal period in observations
    pub period: usize,
}

impl SarimaOrder {
    /// Estimated coefficients (including the mean when undifferenced)
    pub fn num_params(&self) -> usize {
        let mean = usize::from(self.d + self.seasonal_d == 0);
        self.p + self.q + self.seasonal_p + self.seasonal_q + mean
    }

    fn max_ar_lag(&self) -> usize {
        self.p + self.seasonal_p * self.period
    }

    fn max_ma_lag(&self) -> usize {
        self.q + self.seasonal_q * self.period
    }
}

impl fmt::Display for SarimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({},{},{})({},{},{})[{}]",
            self.p, self.d, self.q, self.seasonal_p, self.seasonal_d, self.seasonal_q, self.period
        )
    }
}

/// Upper bounds for the automatic order search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBounds {
    pub max_p: usize,
    pub max_q: usize,
    pub max_seasonal_p: usize,
    pub max_seasonal_q: usize,
    pub max_d: usize,
    pub max_seasonal_d: usize,
}

impl Default for OrderBounds {
    fn default() -> Self {
        Self {
            max_p: 2,
            max_q: 2,
            max_seasonal_p: 1,
            max_seasonal_q: 1,
            max_d: 2,
            max_seasonal_d: 1,
        }
    }
}

/// A fitted model
#[derive(Debug, Clone)]
pub struct SarimaFit {
    pub order: SarimaOrder,
    pub intercept: f64,
    pub ar: Vec<f64>,
    pub ma: Vec<f64>,
    pub seasonal_ar: Vec<f64>,
    pub seasonal_ma: Vec<f64>,
    /// Conditional sum of squared residuals
    pub css: f64,
    pub residual_variance: f64,
    /// Observations contributing to the CSS
    pub n_obs: usize,
    pub aic: f64,
    pub bic: f64,
}

/// First differences applied `d` times
pub fn difference(series: &[f64], d: usize) -> Vec<f64> {
    let mut out = series.to_vec();
    for _ in 0..d {
        if out.len() < 2 {
            break;
        }
        out = out.windows(2).map(|w| w[1] - w[0]).collect();
    }
    out
}

/// Lag-`period` differences applied `d` times
pub fn seasonal_difference(series: &[f64], d: usize, period: usize) -> Vec<f64> {
    let mut out = series.to_vec();
    if period == 0 {
        return out;
    }
    for _ in 0..d {
        if out.len() <= period {
            break;
        }
        out = out[period..]
            .iter()
            .zip(out.iter())
            .map(|(cur, prev)| cur - prev)
            .collect();
    }
    out
}

/// Smallest `d <= max_d` after which further differencing stops reducing variance
pub fn choose_differencing(series: &[f64], max_d: usize) -> usize {
    let mut d = 0;
    let mut current = variance_or_inf(series);
    while d < max_d {
        let next = variance_or_inf(&difference(series, d + 1));
        if next < current {
            d += 1;
            current = next;
        } else {
            break;
        }
    }
    d
}

/// 1 when seasonal differencing cuts variance below 70%, else 0
pub fn choose_seasonal_differencing(series: &[f64], period: usize, max_d: usize) -> usize {
    if max_d == 0 || period < 2 || series.len() < 2 * period {
        return 0;
    }
    let before = variance_or_inf(series);
    let after = variance_or_inf(&seasonal_difference(series, 1, period));
    usize::from(after < before * SEASONAL_DIFF_VARIANCE_RATIO)
}

fn variance_or_inf(series: &[f64]) -> f64 {
    if series.len() < 2 {
        return f64::INFINITY;
    }
    let v = series.iter().variance();
    if v.is_finite() {
        v
    } else {
        f64::INFINITY
    }
}

/// Sparse lag polynomial of (lag, coefficient)
type LagTerms = Vec<(usize, f64)>;

/// Expand `(1 -/+ sum r_i B^i)(1 -/+ sum s_j B^{js})` into prediction weights.
///
/// `sign` is -1 for AR (cross terms subtract) and +1 for MA (cross terms add).
fn expand(regular: &[f64], seasonal: &[f64], period: usize, sign: f64) -> LagTerms {
    let mut terms: LagTerms = Vec::with_capacity(regular.len() * (seasonal.len() + 1) + seasonal.len());
    for (i, r) in regular.iter().enumerate() {
        terms.push((i + 1, *r));
    }
    for (j, s) in seasonal.iter().enumerate() {
        let seasonal_lag = (j + 1) * period;
        terms.push((seasonal_lag, *s));
        for (i, r) in regular.iter().enumerate() {
            terms.push((seasonal_lag + i + 1, sign * r * s));
        }
    }
    terms
}

/// Conditional sum of squares of a differenced series
fn conditional_sum_of_squares(
    w: &[f64],
    intercept: f64,
    ar: &LagTerms,
    ma: &LagTerms,
    start: usize,
) -> f64 {
    let n = w.len();
    if n <= start {
        return f64::INFINITY;
    }

    let mut residuals = vec![0.0; n];
    let mut css = 0.0;
    for t in start..n {
        let mut pred = intercept;
        for &(lag, coef) in ar {
            pred += coef * (w[t - lag] - intercept);
        }
        for &(lag, coef) in ma {
            pred += coef * residuals[t - lag];
        }
        let err = w[t] - pred;
        residuals[t] = err;
        css += err * err;
    }
    css
}

struct Unpacked<'a> {
    intercept: f64,
    ar: &'a [f64],
    ma: &'a [f64],
    seasonal_ar: &'a [f64],
    seasonal_ma: &'a [f64],
}

fn unpack<'a>(params: &'a [f64], order: &SarimaOrder, with_mean: bool) -> Unpacked<'a> {
    let (intercept, rest) = if with_mean {
        (params[0], &params[1..])
    } else {
        (0.0, params)
    };
    let (ar, rest) = rest.split_at(order.p);
    let (ma, rest) = rest.split_at(order.q);
    let (seasonal_ar, seasonal_ma) = rest.split_at(order.seasonal_p);
    Unpacked {
        intercept,
        ar,
        ma,
        seasonal_ar,
        seasonal_ma,
    }
}

/// Fit a fixed-order model to `series` (levels, before differencing)
pub fn fit(series: &[f64], order: SarimaOrder, simplex: &SimplexConfig) -> Result<SarimaFit, ModelError> {
    if order.period < 2 && (order.seasonal_p + order.seasonal_d + order.seasonal_q) > 0 {
        return Err(ModelError::InvalidOrder(order.to_string()));
    }

    let w = difference(&seasonal_difference(series, order.seasonal_d, order.period), order.d);
    let start = order.max_ar_lag().max(order.max_ma_lag());
    let k = order.num_params();
    let needed = start + k + 2;
    if w.len() < needed {
        return Err(ModelError::InsufficientData {
            needed,
            got: w.len(),
        });
    }

    let with_mean = order.d + order.seasonal_d == 0;
    let mean = w.iter().mean();

    let mut initial = Vec::with_capacity(k);
    let mut bounds = Vec::with_capacity(k);
    if with_mean {
        initial.push(mean);
        bounds.push((f64::NEG_INFINITY, f64::INFINITY));
    }
    for i in 0..order.p + order.q {
        let lag = if i < order.p { i + 1 } else { i - order.p + 1 };
        initial.push(0.1 / lag as f64);
        bounds.push((-COEFFICIENT_BOUND, COEFFICIENT_BOUND));
    }
    for _ in 0..order.seasonal_p + order.seasonal_q {
        initial.push(0.1);
        bounds.push((-COEFFICIENT_BOUND, COEFFICIENT_BOUND));
    }

    let objective = |params: &[f64]| {
        let u = unpack(params, &order, with_mean);
        let ar = expand(u.ar, u.seasonal_ar, order.period, -1.0);
        let ma = expand(u.ma, u.seasonal_ma, order.period, 1.0);
        conditional_sum_of_squares(&w, u.intercept, &ar, &ma, start)
    };

    let result = minimize(objective, &initial, &bounds, simplex);
    if !result.value.is_finite() {
        return Err(ModelError::NoConvergence(format!("{} produced a non-finite CSS", order)));
    }

    let n_obs = w.len() - start;
    let n = n_obs as f64;
    let residual_variance = (result.value / n).max(1e-12);
    let log_likelihood = -0.5 * n * (1.0 + residual_variance.ln() + (2.0 * std::f64::consts::PI).ln());
    let aic = -2.0 * log_likelihood + 2.0 * k as f64;
    let bic = -2.0 * log_likelihood + k as f64 * n.ln();

    let u = unpack(&result.point, &order, with_mean);
    Ok(SarimaFit {
        order,
        intercept: u.intercept,
        ar: u.ar.to_vec(),
        ma: u.ma.to_vec(),
        seasonal_ar: u.seasonal_ar.to_vec(),
        seasonal_ma: u.seasonal_ma.to_vec(),
        css: result.value,
        residual_variance,
        n_obs,
        aic,
        bic,
    })
}

/// Choose differencing orders, then fit every (p,q,P,Q) within `bounds` and keep the lowest AIC.
///
/// Stops with `DeadlineExceeded` once `deadline` passes.
pub fn auto_fit(
    series: &[f64],
    period: usize,
    bounds: &OrderBounds,
    deadline: Option<Instant>,
) -> Result<SarimaFit, ModelError> {
    let seasonal_d = choose_seasonal_differencing(series, period, bounds.max_seasonal_d);
    let d = choose_differencing(&seasonal_difference(series, seasonal_d, period), bounds.max_d);
    let simplex = SimplexConfig::default();

    let mut best: Option<SarimaFit> = None;
    let mut last_error = None;

    for p in 0..=bounds.max_p {
        for q in 0..=bounds.max_q {
            for seasonal_p in 0..=bounds.max_seasonal_p {
                for seasonal_q in 0..=bounds.max_seasonal_q {
                    if deadline.is_some_and(|limit| Instant::now() >= limit) {
                        return Err(ModelError::DeadlineExceeded);
                    }

                    let order = SarimaOrder {
                        p,
                        d,
                        q,
                        seasonal_p,
                        seasonal_d,
                        seasonal_q,
                        period,
                    };
                    match fit(series, order, &simplex) {
                        Ok(candidate) if candidate.aic.is_finite() => {
                            if best.as_ref().map_or(true, |b| candidate.aic < b.aic) {
                                best = Some(candidate);
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::trace!(order = %order, error = %e, "order rejected");
                            last_error = Some(e);
                        }
                    }
                }
            }
        }
    }

    best.ok_or_else(|| {
        last_error.unwrap_or_else(|| ModelError::NoConvergence("no candidate order fitted".into()))
    })
}

//! Bounded Nelder-Mead simplex minimizer used for model fitting

/// Simplex settings
#[derive(Debug, Clone)]
pub struct SimplexConfig {
    pub max_iter: usize,
    /// Stop once the spread of vertex values falls below this
    pub tolerance: f64,
    /// Initial offset added to each coordinate to build the simplex
    pub initial_step: f64,
}

impl Default for SimplexConfig {
    fn default() -> Self {
        Self {
            max_iter: 300,
            tolerance: 1e-10,
            initial_step: 0.1,
        }
    }
}

/// Minimum found by the simplex search
#[derive(Debug, Clone)]
pub struct SimplexResult {
    pub point: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Minimize `objective` starting at `initial`, clamping every vertex into `bounds`.
///
/// Non-finite objective values are treated as `+inf`.
pub fn minimize<F>(
    objective: F,
    initial: &[f64],
    bounds: &[(f64, f64)],
    config: &SimplexConfig,
) -> SimplexResult
where
    F: Fn(&[f64]) -> f64,
{
    let n = initial.len();
    let eval = |x: &[f64]| {
        let v = objective(x);
        if v.is_finite() {
            v
        } else {
            f64::INFINITY
        }
    };

    if n == 0 {
        return SimplexResult {
            point: Vec::new(),
            value: eval(&[]),
            iterations: 0,
            converged: true,
        };
    }

    let clamp = |x: Vec<f64>| -> Vec<f64> {
        x.into_iter()
            .enumerate()
            .map(|(i, v)| match bounds.get(i) {
                Some(&(lo, hi)) => v.clamp(lo, hi),
                None => v,
            })
            .collect()
    };

    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    simplex.push(clamp(initial.to_vec()));
    for i in 0..n {
        let mut vertex = initial.to_vec();
        // Step away from the bound if the start sits on it
        vertex[i] += config.initial_step;
        if let Some(&(_, hi)) = bounds.get(i) {
            if vertex[i] > hi {
                vertex[i] = initial[i] - config.initial_step;
            }
        }
        simplex.push(clamp(vertex));
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| eval(v)).collect();

    let mut iterations = 0;
    let mut converged = false;

    while iterations < config.max_iter {
        iterations += 1;

        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        let (best, second_worst, worst) = (order[0], order[n - 1], order[n]);

        let spread = values[worst] - values[best];
        if spread.is_finite() && spread.abs() < config.tolerance {
            converged = true;
            break;
        }

        let centroid: Vec<f64> = (0..n)
            .map(|j| {
                simplex
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != worst)
                    .map(|(_, v)| v[j])
                    .sum::<f64>()
                    / n as f64
            })
            .collect();

        let toward = |from: &[f64], coef: f64| -> Vec<f64> {
            clamp(
                centroid
                    .iter()
                    .zip(from.iter())
                    .map(|(c, p)| c + coef * (p - c))
                    .collect(),
            )
        };

        let reflected = toward(&simplex[worst], -REFLECT);
        let reflected_value = eval(&reflected);

        if reflected_value < values[best] {
            let expanded = toward(&reflected, EXPAND);
            let expanded_value = eval(&expanded);
            if expanded_value < reflected_value {
                simplex[worst] = expanded;
                values[worst] = expanded_value;
            } else {
                simplex[worst] = reflected;
                values[worst] = reflected_value;
            }
            continue;
        }

        if reflected_value < values[second_worst] {
            simplex[worst] = reflected;
            values[worst] = reflected_value;
            continue;
        }

        let (contracted, contracted_value) = if reflected_value < values[worst] {
            let c = toward(&reflected, CONTRACT);
            let v = eval(&c);
            (c, v)
        } else {
            let c = toward(&simplex[worst], CONTRACT);
            let v = eval(&c);
            (c, v)
        };

        if contracted_value < values[worst].min(reflected_value) {
            simplex[worst] = contracted;
            values[worst] = contracted_value;
            continue;
        }

        let anchor = simplex[best].clone();
        for i in 0..=n {
            if i == best {
                continue;
            }
            let shrunk: Vec<f64> = anchor
                .iter()
                .zip(simplex[i].iter())
                .map(|(b, v)| b + SHRINK * (v - b))
                .collect();
            simplex[i] = clamp(shrunk);
            values[i] = eval(&simplex[i]);
        }
    }

    let best = values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);

    SimplexResult {
        point: simplex[best].clone(),
        value: values[best],
        iterations,
        converged,
    }
}

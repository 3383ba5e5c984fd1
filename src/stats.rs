//! Summary statistics and Weibull maximum-likelihood fitting for
//! neighbor-distance distributions.

use crate::error::{ProximaError, Result};

/// Mean, median, and standard deviation of a distance sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
}

/// Computes summary statistics over the finite values of `values`.
/// Returns `None` when no finite values remain.
pub fn summarize(values: &[f64]) -> Option<Summary> {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    finite.sort_by(|a, b| a.total_cmp(b));
    let n = finite.len();
    let mean = finite.iter().sum::<f64>() / n as f64;
    let median = if n % 2 == 1 {
        finite[n / 2]
    } else {
        (finite[n / 2 - 1] + finite[n / 2]) / 2.0
    };
    let variance = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    Some(Summary {
        mean,
        median,
        std_dev: variance.sqrt(),
    })
}

/// Fitted two-parameter Weibull distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeibullFit {
    pub shape: f64,
    pub scale: f64,
}

const MAX_EVALUATIONS: usize = 10_000;
const TOLERANCE: f64 = 1e-9;
const INITIAL_STEP: f64 = 0.1;

/// Fits shape and scale by maximizing the Weibull log-likelihood with a
/// Nelder-Mead simplex. Negative samples are rejected; zero samples
/// contribute the finite density limit at the origin so touching-cell
/// distances do not pin the fit.
pub fn fit_weibull(samples: &[f64]) -> Result<WeibullFit> {
    if samples.is_empty() {
        return Err(ProximaError::FitFailed("empty sample".into()));
    }
    if samples.iter().any(|x| !x.is_finite() || *x < 0.0) {
        return Err(ProximaError::FitFailed(
            "samples must be finite and non-negative".into(),
        ));
    }

    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    let scale_seed = if mean.is_finite() && mean > 0.0 { mean } else { 1.0 };

    let objective = |p: [f64; 2]| neg_log_likelihood(p[0], p[1], samples);
    let best = nelder_mead(objective, [1.0, scale_seed])?;
    if !best[0].is_finite() || !best[1].is_finite() || best[0] <= 0.0 || best[1] <= 0.0 {
        return Err(ProximaError::FitFailed("optimizer left the domain".into()));
    }
    Ok(WeibullFit {
        shape: best[0],
        scale: best[1],
    })
}

fn neg_log_likelihood(shape: f64, scale: f64, samples: &[f64]) -> f64 {
    if shape <= 0.0 || scale <= 0.0 {
        return f64::INFINITY;
    }
    let mut ll = 0.0;
    for &x in samples {
        let term = if x == 0.0 {
            // Finite density limit at the origin, independent of shape.
            shape.ln() - scale.ln()
        } else {
            let z = x / scale;
            shape.ln() - scale.ln() + (shape - 1.0) * z.ln() - z.powf(shape)
        };
        ll += term;
    }
    if ll.is_nan() {
        return f64::INFINITY;
    }
    -ll
}

/// Two-dimensional Nelder-Mead with standard coefficients.
fn nelder_mead<F: Fn([f64; 2]) -> f64>(f: F, seed: [f64; 2]) -> Result<[f64; 2]> {
    let mut evals = 0usize;
    let eval = |p: [f64; 2], evals: &mut usize| {
        *evals += 1;
        f(p)
    };

    let mut simplex = [
        seed,
        [seed[0] + INITIAL_STEP, seed[1]],
        [seed[0], seed[1] + INITIAL_STEP * seed[1].max(1.0)],
    ];
    let mut values = [
        eval(simplex[0], &mut evals),
        eval(simplex[1], &mut evals),
        eval(simplex[2], &mut evals),
    ];

    while evals < MAX_EVALUATIONS {
        // Order best to worst.
        let mut order = [0usize, 1, 2];
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        let (best, mid, worst) = (order[0], order[1], order[2]);

        if (values[worst] - values[best]).abs() <= TOLERANCE {
            return Ok(simplex[best]);
        }

        let centroid = [
            (simplex[best][0] + simplex[mid][0]) / 2.0,
            (simplex[best][1] + simplex[mid][1]) / 2.0,
        ];
        let reflect = |coeff: f64| {
            [
                centroid[0] + coeff * (centroid[0] - simplex[worst][0]),
                centroid[1] + coeff * (centroid[1] - simplex[worst][1]),
            ]
        };

        let reflected = reflect(1.0);
        let fr = eval(reflected, &mut evals);
        if fr < values[best] {
            let expanded = reflect(2.0);
            let fe = eval(expanded, &mut evals);
            if fe < fr {
                simplex[worst] = expanded;
                values[worst] = fe;
            } else {
                simplex[worst] = reflected;
                values[worst] = fr;
            }
        } else if fr < values[mid] {
            simplex[worst] = reflected;
            values[worst] = fr;
        } else {
            let contracted = reflect(-0.5);
            let fc = eval(contracted, &mut evals);
            if fc < values[worst] {
                simplex[worst] = contracted;
                values[worst] = fc;
            } else {
                // Shrink toward the best vertex.
                for i in [mid, worst] {
                    simplex[i] = [
                        simplex[best][0] + 0.5 * (simplex[i][0] - simplex[best][0]),
                        simplex[best][1] + 0.5 * (simplex[i][1] - simplex[best][1]),
                    ];
                    values[i] = eval(simplex[i], &mut evals);
                }
            }
        }
    }

    Err(ProximaError::FitFailed(format!(
        "no convergence within {MAX_EVALUATIONS} evaluations"
    )))
}

//! Exact t-SNE for cohort-scale sample counts
//!
//! The quadratic exact formulation is fine here: the inputs are a few
//! dozen biopsies, not single cells. Initialization comes from PCA so a
//! fixed seed reproduces the layout exactly.

use ndarray::{Array2, ArrayView2};

use crate::embed::pca::pca;
use crate::error::{Result, UcseqError};
use crate::rng::MersenneTwister;

/// t-SNE hyperparameters
#[derive(Debug, Clone)]
pub struct TsneParams {
    pub perplexity: f64,
    pub n_iter: usize,
    pub learning_rate: f64,
    /// Exaggeration factor applied for the first quarter of the iterations
    pub early_exaggeration: f64,
}

impl Default for TsneParams {
    fn default() -> Self {
        Self {
            perplexity: 10.0,
            n_iter: 1000,
            learning_rate: 100.0,
            early_exaggeration: 12.0,
        }
    }
}

/// Pairwise squared Euclidean distances between matrix columns
fn pairwise_sq_dists(expression: ArrayView2<f64>) -> Array2<f64> {
    let n = expression.ncols();
    let mut d = Array2::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let dist: f64 = expression
                .column(i)
                .iter()
                .zip(expression.column(j).iter())
                .map(|(&a, &b)| (a - b) * (a - b))
                .sum();
            d[[i, j]] = dist;
            d[[j, i]] = dist;
        }
    }
    d
}

/// Conditional probabilities for one point at a given precision
fn row_probabilities(dists: &Array2<f64>, i: usize, beta: f64, out: &mut [f64]) -> (f64, f64) {
    let n = out.len();
    let mut sum = 0.0;
    for j in 0..n {
        if j == i {
            out[j] = 0.0;
        } else {
            out[j] = (-beta * dists[[i, j]]).exp();
            sum += out[j];
        }
    }
    if sum <= 0.0 {
        return (0.0, f64::NEG_INFINITY);
    }
    let mut entropy = 0.0;
    for v in out.iter_mut() {
        *v /= sum;
        if *v > 1e-12 {
            entropy -= *v * v.ln();
        }
    }
    (sum, entropy)
}

/// Symmetrized joint probabilities calibrated to the target perplexity
fn joint_probabilities(dists: &Array2<f64>, perplexity: f64) -> Array2<f64> {
    let n = dists.nrows();
    let target = perplexity.ln();
    let mut p = Array2::zeros((n, n));
    let mut row = vec![0.0; n];

    for i in 0..n {
        let mut beta = 1.0;
        let mut beta_min = f64::NEG_INFINITY;
        let mut beta_max = f64::INFINITY;
        for _ in 0..50 {
            let (_, entropy) = row_probabilities(dists, i, beta, &mut row);
            let diff = entropy - target;
            if diff.abs() < 1e-5 {
                break;
            }
            if diff > 0.0 {
                beta_min = beta;
                beta = if beta_max.is_infinite() {
                    beta * 2.0
                } else {
                    (beta + beta_max) / 2.0
                };
            } else {
                beta_max = beta;
                beta = if beta_min.is_infinite() {
                    beta / 2.0
                } else {
                    (beta + beta_min) / 2.0
                };
            }
        }
        for j in 0..n {
            p[[i, j]] = row[j];
        }
    }

    // Symmetrize and normalize to a joint distribution
    let mut joint = Array2::zeros((n, n));
    let total = 2.0 * n as f64;
    for i in 0..n {
        for j in 0..n {
            joint[[i, j]] = ((p[[i, j]] + p[[j, i]]) / total).max(1e-12);
        }
    }
    joint
}

/// Run exact t-SNE on a genes x samples matrix; returns samples x n_dims.
pub fn tsne(
    expression: ArrayView2<f64>,
    n_dims: usize,
    params: &TsneParams,
    seed: u32,
) -> Result<Array2<f64>> {
    let n = expression.ncols();
    if n < 4 {
        return Err(UcseqError::EmptyData {
            reason: "t-SNE needs at least 4 samples".to_string(),
        });
    }

    let max_perplexity = (n as f64 - 1.0) / 3.0;
    let perplexity = if params.perplexity > max_perplexity {
        log::warn!(
            "Perplexity {} too large for {} samples, clamping to {:.1}",
            params.perplexity,
            n,
            max_perplexity
        );
        max_perplexity
    } else {
        params.perplexity
    };

    let dists = pairwise_sq_dists(expression);
    let p = joint_probabilities(&dists, perplexity.max(1.0));

    // PCA initialization, scaled small, with a seeded jitter to break
    // exact ties between identical samples
    let init = pca(expression, n_dims)?;
    let mut rng = MersenneTwister::new(seed);
    let init_scale = {
        let sd = init
            .scores
            .column(0)
            .iter()
            .map(|&x| x * x)
            .sum::<f64>()
            .sqrt()
            / (n as f64).sqrt();
        if sd > 0.0 {
            1e-4 / sd
        } else {
            1e-4
        }
    };
    let mut y = Array2::zeros((n, n_dims));
    for i in 0..n {
        for d in 0..n_dims {
            y[[i, d]] = init.scores[[i, d.min(init.scores.ncols() - 1)]] * init_scale
                + rng.next_gaussian() * 1e-6;
        }
    }

    let exaggeration_iters = params.n_iter / 4;
    let mut velocity = Array2::<f64>::zeros((n, n_dims));
    let mut q = Array2::<f64>::zeros((n, n));
    let mut grad = Array2::<f64>::zeros((n, n_dims));

    for iter in 0..params.n_iter {
        let exaggeration = if iter < exaggeration_iters {
            params.early_exaggeration
        } else {
            1.0
        };
        let momentum = if iter < exaggeration_iters { 0.5 } else { 0.8 };

        // Student-t affinities in the embedding
        let mut q_sum = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                let mut dist = 0.0;
                for d in 0..n_dims {
                    let diff = y[[i, d]] - y[[j, d]];
                    dist += diff * diff;
                }
                let w = 1.0 / (1.0 + dist);
                q[[i, j]] = w;
                q[[j, i]] = w;
                q_sum += 2.0 * w;
            }
        }

        grad.fill(0.0);
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let q_ij = (q[[i, j]] / q_sum).max(1e-12);
                let mult = (exaggeration * p[[i, j]] - q_ij) * q[[i, j]];
                for d in 0..n_dims {
                    grad[[i, d]] += 4.0 * mult * (y[[i, d]] - y[[j, d]]);
                }
            }
        }

        for i in 0..n {
            for d in 0..n_dims {
                velocity[[i, d]] =
                    momentum * velocity[[i, d]] - params.learning_rate * grad[[i, d]];
                y[[i, d]] += velocity[[i, d]];
            }
        }

        // Re-center
        for d in 0..n_dims {
            let mean = y.column(d).sum() / n as f64;
            for i in 0..n {
                y[[i, d]] -= mean;
            }
        }
    }

    if y.iter().any(|v| !v.is_finite()) {
        return Err(UcseqError::NumericalInstability {
            operation: "tsne".to_string(),
            details: "non-finite coordinates after gradient descent".to_string(),
        });
    }
    Ok(y)
}

//! UMAP-style layout: fuzzy kNN graph, spectral init, SGD refinement

use nalgebra::DMatrix;
use ndarray::{Array2, ArrayView2};

use crate::error::{Result, UcseqError};
use crate::rng::MersenneTwister;

/// UMAP hyperparameters
#[derive(Debug, Clone)]
pub struct UmapParams {
    pub n_neighbors: usize,
    pub min_dist: f64,
    pub n_epochs: usize,
    pub learning_rate: f64,
    pub negative_samples: usize,
}

impl Default for UmapParams {
    fn default() -> Self {
        Self {
            n_neighbors: 15,
            min_dist: 0.1,
            n_epochs: 400,
            learning_rate: 1.0,
            negative_samples: 5,
        }
    }
}

/// Curve parameters (a, b) for the low-dimensional kernel 1/(1 + a d^(2b)).
///
/// Closed-form two-point fit against the target falloff
/// exp(-(d - min_dist)); for min_dist = 0.1 this gives a ~ 1.65, b ~ 0.91,
/// close to the reference least-squares values.
fn curve_params(min_dist: f64) -> (f64, f64) {
    let d1 = min_dist + 0.5;
    let d2 = min_dist + 2.0;
    let t1 = 0.5f64.exp().recip();
    let t2 = 2.0f64.exp().recip();
    let lhs1 = (1.0 / t1 - 1.0).ln();
    let lhs2 = (1.0 / t2 - 1.0).ln();
    let two_b = (lhs2 - lhs1) / (d2.ln() - d1.ln());
    let a = (lhs1 - two_b * d1.ln()).exp();
    (a, two_b / 2.0)
}

/// Pairwise Euclidean distances between columns
fn pairwise_dists(expression: ArrayView2<f64>) -> Array2<f64> {
    let n = expression.ncols();
    let mut d = Array2::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let dist: f64 = expression
                .column(i)
                .iter()
                .zip(expression.column(j).iter())
                .map(|(&a, &b)| (a - b) * (a - b))
                .sum::<f64>()
                .sqrt();
            d[[i, j]] = dist;
            d[[j, i]] = dist;
        }
    }
    d
}

/// Symmetrized fuzzy edge weights from the kNN graph
fn fuzzy_graph(dists: &Array2<f64>, n_neighbors: usize) -> Array2<f64> {
    let n = dists.nrows();
    let k = n_neighbors.min(n - 1);
    let target = (k as f64).log2();

    let mut directed = Array2::zeros((n, n));
    for i in 0..n {
        let mut order: Vec<usize> = (0..n).filter(|&j| j != i).collect();
        order.sort_by(|&a, &b| {
            dists[[i, a]]
                .partial_cmp(&dists[[i, b]])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let neighbors = &order[..k];
        let rho = dists[[i, neighbors[0]]];

        // Bisect sigma so the smoothed neighbor weights sum to log2(k)
        let mut lo = 1e-8;
        let mut hi = 1e4;
        let mut sigma = 1.0;
        for _ in 0..64 {
            sigma = (lo + hi) / 2.0;
            let total: f64 = neighbors
                .iter()
                .map(|&j| (-((dists[[i, j]] - rho).max(0.0)) / sigma).exp())
                .sum();
            if (total - target).abs() < 1e-5 {
                break;
            }
            if total > target {
                hi = sigma;
            } else {
                lo = sigma;
            }
        }
        for &j in neighbors {
            directed[[i, j]] = (-((dists[[i, j]] - rho).max(0.0)) / sigma).exp();
        }
    }

    // Fuzzy union: w = a + b - a*b
    let mut weights = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..n {
            let a = directed[[i, j]];
            let b = directed[[j, i]];
            weights[[i, j]] = a + b - a * b;
        }
    }
    weights
}

/// Spectral initialization from the symmetric normalized Laplacian
fn spectral_init(weights: &Array2<f64>, n_dims: usize) -> Result<Array2<f64>> {
    let n = weights.nrows();
    let mut degree = vec![0.0; n];
    for i in 0..n {
        degree[i] = weights.row(i).sum();
        if degree[i] <= 0.0 {
            return Err(UcseqError::NumericalInstability {
                operation: "umap spectral init".to_string(),
                details: format!("isolated sample at index {}", i),
            });
        }
    }

    let mut lap = DMatrix::<f64>::identity(n, n);
    for i in 0..n {
        for j in 0..n {
            if i != j {
                lap[(i, j)] = -weights[[i, j]] / (degree[i] * degree[j]).sqrt();
            }
        }
    }

    let eigen = lap.symmetric_eigen();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[a]
            .partial_cmp(&eigen.eigenvalues[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Skip the trivial constant eigenvector
    let mut init = Array2::zeros((n, n_dims));
    for d in 0..n_dims {
        let k = order[(d + 1).min(n - 1)];
        let col = eigen.eigenvectors.column(k);
        for i in 0..n {
            init[[i, d]] = col[i] * 10.0;
        }
    }
    Ok(init)
}

/// Run the layout on a genes x samples matrix; returns samples x n_dims.
pub fn umap(
    expression: ArrayView2<f64>,
    n_dims: usize,
    params: &UmapParams,
    seed: u32,
) -> Result<Array2<f64>> {
    let n = expression.ncols();
    if n < 4 {
        return Err(UcseqError::EmptyData {
            reason: "UMAP needs at least 4 samples".to_string(),
        });
    }

    let dists = pairwise_dists(expression);
    let weights = fuzzy_graph(&dists, params.n_neighbors);
    let mut y = spectral_init(&weights, n_dims)?;

    let (a, b) = curve_params(params.min_dist);
    let mut rng = MersenneTwister::new(seed);

    // Edge list with weights, deterministic order
    let mut edges: Vec<(usize, usize, f64)> = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            if weights[[i, j]] > 0.0 {
                edges.push((i, j, weights[[i, j]]));
            }
        }
    }

    for epoch in 0..params.n_epochs {
        let alpha = params.learning_rate * (1.0 - epoch as f64 / params.n_epochs as f64);
        for &(i, j, w) in &edges {
            if rng.next_f64() > w {
                continue;
            }

            // Attraction along the sampled edge
            let mut d2 = 0.0;
            for d in 0..n_dims {
                let diff = y[[i, d]] - y[[j, d]];
                d2 += diff * diff;
            }
            if d2 > 0.0 {
                let grad_coef =
                    (-2.0 * a * b * d2.powf(b - 1.0)) / (1.0 + a * d2.powf(b));
                for d in 0..n_dims {
                    let g = (grad_coef * (y[[i, d]] - y[[j, d]])).clamp(-4.0, 4.0);
                    y[[i, d]] += alpha * g;
                    y[[j, d]] -= alpha * g;
                }
            }

            // Repulsion against sampled non-neighbors
            for _ in 0..params.negative_samples {
                let k = rng.next_below(n);
                if k == i {
                    continue;
                }
                let mut d2 = 0.0;
                for d in 0..n_dims {
                    let diff = y[[i, d]] - y[[k, d]];
                    d2 += diff * diff;
                }
                let grad_coef = (2.0 * b) / ((0.001 + d2) * (1.0 + a * d2.powf(b)));
                for d in 0..n_dims {
                    let diff = y[[i, d]] - y[[k, d]];
                    let g = if d2 > 0.0 {
                        (grad_coef * diff).clamp(-4.0, 4.0)
                    } else {
                        4.0
                    };
                    y[[i, d]] += alpha * g;
                }
            }
        }
    }

    if y.iter().any(|v| !v.is_finite()) {
        return Err(UcseqError::NumericalInstability {
            operation: "umap".to_string(),
            details: "non-finite coordinates after optimization".to_string(),
        });
    }
    Ok(y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn clustered(n_genes: usize, per_cluster: usize, gap: f64) -> Array2<f64> {
        let n = per_cluster * 2;
        let mut x = Array2::zeros((n_genes, n));
        for g in 0..n_genes {
            for j in 0..n {
                let base = ((g * 13 + j * 3) % 11) as f64 * 0.05;
                let shift = if j >= per_cluster { gap } else { 0.0 };
                x[[g, j]] = base + shift;
            }
        }
        x
    }

    #[test]
    fn test_umap_shape_and_determinism() {
        let x = clustered(20, 5, 4.0);
        let params = UmapParams {
            n_epochs: 50,
            ..UmapParams::default()
        };
        let a = umap(x.view(), 2, &params, 3).unwrap();
        let b = umap(x.view(), 2, &params, 3).unwrap();
        assert_eq!(a.dim(), (10, 2));
        assert_eq!(a, b);
    }

    #[test]
    fn test_umap_seed_changes_layout() {
        let x = clustered(20, 5, 4.0);
        let params = UmapParams {
            n_epochs: 50,
            ..UmapParams::default()
        };
        let a = umap(x.view(), 2, &params, 3).unwrap();
        let b = umap(x.view(), 2, &params, 4).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_umap_separates_clusters() {
        let x = clustered(30, 5, 12.0);
        let y = umap(x.view(), 2, &UmapParams::default(), 11).unwrap();
        let dist = |a: usize, b: usize| -> f64 {
            ((y[[a, 0]] - y[[b, 0]]).powi(2) + (y[[a, 1]] - y[[b, 1]]).powi(2)).sqrt()
        };
        let mut within = 0.0;
        let mut within_n = 0;
        let mut between = 0.0;
        let mut between_n = 0;
        for a in 0..10 {
            for b in (a + 1)..10 {
                if (a < 5) == (b < 5) {
                    within += dist(a, b);
                    within_n += 1;
                } else {
                    between += dist(a, b);
                    between_n += 1;
                }
            }
        }
        assert!(within / (within_n as f64) < between / between_n as f64);
    }
}

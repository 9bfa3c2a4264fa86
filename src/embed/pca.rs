//! Principal component analysis via the sample-space Gram matrix

use nalgebra::DMatrix;
use ndarray::{Array2, ArrayView2};

use crate::error::{Result, UcseqError};

/// PCA scores and explained variance
#[derive(Debug, Clone)]
pub struct PcaResult {
    /// samples x components coordinates
    pub scores: Array2<f64>,
    /// Fraction of total variance per returned component
    pub variance_explained: Vec<f64>,
}

/// Project samples onto their leading principal components.
///
/// Genes are centered across samples, then the samples x samples Gram
/// matrix is eigendecomposed; with far more genes than samples this is
/// much smaller than the gene-space covariance. The sign of each
/// component is fixed so its largest-magnitude score is positive.
pub fn pca(expression: ArrayView2<f64>, n_components: usize) -> Result<PcaResult> {
    let (n_genes, n_samples) = expression.dim();
    if n_genes == 0 || n_samples < 2 {
        return Err(UcseqError::EmptyData {
            reason: "PCA needs at least 1 gene and 2 samples".to_string(),
        });
    }
    let n_components = n_components.min(n_samples - 1);

    // Center each gene across samples
    let mut centered = expression.to_owned();
    for mut row in centered.rows_mut() {
        let mean = row.sum() / n_samples as f64;
        row.mapv_inplace(|x| x - mean);
    }

    // Gram matrix over samples: G[i,j] = sum_g X[g,i] * X[g,j]
    let mut gram = DMatrix::<f64>::zeros(n_samples, n_samples);
    for i in 0..n_samples {
        for j in i..n_samples {
            let mut dot = 0.0;
            for g in 0..n_genes {
                dot += centered[[g, i]] * centered[[g, j]];
            }
            gram[(i, j)] = dot;
            gram[(j, i)] = dot;
        }
    }

    let eigen = gram.symmetric_eigen();
    let mut order: Vec<usize> = (0..n_samples).collect();
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[b]
            .partial_cmp(&eigen.eigenvalues[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let total: f64 = eigen.eigenvalues.iter().map(|&l| l.max(0.0)).sum();
    if total <= 0.0 {
        return Err(UcseqError::NumericalInstability {
            operation: "pca".to_string(),
            details: "expression matrix has zero total variance".to_string(),
        });
    }

    let mut scores = Array2::zeros((n_samples, n_components));
    let mut variance_explained = Vec::with_capacity(n_components);
    for (c, &k) in order.iter().take(n_components).enumerate() {
        let lambda = eigen.eigenvalues[k].max(0.0);
        let scale = lambda.sqrt();
        let col = eigen.eigenvectors.column(k);

        // Sign convention: largest-magnitude score positive
        let mut flip = 1.0;
        let mut best = 0.0f64;
        for i in 0..n_samples {
            if col[i].abs() > best {
                best = col[i].abs();
                flip = if col[i] < 0.0 { -1.0 } else { 1.0 };
            }
        }
        for i in 0..n_samples {
            scores[[i, c]] = flip * scale * col[i];
        }
        variance_explained.push(lambda / total);
    }

    Ok(PcaResult {
        scores,
        variance_explained,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_pca_separates_clusters() {
        // Samples 0-1 low, samples 2-3 high on every gene
        let x = array![
            [1.0, 1.2, 9.0, 9.1],
            [2.0, 2.1, 8.0, 8.2],
            [0.5, 0.4, 7.0, 7.3]
        ];
        let result = pca(x.view(), 2).unwrap();
        assert_eq!(result.scores.nrows(), 4);
        let pc1 = result.scores.column(0);
        // Cluster members land on the same side of PC1
        assert_eq!(pc1[0].signum(), pc1[1].signum());
        assert_eq!(pc1[2].signum(), pc1[3].signum());
        assert_ne!(pc1[0].signum(), pc1[2].signum());
        assert!(result.variance_explained[0] > 0.9);
    }

    #[test]
    fn test_variance_fractions_sum_below_one() {
        let x = array![
            [1.0, 3.0, 2.0, 5.0, 4.0],
            [9.0, 2.0, 7.0, 1.0, 5.0],
            [2.0, 2.0, 8.0, 4.0, 3.0],
            [4.0, 9.0, 1.0, 2.0, 7.0]
        ];
        let result = pca(x.view(), 3).unwrap();
        let total: f64 = result.variance_explained.iter().sum();
        assert!(total <= 1.0 + 1e-12);
        assert!(result.variance_explained[0] >= result.variance_explained[1]);
        assert!(result.variance_explained[1] >= result.variance_explained[2]);
    }

    #[test]
    fn test_deterministic() {
        let x = array![[1.0, 3.0, 2.0, 5.0], [9.0, 2.0, 7.0, 1.0]];
        let a = pca(x.view(), 2).unwrap();
        let b = pca(x.view(), 2).unwrap();
        assert_eq!(a.scores, b.scores);
    }

    #[test]
    fn test_components_capped_by_samples() {
        let x = array![[1.0, 2.0, 4.0], [2.0, 1.0, 3.0]];
        let result = pca(x.view(), 5).unwrap();
        assert_eq!(result.scores.ncols(), 2);
    }

    #[test]
    fn test_score_distances_preserved_for_full_rank() {
        // With all components kept, pairwise distances match the data
        let x = array![[0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let result = pca(x.view(), 2).unwrap();
        let d01_data: f64 = (0..2).map(|g| (x[[g, 0]] - x[[g, 1]]).powi(2)).sum();
        let d01_pc: f64 = (0..2)
            .map(|c| (result.scores[[0, c]] - result.scores[[1, c]]).powi(2))
            .sum();
        assert_relative_eq!(d01_data, d01_pc, max_relative = 1e-9);
    }

    #[test]
    fn test_constant_matrix_is_error() {
        let x = array![[5.0, 5.0, 5.0], [2.0, 2.0, 2.0]];
        assert!(pca(x.view(), 2).is_err());
    }
}

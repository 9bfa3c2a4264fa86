//! Low-dimensional sample embeddings
//!
//! All three methods consume the same genes x samples expression matrix
//! (log2 normalized counts on a top-variance gene subset) and return
//! per-sample coordinates in cohort sample order.

pub mod pca;
pub mod tsne;
pub mod umap;

use ndarray::{Array2, ArrayView2};

use crate::error::{Result, UcseqError};

pub use pca::{pca, PcaResult};
pub use tsne::{tsne, TsneParams};
pub use umap::{umap, UmapParams};

/// Embedding method selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EmbedMethod {
    Pca,
    Tsne,
    Umap,
}

impl EmbedMethod {
    pub fn name(&self) -> &'static str {
        match self {
            EmbedMethod::Pca => "pca",
            EmbedMethod::Tsne => "tsne",
            EmbedMethod::Umap => "umap",
        }
    }
}

/// Per-sample coordinates produced by an embedding method
#[derive(Debug, Clone)]
pub struct Embedding {
    /// Sample identifiers, one per coordinate row
    pub sample_ids: Vec<String>,
    /// samples x dims coordinates
    pub coords: Array2<f64>,
    /// Method that produced the coordinates
    pub method: EmbedMethod,
    /// Fraction of variance per axis (PCA only)
    pub variance_explained: Option<Vec<f64>>,
}

impl Embedding {
    pub fn n_samples(&self) -> usize {
        self.coords.nrows()
    }

    pub fn n_dims(&self) -> usize {
        self.coords.ncols()
    }

    /// Coordinates of one axis across samples
    pub fn axis(&self, dim: usize) -> Vec<f64> {
        self.coords.column(dim).to_vec()
    }
}

/// Shared knobs for the embedding stage
#[derive(Debug, Clone)]
pub struct EmbedParams {
    pub method: EmbedMethod,
    /// Number of output axes (2 or 3)
    pub n_dims: usize,
    pub seed: u32,
    pub tsne: TsneParams,
    pub umap: UmapParams,
}

impl Default for EmbedParams {
    fn default() -> Self {
        Self {
            method: EmbedMethod::Pca,
            n_dims: 3,
            seed: 42,
            tsne: TsneParams::default(),
            umap: UmapParams::default(),
        }
    }
}

/// Run the selected method on a genes x samples expression matrix
pub fn embed(
    expression: ArrayView2<f64>,
    sample_ids: &[String],
    params: &EmbedParams,
) -> Result<Embedding> {
    if expression.ncols() != sample_ids.len() {
        return Err(UcseqError::DimensionMismatch {
            expected: format!("{} expression columns", sample_ids.len()),
            got: format!("{}", expression.ncols()),
        });
    }
    if expression.ncols() < 3 {
        return Err(UcseqError::EmptyData {
            reason: "Embedding needs at least 3 samples".to_string(),
        });
    }
    if !(2..=3).contains(&params.n_dims) {
        return Err(UcseqError::InvalidInput {
            reason: format!("Embedding dimension must be 2 or 3, got {}", params.n_dims),
        });
    }

    let (coords, variance_explained) = match params.method {
        EmbedMethod::Pca => {
            let result = pca(expression, params.n_dims)?;
            (result.scores, Some(result.variance_explained))
        }
        EmbedMethod::Tsne => (
            tsne(expression, params.n_dims, &params.tsne, params.seed)?,
            None,
        ),
        EmbedMethod::Umap => (
            umap(expression, params.n_dims, &params.umap, params.seed)?,
            None,
        ),
    };

    debug_assert_eq!(coords.nrows(), sample_ids.len());
    Ok(Embedding {
        sample_ids: sample_ids.to_vec(),
        coords,
        method: params.method,
        variance_explained,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn two_cluster_expression(n_genes: usize, per_cluster: usize) -> Array2<f64> {
        // Deterministic layout: cluster B shifted on the first half of genes
        let n = per_cluster * 2;
        let mut x = Array2::zeros((n_genes, n));
        for g in 0..n_genes {
            for j in 0..n {
                let base = ((g * 31 + j * 7) % 13) as f64 * 0.1;
                let shift = if j >= per_cluster && g < n_genes / 2 {
                    5.0
                } else {
                    0.0
                };
                x[[g, j]] = base + shift;
            }
        }
        x
    }

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("s{}", i)).collect()
    }

    #[test]
    fn test_embedding_row_order_matches_samples() {
        let x = two_cluster_expression(40, 5);
        let e = embed(x.view(), &ids(10), &EmbedParams::default()).unwrap();
        assert_eq!(e.n_samples(), 10);
        assert_eq!(e.sample_ids[3], "s3");
        assert_eq!(e.n_dims(), 3);
    }

    #[test]
    fn test_deterministic_under_fixed_seed() {
        let x = two_cluster_expression(30, 4);
        let params = EmbedParams {
            method: EmbedMethod::Tsne,
            n_dims: 2,
            ..EmbedParams::default()
        };
        let a = embed(x.view(), &ids(8), &params).unwrap();
        let b = embed(x.view(), &ids(8), &params).unwrap();
        assert_eq!(a.coords, b.coords);
    }

    #[test]
    fn test_too_few_samples_rejected() {
        let x = Array2::zeros((10, 2));
        assert!(embed(x.view(), &ids(2), &EmbedParams::default()).is_err());
    }
}

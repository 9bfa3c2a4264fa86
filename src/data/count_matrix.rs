//! Count matrix representation for bulk RNA-seq data

use std::collections::HashMap;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{Result, UcseqError};

/// Deduplicate names by appending _1, _2, etc. to duplicates
fn deduplicate_names(names: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for name in &names {
        *seen.entry(name.clone()).or_insert(0) += 1;
    }
    let has_dups = seen.values().any(|&c| c > 1);
    if !has_dups {
        return names;
    }
    seen.clear();
    let mut result = Vec::with_capacity(names.len());
    for name in names {
        let count = seen.entry(name.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            result.push(name);
        } else {
            let new_name = format!("{}_{}", name, *count - 1);
            log::warn!("Duplicate gene id '{}' renamed to '{}'", name, new_name);
            result.push(new_name);
        }
    }
    result
}

/// Per-gene annotation columns carried alongside the counts (symbol, biotype)
#[derive(Debug, Clone, Default)]
pub struct GeneAnnotations {
    /// Gene symbols, parallel to the matrix rows
    pub symbols: Vec<String>,
    /// Gene biotypes (e.g. protein_coding), parallel to the matrix rows
    pub biotypes: Vec<String>,
}

impl GeneAnnotations {
    pub fn subset(&self, gene_indices: &[usize]) -> Self {
        let pick = |v: &Vec<String>| -> Vec<String> {
            if v.is_empty() {
                Vec::new()
            } else {
                gene_indices.iter().map(|&i| v[i].clone()).collect()
            }
        };
        GeneAnnotations {
            symbols: pick(&self.symbols),
            biotypes: pick(&self.biotypes),
        }
    }

    pub fn symbol(&self, gene_idx: usize) -> Option<&str> {
        self.symbols.get(gene_idx).map(|s| s.as_str())
    }
}

/// Raw read counts, genes (rows) by samples (columns)
#[derive(Debug, Clone)]
pub struct CountMatrix {
    counts: Array2<f64>,
    gene_ids: Vec<String>,
    sample_ids: Vec<String>,
    annotations: GeneAnnotations,
}

impl CountMatrix {
    /// Create a new count matrix from raw data
    pub fn new(
        counts: Array2<f64>,
        gene_ids: Vec<String>,
        sample_ids: Vec<String>,
    ) -> Result<Self> {
        Self::with_annotations(counts, gene_ids, sample_ids, GeneAnnotations::default())
    }

    /// Create a count matrix carrying per-gene annotation columns
    pub fn with_annotations(
        counts: Array2<f64>,
        gene_ids: Vec<String>,
        sample_ids: Vec<String>,
        annotations: GeneAnnotations,
    ) -> Result<Self> {
        let (n_genes, n_samples) = counts.dim();

        if gene_ids.len() != n_genes {
            return Err(UcseqError::DimensionMismatch {
                expected: format!("{} gene ids", n_genes),
                got: format!("{} gene ids", gene_ids.len()),
            });
        }
        if sample_ids.len() != n_samples {
            return Err(UcseqError::DimensionMismatch {
                expected: format!("{} sample ids", n_samples),
                got: format!("{} sample ids", sample_ids.len()),
            });
        }
        if !annotations.symbols.is_empty() && annotations.symbols.len() != n_genes {
            return Err(UcseqError::DimensionMismatch {
                expected: format!("{} symbols", n_genes),
                got: format!("{} symbols", annotations.symbols.len()),
            });
        }
        if !annotations.biotypes.is_empty() && annotations.biotypes.len() != n_genes {
            return Err(UcseqError::DimensionMismatch {
                expected: format!("{} biotypes", n_genes),
                got: format!("{} biotypes", annotations.biotypes.len()),
            });
        }

        if counts
            .iter()
            .any(|&x| x < 0.0 || x.is_nan() || x.is_infinite())
        {
            return Err(UcseqError::InvalidCountMatrix {
                reason: "counts must be non-negative finite values".to_string(),
            });
        }

        if !counts.is_empty() && counts.iter().all(|&x| x == 0.0) {
            return Err(UcseqError::InvalidCountMatrix {
                reason: "all samples have 0 counts for all genes".to_string(),
            });
        }

        let gene_ids = deduplicate_names(gene_ids);

        Ok(Self {
            counts,
            gene_ids,
            sample_ids,
            annotations,
        })
    }

    pub fn n_genes(&self) -> usize {
        self.counts.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.counts.ncols()
    }

    pub fn counts(&self) -> ArrayView2<'_, f64> {
        self.counts.view()
    }

    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn annotations(&self) -> &GeneAnnotations {
        &self.annotations
    }

    /// Counts for a single gene across samples
    pub fn gene_counts(&self, gene_idx: usize) -> ArrayView1<'_, f64> {
        self.counts.row(gene_idx)
    }

    /// Counts for a single sample across genes
    pub fn sample_counts(&self, sample_idx: usize) -> ArrayView1<'_, f64> {
        self.counts.column(sample_idx)
    }

    pub fn sample_index(&self, sample_id: &str) -> Option<usize> {
        self.sample_ids.iter().position(|id| id == sample_id)
    }

    /// Total counts per sample (library size)
    pub fn library_sizes(&self) -> Vec<f64> {
        self.counts
            .axis_iter(Axis(1))
            .map(|col| col.sum())
            .collect()
    }

    /// Mean counts per gene across samples
    pub fn gene_means(&self) -> Vec<f64> {
        let n = self.n_samples() as f64;
        self.counts
            .axis_iter(Axis(0))
            .map(|row| row.sum() / n)
            .collect()
    }

    /// Sample variance per gene across samples (n-1 denominator)
    pub fn gene_variances(&self) -> Vec<f64> {
        let n = self.n_samples();
        if n < 2 {
            return vec![0.0; self.n_genes()];
        }
        self.counts
            .axis_iter(Axis(0))
            .map(|row| {
                let mean = row.sum() / n as f64;
                row.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
            })
            .collect()
    }

    /// Restrict to the given genes, preserving the given order
    pub fn subset_genes(&self, gene_indices: &[usize]) -> Result<Self> {
        let new_counts = self.counts.select(Axis(0), gene_indices);
        let new_gene_ids: Vec<String> = gene_indices
            .iter()
            .map(|&i| self.gene_ids[i].clone())
            .collect();
        Self::with_annotations(
            new_counts,
            new_gene_ids,
            self.sample_ids.clone(),
            self.annotations.subset(gene_indices),
        )
    }

    /// Restrict to the given samples, preserving the given order
    pub fn subset_samples(&self, sample_indices: &[usize]) -> Result<Self> {
        let new_counts = self.counts.select(Axis(1), sample_indices);
        let new_sample_ids: Vec<String> = sample_indices
            .iter()
            .map(|&i| self.sample_ids[i].clone())
            .collect();
        Self::with_annotations(
            new_counts,
            self.gene_ids.clone(),
            new_sample_ids,
            self.annotations.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_count_matrix_creation() {
        let counts = array![[10.0, 20.0, 30.0], [5.0, 15.0, 25.0]];
        let matrix = CountMatrix::new(
            counts,
            vec!["g1".to_string(), "g2".to_string()],
            vec!["s1".to_string(), "s2".to_string(), "s3".to_string()],
        )
        .unwrap();
        assert_eq!(matrix.n_genes(), 2);
        assert_eq!(matrix.n_samples(), 3);
    }

    #[test]
    fn test_negative_counts_rejected() {
        let counts = array![[10.0, -5.0], [5.0, 15.0]];
        let result = CountMatrix::new(
            counts,
            vec!["g1".to_string(), "g2".to_string()],
            vec!["s1".to_string(), "s2".to_string()],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_library_sizes() {
        let counts = array![[10.0, 20.0], [5.0, 15.0]];
        let matrix = CountMatrix::new(
            counts,
            vec!["g1".to_string(), "g2".to_string()],
            vec!["s1".to_string(), "s2".to_string()],
        )
        .unwrap();
        assert_eq!(matrix.library_sizes(), vec![15.0, 35.0]);
    }

    #[test]
    fn test_gene_variances() {
        let counts = array![[1.0, 3.0, 5.0], [2.0, 2.0, 2.0]];
        let matrix = CountMatrix::new(
            counts,
            vec!["g1".to_string(), "g2".to_string()],
            vec!["s1".to_string(), "s2".to_string(), "s3".to_string()],
        )
        .unwrap();
        let vars = matrix.gene_variances();
        assert!((vars[0] - 4.0).abs() < 1e-12);
        assert_eq!(vars[1], 0.0);
    }

    #[test]
    fn test_duplicate_gene_ids_renamed() {
        let counts = array![[1.0, 2.0], [3.0, 4.0]];
        let matrix = CountMatrix::new(
            counts,
            vec!["g".to_string(), "g".to_string()],
            vec!["s1".to_string(), "s2".to_string()],
        )
        .unwrap();
        assert_eq!(matrix.gene_ids(), &["g".to_string(), "g_1".to_string()]);
    }

    #[test]
    fn test_subset_genes_keeps_annotations() {
        let counts = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let ann = GeneAnnotations {
            symbols: vec!["A".to_string(), "B".to_string(), "C".to_string()],
            biotypes: vec![
                "protein_coding".to_string(),
                "lincRNA".to_string(),
                "protein_coding".to_string(),
            ],
        };
        let matrix = CountMatrix::with_annotations(
            counts,
            vec!["g1".to_string(), "g2".to_string(), "g3".to_string()],
            vec!["s1".to_string(), "s2".to_string()],
            ann,
        )
        .unwrap();
        let sub = matrix.subset_genes(&[2, 0]).unwrap();
        assert_eq!(sub.gene_ids(), &["g3".to_string(), "g1".to_string()]);
        assert_eq!(sub.annotations().symbols, vec!["C", "A"]);
    }
}

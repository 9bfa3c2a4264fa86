//! Gene filtering: prevalence and variance ranking

use crate::data::CountMatrix;
use crate::error::Result;

/// Default minimum expression for a sample to count as expressing a gene
pub const DEFAULT_MIN_EXPR: f64 = 1.0;
/// Default fraction of expressing samples a gene must exceed
pub const DEFAULT_MIN_FRACTION: f64 = 0.5;
/// Default number of top-variance genes feeding the embeddings
pub const DEFAULT_TOP_GENES: usize = 500;

/// Indices of genes expressed (>= min_expr) in strictly more than
/// min_fraction of the samples.
pub fn prevalence_pass(matrix: &CountMatrix, min_expr: f64, min_fraction: f64) -> Vec<usize> {
    let n_samples = matrix.n_samples() as f64;
    (0..matrix.n_genes())
        .filter(|&g| {
            let expressed = matrix
                .gene_counts(g)
                .iter()
                .filter(|&&x| x >= min_expr)
                .count() as f64;
            expressed / n_samples > min_fraction
        })
        .collect()
}

/// Restrict the matrix to genes passing the prevalence filter
pub fn filter_by_prevalence(
    matrix: &CountMatrix,
    min_expr: f64,
    min_fraction: f64,
) -> Result<CountMatrix> {
    let keep = prevalence_pass(matrix, min_expr, min_fraction);
    log::info!(
        "Prevalence filter (expr >= {} in > {:.0}% of samples): {} of {} genes retained",
        min_expr,
        min_fraction * 100.0,
        keep.len(),
        matrix.n_genes()
    );
    matrix.subset_genes(&keep)
}

/// Indices of the n highest-variance genes, most variable first.
///
/// Ties at the cutoff are broken by row order, so the result always has
/// exactly min(n, n_genes) members.
pub fn top_variance_genes(matrix: &CountMatrix, n: usize) -> Vec<usize> {
    let variances = matrix.gene_variances();
    let mut order: Vec<usize> = (0..variances.len()).collect();
    order.sort_by(|&a, &b| {
        variances[b]
            .partial_cmp(&variances[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    order.truncate(n.min(order.len()));
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn matrix(counts: ndarray::Array2<f64>) -> CountMatrix {
        let gene_ids = (0..counts.nrows()).map(|i| format!("g{}", i)).collect();
        let sample_ids = (0..counts.ncols()).map(|j| format!("s{}", j)).collect();
        CountMatrix::new(counts, gene_ids, sample_ids).unwrap()
    }

    #[test]
    fn test_prevalence_strictly_greater() {
        // 4 samples: gene0 expressed in 2/4 (= 0.5, not > 0.5), gene1 in 3/4
        let m = matrix(array![[1.0, 5.0, 0.0, 0.0], [1.0, 1.0, 2.0, 0.0]]);
        let keep = prevalence_pass(&m, 1.0, 0.5);
        assert_eq!(keep, vec![1]);
    }

    #[test]
    fn test_prevalence_predicate_holds_for_retained() {
        let m = matrix(array![
            [0.0, 0.0, 0.0, 9.0],
            [3.0, 3.0, 3.0, 3.0],
            [1.0, 1.0, 0.0, 1.0],
            [0.5, 0.9, 2.0, 2.0]
        ]);
        let filtered = filter_by_prevalence(&m, 1.0, 0.5).unwrap();
        for g in 0..filtered.n_genes() {
            let frac = filtered
                .gene_counts(g)
                .iter()
                .filter(|&&x| x >= 1.0)
                .count() as f64
                / filtered.n_samples() as f64;
            assert!(frac > 0.5);
        }
        assert_eq!(filtered.gene_ids(), &["g1".to_string(), "g2".to_string()]);
    }

    #[test]
    fn test_top_variance_size_and_dominance() {
        let m = matrix(array![
            [1.0, 1.0, 1.0],
            [0.0, 10.0, 20.0],
            [5.0, 6.0, 7.0],
            [0.0, 50.0, 100.0]
        ]);
        let top = top_variance_genes(&m, 2);
        assert_eq!(top.len(), 2);
        let vars = m.gene_variances();
        let cutoff = top.iter().map(|&i| vars[i]).fold(f64::INFINITY, f64::min);
        for g in 0..m.n_genes() {
            if !top.contains(&g) {
                assert!(vars[g] <= cutoff);
            }
        }
        assert_eq!(top[0], 3);
    }

    #[test]
    fn test_top_variance_caps_at_gene_count() {
        let m = matrix(array![[1.0, 2.0], [3.0, 9.0]]);
        assert_eq!(top_variance_genes(&m, 10).len(), 2);
    }
}

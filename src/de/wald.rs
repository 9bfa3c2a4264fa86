//! Negative-binomial Wald test on median-of-ratios normalized counts

use ndarray::Array2;
use rayon::prelude::*;
use statrs::distribution::{ContinuousCDF, Normal};

use crate::data::Cohort;
use crate::de::{DeRow, DeTable};
use crate::error::{Result, UcseqError};
use crate::normalization::{normalized_counts, size_factors};
use crate::stats::benjamini_hochberg;

const LFC_PSEUDOCOUNT: f64 = 0.5;
const MIN_DISPERSION: f64 = 1e-8;
/// Weight of the fitted trend when stabilizing gene-wise dispersions
const TREND_WEIGHT: f64 = 3.0;

/// Method-of-moments dispersion from normalized counts of one gene
fn moment_dispersion(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return MIN_DISPERSION;
    }
    let var = values.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    ((var - mean) / (mean * mean)).max(MIN_DISPERSION)
}

/// Least-squares fit of dispersion ~ a0 + a1/mean over all genes
fn dispersion_trend(means: &[f64], dispersions: &[f64]) -> (f64, f64) {
    let pairs: Vec<(f64, f64)> = means
        .iter()
        .zip(dispersions.iter())
        .filter(|(&m, &d)| m > 0.0 && d > MIN_DISPERSION)
        .map(|(&m, &d)| (1.0 / m, d))
        .collect();
    if pairs.len() < 3 {
        let fallback = if dispersions.is_empty() {
            MIN_DISPERSION
        } else {
            dispersions.iter().sum::<f64>() / dispersions.len() as f64
        };
        return (fallback, 0.0);
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;
    let sxy: f64 = pairs
        .iter()
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum();
    let sxx: f64 = pairs.iter().map(|(x, _)| (x - mean_x).powi(2)).sum();
    if sxx <= 0.0 {
        return (mean_y, 0.0);
    }
    let a1 = (sxy / sxx).max(0.0);
    let a0 = (mean_y - a1 * mean_x).max(MIN_DISPERSION);
    (a0, a1)
}

/// DESeq2-style Wald test of level_a versus level_b.
///
/// Per gene: normalized group means, log2 fold change with a pseudocount,
/// moment dispersion stabilized toward the fitted mean-dispersion trend,
/// delta-method standard error, two-sided normal p-value, BH adjustment.
pub fn wald_test(
    cohort: &Cohort,
    condition_column: &str,
    level_a: &str,
    level_b: &str,
) -> Result<DeTable> {
    let matrix = cohort.counts();
    let (idx_a, idx_b) = group_indices(cohort, condition_column, level_a, level_b)?;

    let factors = size_factors(matrix.counts())?;
    let norm = normalized_counts(matrix.counts(), &factors)?;

    let n_genes = matrix.n_genes();
    let gene_means: Vec<f64> = (0..n_genes)
        .map(|g| norm.row(g).sum() / norm.ncols() as f64)
        .collect();
    let raw_dispersions: Vec<f64> = (0..n_genes)
        .map(|g| moment_dispersion(&norm.row(g).to_vec()))
        .collect();
    let (a0, a1) = dispersion_trend(&gene_means, &raw_dispersions);
    log::debug!("Dispersion trend: alpha(mu) = {:.4} + {:.4}/mu", a0, a1);

    let normal = Normal::new(0.0, 1.0).map_err(|e| UcseqError::NumericalInstability {
        operation: "wald_test".to_string(),
        details: e.to_string(),
    })?;

    let rows: Vec<DeRow> = (0..n_genes)
        .into_par_iter()
        .map(|g| {
            let mean_a = group_mean(&norm, g, &idx_a);
            let mean_b = group_mean(&norm, g, &idx_b);
            let lfc = ((mean_a + LFC_PSEUDOCOUNT) / (mean_b + LFC_PSEUDOCOUNT)).log2();

            let trend = if gene_means[g] > 0.0 {
                (a0 + a1 / gene_means[g]).max(MIN_DISPERSION)
            } else {
                a0.max(MIN_DISPERSION)
            };
            let alpha =
                (raw_dispersions[g] + TREND_WEIGHT * trend) / (1.0 + TREND_WEIGHT);

            // Delta method on the log-ratio of NB group means
            let var_log_a = log_mean_variance(mean_a, alpha, idx_a.len());
            let var_log_b = log_mean_variance(mean_b, alpha, idx_b.len());
            let se_lfc = (var_log_a + var_log_b).sqrt() / std::f64::consts::LN_2;

            let (stat, pvalue) = if se_lfc > 0.0 && se_lfc.is_finite() {
                let z = lfc / se_lfc;
                (z, (2.0 * (1.0 - normal.cdf(z.abs()))).clamp(0.0, 1.0))
            } else {
                (f64::NAN, f64::NAN)
            };

            DeRow {
                gene_id: matrix.gene_ids()[g].clone(),
                symbol: matrix
                    .annotations()
                    .symbol(g)
                    .unwrap_or(matrix.gene_ids()[g].as_str())
                    .to_string(),
                base_mean: gene_means[g],
                log2_fold_change: lfc,
                stat,
                pvalue,
                padj: f64::NAN,
            }
        })
        .collect();

    finalize_table("wald", rows)
}

/// Variance of ln(group mean) for NB counts with dispersion alpha
fn log_mean_variance(mean: f64, alpha: f64, n: usize) -> f64 {
    let shifted = mean + LFC_PSEUDOCOUNT;
    (1.0 / shifted + alpha) / n as f64
}

fn group_mean(norm: &Array2<f64>, gene: usize, indices: &[usize]) -> f64 {
    indices.iter().map(|&j| norm[[gene, j]]).sum::<f64>() / indices.len() as f64
}

/// Sample indices of the two contrast levels
pub(crate) fn group_indices(
    cohort: &Cohort,
    condition_column: &str,
    level_a: &str,
    level_b: &str,
) -> Result<(Vec<usize>, Vec<usize>)> {
    let idx_a = cohort.metadata().samples_with_level(condition_column, level_a);
    let idx_b = cohort.metadata().samples_with_level(condition_column, level_b);
    if idx_a.len() < 2 || idx_b.len() < 2 {
        return Err(UcseqError::InvalidInput {
            reason: format!(
                "contrast {}={} vs {} needs at least 2 samples per group, found {} and {}",
                condition_column,
                level_a,
                level_b,
                idx_a.len(),
                idx_b.len()
            ),
        });
    }
    Ok((idx_a, idx_b))
}

/// Attach BH-adjusted p-values and sort by significance
pub(crate) fn finalize_table(model: &str, mut rows: Vec<DeRow>) -> Result<DeTable> {
    let pvalues: Vec<f64> = rows.iter().map(|r| r.pvalue).collect();
    for (row, padj) in rows.iter_mut().zip(benjamini_hochberg(&pvalues)) {
        row.padj = padj;
    }
    let mut table = DeTable {
        model: model.to_string(),
        rows,
    };
    table.sort_by_significance();
    Ok(table)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::{CountMatrix, SampleMetadata};

    pub(crate) fn de_cohort() -> Cohort {
        // 8 samples, 4 per group; gene 0 strongly up in group a,
        // gene 1 flat, gene 2 moderately down in group a
        let counts = ndarray::array![
            [800.0, 900.0, 850.0, 950.0, 100.0, 110.0, 95.0, 105.0],
            [200.0, 210.0, 190.0, 205.0, 195.0, 200.0, 205.0, 210.0],
            [50.0, 55.0, 45.0, 52.0, 150.0, 160.0, 155.0, 145.0],
            [500.0, 480.0, 510.0, 490.0, 505.0, 495.0, 500.0, 510.0]
        ];
        let ids: Vec<String> = (0..8).map(|i| format!("s{}", i)).collect();
        let matrix = CountMatrix::new(
            counts,
            vec!["up".into(), "flat".into(), "down".into(), "flat2".into()],
            ids.clone(),
        )
        .unwrap();
        let mut meta = SampleMetadata::new(ids);
        meta.add_column(
            "inflammation",
            ["inflamed", "inflamed", "inflamed", "inflamed", "non", "non", "non", "non"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
        .unwrap();
        Cohort::new(matrix, meta).unwrap()
    }

    #[test]
    fn test_wald_detects_strong_signal() {
        let cohort = de_cohort();
        let table = wald_test(&cohort, "inflammation", "inflamed", "non").unwrap();
        let up = table.row("up").unwrap();
        assert!(up.log2_fold_change > 2.0);
        assert!(up.pvalue < 0.01);
        let flat = table.row("flat").unwrap();
        assert!(flat.log2_fold_change.abs() < 0.3);
        assert!(flat.pvalue > 0.1);
        let down = table.row("down").unwrap();
        assert!(down.log2_fold_change < -1.0);
    }

    #[test]
    fn test_wald_table_sorted_by_p() {
        let cohort = de_cohort();
        let table = wald_test(&cohort, "inflammation", "inflamed", "non").unwrap();
        for pair in table.rows.windows(2) {
            if pair[0].pvalue.is_finite() && pair[1].pvalue.is_finite() {
                assert!(pair[0].pvalue <= pair[1].pvalue);
            }
        }
        assert_eq!(table.rows[0].gene_id, "up");
    }

    #[test]
    fn test_wald_padj_bounds() {
        let cohort = de_cohort();
        let table = wald_test(&cohort, "inflammation", "inflamed", "non").unwrap();
        for r in &table.rows {
            if r.padj.is_finite() {
                assert!(r.padj >= r.pvalue);
                assert!(r.padj <= 1.0);
            }
        }
    }

    #[test]
    fn test_wald_tiny_group_rejected() {
        let cohort = de_cohort();
        // Only one sample carries this level
        assert!(wald_test(&cohort, "inflammation", "inflamed", "missing").is_err());
    }

    #[test]
    fn test_moment_dispersion_floor() {
        // Underdispersed data clamps to the floor
        let d = moment_dispersion(&[10.0, 10.0, 10.0, 10.0]);
        assert_eq!(d, MIN_DISPERSION);
    }
}

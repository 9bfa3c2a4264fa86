//! Conditional exact negative-binomial test on equalized pseudo-counts

use rayon::prelude::*;
use statrs::distribution::{ContinuousCDF, Normal};
use statrs::function::gamma::ln_gamma;

use crate::data::Cohort;
use crate::de::wald::{finalize_table, group_indices};
use crate::de::{DeRow, DeTable};
use crate::error::{Result, UcseqError};

const LFC_PSEUDOCOUNT: f64 = 0.5;
const MIN_DISPERSION: f64 = 1e-4;
/// Shrinkage weight pulling gene-wise dispersions toward the common value
const COMMON_WEIGHT: f64 = 10.0;
/// Totals above this use a normal approximation of the conditional tail
const EXACT_TOTAL_LIMIT: usize = 20_000;

/// Classic exact test of level_a versus level_b.
///
/// Counts are scaled to a common (geometric mean) library size, a common
/// dispersion is estimated and blended with gene-wise moment estimates,
/// and each gene gets a conditional exact NB test on its rounded group
/// sums. The two-sided p-value is the doubled smaller tail, capped at 1.
pub fn exact_test(
    cohort: &Cohort,
    condition_column: &str,
    level_a: &str,
    level_b: &str,
) -> Result<DeTable> {
    let matrix = cohort.counts();
    let (idx_a, idx_b) = group_indices(cohort, condition_column, level_a, level_b)?;

    // Equalize library sizes: pseudo = count * geo_mean_lib / lib
    let libs = matrix.library_sizes();
    if libs.iter().any(|&l| l <= 0.0) {
        return Err(UcseqError::InvalidCountMatrix {
            reason: "Sample with zero library size".to_string(),
        });
    }
    let geo_mean_lib = (libs.iter().map(|&l| l.ln()).sum::<f64>() / libs.len() as f64).exp();
    let n_genes = matrix.n_genes();
    let mut pseudo = matrix.counts().to_owned();
    for (j, mut col) in pseudo.axis_iter_mut(ndarray::Axis(1)).enumerate() {
        let scale = geo_mean_lib / libs[j];
        col.mapv_inplace(|x| x * scale);
    }

    // Gene-wise moment dispersions on the pseudo-counts, pooled within groups
    let gene_dispersions: Vec<f64> = (0..n_genes)
        .map(|g| {
            let mut acc = 0.0;
            let mut groups = 0.0;
            for idx in [&idx_a, &idx_b] {
                let vals: Vec<f64> = idx.iter().map(|&j| pseudo[[g, j]]).collect();
                let n = vals.len() as f64;
                let mean = vals.iter().sum::<f64>() / n;
                if mean > 0.0 {
                    let var =
                        vals.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
                    acc += ((var - mean) / (mean * mean)).max(0.0);
                    groups += 1.0;
                }
            }
            if groups > 0.0 {
                (acc / groups).max(MIN_DISPERSION)
            } else {
                MIN_DISPERSION
            }
        })
        .collect();
    let common = {
        let mut sorted = gene_dispersions.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        sorted[sorted.len() / 2]
    };
    log::debug!("Common dispersion estimate: {:.4}", common);

    let normal = Normal::new(0.0, 1.0).map_err(|e| UcseqError::NumericalInstability {
        operation: "exact_test".to_string(),
        details: e.to_string(),
    })?;

    let rows: Vec<DeRow> = (0..n_genes)
        .into_par_iter()
        .map(|g| {
            let phi = (gene_dispersions[g] + COMMON_WEIGHT * common) / (1.0 + COMMON_WEIGHT);

            let sum_a: f64 = idx_a.iter().map(|&j| pseudo[[g, j]]).sum();
            let sum_b: f64 = idx_b.iter().map(|&j| pseudo[[g, j]]).sum();
            let mean_a = sum_a / idx_a.len() as f64;
            let mean_b = sum_b / idx_b.len() as f64;
            let base_mean = pseudo.row(g).sum() / pseudo.ncols() as f64;
            let lfc = ((mean_a + LFC_PSEUDOCOUNT) / (mean_b + LFC_PSEUDOCOUNT)).log2();

            let k_a = sum_a.round() as usize;
            let k_b = sum_b.round() as usize;
            let total = k_a + k_b;
            let pvalue = if total == 0 {
                1.0
            } else if total <= EXACT_TOTAL_LIMIT {
                conditional_exact_p(k_a, total, idx_a.len(), idx_b.len(), phi)
            } else {
                normal_tail_p(k_a as f64, total as f64, idx_a.len(), idx_b.len(), phi, &normal)
            };

            DeRow {
                gene_id: matrix.gene_ids()[g].clone(),
                symbol: matrix
                    .annotations()
                    .symbol(g)
                    .unwrap_or(matrix.gene_ids()[g].as_str())
                    .to_string(),
                base_mean,
                log2_fold_change: lfc,
                stat: phi,
                pvalue,
                padj: f64::NAN,
            }
        })
        .collect();

    finalize_table("exact", rows)
}

/// log pmf of NB with size s and mean m at k
fn ln_nb_pmf(k: f64, s: f64, m: f64) -> f64 {
    if m <= 0.0 {
        return if k == 0.0 { 0.0 } else { f64::NEG_INFINITY };
    }
    ln_gamma(k + s) - ln_gamma(s) - ln_gamma(k + 1.0) + s * (s / (s + m)).ln()
        + k * (m / (s + m)).ln()
}

/// Doubled smaller conditional tail of observing k_a out of total
fn conditional_exact_p(k_a: usize, total: usize, n_a: usize, n_b: usize, phi: f64) -> f64 {
    let s_a = n_a as f64 / phi;
    let s_b = n_b as f64 / phi;
    // Pooled per-sample mean under the null
    let mu0 = total as f64 / (n_a + n_b) as f64;
    let m_a = n_a as f64 * mu0;
    let m_b = n_b as f64 * mu0;

    // Log weights of every split of the total, normalized below
    let log_probs: Vec<f64> = (0..=total)
        .map(|k| ln_nb_pmf(k as f64, s_a, m_a) + ln_nb_pmf((total - k) as f64, s_b, m_b))
        .collect();
    let max = log_probs
        .iter()
        .fold(f64::NEG_INFINITY, |acc, &x| acc.max(x));
    let weights: Vec<f64> = log_probs.iter().map(|&lp| (lp - max).exp()).collect();
    let z: f64 = weights.iter().sum();

    let lower: f64 = weights[..=k_a].iter().sum::<f64>() / z;
    let upper: f64 = weights[k_a..].iter().sum::<f64>() / z;
    (2.0 * lower.min(upper)).min(1.0)
}

/// Normal approximation of the same doubled tail for very large totals
fn normal_tail_p(
    k_a: f64,
    total: f64,
    n_a: usize,
    n_b: usize,
    phi: f64,
    normal: &Normal,
) -> f64 {
    let frac = n_a as f64 / (n_a + n_b) as f64;
    let mean = total * frac;
    let mu0 = total / (n_a + n_b) as f64;
    // Var of the group-a sum given NB sampling in both groups
    let var_a = n_a as f64 * (mu0 + phi * mu0 * mu0);
    let var_b = n_b as f64 * (mu0 + phi * mu0 * mu0);
    let var = var_a * (1.0 - frac) * (1.0 - frac) + var_b * frac * frac;
    if var <= 0.0 {
        return 1.0;
    }
    let z = (k_a - mean) / var.sqrt();
    (2.0 * (1.0 - normal.cdf(z.abs()))).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::de::wald::tests::de_cohort;

    #[test]
    fn test_exact_detects_strong_signal() {
        let cohort = de_cohort();
        let table = exact_test(&cohort, "inflammation", "inflamed", "non").unwrap();
        let up = table.row("up").unwrap();
        assert!(up.log2_fold_change > 2.0);
        assert!(up.pvalue < 0.01);
        let flat = table.row("flat").unwrap();
        assert!(flat.pvalue > 0.1);
    }

    #[test]
    fn test_exact_p_bounds() {
        let cohort = de_cohort();
        let table = exact_test(&cohort, "inflammation", "inflamed", "non").unwrap();
        for r in &table.rows {
            assert!(r.pvalue >= 0.0 && r.pvalue <= 1.0);
            if r.padj.is_finite() {
                assert!(r.padj <= 1.0);
            }
        }
    }

    #[test]
    fn test_conditional_balanced_split_not_significant() {
        let p = conditional_exact_p(100, 200, 4, 4, 0.1);
        assert!(p > 0.5);
    }

    #[test]
    fn test_conditional_skewed_split_significant() {
        let p = conditional_exact_p(190, 200, 4, 4, 0.01);
        assert!(p < 0.01);
    }

    #[test]
    fn test_doubled_tail_capped() {
        for k in 0..=20 {
            let p = conditional_exact_p(k, 20, 3, 3, 0.5);
            assert!(p <= 1.0);
        }
    }

    #[test]
    fn test_ln_nb_pmf_normalizes() {
        // Sum over a generous support is close to 1
        let total: f64 = (0..2000)
            .map(|k| ln_nb_pmf(k as f64, 10.0, 50.0).exp())
            .sum();
        assert!((total - 1.0).abs() < 1e-6);
    }
}

//! Library-size normalization via the median of ratios method

use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::error::{Result, UcseqError};

/// Estimate size factors with the standard median of ratios method.
///
/// Genes with a zero count in any sample are excluded from the reference
/// geometric means; at least one all-positive gene is required.
pub fn size_factors(counts: ArrayView2<f64>) -> Result<Array1<f64>> {
    let (n_genes, n_samples) = counts.dim();
    if n_genes == 0 || n_samples == 0 {
        return Err(UcseqError::EmptyData {
            reason: "Count matrix is empty".to_string(),
        });
    }

    let mut geo_means = Vec::new();
    let mut valid_genes = Vec::new();
    for (i, row) in counts.axis_iter(Axis(0)).enumerate() {
        if row.iter().all(|&x| x > 0.0) {
            let log_sum: f64 = row.iter().map(|&x| x.ln()).sum();
            geo_means.push((log_sum / n_samples as f64).exp());
            valid_genes.push(i);
        }
    }
    if valid_genes.is_empty() {
        return Err(UcseqError::SizeFactorFailed {
            reason: "No genes with all non-zero counts found".to_string(),
        });
    }

    let mut factors = Array1::zeros(n_samples);
    for j in 0..n_samples {
        let mut ratios: Vec<f64> = valid_genes
            .iter()
            .zip(geo_means.iter())
            .map(|(&i, &geo_mean)| counts[[i, j]] / geo_mean)
            .collect();
        ratios.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let median = if ratios.len() % 2 == 0 {
            (ratios[ratios.len() / 2 - 1] + ratios[ratios.len() / 2]) / 2.0
        } else {
            ratios[ratios.len() / 2]
        };
        factors[j] = median;
    }

    if factors.iter().any(|&x| x <= 0.0 || !x.is_finite()) {
        return Err(UcseqError::SizeFactorFailed {
            reason: "Invalid size factors computed".to_string(),
        });
    }
    Ok(factors)
}

/// Counts divided column-wise by the size factors
pub fn normalized_counts(counts: ArrayView2<f64>, factors: &Array1<f64>) -> Result<Array2<f64>> {
    if factors.len() != counts.ncols() {
        return Err(UcseqError::DimensionMismatch {
            expected: format!("{} size factors", counts.ncols()),
            got: format!("{}", factors.len()),
        });
    }
    let mut normalized = counts.to_owned();
    for (j, mut col) in normalized.axis_iter_mut(Axis(1)).enumerate() {
        col.mapv_inplace(|x| x / factors[j]);
    }
    Ok(normalized)
}

/// Counts per million, per sample
pub fn cpm(counts: ArrayView2<f64>) -> Result<Array2<f64>> {
    let mut out = counts.to_owned();
    for mut col in out.axis_iter_mut(Axis(1)) {
        let total = col.sum();
        if total <= 0.0 {
            return Err(UcseqError::InvalidCountMatrix {
                reason: "Sample with zero total counts".to_string(),
            });
        }
        col.mapv_inplace(|x| x / total * 1e6);
    }
    Ok(out)
}

/// log2(normalized count + 1), the embedding input
pub fn log2_normalized(counts: ArrayView2<f64>, factors: &Array1<f64>) -> Result<Array2<f64>> {
    let mut normalized = normalized_counts(counts, factors)?;
    normalized.mapv_inplace(|x| (x + 1.0).log2());
    Ok(normalized)
}

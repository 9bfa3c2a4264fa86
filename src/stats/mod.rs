//! Shared statistical routines: multiple-testing correction and rank tests

use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

use crate::error::{Result, UcseqError};

/// Apply Benjamini-Hochberg FDR correction to p-values.
///
/// NaN entries stay NaN and do not count toward the number of tests.
pub fn benjamini_hochberg(pvalues: &[f64]) -> Vec<f64> {
    let n = pvalues.len();
    if n == 0 {
        return vec![];
    }

    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by(|&a, &b| {
        let pa = pvalues[a];
        let pb = pvalues[b];
        if pa.is_nan() && pb.is_nan() {
            std::cmp::Ordering::Equal
        } else if pa.is_nan() {
            std::cmp::Ordering::Greater
        } else if pb.is_nan() {
            std::cmp::Ordering::Less
        } else {
            pa.partial_cmp(&pb).unwrap()
        }
    });

    let m = pvalues.iter().filter(|p| p.is_finite()).count();
    if m == 0 {
        return vec![f64::NAN; n];
    }

    let mut padj = vec![f64::NAN; n];
    let mut cummin = f64::INFINITY;
    let mut rank = m;
    for &i in indices.iter().rev() {
        let p = pvalues[i];
        if p.is_finite() {
            let adj = (p * m as f64 / rank as f64).min(1.0);
            cummin = cummin.min(adj);
            padj[i] = cummin;
            rank -= 1;
        }
    }
    padj
}

/// Mid-ranks of the values, ties sharing the average rank (1-based)
pub fn tied_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // Positions i..=j hold the same value
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg_rank;
        }
        i = j + 1;
    }
    ranks
}

/// Spearman rank correlation with a normal-approximation p-value.
///
/// Returns (rho, two-sided p). Ties are mid-ranked; a constant input
/// yields NaN correlation and p = 1.
pub fn spearman(x: &[f64], y: &[f64]) -> Result<(f64, f64)> {
    if x.len() != y.len() {
        return Err(UcseqError::DimensionMismatch {
            expected: format!("{} values", x.len()),
            got: format!("{} values", y.len()),
        });
    }
    let n = x.len();
    if n < 3 {
        return Err(UcseqError::InvalidInput {
            reason: format!("Spearman correlation needs at least 3 pairs, got {}", n),
        });
    }

    let rx = tied_ranks(x);
    let ry = tied_ranks(y);
    let mean = (n as f64 + 1.0) / 2.0;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for i in 0..n {
        let dx = rx[i] - mean;
        let dy = ry[i] - mean;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return Ok((f64::NAN, 1.0));
    }
    let rho = sxy / (sxx * syy).sqrt();

    // t approximation would need n-2 dof; the normal form is adequate at
    // cohort scale and matches the rest of the rank tests here
    let z = rho * ((n as f64 - 1.0).sqrt());
    let normal = Normal::new(0.0, 1.0).map_err(|e| UcseqError::NumericalInstability {
        operation: "spearman".to_string(),
        details: e.to_string(),
    })?;
    let p = (2.0 * (1.0 - normal.cdf(z.abs()))).clamp(0.0, 1.0);
    Ok((rho, p))
}

/// Mann-Whitney U test with tie-corrected normal approximation.
///
/// Returns (U of the first group, two-sided p).
pub fn mann_whitney_u(group_a: &[f64], group_b: &[f64]) -> Result<(f64, f64)> {
    let n1 = group_a.len();
    let n2 = group_b.len();
    if n1 == 0 || n2 == 0 {
        return Err(UcseqError::EmptyData {
            reason: "Mann-Whitney requires two non-empty groups".to_string(),
        });
    }

    let mut pooled: Vec<f64> = Vec::with_capacity(n1 + n2);
    pooled.extend_from_slice(group_a);
    pooled.extend_from_slice(group_b);
    let ranks = tied_ranks(&pooled);

    let r1: f64 = ranks[..n1].iter().sum();
    let u1 = r1 - (n1 * (n1 + 1)) as f64 / 2.0;

    let n = (n1 + n2) as f64;
    let mean_u = (n1 * n2) as f64 / 2.0;

    // Tie correction on the rank variance
    let tie_term = tie_correction_sum(&pooled);
    let var_u = (n1 * n2) as f64 / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)));
    if var_u <= 0.0 {
        // All values identical
        return Ok((u1, 1.0));
    }

    let z = (u1 - mean_u) / var_u.sqrt();
    let normal = Normal::new(0.0, 1.0).map_err(|e| UcseqError::NumericalInstability {
        operation: "mann_whitney_u".to_string(),
        details: e.to_string(),
    })?;
    let p = (2.0 * (1.0 - normal.cdf(z.abs()))).clamp(0.0, 1.0);
    Ok((u1, p))
}

/// Sum of t^3 - t over tie groups
fn tie_correction_sum(values: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mut total = 0.0;
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i;
        while j + 1 < sorted.len() && sorted[j + 1] == sorted[i] {
            j += 1;
        }
        let t = (j - i + 1) as f64;
        total += t * t * t - t;
        i = j + 1;
    }
    total
}

/// Kruskal-Wallis H test across k groups, chi-squared approximation.
///
/// Returns (H, p). Needs at least 2 groups with data.
pub fn kruskal_wallis(groups: &[Vec<f64>]) -> Result<(f64, f64)> {
    let k = groups.iter().filter(|g| !g.is_empty()).count();
    if k < 2 {
        return Err(UcseqError::InvalidInput {
            reason: "Kruskal-Wallis needs at least 2 non-empty groups".to_string(),
        });
    }

    let pooled: Vec<f64> = groups.iter().flatten().copied().collect();
    let n = pooled.len() as f64;
    let ranks = tied_ranks(&pooled);

    let mut h = 0.0;
    let mut offset = 0;
    for group in groups {
        if group.is_empty() {
            continue;
        }
        let ni = group.len() as f64;
        let ri: f64 = ranks[offset..offset + group.len()].iter().sum();
        h += ri * ri / ni;
        offset += group.len();
    }
    h = 12.0 / (n * (n + 1.0)) * h - 3.0 * (n + 1.0);

    // Tie correction
    let tie_term = tie_correction_sum(&pooled);
    let correction = 1.0 - tie_term / (n * n * n - n);
    if correction <= 0.0 {
        return Ok((0.0, 1.0));
    }
    h /= correction;

    let chi2 = ChiSquared::new((k - 1) as f64).map_err(|e| UcseqError::NumericalInstability {
        operation: "kruskal_wallis".to_string(),
        details: e.to_string(),
    })?;
    let p = (1.0 - chi2.cdf(h.max(0.0))).clamp(0.0, 1.0);
    Ok((h, p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bh_monotone_and_bounded() {
        let pvalues = vec![0.01, 0.04, 0.03, 0.02];
        let padj = benjamini_hochberg(&pvalues);
        for (p, adj) in pvalues.iter().zip(padj.iter()) {
            assert!(*adj >= *p);
            assert!(*adj <= 1.0);
        }
        // Order by p is preserved in padj
        assert!(padj[0] <= padj[3]);
        assert!(padj[3] <= padj[2]);
    }

    #[test]
    fn test_bh_with_nan() {
        let padj = benjamini_hochberg(&[0.01, f64::NAN, 0.03]);
        assert!(padj[0].is_finite());
        assert!(padj[1].is_nan());
        assert!(padj[2].is_finite());
    }

    #[test]
    fn test_tied_ranks_average() {
        let ranks = tied_ranks(&[10.0, 20.0, 20.0, 30.0]);
        assert_eq!(ranks, vec![1.0, 2.5, 2.5, 4.0]);
    }

    #[test]
    fn test_spearman_perfect_monotone() {
        let x = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let y = vec![2.0, 4.0, 8.0, 16.0, 32.0];
        let (rho, p) = spearman(&x, &y).unwrap();
        assert_relative_eq!(rho, 1.0, max_relative = 1e-12);
        assert!(p < 0.05);
    }

    #[test]
    fn test_spearman_anticorrelated() {
        let x = vec![1.0, 2.0, 3.0, 4.0];
        let y = vec![9.0, 7.0, 5.0, 1.0];
        let (rho, _) = spearman(&x, &y).unwrap();
        assert_relative_eq!(rho, -1.0, max_relative = 1e-12);
    }

    #[test]
    fn test_spearman_constant_input() {
        let x = vec![1.0, 1.0, 1.0, 1.0];
        let y = vec![1.0, 2.0, 3.0, 4.0];
        let (rho, p) = spearman(&x, &y).unwrap();
        assert!(rho.is_nan());
        assert_eq!(p, 1.0);
    }

    #[test]
    fn test_mann_whitney_separated_groups() {
        let a = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let b = vec![10.0, 11.0, 12.0, 13.0, 14.0];
        let (u, p) = mann_whitney_u(&a, &b).unwrap();
        assert_eq!(u, 0.0);
        assert!(p < 0.01);
    }

    #[test]
    fn test_mann_whitney_identical_groups() {
        let a = vec![5.0, 5.0, 5.0];
        let b = vec![5.0, 5.0, 5.0];
        let (_, p) = mann_whitney_u(&a, &b).unwrap();
        assert_eq!(p, 1.0);
    }

    #[test]
    fn test_kruskal_wallis_three_groups() {
        let groups = vec![
            vec![1.0, 2.0, 3.0],
            vec![4.0, 5.0, 6.0],
            vec![7.0, 8.0, 9.0],
        ];
        let (h, p) = kruskal_wallis(&groups).unwrap();
        assert!(h > 0.0);
        assert!(p < 0.05);
    }

    #[test]
    fn test_kruskal_wallis_matches_known_value() {
        // Two groups reduce to a rank-sum setting; H ~ 0 for interleaved data
        let groups = vec![vec![1.0, 3.0, 5.0, 7.0], vec![2.0, 4.0, 6.0, 8.0]];
        let (h, p) = kruskal_wallis(&groups).unwrap();
        assert!(h < 1.0);
        assert!(p > 0.3);
    }
}

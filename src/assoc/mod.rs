//! Associations between embedding components and sample metadata

use ndarray::Array2;

use crate::data::SampleMetadata;
use crate::embed::Embedding;
use crate::error::{Result, UcseqError};
use crate::stats::{benjamini_hochberg, kruskal_wallis, mann_whitney_u, spearman};

/// One-hot design matrix over categorical factors
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    /// samples x indicator columns
    pub matrix: Array2<f64>,
    /// `factor=level` per column
    pub column_names: Vec<String>,
}

/// Expand categorical columns into 0/1 indicators, one per level.
///
/// Every level gets a column (no reference level is dropped): each
/// indicator is correlated against the components independently.
pub fn one_hot_design(metadata: &SampleMetadata, columns: &[String]) -> Result<DesignMatrix> {
    let n = metadata.n_samples();
    let mut names = Vec::new();
    let mut data: Vec<Vec<f64>> = Vec::new();

    for column in columns {
        let values = metadata
            .column(column)
            .ok_or_else(|| UcseqError::InvalidMetadata {
                reason: format!("column '{}' not found", column),
            })?;
        for level in metadata.levels(column)? {
            let indicator: Vec<f64> = values
                .iter()
                .map(|v| if *v == level { 1.0 } else { 0.0 })
                .collect();
            names.push(format!("{}={}", column, level));
            data.push(indicator);
        }
    }

    if names.is_empty() {
        return Err(UcseqError::EmptyData {
            reason: "No factor columns for the design matrix".to_string(),
        });
    }

    let mut matrix = Array2::zeros((n, names.len()));
    for (c, col) in data.iter().enumerate() {
        for (i, &v) in col.iter().enumerate() {
            matrix[[i, c]] = v;
        }
    }
    Ok(DesignMatrix {
        matrix,
        column_names: names,
    })
}

/// Spearman correlation of one component against one indicator
#[derive(Debug, Clone)]
pub struct PcAssociation {
    pub component: usize,
    pub factor_level: String,
    pub rho: f64,
    pub pvalue: f64,
    pub padj: f64,
}

/// Correlate every embedding axis against every design indicator.
///
/// BH adjustment runs across the full component x indicator grid.
pub fn pc_associations(embedding: &Embedding, design: &DesignMatrix) -> Result<Vec<PcAssociation>> {
    if design.matrix.nrows() != embedding.n_samples() {
        return Err(UcseqError::DimensionMismatch {
            expected: format!("{} design rows", embedding.n_samples()),
            got: format!("{}", design.matrix.nrows()),
        });
    }

    let mut rows = Vec::new();
    for component in 0..embedding.n_dims() {
        let scores = embedding.axis(component);
        for (c, name) in design.column_names.iter().enumerate() {
            let indicator: Vec<f64> = design.matrix.column(c).to_vec();
            let (rho, pvalue) = spearman(&scores, &indicator)?;
            rows.push(PcAssociation {
                component,
                factor_level: name.clone(),
                rho,
                pvalue,
                padj: f64::NAN,
            });
        }
    }

    let pvalues: Vec<f64> = rows.iter().map(|r| r.pvalue).collect();
    for (row, padj) in rows.iter_mut().zip(benjamini_hochberg(&pvalues)) {
        row.padj = padj;
    }
    Ok(rows)
}

/// Rank test of one component's scores across the levels of one factor
#[derive(Debug, Clone)]
pub struct GroupTest {
    pub component: usize,
    pub factor: String,
    /// "mann_whitney" for two-level factors, "kruskal_wallis" otherwise
    pub test: String,
    pub statistic: f64,
    pub pvalue: f64,
    pub padj: f64,
}

/// Test each embedding axis against each categorical factor.
///
/// Two-level factors get a Mann-Whitney U, factors with more levels a
/// Kruskal-Wallis H. Single-level factors are skipped with a warning.
pub fn pc_group_tests(
    embedding: &Embedding,
    metadata: &SampleMetadata,
    factors: &[String],
) -> Result<Vec<GroupTest>> {
    if metadata.n_samples() != embedding.n_samples() {
        return Err(UcseqError::DimensionMismatch {
            expected: format!("{} metadata rows", embedding.n_samples()),
            got: format!("{}", metadata.n_samples()),
        });
    }

    let mut rows = Vec::new();
    for factor in factors {
        let levels = metadata.levels(factor)?;
        if levels.len() < 2 {
            log::warn!("Factor '{}' has a single level, skipping group tests", factor);
            continue;
        }
        for component in 0..embedding.n_dims() {
            let scores = embedding.axis(component);
            let groups: Vec<Vec<f64>> = levels
                .iter()
                .map(|level| {
                    metadata
                        .samples_with_level(factor, level)
                        .iter()
                        .map(|&i| scores[i])
                        .collect()
                })
                .collect();

            let (test, statistic, pvalue) = if levels.len() == 2 {
                let (u, p) = mann_whitney_u(&groups[0], &groups[1])?;
                ("mann_whitney".to_string(), u, p)
            } else {
                let (h, p) = kruskal_wallis(&groups)?;
                ("kruskal_wallis".to_string(), h, p)
            };
            rows.push(GroupTest {
                component,
                factor: factor.clone(),
                test,
                statistic,
                pvalue,
                padj: f64::NAN,
            });
        }
    }

    let pvalues: Vec<f64> = rows.iter().map(|r| r.pvalue).collect();
    for (row, padj) in rows.iter_mut().zip(benjamini_hochberg(&pvalues)) {
        row.padj = padj;
    }
    Ok(rows)
}

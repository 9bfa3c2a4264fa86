//! Differential expression: two independent count models and their comparison

pub mod exact;
pub mod wald;

use serde::Serialize;

use crate::error::{Result, UcseqError};
use crate::stats::spearman;

pub use exact::exact_test;
pub use wald::wald_test;

/// Default adjusted-p cutoff for the headline gene list
pub const TOP_PADJ: f64 = 0.07;
/// Default absolute log2 fold-change cutoff for the headline gene list
pub const TOP_LFC: f64 = 1.0;
/// Default headline list size
pub const TOP_CAP: usize = 20;

/// Per-gene test result
#[derive(Debug, Clone, Serialize)]
pub struct DeRow {
    pub gene_id: String,
    pub symbol: String,
    pub base_mean: f64,
    pub log2_fold_change: f64,
    pub stat: f64,
    pub pvalue: f64,
    pub padj: f64,
}

/// One model's full result table, sorted by p-value
#[derive(Debug, Clone, Serialize)]
pub struct DeTable {
    /// "wald" or "exact"
    pub model: String,
    pub rows: Vec<DeRow>,
}

impl DeTable {
    /// Sort rows by p-value ascending, NaN last
    pub(crate) fn sort_by_significance(&mut self) {
        self.rows.sort_by(|a, b| {
            if a.pvalue.is_nan() && b.pvalue.is_nan() {
                std::cmp::Ordering::Equal
            } else if a.pvalue.is_nan() {
                std::cmp::Ordering::Greater
            } else if b.pvalue.is_nan() {
                std::cmp::Ordering::Less
            } else {
                a.pvalue.partial_cmp(&b.pvalue).unwrap()
            }
        });
    }

    /// Row for a gene id, if present
    pub fn row(&self, gene_id: &str) -> Option<&DeRow> {
        self.rows.iter().find(|r| r.gene_id == gene_id)
    }
}

/// Headline gene list: padj < padj_max and |log2FC| > lfc_min, sorted by
/// adjusted significance, at most cap rows.
pub fn top_genes(table: &DeTable, padj_max: f64, lfc_min: f64, cap: usize) -> Vec<DeRow> {
    let mut hits: Vec<DeRow> = table
        .rows
        .iter()
        .filter(|r| r.padj.is_finite() && r.padj < padj_max && r.log2_fold_change.abs() > lfc_min)
        .cloned()
        .collect();
    hits.sort_by(|a, b| {
        a.padj
            .partial_cmp(&b.padj)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                a.pvalue
                    .partial_cmp(&b.pvalue)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    });
    hits.truncate(cap);
    hits
}

/// Agreement between the two models' headline lists
#[derive(Debug, Clone, Serialize)]
pub struct ModelComparison {
    pub shared: Vec<String>,
    pub wald_only: Vec<String>,
    pub exact_only: Vec<String>,
    /// Spearman correlation of full-table ranks over the shared genes;
    /// None with fewer than 3 shared genes
    pub rank_agreement: Option<f64>,
}

/// Compare the headline lists of the two models.
pub fn compare(
    wald: &DeTable,
    exact: &DeTable,
    padj_max: f64,
    lfc_min: f64,
    cap: usize,
) -> Result<ModelComparison> {
    let top_wald = top_genes(wald, padj_max, lfc_min, cap);
    let top_exact = top_genes(exact, padj_max, lfc_min, cap);

    let wald_ids: Vec<&str> = top_wald.iter().map(|r| r.gene_id.as_str()).collect();
    let exact_ids: Vec<&str> = top_exact.iter().map(|r| r.gene_id.as_str()).collect();

    let shared: Vec<String> = wald_ids
        .iter()
        .filter(|id| exact_ids.contains(id))
        .map(|id| id.to_string())
        .collect();
    let wald_only: Vec<String> = wald_ids
        .iter()
        .filter(|id| !exact_ids.contains(id))
        .map(|id| id.to_string())
        .collect();
    let exact_only: Vec<String> = exact_ids
        .iter()
        .filter(|id| !wald_ids.contains(id))
        .map(|id| id.to_string())
        .collect();

    let rank_agreement = if shared.len() >= 3 {
        let rank_in = |table: &DeTable, id: &str| -> Result<f64> {
            table
                .rows
                .iter()
                .position(|r| r.gene_id == id)
                .map(|p| p as f64)
                .ok_or_else(|| UcseqError::InvalidInput {
                    reason: format!("gene '{}' missing from a model table", id),
                })
        };
        let ranks_wald: Result<Vec<f64>> = shared.iter().map(|id| rank_in(wald, id)).collect();
        let ranks_exact: Result<Vec<f64>> = shared.iter().map(|id| rank_in(exact, id)).collect();
        let (rho, _) = spearman(&ranks_wald?, &ranks_exact?)?;
        Some(rho)
    } else {
        None
    };

    Ok(ModelComparison {
        shared,
        wald_only,
        exact_only,
        rank_agreement,
    })
}

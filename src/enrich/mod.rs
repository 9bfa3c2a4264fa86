//! Pathway enrichment: over-representation and preranked GSEA

pub mod gmt;
pub mod gsea;
pub mod ora;

use std::collections::HashSet;

use crate::de::DeTable;

pub use gmt::{read_gmt, GeneSet, GeneSetCollection};
pub use gsea::{gsea_preranked, GseaParams, GseaRow};
pub use ora::{over_representation, OraRow};

/// Default adjusted-p cutoff for the enrichment input list
pub const ENRICH_PADJ: f64 = 0.1;
/// Default absolute log2 fold-change cutoff for the enrichment input list
pub const ENRICH_LFC: f64 = 1.5;
/// Default enrichment input list size cap
pub const ENRICH_CAP: usize = 40;

/// Symbols feeding the over-representation test, with mapping bookkeeping
#[derive(Debug, Clone)]
pub struct EnrichInput {
    /// Selected symbols present in the collection universe, upper-cased
    pub mapped: Vec<String>,
    /// Selected symbols absent from the universe
    pub unmapped: Vec<String>,
}

/// Select the enrichment input from a DE table.
///
/// Genes with padj below padj_max and |log2FC| above lfc_min, ranked by
/// adjusted significance and capped; symbols are intersected with the
/// collection universe and misses are logged, not fatal.
pub fn select_enrichment_input(
    table: &DeTable,
    universe: &HashSet<String>,
    padj_max: f64,
    lfc_min: f64,
    cap: usize,
) -> EnrichInput {
    let mut hits: Vec<_> = table
        .rows
        .iter()
        .filter(|r| r.padj.is_finite() && r.padj < padj_max && r.log2_fold_change.abs() > lfc_min)
        .collect();
    hits.sort_by(|a, b| {
        a.padj
            .partial_cmp(&b.padj)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(cap);

    let mut mapped = Vec::new();
    let mut unmapped = Vec::new();
    let mut seen = HashSet::new();
    for row in hits {
        let symbol = row.symbol.to_ascii_uppercase();
        if !seen.insert(symbol.clone()) {
            continue;
        }
        if universe.contains(&symbol) {
            mapped.push(symbol);
        } else {
            unmapped.push(symbol);
        }
    }
    if !unmapped.is_empty() {
        log::warn!(
            "{} of {} selected symbols not in the pathway universe",
            unmapped.len(),
            mapped.len() + unmapped.len()
        );
    }
    EnrichInput { mapped, unmapped }
}

//! Over-representation analysis via the hypergeometric upper tail

use statrs::distribution::{DiscreteCDF, Hypergeometric};

use crate::enrich::GeneSetCollection;
use crate::error::{Result, UcseqError};
use crate::stats::benjamini_hochberg;

/// Gene sets overlapping the query by fewer members are skipped
pub const MIN_OVERLAP: u64 = 2;

/// One pathway's over-representation result
#[derive(Debug, Clone, serde::Serialize)]
pub struct OraRow {
    pub set_name: String,
    pub overlap: u64,
    pub set_size: u64,
    pub query_size: u64,
    pub universe_size: u64,
    pub fold_enrichment: f64,
    pub pvalue: f64,
    pub padj: f64,
}

/// Test each gene set for over-representation of the query symbols.
///
/// P(X >= overlap) under Hypergeometric(universe, set, query), computed
/// as sf(overlap - 1); BH adjustment across the tested sets, sorted by p.
pub fn over_representation(
    query: &[String],
    collection: &GeneSetCollection,
) -> Result<Vec<OraRow>> {
    let universe = collection.universe();
    let universe_size = universe.len() as u64;
    let query_size = query.len() as u64;
    if query_size == 0 {
        return Err(UcseqError::EmptyData {
            reason: "Empty enrichment query".to_string(),
        });
    }

    let mut rows = Vec::new();
    for set in &collection.sets {
        let overlap = query.iter().filter(|s| set.members.contains(*s)).count() as u64;
        if overlap < MIN_OVERLAP {
            continue;
        }
        let set_size = set.members.len() as u64;

        let dist = Hypergeometric::new(universe_size, set_size, query_size).map_err(|e| {
            UcseqError::NumericalInstability {
                operation: "over_representation".to_string(),
                details: format!("set '{}': {}", set.name, e),
            }
        })?;
        let pvalue = dist.sf(overlap - 1).clamp(0.0, 1.0);

        let expected = set_size as f64 * query_size as f64 / universe_size as f64;
        let fold_enrichment = if expected > 0.0 {
            overlap as f64 / expected
        } else {
            f64::NAN
        };

        rows.push(OraRow {
            set_name: set.name.clone(),
            overlap,
            set_size,
            query_size,
            universe_size,
            fold_enrichment,
            pvalue,
            padj: f64::NAN,
        });
    }

    let pvalues: Vec<f64> = rows.iter().map(|r| r.pvalue).collect();
    for (row, padj) in rows.iter_mut().zip(benjamini_hochberg(&pvalues)) {
        row.padj = padj;
    }
    rows.sort_by(|a, b| {
        a.pvalue
            .partial_cmp(&b.pvalue)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(rows)
}

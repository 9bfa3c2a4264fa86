//! Preranked gene set enrichment with a gene-permutation null

use rayon::prelude::*;

use crate::enrich::GeneSetCollection;
use crate::error::{Result, UcseqError};
use crate::rng::MersenneTwister;
use crate::stats::benjamini_hochberg;

/// GSEA knobs
#[derive(Debug, Clone)]
pub struct GseaParams {
    pub n_permutations: usize,
    pub min_set_size: usize,
    pub max_set_size: usize,
    pub seed: u32,
}

impl Default for GseaParams {
    fn default() -> Self {
        Self {
            n_permutations: 1000,
            min_set_size: 5,
            max_set_size: 500,
            seed: 42,
        }
    }
}

/// One gene set's enrichment result
#[derive(Debug, Clone, serde::Serialize)]
pub struct GseaRow {
    pub set_name: String,
    pub set_size: usize,
    pub es: f64,
    pub nes: f64,
    pub pvalue: f64,
    pub padj: f64,
    /// Members before (positive ES) or after (negative ES) the peak
    pub leading_edge: usize,
}

/// Weighted running-sum enrichment score (p = 1 weighting).
///
/// `in_set` flags the ranked genes belonging to the set; `stats` are the
/// ranking statistics in the same descending order. Returns the extreme
/// deviation and the index of the peak.
fn enrichment_score(stats: &[f64], in_set: &[bool]) -> (f64, usize) {
    let n = stats.len();
    let weight_total: f64 = stats
        .iter()
        .zip(in_set.iter())
        .filter(|(_, &m)| m)
        .map(|(&s, _)| s.abs())
        .sum();
    let n_miss = in_set.iter().filter(|&&m| !m).count();
    let miss_step = if n_miss > 0 { 1.0 / n_miss as f64 } else { 0.0 };

    let mut running = 0.0;
    let mut best: f64 = 0.0;
    let mut best_idx = 0;
    for i in 0..n {
        if in_set[i] {
            // All-zero statistics degrade to an even step
            running += if weight_total > 0.0 {
                stats[i].abs() / weight_total
            } else {
                miss_step
            };
        } else {
            running -= miss_step;
        }
        if running.abs() > best.abs() {
            best = running;
            best_idx = i;
        }
    }
    (best, best_idx)
}

/// Run preranked GSEA: genes ranked by a statistic, descending.
///
/// NES is the ES divided by the mean |ES| of same-signed permutation
/// scores; the permutation p-value uses the same-signed null tail.
/// Results are BH-adjusted and sorted by |NES| descending.
pub fn gsea_preranked(
    ranked_symbols: &[String],
    ranked_stats: &[f64],
    collection: &GeneSetCollection,
    params: &GseaParams,
) -> Result<Vec<GseaRow>> {
    if ranked_symbols.len() != ranked_stats.len() {
        return Err(UcseqError::DimensionMismatch {
            expected: format!("{} statistics", ranked_symbols.len()),
            got: format!("{}", ranked_stats.len()),
        });
    }
    let n = ranked_symbols.len();
    if n < 10 {
        return Err(UcseqError::EmptyData {
            reason: "Preranked GSEA needs at least 10 genes".to_string(),
        });
    }
    for pair in ranked_stats.windows(2) {
        if pair[0] < pair[1] {
            return Err(UcseqError::InvalidInput {
                reason: "Ranking statistics must be sorted descending".to_string(),
            });
        }
    }

    let upper: Vec<String> = ranked_symbols
        .iter()
        .map(|s| s.to_ascii_uppercase())
        .collect();

    // Membership masks per eligible set
    let eligible: Vec<(usize, Vec<bool>, usize)> = collection
        .sets
        .iter()
        .enumerate()
        .filter_map(|(idx, set)| {
            let mask: Vec<bool> = upper.iter().map(|s| set.members.contains(s)).collect();
            let size = mask.iter().filter(|&&m| m).count();
            if size >= params.min_set_size && size <= params.max_set_size {
                Some((idx, mask, size))
            } else {
                None
            }
        })
        .collect();
    if eligible.is_empty() {
        return Err(UcseqError::EmptyData {
            reason: "No gene sets within the size bounds overlap the ranking".to_string(),
        });
    }

    // One permutation stream per set, offset by the set index so rayon
    // scheduling cannot change the draws
    let mut rows: Vec<GseaRow> = eligible
        .par_iter()
        .map(|(idx, mask, size)| {
            let set = &collection.sets[*idx];
            let (es, peak) = enrichment_score(ranked_stats, mask);

            let mut rng = MersenneTwister::new(params.seed.wrapping_add(*idx as u32));
            let mut positions: Vec<usize> = (0..n).collect();
            let mut same_sign_sum = 0.0;
            let mut same_sign_n = 0usize;
            let mut at_least_as_extreme = 0usize;
            let mut perm_mask = vec![false; n];

            for _ in 0..params.n_permutations {
                rng.shuffle(&mut positions);
                perm_mask.iter_mut().for_each(|m| *m = false);
                for &p in &positions[..*size] {
                    perm_mask[p] = true;
                }
                let (perm_es, _) = enrichment_score(ranked_stats, &perm_mask);
                if perm_es.signum() == es.signum() {
                    same_sign_sum += perm_es.abs();
                    same_sign_n += 1;
                    if perm_es.abs() >= es.abs() {
                        at_least_as_extreme += 1;
                    }
                }
            }

            let nes = if same_sign_n > 0 && same_sign_sum > 0.0 {
                es / (same_sign_sum / same_sign_n as f64)
            } else {
                f64::NAN
            };
            let pvalue = if same_sign_n > 0 {
                ((at_least_as_extreme + 1) as f64 / (same_sign_n + 1) as f64).min(1.0)
            } else {
                f64::NAN
            };

            let leading_edge = if es >= 0.0 {
                mask[..=peak].iter().filter(|&&m| m).count()
            } else {
                mask[peak..].iter().filter(|&&m| m).count()
            };

            GseaRow {
                set_name: set.name.clone(),
                set_size: *size,
                es,
                nes,
                pvalue,
                padj: f64::NAN,
                leading_edge,
            }
        })
        .collect();

    let pvalues: Vec<f64> = rows.iter().map(|r| r.pvalue).collect();
    for (row, padj) in rows.iter_mut().zip(benjamini_hochberg(&pvalues)) {
        row.padj = padj;
    }
    rows.sort_by(|a, b| {
        let an = if a.nes.is_nan() { 0.0 } else { a.nes.abs() };
        let bn = if b.nes.is_nan() { 0.0 } else { b.nes.abs() };
        bn.partial_cmp(&an).unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::gmt::GeneSet;

    fn ranking(n: usize) -> (Vec<String>, Vec<f64>) {
        let symbols: Vec<String> = (0..n).map(|i| format!("G{}", i)).collect();
        let stats: Vec<f64> = (0..n).map(|i| 5.0 - 10.0 * i as f64 / (n - 1) as f64).collect();
        (symbols, stats)
    }

    fn set_of(name: &str, ids: &[usize]) -> GeneSet {
        GeneSet {
            name: name.to_string(),
            description: String::new(),
            members: ids.iter().map(|i| format!("G{}", i)).collect(),
        }
    }

    #[test]
    fn test_top_loaded_set_positive_and_significant() {
        let (symbols, stats) = ranking(100);
        let collection = GeneSetCollection {
            sets: vec![
                set_of("TOP", &[0, 1, 2, 3, 4, 5, 6, 7]),
                set_of("SPREAD", &[5, 18, 31, 44, 57, 70, 83, 96]),
            ],
        };
        let params = GseaParams {
            n_permutations: 200,
            ..GseaParams::default()
        };
        let rows = gsea_preranked(&symbols, &stats, &collection, &params).unwrap();
        let top = rows.iter().find(|r| r.set_name == "TOP").unwrap();
        assert!(top.es > 0.5);
        assert!(top.pvalue < 0.05);
        assert!(top.leading_edge >= 7);
        let spread = rows.iter().find(|r| r.set_name == "SPREAD").unwrap();
        assert!(spread.es.abs() < top.es);
        // Ordered by |NES|
        assert_eq!(rows[0].set_name, "TOP");
    }

    #[test]
    fn test_bottom_loaded_set_negative() {
        let (symbols, stats) = ranking(100);
        let collection = GeneSetCollection {
            sets: vec![set_of("BOTTOM", &[92, 93, 94, 95, 96, 97, 98, 99])],
        };
        let params = GseaParams {
            n_permutations: 100,
            ..GseaParams::default()
        };
        let rows = gsea_preranked(&symbols, &stats, &collection, &params).unwrap();
        assert!(rows[0].es < 0.0);
        assert!(rows[0].nes < 0.0);
    }

    #[test]
    fn test_deterministic_under_seed() {
        let (symbols, stats) = ranking(50);
        let collection = GeneSetCollection {
            sets: vec![set_of("S", &[0, 2, 4, 6, 8, 10])],
        };
        let params = GseaParams {
            n_permutations: 100,
            ..GseaParams::default()
        };
        let a = gsea_preranked(&symbols, &stats, &collection, &params).unwrap();
        let b = gsea_preranked(&symbols, &stats, &collection, &params).unwrap();
        assert_eq!(a[0].nes, b[0].nes);
        assert_eq!(a[0].pvalue, b[0].pvalue);
    }

    #[test]
    fn test_unsorted_ranking_rejected() {
        let symbols: Vec<String> = (0..20).map(|i| format!("G{}", i)).collect();
        let mut stats: Vec<f64> = (0..20).map(|i| -(i as f64)).collect();
        stats[5] = 100.0;
        let collection = GeneSetCollection {
            sets: vec![set_of("S", &[0, 1, 2, 3, 4, 5])],
        };
        assert!(
            gsea_preranked(&symbols, &stats, &collection, &GseaParams::default()).is_err()
        );
    }

    #[test]
    fn test_size_bounds_filter_sets() {
        let (symbols, stats) = ranking(50);
        let collection = GeneSetCollection {
            sets: vec![set_of("TINY", &[0, 1])],
        };
        assert!(
            gsea_preranked(&symbols, &stats, &collection, &GseaParams::default()).is_err()
        );
    }
}

//! ucseq: exploratory bulk RNA-seq report for an ulcerative colitis cohort
//!
//! The pipeline loads a raw count matrix and sample metadata, filters and
//! normalizes the expression data, computes sample embeddings and their
//! metadata associations, runs two independent differential expression
//! models, replicate-pair expression ratios, and pathway enrichment, and
//! renders everything as a self-contained HTML slide deck plus
//! machine-readable tables.
//!
//! # Example
//!
//! ```ignore
//! use ucseq::prelude::*;
//!
//! let cfg = ReportConfig {
//!     counts_path: "counts.tsv.gz".into(),
//!     metadata_path: "series_matrix.txt".into(),
//!     ..ReportConfig::default()
//! };
//! run_report(&cfg)?;
//! ```

pub mod assoc;
pub mod cli;
pub mod data;
pub mod de;
pub mod embed;
pub mod enrich;
pub mod error;
pub mod filter;
pub mod io;
pub mod normalization;
pub mod report;
pub mod rng;
pub mod stats;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::assoc::{one_hot_design, pc_associations, pc_group_tests};
    pub use crate::data::{
        pair_replicates, Cohort, CountMatrix, PairedExpression, PairingSpec, SampleMetadata,
    };
    pub use crate::de::{compare, exact_test, top_genes, wald_test, DeTable};
    pub use crate::embed::{embed, EmbedMethod, EmbedParams, Embedding};
    pub use crate::enrich::{
        gsea_preranked, over_representation, read_gmt, select_enrichment_input, GseaParams,
    };
    pub use crate::error::{Result, UcseqError};
    pub use crate::filter::{filter_by_prevalence, prevalence_pass, top_variance_genes};
    pub use crate::io::{read_count_matrix, read_metadata, read_series_metadata};
    pub use crate::normalization::{log2_normalized, normalized_counts, size_factors};
    pub use crate::report::{write_report, ReportContext};
    pub use crate::{load_cohort, run_report, ReportConfig};
}

use std::io::BufRead;

use ndarray::Axis;

use crate::assoc::{one_hot_design, pc_associations, pc_group_tests};
use crate::data::{pair_replicates, Cohort, PairingSpec};
use crate::de::{compare, exact_test, top_genes, wald_test};
use crate::embed::{embed, EmbedMethod, EmbedParams};
use crate::enrich::{gsea_preranked, over_representation, read_gmt, select_enrichment_input};
use crate::error::Result;
use crate::report::{plots, write_report, ReportContext, ReportFigures, RunParams};

/// Everything the full pipeline needs
#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub counts_path: String,
    pub metadata_path: String,
    pub out_dir: String,
    pub condition_column: String,
    pub case_level: String,
    pub control_level: String,
    pub patient_column: String,
    pub min_expr: f64,
    pub min_fraction: f64,
    pub n_top_genes: usize,
    pub embed_method: EmbedMethod,
    pub gmt_path: Option<String>,
    pub de_padj: f64,
    pub de_lfc: f64,
    pub de_cap: usize,
    pub enrich_padj: f64,
    pub enrich_lfc: f64,
    pub enrich_cap: usize,
    pub gsea_permutations: usize,
    pub seed: u32,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            counts_path: String::new(),
            metadata_path: String::new(),
            out_dir: "report".to_string(),
            condition_column: "inflammation".to_string(),
            case_level: "inflamed".to_string(),
            control_level: "non_inflamed".to_string(),
            patient_column: "patient".to_string(),
            min_expr: filter::DEFAULT_MIN_EXPR,
            min_fraction: filter::DEFAULT_MIN_FRACTION,
            n_top_genes: filter::DEFAULT_TOP_GENES,
            embed_method: EmbedMethod::Pca,
            gmt_path: None,
            de_padj: de::TOP_PADJ,
            de_lfc: de::TOP_LFC,
            de_cap: de::TOP_CAP,
            enrich_padj: enrich::ENRICH_PADJ,
            enrich_lfc: enrich::ENRICH_LFC,
            enrich_cap: enrich::ENRICH_CAP,
            gsea_permutations: 1000,
            seed: 42,
        }
    }
}

/// Load counts and metadata and align them into a cohort.
///
/// The metadata format is auto-detected: files whose first non-empty line
/// starts with `!` are parsed as series-matrix style, anything else as a
/// plain table.
pub fn load_cohort(counts_path: &str, metadata_path: &str) -> Result<Cohort> {
    let matrix = io::read_count_matrix(counts_path)?;

    let first_line = {
        let reader = io::counts::open_maybe_gz(metadata_path)?;
        reader
            .lines()
            .filter_map(|l| l.ok())
            .find(|l| !l.trim().is_empty())
            .unwrap_or_default()
    };
    let metadata = if first_line.starts_with('!') {
        io::read_series_metadata(metadata_path)?
    } else {
        io::read_metadata(metadata_path)?
    };

    Cohort::new(matrix, metadata)
}

/// Run the complete report pipeline and write every output
pub fn run_report(cfg: &ReportConfig) -> Result<()> {
    let cohort = load_cohort(&cfg.counts_path, &cfg.metadata_path)?;
    let n_genes_raw = cohort.n_genes();
    log::info!(
        "Loaded cohort: {} genes x {} samples",
        n_genes_raw,
        cohort.n_samples()
    );

    // Prevalence filter
    let keep = filter::prevalence_pass(cohort.counts(), cfg.min_expr, cfg.min_fraction);
    log::info!(
        "Prevalence filter: {} of {} genes retained",
        keep.len(),
        n_genes_raw
    );
    let cohort = cohort.subset_genes(&keep)?;
    let matrix = cohort.counts();

    // Normalization and the embedding input
    let factors = normalization::size_factors(matrix.counts())?;
    let log_norm = normalization::log2_normalized(matrix.counts(), &factors)?;
    let variances = matrix.gene_variances();
    let top = filter::top_variance_genes(matrix, cfg.n_top_genes);
    let embed_input = log_norm.select(Axis(0), &top);

    // PCA drives the association slides; the display embedding follows the
    // selected method
    let pca_params = EmbedParams {
        method: EmbedMethod::Pca,
        n_dims: 3,
        seed: cfg.seed,
        ..EmbedParams::default()
    };
    let pca_embedding = embed(embed_input.view(), matrix.sample_ids(), &pca_params)?;
    let display_embedding = if cfg.embed_method == EmbedMethod::Pca {
        pca_embedding.clone()
    } else {
        let params = EmbedParams {
            method: cfg.embed_method,
            n_dims: 2,
            seed: cfg.seed,
            ..EmbedParams::default()
        };
        embed(embed_input.view(), matrix.sample_ids(), &params)?
    };

    // Metadata associations of the principal components
    let factor_columns: Vec<String> = cohort.metadata().column_names().to_vec();
    let design = one_hot_design(cohort.metadata(), &factor_columns)?;
    let pc_assoc = pc_associations(&pca_embedding, &design)?;
    let group_tests = pc_group_tests(&pca_embedding, cohort.metadata(), &factor_columns)?;

    // Both DE models and their comparison
    let wald = wald_test(
        &cohort,
        &cfg.condition_column,
        &cfg.case_level,
        &cfg.control_level,
    )?;
    let exact = exact_test(
        &cohort,
        &cfg.condition_column,
        &cfg.case_level,
        &cfg.control_level,
    )?;
    let top_wald = top_genes(&wald, cfg.de_padj, cfg.de_lfc, cfg.de_cap);
    let top_exact = top_genes(&exact, cfg.de_padj, cfg.de_lfc, cfg.de_cap);
    let comparison = compare(&wald, &exact, cfg.de_padj, cfg.de_lfc, cfg.de_cap)?;
    log::info!(
        "Headline genes: {} wald, {} exact, {} shared",
        top_wald.len(),
        top_exact.len(),
        comparison.shared.len()
    );

    // Replicate-pair ratios on normalized counts
    let paired = if cohort.metadata().has_column(&cfg.patient_column) {
        let norm = normalization::normalized_counts(matrix.counts(), &factors)?;
        let spec = PairingSpec {
            patient_column: cfg.patient_column.clone(),
            condition_column: cfg.condition_column.clone(),
            inflamed_level: cfg.case_level.clone(),
            uninflamed_level: cfg.control_level.clone(),
        };
        Some(pair_replicates(norm.view(), cohort.metadata(), &spec)?)
    } else {
        log::warn!(
            "Metadata has no '{}' column, skipping replicate-pair ratios",
            cfg.patient_column
        );
        None
    };

    // Pathway enrichment against a local collection
    let (ora, gsea) = match &cfg.gmt_path {
        Some(path) => {
            let collection = read_gmt(path)?;
            let input = select_enrichment_input(
                &wald,
                &collection.universe(),
                cfg.enrich_padj,
                cfg.enrich_lfc,
                cfg.enrich_cap,
            );
            let ora = if input.mapped.len() >= 2 {
                over_representation(&input.mapped, &collection)?
            } else {
                log::warn!("Too few mapped symbols for over-representation");
                Vec::new()
            };

            let mut ranked: Vec<(&str, f64)> = wald
                .rows
                .iter()
                .filter(|r| r.stat.is_finite())
                .map(|r| (r.symbol.as_str(), r.stat))
                .collect();
            ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            let symbols: Vec<String> = ranked.iter().map(|(s, _)| s.to_string()).collect();
            let stats: Vec<f64> = ranked.iter().map(|(_, v)| *v).collect();
            let gsea_params = enrich::GseaParams {
                n_permutations: cfg.gsea_permutations,
                seed: cfg.seed,
                ..enrich::GseaParams::default()
            };
            let gsea = match gsea_preranked(&symbols, &stats, &collection, &gsea_params) {
                Ok(rows) => rows,
                Err(e) => {
                    log::warn!("Preranked GSEA skipped: {}", e);
                    Vec::new()
                }
            };
            (ora, gsea)
        }
        None => (Vec::new(), Vec::new()),
    };

    // Figures
    let condition_labels: Vec<String> = cohort
        .metadata()
        .column(&cfg.condition_column)
        .cloned()
        .unwrap_or_else(|| vec!["sample".to_string(); cohort.n_samples()]);
    let figures = ReportFigures {
        variance: Some(plots::variance_curve(
            &variances,
            cfg.n_top_genes,
            "Gene variance by rank",
        )?),
        embedding: Some(plots::embedding_scatter(
            &display_embedding,
            &condition_labels,
            &format!("Samples ({})", cfg.embed_method.name()),
        )?),
        volcano_wald: Some(plots::volcano(
            &wald,
            cfg.de_padj,
            cfg.de_lfc,
            "Wald model",
        )?),
        volcano_exact: Some(plots::volcano(
            &exact,
            cfg.de_padj,
            cfg.de_lfc,
            "Exact model",
        )?),
        enrichment: if ora.is_empty() {
            None
        } else {
            Some(plots::enrichment_bars(&ora, 15, "Over-represented pathways")?)
        },
    };

    let ctx = ReportContext {
        params: RunParams {
            embed_method: cfg.embed_method.name().to_string(),
            n_top_genes: cfg.n_top_genes,
            de_padj: cfg.de_padj,
            de_lfc: cfg.de_lfc,
            de_cap: cfg.de_cap,
            enrich_padj: cfg.enrich_padj,
            enrich_lfc: cfg.enrich_lfc,
            enrich_cap: cfg.enrich_cap,
            condition_column: cfg.condition_column.clone(),
            level_a: cfg.case_level.clone(),
            level_b: cfg.control_level.clone(),
            seed: cfg.seed,
        },
        n_samples: cohort.n_samples(),
        n_genes_raw,
        n_genes_filtered: cohort.n_genes(),
        embedding: display_embedding,
        pc_assoc,
        group_tests,
        wald,
        exact,
        top_wald,
        top_exact,
        comparison,
        pair_gene_ids: matrix.gene_ids().to_vec(),
        paired,
        ora,
        gsea,
        figures,
    };
    write_report(&ctx, &cfg.out_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// 8 samples: 2 patients x (2 inflamed + 2 non-inflamed), with clear
    /// up/down signal genes, some low-prevalence genes, and stable genes
    fn write_fixture(dir: &std::path::Path) -> (String, String) {
        let counts_path = dir.join("counts.tsv");
        let meta_path = dir.join("samples.tsv");

        let mut f = std::fs::File::create(&counts_path).unwrap();
        write!(f, "gene_id\tgene_symbol\tgene_biotype").unwrap();
        for i in 0..8 {
            write!(f, "\ts{}", i).unwrap();
        }
        writeln!(f).unwrap();
        // Stable background genes
        for g in 0..30 {
            write!(f, "ENSG{:03}\tBG{}\tprotein_coding", g, g).unwrap();
            for j in 0..8 {
                write!(f, "\t{}", 100 + 7 * g + 3 * j).unwrap();
            }
            writeln!(f).unwrap();
        }
        // Up-regulated in inflamed (samples 0,1,4,5)
        for g in 0..3 {
            write!(f, "ENSG_UP{}\tUP{}\tprotein_coding", g, g).unwrap();
            for j in 0..8 {
                let inflamed = j == 0 || j == 1 || j == 4 || j == 5;
                let base = if inflamed { 900 + 20 * j } else { 90 + 5 * j };
                write!(f, "\t{}", base + 10 * g).unwrap();
            }
            writeln!(f).unwrap();
        }
        // Down-regulated in inflamed
        write!(f, "ENSG_DN0\tDN0\tprotein_coding").unwrap();
        for j in 0..8 {
            let inflamed = j == 0 || j == 1 || j == 4 || j == 5;
            write!(f, "\t{}", if inflamed { 40 + j } else { 400 + 10 * j }).unwrap();
        }
        writeln!(f).unwrap();
        // Low prevalence: expressed in 3 of 8 samples only
        write!(f, "ENSG_RARE\tRARE\tlincRNA").unwrap();
        for j in 0..8 {
            write!(f, "\t{}", if j < 3 { 50 } else { 0 }).unwrap();
        }
        writeln!(f).unwrap();

        let mut m = std::fs::File::create(&meta_path).unwrap();
        writeln!(m, "sample_id\tinflammation\tpatient\thospital").unwrap();
        let inflammation = [
            "inflamed",
            "inflamed",
            "non_inflamed",
            "non_inflamed",
            "inflamed",
            "inflamed",
            "non_inflamed",
            "non_inflamed",
        ];
        let patient = ["p1", "p1", "p1", "p1", "p2", "p2", "p2", "p2"];
        let hospital = ["A", "B", "A", "B", "A", "B", "A", "B"];
        for i in 0..8 {
            writeln!(m, "s{}\t{}\t{}\t{}", i, inflammation[i], patient[i], hospital[i]).unwrap();
        }

        (
            counts_path.to_string_lossy().to_string(),
            meta_path.to_string_lossy().to_string(),
        )
    }

    #[test]
    fn test_full_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let (counts_path, meta_path) = write_fixture(dir.path());
        let out_dir = dir.path().join("out");

        let cfg = ReportConfig {
            counts_path,
            metadata_path: meta_path,
            out_dir: out_dir.to_string_lossy().to_string(),
            ..ReportConfig::default()
        };
        run_report(&cfg).unwrap();

        for name in [
            "report.html",
            "report.json",
            "embedding.tsv",
            "de_wald.tsv",
            "de_exact.tsv",
            "pair_ratios.tsv",
        ] {
            assert!(out_dir.join(name).exists(), "missing {}", name);
        }

        let json: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(out_dir.join("report.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(json["n_samples"], 8);
        // The low-prevalence gene is filtered out
        assert_eq!(json["n_genes_raw"], 35);
        assert_eq!(json["n_genes_filtered"], 34);
        // The planted signal genes surface in the headline list
        let top: Vec<String> = json["top_wald_genes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        assert!(top.iter().any(|g| g.starts_with("ENSG_UP")));
        // Both patients paired cleanly
        assert_eq!(json["n_patients_paired"], 2);
    }

    #[test]
    fn test_load_cohort_detects_table_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let (counts_path, meta_path) = write_fixture(dir.path());
        let cohort = load_cohort(&counts_path, &meta_path).unwrap();
        assert_eq!(cohort.n_samples(), 8);
        assert!(cohort.metadata().has_column("inflammation"));
    }

    #[test]
    fn test_pipeline_fails_on_broken_pairing() {
        let dir = tempfile::tempdir().unwrap();
        let (counts_path, meta_path) = write_fixture(dir.path());
        // Corrupt the pairing: swap one patient label
        let text = std::fs::read_to_string(&meta_path).unwrap();
        let broken = text.replacen("s7\tnon_inflamed\tp2", "s7\tnon_inflamed\tp1", 1);
        std::fs::write(&meta_path, broken).unwrap();

        let cfg = ReportConfig {
            counts_path,
            metadata_path: meta_path,
            out_dir: dir.path().join("out").to_string_lossy().to_string(),
            ..ReportConfig::default()
        };
        let err = run_report(&cfg).unwrap_err();
        assert!(matches!(err, error::UcseqError::ReplicateStructure { .. }));
    }
}

//! Report assembly: slide deck, JSON summary, and result tables

pub mod html;
pub mod plots;

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::assoc::{GroupTest, PcAssociation};
use crate::data::PairedExpression;
use crate::de::{DeRow, DeTable, ModelComparison};
use crate::embed::Embedding;
use crate::enrich::{GseaRow, OraRow};
use crate::error::Result;
use crate::io::results;

/// Parameters echoed into the report for provenance
#[derive(Debug, Clone, Serialize)]
pub struct RunParams {
    pub embed_method: String,
    pub n_top_genes: usize,
    pub de_padj: f64,
    pub de_lfc: f64,
    pub de_cap: usize,
    pub enrich_padj: f64,
    pub enrich_lfc: f64,
    pub enrich_cap: usize,
    pub condition_column: String,
    pub level_a: String,
    pub level_b: String,
    pub seed: u32,
}

/// Rendered SVG figures keyed by slide
#[derive(Debug, Clone, Default)]
pub struct ReportFigures {
    pub variance: Option<String>,
    pub embedding: Option<String>,
    pub volcano_wald: Option<String>,
    pub volcano_exact: Option<String>,
    pub enrichment: Option<String>,
}

/// Everything a rendered report needs, assembled by the pipeline
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub params: RunParams,
    pub n_samples: usize,
    pub n_genes_raw: usize,
    pub n_genes_filtered: usize,
    pub embedding: Embedding,
    pub pc_assoc: Vec<PcAssociation>,
    pub group_tests: Vec<GroupTest>,
    pub wald: DeTable,
    pub exact: DeTable,
    pub top_wald: Vec<DeRow>,
    pub top_exact: Vec<DeRow>,
    pub comparison: ModelComparison,
    /// Gene ids parallel to the paired ratio rows
    pub pair_gene_ids: Vec<String>,
    pub paired: Option<PairedExpression>,
    pub ora: Vec<OraRow>,
    pub gsea: Vec<GseaRow>,
    pub figures: ReportFigures,
}

#[derive(Serialize)]
struct RunSummary<'a> {
    params: &'a RunParams,
    n_samples: usize,
    n_genes_raw: usize,
    n_genes_filtered: usize,
    embedding_dims: usize,
    variance_explained: Option<&'a Vec<f64>>,
    top_wald_genes: Vec<&'a str>,
    top_exact_genes: Vec<&'a str>,
    shared_top_genes: &'a [String],
    top_pathways: Vec<&'a str>,
    n_patients_paired: usize,
}

/// Write report.html, report.json, and every result table into out_dir.
///
/// The directory is created if missing; existing files are overwritten.
pub fn write_report<P: AsRef<Path>>(ctx: &ReportContext, out_dir: P) -> Result<()> {
    let out_dir = out_dir.as_ref();
    fs::create_dir_all(out_dir)?;

    fs::write(out_dir.join("report.html"), html::render_deck(ctx))?;

    let summary = RunSummary {
        params: &ctx.params,
        n_samples: ctx.n_samples,
        n_genes_raw: ctx.n_genes_raw,
        n_genes_filtered: ctx.n_genes_filtered,
        embedding_dims: ctx.embedding.n_dims(),
        variance_explained: ctx.embedding.variance_explained.as_ref(),
        top_wald_genes: ctx.top_wald.iter().map(|r| r.gene_id.as_str()).collect(),
        top_exact_genes: ctx.top_exact.iter().map(|r| r.gene_id.as_str()).collect(),
        shared_top_genes: &ctx.comparison.shared,
        top_pathways: ctx.ora.iter().take(10).map(|r| r.set_name.as_str()).collect(),
        n_patients_paired: ctx.paired.as_ref().map_or(0, |p| p.n_patients()),
    };
    let json = serde_json::to_string_pretty(&summary)?;
    fs::write(out_dir.join("report.json"), json)?;

    results::write_embedding(out_dir.join("embedding.tsv"), &ctx.embedding)?;
    results::write_associations(out_dir.join("pc_associations.tsv"), &ctx.pc_assoc)?;
    results::write_group_tests(out_dir.join("pc_group_tests.tsv"), &ctx.group_tests)?;
    results::write_de_table(out_dir.join("de_wald.tsv"), &ctx.wald)?;
    results::write_de_table(out_dir.join("de_exact.tsv"), &ctx.exact)?;
    if let Some(paired) = &ctx.paired {
        results::write_pair_ratios(out_dir.join("pair_ratios.tsv"), &ctx.pair_gene_ids, paired)?;
    }
    if !ctx.ora.is_empty() {
        results::write_ora(out_dir.join("enrichment_ora.tsv"), &ctx.ora)?;
    }
    if !ctx.gsea.is_empty() {
        results::write_gsea(out_dir.join("enrichment_gsea.tsv"), &ctx.gsea)?;
    }

    log::info!("Report written to {}", out_dir.display());
    Ok(())
}

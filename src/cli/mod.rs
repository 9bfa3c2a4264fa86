//! Command-line interface for ucseq

use clap::{Parser, Subcommand};

use crate::embed::EmbedMethod;

#[derive(Parser)]
#[command(name = "ucseq")]
#[command(version)]
#[command(about = "Exploratory bulk RNA-seq report for an ulcerative colitis cohort")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Worker threads for per-gene loops (0 = all cores)
    #[arg(long, global = true, default_value = "0")]
    pub threads: usize,

    /// Seed for the stochastic embeddings and permutations
    #[arg(long, global = true, default_value = "42")]
    pub seed: u32,
}

/// Arguments shared by every subcommand that loads the cohort
#[derive(clap::Args)]
pub struct CohortArgs {
    /// Path to the count matrix (TSV, optionally gzipped)
    #[arg(short, long,
        long_help = "Path to the count matrix, plain or gzip-compressed.\n\
            Format: first column = gene IDs; optional gene_symbol / gene_biotype\n\
            columns (recognized by header name); remaining columns = raw counts,\n\
            one per sample. Tab and comma delimiters are auto-detected.")]
    pub counts: String,

    /// Path to the sample metadata
    #[arg(short, long,
        long_help = "Path to the sample metadata, plain or gzip-compressed.\n\
            Two formats are auto-detected: GEO series-matrix style (lines of\n\
            !key<TAB>value..., characteristics split on 'label: value') and a\n\
            plain table (first column = sample IDs matching the count matrix\n\
            columns, remaining columns = categorical fields).")]
    pub metadata: String,

    /// Metadata column holding the contrast condition
    #[arg(long, default_value = "inflammation")]
    pub condition: String,

    /// Condition level treated as the case (numerator)
    #[arg(long, default_value = "inflamed")]
    pub case: String,

    /// Condition level treated as the control (denominator)
    #[arg(long, default_value = "non_inflamed")]
    pub control: String,
}

/// Prevalence and variance filtering knobs
#[derive(clap::Args)]
pub struct FilterArgs {
    /// Minimum expression for a sample to count as expressing a gene
    #[arg(long, default_value = "1.0")]
    pub min_expr: f64,

    /// A gene is kept when expressed in strictly more than this fraction
    #[arg(long, default_value = "0.5")]
    pub min_fraction: f64,

    /// Number of top-variance genes feeding the embedding
    #[arg(long, default_value = "500")]
    pub top_genes: usize,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full report pipeline
    #[command(
        about = "Run the full report pipeline",
        long_about = "Run the full report pipeline\n\n\
            Loads the cohort, applies the prevalence filter, computes the sample\n\
            embedding and its metadata associations, runs both differential\n\
            expression models, the replicate-pair ratios, and (with --gmt) the\n\
            pathway enrichment, then writes report.html, report.json, and the\n\
            result tables into the output directory.",
        after_long_help = "\
Examples:
  # Full report with PCA and a local pathway collection
  ucseq report -c counts.tsv.gz -m series_matrix.txt -o report/ --gmt hallmark.gmt

  # UMAP embedding, stricter DE thresholds
  ucseq report -c counts.tsv.gz -m samples.tsv --method umap \\
    --de-padj 0.05 --de-lfc 1.5 -o report/"
    )]
    Report {
        #[command(flatten)]
        cohort: CohortArgs,

        #[command(flatten)]
        filter: FilterArgs,

        /// Embedding method for the report figure
        #[arg(long, value_enum, default_value = "pca")]
        method: EmbedMethod,

        /// Metadata column identifying the patient for replicate pairing
        #[arg(long, default_value = "patient")]
        patient_column: String,

        /// Local GMT pathway collection for the enrichment slide
        #[arg(long)]
        gmt: Option<String>,

        /// Adjusted-p cutoff for the headline DE gene list
        #[arg(long, default_value = "0.07")]
        de_padj: f64,

        /// Absolute log2 fold-change cutoff for the headline DE gene list
        #[arg(long, default_value = "1.0")]
        de_lfc: f64,

        /// Headline DE gene list size
        #[arg(long, default_value = "20")]
        de_cap: usize,

        /// Adjusted-p cutoff for the enrichment input list
        #[arg(long, default_value = "0.1")]
        enrich_padj: f64,

        /// Absolute log2 fold-change cutoff for the enrichment input list
        #[arg(long, default_value = "1.5")]
        enrich_lfc: f64,

        /// Enrichment input list size cap
        #[arg(long, default_value = "40")]
        enrich_cap: usize,

        /// Output directory
        #[arg(short, long, default_value = "report")]
        output: String,
    },

    /// Compute a sample embedding only
    #[command(
        about = "Compute a sample embedding only",
        after_long_help = "\
Examples:
  ucseq embed -c counts.tsv.gz -m samples.tsv --method tsne -o tsne.tsv
  ucseq embed -c counts.tsv.gz -m samples.tsv --svg embedding.svg -o pca.tsv"
    )]
    Embed {
        #[command(flatten)]
        cohort: CohortArgs,

        #[command(flatten)]
        filter: FilterArgs,

        /// Embedding method
        #[arg(long, value_enum, default_value = "pca")]
        method: EmbedMethod,

        /// Number of embedding axes (2 or 3)
        #[arg(long, default_value = "2")]
        dims: usize,

        /// Output coordinates TSV
        #[arg(short, long, default_value = "embedding.tsv")]
        output: String,

        /// Also write a scatter figure colored by the condition column
        #[arg(long)]
        svg: Option<String>,
    },

    /// Run both differential expression models
    #[command(
        about = "Run both differential expression models",
        long_about = "Run both differential expression models\n\n\
            Applies the prevalence filter, then tests case vs control with the\n\
            NB Wald model and the conditional exact model, and writes both\n\
            tables plus a JSON comparison of their headline gene lists.",
        after_long_help = "\
Examples:
  ucseq de -c counts.tsv.gz -m samples.tsv -o de/"
    )]
    De {
        #[command(flatten)]
        cohort: CohortArgs,

        #[command(flatten)]
        filter: FilterArgs,

        /// Adjusted-p cutoff for the headline gene lists
        #[arg(long, default_value = "0.07")]
        de_padj: f64,

        /// Absolute log2 fold-change cutoff for the headline gene lists
        #[arg(long, default_value = "1.0")]
        de_lfc: f64,

        /// Headline gene list size
        #[arg(long, default_value = "20")]
        de_cap: usize,

        /// Output directory
        #[arg(short, long, default_value = "de")]
        output: String,
    },

    /// Pathway enrichment from an existing DE table
    #[command(
        about = "Pathway enrichment from an existing DE table",
        after_long_help = "\
Examples:
  ucseq enrich --de-table de/de_wald.tsv --gmt hallmark.gmt -o enrich/"
    )]
    Enrich {
        /// DE table written by `ucseq de` or `ucseq report`
        #[arg(long)]
        de_table: String,

        /// Local GMT pathway collection
        #[arg(long)]
        gmt: String,

        /// Adjusted-p cutoff for the input gene list
        #[arg(long, default_value = "0.1")]
        enrich_padj: f64,

        /// Absolute log2 fold-change cutoff for the input gene list
        #[arg(long, default_value = "1.5")]
        enrich_lfc: f64,

        /// Input gene list size cap
        #[arg(long, default_value = "40")]
        enrich_cap: usize,

        /// GSEA permutations
        #[arg(long, default_value = "1000")]
        permutations: usize,

        /// Output directory
        #[arg(short, long, default_value = "enrich")]
        output: String,
    },

    /// Replicate-pair expression ratios only
    #[command(
        about = "Replicate-pair expression ratios only",
        long_about = "Replicate-pair expression ratios only\n\n\
            Requires every patient to contribute exactly 2 case and 2 control\n\
            samples; replicates are averaged per condition and the per-patient\n\
            log2 case/control ratio is written for every gene.",
        after_long_help = "\
Examples:
  ucseq pairs -c counts.tsv.gz -m series_matrix.txt -o ratios.tsv"
    )]
    Pairs {
        #[command(flatten)]
        cohort: CohortArgs,

        /// Metadata column identifying the patient
        #[arg(long, default_value = "patient")]
        patient_column: String,

        /// Compute ratios on median-of-ratios normalized counts
        #[arg(long)]
        normalize: bool,

        /// Output ratio table TSV
        #[arg(short, long, default_value = "pair_ratios.tsv")]
        output: String,
    },
}

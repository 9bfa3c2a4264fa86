//! ucseq command-line interface

use clap::Parser;
use log::LevelFilter;

use ucseq::cli::{Cli, CohortArgs, Commands, FilterArgs};
use ucseq::embed::EmbedMethod;
use ucseq::prelude::*;
use ucseq::report::plots;
use ucseq::{filter, io, normalization};

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .ok();
    }

    let seed = cli.seed;
    let result = match cli.command {
        Commands::Report {
            cohort,
            filter,
            method,
            patient_column,
            gmt,
            de_padj,
            de_lfc,
            de_cap,
            enrich_padj,
            enrich_lfc,
            enrich_cap,
            output,
        } => run_report(&ReportConfig {
            counts_path: cohort.counts,
            metadata_path: cohort.metadata,
            out_dir: output,
            condition_column: cohort.condition,
            case_level: cohort.case,
            control_level: cohort.control,
            patient_column,
            min_expr: filter.min_expr,
            min_fraction: filter.min_fraction,
            n_top_genes: filter.top_genes,
            embed_method: method,
            gmt_path: gmt,
            de_padj,
            de_lfc,
            de_cap,
            enrich_padj,
            enrich_lfc,
            enrich_cap,
            gsea_permutations: 1000,
            seed,
        }),
        Commands::Embed {
            cohort,
            filter,
            method,
            dims,
            output,
            svg,
        } => run_embed(&cohort, &filter, method, dims, seed, &output, svg.as_deref()),
        Commands::De {
            cohort,
            filter,
            de_padj,
            de_lfc,
            de_cap,
            output,
        } => run_de(&cohort, &filter, de_padj, de_lfc, de_cap, &output),
        Commands::Enrich {
            de_table,
            gmt,
            enrich_padj,
            enrich_lfc,
            enrich_cap,
            permutations,
            output,
        } => run_enrich(
            &de_table,
            &gmt,
            enrich_padj,
            enrich_lfc,
            enrich_cap,
            permutations,
            seed,
            &output,
        ),
        Commands::Pairs {
            cohort,
            patient_column,
            normalize,
            output,
        } => run_pairs(&cohort, &patient_column, normalize, &output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_filtered(cohort_args: &CohortArgs, filter_args: &FilterArgs) -> Result<Cohort> {
    let cohort = load_cohort(&cohort_args.counts, &cohort_args.metadata)?;
    let keep = filter::prevalence_pass(cohort.counts(), filter_args.min_expr, filter_args.min_fraction);
    log::info!(
        "Prevalence filter: {} of {} genes retained",
        keep.len(),
        cohort.n_genes()
    );
    cohort.subset_genes(&keep)
}

fn run_embed(
    cohort_args: &CohortArgs,
    filter_args: &FilterArgs,
    method: EmbedMethod,
    dims: usize,
    seed: u32,
    output: &str,
    svg: Option<&str>,
) -> Result<()> {
    let cohort = load_filtered(cohort_args, filter_args)?;
    let matrix = cohort.counts();

    let factors = normalization::size_factors(matrix.counts())?;
    let log_norm = normalization::log2_normalized(matrix.counts(), &factors)?;
    let top = filter::top_variance_genes(matrix, filter_args.top_genes);
    let input = log_norm.select(ndarray::Axis(0), &top);

    let params = EmbedParams {
        method,
        n_dims: dims,
        seed,
        ..EmbedParams::default()
    };
    let embedding = embed(input.view(), matrix.sample_ids(), &params)?;
    io::results::write_embedding(output, &embedding)?;
    log::info!("Embedding written to {}", output);

    if let Some(svg_path) = svg {
        let labels = cohort
            .metadata()
            .column(&cohort_args.condition)
            .cloned()
            .unwrap_or_else(|| vec!["sample".to_string(); cohort.n_samples()]);
        let figure = plots::embedding_scatter(
            &embedding,
            &labels,
            &format!("Samples ({})", method.name()),
        )?;
        std::fs::write(svg_path, figure)?;
        log::info!("Figure written to {}", svg_path);
    }
    Ok(())
}

fn run_de(
    cohort_args: &CohortArgs,
    filter_args: &FilterArgs,
    de_padj: f64,
    de_lfc: f64,
    de_cap: usize,
    output: &str,
) -> Result<()> {
    let cohort = load_filtered(cohort_args, filter_args)?;

    let wald = wald_test(
        &cohort,
        &cohort_args.condition,
        &cohort_args.case,
        &cohort_args.control,
    )?;
    let exact = exact_test(
        &cohort,
        &cohort_args.condition,
        &cohort_args.case,
        &cohort_args.control,
    )?;
    let comparison = compare(&wald, &exact, de_padj, de_lfc, de_cap)?;
    log::info!(
        "Headline agreement: {} shared, {} wald only, {} exact only",
        comparison.shared.len(),
        comparison.wald_only.len(),
        comparison.exact_only.len()
    );

    let out_dir = std::path::Path::new(output);
    std::fs::create_dir_all(out_dir)?;
    io::results::write_de_table(out_dir.join("de_wald.tsv"), &wald)?;
    io::results::write_de_table(out_dir.join("de_exact.tsv"), &exact)?;
    std::fs::write(
        out_dir.join("comparison.json"),
        serde_json::to_string_pretty(&comparison)?,
    )?;
    log::info!("DE tables written to {}", out_dir.display());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_enrich(
    de_table: &str,
    gmt: &str,
    enrich_padj: f64,
    enrich_lfc: f64,
    enrich_cap: usize,
    permutations: usize,
    seed: u32,
    output: &str,
) -> Result<()> {
    let table = io::results::read_de_table(de_table, "wald")?;
    let collection = read_gmt(gmt)?;

    let out_dir = std::path::Path::new(output);
    std::fs::create_dir_all(out_dir)?;

    let input = select_enrichment_input(
        &table,
        &collection.universe(),
        enrich_padj,
        enrich_lfc,
        enrich_cap,
    );
    if input.mapped.len() >= 2 {
        let ora = over_representation(&input.mapped, &collection)?;
        io::results::write_ora(out_dir.join("enrichment_ora.tsv"), &ora)?;
        log::info!("{} pathway over-representation rows", ora.len());
    } else {
        log::warn!("Too few mapped symbols for over-representation");
    }

    let mut ranked: Vec<(&str, f64)> = table
        .rows
        .iter()
        .filter(|r| r.stat.is_finite())
        .map(|r| (r.symbol.as_str(), r.stat))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let symbols: Vec<String> = ranked.iter().map(|(s, _)| s.to_string()).collect();
    let stats: Vec<f64> = ranked.iter().map(|(_, v)| *v).collect();
    let params = GseaParams {
        n_permutations: permutations,
        seed,
        ..GseaParams::default()
    };
    let gsea = gsea_preranked(&symbols, &stats, &collection, &params)?;
    io::results::write_gsea(out_dir.join("enrichment_gsea.tsv"), &gsea)?;
    log::info!("Enrichment written to {}", out_dir.display());
    Ok(())
}

fn run_pairs(
    cohort_args: &CohortArgs,
    patient_column: &str,
    normalize: bool,
    output: &str,
) -> Result<()> {
    let cohort = load_cohort(&cohort_args.counts, &cohort_args.metadata)?;
    let matrix = cohort.counts();

    let spec = PairingSpec {
        patient_column: patient_column.to_string(),
        condition_column: cohort_args.condition.clone(),
        inflamed_level: cohort_args.case.clone(),
        uninflamed_level: cohort_args.control.clone(),
    };
    let paired = if normalize {
        let factors = normalization::size_factors(matrix.counts())?;
        let norm = normalization::normalized_counts(matrix.counts(), &factors)?;
        pair_replicates(norm.view(), cohort.metadata(), &spec)?
    } else {
        pair_replicates(matrix.counts(), cohort.metadata(), &spec)?
    };
    io::results::write_pair_ratios(output, matrix.gene_ids(), &paired)?;
    log::info!(
        "Ratios for {} patients written to {}",
        paired.n_patients(),
        output
    );
    Ok(())
}

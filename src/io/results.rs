//! Tab-separated result tables

use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};

use crate::assoc::{GroupTest, PcAssociation};
use crate::data::PairedExpression;
use crate::de::{DeRow, DeTable};
use crate::embed::Embedding;
use crate::enrich::{GseaRow, OraRow};
use crate::error::{Result, UcseqError};

fn tsv_writer<P: AsRef<Path>>(path: P) -> Result<csv::Writer<std::fs::File>> {
    Ok(WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path.as_ref())?)
}

fn fmt(v: f64) -> String {
    if v.is_nan() {
        "NA".to_string()
    } else {
        format!("{:.6e}", v)
    }
}

/// Write one DE model's full table
pub fn write_de_table<P: AsRef<Path>>(path: P, table: &DeTable) -> Result<()> {
    let mut w = tsv_writer(path)?;
    w.write_record([
        "gene_id",
        "symbol",
        "base_mean",
        "log2_fold_change",
        "stat",
        "pvalue",
        "padj",
    ])?;
    for r in &table.rows {
        w.write_record([
            r.gene_id.as_str(),
            r.symbol.as_str(),
            &fmt(r.base_mean),
            &fmt(r.log2_fold_change),
            &fmt(r.stat),
            &fmt(r.pvalue),
            &fmt(r.padj),
        ])?;
    }
    w.flush()?;
    Ok(())
}

/// Read a DE table previously written by `write_de_table`
pub fn read_de_table<P: AsRef<Path>>(path: P, model: &str) -> Result<DeTable> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(path.as_ref())?;

    let parse = |s: &str| -> Result<f64> {
        if s == "NA" {
            Ok(f64::NAN)
        } else {
            s.parse::<f64>().map_err(|_| UcseqError::InvalidInput {
                reason: format!("invalid numeric field '{}' in DE table", s),
            })
        }
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.len() != 7 {
            return Err(UcseqError::InvalidInput {
                reason: format!("DE table row has {} fields, expected 7", record.len()),
            });
        }
        rows.push(DeRow {
            gene_id: record[0].to_string(),
            symbol: record[1].to_string(),
            base_mean: parse(&record[2])?,
            log2_fold_change: parse(&record[3])?,
            stat: parse(&record[4])?,
            pvalue: parse(&record[5])?,
            padj: parse(&record[6])?,
        });
    }
    if rows.is_empty() {
        return Err(UcseqError::EmptyData {
            reason: "DE table has no rows".to_string(),
        });
    }
    Ok(DeTable {
        model: model.to_string(),
        rows,
    })
}

/// Write per-sample embedding coordinates
pub fn write_embedding<P: AsRef<Path>>(path: P, embedding: &Embedding) -> Result<()> {
    let mut w = tsv_writer(path)?;
    let mut header = vec!["sample_id".to_string()];
    for d in 0..embedding.n_dims() {
        header.push(format!("{}_{}", embedding.method.name(), d + 1));
    }
    w.write_record(&header)?;
    for (i, id) in embedding.sample_ids.iter().enumerate() {
        let mut record = vec![id.clone()];
        for d in 0..embedding.n_dims() {
            record.push(format!("{:.6}", embedding.coords[[i, d]]));
        }
        w.write_record(&record)?;
    }
    w.flush()?;
    Ok(())
}

/// Write component x indicator Spearman correlations
pub fn write_associations<P: AsRef<Path>>(path: P, rows: &[PcAssociation]) -> Result<()> {
    let mut w = tsv_writer(path)?;
    w.write_record(["component", "factor_level", "rho", "pvalue", "padj"])?;
    for r in rows {
        w.write_record([
            &(r.component + 1).to_string(),
            r.factor_level.as_str(),
            &fmt(r.rho),
            &fmt(r.pvalue),
            &fmt(r.padj),
        ])?;
    }
    w.flush()?;
    Ok(())
}

/// Write component x factor rank-test results
pub fn write_group_tests<P: AsRef<Path>>(path: P, rows: &[GroupTest]) -> Result<()> {
    let mut w = tsv_writer(path)?;
    w.write_record(["component", "factor", "test", "statistic", "pvalue", "padj"])?;
    for r in rows {
        w.write_record([
            &(r.component + 1).to_string(),
            r.factor.as_str(),
            r.test.as_str(),
            &fmt(r.statistic),
            &fmt(r.pvalue),
            &fmt(r.padj),
        ])?;
    }
    w.flush()?;
    Ok(())
}

/// Write per-gene, per-patient replicate ratios plus the per-gene mean
pub fn write_pair_ratios<P: AsRef<Path>>(
    path: P,
    gene_ids: &[String],
    paired: &PairedExpression,
) -> Result<()> {
    let mut w = tsv_writer(path)?;
    let mut header = vec!["gene_id".to_string()];
    for p in &paired.patients {
        header.push(format!("log2_ratio_{}", p));
    }
    header.push("mean_log2_ratio".to_string());
    w.write_record(&header)?;

    let means = paired.mean_log2_ratio();
    for (g, id) in gene_ids.iter().enumerate() {
        let mut record = vec![id.clone()];
        for p in 0..paired.n_patients() {
            record.push(format!("{:.4}", paired.log2_ratio[[g, p]]));
        }
        record.push(format!("{:.4}", means[g]));
        w.write_record(&record)?;
    }
    w.flush()?;
    Ok(())
}

/// Write over-representation results
pub fn write_ora<P: AsRef<Path>>(path: P, rows: &[OraRow]) -> Result<()> {
    let mut w = tsv_writer(path)?;
    w.write_record([
        "set_name",
        "overlap",
        "set_size",
        "query_size",
        "universe_size",
        "fold_enrichment",
        "pvalue",
        "padj",
    ])?;
    for r in rows {
        w.write_record([
            r.set_name.as_str(),
            &r.overlap.to_string(),
            &r.set_size.to_string(),
            &r.query_size.to_string(),
            &r.universe_size.to_string(),
            &format!("{:.3}", r.fold_enrichment),
            &fmt(r.pvalue),
            &fmt(r.padj),
        ])?;
    }
    w.flush()?;
    Ok(())
}

/// Write preranked GSEA results
pub fn write_gsea<P: AsRef<Path>>(path: P, rows: &[GseaRow]) -> Result<()> {
    let mut w = tsv_writer(path)?;
    w.write_record([
        "set_name",
        "set_size",
        "es",
        "nes",
        "pvalue",
        "padj",
        "leading_edge",
    ])?;
    for r in rows {
        w.write_record([
            r.set_name.as_str(),
            &r.set_size.to_string(),
            &fmt(r.es),
            &fmt(r.nes),
            &fmt(r.pvalue),
            &fmt(r.padj),
            &r.leading_edge.to_string(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

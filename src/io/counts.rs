//! Count matrix reading from (optionally gzipped) delimited text

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use ndarray::Array2;

use crate::data::{CountMatrix, GeneAnnotations};
use crate::error::{Result, UcseqError};

/// Strip surrounding quotes from a string
pub(crate) fn strip_quotes(s: &str) -> String {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')) {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

/// Open a file, transparently decompressing a gzip payload
pub(crate) fn open_maybe_gz<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead>> {
    let mut file = File::open(path.as_ref())?;
    let mut magic = [0u8; 2];
    let n = file.read(&mut magic)?;
    let file = File::open(path.as_ref())?;
    if n == 2 && magic == [0x1f, 0x8b] {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Header names treated as per-gene annotation columns rather than samples
fn annotation_kind(header: &str) -> Option<&'static str> {
    let h = header.to_ascii_lowercase();
    if h.contains("symbol") || h == "gene_name" || h == "gene.name" {
        Some("symbol")
    } else if h.contains("biotype") || h.contains("bio_type") || h.contains("gene.type") {
        Some("biotype")
    } else {
        None
    }
}

/// Read a count matrix from a gzipped or plain delimited file.
///
/// First column holds gene identifiers; subsequent symbol/biotype columns
/// (recognized by header name) are carried as annotations; every remaining
/// column is a sample.
pub fn read_count_matrix<P: AsRef<Path>>(path: P) -> Result<CountMatrix> {
    let reader = open_maybe_gz(path)?;
    let mut lines = reader.lines();

    let header_line = lines.next().ok_or_else(|| UcseqError::EmptyData {
        reason: "Empty count matrix file".to_string(),
    })??;

    let delimiter = if header_line.contains('\t') { '\t' } else { ',' };
    let header: Vec<String> = header_line
        .split(delimiter)
        .map(|s| strip_quotes(s))
        .collect();
    if header.len() < 2 {
        return Err(UcseqError::InvalidCountMatrix {
            reason: "Not enough columns in header".to_string(),
        });
    }

    // Column 0 is always the gene id; annotation columns must precede samples
    let mut symbol_col: Option<usize> = None;
    let mut biotype_col: Option<usize> = None;
    let mut first_sample_col = 1;
    for (i, name) in header.iter().enumerate().skip(1) {
        match annotation_kind(name) {
            Some("symbol") if i == first_sample_col => {
                symbol_col = Some(i);
                first_sample_col = i + 1;
            }
            Some("biotype") if i == first_sample_col => {
                biotype_col = Some(i);
                first_sample_col = i + 1;
            }
            _ => break,
        }
    }

    let sample_ids: Vec<String> = header[first_sample_col..].to_vec();
    let n_samples = sample_ids.len();
    if n_samples == 0 {
        return Err(UcseqError::InvalidCountMatrix {
            reason: "No sample columns after annotation columns".to_string(),
        });
    }

    let mut gene_ids: Vec<String> = Vec::new();
    let mut symbols: Vec<String> = Vec::new();
    let mut biotypes: Vec<String> = Vec::new();
    let mut counts_data: Vec<f64> = Vec::new();

    for line in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(delimiter).collect();
        if fields.len() != header.len() {
            return Err(UcseqError::InvalidCountMatrix {
                reason: format!(
                    "Row has {} columns, expected {}",
                    fields.len(),
                    header.len()
                ),
            });
        }

        gene_ids.push(strip_quotes(fields[0]));
        if let Some(c) = symbol_col {
            symbols.push(strip_quotes(fields[c]));
        }
        if let Some(c) = biotype_col {
            biotypes.push(strip_quotes(fields[c]));
        }

        for field in &fields[first_sample_col..] {
            let val = strip_quotes(field);
            let parsed = val
                .parse::<f64>()
                .map_err(|_| UcseqError::InvalidCountMatrix {
                    reason: format!("Invalid count value: {}", val),
                })?;
            counts_data.push(parsed);
        }
    }

    if gene_ids.is_empty() {
        return Err(UcseqError::EmptyData {
            reason: "No genes found in count matrix".to_string(),
        });
    }

    let n_genes = gene_ids.len();
    let counts = Array2::from_shape_vec((n_genes, n_samples), counts_data).map_err(|e| {
        UcseqError::InvalidCountMatrix {
            reason: format!("Ragged count matrix: {}", e),
        }
    })?;

    log::info!(
        "Read count matrix: {} genes x {} samples{}",
        n_genes,
        n_samples,
        if symbol_col.is_some() || biotype_col.is_some() {
            " (with gene annotations)"
        } else {
            ""
        }
    );

    CountMatrix::with_annotations(
        counts,
        gene_ids,
        sample_ids,
        GeneAnnotations { symbols, biotypes },
    )
}

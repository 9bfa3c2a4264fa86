//! GEO series-matrix style metadata parsing
//!
//! Metadata lines are `!key\tvalue1\tvalue2...` with one value per sample.
//! Assignment is driven by the key names, never by line position, so extra
//! or reordered header lines cannot silently shift fields. Characteristics
//! lines carry `label: value` cells and are split into one column per label.

use std::io::BufRead;
use std::path::Path;

use crate::data::SampleMetadata;
use crate::error::{Result, UcseqError};
use crate::io::counts::{open_maybe_gz, strip_quotes};

const SAMPLE_PREFIX: &str = "!Sample_";
const ID_KEY: &str = "!Sample_geo_accession";
const CHARACTERISTICS_KEY: &str = "!Sample_characteristics";

/// Keys carried through as plain metadata columns, named by their suffix
const VALUE_KEYS: &[&str] = &["!Sample_title", "!Sample_source_name_ch1"];

/// Normalize a characteristics label into a column name
fn normalize_label(label: &str) -> String {
    label
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}

/// Read sample metadata from a series-matrix style file.
///
/// Sample identity comes from the `!Sample_geo_accession` line; every
/// `!Sample_characteristics*` line contributes columns named by the cell
/// labels; title and source-name lines become columns named after the key.
pub fn read_series_metadata<P: AsRef<Path>>(path: P) -> Result<SampleMetadata> {
    let reader = open_maybe_gz(path)?;

    let mut sample_ids: Option<Vec<String>> = None;
    // (column name, values) in file order
    let mut columns: Vec<(String, Vec<String>)> = Vec::new();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim_end();
        if !line.starts_with(SAMPLE_PREFIX) {
            continue;
        }
        let mut cells = line.split('\t');
        let key = cells.next().unwrap_or_default();
        let values: Vec<String> = cells.map(strip_quotes).collect();
        if values.is_empty() {
            continue;
        }

        if key == ID_KEY {
            if sample_ids.is_some() {
                return Err(UcseqError::InvalidMetadata {
                    reason: format!("duplicate {} line", ID_KEY),
                });
            }
            sample_ids = Some(values);
        } else if key.starts_with(CHARACTERISTICS_KEY) {
            let mut label: Option<String> = None;
            let mut parsed = Vec::with_capacity(values.len());
            for (i, cell) in values.iter().enumerate() {
                let (cell_label, value) = match cell.split_once(':') {
                    Some((l, v)) => (normalize_label(l), v.trim().to_string()),
                    None => {
                        return Err(UcseqError::InvalidMetadata {
                            reason: format!(
                                "characteristics cell {} of '{}' lacks a 'label: value' form: '{}'",
                                i, key, cell
                            ),
                        })
                    }
                };
                match &label {
                    None => label = Some(cell_label),
                    Some(l) if *l != cell_label => {
                        return Err(UcseqError::InvalidMetadata {
                            reason: format!(
                                "mixed labels '{}' and '{}' on one characteristics line",
                                l, cell_label
                            ),
                        })
                    }
                    Some(_) => {}
                }
                parsed.push(value);
            }
            // label is present: values is non-empty and every cell carried one
            let label = label.unwrap_or_default();
            columns.push((label, parsed));
        } else if VALUE_KEYS.contains(&key) {
            let name = normalize_label(key.trim_start_matches(SAMPLE_PREFIX));
            columns.push((name, values));
        }
    }

    let sample_ids = sample_ids.ok_or_else(|| UcseqError::InvalidMetadata {
        reason: format!("no {} line found", ID_KEY),
    })?;

    let mut metadata = SampleMetadata::new(sample_ids);
    for (name, values) in columns {
        if values.len() != metadata.n_samples() {
            return Err(UcseqError::InvalidMetadata {
                reason: format!(
                    "column '{}' has {} values for {} samples",
                    name,
                    values.len(),
                    metadata.n_samples()
                ),
            });
        }
        metadata.add_column(&name, values)?;
    }

    log::info!(
        "Read series metadata: {} samples, {} columns ({})",
        metadata.n_samples(),
        metadata.column_names().len(),
        metadata.column_names().join(", ")
    );

    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_series(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    #[test]
    fn test_key_driven_parsing() {
        let file = write_series(&[
            "!Series_title\t\"UC cohort\"",
            "!Sample_title\t\"biopsy 1\"\t\"biopsy 2\"",
            "!Sample_geo_accession\t\"GSM1\"\t\"GSM2\"",
            "!Sample_characteristics_ch1\t\"inflammation: inflamed\"\t\"inflammation: non_inflamed\"",
            "!Sample_characteristics_ch1\t\"patient: p1\"\t\"patient: p1\"",
        ]);
        let meta = read_series_metadata(file.path()).unwrap();
        assert_eq!(meta.sample_ids(), &["GSM1".to_string(), "GSM2".to_string()]);
        assert_eq!(
            meta.column("inflammation").unwrap(),
            &vec!["inflamed".to_string(), "non_inflamed".to_string()]
        );
        assert_eq!(meta.get_value("patient", 1).unwrap(), "p1");
        assert_eq!(meta.get_value("title", 0).unwrap(), "biopsy 1");
    }

    #[test]
    fn test_line_order_irrelevant() {
        let a = write_series(&[
            "!Sample_geo_accession\tGSM1\tGSM2",
            "!Sample_characteristics_ch1\thospital: A\thospital: B",
        ]);
        let b = write_series(&[
            "!Sample_characteristics_ch1\thospital: A\thospital: B",
            "!Sample_geo_accession\tGSM1\tGSM2",
        ]);
        let ma = read_series_metadata(a.path()).unwrap();
        let mb = read_series_metadata(b.path()).unwrap();
        assert_eq!(ma.sample_ids(), mb.sample_ids());
        assert_eq!(ma.column("hospital"), mb.column("hospital"));
    }

    #[test]
    fn test_missing_accession_is_error() {
        let file = write_series(&["!Sample_characteristics_ch1\tinflammation: inflamed"]);
        assert!(read_series_metadata(file.path()).is_err());
    }

    #[test]
    fn test_mixed_labels_rejected() {
        let file = write_series(&[
            "!Sample_geo_accession\tGSM1\tGSM2",
            "!Sample_characteristics_ch1\tinflammation: inflamed\tpatient: p1",
        ]);
        assert!(read_series_metadata(file.path()).is_err());
    }

    #[test]
    fn test_unlabelled_characteristics_rejected() {
        let file = write_series(&[
            "!Sample_geo_accession\tGSM1",
            "!Sample_characteristics_ch1\tinflamed",
        ]);
        assert!(read_series_metadata(file.path()).is_err());
    }

    #[test]
    fn test_value_count_mismatch_rejected() {
        let file = write_series(&[
            "!Sample_geo_accession\tGSM1\tGSM2",
            "!Sample_characteristics_ch1\tinflammation: inflamed",
        ]);
        assert!(read_series_metadata(file.path()).is_err());
    }
}

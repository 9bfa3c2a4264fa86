//! Plain tabular metadata reading

use std::io::BufRead;
use std::path::Path;

use crate::data::SampleMetadata;
use crate::error::{Result, UcseqError};
use crate::io::counts::{open_maybe_gz, strip_quotes};

/// Read sample metadata from a delimited file.
///
/// First column is the sample id, remaining columns are categorical fields.
pub fn read_metadata<P: AsRef<Path>>(path: P) -> Result<SampleMetadata> {
    let reader = open_maybe_gz(path)?;
    let mut lines = reader.lines();

    let header_line = lines.next().ok_or_else(|| UcseqError::EmptyData {
        reason: "Empty metadata file".to_string(),
    })??;

    let delimiter = if header_line.contains('\t') { '\t' } else { ',' };
    let header: Vec<String> = header_line
        .split(delimiter)
        .map(|s| strip_quotes(s))
        .collect();
    let column_names: Vec<String> = header[1..].to_vec();

    let mut sample_ids: Vec<String> = Vec::new();
    let mut columns: Vec<Vec<String>> = vec![Vec::new(); column_names.len()];

    for line in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(delimiter).collect();
        if fields.len() != header.len() {
            return Err(UcseqError::InvalidMetadata {
                reason: format!(
                    "Row has {} columns, expected {}",
                    fields.len(),
                    header.len()
                ),
            });
        }
        sample_ids.push(strip_quotes(fields[0]));
        for (i, field) in fields[1..].iter().enumerate() {
            columns[i].push(strip_quotes(field));
        }
    }

    if sample_ids.is_empty() {
        return Err(UcseqError::EmptyData {
            reason: "No samples found in metadata".to_string(),
        });
    }

    let mut metadata = SampleMetadata::new(sample_ids);
    for (name, values) in column_names.iter().zip(columns) {
        metadata.add_column(name, values)?;
    }
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_metadata() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sample_id\tinflammation\tpatient").unwrap();
        writeln!(file, "s1\tinflamed\tp1").unwrap();
        writeln!(file, "s2\tnon_inflamed\tp1").unwrap();

        let meta = read_metadata(file.path()).unwrap();
        assert_eq!(meta.n_samples(), 2);
        assert_eq!(meta.get_value("patient", 1).unwrap(), "p1");
        assert_eq!(
            meta.column_names(),
            &["inflammation".to_string(), "patient".to_string()]
        );
    }

    #[test]
    fn test_ragged_metadata_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sample_id\tinflammation").unwrap();
        writeln!(file, "s1").unwrap();
        assert!(read_metadata(file.path()).is_err());
    }
}

//! GMT gene-set collection parsing

use std::collections::HashSet;
use std::io::BufRead;
use std::path::Path;

use crate::error::{Result, UcseqError};
use crate::io::counts::open_maybe_gz;

/// One named gene set
#[derive(Debug, Clone)]
pub struct GeneSet {
    pub name: String,
    pub description: String,
    /// Member gene symbols, upper-cased, deduplicated
    pub members: HashSet<String>,
}

/// A pathway collection loaded from a GMT file
#[derive(Debug, Clone)]
pub struct GeneSetCollection {
    pub sets: Vec<GeneSet>,
}

impl GeneSetCollection {
    /// Union of all member symbols
    pub fn universe(&self) -> HashSet<String> {
        let mut u = HashSet::new();
        for set in &self.sets {
            u.extend(set.members.iter().cloned());
        }
        u
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

/// Read a GMT file: one set per line, `name\tdescription\tgene1\tgene2...`.
///
/// Symbols are upper-cased for case-insensitive matching against the
/// annotation column; duplicate set names are rejected.
pub fn read_gmt<P: AsRef<Path>>(path: P) -> Result<GeneSetCollection> {
    let reader = open_maybe_gz(path)?;
    let mut sets = Vec::new();
    let mut names = HashSet::new();

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        let name = fields
            .next()
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        let description = fields
            .next()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| UcseqError::InvalidInput {
                reason: format!("GMT line {} has fewer than 2 fields", lineno + 1),
            })?;
        if name.is_empty() {
            return Err(UcseqError::InvalidInput {
                reason: format!("GMT line {} has an empty set name", lineno + 1),
            });
        }
        if !names.insert(name.clone()) {
            return Err(UcseqError::InvalidInput {
                reason: format!("duplicate gene set name '{}'", name),
            });
        }

        let members: HashSet<String> = fields
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if members.is_empty() {
            log::warn!("Gene set '{}' has no members, skipping", name);
            continue;
        }
        sets.push(GeneSet {
            name,
            description,
            members,
        });
    }

    if sets.is_empty() {
        return Err(UcseqError::EmptyData {
            reason: "No gene sets found in GMT file".to_string(),
        });
    }
    log::info!("Read {} gene sets", sets.len());
    Ok(GeneSetCollection { sets })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_gmt() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "IFN_RESPONSE\tinterferon response\tSTAT1\tIRF1\tGBP1").unwrap();
        writeln!(file, "BARRIER\tepithelial barrier\tcldn1\tOCLN").unwrap();

        let collection = read_gmt(file.path()).unwrap();
        assert_eq!(collection.len(), 2);
        assert!(collection.sets[0].members.contains("STAT1"));
        // Symbols are upper-cased
        assert!(collection.sets[1].members.contains("CLDN1"));
        assert_eq!(collection.universe().len(), 5);
    }

    #[test]
    fn test_duplicate_set_name_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "A\tdesc\tX\tY").unwrap();
        writeln!(file, "A\tdesc\tZ").unwrap();
        assert!(read_gmt(file.path()).is_err());
    }

    #[test]
    fn test_empty_set_skipped() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "EMPTY\tdesc").unwrap();
        writeln!(file, "OK\tdesc\tX").unwrap();
        let collection = read_gmt(file.path()).unwrap();
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.sets[0].name, "OK");
    }
}

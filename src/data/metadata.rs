//! Sample metadata: one record per sample, categorical fields

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, UcseqError};

/// Categorical sample annotations (inflammation status, hospital, patient id,
/// colon location, ...), keyed by column name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleMetadata {
    sample_ids: Vec<String>,
    columns: HashMap<String, Vec<String>>,
    /// Column names in first-seen order, for stable output
    column_order: Vec<String>,
}

impl SampleMetadata {
    pub fn new(sample_ids: Vec<String>) -> Self {
        {
            let mut seen = std::collections::HashSet::new();
            for id in &sample_ids {
                if !seen.insert(id) {
                    log::warn!("Duplicate sample id '{}' in metadata", id);
                }
            }
        }
        Self {
            sample_ids,
            columns: HashMap::new(),
            column_order: Vec::new(),
        }
    }

    /// Add a categorical column
    pub fn add_column(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        if values.len() != self.sample_ids.len() {
            return Err(UcseqError::DimensionMismatch {
                expected: format!("{} values", self.sample_ids.len()),
                got: format!("{} values", values.len()),
            });
        }
        if self.columns.insert(name.to_string(), values).is_none() {
            self.column_order.push(name.to_string());
        }
        Ok(())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&Vec<String>> {
        self.columns.get(name)
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_order
    }

    /// Value of a column for a specific sample
    pub fn get_value(&self, column: &str, sample_idx: usize) -> Result<&str> {
        self.columns
            .get(column)
            .and_then(|v| v.get(sample_idx))
            .map(|s| s.as_str())
            .ok_or_else(|| UcseqError::InvalidInput {
                reason: format!("column '{}' or sample index {} not found", column, sample_idx),
            })
    }

    /// Unique, sorted levels of a categorical column
    pub fn levels(&self, column: &str) -> Result<Vec<String>> {
        self.columns
            .get(column)
            .map(|values| {
                let mut unique: Vec<String> = values.to_vec();
                unique.sort();
                unique.dedup();
                unique
            })
            .ok_or_else(|| UcseqError::InvalidMetadata {
                reason: format!("column '{}' not found", column),
            })
    }

    /// Indices of the samples carrying the given level of a column
    pub fn samples_with_level(&self, column: &str, level: &str) -> Vec<usize> {
        self.columns
            .get(column)
            .map(|values| {
                values
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| v.as_str() == level)
                    .map(|(i, _)| i)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Restrict metadata to the given samples, preserving order
    pub fn subset(&self, sample_indices: &[usize]) -> Result<Self> {
        let new_ids: Vec<String> = sample_indices
            .iter()
            .map(|&i| self.sample_ids[i].clone())
            .collect();
        let mut new_meta = SampleMetadata::new(new_ids);
        for name in &self.column_order {
            let values = &self.columns[name];
            let new_values: Vec<String> =
                sample_indices.iter().map(|&i| values[i].clone()).collect();
            new_meta.add_column(name, new_values)?;
        }
        Ok(new_meta)
    }
}

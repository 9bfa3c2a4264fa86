//! Aligned cohort: count matrix columns in metadata row order
//!
//! Every downstream stage reads sample-level values positionally, so the
//! matrix columns and metadata rows must agree 1:1 and in order. `Cohort`
//! makes that alignment a construction-time guarantee: columns are reordered
//! by sample name and any mismatch between the two sample sets is a hard
//! error rather than a silently shifted result.

use std::collections::HashMap;

use crate::data::{CountMatrix, SampleMetadata};
use crate::error::{Result, UcseqError};

/// A count matrix and sample metadata with verified 1:1 column/row alignment
#[derive(Debug, Clone)]
pub struct Cohort {
    counts: CountMatrix,
    metadata: SampleMetadata,
}

impl Cohort {
    /// Align the matrix columns to the metadata row order and pair them up.
    ///
    /// Fails if any metadata sample is missing from the matrix or vice versa.
    pub fn new(counts: CountMatrix, metadata: SampleMetadata) -> Result<Self> {
        if counts.n_samples() != metadata.n_samples() {
            return Err(UcseqError::SampleMismatch {
                reason: format!(
                    "{} matrix columns vs {} metadata rows",
                    counts.n_samples(),
                    metadata.n_samples()
                ),
            });
        }

        let col_index: HashMap<&str, usize> = counts
            .sample_ids()
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let mut order = Vec::with_capacity(metadata.n_samples());
        let mut missing = Vec::new();
        for id in metadata.sample_ids() {
            match col_index.get(id.as_str()) {
                Some(&i) => order.push(i),
                None => missing.push(id.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(UcseqError::SampleMismatch {
                reason: format!(
                    "{} metadata samples absent from the count matrix (e.g. {:?})",
                    missing.len(),
                    &missing[..missing.len().min(5)]
                ),
            });
        }

        let already_aligned = order.iter().enumerate().all(|(i, &j)| i == j);
        let counts = if already_aligned {
            counts
        } else {
            log::info!("Reordering count matrix columns to metadata sample order");
            counts.subset_samples(&order)?
        };

        debug_assert_eq!(counts.sample_ids(), metadata.sample_ids());
        Ok(Self { counts, metadata })
    }

    pub fn counts(&self) -> &CountMatrix {
        &self.counts
    }

    pub fn metadata(&self) -> &SampleMetadata {
        &self.metadata
    }

    pub fn n_genes(&self) -> usize {
        self.counts.n_genes()
    }

    pub fn n_samples(&self) -> usize {
        self.counts.n_samples()
    }

    /// Same metadata, genes restricted to the given indices
    pub fn subset_genes(&self, gene_indices: &[usize]) -> Result<Self> {
        Ok(Self {
            counts: self.counts.subset_genes(gene_indices)?,
            metadata: self.metadata.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(sample_ids: &[&str]) -> CountMatrix {
        let n = sample_ids.len();
        let mut data = ndarray::Array2::zeros((2, n));
        for j in 0..n {
            data[[0, j]] = (j + 1) as f64;
            data[[1, j]] = 10.0 * (j + 1) as f64;
        }
        CountMatrix::new(
            data,
            vec!["g1".to_string(), "g2".to_string()],
            sample_ids.iter().map(|s| s.to_string()).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_reorders_columns_to_metadata() {
        let m = counts(&["s2", "s1", "s3"]);
        let meta = SampleMetadata::new(vec![
            "s1".to_string(),
            "s2".to_string(),
            "s3".to_string(),
        ]);
        let cohort = Cohort::new(m, meta).unwrap();
        assert_eq!(
            cohort.counts().sample_ids(),
            &["s1".to_string(), "s2".to_string(), "s3".to_string()]
        );
        // s1 was column 1 in the input, carrying value 2.0
        assert_eq!(cohort.counts().counts()[[0, 0]], 2.0);
        assert_eq!(cohort.counts().counts()[[0, 1]], 1.0);
    }

    #[test]
    fn test_missing_sample_is_error() {
        let m = counts(&["s1", "s2"]);
        let meta = SampleMetadata::new(vec!["s1".to_string(), "s9".to_string()]);
        assert!(matches!(
            Cohort::new(m, meta),
            Err(UcseqError::SampleMismatch { .. })
        ));
    }

    #[test]
    fn test_count_mismatch_is_error() {
        let m = counts(&["s1", "s2", "s3"]);
        let meta = SampleMetadata::new(vec!["s1".to_string(), "s2".to_string()]);
        assert!(Cohort::new(m, meta).is_err());
    }

    #[test]
    fn test_already_aligned_passthrough() {
        let m = counts(&["s1", "s2"]);
        let meta = SampleMetadata::new(vec!["s1".to_string(), "s2".to_string()]);
        let cohort = Cohort::new(m, meta).unwrap();
        assert_eq!(cohort.counts().counts()[[0, 0]], 1.0);
    }
}

//! Per-patient replicate pairing and condition ratio
//!
//! The cohort design contributes 4 samples per patient: 2 inflamed and
//! 2 non-inflamed biopsies. The two replicates of each condition are
//! averaged into one value per patient, and the inflamed/non-inflamed
//! ratio is reported on a log2 scale.

use std::collections::HashMap;

use ndarray::{Array2, ArrayView2};

use crate::data::SampleMetadata;
use crate::error::{Result, UcseqError};

/// Pseudocount added to both ratio terms so all-zero genes stay finite
const RATIO_PSEUDOCOUNT: f64 = 0.5;

/// How patients and conditions are encoded in the metadata
#[derive(Debug, Clone)]
pub struct PairingSpec {
    /// Metadata column holding the patient identifier
    pub patient_column: String,
    /// Metadata column holding the condition
    pub condition_column: String,
    /// Condition level treated as inflamed
    pub inflamed_level: String,
    /// Condition level treated as non-inflamed
    pub uninflamed_level: String,
}

impl Default for PairingSpec {
    fn default() -> Self {
        Self {
            patient_column: "patient".to_string(),
            condition_column: "inflammation".to_string(),
            inflamed_level: "inflamed".to_string(),
            uninflamed_level: "non_inflamed".to_string(),
        }
    }
}

/// Per-patient averaged expression and condition ratio
#[derive(Debug, Clone)]
pub struct PairedExpression {
    /// Patient identifiers, sorted, one column per patient
    pub patients: Vec<String>,
    /// Mean of the two inflamed replicates, genes x patients
    pub mean_inflamed: Array2<f64>,
    /// Mean of the two non-inflamed replicates, genes x patients
    pub mean_uninflamed: Array2<f64>,
    /// log2((mean_inflamed + c) / (mean_uninflamed + c)), genes x patients
    pub log2_ratio: Array2<f64>,
}

impl PairedExpression {
    pub fn n_patients(&self) -> usize {
        self.patients.len()
    }

    /// Mean log2 ratio per gene across patients
    pub fn mean_log2_ratio(&self) -> Vec<f64> {
        let n = self.n_patients() as f64;
        (0..self.log2_ratio.nrows())
            .map(|i| self.log2_ratio.row(i).sum() / n)
            .collect()
    }
}

/// Average replicate pairs per patient and compute the condition ratio.
///
/// `expression` is any genes x samples matrix whose columns follow the
/// metadata row order (raw or normalized counts). Every patient must
/// contribute exactly 2 samples per condition; anything else is an error.
pub fn pair_replicates(
    expression: ArrayView2<f64>,
    metadata: &SampleMetadata,
    spec: &PairingSpec,
) -> Result<PairedExpression> {
    if expression.ncols() != metadata.n_samples() {
        return Err(UcseqError::DimensionMismatch {
            expected: format!("{} expression columns", metadata.n_samples()),
            got: format!("{}", expression.ncols()),
        });
    }
    let patients = metadata
        .column(&spec.patient_column)
        .ok_or_else(|| UcseqError::InvalidMetadata {
            reason: format!("column '{}' not found", spec.patient_column),
        })?;
    let conditions = metadata
        .column(&spec.condition_column)
        .ok_or_else(|| UcseqError::InvalidMetadata {
            reason: format!("column '{}' not found", spec.condition_column),
        })?;

    // patient -> (inflamed sample indices, non-inflamed sample indices)
    let mut groups: HashMap<&str, (Vec<usize>, Vec<usize>)> = HashMap::new();
    for (i, (patient, condition)) in patients.iter().zip(conditions.iter()).enumerate() {
        let entry = groups.entry(patient.as_str()).or_default();
        if condition == &spec.inflamed_level {
            entry.0.push(i);
        } else if condition == &spec.uninflamed_level {
            entry.1.push(i);
        } else {
            return Err(UcseqError::InvalidMetadata {
                reason: format!(
                    "unknown condition level '{}' for sample {}",
                    condition, i
                ),
            });
        }
    }

    let mut patient_order: Vec<&str> = groups.keys().copied().collect();
    patient_order.sort_unstable();

    for patient in &patient_order {
        let (inflamed, uninflamed) = &groups[patient];
        if inflamed.len() != 2 || uninflamed.len() != 2 {
            return Err(UcseqError::ReplicateStructure {
                patient: patient.to_string(),
                reason: format!(
                    "expected 2 inflamed + 2 non-inflamed samples, found {} + {}",
                    inflamed.len(),
                    uninflamed.len()
                ),
            });
        }
    }

    let n_genes = expression.nrows();
    let n_patients = patient_order.len();
    let mut mean_inflamed = Array2::zeros((n_genes, n_patients));
    let mut mean_uninflamed = Array2::zeros((n_genes, n_patients));
    let mut log2_ratio = Array2::zeros((n_genes, n_patients));

    for (p, patient) in patient_order.iter().enumerate() {
        let (inflamed, uninflamed) = &groups[patient];
        for g in 0..n_genes {
            let mi = (expression[[g, inflamed[0]]] + expression[[g, inflamed[1]]]) / 2.0;
            let mu = (expression[[g, uninflamed[0]]] + expression[[g, uninflamed[1]]]) / 2.0;
            mean_inflamed[[g, p]] = mi;
            mean_uninflamed[[g, p]] = mu;
            log2_ratio[[g, p]] =
                ((mi + RATIO_PSEUDOCOUNT) / (mu + RATIO_PSEUDOCOUNT)).log2();
        }
    }

    Ok(PairedExpression {
        patients: patient_order.iter().map(|s| s.to_string()).collect(),
        mean_inflamed,
        mean_uninflamed,
        log2_ratio,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn metadata(patients: &[&str], conditions: &[&str]) -> SampleMetadata {
        let ids: Vec<String> = (0..patients.len()).map(|i| format!("s{}", i)).collect();
        let mut m = SampleMetadata::new(ids);
        m.add_column("patient", patients.iter().map(|s| s.to_string()).collect())
            .unwrap();
        m.add_column(
            "inflammation",
            conditions.iter().map(|s| s.to_string()).collect(),
        )
        .unwrap();
        m
    }

    #[test]
    fn test_pairwise_average_and_ratio() {
        // One patient, 2+2 samples; gene0 inflamed means 15, non-inflamed 5
        let expr = array![[10.0, 20.0, 4.0, 6.0]];
        let meta = metadata(
            &["p1", "p1", "p1", "p1"],
            &["inflamed", "inflamed", "non_inflamed", "non_inflamed"],
        );
        let paired = pair_replicates(expr.view(), &meta, &PairingSpec::default()).unwrap();
        assert_eq!(paired.patients, vec!["p1"]);
        assert_eq!(paired.mean_inflamed[[0, 0]], 15.0);
        assert_eq!(paired.mean_uninflamed[[0, 0]], 5.0);
        let expected = (15.5f64 / 5.5).log2();
        assert!((paired.log2_ratio[[0, 0]] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_order_within_pair_irrelevant() {
        let expr_a = array![[10.0, 20.0, 4.0, 6.0]];
        let expr_b = array![[20.0, 10.0, 6.0, 4.0]];
        let meta = metadata(
            &["p1", "p1", "p1", "p1"],
            &["inflamed", "inflamed", "non_inflamed", "non_inflamed"],
        );
        let a = pair_replicates(expr_a.view(), &meta, &PairingSpec::default()).unwrap();
        let b = pair_replicates(expr_b.view(), &meta, &PairingSpec::default()).unwrap();
        assert_eq!(a.log2_ratio, b.log2_ratio);
    }

    #[test]
    fn test_unbalanced_patient_rejected() {
        let expr = array![[1.0, 2.0, 3.0]];
        let meta = metadata(
            &["p1", "p1", "p1"],
            &["inflamed", "inflamed", "non_inflamed"],
        );
        let err = pair_replicates(expr.view(), &meta, &PairingSpec::default()).unwrap_err();
        assert!(matches!(err, UcseqError::ReplicateStructure { .. }));
    }

    #[test]
    fn test_unknown_condition_rejected() {
        let expr = array![[1.0, 2.0]];
        let meta = metadata(&["p1", "p1"], &["inflamed", "healthy"]);
        assert!(pair_replicates(expr.view(), &meta, &PairingSpec::default()).is_err());
    }

    #[test]
    fn test_patients_sorted() {
        let expr = Array2::from_elem((1, 8), 1.0);
        let meta = metadata(
            &["p2", "p2", "p2", "p2", "p1", "p1", "p1", "p1"],
            &[
                "inflamed",
                "inflamed",
                "non_inflamed",
                "non_inflamed",
                "inflamed",
                "inflamed",
                "non_inflamed",
                "non_inflamed",
            ],
        );
        let paired = pair_replicates(expr.view(), &meta, &PairingSpec::default()).unwrap();
        assert_eq!(paired.patients, vec!["p1", "p2"]);
    }
}

//! Error types for ucseq

use thiserror::Error;

/// Main error type for report pipeline operations
#[derive(Error, Debug)]
pub enum UcseqError {
    #[error("Invalid count matrix: {reason}")]
    InvalidCountMatrix { reason: String },

    #[error("Invalid metadata: {reason}")]
    InvalidMetadata { reason: String },

    #[error("Sample mismatch between counts and metadata: {reason}")]
    SampleMismatch { reason: String },

    #[error("Replicate structure violation for patient {patient}: {reason}")]
    ReplicateStructure { patient: String, reason: String },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: String, got: String },

    #[error("Empty data: {reason}")]
    EmptyData { reason: String },

    #[error("Size factor estimation failed: {reason}")]
    SizeFactorFailed { reason: String },

    #[error("Numerical instability in {operation}: {details}")]
    NumericalInstability { operation: String, details: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Report rendering failed: {reason}")]
    RenderFailed { reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for report pipeline operations
pub type Result<T> = std::result::Result<T, UcseqError>;

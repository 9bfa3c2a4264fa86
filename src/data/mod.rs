//! Core data structures for the report pipeline

pub mod cohort;
pub mod count_matrix;
pub mod metadata;
pub mod pairs;

pub use cohort::Cohort;
pub use count_matrix::{CountMatrix, GeneAnnotations};
pub use metadata::SampleMetadata;
pub use pairs::{pair_replicates, PairedExpression, PairingSpec};

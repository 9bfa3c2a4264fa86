//! Input parsing and result table output

pub mod counts;
pub mod metadata;
pub mod results;
pub mod series;

pub use counts::read_count_matrix;
pub use metadata::read_metadata;
pub use series::read_series_metadata;

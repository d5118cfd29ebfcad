//! Input adapters.
//!
//! Submodules:
//! - `csv_source`: sensor CSV export reader.

pub mod csv_source;

pub use csv_source::{parse_timestamp, read_rows, read_rows_from};

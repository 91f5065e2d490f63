#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CSV decoding, validation, and transforms for county time series.
//!
//! Raw upstream CSV text is decoded by [`decode`] into a date axis and one
//! cumulative series per county, repaired by [`validate::validate`], and
//! then reshaped by the pure functions in [`transform`]. Smoothing is done
//! with the O(1)-per-step [`average::TrailingAverage`] buffer.
//!
//! Nothing in this crate performs I/O. Fetching and memoization live in
//! `covid_map_source` and `covid_map_dataset`.

pub mod average;
pub mod decode;
pub mod transform;
pub mod validate;

pub use average::TrailingAverage;
pub use decode::{decode_cumulative, decode_populations};
pub use transform::{to_change, to_per_capita, to_trailing_average};
pub use validate::validate;

/// Errors that can occur while decoding an upstream CSV document.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The CSV reader failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The document has no header row.
    #[error("CSV document has no header row")]
    MissingHeader,

    /// A date column header could not be parsed.
    #[error("Invalid date {value:?} in header column {column}")]
    InvalidDate {
        /// Zero-based column index.
        column: usize,
        /// The raw header cell.
        value: String,
    },

    /// A date column is not later than the column before it.
    #[error("Date in header column {column} does not follow the previous date")]
    NonIncreasingDates {
        /// Zero-based column index.
        column: usize,
    },
}

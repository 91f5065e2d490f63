#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Memoized store of derived county datasets.
//!
//! [`DatasetStore`] resolves a [`DatasetIdentity`] by recursively resolving
//! the identity it is derived from (per-capita from total, change from
//! cumulative, smoothed from raw) and applying one transform. Every level
//! is memoized, and concurrent requests for the same identity share one
//! in-flight computation.
//!
//! [`DatasetIdentity`]: covid_map_series_models::DatasetIdentity

mod store;

use std::sync::Arc;

use covid_map_series::DecodeError;
use covid_map_source::SourceError;

pub use store::DatasetStore;

/// Default number of derived datasets kept before least-recently-used
/// entries are evicted.
pub const DEFAULT_MAX_DATASETS: usize = 64;

/// Errors that can occur while resolving a dataset.
///
/// Cloneable so a single failure can be handed to every caller waiting on
/// the same computation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DatasetError {
    /// The requested identity is malformed. Nothing was fetched or cached.
    #[error("Invalid parameter: {message}")]
    InvalidParameter {
        /// Description of what went wrong.
        message: String,
    },

    /// The upstream document could not be fetched.
    #[error("Fetch failed: {0}")]
    Fetch(#[source] Arc<SourceError>),

    /// The upstream document could not be decoded.
    #[error("Decode failed: {0}")]
    Decode(#[source] Arc<DecodeError>),
}

impl From<SourceError> for DatasetError {
    fn from(e: SourceError) -> Self {
        Self::Fetch(Arc::new(e))
    }
}

impl From<DecodeError> for DatasetError {
    fn from(e: DecodeError) -> Self {
        Self::Decode(Arc::new(e))
    }
}

/// Configuration for a [`DatasetStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Maximum number of derived datasets kept in memory. The population
    /// table does not count against this limit.
    pub max_datasets: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_datasets: DEFAULT_MAX_DATASETS,
        }
    }
}

impl StoreConfig {
    /// Reads `COVID_MAP_MAX_DATASETS` from the environment, falling back to
    /// [`DEFAULT_MAX_DATASETS`] when unset or unparseable.
    #[must_use]
    pub fn from_env() -> Self {
        let max_datasets = std::env::var("COVID_MAP_MAX_DATASETS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_DATASETS);
        Self { max_datasets }
    }
}

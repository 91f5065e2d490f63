#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Fetching of the upstream county CSV documents.
//!
//! Each provider implements the [`DatasetSource`] trait to hand back the
//! raw text of one of the three tracked [`Resource`]s. The dataset store
//! reads through it, and so does the mirror proxy when refreshing its disk
//! cache.

pub mod retry;

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use covid_map_series_models::Resource;

/// Errors that can occur while fetching a resource.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Requested URL.
        url: String,
        /// Response status code.
        status: u16,
    },

    /// I/O error (file read).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No location is configured for the resource.
    #[error("No location configured for {resource}")]
    Unconfigured {
        /// The resource that was requested.
        resource: Resource,
    },
}

/// Trait that every provider of the upstream CSV documents implements.
#[async_trait]
pub trait DatasetSource: Send + Sync {
    /// Returns the raw CSV text of `resource`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the document cannot be retrieved. A
    /// non-success response is always an error, never an empty document.
    async fn fetch(&self, resource: Resource) -> Result<String, SourceError>;
}

/// Fetches resources over HTTP with retry and backoff.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    urls: BTreeMap<Resource, String>,
}

impl HttpSource {
    /// Creates a source that fetches each resource from its URL.
    #[must_use]
    pub fn new(urls: BTreeMap<Resource, String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            urls,
        }
    }

    /// Creates a source rooted at `base_url`, joining each resource's path
    /// onto it (e.g. a running mirror proxy).
    #[must_use]
    pub fn with_base_url<'a>(
        base_url: &str,
        paths: impl IntoIterator<Item = (Resource, &'a str)>,
    ) -> Self {
        let base_url = base_url.trim_end_matches('/');
        let urls = paths
            .into_iter()
            .map(|(resource, path)| {
                (
                    resource,
                    format!("{base_url}/{}", path.trim_start_matches('/')),
                )
            })
            .collect();
        Self::new(urls)
    }

    /// Returns the URL configured for `resource`.
    #[must_use]
    pub fn url(&self, resource: Resource) -> Option<&str> {
        self.urls.get(&resource).map(String::as_str)
    }
}

#[async_trait]
impl DatasetSource for HttpSource {
    async fn fetch(&self, resource: Resource) -> Result<String, SourceError> {
        let url = self
            .url(resource)
            .ok_or(SourceError::Unconfigured { resource })?;

        log::info!("Fetching {resource} from {url}");
        let text = retry::send_text(|| self.client.get(url), retry::MAX_RETRIES).await?;
        log::debug!("Fetched {} bytes of {resource}", text.len());

        Ok(text)
    }
}

/// Reads resources from files in a local directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
    file_names: BTreeMap<Resource, String>,
}

impl DirectorySource {
    /// Creates a source reading `dir/<file name>` for each resource.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, file_names: BTreeMap<Resource, String>) -> Self {
        Self {
            dir: dir.into(),
            file_names,
        }
    }
}

#[async_trait]
impl DatasetSource for DirectorySource {
    async fn fetch(&self, resource: Resource) -> Result<String, SourceError> {
        let file_name = self
            .file_names
            .get(&resource)
            .ok_or(SourceError::Unconfigured { resource })?;
        let path = self.dir.join(file_name);
        log::debug!("Reading {resource} from {}", path.display());
        Ok(tokio::fs::read_to_string(&path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_joins_paths() {
        let source = HttpSource::with_base_url(
            "http://127.0.0.1:8888/",
            [
                (Resource::Cases, "/proxy_data/cumulative_cases.csv"),
                (Resource::Populations, "proxy_data/county_populations.csv"),
            ],
        );
        assert_eq!(
            source.url(Resource::Cases),
            Some("http://127.0.0.1:8888/proxy_data/cumulative_cases.csv")
        );
        assert_eq!(
            source.url(Resource::Populations),
            Some("http://127.0.0.1:8888/proxy_data/county_populations.csv")
        );
        assert_eq!(source.url(Resource::Deaths), None);
    }

    #[tokio::test]
    async fn unconfigured_resource_is_an_error() {
        let source = HttpSource::new(BTreeMap::new());
        assert!(matches!(
            source.fetch(Resource::Deaths).await,
            Err(SourceError::Unconfigured {
                resource: Resource::Deaths
            })
        ));
    }

    #[tokio::test]
    async fn directory_source_reads_files() {
        let dir = std::env::temp_dir().join("covid_map_source_test_directory");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("cases.csv"), "countyFIPS\n1001\n").unwrap();

        let source = DirectorySource::new(
            &dir,
            BTreeMap::from([(Resource::Cases, "cases.csv".to_string())]),
        );
        assert_eq!(
            source.fetch(Resource::Cases).await.unwrap(),
            "countyFIPS\n1001\n"
        );
        assert!(matches!(
            source.fetch(Resource::Deaths).await,
            Err(SourceError::Unconfigured { .. })
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn directory_source_missing_file_is_io_error() {
        let source = DirectorySource::new(
            std::env::temp_dir().join("covid_map_source_test_missing"),
            BTreeMap::from([(Resource::Cases, "nope.csv".to_string())]),
        );
        assert!(matches!(
            source.fetch(Resource::Cases).await,
            Err(SourceError::Io(_))
        ));
    }
}

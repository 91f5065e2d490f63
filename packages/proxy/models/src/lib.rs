#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Configuration and API response types for the mirror proxy.

use std::path::PathBuf;
use std::time::Duration;

use covid_map_series_models::Resource;
use serde::{Deserialize, Serialize};

/// Top-level proxy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    /// Port the HTTP server listens on.
    pub port: u16,
    /// Directory that mirrored files and the fetch log are stored under.
    pub data_root: PathBuf,
    /// Fetch log location, relative to `data_root`. Also the URL path that
    /// is refused with `403`.
    pub log_path: String,
    /// One entry per mirrored resource.
    pub resources: Vec<ResourceConfig>,
}

impl ProxyConfig {
    /// Returns the entry for `resource`, if configured.
    #[must_use]
    pub fn resource(&self, resource: Resource) -> Option<&ResourceConfig> {
        self.resources.iter().find(|r| r.resource == resource)
    }

    /// Returns `bind_addr:port`.
    #[must_use]
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

/// How one remote resource is mirrored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Which resource this is.
    pub resource: Resource,
    /// Payload location relative to the data root. Served at `/<path>`.
    pub path: String,
    /// Timestamp location relative to the data root. Never served.
    pub meta_path: String,
    /// Upstream URL the payload is mirrored from.
    pub remote_url: String,
    /// Seconds a mirrored copy stays fresh. Absent means forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
}

impl ResourceConfig {
    /// Time-to-live of the mirrored copy, or `None` if it never expires.
    #[must_use]
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiHealth {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Service version.
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cases() -> ResourceConfig {
        ResourceConfig {
            resource: Resource::Cases,
            path: "proxy_data/cumulative_cases.csv".to_string(),
            meta_path: "proxy_data/cumulative_cases_timestamp.txt".to_string(),
            remote_url: "https://example.com/cases.csv".to_string(),
            ttl_secs: Some(60),
        }
    }

    #[test]
    fn ttl_absent_means_forever() {
        let mut entry = cases();
        assert_eq!(entry.ttl(), Some(Duration::from_secs(60)));
        entry.ttl_secs = None;
        assert_eq!(entry.ttl(), None);
    }

    #[test]
    fn resource_lookup() {
        let config = ProxyConfig {
            bind_addr: "0.0.0.0".to_string(),
            port: 9000,
            data_root: PathBuf::from("."),
            log_path: "proxy_data/log.txt".to_string(),
            resources: vec![cases()],
        };
        assert_eq!(config.socket_addr(), "0.0.0.0:9000");
        assert!(config.resource(Resource::Cases).is_some());
        assert!(config.resource(Resource::Deaths).is_none());
    }
}

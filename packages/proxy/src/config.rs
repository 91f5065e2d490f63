//! Proxy configuration loading.
//!
//! Defaults are baked into the binary from `config/default.toml`. A config
//! file overrides any subset of the top-level keys (a `resources` list
//! replaces the default list wholesale), then `BIND_ADDR` and `PORT` from
//! the environment override the listen address.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use covid_map_proxy_models::{ProxyConfig, ResourceConfig};
use covid_map_series_models::Resource;
use serde::Deserialize;

/// Embedded default configuration.
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../config/default.toml");

/// Environment variable naming a config file when `--config` is not given.
pub const CONFIG_PATH_ENV: &str = "COVID_MAP_PROXY_CONFIG";

/// Errors that can occur while loading the proxy configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML or has the wrong shape.
    #[error("Invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    /// `PORT` is not a valid port number.
    #[error("Invalid port {value:?}")]
    InvalidPort {
        /// The rejected value.
        value: String,
    },

    /// The same resource is configured twice.
    #[error("Resource {resource} is configured more than once")]
    DuplicateResource {
        /// The repeated resource.
        resource: Resource,
    },
}

/// Keys a config file may set. Anything left out keeps its default.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    bind_addr: Option<String>,
    port: Option<u16>,
    data_root: Option<PathBuf>,
    log_path: Option<String>,
    resources: Option<Vec<ResourceConfig>>,
}

impl ConfigFile {
    fn apply(self, config: &mut ProxyConfig) {
        if let Some(bind_addr) = self.bind_addr {
            config.bind_addr = bind_addr;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(data_root) = self.data_root {
            config.data_root = data_root;
        }
        if let Some(log_path) = self.log_path {
            config.log_path = log_path;
        }
        if let Some(resources) = self.resources {
            config.resources = resources;
        }
    }
}

/// Parses the embedded default configuration.
///
/// # Errors
///
/// Returns [`ConfigError::Toml`] if the embedded file is malformed.
pub fn default_config() -> Result<ProxyConfig, ConfigError> {
    let config: ProxyConfig = toml::de::from_str(DEFAULT_CONFIG_TOML)?;
    validate(&config)?;
    Ok(config)
}

/// Applies a TOML document on top of `config`.
///
/// # Errors
///
/// Returns [`ConfigError`] if the document is malformed or lists a
/// resource twice.
pub fn apply_toml(mut config: ProxyConfig, text: &str) -> Result<ProxyConfig, ConfigError> {
    let file: ConfigFile = toml::de::from_str(text)?;
    file.apply(&mut config);
    validate(&config)?;
    Ok(config)
}

/// Applies `BIND_ADDR` and `PORT` overrides looked up through `var`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidPort`] if `PORT` is set but is not a
/// valid port number.
pub fn apply_env(
    mut config: ProxyConfig,
    var: impl Fn(&str) -> Option<String>,
) -> Result<ProxyConfig, ConfigError> {
    if let Some(bind_addr) = var("BIND_ADDR") {
        config.bind_addr = bind_addr;
    }
    if let Some(port) = var("PORT") {
        config.port = port
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidPort { value: port })?;
    }
    Ok(config)
}

/// Loads the full configuration: defaults, then `path` (if any), then the
/// process environment.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file cannot be read or parsed, or an
/// environment override is invalid.
pub fn load_config(path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
    let mut config = default_config()?;

    if let Some(path) = path {
        log::info!("Loading proxy config from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        config = apply_toml(config, &text)?;
    }

    apply_env(config, |key| std::env::var(key).ok())
}

fn validate(config: &ProxyConfig) -> Result<(), ConfigError> {
    let mut seen = BTreeSet::new();
    for entry in &config.resources {
        if !seen.insert(entry.resource) {
            return Err(ConfigError::DuplicateResource {
                resource: entry.resource,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mirror_all_resources() {
        let config = default_config().unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1");
        assert_eq!(config.port, 8888);
        assert_eq!(config.log_path, "proxy_data/log.txt");
        assert_eq!(config.resources.len(), 3);

        let cases = config.resource(Resource::Cases).unwrap();
        assert_eq!(cases.path, "proxy_data/cumulative_cases.csv");
        assert_eq!(cases.ttl_secs, Some(86_400));
        assert!(cases.remote_url.ends_with("covid_confirmed_usafacts.csv"));

        let populations = config.resource(Resource::Populations).unwrap();
        assert_eq!(populations.ttl_secs, None);
    }

    #[test]
    fn file_overrides_selected_keys() {
        let config = apply_toml(default_config().unwrap(), "port = 9000\n").unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.bind_addr, "127.0.0.1");
        assert_eq!(config.resources.len(), 3);
    }

    #[test]
    fn file_resources_replace_defaults() {
        let text = r#"
[[resources]]
resource = "deaths"
path = "deaths.csv"
meta_path = "deaths.ts"
remote_url = "http://localhost/deaths.csv"
ttl_secs = 5
"#;
        let config = apply_toml(default_config().unwrap(), text).unwrap();
        assert_eq!(config.resources.len(), 1);
        assert_eq!(config.resources[0].resource, Resource::Deaths);
    }

    #[test]
    fn duplicate_resource_is_rejected() {
        let entry = r#"
[[resources]]
resource = "cases"
path = "a.csv"
meta_path = "a.ts"
remote_url = "http://localhost/a.csv"
"#;
        let result = apply_toml(default_config().unwrap(), &entry.repeat(2));
        assert!(matches!(
            result,
            Err(ConfigError::DuplicateResource {
                resource: Resource::Cases
            })
        ));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = apply_toml(default_config().unwrap(), "prot = 1\n");
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn env_overrides_listen_address() {
        let config = apply_env(default_config().unwrap(), |key| match key {
            "BIND_ADDR" => Some("0.0.0.0".to_string()),
            "PORT" => Some("8080".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.socket_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn invalid_port_is_an_error() {
        let result = apply_env(default_config().unwrap(), |key| {
            (key == "PORT").then(|| "eighty".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidPort { .. })));
    }

    #[test]
    fn missing_file_is_io_error() {
        let path = std::env::temp_dir().join("covid_map_proxy_no_such_config.toml");
        assert!(matches!(
            load_config(Some(&path)),
            Err(ConfigError::Io(_))
        ));
    }
}

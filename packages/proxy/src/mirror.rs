//! Disk-backed, time-expiring mirror of the upstream CSV documents.
//!
//! Each mirrored resource has a payload file and a metadata file holding
//! the fetch time as milliseconds since the Unix epoch. A copy is served
//! while it is younger than the resource's TTL; otherwise it is refreshed
//! from upstream under a per-resource lock so concurrent requests trigger
//! one fetch.
//!
//! The cache assumes a single server process owns the data directory.
//! Payload and metadata are each replaced atomically, but not together: a
//! crash between the two renames leaves old metadata next to a new
//! payload, which at worst forces one extra refresh.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use covid_map_proxy_models::ProxyConfig;
use covid_map_series_models::Resource;
use covid_map_source::{DatasetSource, SourceError};
use tokio::io::AsyncWriteExt as _;
use tokio::sync::Mutex;

/// How far ahead of the local clock a fetch time may be before it is
/// treated as corrupt.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(60);

/// Errors that can occur while serving a mirrored resource.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// The upstream fetch failed. Nothing was written.
    #[error("Upstream fetch failed: {0}")]
    Fetch(#[from] SourceError),

    /// The data directory could not be prepared.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where and for how long one resource is mirrored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorEntry {
    /// Which resource this is.
    pub resource: Resource,
    /// Upstream URL, for the fetch log.
    pub remote_url: String,
    /// Absolute payload location.
    pub payload_path: PathBuf,
    /// Absolute metadata location.
    pub meta_path: PathBuf,
    /// Freshness window. `None` never expires.
    pub ttl: Option<Duration>,
}

impl MirrorEntry {
    /// Whether a copy fetched at `fetched_ms` is still fresh at `now_ms`.
    ///
    /// A fetch time more than [`MAX_CLOCK_SKEW`] in the future is stale
    /// whatever the TTL.
    #[must_use]
    pub fn is_fresh(&self, fetched_ms: i64, now_ms: i64) -> bool {
        let millis = |d: Duration| i128::try_from(d.as_millis()).unwrap_or(i128::MAX);
        let age = i128::from(now_ms) - i128::from(fetched_ms);
        if -age > millis(MAX_CLOCK_SKEW) {
            return false;
        }
        self.ttl.is_none_or(|ttl| age < millis(ttl))
    }
}

/// Append-only log of fetch and startup events.
#[derive(Debug, Clone)]
pub struct FetchLog {
    path: PathBuf,
}

impl FetchLog {
    /// Creates a log appending to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `[<now>] <message>` as one line. Failures are logged, not
    /// returned.
    pub async fn record(&self, message: &str) {
        let line = format!("[{}] {message}\n", chrono::Utc::now().to_rfc2822());
        if let Err(e) = self.append(&line).await {
            log::warn!("Failed to write {}: {e}", self.path.display());
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

/// The mirror: one entry and one refresh lock per resource.
pub struct MirrorCache {
    entries: BTreeMap<Resource, MirrorEntry>,
    locks: BTreeMap<Resource, Mutex<()>>,
    upstream: Arc<dyn DatasetSource>,
    fetch_log: FetchLog,
}

impl std::fmt::Debug for MirrorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorCache")
            .field("entries", &self.entries)
            .field("fetch_log", &self.fetch_log)
            .finish_non_exhaustive()
    }
}

impl MirrorCache {
    /// Creates a mirror of `entries`, refreshing through `upstream`.
    #[must_use]
    pub fn new(
        entries: impl IntoIterator<Item = MirrorEntry>,
        upstream: Arc<dyn DatasetSource>,
        fetch_log: FetchLog,
    ) -> Self {
        let entries: BTreeMap<_, _> = entries.into_iter().map(|e| (e.resource, e)).collect();
        let locks = entries.keys().map(|r| (*r, Mutex::new(()))).collect();
        Self {
            entries,
            locks,
            upstream,
            fetch_log,
        }
    }

    /// Builds the mirror described by `config`, resolving paths against
    /// its data root.
    #[must_use]
    pub fn from_config(config: &ProxyConfig, upstream: Arc<dyn DatasetSource>) -> Self {
        let root = &config.data_root;
        let entries = config.resources.iter().map(|r| MirrorEntry {
            resource: r.resource,
            remote_url: r.remote_url.clone(),
            payload_path: root.join(&r.path),
            meta_path: root.join(&r.meta_path),
            ttl: r.ttl(),
        });
        Self::new(entries, upstream, FetchLog::new(root.join(&config.log_path)))
    }

    /// Creates the directories every mirrored file and the log live in.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Io`] if a directory cannot be created.
    pub async fn prepare(&self) -> Result<(), MirrorError> {
        let files = self
            .entries
            .values()
            .flat_map(|e| [&e.payload_path, &e.meta_path])
            .chain(std::iter::once(&self.fetch_log.path));
        for file in files {
            if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }

    /// The fetch log.
    #[must_use]
    pub const fn fetch_log(&self) -> &FetchLog {
        &self.fetch_log
    }

    /// Returns the mirrored payload for `resource`, refreshing it from
    /// upstream if missing or stale.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Fetch`] if a refresh is needed and the
    /// upstream fetch fails. Stale data is never served in that case, and
    /// the existing copy is left untouched.
    pub async fn get(&self, resource: Resource) -> Result<String, MirrorError> {
        let (Some(entry), Some(lock)) = (self.entries.get(&resource), self.locks.get(&resource))
        else {
            return Err(SourceError::Unconfigured { resource }.into());
        };

        if let Some(payload) = read_fresh(entry).await {
            log::debug!("Serving cached {resource}");
            return Ok(payload);
        }

        let _guard = lock.lock().await;

        // Another request may have refreshed while we waited.
        if let Some(payload) = read_fresh(entry).await {
            log::debug!("Serving {resource} refreshed by a concurrent request");
            return Ok(payload);
        }

        let payload = self.upstream.fetch(resource).await?;
        let fetched_ms = now_ms();

        if let Err(e) = store(entry, &payload, fetched_ms).await {
            log::warn!("Failed to persist mirrored {resource}: {e}");
        }

        log::info!("Fetched {resource} from {}", entry.remote_url);
        self.fetch_log
            .record(&format!("Fetched from {}", entry.remote_url))
            .await;

        Ok(payload)
    }
}

/// Reads the payload if the metadata says it is fresh. Any read or parse
/// failure counts as stale.
async fn read_fresh(entry: &MirrorEntry) -> Option<String> {
    let fetched_ms = read_timestamp(&entry.meta_path).await?;
    if !entry.is_fresh(fetched_ms, now_ms()) {
        return None;
    }
    match tokio::fs::read_to_string(&entry.payload_path).await {
        Ok(payload) => Some(payload),
        Err(e) => {
            log::debug!(
                "Fresh metadata but unreadable payload {}: {e}",
                entry.payload_path.display()
            );
            None
        }
    }
}

async fn read_timestamp(path: &Path) -> Option<i64> {
    let text = tokio::fs::read_to_string(path).await.ok()?;
    text.trim().parse().ok()
}

async fn store(entry: &MirrorEntry, payload: &str, fetched_ms: i64) -> std::io::Result<()> {
    write_atomic(&entry.payload_path, payload.as_bytes()).await?;
    write_atomic(&entry.meta_path, fetched_ms.to_string().as_bytes()).await
}

async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let temp_path = temp_path(path);
    tokio::fs::write(&temp_path, contents).await?;
    tokio::fs::rename(&temp_path, path).await
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

//! Artifact store abstraction and store selection.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::actions::{ActionsCacheStore, CacheService};
use crate::archive::CompressionMethod;
use crate::local::LocalStore;
use crate::{Error, Result};

/// Longest key the Actions cache service accepts.
pub const MAX_KEY_LENGTH: usize = 512;

/// Most keys a single lookup may carry.
pub const MAX_KEYS: usize = 10;

/// A key/value blob store holding archived cache directories.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store name used in logs.
    fn name(&self) -> &'static str;

    /// Restore the first entry matching `keys` into `paths`.
    ///
    /// Keys are tried in order; for each key an exact match wins over the
    /// newest entry it prefixes. Returns the key of the restored entry, or
    /// `None` when nothing matched.
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be reached or the entry cannot
    /// be unpacked. A miss is not an error.
    async fn restore(&self, paths: &[PathBuf], keys: &[String]) -> Result<Option<String>>;
}

/// Check a single key against the service limits.
///
/// # Errors
///
/// Returns [`Error::InvalidKey`] for an empty key, a key over
/// [`MAX_KEY_LENGTH`] characters or one containing a comma.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::invalid_key(key, "key is empty"));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(Error::invalid_key(
            key,
            format!("key exceeds {MAX_KEY_LENGTH} characters"),
        ));
    }
    if key.contains(',') {
        return Err(Error::invalid_key(key, "key cannot contain commas"));
    }
    Ok(())
}

/// Check a lookup key list.
///
/// # Errors
///
/// Returns an error for an empty list, more than [`MAX_KEYS`] keys or any
/// key rejected by [`validate_key`].
pub fn validate_keys(keys: &[String]) -> Result<()> {
    if keys.is_empty() {
        return Err(Error::configuration("at least one cache key is required"));
    }
    if keys.len() > MAX_KEYS {
        return Err(Error::configuration(format!(
            "at most {MAX_KEYS} cache keys are allowed, got {}",
            keys.len()
        )));
    }
    keys.iter().try_for_each(|k| validate_key(k))
}

/// Pick the entry a lookup resolves to.
///
/// `newest_first` lists the available entry keys, most recent first.
#[must_use]
pub fn select_entry(keys: &[String], newest_first: &[String]) -> Option<String> {
    keys.iter().find_map(|key| {
        newest_first
            .iter()
            .find(|candidate| *candidate == key)
            .or_else(|| {
                newest_first
                    .iter()
                    .find(|candidate| candidate.starts_with(key.as_str()))
            })
            .cloned()
    })
}

/// Where restore requests go, read from the job environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreConfig {
    /// `ACTIONS_RESULTS_URL`, cache service v2.
    pub results_url: Option<String>,
    /// `ACTIONS_CACHE_URL`, cache service v1.
    pub cache_url: Option<String>,
    /// `ACTIONS_RUNTIME_TOKEN`.
    pub runtime_token: Option<String>,
    /// `BCSETUP_CACHE_STORE_DIR`, a directory of archives for self-hosted runners.
    pub local_dir: Option<PathBuf>,
    /// Scratch directory for downloaded archives.
    pub temp_dir: PathBuf,
    /// Compression the runner saves cache archives with.
    pub compression: CompressionMethod,
}

impl StoreConfig {
    /// Build from a variable lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());
        Self {
            results_url: get("ACTIONS_RESULTS_URL"),
            cache_url: get("ACTIONS_CACHE_URL"),
            runtime_token: get("ACTIONS_RUNTIME_TOKEN"),
            local_dir: get("BCSETUP_CACHE_STORE_DIR").map(PathBuf::from),
            temp_dir: get("RUNNER_TEMP").map_or_else(std::env::temp_dir, PathBuf::from),
            compression: CompressionMethod::default(),
        }
    }

    /// Look up archives saved with `compression`.
    #[must_use]
    pub fn with_compression(mut self, compression: CompressionMethod) -> Self {
        self.compression = compression;
        self
    }
}

/// Store used when none can be configured; every restore fails with `reason`.
#[derive(Debug, Clone)]
pub struct UnavailableStore {
    reason: String,
}

impl UnavailableStore {
    /// Create a store that always fails with `reason`.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ArtifactStore for UnavailableStore {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    async fn restore(&self, _paths: &[PathBuf], _keys: &[String]) -> Result<Option<String>> {
        Err(Error::configuration(self.reason.clone()))
    }
}

/// Select the store for this job.
///
/// The Actions cache service wins when the runner exposes it (v2 before v1),
/// then a local archive directory. Setup problems never fail here; they turn
/// into an [`UnavailableStore`] so the restore boundary can absorb them.
#[must_use]
pub fn build_store(
    config: &StoreConfig,
    workspace: &Path,
    lookup_timeout: Duration,
) -> Box<dyn ArtifactStore> {
    let service = config
        .results_url
        .clone()
        .map(CacheService::V2)
        .or_else(|| config.cache_url.clone().map(CacheService::V1));

    match (service, &config.runtime_token, &config.local_dir) {
        (Some(service), Some(token), _) => {
            match ActionsCacheStore::new(service, token.clone(), workspace, &config.temp_dir) {
                Ok(store) => Box::new(
                    store
                        .with_lookup_timeout(lookup_timeout)
                        .with_compression(config.compression),
                ),
                Err(e) => Box::new(UnavailableStore::new(e.to_string())),
            }
        }
        (Some(_), None, None) => Box::new(UnavailableStore::new(
            "ACTIONS_RUNTIME_TOKEN is not set; the cache service cannot be used",
        )),
        (_, _, Some(dir)) => Box::new(LocalStore::new(dir, workspace)),
        (None, _, None) => Box::new(UnavailableStore::new(
            "no cache service configured (ACTIONS_RESULTS_URL, ACTIONS_CACHE_URL or BCSETUP_CACHE_STORE_DIR)",
        )),
    }
}

//! GitHub Actions cache service client (restore only).
//!
//! Supports both service generations the runner may expose:
//! - v1: REST lookup under `ACTIONS_CACHE_URL`
//! - v2: twirp lookup under `ACTIONS_RESULTS_URL`
//!
//! A lookup resolves to a signed archive URL, which is downloaded to the
//! runner temp directory and unpacked into the workspace.

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::archive::{CompressionMethod, cache_version, unpack_archive};
use crate::store::{ArtifactStore, validate_keys};
use crate::{Error, Result};

const V1_ACCEPT: &str = "application/json;api-version=6.0-preview.1";
const V2_LOOKUP_PATH: &str =
    "twirp/github.actions.results.api.v1.CacheService/GetCacheEntryDownloadURL";

/// Lookup timeout for the cache service.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for downloading a cache archive.
pub const DEFAULT_ARCHIVE_TIMEOUT: Duration = Duration::from_secs(600);

/// Which cache service generation to talk to, with its base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheService {
    /// REST API rooted at `ACTIONS_CACHE_URL`
    V1(String),
    /// twirp API rooted at `ACTIONS_RESULTS_URL`
    V2(String),
}

impl CacheService {
    fn endpoint(&self, path: &str) -> String {
        let base = match self {
            Self::V1(base) | Self::V2(base) => base,
        };
        format!("{}/{path}", base.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactCacheEntry {
    cache_key: Option<String>,
    archive_location: Option<String>,
}

#[derive(Debug, Serialize)]
struct DownloadUrlRequest<'a> {
    key: &'a str,
    restore_keys: &'a [String],
    version: &'a str,
}

#[derive(Debug, Deserialize)]
struct DownloadUrlResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    signed_download_url: String,
    #[serde(default)]
    matched_key: String,
}

/// Entry found by a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CacheHit {
    key: String,
    archive_url: String,
}

/// Restores cache archives from the GitHub Actions cache service.
pub struct ActionsCacheStore {
    client: reqwest::Client,
    service: CacheService,
    token: String,
    workspace: PathBuf,
    temp_dir: PathBuf,
    compression: CompressionMethod,
    lookup_timeout: Duration,
    archive_timeout: Duration,
}

impl ActionsCacheStore {
    /// Create a store for `service`, unpacking into `workspace`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        service: CacheService,
        token: impl Into<String>,
        workspace: &Path,
        temp_dir: &Path,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("buildcache-setup/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            service,
            token: token.into(),
            workspace: workspace.to_path_buf(),
            temp_dir: temp_dir.to_path_buf(),
            compression: CompressionMethod::default(),
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            archive_timeout: DEFAULT_ARCHIVE_TIMEOUT,
        })
    }

    /// Override the lookup timeout.
    #[must_use]
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Override the archive download timeout.
    #[must_use]
    pub fn with_archive_timeout(mut self, timeout: Duration) -> Self {
        self.archive_timeout = timeout;
        self
    }

    /// Override the archive compression.
    #[must_use]
    pub fn with_compression(mut self, compression: CompressionMethod) -> Self {
        self.compression = compression;
        self
    }

    async fn lookup(&self, keys: &[String], version: &str) -> Result<Option<CacheHit>> {
        match &self.service {
            CacheService::V1(_) => self.lookup_v1(keys, version).await,
            CacheService::V2(_) => self.lookup_v2(keys, version).await,
        }
    }

    async fn lookup_v1(&self, keys: &[String], version: &str) -> Result<Option<CacheHit>> {
        let url = self.service.endpoint("_apis/artifactcache/cache");
        let response = self
            .client
            .get(&url)
            .query(&[("keys", keys.join(",").as_str()), ("version", version)])
            .header(ACCEPT, V1_ACCEPT)
            .bearer_auth(&self.token)
            .timeout(self.lookup_timeout)
            .send()
            .await
            .map_err(|e| Error::transport(format!("cache lookup failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Error::transport(format!(
                "cache lookup returned HTTP {status}"
            )));
        }

        let entry: ArtifactCacheEntry = response
            .json()
            .await
            .map_err(|e| Error::serialization(format!("invalid cache lookup response: {e}")))?;
        match (entry.cache_key, entry.archive_location) {
            (Some(key), Some(archive_url)) => Ok(Some(CacheHit { key, archive_url })),
            _ => Err(Error::serialization(
                "cache lookup response is missing cacheKey or archiveLocation",
            )),
        }
    }

    async fn lookup_v2(&self, keys: &[String], version: &str) -> Result<Option<CacheHit>> {
        let Some((primary, restore_keys)) = keys.split_first() else {
            return Ok(None);
        };
        let url = self.service.endpoint(V2_LOOKUP_PATH);
        let request = DownloadUrlRequest {
            key: primary,
            restore_keys,
            version,
        };
        let response = self
            .client
            .post(&url)
            .json(&request)
            .bearer_auth(&self.token)
            .timeout(self.lookup_timeout)
            .send()
            .await
            .map_err(|e| Error::transport(format!("cache lookup failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::transport(format!(
                "cache lookup returned HTTP {status}"
            )));
        }

        let body: DownloadUrlResponse = response
            .json()
            .await
            .map_err(|e| Error::serialization(format!("invalid cache lookup response: {e}")))?;
        if !body.ok || body.signed_download_url.is_empty() {
            return Ok(None);
        }
        let key = if body.matched_key.is_empty() {
            primary.clone()
        } else {
            body.matched_key
        };
        Ok(Some(CacheHit {
            key,
            archive_url: body.signed_download_url,
        }))
    }

    /// Stream the archive at `url` into `dest`.
    async fn download_archive(&self, url: &str, dest: &Path) -> Result<()> {
        let mut response = self
            .client
            .get(url)
            .timeout(self.archive_timeout)
            .send()
            .await
            .map_err(|e| Error::transport(format!("cache archive download failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::transport(format!(
                "cache archive download returned HTTP {status}"
            )));
        }

        tokio::fs::create_dir_all(&self.temp_dir)
            .await
            .map_err(|e| Error::io(e, &self.temp_dir, "create"))?;
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| Error::io(e, dest, "create"))?;

        let mut size: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::transport(format!("cache archive download failed: {e}")))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::io(e, dest, "write"))?;
            size += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| Error::io(e, dest, "write"))?;

        debug!(archive = %dest.display(), size, "downloaded cache archive");
        Ok(())
    }

    /// Download the archive for `hit` and unpack it into `paths`.
    async fn fetch_and_unpack(
        &self,
        hit: &CacheHit,
        archive: &Path,
        paths: &[PathBuf],
    ) -> Result<usize> {
        self.download_archive(&hit.archive_url, archive).await?;

        let workspace = self.workspace.clone();
        let compression = self.compression;
        let archive = archive.to_path_buf();
        let paths = paths.to_vec();
        tokio::task::spawn_blocking(move || {
            unpack_archive(&archive, compression, &workspace, &paths)
        })
        .await
        .map_err(|e| Error::configuration(format!("unpack task failed: {e}")))?
    }
}

#[async_trait]
impl ArtifactStore for ActionsCacheStore {
    fn name(&self) -> &'static str {
        "actions-cache"
    }

    async fn restore(&self, paths: &[PathBuf], keys: &[String]) -> Result<Option<String>> {
        validate_keys(keys)?;
        let version = cache_version(paths, self.compression);
        debug!(keys = ?keys, version = %version, "looking up cache entry");

        let Some(hit) = self.lookup(keys, &version).await? else {
            return Ok(None);
        };

        let archive = self.temp_dir.join(self.compression.file_name());
        let written = self.fetch_and_unpack(&hit, &archive, paths).await;

        match tokio::fs::remove_file(&archive).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                debug!(archive = %archive.display(), "failed to remove cache archive: {e}");
            }
            _ => {}
        }

        if written? == 0 {
            warn!(key = %hit.key, "cache entry holds nothing under the cache directory");
            return Ok(None);
        }
        Ok(Some(hit.key))
    }
}

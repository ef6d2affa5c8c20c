//! Seams between the pipeline stages and the outside world.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::Result;

/// Opaque identifier of a tool release (a release tag such as `v0.28.9`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionTag(String);

impl VersionTag {
    /// Wrap a release tag.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VersionTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A release archive downloaded to the local filesystem.
#[derive(Debug, Clone)]
pub struct DownloadArtifact {
    /// Path to the archive.
    pub path: PathBuf,
    /// SHA256 hash of the archive.
    pub sha256: String,
}

/// Source of release metadata (GitLab, GitHub, ...).
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Provider name used in logs.
    fn name(&self) -> &'static str;

    /// Tag of the most recently released version.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing cannot be fetched or has no usable tag.
    async fn latest_tag(&self) -> Result<VersionTag>;
}

/// Transfers a remote file to the local filesystem.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download `url` into `dest_dir`, returning the path of the written file.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-success status or timeout.
    async fn download(&self, url: &str, dest_dir: &Path) -> Result<PathBuf>;
}

/// Unpacks an archive.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract `archive` into `dest`, returning the unpack directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive format is unknown or unpacking fails.
    async fn extract(&self, archive: &Path, dest: &Path) -> Result<PathBuf>;
}

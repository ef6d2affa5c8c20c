//! Turning a resolved version into a downloaded release archive.

use bcsetup_core::Platform;
use bcsetup_core::Result;
use bcsetup_core::tools::{DownloadArtifact, Downloader, VersionTag};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::info;

use crate::{GITLAB_HOST, PROJECT_PATH};

/// Download URL of `archive` attached to the release `tag`.
#[must_use]
pub fn release_download_url(tag: &VersionTag, archive: &str) -> String {
    format!("https://{GITLAB_HOST}/{PROJECT_PATH}/-/releases/{tag}/downloads/{archive}")
}

/// Fetches the platform archive of a buildcache release.
pub struct ToolAcquirer<'a> {
    downloader: &'a dyn Downloader,
    archive: String,
}

impl<'a> ToolAcquirer<'a> {
    /// Acquire archives for `platform` through `downloader`.
    #[must_use]
    pub fn new(downloader: &'a dyn Downloader, platform: &Platform) -> Self {
        Self {
            downloader,
            archive: platform.archive_name().to_string(),
        }
    }

    /// Download URL for `tag`.
    #[must_use]
    pub fn download_url(&self, tag: &VersionTag) -> String {
        release_download_url(tag, &self.archive)
    }

    /// Download the release archive for `tag` into `dest_dir`.
    ///
    /// Transport failures are returned as-is; there is no retry here.
    ///
    /// # Errors
    ///
    /// Returns an error if the download fails or the archive cannot be hashed.
    pub async fn acquire(&self, tag: &VersionTag, dest_dir: &Path) -> Result<DownloadArtifact> {
        let url = self.download_url(tag);
        info!(%url, "download url");

        let path = self.downloader.download(&url, dest_dir).await?;
        let sha256 = compute_file_sha256(&path).await?;
        info!(path = %path.display(), %sha256, "download path");

        Ok(DownloadArtifact { path, sha256 })
    }
}

/// Compute SHA256 hash of a file.
async fn compute_file_sha256(path: &Path) -> Result<String> {
    let io_err = |e| bcsetup_core::Error::io(e, path, "read");
    let mut file = tokio::fs::File::open(path).await.map_err(io_err)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = file.read(&mut buffer).await.map_err(io_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

//! HTTPS download of release archives.

use async_trait::async_trait;
use bcsetup_core::tools::Downloader;
use bcsetup_core::{Error, Result};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Downloads files with a bounded request time. No retries.
pub struct HttpDownloader {
    client: Client,
    timeout: Duration,
}

impl HttpDownloader {
    /// Create a downloader with the default five minute timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: crate::http_client()?,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Bound the whole transfer to `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Local file name for a download: the last path segment of the URL.
fn file_name_for(url: &str) -> &str {
    url.split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .unwrap_or("download")
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, dest_dir: &Path) -> Result<PathBuf> {
        debug!(%url, "Downloading release archive");

        let mut response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::download(url, e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::download(url, format!("HTTP {}", response.status())));
        }

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| Error::io(e, dest_dir, "create"))?;
        let path = dest_dir.join(file_name_for(url));
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| Error::io(e, &path, "create"))?;

        let mut bytes: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::download(url, format!("failed to read body: {e}")))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::io(e, &path, "write"))?;
            bytes += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| Error::io(e, &path, "write"))?;

        debug!(path = %path.display(), bytes, "Download complete");
        Ok(path)
    }
}

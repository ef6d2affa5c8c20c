//! Directory-backed store for self-hosted runners.
//!
//! Entries are `<key>.tar.zst` files in one directory; recency is the file's
//! modification time.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

use crate::archive::{CompressionMethod, unpack_archive};
use crate::store::{ArtifactStore, select_entry, validate_keys};
use crate::{Error, Result};

const ENTRY_SUFFIX: &str = ".tar.zst";

/// Restores cache archives from a local directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    workspace: PathBuf,
}

impl LocalStore {
    /// Create a store reading archives from `root` and unpacking into `workspace`.
    #[must_use]
    pub fn new(root: &Path, workspace: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            workspace: workspace.to_path_buf(),
        }
    }

    /// Path of the archive stored under `key`.
    #[must_use]
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}{ENTRY_SUFFIX}"))
    }

    /// Entry keys, newest first.
    fn entries_newest_first(&self) -> Result<Vec<String>> {
        let dir = match std::fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(e, &self.root, "read")),
        };

        let mut entries: Vec<(SystemTime, String)> = Vec::new();
        for entry in dir {
            let entry = entry.map_err(|e| Error::io(e, &self.root, "read"))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(key) = name.strip_suffix(ENTRY_SUFFIX) else {
                continue;
            };
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .map_err(|e| Error::io(e, entry.path(), "stat"))?;
            entries.push((modified, key.to_string()));
        }
        // Newest first; ties broken by key so the order is deterministic.
        entries.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
        Ok(entries.into_iter().map(|(_, key)| key).collect())
    }
}

#[async_trait]
impl ArtifactStore for LocalStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn restore(&self, paths: &[PathBuf], keys: &[String]) -> Result<Option<String>> {
        validate_keys(keys)?;
        if let Some(key) = keys.iter().find(|k| k.contains(['/', '\\'])) {
            return Err(Error::invalid_key(
                key.as_str(),
                "key cannot contain path separators",
            ));
        }

        let store = self.clone();
        let keys = keys.to_vec();
        let paths = paths.to_vec();
        tokio::task::spawn_blocking(move || {
            let available = store.entries_newest_first()?;
            let Some(matched) = select_entry(&keys, &available) else {
                return Ok(None);
            };
            debug!(key = %matched, root = %store.root.display(), "found local cache entry");
            let written = unpack_archive(
                &store.entry_path(&matched),
                CompressionMethod::Zstd,
                &store.workspace,
                &paths,
            )?;
            if written == 0 {
                warn!(key = %matched, "cache entry holds nothing under the cache directory");
                return Ok(None);
            }
            Ok(Some(matched))
        })
        .await
        .map_err(|e| Error::configuration(format!("local restore task failed: {e}")))?
    }
}

//! Unpacking release archives.

use async_trait::async_trait;
use bcsetup_core::tools::Extractor;
use bcsetup_core::{Error, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::path::{Path, PathBuf};
use tar::Archive;
use tracing::debug;

/// Archive formats buildcache releases are published in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    Zip,
    TarGz,
}

impl ArchiveKind {
    fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else {
            None
        }
    }
}

/// Extracts zip and tar.gz archives, chosen by file extension.
///
/// Entries are written into the destination as-is, so the unpack directory
/// is the destination itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArchiveExtractor;

impl ArchiveExtractor {
    /// Create a new extractor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Extractor for ArchiveExtractor {
    async fn extract(&self, archive: &Path, dest: &Path) -> Result<PathBuf> {
        let kind = ArchiveKind::detect(archive)
            .ok_or_else(|| Error::extraction(archive, "unsupported archive format"))?;
        debug!(archive = %archive.display(), dest = %dest.display(), ?kind, "Extracting");

        let archive_path = archive.to_path_buf();
        let dest_path = dest.to_path_buf();
        tokio::task::spawn_blocking(move || match kind {
            ArchiveKind::Zip => extract_zip(&archive_path, &dest_path),
            ArchiveKind::TarGz => extract_tar_gz(&archive_path, &dest_path),
        })
        .await
        .map_err(|e| Error::extraction(archive, format!("extraction task failed: {e}")))??;

        Ok(dest.to_path_buf())
    }
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive).map_err(|e| Error::io(e, archive, "open"))?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| Error::extraction(archive, format!("failed to open zip: {e}")))?;

    std::fs::create_dir_all(dest).map_err(|e| Error::io(e, dest, "create"))?;

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| Error::extraction(archive, format!("failed to read zip entry: {e}")))?;

        // Entries escaping the destination are skipped.
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        let outpath = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath).map_err(|e| Error::io(e, &outpath, "create"))?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(e, parent, "create"))?;
        }
        let mut out = File::create(&outpath).map_err(|e| Error::io(e, &outpath, "create"))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| Error::io(e, &outpath, "write"))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode))
                .map_err(|e| Error::io(e, &outpath, "chmod"))?;
        }
    }

    Ok(())
}

fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive).map_err(|e| Error::io(e, archive, "open"))?;
    let mut tar = Archive::new(GzDecoder::new(file));
    tar.set_preserve_permissions(true);

    std::fs::create_dir_all(dest).map_err(|e| Error::io(e, dest, "create"))?;
    tar.unpack(dest)
        .map_err(|e| Error::extraction(archive, format!("failed to extract tar: {e}")))
}

//! Cache archive format: tar streams compressed with zstd (or gzip on
//! runners without zstd), holding paths relative to the workspace.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use crate::{Error, Result};

/// Bumped by the cache service whenever the archive layout changes.
const VERSION_SALT: &str = "1.0";

/// Largest zstd window the service's long-distance mode may produce.
const ZSTD_WINDOW_LOG_MAX: u32 = 31;

/// Compression used for a cache archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompressionMethod {
    /// zstd with long-distance matching (the runner default)
    #[default]
    Zstd,
    /// zstd without long-distance matching
    ZstdWithoutLong,
    /// gzip, used when the runner lacks zstd
    Gzip,
}

impl CompressionMethod {
    /// Archive file name the service uses for this compression.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Zstd | Self::ZstdWithoutLong => "cache.tzst",
            Self::Gzip => "cache.tgz",
        }
    }

    /// Component mixed into the cache version; gzip contributes none.
    #[must_use]
    pub const fn version_component(self) -> Option<&'static str> {
        match self {
            Self::Zstd => Some("zstd"),
            Self::ZstdWithoutLong => Some("zstd-without-long"),
            Self::Gzip => None,
        }
    }
}

/// Cache version for `paths` archived with `method`.
///
/// Entries are only visible to lookups with the same version, so restoring
/// under a different path set or compression never unpacks a foreign archive.
#[must_use]
pub fn cache_version(paths: &[PathBuf], method: CompressionMethod) -> String {
    let mut components: Vec<String> = paths
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    if let Some(component) = method.version_component() {
        components.push(component.to_string());
    }
    components.push(VERSION_SALT.to_string());
    hex::encode(Sha256::digest(components.join("|").as_bytes()))
}

/// Compression the cache action on this runner saves with: zstd when the
/// `zstd` program is available, gzip otherwise.
pub async fn detect_compression() -> CompressionMethod {
    compression_for_program("zstd").await
}

async fn compression_for_program(program: &str) -> CompressionMethod {
    match Command::new(program)
        .args(["--quiet", "--version"])
        .output()
        .await
    {
        Ok(output) if output.status.success() && !output.stdout.trim_ascii().is_empty() => {
            debug!(
                program,
                version = %String::from_utf8_lossy(&output.stdout).trim(),
                "zstd available"
            );
            CompressionMethod::Zstd
        }
        _ => {
            debug!(program, "zstd not available, using gzip cache archives");
            CompressionMethod::Gzip
        }
    }
}

/// Resolve `.` and `..` lexically, without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Unpack `archive` into the cache `paths`.
///
/// Entry names are relative to `workspace` and climb out of it with `..`
/// for directories that live elsewhere. Entries that resolve outside every
/// path in `paths` are skipped. Returns the number of entries written below
/// those paths.
///
/// # Errors
///
/// Returns an error if the archive cannot be opened, decoded or written out.
pub fn unpack_archive(
    archive: &Path,
    method: CompressionMethod,
    workspace: &Path,
    paths: &[PathBuf],
) -> Result<usize> {
    let file = fs::File::open(archive).map_err(|e| Error::io(e, archive, "open"))?;
    let roots: Vec<PathBuf> = paths.iter().map(|p| normalize(&workspace.join(p))).collect();

    let reader: Box<dyn Read> = match method {
        CompressionMethod::Zstd | CompressionMethod::ZstdWithoutLong => {
            let mut decoder = zstd::Decoder::new(file)
                .map_err(|e| Error::configuration(format!("zstd decoder error: {e}")))?;
            decoder
                .window_log_max(ZSTD_WINDOW_LOG_MAX)
                .map_err(|e| Error::configuration(format!("zstd decoder error: {e}")))?;
            Box::new(decoder)
        }
        CompressionMethod::Gzip => Box::new(flate2::read::GzDecoder::new(file)),
    };

    let mut tar = tar::Archive::new(reader);
    tar.set_preserve_permissions(true);
    tar.set_overwrite(true);

    let mut written = 0;
    for entry in tar.entries().map_err(|e| Error::io(e, archive, "read"))? {
        let mut entry = entry.map_err(|e| Error::io(e, archive, "read"))?;
        let name = entry
            .path()
            .map_err(|e| Error::io(e, archive, "read"))?
            .into_owned();
        let dest = normalize(&workspace.join(&name));

        let Some(root) = roots.iter().find(|root| dest.starts_with(root)) else {
            debug!(entry = %name.display(), "skipping entry outside the cache paths");
            continue;
        };
        if dest == *root {
            fs::create_dir_all(&dest).map_err(|e| Error::io(e, &dest, "create"))?;
            continue;
        }
        if unpack_entry(&mut entry, &dest, root)? {
            written += 1;
        }
    }
    Ok(written)
}

/// Write one entry at `dest`, strictly below `root`.
fn unpack_entry<R: Read>(entry: &mut tar::Entry<'_, R>, dest: &Path, root: &Path) -> Result<bool> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(e, parent, "create"))?;
        // Links unpacked earlier must not redirect later entries out of the root.
        let real_parent = parent
            .canonicalize()
            .map_err(|e| Error::io(e, parent, "canonicalize"))?;
        let real_root = root
            .canonicalize()
            .map_err(|e| Error::io(e, root, "canonicalize"))?;
        if !real_parent.starts_with(&real_root) {
            debug!(entry = %dest.display(), "skipping entry redirected outside the cache paths");
            return Ok(false);
        }
    }
    entry
        .unpack(dest)
        .map_err(|e| Error::io(e, dest, "unpack"))?;
    Ok(true)
}

//! Installing an unpacked buildcache release as a compiler substitute.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::provider::{DownloadArtifact, Extractor};
use crate::{Error, JobContext, Result};

/// Compiler names that are redirected to the accelerator.
pub const COMPILER_ALIASES: [&str; 2] = ["clang", "clang++"];

/// Where the installed tool lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationLayout {
    /// Directory the archive was extracted into.
    pub unpack_dir: PathBuf,
    /// The `buildcache` executable.
    pub binary: PathBuf,
    /// Directory holding the executable and its aliases; goes on the search path.
    pub bin_dir: PathBuf,
}

impl InstallationLayout {
    /// Compute and verify the layout of an unpacked release.
    ///
    /// Releases unpack to `buildcache/bin/buildcache`. The binary must exist
    /// and be executable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Installation`] when the binary is missing or not
    /// executable.
    pub fn locate(unpack_dir: &Path) -> Result<Self> {
        let binary = unpack_dir.join("buildcache").join("bin").join("buildcache");
        let bin_dir = binary
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::installation("binary has no parent directory", &binary))?;

        let meta = std::fs::metadata(&binary).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Error::installation("buildcache binary not found in unpacked archive", &binary)
            } else {
                Error::io(e, &binary, "stat")
            }
        })?;
        if !meta.is_file() || !is_executable(&meta) {
            return Err(Error::installation(
                "buildcache binary is not an executable file",
                &binary,
            ));
        }

        Ok(Self {
            unpack_dir: unpack_dir.to_path_buf(),
            binary,
            bin_dir,
        })
    }
}

#[cfg(unix)]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &std::fs::Metadata) -> bool {
    true
}

/// Result of [`ensure_link`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// The link was created by this call
    Created,
    /// A link to the same target already existed
    AlreadyPresent,
}

/// Make `link` a symbolic link to `target`.
///
/// A link that already resolves to `target` is left alone. Anything else at
/// `link` (a link elsewhere, a regular file) is a [`Error::LinkConflict`].
///
/// # Errors
///
/// Returns [`Error::LinkConflict`] when something else occupies `link`.
pub fn ensure_link(link: &Path, target: &Path) -> Result<LinkState> {
    match std::fs::symlink_metadata(link) {
        Ok(meta) if meta.file_type().is_symlink() => {
            let existing = std::fs::read_link(link).map_err(|e| Error::io(e, link, "readlink"))?;
            if points_to(link, &existing, target) {
                debug!(link = %link.display(), "Link already present");
                Ok(LinkState::AlreadyPresent)
            } else {
                Err(Error::link_conflict(link, existing, target))
            }
        }
        Ok(_) => Err(Error::link_conflict(link, link, target)),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            create_symlink(target, link)?;
            debug!(link = %link.display(), target = %target.display(), "Created link");
            Ok(LinkState::Created)
        }
        Err(e) => Err(Error::io(e, link, "stat")),
    }
}

fn points_to(link: &Path, existing: &Path, target: &Path) -> bool {
    if existing == target {
        return true;
    }
    let resolved = match link.parent() {
        Some(parent) if existing.is_relative() => parent.join(existing),
        _ => existing.to_path_buf(),
    };
    match (resolved.canonicalize(), target.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link).map_err(|e| Error::io(e, link, "symlink"))
}

#[cfg(not(unix))]
fn create_symlink(_target: &Path, link: &Path) -> Result<()> {
    Err(Error::installation(
        "compiler aliases require symbolic link support",
        link,
    ))
}

/// Locate the binary under `unpack_dir` and link the compiler aliases to it.
fn link_installation(unpack_dir: &Path) -> Result<InstallationLayout> {
    let layout = InstallationLayout::locate(unpack_dir)?;
    for alias in COMPILER_ALIASES {
        ensure_link(&layout.bin_dir.join(alias), &layout.binary)?;
    }
    Ok(layout)
}

/// Turns a downloaded archive into a usable installation.
pub struct Installer<'a> {
    extractor: &'a dyn Extractor,
}

impl<'a> Installer<'a> {
    /// Create an installer using `extractor` to unpack archives.
    #[must_use]
    pub fn new(extractor: &'a dyn Extractor) -> Self {
        Self { extractor }
    }

    /// Unpack `artifact` into the workspace, link the compiler aliases and
    /// publish the binary directory on the search path.
    ///
    /// # Errors
    ///
    /// Returns an error if extraction fails, the layout is unusable, a
    /// compiler alias is taken or the search path cannot be published.
    pub async fn install(
        &self,
        artifact: &DownloadArtifact,
        ctx: &mut JobContext,
    ) -> Result<InstallationLayout> {
        let root = ctx.workspace().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| Error::io(e, &root, "create"))?;

        let unpack_dir = self.extractor.extract(&artifact.path, &root).await?;
        info!(unpacked = %unpack_dir.display(), "unpacked folder");

        let layout = tokio::task::spawn_blocking(move || link_installation(&unpack_dir))
            .await
            .map_err(|e| Error::installation(format!("installation task failed: {e}"), &root))??;

        ctx.add_path(&layout.bin_dir)?;
        info!(
            binary = %layout.binary.display(),
            bin_dir = %layout.bin_dir.display(),
            "buildcache installed"
        );

        Ok(layout)
    }
}

//! Resolution and installation of the buildcache accelerator.
//!
//! # Architecture
//!
//! - [`ReleaseSource`] - Trait for discovering the most recent release
//! - [`Downloader`] - Trait for transferring a release archive to disk
//! - [`Extractor`] - Trait for unpacking an archive into a directory
//! - [`resolve_version`] - Turns the `version` input into a [`VersionResolution`]
//! - [`Installer`] - Unpacks, links the compiler aliases and publishes `bin/`
//!
//! Hosting-specific implementations of the traits live in provider crates.
//!
//! # Example
//!
//! ```ignore
//! let request = VersionRequest::parse(&inputs.version);
//! let tag = resolve_version(&request, &releases).await.into_tag()?;
//! let artifact = acquirer.acquire(&tag, ctx.temp_dir()).await?;
//! let layout = Installer::new(&extractor).install(&artifact, &mut ctx).await?;
//! ```

mod install;
mod provider;
mod version;

pub use install::{
    COMPILER_ALIASES, InstallationLayout, Installer, LinkState, ensure_link,
};
pub use provider::{DownloadArtifact, Downloader, Extractor, ReleaseSource, VersionTag};
pub use version::{VersionRequest, VersionResolution, resolve_version};

//! GitLab Releases tool provider for buildcache-setup.
//!
//! buildcache is published on gitlab.com. This crate provides:
//! - [`GitLabReleases`]: latest-release discovery through the GraphQL API
//! - [`ToolAcquirer`]: release archive URL construction and download
//! - [`HttpDownloader`]: a [`Downloader`](bcsetup_core::tools::Downloader) over HTTPS
//! - [`ArchiveExtractor`]: zip and tar.gz unpacking

mod acquire;
mod download;
mod extract;
mod release;

pub use acquire::{ToolAcquirer, release_download_url};
pub use download::HttpDownloader;
pub use extract::ArchiveExtractor;
pub use release::{GRAPHQL_ENDPOINT, GitLabReleases};

/// Host serving the buildcache project.
pub const GITLAB_HOST: &str = "gitlab.com";

/// Full path of the buildcache project on [`GITLAB_HOST`].
pub const PROJECT_PATH: &str = "bits-n-bites/buildcache";

/// Build the HTTP client shared by the provider types.
fn http_client() -> bcsetup_core::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("buildcache-setup/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| bcsetup_core::Error::configuration(format!("Failed to create HTTP client: {e}")))
}

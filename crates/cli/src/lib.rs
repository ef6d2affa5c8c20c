//! buildcache-setup CI step
//!
//! Wires the concrete GitLab release source, HTTP downloader, archive
//! extractor and cache store into the setup [`Pipeline`].

pub mod logging;
pub mod pipeline;
pub mod stats;
pub mod workflow;

pub use pipeline::{Pipeline, PipelineReport};

use bcsetup_cache::actions::DEFAULT_LOOKUP_TIMEOUT;
use bcsetup_cache::{StoreConfig, build_store, detect_compression};
use bcsetup_core::{ActionInputs, JobContext, Result};
use bcsetup_tools_gitlab::{ArchiveExtractor, GitLabReleases, HttpDownloader};
use tracing::debug;

/// Run the setup with the production collaborators.
///
/// # Errors
///
/// Returns the first fatal pipeline error.
pub async fn run(inputs: &ActionInputs, ctx: &mut JobContext) -> Result<PipelineReport> {
    let releases = GitLabReleases::new()?;
    let downloader = HttpDownloader::new()?;
    let extractor = ArchiveExtractor::new();
    let store_config = StoreConfig::from_lookup(|name| ctx.var(name).map(str::to_string))
        .with_compression(detect_compression().await);
    let store = build_store(&store_config, ctx.workspace(), DEFAULT_LOOKUP_TIMEOUT);
    debug!(
        store = store.name(),
        compression = ?store_config.compression,
        "selected cache store"
    );

    Pipeline::new(&releases, &downloader, &extractor, store.as_ref())
        .run(inputs, ctx)
        .await
}

//! Setup pipeline: resolve, acquire, install, restore.
//!
//! Resolution, acquisition and installation failures are fatal and returned
//! to the caller. Everything from the cache export onwards is best effort and
//! only ever logged.

use bcsetup_cache::{ArtifactStore, CacheKeySet, CacheRestorer, RestoreOutcome};
use bcsetup_core::tools::{
    Downloader, Extractor, InstallationLayout, Installer, ReleaseSource, VersionRequest,
    VersionTag, resolve_version,
};
use bcsetup_core::{ActionInputs, JobContext, Platform, Result};
use bcsetup_tools_gitlab::ToolAcquirer;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::{Instrument, info, info_span, warn};

use crate::logging::correlation_id;
use crate::stats::report_stats;

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Installed release
    pub version: VersionTag,
    /// Where the binary and its compiler links live
    pub layout: InstallationLayout,
    /// Object cache directory
    pub cache_dir: PathBuf,
    /// Keys used for the restore
    pub keys: CacheKeySet,
    /// Restore result
    pub restore: RestoreOutcome,
}

/// Sequences the setup stages over injected collaborators.
pub struct Pipeline<'a> {
    releases: &'a dyn ReleaseSource,
    downloader: &'a dyn Downloader,
    extractor: &'a dyn Extractor,
    store: &'a dyn ArtifactStore,
    platform: Platform,
    now: Option<DateTime<Utc>>,
    stats: bool,
}

impl<'a> Pipeline<'a> {
    /// Create a pipeline for the host platform with stats enabled.
    #[must_use]
    pub fn new(
        releases: &'a dyn ReleaseSource,
        downloader: &'a dyn Downloader,
        extractor: &'a dyn Extractor,
        store: &'a dyn ArtifactStore,
    ) -> Self {
        Self {
            releases,
            downloader,
            extractor,
            store,
            platform: Platform::current(),
            now: None,
            stats: true,
        }
    }

    /// Select the release archive for `platform` instead of the host's.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Fix the timestamp used for the unique cache key.
    #[must_use]
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Enable or disable the `buildcache -s` report after restore.
    #[must_use]
    pub fn with_stats(mut self, enabled: bool) -> Self {
        self.stats = enabled;
        self
    }

    /// Run the whole setup for `inputs` against `ctx`.
    ///
    /// # Errors
    ///
    /// Returns an error when no version can be determined, the archive cannot
    /// be downloaded or the installation is unusable. Cache problems never
    /// produce an error.
    pub async fn run(&self, inputs: &ActionInputs, ctx: &mut JobContext) -> Result<PipelineReport> {
        let span = info_span!(
            "setup",
            correlation_id = %correlation_id(),
            platform = %self.platform,
        );
        self.run_stages(inputs, ctx).instrument(span).await
    }

    async fn run_stages(
        &self,
        inputs: &ActionInputs,
        ctx: &mut JobContext,
    ) -> Result<PipelineReport> {
        let request = VersionRequest::parse(&inputs.version);
        let version = resolve_version(&request, self.releases)
            .await
            .into_tag()?;
        info!(%version, "using buildcache version");

        let artifact = ToolAcquirer::new(self.downloader, &self.platform)
            .acquire(&version, ctx.temp_dir())
            .await?;

        let layout = Installer::new(self.extractor)
            .install(&artifact, ctx)
            .await?;

        let cache_dir = inputs.cache_dir(ctx);
        if let Err(e) = ctx.export_var("BUILDCACHE_DIR", &cache_dir.to_string_lossy()) {
            warn!(error = %e, "could not export BUILDCACHE_DIR");
        }

        let keys = CacheKeySet::for_run(
            inputs.cache_key.as_deref(),
            self.now.unwrap_or_else(Utc::now),
        );
        let restore = CacheRestorer::new(self.store)
            .restore(&keys, &cache_dir)
            .await;

        if self.stats {
            report_stats(&layout.binary, ctx).await;
        }

        Ok(PipelineReport {
            version,
            layout,
            cache_dir,
            keys,
            restore,
        })
    }
}

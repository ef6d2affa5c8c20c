//! Deciding which buildcache release to install.

use tracing::{info, warn};

use super::provider::{ReleaseSource, VersionTag};
use crate::{Error, Result};

/// Parsed `version` input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRequest {
    /// Empty or `latest`: ask the release source.
    Latest,
    /// A concrete tag, used as-is.
    Exact(VersionTag),
}

impl VersionRequest {
    /// Parse the raw input. Surrounding whitespace is ignored and `latest`
    /// is matched case-insensitively.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("latest") {
            Self::Latest
        } else {
            Self::Exact(VersionTag::new(trimmed))
        }
    }
}

/// Outcome of version resolution.
///
/// A failed remote query is not an error here; it yields `Unresolved` and
/// the caller decides whether that is fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionResolution {
    /// A concrete release tag
    Resolved(VersionTag),
    /// The remote query failed; no version is known
    Unresolved,
}

impl VersionResolution {
    /// The resolved tag, or [`Error::UnresolvedVersion`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnresolvedVersion`] when resolution failed.
    pub fn into_tag(self) -> Result<VersionTag> {
        match self {
            Self::Resolved(tag) => Ok(tag),
            Self::Unresolved => Err(Error::UnresolvedVersion),
        }
    }
}

/// Resolve the requested version.
///
/// Concrete requests are returned unchanged without touching `source`.
/// For `latest`, the source is queried exactly once; any failure degrades to
/// [`VersionResolution::Unresolved`].
pub async fn resolve_version(
    request: &VersionRequest,
    source: &dyn ReleaseSource,
) -> VersionResolution {
    match request {
        VersionRequest::Exact(tag) => VersionResolution::Resolved(tag.clone()),
        VersionRequest::Latest => match source.latest_tag().await {
            Ok(tag) => {
                info!(source = source.name(), %tag, "got latest version");
                VersionResolution::Resolved(tag)
            }
            Err(e) => {
                warn!(source = source.name(), error = %e, "Could not resolve latest version");
                VersionResolution::Unresolved
            }
        },
    }
}

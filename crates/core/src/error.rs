//! Error types for the fatal stages of the setup pipeline

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Main error type for buildcache-setup operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Neither a concrete version was requested nor could the latest one be found
    #[error("version is undefined: no concrete version requested and the latest release could not be resolved")]
    #[diagnostic(
        code(bcsetup::version::unresolved),
        help("Set the `version` input to a concrete release tag such as `v0.28.9`")
    )]
    UnresolvedVersion,

    /// Querying the release listing failed
    #[error("Release query failed: {message}")]
    #[diagnostic(code(bcsetup::version::query))]
    ReleaseQuery {
        /// What went wrong
        message: String,
    },

    /// Downloading the release archive failed
    #[error("Failed to download {url}: {message}")]
    #[diagnostic(
        code(bcsetup::download),
        help("Check that the release tag exists and ships an archive for this platform")
    )]
    Download {
        /// URL that was requested
        url: String,
        /// What went wrong
        message: String,
    },

    /// Unpacking the release archive failed
    #[error("Failed to extract {}: {message}", archive.display())]
    #[diagnostic(code(bcsetup::extract))]
    Extraction {
        /// Archive being extracted
        archive: Box<Path>,
        /// What went wrong
        message: String,
    },

    /// The unpacked installation does not have the expected layout
    #[error("Installation failed: {message}{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(bcsetup::install),
        help("The release archive layout may have changed; expected `buildcache/bin/buildcache`")
    )]
    Installation {
        /// What went wrong
        message: String,
        /// Path involved, if any
        path: Option<Box<Path>>,
    },

    /// A compiler alias exists but does not point at the installed binary
    #[error("{} already exists and points to {}, expected {}", link.display(), existing.display(), expected.display())]
    #[diagnostic(
        code(bcsetup::install::link_conflict),
        help("Remove the conflicting file or link before running the setup step")
    )]
    LinkConflict {
        /// Alias path
        link: Box<Path>,
        /// Where the alias currently points (or the alias itself for regular files)
        existing: Box<Path>,
        /// Binary it should point to
        expected: Box<Path>,
    },

    /// I/O error with operation context
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(bcsetup::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "read", "write", "create")
        operation: String,
    },

    /// Configuration or environment error
    #[error("Configuration error: {message}")]
    #[diagnostic(code(bcsetup::config))]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },
}

impl Error {
    /// Create a release query error
    #[must_use]
    pub fn release_query(msg: impl Into<String>) -> Self {
        Self::ReleaseQuery {
            message: msg.into(),
        }
    }

    /// Create a download error
    #[must_use]
    pub fn download(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Download {
            url: url.into(),
            message: msg.into(),
        }
    }

    /// Create an extraction error
    #[must_use]
    pub fn extraction(archive: impl AsRef<Path>, msg: impl Into<String>) -> Self {
        Self::Extraction {
            archive: archive.as_ref().into(),
            message: msg.into(),
        }
    }

    /// Create an installation error with path context
    #[must_use]
    pub fn installation(msg: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self::Installation {
            message: msg.into(),
            path: Some(path.as_ref().into()),
        }
    }

    /// Create a link conflict error
    #[must_use]
    pub fn link_conflict(
        link: impl AsRef<Path>,
        existing: impl AsRef<Path>,
        expected: impl AsRef<Path>,
    ) -> Self {
        Self::LinkConflict {
            link: link.as_ref().into(),
            existing: existing.as_ref().into(),
            expected: expected.as_ref().into(),
        }
    }

    /// Create an I/O error with path context
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create an I/O error without path context
    #[must_use]
    pub fn io_no_path(source: std::io::Error, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: None,
            operation: operation.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }
}

/// Result type alias for buildcache-setup operations
pub type Result<T> = std::result::Result<T, Error>;

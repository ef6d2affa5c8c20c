//! Tracing configuration for the setup binary
//!
//! Logs go to stderr so stdout stays free for workflow commands. The output
//! format comes from `BCSETUP_LOG_FORMAT`, the filter from `RUST_LOG`.

use std::io;
pub use tracing::Level;
use tracing::debug;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Crate targets enabled by the default filter.
const TARGETS: [&str; 4] = [
    "bcsetup_cli",
    "bcsetup_core",
    "bcsetup_cache",
    "bcsetup_tools_gitlab",
];

/// Tracing output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingFormat {
    /// Pretty-printed human-readable format
    Pretty,
    /// Compact single-line format, readable in the Actions log viewer
    #[default]
    Compact,
    /// Structured JSON format
    Json,
}

impl std::str::FromStr for TracingFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown tracing format: {s}")),
        }
    }
}

/// Tracing configuration
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Output format
    pub format: TracingFormat,
    /// Level for this tool's own targets when `RUST_LOG` is unset
    pub level: Level,
    /// Explicit filter directive, overriding `RUST_LOG`
    pub filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            format: TracingFormat::default(),
            level: Level::INFO,
            filter: None,
        }
    }
}

impl TracingConfig {
    /// Read the format from `BCSETUP_LOG_FORMAT`; unknown values fall back to
    /// the default. `RUNNER_DEBUG=1` (step debug logging) raises the level.
    #[must_use]
    pub fn from_env() -> Self {
        let format = std::env::var("BCSETUP_LOG_FORMAT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();
        let level = if std::env::var("RUNNER_DEBUG").is_ok_and(|v| v == "1") {
            Level::DEBUG
        } else {
            Level::INFO
        };
        Self {
            format,
            level,
            filter: None,
        }
    }

    /// Default filter directive for this tool's targets at `level`.
    #[must_use]
    pub fn default_directive(&self) -> String {
        let level = self.level.to_string().to_lowercase();
        TARGETS
            .iter()
            .map(|target| format!("{target}={level}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Global correlation ID for tracing request correlation
static CORRELATION_ID: std::sync::OnceLock<Uuid> = std::sync::OnceLock::new();

/// Get or create a correlation ID for the current run
pub fn correlation_id() -> Uuid {
    *CORRELATION_ID.get_or_init(Uuid::new_v4)
}

/// Initialize tracing with the given configuration
///
/// # Errors
///
/// Returns an error for an invalid filter directive or when a global
/// subscriber is already installed.
pub fn init_tracing(config: &TracingConfig) -> miette::Result<()> {
    let env_filter = match &config.filter {
        Some(filter) => EnvFilter::try_new(filter),
        None => EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(config.default_directive())),
    }
    .map_err(|e| miette::miette!("Failed to create tracing filter: {e}"))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format {
        TracingFormat::Pretty => {
            let layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(io::stderr)
                .with_target(true);

            registry.with(layer).try_init()
        }
        TracingFormat::Compact => {
            let layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(io::stderr)
                .with_target(false)
                .without_time();

            registry.with(layer).try_init()
        }
        TracingFormat::Json => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(io::stderr)
                .with_current_span(true)
                .with_span_list(true);

            registry.with(layer).try_init()
        }
    }
    .map_err(|e| miette::miette!("Failed to initialize tracing: {e}"))?;

    debug!(
        correlation_id = %correlation_id(),
        version = env!("CARGO_PKG_VERSION"),
        format = ?config.format,
        "Tracing initialized"
    );

    Ok(())
}

//! `buildcache-setup` entry point.

use bcsetup_cli::logging::{TracingConfig, init_tracing};
use bcsetup_cli::workflow::emit_error;
use bcsetup_core::{ActionInputs, JobContext};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> miette::Result<()> {
    init_tracing(&TracingConfig::from_env())?;

    let inputs = ActionInputs::from_env();
    let mut ctx = JobContext::from_env();

    match bcsetup_cli::run(&inputs, &mut ctx).await {
        Ok(report) => {
            info!(
                version = %report.version,
                cache_hit = report.restore.is_hit(),
                "buildcache setup complete"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "buildcache setup failed");
            if let Err(io) = emit_error(&e.to_string()) {
                warn!(error = %io, "could not write workflow error command");
            }
            Err(e.into())
        }
    }
}

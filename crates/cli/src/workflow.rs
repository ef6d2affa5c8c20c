//! GitHub Actions workflow commands.
//!
//! The runner scans stdout for `::command::message` lines. Messages must have
//! `%`, `\r` and `\n` escaped or the annotation is cut at the first newline.

use std::io::{self, Write};

/// Escape a message for use as workflow command data.
#[must_use]
pub fn escape_data(message: &str) -> String {
    message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Format an `::error::` command for `message`.
#[must_use]
pub fn error_command(message: &str) -> String {
    format!("::error::{}", escape_data(message))
}

/// Write an `::error::` command to stdout, marking the step as failed in the UI.
///
/// # Errors
///
/// Returns an error if stdout cannot be written.
pub fn emit_error(message: &str) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", error_command(message))?;
    stdout.flush()
}

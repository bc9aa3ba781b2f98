//! Tracing subscriber setup shared by the CLI and embedding applications.

use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};

/// Build the log filter: `RUST_LOG` if set, otherwise `default_level` for cogwatch crates.
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,cogwatch_core={default_level},cogwatch={default_level}"
        ))
    })
}

/// Install a global tracing subscriber.
///
/// Logs go to stderr. JSON output is meant for containers and log shippers;
/// the compact format is for terminals. Fails if a global subscriber is
/// already installed.
pub fn init_tracing(default_level: &str, json: bool) -> Result<()> {
    let filter = env_filter(default_level);

    let result = if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .try_init()
    };

    result.map_err(|e| Error::internal(format!("failed to install tracing subscriber: {e}")))
}

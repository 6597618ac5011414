//! Logging setup: `tracing-subscriber` on stderr
//!
//! Filter precedence: `--log-level`, then `RUST_LOG`, then `info`.

use tracing_subscriber::EnvFilter;

use crate::cli::{Error, Result};

const DEFAULT_FILTER: &str = "info";

/// Build the filter without installing anything
pub fn build_filter(level: Option<&str>) -> Result<EnvFilter> {
    match level {
        Some(level) => EnvFilter::try_new(level)
            .map_err(|e| Error::InvalidArgs(format!("invalid log level '{}': {}", level, e))),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
    }
}

/// Install the global subscriber
pub fn init_logging(level: Option<&str>, json: bool) -> Result<()> {
    let filter = build_filter(level)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| Error::InvalidArgs(format!("cannot install logger: {}", e)))
}

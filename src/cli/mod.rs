//! CLI module
//!
//! Provides:
//! - Argument parsing (`run`, `plan`, `fingerprint`, `show-config`)
//! - Logging setup (stderr, text or JSON)
//! - Mode dispatch and exit-code mapping

pub mod args;
pub mod dispatch;
pub mod logging;

// Re-exports
pub use args::{parse_args, Args, Mode, RunArgs};
pub use dispatch::{exit_code_for, render_summary, run_cli_mode, ExitCode};
pub use logging::init_logging;

use foldagent_core::AgentError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),
}

/// Exit codes (deterministic)
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_DEGRADED: i32 = 3;

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, Error>;

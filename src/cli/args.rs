//! CLI argument parsing
//!
//! ```text
//! foldagent [--config FILE] [--json] [--log-level L] [--log-json] <mode>
//!
//! MODES:
//!   run <SEQUENCE>          Run the agent and print the summary
//!   plan <SEQUENCE>         Print the assessment and step plan only
//!   fingerprint <SEQUENCE>  Print the normalized sequence fingerprint
//!   show-config             Print the effective configuration as TOML
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use foldagent_core::AgentConfig;

use crate::cli::{Error, Result};

/// Parsed CLI arguments
#[derive(Debug, Clone, PartialEq, Parser)]
#[command(name = "foldagent", version, about = "Fault-tolerant protein structure prediction agent")]
pub struct Args {
    #[command(subcommand)]
    pub mode: Mode,

    /// TOML configuration file (layered under FOLDAGENT_* environment variables)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Log filter, e.g. "info" or "foldagent_agents=debug"; overrides RUST_LOG
    #[arg(long, global = true, value_name = "FILTER")]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// CLI modes
#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Mode {
    /// Run the full workflow for one sequence
    Run(RunArgs),

    /// Show the workload assessment and plan without executing
    Plan { sequence: String },

    /// Print the BLAKE3 fingerprint of the normalized sequence
    Fingerprint { sequence: String },

    /// Print the effective configuration
    ShowConfig,
}

/// Options for `run`
#[derive(Debug, Clone, PartialEq, clap::Args)]
pub struct RunArgs {
    pub sequence: String,

    /// Folding recycles
    #[arg(long)]
    pub recycles: Option<u32>,

    /// Per-attempt prediction timeout in milliseconds
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Retries per step or provider tier after the first attempt
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Overall request deadline in milliseconds
    #[arg(long, value_name = "MS")]
    pub deadline_ms: Option<u64>,

    /// Skip the remote tier
    #[arg(long)]
    pub offline: bool,
}

impl RunArgs {
    /// Apply command-line overrides on top of loaded configuration
    pub fn apply(&self, config: &mut AgentConfig) {
        if let Some(recycles) = self.recycles {
            config.recycles = recycles;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.prediction_timeout_ms = timeout_ms;
            config.max_prediction_timeout_ms = config.max_prediction_timeout_ms.max(timeout_ms);
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(deadline_ms) = self.deadline_ms {
            config.request_deadline_ms = Some(deadline_ms);
        }
        if self.offline {
            config.remote_enabled = false;
        }
    }
}

/// Parse CLI arguments (program name first)
///
/// `--help` and `--version` surface as errors here; `main` uses clap's own
/// exit handling instead.
pub fn parse_args<I, T>(args: I) -> Result<Args>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Args::try_parse_from(args).map_err(|e| Error::InvalidArgs(e.to_string()))
}

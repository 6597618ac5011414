//! FoldAgent: fault-tolerant protein structure prediction agent
//!
//! The binary is a thin shell over `foldagent-agents`; this library exposes
//! its CLI layer so it can be tested in-process.

pub mod cli;

pub use cli::{parse_args, run_cli_mode, Args, Mode};

//! FoldAgent CLI
//!
//! Logs go to stderr, results to stdout. Ctrl-C cancels the running agent;
//! completed steps are still reported.

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use foldagent::cli::{init_logging, run_cli_mode, Args, EXIT_USAGE};

#[tokio::main]
async fn main() {
    // Usage errors exit with code 2, --help/--version with 0
    let args = Args::parse();

    if let Err(e) = init_logging(args.log_level.as_deref(), args.log_json) {
        eprintln!("Error: {}", e);
        std::process::exit(EXIT_USAGE);
    }

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            trigger.cancel();
        }
    });

    let exit_code = run_cli_mode(args, cancel).await;
    std::process::exit(exit_code);
}

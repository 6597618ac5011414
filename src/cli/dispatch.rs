//! CLI mode dispatch
//!
//! Dispatches to the mode handlers and maps results to exit codes:
//! 0 completed, 3 completed with degradation, 1 failed, 2 usage or
//! configuration error.

use std::fmt::Write as _;
use std::path::Path;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use foldagent_agents::{run_agent, ExecutionSummary, PlanBuilder};
use foldagent_core::{sequence, AgentConfig, AgentError, OverallStatus, StepStatus};

use crate::cli::{
    Args, Error, Mode, Result, RunArgs, EXIT_DEGRADED, EXIT_FAILURE, EXIT_SUCCESS, EXIT_USAGE,
};

/// Exit code wrapper for CLI operations
pub type ExitCode = i32;

/// Run CLI mode and return exit code
pub async fn run_cli_mode(args: Args, cancel: CancellationToken) -> ExitCode {
    match run_mode(args, cancel).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            match e {
                Error::InvalidArgs(_) | Error::Config(_) => EXIT_USAGE,
                _ => EXIT_FAILURE,
            }
        }
    }
}

async fn run_mode(args: Args, cancel: CancellationToken) -> Result<ExitCode> {
    let config_path = args.config.as_deref();
    match args.mode {
        Mode::Run(run) => run_run_mode(config_path, run, args.json, cancel).await,
        Mode::Plan { sequence } => run_plan_mode(config_path, &sequence, args.json),
        Mode::Fingerprint { sequence } => run_fingerprint_mode(&sequence, args.json),
        Mode::ShowConfig => run_show_config_mode(config_path),
    }
}

fn load_config(path: Option<&Path>) -> Result<AgentConfig> {
    AgentConfig::load(path).map_err(|e| Error::Config(format!("{:#}", e)))
}

/// Run mode: execute the agent and print its summary
async fn run_run_mode(
    config_path: Option<&Path>,
    run: RunArgs,
    json_output: bool,
    cancel: CancellationToken,
) -> Result<ExitCode> {
    let mut config = load_config(config_path)?;
    run.apply(&mut config);
    config.validate().map_err(Error::Config)?;
    debug!(?config, "effective configuration");

    let summary = run_agent(&run.sequence, config, None, cancel)
        .await
        .map_err(|e| match e {
            AgentError::Validation(message) => Error::Config(message),
            other => Error::Agent(other),
        })?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", render_summary(&summary));
    }
    Ok(exit_code_for(summary.status))
}

/// Plan mode: Think and Plan only, nothing is executed
fn run_plan_mode(config_path: Option<&Path>, raw: &str, json_output: bool) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let normalized = sequence::normalize(raw);
    let length = normalized.chars().count();
    let assessment = PlanBuilder::assess(length, config.max_sequence_length);
    let plan = PlanBuilder::build(length, &config);

    if json_output {
        let output = json!({
            "fingerprint": sequence::fingerprint(&normalized),
            "length": length,
            "assessment": assessment,
            "steps": plan,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", assessment);
        for (index, step) in plan.iter().enumerate() {
            println!(
                "{}. {:<18} timeout={}ms retries={}{}  {}",
                index + 1,
                step.id.as_str(),
                step.timeout_ms,
                step.max_retries,
                if step.critical { " critical" } else { "" },
                step.description
            );
        }
    }
    Ok(EXIT_SUCCESS)
}

fn run_fingerprint_mode(raw: &str, json_output: bool) -> Result<ExitCode> {
    let normalized = sequence::normalize(raw);
    let fingerprint = sequence::fingerprint(&normalized);
    if json_output {
        let output = json!({
            "sequence": normalized,
            "fingerprint": fingerprint,
            "short": sequence::short_fingerprint(&fingerprint),
        });
        println!("{}", output);
    } else {
        println!("{}", fingerprint);
    }
    Ok(EXIT_SUCCESS)
}

fn run_show_config_mode(config_path: Option<&Path>) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(EXIT_SUCCESS)
}

/// Map overall status to the process exit code
pub fn exit_code_for(status: OverallStatus) -> ExitCode {
    match status {
        OverallStatus::Completed => EXIT_SUCCESS,
        OverallStatus::CompletedDegraded => EXIT_DEGRADED,
        OverallStatus::Failed => EXIT_FAILURE,
    }
}

/// Human-readable summary
pub fn render_summary(summary: &ExecutionSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "prediction {}  fingerprint {}  status {}  ({} ms)",
        summary.prediction_id,
        sequence::short_fingerprint(&summary.fingerprint),
        summary.status,
        summary.total_duration_ms
    );
    for step in &summary.steps {
        let tier = step
            .tier
            .map(|tier| format!(" tier={}", tier))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "  {:<18} {:<10} attempts={} {}ms{}",
            step.step.as_str(),
            step.status.to_string(),
            step.attempts,
            step.duration_ms,
            tier
        );
        if let Some(error) = &step.error {
            let _ = writeln!(out, "    {}: {}", error.kind, error.message);
            for failure in &error.tier_failures {
                let _ = writeln!(
                    out,
                    "      {} ({}) after {} attempt(s): {}",
                    failure.tier, failure.provider, failure.attempts, failure.message
                );
            }
        }
    }
    let skipped = summary
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::Skipped)
        .count();
    if skipped > 0 {
        let _ = writeln!(out, "  {} step(s) skipped", skipped);
    }
    out
}

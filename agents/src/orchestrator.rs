//! Execution agent: Think, Plan, then Act/Observe over the plan
//!
//! Phases: `Planning -> Executing(i) -> Observing(i) -> Executing(i+1) | Halted(i)`,
//! ending in `Completed` or `Failed`. Each plan step runs at most once, so a
//! run makes at most `plan.len()` step executions.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use foldagent_core::{
    sequence, AgentConfig, AgentError, AgentPhase, ArtifactAnalyzer, ErrorKind, PdbAnalyzer,
    PredictionConfig, RunState, StepId, StepOutcome, StepSpec, StepStatus,
};

use crate::executor::StepExecutor;
use crate::plan::PlanBuilder;
use crate::providers::{FoldingModel, LocalModelProvider, RemoteAtlasProvider};
use crate::resolver::{ProviderResolver, ResolverBuilder};
use crate::retry::RetryPolicy;
use crate::steps::{self, Workspace};
use crate::summary::{aggregate, ExecutionSummary};

/// Progress hooks fired around each step
pub trait ProgressCallback: Send + Sync {
    /// Called before step execution begins
    fn on_step_start(&self, spec: &StepSpec);

    /// Called after a step reaches a terminal status
    fn on_step_finished(&self, outcome: &StepOutcome);
}

/// Callback that ignores all progress
pub struct SilentProgress;

impl ProgressCallback for SilentProgress {
    fn on_step_start(&self, _spec: &StepSpec) {}

    fn on_step_finished(&self, _outcome: &StepOutcome) {}
}

/// One agent serves one request at a time; the resolver and analyzer are
/// shared across agents.
pub struct ExecutionAgent {
    config: AgentConfig,
    resolver: Arc<ProviderResolver>,
    analyzer: Arc<dyn ArtifactAnalyzer>,
    executor: StepExecutor,
    progress: Box<dyn ProgressCallback>,
}

impl ExecutionAgent {
    /// Create an agent; rejects invalid configuration before any plan exists
    pub fn new(
        config: AgentConfig,
        resolver: Arc<ProviderResolver>,
        analyzer: Arc<dyn ArtifactAnalyzer>,
    ) -> Result<Self, AgentError> {
        config
            .validate()
            .map_err(|e| AgentError::Validation(format!("Invalid configuration: {}", e)))?;
        let executor = StepExecutor::new(RetryPolicy::from_config(&config));
        Ok(Self {
            config,
            resolver,
            analyzer,
            executor,
            progress: Box::new(SilentProgress),
        })
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run the full workflow for one sequence
    ///
    /// Never returns an error: every failure ends up in the summary. The
    /// caller's token cancels the run; a configured request deadline cancels
    /// it too, without touching the caller's token.
    pub async fn run(&self, raw_sequence: &str, cancel: CancellationToken) -> ExecutionSummary {
        let run_cancel = cancel.child_token();
        let deadline = self.config.request_deadline_ms.map(|ms| {
            let token = run_cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                token.cancel();
            })
        });

        let mut state = RunState::new(raw_sequence);
        self.drive(&mut state, &run_cancel).await;

        if let Some(timer) = deadline {
            timer.abort();
        }
        if run_cancel.is_cancelled() && !cancel.is_cancelled() {
            state.note("request deadline exceeded");
        }

        let summary = aggregate(&state);
        info!(
            fingerprint = sequence::short_fingerprint(state.fingerprint()),
            status = %summary.status,
            duration_ms = summary.total_duration_ms,
            "agent run finished"
        );
        summary
    }

    async fn drive(&self, state: &mut RunState, cancel: &CancellationToken) {
        let fingerprint = sequence::short_fingerprint(state.fingerprint()).to_string();
        let length = state.sequence().chars().count();

        // Think
        let assessment = PlanBuilder::assess(length, self.config.max_sequence_length);
        info!(fingerprint = %fingerprint, length, "{}", assessment);
        state.note(format!("think: {}", assessment));

        // Plan
        if let Err(err) = state.set_plan(PlanBuilder::build(length, &self.config)) {
            error!(fingerprint = %fingerprint, error = %err, "planning failed");
            state.note(format!("plan: {}", err));
            state.set_phase(AgentPhase::Failed);
            return;
        }
        state.note(format!("plan: {} steps", state.plan().len()));

        let mut workspace = Workspace::default();
        while let Some(spec) = state.current_step().cloned() {
            let index = state.cursor();
            state.set_phase(AgentPhase::Executing(index));
            info!(fingerprint = %fingerprint, step = %spec.id, index, "executing step");
            self.progress.on_step_start(&spec);

            let outcome = self.act(&spec, state, &mut workspace, cancel).await;
            self.progress.on_step_finished(&outcome);

            state.set_phase(AgentPhase::Observing(index));
            let halts = outcome.halts(spec.critical);
            let cancelled = outcome
                .error
                .as_ref()
                .is_some_and(|e| e.kind == ErrorKind::Cancelled);
            state.note(observation(&spec, &outcome, halts));

            if let Err(err) = state.record(outcome) {
                error!(fingerprint = %fingerprint, step = %spec.id, error = %err, "outcome rejected");
                state.set_phase(AgentPhase::Failed);
                return;
            }
            state.advance();

            if cancelled {
                warn!(fingerprint = %fingerprint, step = %spec.id, "run cancelled");
                state.set_phase(AgentPhase::Failed);
                return;
            }
            if halts {
                error!(fingerprint = %fingerprint, step = %spec.id, "halting run");
                state.set_phase(AgentPhase::Halted(index));
                state.set_phase(AgentPhase::Failed);
                return;
            }
        }
        state.set_phase(AgentPhase::Completed);
    }

    /// Act: run one step body through the executor and stash its value
    async fn act(
        &self,
        spec: &StepSpec,
        state: &RunState,
        workspace: &mut Workspace,
        cancel: &CancellationToken,
    ) -> StepOutcome {
        let normalized = state.sequence();
        match spec.id {
            StepId::Validate => {
                let max = self.config.max_sequence_length;
                self.executor
                    .execute(spec, cancel, || steps::validate(normalized, max))
                    .await
                    .outcome
            }
            StepId::PredictStructure => {
                let config = PredictionConfig {
                    recycles: spec.recycles.unwrap_or(self.config.recycles),
                    timeout_ms: spec.timeout_ms,
                };
                let executed = self
                    .executor
                    .execute_delegated(
                        spec,
                        cancel,
                        steps::predict(&self.resolver, normalized, &config, cancel),
                    )
                    .await;
                workspace.artifact = executed.value;
                executed.outcome
            }
            StepId::ParseStructure => {
                let analyzer = self.analyzer.as_ref();
                let artifact = workspace.artifact.as_ref();
                let executed = self
                    .executor
                    .execute(spec, cancel, || steps::parse(analyzer, artifact))
                    .await;
                workspace.parsed = executed.value;
                executed.outcome
            }
            StepId::ComputeMetrics => {
                let analyzer = self.analyzer.as_ref();
                let parsed = workspace.parsed.as_ref();
                let artifact = workspace.artifact.as_ref();
                let executed = self
                    .executor
                    .execute(spec, cancel, || {
                        steps::metrics(analyzer, parsed, artifact, normalized)
                    })
                    .await;
                workspace.metrics = executed.value;
                executed.outcome
            }
            StepId::GenerateReport => {
                let workspace = &*workspace;
                self.executor
                    .execute(spec, cancel, || steps::report(state, workspace))
                    .await
                    .outcome
            }
        }
    }
}

fn observation(spec: &StepSpec, outcome: &StepOutcome, halts: bool) -> String {
    let detail = outcome
        .error
        .as_ref()
        .map(|e| format!(" ({})", e.kind))
        .unwrap_or_default();
    let decision = match outcome.status {
        StepStatus::Succeeded => "continue",
        StepStatus::Degraded => "continue degraded",
        _ if halts => "halt",
        _ => "continue without this step",
    };
    format!(
        "observe: {} {}{} -> {}",
        spec.id, outcome.status, detail, decision
    )
}

/// Build the default tier chain from configuration
///
/// The local model tier is always present; without a model handle it reports
/// itself unavailable. The remote tier is added when enabled.
pub fn default_resolver(
    config: &AgentConfig,
    model: Option<Arc<dyn FoldingModel>>,
) -> Result<ProviderResolver, AgentError> {
    let local = match model {
        Some(model) => LocalModelProvider::new(model),
        None => LocalModelProvider::unloaded(),
    };
    let mut builder = ResolverBuilder::from_config(config).primary(Arc::new(local));
    if config.remote_enabled {
        builder = builder.secondary(Arc::new(RemoteAtlasProvider::new(
            config.remote_endpoint.clone(),
        )?));
    }
    Ok(builder.build())
}

/// Convenience entry point: default tiers, default analyzer, one run
pub async fn run_agent(
    raw_sequence: &str,
    config: AgentConfig,
    model: Option<Arc<dyn FoldingModel>>,
    cancel: CancellationToken,
) -> Result<ExecutionSummary, AgentError> {
    let resolver = Arc::new(default_resolver(&config, model)?);
    let agent = ExecutionAgent::new(config, resolver, Arc::new(PdbAnalyzer))?;
    Ok(agent.run(raw_sequence, cancel).await)
}

//! Agent Scenario Tests
//!
//! End-to-end runs of the execution agent against scripted providers.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use foldagent_agents::{
    ExecutionAgent, ExecutionSummary, PlanBuilder, ProgressCallback, ProviderResolver,
    RetryPolicy, SyntheticProvider,
};
use foldagent_core::{
    AgentConfig, AgentError, AgentPhase, ArtifactAnalyzer, ErrorKind, MetricSet, OverallStatus,
    ParsedStructure, PdbAnalyzer, PredictionArtifact, PredictionConfig, PredictionProvider,
    ProviderTier, StepId, StepOutcome, StepSpec, StepStatus,
};

enum Script {
    Transient,
    Confident,
    Hang,
}

struct ScriptedProvider {
    name: &'static str,
    script: Script,
    calls: AtomicU32,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedProvider {
    fn new(name: &'static str, script: Script) -> Arc<Self> {
        Arc::new(Self {
            name,
            script,
            calls: AtomicU32::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PredictionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn predict(
        &self,
        sequence: &str,
        config: &PredictionConfig,
    ) -> Result<PredictionArtifact, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let result = match self.script {
            Script::Transient => Err(AgentError::transient(self.name, "connection refused")),
            Script::Confident => {
                tokio::time::sleep(Duration::from_millis(20)).await;
                let mut artifact = SyntheticProvider::generate(sequence, config.recycles);
                artifact.method = self.name.to_string();
                artifact.confidence = 0.92;
                Ok(artifact)
            }
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
                Err(AgentError::transient(self.name, "never answered"))
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Analyzer whose parse always fails
struct BrokenAnalyzer;

impl ArtifactAnalyzer for BrokenAnalyzer {
    fn parse(&self, _artifact: &PredictionArtifact) -> Result<ParsedStructure, AgentError> {
        Err(AgentError::Analysis("No atoms found in structure".into()))
    }

    fn metrics(
        &self,
        parsed: &ParsedStructure,
        artifact: &PredictionArtifact,
        sequence: &str,
    ) -> Result<MetricSet, AgentError> {
        PdbAnalyzer.metrics(parsed, artifact, sequence)
    }
}

#[derive(Clone, Default)]
struct StepCounter {
    started: Arc<AtomicUsize>,
    finished: Arc<AtomicUsize>,
}

impl ProgressCallback for StepCounter {
    fn on_step_start(&self, _spec: &StepSpec) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_step_finished(&self, _outcome: &StepOutcome) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

fn config() -> AgentConfig {
    AgentConfig {
        max_retries: 2,
        backoff_base_ms: 10,
        backoff_cap_ms: 100,
        jitter_ratio: 0.0,
        prediction_timeout_ms: 5_000,
        max_prediction_timeout_ms: 10_000,
        remote_enabled: false,
        ..AgentConfig::default()
    }
}

fn resolver(
    config: &AgentConfig,
    primary: Arc<ScriptedProvider>,
    secondary: Arc<ScriptedProvider>,
) -> Arc<ProviderResolver> {
    Arc::new(
        ProviderResolver::builder()
            .primary(primary)
            .secondary(secondary)
            .policy(RetryPolicy::from_config(config))
            .min_confidence(config.min_confidence)
            .primary_concurrency(config.primary_concurrency)
            .build(),
    )
}

fn agent(config: AgentConfig, resolver: Arc<ProviderResolver>) -> ExecutionAgent {
    ExecutionAgent::new(config, resolver, Arc::new(PdbAnalyzer)).unwrap()
}

async fn fallback_run(config: &AgentConfig, sequence: &str) -> ExecutionSummary {
    let resolver = resolver(
        config,
        ScriptedProvider::new("local_model", Script::Transient),
        ScriptedProvider::new("remote_atlas", Script::Transient),
    );
    agent(config.clone(), resolver)
        .run(sequence, CancellationToken::new())
        .await
}

fn assert_skipped(summary: &ExecutionSummary, steps: &[StepId]) {
    for step in steps {
        assert_eq!(
            summary.status_of(*step),
            Some(StepStatus::Skipped),
            "{} should be skipped",
            step
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_providers_fall_back_to_synthetic() -> Result<()> {
    let config = config();
    let primary = ScriptedProvider::new("local_model", Script::Transient);
    let secondary = ScriptedProvider::new("remote_atlas", Script::Transient);
    let agent = agent(
        config.clone(),
        resolver(&config, primary.clone(), secondary.clone()),
    );

    let summary = agent.run("MKTV", CancellationToken::new()).await;

    assert_eq!(summary.status, OverallStatus::CompletedDegraded);
    assert_eq!(summary.phase, AgentPhase::Completed);
    assert_eq!(summary.status_of(StepId::Validate), Some(StepStatus::Succeeded));
    assert_eq!(
        summary.status_of(StepId::PredictStructure),
        Some(StepStatus::Degraded)
    );
    assert_eq!(summary.tier(), Some(ProviderTier::Tertiary));
    for step in [
        StepId::ParseStructure,
        StepId::ComputeMetrics,
        StepId::GenerateReport,
    ] {
        assert_eq!(summary.status_of(step), Some(StepStatus::Succeeded));
    }

    // 1 + max_retries attempts per abandoned tier, 1 for the synthetic tier
    assert_eq!(primary.calls(), 3);
    assert_eq!(secondary.calls(), 3);
    let predict = summary.step(StepId::PredictStructure).unwrap();
    assert_eq!(predict.attempts, 7);
    let detail = predict.error.as_ref().unwrap();
    assert_eq!(detail.kind, ErrorKind::ProviderDegraded);
    let abandoned: Vec<_> = detail.tier_failures.iter().map(|f| f.tier).collect();
    assert_eq!(abandoned, vec![ProviderTier::Primary, ProviderTier::Secondary]);

    let expected = SyntheticProvider::generate("MKTV", config.recycles);
    assert_eq!(
        summary.report["predict_structure"]["pdb"].as_str(),
        Some(expected.pdb.as_str())
    );
    assert_eq!(summary.report["compute_metrics"]["total_residues"], 4);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_synthetic_artifact_is_identical_across_runs() -> Result<()> {
    let config = config();
    let first = fallback_run(&config, " mktv\n").await;
    let second = fallback_run(&config, "MKTV").await;

    assert_ne!(first.prediction_id, second.prediction_id);
    assert_eq!(first.fingerprint, second.fingerprint);
    assert_eq!(
        first.report["predict_structure"],
        second.report["predict_structure"]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_primary_success_completes() -> Result<()> {
    let config = config();
    let primary = ScriptedProvider::new("local_model", Script::Confident);
    let secondary = ScriptedProvider::new("remote_atlas", Script::Transient);
    let summary = agent(
        config.clone(),
        resolver(&config, primary.clone(), secondary.clone()),
    )
    .run("MKTVRQERLK", CancellationToken::new())
    .await;

    assert_eq!(summary.status, OverallStatus::Completed);
    assert_eq!(summary.tier(), Some(ProviderTier::Primary));
    assert!(summary.steps.iter().all(|s| s.status == StepStatus::Succeeded));
    assert_eq!(secondary.calls(), 0);
    assert_eq!(summary.report["generate_report"]["method"], "local_model");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_empty_sequence_never_reaches_providers() -> Result<()> {
    let config = config();
    let primary = ScriptedProvider::new("local_model", Script::Confident);
    let secondary = ScriptedProvider::new("remote_atlas", Script::Confident);
    let summary = agent(
        config.clone(),
        resolver(&config, primary.clone(), secondary.clone()),
    )
    .run("", CancellationToken::new())
    .await;

    assert_eq!(summary.status, OverallStatus::Failed);
    assert_eq!(summary.phase, AgentPhase::Failed);
    let validate = summary.step(StepId::Validate).unwrap();
    assert_eq!(validate.status, StepStatus::Failed);
    assert_eq!(validate.error.as_ref().unwrap().kind, ErrorKind::Validation);
    assert_skipped(
        &summary,
        &[
            StepId::PredictStructure,
            StepId::ParseStructure,
            StepId::ComputeMetrics,
            StepId::GenerateReport,
        ],
    );
    assert_eq!(primary.calls(), 0);
    assert_eq!(secondary.calls(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_invalid_residues_halt_the_run() -> Result<()> {
    let config = config();
    let primary = ScriptedProvider::new("local_model", Script::Confident);
    let summary = agent(
        config.clone(),
        resolver(
            &config,
            primary.clone(),
            ScriptedProvider::new("remote_atlas", Script::Confident),
        ),
    )
    .run("MKXTB", CancellationToken::new())
    .await;

    assert_eq!(summary.status, OverallStatus::Failed);
    let message = &summary.step(StepId::Validate).unwrap().error.as_ref().unwrap().message;
    assert!(message.contains("BX"), "message: {}", message);
    assert_eq!(primary.calls(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_overlong_sequence_is_rejected() -> Result<()> {
    let config = config();
    let long = "A".repeat(config.max_sequence_length + 1);
    let summary = agent(
        config.clone(),
        resolver(
            &config,
            ScriptedProvider::new("local_model", Script::Confident),
            ScriptedProvider::new("remote_atlas", Script::Confident),
        ),
    )
    .run(&long, CancellationToken::new())
    .await;

    assert_eq!(summary.status, OverallStatus::Failed);
    assert!(summary.journal[0].contains("exceeds"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_during_prediction() -> Result<()> {
    let config = AgentConfig {
        prediction_timeout_ms: 600_000,
        max_prediction_timeout_ms: 600_000,
        ..config()
    };
    let primary = ScriptedProvider::new("local_model", Script::Hang);
    let agent = agent(
        config.clone(),
        resolver(
            &config,
            primary.clone(),
            ScriptedProvider::new("remote_atlas", Script::Confident),
        ),
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });
    let summary = agent.run("MKTV", cancel).await;

    assert_eq!(summary.status, OverallStatus::Failed);
    assert_eq!(summary.phase, AgentPhase::Failed);
    assert_eq!(summary.status_of(StepId::Validate), Some(StepStatus::Succeeded));
    let predict = summary.step(StepId::PredictStructure).unwrap();
    assert_eq!(predict.status, StepStatus::Failed);
    assert_eq!(predict.error.as_ref().unwrap().kind, ErrorKind::Cancelled);
    assert_skipped(
        &summary,
        &[
            StepId::ParseStructure,
            StepId::ComputeMetrics,
            StepId::GenerateReport,
        ],
    );
    assert_eq!(primary.calls(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_request_deadline_cancels_run() -> Result<()> {
    let config = AgentConfig {
        request_deadline_ms: Some(250),
        prediction_timeout_ms: 600_000,
        max_prediction_timeout_ms: 600_000,
        ..config()
    };
    let agent = agent(
        config.clone(),
        resolver(
            &config,
            ScriptedProvider::new("local_model", Script::Hang),
            ScriptedProvider::new("remote_atlas", Script::Confident),
        ),
    );

    let caller = CancellationToken::new();
    let summary = agent.run("MKTV", caller.clone()).await;

    assert!(!caller.is_cancelled());
    assert_eq!(summary.status, OverallStatus::Failed);
    assert_eq!(
        summary.step(StepId::PredictStructure).unwrap().error.as_ref().unwrap().kind,
        ErrorKind::Cancelled
    );
    assert!(summary
        .journal
        .iter()
        .any(|entry| entry == "request deadline exceeded"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_non_critical_failure_degrades_run() -> Result<()> {
    let config = config();
    let resolver = resolver(
        &config,
        ScriptedProvider::new("local_model", Script::Confident),
        ScriptedProvider::new("remote_atlas", Script::Confident),
    );
    let agent = ExecutionAgent::new(config, resolver, Arc::new(BrokenAnalyzer)).unwrap();
    let summary = agent.run("MKTV", CancellationToken::new()).await;

    assert_eq!(summary.status, OverallStatus::CompletedDegraded);
    assert_eq!(summary.phase, AgentPhase::Completed);
    assert_eq!(
        summary.status_of(StepId::ParseStructure),
        Some(StepStatus::Failed)
    );
    let metrics = summary.step(StepId::ComputeMetrics).unwrap();
    assert_eq!(metrics.status, StepStatus::Failed);
    assert!(metrics
        .error
        .as_ref()
        .unwrap()
        .message
        .contains("Precondition failed"));
    assert_eq!(
        summary.status_of(StepId::GenerateReport),
        Some(StepStatus::Degraded)
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_each_step_runs_at_most_once() -> Result<()> {
    let config = config();
    for sequence in ["MKTV", "", "MKTVB"] {
        let counter = StepCounter::default();
        let agent = agent(
            config.clone(),
            resolver(
                &config,
                ScriptedProvider::new("local_model", Script::Transient),
                ScriptedProvider::new("remote_atlas", Script::Transient),
            ),
        )
        .with_progress(Box::new(counter.clone()));
        let summary = agent.run(sequence, CancellationToken::new()).await;

        let started = counter.started.load(Ordering::SeqCst);
        assert!(started <= summary.steps.len());
        assert_eq!(started, counter.finished.load(Ordering::SeqCst));
        assert_eq!(
            started,
            summary
                .steps
                .iter()
                .filter(|s| s.status != StepStatus::Skipped)
                .count()
        );
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_hanging_providers_respect_the_termination_bound() -> Result<()> {
    let config = config();
    let primary = ScriptedProvider::new("local_model", Script::Hang);
    let secondary = ScriptedProvider::new("remote_atlas", Script::Hang);
    let agent = agent(
        config.clone(),
        resolver(&config, primary.clone(), secondary.clone()),
    );

    let plan = PlanBuilder::build(4, &config);
    let bound_ms: u64 = plan
        .iter()
        .map(|spec| spec.timeout_ms * (1 + u64::from(spec.max_retries)))
        .sum();
    let predict_bound_ms = config.prediction_timeout_ms * (1 + u64::from(config.max_retries));

    let start = tokio::time::Instant::now();
    let summary = agent.run("MKTV", CancellationToken::new()).await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    assert_eq!(summary.status, OverallStatus::CompletedDegraded);
    assert_eq!(summary.tier(), Some(ProviderTier::Tertiary));
    let predict = summary.step(StepId::PredictStructure).unwrap();
    assert!(
        predict.duration_ms <= predict_bound_ms,
        "prediction took {} ms, bound {} ms",
        predict.duration_ms,
        predict_bound_ms
    );
    assert!(predict.duration_ms >= config.prediction_timeout_ms);
    assert!(
        elapsed_ms <= bound_ms + 50,
        "run took {} ms, bound {} ms",
        elapsed_ms,
        bound_ms
    );
    assert_eq!(primary.calls(), 3);
    assert_eq!(secondary.calls(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_agents_share_the_primary_gate() -> Result<()> {
    let config = AgentConfig {
        primary_concurrency: 1,
        ..config()
    };
    let primary = ScriptedProvider::new("local_model", Script::Confident);
    let shared = resolver(
        &config,
        primary.clone(),
        ScriptedProvider::new("remote_atlas", Script::Confident),
    );

    let runs = ["MKTV", "GAVL", "PEPT", "WYFH"].map(|sequence| {
        let agent = agent(config.clone(), shared.clone());
        async move { agent.run(sequence, CancellationToken::new()).await }
    });
    let summaries = futures::future::join_all(runs).await;

    assert!(summaries
        .iter()
        .all(|s| s.status == OverallStatus::Completed));
    assert_eq!(primary.calls(), 4);
    assert_eq!(primary.peak.load(Ordering::SeqCst), 1);
    Ok(())
}

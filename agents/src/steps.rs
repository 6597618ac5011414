//! Step bodies and the per-run workspace they share
//!
//! Each body reads its inputs from the [`Workspace`] filled by earlier steps.
//! A missing upstream value is a precondition failure reported as an
//! [`AgentError::Analysis`], never a panic.

use serde_json::json;
use tokio_util::sync::CancellationToken;

use foldagent_core::{
    sequence, AgentError, ArtifactAnalyzer, ErrorKind, MetricSet, ParsedStructure,
    PredictionArtifact, PredictionConfig, RunState, StepError, StepId,
};

use crate::executor::StepOutput;
use crate::resolver::ProviderResolver;

/// Typed values produced by completed steps of one run
#[derive(Debug, Default)]
pub struct Workspace {
    pub artifact: Option<PredictionArtifact>,
    pub parsed: Option<ParsedStructure>,
    pub metrics: Option<MetricSet>,
}

fn missing(step: StepId, what: &str) -> AgentError {
    AgentError::Analysis(format!(
        "Precondition failed: {} produced no {}",
        step, what
    ))
}

pub async fn validate(
    normalized: &str,
    max_length: usize,
) -> Result<StepOutput<()>, AgentError> {
    sequence::validate(normalized, max_length)?;
    Ok(StepOutput::new(
        (),
        json!({
            "sequence": normalized,
            "length": normalized.chars().count(),
            "valid": true,
            "validation_notes": "Sequence passed all validation checks",
        }),
    ))
}

/// Resolve a prediction through the tier chain
///
/// A prediction served by a fallback tier is a degraded success carrying the
/// abandoned tiers.
pub async fn predict(
    resolver: &ProviderResolver,
    normalized: &str,
    config: &PredictionConfig,
    cancel: &CancellationToken,
) -> Result<StepOutput<PredictionArtifact>, AgentError> {
    let resolution = resolver.resolve(normalized, config, cancel).await?;
    let artifact = resolution.artifact;

    let payload = json!({
        "method": artifact.method,
        "tier": resolution.tier,
        "confidence": artifact.confidence,
        "mean_plddt": artifact.mean_plddt(),
        "plddt": artifact.plddt,
        "recycles": artifact.recycles,
        "prediction_ms": artifact.prediction_ms,
        "pdb": artifact.pdb,
    });

    let mut output = StepOutput::new(artifact, payload);
    output.tier = Some(resolution.tier);
    output.attempts = Some(resolution.attempts);
    if resolution.tier.is_fallback() {
        output = output.degraded(StepError {
            kind: ErrorKind::ProviderDegraded,
            message: format!(
                "Prediction served by {} tier after {} abandoned tier(s)",
                resolution.tier,
                resolution.failures.len()
            ),
            tier_failures: resolution.failures,
        });
    }
    Ok(output)
}

pub async fn parse(
    analyzer: &dyn ArtifactAnalyzer,
    artifact: Option<&PredictionArtifact>,
) -> Result<StepOutput<ParsedStructure>, AgentError> {
    let artifact = artifact.ok_or_else(|| missing(StepId::PredictStructure, "artifact"))?;
    let parsed = analyzer.parse(artifact)?;
    let payload = serde_json::to_value(&parsed)
        .map_err(|e| AgentError::Internal(format!("Cannot serialize structure: {}", e)))?;
    Ok(StepOutput::new(parsed, payload))
}

pub async fn metrics(
    analyzer: &dyn ArtifactAnalyzer,
    parsed: Option<&ParsedStructure>,
    artifact: Option<&PredictionArtifact>,
    normalized: &str,
) -> Result<StepOutput<MetricSet>, AgentError> {
    let parsed = parsed.ok_or_else(|| missing(StepId::ParseStructure, "parsed structure"))?;
    let artifact = artifact.ok_or_else(|| missing(StepId::PredictStructure, "artifact"))?;
    let metrics = analyzer.metrics(parsed, artifact, normalized)?;
    let payload = serde_json::to_value(&metrics)
        .map_err(|e| AgentError::Internal(format!("Cannot serialize metrics: {}", e)))?;
    Ok(StepOutput::new(metrics, payload))
}

/// Assemble the final report from whatever upstream steps produced
///
/// Missing upstream sections make the report degraded rather than failed.
pub async fn report(
    state: &RunState,
    workspace: &Workspace,
) -> Result<StepOutput<()>, AgentError> {
    let mut gaps = Vec::new();
    if workspace.artifact.is_none() {
        gaps.push(StepId::PredictStructure.as_str());
    }
    if workspace.parsed.is_none() {
        gaps.push(StepId::ParseStructure.as_str());
    }
    if workspace.metrics.is_none() {
        gaps.push(StepId::ComputeMetrics.as_str());
    }

    let artifact = workspace.artifact.as_ref();
    let payload = json!({
        "prediction_id": state.prediction_id(),
        "fingerprint": state.fingerprint(),
        "sequence": state.sequence(),
        "sequence_length": state.sequence().chars().count(),
        "method": artifact.map(|a| a.method.as_str()),
        "tier": artifact.map(|a| a.tier),
        "confidence": artifact.map(|a| a.confidence),
        "structure": workspace.parsed,
        "metrics": workspace.metrics,
        "missing_sections": gaps,
    });

    let output = StepOutput::new((), payload);
    if gaps.is_empty() {
        return Ok(output);
    }
    Ok(output.degraded(StepError {
        kind: ErrorKind::Analysis,
        message: format!("Report is missing sections: {}", gaps.join(", ")),
        tier_failures: Vec::new(),
    }))
}

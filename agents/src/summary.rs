//! Result aggregator: folds the outcome log into the final summary

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use foldagent_core::{
    AgentPhase, OverallStatus, ProviderTier, RunState, StepError, StepId, StepStatus,
};

/// Per-step line of the summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSummary {
    pub step: StepId,
    pub description: String,
    pub critical: bool,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<ProviderTier>,
    pub duration_ms: u64,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
}

/// Final result of one agent run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub prediction_id: Uuid,
    pub fingerprint: String,
    pub sequence_length: usize,
    pub status: OverallStatus,
    pub phase: AgentPhase,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_duration_ms: u64,
    /// Sum of executed step durations
    pub steps_duration_ms: u64,
    pub steps: Vec<StepSummary>,
    /// Step payloads keyed by step id
    pub report: BTreeMap<String, serde_json::Value>,
    pub journal: Vec<String>,
}

impl ExecutionSummary {
    pub fn step(&self, id: StepId) -> Option<&StepSummary> {
        self.steps.iter().find(|s| s.step == id)
    }

    pub fn status_of(&self, id: StepId) -> Option<StepStatus> {
        self.step(id).map(|s| s.status)
    }

    /// Tier that served the prediction, if one did
    pub fn tier(&self) -> Option<ProviderTier> {
        self.step(StepId::PredictStructure).and_then(|s| s.tier)
    }
}

/// Build the summary from a run state
///
/// Pure: the end timestamp is the last recorded outcome's, or the start time
/// when nothing ran. Plan steps without an outcome are reported as skipped.
pub fn aggregate(state: &RunState) -> ExecutionSummary {
    let mut steps = Vec::with_capacity(state.plan().len());
    let mut report = BTreeMap::new();
    let mut steps_duration_ms = 0;

    for spec in state.plan() {
        match state.outcome(spec.id) {
            Some(outcome) => {
                steps_duration_ms += outcome.duration_ms;
                if let Some(payload) = &outcome.payload {
                    report.insert(spec.id.to_string(), payload.clone());
                }
                steps.push(StepSummary {
                    step: spec.id,
                    description: spec.description.clone(),
                    critical: spec.critical,
                    status: outcome.status,
                    tier: outcome.tier,
                    duration_ms: outcome.duration_ms,
                    attempts: outcome.attempts,
                    started_at: Some(outcome.started_at),
                    finished_at: Some(outcome.finished_at),
                    error: outcome.error.clone(),
                });
            }
            None => steps.push(StepSummary {
                step: spec.id,
                description: spec.description.clone(),
                critical: spec.critical,
                status: StepStatus::Skipped,
                tier: None,
                duration_ms: 0,
                attempts: 0,
                started_at: None,
                finished_at: None,
                error: None,
            }),
        }
    }

    let started_at = state.started_at();
    let finished_at = state
        .outcomes()
        .iter()
        .map(|o| o.finished_at)
        .max()
        .unwrap_or(started_at)
        .max(started_at);
    let total_duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;

    ExecutionSummary {
        prediction_id: state.prediction_id(),
        fingerprint: state.fingerprint().to_string(),
        sequence_length: state.sequence().chars().count(),
        status: state.overall_status(),
        phase: state.phase(),
        started_at,
        finished_at,
        total_duration_ms,
        steps_duration_ms,
        steps,
        report,
        journal: state.journal().to_vec(),
    }
}

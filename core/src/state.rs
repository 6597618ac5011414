//! Run state: plan, append-only outcome log, cursor
//!
//! One [`RunState`] exists per request. Only the orchestrator mutates it, and
//! only by appending terminal outcomes and advancing the cursor.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifact::ProviderTier;
use crate::errors::{AgentError, StepError};
use crate::sequence;

/// Plan step identifiers, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    Validate,
    PredictStructure,
    ParseStructure,
    ComputeMetrics,
    GenerateReport,
}

impl StepId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::Validate => "validate",
            StepId::PredictStructure => "predict_structure",
            StepId::ParseStructure => "parse_structure",
            StepId::ComputeMetrics => "compute_metrics",
            StepId::GenerateReport => "generate_report",
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One plan entry with its execution parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    pub id: StepId,
    pub description: String,
    /// A failed critical step halts the run
    pub critical: bool,
    /// Per-attempt wall-clock timeout
    pub timeout_ms: u64,
    pub max_retries: u32,
    /// Folding recycles (prediction step only)
    pub recycles: Option<u32>,
}

/// Step status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Degraded,
    Failed,
    /// Never executed because the run halted earlier
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Succeeded | StepStatus::Degraded | StepStatus::Failed
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Succeeded => "succeeded",
            StepStatus::Degraded => "degraded",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

/// Terminal, write-once result of one plan step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: StepId,
    pub status: StepStatus,
    pub payload: Option<serde_json::Value>,
    /// Present iff status is degraded or failed
    pub error: Option<StepError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub attempts: u32,
    /// Tier that satisfied the prediction step
    pub tier: Option<ProviderTier>,
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }

    /// Whether this outcome must stop the run
    pub fn halts(&self, critical: bool) -> bool {
        self.is_failed() && (critical || self.error.as_ref().is_some_and(StepError::is_fatal))
    }

    /// Whether the outcome was served below the ideal path
    pub fn is_degraded(&self) -> bool {
        self.status == StepStatus::Degraded
            || self.status == StepStatus::Failed
            || self.tier.is_some_and(|tier| tier.is_fallback())
    }
}

/// Agent lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "phase", content = "step")]
pub enum AgentPhase {
    Planning,
    Executing(usize),
    Observing(usize),
    Halted(usize),
    Completed,
    Failed,
}

impl AgentPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentPhase::Completed | AgentPhase::Failed)
    }
}

/// Overall run status, derived from the outcome log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Completed,
    CompletedDegraded,
    Failed,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OverallStatus::Completed => "completed",
            OverallStatus::CompletedDegraded => "completed_degraded",
            OverallStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Per-request agent state
#[derive(Debug, Clone)]
pub struct RunState {
    sequence: String,
    fingerprint: String,
    prediction_id: Uuid,
    started_at: DateTime<Utc>,
    plan: Vec<StepSpec>,
    outcomes: Vec<StepOutcome>,
    cursor: usize,
    phase: AgentPhase,
    journal: Vec<String>,
}

impl RunState {
    /// Create state for a raw input sequence; normalization happens here
    pub fn new(raw_sequence: &str) -> Self {
        let sequence = sequence::normalize(raw_sequence);
        let fingerprint = sequence::fingerprint(&sequence);
        Self {
            sequence,
            fingerprint,
            prediction_id: Uuid::new_v4(),
            started_at: Utc::now(),
            plan: Vec::new(),
            outcomes: Vec::new(),
            cursor: 0,
            phase: AgentPhase::Planning,
            journal: Vec::new(),
        }
    }

    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn prediction_id(&self) -> Uuid {
        self.prediction_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn plan(&self) -> &[StepSpec] {
        &self.plan
    }

    /// Outcomes in execution order
    pub fn outcomes(&self) -> &[StepOutcome] {
        &self.outcomes
    }

    pub fn outcome(&self, step: StepId) -> Option<&StepOutcome> {
        self.outcomes.iter().find(|o| o.step == step)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn phase(&self) -> AgentPhase {
        self.phase
    }

    pub fn journal(&self) -> &[String] {
        &self.journal
    }

    pub fn current_step(&self) -> Option<&StepSpec> {
        self.plan.get(self.cursor)
    }

    /// Install the plan; only allowed once, while planning
    pub fn set_plan(&mut self, plan: Vec<StepSpec>) -> Result<(), AgentError> {
        if self.phase != AgentPhase::Planning || !self.plan.is_empty() {
            return Err(AgentError::Internal(
                "Plan can only be set once, during planning".to_string(),
            ));
        }
        self.plan = plan;
        Ok(())
    }

    pub fn set_phase(&mut self, phase: AgentPhase) {
        self.phase = phase;
    }

    pub fn note(&mut self, entry: impl Into<String>) {
        self.journal.push(entry.into());
    }

    /// Append a terminal outcome for the step under the cursor
    ///
    /// Outcomes are write-once: a second outcome for the same step, a
    /// non-terminal status, or an out-of-order step is rejected.
    pub fn record(&mut self, outcome: StepOutcome) -> Result<(), AgentError> {
        if !outcome.status.is_terminal() {
            return Err(AgentError::Internal(format!(
                "Cannot record non-terminal status '{}' for step '{}'",
                outcome.status, outcome.step
            )));
        }
        if self.outcome(outcome.step).is_some() {
            return Err(AgentError::Internal(format!(
                "Outcome for step '{}' already recorded",
                outcome.step
            )));
        }
        match self.current_step() {
            Some(spec) if spec.id == outcome.step => {}
            _ => {
                return Err(AgentError::Internal(format!(
                    "Step '{}' is not the current plan step",
                    outcome.step
                )))
            }
        }
        self.outcomes.push(outcome);
        Ok(())
    }

    /// Move the cursor past the current step
    pub fn advance(&mut self) {
        if self.cursor < self.plan.len() {
            self.cursor += 1;
        }
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.plan.len()
    }

    /// Overall status per the derivation rule
    pub fn overall_status(&self) -> OverallStatus {
        let halted = self.outcomes.iter().any(|outcome| {
            let critical = self
                .plan
                .iter()
                .find(|spec| spec.id == outcome.step)
                .is_some_and(|spec| spec.critical);
            outcome.halts(critical)
        });
        if halted || self.outcomes.len() < self.plan.len() {
            return OverallStatus::Failed;
        }
        if self.outcomes.iter().any(StepOutcome::is_degraded) {
            OverallStatus::CompletedDegraded
        } else {
            OverallStatus::Completed
        }
    }
}

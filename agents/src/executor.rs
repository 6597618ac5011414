//! Step executor: runs one plan step and always returns a StepOutcome

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use foldagent_core::{AgentError, ProviderTier, StepError, StepOutcome, StepSpec, StepStatus};

use crate::retry::{Attempted, RetryPolicy};

/// Successful step body result
#[derive(Debug, Clone)]
pub struct StepOutput<T> {
    /// Typed value handed to downstream steps
    pub value: T,
    /// Report payload, opaque to the orchestrator
    pub payload: serde_json::Value,
    pub tier: Option<ProviderTier>,
    /// Set when the step finished below the ideal path
    pub degradation: Option<StepError>,
    /// Attempts consumed inside the body (delegated steps only)
    pub attempts: Option<u32>,
}

impl<T> StepOutput<T> {
    pub fn new(value: T, payload: serde_json::Value) -> Self {
        Self {
            value,
            payload,
            tier: None,
            degradation: None,
            attempts: None,
        }
    }

    pub fn degraded(mut self, detail: StepError) -> Self {
        self.degradation = Some(detail);
        self
    }
}

/// Outcome plus the typed value when the step produced one
#[derive(Debug)]
pub struct Executed<T> {
    pub outcome: StepOutcome,
    pub value: Option<T>,
}

/// Runs step bodies under timeout, retry and cancellation
#[derive(Debug, Clone, Default)]
pub struct StepExecutor {
    policy: RetryPolicy,
}

impl StepExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute a step with the step's own timeout and retry budget
    pub async fn execute<T, F, Fut>(
        &self,
        spec: &StepSpec,
        cancel: &CancellationToken,
        body: F,
    ) -> Executed<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<StepOutput<T>, AgentError>>,
    {
        let started_at = Utc::now();
        let clock = Instant::now();
        let policy = self.policy.clone().with_max_retries(spec.max_retries);
        let attempted = policy
            .run(
                spec.id.as_str(),
                Duration::from_millis(spec.timeout_ms),
                cancel,
                body,
            )
            .await;
        finish(spec, started_at, clock, attempted)
    }

    /// Execute a step whose body applies its own timeout and retry discipline
    ///
    /// Used for the prediction step, where the resolver bounds every tier.
    /// Cancellation and panics are still contained here.
    pub async fn execute_delegated<T, Fut>(
        &self,
        spec: &StepSpec,
        cancel: &CancellationToken,
        body: Fut,
    ) -> Executed<T>
    where
        Fut: Future<Output = Result<StepOutput<T>, AgentError>>,
    {
        let started_at = Utc::now();
        let clock = Instant::now();
        let result = if cancel.is_cancelled() {
            Err(AgentError::Cancelled(format!(
                "{} interrupted by cancellation",
                spec.id
            )))
        } else {
            match AssertUnwindSafe(body).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(AgentError::Internal(format!("{} panicked", spec.id))),
            }
        };
        let attempts = match &result {
            Ok(output) => output.attempts.unwrap_or(1),
            Err(_) => 1,
        };
        finish(spec, started_at, clock, Attempted { result, attempts })
    }
}

fn finish<T>(
    spec: &StepSpec,
    started_at: chrono::DateTime<Utc>,
    clock: Instant,
    attempted: Attempted<StepOutput<T>>,
) -> Executed<T> {
    let finished_at = Utc::now();
    let duration_ms = clock.elapsed().as_millis() as u64;

    match attempted.result {
        Ok(output) => {
            let status = if output.degradation.is_some() {
                StepStatus::Degraded
            } else {
                StepStatus::Succeeded
            };
            debug!(step = %spec.id, %status, duration_ms, "step finished");
            Executed {
                outcome: StepOutcome {
                    step: spec.id,
                    status,
                    payload: Some(output.payload),
                    error: output.degradation,
                    started_at,
                    finished_at,
                    duration_ms,
                    attempts: attempted.attempts,
                    tier: output.tier,
                },
                value: Some(output.value),
            }
        }
        Err(err) => {
            warn!(
                step = %spec.id,
                class = ?err.class(),
                attempts = attempted.attempts,
                error = %err,
                "step failed"
            );
            Executed {
                outcome: StepOutcome {
                    step: spec.id,
                    status: StepStatus::Failed,
                    payload: None,
                    error: Some(StepError::from(&err)),
                    started_at,
                    finished_at,
                    duration_ms,
                    attempts: attempted.attempts,
                    tier: None,
                },
                value: None,
            }
        }
    }
}

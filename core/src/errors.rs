//! Agent error taxonomy
//!
//! Every failure raised inside a step is one of these variants. The step
//! executor classifies each into an [`ErrorClass`] before deciding whether to
//! retry, fall back to the next provider tier, or stop the run.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::artifact::ProviderTier;

/// Agent errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AgentError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Transient provider error ({provider}): {reason}")]
    TransientProvider { provider: String, reason: String },

    #[error("Provider degraded ({provider}): {reason}")]
    ProviderDegraded { provider: String, reason: String },

    #[error("Analysis failed: {0}")]
    Analysis(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// How the executor treats an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Retried with backoff on the same step or tier
    Retryable,
    /// Not retried; the step fails (or the tier is abandoned)
    NonRetryable,
    /// Not retried; the run halts
    Fatal,
}

/// Serializable error kind, one per [`AgentError`] variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    TransientProvider,
    ProviderDegraded,
    Analysis,
    Cancelled,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::TransientProvider => "transient_provider",
            ErrorKind::ProviderDegraded => "provider_degraded",
            ErrorKind::Analysis => "analysis",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{}", label)
    }
}

impl AgentError {
    pub fn transient(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        AgentError::TransientProvider {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    pub fn degraded(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        AgentError::ProviderDegraded {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::Validation(_) => ErrorKind::Validation,
            AgentError::TransientProvider { .. } => ErrorKind::TransientProvider,
            AgentError::ProviderDegraded { .. } => ErrorKind::ProviderDegraded,
            AgentError::Analysis(_) => ErrorKind::Analysis,
            AgentError::Cancelled(_) => ErrorKind::Cancelled,
            AgentError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Classify into exactly one [`ErrorClass`]
    pub fn class(&self) -> ErrorClass {
        match self {
            AgentError::TransientProvider { .. } => ErrorClass::Retryable,
            AgentError::ProviderDegraded { .. } | AgentError::Analysis(_) => {
                ErrorClass::NonRetryable
            }
            AgentError::Validation(_) | AgentError::Cancelled(_) | AgentError::Internal(_) => {
                ErrorClass::Fatal
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }

    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Fatal
    }
}

/// Error detail attached to a degraded or failed step outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepError {
    pub kind: ErrorKind,
    pub message: String,
    /// Tier failures absorbed by the fallback chain (prediction step only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tier_failures: Vec<TierFailure>,
}

impl StepError {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Validation | ErrorKind::Cancelled | ErrorKind::Internal
        )
    }
}

impl From<&AgentError> for StepError {
    fn from(err: &AgentError) -> Self {
        StepError {
            kind: err.kind(),
            message: err.to_string(),
            tier_failures: Vec::new(),
        }
    }
}

impl From<AgentError> for StepError {
    fn from(err: AgentError) -> Self {
        StepError::from(&err)
    }
}

/// One abandoned provider tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierFailure {
    pub tier: ProviderTier,
    pub provider: String,
    pub kind: ErrorKind,
    pub message: String,
    pub attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_variant_has_one_class() {
        assert_eq!(
            AgentError::transient("esm", "timeout").class(),
            ErrorClass::Retryable
        );
        assert_eq!(
            AgentError::degraded("esm", "low confidence").class(),
            ErrorClass::NonRetryable
        );
        assert_eq!(
            AgentError::Analysis("no atoms".into()).class(),
            ErrorClass::NonRetryable
        );
        assert_eq!(
            AgentError::Validation("empty".into()).class(),
            ErrorClass::Fatal
        );
        assert_eq!(
            AgentError::Cancelled("client gone".into()).class(),
            ErrorClass::Fatal
        );
        assert_eq!(
            AgentError::Internal("bug".into()).class(),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn test_step_error_keeps_kind_and_message() {
        let err = AgentError::Validation("Sequence cannot be empty".into());
        let detail = StepError::from(&err);
        assert_eq!(detail.kind, ErrorKind::Validation);
        assert!(detail.message.contains("Sequence cannot be empty"));
        assert!(detail.is_fatal());
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::TransientProvider).unwrap();
        assert_eq!(json, "\"transient_provider\"");
        assert_eq!(ErrorKind::Cancelled.to_string(), "cancelled");
    }
}

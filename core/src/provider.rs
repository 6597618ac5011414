//! Outbound capabilities consumed by the execution agent

use async_trait::async_trait;

use crate::analysis::{MetricSet, ParsedStructure};
use crate::artifact::{PredictionArtifact, PredictionConfig};
use crate::errors::AgentError;

/// Produce a structural prediction for a sequence, or fail
///
/// Implementations must be safe to call from many agents at once.
#[async_trait]
pub trait PredictionProvider: Send + Sync {
    /// Short stable name used in logs and tier-failure records
    fn name(&self) -> &str;

    async fn predict(
        &self,
        sequence: &str,
        config: &PredictionConfig,
    ) -> Result<PredictionArtifact, AgentError>;
}

/// Parse a prediction artifact and derive metrics from it
pub trait ArtifactAnalyzer: Send + Sync {
    fn parse(&self, artifact: &PredictionArtifact) -> Result<ParsedStructure, AgentError>;

    fn metrics(
        &self,
        parsed: &ParsedStructure,
        artifact: &PredictionArtifact,
        sequence: &str,
    ) -> Result<MetricSet, AgentError>;
}

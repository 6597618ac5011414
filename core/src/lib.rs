//! FoldAgent Core Module
//!
//! Domain types shared by the execution agent and its collaborators: sequence
//! rules and fingerprinting, run state and step outcomes, the error taxonomy,
//! configuration, and the prediction/analysis capabilities.

pub mod analysis;
pub mod artifact;
pub mod config;
pub mod errors;
pub mod provider;
pub mod sequence;
pub mod state;

pub use analysis::{MetricSet, ParsedStructure, PdbAnalyzer};
pub use artifact::{PredictionArtifact, PredictionConfig, ProviderTier};
pub use config::AgentConfig;
pub use errors::{AgentError, ErrorClass, ErrorKind, StepError, TierFailure};
pub use provider::{ArtifactAnalyzer, PredictionProvider};
pub use state::{
    AgentPhase, OverallStatus, RunState, StepId, StepOutcome, StepSpec, StepStatus,
};

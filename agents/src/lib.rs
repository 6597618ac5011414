//! FoldAgent Agents Module
//!
//! The execution agent and everything it drives: plan building, step
//! execution under timeout/retry/cancellation, the tiered provider resolver
//! with its concurrency gate, the concrete prediction providers, and the
//! result aggregator.

pub mod executor;
pub mod orchestrator;
pub mod plan;
pub mod providers;
pub mod resolver;
pub mod retry;
pub mod steps;
pub mod summary;

pub use executor::{Executed, StepExecutor, StepOutput};
pub use orchestrator::{default_resolver, run_agent, ExecutionAgent, ProgressCallback, SilentProgress};
pub use plan::PlanBuilder;
pub use providers::{
    FoldOutput, FoldingModel, LocalModelProvider, RemoteAtlasProvider, SyntheticProvider,
};
pub use resolver::{ProviderResolver, Resolution, ResolverBuilder};
pub use retry::{Attempted, RetryPolicy};
pub use summary::{aggregate, ExecutionSummary, StepSummary};

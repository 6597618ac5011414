//! Primary tier: in-process folding model
//!
//! The model is loaded once by the host process and injected as a shared
//! handle. The resolver's concurrency gate bounds how many requests may hold
//! it at the same time; this provider does no locking of its own.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use foldagent_core::artifact::normalize_plddt;
use foldagent_core::{
    AgentError, PredictionArtifact, PredictionConfig, PredictionProvider, ProviderTier,
};

pub const LOCAL_METHOD: &str = "local_model";

/// Raw output of a folding model
#[derive(Debug, Clone, PartialEq)]
pub struct FoldOutput {
    pub pdb: String,
    /// Per-residue pLDDT, on either 0..1 or 0..100
    pub plddt: Vec<f64>,
}

/// Loaded structure-prediction model
///
/// Implementations report resource exhaustion (out of memory, device busy)
/// as [`AgentError::TransientProvider`].
#[async_trait]
pub trait FoldingModel: Send + Sync {
    fn name(&self) -> &str;

    async fn fold(&self, sequence: &str, recycles: u32) -> Result<FoldOutput, AgentError>;
}

/// Primary provider wrapping an optional model handle
#[derive(Clone, Default)]
pub struct LocalModelProvider {
    model: Option<Arc<dyn FoldingModel>>,
}

impl LocalModelProvider {
    pub fn new(model: Arc<dyn FoldingModel>) -> Self {
        Self { model: Some(model) }
    }

    /// Provider with no model loaded; every call reports it unavailable
    pub fn unloaded() -> Self {
        Self { model: None }
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }
}

#[async_trait]
impl PredictionProvider for LocalModelProvider {
    fn name(&self) -> &str {
        LOCAL_METHOD
    }

    async fn predict(
        &self,
        sequence: &str,
        config: &PredictionConfig,
    ) -> Result<PredictionArtifact, AgentError> {
        // Retrying cannot load a model, so this is not a transient error.
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| AgentError::degraded(LOCAL_METHOD, "model not loaded"))?;

        let started = Instant::now();
        let output = model.fold(sequence, config.recycles).await?;
        if output.pdb.trim().is_empty() {
            return Err(AgentError::degraded(
                LOCAL_METHOD,
                format!("{} returned an empty structure", model.name()),
            ));
        }

        let plddt: Vec<f64> = output.plddt.into_iter().map(normalize_plddt).collect();
        let confidence = if plddt.is_empty() {
            0.0
        } else {
            plddt.iter().sum::<f64>() / plddt.len() as f64
        };
        debug!(model = model.name(), confidence, "local fold finished");

        Ok(PredictionArtifact {
            pdb: output.pdb,
            plddt,
            confidence,
            method: LOCAL_METHOD.to_string(),
            tier: ProviderTier::Primary,
            recycles: config.recycles,
            prediction_ms: started.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedModel;

    #[async_trait]
    impl FoldingModel for FixedModel {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn fold(&self, _sequence: &str, _recycles: u32) -> Result<FoldOutput, AgentError> {
            Ok(FoldOutput {
                pdb: "ATOM".to_string(),
                plddt: vec![90.0, 70.0],
            })
        }
    }

    #[tokio::test]
    async fn test_unloaded_model_is_unavailable() {
        let err = LocalModelProvider::unloaded()
            .predict("MKTV", &PredictionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ProviderDegraded { .. }));
    }

    #[tokio::test]
    async fn test_plddt_is_normalized_into_confidence() {
        let provider = LocalModelProvider::new(Arc::new(FixedModel));
        assert!(provider.is_loaded());
        let artifact = provider
            .predict("MK", &PredictionConfig::default())
            .await
            .unwrap();
        assert_eq!(artifact.plddt, vec![0.9, 0.7]);
        assert!((artifact.confidence - 0.8).abs() < 1e-9);
        assert_eq!(artifact.tier, ProviderTier::Primary);
    }
}

//! Prediction artifacts and provider tiers

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ranked implementations of the prediction capability
///
/// Ordering follows priority: `Primary < Secondary < Tertiary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderTier {
    Primary,
    Secondary,
    Tertiary,
}

impl ProviderTier {
    pub const ALL: [ProviderTier; 3] = [
        ProviderTier::Primary,
        ProviderTier::Secondary,
        ProviderTier::Tertiary,
    ];

    pub fn is_fallback(&self) -> bool {
        *self != ProviderTier::Primary
    }
}

impl fmt::Display for ProviderTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderTier::Primary => write!(f, "primary"),
            ProviderTier::Secondary => write!(f, "secondary"),
            ProviderTier::Tertiary => write!(f, "tertiary"),
        }
    }
}

/// Per-request parameters handed to every provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionConfig {
    /// Folding trunk recycles
    pub recycles: u32,
    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            recycles: 4,
            timeout_ms: 300_000,
        }
    }
}

/// Structural prediction produced by one provider tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionArtifact {
    /// PDB-format coordinates
    pub pdb: String,
    /// Per-residue pLDDT on a 0..1 scale
    pub plddt: Vec<f64>,
    /// Overall confidence on a 0..1 scale
    pub confidence: f64,
    /// Backend label, e.g. "local_model", "remote_atlas", "synthetic"
    pub method: String,
    /// Tier that produced the artifact; stamped by the resolver
    pub tier: ProviderTier,
    pub recycles: u32,
    pub prediction_ms: u64,
}

impl PredictionArtifact {
    /// Mean per-residue pLDDT, falling back to the overall confidence
    pub fn mean_plddt(&self) -> f64 {
        if self.plddt.is_empty() {
            return self.confidence;
        }
        self.plddt.iter().sum::<f64>() / self.plddt.len() as f64
    }
}

/// Normalize a pLDDT value reported either on 0..1 or 0..100
pub fn normalize_plddt(value: f64) -> f64 {
    if value > 1.0 {
        (value / 100.0).clamp(0.0, 1.0)
    } else {
        value.max(0.0)
    }
}

//! Plan builder: the Think and Plan phases
//!
//! The plan always has the same five steps in the same order. Sequence length
//! and configuration only change step parameters.

use foldagent_core::{AgentConfig, StepId, StepSpec};

/// Sequences longer than this get the extended prediction timeout
pub const LONG_SEQUENCE_THRESHOLD: usize = 200;

/// Stateless plan builder
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanBuilder;

impl PlanBuilder {
    /// Build the ordered step plan for a sequence of `sequence_len` residues
    pub fn build(sequence_len: usize, config: &AgentConfig) -> Vec<StepSpec> {
        let local = |id: StepId, description: &str, critical: bool| StepSpec {
            id,
            description: description.to_string(),
            critical,
            timeout_ms: config.step_timeout_ms,
            max_retries: 0,
            recycles: None,
        };

        vec![
            local(
                StepId::Validate,
                "Validate amino acid sequence format and content",
                true,
            ),
            StepSpec {
                id: StepId::PredictStructure,
                description: "Predict protein structure through the provider chain".to_string(),
                critical: true,
                timeout_ms: Self::prediction_timeout_ms(sequence_len, config),
                max_retries: config.max_retries,
                recycles: Some(config.recycles),
            },
            local(
                StepId::ParseStructure,
                "Parse and validate predicted structure",
                false,
            ),
            local(
                StepId::ComputeMetrics,
                "Calculate structural and quality metrics",
                false,
            ),
            local(
                StepId::GenerateReport,
                "Generate analysis report",
                false,
            ),
        ]
    }

    /// Per-attempt prediction timeout: base, +50% for long sequences, capped
    pub fn prediction_timeout_ms(sequence_len: usize, config: &AgentConfig) -> u64 {
        let base = config.prediction_timeout_ms;
        let scaled = if sequence_len > LONG_SEQUENCE_THRESHOLD {
            base.saturating_add(base / 2)
        } else {
            base
        };
        scaled.min(config.max_prediction_timeout_ms)
    }

    /// One-line workload assessment recorded before planning
    pub fn assess(sequence_len: usize, max_length: usize) -> String {
        if sequence_len == 0 {
            "Empty sequence; validation will reject it.".to_string()
        } else if sequence_len > max_length {
            format!(
                "Sequence length {} exceeds the limit of {}; validation will reject it.",
                sequence_len, max_length
            )
        } else if sequence_len > LONG_SEQUENCE_THRESHOLD {
            format!(
                "Long sequence ({} residues). Prediction may take longer and use more memory.",
                sequence_len
            )
        } else {
            format!(
                "Standard sequence length ({} residues). Proceeding with normal workflow.",
                sequence_len
            )
        }
    }
}

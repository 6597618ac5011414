//! Agent configuration
//!
//! Layered as defaults, then an optional TOML/JSON/YAML file, then
//! `FOLDAGENT_*` environment variables. Invalid values are rejected before
//! any plan is built.

use std::path::Path;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::sequence::DEFAULT_MAX_SEQUENCE_LENGTH;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "FOLDAGENT";

/// Default ESM-Atlas-compatible fold endpoint
pub const DEFAULT_REMOTE_ENDPOINT: &str = "https://api.esmatlas.com/foldSequence/v1/pdb/";

/// Execution limits and provider settings for one agent run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Folding trunk recycles
    pub recycles: u32,

    /// Per-attempt timeout for non-prediction steps
    pub step_timeout_ms: u64,

    /// Per-attempt timeout for each prediction tier
    pub prediction_timeout_ms: u64,

    /// Ceiling for the length-scaled prediction timeout
    pub max_prediction_timeout_ms: u64,

    /// Retries after the first attempt, for retryable errors only
    pub max_retries: u32,

    /// Exponential backoff base
    pub backoff_base_ms: u64,

    /// Exponential backoff ceiling
    pub backoff_cap_ms: u64,

    /// Jitter as a fraction of the backoff delay, 0..=1
    pub jitter_ratio: f64,

    /// Confidence below which a primary/secondary result is demoted
    pub min_confidence: f64,

    /// Concurrent callers admitted to the primary provider
    pub primary_concurrency: usize,

    pub max_sequence_length: usize,

    /// Whole-request deadline; cancels the run when reached
    pub request_deadline_ms: Option<u64>,

    /// Whether the remote (secondary) tier is wired in
    pub remote_enabled: bool,

    pub remote_endpoint: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            recycles: 4,
            step_timeout_ms: 30_000,
            prediction_timeout_ms: 300_000,
            max_prediction_timeout_ms: 600_000,
            max_retries: 3,
            backoff_base_ms: 250,
            backoff_cap_ms: 5_000,
            jitter_ratio: 0.2,
            min_confidence: 0.5,
            primary_concurrency: 1,
            max_sequence_length: DEFAULT_MAX_SEQUENCE_LENGTH,
            request_deadline_ms: None,
            remote_enabled: true,
            remote_endpoint: DEFAULT_REMOTE_ENDPOINT.to_string(),
        }
    }
}

impl AgentConfig {
    /// Load configuration: defaults ← optional file ← environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            if !path.exists() {
                return Err(anyhow!("Config file not found: {}", path.display()));
            }
            debug!("Loading agent config from {}", path.display());
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: AgentConfig = settings.try_deserialize()?;
        loaded.validate().map_err(|e| anyhow!(e))?;
        Ok(loaded)
    }

    /// Validate that configuration values are sensible
    ///
    /// Returns Err if any value is out of acceptable range.
    pub fn validate(&self) -> Result<(), String> {
        if self.recycles == 0 || self.recycles > 48 {
            return Err(format!("recycles ({}) must be within 1..=48", self.recycles));
        }
        if self.step_timeout_ms == 0 {
            return Err("step_timeout_ms must be > 0".to_string());
        }
        if self.prediction_timeout_ms == 0 {
            return Err("prediction_timeout_ms must be > 0".to_string());
        }
        if self.max_prediction_timeout_ms < self.prediction_timeout_ms {
            return Err(format!(
                "max_prediction_timeout_ms ({}) is below prediction_timeout_ms ({})",
                self.max_prediction_timeout_ms, self.prediction_timeout_ms
            ));
        }
        if self.max_retries > 10 {
            return Err(format!(
                "max_retries ({}) exceeds recommended maximum (10)",
                self.max_retries
            ));
        }
        if self.backoff_cap_ms < self.backoff_base_ms {
            return Err(format!(
                "backoff_cap_ms ({}) is below backoff_base_ms ({})",
                self.backoff_cap_ms, self.backoff_base_ms
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err(format!("jitter_ratio ({}) must be within 0..=1", self.jitter_ratio));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(format!(
                "min_confidence ({}) must be within 0..=1",
                self.min_confidence
            ));
        }
        if self.primary_concurrency == 0 {
            return Err("primary_concurrency must be > 0".to_string());
        }
        if self.max_sequence_length == 0 {
            return Err("max_sequence_length must be > 0".to_string());
        }
        if self.request_deadline_ms == Some(0) {
            return Err("request_deadline_ms must be > 0 when set".to_string());
        }
        if self.remote_enabled && self.remote_endpoint.trim().is_empty() {
            return Err("remote_endpoint is required when remote_enabled".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        assert!(AgentConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = AgentConfig {
            recycles: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = AgentConfig {
            jitter_ratio: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = AgentConfig {
            primary_concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = AgentConfig {
            backoff_base_ms: 10_000,
            backoff_cap_ms: 100,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = AgentConfig::load(None).unwrap();
        assert_eq!(config.recycles, AgentConfig::default().recycles);
        assert_eq!(config.max_sequence_length, 400);
    }

    #[test]
    fn test_load_from_toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "recycles = 8").unwrap();
        writeln!(file, "min_confidence = 0.7").unwrap();
        writeln!(file, "remote_enabled = false").unwrap();

        let config = AgentConfig::load(Some(&path)).unwrap();
        assert_eq!(config.recycles, 8);
        assert_eq!(config.min_confidence, 0.7);
        assert!(!config.remote_enabled);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let err = AgentConfig::load(Some(Path::new("/nonexistent/agent.toml"))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_load_rejects_invalid_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(&path, "primary_concurrency = 0\n").unwrap();
        assert!(AgentConfig::load(Some(&path)).is_err());
    }
}

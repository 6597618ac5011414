//! Secondary tier: remote fold service over HTTP
//!
//! Talks to an ESM-Atlas-compatible endpoint. The request is form-encoded
//! (`sequence`, `num_recycles`); the response is either a JSON object with a
//! `pdb` field or raw PDB text.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, warn};

use foldagent_core::analysis::ca_b_factors;
use foldagent_core::artifact::normalize_plddt;
use foldagent_core::{
    AgentError, PredictionArtifact, PredictionConfig, PredictionProvider, ProviderTier,
};

pub const REMOTE_METHOD: &str = "remote_atlas";

/// HTTP client for the remote fold service
#[derive(Debug, Clone)]
pub struct RemoteAtlasProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteAtlasProvider {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("foldagent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AgentError::Internal(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl PredictionProvider for RemoteAtlasProvider {
    fn name(&self) -> &str {
        REMOTE_METHOD
    }

    async fn predict(
        &self,
        sequence: &str,
        config: &PredictionConfig,
    ) -> Result<PredictionArtifact, AgentError> {
        let started = Instant::now();
        let recycles = config.recycles.to_string();
        debug!(endpoint = %self.endpoint, "posting fold request");

        let response = self
            .client
            .post(&self.endpoint)
            .form(&[("sequence", sequence), ("num_recycles", recycles.as_str())])
            .timeout(Duration::from_millis(config.timeout_ms))
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if let Some(err) = classify_status(status) {
            let detail = response.text().await.unwrap_or_default();
            warn!(%status, detail = %truncate(&detail, 200), "remote fold rejected");
            return Err(err);
        }

        let body = response.text().await.map_err(classify_transport_error)?;
        let pdb = extract_pdb(&body).ok_or_else(|| {
            AgentError::degraded(REMOTE_METHOD, "No PDB content in response")
        })?;

        let plddt: Vec<f64> = ca_b_factors(&pdb).into_iter().map(normalize_plddt).collect();
        let confidence = if plddt.is_empty() {
            0.0
        } else {
            plddt.iter().sum::<f64>() / plddt.len() as f64
        };

        Ok(PredictionArtifact {
            pdb,
            plddt,
            confidence,
            method: REMOTE_METHOD.to_string(),
            tier: ProviderTier::Secondary,
            recycles: config.recycles,
            prediction_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Map an HTTP status to a provider error; `None` means success
pub fn classify_status(status: StatusCode) -> Option<AgentError> {
    if status.is_success() {
        return None;
    }
    let reason = format!("HTTP {}", status);
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        Some(AgentError::transient(REMOTE_METHOD, reason))
    } else {
        Some(AgentError::degraded(REMOTE_METHOD, reason))
    }
}

fn classify_transport_error(err: reqwest::Error) -> AgentError {
    if err.is_builder() {
        AgentError::degraded(REMOTE_METHOD, format!("invalid request: {}", err))
    } else if err.is_timeout() {
        AgentError::transient(REMOTE_METHOD, "request timed out")
    } else {
        AgentError::transient(REMOTE_METHOD, format!("request failed: {}", err))
    }
}

/// Pull PDB text out of a JSON `{ "pdb": ... }` body or a raw PDB body
pub fn extract_pdb(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(trimmed).ok()?;
        let pdb = value.get("pdb")?.as_str()?.trim();
        return if pdb.is_empty() {
            None
        } else {
            Some(pdb.to_string())
        };
    }
    let looks_like_pdb = trimmed
        .lines()
        .any(|line| line.starts_with("ATOM") || line.starts_with("HETATM"));
    looks_like_pdb.then(|| trimmed.to_string())
}

fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

//! Provider resolver: tiered fallback chain with a concurrency gate
//!
//! Tiers are tried strictly in priority order. Each tier call runs under the
//! shared [`RetryPolicy`]; a tier is abandoned when its retry budget runs out
//! or it raises a non-retryable error, and the next tier is tried. Only
//! cancellation stops resolution early. The tertiary tier is the synthetic
//! generator and always succeeds.
//!
//! Primary and secondary share one budget of `timeout * (1 + max_retries)`,
//! so a hanging chain costs no more than a single retried step.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use foldagent_core::{
    AgentConfig, AgentError, PredictionArtifact, PredictionConfig, PredictionProvider,
    ProviderTier, TierFailure,
};

use crate::providers::SyntheticProvider;
use crate::retry::RetryPolicy;

/// Successful resolution
#[derive(Debug, Clone)]
pub struct Resolution {
    pub artifact: PredictionArtifact,
    pub tier: ProviderTier,
    /// Tiers abandoned before `tier` succeeded, in order
    pub failures: Vec<TierFailure>,
    /// Attempts summed across all tiers
    pub attempts: u32,
}

impl Resolution {
    pub fn is_fallback(&self) -> bool {
        self.tier.is_fallback()
    }
}

/// Shared, stateless resolver
///
/// Safe to share across concurrent agents behind an `Arc`; the only shared
/// mutable resource is the primary tier's semaphore.
pub struct ProviderResolver {
    tiers: Vec<(ProviderTier, Arc<dyn PredictionProvider>)>,
    gate: Arc<Semaphore>,
    policy: RetryPolicy,
    min_confidence: f64,
}

impl std::fmt::Debug for ProviderResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderResolver")
            .field(
                "tiers",
                &self
                    .tiers
                    .iter()
                    .map(|(tier, provider)| format!("{}:{}", tier, provider.name()))
                    .collect::<Vec<_>>(),
            )
            .field("gate_permits", &self.gate.available_permits())
            .field("policy", &self.policy)
            .field("min_confidence", &self.min_confidence)
            .finish()
    }
}

impl ProviderResolver {
    pub fn builder() -> ResolverBuilder {
        ResolverBuilder::default()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    /// Free permits on the primary tier's gate
    pub fn available_permits(&self) -> usize {
        self.gate.available_permits()
    }

    /// Tiers configured, in the order they are tried
    pub fn tiers(&self) -> Vec<(ProviderTier, String)> {
        self.tiers
            .iter()
            .map(|(tier, provider)| (*tier, provider.name().to_string()))
            .collect()
    }

    /// Wall-clock budget shared by the primary and secondary tiers
    ///
    /// `timeout_ms * (1 + max_retries)`: the same bound a single retried
    /// step gets. Backoff sleeps and every non-synthetic attempt fit inside it.
    pub fn budget(&self, config: &PredictionConfig) -> Duration {
        Duration::from_millis(
            config
                .timeout_ms
                .saturating_mul(1 + u64::from(self.policy.max_retries)),
        )
    }

    /// Resolve a prediction for `sequence`, walking the tier chain
    pub async fn resolve(
        &self,
        sequence: &str,
        config: &PredictionConfig,
        cancel: &CancellationToken,
    ) -> Result<Resolution, AgentError> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let deadline = Instant::now() + self.budget(config);
        let mut failures = Vec::new();
        let mut total_attempts = 0;

        for (tier, provider) in &self.tiers {
            let tier = *tier;
            let name = provider.name();
            debug!(%tier, provider = name, "trying provider tier");

            // The synthetic tier is not charged against the shared budget.
            let tier_deadline = (tier != ProviderTier::Tertiary).then_some(deadline);
            let attempted = self
                .policy
                .run_until(name, timeout, tier_deadline, cancel, || {
                    self.call(tier, provider.as_ref(), sequence, config)
                })
                .await;
            total_attempts += attempted.attempts;

            match attempted.result {
                Ok(mut artifact) => {
                    artifact.tier = tier;
                    if tier.is_fallback() {
                        info!(%tier, provider = name, abandoned = failures.len(), "prediction served by fallback tier");
                    }
                    return Ok(Resolution {
                        artifact,
                        tier,
                        failures,
                        attempts: total_attempts,
                    });
                }
                Err(err @ AgentError::Cancelled(_)) => return Err(err),
                Err(err) => {
                    warn!(
                        %tier,
                        provider = name,
                        attempts = attempted.attempts,
                        error = %err,
                        "abandoning provider tier"
                    );
                    failures.push(TierFailure {
                        tier,
                        provider: name.to_string(),
                        kind: err.kind(),
                        message: err.to_string(),
                        attempts: attempted.attempts,
                    });
                }
            }
        }

        let summary = failures
            .iter()
            .map(|f| format!("{}: {}", f.tier, f.message))
            .collect::<Vec<_>>()
            .join("; ");
        Err(AgentError::Internal(format!(
            "All provider tiers failed ({})",
            summary
        )))
    }

    async fn call(
        &self,
        tier: ProviderTier,
        provider: &dyn PredictionProvider,
        sequence: &str,
        config: &PredictionConfig,
    ) -> Result<PredictionArtifact, AgentError> {
        // Queue time counts against the attempt timeout.
        let _permit = if tier == ProviderTier::Primary {
            Some(
                self.gate
                    .acquire()
                    .await
                    .map_err(|_| AgentError::Internal("primary gate closed".to_string()))?,
            )
        } else {
            None
        };

        let artifact = provider.predict(sequence, config).await?;
        if tier != ProviderTier::Tertiary && artifact.confidence < self.min_confidence {
            return Err(AgentError::degraded(
                provider.name(),
                format!(
                    "confidence {:.3} below threshold {:.3}",
                    artifact.confidence, self.min_confidence
                ),
            ));
        }
        Ok(artifact)
    }
}

/// Builder for [`ProviderResolver`]
pub struct ResolverBuilder {
    primary: Option<Arc<dyn PredictionProvider>>,
    secondary: Option<Arc<dyn PredictionProvider>>,
    tertiary: Arc<dyn PredictionProvider>,
    policy: RetryPolicy,
    min_confidence: f64,
    primary_concurrency: usize,
}

impl Default for ResolverBuilder {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}

impl ResolverBuilder {
    /// Retry policy, quality threshold and gate capacity from config
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            primary: None,
            secondary: None,
            tertiary: Arc::new(SyntheticProvider::new()),
            policy: RetryPolicy::from_config(config),
            min_confidence: config.min_confidence,
            primary_concurrency: config.primary_concurrency,
        }
    }

    pub fn primary(mut self, provider: Arc<dyn PredictionProvider>) -> Self {
        self.primary = Some(provider);
        self
    }

    pub fn secondary(mut self, provider: Arc<dyn PredictionProvider>) -> Self {
        self.secondary = Some(provider);
        self
    }

    /// Replace the synthetic generator (tests only need this)
    pub fn tertiary(mut self, provider: Arc<dyn PredictionProvider>) -> Self {
        self.tertiary = provider;
        self
    }

    pub fn policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn primary_concurrency(mut self, permits: usize) -> Self {
        self.primary_concurrency = permits;
        self
    }

    pub fn build(self) -> ProviderResolver {
        let mut tiers = Vec::with_capacity(3);
        if let Some(primary) = self.primary {
            tiers.push((ProviderTier::Primary, primary));
        }
        if let Some(secondary) = self.secondary {
            tiers.push((ProviderTier::Secondary, secondary));
        }
        tiers.push((ProviderTier::Tertiary, self.tertiary));

        ProviderResolver {
            tiers,
            gate: Arc::new(Semaphore::new(self.primary_concurrency.max(1))),
            policy: self.policy,
            min_confidence: self.min_confidence,
        }
    }
}

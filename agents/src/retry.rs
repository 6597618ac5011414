//! Retry discipline: per-attempt timeout, exponential backoff with jitter
//!
//! Used by the step executor for ordinary steps and by the provider resolver
//! for each tier. Only [`ErrorClass::Retryable`](foldagent_core::ErrorClass)
//! errors are retried; everything else returns after the first attempt.
//! Cancellation is observed while an attempt runs and while backing off.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use rand::Rng;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use foldagent_core::{AgentConfig, AgentError};

/// Bounded retry policy
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay = min(cap, base * 2^attempt) + jitter
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    /// Jitter ratio in [0.0, 1.0]
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}

/// Result of a disciplined call plus how many attempts it took
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, AgentError>,
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_base_ms: config.backoff_base_ms,
            backoff_cap_ms: config.backoff_cap_ms,
            jitter_ratio: config.jitter_ratio,
        }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Upper bound on the delay after `attempt` failures (jitter included)
    pub fn max_delay_ms(&self, attempt: u32) -> u64 {
        let capped = self.capped_delay_ms(attempt);
        capped + (capped as f64 * self.jitter_ratio) as u64
    }

    /// Delay before the next attempt; `attempt` is the 0-based failure count
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let capped = self.capped_delay_ms(attempt);
        if self.jitter_ratio <= 0.0 || capped == 0 {
            return capped;
        }
        let factor: f64 = rand::thread_rng().gen_range(0.0..=self.jitter_ratio);
        capped + (capped as f64 * factor) as u64
    }

    fn capped_delay_ms(&self, attempt: u32) -> u64 {
        let exp = self
            .backoff_base_ms
            .saturating_mul(2_u64.saturating_pow(attempt));
        exp.min(self.backoff_cap_ms)
    }

    /// Run `op` under the timeout and retry discipline
    ///
    /// Each attempt is bounded by `timeout`; an elapsed timeout is a transient
    /// provider error attributed to `label`. A panicking attempt becomes an
    /// internal error. At most `1 + max_retries` attempts are made.
    pub async fn run<T, F, Fut>(
        &self,
        label: &str,
        timeout: Duration,
        cancel: &CancellationToken,
        op: F,
    ) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AgentError>>,
    {
        self.run_until(label, timeout, None, cancel, op).await
    }

    /// [`run`](Self::run) with an absolute deadline shared by all attempts
    ///
    /// Attempt timeouts are clipped to the deadline, and no backoff sleep
    /// extends past it. Once the deadline is reached the last error is
    /// returned; if no attempt could start, the error is a transient
    /// "budget exhausted" failure with zero attempts.
    pub async fn run_until<T, F, Fut>(
        &self,
        label: &str,
        timeout: Duration,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AgentError>>,
    {
        let mut attempts = 0;
        loop {
            if cancel.is_cancelled() {
                return Attempted {
                    result: Err(cancelled(label)),
                    attempts,
                };
            }
            let timeout = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Attempted {
                            result: Err(budget_exhausted(label)),
                            attempts,
                        };
                    }
                    timeout.min(remaining)
                }
                None => timeout,
            };
            attempts += 1;
            debug!(label, attempt = attempts, "attempt started");

            let guarded = AssertUnwindSafe(op()).catch_unwind();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(cancelled(label)),
                outcome = tokio::time::timeout(timeout, guarded) => match outcome {
                    Ok(Ok(result)) => result,
                    Ok(Err(_)) => Err(AgentError::Internal(format!("{} panicked", label))),
                    Err(_) => Err(AgentError::transient(
                        label,
                        format!("timed out after {} ms", timeout.as_millis()),
                    )),
                },
            };

            let err = match result {
                Ok(value) => {
                    return Attempted {
                        result: Ok(value),
                        attempts,
                    }
                }
                Err(err) => err,
            };

            if !err.is_retryable() || attempts > self.max_retries {
                return Attempted {
                    result: Err(err),
                    attempts,
                };
            }

            let delay = self.delay_ms(attempts - 1);
            if let Some(deadline) = deadline {
                if Instant::now() + Duration::from_millis(delay) >= deadline {
                    debug!(label, attempt = attempts, "deadline reached, not retrying");
                    return Attempted {
                        result: Err(err),
                        attempts,
                    };
                }
            }
            warn!(
                label,
                attempt = attempts,
                delay_ms = delay,
                error = %err,
                "retryable failure, backing off"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Attempted {
                        result: Err(cancelled(label)),
                        attempts,
                    };
                }
                _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
            }
        }
    }
}

fn budget_exhausted(label: &str) -> AgentError {
    AgentError::transient(label, "budget exhausted before the attempt could start")
}

fn cancelled(label: &str) -> AgentError {
    AgentError::Cancelled(format!("{} interrupted by cancellation", label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff_base_ms: 100,
            backoff_cap_ms: 1_000,
            jitter_ratio: 0.0,
        }
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let p = policy(5);
        assert_eq!(p.delay_ms(0), 100);
        assert_eq!(p.delay_ms(1), 200);
        assert_eq!(p.delay_ms(2), 400);
        assert_eq!(p.delay_ms(4), 1_000);
        assert_eq!(p.delay_ms(40), 1_000);
    }

    #[test]
    fn test_jitter_stays_within_ratio() {
        let p = RetryPolicy {
            jitter_ratio: 0.5,
            ..policy(3)
        };
        for _ in 0..50 {
            let d = p.delay_ms(1);
            assert!((200..=300).contains(&d), "delay {} out of range", d);
        }
        assert_eq!(p.max_delay_ms(1), 300);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let attempted = policy(3)
            .run("flaky", Duration::from_secs(1), &cancel, || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(AgentError::transient("flaky", "busy"))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(attempted.result.unwrap(), 3);
        assert_eq!(attempted.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_is_bounded() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let attempted: Attempted<()> = policy(2)
            .run("down", Duration::from_secs(1), &cancel, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AgentError::transient("down", "connection refused"))
            })
            .await;
        assert!(matches!(
            attempted.result,
            Err(AgentError::TransientProvider { .. })
        ));
        assert_eq!(attempted.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_returns_after_one_attempt() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let attempted: Attempted<()> = policy(5)
            .run("validate", Duration::from_secs(1), &cancel, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AgentError::Validation("bad".into()))
            })
            .await;
        assert!(matches!(attempted.result, Err(AgentError::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_transient() {
        let cancel = CancellationToken::new();
        let attempted: Attempted<()> = policy(1)
            .run("slow", Duration::from_millis(50), &cancel, || async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;
        match attempted.result {
            Err(AgentError::TransientProvider { provider, reason }) => {
                assert_eq!(provider, "slow");
                assert!(reason.contains("timed out"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(attempted.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_attempt() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let attempted: Attempted<()> = policy(3)
            .run("long", Duration::from_secs(60), &cancel, || async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await;
        assert!(matches!(attempted.result, Err(AgentError::Cancelled(_))));
        assert_eq!(attempted.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_clips_attempts_and_backoff() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let start = Instant::now();
        let deadline = start + Duration::from_millis(2_500);
        let attempted: Attempted<()> = policy(5)
            .run_until(
                "hang",
                Duration::from_secs(1),
                Some(deadline),
                &cancel,
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(3_600)).await;
                    Ok(())
                },
            )
            .await;
        assert!(matches!(
            attempted.result,
            Err(AgentError::TransientProvider { .. })
        ));
        assert!(start.elapsed() <= Duration::from_millis(2_500));
        assert_eq!(attempted.attempts, calls.load(Ordering::SeqCst));
        assert!(attempted.attempts >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_deadline_makes_no_attempt() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let attempted: Attempted<()> = policy(3)
            .run_until(
                "late",
                Duration::from_secs(1),
                Some(Instant::now()),
                &cancel,
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
            )
            .await;
        match attempted.result {
            Err(AgentError::TransientProvider { reason, .. }) => {
                assert!(reason.contains("budget exhausted"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(attempted.attempts, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_panic_becomes_internal_error() {
        let cancel = CancellationToken::new();
        let attempted: Attempted<()> = policy(3)
            .run("boom", Duration::from_secs(1), &cancel, || async {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                panic!("exploded")
            })
            .await;
        assert!(matches!(attempted.result, Err(AgentError::Internal(_))));
        assert_eq!(attempted.attempts, 1);
    }
}

//! Exponential backoff around fallible remote calls.
//!
//! Every external call the workflow makes goes through
//! [`execute_with_retry`]. Transient failures (see
//! [`ContentForgeError::is_transient`]) are retried after
//! `base_delay * 2^(attempt-1)`; anything else is returned at once.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use contentforge_shared::{ContentForgeError, Result, RetryConfig};

/// Attempt budget and pacing for one external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries, first attempt included. Zero is rejected.
    pub max_attempts: u32,
    /// Wait before the first retry.
    pub base_delay: Duration,
    /// Bound on a single attempt; elapsed attempts count as transient.
    pub call_timeout: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            call_timeout: None,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.base_delay(),
            call_timeout: config.call_timeout(),
        }
    }
}

/// Delay to wait after failed attempt number `attempt` (1-based).
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exponent)
}

/// Run `operation` until it succeeds, fails permanently, or the policy's
/// attempt budget is spent.
///
/// `label` names the call in logs and in the `RetryExhausted` error.
pub async fn execute_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if policy.max_attempts == 0 {
        return Err(ContentForgeError::config(format!(
            "{label}: max_attempts must be at least 1"
        )));
    }

    let mut attempt = 0;
    loop {
        attempt += 1;
        debug!(label, attempt, max_attempts = policy.max_attempts, "attempting call");

        let outcome = match policy.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, operation()).await {
                Ok(result) => result,
                Err(_) => Err(ContentForgeError::Timeout {
                    label: label.to_string(),
                    secs: limit.as_secs_f64(),
                }),
            },
            None => operation().await,
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_transient() {
            debug!(label, attempt, error = %err, "permanent failure, not retrying");
            return Err(err);
        }

        if attempt >= policy.max_attempts {
            warn!(label, attempts = attempt, error = %err, "retries exhausted");
            return Err(ContentForgeError::RetryExhausted {
                label: label.to_string(),
                attempts: attempt,
                last: Box::new(err),
            });
        }

        let delay = backoff_delay(policy.base_delay, attempt);
        warn!(
            label,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "transient failure, backing off"
        );
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

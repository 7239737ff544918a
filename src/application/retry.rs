//! Retry with exponential backoff for upstream pricing calls.
//!
//! `RATE_LIMITED` and `TRANSIENT` failures are retried; `PERMANENT` ones are
//! returned immediately. The delay before retry `n` is
//! `min(base * 2^(n-1) * (1 + jitter * u), max_delay)` with `u` drawn from
//! `[0, 1)`. With `jitter <= 1` successive delays never decrease.

use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::domain::error::{DomainError, FailureClass, UpstreamError};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// `max_attempts` counts the first call.
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        jitter: f64,
    ) -> Result<Self, DomainError> {
        if max_attempts == 0 {
            return Err(DomainError::Config("retry max_attempts must be at least 1".into()));
        }
        if base_delay > max_delay {
            return Err(DomainError::Config(format!(
                "retry base delay {base_delay:?} exceeds max delay {max_delay:?}"
            )));
        }
        if !(0.0..=1.0).contains(&jitter) {
            return Err(DomainError::Config(format!(
                "retry jitter must be between 0.0 and 1.0, got {jitter}"
            )));
        }
        Ok(Self {
            max_attempts,
            base_delay,
            max_delay,
            jitter,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `retry` (1-based), without jitter.
    pub fn base_backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delay before retry number `retry` for a jitter sample in `[0, 1)`.
    pub fn backoff_with_sample(&self, retry: u32, sample: f64) -> Duration {
        let sample = sample.clamp(0.0, 1.0);
        self.base_backoff(retry)
            .mul_f64(1.0 + self.jitter * sample)
            .min(self.max_delay)
    }

    pub fn backoff(&self, retry: u32) -> Duration {
        self.backoff_with_sample(retry, rand::random::<f64>())
    }
}

/// One failed attempt that was followed by a retry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetryAttempt {
    pub attempt: u32,
    pub class: FailureClass,
    pub message: String,
    pub delay_ms: u64,
}

#[derive(Debug)]
pub struct Retried<T> {
    pub value: T,
    pub retries: Vec<RetryAttempt>,
}

#[derive(Debug)]
pub struct RetryFailure {
    pub error: UpstreamError,
    pub retries: Vec<RetryAttempt>,
    /// True when the attempt budget ran out, false for a permanent failure.
    pub exhausted: bool,
}

impl RetryFailure {
    pub fn attempts(&self) -> usize {
        self.retries.len() + 1
    }
}

/// Run `op` until it succeeds, fails permanently, or the attempt budget is
/// spent. Sleeps between attempts are the only suspension points added here.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<Retried<T>, RetryFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, UpstreamError>>,
{
    let mut retries = Vec::new();
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(Retried { value, retries }),
            Err(error) => {
                let class = error.class();
                if !class.is_retryable() {
                    return Err(RetryFailure {
                        error,
                        retries,
                        exhausted: false,
                    });
                }
                if attempt >= policy.max_attempts {
                    return Err(RetryFailure {
                        error,
                        retries,
                        exhausted: true,
                    });
                }
                let delay = policy.backoff(attempt);
                warn!(
                    operation,
                    attempt,
                    class = %class,
                    delay_ms = delay.as_millis() as u64,
                    "upstream call failed, backing off: {}",
                    error.message()
                );
                retries.push(RetryAttempt {
                    attempt,
                    class,
                    message: error.message().to_string(),
                    delay_ms: delay.as_millis() as u64,
                });
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

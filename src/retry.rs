//! Retry with exponential backoff.
//!
//! Transient failures climb the backoff ladder (`base_delay`,
//! `base_delay * multiplier`, ... capped at `max_delay`) until
//! `max_attempts` calls have been made. Rate-limit responses skip the
//! ladder: they take a single cool-down through the service's [`Pacer`]
//! and one more call. Malformed and rejected responses are returned
//! immediately.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};
use triage_harness_core::error::ExternalError;

use crate::config::BatchConfig;
use crate::error::RunError;
use crate::pacing::Pacer;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &BatchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.backoff_multiplier.max(1.0),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry.saturating_sub(1).min(30) as i32);
        let millis = (self.base_delay.as_millis() as f64 * factor).min(self.max_delay.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }

    /// Run `op` under this policy, pacing every call through `pacer`.
    pub async fn run<T, F, Fut>(&self, pacer: &Pacer, what: &str, mut op: F) -> Result<T, RunError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExternalError>>,
    {
        let mut calls = 0u32;
        let mut retries = 0u32;
        let mut cooled_down = false;

        loop {
            pacer.wait().await;
            calls += 1;
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match err {
                ExternalError::RateLimited { retry_after } if !cooled_down => {
                    cooled_down = true;
                    pacer.cool_down(retry_after).await;
                }
                ExternalError::RateLimited { .. } => {
                    return Err(RunError::ExhaustedRetry {
                        attempts: calls,
                        source: err,
                    });
                }
                ExternalError::Transient(_) if retries + 1 < self.max_attempts => {
                    retries += 1;
                    let delay = self.delay_for(retries);
                    warn!(
                        service = pacer.service(),
                        what,
                        attempt = calls,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                ExternalError::Transient(_) => {
                    return Err(RunError::ExhaustedRetry {
                        attempts: calls,
                        source: err,
                    });
                }
                other => {
                    debug!(service = pacer.service(), what, error = %other, "not retryable");
                    return Err(RunError::External(other));
                }
            }
        }
    }
}

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::RetrySettings;
use crate::core::{AppError, EventSink, OrchestrationEvent, Result};

/// Bounded exponential backoff
///
/// Retry `n` (1-based, so attempt `n + 1`) waits
/// `min(base_delay * backoff_factor^(n-1), max_delay)`:
/// with the defaults that is 1s, 2s, 4s, ... capped at 30s.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, settings: &RetrySettings) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: settings.base_delay(),
            max_delay: settings.max_delay(),
            backoff_factor: settings.backoff_factor,
        }
    }

    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(retry - 1).unwrap_or(i32::MAX);
        let scaled = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(scaled)
        }
    }
}

/// Gateway-agnostic retry loop
///
/// Only errors classified as transient are retried. Anything else returns
/// immediately; after `max_attempts` transient failures the last error is
/// returned unchanged. Waits are task-local timers.
#[derive(Clone)]
pub struct RetryExecutor {
    events: Arc<dyn EventSink>,
}

impl RetryExecutor {
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        Self { events }
    }

    /// Run `operation`, passing the 1-based attempt number
    pub async fn execute<T, F, Fut>(&self, label: &str, policy: &RetryPolicy, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = %label, attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    warn!(operation = %label, attempts = attempt, error = %e, "Retries exhausted");
                    return Err(e);
                }
                Err(e) => {
                    let delay = policy.delay_for_retry(attempt);
                    self.events.emit(OrchestrationEvent::RetryAttempt {
                        operation: label.to_string(),
                        attempt,
                        max_attempts,
                        delay_ms: delay.as_millis() as u64,
                        error: e.to_string(),
                    });
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Bound a gateway call by its configured timeout; expiry is transient
pub async fn with_deadline<T, Fut>(gateway: &str, timeout: Duration, call: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(AppError::GatewayTimeout {
            gateway: gateway.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

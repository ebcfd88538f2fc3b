// src/clients/retry.rs
//! Retry policies for external calls.
//!
//! A policy answers three questions: how many attempts, how long to wait after a failed
//! attempt, and whether a given failure is worth another try. Call sites only ever go
//! through [`run_with_retry`], so swapping the policy never touches them.

use std::future::Future;
use std::time::Duration;

use crate::error::{CallError, CallErrorKind};
use crate::types::ApiType;

pub trait RetryPolicy: Send + Sync {
    /// Total attempts including the first one.
    fn max_attempts(&self) -> u32;
    /// Delay after the failed attempt number `attempt` (1-based).
    fn backoff(&self, attempt: u32) -> Duration;
    fn should_retry(&self, error: &CallError) -> bool;
}

/// Exponential backoff: `base * 2^(attempt-1)`, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct ExponentialRetry {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// When false, 4xx responses fail immediately.
    pub retry_client_errors: bool,
}

impl Default for ExponentialRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            retry_client_errors: true,
        }
    }
}

impl ExponentialRetry {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
            retry_client_errors: true,
        }
    }

    /// Status-aware variant: never retry 4xx.
    pub fn skip_client_errors(mut self) -> Self {
        self.retry_client_errors = false;
        self
    }
}

impl RetryPolicy for ExponentialRetry {
    fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exp);
        delay.min(self.max_delay)
    }

    fn should_retry(&self, error: &CallError) -> bool {
        match error.kind {
            CallErrorKind::Network => true,
            CallErrorKind::Status => self.retry_client_errors || !error.is_client_error(),
        }
    }
}

/// Run `op` until it succeeds, the policy refuses, or attempts run out.
/// The last error is returned unchanged.
pub async fn run_with_retry<T, F, Fut>(
    policy: &dyn RetryPolicy,
    api_type: ApiType,
    mut op: F,
) -> Result<T, CallError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CallError>>,
{
    let max_attempts = policy.max_attempts().max(1);
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(api = %api_type, attempt, "external call recovered after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt < max_attempts && policy.should_retry(&e) => {
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    api = %api_type,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    status = ?e.status_code,
                    error = %e,
                    "external call failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::warn!(api = %api_type, attempt, error = %e, "external call failed, giving up");
                return Err(e);
            }
        }
    }
}

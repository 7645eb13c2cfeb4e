//! Retry policy for read operations
//!
//! Reads (`list_pipelines`, `get_pipeline_state`) are safe to repeat and are
//! retried with exponential backoff and jitter. `start_execution` goes through
//! exactly once: a blind retry could start a second execution, so a failed
//! trigger is always handed back to the operator.

use crate::api::{ApiError, PipelineApi, PipelineState};
use crate::core::config::RetryConfig;
use crate::core::ExecutionId;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Backoff parameters for read retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Upper bound of the delay before retry number `attempt` (1-based)
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Delay before retry number `attempt`, honouring a service hint
    ///
    /// Without a hint the delay is the exponential ceiling scaled by a jitter
    /// factor in `[0.5, 1.0]`.
    pub fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        if let Some(hint) = hint {
            return hint.min(self.max_delay);
        }
        self.ceiling(attempt).mul_f64(jitter_factor())
    }

    /// Run `operation` until it succeeds, fails permanently or runs out of attempts
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt, e.retry_after());
                    warn!(
                        "{} failed ({}), retrying in {:?} ({}/{})",
                        label,
                        e,
                        delay,
                        attempt,
                        self.max_attempts - 1
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    debug!("{} failed after {} attempt(s): {}", label, attempt, e);
                    return Err(e);
                }
            }
        }
    }
}

/// Jitter factor in `[0.5, 1.0]`, drawn from the random bits of a v4 UUID
///
/// v4 UUIDs are filled from the OS random source, which is plenty for
/// spreading retries apart. The low 16 bits are all random (the version and
/// variant nibbles sit higher up).
fn jitter_factor() -> f64 {
    let bits = (Uuid::new_v4().as_u128() & 0xFFFF) as f64;
    0.5 + 0.5 * (bits / f64::from(u16::MAX))
}

/// `PipelineApi` decorator that retries reads and never retries triggers
#[derive(Debug, Clone)]
pub struct RetryingApi<A> {
    inner: A,
    policy: RetryPolicy,
}

impl<A: PipelineApi> RetryingApi<A> {
    pub fn new(inner: A, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }
}

#[async_trait]
impl<A: PipelineApi> PipelineApi for RetryingApi<A> {
    async fn list_pipelines(&self) -> Result<Vec<String>, ApiError> {
        self.policy
            .run("list_pipelines", || self.inner.list_pipelines())
            .await
    }

    async fn get_pipeline_state(&self, name: &str) -> Result<PipelineState, ApiError> {
        let label = format!("get_pipeline_state({})", name);
        self.policy
            .run(&label, || self.inner.get_pipeline_state(name))
            .await
    }

    async fn start_execution(&self, name: &str) -> Result<ExecutionId, ApiError> {
        self.inner.start_execution(name).await
    }
}

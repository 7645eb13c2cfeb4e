//! Cap on concurrent service calls
//!
//! Every call holds a permit only while it runs. Retry backoff sleeps happen
//! in [`RetryingApi`](crate::api::RetryingApi) above this layer, so a
//! throttled pipeline waiting between attempts leaves its slot to others.

use crate::api::{ApiError, PipelineApi, PipelineState};
use crate::core::ExecutionId;
use async_trait::async_trait;
use tokio::sync::{Semaphore, SemaphorePermit};

/// `PipelineApi` decorator allowing at most `max_concurrent` calls in flight
#[derive(Debug)]
pub struct LimitedApi<A> {
    inner: A,
    permits: Semaphore,
}

impl<A: PipelineApi> LimitedApi<A> {
    pub fn new(inner: A, max_concurrent: usize) -> Self {
        Self {
            inner,
            permits: Semaphore::new(max_concurrent.max(1)),
        }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    async fn permit(&self) -> Result<SemaphorePermit<'_>, ApiError> {
        self.permits
            .acquire()
            .await
            .map_err(|_| ApiError::Internal("Call limiter closed".to_string()))
    }
}

#[async_trait]
impl<A: PipelineApi> PipelineApi for LimitedApi<A> {
    async fn list_pipelines(&self) -> Result<Vec<String>, ApiError> {
        let _permit = self.permit().await?;
        self.inner.list_pipelines().await
    }

    async fn get_pipeline_state(&self, name: &str) -> Result<PipelineState, ApiError> {
        let _permit = self.permit().await?;
        self.inner.get_pipeline_state(name).await
    }

    async fn start_execution(&self, name: &str) -> Result<ExecutionId, ApiError> {
        let _permit = self.permit().await?;
        self.inner.start_execution(name).await
    }
}

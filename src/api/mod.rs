//! Pipeline service client for listing, describing and triggering pipelines

pub mod aws_cli;
pub mod client;
pub mod limit;
pub mod response;
pub mod retry;
pub mod wire;

use crate::core::ExecutionId;
use async_trait::async_trait;
use std::sync::Arc;

pub use aws_cli::AwsCliClient;
pub use client::ClientConfig;
pub use limit::LimitedApi;
pub use response::{ApiError, ErrorKind, PipelineState};
pub use retry::{RetryPolicy, RetryingApi};

/// Trait for pipeline service access - allows for different implementations
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Names of all pipelines visible to the caller, in service order
    async fn list_pipelines(&self) -> Result<Vec<String>, ApiError>;

    /// Current snapshot of one pipeline plus its recent executions
    async fn get_pipeline_state(&self, name: &str) -> Result<PipelineState, ApiError>;

    /// Start a new execution; at most one call per confirmed trigger
    async fn start_execution(&self, name: &str) -> Result<ExecutionId, ApiError>;
}

#[async_trait]
impl<T: PipelineApi + ?Sized> PipelineApi for Arc<T> {
    async fn list_pipelines(&self) -> Result<Vec<String>, ApiError> {
        (**self).list_pipelines().await
    }

    async fn get_pipeline_state(&self, name: &str) -> Result<PipelineState, ApiError> {
        (**self).get_pipeline_state(name).await
    }

    async fn start_execution(&self, name: &str) -> Result<ExecutionId, ApiError> {
        (**self).start_execution(name).await
    }
}

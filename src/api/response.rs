//! API response and error types

use crate::core::{Execution, Pipeline};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Error types for pipeline service operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// Network failure, 5xx or dropped connection
    #[error("Transient error: {0}")]
    Transient(String),

    /// Credentials missing, expired or rejected
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The service asked us to slow down
    #[error("Throttled: {message}")]
    Throttled {
        message: String,
        retry_after: Option<Duration>,
    },

    /// The pipeline no longer exists
    #[error("Pipeline not found: {0}")]
    NotFound(String),

    /// The service refused a concurrent start
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A single call exceeded the per-call timeout
    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    /// Any other rejection reported by the service
    #[error("{code}: {message}")]
    Service { code: String, message: String },

    /// Local failure (spawn, decode)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error classification, kept in cache entries and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Transient,
    Auth,
    Throttled,
    NotFound,
    Conflict,
    Timeout,
    Service,
    Internal,
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Transient(_) => ErrorKind::Transient,
            ApiError::Auth(_) => ErrorKind::Auth,
            ApiError::Throttled { .. } => ErrorKind::Throttled,
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::Conflict(_) => ErrorKind::Conflict,
            ApiError::Timeout(_) => ErrorKind::Timeout,
            ApiError::Service { .. } => ErrorKind::Service,
            ApiError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether a read operation may be retried after this error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Transient(_) | ApiError::Throttled { .. } | ApiError::Timeout(_)
        )
    }

    /// Whether the error ends the interactive session
    pub fn is_fatal(&self) -> bool {
        matches!(self, ApiError::Auth(_))
    }

    /// Delay requested by the service, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::Throttled { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Result of describing a single pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineState {
    /// Current pipeline snapshot
    pub pipeline: Pipeline,

    /// Recent executions, newest first
    pub executions: Vec<Execution>,
}

//! aws-codepipeline-cli - browse and trigger AWS CodePipeline pipelines from the terminal

pub mod api;
pub mod cache;
pub mod cli;
pub mod core;
pub mod logging;
pub mod refresh;
pub mod ui;

// Re-export commonly used types
pub use api::{
    ApiError, AwsCliClient, ClientConfig, LimitedApi, PipelineApi, PipelineState, RetryPolicy,
    RetryingApi,
};
pub use cache::{CacheEntry, CacheSnapshot, StateCache};
pub use core::{AppConfig, Execution, ExecutionId, Pipeline, PipelineStatus, Stage, TriggerType};
pub use refresh::{refresh_once, RefreshEngine, SchedulerEvent, SchedulerHandle};
pub use ui::{Session, SessionEnd};

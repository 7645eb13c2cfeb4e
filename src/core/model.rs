//! Pipeline, stage and execution models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a pipeline execution as reported by the service
pub type ExecutionId = String;

/// Status shared by pipelines, stages and executions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PipelineStatus {
    /// Last run finished successfully
    Succeeded,
    /// Last run failed
    Failed,
    /// A run is currently in progress
    InProgress,
    /// Last run was stopped, cancelled or superseded
    Stopped,
    /// No status reported yet
    #[default]
    Unknown,
}

impl PipelineStatus {
    /// Map a service status string onto the status enum
    ///
    /// Accepts both pipeline execution statuses (`Superseded`, `Stopping`, ...)
    /// and action execution statuses (`Abandoned`).
    pub fn from_service(status: &str) -> Self {
        match status {
            "Succeeded" => PipelineStatus::Succeeded,
            "Failed" => PipelineStatus::Failed,
            "InProgress" | "Stopping" => PipelineStatus::InProgress,
            "Stopped" | "Cancelled" | "Superseded" | "Abandoned" => PipelineStatus::Stopped,
            _ => PipelineStatus::Unknown,
        }
    }

    /// Short label used by the terminal views
    pub fn label(&self) -> &'static str {
        match self {
            PipelineStatus::Succeeded => "Succeeded",
            PipelineStatus::Failed => "Failed",
            PipelineStatus::InProgress => "InProgress",
            PipelineStatus::Stopped => "Stopped",
            PipelineStatus::Unknown => "Unknown",
        }
    }
}

/// How an execution was started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerType {
    /// Started by an operator (console, CLI, rollback)
    Manual,
    /// Started by a source change, schedule or pipeline update
    Automatic,
    /// Started by a webhook
    Webhook,
}

impl TriggerType {
    /// Map a service trigger type onto the three trigger categories
    pub fn from_service(trigger: &str) -> Self {
        match trigger {
            "StartPipelineExecution" | "ManualRollback" => TriggerType::Manual,
            "Webhook" | "WebhookV2" => TriggerType::Webhook,
            _ => TriggerType::Automatic,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TriggerType::Manual => "manual",
            TriggerType::Automatic => "automatic",
            TriggerType::Webhook => "webhook",
        }
    }
}

/// One stage of a pipeline snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    /// Stage name
    pub name: String,

    /// Latest status of the stage
    pub status: PipelineStatus,

    /// Action currently executing in this stage, if any
    pub current_action: Option<String>,

    /// Pipeline execution the stage status belongs to
    pub execution_id: Option<ExecutionId>,
}

/// Point-in-time snapshot of a pipeline
///
/// Snapshots are replaced wholesale on every refresh and never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Unique pipeline name
    pub name: String,

    /// Pipeline structure version reported by the service
    pub version: Option<i64>,

    /// Stages in declaration order
    pub stages: Vec<Stage>,

    /// Overall status
    pub status: PipelineStatus,

    /// When this snapshot was fetched
    pub refreshed_at: DateTime<Utc>,
}

impl Pipeline {
    /// Derive the overall status from the stage states
    ///
    /// Any failed stage fails the pipeline, any running stage makes it in
    /// progress, and only a pipeline whose stages all succeeded is succeeded.
    pub fn status_from_stages(stages: &[Stage]) -> PipelineStatus {
        if stages.is_empty() {
            return PipelineStatus::Unknown;
        }
        if stages.iter().any(|s| s.status == PipelineStatus::Failed) {
            return PipelineStatus::Failed;
        }
        if stages.iter().any(|s| s.status == PipelineStatus::InProgress) {
            return PipelineStatus::InProgress;
        }
        if stages.iter().all(|s| s.status == PipelineStatus::Succeeded) {
            return PipelineStatus::Succeeded;
        }
        if stages.iter().any(|s| s.status == PipelineStatus::Stopped) {
            return PipelineStatus::Stopped;
        }
        PipelineStatus::Unknown
    }
}

/// One run of a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    /// Execution identifier
    pub id: ExecutionId,

    /// Owning pipeline name
    pub pipeline: String,

    /// How the run was started
    pub trigger: TriggerType,

    /// When the run started
    pub started_at: Option<DateTime<Utc>>,

    /// When the service last updated the run
    pub updated_at: Option<DateTime<Utc>>,

    /// Run status
    pub status: PipelineStatus,
}

//! JSON documents printed by `aws codepipeline ... --output json`
//!
//! Only the fields the views need are modelled; everything else is ignored.
//! Timestamps come back either as ISO-8601 strings (CLI v2) or as epoch
//! seconds (CLI v1 with the default timestamp format), so both are accepted.

use crate::core::{Execution, Pipeline, PipelineStatus, Stage, TriggerType};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

/// `list-pipelines`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPipelinesOutput {
    #[serde(default)]
    pub pipelines: Vec<PipelineSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSummary {
    pub name: String,
    #[serde(default)]
    pub version: Option<i64>,
}

/// `get-pipeline-state`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPipelineStateOutput {
    pub pipeline_name: String,
    #[serde(default)]
    pub pipeline_version: Option<i64>,
    #[serde(default)]
    pub stage_states: Vec<StageState>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageState {
    pub stage_name: String,
    #[serde(default)]
    pub action_states: Vec<ActionState>,
    #[serde(default)]
    pub latest_execution: Option<StageExecution>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageExecution {
    pub pipeline_execution_id: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionState {
    pub action_name: String,
    #[serde(default)]
    pub latest_execution: Option<ActionExecution>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionExecution {
    #[serde(default)]
    pub status: Option<String>,
}

/// `list-pipeline-executions`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPipelineExecutionsOutput {
    #[serde(default)]
    pub pipeline_execution_summaries: Vec<ExecutionSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub pipeline_execution_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "timestamp")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp")]
    pub last_update_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trigger: Option<ExecutionTrigger>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionTrigger {
    #[serde(default)]
    pub trigger_type: Option<String>,
}

/// `start-pipeline-execution`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPipelineExecutionOutput {
    pub pipeline_execution_id: String,
}

impl StageState {
    fn into_stage(self) -> Stage {
        let current_action = self
            .action_states
            .iter()
            .find(|action| {
                action
                    .latest_execution
                    .as_ref()
                    .and_then(|e| e.status.as_deref())
                    == Some("InProgress")
            })
            .map(|action| action.action_name.clone());

        let (status, execution_id) = match self.latest_execution {
            Some(latest) => (
                PipelineStatus::from_service(&latest.status),
                Some(latest.pipeline_execution_id),
            ),
            None => (PipelineStatus::Unknown, None),
        };

        Stage {
            name: self.stage_name,
            status,
            current_action,
            execution_id,
        }
    }
}

impl GetPipelineStateOutput {
    /// Build a pipeline snapshot; the newest execution decides the overall status
    pub fn into_pipeline(self, latest: Option<&Execution>, refreshed_at: DateTime<Utc>) -> Pipeline {
        let stages: Vec<Stage> = self.stage_states.into_iter().map(StageState::into_stage).collect();
        let status = match latest {
            Some(execution) => execution.status,
            None => Pipeline::status_from_stages(&stages),
        };

        Pipeline {
            name: self.pipeline_name,
            version: self.pipeline_version,
            stages,
            status,
            refreshed_at,
        }
    }
}

impl ExecutionSummary {
    pub fn into_execution(self, pipeline: &str) -> Execution {
        let trigger = self
            .trigger
            .and_then(|t| t.trigger_type)
            .map(|t| TriggerType::from_service(&t))
            .unwrap_or(TriggerType::Automatic);

        Execution {
            id: self.pipeline_execution_id,
            pipeline: pipeline.to_string(),
            trigger,
            started_at: self.start_time,
            updated_at: self.last_update_time,
            status: self
                .status
                .as_deref()
                .map(PipelineStatus::from_service)
                .unwrap_or_default(),
        }
    }
}

fn timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Some(serde_json::Value::Number(n)) => n.as_f64().and_then(|secs| {
            let millis = (secs * 1000.0).round() as i64;
            Utc.timestamp_millis_opt(millis).single()
        }),
        _ => None,
    })
}

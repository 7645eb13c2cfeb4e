//! aws CLI subprocess client - drives `aws codepipeline` in JSON mode

use crate::api::client::ClientConfig;
use crate::api::wire::{
    GetPipelineStateOutput, ListPipelineExecutionsOutput, ListPipelinesOutput,
    StartPipelineExecutionOutput,
};
use crate::api::{ApiError, PipelineApi, PipelineState};
use crate::core::{Execution, ExecutionId};
use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use serde::de::DeserializeOwned;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Client for the pipeline service that shells out to the aws CLI
#[derive(Debug, Clone)]
pub struct AwsCliClient {
    config: ClientConfig,
}

impl AwsCliClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Run `aws codepipeline <operation> <args>` and decode its JSON output
    ///
    /// # Errors
    /// Returns `ApiError` if:
    /// - The aws executable cannot be spawned
    /// - The call exceeds the per-call timeout
    /// - aws exits with a non-zero status (classified from stderr)
    /// - stdout is not the expected JSON document
    async fn call<T: DeserializeOwned>(&self, operation: &str, args: &[&str]) -> Result<T, ApiError> {
        debug!("aws codepipeline {} {:?}", operation, args);

        let mut command = Command::new(&self.config.aws_path);
        command
            .arg("codepipeline")
            .arg(operation)
            .args(args)
            .args(self.config.global_args())
            // The retry policy lives in RetryingApi, and a pager would hang the call
            .env("AWS_PAGER", "")
            .env("AWS_MAX_ATTEMPTS", "1")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let timeout_secs = self.config.timeout_secs;
        let output = timeout(Duration::from_secs(timeout_secs), command.output())
            .await
            .map_err(|_| ApiError::Timeout(timeout_secs))?
            .map_err(|e| ApiError::Internal(format!("Failed to execute aws subprocess: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            warn!(
                "aws codepipeline {} exited with code {}: {}",
                operation,
                exit_code,
                stderr.trim()
            );
            return Err(classify_failure(exit_code, &stderr));
        }

        debug!(
            "aws codepipeline {} returned {} bytes",
            operation,
            output.stdout.len()
        );

        serde_json::from_slice(&output.stdout).map_err(|e| {
            ApiError::Internal(format!("Failed to decode {} output: {}", operation, e))
        })
    }

    async fn recent_executions(&self, name: &str) -> Result<Vec<Execution>, ApiError> {
        let max_items = self.config.execution_history.to_string();
        let output: ListPipelineExecutionsOutput = self
            .call(
                "list-pipeline-executions",
                &["--pipeline-name", name, "--max-items", max_items.as_str()],
            )
            .await?;

        Ok(output
            .pipeline_execution_summaries
            .into_iter()
            .map(|summary| summary.into_execution(name))
            .collect())
    }
}

#[async_trait]
impl PipelineApi for AwsCliClient {
    async fn list_pipelines(&self) -> Result<Vec<String>, ApiError> {
        let output: ListPipelinesOutput = self.call("list-pipelines", &[]).await?;
        Ok(output.pipelines.into_iter().map(|p| p.name).collect())
    }

    async fn get_pipeline_state(&self, name: &str) -> Result<PipelineState, ApiError> {
        let requested_at = Utc::now();
        // One aws process per call keeps the concurrency cap a process count
        let state: GetPipelineStateOutput =
            self.call("get-pipeline-state", &["--name", name]).await?;
        let executions = self.recent_executions(name).await?;

        let pipeline = state.into_pipeline(executions.first(), requested_at);
        Ok(PipelineState {
            pipeline,
            executions,
        })
    }

    async fn start_execution(&self, name: &str) -> Result<ExecutionId, ApiError> {
        // One token per confirmed trigger; the service deduplicates on it
        let token = Uuid::new_v4().to_string();
        let output: StartPipelineExecutionOutput = self
            .call(
                "start-pipeline-execution",
                &["--name", name, "--client-request-token", token.as_str()],
            )
            .await?;

        info!(
            "Started execution {} of pipeline {}",
            output.pipeline_execution_id, name
        );
        Ok(output.pipeline_execution_id)
    }
}

fn error_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"An error occurred \((?P<code>[A-Za-z0-9.]+)\)(?: when calling the \w+ operation(?: \([^)]*\))?)?:?\s*(?P<message>.*)",
        )
        .expect("error pattern is a valid regex")
    })
}

/// Map a failed aws invocation onto the error taxonomy
///
/// Service errors carry an `An error occurred (Code)` line. Failures raised
/// by the CLI itself (credentials, profiles, connectivity) only have a
/// message, so those are matched by phrase and finally by exit code
/// (252 usage, 253 configuration, 255 catch-all).
pub fn classify_failure(exit_code: i32, stderr: &str) -> ApiError {
    let text = stderr.trim();

    if let Some(caps) = error_pattern().captures(text) {
        let code = caps["code"].to_string();
        let message = caps
            .name("message")
            .map(|m| m.as_str().trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| code.clone());
        return classify_code(code, message);
    }

    let lower = text.to_lowercase();
    let auth_phrases = [
        "unable to locate credentials",
        "could not be found",
        "error loading sso token",
        "sso session",
        "token has expired",
        "you must specify a region",
    ];
    if auth_phrases.iter().any(|p| lower.contains(p)) {
        return ApiError::Auth(text.to_string());
    }

    let transient_phrases = [
        "could not connect to the endpoint url",
        "read timeout on endpoint url",
        "connect timeout on endpoint url",
        "connection was closed",
        "connection reset",
    ];
    if transient_phrases.iter().any(|p| lower.contains(p)) {
        return ApiError::Transient(text.to_string());
    }

    if lower.contains("rate exceeded") {
        return ApiError::Throttled {
            message: text.to_string(),
            retry_after: None,
        };
    }

    match exit_code {
        253 => ApiError::Auth(text.to_string()),
        252 | 2 => ApiError::Internal(format!("aws rejected the command: {}", text)),
        255 => ApiError::Transient(text.to_string()),
        code => ApiError::Service {
            code: format!("ExitCode{}", code),
            message: text.to_string(),
        },
    }
}

fn classify_code(code: String, message: String) -> ApiError {
    match code.as_str() {
        "ThrottlingException" | "Throttling" | "TooManyRequestsException"
        | "RequestLimitExceeded" | "RequestThrottled" | "SlowDown" => ApiError::Throttled {
            message,
            retry_after: None,
        },
        "ExpiredToken" | "ExpiredTokenException" | "UnrecognizedClientException"
        | "InvalidClientTokenId" | "AccessDenied" | "AccessDeniedException"
        | "InvalidSignatureException" | "SignatureDoesNotMatch" | "AuthFailure"
        | "IncompleteSignature" | "MissingAuthenticationToken" => {
            ApiError::Auth(format!("{}: {}", code, message))
        }
        "PipelineNotFoundException" | "PipelineExecutionNotFoundException" => {
            ApiError::NotFound(message)
        }
        "ConflictException" | "ConcurrentPipelineExecutionsLimitExceededException" => {
            ApiError::Conflict(message)
        }
        "InternalServerError" | "InternalServerException" | "InternalFailure"
        | "ServiceUnavailable" | "ServiceUnavailableException" | "RequestTimeout"
        | "RequestTimeoutException" => ApiError::Transient(format!("{}: {}", code, message)),
        _ => ApiError::Service { code, message },
    }
}

//! Test utilities: a scripted pipeline API and sample snapshots

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use codepipeline::api::{ApiError, PipelineApi, PipelineState};
use codepipeline::core::{Execution, ExecutionId, Pipeline, PipelineStatus, Stage, TriggerType};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Pipeline API that answers from scripted state
///
/// Describes return the state set with [`MockApi::set_state`] unless an error
/// was queued for that pipeline. Starts pop from the queued start results and
/// fall back to a generated execution id.
#[derive(Default)]
pub struct MockApi {
    names: Mutex<Vec<String>>,
    states: Mutex<HashMap<String, PipelineState>>,
    describe_errors: Mutex<HashMap<String, VecDeque<ApiError>>>,
    list_errors: Mutex<VecDeque<ApiError>>,
    start_results: Mutex<VecDeque<Result<ExecutionId, ApiError>>>,
    describe_delay: Mutex<Option<Duration>>,
    on_start: Mutex<Option<PipelineState>>,
    list_calls: AtomicUsize,
    describe_calls: AtomicUsize,
    start_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Counts a describe as running until dropped
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockApi {
    pub fn new(names: &[&str]) -> Self {
        let api = Self::default();
        *api.names.lock().unwrap() = names.iter().map(|n| n.to_string()).collect();
        api
    }

    /// Answer describes of `name` with `state`
    pub fn set_state(&self, name: &str, state: PipelineState) {
        self.states.lock().unwrap().insert(name.to_string(), state);
    }

    /// State served after the next successful start
    pub fn after_start(&self, state: PipelineState) {
        *self.on_start.lock().unwrap() = Some(state);
    }

    pub fn fail_describe(&self, name: &str, error: ApiError) {
        self.describe_errors
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .push_back(error);
    }

    pub fn fail_list(&self, error: ApiError) {
        self.list_errors.lock().unwrap().push_back(error);
    }

    pub fn queue_start(&self, result: Result<ExecutionId, ApiError>) {
        self.start_results.lock().unwrap().push_back(result);
    }

    pub fn with_describe_delay(self, delay: Duration) -> Self {
        *self.describe_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn describe_calls(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    /// Most describes ever running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PipelineApi for MockApi {
    async fn list_pipelines(&self) -> Result<Vec<String>, ApiError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.list_errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(self.names.lock().unwrap().clone())
    }

    async fn get_pipeline_state(&self, name: &str) -> Result<PipelineState, ApiError> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let delay = *self.describe_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let queued = self
            .describe_errors
            .lock()
            .unwrap()
            .get_mut(name)
            .and_then(|errors| errors.pop_front());
        if let Some(error) = queued {
            return Err(error);
        }

        self.states
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(name.to_string()))
    }

    async fn start_execution(&self, name: &str) -> Result<ExecutionId, ApiError> {
        let call = self.start_calls.fetch_add(1, Ordering::SeqCst);
        let result = self
            .start_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("exec-started-{}", call + 1)));

        if result.is_ok() {
            if let Some(state) = self.on_start.lock().unwrap().take() {
                self.states.lock().unwrap().insert(name.to_string(), state);
            }
        }
        result
    }
}

pub fn execution(pipeline: &str, id: &str, status: PipelineStatus, started_at: DateTime<Utc>) -> Execution {
    Execution {
        id: id.to_string(),
        pipeline: pipeline.to_string(),
        trigger: TriggerType::Manual,
        started_at: Some(started_at),
        updated_at: None,
        status,
    }
}

/// Two-stage pipeline whose executions are listed newest first
pub fn pipeline_state(name: &str, executions: Vec<Execution>) -> PipelineState {
    let status = executions
        .first()
        .map(|e| e.status)
        .unwrap_or(PipelineStatus::Unknown);
    let latest = executions.first().map(|e| e.id.clone());

    PipelineState {
        pipeline: Pipeline {
            name: name.to_string(),
            version: Some(1),
            stages: vec![
                Stage {
                    name: "Source".to_string(),
                    status: PipelineStatus::Succeeded,
                    current_action: None,
                    execution_id: latest.clone(),
                },
                Stage {
                    name: "Deploy".to_string(),
                    status,
                    current_action: None,
                    execution_id: latest,
                },
            ],
            status,
            refreshed_at: Utc::now(),
        },
        executions,
    }
}

/// `name` with one finished execution `exec-1`
pub fn with_exec_1(name: &str) -> PipelineState {
    let now = Utc::now();
    pipeline_state(
        name,
        vec![execution(name, "exec-1", PipelineStatus::Succeeded, now - ChronoDuration::minutes(5))],
    )
}

/// `name` with `exec-2` running on top of `exec-1`
pub fn with_exec_2(name: &str) -> PipelineState {
    let now = Utc::now();
    pipeline_state(
        name,
        vec![
            execution(name, "exec-2", PipelineStatus::InProgress, now),
            execution(name, "exec-1", PipelineStatus::Succeeded, now - ChronoDuration::minutes(5)),
        ],
    )
}

/// Poll `check` every 20ms until it holds or `within` has passed
pub async fn wait_until<F: FnMut() -> bool>(within: Duration, mut check: F) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

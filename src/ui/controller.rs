//! Terminal controller - view state machine
//!
//! The controller owns the current view, the back-stack, the list selection
//! and the trigger bookkeeping. It never performs I/O: inputs and background
//! results go in, [`Effect`]s come out and are carried out by the session.

use crate::api::ApiError;
use crate::cache::CacheSnapshot;
use crate::core::ExecutionId;
use crate::refresh::SchedulerEvent;
use std::collections::HashMap;
use tracing::{info, warn};

/// Screen currently shown
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    /// All pipelines with their status
    List,

    /// Stages and recent executions of one pipeline
    Detail { pipeline: String },

    /// Asks before starting a new execution
    ConfirmTrigger { pipeline: String },

    /// Dismissible banner drawn over the previous view
    Error { message: String },
}

/// Keyboard actions understood by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Up,
    Down,
    Home,
    End,
    /// Enter
    Select,
    /// Esc
    Back,
    Trigger,
    Confirm,
    Cancel,
    Refresh,
    Quit,
}

/// Side effects requested by the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Quit,
    /// Pipeline now on screen, `None` when back on the list
    Focus(Option<String>),
    RefreshNow(String),
    RefreshList,
    StartExecution(String),
}

/// Trigger started by this session that the cache may not show yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingTrigger {
    /// `start_execution` has not returned yet
    InFlight,
    /// Started; waiting for a refresh to bring the execution into the cache
    Started(ExecutionId),
}

/// View state machine for the interactive session
#[derive(Debug)]
pub struct Controller {
    view: View,
    back: Vec<View>,
    selected: usize,
    in_flight: Option<String>,
    started: HashMap<String, ExecutionId>,
    status: Option<String>,
    /// Set while the pipeline list keeps failing to refresh
    list_warning: Option<String>,
    quit: bool,
    fatal: Option<String>,
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller {
    pub fn new() -> Self {
        Self {
            view: View::List,
            back: Vec::new(),
            selected: 0,
            in_flight: None,
            started: HashMap::new(),
            status: None,
            list_warning: None,
            quit: false,
            fatal: None,
        }
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    /// The view under an error banner, or the current view otherwise
    pub fn base_view(&self) -> &View {
        match &self.view {
            View::Error { .. } => self
                .back
                .iter()
                .rev()
                .find(|v| !matches!(v, View::Error { .. }))
                .unwrap_or(&View::List),
            view => view,
        }
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn selected_name<'a>(&self, snapshot: &'a CacheSnapshot) -> Option<&'a str> {
        snapshot
            .entries()
            .get(self.selected.min(snapshot.len().saturating_sub(1)))
            .map(|e| e.name.as_str())
    }

    /// Pipeline whose trigger has not returned yet
    pub fn in_flight(&self) -> Option<&str> {
        self.in_flight.as_deref()
    }

    pub fn pending_trigger(&self, pipeline: &str) -> Option<PendingTrigger> {
        if self.in_flight.as_deref() == Some(pipeline) {
            return Some(PendingTrigger::InFlight);
        }
        self.started
            .get(pipeline)
            .map(|id| PendingTrigger::Started(id.clone()))
    }

    /// One-line status shown in the footer
    ///
    /// A failing list refresh wins over trigger messages until it recovers.
    pub fn status(&self) -> Option<&str> {
        self.list_warning.as_deref().or(self.status.as_deref())
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    /// Message of the failure that ended the session
    pub fn fatal(&self) -> Option<&str> {
        self.fatal.as_deref()
    }

    /// Apply one keyboard input
    pub fn handle_input(&mut self, input: Input, snapshot: &CacheSnapshot) -> Vec<Effect> {
        if input == Input::Quit {
            self.quit = true;
            return vec![Effect::Quit];
        }

        match self.view.clone() {
            View::List => self.on_list(input, snapshot),
            View::Detail { pipeline } => self.on_detail(input, pipeline),
            View::ConfirmTrigger { pipeline } => self.on_confirm(input, pipeline),
            View::Error { .. } => self.on_error(input),
        }
    }

    fn on_list(&mut self, input: Input, snapshot: &CacheSnapshot) -> Vec<Effect> {
        let last = snapshot.len().saturating_sub(1);
        match input {
            Input::Up => self.selected = self.selected.min(last).saturating_sub(1),
            Input::Down => self.selected = (self.selected + 1).min(last),
            Input::Home => self.selected = 0,
            Input::End => self.selected = last,
            Input::Select => {
                if let Some(name) = self.selected_name(snapshot) {
                    let name = name.to_string();
                    self.push(View::Detail {
                        pipeline: name.clone(),
                    });
                    return vec![Effect::Focus(Some(name))];
                }
            }
            Input::Refresh => return vec![Effect::RefreshList],
            _ => {}
        }
        Vec::new()
    }

    fn on_detail(&mut self, input: Input, pipeline: String) -> Vec<Effect> {
        match input {
            Input::Back => {
                self.pop();
                let focus = match &self.view {
                    View::Detail { pipeline } => Some(pipeline.clone()),
                    _ => None,
                };
                vec![Effect::Focus(focus)]
            }
            Input::Trigger => {
                if let Some(busy) = &self.in_flight {
                    self.status = Some(format!("A trigger of {} is still in flight", busy));
                    return Vec::new();
                }
                self.push(View::ConfirmTrigger { pipeline });
                Vec::new()
            }
            Input::Refresh => vec![Effect::RefreshNow(pipeline)],
            _ => Vec::new(),
        }
    }

    fn on_confirm(&mut self, input: Input, pipeline: String) -> Vec<Effect> {
        match input {
            Input::Confirm | Input::Select => {
                // Leave the confirm view first so a repeated confirm finds nothing to confirm
                self.pop();
                if self.in_flight.is_some() {
                    return Vec::new();
                }
                info!("Triggering pipeline {}", pipeline);
                self.in_flight = Some(pipeline.clone());
                self.status = Some(format!("Starting {}...", pipeline));
                vec![Effect::StartExecution(pipeline)]
            }
            Input::Cancel | Input::Back => {
                self.pop();
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn on_error(&mut self, input: Input) -> Vec<Effect> {
        match input {
            Input::Back | Input::Select | Input::Cancel => {
                self.pop();
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    /// Apply the result of a `start_execution` call
    pub fn on_trigger_result(
        &mut self,
        pipeline: &str,
        result: Result<ExecutionId, ApiError>,
    ) -> Vec<Effect> {
        if self.in_flight.as_deref() == Some(pipeline) {
            self.in_flight = None;
        }

        match result {
            Ok(id) => {
                info!("Pipeline {} started execution {}", pipeline, id);
                self.status = Some(format!("Started {} ({})", pipeline, id));
                self.started.insert(pipeline.to_string(), id);
                vec![Effect::RefreshNow(pipeline.to_string())]
            }
            Err(e) if e.is_fatal() => self.end_session(e.to_string()),
            Err(e) => {
                warn!("Trigger of {} failed: {}", pipeline, e);
                self.status = None;
                self.push(View::Error {
                    message: format!("Failed to start {}: {}", pipeline, e),
                });
                Vec::new()
            }
        }
    }

    /// Apply an event from the refresh engine
    pub fn on_scheduler_event(&mut self, event: SchedulerEvent) -> Vec<Effect> {
        match event {
            SchedulerEvent::Fatal(e) => self.end_session(e.to_string()),
            SchedulerEvent::ListFailed(message) => {
                self.list_warning = Some(format!("Pipeline list refresh failed: {}", message));
                Vec::new()
            }
            SchedulerEvent::ListRecovered => {
                self.list_warning = None;
                Vec::new()
            }
        }
    }

    /// Forget started triggers once their execution shows up in the cache
    pub fn reconcile(&mut self, snapshot: &CacheSnapshot) {
        self.started.retain(|pipeline, id| {
            snapshot
                .get(pipeline)
                .map_or(true, |entry| entry.execution(id).is_none())
        });
        if !snapshot.is_empty() {
            self.selected = self.selected.min(snapshot.len() - 1);
        }
    }

    fn end_session(&mut self, message: String) -> Vec<Effect> {
        self.fatal = Some(message);
        self.quit = true;
        vec![Effect::Quit]
    }

    fn push(&mut self, view: View) {
        let previous = std::mem::replace(&mut self.view, view);
        self.back.push(previous);
    }

    fn pop(&mut self) {
        self.view = self.back.pop().unwrap_or(View::List);
    }
}

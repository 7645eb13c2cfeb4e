//! Refresh engine - runs list and describe refreshes in the background
//!
//! A single driver task owns the [`RefreshScheduler`]. It wakes on a short
//! tick, on commands from the terminal loop and whenever a refresh task
//! finishes, then spawns whatever is due. Refresh tasks write their own
//! results into the [`StateCache`] after checking the cancellation flag.
//!
//! The cap on concurrent calls belongs to the API stack
//! ([`LimitedApi`](crate::api::LimitedApi) under the retry layer), so a task
//! sleeping through retry backoff holds no slot.

use crate::api::{ApiError, PipelineApi};
use crate::cache::StateCache;
use crate::core::AppConfig;
use crate::refresh::scheduler::{RefreshScheduler, RefreshSettings};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// How often the driver re-evaluates due refreshes without other wake-ups
const DRIVER_TICK: Duration = Duration::from_millis(200);

/// Events reported to the terminal loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// Credentials were rejected; the session cannot continue
    Fatal(ApiError),

    /// The pipeline list could not be refreshed
    ListFailed(String),

    /// The pipeline list refreshed again after a failure
    ListRecovered,
}

#[derive(Debug)]
enum Command {
    RefreshNow(String),
    RefreshList,
    SetFocus(Option<String>),
}

#[derive(Debug)]
enum Outcome {
    List(Result<Vec<String>, ApiError>),
    Describe {
        name: String,
        result: Result<(), ApiError>,
    },
    Cancelled,
}

/// Background refresh engine
pub struct RefreshEngine<A> {
    api: Arc<A>,
    cache: Arc<StateCache>,
    settings: RefreshSettings,
    initial_names: Option<Vec<String>>,
}

impl<A: PipelineApi + 'static> RefreshEngine<A> {
    pub fn new(api: Arc<A>, cache: Arc<StateCache>, settings: RefreshSettings) -> Self {
        Self {
            api,
            cache,
            settings,
            initial_names: None,
        }
    }

    /// Start from an already fetched pipeline list instead of listing again
    pub fn with_initial_list(mut self, names: Vec<String>) -> Self {
        self.initial_names = Some(names);
        self
    }

    pub fn from_config(api: Arc<A>, cache: Arc<StateCache>, config: &AppConfig) -> Self {
        Self::new(api, cache, RefreshSettings::from(&config.refresh))
    }

    /// Start the driver task
    ///
    /// Returns the handle used to steer it and the receiver for its events.
    pub fn spawn(self) -> (SchedulerHandle, mpsc::UnboundedReceiver<SchedulerEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let cancel = Arc::new(AtomicBool::new(false));

        let mut scheduler = RefreshScheduler::new(self.settings);
        if let Some(names) = &self.initial_names {
            self.cache.sync_pipelines(names);
            scheduler.begin_list(Instant::now());
            scheduler.list_succeeded(names);
        }

        let driver = Driver {
            api: self.api,
            cache: self.cache,
            scheduler,
            tasks: JoinSet::new(),
            events: event_tx,
            cancel: cancel.clone(),
            fatal_reported: false,
            list_failing: false,
        };
        let task = tokio::spawn(driver.run(command_rx));

        let handle = SchedulerHandle {
            commands: command_tx,
            cancel,
            driver: task,
        };
        (handle, event_rx)
    }
}

/// Handle to a running refresh engine
#[derive(Debug)]
pub struct SchedulerHandle {
    commands: mpsc::UnboundedSender<Command>,
    cancel: Arc<AtomicBool>,
    driver: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Refresh `name` now, ignoring its interval and any failure backoff
    pub fn refresh_now(&self, name: &str) {
        self.send(Command::RefreshNow(name.to_string()));
    }

    /// Refresh the pipeline list now
    pub fn refresh_list(&self) {
        self.send(Command::RefreshList);
    }

    /// Tell the engine which pipeline is on screen
    pub fn set_focus(&self, pipeline: Option<&str>) {
        self.send(Command::SetFocus(pipeline.map(str::to_string)));
    }

    /// Stop the engine and abandon in-flight refreshes
    ///
    /// Aborting the driver drops its task set, which aborts every refresh
    /// task and kills their aws subprocesses.
    pub async fn shutdown(self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.driver.abort();
        if let Err(e) = self.driver.await {
            if !e.is_cancelled() {
                warn!("Refresh driver ended abnormally: {}", e);
            }
        }
        info!("Refresh scheduler stopped");
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Refresh driver is gone, dropping command");
        }
    }
}

struct Driver<A> {
    api: Arc<A>,
    cache: Arc<StateCache>,
    scheduler: RefreshScheduler,
    tasks: JoinSet<Outcome>,
    events: mpsc::UnboundedSender<SchedulerEvent>,
    cancel: Arc<AtomicBool>,
    fatal_reported: bool,
    list_failing: bool,
}

impl<A: PipelineApi + 'static> Driver<A> {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!("Refresh scheduler started");
        let mut ticker = tokio::time::interval(DRIVER_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.cancel.load(Ordering::SeqCst) {
                break;
            }
            self.dispatch();

            tokio::select! {
                _ = ticker.tick() => {}
                command = commands.recv() => match command {
                    Some(command) => self.apply(command),
                    // Every handle is gone
                    None => break,
                },
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => match joined {
                    Ok(outcome) => self.complete(outcome),
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => error!("Refresh task panicked: {}", e),
                },
            }
        }

        self.tasks.abort_all();
        debug!("Refresh driver exiting");
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::RefreshNow(name) => {
                debug!("Immediate refresh of {} requested", name);
                self.scheduler.force(&name);
            }
            Command::RefreshList => self.scheduler.force_list(),
            Command::SetFocus(focus) => self.scheduler.set_focus(focus),
        }
    }

    fn dispatch(&mut self) {
        let now = Instant::now();

        if self.scheduler.list_due(now) {
            self.scheduler.begin_list(now);
            self.spawn_list();
        }

        for name in self.scheduler.due_pipelines(now) {
            self.scheduler.begin(&name, now);
            self.spawn_describe(name);
        }
    }

    fn spawn_list(&mut self) {
        let api = self.api.clone();
        let cache = self.cache.clone();
        let cancel = self.cancel.clone();

        self.tasks.spawn(async move {
            if cancel.load(Ordering::SeqCst) {
                return Outcome::Cancelled;
            }

            let result = api.list_pipelines().await;
            if cancel.load(Ordering::SeqCst) {
                return Outcome::Cancelled;
            }
            if let Ok(names) = &result {
                cache.sync_pipelines(names);
            }
            Outcome::List(result)
        });
    }

    fn spawn_describe(&mut self, name: String) {
        let api = self.api.clone();
        let cache = self.cache.clone();
        let cancel = self.cancel.clone();

        self.tasks.spawn(async move {
            if cancel.load(Ordering::SeqCst) {
                return Outcome::Cancelled;
            }

            let issued_at = Utc::now();
            debug!("Refreshing {}", name);
            let result = api.get_pipeline_state(&name).await;
            if cancel.load(Ordering::SeqCst) {
                return Outcome::Cancelled;
            }

            let result = match result {
                Ok(state) => {
                    cache.upsert(&name, state.pipeline, state.executions, issued_at);
                    Ok(())
                }
                Err(e) => {
                    cache.mark_error(&name, &e, issued_at);
                    Err(e)
                }
            };
            Outcome::Describe { name, result }
        });
    }

    fn complete(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::List(Ok(names)) => {
                debug!("Pipeline list refreshed: {} pipelines", names.len());
                self.scheduler.list_succeeded(&names);
                if std::mem::take(&mut self.list_failing) {
                    info!("Pipeline list refresh recovered");
                    self.emit(SchedulerEvent::ListRecovered);
                }
            }
            Outcome::List(Err(e)) => {
                let backoff = self.scheduler.list_failed(Instant::now());
                warn!("Pipeline list refresh failed, next attempt in {:?}: {}", backoff, e);
                if !self.report_fatal(&e) {
                    self.list_failing = true;
                    self.emit(SchedulerEvent::ListFailed(e.to_string()));
                }
            }
            Outcome::Describe { name, result: Ok(()) } => {
                self.scheduler.succeeded(&name);
            }
            Outcome::Describe {
                name,
                result: Err(e),
            } => {
                let backoff = self.scheduler.failed(&name, Instant::now());
                warn!(
                    "Refresh of {} failed, keeping last snapshot (backoff {:?}): {}",
                    name, backoff, e
                );
                if matches!(e, ApiError::NotFound(_)) {
                    self.scheduler.force_list();
                }
                self.report_fatal(&e);
            }
            Outcome::Cancelled => {}
        }
    }

    /// Report an auth failure once; returns whether `error` was fatal
    fn report_fatal(&mut self, error: &ApiError) -> bool {
        if !error.is_fatal() {
            return false;
        }
        if !self.fatal_reported {
            error!("Credentials rejected: {}", error);
            self.fatal_reported = true;
            self.emit(SchedulerEvent::Fatal(error.clone()));
        }
        true
    }

    fn emit(&self, event: SchedulerEvent) {
        if self.events.send(event).is_err() {
            debug!("Scheduler event dropped, no receiver");
        }
    }
}

/// List every pipeline and describe each one once
///
/// Describes run concurrently, bounded by the API's own call cap. A failed
/// describe marks its entry stale; only a failed list is an error.
pub async fn refresh_once<A: PipelineApi + 'static>(
    api: Arc<A>,
    cache: Arc<StateCache>,
) -> Result<(), ApiError> {
    let names = api.list_pipelines().await?;
    cache.sync_pipelines(&names);

    let mut tasks = JoinSet::new();
    for name in names {
        let api = api.clone();
        let cache = cache.clone();
        tasks.spawn(async move {
            let issued_at = Utc::now();
            match api.get_pipeline_state(&name).await {
                Ok(state) => {
                    cache.upsert(&name, state.pipeline, state.executions, issued_at);
                }
                Err(e) => {
                    warn!("Failed to describe {}: {}", name, e);
                    cache.mark_error(&name, &e, issued_at);
                }
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!("Describe task failed: {}", e);
        }
    }
    Ok(())
}

//! Interactive terminal session
//!
//! [`Session`] wires the controller to the refresh engine and the API: it
//! applies background results to the controller and carries out the effects
//! the controller returns. [`run`] puts the terminal in raw mode and drives a
//! session from keyboard input until the operator quits.

pub mod controller;
pub mod keymap;
pub mod render;

use crate::api::{ApiError, PipelineApi};
use crate::cache::{CacheSnapshot, StateCache};
use crate::core::{AppConfig, ExecutionId};
use crate::refresh::{RefreshEngine, SchedulerEvent, SchedulerHandle};
use anyhow::{Context, Result};
use chrono::Utc;
use crossterm::event::{self, Event};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

pub use controller::{Controller, Effect, Input, PendingTrigger, View};

/// Result of a `start_execution` call made for the operator
#[derive(Debug)]
pub struct TriggerResult {
    pub pipeline: String,
    pub result: Result<ExecutionId, ApiError>,
}

/// How an interactive session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The operator quit
    Quit,
    /// A failure (credentials) ended the session
    Fatal(String),
}

/// Controller plus the background machinery it steers
pub struct Session<A> {
    api: Arc<A>,
    cache: Arc<StateCache>,
    controller: Controller,
    scheduler: SchedulerHandle,
    events: mpsc::UnboundedReceiver<SchedulerEvent>,
    triggers_tx: mpsc::UnboundedSender<TriggerResult>,
    triggers_rx: mpsc::UnboundedReceiver<TriggerResult>,
}

impl<A: PipelineApi + 'static> Session<A> {
    /// Start the refresh engine and return a session on the list view
    ///
    /// `initial` is a pipeline list fetched before the session began; without
    /// one the engine lists pipelines first.
    pub fn start(
        api: Arc<A>,
        cache: Arc<StateCache>,
        config: &AppConfig,
        initial: Option<Vec<String>>,
    ) -> Self {
        let mut engine = RefreshEngine::from_config(api.clone(), cache.clone(), config);
        if let Some(names) = initial {
            engine = engine.with_initial_list(names);
        }
        let (scheduler, events) = engine.spawn();
        let (triggers_tx, triggers_rx) = mpsc::unbounded_channel();

        Self {
            api,
            cache,
            controller: Controller::new(),
            scheduler,
            events,
            triggers_tx,
            triggers_rx,
        }
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        self.cache.snapshot()
    }

    /// Apply one keyboard input
    pub fn handle_input(&mut self, input: Input) {
        let snapshot = self.cache.snapshot();
        let effects = self.controller.handle_input(input, &snapshot);
        self.apply(effects);
    }

    /// Apply finished triggers and scheduler events
    pub fn pump(&mut self) {
        while let Ok(TriggerResult { pipeline, result }) = self.triggers_rx.try_recv() {
            let effects = self.controller.on_trigger_result(&pipeline, result);
            self.apply(effects);
        }
        while let Ok(event) = self.events.try_recv() {
            let effects = self.controller.on_scheduler_event(event);
            self.apply(effects);
        }
        self.controller.reconcile(&self.cache.snapshot());
    }

    pub fn should_quit(&self) -> bool {
        self.controller.should_quit()
    }

    /// Stop background work and report how the session ended
    pub async fn shutdown(self) -> SessionEnd {
        self.scheduler.shutdown().await;
        match self.controller.fatal() {
            Some(message) => SessionEnd::Fatal(message.to_string()),
            None => SessionEnd::Quit,
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            debug!("Applying {:?}", effect);
            match effect {
                Effect::Quit => {}
                Effect::Focus(pipeline) => self.scheduler.set_focus(pipeline.as_deref()),
                Effect::RefreshNow(pipeline) => self.scheduler.refresh_now(&pipeline),
                Effect::RefreshList => self.scheduler.refresh_list(),
                Effect::StartExecution(pipeline) => self.spawn_trigger(pipeline),
            }
        }
    }

    fn spawn_trigger(&self, pipeline: String) {
        let api = self.api.clone();
        let results = self.triggers_tx.clone();
        tokio::spawn(async move {
            let result = api.start_execution(&pipeline).await;
            // The session may already be gone
            let _ = results.send(TriggerResult { pipeline, result });
        });
    }
}

type Term = Terminal<CrosstermBackend<Stdout>>;

fn setup_terminal() -> Result<Term> {
    let mut stdout = io::stdout();
    enable_raw_mode().context("Failed to enable raw mode")?;
    execute!(stdout, EnterAlternateScreen).context("Failed to enter alternate screen")?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))
        .context("Failed to initialise terminal")?;
    terminal.clear().context("Failed to clear terminal")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Term) {
    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();
}

/// Run the interactive session until the operator quits or credentials fail
pub async fn run<A: PipelineApi + 'static>(
    api: Arc<A>,
    cache: Arc<StateCache>,
    config: &AppConfig,
    initial: Option<Vec<String>>,
) -> Result<SessionEnd> {
    let mut terminal = setup_terminal()?;
    let mut session = Session::start(api, cache, config, initial);
    info!("Interactive session started");

    let result = run_loop(&mut terminal, &mut session, config.tick());

    restore_terminal(&mut terminal);
    let end = session.shutdown().await;
    result?;

    info!("Interactive session ended: {:?}", end);
    Ok(end)
}

fn run_loop<A: PipelineApi + 'static>(
    terminal: &mut Term,
    session: &mut Session<A>,
    tick: Duration,
) -> Result<()> {
    loop {
        session.pump();
        if session.should_quit() {
            return Ok(());
        }

        let snapshot = session.snapshot();
        terminal
            .draw(|frame| render::render(frame, session.controller(), &snapshot, Utc::now()))
            .context("Failed to draw frame")?;

        // Blocking poll; the refresh engine keeps running on the other workers
        let ready = tokio::task::block_in_place(|| event::poll(tick))
            .context("Failed to poll terminal events")?;
        if !ready {
            continue;
        }

        if let Event::Key(key) = event::read().context("Failed to read terminal event")? {
            if let Some(input) = keymap::map_key(key) {
                session.handle_input(input);
            }
        }
    }
}

//! Refresh scheduler - decides which refreshes are due
//!
//! Pure bookkeeping with no I/O: the engine asks for due work, reports when a
//! refresh starts and how it ended, and the scheduler moves each pipeline
//! through its refresh phases.

use crate::core::config::RefreshConfig;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;

/// Refresh state of a single pipeline (or of the pipeline list)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    /// Waiting for the next interval
    Idle,

    /// A request is in flight
    Refreshing,

    /// The last refresh failed; nothing is scheduled before `until`
    Backoff { until: Instant },
}

/// Refresh cadence as durations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSettings {
    pub list_interval: Duration,
    pub focused_interval: Duration,
    pub background_interval: Duration,
    pub failure_backoff: Duration,
    pub max_failure_backoff: Duration,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self::from(&RefreshConfig::default())
    }
}

impl From<&RefreshConfig> for RefreshSettings {
    fn from(config: &RefreshConfig) -> Self {
        Self {
            list_interval: Duration::from_secs(config.list_interval_secs),
            focused_interval: Duration::from_secs(config.focused_interval_secs),
            background_interval: Duration::from_secs(config.background_interval_secs),
            failure_backoff: Duration::from_secs(config.failure_backoff_secs),
            max_failure_backoff: Duration::from_secs(config.max_failure_backoff_secs),
        }
    }
}

/// Refresh bookkeeping for one target
#[derive(Debug, Clone)]
pub struct Track {
    pub phase: RefreshPhase,

    /// When the last request was issued
    pub last_started: Option<Instant>,

    pub consecutive_failures: u32,

    /// Refresh as soon as nothing is in flight, ignoring interval and backoff
    pub forced: bool,
}

impl Default for Track {
    fn default() -> Self {
        Self {
            phase: RefreshPhase::Idle,
            last_started: None,
            consecutive_failures: 0,
            forced: false,
        }
    }
}

impl Track {
    fn is_due(&self, interval: Duration, now: Instant) -> bool {
        match self.phase {
            RefreshPhase::Refreshing => false,
            _ if self.forced => true,
            RefreshPhase::Backoff { until } => now >= until,
            RefreshPhase::Idle => self
                .last_started
                .map_or(true, |started| now.duration_since(started) >= interval),
        }
    }

    fn begin(&mut self, now: Instant) {
        self.phase = RefreshPhase::Refreshing;
        self.last_started = Some(now);
        self.forced = false;
    }

    fn succeed(&mut self) {
        self.phase = RefreshPhase::Idle;
        self.consecutive_failures = 0;
    }

    fn fail(&mut self, settings: &RefreshSettings, now: Instant) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let exponent = (self.consecutive_failures - 1).min(16);
        let backoff = settings
            .failure_backoff
            .saturating_mul(1u32 << exponent)
            .min(settings.max_failure_backoff);
        self.phase = RefreshPhase::Backoff {
            until: now + backoff,
        };
        backoff
    }
}

/// Scheduler for list and describe refreshes
#[derive(Debug)]
pub struct RefreshScheduler {
    settings: RefreshSettings,
    list: Track,
    pipelines: HashMap<String, Track>,
    /// Pipeline names in list order
    order: Vec<String>,
    focus: Option<String>,
}

impl RefreshScheduler {
    pub fn new(settings: RefreshSettings) -> Self {
        Self {
            settings,
            list: Track::default(),
            pipelines: HashMap::new(),
            order: Vec::new(),
            focus: None,
        }
    }

    pub fn settings(&self) -> &RefreshSettings {
        &self.settings
    }

    /// Adopt the names of a successful list refresh
    pub fn sync(&mut self, names: &[String]) {
        self.pipelines.retain(|name, _| names.contains(name));
        for name in names {
            self.pipelines.entry(name.clone()).or_default();
        }
        let mut seen = HashSet::new();
        self.order = names
            .iter()
            .filter(|name| seen.insert(name.as_str()))
            .cloned()
            .collect();
    }

    pub fn set_focus(&mut self, focus: Option<String>) {
        self.focus = focus;
    }

    pub fn focus(&self) -> Option<&str> {
        self.focus.as_deref()
    }

    /// Request an immediate refresh of `name`
    pub fn force(&mut self, name: &str) {
        if !self.pipelines.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.pipelines.entry(name.to_string()).or_default().forced = true;
    }

    pub fn force_list(&mut self) {
        self.list.forced = true;
    }

    pub fn phase(&self, name: &str) -> Option<RefreshPhase> {
        self.pipelines.get(name).map(|t| t.phase)
    }

    pub fn list_due(&self, now: Instant) -> bool {
        self.list.is_due(self.settings.list_interval, now)
    }

    /// Pipelines due for a describe, forced and focused first, then list order
    pub fn due_pipelines(&self, now: Instant) -> Vec<String> {
        let mut due: Vec<(u8, usize, &String)> = self
            .order
            .iter()
            .enumerate()
            .filter_map(|(position, name)| {
                let track = self.pipelines.get(name)?;
                let focused = self.focus.as_deref() == Some(name.as_str());
                let interval = if focused {
                    self.settings.focused_interval
                } else {
                    self.settings.background_interval
                };
                if !track.is_due(interval, now) {
                    return None;
                }
                let rank = match (track.forced, focused) {
                    (true, _) => 0,
                    (false, true) => 1,
                    (false, false) => 2,
                };
                Some((rank, position, name))
            })
            .collect();
        due.sort();
        due.into_iter().map(|(_, _, name)| name.clone()).collect()
    }

    pub fn begin_list(&mut self, now: Instant) {
        self.list.begin(now);
    }

    pub fn list_succeeded(&mut self, names: &[String]) {
        self.list.succeed();
        self.sync(names);
    }

    pub fn list_failed(&mut self, now: Instant) -> Duration {
        self.list.fail(&self.settings, now)
    }

    pub fn begin(&mut self, name: &str, now: Instant) {
        if let Some(track) = self.pipelines.get_mut(name) {
            track.begin(now);
        }
    }

    pub fn succeeded(&mut self, name: &str) {
        if let Some(track) = self.pipelines.get_mut(name) {
            track.succeed();
        }
    }

    /// Record a failed describe; returns the backoff applied
    pub fn failed(&mut self, name: &str, now: Instant) -> Option<Duration> {
        let settings = self.settings;
        self.pipelines
            .get_mut(name)
            .map(|track| track.fail(&settings, now))
    }
}

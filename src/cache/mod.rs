//! In-memory state cache of pipelines and their recent executions
//!
//! The cache is the only state shared between the refresh tasks and the
//! terminal loop. Writers hand it finished results; the remote call always
//! happens before the write, so readers never wait on the network.
//!
//! Every write carries the time its request was issued. A result fetched
//! earlier than the snapshot already held is dropped, which keeps the visible
//! state monotonic when refreshes complete out of order.

use crate::api::{ApiError, ErrorKind};
use crate::core::{Execution, Pipeline, PipelineStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Last refresh failure recorded for an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryError {
    pub kind: ErrorKind,
    pub message: String,
    /// When the failing request was issued
    pub at: DateTime<Utc>,
}

impl EntryError {
    pub fn new(error: &ApiError, at: DateTime<Utc>) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            at,
        }
    }
}

/// Cached state of one pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub name: String,

    /// Last successful snapshot, `None` until the first describe succeeds
    pub pipeline: Option<Pipeline>,

    /// Recent executions, newest first, unique by id
    pub executions: Vec<Execution>,

    /// Issue time of the request that produced `pipeline`
    pub fetched_at: Option<DateTime<Utc>>,

    /// Set when the latest refresh failed
    pub error: Option<EntryError>,
}

impl CacheEntry {
    fn placeholder(name: &str) -> Self {
        Self {
            name: name.to_string(),
            pipeline: None,
            executions: Vec::new(),
            fetched_at: None,
            error: None,
        }
    }

    /// The last refresh failed; the snapshot (if any) is out of date
    pub fn is_stale(&self) -> bool {
        self.error.is_some()
    }

    /// Overall status of the last good snapshot
    pub fn status(&self) -> PipelineStatus {
        self.pipeline
            .as_ref()
            .map(|p| p.status)
            .unwrap_or_default()
    }

    pub fn latest_execution(&self) -> Option<&Execution> {
        self.executions.first()
    }

    pub fn execution(&self, id: &str) -> Option<&Execution> {
        self.executions.iter().find(|e| e.id == id)
    }
}

/// Immutable point-in-time view of the cache, cheap to clone and render
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    entries: Vec<Arc<CacheEntry>>,
}

impl CacheSnapshot {
    pub fn entries(&self) -> &[Arc<CacheEntry>] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&CacheEntry> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.as_ref())
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
struct CacheState {
    /// Pipeline names in list order
    order: Vec<String>,
    entries: HashMap<String, Arc<CacheEntry>>,
}

impl CacheState {
    /// Entries exist only for listed pipelines
    fn entry_mut(&mut self, name: &str) -> Option<&mut CacheEntry> {
        self.entries.get_mut(name).map(Arc::make_mut)
    }
}

/// Thread-safe pipeline state cache
#[derive(Debug, Default)]
pub struct StateCache {
    state: RwLock<CacheState>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot of `name` with a freshly fetched one
    ///
    /// Returns `false` and leaves the cache untouched when `name` is not in
    /// the last pipeline list or already holds a snapshot fetched after
    /// `fetched_at`. A recorded error is cleared unless it was observed after
    /// this fetch was issued.
    pub fn upsert(
        &self,
        name: &str,
        pipeline: Pipeline,
        executions: Vec<Execution>,
        fetched_at: DateTime<Utc>,
    ) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        let Some(entry) = state.entry_mut(name) else {
            debug!("Dropping snapshot of unlisted pipeline {}", name);
            return false;
        };
        if entry.fetched_at.is_some_and(|held| held > fetched_at) {
            debug!("Dropping out-of-order snapshot of {}", name);
            return false;
        }

        entry.pipeline = Some(pipeline);
        entry.executions = dedup_executions(executions);
        entry.fetched_at = Some(fetched_at);
        if entry.error.as_ref().is_some_and(|e| e.at <= fetched_at) {
            entry.error = None;
        }
        true
    }

    /// Record a failed refresh of `name`, keeping the last good snapshot
    ///
    /// Returns `false` when `name` is not listed, or when the entry holds a
    /// snapshot fetched after `observed_at` and the failure is superseded.
    pub fn mark_error(&self, name: &str, error: &ApiError, observed_at: DateTime<Utc>) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        let Some(entry) = state.entry_mut(name) else {
            return false;
        };
        if entry.fetched_at.is_some_and(|held| held > observed_at) {
            return false;
        }
        if entry.error.as_ref().is_some_and(|e| e.at > observed_at) {
            return false;
        }

        entry.error = Some(EntryError::new(error, observed_at));
        true
    }

    /// Apply a list refresh
    ///
    /// New names get a placeholder entry, names no longer listed are dropped
    /// and the entries take the order of `names`. Duplicate names are
    /// collapsed.
    pub fn sync_pipelines(&self, names: &[String]) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        let mut seen = HashSet::new();
        let order: Vec<String> = names
            .iter()
            .filter(|name| seen.insert(name.as_str()))
            .cloned()
            .collect();

        state.entries.retain(|name, _| seen.contains(name.as_str()));
        for name in &order {
            state
                .entries
                .entry(name.clone())
                .or_insert_with(|| Arc::new(CacheEntry::placeholder(name)));
        }
        state.order = order;
    }

    /// Point-in-time copy of every entry, in list order
    pub fn snapshot(&self) -> CacheSnapshot {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let entries = state
            .order
            .iter()
            .filter_map(|name| state.entries.get(name).cloned())
            .collect();
        CacheSnapshot { entries }
    }

    pub fn entry(&self, name: &str) -> Option<Arc<CacheEntry>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.entries.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.order.clone()
    }

    pub fn len(&self) -> usize {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keep the first record per id, newest first
fn dedup_executions(executions: Vec<Execution>) -> Vec<Execution> {
    let mut seen = HashSet::new();
    let mut unique: Vec<Execution> = executions
        .into_iter()
        .filter(|e| seen.insert(e.id.clone()))
        .collect();
    // Not yet started runs are the newest; the sort is stable for ties
    unique.sort_by_key(|e| (e.started_at.is_some(), Reverse(e.started_at)));
    unique
}

//! CLI output formatting

use crate::cache::{CacheEntry, CacheSnapshot};
use crate::core::{Execution, PipelineStatus};
use crate::ui::render::format_age;
use chrono::{DateTime, Utc};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a spinner for a single blocking step
pub fn create_spinner(message: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Format a pipeline status for display, padded to `width`
pub fn format_status(status: PipelineStatus, width: usize) -> String {
    let label = format!("{:<width$}", status.label(), width = width);
    match status {
        PipelineStatus::Succeeded => style(label).green().to_string(),
        PipelineStatus::Failed => style(label).red().to_string(),
        PipelineStatus::InProgress => style(label).yellow().to_string(),
        PipelineStatus::Stopped => style(label).dim().to_string(),
        PipelineStatus::Unknown => style(label).dim().to_string(),
    }
}

fn status_icon(status: PipelineStatus) -> Emoji<'static, 'static> {
    match status {
        PipelineStatus::Succeeded => CHECK,
        PipelineStatus::Failed => CROSS,
        PipelineStatus::InProgress => SPINNER,
        _ => INFO,
    }
}

/// Format the status table printed by `status`
pub fn format_status_table(snapshot: &CacheSnapshot, now: DateTime<Utc>) -> String {
    if snapshot.is_empty() {
        return format!("{} No pipelines found", INFO);
    }

    let name_width = snapshot
        .entries()
        .iter()
        .map(|e| e.name.len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());
    let status_width = "InProgress".len();

    let mut lines = vec![format!(
        "   {}",
        style(format!(
            "{:<name_width$}  {:<status_width$}  {:<38}  {:<9}  {}",
            "NAME",
            "STATUS",
            "LATEST EXECUTION",
            "TRIGGER",
            "STARTED",
            name_width = name_width,
            status_width = status_width,
        ))
        .bold()
    )];

    for entry in snapshot.entries() {
        lines.push(format_status_row(entry, name_width, status_width, now));
    }
    lines.join("\n")
}

fn format_status_row(
    entry: &CacheEntry,
    name_width: usize,
    status_width: usize,
    now: DateTime<Utc>,
) -> String {
    let status = entry.status();
    let (id, trigger, started) = match entry.latest_execution() {
        Some(execution) => (
            execution.id.clone(),
            execution.trigger.label().to_string(),
            execution
                .started_at
                .map(|at| format!("{} ago", format_age(at, now)))
                .unwrap_or_else(|| "-".to_string()),
        ),
        None => ("-".to_string(), "-".to_string(), "-".to_string()),
    };

    let mut row = format!(
        "{}{}  {}  {}  {:<9}  {}",
        status_icon(status),
        style(format!("{:<name_width$}", entry.name, name_width = name_width)).bold(),
        format_status(status, status_width),
        style(format!("{:<38}", id)).dim(),
        trigger,
        started,
    );
    if let Some(error) = &entry.error {
        row.push_str(&format!("  {}", style(format!("stale: {}", error.message)).yellow()));
    }
    row
}

/// JSON shape of one `status --json` row
#[derive(Debug, Serialize)]
pub struct StatusRow<'a> {
    pub name: &'a str,
    pub status: PipelineStatus,
    pub latest_execution: Option<&'a Execution>,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub error: Option<&'a str>,
}

/// Format the status rows as pretty JSON
pub fn format_status_json(snapshot: &CacheSnapshot) -> serde_json::Result<String> {
    let rows: Vec<StatusRow<'_>> = snapshot
        .entries()
        .iter()
        .map(|entry| StatusRow {
            name: &entry.name,
            status: entry.status(),
            latest_execution: entry.latest_execution(),
            refreshed_at: entry.fetched_at,
            error: entry.error.as_ref().map(|e| e.message.as_str()),
        })
        .collect();
    serde_json::to_string_pretty(&rows)
}

/// Whether a confirmation answer means yes
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::cache::StateCache;
    use crate::core::{Pipeline, TriggerType};

    fn cache_with_pipeline(now: DateTime<Utc>) -> StateCache {
        let cache = StateCache::new();
        cache.sync_pipelines(&["build-deploy".to_string(), "nightly".to_string()]);
        let pipeline = Pipeline {
            name: "build-deploy".to_string(),
            version: Some(1),
            stages: vec![],
            status: PipelineStatus::Succeeded,
            refreshed_at: now,
        };
        let execution = Execution {
            id: "exec-1".to_string(),
            pipeline: "build-deploy".to_string(),
            trigger: TriggerType::Manual,
            started_at: Some(now - chrono::Duration::minutes(2)),
            updated_at: None,
            status: PipelineStatus::Succeeded,
        };
        cache.upsert("build-deploy", pipeline, vec![execution], now);
        cache
    }

    #[test]
    fn test_status_table_lists_every_pipeline() {
        let now = Utc::now();
        let cache = cache_with_pipeline(now);
        cache.mark_error("nightly", &ApiError::Timeout(10), now);

        let table = console::strip_ansi_codes(&format_status_table(&cache.snapshot(), now)).to_string();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("LATEST EXECUTION"));
        assert!(lines[1].contains("build-deploy"));
        assert!(lines[1].contains("exec-1"));
        assert!(lines[1].contains("manual"));
        assert!(lines[1].contains("2m ago"));
        assert!(lines[2].contains("nightly"));
        assert!(lines[2].contains("stale: Timeout after 10 seconds"));
    }

    #[test]
    fn test_empty_status_table() {
        let table = format_status_table(&StateCache::new().snapshot(), Utc::now());
        assert!(table.contains("No pipelines found"));
    }

    #[test]
    fn test_status_json() {
        let now = Utc::now();
        let cache = cache_with_pipeline(now);

        let json = format_status_json(&cache.snapshot()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["name"], "build-deploy");
        assert_eq!(value[0]["status"], "Succeeded");
        assert_eq!(value[0]["latest_execution"]["id"], "exec-1");
        assert_eq!(value[1]["status"], "Unknown");
        assert!(value[1]["latest_execution"].is_null());
    }

    #[test]
    fn test_is_affirmative() {
        assert!(is_affirmative("y\n"));
        assert!(is_affirmative(" YES "));
        assert!(!is_affirmative(""));
        assert!(!is_affirmative("no"));
    }
}

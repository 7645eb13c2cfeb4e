//! Browsing and triggering through a session

use crate::helpers::*;
use chrono::Utc;
use codepipeline::cache::StateCache;
use codepipeline::core::AppConfig;
use codepipeline::ui::render::render_to_string;
use codepipeline::ui::{Input, PendingTrigger, Session, View};
use std::sync::Arc;
use std::time::Duration;

fn latest_id(cache: &StateCache, name: &str) -> Option<String> {
    cache
        .entry(name)
        .and_then(|entry| entry.latest_execution().map(|e| e.id.clone()))
}

/// Selecting a pipeline shows what the cache already holds
#[tokio::test]
async fn test_select_shows_cached_execution() {
    let api = Arc::new(MockApi::new(&["build-deploy"]));
    api.set_state("build-deploy", with_exec_1("build-deploy"));
    let cache = Arc::new(StateCache::new());

    let mut session = Session::start(api.clone(), cache.clone(), &AppConfig::default(), None);
    assert!(
        wait_until(Duration::from_secs(2), || latest_id(&cache, "build-deploy").is_some()).await,
        "pipeline was never described"
    );
    assert_eq!(api.list_calls(), 1);
    let describes = api.describe_calls();

    session.handle_input(Input::Select);
    session.pump();
    assert_eq!(
        session.controller().view(),
        &View::Detail {
            pipeline: "build-deploy".to_string()
        }
    );
    assert_eq!(api.describe_calls(), describes);

    let screen = render_to_string(session.controller(), &session.snapshot(), Utc::now(), 100, 30).unwrap();
    assert!(screen.contains("build-deploy"));
    assert!(screen.contains("exec-1"));

    session.shutdown().await;
}

/// A confirmed trigger is followed by an immediate refresh of that pipeline
#[tokio::test]
async fn test_trigger_refreshes_immediately() {
    let api = Arc::new(MockApi::new(&["build-deploy"]));
    api.set_state("build-deploy", with_exec_1("build-deploy"));
    api.after_start(with_exec_2("build-deploy"));
    api.queue_start(Ok("exec-2".to_string()));
    let cache = Arc::new(StateCache::new());

    let mut session = Session::start(
        api.clone(),
        cache.clone(),
        &AppConfig::default(),
        Some(vec!["build-deploy".to_string()]),
    );
    assert!(wait_until(Duration::from_secs(2), || latest_id(&cache, "build-deploy").is_some()).await);
    assert_eq!(api.list_calls(), 0);
    assert_eq!(api.describe_calls(), 1);

    session.handle_input(Input::Select);
    session.handle_input(Input::Trigger);
    assert!(matches!(session.controller().view(), View::ConfirmTrigger { .. }));
    session.handle_input(Input::Confirm);
    assert_eq!(
        session.controller().pending_trigger("build-deploy"),
        Some(PendingTrigger::InFlight)
    );

    let refreshed = wait_until(Duration::from_secs(2), || {
        session.pump();
        latest_id(&cache, "build-deploy").as_deref() == Some("exec-2")
    })
    .await;
    assert!(refreshed, "trigger was not followed by a refresh");
    session.pump();

    assert_eq!(api.start_calls(), 1);
    assert_eq!(api.describe_calls(), 2);
    assert_eq!(session.controller().pending_trigger("build-deploy"), None);
    assert!(session.controller().status().unwrap().contains("exec-2"));

    session.shutdown().await;
}

/// Confirming repeatedly never starts more than one execution
#[tokio::test]
async fn test_repeated_confirm_starts_once() {
    let api = Arc::new(MockApi::new(&["build-deploy"]));
    api.set_state("build-deploy", with_exec_1("build-deploy"));
    let cache = Arc::new(StateCache::new());

    let mut session = Session::start(
        api.clone(),
        cache.clone(),
        &AppConfig::default(),
        Some(vec!["build-deploy".to_string()]),
    );
    assert!(wait_until(Duration::from_secs(2), || latest_id(&cache, "build-deploy").is_some()).await);

    session.handle_input(Input::Select);
    session.handle_input(Input::Trigger);
    session.handle_input(Input::Confirm);
    session.handle_input(Input::Confirm);
    session.handle_input(Input::Select);
    // Still in flight, so no second confirmation opens
    session.handle_input(Input::Trigger);
    session.handle_input(Input::Confirm);
    assert!(matches!(session.controller().view(), View::Detail { .. }));

    assert!(
        wait_until(Duration::from_secs(2), || {
            session.pump();
            session.controller().in_flight().is_none()
        })
        .await
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(api.start_calls(), 1);

    session.shutdown().await;
}

/// A rejected trigger shows an error banner over the detail view
#[tokio::test]
async fn test_rejected_trigger_shows_error() {
    let api = Arc::new(MockApi::new(&["build-deploy"]));
    api.set_state("build-deploy", with_exec_1("build-deploy"));
    api.queue_start(Err(codepipeline::ApiError::Conflict(
        "execution already in progress".to_string(),
    )));
    let cache = Arc::new(StateCache::new());

    let mut session = Session::start(
        api.clone(),
        cache.clone(),
        &AppConfig::default(),
        Some(vec!["build-deploy".to_string()]),
    );
    assert!(wait_until(Duration::from_secs(2), || latest_id(&cache, "build-deploy").is_some()).await);

    session.handle_input(Input::Select);
    session.handle_input(Input::Trigger);
    session.handle_input(Input::Confirm);

    assert!(
        wait_until(Duration::from_secs(2), || {
            session.pump();
            matches!(session.controller().view(), View::Error { .. })
        })
        .await
    );
    assert!(!session.should_quit());

    session.handle_input(Input::Back);
    assert!(matches!(session.controller().view(), View::Detail { .. }));
    assert_eq!(latest_id(&cache, "build-deploy").as_deref(), Some("exec-1"));

    session.shutdown().await;
}

//! Failed refreshes, rejected credentials and read retries

use crate::helpers::*;
use codepipeline::api::{ApiError, PipelineApi, RetryPolicy, RetryingApi};
use codepipeline::cache::StateCache;
use codepipeline::core::AppConfig;
use codepipeline::refresh::refresh_once;
use codepipeline::ui::{Input, Session, SessionEnd};
use std::sync::Arc;
use std::time::Duration;

fn fast_retries() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

#[tokio::test]
async fn test_rejected_credentials_end_session() {
    let api = Arc::new(MockApi::new(&["build-deploy"]));
    api.fail_list(ApiError::Auth("ExpiredToken: the security token has expired".to_string()));
    let cache = Arc::new(StateCache::new());

    let mut session = Session::start(api.clone(), cache, &AppConfig::default(), None);
    let ended = wait_until(Duration::from_secs(2), || {
        session.pump();
        session.should_quit()
    })
    .await;
    assert!(ended, "auth failure did not end the session");

    match session.shutdown().await {
        SessionEnd::Fatal(message) => assert!(message.contains("ExpiredToken")),
        SessionEnd::Quit => panic!("expected a fatal end"),
    }
}

#[tokio::test]
async fn test_failed_refresh_keeps_last_snapshot() {
    let api = Arc::new(MockApi::new(&["build-deploy"]));
    api.set_state("build-deploy", with_exec_1("build-deploy"));
    let cache = Arc::new(StateCache::new());

    let mut session = Session::start(
        api.clone(),
        cache.clone(),
        &AppConfig::default(),
        Some(vec!["build-deploy".to_string()]),
    );
    assert!(wait_until(Duration::from_secs(2), || {
        cache.entry("build-deploy").is_some_and(|e| e.pipeline.is_some())
    })
    .await);

    api.fail_describe(
        "build-deploy",
        ApiError::Throttled {
            message: "Rate exceeded".to_string(),
            retry_after: None,
        },
    );
    session.handle_input(Input::Select);
    session.handle_input(Input::Refresh);

    assert!(wait_until(Duration::from_secs(2), || {
        cache.entry("build-deploy").is_some_and(|e| e.is_stale())
    })
    .await);
    let entry = cache.entry("build-deploy").unwrap();
    assert_eq!(entry.latest_execution().unwrap().id, "exec-1");
    assert!(!session.should_quit());

    session.shutdown().await;
}

#[tokio::test]
async fn test_refresh_once_marks_failed_describe_stale() {
    let api = Arc::new(MockApi::new(&["a", "b"]));
    api.set_state("a", with_exec_1("a"));
    api.fail_describe("b", ApiError::Timeout(10));
    let cache = Arc::new(StateCache::new());

    refresh_once(api.clone(), cache.clone()).await.unwrap();

    let snapshot = cache.snapshot();
    assert_eq!(snapshot.len(), 2);
    let a = snapshot.get("a").unwrap();
    assert!(!a.is_stale());
    assert_eq!(a.latest_execution().unwrap().id, "exec-1");
    let b = snapshot.get("b").unwrap();
    assert!(b.is_stale());
    assert!(b.pipeline.is_none());
}

#[tokio::test]
async fn test_refresh_once_fails_when_list_fails() {
    let api = Arc::new(MockApi::new(&["a"]));
    api.fail_list(ApiError::Transient("connection reset".to_string()));
    let cache = Arc::new(StateCache::new());

    let result = refresh_once(api.clone(), cache.clone()).await;
    assert!(matches!(result, Err(ApiError::Transient(_))));
    assert!(cache.is_empty());
    assert_eq!(api.describe_calls(), 0);
}

#[tokio::test]
async fn test_transient_describe_is_retried() {
    let mock = MockApi::new(&["a"]);
    mock.set_state("a", with_exec_1("a"));
    mock.fail_describe("a", ApiError::Transient("503 Service Unavailable".to_string()));
    let api = Arc::new(RetryingApi::new(mock, fast_retries()));
    let cache = Arc::new(StateCache::new());

    refresh_once(api.clone(), cache.clone()).await.unwrap();

    assert!(!cache.entry("a").unwrap().is_stale());
    assert_eq!(api.inner().describe_calls(), 2);
}

#[tokio::test]
async fn test_auth_failure_is_not_retried() {
    let mock = MockApi::new(&["a"]);
    mock.fail_describe("a", ApiError::Auth("InvalidClientTokenId".to_string()));
    let api = Arc::new(RetryingApi::new(mock, fast_retries()));
    let cache = Arc::new(StateCache::new());

    refresh_once(api.clone(), cache.clone()).await.unwrap();

    assert!(cache.entry("a").unwrap().is_stale());
    assert_eq!(api.inner().describe_calls(), 1);
}

#[tokio::test]
async fn test_start_is_never_retried() {
    let mock = MockApi::new(&["a"]);
    mock.queue_start(Err(ApiError::Transient("connection reset".to_string())));
    let api = RetryingApi::new(mock, fast_retries());

    let result = api.start_execution("a").await;
    assert!(matches!(result, Err(ApiError::Transient(_))));
    assert_eq!(api.inner().start_calls(), 1);
}

#[tokio::test]
async fn test_list_warning_clears_after_recovery() {
    let api = Arc::new(MockApi::new(&["a"]));
    api.set_state("a", with_exec_1("a"));
    api.fail_list(ApiError::Transient("connection reset".to_string()));
    let cache = Arc::new(StateCache::new());

    let mut session = Session::start(api.clone(), cache.clone(), &AppConfig::default(), None);
    let warned = wait_until(Duration::from_secs(2), || {
        session.pump();
        session.controller().status().is_some()
    })
    .await;
    assert!(warned, "failed list was not reported");
    assert!(session.controller().status().unwrap().contains("connection reset"));

    session.handle_input(Input::Refresh);
    let cleared = wait_until(Duration::from_secs(2), || {
        session.pump();
        session.controller().status().is_none()
    })
    .await;
    assert!(cleared, "warning outlived a successful list");
    assert_eq!(api.list_calls(), 2);
    assert_eq!(cache.names(), vec!["a".to_string()]);

    session.shutdown().await;
}

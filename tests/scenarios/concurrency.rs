//! Call cap and throttled pipelines sharing it with healthy ones

use crate::helpers::*;
use codepipeline::api::{ApiError, LimitedApi, RetryPolicy, RetryingApi};
use codepipeline::cache::StateCache;
use codepipeline::core::AppConfig;
use codepipeline::refresh::RefreshEngine;
use codepipeline::ui::{Input, Session};
use std::sync::Arc;
use std::time::{Duration, Instant};

type Stack = RetryingApi<LimitedApi<Arc<MockApi>>>;

/// The production layering: retries above a cap of `max_concurrent` calls
fn capped(mock: &Arc<MockApi>, max_concurrent: usize) -> Arc<Stack> {
    Arc::new(RetryingApi::new(
        LimitedApi::new(mock.clone(), max_concurrent),
        RetryPolicy::default(),
    ))
}

fn names(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

/// Throttle every describe of `name` `times` times, asking for 1s backoff
fn throttle(mock: &MockApi, name: &str, times: usize) {
    for _ in 0..times {
        mock.fail_describe(
            name,
            ApiError::Throttled {
                message: "Rate exceeded".to_string(),
                retry_after: Some(Duration::from_secs(1)),
            },
        );
    }
}

fn described(cache: &StateCache, name: &str) -> bool {
    cache.entry(name).is_some_and(|e| e.pipeline.is_some())
}

#[tokio::test]
async fn test_engine_respects_call_cap() {
    let all = ["p1", "p2", "p3", "p4", "p5", "p6", "p7", "p8"];
    let mock = Arc::new(MockApi::new(&all).with_describe_delay(Duration::from_millis(100)));
    for name in all {
        mock.set_state(name, with_exec_1(name));
    }
    let cache = Arc::new(StateCache::new());

    let engine = RefreshEngine::from_config(capped(&mock, 4), cache.clone(), &AppConfig::default());
    let (handle, _events) = engine.with_initial_list(names(&all)).spawn();

    let done = wait_until(Duration::from_secs(3), || all.iter().all(|n| described(&cache, n))).await;
    assert!(done, "not every pipeline was described");
    assert_eq!(mock.max_in_flight(), 4);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_throttled_pipelines_do_not_starve_others() {
    let mock = Arc::new(MockApi::new(&["a", "b", "c", "d", "e"]));
    for name in ["a", "b", "c", "d", "e"] {
        mock.set_state(name, with_exec_1(name));
    }
    for name in ["a", "b", "c", "d"] {
        throttle(&mock, name, 4);
    }
    let cache = Arc::new(StateCache::new());

    let started = Instant::now();
    let engine = RefreshEngine::from_config(capped(&mock, 4), cache.clone(), &AppConfig::default());
    let (handle, _events) = engine.with_initial_list(names(&["a", "b", "c", "d", "e"])).spawn();

    assert!(wait_until(Duration::from_secs(1), || described(&cache, "e")).await);
    assert!(started.elapsed() < Duration::from_secs(1));
    // The throttled ones are still backing off
    assert!(!described(&cache, "a"));

    handle.shutdown().await;
}

#[tokio::test]
async fn test_trigger_refresh_runs_while_others_back_off() {
    let mock = Arc::new(MockApi::new(&["a", "b", "c", "d", "e"]));
    for name in ["a", "b", "c", "d", "e"] {
        mock.set_state(name, with_exec_1(name));
    }
    for name in ["a", "b", "c", "d"] {
        throttle(&mock, name, 4);
    }
    mock.after_start(with_exec_2("e"));
    mock.queue_start(Ok("exec-2".to_string()));
    let cache = Arc::new(StateCache::new());

    let mut session = Session::start(
        capped(&mock, 4),
        cache.clone(),
        &AppConfig::default(),
        Some(names(&["a", "b", "c", "d", "e"])),
    );
    assert!(wait_until(Duration::from_secs(1), || described(&cache, "e")).await);

    session.handle_input(Input::End);
    session.handle_input(Input::Select);
    session.handle_input(Input::Trigger);
    session.handle_input(Input::Confirm);

    let started = Instant::now();
    let refreshed = wait_until(Duration::from_secs(1), || {
        session.pump();
        cache
            .entry("e")
            .and_then(|e| e.latest_execution().map(|x| x.id.clone()))
            .as_deref()
            == Some("exec-2")
    })
    .await;
    assert!(refreshed, "post-trigger refresh waited on throttled pipelines");
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(mock.start_calls(), 1);

    session.shutdown().await;
}

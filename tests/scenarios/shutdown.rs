//! Leaving a session with refreshes still in flight

use crate::helpers::*;
use codepipeline::cache::StateCache;
use codepipeline::core::AppConfig;
use codepipeline::ui::{Input, Session, SessionEnd};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_quit_does_not_wait_for_inflight_describe() {
    let api = Arc::new(MockApi::new(&["slow"]).with_describe_delay(Duration::from_secs(60)));
    api.set_state("slow", with_exec_1("slow"));
    let cache = Arc::new(StateCache::new());

    let mut session = Session::start(
        api.clone(),
        cache.clone(),
        &AppConfig::default(),
        Some(vec!["slow".to_string()]),
    );
    assert!(wait_until(Duration::from_secs(2), || api.describe_calls() == 1).await);

    session.handle_input(Input::Quit);
    assert!(session.should_quit());

    let started = Instant::now();
    let end = tokio::time::timeout(Duration::from_secs(2), session.shutdown())
        .await
        .expect("shutdown waited for the in-flight describe");
    assert_eq!(end, SessionEnd::Quit);
    assert!(started.elapsed() < Duration::from_secs(2));

    // The abandoned describe never lands in the cache
    tokio::time::sleep(Duration::from_millis(200)).await;
    let entry = cache.entry("slow").unwrap();
    assert!(entry.pipeline.is_none());
    assert!(entry.fetched_at.is_none());
    assert_eq!(api.describe_calls(), 1);
}

#[tokio::test]
async fn test_no_refresh_after_shutdown() {
    let api = Arc::new(MockApi::new(&["a", "b"]));
    api.set_state("a", with_exec_1("a"));
    api.set_state("b", with_exec_1("b"));
    let cache = Arc::new(StateCache::new());

    let session = Session::start(api.clone(), cache.clone(), &AppConfig::default(), None);
    assert!(wait_until(Duration::from_secs(2), || api.describe_calls() == 2).await);

    session.shutdown().await;
    let (lists, describes) = (api.list_calls(), api.describe_calls());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(api.list_calls(), lists);
    assert_eq!(api.describe_calls(), describes);
}

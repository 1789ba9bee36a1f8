//! Tests for runner construction

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cron_control_runner::builders::RunnerBuilder;
use cron_control_runner::config::RunnerConfig;
use cron_control_runner::core::{EventExecutor, ExecutionResult, PendingEvent, Site};
use cron_control_runner::infra::{StaticDirectory, StaticEventSource};
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
struct InstantExecutor;

#[async_trait]
impl EventExecutor for InstantExecutor {
    async fn run(&self, _event: &PendingEvent) -> ExecutionResult {
        ExecutionResult::success(Duration::ZERO, None)
    }
}

fn static_config() -> RunnerConfig {
    let mut config = RunnerConfig::default();
    config.pool.workers = 2;
    config.poll.interval_secs = 3600;
    config
}

#[tokio::test]
async fn test_build_requires_directory_without_overrides() {
    let result = RunnerBuilder::new(RunnerConfig::default()).build().await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_build_with_static_sources_skips_directory_check() {
    let runner = RunnerBuilder::new(static_config())
        .with_directory(Arc::new(StaticDirectory::new(vec![Site::new("a", "https://a")])))
        .with_event_source(Arc::new(StaticEventSource::new()))
        .build_with_executor(InstantExecutor)
        .await
        .unwrap();
    assert!(runner.metrics_addr().is_none());
    assert_eq!(runner.dispatcher().pool().capacity(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_runner_runs_and_stops_on_cancel() {
    let mut config = static_config();
    config.metrics.listen_addr = Some("127.0.0.1:0".into());

    let source = Arc::new(StaticEventSource::new());
    source.set_events("a", vec![("hook".into(), 1, serde_json::json!([]))]);

    let runner = RunnerBuilder::new(config)
        .with_directory(Arc::new(StaticDirectory::new(vec![Site::new("a", "https://a")])))
        .with_event_source(source)
        .build_with_executor(InstantExecutor)
        .await
        .unwrap();
    assert!(runner.metrics_addr().is_some());
    let pool = Arc::clone(runner.dispatcher().pool());

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(runner.run(cancel.clone()));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while pool.stats().succeeded < 1 {
        assert!(tokio::time::Instant::now() < deadline, "event never ran");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

//! Tests for the metrics endpoint

use std::sync::Arc;

use cron_control_runner::config::MetricsConfig;
use cron_control_runner::core::{MetricsSink, Observation};
use cron_control_runner::infra::PrometheusSink;
use cron_control_runner::runtime::metrics_server;
use tokio_util::sync::CancellationToken;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_metrics_endpoint_serves_registry() {
    let sink = Arc::new(PrometheusSink::new(&MetricsConfig::default()).unwrap());
    sink.record(&Observation::SaturationHit);

    let listener = metrics_server::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let server = tokio::spawn(metrics_server::serve(listener, sink, cancel.clone()));

    let body = reqwest::get(format!("http://{addr}/metrics"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("cron_control_runner_run_worker_all_busy_hits 1"));

    let health = reqwest::get(format!("http://{addr}/healthz")).await.unwrap();
    assert!(health.status().is_success());

    cancel.cancel();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let taken = metrics_server::bind("127.0.0.1:0").await.unwrap();
    let addr = taken.local_addr().unwrap().to_string();
    assert!(metrics_server::bind(&addr).await.is_err());
}

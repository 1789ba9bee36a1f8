//! HTTP exposition of the Prometheus registry.
//!
//! Routes:
//! - `GET /metrics` text exposition of every runner metric
//! - `GET /healthz` liveness check

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::core::error::RunnerError;
use crate::infra::metrics::PrometheusSink;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Bind the metrics listener. Failure is fatal to the process.
///
/// # Errors
///
/// [`RunnerError::Io`] if the address cannot be bound.
pub async fn bind(addr: &str) -> Result<TcpListener, RunnerError> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Metrics listener bound");
    Ok(listener)
}

/// Router serving `sink`'s registry.
pub fn router(sink: Arc<PrometheusSink>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz))
        .with_state(sink)
}

/// Serve metrics on `listener` until `cancel` fires.
///
/// # Errors
///
/// The server's I/O error.
pub async fn serve(
    listener: TcpListener,
    sink: Arc<PrometheusSink>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, router(sink))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
}

async fn metrics_handler(State(sink): State<Arc<PrometheusSink>>) -> impl IntoResponse {
    match sink.encode() {
        Ok(text) => (StatusCode::OK, [(header::CONTENT_TYPE, TEXT_FORMAT)], text),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, TEXT_FORMAT)],
                format!("Failed to encode metrics: {e}"),
            )
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

//! Process-level lifecycle: start, run until cancelled, drain, stop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::error::AppResult;
use crate::core::executor::EventExecutor;
use crate::core::{Dispatcher, WorkerPool};
use crate::infra::command::SubprocessExecutor;
use crate::infra::metrics::PrometheusSink;
use crate::infra::queue::InMemoryEventQueue;

use super::metrics_server;

/// A fully wired runner.
///
/// Built by [`RunnerBuilder`](crate::builders::RunnerBuilder).
pub struct Runner<E = SubprocessExecutor>
where
    E: EventExecutor,
{
    dispatcher: Dispatcher<InMemoryEventQueue, E>,
    pool: Arc<WorkerPool<E>>,
    metrics: Option<(TcpListener, Arc<PrometheusSink>)>,
    shutdown_timeout: Duration,
}

impl<E> Runner<E>
where
    E: EventExecutor,
{
    pub(crate) fn new(
        dispatcher: Dispatcher<InMemoryEventQueue, E>,
        pool: Arc<WorkerPool<E>>,
        metrics: Option<(TcpListener, Arc<PrometheusSink>)>,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            dispatcher,
            pool,
            metrics,
            shutdown_timeout,
        }
    }

    /// The dispatcher driving this runner.
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher<InMemoryEventQueue, E> {
        &self.dispatcher
    }

    /// Address the metrics endpoint is bound to, if enabled.
    #[must_use]
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        self.metrics
            .as_ref()
            .and_then(|(listener, _)| listener.local_addr().ok())
    }

    /// Run until `cancel` fires, then wait for in-flight executions.
    ///
    /// Cancellation takes effect at cycle boundaries; executions already
    /// running finish or time out within the shutdown timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics server fails.
    pub async fn run(mut self, cancel: CancellationToken) -> AppResult<()> {
        let server = self.metrics.take().map(|(listener, sink)| {
            let token = cancel.child_token();
            tokio::spawn(metrics_server::serve(listener, sink, token))
        });

        self.dispatcher.run(cancel.clone()).await;

        let pool = Arc::clone(&self.pool);
        let timeout = self.shutdown_timeout;
        let clean = tokio::task::spawn_blocking(move || pool.shutdown_with_timeout(timeout))
            .await
            .context("pool shutdown task failed")?;
        if !clean {
            warn!(
                timeout_secs = timeout.as_secs(),
                "Some executions were still running at shutdown"
            );
        }

        if let Some(server) = server {
            server
                .await
                .context("metrics server task failed")?
                .context("metrics server failed")?;
        }

        let stats = self.pool.stats();
        info!(
            dispatched = stats.dispatched,
            succeeded = stats.succeeded,
            failed = stats.failed,
            saturation_hits = stats.saturation_hits,
            "Runner stopped"
        );
        Ok(())
    }

    /// Run until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if signal handlers cannot be installed or the metrics
    /// server fails.
    pub async fn run_until_signal(self) -> AppResult<()> {
        let cancel = CancellationToken::new();
        let watcher = spawn_signal_watcher(cancel.clone())?;
        let result = self.run(cancel).await;
        watcher.abort();
        result
    }
}

fn spawn_signal_watcher(cancel: CancellationToken) -> AppResult<tokio::task::JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;

    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("Received SIGINT, shutting down"),
            () = cancel.cancelled() => return,
        }
        cancel.cancel();
    }))
}


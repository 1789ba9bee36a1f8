//! Build a [`Runner`] from configuration.

use std::sync::Arc;

use anyhow::Context;

use crate::config::RunnerConfig;
use crate::core::error::AppResult;
use crate::core::executor::EventExecutor;
use crate::core::metrics::{noop_sink, SharedSink};
use crate::core::source::{EventSource, SiteDirectory};
use crate::core::{Dispatcher, WorkerPool};
use crate::infra::command::SubprocessExecutor;
use crate::infra::metrics::PrometheusSink;
use crate::infra::queue::InMemoryEventQueue;
use crate::infra::source::{HttpEventSource, HttpSiteDirectory};
use crate::runtime::{metrics_server, Runner};

/// Wires sources, queue, pool, dispatcher and metrics together.
///
/// Sources default to the HTTP clients described by the configuration; tests
/// and dry runs can substitute their own.
pub struct RunnerBuilder {
    config: RunnerConfig,
    directory: Option<Arc<dyn SiteDirectory>>,
    source: Option<Arc<dyn EventSource>>,
}

impl RunnerBuilder {
    /// Start from a configuration.
    #[must_use]
    pub const fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            directory: None,
            source: None,
        }
    }

    /// Use `directory` instead of the HTTP directory.
    #[must_use]
    pub fn with_directory(mut self, directory: Arc<dyn SiteDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Use `source` instead of the HTTP event source.
    #[must_use]
    pub fn with_event_source(mut self, source: Arc<dyn EventSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Build a runner executing events with the configured command.
    ///
    /// # Errors
    ///
    /// Invalid configuration, HTTP client setup failure, or failure to bind
    /// the metrics listener.
    pub async fn build(self) -> AppResult<Runner> {
        let executor = SubprocessExecutor::new(self.config.command.clone(), &self.config.pool);
        self.build_with_executor(executor).await
    }

    /// Build a runner around a caller-supplied executor.
    ///
    /// # Errors
    ///
    /// Same as [`RunnerBuilder::build`].
    pub async fn build_with_executor<E>(self, executor: E) -> AppResult<Runner<E>>
    where
        E: EventExecutor,
    {
        let Self {
            config,
            directory,
            source,
        } = self;

        let overridden = directory.is_some() && source.is_some();
        if overridden {
            // The directory address is irrelevant when both sources are supplied
            config.pool.validate().map_err(anyhow::Error::msg)?;
            config.poll.validate().map_err(anyhow::Error::msg)?;
        } else {
            config.validate().context("invalid configuration")?;
        }

        let timeout = config.poll.request_timeout();
        let directory: Arc<dyn SiteDirectory> = match directory {
            Some(d) => d,
            None => Arc::new(HttpSiteDirectory::new(&config.source, timeout)?),
        };
        let source: Arc<dyn EventSource> = match source {
            Some(s) => s,
            None => Arc::new(HttpEventSource::new(&config.source, timeout)?),
        };

        let mut metrics = None;
        let sink: SharedSink = match &config.metrics.listen_addr {
            Some(addr) => {
                let prometheus = Arc::new(
                    PrometheusSink::new(&config.metrics)
                        .context("failed to create metrics registry")?,
                );
                let listener = metrics_server::bind(addr)
                    .await
                    .with_context(|| format!("failed to bind metrics listener on {addr}"))?;
                metrics = Some((listener, Arc::clone(&prometheus)));
                prometheus
            }
            None => noop_sink(),
        };

        let pool = Arc::new(
            WorkerPool::new(config.pool.clone(), executor, Arc::clone(&sink))
                .context("failed to start worker pool")?,
        );
        let queue = InMemoryEventQueue::new(config.poll.max_queue_depth);
        let dispatcher = Dispatcher::new(
            directory,
            source,
            queue,
            Arc::clone(&pool),
            sink,
            config.poll.clone(),
        );

        Ok(Runner::new(
            dispatcher,
            pool,
            metrics,
            config.pool.shutdown_timeout(),
        ))
    }
}

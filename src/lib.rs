//! # Cron Control Runner
//!
//! An externally driven runner that executes scheduled site events
//! out-of-band from request traffic.
//!
//! Each site in a fleet keeps its own list of due events, but nothing inside
//! a site runs them reliably. This crate periodically discovers the active
//! sites, asks each one which events are due, and runs every due event by
//! invoking a management tool as a subprocess with a hard timeout.
//!
//! ## Key Features
//!
//! - **Bounded fan-out**: sites are polled concurrently under a cap that is
//!   independent of the number of execution workers
//! - **Deduplicated queue**: repeated discovery of one event collapses into a
//!   single entry, ordered earliest-due first
//! - **Fixed-capacity worker pool**: dedicated OS threads; saturation rejects
//!   the dispatch and requeues the event instead of blocking
//! - **Supervised subprocesses**: per-execution timeout, process-group kill,
//!   and OS resource accounting (peak RSS, user/system CPU)
//! - **Prometheus metrics**: latency histograms, worker gauges and a
//!   saturation counter served on `/metrics`
//!
//! ## Wiring it up
//!
//! ```rust,ignore
//! use cron_control_runner::builders::RunnerBuilder;
//! use cron_control_runner::config::RunnerConfig;
//!
//! let config = RunnerConfig::from_file("runner.json".as_ref())?;
//! let runner = RunnerBuilder::new(config).build().await?;
//! runner.run_until_signal().await?;
//! ```
//!
//! ## Driving cycles by hand
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cron_control_runner::config::{PollConfig, PoolConfig};
//! use cron_control_runner::core::{noop_sink, Dispatcher, WorkerPool};
//! use cron_control_runner::infra::{InMemoryEventQueue, StaticDirectory, StaticEventSource};
//!
//! let pool = Arc::new(WorkerPool::new(PoolConfig::new().with_workers(2), executor, noop_sink())?);
//! let dispatcher = Dispatcher::new(
//!     Arc::new(StaticDirectory::new(sites)),
//!     Arc::new(StaticEventSource::new()),
//!     InMemoryEventQueue::new(1_000),
//!     pool,
//!     noop_sink(),
//!     PollConfig::default(),
//! );
//! let report = dispatcher.run_cycle().await;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: events, queue, worker pool and dispatcher.
pub mod core;
/// Configuration models for the pool, polling, sources, command and metrics.
pub mod config;
/// Builders to construct a runner from configuration.
pub mod builders;
/// Infrastructure adapters for sources, queues, subprocess execution and metrics.
pub mod infra;
/// Process runtime: metrics exposition and the runner lifecycle.
pub mod runtime;
/// Shared utilities.
pub mod util;

//! Core scheduling abstractions: data model, queue, worker pool and dispatcher.

pub mod dispatcher;
pub mod error;
pub mod event;
pub mod executor;
pub mod metrics;
pub mod queue;
pub mod source;
pub mod worker_pool;

pub use dispatcher::{CycleReport, Dispatcher, DrainReport};
pub use error::{AppResult, RunnerError};
pub use event::{
    argument_signature, DedupKey, ExecutionResult, Outcome, PendingEvent, ResourceUsage, Site,
};
pub use executor::EventExecutor;
pub use metrics::{noop_sink, InMemorySink, MetricsSink, NoopSink, Observation, SharedSink, Status};
pub use queue::{ClaimSet, ClaimedEvent, EventQueue, InsertOutcome, SyncSummary};
pub use source::{EventSource, SiteDirectory};
pub use worker_pool::{DispatchRejected, PoolError, PoolStats, WorkerPool};

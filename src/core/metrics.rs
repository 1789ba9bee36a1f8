//! Metrics sink abstraction and in-process implementations.
//!
//! Every component reports through a [`MetricsSink`]. Observations are a
//! closed set of tagged records so that a backend can map each one to a
//! fixed set of label dimensions. Components work unchanged with the
//! [`NoopSink`] when no backend is attached.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::core::event::{ExecutionResult, Site};

/// Success/failure dimension shared by all latency observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Operation succeeded.
    Success,
    /// Operation failed.
    Failure,
}

impl Status {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

impl From<bool> for Status {
    fn from(success: bool) -> Self {
        if success {
            Self::Success
        } else {
            Self::Failure
        }
    }
}

/// One telemetry observation.
#[derive(Debug, Clone)]
pub enum Observation {
    /// The site directory was queried.
    SiteListing {
        /// Outcome of the query.
        status: Status,
        /// Time taken.
        elapsed: Duration,
    },
    /// One site's event source was queried.
    EventListing {
        /// Site identifier.
        site: String,
        /// Outcome of the query.
        status: Status,
        /// Time taken.
        elapsed: Duration,
        /// Number of due events returned (0 on failure).
        events: usize,
    },
    /// One event finished executing.
    Execution {
        /// Site the event ran against.
        site: Arc<Site>,
        /// Hook name.
        hook: String,
        /// Execution result.
        result: ExecutionResult,
    },
    /// Instantaneous worker pool state.
    WorkerState {
        /// Fixed pool capacity.
        capacity: usize,
        /// Busy workers.
        busy: usize,
    },
    /// A dispatch attempt found every worker busy.
    SaturationHit,
}

/// Destination for observations.
///
/// The default implementation drops everything.
pub trait MetricsSink: Send + Sync {
    /// Record one observation.
    fn record(&self, observation: &Observation) {
        let _ = observation;
    }
}

/// Sink that discards every observation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl MetricsSink for NoopSink {}

/// Shared handle to a sink.
pub type SharedSink = Arc<dyn MetricsSink>;

/// A sink handle that discards everything.
#[must_use]
pub fn noop_sink() -> SharedSink {
    Arc::new(NoopSink)
}

/// Bounded in-memory sink for tests and dry runs.
pub struct InMemorySink {
    observations: Mutex<VecDeque<Observation>>,
    max_observations: usize,
}

impl InMemorySink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_observations: usize) -> Self {
        Self {
            observations: Mutex::new(VecDeque::with_capacity(max_observations.min(1024))),
            max_observations,
        }
    }

    /// Retrieve a snapshot of stored observations.
    #[must_use]
    pub fn observations(&self) -> Vec<Observation> {
        self.observations.lock().iter().cloned().collect()
    }

    /// Number of saturation hits recorded.
    #[must_use]
    pub fn saturation_hits(&self) -> usize {
        self.observations
            .lock()
            .iter()
            .filter(|o| matches!(o, Observation::SaturationHit))
            .count()
    }

    /// Execution results recorded, in completion order.
    #[must_use]
    pub fn executions(&self) -> Vec<(Arc<Site>, String, ExecutionResult)> {
        self.observations
            .lock()
            .iter()
            .filter_map(|o| match o {
                Observation::Execution { site, hook, result } => {
                    Some((Arc::clone(site), hook.clone(), result.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Event listings recorded for `site` as `(status, events)` pairs.
    #[must_use]
    pub fn event_listings(&self, site: &str) -> Vec<(Status, usize)> {
        self.observations
            .lock()
            .iter()
            .filter_map(|o| match o {
                Observation::EventListing {
                    site: s,
                    status,
                    events,
                    ..
                } if s == site => Some((*status, *events)),
                _ => None,
            })
            .collect()
    }

    /// Statuses of recorded site listings.
    #[must_use]
    pub fn site_listings(&self) -> Vec<Status> {
        self.observations
            .lock()
            .iter()
            .filter_map(|o| match o {
                Observation::SiteListing { status, .. } => Some(*status),
                _ => None,
            })
            .collect()
    }
}

impl MetricsSink for InMemorySink {
    fn record(&self, observation: &Observation) {
        let mut observations = self.observations.lock();
        if observations.len() >= self.max_observations {
            observations.pop_front();
        }
        observations.push_back(observation.clone());
    }
}

//! Fixed-capacity worker pool with reject-and-requeue admission.
//!
//! The pool owns `capacity` dedicated worker threads. A dispatch first
//! reserves a slot with a lock-free compare-and-swap on the busy counter; if
//! every slot is busy the attempt is rejected immediately, the saturation
//! counter is incremented, and the claimed event is handed back to the caller
//! for requeueing. Nothing ever waits for a slot.
//!
//! # Key Features
//!
//! - **Bounded**: `0 <= busy <= capacity` at all times
//! - **Fail fast**: saturation is surfaced as a counter, never as blocking
//! - **Unskippable release**: slots are RAII guards released on every path,
//!   including executor panics and timeouts
//! - **Continuous state**: busy/idle/max gauges published on every change and
//!   on demand via [`WorkerPool::publish_state`]
//!
//! # Example
//!
//! ```rust,ignore
//! use cron_control_runner::config::PoolConfig;
//! use cron_control_runner::core::{noop_sink, WorkerPool};
//!
//! let pool = WorkerPool::new(PoolConfig::new().with_workers(4), my_executor, noop_sink())?;
//! match pool.try_dispatch(claimed) {
//!     Ok(()) => {}
//!     Err(rejected) => queue.requeue(rejected.into_claimed()),
//! }
//! ```

mod native;

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::core::metrics::{Observation, SharedSink};
use crate::core::queue::ClaimedEvent;

pub use native::WorkerPool;

/// Errors that can occur when building or running a `WorkerPool`.
#[derive(Debug)]
pub enum PoolError {
    /// Configuration validation failed.
    InvalidConfig(String),

    /// Internal error (worker thread could not be spawned, etc.).
    Internal(String),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for PoolError {}

/// A dispatch attempt that was not accepted. Carries the event back.
#[derive(Debug)]
pub enum DispatchRejected {
    /// Every worker was busy.
    Saturated(ClaimedEvent),
    /// The pool has been shut down.
    Shutdown(ClaimedEvent),
}

impl DispatchRejected {
    /// Recover the claimed event so it can be requeued.
    #[must_use]
    pub fn into_claimed(self) -> ClaimedEvent {
        match self {
            Self::Saturated(c) | Self::Shutdown(c) => c,
        }
    }

    /// Whether the rejection was due to saturation.
    #[must_use]
    pub const fn is_saturated(&self) -> bool {
        matches!(self, Self::Saturated(_))
    }
}

impl fmt::Display for DispatchRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Saturated(_) => write!(f, "all workers busy"),
            Self::Shutdown(_) => write!(f, "pool has been shut down"),
        }
    }
}

/// Snapshot of pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Fixed number of workers.
    pub capacity: usize,

    /// Workers currently holding a slot.
    pub busy: usize,

    /// `capacity - busy`.
    pub idle: usize,

    /// Dispatch attempts rejected because every worker was busy.
    pub saturation_hits: u64,

    /// Events handed to a worker.
    pub dispatched: u64,

    /// Executions that finished with `success`.
    pub succeeded: u64,

    /// Executions that finished with any other outcome.
    pub failed: u64,
}

impl PoolStats {
    /// Instantaneous fraction of busy workers, in `[0, 1]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn busy_fraction(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.busy as f64 / self.capacity as f64
        }
    }
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub saturation_hits: AtomicU64,
    pub dispatched: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
}

/// State shared between the pool handle, its workers and slot guards.
pub(crate) struct PoolShared {
    capacity: usize,
    busy: AtomicUsize,
    pub counters: PoolCounters,
    released: Notify,
    pub sink: SharedSink,
}

impl PoolShared {
    pub fn new(capacity: usize, sink: SharedSink) -> Self {
        Self {
            capacity,
            busy: AtomicUsize::new(0),
            counters: PoolCounters::default(),
            released: Notify::new(),
            sink,
        }
    }

    /// Try to reserve a slot atomically using a CAS loop.
    pub fn try_reserve(self: &Arc<Self>) -> Option<SlotGuard> {
        let mut current = self.busy.load(Ordering::Acquire);
        loop {
            if current >= self.capacity {
                return None;
            }
            match self.busy.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(SlotGuard {
                        shared: Arc::clone(self),
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }

    pub fn snapshot(&self) -> PoolStats {
        let busy = self.busy.load(Ordering::Acquire).min(self.capacity);
        PoolStats {
            capacity: self.capacity,
            busy,
            idle: self.capacity - busy,
            saturation_hits: self.counters.saturation_hits.load(Ordering::Relaxed),
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    pub fn publish_state(&self) {
        self.sink.record(&Observation::WorkerState {
            capacity: self.capacity,
            busy: self.busy.load(Ordering::Acquire).min(self.capacity),
        });
    }

    pub const fn released(&self) -> &Notify {
        &self.released
    }
}

/// One reserved worker slot. Dropping it releases the slot.
pub(crate) struct SlotGuard {
    shared: Arc<PoolShared>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.shared.busy.fetch_sub(1, Ordering::AcqRel);
        self.shared.publish_state();
        self.shared.released.notify_one();
    }
}

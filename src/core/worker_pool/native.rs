//! `WorkerPool` on dedicated OS threads.
//!
//! Every worker owns a single-threaded tokio runtime and blocks on a bounded
//! crossbeam channel. A subprocess that hangs until its timeout therefore
//! occupies exactly one worker and never the discovery runtime.
//!
//! A slot is reserved before a dispatch is sent, so the channel (sized to the
//! capacity) never fills. Dropping the sender ends every worker's loop.

use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::config::PoolConfig;
use crate::core::event::{ExecutionResult, Outcome};
use crate::core::executor::EventExecutor;
use crate::core::metrics::{Observation, SharedSink};
use crate::core::queue::ClaimedEvent;

use super::{DispatchRejected, PoolError, PoolShared, PoolStats, SlotGuard};

/// A claimed event travelling to a worker together with its slot.
struct Dispatch {
    claimed: ClaimedEvent,
    slot: SlotGuard,
}

/// Fixed set of execution workers with non-blocking admission.
///
/// Slot reservation is a CAS on the shared busy counter; a dispatch that
/// finds every slot taken is handed back as [`DispatchRejected::Saturated`].
pub struct WorkerPool<E>
where
    E: EventExecutor,
{
    /// Pool configuration.
    config: PoolConfig,

    /// Slot accounting, counters and sink shared with workers.
    shared: Arc<PoolShared>,

    /// Sender half of the dispatch channel. Taken on shutdown.
    dispatch_tx: Mutex<Option<Sender<Dispatch>>>,

    /// Set once; refuses further dispatches.
    shutdown: AtomicBool,

    /// Worker thread handles.
    workers: Mutex<Vec<JoinHandle<()>>>,

    /// Phantom data for executor type.
    _executor: PhantomData<E>,
}

impl<E> WorkerPool<E>
where
    E: EventExecutor,
{
    /// Create a new worker pool with the given configuration and executor.
    ///
    /// This spawns `config.workers` OS threads, each with its own
    /// single-threaded tokio runtime for running events.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` if the configuration is invalid and
    /// `PoolError::Internal` if a worker thread cannot be spawned.
    pub fn new(config: PoolConfig, executor: E, sink: SharedSink) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;

        let (dispatch_tx, dispatch_rx) = bounded::<Dispatch>(config.workers);
        let shared = Arc::new(PoolShared::new(config.workers, sink));
        let shutdown = AtomicBool::new(false);

        let mut workers = Vec::with_capacity(config.workers);
        for worker_id in 0..config.workers {
            let worker = spawn_worker(
                worker_id,
                dispatch_rx.clone(),
                Arc::clone(&shared),
                executor.clone(),
                config.thread_stack_size,
            )
            .map_err(|e| PoolError::Internal(format!("failed to spawn worker {worker_id}: {e}")))?;
            workers.push(worker);
        }

        info!(
            workers = config.workers,
            execution_timeout_secs = config.execution_timeout_secs,
            "WorkerPool initialized with dedicated OS threads"
        );
        shared.publish_state();

        Ok(Self {
            config,
            shared,
            dispatch_tx: Mutex::new(Some(dispatch_tx)),
            shutdown,
            workers: Mutex::new(workers),
            _executor: PhantomData,
        })
    }

    /// Hand a claimed event to an idle worker, or reject immediately.
    ///
    /// Never blocks. A rejection because every worker is busy increments the
    /// saturation counter exactly once.
    ///
    /// # Errors
    ///
    /// - `DispatchRejected::Saturated` if every worker is busy
    /// - `DispatchRejected::Shutdown` if the pool has been shut down
    pub fn try_dispatch(&self, claimed: ClaimedEvent) -> Result<(), DispatchRejected> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(DispatchRejected::Shutdown(claimed));
        }

        let Some(slot) = self.shared.try_reserve() else {
            self.shared
                .counters
                .saturation_hits
                .fetch_add(1, Ordering::Relaxed);
            self.shared.sink.record(&Observation::SaturationHit);
            debug!(key = %claimed.event().key, "All workers busy, dispatch rejected");
            return Err(DispatchRejected::Saturated(claimed));
        };

        // Get sender (brief lock)
        let dispatch_tx_guard = self.dispatch_tx.lock();
        let Some(dispatch_tx) = dispatch_tx_guard.as_ref() else {
            // Pool is shutting down; the slot is released on return
            return Err(DispatchRejected::Shutdown(claimed));
        };

        let key = claimed.event().key.clone();
        match dispatch_tx.try_send(Dispatch { claimed, slot }) {
            Ok(()) => {
                self.shared
                    .counters
                    .dispatched
                    .fetch_add(1, Ordering::Relaxed);
                self.shared.publish_state();
                debug!(key = %key, "Event dispatched to worker pool");
                Ok(())
            }
            // Unreachable while reserved slots bound the channel occupancy
            Err(TrySendError::Full(dispatch)) => {
                warn!(key = %key, "Worker channel unexpectedly full");
                Err(DispatchRejected::Saturated(dispatch.claimed))
            }
            Err(TrySendError::Disconnected(dispatch)) => {
                Err(DispatchRejected::Shutdown(dispatch.claimed))
            }
        }
    }

    /// Get current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.shared.snapshot()
    }

    /// Configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.config.workers
    }

    /// Publish the instantaneous worker state to the sink.
    pub fn publish_state(&self) {
        self.shared.publish_state();
    }

    /// Notified whenever a worker releases its slot.
    #[must_use]
    pub fn released(&self) -> &Notify {
        self.shared.released()
    }

    /// Shut down the pool gracefully, waiting up to the configured shutdown
    /// timeout for running executions.
    ///
    /// Returns `true` if every worker exited within the timeout.
    pub fn shutdown(&self) -> bool {
        self.shutdown_with_timeout(self.config.shutdown_timeout())
    }

    /// Shut down the pool, waiting up to `timeout` for running executions.
    ///
    /// This drops the dispatch sender to unblock idle workers, then joins all
    /// workers against a single deadline. Dispatches that were sent but not
    /// yet started are dropped, releasing their claims and slots. Workers that
    /// don't exit before the deadline are detached to prevent hangs.
    pub fn shutdown_with_timeout(&self, timeout: Duration) -> bool {
        // Check if already shut down
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return true;
        }

        info!("Shutting down worker pool");

        // Drop the sender to unblock all workers waiting on recv()
        {
            let mut dispatch_tx = self.dispatch_tx.lock();
            *dispatch_tx = None;
        }

        let deadline = Instant::now() + timeout;
        let mut workers = self.workers.lock();
        let worker_count = workers.len();
        let mut all_joined = true;

        for (idx, worker) in workers.drain(..).enumerate() {
            // Join through a helper thread so the wait can be bounded
            let (tx, rx) = std::sync::mpsc::channel();
            let join_thread = thread::spawn(move || {
                let result = worker.join();
                let _ = tx.send(result.is_ok());
            });

            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(true) => {
                    debug!(worker_id = idx, "Worker joined successfully");
                    let _ = join_thread.join();
                }
                Ok(false) => {
                    warn!(worker_id = idx, "Worker panicked");
                    let _ = join_thread.join();
                }
                Err(_) => {
                    warn!(worker_id = idx, "Worker did not exit within timeout - detaching");
                    all_joined = false;
                }
            }
        }

        info!(worker_count = worker_count, all_joined, "Worker pool shut down complete");
        all_joined
    }
}

impl<E> Drop for WorkerPool<E>
where
    E: EventExecutor,
{
    fn drop(&mut self) {
        // Signal shutdown but DON'T join workers in Drop
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            let mut dispatch_tx = self.dispatch_tx.lock();
            *dispatch_tx = None;
            debug!("WorkerPool dropped without explicit shutdown - workers will be detached");
        }
    }
}

/// Spawn a worker thread.
fn spawn_worker<E>(
    worker_id: usize,
    dispatch_rx: Receiver<Dispatch>,
    shared: Arc<PoolShared>,
    executor: E,
    stack_size: usize,
) -> std::io::Result<JoinHandle<()>>
where
    E: EventExecutor,
{
    thread::Builder::new()
        .name(format!("run-worker-{worker_id}"))
        .stack_size(stack_size)
        .spawn(move || {
            debug!(worker_id = worker_id, "Worker thread started");

            // Each worker has its own single-threaded tokio runtime
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!(
                        worker_id = worker_id,
                        error = %e,
                        "Failed to create worker runtime"
                    );
                    return;
                }
            };

            // Buffered dispatches are still delivered after the sender is
            // dropped; recv only fails once the channel is drained.
            while let Ok(Dispatch { claimed, slot }) = dispatch_rx.recv() {
                let event = claimed.event();
                debug!(
                    worker_id = worker_id,
                    site = %event.site.id,
                    hook = %event.hook,
                    timestamp = event.timestamp,
                    "Worker running event"
                );

                let result = rt.block_on(async {
                    AssertUnwindSafe(executor.run(event))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            error!(worker_id = worker_id, key = %event.key, "Executor panicked");
                            ExecutionResult::failure(
                                Outcome::SpawnFailure,
                                "panic",
                                Duration::ZERO,
                                None,
                            )
                        })
                });

                let counter = if result.outcome.is_success() {
                    &shared.counters.succeeded
                } else {
                    &shared.counters.failed
                };
                counter.fetch_add(1, Ordering::Relaxed);

                if result.outcome.is_success() {
                    debug!(
                        worker_id = worker_id,
                        site = %event.site.id,
                        hook = %event.hook,
                        elapsed_ms = result.elapsed.as_millis(),
                        "Event succeeded"
                    );
                } else {
                    warn!(
                        worker_id = worker_id,
                        site = %event.site.id,
                        hook = %event.hook,
                        outcome = %result.outcome,
                        reason = %result.reason,
                        elapsed_ms = result.elapsed.as_millis(),
                        "Event failed"
                    );
                }

                shared.sink.record(&Observation::Execution {
                    site: Arc::clone(&event.site),
                    hook: event.hook.clone(),
                    result,
                });

                // Claim first, then slot: a freed slot must not observe a
                // still-claimed key.
                drop(claimed);
                drop(slot);
            }

            debug!(worker_id = worker_id, "Worker thread exiting");
        })
}

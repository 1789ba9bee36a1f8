//! Poll cycles and queue draining.
//!
//! A [`Dispatcher`] ties the collaborators together. Each cycle it lists the
//! active sites, polls up to `poll_workers` of them concurrently for due
//! events, merges every fresh listing into the queue, and drains the queue
//! into the worker pool until the queue is empty or the pool rejects.
//!
//! Between cycles the queue is also drained whenever a worker frees its slot,
//! so saturated backlogs do not wait a full interval.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PollConfig;
use crate::core::event::{PendingEvent, Site};
use crate::core::executor::EventExecutor;
use crate::core::metrics::{Observation, SharedSink, Status};
use crate::core::queue::{EventQueue, InsertOutcome, SyncSummary};
use crate::core::source::{EventSource, SiteDirectory};
use crate::core::worker_pool::WorkerPool;

/// What one poll cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Whether the site directory answered.
    pub directory_ok: bool,
    /// Sites listed by the directory.
    pub sites: usize,
    /// Sites whose event source failed.
    pub sites_failed: usize,
    /// Due events returned across all sites.
    pub events_received: usize,
    /// Queue changes from merging fresh listings.
    pub sync: SyncSummary,
    /// Queued entries dropped because their site left the directory.
    pub stale_removed: usize,
    /// Outcome of the drain that closed the cycle.
    pub drain: DrainReport,
}

/// What one drain did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Events handed to workers.
    pub dispatched: usize,
    /// Whether the drain stopped because the pool rejected an event.
    pub rejected: bool,
}

/// Drives discovery and dispatch.
pub struct Dispatcher<Q, E>
where
    Q: EventQueue,
    E: EventExecutor,
{
    directory: Arc<dyn SiteDirectory>,
    source: Arc<dyn EventSource>,
    queue: Arc<Mutex<Q>>,
    pool: Arc<WorkerPool<E>>,
    sink: SharedSink,
    poll: PollConfig,
}

impl<Q, E> Dispatcher<Q, E>
where
    Q: EventQueue,
    E: EventExecutor,
{
    /// Create a dispatcher over the given collaborators.
    pub fn new(
        directory: Arc<dyn SiteDirectory>,
        source: Arc<dyn EventSource>,
        queue: Q,
        pool: Arc<WorkerPool<E>>,
        sink: SharedSink,
        poll: PollConfig,
    ) -> Self {
        Self {
            directory,
            source,
            queue: Arc::new(Mutex::new(queue)),
            pool,
            sink,
            poll,
        }
    }

    /// Shared handle to the queue.
    #[must_use]
    pub fn queue(&self) -> Arc<Mutex<Q>> {
        Arc::clone(&self.queue)
    }

    /// The worker pool events are dispatched to.
    #[must_use]
    pub const fn pool(&self) -> &Arc<WorkerPool<E>> {
        &self.pool
    }

    /// Run one discovery cycle followed by a drain.
    ///
    /// A directory failure skips discovery for this cycle but still drains
    /// whatever is queued. A failing site is skipped and leaves its queued
    /// entries untouched.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        if let Some(sites) = self.discover_sites().await {
            report.directory_ok = true;
            report.sites = sites.len();

            let active: HashSet<String> = sites.iter().map(|s| s.id.clone()).collect();
            report.stale_removed = self.queue.lock().retain_sites(&active);
            if report.stale_removed > 0 {
                info!(
                    removed = report.stale_removed,
                    "Dropped queued events of sites no longer listed"
                );
            }

            let mut listings = stream::iter(sites.into_iter().map(Arc::new))
                .map(|site| async move {
                    let events = self.poll_site(&site).await;
                    (site, events)
                })
                .buffer_unordered(self.poll.poll_workers);

            while let Some((site, events)) = listings.next().await {
                let Some(events) = events else {
                    report.sites_failed += 1;
                    continue;
                };
                report.events_received += events.len();
                let summary = self.queue.lock().sync_site(&site.id, events);
                if summary.rejected > 0 {
                    warn!(
                        site = %site.id,
                        rejected = summary.rejected,
                        "Queue full, due events not admitted"
                    );
                }
                merge_summary(&mut report.sync, summary);
            }
        }

        report.drain = self.drain();
        report
    }

    /// Hand queued events to the pool until it is empty or the pool rejects.
    ///
    /// A rejected event goes back to the queue with its ordering intact.
    pub fn drain(&self) -> DrainReport {
        let mut report = DrainReport::default();
        let mut queue = self.queue.lock();

        while let Some(claimed) = queue.claim() {
            match self.pool.try_dispatch(claimed) {
                Ok(()) => report.dispatched += 1,
                Err(rejected) => {
                    let reason = rejected.to_string();
                    let claimed = rejected.into_claimed();
                    let key = claimed.event().key.to_string();
                    if queue.requeue(claimed) != InsertOutcome::Added {
                        warn!(key = %key, "Rejected event could not be requeued");
                    }
                    debug!(reason = %reason, queued = queue.len(), "Drain stopped");
                    report.rejected = true;
                    break;
                }
            }
        }

        report
    }

    /// Run cycles at the configured interval until `cancel` fires.
    ///
    /// The first cycle starts immediately. A cycle that overruns the interval
    /// delays the next one rather than stacking them. A cycle in progress
    /// when `cancel` fires completes before this returns.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut poll = tokio::time::interval(self.poll.interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stats = tokio::time::interval(self.poll.stats_interval());
        stats.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_secs = self.poll.interval_secs,
            poll_workers = self.poll.poll_workers,
            workers = self.pool.capacity(),
            "Dispatcher started"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                // A started cycle runs to completion; polls are bounded by
                // their request timeouts.
                _ = poll.tick() => {
                    let report = self.run_cycle().await;
                    log_cycle(&report, self.queue.lock().len());
                }
                () = self.pool.released().notified() => {
                    let report = self.drain();
                    if report.dispatched > 0 {
                        debug!(dispatched = report.dispatched, "Drained after slot release");
                    }
                }
                _ = stats.tick() => self.pool.publish_state(),
            }
        }

        info!("Dispatcher stopped");
    }

    async fn discover_sites(&self) -> Option<Vec<Site>> {
        let started = Instant::now();
        let result = self.directory.list_sites().await;
        self.sink.record(&Observation::SiteListing {
            status: Status::from(result.is_ok()),
            elapsed: started.elapsed(),
        });

        match result {
            Ok(sites) => {
                debug!(sites = sites.len(), "Site directory listed");
                Some(sites)
            }
            Err(e) => {
                warn!(error = %e, "Site directory unavailable, skipping discovery");
                None
            }
        }
    }

    async fn poll_site(&self, site: &Arc<Site>) -> Option<Vec<PendingEvent>> {
        let started = Instant::now();
        let result = self.source.list_due_events(site).await;
        let elapsed = started.elapsed();

        let events = match &result {
            Ok(events) => events.len(),
            Err(_) => 0,
        };
        self.sink.record(&Observation::EventListing {
            site: site.id.clone(),
            status: Status::from(result.is_ok()),
            elapsed,
            events,
        });

        match result {
            Ok(events) => {
                debug!(site = %site.id, events = events.len(), "Due events listed");
                Some(events)
            }
            Err(e) => {
                warn!(site = %site.id, error = %e, "Failed to list due events");
                None
            }
        }
    }
}

fn merge_summary(total: &mut SyncSummary, part: SyncSummary) {
    total.added += part.added;
    total.duplicates += part.duplicates;
    total.superseded += part.superseded;
    total.rejected += part.rejected;
}

fn log_cycle(report: &CycleReport, queued: usize) {
    info!(
        directory_ok = report.directory_ok,
        sites = report.sites,
        sites_failed = report.sites_failed,
        events = report.events_received,
        added = report.sync.added,
        superseded = report.sync.superseded,
        dispatched = report.drain.dispatched,
        saturated = report.drain.rejected,
        queued,
        "Poll cycle complete"
    );
}

//! Due-event queue abstraction and the claim set shared with workers.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::event::{DedupKey, PendingEvent};

/// Result of offering an event to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The event was new and is now queued.
    Added,
    /// An entry with the same dedup key is already queued.
    Duplicate,
    /// An entry with the same dedup key is currently executing.
    InFlight,
    /// The queue is at its maximum depth.
    Full,
}

/// Counts produced by merging one site's fresh listing into the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Newly queued events.
    pub added: usize,
    /// Events already queued or executing.
    pub duplicates: usize,
    /// Queued events dropped because the source no longer lists them.
    pub superseded: usize,
    /// Events rejected because the queue was full.
    pub rejected: usize,
}

/// Abstraction for due-event queue backends.
///
/// Implementations order entries earliest-scheduled first, ties broken by
/// dedup key, and never hold two entries with the same key.
pub trait EventQueue: Send {
    /// Offer an event. Idempotent per dedup key.
    fn insert(&mut self, event: PendingEvent) -> InsertOutcome;

    /// Merge a fresh listing for `site`.
    ///
    /// Every listed event is offered; queued entries of that site missing
    /// from the listing are dropped.
    fn sync_site(&mut self, site: &str, events: Vec<PendingEvent>) -> SyncSummary;

    /// Drop queued entries whose site is not in `sites`. Returns the count.
    fn retain_sites(&mut self, sites: &HashSet<String>) -> usize;

    /// Remove and claim the earliest entry.
    fn claim(&mut self) -> Option<ClaimedEvent>;

    /// Give a claimed entry back, releasing its claim.
    fn requeue(&mut self, claimed: ClaimedEvent) -> InsertOutcome;

    /// Queued (unclaimed) entries.
    fn len(&self) -> usize;

    /// Whether no entry is queued.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Claimed entries that have not been released yet.
    fn in_flight(&self) -> usize;
}

/// Set of dedup keys currently owned by workers.
///
/// Shared between the queue, which refuses to re-admit a claimed key, and
/// the [`ClaimedEvent`] guards, which release their key when dropped.
#[derive(Debug, Default)]
pub struct ClaimSet {
    keys: Mutex<HashSet<DedupKey>>,
}

impl ClaimSet {
    /// Create an empty claim set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` is currently claimed.
    #[must_use]
    pub fn contains(&self, key: &DedupKey) -> bool {
        self.keys.lock().contains(key)
    }

    /// Number of outstanding claims.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    /// Whether there are no outstanding claims.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.lock().is_empty()
    }

    /// Claim `event`. Returns `None` if its key is already claimed.
    #[must_use]
    pub fn claim(self: &Arc<Self>, event: PendingEvent) -> Option<ClaimedEvent> {
        if !self.keys.lock().insert(event.key.clone()) {
            return None;
        }
        Some(ClaimedEvent {
            event,
            claims: Arc::clone(self),
        })
    }

    fn release(&self, key: &DedupKey) {
        self.keys.lock().remove(key);
    }
}

/// Exclusive ownership of one claimed event.
///
/// The claim is released when the guard is dropped, on every path.
pub struct ClaimedEvent {
    event: PendingEvent,
    claims: Arc<ClaimSet>,
}

impl ClaimedEvent {
    /// The claimed event.
    #[must_use]
    pub const fn event(&self) -> &PendingEvent {
        &self.event
    }
}

impl fmt::Debug for ClaimedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaimedEvent")
            .field("key", &self.event.key)
            .finish_non_exhaustive()
    }
}

impl Drop for ClaimedEvent {
    fn drop(&mut self) {
        self.claims.release(&self.event.key);
    }
}

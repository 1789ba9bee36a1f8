//! In-memory due-event queue ordered by scheduled-for time.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::core::event::{DedupKey, PendingEvent};
use crate::core::queue::{ClaimSet, ClaimedEvent, EventQueue, InsertOutcome, SyncSummary};

/// Ordering key: scheduled-for timestamp first, dedup key as tie-breaker.
type OrderKey = (i64, DedupKey);

fn order_key(key: &DedupKey) -> OrderKey {
    (key.timestamp, key.clone())
}

/// In-memory queue storing pending events in a sorted map.
/// This provides O(log n) insert, lookup and claim operations.
pub struct InMemoryEventQueue {
    max_depth: usize,
    entries: BTreeMap<OrderKey, PendingEvent>,
    claims: Arc<ClaimSet>,
}

impl InMemoryEventQueue {
    /// Create a new in-memory queue with a maximum depth.
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self::with_claims(max_depth, Arc::new(ClaimSet::new()))
    }

    /// Create a queue sharing an existing claim set.
    #[must_use]
    pub fn with_claims(max_depth: usize, claims: Arc<ClaimSet>) -> Self {
        Self {
            max_depth,
            entries: BTreeMap::new(),
            claims,
        }
    }

    /// The claim set guarding in-flight entries.
    #[must_use]
    pub fn claims(&self) -> Arc<ClaimSet> {
        Arc::clone(&self.claims)
    }

    /// Maximum number of queued entries.
    #[must_use]
    pub const fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Whether an entry with `key` is queued.
    #[must_use]
    pub fn contains(&self, key: &DedupKey) -> bool {
        self.entries.contains_key(&order_key(key))
    }

    /// Queued entries in claim order, without claiming them.
    pub fn iter(&self) -> impl Iterator<Item = &PendingEvent> {
        self.entries.values()
    }
}

impl EventQueue for InMemoryEventQueue {
    fn insert(&mut self, event: PendingEvent) -> InsertOutcome {
        if self.claims.contains(&event.key) {
            return InsertOutcome::InFlight;
        }
        let key = order_key(&event.key);
        if self.entries.contains_key(&key) {
            return InsertOutcome::Duplicate;
        }
        if self.entries.len() >= self.max_depth {
            return InsertOutcome::Full;
        }
        self.entries.insert(key, event);
        InsertOutcome::Added
    }

    fn sync_site(&mut self, site: &str, events: Vec<PendingEvent>) -> SyncSummary {
        let listed: HashSet<DedupKey> = events.iter().map(|e| e.key.clone()).collect();
        let before = self.entries.len();
        self.entries
            .retain(|(_, key), _| key.site != site || listed.contains(key));
        let mut summary = SyncSummary {
            superseded: before - self.entries.len(),
            ..SyncSummary::default()
        };

        for event in events {
            match self.insert(event) {
                InsertOutcome::Added => summary.added += 1,
                InsertOutcome::Duplicate | InsertOutcome::InFlight => summary.duplicates += 1,
                InsertOutcome::Full => summary.rejected += 1,
            }
        }
        summary
    }

    fn retain_sites(&mut self, sites: &HashSet<String>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(_, key), _| sites.contains(&key.site));
        before - self.entries.len()
    }

    fn claim(&mut self) -> Option<ClaimedEvent> {
        while let Some((_, event)) = self.entries.pop_first() {
            // Keys are never queued while claimed, so this only skips on a
            // shared claim set fed from elsewhere.
            if let Some(claimed) = self.claims.claim(event) {
                return Some(claimed);
            }
        }
        None
    }

    fn requeue(&mut self, claimed: ClaimedEvent) -> InsertOutcome {
        let event = claimed.event().clone();
        drop(claimed);
        self.insert(event)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn in_flight(&self) -> usize {
        self.claims.len()
    }
}

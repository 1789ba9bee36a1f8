//! In-memory site directory and event source.
//!
//! Both can be reconfigured while a dispatcher is running, which makes them
//! the backends of choice for tests and dry runs.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::error::RunnerError;
use crate::core::event::{PendingEvent, Site};
use crate::core::source::{EventSource, SiteDirectory};

/// Directory returning a fixed, replaceable site list.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    sites: Mutex<Vec<Site>>,
    unreachable: Mutex<bool>,
}

impl StaticDirectory {
    /// Directory listing `sites`.
    #[must_use]
    pub fn new(sites: Vec<Site>) -> Self {
        Self {
            sites: Mutex::new(sites),
            unreachable: Mutex::new(false),
        }
    }

    /// Replace the listed sites.
    pub fn set_sites(&self, sites: Vec<Site>) {
        *self.sites.lock() = sites;
    }

    /// Make subsequent listings fail (or succeed again).
    pub fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.lock() = unreachable;
    }
}

#[async_trait]
impl SiteDirectory for StaticDirectory {
    async fn list_sites(&self) -> Result<Vec<Site>, RunnerError> {
        if *self.unreachable.lock() {
            return Err(RunnerError::SourceUnreachable("directory offline".into()));
        }
        Ok(self.sites.lock().clone())
    }
}

/// Event to be listed for a site: `(hook, timestamp, args)`.
pub type StaticEvent = (String, i64, serde_json::Value);

/// Event source answering from a per-site table.
#[derive(Debug, Default)]
pub struct StaticEventSource {
    events: Mutex<HashMap<String, Vec<StaticEvent>>>,
    unreachable: Mutex<HashSet<String>>,
}

impl StaticEventSource {
    /// Empty source: every site has nothing due.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the due events of `site`.
    pub fn set_events(&self, site: &str, events: Vec<StaticEvent>) {
        self.events.lock().insert(site.to_owned(), events);
    }

    /// Make listings of `site` fail (or succeed again).
    pub fn set_unreachable(&self, site: &str, unreachable: bool) {
        let mut set = self.unreachable.lock();
        if unreachable {
            set.insert(site.to_owned());
        } else {
            set.remove(site);
        }
    }
}

#[async_trait]
impl EventSource for StaticEventSource {
    async fn list_due_events(&self, site: &Arc<Site>) -> Result<Vec<PendingEvent>, RunnerError> {
        if self.unreachable.lock().contains(&site.id) {
            return Err(RunnerError::SourceUnreachable(format!(
                "site {} offline",
                site.id
            )));
        }
        let events = self.events.lock();
        Ok(events
            .get(&site.id)
            .map(|list| {
                list.iter()
                    .map(|(hook, ts, args)| {
                        PendingEvent::new(Arc::clone(site), hook.clone(), *ts, args.clone(), None)
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

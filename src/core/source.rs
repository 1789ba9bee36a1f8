//! Read contracts of the platform-side collaborator.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::error::RunnerError;
use crate::core::event::{PendingEvent, Site};

/// Enumerates the sites the runner is responsible for.
#[async_trait]
pub trait SiteDirectory: Send + Sync {
    /// Fetch the current, complete list of active sites.
    ///
    /// # Errors
    ///
    /// [`RunnerError::SourceUnreachable`] on transport failure or a non-success
    /// status, [`RunnerError::SourceError`] on an undecodable response.
    async fn list_sites(&self) -> Result<Vec<Site>, RunnerError>;
}

/// Enumerates the events a site considers due right now.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetch the due events for one site. An empty list is a valid answer.
    ///
    /// # Errors
    ///
    /// Same classification as [`SiteDirectory::list_sites`].
    async fn list_due_events(&self, site: &Arc<Site>) -> Result<Vec<PendingEvent>, RunnerError>;
}

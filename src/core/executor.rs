//! Event execution trait.

use async_trait::async_trait;

use crate::core::event::{ExecutionResult, PendingEvent};

/// Abstraction for running one due event and classifying the result.
///
/// The executor is responsible for the actual work of running an event. It
/// must always produce an [`ExecutionResult`]: failures are classified, not
/// propagated.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use cron_control_runner::core::{EventExecutor, ExecutionResult, PendingEvent};
/// use std::time::Duration;
///
/// #[derive(Clone)]
/// struct DryRunExecutor;
///
/// #[async_trait]
/// impl EventExecutor for DryRunExecutor {
///     async fn run(&self, event: &PendingEvent) -> ExecutionResult {
///         tracing::info!(hook = %event.hook, "would run");
///         ExecutionResult::success(Duration::ZERO, None)
///     }
/// }
/// ```
///
/// # Threading
///
/// Inside a [`WorkerPool`](crate::core::WorkerPool) this method is called from
/// a dedicated worker thread with its own single-threaded tokio runtime, so a
/// slow execution never blocks discovery.
#[async_trait]
pub trait EventExecutor: Send + Sync + Clone + 'static {
    /// Run `event` to completion (or timeout) and report what happened.
    async fn run(&self, event: &PendingEvent) -> ExecutionResult;
}

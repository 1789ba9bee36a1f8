//! Infrastructure adapters for sources, queues, execution and metrics.

pub mod command;
pub mod metrics;
pub mod queue;
pub mod source;

pub use command::SubprocessExecutor;
pub use metrics::PrometheusSink;
pub use queue::InMemoryEventQueue;
pub use source::{HttpEventSource, HttpSiteDirectory, StaticDirectory, StaticEventSource};

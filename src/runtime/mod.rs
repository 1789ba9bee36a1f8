//! Process runtime: metrics exposition and the runner lifecycle.

pub mod metrics_server;
pub mod runner;

pub use runner::Runner;

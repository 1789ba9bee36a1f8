//! Configuration models for the pool, polling, sources, command and metrics.

pub mod runner;

pub use runner::{
    CommandConfig, ConfigError, MetricsConfig, PollConfig, PoolConfig, RunnerConfig, SourceConfig,
};

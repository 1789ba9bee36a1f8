//! Builders to construct runner components from configuration.

pub mod runner_builder;

pub use runner_builder::RunnerBuilder;

//! Shared utilities.

pub mod labels;
pub mod telemetry;

pub use labels::*;
pub use telemetry::*;

//! Metrics backends.

pub mod prometheus;

pub use self::prometheus::PrometheusSink;

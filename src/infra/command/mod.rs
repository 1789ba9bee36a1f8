//! Management tool invocation.

pub mod executor;
pub mod rusage;
pub mod template;

pub use executor::SubprocessExecutor;

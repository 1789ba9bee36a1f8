//! Error types for runner operations.

use thiserror::Error;

/// Errors produced by runner components.
///
/// Every variant except [`RunnerError::InvalidConfig`] is recovered locally
/// by skipping the affected site, cycle or event.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The directory or a site's event source could not be reached, or
    /// answered with a non-success status.
    #[error("source unreachable: {0}")]
    SourceUnreachable(String),
    /// The source answered but the response could not be understood.
    #[error("source error: {0}")]
    SourceError(String),
    /// The execution subprocess could not be started.
    #[error("spawn failure: {0}")]
    SpawnFailure(String),
    /// Configuration is missing or inconsistent. Fatal at startup.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Local I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;

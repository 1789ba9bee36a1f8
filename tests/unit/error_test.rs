//! Tests for error types and conversions

use cron_control_runner::core::{PoolError, RunnerError};

#[test]
fn test_runner_error_display() {
    let err = RunnerError::SourceUnreachable("GET https://a: 503".into());
    assert_eq!(err.to_string(), "source unreachable: GET https://a: 503");

    let err = RunnerError::SourceError("bad json".into());
    assert!(err.to_string().contains("bad json"));
}

#[test]
fn test_spawn_failure_display() {
    let err = RunnerError::SpawnFailure("No such file or directory".into());
    assert_eq!(err.to_string(), "spawn failure: No such file or directory");
}

#[test]
fn test_io_error_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "taken");
    let err: RunnerError = io.into();
    assert!(matches!(err, RunnerError::Io(_)));
    assert_eq!(err.to_string(), "taken");
}

#[test]
fn test_pool_error_display() {
    let err = PoolError::InvalidConfig("workers must be greater than 0".into());
    assert_eq!(
        err.to_string(),
        "invalid configuration: workers must be greater than 0"
    );
    let err = PoolError::Internal("spawn".into());
    assert!(err.to_string().starts_with("internal error"));
}

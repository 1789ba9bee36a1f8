//! Tests for configuration loading and validation

use std::time::Duration;

use cron_control_runner::config::{ConfigError, PoolConfig, RunnerConfig};

const MINIMAL: &str = r#"{"source": {"directory_url": "https://directory.example/sites"}}"#;

#[test]
fn test_minimal_json_uses_defaults() {
    let cfg = RunnerConfig::from_json_str(MINIMAL).unwrap();
    assert_eq!(cfg.pool.execution_timeout(), Duration::from_secs(300));
    assert_eq!(cfg.poll.interval(), Duration::from_secs(60));
    assert_eq!(cfg.poll.poll_workers, 3);
    assert_eq!(cfg.command.program, "wp");
    assert!(cfg.command.args.iter().any(|a| a.contains("{hook}")));
    assert!(cfg.metrics.listen_addr.is_none());
    assert!(cfg.pool.workers >= 1);
}

#[test]
fn test_full_json_round_trips_sections() {
    let input = r#"{
        "pool": {"workers": 8, "execution_timeout_secs": 120},
        "poll": {"interval_secs": 30, "poll_workers": 5},
        "source": {"directory_url": "http://127.0.0.1:8080/sites", "auth_token": "t"},
        "command": {"program": "/usr/local/bin/wp", "unreachable_exit_codes": [3]},
        "metrics": {"listen_addr": "127.0.0.1:9090", "max_site_labels": 10}
    }"#;
    let cfg = RunnerConfig::from_json_str(input).unwrap();
    assert_eq!(cfg.pool.workers, 8);
    assert_eq!(cfg.pool.execution_timeout_secs, 120);
    assert_eq!(cfg.poll.poll_workers, 5);
    assert_eq!(cfg.source.auth_token.as_deref(), Some("t"));
    assert_eq!(cfg.command.unreachable_exit_codes, vec![3]);
    assert_eq!(cfg.metrics.max_site_labels, 10);
}

#[test]
fn test_missing_directory_is_invalid() {
    let err = RunnerConfig::from_json_str("{}").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
    assert!(err.to_string().contains("directory_url"));
}

#[test]
fn test_malformed_json_is_parse_error() {
    let err = RunnerConfig::from_json_str("{ not json").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_zero_values_rejected() {
    for input in [
        r#"{"source": {"directory_url": "https://d"}, "pool": {"workers": 0}}"#,
        r#"{"source": {"directory_url": "https://d"}, "pool": {"execution_timeout_secs": 0}}"#,
        r#"{"source": {"directory_url": "https://d"}, "poll": {"interval_secs": 0}}"#,
        r#"{"source": {"directory_url": "https://d"}, "poll": {"poll_workers": 0}}"#,
        r#"{"source": {"directory_url": "https://d"}, "command": {"program": ""}}"#,
        r#"{"source": {"directory_url": "ftp://d"}}"#,
    ] {
        assert!(RunnerConfig::from_json_str(input).is_err(), "{input}");
    }
}

#[test]
fn test_unreachable_codes_exclude_success() {
    let input = r#"{"source": {"directory_url": "https://d"}, "command": {"unreachable_exit_codes": [0]}}"#;
    assert!(RunnerConfig::from_json_str(input).is_err());
}

#[test]
fn test_missing_file_is_io_error() {
    let err = RunnerConfig::from_file("/nonexistent/runner.json".as_ref()).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn test_read_file_leaves_validation_to_caller() {
    let path = std::env::temp_dir().join(format!("runner-{}-overridable.json", std::process::id()));
    std::fs::write(&path, r#"{"source": {"directory_url": ""}, "pool": {"workers": 3}}"#).unwrap();

    let read = RunnerConfig::read_file(&path);
    let loaded = RunnerConfig::from_file(&path);
    std::fs::remove_file(&path).unwrap();

    let mut cfg = read.unwrap();
    assert_eq!(cfg.pool.workers, 3);
    assert!(matches!(loaded.unwrap_err(), ConfigError::Invalid(_)));

    // Overrides applied after reading make it valid
    cfg.source.directory_url = "https://directory.example/sites".to_owned();
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_read_file_reports_parse_errors() {
    let path = std::env::temp_dir().join(format!("runner-{}-broken.json", std::process::id()));
    std::fs::write(&path, "{not json").unwrap();

    let err = RunnerConfig::read_file(&path).unwrap_err();
    std::fs::remove_file(&path).unwrap();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_pool_builder_methods() {
    let cfg = PoolConfig::new()
        .with_workers(3)
        .with_execution_timeout_secs(10)
        .with_kill_grace_secs(1)
        .with_shutdown_timeout_secs(15);
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.workers, 3);
    assert_eq!(cfg.kill_grace(), Duration::from_secs(1));
    assert_eq!(cfg.shutdown_timeout(), Duration::from_secs(15));
}

//! Subprocess executor tests using real `sh` invocations
//!
//! These tests validate:
//! - Clean exits succeed and report resource usage
//! - Non-zero exits carry the last stderr line as the reason
//! - Configured exit codes classify as an unreachable site
//! - Timeouts kill the whole process group promptly and free the worker
//! - Descendants left behind by a finished tool are killed and cannot hold
//!   back its failure reason
//! - Missing programs are spawn failures
//! - Event placeholders reach the child's argv

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cron_control_runner::config::{CommandConfig, PoolConfig};
use cron_control_runner::core::{
    ClaimSet, EventExecutor, InMemorySink, Outcome, PendingEvent, Site, WorkerPool,
};
use cron_control_runner::infra::SubprocessExecutor;
use serde_json::json;

fn event() -> PendingEvent {
    PendingEvent::new(
        Arc::new(Site::new("42", "https://forty-two.example")),
        "publish_future_post",
        1_700_000_000,
        json!([7]),
        Some("inst".to_owned()),
    )
}

fn shell(script: &str) -> SubprocessExecutor {
    let command = CommandConfig {
        program: "sh".to_owned(),
        args: vec![
            "-c".to_owned(),
            script.to_owned(),
            "sh".to_owned(),
            "{site_id}".to_owned(),
            "{hook}".to_owned(),
            "{timestamp}".to_owned(),
            "{instance}".to_owned(),
            "{url}".to_owned(),
        ],
        unreachable_exit_codes: vec![75],
        ..CommandConfig::default()
    };
    let pool = PoolConfig::new()
        .with_execution_timeout_secs(10)
        .with_kill_grace_secs(2);
    SubprocessExecutor::new(command, &pool)
}

fn pidfile(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("runner-{}-{name}.pid", std::process::id()));
    let _ = std::fs::remove_file(&path);
    path
}

fn with_pidfile(mut command: CommandConfig, path: &Path) -> CommandConfig {
    command
        .env
        .insert("PIDFILE".to_owned(), path.display().to_string());
    command
}

fn shell_command(script: &str) -> CommandConfig {
    CommandConfig {
        program: "sh".to_owned(),
        args: vec!["-c".to_owned(), script.to_owned()],
        ..CommandConfig::default()
    }
}

/// Whether `pid` is a live, non-zombie process.
fn is_running(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit(')')
            .next()
            .is_some_and(|rest| !rest.trim_start().starts_with('Z')),
        Err(_) => false,
    }
}

async fn assert_dies(pid: u32) {
    let deadline = Instant::now() + Duration::from_secs(3);
    while is_running(pid) {
        assert!(Instant::now() < deadline, "process {pid} still running");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn read_pid(path: &Path) -> u32 {
    let pid = std::fs::read_to_string(path).unwrap().trim().parse().unwrap();
    let _ = std::fs::remove_file(path);
    pid
}

#[tokio::test]
async fn test_clean_exit_succeeds_with_usage() {
    let result = shell("exit 0").run(&event()).await;

    assert_eq!(result.outcome, Outcome::Success);
    assert_eq!(result.exit_code, Some(0));
    assert!(result.reason.is_empty());
    assert!(result.usage.is_some());
}

#[tokio::test]
async fn test_nonzero_exit_reports_last_stderr_line() {
    let script = "echo 'Warning: noise' >&2; echo 'Error: Database gone away' >&2; exit 2";
    let result = shell(script).run(&event()).await;

    assert_eq!(result.outcome, Outcome::NonZeroExit);
    assert_eq!(result.exit_code, Some(2));
    assert_eq!(result.reason, "Database gone away");
    assert_eq!(result.reason_label(), "database_gone_away");
}

#[tokio::test]
async fn test_silent_failure_has_unknown_reason() {
    let result = shell("exit 1").run(&event()).await;

    assert_eq!(result.outcome, Outcome::NonZeroExit);
    assert_eq!(result.reason, "unknown");
}

#[tokio::test]
async fn test_configured_exit_code_means_unreachable() {
    let result = shell("exit 75").run(&event()).await;

    assert_eq!(result.outcome, Outcome::SourceUnreachable);
    assert_eq!(result.exit_code, Some(75));
    assert_eq!(result.reason_label(), "source_unreachable");
}

#[tokio::test]
async fn test_placeholders_reach_argv() {
    let script = r#"echo "$1|$2|$3|$4|$5" >&2; exit 1"#;
    let result = shell(script).run(&event()).await;

    assert_eq!(
        result.reason,
        "42|publish_future_post|1700000000|inst|https://forty-two.example"
    );
}

#[tokio::test]
async fn test_timeout_kills_process_group() {
    // The background sleep shares the group and must die with its parent
    let executor = shell("sleep 30 & sleep 30").with_timeout(Duration::from_millis(200));

    let started = Instant::now();
    let result = executor.run(&event()).await;

    assert_eq!(result.outcome, Outcome::Timeout);
    assert_eq!(result.reason, "timeout");
    assert_eq!(result.reason_label(), "timeout");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_timeout_kills_background_descendants() {
    let path = pidfile("timeout");
    let command = with_pidfile(
        shell_command(r#"sleep 30 & echo $! > "$PIDFILE"; sleep 30"#),
        &path,
    );
    let executor = SubprocessExecutor::new(command, &PoolConfig::new().with_kill_grace_secs(2))
        .with_timeout(Duration::from_millis(300));

    let result = executor.run(&event()).await;
    assert_eq!(result.outcome, Outcome::Timeout);
    assert_dies(read_pid(&path)).await;
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_leftover_descendant_does_not_hide_reason() {
    let path = pidfile("leftover");
    let command = with_pidfile(
        shell_command(r#"echo 'Error: real reason' >&2; sleep 20 & echo $! > "$PIDFILE"; exit 2"#),
        &path,
    );
    let executor = SubprocessExecutor::new(command, &PoolConfig::new().with_kill_grace_secs(2));

    let started = Instant::now();
    let result = executor.run(&event()).await;

    assert_eq!(result.outcome, Outcome::NonZeroExit);
    assert_eq!(result.reason, "real reason");
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_dies(read_pid(&path)).await;
}

#[test]
fn test_timed_out_execution_releases_worker() {
    let executor = SubprocessExecutor::new(
        shell_command("sleep 30"),
        &PoolConfig::new().with_kill_grace_secs(1),
    )
    .with_timeout(Duration::from_millis(200));
    let sink = Arc::new(InMemorySink::new(100));
    let pool = WorkerPool::new(PoolConfig::new().with_workers(1), executor, sink.clone()).unwrap();
    let claims = Arc::new(ClaimSet::new());

    pool.try_dispatch(claims.claim(event()).unwrap()).unwrap();
    assert_eq!(pool.stats().busy, 1);

    // Timeout plus kill grace bounds how long the slot stays taken
    let deadline = Instant::now() + Duration::from_millis(200 + 1_000 + 1_000);
    while pool.stats().busy > 0 {
        assert!(Instant::now() < deadline, "worker slot not released");
        std::thread::sleep(Duration::from_millis(10));
    }

    let executions = sink.executions();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].2.outcome, Outcome::Timeout);
    assert!(claims.is_empty());
    assert_eq!(pool.stats().failed, 1);
    assert!(pool.shutdown_with_timeout(Duration::from_secs(5)));
}

#[tokio::test]
async fn test_missing_program_is_spawn_failure() {
    let command = CommandConfig {
        program: "/nonexistent/cron-control-tool".to_owned(),
        args: Vec::new(),
        ..CommandConfig::default()
    };
    let executor = SubprocessExecutor::new(command, &PoolConfig::new());

    let result = executor.run(&event()).await;
    assert_eq!(result.outcome, Outcome::SpawnFailure);
    assert!(result.usage.is_none());
    assert_eq!(result.reason_label(), "spawn_failure");
}

#[tokio::test]
async fn test_environment_is_passed_through() {
    let mut command = CommandConfig {
        program: "sh".to_owned(),
        args: vec!["-c".to_owned(), r#"echo "$RUNNER_MARK" >&2; exit 1"#.to_owned()],
        ..CommandConfig::default()
    };
    command.env.insert("RUNNER_MARK".to_owned(), "marked".to_owned());
    let executor = SubprocessExecutor::new(command, &PoolConfig::new());

    let result = executor.run(&event()).await;
    assert_eq!(result.reason, "marked");
}

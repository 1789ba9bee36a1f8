//! Executor running the management tool as a supervised subprocess.

use std::io::{self, Read};
use std::os::unix::process::CommandExt;
use std::process::{Child, ChildStderr, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::{CommandConfig, PoolConfig};
use crate::core::error::RunnerError;
use crate::core::event::{ExecutionResult, Outcome, PendingEvent, ResourceUsage};
use crate::core::executor::EventExecutor;
use crate::util::labels::short_reason;

use super::rusage::{self, ExitKind};
use super::template::expand_all;

/// Bytes of stderr retained for the failure reason.
const STDERR_LIMIT: usize = 16 * 1024;

/// Runs each event as one invocation of the configured program.
///
/// The child is placed in its own process group. A timeout kills the whole
/// group, and whatever is left of the group after the tool exits is killed
/// too. Stdout is discarded; the last retained stderr line becomes the
/// failure reason of a non-zero exit.
#[derive(Debug, Clone)]
pub struct SubprocessExecutor {
    command: Arc<CommandConfig>,
    timeout: Duration,
    kill_grace: Duration,
}

impl SubprocessExecutor {
    /// Executor for `command` with the pool's timeout and kill grace.
    #[must_use]
    pub fn new(command: CommandConfig, pool: &PoolConfig) -> Self {
        Self {
            command: Arc::new(command),
            timeout: pool.execution_timeout(),
            kill_grace: pool.kill_grace(),
        }
    }

    /// Override the wall-clock budget.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_command(&self, event: &PendingEvent) -> Command {
        let mut cmd = Command::new(&self.command.program);
        cmd.args(expand_all(&self.command.args, event))
            .envs(&self.command.env)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .process_group(0);
        if let Some(dir) = &self.command.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Start the tool for `event` and return it with its process group id.
    fn spawn(&self, event: &PendingEvent) -> Result<(Child, libc::pid_t), RunnerError> {
        let mut child = self
            .build_command(event)
            .spawn()
            .map_err(|e| RunnerError::SpawnFailure(format!("{}: {e}", self.command.program)))?;

        match libc::pid_t::try_from(child.id()) {
            Ok(pid) => Ok((child, pid)),
            Err(_) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(RunnerError::SpawnFailure("pid out of range".into()))
            }
        }
    }

    fn classify(
        &self,
        kind: ExitKind,
        stderr: &str,
        elapsed: Duration,
        usage: ResourceUsage,
    ) -> ExecutionResult {
        match kind {
            ExitKind::Code(0) => ExecutionResult::success(elapsed, Some(usage)),
            ExitKind::Code(code) => {
                let outcome = if self.command.unreachable_exit_codes.contains(&code) {
                    Outcome::SourceUnreachable
                } else {
                    Outcome::NonZeroExit
                };
                let reason = short_reason(stderr).unwrap_or_default();
                ExecutionResult::failure(outcome, reason, elapsed, Some(usage))
                    .with_exit_code(Some(code))
            }
            ExitKind::Signal(signal) => ExecutionResult::failure(
                Outcome::NonZeroExit,
                format!("killed by signal {signal}"),
                elapsed,
                Some(usage),
            ),
        }
    }
}

#[async_trait]
impl EventExecutor for SubprocessExecutor {
    async fn run(&self, event: &PendingEvent) -> ExecutionResult {
        let started = Instant::now();

        let (mut child, pid) = match self.spawn(event) {
            Ok(spawned) => spawned,
            Err(e) => {
                warn!(
                    site = %event.site.id,
                    hook = %event.hook,
                    error = %e,
                    "Failed to start management tool"
                );
                return ExecutionResult::failure(
                    Outcome::SpawnFailure,
                    e.to_string(),
                    started.elapsed(),
                    None,
                );
            }
        };
        debug!(pid, site = %event.site.id, hook = %event.hook, "Management tool started");

        let stderr = StderrCapture::start(child.stderr.take(), STDERR_LIMIT);
        let mut reaper = tokio::task::spawn_blocking(move || rusage::wait_with_usage(pid));

        let Ok(joined) = tokio::time::timeout(self.timeout, &mut reaper).await else {
            if let Err(e) = rusage::kill_group(pid) {
                warn!(pid, error = %e, "Failed to kill process group");
            }
            let usage = match tokio::time::timeout(self.kill_grace, &mut reaper).await {
                Ok(Ok(Ok((_, usage)))) => Some(usage),
                _ => {
                    warn!(pid, "Killed process not reaped within grace period");
                    None
                }
            };
            warn!(
                site = %event.site.id,
                hook = %event.hook,
                timeout_secs = self.timeout.as_secs(),
                "Event timed out, process group killed"
            );
            return ExecutionResult::failure(Outcome::Timeout, "timeout", started.elapsed(), usage);
        };

        let elapsed = started.elapsed();
        // Leftover members of the group would otherwise outlive the event
        // and keep stderr open.
        if let Err(e) = rusage::kill_group(pid) {
            debug!(pid, error = %e, "Failed to sweep process group");
        }
        let stderr = stderr.finish(self.kill_grace).await;

        match joined {
            Ok(Ok((kind, usage))) => self.classify(kind, &stderr, elapsed, usage),
            Ok(Err(e)) => ExecutionResult::failure(
                Outcome::SpawnFailure,
                format!("wait failed: {e}"),
                elapsed,
                None,
            ),
            Err(e) => ExecutionResult::failure(
                Outcome::SpawnFailure,
                format!("reaper failed: {e}"),
                elapsed,
                None,
            ),
        }
    }
}

/// Stderr collected by a detached reader thread.
///
/// The reader is a plain thread rather than a blocking task so that a pipe
/// held open by an escaped descendant never stalls runtime shutdown.
struct StderrCapture {
    buf: Arc<Mutex<Vec<u8>>>,
    done: oneshot::Receiver<()>,
}

impl StderrCapture {
    fn start(stderr: Option<ChildStderr>, limit: usize) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done) = oneshot::channel();

        if let Some(stderr) = stderr {
            let sink = Arc::clone(&buf);
            let spawned = thread::Builder::new()
                .name("run-stderr".into())
                .spawn(move || {
                    read_capped(stderr, limit, &sink);
                    let _ = done_tx.send(());
                });
            if let Err(e) = spawned {
                warn!(error = %e, "Failed to start stderr reader");
            }
        }

        Self { buf, done }
    }

    /// Wait up to `grace` for end of stream, then take what was read so far.
    async fn finish(self, grace: Duration) -> String {
        let _ = tokio::time::timeout(grace, self.done).await;
        let buf = self.buf.lock();
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Append up to `limit` bytes of `stderr` to `buf`, then discard the rest so
/// the child never blocks on a full pipe.
fn read_capped(mut stderr: ChildStderr, limit: usize, buf: &Mutex<Vec<u8>>) {
    let mut chunk = [0_u8; 4096];
    loop {
        match stderr.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let mut buf = buf.lock();
                let room = limit.saturating_sub(buf.len());
                buf.extend_from_slice(&chunk[..n.min(room)]);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(_) => break,
        }
    }
}

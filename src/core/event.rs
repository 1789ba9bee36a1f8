//! Data model shared by discovery, queueing and execution.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::util::labels::{sanitize_label, UNKNOWN_LABEL};

/// A site known to the directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Site {
    /// Stable site identifier.
    pub id: String,
    /// Base address of the site, passed to the management tool.
    pub url: String,
}

impl Site {
    /// Create a site from its identifier and base address.
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }
}

/// Composite identity of a due event.
///
/// Field order is significant: the derived ordering is the queue's
/// tie-breaker for events scheduled at the same instant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DedupKey {
    /// Owning site identifier.
    pub site: String,
    /// Hook name.
    pub hook: String,
    /// Scheduled-for timestamp (seconds since the Unix epoch).
    pub timestamp: i64,
    /// Argument signature.
    pub signature: String,
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}@{}#{}",
            self.site, self.hook, self.timestamp, self.signature
        )
    }
}

/// A discovered event waiting for dispatch.
#[derive(Debug, Clone)]
pub struct PendingEvent {
    /// Site the event belongs to.
    pub site: Arc<Site>,
    /// Hook name to run.
    pub hook: String,
    /// Scheduled-for timestamp (seconds since the Unix epoch).
    pub timestamp: i64,
    /// Opaque hook arguments.
    pub args: serde_json::Value,
    /// Deduplication identity.
    pub key: DedupKey,
}

impl PendingEvent {
    /// Build an event, deriving its dedup key.
    ///
    /// `instance` is the source's own argument signature when it provides one;
    /// otherwise the signature is derived from the arguments.
    pub fn new(
        site: Arc<Site>,
        hook: impl Into<String>,
        timestamp: i64,
        args: serde_json::Value,
        instance: Option<String>,
    ) -> Self {
        let hook = hook.into();
        let signature = instance
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| argument_signature(&args));
        let key = DedupKey {
            site: site.id.clone(),
            hook: hook.clone(),
            timestamp,
            signature,
        };
        Self {
            site,
            hook,
            timestamp,
            args,
            key,
        }
    }

    /// Argument signature used as the event's instance identifier.
    #[must_use]
    pub fn instance(&self) -> &str {
        &self.key.signature
    }
}

/// Hex SHA-256 of the compact JSON form of `args`.
#[must_use]
pub fn argument_signature(args: &serde_json::Value) -> String {
    let canonical = args.to_string();
    let digest = Sha256::digest(canonical.as_bytes());
    digest.iter().fold(String::with_capacity(64), |mut acc, b| {
        use fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

/// Final classification of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Tool exited cleanly.
    Success,
    /// Tool ran and reported failure.
    NonZeroExit,
    /// Tool exceeded its wall-clock budget and was killed.
    Timeout,
    /// Tool could not be started.
    SpawnFailure,
    /// Tool reported the site itself as unreachable.
    SourceUnreachable,
}

impl Outcome {
    /// Stable string form used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NonZeroExit => "nonzero_exit",
            Self::Timeout => "timeout",
            Self::SpawnFailure => "spawn_failure",
            Self::SourceUnreachable => "source_unreachable",
        }
    }

    /// Whether the execution succeeded.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource consumption of a finished subprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceUsage {
    /// Peak resident set size in bytes.
    pub max_rss_bytes: u64,
    /// CPU time spent in user mode.
    pub user_time: Duration,
    /// CPU time spent in kernel mode.
    pub system_time: Duration,
}

impl ResourceUsage {
    /// Peak resident set size in MiB.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn max_rss_mib(&self) -> f64 {
        self.max_rss_bytes as f64 / 1_048_576.0
    }
}

/// Result of running one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Classification.
    pub outcome: Outcome,
    /// Wall-clock time from spawn to reap (or give-up).
    pub elapsed: Duration,
    /// Resource usage, when the OS reported it.
    pub usage: Option<ResourceUsage>,
    /// Short failure reason. Empty on success.
    pub reason: String,
    /// Exit code if the process exited normally.
    pub exit_code: Option<i32>,
}

impl ExecutionResult {
    /// A successful execution.
    #[must_use]
    pub const fn success(elapsed: Duration, usage: Option<ResourceUsage>) -> Self {
        Self {
            outcome: Outcome::Success,
            elapsed,
            usage,
            reason: String::new(),
            exit_code: Some(0),
        }
    }

    /// A failed execution. An empty reason becomes `unknown`.
    pub fn failure(
        outcome: Outcome,
        reason: impl Into<String>,
        elapsed: Duration,
        usage: Option<ResourceUsage>,
    ) -> Self {
        let reason = reason.into();
        Self {
            outcome,
            elapsed,
            usage,
            reason: if reason.is_empty() {
                UNKNOWN_LABEL.to_owned()
            } else {
                reason
            },
            exit_code: None,
        }
    }

    /// Attach the process exit code.
    #[must_use]
    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    /// Bounded label for the failure reason. `none` on success.
    ///
    /// Only tool-reported reasons are free-form; every other outcome maps to
    /// its own fixed label.
    #[must_use]
    pub fn reason_label(&self) -> String {
        match self.outcome {
            Outcome::Success => "none".to_owned(),
            Outcome::NonZeroExit => sanitize_label(&self.reason),
            other => other.as_str().to_owned(),
        }
    }
}

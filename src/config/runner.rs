//! Runner configuration structures.
//!
//! Every field has a default so that a configuration file only needs to name
//! what differs. The only value without a usable default is the directory
//! address, which [`RunnerConfig::validate`] insists on.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading configuration. All of them are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The configuration could not be parsed.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// A value is out of range or missing.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of concurrent executions. Fixed for the process lifetime.
    pub workers: usize,
    /// Hard wall-clock budget of one execution, in seconds.
    pub execution_timeout_secs: u64,
    /// How long to wait for a killed process group to be reaped, in seconds.
    pub kill_grace_secs: u64,
    /// How long shutdown waits for in-flight executions, in seconds.
    pub shutdown_timeout_secs: u64,
    /// Stack size of each worker thread, in bytes.
    pub thread_stack_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            execution_timeout_secs: 300,
            kill_grace_secs: 5,
            shutdown_timeout_secs: 330,
            thread_stack_size: 2 * 1024 * 1024,
        }
    }
}

impl PoolConfig {
    /// Default pool configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of workers.
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the per-execution timeout.
    #[must_use]
    pub const fn with_execution_timeout_secs(mut self, secs: u64) -> Self {
        self.execution_timeout_secs = secs;
        self
    }

    /// Set the post-kill reap grace period.
    #[must_use]
    pub const fn with_kill_grace_secs(mut self, secs: u64) -> Self {
        self.kill_grace_secs = secs;
        self
    }

    /// Set the shutdown wait.
    #[must_use]
    pub const fn with_shutdown_timeout_secs(mut self, secs: u64) -> Self {
        self.shutdown_timeout_secs = secs;
        self
    }

    /// Per-execution timeout.
    #[must_use]
    pub const fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }

    /// Post-kill reap grace period.
    #[must_use]
    pub const fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.kill_grace_secs)
    }

    /// Shutdown wait.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Validate pool configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == 0 {
            return Err("workers must be greater than 0".into());
        }
        if self.execution_timeout_secs == 0 {
            return Err("execution_timeout_secs must be greater than 0".into());
        }
        if self.thread_stack_size < 64 * 1024 {
            return Err("thread_stack_size must be at least 64 KiB".into());
        }
        Ok(())
    }
}

/// Discovery cadence and fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Seconds between the start of two poll cycles.
    pub interval_secs: u64,
    /// Sites polled concurrently. Independent of the worker count.
    pub poll_workers: usize,
    /// Timeout of a single directory or event-source request, in seconds.
    pub request_timeout_secs: u64,
    /// How often worker gauges are republished, in milliseconds.
    pub stats_interval_millis: u64,
    /// Maximum number of queued events.
    pub max_queue_depth: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            poll_workers: 3,
            request_timeout_secs: 30,
            stats_interval_millis: 1000,
            max_queue_depth: 10_000,
        }
    }
}

impl PollConfig {
    /// Cycle cadence.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Gauge republish interval.
    #[must_use]
    pub const fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_millis)
    }

    /// Validate polling values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.interval_secs == 0 {
            return Err("interval_secs must be greater than 0".into());
        }
        if self.poll_workers == 0 {
            return Err("poll_workers must be greater than 0".into());
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be greater than 0".into());
        }
        if self.stats_interval_millis == 0 {
            return Err("stats_interval_millis must be greater than 0".into());
        }
        if self.max_queue_depth == 0 {
            return Err("max_queue_depth must be greater than 0".into());
        }
        Ok(())
    }
}

/// Where sites and due events are read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Absolute URL of the site directory.
    pub directory_url: String,
    /// Path appended to a site's base address to list its due events.
    pub events_path: String,
    /// Bearer token sent with every request.
    pub auth_token: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            directory_url: String::new(),
            events_path: "/wp-json/cron-control/v1/events".into(),
            auth_token: None,
        }
    }
}

impl SourceConfig {
    /// Validate source values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        let url = self.directory_url.trim();
        if url.is_empty() {
            return Err("directory_url must be set".into());
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(format!("directory_url `{url}` must be an http(s) URL"));
        }
        if !self.events_path.starts_with('/') {
            return Err("events_path must start with `/`".into());
        }
        Ok(())
    }
}

/// Management tool invocation template.
///
/// Each argument may contain the placeholders `{url}`, `{site_id}`, `{hook}`,
/// `{timestamp}`, `{instance}` and `{args}` (arguments as compact JSON).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Program to execute.
    pub program: String,
    /// Argument template.
    pub args: Vec<String>,
    /// Working directory of the subprocess.
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables.
    pub env: BTreeMap<String, String>,
    /// Exit codes meaning the tool could not reach the site.
    pub unreachable_exit_codes: Vec<i32>,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            program: "wp".into(),
            args: [
                "cron-control",
                "orchestrate",
                "runner-only",
                "run",
                "--timestamp={timestamp}",
                "--action={hook}",
                "--instance={instance}",
                "--url={url}",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            working_dir: None,
            env: BTreeMap::new(),
            unreachable_exit_codes: Vec::new(),
        }
    }
}

impl CommandConfig {
    /// Validate command values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.program.trim().is_empty() {
            return Err("program must be set".into());
        }
        if self.unreachable_exit_codes.contains(&0) {
            return Err("unreachable_exit_codes must not contain 0".into());
        }
        Ok(())
    }
}

/// Metrics exposition settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Address of the `/metrics` endpoint. Disabled when unset.
    pub listen_addr: Option<String>,
    /// Distinct site labels kept before folding into `other`.
    pub max_site_labels: usize,
    /// Distinct failure-reason labels kept before folding into `other`.
    pub max_reason_labels: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_addr: None,
            max_site_labels: 500,
            max_reason_labels: 50,
        }
    }
}

/// Root runner configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Worker pool.
    pub pool: PoolConfig,
    /// Discovery cadence.
    pub poll: PollConfig,
    /// Directory and event sources.
    pub source: SourceConfig,
    /// Management tool invocation.
    pub command: CommandConfig,
    /// Metrics exposition.
    pub metrics: MetricsConfig,
}

impl RunnerConfig {
    /// Validate every section.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the section and value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sections: [(&str, Result<(), String>); 4] = [
            ("pool", self.pool.validate()),
            ("poll", self.poll.validate()),
            ("source", self.source.validate()),
            ("command", self.command.validate()),
        ];
        for (name, result) in sections {
            result.map_err(|e| ConfigError::Invalid(format!("{name}: {e}")))?;
        }
        Ok(())
    }

    /// Parse runner configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(input)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and parse a JSON configuration file without validating it.
    ///
    /// For callers that layer further overrides on top before calling
    /// [`RunnerConfig::validate`].
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] or [`ConfigError::Parse`].
    pub fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&input)?)
    }

    /// Read, parse and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let cfg = Self::read_file(path)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

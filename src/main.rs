//! `cron-control-runner` binary.
//!
//! Loads configuration from an optional JSON file, applies command-line
//! overrides, and runs until SIGINT or SIGTERM.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use cron_control_runner::builders::RunnerBuilder;
use cron_control_runner::config::RunnerConfig;
use cron_control_runner::core::AppResult;
use cron_control_runner::util::init_tracing;

#[derive(Parser, Debug)]
#[clap(version, about = "Runs due cron events for a fleet of sites")]
struct CliArgs {
    /// Path to a JSON configuration file.
    #[clap(short, long, env = "CRON_CONTROL_RUNNER_CONFIG")]
    pub config: Option<PathBuf>,

    /// URL of the site directory.
    #[clap(long, env = "CRON_CONTROL_DIRECTORY_URL")]
    pub directory_url: Option<String>,

    /// Bearer token sent to the directory and event sources.
    #[clap(long, env = "CRON_CONTROL_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Number of concurrent executions.
    #[clap(long)]
    pub workers: Option<usize>,

    /// Number of sites polled concurrently.
    #[clap(long)]
    pub poll_workers: Option<usize>,

    /// Seconds between poll cycles.
    #[clap(long)]
    pub interval_secs: Option<u64>,

    /// Per-execution timeout in seconds.
    #[clap(long)]
    pub timeout_secs: Option<u64>,

    /// Management tool to invoke.
    #[clap(long)]
    pub program: Option<String>,

    /// Address for the Prometheus metrics endpoint (e.g. 0.0.0.0:9090).
    #[clap(long)]
    pub metrics_listen: Option<String>,
}

impl CliArgs {
    fn load_config(&self) -> AppResult<RunnerConfig> {
        let mut config = match &self.config {
            Some(path) => RunnerConfig::read_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => RunnerConfig::default(),
        };

        if let Some(url) = &self.directory_url {
            config.source.directory_url.clone_from(url);
        }
        if let Some(token) = &self.auth_token {
            config.source.auth_token = Some(token.clone());
        }
        if let Some(workers) = self.workers {
            config.pool.workers = workers;
        }
        if let Some(poll_workers) = self.poll_workers {
            config.poll.poll_workers = poll_workers;
        }
        if let Some(interval) = self.interval_secs {
            config.poll.interval_secs = interval;
        }
        if let Some(timeout) = self.timeout_secs {
            config.pool.execution_timeout_secs = timeout;
        }
        if let Some(program) = &self.program {
            config.command.program.clone_from(program);
        }
        if let Some(addr) = &self.metrics_listen {
            config.metrics.listen_addr = Some(addr.clone());
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli_args = CliArgs::parse();
    let result = run(&cli_args).await;
    if let Err(e) = &result {
        error!(error = format!("{e:#}"), "Runner failed");
    }
    result
}

async fn run(cli_args: &CliArgs) -> AppResult<()> {
    let config = cli_args.load_config()?;
    info!(
        directory = %config.source.directory_url,
        workers = config.pool.workers,
        poll_workers = config.poll.poll_workers,
        interval_secs = config.poll.interval_secs,
        timeout_secs = config.pool.execution_timeout_secs,
        "Starting cron-control-runner"
    );

    let runner = RunnerBuilder::new(config).build().await?;
    if let Some(addr) = runner.metrics_addr() {
        info!(addr = %addr, "Serving metrics");
    }
    runner.run_until_signal().await
}

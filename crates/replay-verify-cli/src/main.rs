//! Replay-Verify - backup replay verification CLI
//!
//! The `replay-verify` command replays a slice of a network's backed-up
//! transaction history against the debugger and reports whether every
//! partition verified cleanly.
//!
//! ## Usage
//!
//! - `replay-verify` verifies the whole history as a single runner
//! - `replay-verify <INDEX> <COUNT>` verifies one runner's slice of the
//!   environment's range table
//!
//! Backup location and tuning are read from flags or the CI environment
//! (`BUCKET`, `SUB_DIR`, `HISTORY_START`, `TXNS_TO_SKIP`,
//! `BACKUP_CONFIG_TEMPLATE_PATH`, `REUSE_BACKUP_ARTIFACTS`).

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use replay_verify_core::{
    clear_artifacts, init_tracing, parse_skip_list, parse_toggle, resolve, DebuggerOracle,
    Environment, RunnerSelector, VerifyConfig, METRICS,
};
use replay_verify_runner::{PipelineResult, ProcessWorker, RetryPolicy, VerifyPipeline, VerifyPlan};
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "replay-verify")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Verify backed-up transaction history by partitioned replay", long_about = None)]
struct Cli {
    /// Zero-based index of this runner
    #[arg(requires = "runner_count")]
    runner_index: Option<u32>,

    /// Total number of runners; must match the environment's range table
    runner_count: Option<u32>,

    /// Backup bucket; buckets mentioning "testnet" select the testnet table
    #[arg(long, env = "BUCKET")]
    bucket: String,

    /// Override the environment derived from the bucket
    #[arg(long)]
    environment: Option<Environment>,

    /// Backup sub-directory inside the bucket
    #[arg(long, env = "SUB_DIR")]
    sub_dir: String,

    /// First version of the backed-up history
    #[arg(long, env = "HISTORY_START")]
    history_start: u64,

    /// Whitespace-separated versions to skip
    #[arg(long, env = "TXNS_TO_SKIP", default_value = "")]
    txns_to_skip: String,

    /// Command adapter config for backup access
    #[arg(long, env = "BACKUP_CONFIG_TEMPLATE_PATH")]
    backup_config_template_path: PathBuf,

    /// Reuse metadata cache and partition directories from earlier runs
    #[arg(long, env = "REUSE_BACKUP_ARTIFACTS", default_value = "true")]
    reuse_backup_artifacts: String,

    /// Explicit start version, replacing the resolved range
    #[arg(long, requires = "end_version")]
    start_version: Option<u64>,

    /// Explicit end version (exclusive), replacing the resolved range
    #[arg(long, requires = "start_version")]
    end_version: Option<u64>,

    /// Number of partitions
    #[arg(long, default_value_t = replay_verify_core::config::DEFAULT_PARTITIONS)]
    partitions: u32,

    /// Partitions running at once (default: all of them)
    #[arg(long)]
    parallelism: Option<usize>,

    /// Attempts per partition, including the first
    #[arg(long, default_value_t = replay_verify_core::config::DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,

    /// Worker exit code that marks an integrity failure (never retried)
    #[arg(long, default_value_t = replay_verify_core::config::DEFAULT_INTEGRITY_EXIT_CODE)]
    integrity_exit_code: i32,

    /// Base delay in ms for exponential backoff between retries
    #[arg(long, default_value_t = 0)]
    retry_backoff_ms: u64,

    /// Debugger executable
    #[arg(long, default_value = "target/release/aptos-debugger")]
    worker_binary: PathBuf,

    /// Concurrent backup downloads per worker
    #[arg(long, default_value_t = 8)]
    concurrent_downloads: u32,

    /// Replay concurrency level per worker
    #[arg(long, default_value_t = 2)]
    replay_concurrency_level: u32,

    /// Root for the shared metadata cache and partition directories
    #[arg(long, default_value = ".")]
    work_dir: PathBuf,

    /// Write a JSON run report to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Resolve and print the plan without running any worker
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn selector(&self) -> Result<Option<RunnerSelector>> {
        match (self.runner_index, self.runner_count) {
            (Some(index), Some(count)) => Ok(Some(RunnerSelector::new(index, count)?)),
            (None, None) => Ok(None),
            _ => anyhow::bail!("runner index and runner count must be given together"),
        }
    }

    fn explicit_range(&self) -> Option<(u64, u64)> {
        self.start_version.zip(self.end_version)
    }

    fn build_config(&self) -> Result<VerifyConfig> {
        let environment = self
            .environment
            .unwrap_or_else(|| Environment::from_bucket(&self.bucket));

        let mut config = VerifyConfig::new(
            environment,
            self.bucket.clone(),
            self.sub_dir.clone(),
            self.backup_config_template_path.clone(),
        );
        config.history_start = self.history_start;
        config.txns_to_skip = parse_skip_list(&self.txns_to_skip)?;
        config.reuse_artifacts = parse_toggle(&self.reuse_backup_artifacts)?;
        config.work_dir = self.work_dir.clone();
        config.partitions = self.partitions;
        config.parallelism = self.parallelism.unwrap_or(self.partitions as usize);
        config.worker.binary = self.worker_binary.clone();
        config.worker.concurrent_downloads = self.concurrent_downloads;
        config.worker.replay_concurrency_level = self.replay_concurrency_level;
        config.retry.max_attempts = self.max_attempts;
        config.retry.integrity_exit_code = self.integrity_exit_code;
        config.retry.backoff_base_ms = self.retry_backoff_ms;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let selector = cli.selector()?;
    let config = validated(cli.build_config()?)
        .await
        .context("Invalid replay-verify configuration")?;

    info!(
        environment = %config.environment,
        bucket = %config.bucket,
        sub_dir = %config.sub_dir,
        partitions = config.partitions,
        parallelism = config.parallelism,
        "Starting replay verification"
    );

    if !config.reuse_artifacts {
        let removed = clear_artifacts(&config.work_dir).context("Failed to clear backup artifacts")?;
        if !removed.is_empty() {
            warn!(count = removed.len(), "Removed artifacts from a previous run");
        }
    }

    let oracle = DebuggerOracle::new(
        &config.worker.binary,
        &config.work_dir,
        &config.backup_config_path,
    );
    let range = resolve(config.environment, selector, cli.explicit_range(), &oracle)
        .await
        .context("Failed to resolve the version range")?;

    let plan = VerifyPlan::new(range, config.partitions)?;
    println!("Range: {} ({} versions)", plan.range, plan.range.len());
    println!("Plan: {} partitions, digest {}", plan.partitions.len(), plan.short_digest());

    if cli.dry_run {
        for spec in &plan.partitions {
            println!("  {}", spec);
        }
        return Ok(());
    }

    let policy = RetryPolicy::from_settings(&config.retry);
    let parallelism = config.parallelism;
    let environment = config.environment;
    let worker = Arc::new(ProcessWorker::new(Arc::new(config)));

    let result = VerifyPipeline::run(worker, environment, &plan, policy, parallelism).await;
    METRICS.flush();

    conclude(
        &result,
        cli.report.as_deref(),
        &mut std::io::stdout(),
        &mut std::io::stderr(),
    )
}

/// Validate off the async runtime; the checks launch external tools.
async fn validated(config: VerifyConfig) -> Result<VerifyConfig> {
    tokio::task::spawn_blocking(move || config.validate().map(|()| config))
        .await
        .context("Configuration check panicked")?
        .map_err(Into::into)
}

/// Print the summary and every failure diagnostic, then write the report.
///
/// A report that cannot be written is logged; it never replaces the verdict.
fn conclude(
    result: &PipelineResult,
    report: Option<&Path>,
    out: &mut impl Write,
    err: &mut impl Write,
) -> Result<()> {
    print_summary(result, out)?;
    if !result.success() {
        write!(err, "{}", result.verdict.render())?;
        err.flush()?;
    }

    if let Some(path) = report {
        match result.report().write_to(path) {
            Ok(()) => info!(path = %path.display(), "Wrote run report"),
            Err(e) => warn!(path = %path.display(), error = %e, "Run report was not written"),
        }
    }

    if result.success() {
        writeln!(out, "\n✓ Replay verification passed")?;
        Ok(())
    } else {
        anyhow::bail!(
            "Replay verification failed: {}/{} partitions failed",
            result.verdict.failed_count(),
            result.partitions.len()
        )
    }
}

fn print_summary(result: &PipelineResult, out: &mut impl Write) -> std::io::Result<()> {
    writeln!(out, "Run ID: {}", result.run_id)?;
    writeln!(out, "Duration: {}ms", result.duration_ms)?;
    for supervised in &result.partitions {
        let status = if supervised.succeeded() { "✓" } else { "✗" };
        writeln!(
            out,
            "  {} partition {} ({} attempts, exit code: {}, {})",
            status,
            supervised.outcome.number,
            supervised.attempts,
            supervised.outcome.exit_code,
            supervised.state
        )?;
    }
    writeln!(
        out,
        "Summary: {}/{} partitions passed",
        result.verdict.passed_count(),
        result.partitions.len()
    )
}

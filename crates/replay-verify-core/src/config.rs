//! Run configuration, built once at startup and validated before any work.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VerifyError};
use crate::ranges::Environment;

/// Default number of partitions per runner.
pub const DEFAULT_PARTITIONS: u32 = 16;

/// Default attempt cap per partition.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 6;

/// Worker exit code meaning "replayed data did not match". Never retried.
pub const DEFAULT_INTEGRITY_EXIT_CODE: i32 = 2;

/// How the external verification worker is launched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Path to the debugger executable.
    pub binary: PathBuf,
    /// `--concurrent-downloads` passed to the worker.
    pub concurrent_downloads: u32,
    /// `--replay-concurrency-level` passed to the worker.
    pub replay_concurrency_level: u32,
    /// Pass `--lazy-quit` so the worker stops on the first fatal mismatch.
    pub lazy_quit: bool,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("target/release/aptos-debugger"),
            concurrent_downloads: 8,
            replay_concurrency_level: 2,
            lazy_quit: true,
        }
    }
}

/// Retry supervision knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrySettings {
    /// Attempts per partition, including the first.
    pub max_attempts: u32,
    /// Exit code classified as a confirmed integrity failure.
    pub integrity_exit_code: i32,
    /// Base delay for exponential backoff between retries (0 = none).
    pub backoff_base_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            integrity_exit_code: DEFAULT_INTEGRITY_EXIT_CODE,
            backoff_base_ms: 0,
        }
    }
}

/// Everything a verification run needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifyConfig {
    /// Selects the range table.
    pub environment: Environment,
    /// Backup bucket, exported to the worker for the adapter config.
    pub bucket: String,
    /// Backup sub-directory, exported to the worker for the adapter config.
    pub sub_dir: String,
    /// First version of the backed-up history.
    pub history_start: u64,
    /// Versions excluded from verification.
    pub txns_to_skip: Vec<u64>,
    /// Command adapter config used for backup access.
    pub backup_config_path: PathBuf,
    /// Keep artifacts from earlier runs instead of clearing them.
    pub reuse_artifacts: bool,
    /// Root for the shared cache and partition directories.
    pub work_dir: PathBuf,
    /// Number of partitions.
    pub partitions: u32,
    /// Concurrent partition slots.
    pub parallelism: usize,
    pub worker: WorkerSettings,
    pub retry: RetrySettings,
}

impl VerifyConfig {
    /// Config with default tunables.
    pub fn new(
        environment: Environment,
        bucket: impl Into<String>,
        sub_dir: impl Into<String>,
        backup_config_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            environment,
            bucket: bucket.into(),
            sub_dir: sub_dir.into(),
            history_start: 0,
            txns_to_skip: Vec::new(),
            backup_config_path: backup_config_path.into(),
            reuse_artifacts: true,
            work_dir: PathBuf::from("."),
            partitions: DEFAULT_PARTITIONS,
            parallelism: DEFAULT_PARTITIONS as usize,
            worker: WorkerSettings::default(),
            retry: RetrySettings::default(),
        }
    }

    /// Fail-fast validation of settings and required tooling.
    pub fn validate(&self) -> Result<()> {
        if self.partitions == 0 {
            return Err(VerifyError::config("partitions must be at least 1"));
        }
        if self.parallelism == 0 {
            return Err(VerifyError::config("parallelism must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(VerifyError::config("max attempts must be at least 1"));
        }
        if self.retry.integrity_exit_code == 0 {
            return Err(VerifyError::config(
                "integrity exit code must differ from the success code 0",
            ));
        }
        if self.bucket.trim().is_empty() {
            return Err(VerifyError::config("BUCKET must not be empty"));
        }
        if self.sub_dir.trim().is_empty() {
            return Err(VerifyError::config("SUB_DIR must not be empty"));
        }

        let backup_config = std::fs::read_to_string(&self.backup_config_path).map_err(|e| {
            VerifyError::config(format!(
                "backup config {} is not readable: {}",
                self.backup_config_path.display(),
                e
            ))
        })?;
        if backup_config.contains("aws") && !is_tool_available("aws") {
            return Err(VerifyError::config(
                "missing required AWS CLI for pulling backup data from S3",
            ));
        }

        Ok(())
    }

    /// Shared metadata cache under the work root.
    pub fn metadata_cache_dir(&self) -> PathBuf {
        self.work_dir.join(crate::artifacts::METADATA_CACHE_DIR)
    }
}

/// Parse a whitespace-separated list of versions.
pub fn parse_skip_list(raw: &str) -> Result<Vec<u64>> {
    raw.split_whitespace()
        .map(|tok| {
            tok.parse::<u64>()
                .map_err(|_| VerifyError::config(format!("invalid version in skip list: {}", tok)))
        })
        .collect()
}

/// Parse a boolean toggle the way the CI environment spells it.
pub fn parse_toggle(raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(VerifyError::config(format!("invalid boolean: {}", other))),
    }
}

/// Whether `program` can be launched from `PATH`.
pub fn is_tool_available(program: impl AsRef<Path>) -> bool {
    Command::new(program.as_ref())
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

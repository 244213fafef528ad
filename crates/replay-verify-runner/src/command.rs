//! Command line for one partition's verification worker.

use std::path::{Path, PathBuf};

use replay_verify_core::{PartitionDirs, PartitionSpec, VerifyConfig, WorkerSettings};
use serde::{Deserialize, Serialize};

/// Fully-rendered worker invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerCommand {
    /// Executable; the rest of the command is `args`.
    pub program: PathBuf,

    pub args: Vec<String>,

    /// Extra environment exported to the worker (backup adapter inputs).
    pub envs: Vec<(String, String)>,
}

impl WorkerCommand {
    /// `<debugger> aptos-db replay-verify ...` for `spec`.
    pub fn replay_verify(
        settings: &WorkerSettings,
        spec: &PartitionSpec,
        dirs: &PartitionDirs,
        txns_to_skip: &[u64],
        backup_config_path: &Path,
    ) -> Self {
        let mut args = vec!["aptos-db".to_string(), "replay-verify".to_string()];
        args.extend(txns_to_skip.iter().map(|v| format!("--txns-to-skip={}", v)));
        args.extend([
            "--concurrent-downloads".to_string(),
            settings.concurrent_downloads.to_string(),
            "--replay-concurrency-level".to_string(),
            settings.replay_concurrency_level.to_string(),
            "--metadata-cache-dir".to_string(),
            dirs.metadata_cache.to_string_lossy().to_string(),
            "--target-db-dir".to_string(),
            dirs.target_db.to_string_lossy().to_string(),
            "--start-version".to_string(),
            spec.start.to_string(),
            "--end-version".to_string(),
            spec.end.to_string(),
        ]);
        if settings.lazy_quit {
            args.push("--lazy-quit".to_string());
        }
        args.extend([
            "--command-adapter-config".to_string(),
            backup_config_path.to_string_lossy().to_string(),
        ]);

        Self {
            program: settings.binary.clone(),
            args,
            envs: Vec::new(),
        }
    }

    /// Attach the backup location variables the adapter config refers to.
    pub fn with_backup_env(mut self, config: &VerifyConfig) -> Self {
        self.envs.push(("BUCKET".to_string(), config.bucket.clone()));
        self.envs.push(("SUB_DIR".to_string(), config.sub_dir.clone()));
        self.envs
            .push(("HISTORY_START".to_string(), config.history_start.to_string()));
        self
    }

    /// Custom command, mostly for tests.
    pub fn custom(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            envs: Vec::new(),
        }
    }
}

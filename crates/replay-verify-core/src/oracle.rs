//! Latest-version oracle.
//!
//! The oracle answers one question: what is the newest transaction version
//! present in the backup? The production implementation shells out to the
//! debugger's backup query, which also downloads the shared metadata cache
//! that every partition later copies.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, info};

use crate::artifacts::METADATA_CACHE_DIR;
use crate::error::{Result, VerifyError};

/// Source of the backup's latest available version.
#[async_trait]
pub trait LatestVersionOracle: Send + Sync {
    /// `Ok(None)` means the backup reported no version.
    async fn latest_version(&self) -> Result<Option<u64>>;
}

/// Oracle backed by `<debugger> aptos-db backup query backup-storage-state`.
#[derive(Debug, Clone)]
pub struct DebuggerOracle {
    binary: PathBuf,
    work_dir: PathBuf,
    backup_config_path: PathBuf,
}

impl DebuggerOracle {
    pub fn new(
        binary: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
        backup_config_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            binary: binary.into(),
            work_dir: work_dir.into(),
            backup_config_path: backup_config_path.into(),
        }
    }

    fn args(&self) -> Vec<String> {
        let cache = self.work_dir.join(METADATA_CACHE_DIR);
        vec![
            "aptos-db".to_string(),
            "backup".to_string(),
            "query".to_string(),
            "backup-storage-state".to_string(),
            "--metadata-cache-dir".to_string(),
            cache.to_string_lossy().to_string(),
            "--command-adapter-config".to_string(),
            self.backup_config_path.to_string_lossy().to_string(),
        ]
    }
}

#[async_trait]
impl LatestVersionOracle for DebuggerOracle {
    async fn latest_version(&self) -> Result<Option<u64>> {
        info!(binary = %self.binary.display(), "Querying backup latest version");

        let output = Command::new(&self.binary)
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                VerifyError::oracle(format!("failed to run {}: {}", self.binary.display(), e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VerifyError::oracle(format!(
                "backup query exited with {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let version = parse_latest_version(&stdout)?;
        debug!(?version, "Backup query finished");
        Ok(version)
    }
}

/// Extract `latest_transaction_version: Some(N)` from backup query output.
pub fn parse_latest_version(output: &str) -> Result<Option<u64>> {
    match latest_version_regex()?.captures_iter(output).last() {
        Some(caps) => caps[1]
            .parse::<u64>()
            .map(Some)
            .map_err(|e| VerifyError::oracle(format!("bad version in backup query output: {}", e))),
        None => Ok(None),
    }
}

/// Compiled once per process.
fn latest_version_regex() -> Result<&'static Regex> {
    static LATEST_VERSION: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    LATEST_VERSION
        .get_or_init(|| Regex::new(r"latest_transaction_version:\s*Some\((\d+)\)"))
        .as_ref()
        .map_err(|e| VerifyError::oracle(e.to_string()))
}

/// Oracle that always answers with a fixed value.
#[derive(Debug, Clone, Copy)]
pub struct FixedOracle(pub Option<u64>);

#[async_trait]
impl LatestVersionOracle for FixedOracle {
    async fn latest_version(&self) -> Result<Option<u64>> {
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_latest_version() {
        let out = "BackupStorageState { latest_epoch_ending_epoch: Some(9001), \
                   latest_state_snapshot_epoch: Some(9000), \
                   latest_state_snapshot_version: Some(1300000000), \
                   latest_transaction_version: Some(1316590000) }";
        assert_eq!(parse_latest_version(out).unwrap(), Some(1316590000));
    }

    #[test]
    fn test_parse_latest_version_none() {
        let out = "BackupStorageState { latest_transaction_version: None }";
        assert_eq!(parse_latest_version(out).unwrap(), None);
        assert_eq!(parse_latest_version("").unwrap(), None);
    }

    #[test]
    fn test_latest_version_regex_compiled_once() {
        let first = latest_version_regex().unwrap();
        let second = latest_version_regex().unwrap();
        assert!(std::ptr::eq(first, second));
        assert_eq!(
            parse_latest_version("latest_transaction_version: Some(7)").unwrap(),
            Some(7)
        );
    }

    #[test]
    fn test_debugger_oracle_args() {
        let oracle = DebuggerOracle::new("target/release/aptos-debugger", ".", "/etc/backup.yaml");
        let args = oracle.args();
        assert_eq!(&args[..4], ["aptos-db", "backup", "query", "backup-storage-state"]);
        assert!(args.contains(&"/etc/backup.yaml".to_string()));
        assert!(args.contains(&"./metadata-cache".to_string()));
    }

    #[tokio::test]
    async fn test_debugger_oracle_missing_binary() {
        let oracle = DebuggerOracle::new("/nonexistent/aptos-debugger", ".", "cfg.yaml");
        let err = oracle.latest_version().await.unwrap_err();
        assert!(matches!(err, VerifyError::Oracle(_)));
    }

    #[tokio::test]
    async fn test_fixed_oracle() {
        assert_eq!(FixedOracle(Some(5)).latest_version().await.unwrap(), Some(5));
        assert_eq!(FixedOracle(None).latest_version().await.unwrap(), None);
    }
}

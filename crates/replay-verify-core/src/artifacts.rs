//! Filesystem artifacts shared between the orchestrator and its workers.
//!
//! Layout under the work root:
//! - `metadata-cache/` is downloaded once by the oracle query
//! - `run_<n>_<start>_<end>/` is owned by one partition and holds its private
//!   `metadata-cache/` copy and target `db/`

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::Result;
use crate::partition::PartitionSpec;

/// Shared metadata cache directory name.
pub const METADATA_CACHE_DIR: &str = "metadata-cache";

/// Prefix of per-partition working directories.
pub const PARTITION_DIR_PREFIX: &str = "run_";

/// Target database directory inside a partition's working directory.
pub const TARGET_DB_DIR: &str = "db";

/// Paths owned by one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionDirs {
    pub root: PathBuf,
    pub metadata_cache: PathBuf,
    pub target_db: PathBuf,
    /// Whether this call created the directory (first attempt).
    pub created: bool,
}

/// Ensure the partition's working directory exists.
///
/// On first creation the shared metadata cache is copied in. Later attempts
/// reuse the directory as is. If the copy fails the half-built directory is
/// removed so the next attempt starts over.
pub fn prepare_partition_dir(work_dir: &Path, spec: &PartitionSpec) -> Result<PartitionDirs> {
    let root = work_dir.join(spec.dir_name());
    let metadata_cache = root.join(METADATA_CACHE_DIR);
    let target_db = root.join(TARGET_DB_DIR);

    let created = !root.exists();
    if created {
        std::fs::create_dir_all(&root)?;
        let shared = work_dir.join(METADATA_CACHE_DIR);
        if let Err(e) = copy_dir_all(&shared, &metadata_cache) {
            let _ = std::fs::remove_dir_all(&root);
            return Err(e);
        }
        debug!(partition = spec.number, dir = %root.display(), "Created partition directory");
    }

    Ok(PartitionDirs {
        root,
        metadata_cache,
        target_db,
        created,
    })
}

/// Recursively copy `src` into `dst`, creating `dst`.
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Remove the shared metadata cache and every partition directory under
/// `work_dir`. Returns the removed paths.
pub fn clear_artifacts(work_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    if !work_dir.is_dir() {
        return Ok(removed);
    }

    for entry in std::fs::read_dir(work_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let is_artifact = name == METADATA_CACHE_DIR || name.starts_with(PARTITION_DIR_PREFIX);
        if is_artifact && entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(entry.path())?;
            removed.push(entry.path());
        }
    }

    removed.sort();
    info!(count = removed.len(), "Cleared backup artifacts");
    Ok(removed)
}

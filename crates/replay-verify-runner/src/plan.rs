//! Verification plan and its identity.

use replay_verify_core::{partition, PartitionSpec, Result, VersionRange};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Resolved range plus its partitioning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifyPlan {
    pub range: VersionRange,

    pub partitions: Vec<PartitionSpec>,

    /// SHA-256 of the ordered partition boundaries (deterministic).
    pub digest: String,
}

impl VerifyPlan {
    /// Partition `range` into `count` units and compute the plan digest.
    pub fn new(range: VersionRange, count: u32) -> Result<Self> {
        let partitions = partition(range, count)?;
        let digest = compute_plan_digest(&partitions);
        Ok(Self {
            range,
            partitions,
            digest,
        })
    }

    /// First 12 characters of the digest.
    pub fn short_digest(&self) -> &str {
        &self.digest[..12.min(self.digest.len())]
    }
}

/// Compute a deterministic digest of ordered partition boundaries.
fn compute_plan_digest(partitions: &[PartitionSpec]) -> String {
    let mut hasher = Sha256::new();
    for p in partitions {
        hasher.update(p.number.to_le_bytes());
        hasher.update(p.start.to_le_bytes());
        hasher.update(p.end.to_le_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

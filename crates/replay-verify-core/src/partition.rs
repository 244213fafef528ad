//! Partitioning of a resolved version range into independent units of work.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VerifyError};
use crate::ranges::VersionRange;

/// One contiguous slice of the resolved range, verified by one worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PartitionSpec {
    /// 1-based partition number.
    pub number: u32,
    /// Total number of partitions in the plan.
    pub total: u32,
    pub start: u64,
    pub end: u64,
}

impl PartitionSpec {
    /// Working directory name; stable across retries of the same partition.
    pub fn dir_name(&self) -> String {
        format!("run_{}_{}_{}", self.number, self.start, self.end)
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn is_last(&self) -> bool {
        self.number == self.total
    }
}

impl fmt::Display for PartitionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "partition {}/{} [{}, {})",
            self.number, self.total, self.start, self.end
        )
    }
}

/// Split `range` into `count` near-equal partitions.
///
/// Every partition gets `len / count` versions; the last one also absorbs the
/// remainder so the plan covers `range` exactly.
pub fn partition(range: VersionRange, count: u32) -> Result<Vec<PartitionSpec>> {
    if count == 0 {
        return Err(VerifyError::config("partition count must be at least 1"));
    }
    let per_partition = range.len() / u64::from(count);
    if per_partition == 0 {
        return Err(VerifyError::config(format!(
            "range {} is too small for {} partitions",
            range, count
        )));
    }

    let partitions = (1..=count)
        .map(|n| {
            let mut end = range.start + u64::from(n) * per_partition;
            let start = end - per_partition;
            if n == count && end < range.end {
                end = range.end;
            }
            PartitionSpec {
                number: n,
                total: count,
                start,
                end,
            }
        })
        .collect();

    Ok(partitions)
}

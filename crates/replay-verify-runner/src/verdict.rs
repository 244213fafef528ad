//! Verdict aggregation over all partition outcomes.

use serde::{Deserialize, Serialize};

use crate::worker::PartitionOutcome;

/// Banner printed above every failing partition.
pub const ERROR_BANNER: &str = "======== ERROR ========";

/// Final pass/fail result of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunVerdict {
    /// Last-attempt outcome of every partition.
    pub outcomes: Vec<PartitionOutcome>,

    /// True iff every partition exited 0.
    pub success: bool,
}

impl RunVerdict {
    /// Aggregate outcomes. Any non-zero exit code fails the run.
    pub fn aggregate(outcomes: Vec<PartitionOutcome>) -> Self {
        let success = outcomes.iter().all(PartitionOutcome::passed);
        Self { outcomes, success }
    }

    /// Failing partitions, in outcome order.
    pub fn failures(&self) -> impl Iterator<Item = &PartitionOutcome> {
        self.outcomes.iter().filter(|o| !o.passed())
    }

    pub fn passed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.failures().count()
    }

    /// One diagnostic line per failing partition.
    pub fn diagnostics(&self) -> Vec<String> {
        self.failures()
            .map(|o| {
                format!(
                    "ERROR: partition {} failed with exit status {}, {}",
                    o.number,
                    o.exit_code,
                    o.tail_text()
                )
            })
            .collect()
    }

    /// All failing partitions' diagnostics, each under the error banner.
    /// Empty when the run succeeded.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in self.diagnostics() {
            out.push_str(ERROR_BANNER);
            out.push('\n');
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    /// Process exit code for automation.
    pub fn exit_code(&self) -> i32 {
        if self.success {
            0
        } else {
            1
        }
    }
}

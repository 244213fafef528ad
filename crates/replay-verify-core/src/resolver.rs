//! Runner range resolution.
//!
//! Turns an environment, an optional runner selector and an optional operator
//! override into the concrete version range this invocation will verify.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, VerifyError};
use crate::oracle::LatestVersionOracle;
use crate::ranges::{Environment, TableRange, VersionRange};

/// Which slice of the range table this invocation owns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunnerSelector {
    pub index: u32,
    pub count: u32,
}

impl RunnerSelector {
    pub fn new(index: u32, count: u32) -> Result<Self> {
        let selector = Self { index, count };
        selector.validate()?;
        Ok(selector)
    }

    /// The default: one runner covering everything.
    pub fn single() -> Self {
        Self { index: 0, count: 1 }
    }

    pub fn validate(&self) -> Result<()> {
        if self.index >= self.count {
            return Err(VerifyError::config(format!(
                "runner index {} must be below runner count {}",
                self.index, self.count
            )));
        }
        Ok(())
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 == self.count
    }
}

/// Resolve the version range for one runner.
///
/// Without a selector the whole table collapses into a single open-ended
/// runner. The oracle is always consulted (its query also warms the shared
/// metadata cache) but its answer is only required when the runner's end is
/// open or the runner is the last one in the table.
pub async fn resolve(
    environment: Environment,
    selector: Option<RunnerSelector>,
    explicit_range: Option<(u64, u64)>,
    oracle: &dyn LatestVersionOracle,
) -> Result<VersionRange> {
    resolve_in_table(environment.range_table(), selector, explicit_range, oracle).await
}

/// [`resolve`] against an arbitrary table.
pub async fn resolve_in_table(
    table: &[TableRange],
    selector: Option<RunnerSelector>,
    explicit_range: Option<(u64, u64)>,
    oracle: &dyn LatestVersionOracle,
) -> Result<VersionRange> {
    let first = table
        .first()
        .ok_or_else(|| VerifyError::config("range table is empty"))?;

    let collapsed;
    let (table, selector) = match selector {
        Some(selector) => (table, selector),
        None => {
            collapsed = [TableRange {
                start: first.start,
                end: table.last().and_then(|last| last.end),
            }];
            (&collapsed[..], RunnerSelector::single())
        }
    };

    if selector.count as usize != table.len() {
        return Err(VerifyError::config(format!(
            "runner count {} must match the {} runner ranges of the table",
            selector.count,
            table.len()
        )));
    }
    selector.validate()?;

    let entry = table[selector.index as usize];
    let latest = oracle.latest_version().await?;

    let runner_start = entry.start;
    let runner_end = if selector.is_last() || entry.is_open() {
        latest.ok_or_else(|| VerifyError::oracle("failed to query latest version from backup"))?
    } else {
        // Bounded entries always carry an end.
        entry.end.unwrap_or(entry.start)
    };
    info!(
        runner = selector.index,
        runners = selector.count,
        start = runner_start,
        end = runner_end,
        "Resolved runner range"
    );

    let (start, end) = match explicit_range {
        Some((start, end)) => {
            info!(start, end, "Using explicit version range override");
            (start, end)
        }
        None => (runner_start, runner_end),
    };

    VersionRange::new(start, end)
}

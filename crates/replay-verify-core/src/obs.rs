//! Structured observability hooks for the verification run lifecycle.
//!
//! - Run-scoped tracing span via [`run_span`]
//! - Emission functions for run start/finish and per-partition attempts

use tracing::{info, warn};

use crate::partition::PartitionSpec;
use crate::ranges::{Environment, VersionRange};

/// Span tagging everything in a run with its `run_id`.
///
/// Attach it to async work with `tracing::Instrument` rather than entering it
/// across await points.
///
/// ```ignore
/// execute(..).instrument(run_span(&run_id)).await
/// ```
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("replay_verify.run", run_id = %run_id)
}

pub fn emit_run_started(
    run_id: &str,
    environment: Environment,
    range: VersionRange,
    partitions: u32,
    plan_digest: &str,
) {
    info!(
        event = "run.started",
        run_id = %run_id,
        environment = %environment,
        start = range.start,
        end = range.end,
        partitions = partitions,
        plan_digest = %plan_digest,
    );
}

pub fn emit_partition_attempt(spec: &PartitionSpec, attempt: u32, max_attempts: u32) {
    info!(
        event = "partition.attempt",
        partition = spec.number,
        start = spec.start,
        end = spec.end,
        attempt = attempt,
        max_attempts = max_attempts,
    );
}

/// Emit event: a partition reached a terminal state.
pub fn emit_partition_finished(number: u32, attempts: u32, exit_code: i32, succeeded: bool) {
    if succeeded {
        info!(
            event = "partition.finished",
            partition = number,
            attempts = attempts,
            exit_code = exit_code,
            succeeded = true,
        );
    } else {
        warn!(
            event = "partition.finished",
            partition = number,
            attempts = attempts,
            exit_code = exit_code,
            succeeded = false,
        );
    }
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, failed_partitions: usize, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        failed_partitions = failed_partitions,
        success = success,
    );
}

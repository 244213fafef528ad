//! Verification run orchestration and reporting.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use chrono::{DateTime, Utc};
use replay_verify_core::{obs, Environment};
use serde::{Deserialize, Serialize};
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::executor::execute_partitions;
use crate::plan::VerifyPlan;
use crate::supervisor::{RetryPolicy, SupervisedOutcome, SupervisorState};
use crate::verdict::RunVerdict;
use crate::worker::PartitionWorker;

/// Result of a complete verification run.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub run_id: String,

    pub environment: Environment,

    pub plan: VerifyPlan,

    /// Supervised outcome per partition, ordered by partition number.
    pub partitions: Vec<SupervisedOutcome>,

    pub verdict: RunVerdict,

    pub started_at: DateTime<Utc>,

    pub finished_at: DateTime<Utc>,

    pub duration_ms: u64,
}

impl PipelineResult {
    pub fn success(&self) -> bool {
        self.verdict.success
    }

    /// Serializable summary of the run.
    pub fn report(&self) -> RunReport {
        RunReport {
            run_id: self.run_id.clone(),
            environment: self.environment,
            start_version: self.plan.range.start,
            end_version: self.plan.range.end,
            plan_digest: self.plan.digest.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            duration_ms: self.duration_ms,
            success: self.verdict.success,
            partitions: self
                .plan
                .partitions
                .iter()
                .zip(&self.partitions)
                .map(|(spec, supervised)| PartitionReport {
                    number: spec.number,
                    start: spec.start,
                    end: spec.end,
                    attempts: supervised.attempts,
                    state: supervised.state,
                    exit_code: supervised.outcome.exit_code,
                    tail: supervised
                        .outcome
                        .tail
                        .iter()
                        .map(|l| String::from_utf8_lossy(l).into_owned())
                        .collect(),
                })
                .collect(),
        }
    }
}

/// JSON run report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub run_id: String,
    pub environment: Environment,
    pub start_version: u64,
    pub end_version: u64,
    pub plan_digest: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    pub partitions: Vec<PartitionReport>,
}

/// One partition's entry in the [`RunReport`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartitionReport {
    pub number: u32,
    pub start: u64,
    pub end: u64,
    pub attempts: u32,
    pub state: SupervisorState,
    pub exit_code: i32,
    pub tail: Vec<String>,
}

impl RunReport {
    /// Write the report as pretty JSON.
    pub fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write run report to {}", path.display()))?;
        Ok(())
    }
}

/// Verification run orchestrator.
pub struct VerifyPipeline;

impl VerifyPipeline {
    /// Run every partition of `plan` and aggregate a verdict.
    ///
    /// Always waits for all partitions; a failing partition never cancels
    /// its siblings.
    pub async fn run(
        worker: Arc<dyn PartitionWorker>,
        environment: Environment,
        plan: &VerifyPlan,
        policy: RetryPolicy,
        parallelism: usize,
    ) -> PipelineResult {
        let run_id = Uuid::new_v4().to_string();
        let span = obs::run_span(&run_id);
        let started_at = Utc::now();
        let start = Instant::now();

        span.in_scope(|| {
            obs::emit_run_started(
                &run_id,
                environment,
                plan.range,
                plan.partitions.len() as u32,
                &plan.digest,
            )
        });

        let partitions = execute_partitions(worker, plan.partitions.clone(), policy, parallelism)
            .instrument(span.clone())
            .await;
        let verdict = RunVerdict::aggregate(partitions.iter().map(|p| p.outcome.clone()).collect());

        let duration_ms = start.elapsed().as_millis() as u64;
        span.in_scope(|| {
            obs::emit_run_finished(&run_id, duration_ms, verdict.failed_count(), verdict.success);
            if verdict.success {
                info!("Replay verification completed successfully");
            } else {
                info!("Replay verification failed");
            }
        });

        PipelineResult {
            run_id,
            environment,
            plan: plan.clone(),
            partitions,
            verdict,
            started_at,
            finished_at: Utc::now(),
            duration_ms,
        }
    }
}

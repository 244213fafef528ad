//! Bounded parallel execution of supervised partitions.
//!
//! Every partition's retry loop runs on its own task; a semaphore caps how many
//! run at once. There is no fail-fast: the executor always waits for every
//! partition to reach a terminal state so each failure gets full diagnostics.

use std::sync::Arc;

use futures::future::join_all;
use replay_verify_core::PartitionSpec;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument};

use crate::supervisor::{supervise, FailureKind, RetryPolicy, SupervisedOutcome, SupervisorState};
use crate::worker::{PartitionOutcome, PartitionWorker};

/// Run every partition to a terminal state with at most `parallelism`
/// partitions in flight. Results are ordered by partition number.
#[instrument(skip_all, fields(partitions = partitions.len(), parallelism = parallelism))]
pub async fn execute_partitions(
    worker: Arc<dyn PartitionWorker>,
    partitions: Vec<PartitionSpec>,
    policy: RetryPolicy,
    parallelism: usize,
) -> Vec<SupervisedOutcome> {
    let sem = Arc::new(Semaphore::new(parallelism.max(1)));
    let policy = Arc::new(policy);

    let mut numbers = Vec::with_capacity(partitions.len());
    let mut tasks = Vec::with_capacity(partitions.len());

    for spec in partitions {
        let worker = Arc::clone(&worker);
        let policy = Arc::clone(&policy);
        let sem = Arc::clone(&sem);

        numbers.push(spec.number);
        tasks.push(tokio::spawn(async move {
            // The semaphore is never closed.
            let _permit = sem.acquire_owned().await.ok();
            debug!(partition = spec.number, "Partition slot acquired");
            supervise(worker.as_ref(), &spec, &policy).await
        }));
    }

    let mut results: Vec<SupervisedOutcome> = join_all(tasks)
        .await
        .into_iter()
        .zip(numbers)
        .map(|(joined, number)| match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(partition = number, error = %e, "Partition task panicked");
                SupervisedOutcome {
                    outcome: PartitionOutcome {
                        number,
                        exit_code: -1,
                        tail: vec![format!("partition task failed: {}", e).into_bytes()],
                    },
                    attempts: 0,
                    state: SupervisorState::Failed(FailureKind::RetriesExhausted),
                }
            }
        })
        .collect();

    results.sort_by_key(|r| r.outcome.number);
    info!("All partitions reached a terminal state");
    results
}

//! Retry supervision and verdict tests driven by scripted workers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use replay_verify_core::{Environment, PartitionSpec, Result, VerifyError, VersionRange};
use replay_verify_runner::{
    supervise, FailureKind, PartitionOutcome, PartitionWorker, RetryPolicy, SupervisorState,
    VerifyPipeline, VerifyPlan,
};

const TRANSIENT: i32 = 1;
const INTEGRITY: i32 = 2;

/// Worker that replays a fixed script of exit codes per partition. Once a
/// partition's script runs out it keeps returning its last code.
struct ScriptedWorker {
    scripts: Mutex<HashMap<u32, Vec<i32>>>,
    default_code: i32,
    calls: Mutex<HashMap<u32, u32>>,
}

impl ScriptedWorker {
    fn new(default_code: i32) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default_code,
            calls: Mutex::new(HashMap::new()),
        }
    }

    fn script(self, partition: u32, codes: &[i32]) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(partition, codes.iter().rev().copied().collect());
        self
    }

    fn calls(&self, partition: u32) -> u32 {
        *self.calls.lock().unwrap().get(&partition).unwrap_or(&0)
    }
}

#[async_trait]
impl PartitionWorker for ScriptedWorker {
    async fn invoke(&self, spec: &PartitionSpec) -> Result<PartitionOutcome> {
        *self.calls.lock().unwrap().entry(spec.number).or_insert(0) += 1;
        let code = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(&spec.number) {
                Some(codes) if codes.len() > 1 => codes.pop().unwrap(),
                Some(codes) => codes.last().copied().unwrap_or(self.default_code),
                None => self.default_code,
            }
        };
        Ok(PartitionOutcome {
            number: spec.number,
            exit_code: code,
            tail: vec![format!("partition {} exit {}", spec.number, code).into_bytes()],
        })
    }
}

fn spec(number: u32) -> PartitionSpec {
    PartitionSpec {
        number,
        total: 16,
        start: u64::from(number) * 100,
        end: u64::from(number) * 100 + 100,
    }
}

fn policy() -> RetryPolicy {
    RetryPolicy::new(6, INTEGRITY)
}

#[tokio::test]
async fn test_transient_then_success_takes_three_attempts() {
    let worker = ScriptedWorker::new(0).script(1, &[TRANSIENT, TRANSIENT, 0]);
    let result = supervise(&worker, &spec(1), &policy()).await;

    assert_eq!(result.state, SupervisorState::Succeeded);
    assert_eq!(result.attempts, 3);
    assert_eq!(worker.calls(1), 3);
    assert_eq!(result.outcome.exit_code, 0);
}

#[tokio::test]
async fn test_transient_forever_exhausts_six_attempts() {
    let worker = ScriptedWorker::new(TRANSIENT);
    let result = supervise(&worker, &spec(1), &policy()).await;

    assert_eq!(result.state, SupervisorState::Failed(FailureKind::RetriesExhausted));
    assert_eq!(result.attempts, 6);
    assert_eq!(worker.calls(1), 6);
    assert_eq!(result.outcome.exit_code, TRANSIENT);
}

#[tokio::test]
async fn test_integrity_failure_never_retried() {
    let worker = ScriptedWorker::new(0).script(1, &[INTEGRITY, 0]);
    let result = supervise(&worker, &spec(1), &policy()).await;

    assert_eq!(result.state, SupervisorState::Failed(FailureKind::Integrity));
    assert_eq!(result.attempts, 1);
    assert_eq!(worker.calls(1), 1);
}

#[tokio::test]
async fn test_integrity_after_transient_stops_immediately() {
    let worker = ScriptedWorker::new(0).script(1, &[TRANSIENT, INTEGRITY, 0]);
    let result = supervise(&worker, &spec(1), &policy()).await;

    assert_eq!(result.state, SupervisorState::Failed(FailureKind::Integrity));
    assert_eq!(result.attempts, 2);
}

#[tokio::test]
async fn test_configurable_sentinel() {
    // With sentinel 42, exit code 2 becomes an ordinary transient failure.
    let worker = ScriptedWorker::new(0).script(1, &[INTEGRITY, 0]);
    let result = supervise(&worker, &spec(1), &RetryPolicy::new(6, 42)).await;

    assert_eq!(result.state, SupervisorState::Succeeded);
    assert_eq!(result.attempts, 2);
}

/// Worker whose every attempt fails to launch.
struct BrokenWorker {
    calls: AtomicU32,
}

#[async_trait]
impl PartitionWorker for BrokenWorker {
    async fn invoke(&self, spec: &PartitionSpec) -> Result<PartitionOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(VerifyError::Worker {
            partition: spec.number,
            reason: "failed to spawn target/release/aptos-debugger".to_string(),
        })
    }
}

#[tokio::test]
async fn test_spawn_errors_are_retried_then_reported() {
    let worker = BrokenWorker {
        calls: AtomicU32::new(0),
    };
    let result = supervise(&worker, &spec(2), &RetryPolicy::new(3, INTEGRITY)).await;

    assert_eq!(worker.calls.load(Ordering::SeqCst), 3);
    assert_eq!(result.state, SupervisorState::Failed(FailureKind::RetriesExhausted));
    assert_eq!(result.outcome.exit_code, -1);
    assert!(result.outcome.tail_text().contains("failed to spawn"));
}

#[tokio::test]
async fn test_pipeline_reports_failing_partition_three() {
    let worker = Arc::new(
        ScriptedWorker::new(0)
            .script(3, &[INTEGRITY])
            .script(7, &[TRANSIENT, 0]),
    );
    let range = VersionRange::new(1032373939, 1048163412).unwrap();
    let plan = VerifyPlan::new(range, 16).unwrap();

    let result =
        VerifyPipeline::run(worker.clone(), Environment::Testnet, &plan, policy(), 16).await;

    assert!(!result.success());
    assert_eq!(result.partitions.len(), 16);
    assert_eq!(result.verdict.failed_count(), 1);

    let diags = result.verdict.diagnostics();
    assert_eq!(diags.len(), 1);
    assert!(diags[0].contains("partition 3"));
    assert!(diags[0].contains("exit status 2"));

    // Siblings still ran to completion.
    assert_eq!(worker.calls(3), 1);
    assert_eq!(worker.calls(7), 2);
    for n in 1..=16 {
        assert!(worker.calls(n) >= 1, "partition {} never ran", n);
    }

    let report = result.report();
    assert_eq!(report.plan_digest, plan.digest);
    assert_eq!(report.partitions[2].attempts, 1);
    assert_eq!(report.partitions[6].attempts, 2);
    assert_eq!(report.partitions[15].end, 1048163412);
}

#[tokio::test]
async fn test_pipeline_all_green() {
    let worker = Arc::new(ScriptedWorker::new(0));
    let plan = VerifyPlan::new(VersionRange::new(0, 1_000).unwrap(), 4).unwrap();

    let result = VerifyPipeline::run(worker, Environment::Mainnet, &plan, policy(), 2).await;

    assert!(result.success());
    assert_eq!(result.verdict.exit_code(), 0);
    assert!(result.verdict.render().is_empty());
    assert!(result.partitions.iter().all(|p| p.attempts == 1));
}

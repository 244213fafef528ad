//! Replay-Verify Runner
//!
//! Execution half of a backup replay verification run:
//! - builds and streams one debugger process per partition attempt
//! - supervises retries, never retrying a confirmed integrity failure
//! - runs all partitions under bounded parallelism
//! - aggregates a single pass/fail verdict with per-partition diagnostics

pub mod command;
pub mod executor;
pub mod pipeline;
pub mod plan;
pub mod supervisor;
pub mod verdict;
pub mod worker;

// Re-export key types
pub use command::WorkerCommand;
pub use executor::execute_partitions;
pub use pipeline::{PartitionReport, PipelineResult, RunReport, VerifyPipeline};
pub use plan::VerifyPlan;
pub use supervisor::{
    classify_exit_code, supervise, AttemptClass, FailureKind, RetryPolicy, SupervisedOutcome,
    SupervisorState,
};
pub use verdict::{RunVerdict, ERROR_BANNER};
pub use worker::{
    run_streaming, PartitionOutcome, PartitionWorker, ProcessWorker, OUTPUT_BUFFER_LINES, TAIL_LINES,
};

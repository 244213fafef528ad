//! Partition worker invocation: one attempt, one external process.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use replay_verify_core::{prepare_partition_dir, PartitionSpec, Result, VerifyConfig, VerifyError};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::command::WorkerCommand;

/// Number of trailing output lines kept per attempt.
pub const TAIL_LINES: usize = 10;

/// Lines buffered between the pipe readers and the log writer. When full the
/// readers stop draining the pipes and the worker blocks on its own writes.
pub const OUTPUT_BUFFER_LINES: usize = 64;

/// Result of one attempt at verifying a partition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartitionOutcome {
    /// Partition number.
    pub number: u32,

    /// Worker exit code (-1 when killed by a signal or never started).
    pub exit_code: i32,

    /// Last output lines, oldest first.
    pub tail: Vec<Vec<u8>>,
}

impl PartitionOutcome {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }

    /// Outcome for an attempt whose worker could not be driven at all.
    pub fn from_error(number: u32, error: &VerifyError) -> Self {
        Self {
            number,
            exit_code: -1,
            tail: vec![error.to_string().into_bytes()],
        }
    }

    /// Tail lines joined with newlines, lossily decoded.
    pub fn tail_text(&self) -> String {
        self.tail
            .iter()
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Fixed-capacity window over the most recent output lines.
#[derive(Debug, Clone)]
pub struct TailBuffer {
    lines: VecDeque<Vec<u8>>,
    capacity: usize,
}

impl TailBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: Vec<u8>) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn into_lines(self) -> Vec<Vec<u8>> {
        self.lines.into()
    }
}

/// Runs one verification attempt for a partition.
#[async_trait]
pub trait PartitionWorker: Send + Sync {
    /// Block until the attempt finishes. `Err` means the worker could not be
    /// driven (setup or spawn failed); exit codes are never errors.
    async fn invoke(&self, spec: &PartitionSpec) -> Result<PartitionOutcome>;
}

/// Production worker: prepares the partition directory and runs the debugger.
#[derive(Debug, Clone)]
pub struct ProcessWorker {
    config: Arc<VerifyConfig>,
}

impl ProcessWorker {
    pub fn new(config: Arc<VerifyConfig>) -> Self {
        Self { config }
    }

    fn work_dir(&self) -> PathBuf {
        self.config.work_dir.clone()
    }
}

#[async_trait]
impl PartitionWorker for ProcessWorker {
    async fn invoke(&self, spec: &PartitionSpec) -> Result<PartitionOutcome> {
        let work_dir = self.work_dir();
        let owned_spec = *spec;
        let dirs = tokio::task::spawn_blocking(move || prepare_partition_dir(&work_dir, &owned_spec))
            .await
            .map_err(|e| VerifyError::Worker {
                partition: spec.number,
                reason: format!("directory setup panicked: {}", e),
            })??;

        info!(partition = spec.number, dir = %dirs.root.display(), "Spawning partition worker");

        let command = WorkerCommand::replay_verify(
            &self.config.worker,
            spec,
            &dirs,
            &self.config.txns_to_skip,
            &self.config.backup_config_path,
        )
        .with_backup_env(&self.config);

        run_streaming(spec.number, &command).await
    }
}

/// Spawn `command`, stream its stdout and stderr line by line into the log,
/// and return its exit status with the last [`TAIL_LINES`] lines.
///
/// The two pipes are read by separate tasks feeding one queue, so lines keep
/// their order within a stream. Across streams the tail follows arrival order
/// at the reader, which can differ slightly from the order the worker wrote
/// them when stdout and stderr are written in quick succession.
pub async fn run_streaming(partition: u32, command: &WorkerCommand) -> Result<PartitionOutcome> {
    let worker_err = |reason: String| VerifyError::Worker { partition, reason };

    let mut child = Command::new(&command.program)
        .args(&command.args)
        .envs(command.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| worker_err(format!("failed to spawn {}: {}", command.program.display(), e)))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| worker_err("stdout is not captured".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| worker_err("stderr is not captured".to_string()))?;

    let (tx, mut rx) = mpsc::channel(OUTPUT_BUFFER_LINES);
    let readers = [
        tokio::spawn(forward_lines(stdout, tx.clone())),
        tokio::spawn(forward_lines(stderr, tx)),
    ];

    let mut tail = TailBuffer::new(TAIL_LINES);
    while let Some(line) = rx.recv().await {
        info!(partition, "{}", String::from_utf8_lossy(&line));
        tail.push(line);
    }

    for reader in readers {
        reader
            .await
            .map_err(|e| worker_err(format!("output reader panicked: {}", e)))?
            .map_err(|e| worker_err(format!("failed reading worker output: {}", e)))?;
    }

    let status = child.wait().await?;
    let exit_code = status.code().unwrap_or(-1);
    debug!(partition, exit_code, "Partition worker exited");

    Ok(PartitionOutcome {
        number: partition,
        exit_code,
        tail: tail.into_lines(),
    })
}

async fn forward_lines<R>(reader: R, tx: mpsc::Sender<Vec<u8>>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut segments = BufReader::new(reader).split(b'\n');
    while let Some(mut line) = segments.next_segment().await? {
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if tx.send(line).await.is_err() {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> WorkerCommand {
        WorkerCommand::custom("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[test]
    fn test_tail_buffer_keeps_latest() {
        let mut tail = TailBuffer::new(3);
        for i in 0..5u8 {
            tail.push(vec![b'0' + i]);
        }
        assert_eq!(tail.len(), 3);
        assert_eq!(tail.into_lines(), vec![b"2".to_vec(), b"3".to_vec(), b"4".to_vec()]);
    }

    #[test]
    fn test_outcome_from_error() {
        let err = VerifyError::Worker {
            partition: 4,
            reason: "boom".to_string(),
        };
        let outcome = PartitionOutcome::from_error(4, &err);
        assert_eq!(outcome.exit_code, -1);
        assert!(!outcome.passed());
        assert!(outcome.tail_text().contains("boom"));
    }

    #[tokio::test]
    async fn test_run_streaming_success() {
        let outcome = run_streaming(1, &sh("echo hello; echo world")).await.unwrap();
        assert_eq!(outcome.number, 1);
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.tail, vec![b"hello".to_vec(), b"world".to_vec()]);
    }

    #[tokio::test]
    async fn test_run_streaming_keeps_last_ten_lines() {
        let outcome = run_streaming(2, &sh("for i in $(seq 1 25); do echo line-$i; done; exit 3"))
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, 3);
        assert_eq!(outcome.tail.len(), TAIL_LINES);
        assert_eq!(outcome.tail.first().unwrap(), b"line-16");
        assert_eq!(outcome.tail.last().unwrap(), b"line-25");
    }

    #[tokio::test]
    async fn test_run_streaming_captures_stderr() {
        let outcome = run_streaming(3, &sh("echo mismatch at version 42 >&2; exit 2"))
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, 2);
        assert!(outcome.tail_text().contains("mismatch at version 42"));
    }

    #[tokio::test]
    async fn test_run_streaming_output_larger_than_buffer() {
        let lines = OUTPUT_BUFFER_LINES * 50;
        let script = format!(
            "i=0; while [ $i -lt {n} ]; do echo out-$i; echo err-$i >&2; i=$((i+1)); done",
            n = lines
        );
        let outcome = run_streaming(4, &sh(&script)).await.unwrap();
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.tail.len(), TAIL_LINES);

        let last_out = format!("out-{}", lines - 1).into_bytes();
        let last_err = format!("err-{}", lines - 1).into_bytes();
        assert!(outcome.tail.contains(&last_out));
        assert!(outcome.tail.contains(&last_err));
    }

    #[tokio::test]
    async fn test_run_streaming_merges_both_streams() {
        let outcome = run_streaming(6, &sh("echo a; echo b >&2; echo c")).await.unwrap();
        let mut lines = outcome.tail.clone();
        lines.sort();
        assert_eq!(lines, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);

        let stdout_only: Vec<_> = outcome.tail.iter().filter(|l| *l != b"b").collect();
        assert_eq!(stdout_only, vec![&b"a".to_vec(), &b"c".to_vec()]);
    }

    #[tokio::test]
    async fn test_run_streaming_passes_env() {
        let mut cmd = sh("echo $SUB_DIR");
        cmd.envs.push(("SUB_DIR".to_string(), "e7".to_string()));
        let outcome = run_streaming(1, &cmd).await.unwrap();
        assert_eq!(outcome.tail, vec![b"e7".to_vec()]);
    }

    #[tokio::test]
    async fn test_run_streaming_missing_binary() {
        let cmd = WorkerCommand::custom("/nonexistent/aptos-debugger", vec![]);
        let err = run_streaming(5, &cmd).await.unwrap_err();
        assert!(matches!(err, VerifyError::Worker { partition: 5, .. }));
    }
}

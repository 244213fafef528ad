//! Retry supervision for a single partition.
//!
//! Each partition is driven through a small state machine:
//!
//! ```text
//! Attempting(1) --success--> Succeeded
//!       |---------terminal--> Failed(Integrity)
//!       '--retryable--> Attempting(2) ... Attempting(max) --retryable--> Failed(RetriesExhausted)
//! ```
//!
//! Which exit codes count as success, terminal or retryable is decided by an
//! injected classifier so the sentinel mapping lives in one place.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use replay_verify_core::{obs, PartitionSpec, RetrySettings, METRICS};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::worker::{PartitionOutcome, PartitionWorker};

/// Classification of one attempt's exit code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttemptClass {
    /// Data verified clean.
    Success,
    /// Infrastructure hiccup; worth another attempt.
    Retryable,
    /// Confirmed integrity failure; retrying cannot help.
    Terminal,
}

/// Default exit code classification: `0` succeeds, `integrity_exit_code` is
/// terminal, anything else is retryable.
pub fn classify_exit_code(exit_code: i32, integrity_exit_code: i32) -> AttemptClass {
    if exit_code == 0 {
        AttemptClass::Success
    } else if exit_code == integrity_exit_code {
        AttemptClass::Terminal
    } else {
        AttemptClass::Retryable
    }
}

/// Why a partition ended in `Failed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Integrity,
    RetriesExhausted,
}

/// Supervisor state for one partition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    /// About to run (or running) the given 1-based attempt.
    Attempting(u32),
    Succeeded,
    Failed(FailureKind),
}

impl SupervisorState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SupervisorState::Attempting(_))
    }

    /// Transition after an attempt classified as `class`.
    pub fn next(self, class: AttemptClass, max_attempts: u32) -> SupervisorState {
        match self {
            SupervisorState::Attempting(attempt) => match class {
                AttemptClass::Success => SupervisorState::Succeeded,
                AttemptClass::Terminal => SupervisorState::Failed(FailureKind::Integrity),
                AttemptClass::Retryable if attempt < max_attempts => {
                    SupervisorState::Attempting(attempt + 1)
                }
                AttemptClass::Retryable => SupervisorState::Failed(FailureKind::RetriesExhausted),
            },
            terminal => terminal,
        }
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorState::Attempting(n) => write!(f, "attempting({})", n),
            SupervisorState::Succeeded => f.write_str("succeeded"),
            SupervisorState::Failed(FailureKind::Integrity) => f.write_str("failed(integrity)"),
            SupervisorState::Failed(FailureKind::RetriesExhausted) => {
                f.write_str("failed(retries_exhausted)")
            }
        }
    }
}

/// Exit code classifier.
pub type Classifier = Arc<dyn Fn(i32) -> AttemptClass + Send + Sync>;

/// Retry policy for a partition.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Attempts including the first one.
    pub max_attempts: u32,

    /// Base delay for exponential backoff between retries; zero retries at once.
    pub backoff_base_ms: u64,

    classifier: Classifier,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff_base_ms", &self.backoff_base_ms)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    /// Policy using [`classify_exit_code`] with the given integrity sentinel.
    pub fn new(max_attempts: u32, integrity_exit_code: i32) -> Self {
        Self {
            max_attempts,
            backoff_base_ms: 0,
            classifier: Arc::new(move |code| classify_exit_code(code, integrity_exit_code)),
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(settings.max_attempts, settings.integrity_exit_code)
            .with_backoff(settings.backoff_base_ms)
    }

    pub fn with_backoff(mut self, backoff_base_ms: u64) -> Self {
        self.backoff_base_ms = backoff_base_ms;
        self
    }

    /// Replace the exit code classifier.
    pub fn with_classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(i32) -> AttemptClass + Send + Sync + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn classify(&self, exit_code: i32) -> AttemptClass {
        (self.classifier)(exit_code)
    }

    fn backoff(&self, attempt: u32) -> Option<Duration> {
        if self.backoff_base_ms == 0 {
            return None;
        }
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Some(Duration::from_millis(self.backoff_base_ms.saturating_mul(factor)))
    }
}

/// Terminal result of supervising one partition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SupervisedOutcome {
    /// Outcome of the last attempt.
    pub outcome: PartitionOutcome,

    /// Attempts actually made.
    pub attempts: u32,

    /// `Succeeded` or `Failed(_)`.
    pub state: SupervisorState,
}

impl SupervisedOutcome {
    pub fn succeeded(&self) -> bool {
        self.state == SupervisorState::Succeeded
    }
}

/// Drive `spec` through the retry state machine until it is terminal.
pub async fn supervise(
    worker: &dyn PartitionWorker,
    spec: &PartitionSpec,
    policy: &RetryPolicy,
) -> SupervisedOutcome {
    let max_attempts = policy.max_attempts.max(1);
    let mut state = SupervisorState::Attempting(1);
    let mut attempts = 0;
    let mut last = PartitionOutcome {
        number: spec.number,
        exit_code: -1,
        tail: Vec::new(),
    };

    while let SupervisorState::Attempting(attempt) = state {
        attempts = attempt;
        obs::emit_partition_attempt(spec, attempt, max_attempts);
        METRICS.inc_attempts();

        last = match worker.invoke(spec).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(partition = spec.number, attempt, error = %e, "Partition attempt could not run");
                PartitionOutcome::from_error(spec.number, &e)
            }
        };

        let class = policy.classify(last.exit_code);
        state = state.next(class, max_attempts);

        if let SupervisorState::Attempting(_) = state {
            METRICS.inc_retries();
            warn!(
                partition = spec.number,
                attempt,
                exit_code = last.exit_code,
                "Retryable partition failure"
            );
            if let Some(delay) = policy.backoff(attempt) {
                tokio::time::sleep(delay).await;
            }
        }
    }

    match state {
        SupervisorState::Succeeded => METRICS.inc_succeeded(),
        SupervisorState::Failed(FailureKind::Integrity) => METRICS.inc_integrity_failures(),
        SupervisorState::Failed(FailureKind::RetriesExhausted) => METRICS.inc_retries_exhausted(),
        SupervisorState::Attempting(_) => {}
    }
    obs::emit_partition_finished(spec.number, attempts, last.exit_code, state == SupervisorState::Succeeded);

    SupervisedOutcome {
        outcome: last,
        attempts,
        state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_exit_code() {
        assert_eq!(classify_exit_code(0, 2), AttemptClass::Success);
        assert_eq!(classify_exit_code(2, 2), AttemptClass::Terminal);
        assert_eq!(classify_exit_code(1, 2), AttemptClass::Retryable);
        assert_eq!(classify_exit_code(-1, 2), AttemptClass::Retryable);
        assert_eq!(classify_exit_code(2, 42), AttemptClass::Retryable);
        assert_eq!(classify_exit_code(42, 42), AttemptClass::Terminal);
    }

    #[test]
    fn test_state_transitions() {
        let s = SupervisorState::Attempting(1);
        assert_eq!(s.next(AttemptClass::Success, 6), SupervisorState::Succeeded);
        assert_eq!(
            s.next(AttemptClass::Terminal, 6),
            SupervisorState::Failed(FailureKind::Integrity)
        );
        assert_eq!(s.next(AttemptClass::Retryable, 6), SupervisorState::Attempting(2));
        assert_eq!(
            SupervisorState::Attempting(6).next(AttemptClass::Retryable, 6),
            SupervisorState::Failed(FailureKind::RetriesExhausted)
        );
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        for class in [AttemptClass::Success, AttemptClass::Retryable, AttemptClass::Terminal] {
            assert_eq!(
                SupervisorState::Succeeded.next(class, 6),
                SupervisorState::Succeeded
            );
            let failed = SupervisorState::Failed(FailureKind::Integrity);
            assert_eq!(failed.next(class, 6), failed);
        }
        assert!(!SupervisorState::Attempting(3).is_terminal());
        assert!(SupervisorState::Succeeded.is_terminal());
    }

    #[test]
    fn test_custom_classifier() {
        let policy = RetryPolicy::new(6, 2).with_classifier(|code| match code {
            0 | 3 => AttemptClass::Success,
            _ => AttemptClass::Terminal,
        });
        assert_eq!(policy.classify(3), AttemptClass::Success);
        assert_eq!(policy.classify(1), AttemptClass::Terminal);
    }

    #[test]
    fn test_backoff_schedule() {
        assert_eq!(RetryPolicy::new(6, 2).backoff(1), None);
        let policy = RetryPolicy::new(6, 2).with_backoff(100);
        assert_eq!(policy.backoff(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.backoff(3), Some(Duration::from_millis(400)));
    }

    #[test]
    fn test_from_settings() {
        let policy = RetryPolicy::from_settings(&RetrySettings::default());
        assert_eq!(policy.max_attempts, 6);
        assert_eq!(policy.classify(2), AttemptClass::Terminal);
        assert_eq!(policy.backoff_base_ms, 0);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SupervisorState::Attempting(2).to_string(), "attempting(2)");
        assert_eq!(
            SupervisorState::Failed(FailureKind::RetriesExhausted).to_string(),
            "failed(retries_exhausted)"
        );
    }
}

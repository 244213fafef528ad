//! Error taxonomy for replay-verify orchestration.

/// Errors produced while planning or supervising a verification run.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// Malformed or inconsistent configuration. Always fatal, raised before
    /// any partition starts.
    #[error("config error: {0}")]
    Config(String),

    /// The latest-version oracle failed or returned nothing.
    #[error("oracle error: {0}")]
    Oracle(String),

    /// The external verification worker could not be driven (spawn failure,
    /// broken output pipe).
    #[error("worker error: partition {partition}: {reason}")]
    Worker { partition: u32, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl VerifyError {
    /// Shorthand for building a [`VerifyError::Config`].
    pub fn config(msg: impl Into<String>) -> Self {
        VerifyError::Config(msg.into())
    }

    /// Shorthand for building a [`VerifyError::Oracle`].
    pub fn oracle(msg: impl Into<String>) -> Self {
        VerifyError::Oracle(msg.into())
    }

    /// Whether this error is a configuration problem.
    pub fn is_config(&self) -> bool {
        matches!(self, VerifyError::Config(_))
    }
}

/// Result type for replay-verify operations.
pub type Result<T> = std::result::Result<T, VerifyError>;

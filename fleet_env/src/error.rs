//! Error types for the environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Operation did not finish within its deadline
    #[error("Timeout after {0}ms")]
    Timeout(u64),

    /// A spawned or blocking task panicked or was cancelled
    #[error("Task failed: {0}")]
    TaskFailed(String),

    /// An identifier could not be parsed
    #[error("Invalid id: {0}")]
    InvalidId(String),
}

impl EnvError {
    /// Creates a timeout error from a duration.
    pub fn timeout(after: std::time::Duration) -> Self {
        Self::Timeout(after.as_millis() as u64)
    }
}

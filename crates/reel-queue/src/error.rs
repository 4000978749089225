//! Queue error types.

use std::path::PathBuf;

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Invalid job id: {0}")]
    InvalidJobId(String),

    #[error("Invalid worker id: {0}")]
    InvalidWorkerId(String),

    #[error("Job already exists: {0}")]
    DuplicateJob(String),

    #[error("Invalid priority, expected an integer: {0}")]
    InvalidPriority(String),

    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("Unsupported filesystem at {path}: {reason}")]
    UnsupportedFilesystem { path: PathBuf, reason: String },

    #[error("Counter lock failed: {0}")]
    LockFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn invalid_job_id(id: impl Into<String>) -> Self {
        Self::InvalidJobId(id.into())
    }

    pub fn invalid_worker_id(id: impl Into<String>) -> Self {
        Self::InvalidWorkerId(id.into())
    }

    pub fn invalid_priority(value: impl Into<String>) -> Self {
        Self::InvalidPriority(value.into())
    }

    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidTransition(msg.into())
    }

    pub fn unsupported_filesystem(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::UnsupportedFilesystem {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the caller sent something the engine refuses, as opposed to an
    /// I/O or data problem on the server side.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            QueueError::InvalidJobId(_)
                | QueueError::InvalidWorkerId(_)
                | QueueError::DuplicateJob(_)
                | QueueError::InvalidPriority(_)
                | QueueError::InvalidTransition(_)
        )
    }
}

//! Model parsing errors.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("invalid queue type: {0}")]
    InvalidQueueType(String),

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("invalid worker status: {0}")]
    InvalidWorkerStatus(String),

    #[error("invalid stat: {0}. Use jobs_completed or jobs_failed")]
    InvalidStat(String),

    #[error("invalid counter type: {0}")]
    InvalidCounter(String),
}

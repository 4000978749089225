//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Speech synthesis failed: {0}")]
    TtsFailed(String),

    #[error("Transcription failed: {0}")]
    SttFailed(String),

    #[error("Image generation failed: {0}")]
    ImageFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Queue operation failed: {0}")]
    QueueFailed(String),

    #[error("Storage error: {0}")]
    Storage(#[from] reel_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] reel_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] reel_queue::QueueError),

    #[error("File server error: {0}")]
    Client(#[from] reel_client::ClientError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    pub fn missing_input(msg: impl Into<String>) -> Self {
        Self::MissingInput(msg.into())
    }

    pub fn tts_failed(msg: impl Into<String>) -> Self {
        Self::TtsFailed(msg.into())
    }

    pub fn stt_failed(msg: impl Into<String>) -> Self {
        Self::SttFailed(msg.into())
    }

    pub fn image_failed(msg: impl Into<String>) -> Self {
        Self::ImageFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn queue_failed(msg: impl Into<String>) -> Self {
        Self::QueueFailed(msg.into())
    }

    /// Check if error is retryable.
    ///
    /// Used for in-job retries of single calls; a failed job is always
    /// reported to the queue, which applies its own retry cap.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::TtsFailed(_) | WorkerError::ImageFailed(_) | WorkerError::Http(_) => true,
            WorkerError::Storage(_) => true,
            WorkerError::Client(e) => e.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(WorkerError::tts_failed("503").is_retryable());
        assert!(WorkerError::from(reel_client::ClientError::Api {
            status: 502,
            body: String::new()
        })
        .is_retryable());
        assert!(!WorkerError::from(reel_client::ClientError::Unauthorized).is_retryable());
        assert!(!WorkerError::invalid_payload("missing channel_code").is_retryable());
    }
}

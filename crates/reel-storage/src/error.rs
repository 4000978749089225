//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during uploads.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to configure storage backend: {0}")]
    ConfigError(String),

    #[error("Unknown upload backend: {0}")]
    UnknownBackend(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Unexpected response from {backend}: {message}")]
    InvalidResponse { backend: String, message: String },

    #[error("All upload backends failed: {}", .0.join("; "))]
    AllBackendsFailed(Vec<String>),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("AWS SDK error: {0}")]
    AwsSdk(String),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    pub fn invalid_response(backend: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidResponse {
            backend: backend.into(),
            message: msg.into(),
        }
    }
}

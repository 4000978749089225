//! Client error types.

use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),

    #[error("File server rejected the API key")]
    Unauthorized,

    #[error("Path rejected by file server: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("File server returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ClientError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        let server_error = ClientError::Api {
            status: 503,
            body: String::new(),
        };
        let bad_request = ClientError::Api {
            status: 400,
            body: String::new(),
        };
        assert!(server_error.is_retryable());
        assert!(!bad_request.is_retryable());
        assert!(!ClientError::Unauthorized.is_retryable());
        assert!(!ClientError::NotFound("x".into()).is_retryable());
    }
}

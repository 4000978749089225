//! API configuration.

use reel_queue::QueueConfig;

use crate::error::{ApiError, ApiResult};

/// 2 GiB, large enough for rendered videos.
const DEFAULT_MAX_BODY_SIZE: usize = 2 * 1024 * 1024 * 1024;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Shared secret expected in `x-api-key`
    pub api_key: String,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Rate limit requests per second, per client IP
    pub rate_limit_rps: u32,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    pub metrics_enabled: bool,
    /// Job store location and retry policy
    pub queue: QueueConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            api_key: String::new(),
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 50,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            environment: "development".to_string(),
            metrics_enabled: true,
            queue: QueueConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables. `FILE_SERVER_API_KEY` is required.
    pub fn from_env() -> ApiResult<Self> {
        let defaults = Self::default();
        let config = Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            api_key: std::env::var("FILE_SERVER_API_KEY").unwrap_or_default(),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: std::env::var("RATE_LIMIT_RPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.rate_limit_rps),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_body_size),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.metrics_enabled),
            queue: QueueConfig::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ApiResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(ApiError::internal("FILE_SERVER_API_KEY must be set"));
        }
        Ok(())
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.rate_limit_rps, 50);
        assert_eq!(config.max_body_size, 2 * 1024 * 1024 * 1024);
        assert!(!config.is_production());
    }

    #[test]
    fn test_empty_key_is_rejected() {
        let config = ApiConfig {
            api_key: "  ".to_string(),
            ..ApiConfig::default()
        };
        assert!(config.validate().is_err());
    }
}

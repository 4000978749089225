//! Pixeldrain uploads.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::uploader::{file_body, file_name, Uploader};

const NAME: &str = "pixeldrain";

#[derive(Debug, Clone)]
pub struct PixeldrainConfig {
    pub api_url: String,
    /// API key, sent as the basic-auth password
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for PixeldrainConfig {
    fn default() -> Self {
        Self {
            api_url: "https://pixeldrain.com".to_string(),
            api_key: None,
            timeout: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

#[derive(Debug, Clone)]
pub struct PixeldrainUploader {
    http: reqwest::Client,
    config: PixeldrainConfig,
}

impl PixeldrainUploader {
    pub fn new(config: PixeldrainConfig) -> StorageResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StorageError::config_error(e.to_string()))?;
        Ok(Self { http, config })
    }

    fn share_link(&self, id: &str) -> String {
        format!("{}/u/{}", self.config.api_url.trim_end_matches('/'), id)
    }
}

#[async_trait]
impl Uploader for PixeldrainUploader {
    fn name(&self) -> &str {
        NAME
    }

    async fn upload(&self, path: &Path) -> StorageResult<String> {
        let name = file_name(path)?;
        let url = format!(
            "{}/api/file/{}",
            self.config.api_url.trim_end_matches('/'),
            urlencoding::encode(&name)
        );
        debug!("Uploading {} to Pixeldrain", path.display());

        let (body, size) = file_body(path).await?;
        let mut request = self
            .http
            .put(url)
            .header(reqwest::header::CONTENT_LENGTH, size)
            .body(body);
        if let Some(key) = &self.config.api_key {
            request = request.basic_auth("", Some(key));
        }

        let created: Created = request.send().await?.error_for_status()?.json().await?;
        if created.id.is_empty() {
            return Err(StorageError::invalid_response(NAME, "empty file id"));
        }
        Ok(self.share_link(&created.id))
    }
}

//! Gofile uploads.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::uploader::{file_body, file_name, Uploader};

const NAME: &str = "gofile";

/// Gofile endpoints. `upload_url` contains a `{server}` placeholder.
#[derive(Debug, Clone)]
pub struct GofileConfig {
    pub api_url: String,
    pub upload_url: String,
    pub timeout: Duration,
}

impl Default for GofileConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.gofile.io".to_string(),
            upload_url: "https://{server}.gofile.io/contents/uploadfile".to_string(),
            timeout: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Servers {
    servers: Vec<Server>,
}

#[derive(Debug, Deserialize)]
struct Server {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Uploaded {
    download_page: String,
}

fn unwrap_envelope<T>(envelope: Envelope<T>, what: &str) -> StorageResult<T> {
    match envelope {
        Envelope { status, data: Some(data) } if status == "ok" => Ok(data),
        Envelope { status, .. } => Err(StorageError::invalid_response(
            NAME,
            format!("{} returned status '{}'", what, status),
        )),
    }
}

/// Anonymous Gofile uploader.
#[derive(Debug, Clone)]
pub struct GofileUploader {
    http: reqwest::Client,
    config: GofileConfig,
}

impl GofileUploader {
    pub fn new(config: GofileConfig) -> StorageResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StorageError::config_error(e.to_string()))?;
        Ok(Self { http, config })
    }

    async fn best_server(&self) -> StorageResult<String> {
        let url = format!("{}/servers", self.config.api_url.trim_end_matches('/'));
        let envelope: Envelope<Servers> = self
            .http
            .get(url)
            .timeout(Duration::from_secs(30))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        unwrap_envelope(envelope, "server lookup")?
            .servers
            .into_iter()
            .next()
            .map(|s| s.name)
            .ok_or_else(|| StorageError::invalid_response(NAME, "no upload servers"))
    }
}

#[async_trait]
impl Uploader for GofileUploader {
    fn name(&self) -> &str {
        NAME
    }

    async fn upload(&self, path: &Path) -> StorageResult<String> {
        let server = self.best_server().await?;
        let url = self.config.upload_url.replace("{server}", &server);
        debug!(server = %server, "Uploading {} to Gofile", path.display());

        let (body, size) = file_body(path).await?;
        let part = multipart::Part::stream_with_length(body, size).file_name(file_name(path)?);
        let form = multipart::Form::new().part("file", part);

        let envelope: Envelope<Uploaded> = self
            .http
            .post(url)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(unwrap_envelope(envelope, "upload")?.download_page)
    }
}

//! S3-compatible bucket uploads (Contabo object storage).

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::uploader::{file_name, Uploader};

/// Configuration for an S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// S3 API endpoint URL
    pub endpoint_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    pub region: String,
    /// Key prefix for uploads
    pub prefix: String,
    /// Public base URL; defaults to `{endpoint}/{bucket}`
    pub public_url: Option<String>,
}

impl S3Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("CONTABO_S3_ENDPOINT")
                .map_err(|_| StorageError::config_error("CONTABO_S3_ENDPOINT not set"))?,
            access_key_id: std::env::var("CONTABO_S3_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("CONTABO_S3_ACCESS_KEY not set"))?,
            secret_access_key: std::env::var("CONTABO_S3_SECRET_KEY")
                .map_err(|_| StorageError::config_error("CONTABO_S3_SECRET_KEY not set"))?,
            bucket_name: std::env::var("CONTABO_S3_BUCKET")
                .map_err(|_| StorageError::config_error("CONTABO_S3_BUCKET not set"))?,
            region: std::env::var("CONTABO_S3_REGION").unwrap_or_else(|_| "default".to_string()),
            prefix: std::env::var("CONTABO_S3_PREFIX").unwrap_or_else(|_| "uploads".to_string()),
            public_url: std::env::var("CONTABO_S3_PUBLIC_URL").ok(),
        })
    }

    fn object_key(&self, file_name: &str) -> String {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", prefix, file_name)
        }
    }

    fn public_link(&self, key: &str) -> String {
        let base = match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("{}/{}", self.endpoint_url.trim_end_matches('/'), self.bucket_name),
        };
        format!("{}/{}", base, key)
    }
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("mp4") => "video/mp4",
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[derive(Clone)]
pub struct S3Uploader {
    client: Client,
    config: S3Config,
}

impl S3Uploader {
    pub fn new(config: S3Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "contabo",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            config,
        }
    }

    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(S3Config::from_env()?))
    }
}

#[async_trait]
impl Uploader for S3Uploader {
    fn name(&self) -> &str {
        "s3"
    }

    async fn upload(&self, path: &Path) -> StorageResult<String> {
        let key = self.config.object_key(&file_name(path)?);
        debug!("Uploading {} to {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.config.bucket_name)
            .key(&key)
            .body(body)
            .content_type(content_type(path))
            .acl(aws_sdk_s3::types::ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| StorageError::AwsSdk(e.to_string()))?;

        info!("Uploaded {} to {}", path.display(), key);
        Ok(self.config.public_link(&key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> S3Config {
        S3Config {
            endpoint_url: "https://eu2.contabostorage.com/".to_string(),
            access_key_id: "a".to_string(),
            secret_access_key: "b".to_string(),
            bucket_name: "reels".to_string(),
            region: "default".to_string(),
            prefix: "/uploads/".to_string(),
            public_url: None,
        }
    }

    #[test]
    fn test_public_link_is_path_style() {
        let config = config();
        let key = config.object_key("video.mp4");
        assert_eq!(key, "uploads/video.mp4");
        assert_eq!(
            config.public_link(&key),
            "https://eu2.contabostorage.com/reels/uploads/video.mp4"
        );
    }

    #[test]
    fn test_public_url_override() {
        let config = S3Config {
            public_url: Some("https://cdn.example.com/".to_string()),
            prefix: String::new(),
            ..config()
        };
        assert_eq!(config.public_link(&config.object_key("a.wav")), "https://cdn.example.com/a.wav");
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type(Path::new("x.MP4")), "video/mp4");
        assert_eq!(content_type(Path::new("x.bin")), "application/octet-stream");
    }
}

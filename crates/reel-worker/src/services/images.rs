//! Image generation providers.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::retry::{retry_async, RetryConfig};

/// Turns a text prompt into an image file.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str, width: u32, height: u32, output: &Path) -> WorkerResult<()>;
}

fn http_client(timeout: Duration) -> WorkerResult<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

async fn write_image(output: &Path, bytes: &[u8], provider: &str) -> WorkerResult<()> {
    if bytes.is_empty() {
        return Err(WorkerError::image_failed(format!("{} returned an empty image", provider)));
    }
    tokio::fs::write(output, bytes).await?;
    Ok(())
}

/// Pollinations: `GET {base}/prompt/{prompt}?width=..&height=..`, answered
/// with the image bytes.
#[derive(Debug, Clone)]
pub struct PollinationsProvider {
    http: reqwest::Client,
    base_url: String,
    model: Option<String>,
}

impl PollinationsProvider {
    pub const DEFAULT_URL: &'static str = "https://image.pollinations.ai";

    pub fn new(base_url: impl Into<String>) -> WorkerResult<Self> {
        Ok(Self {
            http: http_client(Duration::from_secs(180))?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: None,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    fn url(&self, prompt: &str, width: u32, height: u32) -> String {
        let mut url = format!(
            "{}/prompt/{}?width={}&height={}&nologo=true&seed={}",
            self.base_url,
            urlencoding::encode(prompt),
            width,
            height,
            rand::random::<u32>()
        );
        if let Some(model) = &self.model {
            url.push_str("&model=");
            url.push_str(&urlencoding::encode(model));
        }
        url
    }
}

#[async_trait]
impl ImageProvider for PollinationsProvider {
    fn name(&self) -> &str {
        "pollinations"
    }

    async fn generate(&self, prompt: &str, width: u32, height: u32, output: &Path) -> WorkerResult<()> {
        let response = self.http.get(self.url(prompt, width, height)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(WorkerError::image_failed(format!("pollinations returned {}", status)));
        }

        let is_image = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map_or(true, |ct| ct.starts_with("image/"));
        if !is_image {
            return Err(WorkerError::image_failed("pollinations did not return an image"));
        }

        write_image(output, &response.bytes().await?, self.name()).await
    }
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    data: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// OpenAI-compatible `images/generations` endpoint.
#[derive(Debug, Clone)]
pub struct HttpImageProvider {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpImageProvider {
    pub fn new(url: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> WorkerResult<Self> {
        Ok(Self {
            http: http_client(Duration::from_secs(180))?,
            url: url.into(),
            api_key,
            model: model.into(),
        })
    }
}

#[async_trait]
impl ImageProvider for HttpImageProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn generate(&self, prompt: &str, width: u32, height: u32, output: &Path) -> WorkerResult<()> {
        let mut request = self.http.post(&self.url).json(&json!({
            "model": self.model,
            "prompt": prompt,
            "width": width,
            "height": height,
            "response_format": "b64_json",
            "response_extension": "png",
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::image_failed(format!("image API returned {}: {}", status, body)));
        }

        let generated: GenerationResponse = response
            .json()
            .await
            .map_err(|e| WorkerError::image_failed(format!("unreadable image API response: {}", e)))?;
        let Some(image) = generated.data.into_iter().next() else {
            return Err(WorkerError::image_failed("image API returned no images"));
        };

        let bytes = match (image.b64_json, image.url) {
            (Some(encoded), _) => STANDARD
                .decode(encoded.trim())
                .map_err(|e| WorkerError::image_failed(format!("invalid base64 image: {}", e)))?,
            (None, Some(url)) => {
                let response = self.http.get(&url).send().await?.error_for_status()?;
                response.bytes().await?.to_vec()
            }
            (None, None) => return Err(WorkerError::image_failed("image API returned neither data nor url")),
        };

        write_image(output, &bytes, self.name()).await
    }
}

/// Tries each provider in order, retrying each a few times.
#[derive(Clone, Default)]
pub struct ImageChain {
    providers: Vec<Arc<dyn ImageProvider>>,
    retry: RetryConfig,
}

impl ImageChain {
    pub fn new(providers: Vec<Arc<dyn ImageProvider>>) -> Self {
        Self {
            providers,
            retry: RetryConfig::new("image_generation")
                .with_max_retries(2)
                .with_base_delay(Duration::from_secs(5))
                .with_max_delay(Duration::from_secs(5)),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Build the chain named by `IMAGE_PROVIDERS`.
    pub fn from_config(config: &WorkerConfig) -> WorkerResult<Self> {
        let mut providers: Vec<Arc<dyn ImageProvider>> = Vec::new();
        for name in &config.image_providers {
            match name.as_str() {
                "pollinations" => {
                    let base = std::env::var("POLLINATIONS_URL")
                        .unwrap_or_else(|_| PollinationsProvider::DEFAULT_URL.to_string());
                    providers.push(Arc::new(PollinationsProvider::new(base)?));
                }
                "http" | "openai" | "nebius" => {
                    let url = config
                        .image_api_url
                        .clone()
                        .ok_or_else(|| WorkerError::config_error("IMAGE_API_URL is required for the http image provider"))?;
                    providers.push(Arc::new(HttpImageProvider::new(
                        url,
                        config.image_api_key.clone(),
                        config.image_model.clone(),
                    )?));
                }
                other => return Err(WorkerError::config_error(format!("unknown image provider '{}'", other))),
            }
        }
        Ok(Self::new(providers))
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }
}

impl std::fmt::Debug for ImageChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageChain")
            .field("providers", &self.provider_names())
            .finish()
    }
}

#[async_trait]
impl ImageProvider for ImageChain {
    fn name(&self) -> &str {
        "chain"
    }

    async fn generate(&self, prompt: &str, width: u32, height: u32, output: &Path) -> WorkerResult<()> {
        let mut errors = Vec::with_capacity(self.providers.len());

        for provider in &self.providers {
            let result = retry_async(&self.retry, WorkerError::is_retryable, || {
                provider.generate(prompt, width, height, output)
            })
            .await
            .into_result();

            match result {
                Ok(()) => {
                    info!(provider = provider.name(), width, height, "Image generated");
                    return Ok(());
                }
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "Image provider failed, trying next");
                    errors.push(format!("{}: {}", provider.name(), e));
                }
            }
        }

        if errors.is_empty() {
            return Err(WorkerError::config_error("no image providers configured"));
        }
        Err(WorkerError::image_failed(errors.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pollinations_url_encodes_prompt() {
        let provider = PollinationsProvider::new("https://img.example/").unwrap();
        let url = provider.url("misty forest, dawn", 1080, 1920);
        assert!(url.starts_with("https://img.example/prompt/misty%20forest%2C%20dawn?width=1080&height=1920&nologo=true"));
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let config = WorkerConfig {
            image_providers: vec!["dalle9".to_string()],
            ..Default::default()
        };
        assert!(matches!(ImageChain::from_config(&config), Err(WorkerError::ConfigError(_))));
    }

    #[test]
    fn test_http_provider_needs_url() {
        let config = WorkerConfig {
            image_providers: vec!["http".to_string()],
            image_api_url: None,
            ..Default::default()
        };
        assert!(ImageChain::from_config(&config).is_err());
    }
}

//! File server HTTP client.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{multipart, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use url::Url;

use reel_models::{
    CounterKind, DirListing, Heartbeat, Job, JobId, JobStatus, QueueStats, QueueType, RawJob, WorkerRecord,
    WorkerStat,
};

use crate::error::{ClientError, ClientResult};
use crate::types::{
    ClaimRequest, ClaimResponse, CompleteRequest, CompleteResponse, CounterResponse, EnqueueResponse,
    FailRequest, FailResponse, HealthResponse, JobListResponse, UploadResponse, WorkerListResponse,
};

const API_KEY_HEADER: &str = "x-api-key";

/// Configuration for the file server client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the file server
    pub base_url: String,
    /// Shared API key sent as `x-api-key`
    pub api_key: String,
    /// Timeout of JSON requests
    pub timeout: Duration,
    /// Timeout of file downloads
    pub download_timeout: Duration,
    /// Timeout of file uploads
    pub upload_timeout: Duration,
    /// Max retries of idempotent requests
    pub max_retries: u32,
    /// Delay before the first retry, doubled on each further one
    pub retry_base_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            api_key: String::new(),
            timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(300),
            upload_timeout: Duration::from_secs(600),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("FILE_SERVER_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            api_key: std::env::var("FILE_SERVER_API_KEY").unwrap_or_default(),
            max_retries: std::env::var("CLIENT_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            ..Default::default()
        }
    }

    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            ..Default::default()
        }
    }
}

/// Percent-encode each segment of a slash-separated remote path.
fn encode_path(path: &str) -> String {
    path.trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| urlencoding::encode(s).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Map non-success statuses to typed errors.
async fn check(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().path().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED => ClientError::Unauthorized,
        StatusCode::FORBIDDEN => ClientError::Forbidden(url),
        StatusCode::NOT_FOUND => ClientError::NotFound(url),
        StatusCode::CONFLICT => ClientError::Conflict(body),
        _ => ClientError::Api {
            status: status.as_u16(),
            body,
        },
    })
}

/// Turn a 404 into `None`.
fn found<T>(result: ClientResult<T>) -> ClientResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ClientError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Client for the reel file server.
#[derive(Debug, Clone)]
pub struct FileServerClient {
    http: Client,
    base_url: String,
    config: ClientConfig,
}

impl FileServerClient {
    /// Create a new client.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let parsed = Url::parse(&config.base_url)
            .map_err(|e| ClientError::invalid_config(format!("base url '{}': {}", config.base_url, e)))?;
        if config.api_key.is_empty() {
            return Err(ClientError::invalid_config("FILE_SERVER_API_KEY is not set"));
        }

        let http = Client::builder().build().map_err(ClientError::Network)?;
        let base_url = parsed.as_str().trim_end_matches('/').to_string();

        Ok(Self {
            http,
            base_url,
            config,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> ClientResult<Self> {
        Self::new(ClientConfig::from_env())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header(API_KEY_HEADER, &self.config.api_key)
            .timeout(self.config.timeout)
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ClientResult<T> {
        let response = check(builder.send().await?).await?;
        Ok(response.json().await?)
    }

    /// Check if the file server is reachable.
    pub async fn health_check(&self) -> ClientResult<bool> {
        match self.http.get(self.url("health")).timeout(self.config.timeout).send().await {
            Ok(response) if response.status().is_success() => {
                let health: HealthResponse = response.json().await?;
                Ok(health.status == "healthy" || health.status == "ok")
            }
            Ok(response) => {
                warn!("File server health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("File server health check error: {}", e);
                Ok(false)
            }
        }
    }

    // ------------------------------------------------------------------
    // Queue
    // ------------------------------------------------------------------

    /// Enqueue a job. The id is chosen here so a retried request cannot
    /// create the job twice.
    pub async fn enqueue<P: Serialize>(
        &self,
        queue_type: QueueType,
        payload: &P,
        priority: i64,
    ) -> ClientResult<JobId> {
        let mut doc = match serde_json::to_value(payload)? {
            Value::Object(map) => map,
            other => {
                return Err(ClientError::invalid_config(format!(
                    "job payload must be a JSON object, got {}",
                    other
                )))
            }
        };
        let job_id = JobId::new();
        doc.insert("job_id".into(), Value::String(job_id.to_string()));
        doc.insert("priority".into(), Value::from(priority));

        let path = format!("queue/{}/jobs", queue_type);
        let result = self
            .with_retry(|| async {
                self.send_json::<EnqueueResponse>(self.request(reqwest::Method::POST, &path).json(&doc))
                    .await
            })
            .await;

        match result {
            Ok(response) => {
                debug!(queue = %queue_type, job_id = %response.job_id, "Enqueued job");
                Ok(JobId::from_string(response.job_id))
            }
            // A retry after a lost response finds the job already there.
            Err(ClientError::Conflict(_)) => Ok(job_id),
            Err(e) => Err(e),
        }
    }

    /// Claim the next job. Not retried: a lost response would otherwise
    /// leave a second job parked under this worker.
    pub async fn claim<P: DeserializeOwned>(
        &self,
        queue_type: QueueType,
        worker_id: &str,
    ) -> ClientResult<Option<Job<P>>> {
        let path = format!("queue/{}/claim", queue_type);
        let response: ClaimResponse = self
            .send_json(
                self.request(reqwest::Method::POST, &path)
                    .json(&ClaimRequest { worker_id }),
            )
            .await?;

        match response.job {
            None | Some(Value::Null) => Ok(None),
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
        }
    }

    /// Report success. `None` means the job is no longer held by this worker.
    ///
    /// A 404 on a retried attempt is ambiguous: an earlier attempt may have
    /// committed before its response was lost. The job is looked up and
    /// counted as ours if it was completed under `worker_id`.
    pub async fn complete(
        &self,
        queue_type: QueueType,
        job_id: &JobId,
        worker_id: &str,
        result: Map<String, Value>,
    ) -> ClientResult<Option<CompleteResponse>> {
        let path = format!("queue/{}/jobs/{}/complete", queue_type, encode_path(job_id.as_str()));
        let body = CompleteRequest { worker_id, result };
        let (result, attempts) = self
            .with_retry_attempts(|| async {
                self.send_json(self.request(reqwest::Method::POST, &path).json(&body))
                    .await
            })
            .await;

        match result {
            Err(ClientError::NotFound(_)) if attempts > 1 => {
                let job = self.get_job(queue_type, job_id).await?;
                match job {
                    Some(job) if job.status == JobStatus::Completed && job.worker_id.as_deref() == Some(worker_id) => {
                        info!(job_id = %job_id, "Completion committed by an earlier attempt");
                        Ok(Some(CompleteResponse {
                            success: true,
                            status: job.status,
                        }))
                    }
                    _ => Ok(None),
                }
            }
            other => found(other),
        }
    }

    /// Report failure. `None` means the job is no longer held by this worker.
    ///
    /// As with [`complete`](Self::complete), a 404 after a retry is checked
    /// against the stored job: if it carries this error message the earlier
    /// attempt is taken to have committed.
    pub async fn fail(
        &self,
        queue_type: QueueType,
        job_id: &JobId,
        worker_id: &str,
        error_message: &str,
    ) -> ClientResult<Option<FailResponse>> {
        let path = format!("queue/{}/jobs/{}/fail", queue_type, encode_path(job_id.as_str()));
        let body = FailRequest {
            worker_id,
            error_message,
        };
        let (result, attempts) = self
            .with_retry_attempts(|| async {
                self.send_json(self.request(reqwest::Method::POST, &path).json(&body))
                    .await
            })
            .await;

        match result {
            Err(ClientError::NotFound(_)) if attempts > 1 => {
                let job = self.get_job(queue_type, job_id).await?;
                match job {
                    Some(job) if job.last_failed_at.is_some() && job.error_message.as_deref() == Some(error_message) => {
                        info!(job_id = %job_id, "Failure committed by an earlier attempt");
                        let status = if job.status == JobStatus::Failed {
                            JobStatus::Failed
                        } else {
                            JobStatus::Pending
                        };
                        Ok(Some(FailResponse {
                            success: true,
                            status,
                            retry_count: job.retry_count,
                        }))
                    }
                    _ => Ok(None),
                }
            }
            other => found(other),
        }
    }

    /// Fetch one job from any state.
    pub async fn get_job(&self, queue_type: QueueType, job_id: &JobId) -> ClientResult<Option<RawJob>> {
        let path = format!("queue/{}/jobs/{}", queue_type, encode_path(job_id.as_str()));
        found(
            self.with_retry(|| async { self.send_json(self.request(reqwest::Method::GET, &path)).await })
                .await,
        )
    }

    pub async fn stats(&self, queue_type: QueueType) -> ClientResult<QueueStats> {
        let path = format!("queue/{}/stats", queue_type);
        self.with_retry(|| async { self.send_json(self.request(reqwest::Method::GET, &path)).await })
            .await
    }

    pub async fn list_jobs(&self, queue_type: QueueType, status: JobStatus) -> ClientResult<Vec<RawJob>> {
        let path = format!("queue/{}/jobs", queue_type);
        let response: JobListResponse = self
            .with_retry(|| async {
                self.send_json(
                    self.request(reqwest::Method::GET, &path)
                        .query(&[("status", status.as_str())]),
                )
                .await
            })
            .await?;

        response
            .jobs
            .into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(ClientError::from))
            .collect()
    }

    // ------------------------------------------------------------------
    // Workers and counters
    // ------------------------------------------------------------------

    pub async fn heartbeat(&self, queue_type: QueueType, beat: &Heartbeat) -> ClientResult<()> {
        let path = format!("workers/{}/heartbeat", queue_type);
        self.with_retry(|| async {
            self.send_json::<Value>(self.request(reqwest::Method::POST, &path).json(beat))
                .await
        })
        .await?;
        Ok(())
    }

    /// Bump a worker stat. `None` if the server has no record of the worker.
    pub async fn increment_stat(
        &self,
        queue_type: QueueType,
        worker_id: &str,
        stat: WorkerStat,
    ) -> ClientResult<Option<u64>> {
        let path = format!("workers/{}/{}/increment", queue_type, encode_path(worker_id));
        let response: Option<Value> = found(
            self.send_json(
                self.request(reqwest::Method::POST, &path)
                    .query(&[("stat", stat.as_str())]),
            )
            .await,
        )?;

        match response {
            Some(body) => body
                .get(stat.as_str())
                .and_then(Value::as_u64)
                .map(Some)
                .ok_or_else(|| ClientError::invalid_response(format!("missing '{}' in response", stat))),
            None => Ok(None),
        }
    }

    pub async fn list_workers(&self, queue_type: QueueType) -> ClientResult<Vec<WorkerRecord>> {
        let path = format!("workers/{}", queue_type);
        let response: WorkerListResponse = self
            .with_retry(|| async { self.send_json(self.request(reqwest::Method::GET, &path)).await })
            .await?;
        Ok(response.workers)
    }

    /// Increment a shared counter. Not retried, since a repeat would skip a number.
    pub async fn increment_counter(&self, kind: CounterKind) -> ClientResult<u64> {
        let path = format!("counter/increment/{}", kind);
        let response: CounterResponse = self
            .send_json(self.request(reqwest::Method::POST, &path))
            .await?;
        Ok(response.value)
    }

    // ------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------

    /// Stream a remote file to `dest`. Returns the number of bytes written.
    pub async fn download_file(&self, remote_path: &str, dest: &Path) -> ClientResult<u64> {
        let path = format!("files/{}", encode_path(remote_path));
        let response = check(
            self.request(reqwest::Method::GET, &path)
                .timeout(self.config.download_timeout)
                .send()
                .await?,
        )
        .await?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!("Downloaded {} ({} bytes) to {}", remote_path, written, dest.display());
        Ok(written)
    }

    /// Fetch a small remote text file. `None` if it does not exist.
    pub async fn fetch_text(&self, remote_path: &str) -> ClientResult<Option<String>> {
        let path = format!("files/{}", encode_path(remote_path));
        found(
            self.with_retry(|| async {
                let response = check(self.request(reqwest::Method::GET, &path).send().await?).await?;
                Ok::<_, ClientError>(response.text().await?)
            })
            .await,
        )
    }

    /// Upload `local` to `remote_path` as multipart field `file`.
    pub async fn upload_file(&self, local: &Path, remote_path: &str) -> ClientResult<UploadResponse> {
        let file = tokio::fs::File::open(local).await?;
        let size = file.metadata().await?.len();
        let filename = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());

        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let part = multipart::Part::stream_with_length(body, size).file_name(filename);
        let form = multipart::Form::new().part("file", part);

        let path = format!("files/{}", encode_path(remote_path));
        let response: UploadResponse = self
            .send_json(
                self.request(reqwest::Method::POST, &path)
                    .timeout(self.config.upload_timeout)
                    .multipart(form),
            )
            .await?;

        info!("Uploaded {} ({} bytes) to {}", local.display(), size, response.path);
        Ok(response)
    }

    /// List a remote directory. `None` if it does not exist.
    pub async fn list_dir(&self, remote_path: &str) -> ClientResult<Option<DirListing>> {
        let encoded = encode_path(remote_path);
        let path = if encoded.is_empty() {
            "list".to_string()
        } else {
            format!("list/{}", encoded)
        };
        found(
            self.with_retry(|| async { self.send_json(self.request(reqwest::Method::GET, &path)).await })
                .await,
        )
    }

    /// Delete a remote file or directory tree.
    pub async fn delete_file(&self, remote_path: &str) -> ClientResult<()> {
        let path = format!("files/{}", encode_path(remote_path));
        self.with_retry(|| async {
            self.send_json::<Value>(self.request(reqwest::Method::DELETE, &path))
                .await
        })
        .await?;
        Ok(())
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> ClientResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = ClientResult<T>>,
    {
        self.with_retry_attempts(operation).await.0
    }

    /// Retry transient failures. Also returns how many attempts were sent.
    async fn with_retry_attempts<F, Fut, T>(&self, operation: F) -> (ClientResult<T>, u32)
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = ClientResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return (Ok(result), attempt + 1),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.config.retry_base_delay * 2u32.pow(attempt);
                    warn!(
                        "File server request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return (Err(e), attempt + 1),
            }
        }
    }
}

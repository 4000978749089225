//! The unit of work a worker runs for one claimed job.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tempfile::TempDir;

use reel_media::{Encoder, FfmpegRunner};
use reel_models::{JobId, QueueType, RawJob};
use reel_storage::Uploader;

use crate::backend::QueueBackend;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::services::{escape_html, ImageProvider, Transcriber, TtsEngine};

/// Everything a pipeline needs while running one job.
///
/// The temp dir is deleted when the context is dropped, whatever the outcome.
#[derive(Debug)]
pub struct JobContext {
    pub job: RawJob,
    pub worker_id: String,
    pub logger: JobLogger,
    work_dir: TempDir,
}

impl JobContext {
    /// Create a context with a fresh temp dir under `parent`.
    pub fn new(
        job: RawJob,
        queue: QueueType,
        worker_id: &str,
        operation: &str,
        parent: &Path,
    ) -> WorkerResult<Self> {
        std::fs::create_dir_all(parent)?;
        let work_dir = tempfile::Builder::new()
            .prefix(&format!("{}-", job.job_id))
            .tempdir_in(parent)?;
        Ok(Self {
            logger: JobLogger::for_job(&job, queue, worker_id, operation),
            worker_id: worker_id.to_string(),
            job,
            work_dir,
        })
    }

    pub fn job_id(&self) -> &JobId {
        &self.job.job_id
    }

    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }

    /// Decode the job payload.
    pub fn payload<P: DeserializeOwned>(&self) -> WorkerResult<P> {
        serde_json::from_value(Value::Object(self.job.payload.clone()))
            .map_err(|e| WorkerError::invalid_payload(e.to_string()))
    }

    /// Payload string field, if present.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.job.payload.get(key).and_then(Value::as_str)
    }
}

/// A job to enqueue once the current one succeeds.
#[derive(Debug, Clone, PartialEq)]
pub struct FollowUp {
    pub queue_type: QueueType,
    pub payload: Map<String, Value>,
    pub priority: i64,
}

impl FollowUp {
    pub fn new<P: Serialize>(queue_type: QueueType, payload: &P, priority: i64) -> WorkerResult<Self> {
        match serde_json::to_value(payload)? {
            Value::Object(payload) => Ok(Self {
                queue_type,
                payload,
                priority,
            }),
            other => Err(WorkerError::invalid_payload(format!("follow-up payload is not an object: {}", other))),
        }
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, Default)]
pub struct PipelineOutcome {
    /// Fields merged into the completed job (e.g. `gofile_link`)
    pub result: Map<String, Value>,
    pub follow_ups: Vec<FollowUp>,
    pub notification: Option<String>,
}

impl PipelineOutcome {
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.result.insert(key.to_string(), value.into());
        self
    }

    /// Set the field only when there is a value.
    pub fn with_optional(self, key: &str, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(v) => self.with_field(key, v),
            None => self,
        }
    }

    pub fn with_follow_up(mut self, follow_up: FollowUp) -> Self {
        self.follow_ups.push(follow_up);
        self
    }

    pub fn with_notification(mut self, message: impl Into<String>) -> Self {
        self.notification = Some(message.into());
        self
    }
}

/// Encoder settings shared by renders.
#[derive(Debug, Clone)]
pub struct MediaSettings {
    pub runner: FfmpegRunner,
    pub encoder: Encoder,
}

/// Services shared by the pipelines.
#[derive(Clone)]
pub struct PipelineDeps {
    pub backend: Arc<dyn QueueBackend>,
    pub tts: Arc<dyn TtsEngine>,
    pub transcriber: Arc<dyn Transcriber>,
    pub images: Arc<dyn ImageProvider>,
    pub uploader: Arc<dyn Uploader>,
    pub media: MediaSettings,
    pub http: reqwest::Client,
}

impl std::fmt::Debug for PipelineDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineDeps")
            .field("backend", &self.backend.name())
            .field("images", &self.images.name())
            .field("uploader", &self.uploader.name())
            .field("media", &self.media)
            .finish()
    }
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Queue the jobs are claimed from.
    fn queue_type(&self) -> QueueType;

    /// Short name used in logs.
    fn operation(&self) -> &'static str;

    /// Title used in notifications.
    fn title(&self) -> &'static str;

    async fn run(&self, ctx: &JobContext) -> WorkerResult<PipelineOutcome>;

    /// Message sent when a job fails.
    fn failure_message(&self, job: &RawJob, error: &WorkerError) -> String {
        let field = |key: &str| match job.payload.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => "?".to_string(),
        };
        format!(
            "❌ <b>{} Failed</b>\nChannel: {}\nVideo: {}\nError: {}",
            self.title(),
            escape_html(&field("channel_code")),
            escape_html(&field("video_number")),
            escape_html(&error.to_string())
        )
    }
}

//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reel_models::QueueType;

use crate::error::{WorkerError, WorkerResult};

/// Which pipeline a worker process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    Audio,
    Video,
    /// Audio and video in one job, claimed from the audio queue
    Unified,
    Shorts,
}

impl WorkerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerKind::Audio => "audio",
            WorkerKind::Video => "video",
            WorkerKind::Unified => "unified",
            WorkerKind::Shorts => "shorts",
        }
    }

    /// Queue this kind of worker claims from.
    pub fn queue_type(&self) -> QueueType {
        match self {
            WorkerKind::Audio | WorkerKind::Unified => QueueType::Audio,
            WorkerKind::Video => QueueType::Video,
            WorkerKind::Shorts => QueueType::Shorts,
        }
    }
}

impl FromStr for WorkerKind {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "audio" => Ok(WorkerKind::Audio),
            "video" => Ok(WorkerKind::Video),
            "unified" => Ok(WorkerKind::Unified),
            "shorts" => Ok(WorkerKind::Shorts),
            other => Err(WorkerError::config_error(format!("unknown worker kind '{}'", other))),
        }
    }
}

/// Where the worker reaches the job store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    /// Through the file server's HTTP API
    Remote,
    /// Directly on the local data directory
    Local,
}

impl FromStr for BackendMode {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "remote" | "http" => Ok(BackendMode::Remote),
            "local" | "fs" => Ok(BackendMode::Local),
            other => Err(WorkerError::config_error(format!("unknown queue backend '{}'", other))),
        }
    }
}

fn env_list(name: &str) -> Option<Vec<String>> {
    std::env::var(name).ok().map(|v| {
        v.split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub kind: WorkerKind,
    /// Identity used for claims and heartbeats
    pub worker_id: String,
    pub backend: BackendMode,
    /// Sleep between claims when the queue is empty
    pub poll_interval: Duration,
    /// Sleep after an unexpected loop error
    pub loop_error_backoff: Duration,
    /// Parent of the per-job temp directories
    pub work_dir: PathBuf,
    /// TTS service endpoint
    pub tts_url: String,
    /// Max characters per TTS request
    pub tts_chunk_size: usize,
    /// Speech-to-text executable
    pub stt_command: String,
    pub stt_model: String,
    /// Spoken language hint passed to the transcriber
    pub stt_language: Option<String>,
    /// Image providers in fallback order
    pub image_providers: Vec<String>,
    /// Endpoint and key of the generic image provider
    pub image_api_url: Option<String>,
    pub image_api_key: Option<String>,
    pub image_model: String,
    /// Library folder used for shorts when no AI image can be made
    pub shorts_image_folder: String,
    /// Kill ffmpeg runs after this long
    pub render_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            kind: WorkerKind::Audio,
            worker_id: "worker".to_string(),
            backend: BackendMode::Remote,
            poll_interval: Duration::from_secs(30),
            loop_error_backoff: Duration::from_secs(10),
            work_dir: std::env::temp_dir().join("reel-worker"),
            tts_url: "http://localhost:7860/tts".to_string(),
            tts_chunk_size: 500,
            stt_command: "whisper".to_string(),
            stt_model: "base".to_string(),
            stt_language: None,
            image_providers: vec!["pollinations".to_string()],
            image_api_url: None,
            image_api_key: None,
            image_model: "black-forest-labs/flux-dev".to_string(),
            shorts_image_folder: "shorts".to_string(),
            render_timeout: Duration::from_secs(3600),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        let defaults = Self::default();

        let kind: WorkerKind = match std::env::var("WORKER_KIND") {
            Ok(v) => v.parse()?,
            Err(_) => defaults.kind,
        };
        let backend: BackendMode = match std::env::var("QUEUE_BACKEND") {
            Ok(v) => v.parse()?,
            Err(_) => defaults.backend,
        };

        Ok(Self {
            kind,
            worker_id: std::env::var("WORKER_ID")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default_worker_id(kind)),
            backend,
            poll_interval: Duration::from_secs(
                std::env::var("POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            loop_error_backoff: Duration::from_secs(
                std::env::var("LOOP_ERROR_BACKOFF_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            tts_url: std::env::var("TTS_URL").unwrap_or(defaults.tts_url),
            tts_chunk_size: std::env::var("TTS_CHUNK_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.tts_chunk_size),
            stt_command: std::env::var("STT_COMMAND").unwrap_or(defaults.stt_command),
            stt_model: std::env::var("STT_MODEL").unwrap_or(defaults.stt_model),
            stt_language: std::env::var("STT_LANGUAGE").ok().filter(|v| !v.is_empty()),
            image_providers: env_list("IMAGE_PROVIDERS").unwrap_or(defaults.image_providers),
            image_api_url: std::env::var("IMAGE_API_URL").ok().filter(|v| !v.is_empty()),
            image_api_key: std::env::var("IMAGE_API_KEY").ok().filter(|v| !v.is_empty()),
            image_model: std::env::var("IMAGE_MODEL").unwrap_or(defaults.image_model),
            shorts_image_folder: std::env::var("SHORTS_IMAGE_FOLDER").unwrap_or(defaults.shorts_image_folder),
            render_timeout: Duration::from_secs(
                std::env::var("RENDER_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
        })
    }

    pub fn queue_type(&self) -> QueueType {
        self.kind.queue_type()
    }
}

/// This machine's hostname, if it can be read.
pub fn hostname() -> Option<String> {
    nix::unistd::gethostname()
        .ok()
        .and_then(|h| h.into_string().ok())
}

/// `{kind}_{hostname}_{8 hex chars}`, restricted to id-safe characters.
pub fn default_worker_id(kind: WorkerKind) -> String {
    let host: String = hostname()
        .unwrap_or_else(|| "host".to_string())
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", kind.as_str(), host, &suffix[..8])
}

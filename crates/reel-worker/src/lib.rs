//! Queue worker.
//!
//! This crate provides:
//! - Queue access through the file server or the local data directory
//! - The worker loop with heartbeats, reporting and graceful shutdown
//! - Audio, video, unified and shorts pipelines
//! - Adapters for TTS, transcription, image generation and Telegram

pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod pipelines;
pub mod retry;
pub mod runtime;
pub mod services;

pub use backend::{FailReport, LocalBackend, QueueBackend, RemoteBackend};
pub use config::{BackendMode, WorkerConfig, WorkerKind};
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use pipeline::{FollowUp, JobContext, MediaSettings, Pipeline, PipelineDeps, PipelineOutcome};
pub use runtime::{detect_gpu, RuntimeState, WorkerRuntime};

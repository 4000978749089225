//! Shared data models for the reel job pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - The job envelope and its lifecycle status
//! - Queue types and per-queue statistics
//! - Typed payloads for the audio, video and shorts pipelines
//! - Worker liveness records and sequence counters
//! - Directory listings of the file server

pub mod counter;
pub mod error;
pub mod files;
pub mod job;
pub mod payload;
pub mod queue_type;
pub mod worker;

pub use counter::CounterKind;
pub use error::{ModelError, ModelResult};
pub use files::{join_contained, DirEntry, DirListing, EntryKind};
pub use job::{is_safe_identifier, Job, JobId, JobStatus, RawJob, RESERVED_FIELDS};
pub use payload::{AudioPayload, ShortsPayload, VideoPayload, DEFAULT_IMAGE_FOLDER};
pub use queue_type::{QueueStats, QueueType};
pub use worker::{Heartbeat, WorkerRecord, WorkerStat, WorkerStatus};

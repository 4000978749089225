//! Request and response bodies of the file server API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use reel_models::{JobStatus, WorkerRecord};

pub use reel_models::{DirEntry, DirListing, EntryKind};

#[derive(Debug, Clone, Deserialize)]
pub struct EnqueueResponse {
    pub job_id: String,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClaimRequest<'a> {
    pub worker_id: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClaimResponse {
    pub job: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompleteRequest<'a> {
    pub worker_id: &'a str,
    #[serde(flatten)]
    pub result: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompleteResponse {
    pub success: bool,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailRequest<'a> {
    pub worker_id: &'a str,
    pub error_message: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FailResponse {
    pub success: bool,
    pub status: JobStatus,
    pub retry_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobListResponse {
    pub jobs: Vec<Value>,
    pub count: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerListResponse {
    pub workers: Vec<WorkerRecord>,
    pub count: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CounterResponse {
    pub counter: String,
    pub value: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub path: String,
    pub size: u64,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

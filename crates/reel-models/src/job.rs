//! Job envelope and lifecycle status.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::ModelError;

/// Envelope keys owned by the queue engine. Payloads never set these.
pub const RESERVED_FIELDS: &[&str] = &[
    "job_id",
    "status",
    "priority",
    "created_at",
    "processing_started_at",
    "completed_at",
    "last_failed_at",
    "retry_count",
    "worker_id",
    "error_message",
    "retry_after",
];

/// Maximum length of a job or worker identifier.
const MAX_IDENTIFIER_LEN: usize = 128;

/// Whether `s` can be used as a file name stem inside a queue directory.
///
/// Identifiers are embedded in file names (`{worker_id}_{job_id}.json`), so
/// path separators, leading dots and empty strings are rejected.
pub fn is_safe_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_IDENTIFIER_LEN
        && !s.starts_with('.')
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the ID is usable as a file name stem.
    pub fn is_valid(&self) -> bool {
        is_safe_identifier(&self.0)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Job status. Mirrors the directory that holds the job file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to be claimed
    #[default]
    Pending,
    /// Claimed by a worker
    Processing,
    /// Finished successfully
    Completed,
    /// Retries exhausted
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Directory name inside a queue root.
    pub fn dir_name(&self) -> &'static str {
        self.as_str()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(ModelError::InvalidStatus(other.to_string())),
        }
    }
}

fn default_created_at() -> DateTime<Utc> {
    Utc::now()
}

/// A job document: the engine-owned envelope plus an opaque payload.
///
/// The payload is flattened into the same JSON object, so a job file reads as
/// one flat document. `P` defaults to a raw JSON map; pipelines decode it into
/// their typed payload with [`Job::into_typed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job<P = Map<String, Value>> {
    pub job_id: JobId,

    #[serde(default)]
    pub status: JobStatus,

    #[serde(default)]
    pub priority: i64,

    #[serde(default = "default_created_at")]
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub retry_count: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Earliest instant the job may be claimed again after a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub payload: P,
}

/// A job with an untyped payload, as stored by the engine.
pub type RawJob = Job<Map<String, Value>>;

impl<P> Job<P> {
    /// Create a fresh pending job.
    pub fn new(job_id: JobId, priority: i64, payload: P) -> Self {
        Self {
            job_id,
            status: JobStatus::Pending,
            priority,
            created_at: Utc::now(),
            processing_started_at: None,
            completed_at: None,
            last_failed_at: None,
            retry_count: 0,
            worker_id: None,
            error_message: None,
            retry_after: None,
            payload,
        }
    }

    /// Whether the job may be claimed at `now`.
    pub fn is_claimable_at(&self, now: DateTime<Utc>) -> bool {
        self.retry_after.map_or(true, |after| after <= now)
    }

    /// Replace the payload, keeping the envelope.
    pub fn map_payload<Q>(self, f: impl FnOnce(P) -> Q) -> Job<Q> {
        Job {
            job_id: self.job_id,
            status: self.status,
            priority: self.priority,
            created_at: self.created_at,
            processing_started_at: self.processing_started_at,
            completed_at: self.completed_at,
            last_failed_at: self.last_failed_at,
            retry_count: self.retry_count,
            worker_id: self.worker_id,
            error_message: self.error_message,
            retry_after: self.retry_after,
            payload: f(self.payload),
        }
    }
}

impl<P: Serialize> Job<P> {
    /// Re-decode the whole document with a different payload type.
    pub fn into_typed<Q: DeserializeOwned>(self) -> Result<Job<Q>, serde_json::Error> {
        serde_json::from_value(serde_json::to_value(&self)?)
    }

    /// Convert into an untyped job.
    pub fn into_raw(self) -> Result<RawJob, serde_json::Error> {
        self.into_typed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_safe_identifier() {
        assert!(is_safe_identifier("550e8400-e29b-41d4-a716-446655440000"));
        assert!(is_safe_identifier("vastai_host-1_ab12cd34"));
        assert!(!is_safe_identifier(""));
        assert!(!is_safe_identifier("../etc"));
        assert!(!is_safe_identifier(".hidden"));
        assert!(!is_safe_identifier("a/b"));
        assert!(!is_safe_identifier(&"x".repeat(129)));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("completed".parse::<JobStatus>().unwrap(), JobStatus::Completed);
        assert!("done".parse::<JobStatus>().is_err());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn test_payload_flattened_into_document() {
        let mut payload = Map::new();
        payload.insert("channel_code".into(), json!("KC"));
        let job = Job::new(JobId::from("job-1"), 5, payload);

        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["job_id"], "job-1");
        assert_eq!(value["priority"], 5);
        assert_eq!(value["retry_count"], 0);
        assert_eq!(value["status"], "pending");
        assert_eq!(value["channel_code"], "KC");
        assert!(value.get("worker_id").is_none());
    }

    #[test]
    fn test_raw_job_keeps_unknown_fields() {
        let doc = json!({
            "job_id": "abc",
            "status": "processing",
            "priority": 1,
            "created_at": "2024-05-01T10:00:00Z",
            "retry_count": 2,
            "worker_id": "w1",
            "script": "hello",
            "options": {"speed": 1.0}
        });

        let job: RawJob = serde_json::from_value(doc).unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.retry_count, 2);
        assert_eq!(job.worker_id.as_deref(), Some("w1"));
        assert_eq!(job.payload["script"], "hello");
        assert!(!job.payload.contains_key("job_id"));
    }

    #[test]
    fn test_claimable_respects_retry_after() {
        let now = Utc::now();
        let mut job = Job::new(JobId::new(), 0, Map::new());
        assert!(job.is_claimable_at(now));

        job.retry_after = Some(now + chrono::Duration::seconds(30));
        assert!(!job.is_claimable_at(now));
        assert!(job.is_claimable_at(now + chrono::Duration::seconds(31)));
    }
}

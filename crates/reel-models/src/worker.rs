//! Worker liveness records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Reported worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    #[default]
    Online,
    Busy,
    Offline,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Online => "online",
            WorkerStatus::Busy => "busy",
            WorkerStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(WorkerStatus::Online),
            "busy" => Ok(WorkerStatus::Busy),
            "offline" => Ok(WorkerStatus::Offline),
            other => Err(ModelError::InvalidWorkerStatus(other.to_string())),
        }
    }
}

/// Per-worker counter that can be bumped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStat {
    JobsCompleted,
    JobsFailed,
}

impl WorkerStat {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStat::JobsCompleted => "jobs_completed",
            WorkerStat::JobsFailed => "jobs_failed",
        }
    }
}

impl fmt::Display for WorkerStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerStat {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jobs_completed" => Ok(WorkerStat::JobsCompleted),
            "jobs_failed" => Ok(WorkerStat::JobsFailed),
            other => Err(ModelError::InvalidStat(other.to_string())),
        }
    }
}

/// Stored worker record, one file per worker per queue type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub worker_id: String,
    #[serde(default)]
    pub status: WorkerStatus,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub gpu_model: Option<String>,
    #[serde(default)]
    pub current_job: Option<String>,
    #[serde(default)]
    pub jobs_completed: u64,
    #[serde(default)]
    pub jobs_failed: u64,
    pub created_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

impl WorkerRecord {
    pub fn new(worker_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            worker_id: worker_id.into(),
            status: WorkerStatus::Online,
            hostname: None,
            gpu_model: None,
            current_job: None,
            jobs_completed: 0,
            jobs_failed: 0,
            created_at: now,
            last_heartbeat: now,
        }
    }

    pub fn stat(&self, stat: WorkerStat) -> u64 {
        match stat {
            WorkerStat::JobsCompleted => self.jobs_completed,
            WorkerStat::JobsFailed => self.jobs_failed,
        }
    }

    /// Bump a stat and return its new value.
    pub fn bump(&mut self, stat: WorkerStat) -> u64 {
        let slot = match stat {
            WorkerStat::JobsCompleted => &mut self.jobs_completed,
            WorkerStat::JobsFailed => &mut self.jobs_failed,
        };
        *slot += 1;
        *slot
    }
}

/// Heartbeat sent by a worker.
///
/// `current_job` is applied as given: `None` clears the job the worker was
/// last reported on. `hostname` and `gpu_model` only overwrite when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub worker_id: String,
    #[serde(default)]
    pub status: WorkerStatus,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub gpu_model: Option<String>,
    #[serde(default)]
    pub current_job: Option<String>,
}

impl Heartbeat {
    pub fn new(worker_id: impl Into<String>, status: WorkerStatus) -> Self {
        Self {
            worker_id: worker_id.into(),
            status,
            hostname: None,
            gpu_model: None,
            current_job: None,
        }
    }

    pub fn with_current_job(mut self, job_id: impl Into<String>) -> Self {
        self.current_job = Some(job_id.into());
        self
    }

    pub fn with_host(mut self, hostname: Option<String>, gpu_model: Option<String>) -> Self {
        self.hostname = hostname;
        self.gpu_model = gpu_model;
        self
    }
}

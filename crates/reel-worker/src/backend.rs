//! Access to the job store and shared files.
//!
//! Workers either talk to the file server over HTTP ([`RemoteBackend`]) or,
//! when they run next to the data directory, use the queue engine directly
//! ([`LocalBackend`]). Pipelines and the runtime only see [`QueueBackend`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use reel_client::{ClientError, FileServerClient};
use reel_models::{
    join_contained, CounterKind, DirEntry, DirListing, EntryKind, Heartbeat, JobId, JobStatus, QueueType, RawJob,
    WorkerStat,
};
use reel_queue::{CounterStore, NewJob, QueueConfig, QueueSet, WorkerRegistry};

use crate::error::{WorkerError, WorkerResult};

/// Result of reporting a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailReport {
    /// `Pending` when the job will be retried
    pub status: JobStatus,
    pub retry_count: u32,
}

#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Human-readable backend name for logs.
    fn name(&self) -> &'static str;

    async fn claim(&self, queue_type: QueueType, worker_id: &str) -> WorkerResult<Option<RawJob>>;

    /// `false` if the job is no longer held by `worker_id`.
    async fn complete(
        &self,
        queue_type: QueueType,
        job_id: &JobId,
        worker_id: &str,
        result: Map<String, Value>,
    ) -> WorkerResult<bool>;

    /// `None` if the job is no longer held by `worker_id`.
    async fn fail(
        &self,
        queue_type: QueueType,
        job_id: &JobId,
        worker_id: &str,
        error_message: &str,
    ) -> WorkerResult<Option<FailReport>>;

    async fn enqueue(&self, queue_type: QueueType, payload: Map<String, Value>, priority: i64) -> WorkerResult<JobId>;

    async fn heartbeat(&self, queue_type: QueueType, beat: &Heartbeat) -> WorkerResult<()>;

    /// New value, or `None` for a worker without a record.
    async fn increment_stat(&self, queue_type: QueueType, worker_id: &str, stat: WorkerStat)
        -> WorkerResult<Option<u64>>;

    async fn increment_counter(&self, kind: CounterKind) -> WorkerResult<u64>;

    /// Copy a shared file to `dest`. `false` if it does not exist.
    async fn fetch_file(&self, remote_path: &str, dest: &Path) -> WorkerResult<bool>;

    async fn fetch_text(&self, remote_path: &str) -> WorkerResult<Option<String>>;

    async fn store_file(&self, local: &Path, remote_path: &str) -> WorkerResult<()>;

    async fn list_dir(&self, remote_path: &str) -> WorkerResult<Option<DirListing>>;

    async fn delete_file(&self, remote_path: &str) -> WorkerResult<()>;
}

// ----------------------------------------------------------------------
// Remote
// ----------------------------------------------------------------------

/// Backend going through the file server API.
#[derive(Debug, Clone)]
pub struct RemoteBackend {
    client: FileServerClient,
}

impl RemoteBackend {
    pub fn new(client: FileServerClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &FileServerClient {
        &self.client
    }
}

#[async_trait]
impl QueueBackend for RemoteBackend {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn claim(&self, queue_type: QueueType, worker_id: &str) -> WorkerResult<Option<RawJob>> {
        Ok(self.client.claim::<Map<String, Value>>(queue_type, worker_id).await?)
    }

    async fn complete(
        &self,
        queue_type: QueueType,
        job_id: &JobId,
        worker_id: &str,
        result: Map<String, Value>,
    ) -> WorkerResult<bool> {
        Ok(self
            .client
            .complete(queue_type, job_id, worker_id, result)
            .await?
            .is_some())
    }

    async fn fail(
        &self,
        queue_type: QueueType,
        job_id: &JobId,
        worker_id: &str,
        error_message: &str,
    ) -> WorkerResult<Option<FailReport>> {
        let response = self.client.fail(queue_type, job_id, worker_id, error_message).await?;
        Ok(response.map(|r| FailReport {
            status: r.status,
            retry_count: r.retry_count,
        }))
    }

    async fn enqueue(&self, queue_type: QueueType, payload: Map<String, Value>, priority: i64) -> WorkerResult<JobId> {
        Ok(self.client.enqueue(queue_type, &payload, priority).await?)
    }

    async fn heartbeat(&self, queue_type: QueueType, beat: &Heartbeat) -> WorkerResult<()> {
        Ok(self.client.heartbeat(queue_type, beat).await?)
    }

    async fn increment_stat(
        &self,
        queue_type: QueueType,
        worker_id: &str,
        stat: WorkerStat,
    ) -> WorkerResult<Option<u64>> {
        Ok(self.client.increment_stat(queue_type, worker_id, stat).await?)
    }

    async fn increment_counter(&self, kind: CounterKind) -> WorkerResult<u64> {
        Ok(self.client.increment_counter(kind).await?)
    }

    async fn fetch_file(&self, remote_path: &str, dest: &Path) -> WorkerResult<bool> {
        match self.client.download_file(remote_path, dest).await {
            Ok(_) => Ok(true),
            Err(ClientError::NotFound(_)) => {
                // download_file creates the file before the status is known
                let _ = tokio::fs::remove_file(dest).await;
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_text(&self, remote_path: &str) -> WorkerResult<Option<String>> {
        Ok(self.client.fetch_text(remote_path).await?)
    }

    async fn store_file(&self, local: &Path, remote_path: &str) -> WorkerResult<()> {
        self.client.upload_file(local, remote_path).await?;
        Ok(())
    }

    async fn list_dir(&self, remote_path: &str) -> WorkerResult<Option<DirListing>> {
        Ok(self.client.list_dir(remote_path).await?)
    }

    async fn delete_file(&self, remote_path: &str) -> WorkerResult<()> {
        match self.client.delete_file(remote_path).await {
            Ok(()) | Err(ClientError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ----------------------------------------------------------------------
// Local
// ----------------------------------------------------------------------

/// Backend operating on the data directory of this machine.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    queues: QueueSet,
    workers: WorkerRegistry,
    counters: CounterStore,
    root: PathBuf,
}

impl LocalBackend {
    /// Open every queue under `config.data_dir`; shared files live there too.
    pub async fn open(config: &QueueConfig) -> WorkerResult<Self> {
        let queues = QueueSet::open(config).await?;
        let root = tokio::fs::canonicalize(&config.data_dir).await?;
        Ok(Self {
            queues,
            workers: WorkerRegistry::new(&root),
            counters: CounterStore::new(&root),
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, remote_path: &str) -> WorkerResult<PathBuf> {
        join_contained(&self.root, remote_path)
            .ok_or_else(|| WorkerError::invalid_payload(format!("path escapes the data directory: {}", remote_path)))
    }
}

#[async_trait]
impl QueueBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn claim(&self, queue_type: QueueType, worker_id: &str) -> WorkerResult<Option<RawJob>> {
        Ok(self.queues.get(queue_type).claim(worker_id).await?)
    }

    async fn complete(
        &self,
        queue_type: QueueType,
        job_id: &JobId,
        worker_id: &str,
        result: Map<String, Value>,
    ) -> WorkerResult<bool> {
        Ok(self
            .queues
            .get(queue_type)
            .complete(job_id, worker_id, result)
            .await?
            .is_some())
    }

    async fn fail(
        &self,
        queue_type: QueueType,
        job_id: &JobId,
        worker_id: &str,
        error_message: &str,
    ) -> WorkerResult<Option<FailReport>> {
        let outcome = self
            .queues
            .get(queue_type)
            .fail(job_id, worker_id, error_message)
            .await?;
        Ok(outcome.map(|o| FailReport {
            status: o.status,
            retry_count: o.retry_count,
        }))
    }

    async fn enqueue(&self, queue_type: QueueType, payload: Map<String, Value>, priority: i64) -> WorkerResult<JobId> {
        let job = self
            .queues
            .get(queue_type)
            .enqueue(NewJob::new(payload).with_priority(priority))
            .await?;
        Ok(job.job_id)
    }

    async fn heartbeat(&self, queue_type: QueueType, beat: &Heartbeat) -> WorkerResult<()> {
        self.workers.heartbeat(queue_type, beat).await?;
        Ok(())
    }

    async fn increment_stat(
        &self,
        queue_type: QueueType,
        worker_id: &str,
        stat: WorkerStat,
    ) -> WorkerResult<Option<u64>> {
        let record = self.workers.increment(queue_type, worker_id, stat).await?;
        Ok(record.map(|r| r.stat(stat)))
    }

    async fn increment_counter(&self, kind: CounterKind) -> WorkerResult<u64> {
        Ok(self.counters.increment(kind).await?)
    }

    async fn fetch_file(&self, remote_path: &str, dest: &Path) -> WorkerResult<bool> {
        let source = self.resolve(remote_path)?;
        if !tokio::fs::metadata(&source).await.map(|m| m.is_file()).unwrap_or(false) {
            return Ok(false);
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = tokio::fs::copy(&source, dest).await?;
        debug!("Copied {} ({} bytes) to {}", source.display(), bytes, dest.display());
        Ok(true)
    }

    async fn fetch_text(&self, remote_path: &str) -> WorkerResult<Option<String>> {
        let source = self.resolve(remote_path)?;
        match tokio::fs::read_to_string(&source).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn store_file(&self, local: &Path, remote_path: &str) -> WorkerResult<()> {
        let target = self.resolve(remote_path)?;
        if target == self.root {
            return Err(WorkerError::invalid_payload("cannot store a file at the data root"));
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Copy next to the target, then rename so readers never see a partial file
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let staging = target.with_file_name(format!(".{}.{}.upload", file_name, uuid::Uuid::new_v4().simple()));
        if let Err(e) = tokio::fs::copy(local, &staging).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&staging, &target).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn list_dir(&self, remote_path: &str) -> WorkerResult<Option<DirListing>> {
        let dir = self.resolve(remote_path)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut items = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') && name.ends_with(".upload") {
                continue;
            }
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            let is_dir = meta.is_dir();
            items.push(DirEntry {
                name,
                kind: if is_dir { EntryKind::Directory } else { EntryKind::File },
                size: if is_dir { 0 } else { meta.len() },
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
            });
        }

        Ok(Some(DirListing::new(remote_path.trim_matches('/'), items)))
    }

    async fn delete_file(&self, remote_path: &str) -> WorkerResult<()> {
        let target = self.resolve(remote_path)?;
        if target == self.root {
            return Err(WorkerError::invalid_payload("refusing to delete the data root"));
        }
        let result = match tokio::fs::metadata(&target).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&target).await,
            Ok(_) => tokio::fs::remove_file(&target).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

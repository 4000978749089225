//! Worker liveness registry: `{data_dir}/workers/{type}/{worker_id}.json`.
//!
//! Each record has a single writer (the worker it describes, through the
//! facade), so updates are plain atomic rewrites without a claim protocol.

use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use tracing::{debug, info, warn};

use reel_models::{is_safe_identifier, Heartbeat, QueueType, WorkerRecord, WorkerStat};

use crate::error::{QueueError, QueueResult};
use crate::store::{read_json, write_json_atomic};

const WORKERS_DIR: &str = "workers";

#[derive(Debug, Clone)]
pub struct WorkerRegistry {
    root: PathBuf,
}

impl WorkerRegistry {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            root: data_dir.join(WORKERS_DIR),
        }
    }

    pub fn dir(&self, queue_type: QueueType) -> PathBuf {
        self.root.join(queue_type.as_str())
    }

    fn record_path(&self, queue_type: QueueType, worker_id: &str) -> QueueResult<PathBuf> {
        if !is_safe_identifier(worker_id) {
            return Err(QueueError::invalid_worker_id(worker_id));
        }
        Ok(self.dir(queue_type).join(format!("{}.json", worker_id)))
    }

    async fn load(&self, path: &Path) -> QueueResult<Option<WorkerRecord>> {
        match read_json(path).await {
            Ok(record) => Ok(Some(record)),
            Err(QueueError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Apply a heartbeat, creating the record on first sight.
    pub async fn heartbeat(&self, queue_type: QueueType, beat: &Heartbeat) -> QueueResult<WorkerRecord> {
        let path = self.record_path(queue_type, &beat.worker_id)?;
        fs::create_dir_all(self.dir(queue_type)).await?;

        let now = Utc::now();
        let existing = match self.load(&path).await {
            Ok(record) => record,
            Err(QueueError::Json(e)) => {
                warn!("Worker record {} is corrupt, recreating: {}", path.display(), e);
                None
            }
            Err(e) => return Err(e),
        };

        let mut record = match existing {
            Some(record) => record,
            None => {
                info!(queue = %queue_type, worker_id = %beat.worker_id, "Registered new worker");
                WorkerRecord::new(&beat.worker_id, now)
            }
        };

        record.status = beat.status;
        record.last_heartbeat = now;
        record.current_job = beat.current_job.clone();
        if let Some(hostname) = &beat.hostname {
            record.hostname = Some(hostname.clone());
        }
        if let Some(gpu) = &beat.gpu_model {
            record.gpu_model = Some(gpu.clone());
        }

        write_json_atomic(&path, &record).await?;
        debug!(
            queue = %queue_type,
            worker_id = %record.worker_id,
            status = %record.status,
            "Heartbeat recorded"
        );
        Ok(record)
    }

    /// Bump a stat. Returns `None` if the worker never sent a heartbeat.
    pub async fn increment(
        &self,
        queue_type: QueueType,
        worker_id: &str,
        stat: WorkerStat,
    ) -> QueueResult<Option<WorkerRecord>> {
        let path = self.record_path(queue_type, worker_id)?;
        let Some(mut record) = self.load(&path).await? else {
            return Ok(None);
        };

        let value = record.bump(stat);
        write_json_atomic(&path, &record).await?;
        debug!(queue = %queue_type, worker_id = %worker_id, stat = %stat, value, "Worker stat incremented");
        Ok(Some(record))
    }

    pub async fn get(&self, queue_type: QueueType, worker_id: &str) -> QueueResult<Option<WorkerRecord>> {
        let path = self.record_path(queue_type, worker_id)?;
        self.load(&path).await
    }

    /// All workers of a queue type, most recently seen first.
    pub async fn list(&self, queue_type: QueueType) -> QueueResult<Vec<WorkerRecord>> {
        let mut reader = match fs::read_dir(self.dir(queue_type)).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut workers = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let path = entry.path();
            let is_record = path.extension().and_then(|e| e.to_str()) == Some("json")
                && !path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('.'));
            if !is_record {
                continue;
            }
            match read_json::<WorkerRecord>(&path).await {
                Ok(record) => workers.push(record),
                Err(e) => warn!("Skipping worker record {}: {}", path.display(), e),
            }
        }

        workers.sort_by(|a, b| b.last_heartbeat.cmp(&a.last_heartbeat));
        Ok(workers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::WorkerStatus;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_heartbeat_creates_then_updates() {
        let dir = TempDir::new().unwrap();
        let registry = WorkerRegistry::new(dir.path());

        let beat = Heartbeat::new("gpu-1", WorkerStatus::Online)
            .with_host(Some("box-a".into()), Some("RTX 4090".into()));
        let created = registry.heartbeat(QueueType::Audio, &beat).await.unwrap();
        assert_eq!(created.jobs_completed, 0);
        assert_eq!(created.gpu_model.as_deref(), Some("RTX 4090"));

        let busy = Heartbeat::new("gpu-1", WorkerStatus::Busy).with_current_job("job-9");
        let updated = registry.heartbeat(QueueType::Audio, &busy).await.unwrap();
        assert_eq!(updated.status, WorkerStatus::Busy);
        assert_eq!(updated.current_job.as_deref(), Some("job-9"));
        assert_eq!(updated.hostname.as_deref(), Some("box-a"));
        assert_eq!(updated.created_at, created.created_at);

        let idle = Heartbeat::new("gpu-1", WorkerStatus::Online);
        let cleared = registry.heartbeat(QueueType::Audio, &idle).await.unwrap();
        assert!(cleared.current_job.is_none());
    }

    #[tokio::test]
    async fn test_increment_unknown_worker_is_none() {
        let dir = TempDir::new().unwrap();
        let registry = WorkerRegistry::new(dir.path());

        let result = registry
            .increment(QueueType::Video, "ghost", WorkerStat::JobsCompleted)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_increment_and_list() {
        let dir = TempDir::new().unwrap();
        let registry = WorkerRegistry::new(dir.path());

        registry
            .heartbeat(QueueType::Video, &Heartbeat::new("a", WorkerStatus::Online))
            .await
            .unwrap();
        registry
            .heartbeat(QueueType::Video, &Heartbeat::new("b", WorkerStatus::Online))
            .await
            .unwrap();

        let record = registry
            .increment(QueueType::Video, "a", WorkerStat::JobsFailed)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.jobs_failed, 1);

        std::fs::write(registry.dir(QueueType::Video).join("broken.json"), b"{").unwrap();

        let workers = registry.list(QueueType::Video).await.unwrap();
        assert_eq!(workers.len(), 2);
        assert_eq!(workers[0].worker_id, "b");
        assert!(registry.list(QueueType::Audio).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_path_like_worker_ids() {
        let dir = TempDir::new().unwrap();
        let registry = WorkerRegistry::new(dir.path());

        let beat = Heartbeat::new("../../etc/passwd", WorkerStatus::Online);
        assert!(matches!(
            registry.heartbeat(QueueType::Audio, &beat).await,
            Err(QueueError::InvalidWorkerId(_))
        ));
    }
}

//! On-disk layout of one queue and the filesystem primitives built on it.
//!
//! A queue root holds four directories named after [`JobStatus`]. Every job is
//! one `*.json` file; the directory it sits in is its state. All mutations are
//! either a single `rename(2)` or a write to a temp file followed by a rename,
//! so readers never observe a half-written job.

use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use reel_models::{Job, JobId, JobStatus, RawJob};

use crate::error::QueueResult;

const JOB_EXT: &str = "json";
const STAGING_EXT: &str = "resolving";

/// Outcome of a rename whose source may be taken by a concurrent caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameOutcome {
    Moved,
    /// Source was gone: another process renamed it first.
    SourceMissing,
}

/// Rename `src` to `dst`, reporting a missing source as a lost race.
pub async fn rename_if_present(src: &Path, dst: &Path) -> QueueResult<RenameOutcome> {
    match fs::rename(src, dst).await {
        Ok(()) => Ok(RenameOutcome::Moved),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(RenameOutcome::SourceMissing),
        Err(e) => Err(e.into()),
    }
}

/// Hidden temp path next to `path`, so the final rename stays on one filesystem.
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!(".{}.tmp-{}", name, Uuid::new_v4().simple()))
}

async fn write_temp(path: &Path, bytes: &[u8]) -> io::Result<PathBuf> {
    let tmp = temp_path_for(path);
    let written: io::Result<()> = async {
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await
    }
    .await;

    match written {
        Ok(()) => Ok(tmp),
        Err(e) => {
            let _ = fs::remove_file(&tmp).await;
            Err(e)
        }
    }
}

/// Serialize `value` and atomically replace `path` with it.
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> QueueResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = write_temp(path, &bytes).await?;

    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// Serialize `value` to `path` only if nothing exists there yet.
///
/// Returns `false` when `path` already exists. The no-clobber guarantee comes
/// from `link(2)`, which fails instead of replacing an existing entry.
pub async fn create_json_exclusive<T: Serialize + ?Sized>(path: &Path, value: &T) -> QueueResult<bool> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = write_temp(path, &bytes).await?;

    let linked = fs::hard_link(&tmp, path).await;
    let _ = fs::remove_file(&tmp).await;

    match linked {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Read and decode a JSON file.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> QueueResult<T> {
    let bytes = fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(ext)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map_or(true, |n| n.starts_with('.'))
}

/// Directory tree of a single queue.
#[derive(Debug, Clone)]
pub struct JobStore {
    root: PathBuf,
}

impl JobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the four state directories.
    pub async fn init(&self) -> QueueResult<()> {
        for status in JobStatus::ALL {
            fs::create_dir_all(self.dir(status)).await?;
        }
        debug!("Initialized job store at {}", self.root.display());
        Ok(())
    }

    pub fn dir(&self, status: JobStatus) -> PathBuf {
        self.root.join(status.dir_name())
    }

    /// All state directories, in lifecycle order.
    pub fn dirs(&self) -> Vec<PathBuf> {
        JobStatus::ALL.iter().map(|s| self.dir(*s)).collect()
    }

    /// `{status}/{job_id}.json`. Processing files use [`JobStore::processing_path`].
    pub fn job_path(&self, status: JobStatus, job_id: &JobId) -> PathBuf {
        self.dir(status).join(format!("{}.{}", job_id, JOB_EXT))
    }

    /// `processing/{worker_id}_{job_id}.json`.
    pub fn processing_path(&self, worker_id: &str, job_id: &JobId) -> PathBuf {
        self.dir(JobStatus::Processing)
            .join(format!("{}_{}.{}", worker_id, job_id, JOB_EXT))
    }

    /// Private name a resolver moves a job file to before rewriting it.
    ///
    /// It stays in the same directory, so the job is still accounted for in
    /// its current state while the rewrite happens.
    pub fn staging_path(path: &Path) -> PathBuf {
        path.with_extension(STAGING_EXT)
    }

    async fn entries(&self, status: JobStatus) -> QueueResult<Vec<PathBuf>> {
        let mut out = Vec::new();
        let mut reader = match fs::read_dir(self.dir(status)).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = reader.next_entry().await? {
            let path = entry.path();
            if !is_hidden(&path) {
                out.push(path);
            }
        }
        Ok(out)
    }

    /// Job files in a state directory, excluding staged and temp files.
    pub async fn job_files(&self, status: JobStatus) -> QueueResult<Vec<PathBuf>> {
        Ok(self
            .entries(status)
            .await?
            .into_iter()
            .filter(|p| has_extension(p, JOB_EXT))
            .collect())
    }

    /// Number of jobs in a state directory, including jobs mid-resolution.
    pub async fn count(&self, status: JobStatus) -> QueueResult<usize> {
        Ok(self
            .entries(status)
            .await?
            .iter()
            .filter(|p| has_extension(p, JOB_EXT) || has_extension(p, STAGING_EXT))
            .count())
    }

    /// Decode every job in a state directory.
    ///
    /// Files that cannot be read or decoded are skipped with a warning and
    /// left in place. Files that vanish between listing and reading were taken
    /// by a concurrent caller and are skipped silently.
    pub async fn load_jobs<P: DeserializeOwned>(
        &self,
        status: JobStatus,
    ) -> QueueResult<Vec<(PathBuf, Job<P>)>> {
        let mut jobs = Vec::new();

        for path in self.job_files(status).await? {
            match fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice::<Job<P>>(&bytes) {
                    Ok(job) => jobs.push((path, job)),
                    Err(e) => warn!("Skipping unreadable job file {}: {}", path.display(), e),
                },
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Skipping job file {}: {}", path.display(), e),
            }
        }

        Ok(jobs)
    }

    /// Find the file currently holding `job_id`.
    pub async fn locate(&self, job_id: &JobId) -> QueueResult<Option<(JobStatus, PathBuf)>> {
        for status in [JobStatus::Pending, JobStatus::Completed, JobStatus::Failed] {
            let path = self.job_path(status, job_id);
            if fs::try_exists(&path).await? {
                return Ok(Some((status, path)));
            }
        }

        // Processing names are `{worker}_{job}.json`; a worker id may itself
        // contain underscores, so confirm the match against the document.
        let suffix = format!("_{}.{}", job_id, JOB_EXT);
        for path in self.job_files(JobStatus::Processing).await? {
            let matches_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(&suffix));
            if !matches_name {
                continue;
            }
            match read_json::<RawJob>(&path).await {
                Ok(job) if &job.job_id == job_id => {
                    return Ok(Some((JobStatus::Processing, path)))
                }
                Ok(_) => {}
                Err(e) => debug!("Ignoring {} while locating {}: {}", path.display(), job_id, e),
            }
        }

        Ok(None)
    }

    /// Delete every job file. Returns how many were removed.
    pub async fn clear(&self) -> QueueResult<usize> {
        let mut removed = 0;
        for status in JobStatus::ALL {
            for path in self.entries(status).await? {
                if has_extension(&path, JOB_EXT) || has_extension(&path, STAGING_EXT) {
                    match fs::remove_file(&path).await {
                        Ok(()) => removed += 1,
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_rename_if_present_reports_missing_source() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.json");
        let dst = dir.path().join("b.json");

        assert_eq!(
            rename_if_present(&src, &dst).await.unwrap(),
            RenameOutcome::SourceMissing
        );

        fs::write(&src, b"{}").await.unwrap();
        assert_eq!(rename_if_present(&src, &dst).await.unwrap(), RenameOutcome::Moved);
        assert!(!src.exists());
        assert!(dst.exists());
    }

    #[tokio::test]
    async fn test_atomic_write_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("job.json");

        write_json_atomic(&path, &serde_json::json!({"a": 1})).await.unwrap();
        write_json_atomic(&path, &serde_json::json!({"a": 2})).await.unwrap();

        let value: serde_json::Value = read_json(&path).await.unwrap();
        assert_eq!(value["a"], 2);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_create_exclusive_never_clobbers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("job.json");

        assert!(create_json_exclusive(&path, &serde_json::json!({"v": 1})).await.unwrap());
        assert!(!create_json_exclusive(&path, &serde_json::json!({"v": 2})).await.unwrap());

        let value: serde_json::Value = read_json(&path).await.unwrap();
        assert_eq!(value["v"], 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_count_ignores_hidden_and_foreign_files() {
        let dir = TempDir::new().unwrap();
        let store = JobStore::new(dir.path());
        store.init().await.unwrap();

        let pending = store.dir(JobStatus::Pending);
        fs::write(pending.join("a.json"), b"{}").await.unwrap();
        fs::write(pending.join("b.resolving"), b"{}").await.unwrap();
        fs::write(pending.join(".c.json.tmp-123"), b"{}").await.unwrap();
        fs::write(pending.join("notes.txt"), b"hi").await.unwrap();

        assert_eq!(store.count(JobStatus::Pending).await.unwrap(), 2);
        assert_eq!(store.job_files(JobStatus::Pending).await.unwrap().len(), 1);
    }
}

//! Queue engine: enqueue, claim, complete, fail, and the admin operations.

use std::cmp::Ordering as CmpOrdering;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::fs;
use tracing::{debug, error, info, warn};

use reel_models::{is_safe_identifier, Job, JobId, JobStatus, QueueStats, QueueType, RawJob, RESERVED_FIELDS};

use crate::error::{QueueError, QueueResult};
use crate::store::{
    create_json_exclusive, read_json, rename_if_present, write_json_atomic, JobStore, RenameOutcome,
};

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Base directory holding every queue, the worker registry and counters
    pub data_dir: PathBuf,
    /// Failures before a job is parked in `failed/`
    pub max_retries: u32,
    /// Delay before a failed job becomes claimable again
    pub retry_delay: Duration,
    /// Skip the network filesystem check at startup
    pub allow_network_fs: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            max_retries: RetryPolicy::DEFAULT_MAX_RETRIES,
            retry_delay: Duration::ZERO,
            allow_network_fs: false,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            data_dir: std::env::var("REEL_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            max_retries: std::env::var("QUEUE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(RetryPolicy::DEFAULT_MAX_RETRIES),
            retry_delay: Duration::from_secs(
                std::env::var("QUEUE_RETRY_DELAY_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0),
            ),
            allow_network_fs: std::env::var("QUEUE_ALLOW_NETWORK_FS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
        }
    }
}

/// What happens to a job after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

/// Decision taken by [`RetryPolicy::decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Back to `pending/`, claimable from `not_before` (immediately if `None`)
    Retry { not_before: Option<DateTime<Utc>> },
    /// Terminal, into `failed/`
    Exhausted,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: Self::DEFAULT_MAX_RETRIES,
            retry_delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Decide the fate of a job whose retry count was just incremented.
    pub fn decide(&self, retry_count: u32, now: DateTime<Utc>) -> RetryDecision {
        if retry_count >= self.max_retries {
            return RetryDecision::Exhausted;
        }
        if self.retry_delay.is_zero() {
            return RetryDecision::Retry { not_before: None };
        }
        let delay = chrono::Duration::from_std(self.retry_delay).unwrap_or(chrono::Duration::MAX);
        RetryDecision::Retry {
            not_before: now.checked_add_signed(delay),
        }
    }
}

/// Result of trying to take one pending job.
#[derive(Debug)]
pub enum ClaimAttempt<P> {
    Claimed(Job<P>),
    /// Another worker renamed the file first.
    Contended,
}

/// A job to enqueue.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob<P> {
    /// Caller-chosen id; a UUID is generated when absent
    pub job_id: Option<JobId>,
    pub priority: i64,
    pub payload: P,
}

impl<P> NewJob<P> {
    pub fn new(payload: P) -> Self {
        Self {
            job_id: None,
            priority: 0,
            payload,
        }
    }

    pub fn with_id(mut self, job_id: impl Into<JobId>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }
}

impl NewJob<Map<String, Value>> {
    /// Split a producer document into envelope hints and payload.
    ///
    /// `job_id` and `priority` are honoured; every other reserved key
    /// (timestamps, status, retry count, worker) is engine-owned and dropped.
    pub fn from_document(mut doc: Map<String, Value>) -> QueueResult<Self> {
        let job_id = match doc.remove("job_id") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(JobId::from_string(s)),
            Some(other) => return Err(QueueError::invalid_job_id(other.to_string())),
        };
        let priority = match doc.remove("priority") {
            None | Some(Value::Null) => 0,
            Some(value) => value
                .as_i64()
                .ok_or_else(|| QueueError::invalid_priority(value.to_string()))?,
        };

        for key in RESERVED_FIELDS {
            doc.remove(*key);
        }

        Ok(Self {
            job_id,
            priority,
            payload: doc,
        })
    }
}

/// Outcome of a failure report.
#[derive(Debug, Clone)]
pub struct FailOutcome {
    /// `Pending` if the job will be retried, `Failed` if retries are exhausted
    pub status: JobStatus,
    pub retry_count: u32,
    pub job: RawJob,
}

/// Outcome of a manual status change.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub old_status: JobStatus,
    pub job: RawJob,
}

/// Creation timestamps strictly increase within the process, so equal
/// priority jobs are claimed in enqueue order.
fn next_created_at() -> DateTime<Utc> {
    static LAST_MICROS: AtomicI64 = AtomicI64::new(0);

    let now = Utc::now().timestamp_micros();
    let mut prev = LAST_MICROS.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST_MICROS.compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return DateTime::from_timestamp_micros(next).unwrap_or_else(Utc::now),
            Err(actual) => prev = actual,
        }
    }
}

/// Claim order: priority descending, then oldest first.
fn claim_order<A, B>(a: &Job<A>, b: &Job<B>) -> CmpOrdering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.job_id.cmp(&b.job_id))
}

fn resolved_at(job: &RawJob) -> Option<DateTime<Utc>> {
    job.completed_at.or(job.last_failed_at)
}

fn ensure_job_id(job_id: &JobId) -> QueueResult<()> {
    if job_id.is_valid() {
        Ok(())
    } else {
        Err(QueueError::invalid_job_id(job_id.as_str()))
    }
}

fn ensure_worker_id(worker_id: &str) -> QueueResult<()> {
    if is_safe_identifier(worker_id) {
        Ok(())
    } else {
        Err(QueueError::invalid_worker_id(worker_id))
    }
}

/// A file-backed job queue for one [`QueueType`].
///
/// `P` is the payload type producers enqueue and workers receive from
/// [`JobQueue::claim`]. Resolution and admin operations work on the raw
/// document so that fields unknown to `P` survive every rewrite.
pub struct JobQueue<P = Map<String, Value>> {
    queue_type: QueueType,
    store: JobStore,
    policy: RetryPolicy,
    _payload: PhantomData<fn() -> P>,
}

impl<P> Clone for JobQueue<P> {
    fn clone(&self) -> Self {
        Self {
            queue_type: self.queue_type,
            store: self.store.clone(),
            policy: self.policy,
            _payload: PhantomData,
        }
    }
}

impl<P> std::fmt::Debug for JobQueue<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("queue_type", &self.queue_type)
            .field("root", &self.store.root())
            .field("policy", &self.policy)
            .finish()
    }
}

impl<P> JobQueue<P>
where
    P: Serialize + DeserializeOwned + Send + Sync,
{
    /// Create a queue rooted at `{data_dir}/{type}-queue`. Call [`JobQueue::init`] before use.
    pub fn new(queue_type: QueueType, data_dir: &Path, policy: RetryPolicy) -> Self {
        Self {
            queue_type,
            store: JobStore::new(data_dir.join(queue_type.dir_name())),
            policy,
            _payload: PhantomData,
        }
    }

    /// Create and initialize a queue from configuration.
    pub async fn open(queue_type: QueueType, config: &QueueConfig) -> QueueResult<Self> {
        let queue = Self::new(queue_type, &config.data_dir, config.retry_policy());
        queue.init().await?;
        Ok(queue)
    }

    /// Create the state directories if missing.
    pub async fn init(&self) -> QueueResult<()> {
        self.store.init().await?;
        info!(
            "Queue '{}' ready at {} (max_retries={}, retry_delay={:?})",
            self.queue_type,
            self.store.root().display(),
            self.policy.max_retries,
            self.policy.retry_delay
        );
        Ok(())
    }

    pub fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Write a new job into `pending/`.
    ///
    /// The engine stamps `created_at`, `status` and `retry_count`. A job id
    /// that already exists anywhere in the queue is rejected.
    pub async fn enqueue(&self, new_job: NewJob<P>) -> QueueResult<Job<P>> {
        let job_id = new_job.job_id.unwrap_or_default();
        ensure_job_id(&job_id)?;

        if self.store.locate(&job_id).await?.is_some() {
            return Err(QueueError::DuplicateJob(job_id.to_string()));
        }

        let mut job = Job::new(job_id, new_job.priority, new_job.payload);
        job.created_at = next_created_at();

        let path = self.store.job_path(JobStatus::Pending, &job.job_id);
        if !create_json_exclusive(&path, &job).await? {
            return Err(QueueError::DuplicateJob(job.job_id.to_string()));
        }

        info!(
            queue = %self.queue_type,
            job_id = %job.job_id,
            priority = job.priority,
            "Enqueued job"
        );
        Ok(job)
    }

    /// Atomically take the best pending job for `worker_id`.
    ///
    /// Candidates are tried in claim order; a candidate lost to another
    /// worker is skipped. Returns `None` when nothing could be taken.
    pub async fn claim(&self, worker_id: &str) -> QueueResult<Option<Job<P>>> {
        ensure_worker_id(worker_id)?;

        let now = Utc::now();
        let mut candidates: Vec<(PathBuf, Job<P>)> = self
            .store
            .load_jobs(JobStatus::Pending)
            .await?
            .into_iter()
            .filter(|(path, job)| {
                if !job.job_id.is_valid() {
                    warn!("Skipping {}: unusable job id '{}'", path.display(), job.job_id);
                    return false;
                }
                job.is_claimable_at(now)
            })
            .collect();

        candidates.sort_by(|(_, a), (_, b)| claim_order(a, b));

        for (path, candidate) in candidates {
            match self.try_claim(&path, &candidate.job_id, worker_id).await? {
                ClaimAttempt::Claimed(job) => {
                    info!(
                        queue = %self.queue_type,
                        job_id = %job.job_id,
                        worker_id = %worker_id,
                        "Claimed job"
                    );
                    return Ok(Some(job));
                }
                ClaimAttempt::Contended => {
                    debug!(
                        queue = %self.queue_type,
                        job_id = %candidate.job_id,
                        "Lost claim race, trying next candidate"
                    );
                }
            }
        }

        Ok(None)
    }

    /// Rename one pending file into `processing/` under `worker_id`.
    pub async fn try_claim(
        &self,
        pending_file: &Path,
        job_id: &JobId,
        worker_id: &str,
    ) -> QueueResult<ClaimAttempt<P>> {
        let dest = self.store.processing_path(worker_id, job_id);

        if rename_if_present(pending_file, &dest).await? == RenameOutcome::SourceMissing {
            return Ok(ClaimAttempt::Contended);
        }

        let mut job: RawJob = read_json(&dest).await?;
        job.status = JobStatus::Processing;
        job.worker_id = Some(worker_id.to_string());
        job.processing_started_at = Some(Utc::now());
        job.retry_after = None;
        write_json_atomic(&dest, &job).await?;

        Ok(ClaimAttempt::Claimed(job.into_typed()?))
    }

    /// Mark a job held by `worker_id` as completed.
    ///
    /// `result` fields are merged into the payload; reserved keys in it are
    /// ignored. Returns `None` if the worker no longer holds the job, which
    /// callers treat as already resolved.
    pub async fn complete(
        &self,
        job_id: &JobId,
        worker_id: &str,
        result: Map<String, Value>,
    ) -> QueueResult<Option<RawJob>> {
        ensure_job_id(job_id)?;
        ensure_worker_id(worker_id)?;

        let now = Utc::now();
        let source = self.store.processing_path(worker_id, job_id);
        let resolved = self
            .resolve(&source, job_id, |job| {
                for (key, value) in result {
                    if !RESERVED_FIELDS.contains(&key.as_str()) {
                        job.payload.insert(key, value);
                    }
                }
                job.status = JobStatus::Completed;
                job.completed_at = Some(now);
                JobStatus::Completed
            })
            .await?;

        match &resolved {
            Some(_) => info!(queue = %self.queue_type, job_id = %job_id, worker_id = %worker_id, "Job completed"),
            None => warn!(
                queue = %self.queue_type,
                job_id = %job_id,
                worker_id = %worker_id,
                "Complete ignored: job not held by worker"
            ),
        }
        Ok(resolved)
    }

    /// Report a failed attempt by `worker_id`.
    ///
    /// The retry count is incremented; the job goes back to `pending/` or,
    /// once the policy is exhausted, to `failed/`. Returns `None` if the
    /// worker no longer holds the job.
    pub async fn fail(
        &self,
        job_id: &JobId,
        worker_id: &str,
        error_message: &str,
    ) -> QueueResult<Option<FailOutcome>> {
        ensure_job_id(job_id)?;
        ensure_worker_id(worker_id)?;

        let now = Utc::now();
        let policy = self.policy;
        let source = self.store.processing_path(worker_id, job_id);
        let resolved = self
            .resolve(&source, job_id, |job| {
                job.retry_count += 1;
                job.error_message = Some(error_message.to_string());
                job.last_failed_at = Some(now);

                match policy.decide(job.retry_count, now) {
                    RetryDecision::Exhausted => {
                        job.status = JobStatus::Failed;
                        JobStatus::Failed
                    }
                    RetryDecision::Retry { not_before } => {
                        job.status = JobStatus::Pending;
                        job.worker_id = None;
                        job.processing_started_at = None;
                        job.retry_after = not_before;
                        JobStatus::Pending
                    }
                }
            })
            .await?;

        let Some(job) = resolved else {
            warn!(
                queue = %self.queue_type,
                job_id = %job_id,
                worker_id = %worker_id,
                "Fail ignored: job not held by worker"
            );
            return Ok(None);
        };

        if job.status == JobStatus::Failed {
            warn!(
                queue = %self.queue_type,
                job_id = %job_id,
                retry_count = job.retry_count,
                "Job failed permanently: {}", error_message
            );
        } else {
            info!(
                queue = %self.queue_type,
                job_id = %job_id,
                retry_count = job.retry_count,
                "Job returned to pending for retry: {}", error_message
            );
        }

        Ok(Some(FailOutcome {
            status: job.status,
            retry_count: job.retry_count,
            job,
        }))
    }

    /// Move a job to another state by hand (operator recovery).
    ///
    /// Moving to `pending` resets the retry count and clears worker and error
    /// fields. Moving to `processing` is refused because a claim needs a worker.
    pub async fn set_status(&self, job_id: &JobId, new_status: JobStatus) -> QueueResult<Option<StatusChange>> {
        ensure_job_id(job_id)?;
        if new_status == JobStatus::Processing {
            return Err(QueueError::invalid_transition(
                "status must be pending, completed or failed",
            ));
        }

        let Some((current, source)) = self.store.locate(job_id).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        let resolved = self
            .resolve(&source, job_id, |job| {
                job.status = new_status;
                match new_status {
                    JobStatus::Pending => {
                        job.retry_count = 0;
                        job.error_message = None;
                        job.worker_id = None;
                        job.processing_started_at = None;
                        job.retry_after = None;
                    }
                    JobStatus::Completed => {
                        job.completed_at.get_or_insert(now);
                    }
                    JobStatus::Failed => {
                        job.last_failed_at.get_or_insert(now);
                    }
                    JobStatus::Processing => {}
                }
                job.payload
                    .insert("status_updated_at".to_string(), Value::String(now.to_rfc3339()));
                new_status
            })
            .await?;

        if resolved.is_some() {
            info!(
                queue = %self.queue_type,
                job_id = %job_id,
                from = %current,
                to = %new_status,
                "Job status changed"
            );
        }
        Ok(resolved.map(|job| StatusChange {
            old_status: current,
            job,
        }))
    }

    /// Take a job file out of circulation, rewrite it, and publish it at its
    /// destination.
    ///
    /// The first rename is the exclusion point: of several concurrent
    /// resolvers only one finds the source. The job stays in its current
    /// directory under a staging name until the final rename moves it.
    async fn resolve<F>(&self, source: &Path, job_id: &JobId, mutate: F) -> QueueResult<Option<RawJob>>
    where
        F: FnOnce(&mut RawJob) -> JobStatus,
    {
        let staging = JobStore::staging_path(source);
        if rename_if_present(source, &staging).await? == RenameOutcome::SourceMissing {
            return Ok(None);
        }

        let outcome: QueueResult<RawJob> = async {
            let mut job: RawJob = read_json(&staging).await?;
            let target = mutate(&mut job);
            write_json_atomic(&staging, &job).await?;
            fs::rename(&staging, self.store.job_path(target, job_id)).await?;
            Ok(job)
        }
        .await;

        match outcome {
            Ok(job) => Ok(Some(job)),
            Err(e) => {
                if let Err(restore) = fs::rename(&staging, source).await {
                    error!(
                        "Could not restore {} after failed resolution: {}",
                        staging.display(),
                        restore
                    );
                }
                Err(e)
            }
        }
    }

    /// Find a job in any state.
    pub async fn get(&self, job_id: &JobId) -> QueueResult<Option<RawJob>> {
        ensure_job_id(job_id)?;
        match self.store.locate(job_id).await? {
            Some((_, path)) => match read_json(&path).await {
                Ok(job) => Ok(Some(job)),
                Err(QueueError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e),
            },
            None => Ok(None),
        }
    }

    /// Jobs in one state. Resolved jobs come newest first; open jobs in claim order.
    pub async fn list(&self, status: JobStatus) -> QueueResult<Vec<RawJob>> {
        let mut jobs: Vec<RawJob> = self
            .store
            .load_jobs(status)
            .await?
            .into_iter()
            .map(|(_, job)| job)
            .collect();

        match status {
            JobStatus::Completed | JobStatus::Failed => {
                jobs.sort_by(|a, b| resolved_at(b).cmp(&resolved_at(a)));
            }
            JobStatus::Pending | JobStatus::Processing => jobs.sort_by(claim_order),
        }
        Ok(jobs)
    }

    /// Count jobs per state.
    pub async fn stats(&self) -> QueueResult<QueueStats> {
        Ok(QueueStats::new(
            self.store.count(JobStatus::Pending).await?,
            self.store.count(JobStatus::Processing).await?,
            self.store.count(JobStatus::Completed).await?,
            self.store.count(JobStatus::Failed).await?,
        ))
    }

    /// Delete every job in every state. Returns how many were removed.
    pub async fn reset(&self) -> QueueResult<usize> {
        let removed = self.store.clear().await?;
        warn!(queue = %self.queue_type, removed, "Queue reset");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn queue(dir: &TempDir) -> JobQueue {
        let queue = JobQueue::new(QueueType::Audio, dir.path(), RetryPolicy::default());
        queue.init().await.unwrap();
        queue
    }

    fn doc(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_retry_policy_decisions() {
        let now = Utc::now();
        let policy = RetryPolicy::new(3);
        assert_eq!(policy.decide(1, now), RetryDecision::Retry { not_before: None });
        assert_eq!(policy.decide(2, now), RetryDecision::Retry { not_before: None });
        assert_eq!(policy.decide(3, now), RetryDecision::Exhausted);

        let delayed = policy.with_retry_delay(Duration::from_secs(60));
        assert_eq!(
            delayed.decide(1, now),
            RetryDecision::Retry {
                not_before: Some(now + chrono::Duration::seconds(60))
            }
        );
    }

    #[test]
    fn test_created_at_strictly_increases() {
        let mut last = next_created_at();
        for _ in 0..1000 {
            let next = next_created_at();
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn test_from_document_drops_engine_fields() {
        let new_job = NewJob::from_document(doc(json!({
            "job_id": "abc",
            "priority": 4,
            "retry_count": 9,
            "status": "completed",
            "created_at": "1999-01-01T00:00:00Z",
            "worker_id": "evil",
            "script": "hi"
        })))
        .unwrap();

        assert_eq!(new_job.job_id, Some(JobId::from("abc")));
        assert_eq!(new_job.priority, 4);
        assert_eq!(new_job.payload.len(), 1);
        assert_eq!(new_job.payload["script"], "hi");
    }

    #[test]
    fn test_from_document_rejects_non_string_id() {
        let result = NewJob::from_document(doc(json!({"job_id": 42})));
        assert!(matches!(result, Err(QueueError::InvalidJobId(_))));
    }

    #[test]
    fn test_from_document_rejects_non_integer_priority() {
        for bad in [json!("5"), json!(5.5), json!(true)] {
            let result = NewJob::from_document(doc(json!({"priority": bad})));
            assert!(matches!(result, Err(QueueError::InvalidPriority(_))));
        }
        let job = NewJob::from_document(doc(json!({"priority": null}))).unwrap();
        assert_eq!(job.priority, 0);
        let job = NewJob::from_document(doc(json!({"priority": -3}))).unwrap();
        assert_eq!(job.priority, -3);
    }

    #[tokio::test]
    async fn test_enqueue_rejects_duplicates_and_bad_ids() {
        let dir = TempDir::new().unwrap();
        let queue = queue(&dir).await;

        queue
            .enqueue(NewJob::new(Map::new()).with_id("job-1"))
            .await
            .unwrap();

        let dup = queue.enqueue(NewJob::new(Map::new()).with_id("job-1")).await;
        assert!(matches!(dup, Err(QueueError::DuplicateJob(_))));

        let bad = queue.enqueue(NewJob::new(Map::new()).with_id("../escape")).await;
        assert!(matches!(bad, Err(QueueError::InvalidJobId(_))));
    }

    #[tokio::test]
    async fn test_claim_rejects_unsafe_worker_id() {
        let dir = TempDir::new().unwrap();
        let queue = queue(&dir).await;

        let result = queue.claim("../w").await;
        assert!(matches!(result, Err(QueueError::InvalidWorkerId(_))));
    }

    #[tokio::test]
    async fn test_complete_ignores_reserved_result_fields() {
        let dir = TempDir::new().unwrap();
        let queue = queue(&dir).await;

        let job = queue.enqueue(NewJob::new(Map::new())).await.unwrap();
        queue.claim("w1").await.unwrap().unwrap();

        let done = queue
            .complete(
                &job.job_id,
                "w1",
                doc(json!({"gofile_link": "https://x", "retry_count": 99, "status": "failed"})),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.retry_count, 0);
        assert_eq!(done.payload["gofile_link"], "https://x");
    }

    #[tokio::test]
    async fn test_worker_cannot_resolve_another_workers_job() {
        let dir = TempDir::new().unwrap();
        let queue = queue(&dir).await;

        let job = queue.enqueue(NewJob::new(Map::new())).await.unwrap();
        queue.claim("w1").await.unwrap().unwrap();

        assert!(queue.complete(&job.job_id, "w2", Map::new()).await.unwrap().is_none());
        assert!(queue.fail(&job.job_id, "w2", "boom").await.unwrap().is_none());
        assert_eq!(queue.stats().await.unwrap().processing, 1);
    }

    #[tokio::test]
    async fn test_retry_delay_hides_failed_job() {
        let dir = TempDir::new().unwrap();
        let policy = RetryPolicy::new(3).with_retry_delay(Duration::from_secs(3600));
        let queue: JobQueue = JobQueue::new(QueueType::Video, dir.path(), policy);
        queue.init().await.unwrap();

        let job = queue.enqueue(NewJob::new(Map::new())).await.unwrap();
        queue.claim("w1").await.unwrap().unwrap();

        let outcome = queue.fail(&job.job_id, "w1", "transient").await.unwrap().unwrap();
        assert_eq!(outcome.status, JobStatus::Pending);
        assert!(outcome.job.retry_after.is_some());

        assert!(queue.claim("w1").await.unwrap().is_none());
        assert_eq!(queue.stats().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn test_set_status_to_pending_resets_job() {
        let dir = TempDir::new().unwrap();
        let queue = queue(&dir).await;

        let job = queue.enqueue(NewJob::new(Map::new())).await.unwrap();
        queue.claim("w1").await.unwrap().unwrap();
        queue.fail(&job.job_id, "w1", "boom").await.unwrap().unwrap();
        queue.claim("w1").await.unwrap().unwrap();

        // Stuck in processing after a crash: operator sends it back.
        let change = queue
            .set_status(&job.job_id, JobStatus::Pending)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(change.old_status, JobStatus::Processing);
        let reset = change.job;

        assert_eq!(reset.status, JobStatus::Pending);
        assert_eq!(reset.retry_count, 0);
        assert!(reset.worker_id.is_none());
        assert!(reset.error_message.is_none());
        assert!(reset.processing_started_at.is_none());

        let stats = queue.stats().await.unwrap();
        assert_eq!((stats.pending, stats.processing), (1, 0));
    }

    #[tokio::test]
    async fn test_set_status_refuses_processing_and_unknown_jobs() {
        let dir = TempDir::new().unwrap();
        let queue = queue(&dir).await;

        let job = queue.enqueue(NewJob::new(Map::new())).await.unwrap();
        assert!(matches!(
            queue.set_status(&job.job_id, JobStatus::Processing).await,
            Err(QueueError::InvalidTransition(_))
        ));
        assert!(queue
            .set_status(&JobId::from("missing"), JobStatus::Failed)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_list_orders() {
        let dir = TempDir::new().unwrap();
        let queue = queue(&dir).await;

        let low = queue.enqueue(NewJob::new(Map::new()).with_id("low")).await.unwrap();
        let high = queue
            .enqueue(NewJob::new(Map::new()).with_id("high").with_priority(9))
            .await
            .unwrap();

        let pending: Vec<_> = queue
            .list(JobStatus::Pending)
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.job_id)
            .collect();
        assert_eq!(pending, vec![high.job_id.clone(), low.job_id.clone()]);

        for _ in 0..2 {
            let job = queue.claim("w1").await.unwrap().unwrap();
            queue.complete(&job.job_id, "w1", Map::new()).await.unwrap();
        }

        let completed: Vec<_> = queue
            .list(JobStatus::Completed)
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.job_id)
            .collect();
        assert_eq!(completed, vec![low.job_id, high.job_id]);
    }

    #[tokio::test]
    async fn test_reset_and_get() {
        let dir = TempDir::new().unwrap();
        let queue = queue(&dir).await;

        let job = queue.enqueue(NewJob::new(Map::new())).await.unwrap();
        assert!(queue.get(&job.job_id).await.unwrap().is_some());

        queue.enqueue(NewJob::new(Map::new())).await.unwrap();
        queue.claim("w1").await.unwrap().unwrap();

        assert_eq!(queue.reset().await.unwrap(), 2);
        assert_eq!(queue.stats().await.unwrap().total, 0);
        assert!(queue.get(&job.job_id).await.unwrap().is_none());
    }
}

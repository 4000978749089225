//! File-based job queue with rename-atomic claims.
//!
//! This crate provides:
//! - A job store of four state directories per queue
//! - Claim, complete and fail with bounded retries, safe across processes
//! - Persistent sequence counters behind a file lock
//! - A worker liveness registry

pub mod counter;
pub mod error;
pub mod fs_check;
pub mod queue;
pub mod store;
pub mod workers;

use std::collections::HashMap;
use std::sync::Arc;

use reel_models::QueueType;

pub use counter::CounterStore;
pub use error::{QueueError, QueueResult};
pub use fs_check::ensure_local_filesystem;
pub use queue::{ClaimAttempt, FailOutcome, JobQueue, NewJob, QueueConfig, RetryDecision, RetryPolicy, StatusChange};
pub use store::JobStore;
pub use workers::WorkerRegistry;

/// One raw-payload queue per [`QueueType`], opened together.
#[derive(Debug, Clone)]
pub struct QueueSet {
    queues: HashMap<QueueType, Arc<JobQueue>>,
}

impl QueueSet {
    /// Open every queue under `config.data_dir` and check the filesystem.
    pub async fn open(config: &QueueConfig) -> QueueResult<Self> {
        tokio::fs::create_dir_all(&config.data_dir).await?;

        let mut queues = HashMap::new();
        let mut dirs = Vec::new();
        for queue_type in QueueType::ALL {
            let queue = JobQueue::open(queue_type, config).await?;
            dirs.extend(queue.store().dirs());
            queues.insert(queue_type, Arc::new(queue));
        }

        ensure_local_filesystem(&config.data_dir, &dirs, config.allow_network_fs)?;
        Ok(Self { queues })
    }

    pub fn get(&self, queue_type: QueueType) -> Arc<JobQueue> {
        // Every variant is inserted by `open`.
        match self.queues.get(&queue_type) {
            Some(queue) => Arc::clone(queue),
            None => unreachable!("queue {} not opened", queue_type),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&QueueType, &Arc<JobQueue>)> {
        self.queues.iter()
    }
}

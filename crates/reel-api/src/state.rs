//! Application state.

use std::path::PathBuf;
use std::sync::Arc;

use reel_queue::{CounterStore, QueueSet, WorkerRegistry};

use crate::config::ApiConfig;
use crate::error::ApiResult;

/// Shared application state, constructed once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub queues: QueueSet,
    pub counters: Arc<CounterStore>,
    pub workers: Arc<WorkerRegistry>,
    /// Canonical root of everything served under `/files` and `/list`
    pub files_root: Arc<PathBuf>,
}

impl AppState {
    /// Open the job store and check the filesystem it lives on.
    pub async fn new(config: ApiConfig) -> ApiResult<Self> {
        let queues = QueueSet::open(&config.queue).await?;
        let data_dir = &config.queue.data_dir;
        let files_root = tokio::fs::canonicalize(data_dir).await?;

        Ok(Self {
            counters: Arc::new(CounterStore::new(data_dir)),
            workers: Arc::new(WorkerRegistry::new(data_dir)),
            files_root: Arc::new(files_root),
            queues,
            config: Arc::new(config),
        })
    }
}

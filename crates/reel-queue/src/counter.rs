//! Persistent sequence counters shared by every producer.
//!
//! One JSON file guarded by an exclusive `flock`, so increments from
//! different processes on the same host never hand out the same number.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use reel_models::CounterKind;

use crate::error::{QueueError, QueueResult};

const COUNTER_FILE: &str = "counters.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct CounterFile {
    #[serde(default)]
    audio_counter: u64,
    #[serde(default)]
    video_counter: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

impl CounterFile {
    fn slot(&mut self, kind: CounterKind) -> &mut u64 {
        match kind {
            CounterKind::Audio => &mut self.audio_counter,
            CounterKind::Video => &mut self.video_counter,
        }
    }
}

/// Named monotonically increasing counters.
#[derive(Debug, Clone)]
pub struct CounterStore {
    path: PathBuf,
}

impl CounterStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(COUNTER_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Increment a counter and return the new value.
    pub async fn increment(&self, kind: CounterKind) -> QueueResult<u64> {
        let value = self
            .with_locked(move |counters| {
                let slot = counters.slot(kind);
                *slot += 1;
                let value = *slot;
                counters.updated_at = Some(Utc::now());
                (value, true)
            })
            .await?;
        debug!(counter = %kind, value, "Counter incremented");
        Ok(value)
    }

    /// Current value without changing it.
    pub async fn get(&self, kind: CounterKind) -> QueueResult<u64> {
        self.with_locked(move |counters| (*counters.slot(kind), false))
            .await
    }

    /// Set every counter back to zero.
    pub async fn reset(&self) -> QueueResult<()> {
        self.with_locked(|counters| {
            for kind in CounterKind::ALL {
                *counters.slot(kind) = 0;
            }
            counters.updated_at = Some(Utc::now());
            ((), true)
        })
        .await?;
        warn!("Counters reset");
        Ok(())
    }

    /// Run `f` on the counter file while holding its lock. `f` returns
    /// whether the file must be rewritten.
    async fn with_locked<T, F>(&self, f: F) -> QueueResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut CounterFile) -> (T, bool) + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || locked_update(&path, f))
            .await
            .map_err(|e| QueueError::LockFailed(e.to_string()))?
    }
}

fn locked_update<T>(path: &Path, f: impl FnOnce(&mut CounterFile) -> (T, bool)) -> QueueResult<T> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    FileExt::lock_exclusive(&file).map_err(|e| QueueError::LockFailed(e.to_string()))?;

    let result = update_file(&mut file, path, f);

    if let Err(e) = FileExt::unlock(&file) {
        warn!("Failed to unlock {}: {}", path.display(), e);
    }
    result
}

fn update_file<T>(
    file: &mut File,
    path: &Path,
    f: impl FnOnce(&mut CounterFile) -> (T, bool),
) -> QueueResult<T> {
    let mut raw = String::new();
    file.read_to_string(&mut raw)?;

    let mut counters = if raw.trim().is_empty() {
        CounterFile::default()
    } else {
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!("Counter file {} is corrupt, starting from zero: {}", path.display(), e);
            CounterFile::default()
        })
    };

    let (value, dirty) = f(&mut counters);
    if dirty {
        let bytes = serde_json::to_vec_pretty(&counters)?;
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_increment_get_reset() {
        let dir = TempDir::new().unwrap();
        let counters = CounterStore::new(dir.path());

        assert_eq!(counters.get(CounterKind::Audio).await.unwrap(), 0);
        assert_eq!(counters.increment(CounterKind::Audio).await.unwrap(), 1);
        assert_eq!(counters.increment(CounterKind::Audio).await.unwrap(), 2);
        assert_eq!(counters.increment(CounterKind::Video).await.unwrap(), 1);
        assert_eq!(counters.get(CounterKind::Audio).await.unwrap(), 2);

        counters.reset().await.unwrap();
        assert_eq!(counters.get(CounterKind::Audio).await.unwrap(), 0);
        assert_eq!(counters.get(CounterKind::Video).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_from_zero() {
        let dir = TempDir::new().unwrap();
        let counters = CounterStore::new(dir.path());
        std::fs::write(counters.path(), b"{not json").unwrap();

        assert_eq!(counters.increment(CounterKind::Video).await.unwrap(), 1);

        let raw = std::fs::read_to_string(counters.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["video_counter"], 1);
    }
}

//! Queue selection and statistics.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Kind of queue. Each kind owns its own job store directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueType {
    /// Script to narration audio
    Audio,
    /// Audio + image to landscape video
    Video,
    /// Portrait short-form video
    Shorts,
}

impl QueueType {
    pub const ALL: [QueueType; 3] = [QueueType::Audio, QueueType::Video, QueueType::Shorts];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueType::Audio => "audio",
            QueueType::Video => "video",
            QueueType::Shorts => "shorts",
        }
    }

    /// Root directory name of this queue under the data dir.
    pub fn dir_name(&self) -> String {
        format!("{}-queue", self.as_str())
    }
}

impl fmt::Display for QueueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio" => Ok(QueueType::Audio),
            "video" => Ok(QueueType::Video),
            "shorts" => Ok(QueueType::Shorts),
            other => Err(ModelError::InvalidQueueType(other.to_string())),
        }
    }
}

/// Per-directory job counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

impl QueueStats {
    pub fn new(pending: usize, processing: usize, completed: usize, failed: usize) -> Self {
        Self {
            pending,
            processing,
            completed,
            failed,
            total: pending + processing + completed + failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_type_round_trip_names() {
        for queue in QueueType::ALL {
            assert_eq!(queue.as_str().parse::<QueueType>().unwrap(), queue);
        }
        assert_eq!(QueueType::Audio.dir_name(), "audio-queue");
        assert!(matches!(
            "podcast".parse::<QueueType>(),
            Err(ModelError::InvalidQueueType(_))
        ));
    }

    #[test]
    fn test_stats_total() {
        let stats = QueueStats::new(3, 1, 10, 2);
        assert_eq!(stats.total, 16);
    }
}

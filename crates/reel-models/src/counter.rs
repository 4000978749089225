//! Sequence counters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Named counter kept in the shared counters file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterKind {
    Audio,
    Video,
}

impl CounterKind {
    pub const ALL: [CounterKind; 2] = [CounterKind::Audio, CounterKind::Video];

    pub fn as_str(&self) -> &'static str {
        match self {
            CounterKind::Audio => "audio",
            CounterKind::Video => "video",
        }
    }

    /// Key of this counter inside the counters file.
    pub fn key(&self) -> &'static str {
        match self {
            CounterKind::Audio => "audio_counter",
            CounterKind::Video => "video_counter",
        }
    }
}

impl fmt::Display for CounterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CounterKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio" => Ok(CounterKind::Audio),
            "video" => Ok(CounterKind::Video),
            other => Err(ModelError::InvalidCounter(other.to_string())),
        }
    }
}

//! Typed payloads of the pipeline queues.
//!
//! The queue engine never looks at these; workers decode the payload part of a
//! claimed job into the type matching their queue.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Image folder used for video jobs created from finished audio jobs.
pub const DEFAULT_IMAGE_FOLDER: &str = "nature";

fn default_image_folder() -> String {
    DEFAULT_IMAGE_FOLDER.to_string()
}

/// Producers send video numbers both as JSON numbers and strings.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

/// Narration job: script text to speech in a channel's reference voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioPayload {
    pub channel_code: String,
    #[serde(deserialize_with = "string_or_number")]
    pub video_number: String,
    pub date: String,
    /// Remote folder holding `script.txt`; outputs are written next to it.
    pub organized_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_counter: Option<u64>,
    /// Inline script, used instead of `{organized_path}/script.txt` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_text: Option<String>,
    /// Render the video in the same job (unified workers).
    #[serde(default)]
    pub is_short: bool,
    /// Reference voice file under `reference-audio/`; defaults to `{channel_code}.wav`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_audio: Option<String>,
    /// Owner of the job, selects per-user notification credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl AudioPayload {
    /// Remote path of the channel's reference voice.
    pub fn reference_audio_path(&self) -> String {
        match &self.reference_audio {
            Some(file) => format!("reference-audio/{}", file),
            None => format!("reference-audio/{}.wav", self.channel_code),
        }
    }
}

/// Landscape video job built from a finished narration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_job_id: Option<String>,
    pub channel_code: String,
    #[serde(deserialize_with = "string_or_number")]
    pub video_number: String,
    pub date: String,
    pub organized_path: String,
    #[serde(default = "default_image_folder")]
    pub image_folder: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle_style: Option<String>,
    /// Public link of the narration, if the audio worker published one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gofile_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl VideoPayload {
    /// Follow-up video job for a finished audio job.
    pub fn from_audio(audio_job_id: &str, audio: &AudioPayload, gofile_link: Option<String>) -> Self {
        Self {
            audio_job_id: Some(audio_job_id.to_string()),
            channel_code: audio.channel_code.clone(),
            video_number: audio.video_number.clone(),
            date: audio.date.clone(),
            organized_path: audio.organized_path.clone(),
            image_folder: default_image_folder(),
            subtitle_style: None,
            gofile_link,
            username: audio.username.clone(),
        }
    }
}

/// Portrait short built from existing narration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortsPayload {
    pub channel_code: String,
    #[serde(deserialize_with = "string_or_number")]
    pub video_number: String,
    pub date: String,
    pub organized_path: String,
    /// Direct download URL of narration produced elsewhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_audio_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_video_number_accepts_int_and_string() {
        let a: AudioPayload = serde_json::from_value(json!({
            "channel_code": "KC",
            "video_number": 7,
            "date": "2024-05-01",
            "organized_path": "/organized/KC/2024-05-01/7"
        }))
        .unwrap();
        assert_eq!(a.video_number, "7");

        let b: AudioPayload = serde_json::from_value(json!({
            "channel_code": "KC",
            "video_number": "7b",
            "date": "2024-05-01",
            "organized_path": "/organized/KC/2024-05-01/7b"
        }))
        .unwrap();
        assert_eq!(b.video_number, "7b");
    }

    #[test]
    fn test_video_payload_from_audio() {
        let audio = AudioPayload {
            channel_code: "KC".into(),
            video_number: "3".into(),
            date: "2024-05-01".into(),
            organized_path: "/organized/KC/3".into(),
            audio_counter: Some(12),
            script_text: None,
            is_short: false,
            reference_audio: None,
            username: Some("aman".into()),
        };

        let video = VideoPayload::from_audio("job-1", &audio, Some("https://gofile.io/d/x".into()));
        assert_eq!(video.audio_job_id.as_deref(), Some("job-1"));
        assert_eq!(video.image_folder, DEFAULT_IMAGE_FOLDER);
        assert_eq!(video.organized_path, "/organized/KC/3");
        assert_eq!(video.username.as_deref(), Some("aman"));
        assert_eq!(audio.reference_audio_path(), "reference-audio/KC.wav");
    }
}

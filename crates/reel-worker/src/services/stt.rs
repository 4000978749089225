//! Speech-to-text for subtitle timing.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use reel_media::Segment;

use crate::error::{WorkerError, WorkerResult};

/// Produces timed transcript segments for an audio file.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// `work_dir` may be used for intermediate files.
    async fn transcribe(&self, audio: &Path, work_dir: &Path) -> WorkerResult<Vec<Segment>>;
}

#[derive(Debug, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}

/// Parse the JSON written by `whisper --output_format json`.
///
/// Blank segments are dropped and text is trimmed.
pub fn parse_whisper_json(content: &str) -> WorkerResult<Vec<Segment>> {
    let output: WhisperOutput = serde_json::from_str(content)
        .map_err(|e| WorkerError::stt_failed(format!("unreadable transcript: {}", e)))?;

    Ok(output
        .segments
        .into_iter()
        .filter(|s| !s.text.trim().is_empty() && s.end > s.start)
        .map(|s| Segment {
            start: s.start,
            end: s.end,
            text: s.text.trim().to_string(),
        })
        .collect())
}

/// The `whisper` command line tool.
#[derive(Debug, Clone)]
pub struct WhisperCli {
    command: String,
    model: String,
    language: Option<String>,
    timeout: Duration,
}

impl WhisperCli {
    pub fn new(command: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            model: model.into(),
            language: None,
            timeout: Duration::from_secs(1800),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn locate(&self) -> WorkerResult<PathBuf> {
        which::which(&self.command)
            .map_err(|_| WorkerError::stt_failed(format!("'{}' not found in PATH", self.command)))
    }

    fn args(&self, audio: &Path, out_dir: &Path) -> Vec<String> {
        let mut args = vec![
            audio.to_string_lossy().into_owned(),
            "--model".to_string(),
            self.model.clone(),
            "--output_format".to_string(),
            "json".to_string(),
            "--output_dir".to_string(),
            out_dir.to_string_lossy().into_owned(),
        ];
        if let Some(language) = &self.language {
            args.push("--language".to_string());
            args.push(language.clone());
        }
        args
    }
}

#[async_trait]
impl Transcriber for WhisperCli {
    async fn transcribe(&self, audio: &Path, work_dir: &Path) -> WorkerResult<Vec<Segment>> {
        let program = self.locate()?;
        let out_dir = work_dir.join("transcript");
        tokio::fs::create_dir_all(&out_dir).await?;

        info!(audio = %audio.display(), model = %self.model, "Transcribing audio");
        let child = Command::new(program)
            .args(self.args(audio, &out_dir))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| WorkerError::stt_failed(format!("timed out after {}s", self.timeout.as_secs())))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(5)..].join("\n");
            return Err(WorkerError::stt_failed(format!("{} exited with {}: {}", self.command, output.status, tail)));
        }

        let stem = audio
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        let json_path = out_dir.join(format!("{}.json", stem));
        let content = tokio::fs::read_to_string(&json_path)
            .await
            .map_err(|e| WorkerError::stt_failed(format!("missing transcript {}: {}", json_path.display(), e)))?;

        let segments = parse_whisper_json(&content)?;
        debug!(segments = segments.len(), "Transcript parsed");
        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_whisper_json() {
        let content = r#"{
            "text": " Hello world. Second line.",
            "segments": [
                {"id": 0, "start": 0.0, "end": 2.5, "text": " Hello world."},
                {"id": 1, "start": 2.5, "end": 2.5, "text": " "},
                {"id": 2, "start": 2.5, "end": 4.0, "text": " Second line."}
            ],
            "language": "en"
        }"#;

        let segments = parse_whisper_json(content).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "Hello world.");
        assert_eq!(segments[1].start, 2.5);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse_whisper_json("not json"), Err(WorkerError::SttFailed(_))));
    }

    #[test]
    fn test_args_include_output_dir() {
        let cli = WhisperCli::new("whisper", "base").with_language("hi");
        let args = cli.args(Path::new("/tmp/a.wav"), Path::new("/tmp/out"));
        assert_eq!(args[0], "/tmp/a.wav");
        assert!(args.windows(2).any(|w| w[0] == "--output_dir" && w[1] == "/tmp/out"));
        assert!(args.windows(2).any(|w| w[0] == "--language" && w[1] == "hi"));
    }
}

//! Text-to-speech.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;
use tracing::{debug, info};

use reel_media::{concat_audio, FfmpegRunner};

use crate::error::{WorkerError, WorkerResult};
use crate::retry::{retry_async, RetryConfig};

/// Turns a script into speech in the voice of a reference recording.
#[async_trait]
pub trait TtsEngine: Send + Sync {
    /// Write the narration of `text` to `output` (WAV).
    async fn synthesize(&self, text: &str, reference: &Path, output: &Path) -> WorkerResult<()>;
}

/// Split `text` into sentence-aligned chunks of at most `max_chars` characters.
///
/// `।` (danda) counts as a sentence end. A single sentence longer than
/// `max_chars` becomes its own chunk.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let normalized = text.replace('।', ".");
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for sentence in normalized.split('.').map(str::trim).filter(|s| !s.is_empty()) {
        let sentence = format!("{}.", sentence);
        let len = sentence.chars().count();

        if current.is_empty() {
            current = sentence;
            current_len = len;
        } else if current_len + 1 + len <= max_chars {
            current.push(' ');
            current.push_str(&sentence);
            current_len += 1 + len;
        } else {
            chunks.push(std::mem::replace(&mut current, sentence));
            current_len = len;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// TTS service reached over HTTP.
///
/// Each chunk is POSTed as multipart `{text, reference}` and answered with
/// WAV bytes; the chunk files are joined with ffmpeg's concat demuxer.
#[derive(Debug, Clone)]
pub struct HttpTtsEngine {
    http: reqwest::Client,
    url: String,
    chunk_size: usize,
    retry: RetryConfig,
    runner: FfmpegRunner,
}

impl HttpTtsEngine {
    pub fn new(url: impl Into<String>, chunk_size: usize) -> WorkerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;
        Ok(Self {
            http,
            url: url.into(),
            chunk_size: chunk_size.max(1),
            retry: RetryConfig::new("tts_chunk")
                .with_max_retries(2)
                .with_base_delay(Duration::from_secs(2)),
            runner: FfmpegRunner::new(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn synthesize_chunk(&self, text: &str, reference: &[u8], reference_name: &str) -> WorkerResult<Vec<u8>> {
        let form = multipart::Form::new().text("text", text.to_string()).part(
            "reference",
            multipart::Part::bytes(reference.to_vec())
                .file_name(reference_name.to_string())
                .mime_str("audio/wav")?,
        );

        let response = self.http.post(&self.url).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::tts_failed(format!("TTS service returned {}: {}", status, body)));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(WorkerError::tts_failed("TTS service returned no audio"));
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl TtsEngine for HttpTtsEngine {
    async fn synthesize(&self, text: &str, reference: &Path, output: &Path) -> WorkerResult<()> {
        let chunks = split_into_chunks(text, self.chunk_size);
        if chunks.is_empty() {
            return Err(WorkerError::invalid_payload("script is empty"));
        }

        let reference_bytes = tokio::fs::read(reference).await?;
        let reference_name = reference
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "reference.wav".to_string());
        let dir = output.parent().unwrap_or_else(|| Path::new("."));

        info!(chunks = chunks.len(), "Synthesizing narration");
        let mut parts: Vec<PathBuf> = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            let audio = retry_async(&self.retry, WorkerError::is_retryable, || {
                self.synthesize_chunk(chunk, &reference_bytes, &reference_name)
            })
            .await
            .into_result()?;

            let part = dir.join(format!("chunk_{:03}.wav", index));
            tokio::fs::write(&part, &audio).await?;
            debug!(chunk = index + 1, total = chunks.len(), bytes = audio.len(), "Chunk synthesized");
            parts.push(part);
        }

        concat_audio(&self.runner, &parts, output).await?;
        for part in &parts {
            let _ = tokio::fs::remove_file(part).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_one_chunk() {
        assert_eq!(split_into_chunks("  Hello there.  ", 500), vec!["Hello there."]);
        assert!(split_into_chunks("   ", 500).is_empty());
    }

    #[test]
    fn test_chunks_respect_limit() {
        let text = "One two three. Four five six. Seven eight nine. Ten eleven twelve.";
        let chunks = split_into_chunks(text, 30);

        assert_eq!(
            chunks,
            vec!["One two three. Four five six.", "Seven eight nine.", "Ten eleven twelve."]
        );
        assert!(chunks.iter().all(|c| c.chars().count() <= 30));
    }

    #[test]
    fn test_danda_ends_sentences() {
        let text = "पहला वाक्य है। दूसरा वाक्य है। तीसरा वाक्य है।";
        let chunks = split_into_chunks(text, 20);
        assert_eq!(chunks, vec!["पहला वाक्य है.", "दूसरा वाक्य है.", "तीसरा वाक्य है."]);
    }

    #[test]
    fn test_long_sentence_stands_alone() {
        let long = "a".repeat(40);
        let text = format!("Short one. {}. Tail.", long);
        let chunks = split_into_chunks(&text, 20);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].chars().count(), 41);
    }
}

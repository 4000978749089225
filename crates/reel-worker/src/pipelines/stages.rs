//! Steps shared by several pipelines.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use rand::seq::IndexedRandom;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use reel_media::{render_still_video, AssDocument, Canvas, SubtitleStyle};
use reel_models::{AudioPayload, CounterKind};

use crate::backend::QueueBackend;
use crate::error::{WorkerError, WorkerResult};
use crate::pipeline::{JobContext, PipelineDeps};

/// Extensions accepted from an image library folder.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Narration formats, in lookup order.
pub const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "m4a", "flac"];

/// `{organized_path}/{name}` as a remote path.
pub fn organized_file(organized_path: &str, name: &str) -> String {
    let base = organized_path.trim_matches('/');
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", base, name)
    }
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
}

/// Script of an audio job: inline text wins over `script.txt`.
pub async fn load_script(backend: &dyn QueueBackend, payload: &AudioPayload) -> WorkerResult<String> {
    if let Some(text) = payload.script_text.as_deref().filter(|t| !t.trim().is_empty()) {
        return Ok(text.to_string());
    }

    let path = organized_file(&payload.organized_path, "script.txt");
    match backend.fetch_text(&path).await? {
        Some(text) if !text.trim().is_empty() => Ok(text),
        Some(_) => Err(WorkerError::invalid_payload(format!("script is empty: {}", path))),
        None => Err(WorkerError::missing_input(format!("script not found: {}", path))),
    }
}

/// Remote candidates for the reference voice, most specific first.
pub fn reference_candidates(payload: &AudioPayload) -> Vec<String> {
    let mut candidates = vec![payload.reference_audio_path()];
    let channel_default = format!("reference-audio/{}.wav", payload.channel_code);
    if !candidates.contains(&channel_default) {
        candidates.push(channel_default);
    }
    candidates.push("reference-audio/base.wav".to_string());
    candidates.push("reference-audio/base.mp3".to_string());
    candidates
}

pub async fn fetch_reference_audio(
    backend: &dyn QueueBackend,
    payload: &AudioPayload,
    dir: &Path,
) -> WorkerResult<PathBuf> {
    for remote in reference_candidates(payload) {
        let ext = extension_of(&remote).unwrap_or_else(|| "wav".to_string());
        let local = dir.join(format!("reference.{}", ext));
        if backend.fetch_file(&remote, &local).await? {
            return Ok(local);
        }
    }
    Err(WorkerError::missing_input(format!(
        "no reference audio for channel {}",
        payload.channel_code
    )))
}

/// Result of the narration stages.
#[derive(Debug, Clone)]
pub struct Narration {
    pub script: String,
    pub audio: PathBuf,
    pub remote_path: String,
    pub link: Option<String>,
    pub counter: u64,
}

/// Script, reference voice, TTS, store next to the script, publish, count.
pub async fn narrate(deps: &PipelineDeps, ctx: &JobContext, payload: &AudioPayload) -> WorkerResult<Narration> {
    let backend = deps.backend.as_ref();

    let script = load_script(backend, payload).await?;
    ctx.logger.log_progress(&format!("script loaded ({} chars)", script.chars().count()));

    let reference = fetch_reference_audio(backend, payload, ctx.work_dir()).await?;
    let audio = ctx.work_dir().join("audio.wav");
    deps.tts.synthesize(&script, &reference, &audio).await?;
    ctx.logger.log_progress("narration synthesized");

    let remote_path = organized_file(&payload.organized_path, "audio.wav");
    backend.store_file(&audio, &remote_path).await?;
    let link = publish(deps, ctx, &audio).await;
    let counter = backend.increment_counter(CounterKind::Audio).await?;

    Ok(Narration {
        script,
        audio,
        remote_path,
        link,
        counter,
    })
}

/// Fetch the narration stored next to the script.
pub async fn fetch_narration(backend: &dyn QueueBackend, organized_path: &str, dir: &Path) -> WorkerResult<PathBuf> {
    for ext in AUDIO_EXTENSIONS {
        let remote = organized_file(organized_path, &format!("audio.{}", ext));
        let local = dir.join(format!("audio.{}", ext));
        if backend.fetch_file(&remote, &local).await? {
            return Ok(local);
        }
    }
    Err(WorkerError::missing_input(format!("no audio in {}", organized_path)))
}

/// Stream a public URL to `dest`.
pub async fn download_url(http: &reqwest::Client, url: &str, dest: &Path) -> WorkerResult<u64> {
    let response = http.get(url).send().await?.error_for_status()?;
    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    if written == 0 {
        return Err(WorkerError::missing_input(format!("empty download: {}", url)));
    }
    Ok(written)
}

/// A library image picked at random.
#[derive(Debug, Clone)]
pub struct LibraryImage {
    pub local: PathBuf,
    pub remote_path: String,
}

pub async fn pick_library_image(backend: &dyn QueueBackend, folder: &str, dir: &Path) -> WorkerResult<LibraryImage> {
    let folder_path = format!("images/{}", folder.trim_matches('/'));
    let listing = backend
        .list_dir(&folder_path)
        .await?
        .ok_or_else(|| WorkerError::missing_input(format!("image folder not found: {}", folder_path)))?;

    let candidates: Vec<&str> = listing
        .file_names()
        .filter(|name| {
            extension_of(name)
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
                .unwrap_or(false)
        })
        .collect();

    let name = candidates
        .choose(&mut rand::rng())
        .map(|n| n.to_string())
        .ok_or_else(|| WorkerError::missing_input(format!("no images in {}", folder_path)))?;

    let remote_path = format!("{}/{}", folder_path, name);
    let ext = extension_of(&name).unwrap_or_else(|| "jpg".to_string());
    let local = dir.join(format!("image.{}", ext));
    if !backend.fetch_file(&remote_path, &local).await? {
        return Err(WorkerError::missing_input(format!("image vanished: {}", remote_path)));
    }

    Ok(LibraryImage { local, remote_path })
}

/// Image prompt derived from the opening of a script.
pub fn image_prompt(script: &str, portrait: bool) -> String {
    let opening: String = script
        .replace('।', ".")
        .split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(2)
        .collect::<Vec<_>>()
        .join(". ");
    let opening: String = opening.chars().take(300).collect();
    let framing = if portrait { "vertical composition" } else { "wide cinematic composition" };
    format!(
        "{}, {}, highly detailed, soft natural lighting, no text, no watermark",
        opening, framing
    )
}

/// Where the image of a render came from.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Generated(PathBuf),
    Library(LibraryImage),
}

impl ImageSource {
    pub fn path(&self) -> &Path {
        match self {
            ImageSource::Generated(path) => path,
            ImageSource::Library(image) => &image.local,
        }
    }
}

/// Generate an image for `canvas`; fall back to a random one from `folder`.
pub async fn generated_or_library_image(
    deps: &PipelineDeps,
    ctx: &JobContext,
    prompt: &str,
    canvas: Canvas,
    folder: &str,
) -> WorkerResult<ImageSource> {
    let (width, height) = canvas.dimensions();
    let output = ctx.work_dir().join("generated.png");

    match deps.images.generate(prompt, width, height, &output).await {
        Ok(()) => Ok(ImageSource::Generated(output)),
        Err(e) => {
            ctx.logger.log_warning(&format!("image generation failed, using library image: {}", e));
            let image = pick_library_image(deps.backend.as_ref(), folder, ctx.work_dir()).await?;
            Ok(ImageSource::Library(image))
        }
    }
}

/// Remove a library image once it has been used.
pub async fn retire_library_image(backend: &dyn QueueBackend, ctx: &JobContext, source: &ImageSource) {
    if let ImageSource::Library(image) = source {
        if let Err(e) = backend.delete_file(&image.remote_path).await {
            ctx.logger.log_warning(&format!("could not delete used image {}: {}", image.remote_path, e));
        }
    }
}

/// Transcribe, write subtitles, render. Returns the rendered file.
pub async fn render_with_subtitles(
    deps: &PipelineDeps,
    ctx: &JobContext,
    image: &Path,
    audio: &Path,
    canvas: Canvas,
    style: SubtitleStyle,
    output_name: &str,
) -> WorkerResult<PathBuf> {
    let segments = deps.transcriber.transcribe(audio, ctx.work_dir()).await?;
    let (width, height) = canvas.dimensions();

    let subtitles = if segments.is_empty() {
        ctx.logger.log_warning("transcript is empty, rendering without subtitles");
        None
    } else {
        let path = ctx.work_dir().join("subtitles.ass");
        AssDocument::from_segments(&segments, width, height, style)
            .write_to(&path)
            .await?;
        Some(path)
    };
    ctx.logger.log_progress(&format!("{} subtitle segments", segments.len()));

    let output = ctx.work_dir().join(output_name);
    let encoder = render_still_video(
        &deps.media.runner,
        image,
        audio,
        subtitles.as_deref(),
        &output,
        canvas,
        deps.media.encoder,
    )
    .await?;
    ctx.logger.log_progress(&format!("rendered {}x{} with {}", width, height, encoder));

    Ok(output)
}

/// Upload to the public hosts. A failure is logged, not fatal: the file is
/// already stored on the file server.
pub async fn publish(deps: &PipelineDeps, ctx: &JobContext, file: &Path) -> Option<String> {
    match deps.uploader.upload(file).await {
        Ok(link) => Some(link),
        Err(e) => {
            warn!(job_id = %ctx.job_id(), error = %e, "Public upload failed");
            None
        }
    }
}

/// File size in megabytes, for notifications.
pub async fn size_mb(path: &Path) -> f64 {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.len() as f64 / (1024.0 * 1024.0))
        .unwrap_or(0.0)
}

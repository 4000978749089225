//! Still-image video composition and audio concatenation.

use std::path::Path;

use tracing::{info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::encoder::Encoder;
use crate::error::{MediaError, MediaResult};
use crate::subtitles::subtitles_filter;

/// Output canvas for a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Canvas {
    /// 1920x1080, image letterboxed
    Landscape1080p,
    /// 1080x1920, image cropped to fill
    Portrait1080x1920,
}

impl Canvas {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Canvas::Landscape1080p => (1920, 1080),
            Canvas::Portrait1080x1920 => (1080, 1920),
        }
    }

    /// Video filter chain, with subtitles burned in last.
    pub fn filter(&self, subtitles: Option<&Path>) -> String {
        let (w, h) = self.dimensions();
        let mut filter = match self {
            Canvas::Landscape1080p => format!(
                "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,format=yuv420p"
            ),
            Canvas::Portrait1080x1920 => {
                format!("scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},format=yuv420p")
            }
        };
        if let Some(path) = subtitles {
            filter.push(',');
            filter.push_str(&subtitles_filter(path));
        }
        filter
    }
}

fn still_video_command(
    image: &Path,
    audio: &Path,
    subtitles: Option<&Path>,
    output: &Path,
    canvas: Canvas,
    encoder: Encoder,
) -> FfmpegCommand {
    FfmpegCommand::new(image, output)
        .loop_input()
        .add_input(audio)
        .video_filter(canvas.filter(subtitles))
        .output_args(encoder.output_args())
        .audio_codec("aac")
        .audio_bitrate("192k")
        .shortest()
}

/// Render one image over an audio track. Returns the encoder that produced
/// the file; a failed NVENC render is retried once with libx264.
pub async fn render_still_video(
    runner: &FfmpegRunner,
    image: &Path,
    audio: &Path,
    subtitles: Option<&Path>,
    output: &Path,
    canvas: Canvas,
    encoder: Encoder,
) -> MediaResult<Encoder> {
    for input in [image, audio].into_iter().chain(subtitles) {
        if !input.exists() {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }
    }

    let (w, h) = canvas.dimensions();
    info!(encoder = %encoder, width = w, height = h, output = %output.display(), "Rendering video");

    let cmd = still_video_command(image, audio, subtitles, output, canvas, encoder);
    match runner.run(&cmd).await {
        Ok(()) => Ok(encoder),
        Err(e @ MediaError::FfmpegFailed { .. }) if encoder.is_hardware() => {
            warn!(error = %e, "NVENC render failed, falling back to libx264");
            let cmd = still_video_command(image, audio, subtitles, output, canvas, Encoder::Libx264);
            runner.run(&cmd).await?;
            Ok(Encoder::Libx264)
        }
        Err(e) => Err(e),
    }
}

/// Concat demuxer list entry.
fn concat_entry(path: &Path) -> String {
    format!("file '{}'\n", path.to_string_lossy().replace('\'', "'\\''"))
}

/// Join audio files of the same format without re-encoding.
pub async fn concat_audio(runner: &FfmpegRunner, inputs: &[impl AsRef<Path>], output: &Path) -> MediaResult<()> {
    match inputs {
        [] => Err(MediaError::ffmpeg_failed("no audio inputs to concatenate", None, None)),
        [single] => {
            tokio::fs::copy(single.as_ref(), output).await?;
            Ok(())
        }
        _ => {
            let list: String = inputs.iter().map(|p| concat_entry(p.as_ref())).collect();
            let list_path = output.with_extension("concat.txt");
            tokio::fs::write(&list_path, list).await?;

            let cmd = FfmpegCommand::new(&list_path, output)
                .input_args(["-f", "concat", "-safe", "0"])
                .output_args(["-c", "copy"]);
            let result = runner.run(&cmd).await;
            let _ = tokio::fs::remove_file(&list_path).await;
            result
        }
    }
}

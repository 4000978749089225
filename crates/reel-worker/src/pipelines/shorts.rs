//! Portrait shorts from existing narration.

use async_trait::async_trait;

use reel_media::{Canvas, SubtitleStyle};
use reel_models::{QueueType, ShortsPayload};

use crate::error::WorkerResult;
use crate::pipeline::{JobContext, Pipeline, PipelineDeps, PipelineOutcome};
use crate::pipelines::stages;
use crate::services::escape_html;

/// Narration (downloaded or stored) plus a generated portrait image to a
/// 1080x1920 short.
#[derive(Debug, Clone)]
pub struct ShortsPipeline {
    deps: PipelineDeps,
    image_folder: String,
}

impl ShortsPipeline {
    pub fn new(deps: PipelineDeps, image_folder: String) -> Self {
        Self { deps, image_folder }
    }

    async fn prompt(&self, payload: &ShortsPayload) -> WorkerResult<String> {
        if let Some(prompt) = payload.image_prompt.as_deref().filter(|p| !p.trim().is_empty()) {
            return Ok(prompt.to_string());
        }
        let script_path = stages::organized_file(&payload.organized_path, "script.txt");
        let prompt = match self.deps.backend.fetch_text(&script_path).await? {
            Some(script) if !script.trim().is_empty() => stages::image_prompt(&script, true),
            _ => stages::image_prompt(&format!("Atmospheric scene for channel {}", payload.channel_code), true),
        };
        Ok(prompt)
    }
}

/// `SHORT_{n}.mp4`, numbered from 1.
pub fn short_file_name(short_number: Option<u32>) -> String {
    format!("SHORT_{}.mp4", short_number.unwrap_or(1))
}

#[async_trait]
impl Pipeline for ShortsPipeline {
    fn queue_type(&self) -> QueueType {
        QueueType::Shorts
    }

    fn operation(&self) -> &'static str {
        "shorts"
    }

    fn title(&self) -> &'static str {
        "Short"
    }

    async fn run(&self, ctx: &JobContext) -> WorkerResult<PipelineOutcome> {
        let payload: ShortsPayload = ctx.payload()?;
        ctx.logger.log_start(&format!("{} v{}", payload.channel_code, payload.video_number));
        let backend = self.deps.backend.as_ref();

        let audio = match payload.existing_audio_link.as_deref().filter(|l| !l.trim().is_empty()) {
            Some(link) => {
                let dest = ctx.work_dir().join("audio.wav");
                let bytes = stages::download_url(&self.deps.http, link, &dest).await?;
                ctx.logger.log_progress(&format!("downloaded narration ({} bytes)", bytes));
                dest
            }
            None => stages::fetch_narration(backend, &payload.organized_path, ctx.work_dir()).await?,
        };

        let canvas = Canvas::Portrait1080x1920;
        let prompt = self.prompt(&payload).await?;
        let image = stages::generated_or_library_image(&self.deps, ctx, &prompt, canvas, &self.image_folder).await?;

        let file_name = short_file_name(payload.short_number);
        let video = stages::render_with_subtitles(
            &self.deps,
            ctx,
            image.path(),
            &audio,
            canvas,
            SubtitleStyle::shorts(),
            &file_name,
        )
        .await?;

        let remote_path = stages::organized_file(&payload.organized_path, &file_name);
        backend.store_file(&video, &remote_path).await?;
        let link = stages::publish(&self.deps, ctx, &video).await;
        stages::retire_library_image(backend, ctx, &image).await;

        let message = format!(
            "📱 <b>Short Ready</b>\nChannel: {}\nVideo: {}\nShort: #{}\nSize: {:.1} MB\nGofile: {}",
            escape_html(&payload.channel_code),
            escape_html(&payload.video_number),
            payload.short_number.unwrap_or(1),
            stages::size_mb(&video).await,
            link.as_deref().unwrap_or("n/a")
        );

        Ok(PipelineOutcome::default()
            .with_field("short_path", remote_path)
            .with_optional("gofile_link", link)
            .with_notification(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_file_name() {
        assert_eq!(short_file_name(Some(3)), "SHORT_3.mp4");
        assert_eq!(short_file_name(None), "SHORT_1.mp4");
    }
}

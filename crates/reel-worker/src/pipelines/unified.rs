//! Narration and video in a single job.

use async_trait::async_trait;

use reel_media::{Canvas, SubtitleStyle};
use reel_models::{AudioPayload, CounterKind, QueueType, DEFAULT_IMAGE_FOLDER};

use crate::error::WorkerResult;
use crate::pipeline::{JobContext, Pipeline, PipelineDeps, PipelineOutcome};
use crate::pipelines::stages;
use crate::services::escape_html;

/// Library folder used for portrait renders.
pub const SHORTS_IMAGE_FOLDER: &str = "shorts";

/// Runs the audio stages, then renders the video right away. Claims from
/// the audio queue and queues no follow-up.
#[derive(Debug, Clone)]
pub struct UnifiedPipeline {
    deps: PipelineDeps,
}

impl UnifiedPipeline {
    pub fn new(deps: PipelineDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Pipeline for UnifiedPipeline {
    fn queue_type(&self) -> QueueType {
        QueueType::Audio
    }

    fn operation(&self) -> &'static str {
        "unified"
    }

    fn title(&self) -> &'static str {
        "Video"
    }

    async fn run(&self, ctx: &JobContext) -> WorkerResult<PipelineOutcome> {
        let payload: AudioPayload = ctx.payload()?;
        ctx.logger.log_start(&format!(
            "{} v{}{}",
            payload.channel_code,
            payload.video_number,
            if payload.is_short { " (short)" } else { "" }
        ));
        let backend = self.deps.backend.as_ref();

        let narration = stages::narrate(&self.deps, ctx, &payload).await?;

        let (canvas, style, folder) = if payload.is_short {
            (Canvas::Portrait1080x1920, SubtitleStyle::shorts(), SHORTS_IMAGE_FOLDER)
        } else {
            (Canvas::Landscape1080p, SubtitleStyle::default(), DEFAULT_IMAGE_FOLDER)
        };

        let prompt = stages::image_prompt(&narration.script, payload.is_short);
        let image = stages::generated_or_library_image(&self.deps, ctx, &prompt, canvas, folder).await?;

        let video = stages::render_with_subtitles(
            &self.deps,
            ctx,
            image.path(),
            &narration.audio,
            canvas,
            style,
            "video.mp4",
        )
        .await?;

        let remote_path = stages::organized_file(&payload.organized_path, "video.mp4");
        backend.store_file(&video, &remote_path).await?;
        let link = stages::publish(&self.deps, ctx, &video).await;
        let video_counter = backend.increment_counter(CounterKind::Video).await?;
        stages::retire_library_image(backend, ctx, &image).await;

        let message = format!(
            "🎬 <b>Video Complete</b>\nChannel: {}\nVideo: {}\nDate: {}\nCounter: #{}\nSize: {:.1} MB\nGofile: {}",
            escape_html(&payload.channel_code),
            escape_html(&payload.video_number),
            escape_html(&payload.date),
            narration.counter,
            stages::size_mb(&video).await,
            link.as_deref().unwrap_or("n/a")
        );

        Ok(PipelineOutcome::default()
            .with_field("audio_path", narration.remote_path)
            .with_field("audio_counter", narration.counter)
            .with_optional("audio_gofile_link", narration.link)
            .with_field("video_path", remote_path)
            .with_field("video_counter", video_counter)
            .with_optional("gofile_link", link)
            .with_notification(message))
    }
}

//! Landscape video jobs.

use async_trait::async_trait;

use reel_media::{Canvas, SubtitleStyle};
use reel_models::{CounterKind, QueueType, VideoPayload};

use crate::error::WorkerResult;
use crate::pipeline::{JobContext, Pipeline, PipelineDeps, PipelineOutcome};
use crate::pipelines::stages;
use crate::services::escape_html;

/// Narration plus a library image to a 1920x1080 video with subtitles.
#[derive(Debug, Clone)]
pub struct VideoPipeline {
    deps: PipelineDeps,
}

impl VideoPipeline {
    pub fn new(deps: PipelineDeps) -> Self {
        Self { deps }
    }
}

/// Subtitle style named by the job, or the default one.
pub fn style_for(name: Option<&str>) -> SubtitleStyle {
    name.and_then(SubtitleStyle::named).unwrap_or_default()
}

#[async_trait]
impl Pipeline for VideoPipeline {
    fn queue_type(&self) -> QueueType {
        QueueType::Video
    }

    fn operation(&self) -> &'static str {
        "video"
    }

    fn title(&self) -> &'static str {
        "Video"
    }

    async fn run(&self, ctx: &JobContext) -> WorkerResult<PipelineOutcome> {
        let payload: VideoPayload = ctx.payload()?;
        ctx.logger.log_start(&format!("{} v{}", payload.channel_code, payload.video_number));
        let backend = self.deps.backend.as_ref();

        let audio = stages::fetch_narration(backend, &payload.organized_path, ctx.work_dir()).await?;
        let image = stages::pick_library_image(backend, &payload.image_folder, ctx.work_dir()).await?;
        ctx.logger.log_progress(&format!("using image {}", image.remote_path));

        let video = stages::render_with_subtitles(
            &self.deps,
            ctx,
            &image.local,
            &audio,
            Canvas::Landscape1080p,
            style_for(payload.subtitle_style.as_deref()),
            "video.mp4",
        )
        .await?;

        let remote_path = stages::organized_file(&payload.organized_path, "video.mp4");
        backend.store_file(&video, &remote_path).await?;
        let link = stages::publish(&self.deps, ctx, &video).await;
        let counter = backend.increment_counter(CounterKind::Video).await?;

        // Each library image is used once
        if let Err(e) = backend.delete_file(&image.remote_path).await {
            ctx.logger.log_warning(&format!("could not delete used image {}: {}", image.remote_path, e));
        }

        let message = format!(
            "🎬 <b>Video Complete</b>\nChannel: {}\nVideo: {}\nDate: {}\nSize: {:.1} MB\nGofile: {}",
            escape_html(&payload.channel_code),
            escape_html(&payload.video_number),
            escape_html(&payload.date),
            stages::size_mb(&video).await,
            link.as_deref().unwrap_or("n/a")
        );

        Ok(PipelineOutcome::default()
            .with_field("video_path", remote_path)
            .with_field("video_counter", counter)
            .with_optional("gofile_link", link)
            .with_notification(message))
    }
}

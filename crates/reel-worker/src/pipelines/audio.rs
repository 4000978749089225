//! Narration jobs.

use async_trait::async_trait;

use reel_models::{AudioPayload, QueueType, VideoPayload};

use crate::error::WorkerResult;
use crate::pipeline::{FollowUp, JobContext, Pipeline, PipelineDeps, PipelineOutcome};
use crate::pipelines::stages;
use crate::services::escape_html;

/// Priority of the video job queued for a finished narration.
pub const FOLLOW_UP_PRIORITY: i64 = 1;

/// Script to narration, then a video job for it.
#[derive(Debug, Clone)]
pub struct AudioPipeline {
    deps: PipelineDeps,
}

impl AudioPipeline {
    pub fn new(deps: PipelineDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Pipeline for AudioPipeline {
    fn queue_type(&self) -> QueueType {
        QueueType::Audio
    }

    fn operation(&self) -> &'static str {
        "audio"
    }

    fn title(&self) -> &'static str {
        "Audio"
    }

    async fn run(&self, ctx: &JobContext) -> WorkerResult<PipelineOutcome> {
        let payload: AudioPayload = ctx.payload()?;
        ctx.logger.log_start(&format!("{} v{}", payload.channel_code, payload.video_number));

        let narration = stages::narrate(&self.deps, ctx, &payload).await?;

        let video = VideoPayload::from_audio(ctx.job_id().as_str(), &payload, narration.link.clone());
        let follow_up = FollowUp::new(QueueType::Video, &video, FOLLOW_UP_PRIORITY)?;

        let message = format!(
            "🎵 <b>Audio Complete</b>\nChannel: {}\nVideo: {}\nCounter: #{}\nGofile: {}",
            escape_html(&payload.channel_code),
            escape_html(&payload.video_number),
            narration.counter,
            narration.link.as_deref().unwrap_or("n/a")
        );

        Ok(PipelineOutcome::default()
            .with_field("audio_path", narration.remote_path)
            .with_field("audio_counter", narration.counter)
            .with_optional("gofile_link", narration.link)
            .with_follow_up(follow_up)
            .with_notification(message))
    }
}

//! Pipelines, one per worker kind.

pub mod audio;
pub mod shorts;
pub mod stages;
pub mod unified;
pub mod video;

use std::sync::Arc;

pub use audio::AudioPipeline;
pub use shorts::ShortsPipeline;
pub use unified::UnifiedPipeline;
pub use video::VideoPipeline;

use crate::config::{WorkerConfig, WorkerKind};
use crate::pipeline::{Pipeline, PipelineDeps};

/// The pipeline a worker of `config.kind` runs.
pub fn for_config(config: &WorkerConfig, deps: PipelineDeps) -> Arc<dyn Pipeline> {
    match config.kind {
        WorkerKind::Audio => Arc::new(AudioPipeline::new(deps)),
        WorkerKind::Video => Arc::new(VideoPipeline::new(deps)),
        WorkerKind::Unified => Arc::new(UnifiedPipeline::new(deps)),
        WorkerKind::Shorts => Arc::new(ShortsPipeline::new(deps, config.shorts_image_folder.clone())),
    }
}

//! FFmpeg CLI wrapper for narrated still-image videos.
//!
//! This crate provides:
//! - FFmpeg command building with multiple inputs
//! - Progress parsing from `-progress pipe:2`, cancellation and timeouts
//! - NVENC detection with libx264 fallback
//! - SRT and boxed ASS subtitle tracks

pub mod command;
pub mod compose;
pub mod encoder;
pub mod error;
pub mod probe;
pub mod progress;
pub mod subtitles;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use compose::{concat_audio, render_still_video, Canvas};
pub use encoder::{detect_encoder, Encoder};
pub use error::{MediaError, MediaResult};
pub use probe::probe_duration;
pub use progress::{FfmpegProgress, ProgressCallback};
pub use subtitles::{
    escape_filter_path, format_srt_time, hex_to_ass_color, parse_srt, srt_time_to_ass, subtitles_filter, to_srt,
    wrap_text, AssDocument, Cue, Segment, SubtitleStyle,
};

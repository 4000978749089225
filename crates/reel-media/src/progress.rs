//! FFmpeg `-progress` output parsing.

use serde::{Deserialize, Serialize};

/// Progress snapshot, emitted once per `progress=` block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    pub frame: u64,
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (1.5 = 1.5x realtime)
    pub speed: f64,
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Percentage done given the total duration in milliseconds.
    pub fn percentage(&self, total_duration_ms: i64) -> f64 {
        if self.is_complete {
            return 100.0;
        }
        if total_duration_ms <= 0 {
            return 0.0;
        }
        ((self.out_time_ms as f64 / total_duration_ms as f64) * 100.0).clamp(0.0, 100.0)
    }

    /// Fold one `key=value` line into the snapshot. Returns a completed
    /// snapshot at the end of each block.
    pub fn apply_line(&mut self, line: &str) -> Option<FfmpegProgress> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            // Despite the name, ffmpeg reports `out_time_ms` in microseconds.
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_ms = us / 1000;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.frame = frame;
                }
            }
            "fps" => {
                if let Ok(fps) = value.parse() {
                    self.fps = fps;
                }
            }
            "speed" => {
                if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                    self.speed = speed;
                }
            }
            "progress" => {
                self.is_complete = value == "end";
                return Some(self.clone());
            }
            _ => {}
        }
        None
    }
}

/// Whether a stderr line belongs to the `-progress` stream rather than a log message.
pub(crate) fn is_progress_line(line: &str) -> bool {
    line.split_once('=').is_some_and(|(key, _)| {
        !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

/// Callback type for progress updates.
pub type ProgressCallback = Box<dyn Fn(FfmpegProgress) + Send + 'static>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_parsing() {
        let mut progress = FfmpegProgress::default();

        assert!(progress.apply_line("frame=120").is_none());
        assert!(progress.apply_line("out_time_ms=5000000").is_none());
        assert!(progress.apply_line("speed=2.5x").is_none());

        let snapshot = progress.apply_line("progress=continue").unwrap();
        assert_eq!(snapshot.frame, 120);
        assert_eq!(snapshot.out_time_ms, 5000);
        assert!((snapshot.speed - 2.5).abs() < 0.01);
        assert!(!snapshot.is_complete);

        let end = progress.apply_line("progress=end").unwrap();
        assert!(end.is_complete);
    }

    #[test]
    fn test_percentage() {
        let progress = FfmpegProgress {
            out_time_ms: 5000,
            ..Default::default()
        };
        assert!((progress.percentage(10_000) - 50.0).abs() < 0.01);
        assert_eq!(progress.percentage(0), 0.0);
        assert_eq!(progress.percentage(1000), 100.0);
    }

    #[test]
    fn test_progress_line_detection() {
        assert!(is_progress_line("out_time_ms=123"));
        assert!(is_progress_line("speed=N/A"));
        assert!(!is_progress_line("[subtitles @ 0x55] Unable to open font"));
        assert!(!is_progress_line("Error opening input"));
    }
}

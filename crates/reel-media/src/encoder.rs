//! H.264 encoder selection.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, warn};

use crate::command::check_ffmpeg;

/// H.264 encoder used for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoder {
    /// NVIDIA hardware encoder
    Nvenc,
    /// Software encoder
    Libx264,
}

impl Encoder {
    pub fn codec(&self) -> &'static str {
        match self {
            Encoder::Nvenc => "h264_nvenc",
            Encoder::Libx264 => "libx264",
        }
    }

    /// Video output arguments for a still-image render.
    pub fn output_args(&self) -> Vec<String> {
        let args: &[&str] = match self {
            Encoder::Nvenc => &["-c:v", "h264_nvenc", "-preset", "p4", "-b:v", "5M", "-pix_fmt", "yuv420p"],
            Encoder::Libx264 => &[
                "-c:v", "libx264", "-preset", "medium", "-crf", "23", "-tune", "stillimage", "-pix_fmt", "yuv420p",
            ],
        };
        args.iter().map(|s| s.to_string()).collect()
    }

    pub fn is_hardware(&self) -> bool {
        matches!(self, Encoder::Nvenc)
    }
}

impl std::fmt::Display for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.codec())
    }
}

fn force_cpu() -> bool {
    std::env::var("FORCE_CPU_ENCODER")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Pick NVENC when ffmpeg lists it, unless `FORCE_CPU_ENCODER` is set.
pub async fn detect_encoder() -> Encoder {
    if force_cpu() {
        info!("FORCE_CPU_ENCODER set, using libx264");
        return Encoder::Libx264;
    }

    let Ok(ffmpeg) = check_ffmpeg() else {
        return Encoder::Libx264;
    };

    let output = Command::new(ffmpeg)
        .args(["-hide_banner", "-encoders"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output();

    match tokio::time::timeout(std::time::Duration::from_secs(5), output).await {
        Ok(Ok(out)) if encoders_list_nvenc(&String::from_utf8_lossy(&out.stdout)) => {
            info!("NVENC available, using h264_nvenc");
            Encoder::Nvenc
        }
        Ok(Ok(_)) => Encoder::Libx264,
        Ok(Err(e)) => {
            warn!("Could not list ffmpeg encoders: {}", e);
            Encoder::Libx264
        }
        Err(_) => {
            warn!("Listing ffmpeg encoders timed out");
            Encoder::Libx264
        }
    }
}

fn encoders_list_nvenc(listing: &str) -> bool {
    listing
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some("h264_nvenc"))
}

//! 视频抽帧 - external frame extraction

use super::error::PipelineError;
use super::frame::list_frame_files;
use log::{error, info};
use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Overrides the `ffmpeg` found on PATH
pub const FFMPEG_ENV: &str = "FRAME_SIEVE_FFMPEG_PATH";

/// Zero-padded so lexicographic order stays temporal up to 10^8 frames
const FRAME_PATTERN: &str = "frame_%08d.png";

/// Produces one image per `interval_secs` of video into `out_dir`, named so
/// that lexicographic order is temporal order. Returns the frame count.
pub trait FrameSource: Send + Sync {
    fn extract(&self, video: &Path, out_dir: &Path, interval_secs: f64) -> Result<usize, PipelineError>;
}

pub struct FfmpegFrameSource {
    program: PathBuf,
}

impl FfmpegFrameSource {
    pub fn new() -> Self {
        let program = env::var_os(FFMPEG_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("ffmpeg"));
        Self { program }
    }

    pub fn with_program(program: PathBuf) -> Self {
        Self { program }
    }

    fn fps_filter(interval_secs: f64) -> String {
        format!("fps=1/{}", interval_secs)
    }
}

impl Default for FfmpegFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for FfmpegFrameSource {
    fn extract(&self, video: &Path, out_dir: &Path, interval_secs: f64) -> Result<usize, PipelineError> {
        if !video.is_file() {
            return Err(PipelineError::Extraction(format!("video not found: {:?}", video)));
        }
        std::fs::create_dir_all(out_dir)?;

        info!(
            "🎬 Extracting frames from {:?} every {}s",
            video, interval_secs
        );
        let output = Command::new(&self.program)
            .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(video)
            .args(["-vf", &Self::fps_filter(interval_secs)])
            .arg(out_dir.join(FRAME_PATTERN))
            .output()
            .map_err(|e| {
                PipelineError::Extraction(format!("failed to spawn {:?}: {}", self.program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("❌ ffmpeg failed: {}", stderr.trim());
            return Err(PipelineError::Extraction(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let count = list_frame_files(out_dir)?.len();
        info!("✅ Extracted {} frames", count);
        Ok(count)
    }
}

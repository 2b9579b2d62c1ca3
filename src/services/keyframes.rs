// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Video labeling by sampling a keyframe with FFmpeg and labeling it as an image

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::{bounded, ImageLabeler, VideoLabeler};
use crate::{Result, TaxisError};

/// Offsets, in seconds, tried in order; the first frame is the fallback for
/// clips shorter than a second
const FRAME_OFFSETS: [&str; 2] = ["1", "0"];

pub struct KeyframeLabeler {
    ffmpeg: String,
    vision: Arc<dyn ImageLabeler>,
}

impl KeyframeLabeler {
    pub fn new(ffmpeg: &str, vision: Arc<dyn ImageLabeler>) -> Self {
        Self {
            ffmpeg: ffmpeg.to_string(),
            vision,
        }
    }

    /// Check if FFmpeg is available
    pub fn ffmpeg_available(&self) -> bool {
        std::process::Command::new(&self.ffmpeg)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Grab one JPEG frame at `offset` seconds
    async fn extract_frame(&self, video: &Path, offset: &str) -> Result<Vec<u8>> {
        let output = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-ss", offset, "-i"])
            .arg(video)
            .args(["-frames:v", "1", "-q:v", "2", "-f", "image2pipe", "-vcodec", "mjpeg", "pipe:1"])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() || output.stdout.is_empty() {
            return Err(TaxisError::Analysis(format!(
                "ffmpeg produced no frame at {}s: {}",
                offset,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(output.stdout)
    }

    async fn label_file(&self, video: &Path) -> Result<Vec<String>> {
        let mut last_error = None;

        for offset in FRAME_OFFSETS {
            match self.extract_frame(video, offset).await {
                Ok(frame) => {
                    debug!("Extracted {} byte keyframe at {}s", frame.len(), offset);
                    return self.vision.label_image(&frame).await;
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| TaxisError::Analysis("no keyframe extracted".to_string())))
    }
}

#[async_trait]
impl VideoLabeler for KeyframeLabeler {
    async fn label_video(&self, bytes: &[u8], timeout: Duration) -> Result<Vec<String>> {
        // MP4 and MOV need a seekable input, so the bytes go through a scratch file
        let scratch = ScratchFile::new();
        tokio::fs::write(scratch.path(), bytes).await?;

        bounded("video labeling", timeout, self.label_file(scratch.path())).await
    }
}

/// Temp file removed on drop, including when the labeling future is cancelled
struct ScratchFile(PathBuf);

impl ScratchFile {
    fn new() -> Self {
        Self(std::env::temp_dir().join(format!("taxis-video-{}", uuid::Uuid::new_v4())))
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

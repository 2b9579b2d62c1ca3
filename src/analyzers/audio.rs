// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Audio file analyzer using speech transcription

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{ContentAnalyzer, ContentSignal};
use crate::services::{bounded, Transcriber};
use crate::Result;

/// Analyzer for audio files
pub struct AudioAnalyzer {
    transcriber: Arc<dyn Transcriber>,
    timeout: Duration,
}

impl AudioAnalyzer {
    pub fn new(transcriber: Arc<dyn Transcriber>, timeout: Duration) -> Self {
        Self { transcriber, timeout }
    }
}

#[async_trait]
impl ContentAnalyzer for AudioAnalyzer {
    fn name(&self) -> &'static str {
        "audio"
    }

    async fn extract(&self, path: &Path) -> Result<ContentSignal> {
        info!("Analyzing audio: {:?}", path);

        let bytes = tokio::fs::read(path).await?;
        let transcript = bounded(
            "audio transcription",
            self.timeout,
            self.transcriber.transcribe_audio(&bytes),
        )
        .await?;

        debug!("Transcript: {} chars", transcript.chars().count());
        Ok(ContentSignal::excerpt(&transcript))
    }
}

// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Video file analyzer using label detection on sampled frames

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{ContentAnalyzer, ContentSignal};
use crate::services::{bounded, VideoLabeler};
use crate::Result;

/// Analyzer for video files
pub struct VideoAnalyzer {
    labeler: Arc<dyn VideoLabeler>,
    timeout: Duration,
}

impl VideoAnalyzer {
    pub fn new(labeler: Arc<dyn VideoLabeler>, timeout: Duration) -> Self {
        Self { labeler, timeout }
    }
}

#[async_trait]
impl ContentAnalyzer for VideoAnalyzer {
    fn name(&self) -> &'static str {
        "video"
    }

    async fn extract(&self, path: &Path) -> Result<ContentSignal> {
        info!("Analyzing video: {:?}", path);

        let bytes = tokio::fs::read(path).await?;

        // The labeler gets the bound too; the outer one covers providers that ignore it
        let labels = bounded(
            "video labeling",
            self.timeout,
            self.labeler.label_video(&bytes, self.timeout),
        )
        .await?;

        debug!("Video labels: {:?}", labels);
        Ok(ContentSignal::labels(labels))
    }
}

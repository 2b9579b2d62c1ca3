// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Image file analyzer using label detection

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{ContentAnalyzer, ContentSignal};
use crate::services::{bounded, ImageLabeler};
use crate::Result;

/// Analyzer for image files
pub struct ImageAnalyzer {
    labeler: Arc<dyn ImageLabeler>,
    timeout: Duration,
}

impl ImageAnalyzer {
    pub fn new(labeler: Arc<dyn ImageLabeler>, timeout: Duration) -> Self {
        Self { labeler, timeout }
    }
}

#[async_trait]
impl ContentAnalyzer for ImageAnalyzer {
    fn name(&self) -> &'static str {
        "image"
    }

    async fn extract(&self, path: &Path) -> Result<ContentSignal> {
        info!("Analyzing image: {:?}", path);

        let bytes = tokio::fs::read(path).await?;
        let labels = bounded(
            "image labeling",
            self.timeout,
            self.labeler.label_image(&bytes),
        )
        .await?;

        debug!("Image labels: {:?}", labels);
        Ok(ContentSignal::labels(labels))
    }
}

// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Content analyzers that turn a file into a short descriptive signal
//!
//! One analyzer exists per analyzed category. Analysis never fails the
//! pipeline: any I/O or service error is logged and replaced by the
//! `["unknown"]` signal.

pub mod audio;
pub mod document;
pub mod image;
pub mod video;

use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use crate::category::Category;
use crate::config::AppConfig;
use crate::services::Services;
use crate::Result;

/// Label-style signals keep at most this many entries
pub const MAX_LABELS: usize = 3;

/// Excerpt-style signals are cut to this many characters
pub const MAX_EXCERPT_CHARS: usize = 100;

const UNKNOWN: &str = "unknown";

/// Short ordered description of a file's content. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSignal(Vec<String>);

impl ContentSignal {
    /// The fallback signal used whenever analysis fails
    pub fn unknown() -> Self {
        Self(vec![UNKNOWN.to_string()])
    }

    /// Up to three non-blank labels in the order given
    pub fn labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let labels: Vec<String> = labels
            .into_iter()
            .map(|l| l.as_ref().trim().to_string())
            .filter(|l| !l.is_empty())
            .take(MAX_LABELS)
            .collect();

        if labels.is_empty() {
            Self::unknown()
        } else {
            Self(labels)
        }
    }

    /// A single excerpt truncated to 100 characters
    pub fn excerpt(text: &str) -> Self {
        let excerpt: String = text.trim().chars().take(MAX_EXCERPT_CHARS).collect();
        let excerpt = excerpt.trim_end();

        if excerpt.is_empty() {
            Self::unknown()
        } else {
            Self(vec![excerpt.to_string()])
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.0.len() == 1 && self.0[0] == UNKNOWN
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for ContentSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

/// Trait for content analyzers
#[async_trait]
pub trait ContentAnalyzer: Send + Sync {
    /// Name of this analyzer
    fn name(&self) -> &'static str;

    /// Produce a signal, or the error that prevented it
    async fn extract(&self, path: &Path) -> Result<ContentSignal>;

    /// Produce a signal, substituting `["unknown"]` for any failure
    async fn analyze(&self, path: &Path) -> ContentSignal {
        match self.extract(path).await {
            Ok(signal) => signal,
            Err(e) => {
                warn!(
                    analyzer = self.name(),
                    "Content analysis failed for {:?}: {}", path, e
                );
                ContentSignal::unknown()
            }
        }
    }
}

/// Category to optional analyzer mapping
#[derive(Clone)]
pub struct AnalyzerSet {
    image: Arc<dyn ContentAnalyzer>,
    video: Arc<dyn ContentAnalyzer>,
    audio: Arc<dyn ContentAnalyzer>,
    document: Arc<dyn ContentAnalyzer>,
}

impl AnalyzerSet {
    pub fn new(services: &Services, config: &AppConfig) -> Self {
        let timeouts = &config.services.timeouts;
        Self {
            image: Arc::new(image::ImageAnalyzer::new(services.images.clone(), timeouts.image())),
            video: Arc::new(video::VideoAnalyzer::new(services.videos.clone(), timeouts.video())),
            audio: Arc::new(audio::AudioAnalyzer::new(services.audio.clone(), timeouts.audio())),
            document: Arc::new(document::DocumentAnalyzer::new(
                services.documents.clone(),
                timeouts.document(),
            )),
        }
    }

    /// The analyzer for `category`, `None` for categories filed without a subfolder
    pub fn for_category(&self, category: Category) -> Option<&dyn ContentAnalyzer> {
        match category {
            Category::Images => Some(self.image.as_ref()),
            Category::Videos => Some(self.video.as_ref()),
            Category::Audio => Some(self.audio.as_ref()),
            Category::Documents => Some(self.document.as_ref()),
            Category::Archives | Category::Code | Category::Others => None,
        }
    }
}

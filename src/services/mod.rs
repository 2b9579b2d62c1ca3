// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Capability interfaces for the external inference services
//!
//! The pipeline only ever talks to these traits. Concrete providers are
//! built once at startup by [`Services::from_config`] and shared between
//! workers; tests substitute in-process fakes.

pub mod extract;
pub mod keyframes;
pub mod whisper;

use async_trait::async_trait;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::ollama::{OllamaClient, OllamaGenerator, OllamaVision};
use crate::{Result, TaxisError};

/// Single-turn short text generation
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Label detection on a still image, most confident first
#[async_trait]
pub trait ImageLabeler: Send + Sync {
    async fn label_image(&self, bytes: &[u8]) -> Result<Vec<String>>;
}

/// Label detection on a video, bounded by `timeout`
#[async_trait]
pub trait VideoLabeler: Send + Sync {
    async fn label_video(&self, bytes: &[u8], timeout: Duration) -> Result<Vec<String>>;
}

/// Speech to text
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe_audio(&self, bytes: &[u8]) -> Result<String>;
}

/// Text extraction for structured document formats
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Whether this extractor understands the file's format
    fn supports(&self, path: &Path) -> bool;

    async fn extract_document_text(&self, path: &Path) -> Result<String>;
}

/// The full set of providers the pipeline depends on
#[derive(Clone)]
pub struct Services {
    pub text: Arc<dyn TextGenerator>,
    pub images: Arc<dyn ImageLabeler>,
    pub videos: Arc<dyn VideoLabeler>,
    pub audio: Arc<dyn Transcriber>,
    pub documents: Arc<dyn DocumentExtractor>,
}

impl Services {
    /// Build the real providers. Failure here is fatal for startup.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let svc = &config.services;

        let ollama = OllamaClient::new(&svc.ollama_url, svc.timeouts.image.max(svc.timeouts.text))?;
        let vision: Arc<dyn ImageLabeler> = Arc::new(OllamaVision::new(
            ollama.clone(),
            &svc.vision_model,
            &config.prompts.image_labels,
        ));

        let keyframes = keyframes::KeyframeLabeler::new(&svc.ffmpeg_path, vision.clone());
        if !keyframes.ffmpeg_available() {
            warn!(
                "ffmpeg not found at '{}', video files will be filed without content labels",
                svc.ffmpeg_path
            );
        }

        let whisper = whisper::WhisperClient::new(
            &svc.whisper_url,
            &svc.whisper_model,
            svc.timeouts.audio,
        )?;

        info!(
            "Services: text={} vision={} transcription={}",
            svc.text_model, svc.vision_model, svc.whisper_model
        );

        Ok(Self {
            text: Arc::new(OllamaGenerator::new(ollama, &svc.text_model)),
            images: vision,
            videos: Arc::new(keyframes),
            audio: Arc::new(whisper),
            documents: Arc::new(extract::LocalExtractor::new()),
        })
    }
}

/// Run an external call with an upper time bound
pub async fn bounded<T, F>(operation: &str, limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(TaxisError::Timeout {
            operation: operation.to_string(),
            after: limit,
        }),
    }
}

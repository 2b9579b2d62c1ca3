// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Ollama API client for local AI inference

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::services::{ImageLabeler, TextGenerator};
use crate::{Result, TaxisError};

/// Longest side, in pixels, of images sent to the vision model
const MAX_IMAGE_SIDE: u32 = 1024;

/// Ollama API client
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Deserialize)]
struct ModelInfo {
    name: String,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        reqwest::Url::parse(base_url).map_err(|e| {
            TaxisError::Initialization(format!("invalid Ollama URL '{}': {}", base_url, e))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| TaxisError::Initialization(format!("HTTP client: {}", e)))?;

        // Normalize URL
        let base_url = base_url
            .trim_end_matches('/')
            .replace("/api/generate", "")
            .replace("/api/chat", "");

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if Ollama is available
    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}/api/tags", self.base_url);

        self.client
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| {
                TaxisError::ServiceUnavailable(format!(
                    "Cannot connect to Ollama at {}: {}",
                    self.base_url, e
                ))
            })?;

        Ok(())
    }

    /// List available models
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await?;

        let tags: TagsResponse = response.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Check if a specific model is available
    pub async fn model_available(&self, model: &str) -> Result<bool> {
        let models = self.list_models().await?;
        Ok(models
            .iter()
            .any(|m| m.starts_with(model) || m == &format!("{}:latest", model)))
    }

    /// Generate text completion, optionally grounded on base64 images
    pub async fn generate(
        &self,
        model: &str,
        prompt: &str,
        images: Option<Vec<String>>,
    ) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
            images,
        };

        debug!("Sending request to Ollama: model={}", model);

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(TaxisError::ServiceUnavailable(format!(
                "Ollama returned status {}",
                response.status()
            )));
        }

        let result: GenerateResponse = response.json().await?;
        Ok(result.response)
    }
}

/// Text generation through an Ollama model
pub struct OllamaGenerator {
    client: OllamaClient,
    model: String,
}

impl OllamaGenerator {
    pub fn new(client: OllamaClient, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.client.generate(&self.model, prompt, None).await
    }
}

/// Image labeling through an Ollama vision model
pub struct OllamaVision {
    client: OllamaClient,
    model: String,
    prompt: String,
}

impl OllamaVision {
    pub fn new(client: OllamaClient, model: &str, prompt: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
            prompt: prompt.to_string(),
        }
    }

    /// Downscale and re-encode as JPEG; formats the decoder can't read go
    /// through untouched.
    fn prepare_image(bytes: &[u8]) -> Vec<u8> {
        let img = match image::load_from_memory(bytes) {
            Ok(img) => img,
            Err(e) => {
                debug!("Sending image undecoded: {}", e);
                return bytes.to_vec();
            }
        };

        let img = if img.width() > MAX_IMAGE_SIDE || img.height() > MAX_IMAGE_SIDE {
            img.resize(MAX_IMAGE_SIDE, MAX_IMAGE_SIDE, image::imageops::FilterType::Triangle)
        } else {
            img
        };

        // JPEG has no alpha channel
        let img = image::DynamicImage::ImageRgb8(img.to_rgb8());

        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        match img.write_to(&mut cursor, image::ImageFormat::Jpeg) {
            Ok(()) => buffer,
            Err(e) => {
                debug!("JPEG re-encode failed, sending original: {}", e);
                bytes.to_vec()
            }
        }
    }
}

#[async_trait]
impl ImageLabeler for OllamaVision {
    async fn label_image(&self, bytes: &[u8]) -> Result<Vec<String>> {
        let encoded = general_purpose::STANDARD.encode(Self::prepare_image(bytes));
        let response = self
            .client
            .generate(&self.model, &self.prompt, Some(vec![encoded]))
            .await?;

        let labels = parse_labels(&response);
        if labels.is_empty() {
            return Err(TaxisError::Analysis(format!(
                "vision model returned no labels: {:?}",
                response
            )));
        }
        Ok(labels)
    }
}

/// Turn a free-form "a, b, c" reply into clean lowercase labels
pub fn parse_labels(raw: &str) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();

    for piece in raw.split([',', '\n', ';']) {
        let label = strip_list_marker(piece.trim())
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '.')
            .trim()
            .to_lowercase();

        if label.is_empty() || labels.contains(&label) {
            continue;
        }
        labels.push(label);
    }

    labels
}

/// "- dog", "2. dog" and "3) dog" all become "dog"; "3d printer" is left alone
fn strip_list_marker(s: &str) -> &str {
    let s = s.trim_start_matches(['-', '*', '•']).trim_start();
    let digits = s.len() - s.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0 {
        if let Some(rest) = s[digits..].strip_prefix(['.', ')']) {
            return rest.trim_start();
        }
    }
    s
}

// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Speech transcription against an OpenAI-compatible Whisper server

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::Transcriber;
use crate::{Result, TaxisError};

/// Whisper `/v1/audio/transcriptions` client
pub struct WhisperClient {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Deserialize)]
struct WhisperResponse {
    text: String,
    #[serde(default)]
    segments: Option<Vec<WhisperSegment>>,
}

#[derive(Deserialize)]
struct WhisperSegment {
    text: String,
}

impl WhisperClient {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self> {
        reqwest::Url::parse(base_url).map_err(|e| {
            TaxisError::Initialization(format!("invalid Whisper URL '{}': {}", base_url, e))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| TaxisError::Initialization(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe_audio(&self, bytes: &[u8]) -> Result<String> {
        let url = format!("{}/v1/audio/transcriptions", self.base_url);
        let (ext, mime) = sniff_audio_format(bytes);

        let part = Part::bytes(bytes.to_vec())
            .file_name(format!("audio.{}", ext))
            .mime_str(mime)?;

        let form = Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");

        debug!("Sending {} bytes of {} to Whisper", bytes.len(), mime);

        let response = self.client.post(&url).multipart(form).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TaxisError::ServiceUnavailable(format!(
                "Whisper returned {}: {}",
                status, body
            )));
        }

        let result: WhisperResponse = response.json().await?;
        Ok(join_segments(result))
    }
}

fn join_segments(result: WhisperResponse) -> String {
    match result.segments {
        Some(segments) if !segments.is_empty() => segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        _ => result.text.trim().to_string(),
    }
}

/// Guess the container from its magic bytes for the upload name and MIME type
pub fn sniff_audio_format(bytes: &[u8]) -> (&'static str, &'static str) {
    match bytes {
        [b'I', b'D', b'3', ..] => ("mp3", "audio/mpeg"),
        [0xFF, b, ..] if b & 0xE0 == 0xE0 => ("mp3", "audio/mpeg"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => ("wav", "audio/wav"),
        [b'f', b'L', b'a', b'C', ..] => ("flac", "audio/flac"),
        [b'O', b'g', b'g', b'S', ..] => ("ogg", "audio/ogg"),
        [_, _, _, _, b'f', b't', b'y', b'p', ..] => ("m4a", "audio/mp4"),
        _ => ("wav", "application/octet-stream"),
    }
}

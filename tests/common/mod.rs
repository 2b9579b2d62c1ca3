// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! In-process service fakes and sandbox helpers shared by integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use taxis::services::{
    DocumentExtractor, ImageLabeler, Services, TextGenerator, Transcriber, VideoLabeler,
};
use taxis::watcher::FileEvent;
use taxis::{AppConfig, Result, TaxisError};

/// Answers every prompt with the same text and remembers the prompts
pub struct ScriptedText {
    reply: Option<&'static str>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedText {
    pub fn replying(reply: &'static str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl TextGenerator for ScriptedText {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.reply {
            Some(reply) => Ok(reply.to_string()),
            None => Err(TaxisError::Generation("model crashed".to_string())),
        }
    }
}

pub struct FixedLabels(pub &'static [&'static str]);

#[async_trait]
impl ImageLabeler for FixedLabels {
    async fn label_image(&self, _bytes: &[u8]) -> Result<Vec<String>> {
        Ok(self.0.iter().map(|s| s.to_string()).collect())
    }
}

#[async_trait]
impl VideoLabeler for FixedLabels {
    async fn label_video(&self, _bytes: &[u8], _timeout: Duration) -> Result<Vec<String>> {
        Ok(self.0.iter().map(|s| s.to_string()).collect())
    }
}

pub struct FailingLabels;

#[async_trait]
impl ImageLabeler for FailingLabels {
    async fn label_image(&self, _bytes: &[u8]) -> Result<Vec<String>> {
        Err(TaxisError::ServiceUnavailable("vision offline".to_string()))
    }
}

/// Never answers
pub struct SilentLabels;

#[async_trait]
impl ImageLabeler for SilentLabels {
    async fn label_image(&self, _bytes: &[u8]) -> Result<Vec<String>> {
        std::future::pending().await
    }
}

pub struct FixedTranscript(pub &'static str);

#[async_trait]
impl Transcriber for FixedTranscript {
    async fn transcribe_audio(&self, _bytes: &[u8]) -> Result<String> {
        Ok(self.0.to_string())
    }
}

/// Supports nothing, so every document is read as plain text
pub struct PlainTextOnly;

#[async_trait]
impl DocumentExtractor for PlainTextOnly {
    fn supports(&self, _path: &Path) -> bool {
        false
    }

    async fn extract_document_text(&self, path: &Path) -> Result<String> {
        Err(TaxisError::Analysis(format!("unsupported: {:?}", path)))
    }
}

pub fn services(text: Arc<dyn TextGenerator>) -> Services {
    Services {
        text,
        images: Arc::new(FixedLabels(&["sunset", "beach", "ocean"])),
        videos: Arc::new(FixedLabels(&["concert", "stage"])),
        audio: Arc::new(FixedTranscript("Minutes of the board meeting")),
        documents: Arc::new(PlainTextOnly),
    }
}

/// Inbox, destination root and journal inside a temp directory
pub struct Sandbox {
    pub dir: TempDir,
    pub config: AppConfig,
}

impl Sandbox {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.watch_dir = dir.path().join("inbox");
        config.destination_root = dir.path().join("organized");
        config.settle.delay_ms = 0;
        config.history.path = dir.path().join("history.jsonl");
        config.logging.file = None;
        std::fs::create_dir_all(&config.watch_dir).unwrap();
        Self { dir, config }
    }

    pub fn root(&self) -> &Path {
        &self.config.destination_root
    }

    /// Write a file into the inbox and return its arrival event
    pub fn arrive(&self, name: &str, body: &[u8]) -> FileEvent {
        let path = self.config.watch_dir.join(name);
        std::fs::write(&path, body).unwrap();
        FileEvent::new(path)
    }

    pub fn inbox_path(&self, name: &str) -> PathBuf {
        self.config.watch_dir.join(name)
    }
}

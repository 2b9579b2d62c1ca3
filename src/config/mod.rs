// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for Taxis

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::category::Category;

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Inbox directory to watch for new files
    #[serde(default = "default_watch_dir")]
    pub watch_dir: PathBuf,

    /// Root under which category folders are created
    #[serde(default = "default_destination_root")]
    pub destination_root: PathBuf,

    /// Maximum number of files processed at the same time
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Feed files already sitting in the inbox through the pipeline at startup
    #[serde(default)]
    pub process_existing: bool,

    #[serde(default)]
    pub settle: SettleConfig,

    /// Glob patterns for file names that are never processed
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,

    /// Extra or overriding extension mappings
    #[serde(default)]
    pub extensions: BTreeMap<String, Category>,

    #[serde(default)]
    pub services: ServiceConfig,

    #[serde(default)]
    pub prompts: PromptConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SettleConfig {
    #[serde(default = "default_settle_ms")]
    pub delay_ms: u64,
    /// Poll file size until it stops changing after the fixed delay
    #[serde(default)]
    pub wait_for_stable: bool,
    #[serde(default = "default_stable_wait")]
    pub max_wait_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,
    #[serde(default = "default_text_model")]
    pub text_model: String,
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
    #[serde(default = "default_whisper_url")]
    pub whisper_url: String,
    #[serde(default = "default_whisper_model")]
    pub whisper_model: String,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: String,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// Upper bounds, in seconds, for each kind of external call
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TimeoutConfig {
    #[serde(default = "default_text_timeout")]
    pub text: u64,
    #[serde(default = "default_image_timeout")]
    pub image: u64,
    #[serde(default = "default_video_timeout")]
    pub video: u64,
    #[serde(default = "default_audio_timeout")]
    pub audio: u64,
    #[serde(default = "default_document_timeout")]
    pub document: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptConfig {
    /// Subfolder instruction; `{content}` and `{existing}` are substituted
    #[serde(default = "default_subfolder_prompt")]
    pub subfolder: String,
    #[serde(default = "default_image_labels_prompt")]
    pub image_labels: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Plain-text log file written alongside stdout
    #[serde(default = "default_log_file")]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_history_path")]
    pub path: PathBuf,
}

// Default value functions
fn default_watch_dir() -> PathBuf { PathBuf::from("./inbox") }
fn default_destination_root() -> PathBuf { PathBuf::from("./organized") }
fn default_workers() -> usize { 4 }
fn default_settle_ms() -> u64 { 1000 }
fn default_stable_wait() -> u64 { 10 }
fn default_ollama_url() -> String { "http://localhost:11434".to_string() }
fn default_text_model() -> String { "llama3.2:3b".to_string() }
fn default_vision_model() -> String { "moondream".to_string() }
fn default_whisper_url() -> String { "http://localhost:8000".to_string() }
fn default_whisper_model() -> String { "Systran/faster-whisper-small".to_string() }
fn default_ffmpeg() -> String { "ffmpeg".to_string() }
fn default_text_timeout() -> u64 { 30 }
fn default_image_timeout() -> u64 { 60 }
fn default_video_timeout() -> u64 { 120 }
fn default_audio_timeout() -> u64 { 300 }
fn default_document_timeout() -> u64 { 60 }
fn default_log_file() -> Option<PathBuf> { Some(PathBuf::from("file_organization.log")) }
fn default_history_path() -> PathBuf { PathBuf::from("taxis_history.jsonl") }
fn default_true() -> bool { true }

fn default_ignore_patterns() -> Vec<String> {
    [
        ".*", "*.tmp", "*.part", "*.crdownload", "*.partial", "*.download",
        "*.metadata.json", "desktop.ini", "Thumbs.db",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_subfolder_prompt() -> String {
    "A file with the following content needs to be filed into a subfolder.\n\
     Content: {content}\n\
     Existing subfolders: {existing}\n\
     Reply with ONE folder name of at most 20 characters. Reuse an existing \
     subfolder if it fits the content, otherwise propose a new short name. \
     Return ONLY the folder name."
        .to_string()
}

fn default_image_labels_prompt() -> String {
    "List the three most prominent subjects of this image as short lowercase \
     labels, most prominent first, separated by commas. Return ONLY the labels."
        .to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            watch_dir: default_watch_dir(),
            destination_root: default_destination_root(),
            workers: default_workers(),
            process_existing: false,
            settle: SettleConfig::default(),
            ignore_patterns: default_ignore_patterns(),
            extensions: BTreeMap::new(),
            services: ServiceConfig::default(),
            prompts: PromptConfig::default(),
            logging: LoggingConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_settle_ms(),
            wait_for_stable: false,
            max_wait_secs: default_stable_wait(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            ollama_url: default_ollama_url(),
            text_model: default_text_model(),
            vision_model: default_vision_model(),
            whisper_url: default_whisper_url(),
            whisper_model: default_whisper_model(),
            ffmpeg_path: default_ffmpeg(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            text: default_text_timeout(),
            image: default_image_timeout(),
            video: default_video_timeout(),
            audio: default_audio_timeout(),
            document: default_document_timeout(),
        }
    }
}

impl TimeoutConfig {
    pub fn text(&self) -> Duration { Duration::from_secs(self.text) }
    pub fn image(&self) -> Duration { Duration::from_secs(self.image) }
    pub fn video(&self) -> Duration { Duration::from_secs(self.video) }
    pub fn audio(&self) -> Duration { Duration::from_secs(self.audio) }
    pub fn document(&self) -> Duration { Duration::from_secs(self.document) }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            subfolder: default_subfolder_prompt(),
            image_labels: default_image_labels_prompt(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { file: default_log_file() }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_history_path(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::TaxisError::Config(format!("Failed to parse config: {}", e)))?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        use crate::TaxisError::Config;

        if self.workers == 0 {
            return Err(Config("workers must be at least 1".to_string()));
        }

        let watch = normalize(&self.watch_dir);
        let root = normalize(&self.destination_root);
        if watch == root {
            return Err(Config(format!(
                "watch_dir and destination_root are the same directory: {:?}",
                self.watch_dir
            )));
        }
        if root.starts_with(&watch) {
            return Err(Config(format!(
                "destination_root {:?} must not be inside watch_dir {:?}",
                self.destination_root, self.watch_dir
            )));
        }

        for pattern in &self.ignore_patterns {
            glob::Pattern::new(pattern)
                .map_err(|e| Config(format!("invalid ignore pattern '{}': {}", pattern, e)))?;
        }

        let t = &self.services.timeouts;
        if [t.text, t.image, t.video, t.audio, t.document].contains(&0) {
            return Err(Config("service timeouts must be greater than zero".to_string()));
        }

        Ok(())
    }
}

/// Lexically clean a path so that `./a` and `a/` compare equal
fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

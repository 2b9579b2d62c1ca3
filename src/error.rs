// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for Taxis

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for Taxis operations
pub type Result<T> = std::result::Result<T, TaxisError>;

/// Taxis error types
#[derive(Error, Debug)]
pub enum TaxisError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("API error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Service not available: {0}")]
    ServiceUnavailable(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("{operation} timed out after {}s", .after.as_secs_f64())]
    Timeout { operation: String, after: Duration },

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Destination already occupied: {0:?}")]
    DestinationOccupied(PathBuf),

    #[error("Source file missing: {0:?}")]
    SourceMissing(PathBuf),

    #[error("Path has no usable file name: {0:?}")]
    InvalidPath(PathBuf),

    #[error("Undo refused for {path:?}: {reason}")]
    UndoRefused { path: PathBuf, reason: String },
}

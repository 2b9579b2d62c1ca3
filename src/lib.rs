// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Taxis: inbox watcher that files new documents by type and content
//!
//! Every file that lands in the watched directory is classified by extension,
//! described by a local inference service where its category supports it,
//! given a subfolder name negotiated against the folders that already exist,
//! and moved to `{root}/{Category}/[{subfolder}/]{name}` with a
//! `.metadata.json` sidecar next to it.

pub mod analyzers;
pub mod category;
pub mod config;
pub mod error;
pub mod history;
pub mod metadata;
pub mod negotiator;
pub mod ollama;
pub mod pipeline;
pub mod placement;
pub mod services;
pub mod watcher;

pub use category::{Categorizer, Category};
pub use config::AppConfig;
pub use error::{Result, TaxisError};
pub use pipeline::{IntakeOrchestrator, Outcome};

// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Metadata sidecar written next to every placed file

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::category::Category;
use crate::Result;

const SIDECAR_SUFFIX: &str = ".metadata.json";

/// Audit record of one placement decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub original_path: PathBuf,
    pub category: Category,
    pub destination_path: PathBuf,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subfolder: Option<String>,
}

/// `{destination}.metadata.json`
pub fn sidecar_path(destination: &Path) -> PathBuf {
    let mut name = OsString::from(destination.as_os_str());
    name.push(SIDECAR_SUFFIX);
    PathBuf::from(name)
}

/// Read a sidecar back
pub fn read_record(path: &Path) -> Result<MetadataRecord> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataEmitter;

impl MetadataEmitter {
    pub fn new() -> Self {
        Self
    }

    /// Write the sidecar for a completed move.
    ///
    /// Returns the sidecar path, or `None` if it could not be written. A
    /// failed write is logged and otherwise ignored; the move stands.
    pub fn emit(
        &self,
        original_path: &Path,
        category: Category,
        destination_path: &Path,
        subfolder: Option<&str>,
    ) -> Option<PathBuf> {
        let record = MetadataRecord {
            original_path: original_path.to_path_buf(),
            category,
            destination_path: destination_path.to_path_buf(),
            timestamp: Utc::now(),
            subfolder: subfolder.map(String::from),
        };
        let path = sidecar_path(destination_path);

        match Self::write(&record, &path) {
            Ok(()) => {
                debug!("Wrote metadata {:?}", path);
                Some(path)
            }
            Err(e) => {
                warn!(
                    "Failed to write metadata for {:?} ({}): {}",
                    destination_path, category, e
                );
                None
            }
        }
    }

    fn write(record: &MetadataRecord, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(record)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Placement journal for undo support

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::category::Category;
use crate::metadata::sidecar_path;
use crate::placement::move_file;
use crate::{Result, TaxisError};

/// A single placement in history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub original_path: PathBuf,
    pub destination_path: PathBuf,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subfolder: Option<String>,
    pub file_hash: String,
    #[serde(default)]
    pub undone: bool,
}

/// JSONL journal of placements. Appends from concurrent workers are serialized.
pub struct History {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl History {
    /// Create a new history manager
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// Append an entry to the history
    pub fn append(&self, entry: &HistoryEntry) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let json = serde_json::to_string(entry)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }

    /// Read all history entries
    pub fn read_all(&self) -> Result<Vec<HistoryEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);

        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!("Failed to parse history entry: {}", e);
                }
            }
        }

        Ok(entries)
    }

    /// Get the most recent N entries (newest first)
    pub fn get_recent(&self, count: usize) -> Result<Vec<HistoryEntry>> {
        let mut entries = self.read_all()?;
        entries.reverse();
        entries.truncate(count);
        Ok(entries)
    }

    /// Mark an entry as undone
    pub fn mark_undone(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let entries = self.read_all()?;

        // Rewrite the entire file with the updated entry
        let file = File::create(&self.path)?;
        let mut writer = std::io::BufWriter::new(file);

        for mut entry in entries {
            if entry.id == id {
                entry.undone = true;
            }
            let json = serde_json::to_string(&entry)?;
            writeln!(writer, "{}", json)?;
        }
        writer.flush()?;

        Ok(())
    }

    /// Get entries that haven't been undone, oldest first
    pub fn get_undoable(&self) -> Result<Vec<HistoryEntry>> {
        let entries = self.read_all()?;
        Ok(entries.into_iter().filter(|e| !e.undone).collect())
    }

    /// Clear all history
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    /// Get history file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Create a new history entry for a file that now lives at `destination_path`
pub fn create_entry(
    original_path: PathBuf,
    destination_path: PathBuf,
    category: Category,
    subfolder: Option<String>,
) -> Result<HistoryEntry> {
    let file_hash = hash_file(&destination_path)?;
    Ok(HistoryEntry {
        id: uuid::Uuid::new_v4().to_string(),
        timestamp: Utc::now(),
        original_path,
        destination_path,
        category,
        subfolder,
        file_hash,
        undone: false,
    })
}

/// BLAKE3 of a file's contents, hex encoded
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}

/// Why an entry cannot be undone
pub fn check_undoable(entry: &HistoryEntry) -> std::result::Result<(), String> {
    if !entry.destination_path.exists() {
        return Err("file not found, may have been moved/deleted".to_string());
    }
    if entry.original_path.exists() {
        return Err("original path already exists".to_string());
    }
    match hash_file(&entry.destination_path) {
        Ok(hash) if hash == entry.file_hash => Ok(()),
        Ok(_) => Err("file changed since it was placed".to_string()),
        Err(e) => Err(format!("cannot read file: {}", e)),
    }
}

/// Move a placed file back to where it came from and drop its metadata sidecar
pub fn undo_entry(entry: &HistoryEntry) -> Result<()> {
    check_undoable(entry).map_err(|reason| TaxisError::UndoRefused {
        path: entry.destination_path.clone(),
        reason,
    })?;

    if let Some(parent) = entry.original_path.parent() {
        fs::create_dir_all(parent)?;
    }
    move_file(&entry.destination_path, &entry.original_path)?;

    let sidecar = sidecar_path(&entry.destination_path);
    if sidecar.exists() {
        fs::remove_file(&sidecar)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placed(dir: &Path) -> HistoryEntry {
        let dest_dir = dir.join("out/Documents/misc");
        fs::create_dir_all(&dest_dir).unwrap();
        let dest = dest_dir.join("notes.txt");
        fs::write(&dest, b"shopping list").unwrap();
        fs::write(sidecar_path(&dest), b"{}").unwrap();

        create_entry(
            dir.join("inbox/notes.txt"),
            dest,
            Category::Documents,
            Some("misc".to_string()),
        )
        .unwrap()
    }

    #[test]
    fn test_append_and_read_recent() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::new(dir.path().join("history.jsonl"));

        let first = placed(dir.path());
        let mut second = first.clone();
        second.id = "second".to_string();
        history.append(&first).unwrap();
        history.append(&second).unwrap();

        let recent = history.get_recent(1).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, "second");
        assert_eq!(history.read_all().unwrap().len(), 2);
    }

    #[test]
    fn test_mark_undone_filters_undoable() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::new(dir.path().join("history.jsonl"));
        let entry = placed(dir.path());
        history.append(&entry).unwrap();

        history.mark_undone(&entry.id).unwrap();
        assert!(history.get_undoable().unwrap().is_empty());
        assert!(history.read_all().unwrap()[0].undone);
    }

    #[test]
    fn test_undo_moves_file_back() {
        let dir = tempfile::tempdir().unwrap();
        let entry = placed(dir.path());

        undo_entry(&entry).unwrap();

        assert_eq!(fs::read(&entry.original_path).unwrap(), b"shopping list");
        assert!(!entry.destination_path.exists());
        assert!(!sidecar_path(&entry.destination_path).exists());
    }

    #[test]
    fn test_undo_refuses_modified_file() {
        let dir = tempfile::tempdir().unwrap();
        let entry = placed(dir.path());
        fs::write(&entry.destination_path, b"edited since").unwrap();

        assert!(check_undoable(&entry).is_err());
        assert!(undo_entry(&entry).is_err());
        assert!(entry.destination_path.exists());
    }

    #[test]
    fn test_undo_refuses_occupied_original() {
        let dir = tempfile::tempdir().unwrap();
        let entry = placed(dir.path());
        fs::create_dir_all(entry.original_path.parent().unwrap()).unwrap();
        fs::write(&entry.original_path, b"new arrival").unwrap();

        assert_eq!(
            check_undoable(&entry).unwrap_err(),
            "original path already exists"
        );
    }
}

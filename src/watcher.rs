// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! File system watcher for the inbox directory

use chrono::{DateTime, Utc};
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::Result;

/// A new file seen in the inbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub source_path: PathBuf,
    pub detected_at: DateTime<Utc>,
}

impl FileEvent {
    pub fn new(source_path: PathBuf) -> Self {
        Self {
            source_path,
            detected_at: Utc::now(),
        }
    }
}

/// Events emitted by the watcher
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// A file appeared, by creation or by being moved in
    Created(FileEvent),
    /// A directory appeared; never processed
    DirectoryCreated(PathBuf),
    /// Watcher error
    Error(String),
}

/// File system watcher
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    event_tx: UnboundedSender<notify::Result<Event>>,
    event_rx: UnboundedReceiver<notify::Result<Event>>,
}

impl FileWatcher {
    /// Create a new file watcher
    pub fn new() -> Result<Self> {
        let (tx, rx) = unbounded_channel();

        let config = Config::default().with_poll_interval(Duration::from_secs(2));

        let callback_tx = tx.clone();
        let watcher = RecommendedWatcher::new(
            move |res| {
                // Receiver gone means we are shutting down
                let _ = callback_tx.send(res);
            },
            config,
        )?;

        Ok(Self {
            watcher,
            event_tx: tx,
            event_rx: rx,
        })
    }

    /// Add a directory to watch
    pub fn watch(&mut self, path: &Path) -> Result<()> {
        // Create directory if it doesn't exist
        if !path.exists() {
            std::fs::create_dir_all(path)?;
            info!("Created watch directory: {:?}", path);
        }

        self.watcher.watch(path, RecursiveMode::NonRecursive)?;
        info!("Watching: {:?}", path);

        Ok(())
    }

    /// Queue a creation event for every file already in `dir`
    pub fn queue_existing(&self, dir: &Path) -> Result<usize> {
        let mut queued = 0;
        for entry in std::fs::read_dir(dir)?.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let event = Event::new(EventKind::Create(CreateKind::File)).add_path(path);
            if self.event_tx.send(Ok(event)).is_ok() {
                queued += 1;
            }
        }
        info!("Queued {} existing file(s) from {:?}", queued, dir);
        Ok(queued)
    }

    /// Wait for the next batch of events; `None` once the watcher is gone
    pub async fn next_events(&mut self) -> Option<Vec<WatchEvent>> {
        match self.event_rx.recv().await? {
            Ok(event) => Some(convert_event(event)),
            Err(e) => Some(vec![WatchEvent::Error(e.to_string())]),
        }
    }
}

/// Convert a notify event to our event type
pub fn convert_event(event: Event) -> Vec<WatchEvent> {
    let arrived: Vec<PathBuf> = match event.kind {
        EventKind::Create(CreateKind::Folder) => {
            return event
                .paths
                .into_iter()
                .map(WatchEvent::DirectoryCreated)
                .collect();
        }
        EventKind::Create(_) => event.paths,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths,
        // Both paths of a rename pair; the second one is where the file is now
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.into_iter().skip(1).collect()
        }
        _ => return Vec::new(),
    };

    arrived
        .into_iter()
        .map(|path| {
            if path.is_dir() {
                WatchEvent::DirectoryCreated(path)
            } else {
                WatchEvent::Created(FileEvent::new(path))
            }
        })
        .collect()
}

/// Compiled ignore rules
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    patterns: Vec<glob::Pattern>,
}

impl IgnoreRules {
    /// Invalid patterns are skipped with a warning; `AppConfig::validate` reports them
    pub fn new(patterns: &[String]) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|p| match glob::Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!("Ignoring invalid pattern '{}': {}", p, e);
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    /// Check if a file should be processed. Names that are not valid UTF-8
    /// are matched lossily.
    pub fn should_process(&self, path: &Path) -> bool {
        let filename = match path.file_name() {
            Some(n) => n.to_string_lossy(),
            None => {
                warn!("No file name in {:?}, processing anyway", path);
                return true;
            }
        };

        let options = glob::MatchOptions {
            case_sensitive: false,
            ..Default::default()
        };

        if let Some(pattern) = self
            .patterns
            .iter()
            .find(|p| p.matches_with(&filename, options))
        {
            debug!("Skipping {:?} (matches '{}')", path, pattern);
            return false;
        }

        true
    }
}

/// Wait for file to be stable (not being written)
pub async fn wait_for_stable(path: &Path, max_wait: Duration) -> bool {
    let check_interval = Duration::from_millis(500);
    let start = tokio::time::Instant::now();

    let mut last_size = match tokio::fs::metadata(path).await {
        Ok(m) => m.len(),
        Err(_) => return false,
    };

    loop {
        tokio::time::sleep(check_interval).await;

        // Check if we've exceeded max wait time
        if start.elapsed() > max_wait {
            warn!("File stability check timed out for {:?}", path);
            return true; // Proceed anyway
        }

        // Check if file still exists
        let current_size = match tokio::fs::metadata(path).await {
            Ok(m) => m.len(),
            Err(_) => return false, // File was deleted
        };

        // If size hasn't changed, file is stable
        if current_size == last_size {
            return true;
        }

        last_size = current_size;
        debug!("File {:?} still being written, size: {}", path, current_size);
    }
}

// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Intake orchestrator: one pipeline per arriving file
//!
//! `Detected -> Settling -> Classified -> (Analyzing -> Negotiating ->)
//! Placing -> Completed`, or `Failed` once placement has been attempted or
//! the file vanished while settling. Pipelines for different files run
//! concurrently up to the worker limit; the stages of one pipeline run in
//! order on a single task.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::analyzers::AnalyzerSet;
use crate::category::{Categorizer, Category};
use crate::config::{AppConfig, SettleConfig};
use crate::history::{create_entry, History};
use crate::metadata::MetadataEmitter;
use crate::negotiator::SubfolderNegotiator;
use crate::placement::PlacementResolver;
use crate::services::Services;
use crate::watcher::{wait_for_stable, FileEvent, FileWatcher, IgnoreRules, WatchEvent};
use crate::TaxisError;

/// Pipeline stage of a single event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Detected,
    Settling,
    Classified,
    Analyzing,
    Negotiating,
    Placing,
    Completed,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Detected => "detected",
            Stage::Settling => "settling",
            Stage::Classified => "classified",
            Stage::Analyzing => "analyzing",
            Stage::Negotiating => "negotiating",
            Stage::Placing => "placing",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A file that reached its destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub category: Category,
    pub subfolder: Option<String>,
    /// `None` when the sidecar could not be written
    pub metadata_path: Option<PathBuf>,
}

/// Terminal result of one event
#[derive(Debug)]
pub enum Outcome {
    Completed(Placement),
    /// The event was abandoned; the file stays where it is
    Failed { stage: Stage, error: TaxisError },
    /// Ignored name or a directory
    Skipped,
}

/// Tally of outcomes from [`IntakeOrchestrator::run`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunSummary {
    fn record(&mut self, joined: std::result::Result<Outcome, JoinError>) {
        match joined {
            Ok(Outcome::Completed(_)) => self.completed += 1,
            Ok(Outcome::Failed { .. }) => self.failed += 1,
            Ok(Outcome::Skipped) => self.skipped += 1,
            Err(e) => {
                error!("Intake task ended abnormally: {}", e);
                self.failed += 1;
            }
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} filed, {} failed, {} skipped",
            self.completed, self.failed, self.skipped
        )
    }
}

/// Anything that yields watcher events
#[async_trait]
pub trait EventSource: Send {
    /// Next batch of events; `None` when the source is exhausted
    async fn next_events(&mut self) -> Option<Vec<WatchEvent>>;
}

#[async_trait]
impl EventSource for FileWatcher {
    async fn next_events(&mut self) -> Option<Vec<WatchEvent>> {
        FileWatcher::next_events(self).await
    }
}

#[async_trait]
impl EventSource for UnboundedReceiver<WatchEvent> {
    async fn next_events(&mut self) -> Option<Vec<WatchEvent>> {
        self.recv().await.map(|event| vec![event])
    }
}

/// Sequences the per-file pipeline and owns every component it uses
pub struct IntakeOrchestrator {
    categorizer: Categorizer,
    analyzers: AnalyzerSet,
    negotiator: SubfolderNegotiator,
    placement: PlacementResolver,
    metadata: MetadataEmitter,
    history: Option<Arc<History>>,
    ignore: IgnoreRules,
    settle: SettleConfig,
}

impl IntakeOrchestrator {
    pub fn new(config: &AppConfig, services: &Services) -> Self {
        let history = config
            .history
            .enabled
            .then(|| Arc::new(History::new(config.history.path.clone())));

        Self {
            categorizer: Categorizer::with_overrides(&config.extensions),
            analyzers: AnalyzerSet::new(services, config),
            negotiator: SubfolderNegotiator::new(
                config.destination_root.clone(),
                services.text.clone(),
                &config.prompts.subfolder,
                config.services.timeouts.text(),
            ),
            placement: PlacementResolver::new(config.destination_root.clone()),
            metadata: MetadataEmitter::new(),
            history,
            ignore: IgnoreRules::new(&config.ignore_patterns),
            settle: config.settle.clone(),
        }
    }

    /// Skip the settle delay, for files that are known to be complete
    pub fn without_settle(mut self) -> Self {
        self.settle.delay_ms = 0;
        self.settle.wait_for_stable = false;
        self
    }

    /// Run one event through the pipeline. Never panics on bad input and
    /// never returns an error; failures are logged and reported in the outcome.
    pub async fn handle(&self, event: FileEvent) -> Outcome {
        let span = info_span!(
            "intake",
            id = %uuid::Uuid::new_v4(),
            path = %event.source_path.display()
        );
        self.process(event).instrument(span).await
    }

    async fn process(&self, event: FileEvent) -> Outcome {
        let source = event.source_path;
        debug!(stage = %Stage::Detected, "Event detected at {}", event.detected_at);

        if !self.ignore.should_process(&source) {
            return Outcome::Skipped;
        }
        if source.is_dir() {
            debug!("Ignoring directory");
            return Outcome::Skipped;
        }

        debug!(stage = %Stage::Settling, "Waiting {}ms", self.settle.delay_ms);
        if self.settle.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.settle.delay_ms)).await;
        }
        if self.settle.wait_for_stable
            && !wait_for_stable(&source, Duration::from_secs(self.settle.max_wait_secs)).await
        {
            warn!("File vanished while settling: {:?}", source);
            return Outcome::Failed {
                stage: Stage::Settling,
                error: TaxisError::SourceMissing(source),
            };
        }

        let category = self.categorizer.classify(&source);
        debug!(stage = %Stage::Classified, %category);

        let subfolder = match self.analyzers.for_category(category) {
            Some(analyzer) => {
                debug!(stage = %Stage::Analyzing, analyzer = analyzer.name());
                let signal = analyzer.analyze(&source).await;

                debug!(stage = %Stage::Negotiating, signal = %signal);
                Some(self.negotiator.suggest(category, &signal).await)
            }
            None => None,
        };

        debug!(stage = %Stage::Placing, subfolder = ?subfolder);
        let destination = match self
            .placement
            .place(source.clone(), category, subfolder.clone())
            .await
        {
            Ok(destination) => destination,
            Err(e) => {
                error!(
                    stage = %Stage::Failed,
                    %category,
                    "Placement failed for {:?}: {}", source, e
                );
                return Outcome::Failed {
                    stage: Stage::Placing,
                    error: e,
                };
            }
        };

        let metadata_path = self
            .metadata
            .emit(&source, category, &destination, subfolder.as_deref());
        self.record_history(&source, &destination, category, subfolder.as_deref())
            .await;

        info!(stage = %Stage::Completed, "Filed {:?} -> {:?}", source, destination);

        Outcome::Completed(Placement {
            source,
            destination,
            category,
            subfolder,
            metadata_path,
        })
    }

    /// Hashes the placed file, so it runs on the blocking pool
    async fn record_history(
        &self,
        source: &Path,
        destination: &Path,
        category: Category,
        subfolder: Option<&str>,
    ) {
        let Some(history) = &self.history else {
            return;
        };

        let history = history.clone();
        let original = source.to_path_buf();
        let placed = destination.to_path_buf();
        let subfolder = subfolder.map(String::from);
        let result = tokio::task::spawn_blocking(move || {
            create_entry(original, placed, category, subfolder)
                .and_then(|entry| history.append(&entry))
        })
        .await
        .unwrap_or_else(|e| Err(e.into()));

        if let Err(e) = result {
            warn!("Failed to record history for {:?}: {}", destination, e);
        }
    }

    /// Consume events until the source ends or shutdown is signalled, then
    /// wait for every pipeline already started to finish.
    pub async fn run<S: EventSource>(
        self: Arc<Self>,
        mut source: S,
        mut shutdown: watch::Receiver<bool>,
        workers: usize,
    ) -> RunSummary {
        let permits = Arc::new(Semaphore::new(workers.max(1)));
        let mut tasks = JoinSet::new();
        let mut summary = RunSummary::default();

        while !*shutdown.borrow() {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        debug!("Shutdown sender dropped");
                        break;
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    summary.record(joined);
                }
                events = source.next_events() => {
                    let Some(events) = events else {
                        debug!("Event source closed");
                        break;
                    };
                    for event in events {
                        match event {
                            WatchEvent::Created(file) => {
                                let this = self.clone();
                                let permits = permits.clone();
                                tasks.spawn(async move {
                                    let _permit = permits.acquire_owned().await.ok();
                                    this.handle(file).await
                                });
                            }
                            WatchEvent::DirectoryCreated(path) => {
                                debug!("Ignoring new directory {:?}", path);
                            }
                            WatchEvent::Error(e) => warn!("Watch error: {}", e),
                        }
                    }
                }
            }
        }

        if !tasks.is_empty() {
            info!("Waiting for {} in-flight file(s)...", tasks.len());
        }
        while let Some(joined) = tasks.join_next().await {
            summary.record(joined);
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::testing::{Broken, Extracted, Labels, Transcript};
    use crate::services::TextGenerator;
    use crate::Result;
    use tokio::sync::{mpsc, Notify};

    struct Reply(&'static str);

    #[async_trait]
    impl TextGenerator for Reply {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    /// Signals when called, then takes a while to answer
    struct Slow {
        started: Arc<Notify>,
    }

    #[async_trait]
    impl TextGenerator for Slow {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            self.started.notify_one();
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok("late".to_string())
        }
    }

    fn services(text: Arc<dyn TextGenerator>) -> Services {
        Services {
            text,
            images: Arc::new(Labels(vec!["cat"])),
            videos: Arc::new(Broken),
            audio: Arc::new(Transcript("hello")),
            documents: Arc::new(Extracted("report")),
        }
    }

    fn config(dir: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.watch_dir = dir.join("inbox");
        config.destination_root = dir.join("out");
        config.settle.delay_ms = 0;
        config.history.path = dir.join("history.jsonl");
        std::fs::create_dir_all(&config.watch_dir).unwrap();
        config
    }

    fn drop_in(config: &AppConfig, name: &str) -> FileEvent {
        let path = config.watch_dir.join(name);
        std::fs::write(&path, b"some text content").unwrap();
        FileEvent::new(path)
    }

    #[tokio::test]
    async fn test_ignored_and_directories_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let orchestrator = IntakeOrchestrator::new(&config, &services(Arc::new(Reply("x"))));

        let hidden = drop_in(&config, ".DS_Store");
        assert!(matches!(orchestrator.handle(hidden).await, Outcome::Skipped));

        let folder = config.watch_dir.join("album");
        std::fs::create_dir(&folder).unwrap();
        assert!(matches!(
            orchestrator.handle(FileEvent::new(folder)).await,
            Outcome::Skipped
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_utf8_name_is_filed() {
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let orchestrator = IntakeOrchestrator::new(&config, &services(Arc::new(Reply("menus"))));

        let name = std::ffi::OsStr::from_bytes(b"caf\xe9_menu.txt");
        let path = config.watch_dir.join(name);
        std::fs::write(&path, b"soup of the day").unwrap();

        let Outcome::Completed(placement) = orchestrator.handle(FileEvent::new(path.clone())).await
        else {
            panic!("expected completion");
        };
        assert!(!path.exists());
        assert_eq!(
            placement.destination,
            config.destination_root.join("Documents/menus").join(name)
        );
    }

    #[tokio::test]
    async fn test_vanished_while_settling() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.settle.wait_for_stable = true;
        let orchestrator = IntakeOrchestrator::new(&config, &services(Arc::new(Reply("x"))));

        let event = FileEvent::new(config.watch_dir.join("gone.txt"));
        match orchestrator.handle(event).await {
            Outcome::Failed { stage, error } => {
                assert_eq!(stage, Stage::Settling);
                assert!(matches!(error, TaxisError::SourceMissing(_)));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_completed_placement_is_journaled() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let orchestrator = IntakeOrchestrator::new(&config, &services(Arc::new(Reply("Notes"))));

        let outcome = orchestrator.handle(drop_in(&config, "todo.txt")).await;
        let Outcome::Completed(placement) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(placement.subfolder.as_deref(), Some("notes"));

        let entries = History::new(config.history.path.clone()).read_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].destination_path, placement.destination);
    }

    #[tokio::test]
    async fn test_run_drains_closed_source() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let orchestrator =
            Arc::new(IntakeOrchestrator::new(&config, &services(Arc::new(Reply("misc")))));

        let (tx, rx) = mpsc::unbounded_channel();
        for name in ["a.txt", "b.zip", ".hidden"] {
            tx.send(WatchEvent::Created(drop_in(&config, name))).unwrap();
        }
        tx.send(WatchEvent::DirectoryCreated(config.watch_dir.join("sub")))
            .unwrap();
        drop(tx);

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let summary = orchestrator.run(rx, shutdown_rx, 2).await;

        assert_eq!(
            summary,
            RunSummary {
                completed: 2,
                failed: 0,
                skipped: 1
            }
        );
        assert!(config.destination_root.join("Archives/b.zip").is_file());
    }

    #[tokio::test]
    async fn test_shutdown_lets_in_flight_pipeline_finish() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let started = Arc::new(Notify::new());
        let slow = Slow {
            started: started.clone(),
        };
        let orchestrator = Arc::new(IntakeOrchestrator::new(&config, &services(Arc::new(slow))));

        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let run = tokio::spawn(orchestrator.run(rx, shutdown_rx, 1));

        tx.send(WatchEvent::Created(drop_in(&config, "memo.txt"))).unwrap();
        started.notified().await;
        shutdown_tx.send(true).unwrap();

        let summary = run.await.unwrap();
        assert_eq!(summary.completed, 1);
        assert!(config
            .destination_root
            .join("Documents/late/memo.txt")
            .is_file());
    }
}

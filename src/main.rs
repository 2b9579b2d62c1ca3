// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Taxis: inbox watcher that files new documents by type and content

use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use taxis::history::{check_undoable, undo_entry, History};
use taxis::ollama::{OllamaClient, OllamaVision};
use taxis::pipeline::{IntakeOrchestrator, Outcome};
use taxis::services::keyframes::KeyframeLabeler;
use taxis::services::Services;
use taxis::watcher::{FileEvent, FileWatcher};
use taxis::{AppConfig, Categorizer, Category, Result, TaxisError};

/// Taxis CLI - files new documents by type and content
#[derive(Parser, Debug)]
#[command(name = "taxis")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version = "1.0.0")]
#[command(about = "Inbox watcher that files new documents by type and content", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace-level logging
    #[arg(long, global = true)]
    trace: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch the inbox and file everything that arrives
    Watch {
        /// Inbox directory (overrides config)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Destination root (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of files processed at the same time (overrides config)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Skip the Ollama availability check
        #[arg(long)]
        skip_health_check: bool,

        /// File everything already in the inbox before watching
        #[arg(long)]
        process_existing: bool,
    },

    /// File the given files once, without waiting for them to settle
    Sort {
        /// Files to file
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Destination root (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the category each path would be filed under
    Classify {
        /// Paths to classify; without any, the extension table is shown
        paths: Vec<PathBuf>,

        /// Limit the extension table to one category
        #[arg(long)]
        category: Option<Category>,
    },

    /// Placement history
    History {
        #[command(subcommand)]
        action: HistoryCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Check services and show configuration
    Status,

    /// Create a config file plus inbox and destination directories
    Init {
        /// Directory to initialize in
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Overwrite an existing config.json
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryCommands {
    /// Show recent placements
    List {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,
    },

    /// Move recently filed files back to the inbox
    Undo {
        /// Number of placements to undo
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,

        /// Show what would be undone
        #[arg(long)]
        dry_run: bool,
    },

    /// Clear all history
    Clear {
        /// Confirm clearing
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate a default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = AppConfig::load(&cli.config)?;

    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    // Only the filing commands write the log file
    let log_file = match cli.command {
        None | Some(Commands::Watch { .. }) | Some(Commands::Sort { .. }) => {
            config.logging.file.as_deref()
        }
        _ => None,
    };
    init_tracing(filter, log_file)?;

    match cli.command {
        Some(Commands::Watch {
            dir,
            output,
            workers,
            skip_health_check,
            process_existing,
        }) => {
            run_watch(config, dir, output, workers, skip_health_check, process_existing).await
        }
        Some(Commands::Sort { files, output }) => run_sort(config, files, output).await,
        Some(Commands::Classify { paths, category }) => {
            run_classify(&config, &paths, category);
            Ok(())
        }
        Some(Commands::History { action }) => run_history_command(&config, action),
        Some(Commands::Config { action }) => run_config_command(config, action, &cli.config),
        Some(Commands::Status) => run_status(config).await,
        Some(Commands::Init { dir, force }) => run_init(dir, force),
        None => {
            // Default: run watch mode
            run_watch(config, None, None, None, false, false).await
        }
    }
}

/// Log to stdout, and in plain text to `log_file` when given
fn init_tracing(filter: &str, log_file: Option<&Path>) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    Ok(())
}

/// Run the watch mode (main intake loop)
async fn run_watch(
    mut config: AppConfig,
    dir: Option<PathBuf>,
    output: Option<PathBuf>,
    workers: Option<usize>,
    skip_health_check: bool,
    process_existing: bool,
) -> Result<()> {
    if let Some(dir) = dir {
        config.watch_dir = dir;
    }
    if let Some(output) = output {
        config.destination_root = output;
    }
    if let Some(workers) = workers {
        config.workers = workers;
    }
    config.validate()?;

    info!("Taxis v1.0.0");
    info!("Inbox: {:?}", config.watch_dir);
    info!("Destination root: {:?}", config.destination_root);

    // Initialize components
    let services = Services::from_config(&config)?;

    if !skip_health_check {
        info!("Checking Ollama availability...");
        let client = OllamaClient::new(&config.services.ollama_url, config.services.timeouts.text)?;
        client.health_check().await?;
        info!("Ollama is running");

        for model in [&config.services.text_model, &config.services.vision_model] {
            match client.model_available(model).await {
                Ok(true) => info!("Model '{}' available", model),
                Ok(false) => warn!("Model '{}' not found. Try: ollama pull {}", model, model),
                Err(e) => warn!("Could not list Ollama models: {}", e),
            }
        }
    } else {
        warn!("Skipping Ollama health check");
    }

    std::fs::create_dir_all(&config.destination_root)?;

    // Setup file watcher
    let mut watcher = FileWatcher::new()?;
    watcher.watch(&config.watch_dir)?;

    if process_existing || config.process_existing {
        info!("Processing existing files...");
        watcher.queue_existing(&config.watch_dir)?;
    }

    // Setup graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(wait_for_shutdown(shutdown_tx));

    let orchestrator = Arc::new(IntakeOrchestrator::new(&config, &services));

    info!("Taxis active with {} worker(s). Press Ctrl+C to stop.", config.workers);
    info!("Waiting for files...");

    let summary = orchestrator.run(watcher, shutdown_rx, config.workers).await;

    info!("Taxis stopped: {}", summary);
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM and flips the shutdown flag
async fn wait_for_shutdown(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, finishing in-flight files..."),
        _ = terminate => info!("Received SIGTERM, finishing in-flight files..."),
    }

    let _ = shutdown_tx.send(true);
}

/// File the given paths once
async fn run_sort(mut config: AppConfig, files: Vec<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    if let Some(output) = output {
        config.destination_root = output;
    }
    config.validate()?;

    let services = Services::from_config(&config)?;
    let orchestrator = IntakeOrchestrator::new(&config, &services).without_settle();

    let mut failed = 0;
    for file in files {
        match orchestrator.handle(FileEvent::new(file.clone())).await {
            Outcome::Completed(placement) => {
                println!("{} -> {}", file.display(), placement.destination.display());
            }
            Outcome::Failed { stage, error } => {
                eprintln!("{}: failed while {}: {}", file.display(), stage, error);
                failed += 1;
            }
            Outcome::Skipped => println!("{}: skipped", file.display()),
        }
    }

    if failed > 0 {
        warn!("{} file(s) could not be filed", failed);
    }
    Ok(())
}

/// Print the category for each path, or the extension table
fn run_classify(config: &AppConfig, paths: &[PathBuf], only: Option<Category>) {
    let categorizer = Categorizer::with_overrides(&config.extensions);

    if paths.is_empty() {
        for category in Category::ALL {
            if only.is_some_and(|c| c != category) {
                continue;
            }
            let exts = categorizer.extensions_for(category);
            if exts.is_empty() {
                println!("{:<10} (everything else)", category.as_str());
            } else {
                println!("{:<10} {}", category.as_str(), exts.join(" "));
            }
        }
        return;
    }

    for path in paths {
        let category = categorizer.classify(path);
        let note = if category.is_analyzed() {
            " (content analyzed)"
        } else {
            ""
        };
        println!("{}\t{}{}", path.display(), category, note);
    }
}

/// Run history commands
fn run_history_command(config: &AppConfig, action: HistoryCommands) -> Result<()> {
    let history = History::new(config.history.path.clone());

    match action {
        HistoryCommands::List { count } => {
            let entries = history.get_recent(count)?;
            println!("Recent history ({} entries):", entries.len());
            for entry in entries {
                let status = if entry.undone { "[UNDONE]" } else { "" };
                println!(
                    "  {} [{}] {} -> {} {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M"),
                    entry.category,
                    entry.original_path.display(),
                    entry.destination_path.display(),
                    status
                );
            }
        }
        HistoryCommands::Undo { count, dry_run } => {
            let entries = history.get_undoable()?;
            let to_undo: Vec<_> = entries.into_iter().rev().take(count).collect();

            if to_undo.is_empty() {
                println!("No placements to undo");
                return Ok(());
            }

            for entry in to_undo {
                if dry_run {
                    match check_undoable(&entry) {
                        Ok(()) => println!(
                            "Would undo: {} -> {}",
                            entry.destination_path.display(),
                            entry.original_path.display()
                        ),
                        Err(reason) => {
                            println!("Would skip: {} ({})", entry.destination_path.display(), reason)
                        }
                    }
                    continue;
                }

                match undo_entry(&entry) {
                    Ok(()) => {
                        history.mark_undone(&entry.id)?;
                        println!(
                            "Undone: {} -> {}",
                            entry.destination_path.display(),
                            entry.original_path.display()
                        );
                    }
                    Err(e) => warn!("{}", e),
                }
            }
        }
        HistoryCommands::Clear { force } => {
            if !force {
                eprintln!("Use --force to confirm clearing history");
                return Ok(());
            }
            history.clear()?;
            println!("History cleared");
        }
    }

    Ok(())
}

/// Run config commands
fn run_config_command(config: AppConfig, action: ConfigCommands, config_path: &Path) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        ConfigCommands::Generate { output } => {
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            config.validate()?;
            println!("Configuration at {:?} is valid", config_path);
            println!("  Inbox: {:?}", config.watch_dir);
            println!("  Destination root: {:?}", config.destination_root);
            println!("  Workers: {}", config.workers);
            println!("  Text model: {}", config.services.text_model);
            println!("  Vision model: {}", config.services.vision_model);
        }
    }

    Ok(())
}

/// Run status check
async fn run_status(config: AppConfig) -> Result<()> {
    let svc = &config.services;
    let client = OllamaClient::new(&svc.ollama_url, svc.timeouts.text)?;

    println!("Taxis v1.0.0 Status");
    println!("===================");

    // Check Ollama
    match client.health_check().await {
        Ok(()) => println!("Ollama: Running ({})", client.base_url()),
        Err(e) => println!("Ollama: Error - {}", e),
    }

    // List models
    match client.list_models().await {
        Ok(models) => {
            println!("\nAvailable models:");
            for m in &models {
                let marker = if m.starts_with(svc.text_model.as_str())
                    || m.starts_with(svc.vision_model.as_str())
                {
                    "→"
                } else {
                    " "
                };
                println!("  {} {}", marker, m);
            }
        }
        Err(e) => println!("  Error listing models: {}", e),
    }

    let vision = OllamaVision::new(client.clone(), &svc.vision_model, &config.prompts.image_labels);
    let keyframes = KeyframeLabeler::new(&svc.ffmpeg_path, Arc::new(vision));
    println!(
        "\nffmpeg: {}",
        if keyframes.ffmpeg_available() {
            "available"
        } else {
            "not found (videos filed without content labels)"
        }
    );

    if config.history.enabled {
        let history = History::new(config.history.path.clone());
        match history.read_all() {
            Ok(entries) => {
                let undoable = entries.iter().filter(|e| !e.undone).count();
                println!("\nHistory ({:?}):", history.path());
                println!("  Placements: {}", entries.len());
                println!("  Undoable: {}", undoable);
            }
            Err(e) => println!("\nHistory: Error - {}", e),
        }
    }

    println!("\nConfiguration:");
    println!("  Inbox: {:?}", config.watch_dir);
    println!("  Destination root: {:?}", config.destination_root);
    println!("  Workers: {}", config.workers);
    println!("  Text model: {}", svc.text_model);
    println!("  Vision model: {}", svc.vision_model);
    println!("  Transcription: {} ({})", svc.whisper_model, svc.whisper_url);

    Ok(())
}

/// Initialize a new Taxis setup
fn run_init(dir: Option<PathBuf>, force: bool) -> Result<()> {
    let target = dir.unwrap_or_else(|| PathBuf::from("."));
    let config_path = target.join("config.json");

    if config_path.exists() && !force {
        return Err(TaxisError::Config(
            "config.json already exists. Use --force to overwrite".to_string(),
        ));
    }

    // Create directories
    let watch_dir = target.join("inbox");
    let destination_root = target.join("organized");
    std::fs::create_dir_all(&watch_dir)?;
    std::fs::create_dir_all(&destination_root)?;

    // Create default config
    let config = AppConfig {
        watch_dir,
        destination_root,
        ..AppConfig::default()
    };
    config.save(&config_path)?;

    println!("Taxis initialized in {:?}", target);
    println!("\nCreated:");
    println!("  - config.json");
    println!("  - inbox/");
    println!("  - organized/");
    println!("\nNext steps:");
    println!("  1. Start Ollama and pull the models named in config.json");
    println!("  2. Start watching: taxis watch");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["taxis"]).unwrap();
        assert!(!cli.verbose);
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("config.json"));
    }

    #[test]
    fn test_cli_watch_command() {
        let cli = Cli::try_parse_from([
            "taxis", "watch", "--dir", "/tmp/inbox", "--workers", "8", "--process-existing",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Watch {
                dir,
                workers,
                process_existing,
                skip_health_check,
                ..
            }) => {
                assert_eq!(dir, Some(PathBuf::from("/tmp/inbox")));
                assert_eq!(workers, Some(8));
                assert!(process_existing);
                assert!(!skip_health_check);
            }
            _ => panic!("Expected Watch command"),
        }
    }

    #[test]
    fn test_cli_sort_requires_files() {
        assert!(Cli::try_parse_from(["taxis", "sort"]).is_err());

        let cli = Cli::try_parse_from(["taxis", "sort", "a.jpg", "b.pdf", "-o", "/srv/out"]).unwrap();
        match cli.command {
            Some(Commands::Sort { files, output }) => {
                assert_eq!(files.len(), 2);
                assert_eq!(output, Some(PathBuf::from("/srv/out")));
            }
            _ => panic!("Expected Sort command"),
        }
    }

    #[test]
    fn test_cli_classify_category_filter() {
        let cli = Cli::try_parse_from(["taxis", "classify", "--category", "images"]).unwrap();
        match cli.command {
            Some(Commands::Classify { paths, category }) => {
                assert!(paths.is_empty());
                assert_eq!(category, Some(Category::Images));
            }
            _ => panic!("Expected Classify command"),
        }
        assert!(Cli::try_parse_from(["taxis", "classify", "--category", "pictures"]).is_err());
    }

    #[test]
    fn test_cli_history_undo() {
        let cli = Cli::try_parse_from(["taxis", "history", "undo", "-n", "3", "--dry-run"]).unwrap();
        match cli.command {
            Some(Commands::History {
                action: HistoryCommands::Undo { count, dry_run },
            }) => {
                assert_eq!(count, 3);
                assert!(dry_run);
            }
            _ => panic!("Expected history undo"),
        }
    }

    #[test]
    fn test_init_writes_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        run_init(Some(dir.path().to_path_buf()), false).unwrap();

        let config = AppConfig::load(&dir.path().join("config.json")).unwrap();
        assert!(config.validate().is_ok());
        assert!(dir.path().join("inbox").is_dir());
        assert!(dir.path().join("organized").is_dir());

        assert!(run_init(Some(dir.path().to_path_buf()), false).is_err());
        assert!(run_init(Some(dir.path().to_path_buf()), true).is_ok());
    }
}

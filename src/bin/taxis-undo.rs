// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Taxis Undo Utility
//!
//! Moves filed documents back to where they arrived, newest first.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use taxis::history::{check_undoable, undo_entry, History};

#[derive(Parser, Debug)]
#[command(name = "taxis-undo")]
#[command(version = "1.0.0")]
#[command(about = "Undo Taxis placements")]
struct Args {
    /// Path to history file
    #[arg(short = 'f', long, default_value = "taxis_history.jsonl")]
    history_file: PathBuf,

    /// Number of placements to undo (default: 1, use 0 for all)
    #[arg(short, long, default_value = "1")]
    count: usize,

    /// Dry run - show what would be undone without doing it
    #[arg(long)]
    dry_run: bool,

    /// List all entries in history
    #[arg(long)]
    list: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if !args.history_file.exists() {
        eprintln!("History file not found: {:?}", args.history_file);
        eprintln!("No placements to undo.");
        return Ok(());
    }

    let history = History::new(args.history_file.clone());
    let entries = history
        .read_all()
        .with_context(|| format!("reading {:?}", args.history_file))?;

    if entries.is_empty() {
        println!("No history entries found.");
        return Ok(());
    }

    if args.list {
        println!("Placement History ({} entries):", entries.len());
        println!("{:-<80}", "");
        for (i, entry) in entries.iter().rev().enumerate() {
            println!(
                "{:3}. [{}] {} -> {}{}",
                i + 1,
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.original_path.display(),
                entry.destination_path.display(),
                if entry.undone { " [UNDONE]" } else { "" }
            );
            match &entry.subfolder {
                Some(sub) => println!("     {} / {}", entry.category, sub),
                None => println!("     {}", entry.category),
            }
        }
        return Ok(());
    }

    // Most recent first
    let pending: Vec<_> = entries.into_iter().filter(|e| !e.undone).rev().collect();

    let count = if args.count == 0 {
        pending.len()
    } else {
        args.count.min(pending.len())
    };

    println!(
        "{}Undoing {} placement(s)...",
        if args.dry_run { "[DRY RUN] " } else { "" },
        count
    );

    let mut undone = 0;
    let mut skipped = 0;

    for entry in pending.iter().take(count) {
        if let Err(reason) = check_undoable(entry) {
            eprintln!("  Skip: {} ({})", entry.destination_path.display(), reason);
            skipped += 1;
            continue;
        }

        if args.dry_run {
            println!(
                "  Would move: {} -> {}",
                entry.destination_path.display(),
                entry.original_path.display()
            );
            continue;
        }

        match undo_entry(entry) {
            Ok(()) => {
                history
                    .mark_undone(&entry.id)
                    .with_context(|| format!("updating {:?}", args.history_file))?;
                println!(
                    "  Undone: {} -> {}",
                    entry.destination_path.display(),
                    entry.original_path.display()
                );
                undone += 1;
            }
            Err(e) => {
                eprintln!("  Failed: {} ({})", entry.destination_path.display(), e);
                skipped += 1;
            }
        }
    }

    println!();
    if args.dry_run {
        println!(
            "Dry run complete. {} placement(s) would be undone.",
            count - skipped
        );
    } else {
        println!("Done. {} undone, {} failed/skipped.", undone, skipped);
    }

    Ok(())
}

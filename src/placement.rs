// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Destination resolution and the move into `{root}/{category}/[{subfolder}/]{name}`

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::category::Category;
use crate::{Result, TaxisError};

/// Places files under the destination root.
///
/// Destinations currently being moved into are claimed so that two events
/// resolving to the same path cannot both succeed; no other locking is done.
#[derive(Clone)]
pub struct PlacementResolver {
    root: PathBuf,
    in_flight: Arc<Mutex<HashSet<PathBuf>>>,
}

impl PlacementResolver {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// `{root}/{category}` or `{root}/{category}/{subfolder}`
    pub fn destination_dir(&self, category: Category, subfolder: Option<&str>) -> PathBuf {
        let dir = self.root.join(category.as_str());
        match subfolder {
            Some(sub) => dir.join(sub),
            None => dir,
        }
    }

    /// Create the destination directory and move `source` into it.
    ///
    /// An occupied destination is an error; nothing is overwritten or renamed.
    pub fn resolve_and_move(
        &self,
        source: &Path,
        category: Category,
        subfolder: Option<&str>,
    ) -> Result<PathBuf> {
        let name = source
            .file_name()
            .ok_or_else(|| TaxisError::InvalidPath(source.to_path_buf()))?;

        if !source.is_file() {
            return Err(TaxisError::SourceMissing(source.to_path_buf()));
        }

        let dir = self.destination_dir(category, subfolder);
        fs::create_dir_all(&dir)?;
        let destination = dir.join(name);

        let _claim = self
            .claim(&destination)
            .ok_or_else(|| TaxisError::DestinationOccupied(destination.clone()))?;

        if destination.exists() {
            return Err(TaxisError::DestinationOccupied(destination));
        }

        match move_file(source, &destination) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(TaxisError::DestinationOccupied(destination));
            }
            Err(e) => return Err(e.into()),
        }
        info!("Moved {:?} -> {:?}", source, destination);

        Ok(destination)
    }

    /// [`resolve_and_move`](Self::resolve_and_move) on the blocking pool, since
    /// a cross-filesystem move copies the whole file
    pub async fn place(
        &self,
        source: PathBuf,
        category: Category,
        subfolder: Option<String>,
    ) -> Result<PathBuf> {
        let resolver = self.clone();
        tokio::task::spawn_blocking(move || {
            resolver.resolve_and_move(&source, category, subfolder.as_deref())
        })
        .await?
    }

    fn claim(&self, destination: &Path) -> Option<Claim> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        if in_flight.insert(destination.to_path_buf()) {
            Some(Claim {
                in_flight: self.in_flight.clone(),
                path: destination.to_path_buf(),
            })
        } else {
            None
        }
    }
}

/// Releases a destination claim on drop
struct Claim {
    in_flight: Arc<Mutex<HashSet<PathBuf>>>,
    path: PathBuf,
}

impl Drop for Claim {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        in_flight.remove(&self.path);
    }
}

/// Move without ever replacing an existing `destination`.
///
/// Links then unlinks, so an occupied destination fails with `AlreadyExists`
/// even if it appeared after the caller checked. Falls back to copy-then-delete
/// across filesystems or where hard links are unsupported.
pub(crate) fn move_file(source: &Path, destination: &Path) -> io::Result<()> {
    move_via(source, destination, |from, to| fs::hard_link(from, to))
}

fn move_via<L>(source: &Path, destination: &Path, link: L) -> io::Result<()>
where
    L: FnOnce(&Path, &Path) -> io::Result<()>,
{
    match link(source, destination) {
        Ok(()) => {
            if let Err(e) = fs::remove_file(source) {
                let _ = fs::remove_file(destination);
                return Err(e);
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(e),
        Err(e) => {
            if is_cross_device(&e) {
                debug!("Cross-filesystem move, copying {:?}", source);
            } else {
                debug!("Hard link failed ({}), copying {:?}", e, source);
            }
            copy_new(source, destination)?;
            fs::remove_file(source)
        }
    }
}

/// Copy into a file that must not already exist
fn copy_new(source: &Path, destination: &Path) -> io::Result<()> {
    let mut reader = fs::File::open(source)?;
    let mut writer = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)?;

    if let Err(e) = io::copy(&mut reader, &mut writer).and_then(|_| writer.sync_all()) {
        let _ = fs::remove_file(destination);
        return Err(e);
    }

    if let Ok(meta) = reader.metadata() {
        let _ = fs::set_permissions(destination, meta.permissions());
    }
    Ok(())
}

#[cfg(unix)]
fn is_cross_device(e: &io::Error) -> bool {
    // EXDEV
    e.raw_os_error() == Some(18)
}

#[cfg(windows)]
fn is_cross_device(e: &io::Error) -> bool {
    // ERROR_NOT_SAME_DEVICE
    e.raw_os_error() == Some(17)
}

#[cfg(not(any(unix, windows)))]
fn is_cross_device(_e: &io::Error) -> bool {
    false
}

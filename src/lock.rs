// src/lock.rs

//! Exclusive lock between a sync pass and repository edits
//!
//! A sync holds this lock for its entire duration. Adding, removing, enabling
//! or disabling a repository only try-locks it and fails with
//! [`Error::ConflictError`] while a sync runs. Catalog readers never take it;
//! they rely on SQLite transactions instead.
//!
//! # Example
//!
//! ```ignore
//! use fdroid_sync::lock::SyncLock;
//!
//! let lock = SyncLock::acquire(&config.lock_path())?;
//! engine.sync(&mut conn)?;
//! // Lock released on drop
//! ```

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Exclusive `flock` on the sync lock file
pub struct SyncLock {
    /// Kept open to maintain the lock
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl SyncLock {
    /// Acquire the lock, blocking until the current holder releases it
    pub fn acquire<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_lock_file(&path)?;

        file.lock_exclusive()
            .map_err(|e| Error::IoError(format!("Failed to acquire sync lock: {e}")))?;

        info!("Acquired sync lock at {:?}", path);
        Ok(Self { file, path })
    }

    /// Try to acquire the lock without blocking
    ///
    /// Returns:
    /// - `Ok(Some(lock))` if the lock was acquired
    /// - `Ok(None)` if a sync currently holds it
    /// - `Err` on I/O errors
    pub fn try_acquire<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref().to_path_buf();
        let file = open_lock_file(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("Acquired sync lock at {:?}", path);
                Ok(Some(Self { file, path }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                debug!("Sync lock already held at {:?}", path);
                Ok(None)
            }
            Err(e) => Err(Error::IoError(format!(
                "Failed to try-acquire sync lock: {e}"
            ))),
        }
    }

    /// Acquire the lock for a repository edit, failing if a sync is running
    pub fn for_edit<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::try_acquire(path)?.ok_or_else(|| {
            Error::ConflictError("A sync is in progress; try again when it finishes".into())
        })
    }

    /// Path to the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SyncLock {
    fn drop(&mut self) {
        // Released when the file handle closes
        debug!("Released sync lock at {:?}", self.path);
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(File::create(path)?)
}

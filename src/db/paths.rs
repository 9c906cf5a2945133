// src/db/paths.rs
//! Path derivation for files kept next to the catalog database

use std::path::{Path, PathBuf};

/// Get the directory containing the database
pub fn db_dir(db_path: &str) -> PathBuf {
    Path::new(db_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf()
}

/// Get the sync lock file guarding catalog writes
pub fn lock_path(db_path: &str) -> PathBuf {
    db_dir(db_path).join("sync.lock")
}

// src/repository/management.rs

//! Repository management operations
//!
//! Functions for adding, removing and enabling/disabling repositories. Each
//! one takes the sync lock without blocking and fails with a conflict while
//! a sync pass is running.

use crate::db::models::{App, Repository};
use crate::error::{Error, Result};
use crate::lock::SyncLock;
use rusqlite::Connection;
use std::path::Path;
use tracing::info;
use url::Url;

/// Settings for a repository being added
#[derive(Debug, Clone, Default)]
pub struct NewRepository {
    pub name: String,
    pub address: String,
    /// Signing-certificate fingerprint to pin up front
    pub fingerprint: Option<String>,
    pub priority: i32,
    /// Add the repository without syncing it
    pub disabled: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub mirrors: Vec<String>,
}

impl NewRepository {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            ..Default::default()
        }
    }
}

/// Normalize a user-supplied fingerprint to lowercase hex
///
/// Colons and whitespace, as printed by keytool and openssl, are dropped.
pub fn normalize_fingerprint(fingerprint: &str) -> Result<String> {
    let normalized: String = fingerprint
        .chars()
        .filter(|c| *c != ':' && !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    if normalized.is_empty()
        || normalized.len() % 2 != 0
        || !normalized.chars().all(|c| c.is_ascii_hexdigit())
    {
        return Err(Error::ConfigError(format!(
            "Invalid certificate fingerprint '{fingerprint}'"
        )));
    }
    Ok(normalized)
}

fn validate_address(address: &str) -> Result<()> {
    if address.trim().is_empty() {
        return Err(Error::ConfigError("Repository address is empty".into()));
    }
    match Url::parse(address) {
        Ok(url) if matches!(url.scheme(), "http" | "https" | "file") => Ok(()),
        Ok(url) => Err(Error::ConfigError(format!(
            "Unsupported repository scheme '{}'",
            url.scheme()
        ))),
        // Plain filesystem path
        Err(_) => Ok(()),
    }
}

/// Add a new repository to the database
pub fn add_repository(conn: &Connection, lock_path: &Path, new: NewRepository) -> Result<Repository> {
    let _lock = SyncLock::for_edit(lock_path)?;

    if new.name.trim().is_empty() {
        return Err(Error::ConfigError("Repository name is empty".into()));
    }
    validate_address(&new.address)?;

    // Check if repository with this name already exists
    if Repository::find_by_name(conn, &new.name)?.is_some() {
        return Err(Error::ConflictError(format!(
            "Repository '{}' already exists",
            new.name
        )));
    }

    let mut repo = Repository::new(new.name, new.address);
    repo.fingerprint = new
        .fingerprint
        .as_deref()
        .map(normalize_fingerprint)
        .transpose()?;
    repo.priority = new.priority;
    repo.enabled = !new.disabled;
    repo.username = new.username;
    repo.password = new.password;
    for mirror in new.mirrors {
        validate_address(&mirror)?;
        repo.mirrors.push(mirror);
    }

    repo.insert(conn)?;

    info!("Added repository: {} ({})", repo.name, repo.address);
    Ok(repo)
}

/// Remove a repository together with everything only it published
///
/// Returns the number of apps that disappeared from the catalog.
pub fn remove_repository(conn: &mut Connection, lock_path: &Path, name: &str) -> Result<usize> {
    let _lock = SyncLock::for_edit(lock_path)?;

    let repo = Repository::find_by_name(conn, name)?
        .ok_or_else(|| Error::NotFoundError(format!("Repository '{name}' not found")))?;
    let repo_id = repo.require_id()?;

    let removed = crate::db::transaction(conn, |tx| {
        Repository::delete(tx, repo_id)?;
        App::delete_unreferenced(tx)
    })?;

    info!("Removed repository: {} ({} apps removed)", name, removed);
    Ok(removed)
}

/// Enable or disable a repository
///
/// Disabling flips the flag and forgets the stored ETag; the next sync
/// removes the repository's entries from the catalog, and re-enabling
/// fetches the full index again.
pub fn set_repository_enabled(
    conn: &Connection,
    lock_path: &Path,
    name: &str,
    enabled: bool,
) -> Result<()> {
    let _lock = SyncLock::for_edit(lock_path)?;

    let mut repo = Repository::find_by_name(conn, name)?
        .ok_or_else(|| Error::NotFoundError(format!("Repository '{name}' not found")))?;

    repo.enabled = enabled;
    if !enabled {
        repo.last_etag = None;
    }
    repo.update(conn)?;

    info!(
        "Repository '{}' {}",
        name,
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

/// List repositories in processing order
pub fn list_repositories(conn: &Connection) -> Result<Vec<Repository>> {
    Repository::list_all(conn)
}

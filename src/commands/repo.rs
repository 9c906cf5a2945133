// src/commands/repo.rs
//! Repository management commands

use anyhow::Result;
use fdroid_sync::SyncConfig;
use fdroid_sync::db::models::Version;
use fdroid_sync::repository::{self, NewRepository};
use tracing::info;

/// Add a new repository
pub fn cmd_repo_add(config: &SyncConfig, new: NewRepository) -> Result<()> {
    info!("Adding repository: {} ({})", new.name, new.address);
    let conn = fdroid_sync::db::open(&config.db_path)?;
    let repo = repository::add_repository(&conn, &config.lock_path(), new)?;
    println!("Added repository: {}", repo.name);
    println!("  Address: {}", repo.address);
    println!("  Enabled: {}", repo.enabled);
    println!("  Priority: {}", repo.priority);
    match &repo.fingerprint {
        Some(fingerprint) => println!("  Fingerprint: {}", fingerprint),
        None => println!("  Fingerprint: trusted on first sync"),
    }
    Ok(())
}

/// List repositories
pub fn cmd_repo_list(config: &SyncConfig) -> Result<()> {
    let conn = fdroid_sync::db::open(&config.db_path)?;
    let repos = repository::list_repositories(&conn)?;

    if repos.is_empty() {
        println!("No repositories configured");
        return Ok(());
    }

    println!("Repositories:");
    for repo in repos {
        let enabled_mark = if repo.enabled { "[x]" } else { "[ ]" };
        let sync_status = repo
            .last_updated
            .as_ref()
            .map(|ts| format!("synced {}", ts))
            .unwrap_or_else(|| "never synced".to_string());
        let versions = match repo.id {
            Some(id) => Version::count_for_repo(&conn, id)?,
            None => 0,
        };
        println!(
            "  {} {} (priority: {}, {}, {} versions)",
            enabled_mark, repo.name, repo.priority, sync_status, versions
        );
        println!("      {}", repo.address);
        if let Some(fingerprint) = &repo.fingerprint {
            println!("      signed by {}", fingerprint);
        }
    }
    Ok(())
}

/// Remove a repository
pub fn cmd_repo_remove(config: &SyncConfig, name: &str) -> Result<()> {
    info!("Removing repository: {}", name);
    let mut conn = fdroid_sync::db::open(&config.db_path)?;
    let removed = repository::remove_repository(&mut conn, &config.lock_path(), name)?;
    println!("Removed repository: {} ({} apps removed)", name, removed);
    Ok(())
}

/// Enable a repository
pub fn cmd_repo_enable(config: &SyncConfig, name: &str) -> Result<()> {
    let conn = fdroid_sync::db::open(&config.db_path)?;
    repository::set_repository_enabled(&conn, &config.lock_path(), name, true)?;
    println!("Enabled repository: {}", name);
    Ok(())
}

/// Disable a repository
pub fn cmd_repo_disable(config: &SyncConfig, name: &str) -> Result<()> {
    let conn = fdroid_sync::db::open(&config.db_path)?;
    repository::set_repository_enabled(&conn, &config.lock_path(), name, false)?;
    println!("Disabled repository: {}", name);
    println!("Its apps will be removed from the catalog at the next sync");
    Ok(())
}

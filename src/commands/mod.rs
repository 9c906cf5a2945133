// src/commands/mod.rs
//! Command handlers for the fdroid-sync CLI

mod catalog;
mod repo;
mod sync;

// Re-export all command handlers
pub use catalog::{cmd_ignore, cmd_init, cmd_updates, cmd_verify};
pub use repo::{cmd_repo_add, cmd_repo_disable, cmd_repo_enable, cmd_repo_list, cmd_repo_remove};
pub use sync::cmd_sync;

use anyhow::Result;
use fdroid_sync::SyncConfig;
use std::path::Path;

/// Load the config file, if any, and apply a command-line database path
pub fn load_config(config_path: Option<&str>, db_path: Option<String>) -> Result<SyncConfig> {
    let mut config = match config_path {
        Some(path) => SyncConfig::load(Path::new(path))?,
        None => SyncConfig::default(),
    };
    if let Some(db_path) = db_path {
        config.db_path = db_path;
    }
    Ok(config)
}

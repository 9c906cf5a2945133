// src/db/schema.rs

//! Database schema definitions and migrations for the catalog
//!
//! This module defines the SQLite schema for repositories, applications and
//! versions and provides a migration system to evolve the schema over time.

use crate::error::{Error, Result};
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the schema version tracking table
fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    Ok(version)
}

/// Set the schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Apply all pending migrations to bring the database up to date
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    debug!("Current schema version: {}", current_version);

    if current_version >= SCHEMA_VERSION {
        debug!("Schema is up to date");
        return Ok(());
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying migration to version {}", version);
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    info!("Schema migration complete. Now at version {}", SCHEMA_VERSION);
    Ok(())
}

/// Apply a specific migration version
fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        _ => Err(Error::InitError(format!(
            "Unknown migration version: {version}"
        ))),
    }
}

/// Initial schema - Version 1
///
/// - repositories: configured sources with trust and revalidation state
/// - apps: one row per package name, merged across repositories
/// - versions: one row per (package, version code, repository)
fn migrate_v1(conn: &Connection) -> Result<()> {
    debug!("Creating schema version 1");

    conn.execute_batch(
        "
        CREATE TABLE repositories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            address TEXT NOT NULL,
            fingerprint TEXT,
            last_etag TEXT,
            last_updated TEXT,
            index_timestamp INTEGER NOT NULL DEFAULT 0,
            enabled INTEGER NOT NULL DEFAULT 1,
            priority INTEGER NOT NULL DEFAULT 0,
            username TEXT,
            password TEXT,
            mirrors TEXT NOT NULL DEFAULT '[]',
            description TEXT,
            icon TEXT,
            max_age INTEGER NOT NULL DEFAULT 0,
            index_version INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX idx_repositories_priority ON repositories(priority);

        -- Applications are global: the same package from several
        -- repositories is one row; repo_id names the metadata source.
        CREATE TABLE apps (
            package_name TEXT PRIMARY KEY,
            repo_id INTEGER,
            name TEXT,
            summary TEXT,
            description TEXT,
            icon TEXT,
            license TEXT,
            author_name TEXT,
            author_email TEXT,
            web_site TEXT,
            source_code TEXT,
            issue_tracker TEXT,
            changelog TEXT,
            donate TEXT,
            categories TEXT NOT NULL DEFAULT '[]',
            anti_features TEXT NOT NULL DEFAULT '[]',
            suggested_version_name TEXT,
            suggested_version_code INTEGER NOT NULL DEFAULT 0,
            added TEXT,
            last_updated TEXT,
            ignore_all_updates INTEGER NOT NULL DEFAULT 0,
            ignore_this_update INTEGER NOT NULL DEFAULT 0,
            installed_version_code INTEGER NOT NULL DEFAULT 0,
            installed_signer TEXT,
            has_update INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (repo_id) REFERENCES repositories(id) ON DELETE SET NULL
        );

        CREATE INDEX idx_apps_repo_id ON apps(repo_id);

        CREATE TABLE versions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            package_name TEXT NOT NULL,
            version_code INTEGER NOT NULL,
            version_name TEXT,
            repo_id INTEGER NOT NULL,
            apk_name TEXT,
            size INTEGER NOT NULL DEFAULT 0,
            hash_type TEXT,
            hash TEXT,
            signer TEXT,
            min_sdk INTEGER NOT NULL DEFAULT 0,
            target_sdk INTEGER NOT NULL DEFAULT 0,
            max_sdk INTEGER NOT NULL DEFAULT 0,
            native_code TEXT NOT NULL DEFAULT '[]',
            permissions TEXT NOT NULL DEFAULT '[]',
            features TEXT NOT NULL DEFAULT '[]',
            src_name TEXT,
            added TEXT,
            UNIQUE(package_name, version_code, repo_id),
            FOREIGN KEY (package_name) REFERENCES apps(package_name) ON DELETE CASCADE,
            FOREIGN KEY (repo_id) REFERENCES repositories(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_versions_package ON versions(package_name);
        CREATE INDEX idx_versions_repo_id ON versions(repo_id);
        ",
    )?;

    info!("Schema version 1 created successfully");
    Ok(())
}

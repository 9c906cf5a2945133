// src/commands/catalog.rs
//! Catalog commands: init, updates, ignore, verify

use anyhow::{Result, anyhow};
use fdroid_sync::db::models::{App, Repository};
use fdroid_sync::{HashAlgorithm, Hasher, SyncConfig};
use std::path::Path;
use tracing::info;

/// Create the catalog database
pub fn cmd_init(config: &SyncConfig) -> Result<()> {
    info!("Initializing catalog database at: {}", config.db_path);
    fdroid_sync::db::init(&config.db_path)?;
    println!("Database initialized successfully at: {}", config.db_path);
    Ok(())
}

/// List installed apps with an update, as of the last sync
pub fn cmd_updates(config: &SyncConfig) -> Result<()> {
    let conn = fdroid_sync::db::open(&config.db_path)?;
    let apps = App::list_with_updates(&conn)?;

    if apps.is_empty() {
        println!("All installed apps are up to date");
        return Ok(());
    }

    println!("Updates available:");
    for app in apps {
        println!(
            "  {} ({}): {} -> {} ({})",
            app.name.as_deref().unwrap_or(&app.package_name),
            app.package_name,
            app.installed_version_code,
            app.suggested_version_name.as_deref().unwrap_or("?"),
            app.suggested_version_code
        );
    }
    Ok(())
}

/// Set or clear the ignore flags of an app
pub fn cmd_ignore(
    config: &SyncConfig,
    package: &str,
    all: bool,
    until: Option<i64>,
    clear: bool,
) -> Result<()> {
    let conn = fdroid_sync::db::open(&config.db_path)?;
    let app = App::find(&conn, package)?.ok_or_else(|| anyhow!("Application '{}' not found", package))?;

    let (ignore_all, ignore_this) = if clear {
        (false, 0)
    } else if all {
        (true, app.ignore_this_update)
    } else {
        // Default to the currently suggested version
        (false, until.unwrap_or(app.suggested_version_code))
    };

    App::set_ignore(&conn, package, ignore_all, ignore_this)?;
    if clear {
        println!("No longer ignoring updates for {}", package);
    } else if ignore_all {
        println!("Ignoring all updates for {}", package);
    } else {
        println!("Ignoring updates for {} up to version code {}", package, ignore_this);
    }
    println!("Run a sync to refresh the update list");
    Ok(())
}

/// Check an APK against the digests the catalog records for it
pub fn cmd_verify(
    config: &SyncConfig,
    file: &str,
    package: &str,
    version_code: i64,
    repo: Option<&str>,
) -> Result<()> {
    let conn = fdroid_sync::db::open(&config.db_path)?;

    let repo_id = match repo {
        Some(name) => Some(
            Repository::find_by_name(&conn, name)?
                .ok_or_else(|| anyhow!("Repository '{}' not found", name))?
                .require_id()?,
        ),
        None => None,
    };

    let candidates: Vec<_> = fdroid_sync::db::models::Version::find_by_package(&conn, package)?
        .into_iter()
        .filter(|v| v.version_code == version_code)
        .filter(|v| repo_id.is_none_or(|id| v.repo_id == id))
        .filter(|v| v.hash.is_some())
        .collect();
    if candidates.is_empty() {
        return Err(anyhow!(
            "No digest recorded for {} version code {}",
            package,
            version_code
        ));
    }

    for version in &candidates {
        let algorithm: HashAlgorithm = version.hash_type.as_deref().unwrap_or("sha256").parse()?;
        let mut hasher = Hasher::for_file(Path::new(file), algorithm);
        if hasher.matches(version.hash.as_deref())? {
            println!(
                "{}: OK ({} matches repository {})",
                file, algorithm, version.repo_id
            );
            return Ok(());
        }
    }

    Err(anyhow!(
        "{} does not match any recorded digest for {} version code {}",
        file,
        package,
        version_code
    ))
}

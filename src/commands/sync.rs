// src/commands/sync.rs
//! Sync command

use anyhow::Result;
use fdroid_sync::SyncConfig;
use fdroid_sync::installed::{InstalledPackageSource, JsonInstalledSource, StaticInstalledSource};
use fdroid_sync::progress::{CliProgress, LogProgress, SyncProgress};
use fdroid_sync::repository::{
    RepoStatus, RepositorySyncEngine, SchemeFetcher, total_failure_summary,
};
use tracing::info;

/// Run one sync pass and print the summary
pub fn cmd_sync(
    config: &SyncConfig,
    installed: Option<String>,
    sequential: bool,
    quiet: bool,
) -> Result<()> {
    let mut config = config.clone();
    if sequential {
        config.parallel_fetch = false;
    }

    let fetcher = SchemeFetcher::from_config(&config)?;
    let installed_source: Box<dyn InstalledPackageSource> =
        match installed.or_else(|| config.installed_packages.clone()) {
            Some(path) => Box::new(JsonInstalledSource::new(path)),
            None => {
                info!("No installed-package snapshot configured; treating nothing as installed");
                Box::new(StaticInstalledSource::default())
            }
        };
    let progress: Box<dyn SyncProgress> = if quiet {
        Box::new(LogProgress::new())
    } else {
        Box::new(CliProgress::new())
    };

    let mut conn = fdroid_sync::db::open(&config.db_path)?;
    let engine = RepositorySyncEngine::new(&config, &fetcher, installed_source.as_ref())
        .with_progress(progress.as_ref());
    let report = engine
        .sync(&mut conn)
        .map_err(|e| anyhow::anyhow!(total_failure_summary(&e)))?;

    for repo in &report.repositories {
        let line = match &repo.status {
            RepoStatus::Updated(stats) => {
                format!("updated ({} apps, {} versions)", stats.apps, stats.versions)
            }
            RepoStatus::NotModified => "up to date".to_string(),
            RepoStatus::Failed(failure) => format!("FAILED: {}", failure),
            RepoStatus::Cancelled => "cancelled".to_string(),
        };
        println!("  {}: {}", repo.name, line);
    }
    if report.apps_removed > 0 || report.versions_removed > 0 {
        println!(
            "Removed {} apps and {} versions no longer published",
            report.apps_removed, report.versions_removed
        );
    }
    println!("{}", report.summary());
    if report.should_notify() {
        println!(
            "{} updates available (was {})",
            report.updates_after, report.updates_before
        );
    }
    Ok(())
}

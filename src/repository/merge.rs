// src/repository/merge.rs

//! Merging one repository's index into the catalog, and end-of-batch cleanup
//!
//! [`merge_repository`] streams applications out of a verified index and
//! upserts them, recording every app and version key it affirms. After all
//! repositories of a batch are merged, [`plan_reconciliation`] decides from
//! those keys alone which rows disappeared upstream, and
//! [`apply_reconciliation`] deletes them.

use super::sync::current_timestamp;
use crate::db::models::{App, Repository, Version, VersionKey};
use crate::error::{Error, Result};
use crate::hash;
use crate::index::{IndexReader, ParseOptions, ParsedApp, RepoMetadata, absorb_metadata};
use crate::signing::SignatureVerifier;
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Index content accepted by transport and signature checks
#[derive(Debug, Clone, Default)]
pub struct VerifiedIndex {
    pub xml: Vec<u8>,
    /// Revalidation token to store once the merge commits
    pub token: Option<String>,
    /// Fingerprints of the archive's signing certificates; empty when unsigned
    pub signer_fingerprints: Vec<String>,
    /// Fingerprint trusted for the first time by this fetch
    pub new_fingerprint: Option<String>,
}

/// App and version keys affirmed by index content
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TouchedSet {
    pub apps: HashSet<String>,
    pub versions: HashSet<VersionKey>,
}

impl TouchedSet {
    pub fn extend(&mut self, other: TouchedSet) {
        self.apps.extend(other.apps);
        self.versions.extend(other.versions);
    }
}

/// What one repository contributed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub apps: usize,
    pub versions: usize,
}

/// Merge a verified index for `repo` into the catalog
///
/// Runs against whatever connection, transaction or savepoint the caller
/// passes; on `Err` the caller must discard everything written. Stale
/// indexes and certificate disagreements fail with
/// [`Error::VerificationError`], malformed documents with
/// [`Error::ParseError`]. `touched` is only extended on success.
pub fn merge_repository(
    conn: &Connection,
    repo: &Repository,
    index: &VerifiedIndex,
    options: ParseOptions,
    verifier: &SignatureVerifier,
    touched: &mut TouchedSet,
) -> Result<MergeStats> {
    let repo_id = repo.require_id()?;
    let mut reader = IndexReader::new(&index.xml, repo_id, options)?;

    check_timestamp(repo, reader.repo())?;
    let new_fingerprint = trusted_fingerprint(repo, reader.repo(), index, verifier)?;

    let mut affirmed = TouchedSet::default();
    // Package -> whether its suggested version was declared by the publisher,
    // or `None` when a higher-priority repository owns the app's metadata
    let mut seen: HashMap<String, Option<bool>> = HashMap::new();
    let mut stats = MergeStats::default();

    while let Some(parsed) = reader.next_app()? {
        let ParsedApp {
            mut app,
            versions,
            suggested_declared,
        } = parsed;
        app.repo_id = Some(repo_id);
        let package = app.package_name.clone();

        match seen.get(&package).copied() {
            Some(Some(stored_declared)) => {
                debug!("{} listed more than once by {}", package, repo.name);
                if let Some(mut stored) = App::find(conn, &package)? {
                    let declared =
                        absorb_metadata(&mut stored, stored_declared, app, suggested_declared);
                    seen.insert(package.clone(), Some(declared));
                    app = stored;
                }
                app.upsert(conn)?;
            }
            Some(None) => {
                debug!("{} listed more than once by {}", package, repo.name);
            }
            None => {
                stats.apps += 1;
                if outranks_owner(conn, repo, &package)? {
                    seen.insert(package.clone(), Some(suggested_declared));
                    app.upsert(conn)?;
                } else {
                    debug!("{}: metadata kept from a higher-priority repository", package);
                    seen.insert(package.clone(), None);
                }
            }
        }

        for mut version in versions {
            version.repo_id = repo_id;
            version.upsert(conn)?;
            affirmed.versions.insert(version.key());
            stats.versions += 1;
        }
        affirmed.apps.insert(package);
    }

    write_back_metadata(conn, repo, reader.into_repo(), index, new_fingerprint)?;
    touched.extend(affirmed);

    info!(
        "Merged {} apps and {} versions from repository {}",
        stats.apps, stats.versions, repo.name
    );
    Ok(stats)
}

/// Whether `repo` may replace the stored display fields of `package`
///
/// True unless an enabled repository of higher priority owns them.
fn outranks_owner(conn: &Connection, repo: &Repository, package: &str) -> Result<bool> {
    Ok(match App::owner_rank(conn, package)? {
        Some((owner_id, priority, true)) => {
            Some(owner_id) == repo.id || repo.priority >= priority
        }
        _ => true,
    })
}

/// Reject an index older than the last one accepted for this repository
fn check_timestamp(repo: &Repository, meta: &RepoMetadata) -> Result<()> {
    if meta.timestamp < repo.index_timestamp {
        return Err(Error::VerificationError(format!(
            "Index of '{}' is older than the last accepted one ({} < {})",
            repo.name, meta.timestamp, repo.index_timestamp
        )));
    }
    Ok(())
}

/// Fingerprint to persist after this merge, if trust changes
///
/// A signed archive whose document declares a certificate must have been
/// signed by that certificate. An unsigned document declaring a certificate
/// upgrades a repository that trusted nothing so far.
fn trusted_fingerprint(
    repo: &Repository,
    meta: &RepoMetadata,
    index: &VerifiedIndex,
    verifier: &SignatureVerifier,
) -> Result<Option<String>> {
    let declared = meta.declared_certificate().and_then(|cert| {
        let fingerprint = verifier.fingerprint_hex_certificate(cert);
        if fingerprint.is_none() {
            warn!("Repository {} declares a malformed certificate", repo.name);
        }
        fingerprint
    });

    if !index.signer_fingerprints.is_empty() {
        if let Some(declared) = &declared {
            let signed_by_declared = index
                .signer_fingerprints
                .iter()
                .any(|fp| hash::digests_match(Some(fp), Some(declared)));
            if !signed_by_declared {
                return Err(Error::VerificationError(format!(
                    "Index of '{}' declares certificate {} but is signed by another",
                    repo.name, declared
                )));
            }
        }
        return Ok(index.new_fingerprint.clone());
    }

    match (&repo.fingerprint, declared) {
        (None, Some(declared)) => {
            info!(
                "Repository {} now declares signing certificate {}",
                repo.name, declared
            );
            Ok(Some(declared))
        }
        _ => Ok(None),
    }
}

fn write_back_metadata(
    conn: &Connection,
    repo: &Repository,
    meta: RepoMetadata,
    index: &VerifiedIndex,
    new_fingerprint: Option<String>,
) -> Result<()> {
    let mut updated = repo.clone();

    if let Some(name) = &meta.name {
        debug!("Repository {} calls itself '{}'", repo.name, name);
    }
    if meta.description.is_some() {
        updated.description = meta.description;
    }
    if meta.icon.is_some() {
        updated.icon = meta.icon;
    }
    updated.max_age = meta.max_age;
    updated.index_version = meta.version;
    updated.index_timestamp = meta.timestamp;

    let address = repo.address.trim_end_matches('/');
    let mirrors: Vec<String> = meta
        .mirrors
        .into_iter()
        .filter(|m| m.trim_end_matches('/') != address)
        .collect();
    if !mirrors.is_empty() {
        updated.mirrors = mirrors;
    }

    updated.last_etag = index.token.clone();
    updated.last_updated = Some(current_timestamp());
    if let Some(fingerprint) = new_fingerprint {
        info!(
            "Trusting signing certificate {} for repository {}",
            fingerprint, repo.name
        );
        updated.fingerprint = Some(fingerprint);
    }

    updated.update(conn)
}

/// Repository sets and affirmed keys accumulated over a batch
#[derive(Debug, Clone, Default)]
pub struct BatchState {
    pub touched: TouchedSet,
    /// Repositories whose new content was merged
    pub processed: HashSet<i64>,
    /// Repositories whose stored entries stand: not modified, failed or cancelled
    pub preserved: HashSet<i64>,
    pub disabled: HashSet<i64>,
}

/// Rows to delete at the end of a batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub delete_apps: Vec<String>,
    pub delete_versions: Vec<VersionKey>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.delete_apps.is_empty() && self.delete_versions.is_empty()
    }
}

/// Decide which catalog rows no longer exist upstream
///
/// A version is stale when its repository was reprocessed without affirming
/// it, or when its repository is disabled. An app is stale when nothing in
/// the batch affirmed it and neither its metadata source nor any surviving
/// version belongs to a preserved repository.
pub fn plan_reconciliation(
    app_keys: &[(String, Option<i64>)],
    version_keys: &[VersionKey],
    batch: &BatchState,
) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();
    let mut surviving: HashMap<&str, HashSet<i64>> = HashMap::new();

    for key in version_keys {
        let stale = batch.disabled.contains(&key.repo_id)
            || (batch.processed.contains(&key.repo_id) && !batch.touched.versions.contains(key));
        if stale {
            plan.delete_versions.push(key.clone());
        } else {
            surviving
                .entry(key.package_name.as_str())
                .or_default()
                .insert(key.repo_id);
        }
    }

    for (package_name, repo_id) in app_keys {
        if batch.touched.apps.contains(package_name) {
            continue;
        }
        let source_preserved = repo_id.is_some_and(|id| batch.preserved.contains(&id));
        let versions_preserved = surviving
            .get(package_name.as_str())
            .is_some_and(|repos| repos.iter().any(|id| batch.preserved.contains(id)));
        if !source_preserved && !versions_preserved {
            plan.delete_apps.push(package_name.clone());
        }
    }

    plan.delete_apps.sort();
    plan.delete_versions.sort();
    plan
}

/// Delete what [`plan_reconciliation`] selected
pub fn apply_reconciliation(conn: &Connection, plan: &ReconcilePlan) -> Result<()> {
    for key in &plan.delete_versions {
        Version::delete(conn, key)?;
    }
    for package_name in &plan.delete_apps {
        App::delete(conn, package_name)?;
    }
    if !plan.is_empty() {
        info!(
            "Removed {} apps and {} versions no longer published",
            plan.delete_apps.len(),
            plan.delete_versions.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(package: &str, code: i64, repo: i64) -> VersionKey {
        VersionKey::new(package, code, repo)
    }

    fn ids(values: &[i64]) -> HashSet<i64> {
        values.iter().copied().collect()
    }

    #[test]
    fn test_unaffirmed_versions_of_processed_repo_are_stale() {
        let mut batch = BatchState {
            processed: ids(&[1]),
            preserved: ids(&[2]),
            ..Default::default()
        };
        batch.touched.apps.insert("a".into());
        batch.touched.versions.insert(key("a", 2, 1));

        let plan = plan_reconciliation(
            &[("a".into(), Some(1))],
            &[key("a", 1, 1), key("a", 2, 1), key("a", 1, 2)],
            &batch,
        );

        assert_eq!(plan.delete_versions, vec![key("a", 1, 1)]);
        assert!(plan.delete_apps.is_empty());
    }

    #[test]
    fn test_discontinued_app_is_removed() {
        let batch = BatchState {
            processed: ids(&[1]),
            ..Default::default()
        };

        let plan = plan_reconciliation(&[("gone".into(), Some(1))], &[key("gone", 3, 1)], &batch);

        assert_eq!(plan.delete_apps, vec!["gone".to_string()]);
        assert_eq!(plan.delete_versions, vec![key("gone", 3, 1)]);
    }

    #[test]
    fn test_apps_of_preserved_repos_survive() {
        // Repo 2 answered not-modified; repo 3 failed
        let batch = BatchState {
            processed: ids(&[1]),
            preserved: ids(&[2, 3]),
            ..Default::default()
        };

        let plan = plan_reconciliation(
            &[
                ("kept".into(), Some(2)),
                ("failed".into(), Some(3)),
                // Metadata from the reprocessed repo, a version from a kept one
                ("shared".into(), Some(1)),
            ],
            &[key("kept", 1, 2), key("failed", 1, 3), key("shared", 5, 2)],
            &batch,
        );

        assert!(plan.is_empty());
    }

    #[test]
    fn test_disabled_repo_entries_are_removed() {
        let batch = BatchState {
            preserved: ids(&[1]),
            disabled: ids(&[2]),
            ..Default::default()
        };

        let plan = plan_reconciliation(
            &[("only-disabled".into(), Some(2)), ("both".into(), Some(2))],
            &[key("only-disabled", 1, 2), key("both", 1, 2), key("both", 1, 1)],
            &batch,
        );

        assert_eq!(plan.delete_apps, vec!["only-disabled".to_string()]);
        assert_eq!(
            plan.delete_versions,
            vec![key("both", 1, 2), key("only-disabled", 1, 2)]
        );
    }

    #[test]
    fn test_orphan_without_source_is_removed() {
        let batch = BatchState {
            preserved: ids(&[1]),
            ..Default::default()
        };
        let plan = plan_reconciliation(&[("orphan".into(), None)], &[], &batch);
        assert_eq!(plan.delete_apps, vec!["orphan".to_string()]);
    }
}

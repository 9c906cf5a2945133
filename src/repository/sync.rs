// src/repository/sync.rs

//! Repository synchronization
//!
//! A sync pass runs in two stages. Fetching and signature verification are
//! independent per repository and run on a rayon pool. Parsing and merging
//! then run one repository at a time, in ascending priority, inside a single
//! catalog transaction with one savepoint per repository: a repository that
//! fails is discarded on its own, while a database failure rolls back the
//! whole batch.

use super::client::{ContentFetcher, FetchOutcome, SIGNED_INDEX, UNSIGNED_INDEX, fetch_with_mirrors};
use super::merge::{self, BatchState, MergeStats, TouchedSet, VerifiedIndex};
use super::{FailureKind, RepoFailure};
use crate::config::SyncConfig;
use crate::db::models::{App, Repository, Version};
use crate::error::{Error, Result};
use crate::index::{self, open_signed_index};
use crate::installed::{InstalledPackageSource, InstalledSnapshot};
use crate::lock::SyncLock;
use crate::progress::{LogProgress, SyncPhase, SyncProgress};
use crate::signing::{self, SignatureVerifier, VerificationResult};
use crate::updates;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use rusqlite::Connection;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

static DEFAULT_PROGRESS: LogProgress = LogProgress;

/// Get the current timestamp as an RFC 3339 string
pub fn current_timestamp() -> String {
    Utc::now().to_rfc3339()
}

/// Parse an RFC 3339 timestamp to seconds since the epoch
pub fn parse_timestamp(timestamp: &str) -> Result<i64> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|dt| dt.timestamp())
        .map_err(|e| Error::ParseError(format!("Invalid timestamp '{timestamp}': {e}")))
}

/// Cooperative cancellation shared between a sync pass and its caller
///
/// Checked before each repository is fetched and before each is merged;
/// repositories not reached keep their catalog entries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Final state of one repository in a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoStatus {
    Updated(MergeStats),
    NotModified,
    Failed(RepoFailure),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoReport {
    pub repo_id: i64,
    pub name: String,
    pub status: RepoStatus,
}

/// Result of a committed sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Enabled repositories in processing order
    pub repositories: Vec<RepoReport>,
    /// Installed apps with an actionable update before the pass
    pub updates_before: usize,
    pub updates_after: usize,
    pub apps_removed: usize,
    pub versions_removed: usize,
}

impl SyncReport {
    /// Repositories that failed, with the reason
    pub fn failures(&self) -> impl Iterator<Item = (&str, &RepoFailure)> {
        self.repositories.iter().filter_map(|r| match &r.status {
            RepoStatus::Failed(failure) => Some((r.name.as_str(), failure)),
            _ => None,
        })
    }

    pub fn is_partial_failure(&self) -> bool {
        self.failures().next().is_some()
    }

    /// Whether any repository brought new content or anything was removed
    pub fn changed(&self) -> bool {
        self.apps_removed > 0
            || self.versions_removed > 0
            || self
                .repositories
                .iter()
                .any(|r| matches!(r.status, RepoStatus::Updated(_)))
    }

    /// Notify only about a net increase in actionable updates
    pub fn should_notify(&self) -> bool {
        self.updates_after > self.updates_before
    }

    /// One-line summary for the user
    pub fn summary(&self) -> String {
        if self.is_partial_failure() {
            let failed: Vec<String> = self
                .failures()
                .map(|(name, failure)| format!("{name}: {failure}"))
                .collect();
            let updated: Vec<&str> = self
                .repositories
                .iter()
                .filter(|r| matches!(r.status, RepoStatus::Updated(_)))
                .map(|r| r.name.as_str())
                .collect();
            let mut summary = format!("Some repositories failed to update ({})", failed.join("; "));
            if !updated.is_empty() {
                summary.push_str(&format!("; updated: {}", updated.join(", ")));
            }
            summary
        } else if self.changed() {
            "Repositories updated".to_string()
        } else {
            "No changes: repositories are up to date".to_string()
        }
    }
}

/// Summary shown when a pass was rolled back
pub fn total_failure_summary(err: &Error) -> String {
    format!("Sync failed, the catalog was not changed ({err})")
}

/// What the fetch stage produced for one repository
enum Prepared {
    NotModified,
    Ready(VerifiedIndex),
    Failed(RepoFailure),
    Cancelled,
}

/// Orchestrates a sync pass over every configured repository
pub struct RepositorySyncEngine<'a> {
    config: &'a SyncConfig,
    fetcher: &'a dyn ContentFetcher,
    installed: &'a dyn InstalledPackageSource,
    progress: &'a dyn SyncProgress,
    cancel: CancelToken,
}

impl<'a> RepositorySyncEngine<'a> {
    pub fn new(
        config: &'a SyncConfig,
        fetcher: &'a dyn ContentFetcher,
        installed: &'a dyn InstalledPackageSource,
    ) -> Self {
        Self {
            config,
            fetcher,
            installed,
            progress: &DEFAULT_PROGRESS,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn SyncProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels this engine's passes
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run one sync pass over all repositories in the catalog
    ///
    /// Holds the sync lock for the whole pass. Per-repository failures are
    /// reported in the returned [`SyncReport`]; an `Err` means the catalog
    /// transaction was rolled back and nothing changed.
    pub fn sync(&self, conn: &mut Connection) -> Result<SyncReport> {
        let _lock = SyncLock::acquire(self.config.lock_path())?;
        let result = self.run(conn);
        match &result {
            Ok(report) => self.progress.finish(&report.summary()),
            Err(e) => {
                warn!("Sync rolled back: {}", e);
                self.progress.finish(&total_failure_summary(e));
            }
        }
        result
    }

    fn run(&self, conn: &mut Connection) -> Result<SyncReport> {
        let verifier = self.config.verifier()?;
        let options = self.config.parse_options();
        let snapshot = InstalledSnapshot::capture(self.installed)?;

        let repositories = Repository::list_all(conn)?;
        let mut batch = BatchState {
            disabled: disabled_ids(&repositories),
            ..Default::default()
        };
        let enabled: Vec<Repository> = repositories.into_iter().filter(|r| r.enabled).collect();
        info!(
            "Syncing {} repositories ({} disabled)",
            enabled.len(),
            batch.disabled.len()
        );
        self.progress.start(enabled.len() as u64);

        let prepared = self.prepare_all(&enabled, &verifier);

        let mut tx = conn.transaction()?;
        let updates_before = updates::count_updates(&tx, &snapshot)?;
        let mut reports = Vec::with_capacity(enabled.len());

        for (repo, prepared) in enabled.iter().zip(prepared) {
            let repo_id = repo.require_id()?;
            let prepared = if self.cancel.is_cancelled() {
                Prepared::Cancelled
            } else {
                prepared
            };

            let status = match prepared {
                Prepared::Cancelled => RepoStatus::Cancelled,
                Prepared::NotModified => RepoStatus::NotModified,
                Prepared::Failed(failure) => RepoStatus::Failed(failure),
                Prepared::Ready(index) => {
                    self.progress.phase(&repo.name, &SyncPhase::Parsing);
                    let mut touched = TouchedSet::default();
                    let savepoint = tx.savepoint()?;
                    match merge::merge_repository(
                        &savepoint,
                        repo,
                        &index,
                        options,
                        &verifier,
                        &mut touched,
                    ) {
                        Ok(stats) => {
                            savepoint.commit()?;
                            batch.touched.extend(touched);
                            self.progress.phase(&repo.name, &SyncPhase::Merged);
                            RepoStatus::Updated(stats)
                        }
                        // Dropping the savepoint discards this repository's writes
                        Err(e) => match RepoFailure::from_error(&e) {
                            Some(failure) => RepoStatus::Failed(failure),
                            None => return Err(e),
                        },
                    }
                }
            };

            if matches!(status, RepoStatus::Updated(_)) {
                batch.processed.insert(repo_id);
            } else {
                batch.preserved.insert(repo_id);
            }
            self.progress.phase(&repo.name, &terminal_phase(&status));
            reports.push(RepoReport {
                repo_id,
                name: repo.name.clone(),
                status,
            });
        }

        let plan = merge::plan_reconciliation(
            &App::list_keys(&tx)?,
            &Version::list_keys(&tx)?,
            &batch,
        );
        merge::apply_reconciliation(&tx, &plan)?;

        let updates_after = updates::refresh_installed_state(&tx, &snapshot)?;
        tx.commit()?;

        let report = SyncReport {
            repositories: reports,
            updates_before,
            updates_after,
            apps_removed: plan.delete_apps.len(),
            versions_removed: plan.delete_versions.len(),
        };
        info!(
            "Sync complete: {} updated, {} failed, {} updates available (was {})",
            batch.processed.len(),
            report.failures().count(),
            report.updates_after,
            report.updates_before
        );
        Ok(report)
    }

    /// Fetch and verify every repository, in parallel when configured
    fn prepare_all(&self, repositories: &[Repository], verifier: &SignatureVerifier) -> Vec<Prepared> {
        if self.config.parallel_fetch && repositories.len() > 1 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.max_concurrent_fetches)
                .build()
            {
                Ok(pool) => {
                    return pool.install(|| {
                        repositories
                            .par_iter()
                            .map(|repo| self.prepare(repo, verifier))
                            .collect()
                    });
                }
                Err(e) => warn!("Fetching sequentially, thread pool unavailable: {}", e),
            }
        }

        repositories
            .iter()
            .map(|repo| self.prepare(repo, verifier))
            .collect()
    }

    fn prepare(&self, repo: &Repository, verifier: &SignatureVerifier) -> Prepared {
        if self.cancel.is_cancelled() {
            return Prepared::Cancelled;
        }
        self.progress.phase(&repo.name, &SyncPhase::Fetching);

        let address = repo.address.trim_end_matches('/');
        let mut bases = vec![repo.address.as_str()];
        bases.extend(
            repo.mirrors
                .iter()
                .map(String::as_str)
                .filter(|mirror| mirror.trim_end_matches('/') != address),
        );
        let token = repo.last_etag.as_deref();
        let credentials = repo.credentials();

        let outcome = match fetch_with_mirrors(self.fetcher, &bases, SIGNED_INDEX, token, credentials)
        {
            // Only repositories that never trusted a certificate may fall back
            FetchOutcome::Failed { reason } if repo.fingerprint.is_none() => {
                debug!(
                    "{}: {} unavailable ({}), trying {}",
                    repo.name, SIGNED_INDEX, reason, UNSIGNED_INDEX
                );
                match fetch_with_mirrors(self.fetcher, &bases, UNSIGNED_INDEX, token, credentials)
                {
                    FetchOutcome::Failed { reason: legacy } => FetchOutcome::Failed {
                        reason: format!("{reason}; {legacy}"),
                    },
                    other => other,
                }
            }
            other => other,
        };

        match outcome {
            FetchOutcome::NotModified => {
                self.progress.phase(&repo.name, &SyncPhase::NotModified);
                Prepared::NotModified
            }
            FetchOutcome::Failed { reason } => Prepared::Failed(RepoFailure::transport(reason)),
            FetchOutcome::Fetched { bytes, token } => self.verify(repo, bytes, token, verifier),
        }
    }

    fn verify(
        &self,
        repo: &Repository,
        bytes: Vec<u8>,
        token: Option<String>,
        verifier: &SignatureVerifier,
    ) -> Prepared {
        if !index::is_archive(&bytes) {
            if repo.fingerprint.is_some() {
                return Prepared::Failed(RepoFailure::verification(
                    "Repository has a trusted certificate but served an unsigned index",
                ));
            }
            return Prepared::Ready(VerifiedIndex {
                xml: bytes,
                token,
                ..Default::default()
            });
        }

        self.progress.phase(&repo.name, &SyncPhase::Verifying);
        let signed = match open_signed_index(&bytes) {
            Ok(signed) => signed,
            Err(e) => {
                return Prepared::Failed(
                    RepoFailure::from_error(&e)
                        .unwrap_or_else(|| RepoFailure::new(FailureKind::Parse, e.to_string())),
                );
            }
        };

        let signer_fingerprints: Vec<String> = signed
            .certificates
            .iter()
            .map(|cert| verifier.fingerprint(cert))
            .collect();
        let new_fingerprint = match verifier.verify(&signed.certificates, repo.fingerprint.as_deref())
        {
            VerificationResult::TrustedMatch => None,
            VerificationResult::TrustOnFirstUse(fingerprint) => {
                let subject = signed
                    .certificates
                    .first()
                    .and_then(|cert| signing::certificate_subject(cert));
                info!(
                    "{}: first signed index, signer {}",
                    repo.name,
                    subject.as_deref().unwrap_or("(unnamed)")
                );
                Some(fingerprint)
            }
            VerificationResult::Mismatch => {
                return Prepared::Failed(RepoFailure::verification(format!(
                    "Index is signed by {} instead of the trusted certificate",
                    signer_fingerprints.join(", ")
                )));
            }
            VerificationResult::NoCertificateFound if repo.fingerprint.is_some() => {
                return Prepared::Failed(RepoFailure::verification(
                    "Repository has a trusted certificate but the index archive is not signed",
                ));
            }
            VerificationResult::NoCertificateFound => None,
        };

        Prepared::Ready(VerifiedIndex {
            xml: signed.index_xml,
            token,
            signer_fingerprints,
            new_fingerprint,
        })
    }
}

fn terminal_phase(status: &RepoStatus) -> SyncPhase {
    match status {
        RepoStatus::Updated(_) | RepoStatus::NotModified => SyncPhase::Done,
        RepoStatus::Failed(failure) => SyncPhase::Failed(failure.to_string()),
        RepoStatus::Cancelled => SyncPhase::Cancelled,
    }
}

/// Disabled repositories lose their catalog entries at the next pass
fn disabled_ids(repositories: &[Repository]) -> HashSet<i64> {
    repositories
        .iter()
        .filter(|r| !r.enabled)
        .filter_map(|r| r.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(statuses: Vec<(&str, RepoStatus)>) -> SyncReport {
        SyncReport {
            repositories: statuses
                .into_iter()
                .enumerate()
                .map(|(i, (name, status))| RepoReport {
                    repo_id: i as i64 + 1,
                    name: name.to_string(),
                    status,
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_timestamp_round_trip() {
        let now = current_timestamp();
        assert!(parse_timestamp(&now).unwrap() > 1_600_000_000);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_summary_up_to_date() {
        let report = report(vec![("main", RepoStatus::NotModified)]);
        assert!(!report.changed());
        assert!(!report.is_partial_failure());
        assert_eq!(report.summary(), "No changes: repositories are up to date");
    }

    #[test]
    fn test_summary_partial_failure() {
        let report = report(vec![
            ("main", RepoStatus::Updated(MergeStats { apps: 2, versions: 3 })),
            (
                "archive",
                RepoStatus::Failed(RepoFailure::transport("HTTP 404 from https://x/index.jar")),
            ),
        ]);

        assert!(report.changed());
        assert!(report.is_partial_failure());
        assert_eq!(
            report.summary(),
            "Some repositories failed to update \
             (archive: transport: HTTP 404 from https://x/index.jar); updated: main"
        );
    }

    #[test]
    fn test_notify_only_on_increase() {
        let mut report = SyncReport {
            updates_before: 2,
            updates_after: 2,
            ..Default::default()
        };
        assert!(!report.should_notify());
        report.updates_after = 3;
        assert!(report.should_notify());
        report.updates_after = 1;
        assert!(!report.should_notify());
    }

    #[test]
    fn test_terminal_phase() {
        assert_eq!(terminal_phase(&RepoStatus::NotModified), SyncPhase::Done);
        assert_eq!(terminal_phase(&RepoStatus::Cancelled), SyncPhase::Cancelled);
        assert_eq!(
            terminal_phase(&RepoStatus::Failed(RepoFailure::parse("bad xml"))),
            SyncPhase::Failed("parse: bad xml".into())
        );
    }
}

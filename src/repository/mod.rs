// src/repository/mod.rs

//! Repository management and index synchronization
//!
//! This module provides functionality for:
//! - Managing configured repositories (add, remove, enable, disable)
//! - Fetching index documents over HTTP or from the local filesystem
//! - Merging verified indexes into the catalog
//! - Running whole sync passes with failure isolation per repository

mod client;
mod management;
mod merge;
mod sync;

use crate::error::Error;
use std::fmt;

// Re-export main types and functions
pub use client::{
    ContentFetcher, FetchOutcome, FetchRequest, FileFetcher, HttpFetcher, SIGNED_INDEX,
    SchemeFetcher, UNSIGNED_INDEX, fetch_with_mirrors, index_url,
};
pub use management::{
    NewRepository, add_repository, list_repositories, normalize_fingerprint, remove_repository,
    set_repository_enabled,
};
pub use merge::{
    BatchState, MergeStats, ReconcilePlan, TouchedSet, VerifiedIndex, apply_reconciliation,
    merge_repository, plan_reconciliation,
};
pub use sync::{
    CancelToken, RepoReport, RepoStatus, RepositorySyncEngine, SyncReport, current_timestamp,
    parse_timestamp, total_failure_summary,
};

/// Why a repository's pass failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The index could not be retrieved
    Transport,
    /// Signature, certificate or freshness checks rejected the index
    Verification,
    /// The index document is malformed
    Parse,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Transport => write!(f, "transport"),
            FailureKind::Verification => write!(f, "verification"),
            FailureKind::Parse => write!(f, "parse"),
        }
    }
}

/// Failure of a single repository within a sync pass
///
/// These are reported, not raised: the rest of the batch still commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl RepoFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transport, message)
    }

    pub fn verification(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Verification, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Parse, message)
    }

    /// Classify an error that only concerns one repository
    ///
    /// Returns `None` for errors that must abort the whole batch, such as
    /// database failures.
    pub fn from_error(err: &Error) -> Option<Self> {
        match err {
            Error::DownloadError(msg) => Some(Self::transport(msg.clone())),
            Error::VerificationError(msg) => Some(Self::verification(msg.clone())),
            Error::ChecksumMismatch { .. } => Some(Self::verification(err.to_string())),
            Error::ParseError(msg) => Some(Self::parse(msg.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for RepoFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{App, Repository, Version};
    use crate::db::schema;
    use crate::lock::SyncLock;
    use rusqlite::Connection;
    use tempfile::{NamedTempFile, TempDir};

    fn create_test_db() -> (NamedTempFile, Connection) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = Connection::open(temp_file.path()).unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        schema::migrate(&conn).unwrap();
        (temp_file, conn)
    }

    fn lock_dir() -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sync.lock");
        (dir, path)
    }

    #[test]
    fn test_add_repository() {
        let (_temp, conn) = create_test_db();
        let (_dir, lock) = lock_dir();

        let mut new = NewRepository::new("fdroid", "https://f-droid.org/repo");
        new.priority = 10;
        new.fingerprint = Some("43:23:8D:51:2C".into());
        let repo = add_repository(&conn, &lock, new).unwrap();

        assert_eq!(repo.name, "fdroid");
        assert_eq!(repo.address, "https://f-droid.org/repo");
        assert_eq!(repo.fingerprint.as_deref(), Some("43238d512c"));
        assert!(repo.enabled);
        assert_eq!(repo.priority, 10);
    }

    #[test]
    fn test_add_duplicate_repository() {
        let (_temp, conn) = create_test_db();
        let (_dir, lock) = lock_dir();

        add_repository(&conn, &lock, NewRepository::new("fdroid", "https://f-droid.org/repo"))
            .unwrap();
        let result = add_repository(
            &conn,
            &lock,
            NewRepository::new("fdroid", "https://mirror.example/repo"),
        );
        assert!(matches!(result, Err(Error::ConflictError(_))));
    }

    #[test]
    fn test_add_rejects_bad_input() {
        let (_temp, conn) = create_test_db();
        let (_dir, lock) = lock_dir();

        let result = add_repository(&conn, &lock, NewRepository::new("x", "ftp://example/repo"));
        assert!(matches!(result, Err(Error::ConfigError(_))));

        let mut new = NewRepository::new("y", "https://example/repo");
        new.fingerprint = Some("not-hex".into());
        let result = add_repository(&conn, &lock, new);
        assert!(matches!(result, Err(Error::ConfigError(_))));

        assert!(list_repositories(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_remove_repository_cascades() {
        let (_temp, mut conn) = create_test_db();
        let (_dir, lock) = lock_dir();

        let first = add_repository(&conn, &lock, NewRepository::new("first", "/srv/first"))
            .unwrap()
            .id
            .unwrap();
        let second = add_repository(&conn, &lock, NewRepository::new("second", "/srv/second"))
            .unwrap()
            .id
            .unwrap();

        let mut only_first = App::new("org.only.first".into());
        only_first.repo_id = Some(first);
        only_first.upsert(&conn).unwrap();
        Version::new("org.only.first".into(), 1, first).upsert(&conn).unwrap();

        let mut shared = App::new("org.shared".into());
        shared.repo_id = Some(first);
        shared.upsert(&conn).unwrap();
        Version::new("org.shared".into(), 1, first).upsert(&conn).unwrap();
        Version::new("org.shared".into(), 2, second).upsert(&conn).unwrap();

        let removed = remove_repository(&mut conn, &lock, "first").unwrap();
        assert_eq!(removed, 1);

        assert!(App::find(&conn, "org.only.first").unwrap().is_none());
        let shared = App::find(&conn, "org.shared").unwrap().unwrap();
        assert_eq!(shared.repo_id, None);
        let versions = Version::find_by_package(&conn, "org.shared").unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].repo_id, second);
    }

    #[test]
    fn test_remove_missing_repository() {
        let (_temp, mut conn) = create_test_db();
        let (_dir, lock) = lock_dir();

        let result = remove_repository(&mut conn, &lock, "nope");
        assert!(matches!(result, Err(Error::NotFoundError(_))));
    }

    #[test]
    fn test_set_repository_enabled() {
        let (_temp, conn) = create_test_db();
        let (_dir, lock) = lock_dir();

        add_repository(&conn, &lock, NewRepository::new("fdroid", "https://f-droid.org/repo"))
            .unwrap();
        set_repository_enabled(&conn, &lock, "fdroid", false).unwrap();

        let repo = Repository::find_by_name(&conn, "fdroid").unwrap().unwrap();
        assert!(!repo.enabled);

        set_repository_enabled(&conn, &lock, "fdroid", true).unwrap();
        let repo = Repository::find_by_name(&conn, "fdroid").unwrap().unwrap();
        assert!(repo.enabled);
    }

    #[test]
    fn test_edits_refused_during_sync() {
        let (_temp, conn) = create_test_db();
        let (_dir, lock) = lock_dir();

        let _sync = SyncLock::acquire(&lock).unwrap();
        let result = add_repository(&conn, &lock, NewRepository::new("fdroid", "/srv/repo"));
        assert!(matches!(result, Err(Error::ConflictError(_))));
        let result = set_repository_enabled(&conn, &lock, "fdroid", false);
        assert!(matches!(result, Err(Error::ConflictError(_))));
    }

    #[test]
    fn test_failure_classification() {
        assert_eq!(
            RepoFailure::from_error(&Error::ParseError("eof".into())),
            Some(RepoFailure::parse("eof"))
        );
        assert_eq!(
            RepoFailure::from_error(&Error::VerificationError("stale".into()))
                .unwrap()
                .kind,
            FailureKind::Verification
        );
        assert!(RepoFailure::from_error(&Error::DatabaseError("disk full".into())).is_none());
    }
}

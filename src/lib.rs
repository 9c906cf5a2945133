// src/lib.rs

//! fdroid-sync
//!
//! Synchronizes F-Droid style repository indexes into a local application
//! catalog and works out which installed apps have updates.
//!
//! # Architecture
//!
//! - Database-first: repositories, apps and versions live in SQLite
//! - Trust on first use: a repository's signing certificate is pinned by
//!   fingerprint the first time a signed index is accepted
//! - Failure isolation: one repository failing never blocks the others;
//!   only a database failure rolls the whole pass back
//! - Incremental: unchanged indexes are skipped through ETag revalidation

pub mod config;
pub mod db;
mod error;
pub mod hash;
pub mod index;
pub mod installed;
pub mod lock;
pub mod progress;
pub mod repository;
pub mod signing;
pub mod updates;

pub use config::SyncConfig;
pub use error::{Error, Result};
pub use hash::{HashAlgorithm, Hasher};
pub use installed::{InstalledPackage, InstalledPackageSource, InstalledSnapshot};
pub use progress::{
    CallbackProgress, CliProgress, LogProgress, ProgressEvent, SilentProgress, SyncPhase,
    SyncProgress,
};
pub use repository::{
    CancelToken, ContentFetcher, FailureKind, FetchOutcome, FetchRequest, RepoFailure,
    RepositorySyncEngine, SyncReport,
};
pub use signing::{SignatureVerifier, VerificationResult};

// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use fdroid_sync::db;
use fdroid_sync::db::models::Repository;
use fdroid_sync::installed::StaticInstalledSource;
use fdroid_sync::repository::{CancelToken, RepositorySyncEngine, SyncReport};
use fdroid_sync::{ContentFetcher, FetchOutcome, FetchRequest, SilentProgress, SyncConfig};
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::TempDir;

/// A catalog database in a temporary directory
///
/// The sync lock lives next to the database, so concurrent tests never
/// contend for it. Keep the struct alive to prevent cleanup.
pub struct TestCatalog {
    pub dir: TempDir,
    pub config: SyncConfig,
    pub conn: Connection,
}

pub fn create_test_catalog() -> TestCatalog {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir
        .path()
        .join("catalog.db")
        .to_str()
        .unwrap()
        .to_string();

    db::init(&db_path).unwrap();
    let conn = db::open(&db_path).unwrap();
    let mut config = SyncConfig::with_db_path(db_path);
    config.max_retries = 1;

    TestCatalog { dir, config, conn }
}

/// Insert a repository and return its id
pub fn add_repo(conn: &Connection, name: &str, address: &str, priority: i32) -> i64 {
    let mut repo = Repository::new(name.to_string(), address.to_string());
    repo.priority = priority;
    repo.insert(conn).unwrap()
}

/// Run one sync pass with nothing installed
pub fn sync(catalog: &mut TestCatalog, fetcher: &MemoryFetcher) -> SyncReport {
    sync_installed(catalog, fetcher, &StaticInstalledSource::default())
}

/// Run one sync pass against an installed-package snapshot
pub fn sync_installed(
    catalog: &mut TestCatalog,
    fetcher: &MemoryFetcher,
    installed: &StaticInstalledSource,
) -> SyncReport {
    try_sync(catalog, fetcher, installed, CancelToken::new()).unwrap()
}

pub fn try_sync(
    catalog: &mut TestCatalog,
    fetcher: &MemoryFetcher,
    installed: &StaticInstalledSource,
    cancel: CancelToken,
) -> fdroid_sync::Result<SyncReport> {
    let progress = SilentProgress::new();
    let engine = RepositorySyncEngine::new(&catalog.config, fetcher, installed)
        .with_progress(&progress)
        .with_cancel_token(cancel);
    engine.sync(&mut catalog.conn)
}

/// Serves documents from memory, keyed by URL
///
/// The ETag of a document is its SHA-256, so serving the same bytes again
/// answers a revalidation with not-modified. Unknown URLs fail like a 404.
#[derive(Default)]
pub struct MemoryFetcher {
    documents: Mutex<HashMap<String, Vec<u8>>>,
    requests: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, bytes: impl Into<Vec<u8>>) {
        self.documents
            .lock()
            .unwrap()
            .insert(url.to_string(), bytes.into());
    }

    pub fn withdraw(&self, url: &str) {
        self.documents.lock().unwrap().remove(url);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl ContentFetcher for MemoryFetcher {
    fn fetch(&self, request: &FetchRequest<'_>) -> FetchOutcome {
        self.requests.lock().unwrap().push(request.url.to_string());

        let Some(bytes) = self.documents.lock().unwrap().get(request.url).cloned() else {
            return FetchOutcome::Failed {
                reason: format!("HTTP 404 Not Found from {}", request.url),
            };
        };
        let etag = format!("\"{}\"", fdroid_sync::hash::sha256(&bytes));
        if request.token == Some(etag.as_str()) {
            return FetchOutcome::NotModified;
        }
        FetchOutcome::Fetched {
            bytes,
            token: Some(etag),
        }
    }
}

/// An `<application>` element with one `<package>` per version code
pub fn app_xml(package: &str, name: &str, version_codes: &[i64], suggested: Option<i64>) -> String {
    let mut xml = format!(
        "  <application id=\"{package}\">\n    <id>{package}</id>\n    <name>{name}</name>\n    \
         <summary>{name} summary</summary>\n    <license>GPL-3.0-or-later</license>\n"
    );
    if let Some(code) = suggested {
        xml.push_str(&format!(
            "    <marketversion>1.{code}</marketversion>\n    <marketvercode>{code}</marketvercode>\n"
        ));
    }
    for code in version_codes {
        xml.push_str(&format!(
            "    <package>\n      <version>1.{code}</version>\n      \
             <versioncode>{code}</versioncode>\n      \
             <apkname>{package}_{code}.apk</apkname>\n      \
             <hash type=\"sha256\">{code:064x}</hash>\n      \
             <size>{size}</size>\n      <sdkver>21</sdkver>\n    </package>\n",
            size = 1000 + code
        ));
    }
    xml.push_str("  </application>\n");
    xml
}

/// A complete unsigned `index.xml`
pub fn index_xml(timestamp: i64, apps: &[String]) -> String {
    index_xml_with_pubkey(timestamp, None, apps)
}

pub fn index_xml_with_pubkey(timestamp: i64, pubkey: Option<&str>, apps: &[String]) -> String {
    let pubkey = pubkey
        .map(|key| format!(" pubkey=\"{key}\""))
        .unwrap_or_default();
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<fdroid>\n  \
         <repo name=\"Test Repo\" timestamp=\"{timestamp}\" version=\"21\" maxage=\"14\"{pubkey}>\n    \
         <description>Repository for integration tests.</description>\n  </repo>\n{}</fdroid>\n",
        apps.concat()
    )
}

/// Path of a file under `tests/fixtures`
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn fixture(name: &str) -> Vec<u8> {
    std::fs::read(fixture_path(name)).unwrap()
}

/// SHA-256 fingerprint of `tests/fixtures/primary.der`, which signs `index.jar`
pub const PRIMARY_FINGERPRINT: &str =
    "f3b5be61c0e61c8166573b429bda1d6af0df6bb2612ed87d2944d73f58519ce2";

/// SHA-256 fingerprint of `tests/fixtures/intruder.der`, which signs `index-intruder.jar`
pub const INTRUDER_FINGERPRINT: &str =
    "8d41e8ff7cbedaf598ba6fb5a255da7643bdc08b51873dd0fbbec05f9fa5e7e2";

// tests/signed_index.rs

//! Trust handling for signed `index.jar` archives
//!
//! `tests/fixtures/index.jar` is signed by `primary.der` and
//! `index-intruder.jar` by `intruder.der`; `index-forged.jar` is signed by
//! `intruder.der` but also carries `primary.der`. All publish the same app.
//! `tests/fixtures/generate.py` rebuilds them.

mod common;

use common::{
    INTRUDER_FINGERPRINT, MemoryFetcher, PRIMARY_FINGERPRINT, add_repo, app_xml,
    create_test_catalog, fixture, index_xml, index_xml_with_pubkey, sync,
};
use fdroid_sync::db::models::{App, Repository, Version, VersionKey};
use fdroid_sync::repository::{MergeStats, RepoStatus};
use fdroid_sync::FailureKind;

const FIXTURE: &str = "https://fixture.example.org/fdroid/repo";

fn jar_url() -> String {
    format!("{FIXTURE}/index.jar")
}

fn pin(catalog: &common::TestCatalog, repo_id: i64, fingerprint: &str) {
    let mut repo = Repository::find_by_id(&catalog.conn, repo_id)
        .unwrap()
        .unwrap();
    repo.fingerprint = Some(fingerprint.to_string());
    repo.update(&catalog.conn).unwrap();
}

#[test]
fn test_first_signed_index_is_trusted_on_first_use() {
    let mut catalog = create_test_catalog();
    let repo_id = add_repo(&catalog.conn, "fixture", FIXTURE, 0);
    let fetcher = MemoryFetcher::new();
    fetcher.serve(&jar_url(), fixture("index.jar"));

    let report = sync(&mut catalog, &fetcher);
    assert_eq!(
        report.repositories[0].status,
        RepoStatus::Updated(MergeStats { apps: 1, versions: 2 })
    );
    assert_eq!(fetcher.requests(), vec![jar_url()]);

    let repo = Repository::find_by_id(&catalog.conn, repo_id).unwrap().unwrap();
    assert_eq!(repo.fingerprint.as_deref(), Some(PRIMARY_FINGERPRINT));
    assert_eq!(repo.index_timestamp, 1_600_000_000);
    assert_eq!(repo.index_version, 21);
    assert_eq!(repo.max_age, 14);
    assert_eq!(repo.icon.as_deref(), Some("fdroid-icon.png"));
    assert_eq!(
        repo.description.as_deref(),
        Some("Signed repository used by the integration tests.")
    );
    assert_eq!(
        repo.mirrors,
        vec!["https://mirror.example.org/fdroid/repo".to_string()]
    );
    // The index's display name does not replace the local one
    assert_eq!(repo.name, "fixture");

    let app = App::find(&catalog.conn, "org.fixture.signed").unwrap().unwrap();
    assert_eq!(app.name.as_deref(), Some("Signed Fixture"));
    assert_eq!(app.suggested_version_code, 20);

    let version = Version::find(
        &catalog.conn,
        &VersionKey::new("org.fixture.signed", 20, repo_id),
    )
    .unwrap()
    .unwrap();
    assert_eq!(
        version.hash.as_deref(),
        Some("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
    );
    assert_eq!(version.hash_type.as_deref(), Some("sha256"));
    assert_eq!(version.size, 5);
}

#[test]
fn test_pinned_repository_accepts_its_signer() {
    let mut catalog = create_test_catalog();
    let repo_id = add_repo(&catalog.conn, "fixture", FIXTURE, 0);
    pin(&catalog, repo_id, PRIMARY_FINGERPRINT);
    let fetcher = MemoryFetcher::new();
    fetcher.serve(&jar_url(), fixture("index.jar"));

    let report = sync(&mut catalog, &fetcher);
    assert!(matches!(report.repositories[0].status, RepoStatus::Updated(_)));

    let repo = Repository::find_by_id(&catalog.conn, repo_id).unwrap().unwrap();
    assert_eq!(repo.fingerprint.as_deref(), Some(PRIMARY_FINGERPRINT));
}

#[test]
fn test_pinned_fingerprint_matches_case_insensitively() {
    let mut catalog = create_test_catalog();
    let repo_id = add_repo(&catalog.conn, "fixture", FIXTURE, 0);
    pin(&catalog, repo_id, &PRIMARY_FINGERPRINT.to_uppercase());
    let fetcher = MemoryFetcher::new();
    fetcher.serve(&jar_url(), fixture("index.jar"));

    let report = sync(&mut catalog, &fetcher);
    assert!(matches!(report.repositories[0].status, RepoStatus::Updated(_)));
}

#[test]
fn test_foreign_signer_is_rejected() {
    let mut catalog = create_test_catalog();
    let repo_id = add_repo(&catalog.conn, "fixture", FIXTURE, 0);
    let fetcher = MemoryFetcher::new();
    fetcher.serve(&jar_url(), fixture("index.jar"));
    sync(&mut catalog, &fetcher);
    let trusted = Repository::find_by_id(&catalog.conn, repo_id).unwrap().unwrap();

    fetcher.serve(&jar_url(), fixture("index-intruder.jar"));
    let report = sync(&mut catalog, &fetcher);

    let RepoStatus::Failed(failure) = &report.repositories[0].status else {
        panic!("expected a verification failure");
    };
    assert_eq!(failure.kind, FailureKind::Verification);
    assert!(failure.message.contains(INTRUDER_FINGERPRINT));
    assert!(report.summary().starts_with("Some repositories failed to update (fixture: verification: "));

    // Trust state and catalog entries are exactly as before
    let repo = Repository::find_by_id(&catalog.conn, repo_id).unwrap().unwrap();
    assert_eq!(repo.fingerprint.as_deref(), Some(PRIMARY_FINGERPRINT));
    assert_eq!(repo.index_timestamp, trusted.index_timestamp);
    assert_eq!(repo.last_etag, trusted.last_etag);
    assert_eq!(
        Version::find_by_package(&catalog.conn, "org.fixture.signed")
            .unwrap()
            .len(),
        2
    );
}

#[test]
fn test_pinned_repository_rejects_unsigned_content() {
    let mut catalog = create_test_catalog();
    let repo_id = add_repo(&catalog.conn, "fixture", FIXTURE, 0);
    pin(&catalog, repo_id, PRIMARY_FINGERPRINT);
    let fetcher = MemoryFetcher::new();
    fetcher.serve(
        &jar_url(),
        index_xml(1_700_000_000, &[app_xml("org.example.evil", "Evil", &[1], None)]),
    );

    let report = sync(&mut catalog, &fetcher);

    let RepoStatus::Failed(failure) = &report.repositories[0].status else {
        panic!("expected a verification failure");
    };
    assert_eq!(failure.kind, FailureKind::Verification);
    assert!(App::find(&catalog.conn, "org.example.evil").unwrap().is_none());
}

#[test]
fn test_pinned_repository_never_falls_back_to_index_xml() {
    let mut catalog = create_test_catalog();
    let repo_id = add_repo(&catalog.conn, "fixture", FIXTURE, 0);
    pin(&catalog, repo_id, PRIMARY_FINGERPRINT);
    let fetcher = MemoryFetcher::new();
    fetcher.serve(
        &format!("{FIXTURE}/index.xml"),
        index_xml(1_700_000_000, &[app_xml("org.example.evil", "Evil", &[1], None)]),
    );

    let report = sync(&mut catalog, &fetcher);

    let RepoStatus::Failed(failure) = &report.repositories[0].status else {
        panic!("expected a transport failure");
    };
    assert_eq!(failure.kind, FailureKind::Transport);
    assert_eq!(fetcher.requests(), vec![jar_url()]);
    assert!(App::find(&catalog.conn, "org.example.evil").unwrap().is_none());
}

#[test]
fn test_mirror_serves_index_when_primary_fails() {
    let mut catalog = create_test_catalog();
    let repo_id = add_repo(&catalog.conn, "fixture", FIXTURE, 0);
    let fetcher = MemoryFetcher::new();
    fetcher.serve(&jar_url(), fixture("index.jar"));
    sync(&mut catalog, &fetcher);

    // The index advertised a mirror; the primary address now goes away
    fetcher.withdraw(&jar_url());
    fetcher.serve(
        "https://mirror.example.org/fdroid/repo/index.jar",
        fixture("index-intruder.jar"),
    );
    let report = sync(&mut catalog, &fetcher);

    // Mirrors are held to the same certificate
    let RepoStatus::Failed(failure) = &report.repositories[0].status else {
        panic!("expected a verification failure");
    };
    assert_eq!(failure.kind, FailureKind::Verification);
    assert!(
        fetcher
            .requests()
            .contains(&"https://mirror.example.org/fdroid/repo/index.jar".to_string())
    );

    fetcher.serve(
        "https://mirror.example.org/fdroid/repo/index.jar",
        fixture("index.jar"),
    );
    let report = sync(&mut catalog, &fetcher);
    let status = &report.repositories[0].status;
    assert!(
        matches!(status, RepoStatus::Updated(_) | RepoStatus::NotModified),
        "unexpected status {status:?}"
    );
    let repo = Repository::find_by_id(&catalog.conn, repo_id).unwrap().unwrap();
    assert_eq!(repo.fingerprint.as_deref(), Some(PRIMARY_FINGERPRINT));
}

#[test]
fn test_declared_certificate_upgrades_unsigned_repository() {
    let mut catalog = create_test_catalog();
    let repo_id = add_repo(&catalog.conn, "fixture", FIXTURE, 0);
    let fetcher = MemoryFetcher::new();
    let pubkey = hex::encode(fixture("primary.der"));
    fetcher.serve(
        &format!("{FIXTURE}/index.xml"),
        index_xml_with_pubkey(
            1000,
            Some(&pubkey),
            &[app_xml("org.example.notes", "Notes", &[1], None)],
        ),
    );

    let report = sync(&mut catalog, &fetcher);
    assert!(matches!(report.repositories[0].status, RepoStatus::Updated(_)));
    let repo = Repository::find_by_id(&catalog.conn, repo_id).unwrap().unwrap();
    assert_eq!(repo.fingerprint.as_deref(), Some(PRIMARY_FINGERPRINT));

    // From now on only archives signed by that certificate are accepted
    fetcher.serve(&jar_url(), fixture("index-intruder.jar"));
    let report = sync(&mut catalog, &fetcher);
    let RepoStatus::Failed(failure) = &report.repositories[0].status else {
        panic!("expected a verification failure");
    };
    assert_eq!(failure.kind, FailureKind::Verification);

    fetcher.serve(&jar_url(), fixture("index.jar"));
    let report = sync(&mut catalog, &fetcher);
    assert!(matches!(report.repositories[0].status, RepoStatus::Updated(_)));
    assert!(App::find(&catalog.conn, "org.fixture.signed").unwrap().is_some());
    // The unsigned listing is superseded by the signed one
    assert!(App::find(&catalog.conn, "org.example.notes").unwrap().is_none());
}

#[test]
fn test_appended_trusted_certificate_does_not_vouch_for_foreign_signer() {
    let mut catalog = create_test_catalog();
    let repo_id = add_repo(&catalog.conn, "fixture", FIXTURE, 0);
    pin(&catalog, repo_id, PRIMARY_FINGERPRINT);
    let fetcher = MemoryFetcher::new();
    fetcher.serve(&jar_url(), fixture("index-forged.jar"));

    let report = sync(&mut catalog, &fetcher);

    let RepoStatus::Failed(failure) = &report.repositories[0].status else {
        panic!("expected a verification failure");
    };
    assert_eq!(failure.kind, FailureKind::Verification);
    assert!(App::find(&catalog.conn, "org.fixture.signed").unwrap().is_none());
    let repo = Repository::find_by_id(&catalog.conn, repo_id).unwrap().unwrap();
    assert_eq!(repo.fingerprint.as_deref(), Some(PRIMARY_FINGERPRINT));
    assert_eq!(repo.index_timestamp, 0);
}

#[test]
fn test_forged_archive_is_not_trusted_on_first_use() {
    let mut catalog = create_test_catalog();
    let repo_id = add_repo(&catalog.conn, "fixture", FIXTURE, 0);
    let fetcher = MemoryFetcher::new();
    fetcher.serve(&jar_url(), fixture("index-forged.jar"));

    let report = sync(&mut catalog, &fetcher);

    assert!(matches!(report.repositories[0].status, RepoStatus::Failed(_)));
    let repo = Repository::find_by_id(&catalog.conn, repo_id).unwrap().unwrap();
    assert!(repo.fingerprint.is_none());
}

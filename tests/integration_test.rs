// tests/integration_test.rs

//! Integration tests for fdroid-sync
//!
//! These tests verify end-to-end functionality across modules.

mod common;

use common::{MemoryFetcher, app_xml, create_test_catalog, index_xml, sync};
use fdroid_sync::db;
use fdroid_sync::db::models::{App, Version};
use fdroid_sync::lock::SyncLock;
use fdroid_sync::repository::{
    NewRepository, add_repository, list_repositories, remove_repository, set_repository_enabled,
};
use fdroid_sync::{Error, SyncConfig};
use tempfile::NamedTempFile;

#[test]
fn test_database_lifecycle() {
    // Create a temporary database
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file.path().to_str().unwrap().to_string();

    // Remove the temp file so init can create it
    drop(temp_file);

    let init_result = db::init(&db_path);
    assert!(
        init_result.is_ok(),
        "Database initialization should succeed"
    );
    assert!(
        std::path::Path::new(&db_path).exists(),
        "Database file should exist after initialization"
    );

    // Initializing twice is harmless
    assert!(db::init(&db_path).is_ok());

    let conn = db::open(&db_path).unwrap();
    let result: Result<i32, _> = conn.query_row("SELECT 1", [], |row| row.get(0));
    assert_eq!(result.unwrap(), 1, "Should be able to execute queries");
}

#[test]
fn test_database_init_creates_parent_directories() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir
        .path()
        .join("nested/path/to/catalog.db")
        .to_str()
        .unwrap()
        .to_string();

    let result = db::init(&db_path);
    assert!(result.is_ok(), "Should create parent directories");
    assert!(
        std::path::Path::new(&db_path).exists(),
        "Database should exist in nested path"
    );
}

#[test]
fn test_config_file_drives_the_engine() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("fdroid-sync.toml");
    std::fs::write(
        &config_path,
        "db_path = \"/tmp/catalog.db\"\nparallel_fetch = false\ndevice_sdk = 21\n",
    )
    .unwrap();

    let config = SyncConfig::load(&config_path).unwrap();
    assert_eq!(config.db_path, "/tmp/catalog.db");
    assert!(!config.parallel_fetch);
    assert_eq!(config.parse_options().device_sdk, 21);

    std::fs::write(&config_path, "fingerprint_algorithm = \"crc32\"\n").unwrap();
    assert!(matches!(
        SyncConfig::load(&config_path),
        Err(Error::ConfigError(_))
    ));
}

#[test]
fn test_repository_management_workflow() {
    let mut catalog = create_test_catalog();
    let lock_path = catalog.config.lock_path();

    let mut new = NewRepository::new("main", "https://repo.example.org/fdroid/repo");
    new.fingerprint = Some("EB:AE:DD:CF".to_string());
    new.priority = 5;
    let repo = add_repository(&catalog.conn, &lock_path, new).unwrap();
    assert_eq!(repo.fingerprint.as_deref(), Some("ebaeddcf"));
    assert_eq!(repo.priority, 5);

    add_repository(
        &catalog.conn,
        &lock_path,
        NewRepository::new("other", "https://other.example.org/fdroid/repo"),
    )
    .unwrap();
    let names: Vec<String> = list_repositories(&catalog.conn)
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(names, vec!["other".to_string(), "main".to_string()]);

    let fetcher = MemoryFetcher::new();
    fetcher.serve(
        "https://other.example.org/fdroid/repo/index.xml",
        index_xml(1000, &[app_xml("org.example.maps", "Maps", &[1, 2], None)]),
    );
    sync(&mut catalog, &fetcher);
    assert_eq!(
        Version::find_by_package(&catalog.conn, "org.example.maps")
            .unwrap()
            .len(),
        2
    );

    // Removing a repository takes its catalog entries with it
    remove_repository(&mut catalog.conn, &lock_path, "other").unwrap();
    assert!(App::find(&catalog.conn, "org.example.maps").unwrap().is_none());
    assert_eq!(list_repositories(&catalog.conn).unwrap().len(), 1);
}

#[test]
fn test_repository_edits_wait_for_sync() {
    let catalog = create_test_catalog();
    let lock_path = catalog.config.lock_path();
    add_repository(
        &catalog.conn,
        &lock_path,
        NewRepository::new("main", "https://repo.example.org/fdroid/repo"),
    )
    .unwrap();

    let held = SyncLock::acquire(&lock_path).unwrap();
    let err = set_repository_enabled(&catalog.conn, &lock_path, "main", false).unwrap_err();
    assert!(matches!(err, Error::ConflictError(_)));
    drop(held);

    set_repository_enabled(&catalog.conn, &lock_path, "main", false).unwrap();
    assert!(!list_repositories(&catalog.conn).unwrap()[0].enabled);
}

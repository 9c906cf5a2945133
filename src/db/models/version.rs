// src/db/models/version.rs

//! Version model - one published APK of an app from one repository

use super::{decode_date, decode_list, encode_date, encode_list};
use crate::error::Result;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, params};

const COLUMNS: &str = "id, package_name, version_code, version_name, repo_id, apk_name, size,
     hash_type, hash, signer, min_sdk, target_sdk, max_sdk, native_code, permissions,
     features, src_name, added";

/// Identity of a version record: the same code from two repositories is two records
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionKey {
    pub package_name: String,
    pub version_code: i64,
    pub repo_id: i64,
}

impl VersionKey {
    pub fn new(package_name: impl Into<String>, version_code: i64, repo_id: i64) -> Self {
        Self {
            package_name: package_name.into(),
            version_code,
            repo_id,
        }
    }
}

/// Version represents one APK of an app as published by one repository
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Version {
    pub id: Option<i64>,
    pub package_name: String,
    /// Ordering key; `-1` when the index carried a malformed value
    pub version_code: i64,
    pub version_name: Option<String>,
    pub repo_id: i64,
    pub apk_name: Option<String>,
    pub size: i64,
    pub hash_type: Option<String>,
    pub hash: Option<String>,
    /// Fingerprint of the APK signing certificate (not the repository's)
    pub signer: Option<String>,
    pub min_sdk: i32,
    pub target_sdk: i32,
    pub max_sdk: i32,
    pub native_code: Vec<String>,
    pub permissions: Vec<String>,
    pub features: Vec<String>,
    pub src_name: Option<String>,
    pub added: Option<NaiveDate>,
}

impl Version {
    /// Create a new Version with only its identity set
    pub fn new(package_name: String, version_code: i64, repo_id: i64) -> Self {
        Self {
            package_name,
            version_code,
            repo_id,
            ..Default::default()
        }
    }

    pub fn key(&self) -> VersionKey {
        VersionKey::new(self.package_name.clone(), self.version_code, self.repo_id)
    }

    /// Insert or update in place by (package, version code, repository)
    pub fn upsert(&mut self, conn: &Connection) -> Result<i64> {
        let id = conn.query_row(
            "INSERT INTO versions (package_name, version_code, version_name, repo_id, apk_name,
                                   size, hash_type, hash, signer, min_sdk, target_sdk, max_sdk,
                                   native_code, permissions, features, src_name, added)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
             ON CONFLICT(package_name, version_code, repo_id) DO UPDATE SET
                version_name = excluded.version_name,
                apk_name = excluded.apk_name,
                size = excluded.size,
                hash_type = excluded.hash_type,
                hash = excluded.hash,
                signer = excluded.signer,
                min_sdk = excluded.min_sdk,
                target_sdk = excluded.target_sdk,
                max_sdk = excluded.max_sdk,
                native_code = excluded.native_code,
                permissions = excluded.permissions,
                features = excluded.features,
                src_name = excluded.src_name,
                added = excluded.added
             RETURNING id",
            params![
                &self.package_name,
                &self.version_code,
                &self.version_name,
                &self.repo_id,
                &self.apk_name,
                &self.size,
                &self.hash_type,
                &self.hash,
                &self.signer,
                &self.min_sdk,
                &self.target_sdk,
                &self.max_sdk,
                encode_list(&self.native_code),
                encode_list(&self.permissions),
                encode_list(&self.features),
                &self.src_name,
                encode_date(self.added),
            ],
            |row| row.get(0),
        )?;

        self.id = Some(id);
        Ok(id)
    }

    /// Find a version by its key
    pub fn find(conn: &Connection, key: &VersionKey) -> Result<Option<Self>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM versions
             WHERE package_name = ?1 AND version_code = ?2 AND repo_id = ?3"
        );
        let version = conn
            .query_row(
                &sql,
                params![&key.package_name, key.version_code, key.repo_id],
                Self::from_row,
            )
            .optional()?;
        Ok(version)
    }

    /// All versions of a package, newest first
    pub fn find_by_package(conn: &Connection, package_name: &str) -> Result<Vec<Self>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM versions WHERE package_name = ?1
             ORDER BY version_code DESC, repo_id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let versions = stmt
            .query_map([package_name], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(versions)
    }

    /// Keys of every stored version
    pub fn list_keys(conn: &Connection) -> Result<Vec<VersionKey>> {
        let mut stmt =
            conn.prepare("SELECT package_name, version_code, repo_id FROM versions")?;
        let keys = stmt
            .query_map([], |row| {
                Ok(VersionKey {
                    package_name: row.get(0)?,
                    version_code: row.get(1)?,
                    repo_id: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    /// Number of versions published by a repository
    pub fn count_for_repo(conn: &Connection, repo_id: i64) -> Result<i64> {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM versions WHERE repo_id = ?1",
            [repo_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Delete a version by its key
    pub fn delete(conn: &Connection, key: &VersionKey) -> Result<()> {
        conn.execute(
            "DELETE FROM versions WHERE package_name = ?1 AND version_code = ?2 AND repo_id = ?3",
            params![&key.package_name, key.version_code, key.repo_id],
        )?;
        Ok(())
    }

    /// Convert a database row to a Version
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            package_name: row.get(1)?,
            version_code: row.get(2)?,
            version_name: row.get(3)?,
            repo_id: row.get(4)?,
            apk_name: row.get(5)?,
            size: row.get(6)?,
            hash_type: row.get(7)?,
            hash: row.get(8)?,
            signer: row.get(9)?,
            min_sdk: row.get(10)?,
            target_sdk: row.get(11)?,
            max_sdk: row.get(12)?,
            native_code: decode_list(row.get(13)?),
            permissions: decode_list(row.get(14)?),
            features: decode_list(row.get(15)?),
            src_name: row.get(16)?,
            added: decode_date(row.get(17)?),
        })
    }
}

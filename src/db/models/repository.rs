// src/db/models/repository.rs

//! Repository model - configured index sources and their trust state

use super::{decode_list, encode_list};
use crate::error::{Error, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};

const COLUMNS: &str = "id, name, address, fingerprint, last_etag, last_updated, index_timestamp,
     enabled, priority, username, password, mirrors, description, icon, max_age,
     index_version, created_at";

/// Repository represents a remote (or local) application index
#[derive(Debug, Clone, PartialEq)]
pub struct Repository {
    pub id: Option<i64>,
    pub name: String,
    /// Base address: `https://…`, `file://…` or a plain local path
    pub address: String,
    /// Trusted signing-certificate fingerprint; `None` for unsigned/legacy
    pub fingerprint: Option<String>,
    /// Revalidation token (ETag) from the last full fetch
    pub last_etag: Option<String>,
    /// RFC 3339 time of the last successful sync
    pub last_updated: Option<String>,
    /// `<repo timestamp>` of the last accepted index
    pub index_timestamp: i64,
    pub enabled: bool,
    /// Processing order; lower first, so higher values win metadata conflicts
    pub priority: i32,
    pub username: Option<String>,
    pub password: Option<String>,
    pub mirrors: Vec<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub max_age: i32,
    pub index_version: i32,
    pub created_at: Option<String>,
}

impl Repository {
    /// Create a new Repository
    pub fn new(name: String, address: String) -> Self {
        Self {
            id: None,
            name,
            address,
            fingerprint: None,
            last_etag: None,
            last_updated: None,
            index_timestamp: 0,
            enabled: true,
            priority: 0,
            username: None,
            password: None,
            mirrors: Vec::new(),
            description: None,
            icon: None,
            max_age: 0,
            index_version: 0,
            created_at: None,
        }
    }

    /// Database id, or an error for a repository that was never inserted
    pub fn require_id(&self) -> Result<i64> {
        self.id
            .ok_or_else(|| Error::InitError(format!("Repository '{}' has no ID", self.name)))
    }

    /// Credentials, if both username and password are configured
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }

    /// Insert this repository into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO repositories (name, address, fingerprint, enabled, priority, username,
                                       password, mirrors, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &self.name,
                &self.address,
                &self.fingerprint,
                self.enabled as i32,
                &self.priority,
                &self.username,
                &self.password,
                encode_list(&self.mirrors),
                &self.description,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find a repository by ID
    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let sql = format!("SELECT {COLUMNS} FROM repositories WHERE id = ?1");
        let repo = conn.query_row(&sql, [id], Self::from_row).optional()?;
        Ok(repo)
    }

    /// Find a repository by name
    pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Self>> {
        let sql = format!("SELECT {COLUMNS} FROM repositories WHERE name = ?1");
        let repo = conn.query_row(&sql, [name], Self::from_row).optional()?;
        Ok(repo)
    }

    /// List all repositories in processing order
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let sql = format!("SELECT {COLUMNS} FROM repositories ORDER BY priority ASC, id ASC");
        let mut stmt = conn.prepare(&sql)?;
        let repos = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(repos)
    }

    /// Update every mutable column
    pub fn update(&self, conn: &Connection) -> Result<()> {
        let id = self.require_id()?;

        conn.execute(
            "UPDATE repositories SET name = ?1, address = ?2, fingerprint = ?3, last_etag = ?4,
             last_updated = ?5, index_timestamp = ?6, enabled = ?7, priority = ?8,
             username = ?9, password = ?10, mirrors = ?11, description = ?12, icon = ?13,
             max_age = ?14, index_version = ?15 WHERE id = ?16",
            params![
                &self.name,
                &self.address,
                &self.fingerprint,
                &self.last_etag,
                &self.last_updated,
                &self.index_timestamp,
                self.enabled as i32,
                &self.priority,
                &self.username,
                &self.password,
                encode_list(&self.mirrors),
                &self.description,
                &self.icon,
                &self.max_age,
                &self.index_version,
                id,
            ],
        )?;

        Ok(())
    }

    /// Delete a repository by ID
    ///
    /// Its versions go with it (cascade); apps whose metadata came from it
    /// lose their source and are cleaned up by [`super::App::delete_unreferenced`].
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM repositories WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Convert a database row to a Repository
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            address: row.get(2)?,
            fingerprint: row.get(3)?,
            last_etag: row.get(4)?,
            last_updated: row.get(5)?,
            index_timestamp: row.get(6)?,
            enabled: row.get::<_, i32>(7)? != 0,
            priority: row.get(8)?,
            username: row.get(9)?,
            password: row.get(10)?,
            mirrors: decode_list(row.get(11)?),
            description: row.get(12)?,
            icon: row.get(13)?,
            max_age: row.get(14)?,
            index_version: row.get(15)?,
            created_at: row.get(16)?,
        })
    }
}

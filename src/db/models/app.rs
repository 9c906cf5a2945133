// src/db/models/app.rs

//! App model - one row per package name across all repositories

use super::{decode_date, decode_list, encode_date, encode_list};
use crate::error::{Error, Result};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, params};

const COLUMNS: &str = "package_name, repo_id, name, summary, description, icon, license,
     author_name, author_email, web_site, source_code, issue_tracker, changelog, donate,
     categories, anti_features, suggested_version_name, suggested_version_code, added,
     last_updated, ignore_all_updates, ignore_this_update, installed_version_code,
     installed_signer, has_update";

/// App represents an application in the merged catalog
///
/// Display fields come from the highest-priority repository that published
/// the package (`repo_id`). The ignore flags belong to the user and the installed-state
/// columns are a cache refreshed on every sync; neither is touched by
/// [`App::upsert`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct App {
    pub package_name: String,
    pub repo_id: Option<i64>,
    pub name: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub license: Option<String>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub web_site: Option<String>,
    pub source_code: Option<String>,
    pub issue_tracker: Option<String>,
    pub changelog: Option<String>,
    pub donate: Option<String>,
    pub categories: Vec<String>,
    pub anti_features: Vec<String>,
    pub suggested_version_name: Option<String>,
    pub suggested_version_code: i64,
    pub added: Option<NaiveDate>,
    pub last_updated: Option<NaiveDate>,
    pub ignore_all_updates: bool,
    /// Updates up to and including this version code are ignored
    pub ignore_this_update: i64,
    pub installed_version_code: i64,
    pub installed_signer: Option<String>,
    pub has_update: bool,
}

impl App {
    /// Create a new App with only its package name set
    pub fn new(package_name: String) -> Self {
        Self {
            package_name,
            ..Default::default()
        }
    }

    /// Insert the app, or overwrite the display fields of an existing row
    pub fn upsert(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO apps (package_name, repo_id, name, summary, description, icon, license,
                               author_name, author_email, web_site, source_code, issue_tracker,
                               changelog, donate, categories, anti_features,
                               suggested_version_name, suggested_version_code, added, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                     ?17, ?18, ?19, ?20)
             ON CONFLICT(package_name) DO UPDATE SET
                repo_id = excluded.repo_id,
                name = excluded.name,
                summary = excluded.summary,
                description = excluded.description,
                icon = excluded.icon,
                license = excluded.license,
                author_name = excluded.author_name,
                author_email = excluded.author_email,
                web_site = excluded.web_site,
                source_code = excluded.source_code,
                issue_tracker = excluded.issue_tracker,
                changelog = excluded.changelog,
                donate = excluded.donate,
                categories = excluded.categories,
                anti_features = excluded.anti_features,
                suggested_version_name = excluded.suggested_version_name,
                suggested_version_code = excluded.suggested_version_code,
                added = excluded.added,
                last_updated = excluded.last_updated",
            params![
                &self.package_name,
                &self.repo_id,
                &self.name,
                &self.summary,
                &self.description,
                &self.icon,
                &self.license,
                &self.author_name,
                &self.author_email,
                &self.web_site,
                &self.source_code,
                &self.issue_tracker,
                &self.changelog,
                &self.donate,
                encode_list(&self.categories),
                encode_list(&self.anti_features),
                &self.suggested_version_name,
                &self.suggested_version_code,
                encode_date(self.added),
                encode_date(self.last_updated),
            ],
        )?;
        Ok(())
    }

    /// Find an app by package name
    pub fn find(conn: &Connection, package_name: &str) -> Result<Option<Self>> {
        let sql = format!("SELECT {COLUMNS} FROM apps WHERE package_name = ?1");
        let app = conn
            .query_row(&sql, [package_name], Self::from_row)
            .optional()?;
        Ok(app)
    }

    /// Id, priority and enabled flag of the repository owning an app's display fields
    ///
    /// `None` when the app is absent or its owner no longer exists.
    pub fn owner_rank(conn: &Connection, package_name: &str) -> Result<Option<(i64, i32, bool)>> {
        let owner = conn
            .query_row(
                "SELECT r.id, r.priority, r.enabled FROM apps a
                 JOIN repositories r ON r.id = a.repo_id
                 WHERE a.package_name = ?1",
                [package_name],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        Ok(owner)
    }

    /// List all apps ordered by package name
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        Self::query(conn, "1 = 1")
    }

    /// List apps the last sync found installed
    pub fn list_installed(conn: &Connection) -> Result<Vec<Self>> {
        Self::query(conn, "installed_version_code > 0")
    }

    /// List apps with an actionable update as of the last sync
    pub fn list_with_updates(conn: &Connection) -> Result<Vec<Self>> {
        Self::query(conn, "has_update = 1")
    }

    fn query(conn: &Connection, filter: &str) -> Result<Vec<Self>> {
        let sql = format!("SELECT {COLUMNS} FROM apps WHERE {filter} ORDER BY package_name");
        let mut stmt = conn.prepare(&sql)?;
        let apps = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(apps)
    }

    /// Every package name with its metadata source
    pub fn list_keys(conn: &Connection) -> Result<Vec<(String, Option<i64>)>> {
        let mut stmt = conn.prepare("SELECT package_name, repo_id FROM apps")?;
        let keys = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    /// Set the user's ignore flags for a package
    pub fn set_ignore(
        conn: &Connection,
        package_name: &str,
        ignore_all: bool,
        ignore_this_update: i64,
    ) -> Result<()> {
        let changed = conn.execute(
            "UPDATE apps SET ignore_all_updates = ?1, ignore_this_update = ?2
             WHERE package_name = ?3",
            params![ignore_all as i32, ignore_this_update, package_name],
        )?;
        if changed == 0 {
            return Err(Error::NotFoundError(format!(
                "Application '{package_name}' not found"
            )));
        }
        Ok(())
    }

    /// Clear the installed-state cache for every app
    pub fn reset_installed_state(conn: &Connection) -> Result<()> {
        conn.execute(
            "UPDATE apps SET installed_version_code = 0, installed_signer = NULL, has_update = 0
             WHERE installed_version_code != 0 OR installed_signer IS NOT NULL OR has_update != 0",
            [],
        )?;
        Ok(())
    }

    /// Record the installed-state cache for one app
    pub fn update_installed_state(
        conn: &Connection,
        package_name: &str,
        installed_version_code: i64,
        installed_signer: Option<&str>,
        has_update: bool,
    ) -> Result<()> {
        conn.execute(
            "UPDATE apps SET installed_version_code = ?1, installed_signer = ?2, has_update = ?3
             WHERE package_name = ?4",
            params![
                installed_version_code,
                installed_signer,
                has_update as i32,
                package_name
            ],
        )?;
        Ok(())
    }

    /// Delete an app and, by cascade, its versions
    pub fn delete(conn: &Connection, package_name: &str) -> Result<()> {
        conn.execute("DELETE FROM apps WHERE package_name = ?1", [package_name])?;
        Ok(())
    }

    /// Delete apps that lost their metadata source and have no versions left
    pub fn delete_unreferenced(conn: &Connection) -> Result<usize> {
        let deleted = conn.execute(
            "DELETE FROM apps WHERE repo_id IS NULL
             AND NOT EXISTS (SELECT 1 FROM versions v WHERE v.package_name = apps.package_name)",
            [],
        )?;
        Ok(deleted)
    }

    /// Convert a database row to an App
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            package_name: row.get(0)?,
            repo_id: row.get(1)?,
            name: row.get(2)?,
            summary: row.get(3)?,
            description: row.get(4)?,
            icon: row.get(5)?,
            license: row.get(6)?,
            author_name: row.get(7)?,
            author_email: row.get(8)?,
            web_site: row.get(9)?,
            source_code: row.get(10)?,
            issue_tracker: row.get(11)?,
            changelog: row.get(12)?,
            donate: row.get(13)?,
            categories: decode_list(row.get(14)?),
            anti_features: decode_list(row.get(15)?),
            suggested_version_name: row.get(16)?,
            suggested_version_code: row.get(17)?,
            added: decode_date(row.get(18)?),
            last_updated: decode_date(row.get(19)?),
            ignore_all_updates: row.get::<_, i32>(20)? != 0,
            ignore_this_update: row.get(21)?,
            installed_version_code: row.get(22)?,
            installed_signer: row.get(23)?,
            has_update: row.get::<_, i32>(24)? != 0,
        })
    }
}

// src/db/mod.rs

//! Catalog database
//!
//! All durable state (repositories, applications, versions) lives in a
//! single SQLite file. Writers go through [`transaction`]; readers open
//! their own connection and, thanks to WAL mode, never block on a sync in
//! progress and never see a half-applied merge.

pub mod models;
pub mod paths;
pub mod schema;

use crate::error::{Error, Result};
use rusqlite::{Connection, Transaction};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// How long a writer waits for another writer before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Create the database file (if needed) and bring the schema up to date
pub fn init(db_path: &str) -> Result<()> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::InitError(format!(
                    "Failed to create database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
    }

    let conn = open(db_path)?;
    schema::migrate(&conn)?;
    info!("Catalog database ready at {}", db_path);
    Ok(())
}

/// Open a connection to an initialized database
pub fn open(db_path: &str) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .map_err(|e| Error::InitError(format!("Failed to open database {db_path}: {e}")))?;
    configure(&conn)?;
    debug!("Opened catalog database {}", db_path);
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update(None, "foreign_keys", true)?;
    // journal_mode reports the resulting mode as a row
    let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    debug!("Journal mode: {}", mode);
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(())
}

/// Run `f` inside a transaction, committing on `Ok` and rolling back on `Err`
pub fn transaction<T, F>(conn: &mut Connection, f: F) -> Result<T>
where
    F: FnOnce(&Transaction<'_>) -> Result<T>,
{
    let tx = conn.transaction()?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}

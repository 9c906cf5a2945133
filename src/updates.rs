// src/updates.rs

//! Update availability
//!
//! An installed app has an actionable update when the catalog's suggested
//! version is newer than the installed version code, a record of that
//! version exists, and the user has not ignored it. Version codes are the
//! only comparison key.

use crate::db::models::{App, Version};
use crate::error::Result;
use crate::installed::{InstalledPackage, InstalledSnapshot};
use rusqlite::Connection;
use tracing::debug;

/// Whether `app` offers an update over `installed`
///
/// `versions` are the catalog records of the app from any repository. When
/// both the installed signer and the suggested version's signers are known,
/// at least one record of the suggested version must carry the installed
/// signer; an APK signed by someone else could not be installed over it.
pub fn has_update(app: &App, installed: &InstalledPackage, versions: &[Version]) -> bool {
    let suggested = app.suggested_version_code;
    if installed.version_code <= 0 || suggested <= 0 || suggested <= installed.version_code {
        return false;
    }
    if app.ignore_all_updates || app.ignore_this_update >= suggested {
        return false;
    }

    let candidates: Vec<&Version> = versions
        .iter()
        .filter(|v| v.package_name == app.package_name && v.version_code == suggested)
        .collect();
    if candidates.is_empty() {
        return false;
    }

    let Some(installed_signer) = installed.signer.as_deref() else {
        return true;
    };
    let known: Vec<&str> = candidates
        .iter()
        .filter_map(|v| v.signer.as_deref())
        .collect();
    known.is_empty()
        || known
            .iter()
            .any(|signer| signer.eq_ignore_ascii_case(installed_signer))
}

/// Evaluate one installed package against the catalog
fn evaluate(conn: &Connection, installed: &InstalledPackage) -> Result<Option<bool>> {
    let Some(app) = App::find(conn, &installed.package_name)? else {
        return Ok(None);
    };
    let versions = Version::find_by_package(conn, &app.package_name)?;
    Ok(Some(has_update(&app, installed, &versions)))
}

/// Number of installed apps with an actionable update in the current catalog
pub fn count_updates(conn: &Connection, snapshot: &InstalledSnapshot) -> Result<usize> {
    let mut count = 0;
    for installed in snapshot.iter() {
        if evaluate(conn, installed)? == Some(true) {
            count += 1;
        }
    }
    Ok(count)
}

/// Rewrite the installed-state cache on every app and return the update count
pub fn refresh_installed_state(conn: &Connection, snapshot: &InstalledSnapshot) -> Result<usize> {
    App::reset_installed_state(conn)?;

    let mut count = 0;
    for installed in snapshot.iter() {
        let Some(update) = evaluate(conn, installed)? else {
            continue;
        };
        App::update_installed_state(
            conn,
            &installed.package_name,
            installed.version_code,
            installed.signer.as_deref(),
            update,
        )?;
        if update {
            debug!("Update available for {}", installed.package_name);
            count += 1;
        }
    }
    Ok(count)
}

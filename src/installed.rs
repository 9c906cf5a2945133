// src/installed.rs

//! Installed packages on the device
//!
//! The sync engine asks an [`InstalledPackageSource`] for a fresh snapshot on
//! every pass; nothing here is persisted. The catalog keeps only a cache of
//! the result (installed code, signer, has-update) on each app row.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One installed package as reported by the package manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub package_name: String,
    pub version_code: i64,
    /// Fingerprint of the installed APK's signing certificate, if known
    #[serde(default)]
    pub signer: Option<String>,
}

impl InstalledPackage {
    pub fn new(package_name: impl Into<String>, version_code: i64) -> Self {
        Self {
            package_name: package_name.into(),
            version_code,
            signer: None,
        }
    }

    pub fn with_signer(mut self, signer: impl Into<String>) -> Self {
        self.signer = Some(signer.into());
        self
    }
}

/// Enumerates what is installed on the device
pub trait InstalledPackageSource: Send + Sync {
    fn installed_packages(&self) -> Result<Vec<InstalledPackage>>;
}

/// A fixed list of installed packages
#[derive(Debug, Clone, Default)]
pub struct StaticInstalledSource {
    packages: Vec<InstalledPackage>,
}

impl StaticInstalledSource {
    pub fn new(packages: Vec<InstalledPackage>) -> Self {
        Self { packages }
    }
}

impl InstalledPackageSource for StaticInstalledSource {
    fn installed_packages(&self) -> Result<Vec<InstalledPackage>> {
        Ok(self.packages.clone())
    }
}

/// Reads a JSON array of [`InstalledPackage`] from disk on every call
///
/// A missing file means nothing is installed.
#[derive(Debug, Clone)]
pub struct JsonInstalledSource {
    path: PathBuf,
}

impl JsonInstalledSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl InstalledPackageSource for JsonInstalledSource {
    fn installed_packages(&self) -> Result<Vec<InstalledPackage>> {
        if !self.path.exists() {
            debug!("No installed-package snapshot at {}", self.path.display());
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&content).map_err(|e| {
            Error::ParseError(format!(
                "Invalid installed-package snapshot {}: {e}",
                self.path.display()
            ))
        })
    }
}

/// Installed state captured once at the start of a sync pass
///
/// Signers are normalized to lowercase. Entries with a non-positive version
/// code are dropped; they do not count as installed.
#[derive(Debug, Clone, Default)]
pub struct InstalledSnapshot {
    packages: HashMap<String, InstalledPackage>,
}

impl InstalledSnapshot {
    /// Query `source` and index the result by package name
    pub fn capture(source: &dyn InstalledPackageSource) -> Result<Self> {
        Ok(Self::from_packages(source.installed_packages()?))
    }

    pub fn from_packages(packages: Vec<InstalledPackage>) -> Self {
        let packages = packages
            .into_iter()
            .filter(|p| p.version_code > 0)
            .map(|mut p| {
                p.signer = p
                    .signer
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty());
                (p.package_name.clone(), p)
            })
            .collect();
        Self { packages }
    }

    pub fn get(&self, package_name: &str) -> Option<&InstalledPackage> {
        self.packages.get(package_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstalledPackage> {
        self.packages.values()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_snapshot_normalizes_entries() {
        let snapshot = InstalledSnapshot::from_packages(vec![
            InstalledPackage::new("org.example.a", 10).with_signer("  ABCDEF "),
            InstalledPackage::new("org.example.b", 0),
            InstalledPackage::new("org.example.c", 3).with_signer(""),
        ]);

        assert_eq!(snapshot.len(), 2);
        assert_eq!(
            snapshot.get("org.example.a").unwrap().signer.as_deref(),
            Some("abcdef")
        );
        assert!(snapshot.get("org.example.b").is_none());
        assert!(snapshot.get("org.example.c").unwrap().signer.is_none());
    }

    #[test]
    fn test_json_source() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("installed.json");

        let source = JsonInstalledSource::new(&path);
        assert!(source.installed_packages().unwrap().is_empty());

        std::fs::write(
            &path,
            r#"[{"package_name": "org.example.a", "version_code": 7, "signer": "aa"},
                {"package_name": "org.example.b", "version_code": 2}]"#,
        )
        .unwrap();
        let packages = source.installed_packages().unwrap();
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0], InstalledPackage::new("org.example.a", 7).with_signer("aa"));
        assert!(packages[1].signer.is_none());

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            source.installed_packages().unwrap_err(),
            Error::ParseError(_)
        ));
    }
}

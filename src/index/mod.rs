// src/index/mod.rs

//! Repository index documents
//!
//! An index arrives either as raw `index.xml` or wrapped in a signed
//! `index.jar`. [`jar`] unpacks and verifies the archive; [`parser`] turns the
//! XML into repository metadata plus a lazy sequence of applications.

pub mod jar;
pub mod parser;

pub use jar::{SignedIndex, open_signed_index};
pub use parser::{IndexReader, ParseOptions};

use crate::db::models::{App, Version};
use crate::error::Result;
use std::collections::HashMap;

/// Archive files start with a local file header
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Whether fetched bytes are a signed archive rather than raw XML
pub fn is_archive(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_MAGIC)
}

/// Repository-level metadata from the `<repo>` element
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepoMetadata {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Hex-encoded signing certificate the document declares for itself
    pub pubkey: Option<String>,
    /// Seconds since the epoch; 0 when absent or malformed
    pub timestamp: i64,
    pub version: i32,
    pub max_age: i32,
    pub icon: Option<String>,
    pub mirrors: Vec<String>,
}

impl RepoMetadata {
    /// Declared signing certificate, if the document carries one
    pub fn declared_certificate(&self) -> Option<&str> {
        self.pubkey.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// One `<application>` with its `<package>` entries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedApp {
    pub app: App,
    pub versions: Vec<Version>,
    /// Whether the suggested version came from `<marketvercode>` rather than
    /// the highest parsed version
    pub suggested_declared: bool,
}

impl ParsedApp {
    /// Fold a later occurrence of the same package into this one
    ///
    /// Versions are appended. Metadata already present is kept; only fields
    /// this occurrence lacks are filled from `other`.
    pub fn absorb(&mut self, other: ParsedApp) {
        self.suggested_declared = absorb_metadata(
            &mut self.app,
            self.suggested_declared,
            other.app,
            other.suggested_declared,
        );
        self.versions.extend(other.versions);
    }
}

/// Merge `other` into `target` without discarding anything `target` has
///
/// Returns whether the resulting suggested version is publisher-declared.
pub fn absorb_metadata(
    target: &mut App,
    target_declared: bool,
    other: App,
    other_declared: bool,
) -> bool {
    fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
        if slot.is_none() {
            *slot = value;
        }
    }

    fill(&mut target.name, other.name);
    fill(&mut target.summary, other.summary);
    fill(&mut target.description, other.description);
    fill(&mut target.icon, other.icon);
    fill(&mut target.license, other.license);
    fill(&mut target.author_name, other.author_name);
    fill(&mut target.author_email, other.author_email);
    fill(&mut target.web_site, other.web_site);
    fill(&mut target.source_code, other.source_code);
    fill(&mut target.issue_tracker, other.issue_tracker);
    fill(&mut target.changelog, other.changelog);
    fill(&mut target.donate, other.donate);
    fill(&mut target.added, other.added);
    fill(&mut target.last_updated, other.last_updated);
    if target.categories.is_empty() {
        target.categories = other.categories;
    }
    if target.anti_features.is_empty() {
        target.anti_features = other.anti_features;
    }

    match (target_declared, other_declared) {
        (true, _) => true,
        (false, true) => {
            target.suggested_version_code = other.suggested_version_code;
            target.suggested_version_name = other.suggested_version_name;
            true
        }
        (false, false) => {
            if other.suggested_version_code > target.suggested_version_code {
                target.suggested_version_code = other.suggested_version_code;
                target.suggested_version_name = other.suggested_version_name;
            }
            false
        }
    }
}

/// A fully collected index
#[derive(Debug, Clone, Default)]
pub struct ParsedIndex {
    pub repo: RepoMetadata,
    pub apps: Vec<ParsedApp>,
}

impl ParsedIndex {
    pub fn app(&self, package_name: &str) -> Option<&ParsedApp> {
        self.apps.iter().find(|a| a.app.package_name == package_name)
    }
}

/// Parse a whole index document into memory
///
/// Duplicate packages are folded together with [`ParsedApp::absorb`]. The
/// sync engine uses [`IndexReader`] directly so it never holds more than one
/// application at a time.
pub fn parse(bytes: &[u8], repo_id: i64, options: ParseOptions) -> Result<ParsedIndex> {
    let mut reader = IndexReader::new(bytes, repo_id, options)?;
    let mut apps: Vec<ParsedApp> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    while let Some(parsed) = reader.next_app()? {
        match positions.get(&parsed.app.package_name) {
            Some(&pos) => apps[pos].absorb(parsed),
            None => {
                positions.insert(parsed.app.package_name.clone(), apps.len());
                apps.push(parsed);
            }
        }
    }

    Ok(ParsedIndex {
        repo: reader.into_repo(),
        apps,
    })
}

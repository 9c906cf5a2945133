// src/db/models/mod.rs

//! Data models for catalog database entities
//!
//! This module defines Rust structs that correspond to database tables
//! and provides methods for creating, reading, updating, and deleting records.

mod app;
mod repository;
mod version;

pub use app::App;
pub use repository::Repository;
pub use version::{Version, VersionKey};

use chrono::NaiveDate;

/// Date format used by index documents and the date columns
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Serialize a list column as a JSON array
pub(crate) fn encode_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

/// Deserialize a JSON array column; malformed or NULL values read as empty
pub(crate) fn decode_list(raw: Option<String>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

pub(crate) fn encode_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format(DATE_FORMAT).to_string())
}

pub(crate) fn decode_date(raw: Option<String>) -> Option<NaiveDate> {
    raw.and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok())
}

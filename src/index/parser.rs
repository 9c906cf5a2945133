// src/index/parser.rs

//! Pull-based reader for `index.xml`
//!
//! [`IndexReader::new`] consumes the document up to the first
//! `<application>`, so repository metadata (including the declared signing
//! certificate and timestamp) is available before any application is
//! produced. Each call to [`IndexReader::next_app`] then yields exactly one
//! application with its packages; nothing else is retained.
//!
//! Malformed numeric fields never abort the parse: version codes fall back
//! to `-1`, sizes and SDK levels to `0`. Unparseable dates read as `None`.
//! Broken XML structure is a [`Error::ParseError`].

use super::{ParsedApp, RepoMetadata};
use crate::db::models::{App, DATE_FORMAT, Version};
use crate::error::{Error, Result};
use chrono::NaiveDate;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::str::FromStr;
use tracing::{debug, trace};

/// SDK level assumed for `uses-permission` filtering when none is configured
pub const DEFAULT_DEVICE_SDK: i32 = 34;

/// First SDK level where `uses-permission-sdk-23` entries apply
const SDK_23: i32 = 23;

/// Version code used when `<versioncode>` is missing or malformed
pub const VERSION_CODE_SENTINEL: i64 = -1;

/// Options that affect how an index is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// SDK level of the device the catalog is built for
    pub device_sdk: i32,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            device_sdk: DEFAULT_DEVICE_SDK,
        }
    }
}

/// Owned form of the XML events the reader cares about
enum Token {
    Start {
        name: String,
        attrs: Vec<(String, String)>,
        empty: bool,
    },
    End(String),
    Text(String),
    Eof,
}

enum Step {
    Continue,
    HeaderDone,
    App(ParsedApp),
    Eof,
}

/// Streaming index reader
pub struct IndexReader<'a> {
    reader: Reader<&'a [u8]>,
    buf: Vec<u8>,
    repo_id: i64,
    options: ParseOptions,
    repo: RepoMetadata,
    seen_repo: bool,
    header_done: bool,
    done: bool,
    /// End tag owed for a self-closing element
    pending_end: Option<String>,
    text: String,
    current_app: Option<ParsedApp>,
    current_version: Option<Version>,
    hash_type: Option<String>,
    permissions: Vec<String>,
}

impl<'a> IndexReader<'a> {
    /// Start reading an index owned by repository `repo_id`
    ///
    /// Fails if the document is not well-formed up to the first application
    /// or has no `<repo>` element.
    pub fn new(bytes: &'a [u8], repo_id: i64, options: ParseOptions) -> Result<Self> {
        let mut reader = Reader::from_reader(bytes);
        reader.trim_text(true);

        let mut this = Self {
            reader,
            buf: Vec::new(),
            repo_id,
            options,
            repo: RepoMetadata::default(),
            seen_repo: false,
            header_done: false,
            done: false,
            pending_end: None,
            text: String::new(),
            current_app: None,
            current_version: None,
            hash_type: None,
            permissions: Vec::new(),
        };

        loop {
            match this.step()? {
                Step::HeaderDone => break,
                Step::Eof => {
                    this.done = true;
                    break;
                }
                // Only reachable after the header is complete
                Step::App(_) | Step::Continue => {}
            }
        }

        if !this.seen_repo {
            return Err(Error::ParseError(
                "index document has no <repo> element".to_string(),
            ));
        }

        debug!(
            "Index header: name={:?} timestamp={} version={} signed={}",
            this.repo.name,
            this.repo.timestamp,
            this.repo.version,
            this.repo.declared_certificate().is_some()
        );
        Ok(this)
    }

    /// Repository metadata seen so far
    ///
    /// Attributes of `<repo>` are complete once the reader is constructed;
    /// mirrors listed after the first application appear as they are read.
    pub fn repo(&self) -> &RepoMetadata {
        &self.repo
    }

    /// Consume the reader, returning the repository metadata
    pub fn into_repo(self) -> RepoMetadata {
        self.repo
    }

    /// Read the next application, or `None` at the end of the document
    pub fn next_app(&mut self) -> Result<Option<ParsedApp>> {
        if self.done {
            return Ok(None);
        }
        loop {
            match self.step() {
                Ok(Step::App(app)) => return Ok(Some(app)),
                Ok(Step::Eof) => {
                    self.done = true;
                    return Ok(None);
                }
                Ok(Step::Continue | Step::HeaderDone) => {}
                Err(e) => {
                    self.done = true;
                    return Err(e);
                }
            }
        }
    }

    fn step(&mut self) -> Result<Step> {
        if let Some(name) = self.pending_end.take() {
            return self.on_end(&name);
        }

        match self.next_token()? {
            Token::Start { name, attrs, empty } => {
                self.text.clear();
                if empty {
                    self.pending_end = Some(name.clone());
                }
                self.on_start(&name, &attrs)
            }
            Token::End(name) => self.on_end(&name),
            Token::Text(text) => {
                self.text.push_str(&text);
                Ok(Step::Continue)
            }
            Token::Eof => {
                if let Some(app) = &self.current_app {
                    return Err(Error::ParseError(format!(
                        "index ends inside <application id=\"{}\">",
                        app.app.package_name
                    )));
                }
                Ok(Step::Eof)
            }
        }
    }

    fn next_token(&mut self) -> Result<Token> {
        loop {
            let position = self.reader.buffer_position();
            let token = match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(e)) => {
                    Some(start_token(&e, false).map_err(|err| xml_error(position, err))?)
                }
                Ok(Event::Empty(e)) => {
                    Some(start_token(&e, true).map_err(|err| xml_error(position, err))?)
                }
                Ok(Event::End(e)) => Some(Token::End(
                    String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                )),
                Ok(Event::Text(e)) => Some(Token::Text(
                    e.unescape()
                        .map_err(|err| xml_error(position, err))?
                        .into_owned(),
                )),
                Ok(Event::CData(e)) => Some(Token::Text(
                    String::from_utf8_lossy(&e.into_inner()).into_owned(),
                )),
                Ok(Event::Eof) => Some(Token::Eof),
                Ok(_) => None,
                Err(err) => return Err(xml_error(position, err)),
            };
            self.buf.clear();
            if let Some(token) = token {
                return Ok(token);
            }
        }
    }

    fn on_start(&mut self, name: &str, attrs: &[(String, String)]) -> Result<Step> {
        match name {
            "repo" => {
                self.seen_repo = true;
                self.read_repo_attributes(attrs);
            }
            "application" if self.current_app.is_none() => {
                let id = attr(attrs, "id").map(str::trim).unwrap_or_default();
                if id.is_empty() {
                    return Err(Error::ParseError(
                        "<application> without an id attribute".to_string(),
                    ));
                }
                let mut app = App::new(id.to_string());
                app.repo_id = Some(self.repo_id);
                self.current_app = Some(ParsedApp {
                    app,
                    versions: Vec::new(),
                    suggested_declared: false,
                });
                if !self.header_done {
                    self.header_done = true;
                    return Ok(Step::HeaderDone);
                }
            }
            "package" if self.current_version.is_none() => {
                if let Some(current) = &self.current_app {
                    self.current_version = Some(Version::new(
                        current.app.package_name.clone(),
                        VERSION_CODE_SENTINEL,
                        self.repo_id,
                    ));
                    self.hash_type = None;
                    self.permissions.clear();
                }
            }
            "hash" if self.current_version.is_some() => {
                self.hash_type = attr(attrs, "type").map(|t| t.trim().to_lowercase());
            }
            "uses-permission" if self.current_version.is_some() => {
                self.apply_uses_permission(attrs, None);
            }
            "uses-permission-sdk-23" if self.current_version.is_some() => {
                self.apply_uses_permission(attrs, Some(SDK_23));
            }
            _ => {}
        }
        Ok(Step::Continue)
    }

    fn on_end(&mut self, name: &str) -> Result<Step> {
        if name == "application" {
            if let Some(parsed) = self.current_app.take() {
                return Ok(Step::App(finish_app(parsed)));
            }
        }
        if name == "package" {
            if let (Some(mut version), Some(app)) =
                (self.current_version.take(), self.current_app.as_mut())
            {
                version.permissions = std::mem::take(&mut self.permissions);
                app.versions.push(version);
            }
            return Ok(Step::Continue);
        }

        let text = std::mem::take(&mut self.text);
        let text = text.trim();
        if text.is_empty() {
            return Ok(Step::Continue);
        }

        if let Some(version) = self.current_version.as_mut() {
            read_version_field(
                version,
                &mut self.permissions,
                self.hash_type.as_deref(),
                name,
                text,
            );
        } else if let Some(parsed) = self.current_app.as_mut() {
            read_app_field(parsed, name, text);
        } else {
            match name {
                "description" => self.repo.description = Some(clean_whitespace(text)),
                "mirror" => self.repo.mirrors.push(text.to_string()),
                _ => trace!("Ignoring <{}> outside an application", name),
            }
        }
        Ok(Step::Continue)
    }

    fn read_repo_attributes(&mut self, attrs: &[(String, String)]) {
        let repo = &mut self.repo;
        repo.name = attr(attrs, "name").map(clean_whitespace);
        repo.description = attr(attrs, "description").map(clean_whitespace);
        repo.pubkey = attr(attrs, "pubkey").map(str::to_string);
        repo.icon = attr(attrs, "icon").map(str::to_string);
        repo.timestamp = parse_number(attr(attrs, "timestamp"), 0);
        repo.version = parse_number(attr(attrs, "version"), 0);
        repo.max_age = parse_number(attr(attrs, "maxage"), 0);
    }

    fn apply_uses_permission(&mut self, attrs: &[(String, String)], min_sdk: Option<i32>) {
        let Some(name) = attr(attrs, "name").map(str::trim).filter(|n| !n.is_empty()) else {
            return;
        };
        let name = to_android_permission(name);
        let device = self.options.device_sdk;
        let max_sdk = attr(attrs, "maxSdkVersion").and_then(|v| v.trim().parse::<i32>().ok());

        let applies =
            min_sdk.is_none_or(|min| device >= min) && max_sdk.is_none_or(|max| device <= max);
        if applies {
            if !self.permissions.contains(&name) {
                self.permissions.push(name);
            }
        } else {
            self.permissions.retain(|p| *p != name);
        }
    }
}

impl Iterator for IndexReader<'_> {
    type Item = Result<ParsedApp>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_app().transpose()
    }
}

fn start_token(
    e: &BytesStart<'_>,
    empty: bool,
) -> std::result::Result<Token, quick_xml::Error> {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attribute in e.attributes() {
        let attribute = attribute?;
        let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
        let value = attribute.unescape_value()?.into_owned();
        attrs.push((key, value));
    }
    Ok(Token::Start { name, attrs, empty })
}

fn xml_error(position: usize, err: impl std::fmt::Display) -> Error {
    Error::ParseError(format!("malformed index XML at byte {position}: {err}"))
}

fn attr<'v>(attrs: &'v [(String, String)], key: &str) -> Option<&'v str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Suggested version falls back to the highest version in this occurrence
fn finish_app(mut parsed: ParsedApp) -> ParsedApp {
    if parsed.app.suggested_version_code > 0 {
        parsed.suggested_declared = true;
    } else if let Some(best) = parsed.versions.iter().max_by_key(|v| v.version_code) {
        parsed.app.suggested_version_code = best.version_code.max(0);
        if parsed.app.suggested_version_name.is_none() {
            parsed.app.suggested_version_name = best.version_name.clone();
        }
    } else {
        parsed.app.suggested_version_code = 0;
    }
    parsed
}

fn read_app_field(parsed: &mut ParsedApp, name: &str, text: &str) {
    let app = &mut parsed.app;
    match name {
        "name" => app.name = Some(text.to_string()),
        "summary" => app.summary = Some(text.to_string()),
        "icon" => app.icon = Some(text.to_string()),
        "desc" => app.description = Some(text.to_string()),
        // Old-style description, superseded by <desc> when both exist
        "description" => {
            if app.description.is_none() {
                app.description = Some(text.to_string());
            }
        }
        "license" => app.license = Some(text.to_string()),
        "author" => app.author_name = Some(text.to_string()),
        "email" => app.author_email = Some(text.to_string()),
        "web" => app.web_site = Some(text.to_string()),
        "source" => app.source_code = Some(text.to_string()),
        "tracker" => app.issue_tracker = Some(text.to_string()),
        "changelog" => app.changelog = Some(text.to_string()),
        "donate" => app.donate = Some(text.to_string()),
        "added" => app.added = parse_date(text),
        "lastupdated" => app.last_updated = parse_date(text),
        "marketversion" => app.suggested_version_name = Some(text.to_string()),
        "marketvercode" => {
            app.suggested_version_code = parse_number(Some(text), VERSION_CODE_SENTINEL)
        }
        "categories" => app.categories = split_list(text),
        "category" => {
            if app.categories.is_empty() {
                app.categories = vec![text.to_string()];
            }
        }
        "antifeatures" => app.anti_features = split_list(text),
        _ => {}
    }
}

fn read_version_field(
    version: &mut Version,
    permissions: &mut Vec<String>,
    hash_type: Option<&str>,
    name: &str,
    text: &str,
) {
    match name {
        "version" => version.version_name = Some(text.to_string()),
        "versioncode" => version.version_code = parse_number(Some(text), VERSION_CODE_SENTINEL),
        "size" => version.size = parse_number(Some(text), 0),
        "hash" => match hash_type {
            // sha256 always wins; weaker or untyped hashes only fill a gap
            Some("sha256") => {
                version.hash = Some(text.to_string());
                version.hash_type = Some("sha256".to_string());
            }
            Some("md5") => {
                if version.hash.is_none() {
                    version.hash = Some(text.to_string());
                    version.hash_type = Some("md5".to_string());
                }
            }
            None => {
                if version.hash.is_none() {
                    version.hash = Some(text.to_string());
                    version.hash_type = Some("sha256".to_string());
                }
            }
            Some(other) => trace!("Ignoring <hash type=\"{}\">", other),
        },
        "sig" => version.signer = Some(text.to_lowercase()),
        "srcname" => version.src_name = Some(text.to_string()),
        "apkname" => version.apk_name = Some(text.to_string()),
        "sdkver" => version.min_sdk = parse_number(Some(text), 0),
        "targetSdkVersion" => version.target_sdk = parse_number(Some(text), 0),
        "maxsdkver" => version.max_sdk = parse_number(Some(text), 0),
        "added" => version.added = parse_date(text),
        "permissions" => {
            for permission in split_list(text) {
                let permission = to_android_permission(&permission);
                if !permissions.contains(&permission) {
                    permissions.push(permission);
                }
            }
        }
        "features" => version.features = split_list(text),
        "nativecode" => version.native_code = split_list(text),
        _ => {}
    }
}

/// Parse a number, substituting `fallback` for absent or malformed input
pub fn parse_number<T: FromStr>(value: Option<&str>, fallback: T) -> T {
    value
        .map(str::trim)
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

/// Parse a `yyyy-MM-dd` date; anything else reads as `None`
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn clean_whitespace(value: &str) -> String {
    value.replace(char::is_whitespace, " ")
}

/// Bare constant names like `INTERNET` are platform permissions
pub fn to_android_permission(name: &str) -> String {
    let bare = !name.is_empty() && name.chars().all(|c| c.is_ascii_uppercase() || c == '_');
    if bare {
        format!("android.permission.{name}")
    } else {
        name.to_string()
    }
}

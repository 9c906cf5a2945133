// src/repository/client.rs

//! Index fetching
//!
//! [`ContentFetcher`] is the seam between the sync engine and the network.
//! [`HttpFetcher`] wraps reqwest with retry support, conditional GET and
//! basic auth; [`FileFetcher`] serves `file://` and plain-path repositories;
//! [`SchemeFetcher`] picks between them by address.

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::hash;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum attempts per URL
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds, multiplied by the attempt number
const RETRY_DELAY_MS: u64 = 1000;

/// Signed index inside a repository
pub const SIGNED_INDEX: &str = "index.jar";

/// Legacy unsigned index inside a repository
pub const UNSIGNED_INDEX: &str = "index.xml";

/// A single fetch
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchRequest<'a> {
    pub url: &'a str,
    /// Revalidation token (ETag) from the last full fetch
    pub token: Option<&'a str>,
    pub credentials: Option<(&'a str, &'a str)>,
}

impl<'a> FetchRequest<'a> {
    pub fn new(url: &'a str) -> Self {
        Self {
            url,
            ..Default::default()
        }
    }
}

/// Result of a fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The token still matches; the content is unchanged
    NotModified,
    /// New content and the token to present next time
    Fetched {
        bytes: Vec<u8>,
        token: Option<String>,
    },
    /// Transport failure after retries
    Failed { reason: String },
}

/// Retrieves index documents
///
/// Implementations must be usable from several worker threads at once.
pub trait ContentFetcher: Send + Sync {
    fn fetch(&self, request: &FetchRequest<'_>) -> FetchOutcome;
}

/// Join a repository base address and a file name
pub fn index_url(base: &str, file: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), file)
}

/// Fetch `file` from each base address in turn until one does not fail
///
/// Mirrors are only consulted after a transport failure; a not-modified
/// answer from the primary address ends the search.
pub fn fetch_with_mirrors(
    fetcher: &dyn ContentFetcher,
    bases: &[&str],
    file: &str,
    token: Option<&str>,
    credentials: Option<(&str, &str)>,
) -> FetchOutcome {
    let mut reasons = Vec::new();
    for base in bases {
        let url = index_url(base, file);
        let request = FetchRequest {
            url: &url,
            token,
            credentials,
        };
        match fetcher.fetch(&request) {
            FetchOutcome::Failed { reason } => {
                debug!("Fetch of {} failed: {}", url, reason);
                reasons.push(reason);
            }
            outcome => return outcome,
        }
    }

    FetchOutcome::Failed {
        reason: if reasons.is_empty() {
            format!("No address to fetch {file} from")
        } else {
            reasons.join("; ")
        },
    }
}

/// HTTP(S) fetcher with retry support
pub struct HttpFetcher {
    client: Client,
    max_retries: u32,
}

impl HttpFetcher {
    /// Create a fetcher with the default timeout and retry count
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
        })
    }

    /// Create a fetcher from the configured timeout, retries and user agent
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_retries: config.max_retries.max(1),
        })
    }
}

impl ContentFetcher for HttpFetcher {
    fn fetch(&self, request: &FetchRequest<'_>) -> FetchOutcome {
        let url = request.url;
        debug!("Fetching {}", url);

        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut builder = self.client.get(url);
            if let Some(token) = request.token {
                builder = builder.header(IF_NONE_MATCH, token);
            }
            if let Some((username, password)) = request.credentials {
                builder = builder.basic_auth(username, Some(password));
            }

            let failure = match builder.send() {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::NOT_MODIFIED {
                        debug!("{} not modified", url);
                        return FetchOutcome::NotModified;
                    }
                    if status.is_client_error() {
                        // Retrying cannot fix a bad URL or bad credentials
                        return FetchOutcome::Failed {
                            reason: format!("HTTP {status} from {url}"),
                        };
                    }
                    if status.is_success() {
                        let token = response
                            .headers()
                            .get(ETAG)
                            .and_then(|value| value.to_str().ok())
                            .map(str::to_string);
                        match response.bytes() {
                            Ok(bytes) => {
                                info!("Fetched {} bytes from {}", bytes.len(), url);
                                return FetchOutcome::Fetched {
                                    bytes: bytes.to_vec(),
                                    token,
                                };
                            }
                            Err(e) => format!("Failed to read response from {url}: {e}"),
                        }
                    } else {
                        format!("HTTP {status} from {url}")
                    }
                }
                Err(e) => format!("Failed to fetch {url}: {e}"),
            };

            if attempt >= self.max_retries {
                return FetchOutcome::Failed {
                    reason: format!("{failure} (after {attempt} attempts)"),
                };
            }
            warn!("Fetch attempt {} failed: {}, retrying...", attempt, failure);
            std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
        }
    }
}

/// Fetcher for repositories on the local filesystem
///
/// The revalidation token is the SHA-256 of the file, so an unchanged file
/// is reported as not modified.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcher;

impl FileFetcher {
    /// Filesystem path for a `file://` URL or a plain path
    pub fn local_path(url: &str) -> Option<PathBuf> {
        match Url::parse(url) {
            Ok(parsed) if parsed.scheme() == "file" => parsed.to_file_path().ok(),
            Ok(_) => None,
            Err(_) => Some(PathBuf::from(url)),
        }
    }
}

impl ContentFetcher for FileFetcher {
    fn fetch(&self, request: &FetchRequest<'_>) -> FetchOutcome {
        let Some(path) = Self::local_path(request.url) else {
            return FetchOutcome::Failed {
                reason: format!("{} is not a local address", request.url),
            };
        };

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                return FetchOutcome::Failed {
                    reason: format!("Failed to read {}: {e}", path.display()),
                };
            }
        };

        let token = hash::sha256(&bytes);
        if request
            .token
            .is_some_and(|previous| hash::digests_match(Some(previous), Some(&token)))
        {
            return FetchOutcome::NotModified;
        }
        FetchOutcome::Fetched {
            bytes,
            token: Some(token),
        }
    }
}

/// Dispatches HTTP(S) addresses to [`HttpFetcher`] and everything else to
/// [`FileFetcher`]
pub struct SchemeFetcher {
    http: HttpFetcher,
    file: FileFetcher,
}

impl SchemeFetcher {
    pub fn new(http: HttpFetcher) -> Self {
        Self {
            http,
            file: FileFetcher,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        Ok(Self::new(HttpFetcher::from_config(config)?))
    }
}

impl ContentFetcher for SchemeFetcher {
    fn fetch(&self, request: &FetchRequest<'_>) -> FetchOutcome {
        let is_http = Url::parse(request.url)
            .map(|url| matches!(url.scheme(), "http" | "https"))
            .unwrap_or(false);
        if is_http {
            self.http.fetch(request)
        } else {
            self.file.fetch(request)
        }
    }
}

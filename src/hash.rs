// src/hash.rs

//! Content digests for certificate fingerprints and artifact integrity
//!
//! This module provides a single interface over the digest algorithms that
//! appear in repository indexes and signed index archives:
//! - **SHA-256**: certificate fingerprints and modern package hashes
//! - **SHA-1**: `SHA1-Digest` entries in older signed archives
//! - **SHA-512**: accepted wherever an index names it
//! - **MD5**: package hashes in very old index documents (integrity only)
//!
//! # Use Cases
//!
//! | Use Case | Algorithm |
//! |----------|-----------|
//! | Repository signing-certificate fingerprint | SHA-256 (configurable) |
//! | Downloaded package verification | whatever the index declares |
//! | Jar manifest entry digests | SHA-256 or SHA-1 |

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Digest algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    /// MD5 (128-bit, legacy index hashes only)
    Md5,
    /// SHA-1 (160-bit)
    Sha1,
    /// SHA-256 (256-bit)
    #[default]
    Sha256,
    /// SHA-512 (512-bit)
    Sha512,
}

impl HashAlgorithm {
    /// Digest output length in bytes
    #[inline]
    pub const fn output_len(&self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha512 => 64,
        }
    }

    /// Digest output length as a hex string
    #[inline]
    pub const fn hex_len(&self) -> usize {
        self.output_len() * 2
    }

    /// Canonical lowercase name
    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = Error;

    /// Parse an algorithm name. Unknown names are a configuration error:
    /// the caller asked for a digest this build cannot produce.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha1" | "sha-1" => Ok(Self::Sha1),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "sha512" | "sha-512" => Ok(Self::Sha512),
            _ => Err(Error::ConfigError(format!("unknown hash algorithm: {s}"))),
        }
    }
}

/// Incremental digest state for one algorithm
enum DigestState {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
    Sha512(Sha512),
}

impl DigestState {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Md5 => Self::Md5(Md5::new()),
            HashAlgorithm::Sha1 => Self::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            HashAlgorithm::Sha512 => Self::Sha512(Sha512::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(h) => h.update(data),
            Self::Sha1(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    fn finalize_bytes(self) -> Vec<u8> {
        match self {
            Self::Md5(h) => h.finalize().to_vec(),
            Self::Sha1(h) => h.finalize().to_vec(),
            Self::Sha256(h) => h.finalize().to_vec(),
            Self::Sha512(h) => h.finalize().to_vec(),
        }
    }
}

/// What a [`Hasher`] reads its bytes from
#[derive(Debug, Clone)]
pub enum DigestSource {
    /// A file on disk, streamed in chunks
    File(PathBuf),
    /// An in-memory buffer such as a DER-encoded certificate
    Bytes(Vec<u8>),
}

/// Computes the digest of one source, caching the result
///
/// Repeated calls to [`Hasher::digest`] reuse the cached value until
/// [`Hasher::reset`] is called.
pub struct Hasher {
    algorithm: HashAlgorithm,
    source: DigestSource,
    cached: Option<String>,
}

impl Hasher {
    /// Create a hasher for a source
    pub fn new(source: DigestSource, algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            source,
            cached: None,
        }
    }

    /// Hasher over an in-memory buffer
    pub fn for_bytes(data: impl Into<Vec<u8>>, algorithm: HashAlgorithm) -> Self {
        Self::new(DigestSource::Bytes(data.into()), algorithm)
    }

    /// Hasher over a file
    pub fn for_file(path: impl AsRef<Path>, algorithm: HashAlgorithm) -> Self {
        Self::new(DigestSource::File(path.as_ref().to_path_buf()), algorithm)
    }

    /// Lowercase hex digest of the source, zero-padded to the full length
    pub fn digest(&mut self) -> Result<&str> {
        if self.cached.is_none() {
            let value = match &self.source {
                DigestSource::Bytes(data) => hash_bytes(self.algorithm, data),
                DigestSource::File(path) => {
                    let mut file = File::open(path).map_err(|e| {
                        Error::IoError(format!("Failed to open {}: {e}", path.display()))
                    })?;
                    hash_reader(self.algorithm, &mut file)?
                }
            };
            self.cached = Some(value);
        }
        Ok(self.cached.as_deref().unwrap_or_default())
    }

    /// Whether the source digest equals `expected` (see [`digests_match`])
    pub fn matches(&mut self, expected: Option<&str>) -> Result<bool> {
        let actual = self.digest()?;
        Ok(digests_match(Some(actual), expected))
    }

    /// Drop the cached digest so the next call re-reads the source
    pub fn reset(&mut self) {
        self.cached = None;
    }

    /// Algorithm in use
    #[inline]
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }
}

/// Case-insensitive digest comparison
///
/// An empty or absent value on either side never matches.
pub fn digests_match(actual: Option<&str>, expected: Option<&str>) -> bool {
    match (actual.map(str::trim), expected.map(str::trim)) {
        (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

/// Raw digest bytes of a byte slice
pub fn digest_bytes(algorithm: HashAlgorithm, data: &[u8]) -> Vec<u8> {
    let mut state = DigestState::new(algorithm);
    state.update(data);
    state.finalize_bytes()
}

/// Hex digest of a byte slice
pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> String {
    hex::encode(digest_bytes(algorithm, data))
}

/// Hex digest of everything a reader yields
pub fn hash_reader<R: Read>(algorithm: HashAlgorithm, reader: &mut R) -> io::Result<String> {
    let mut state = DigestState::new(algorithm);
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        state.update(&buffer[..n]);
    }

    Ok(hex::encode(state.finalize_bytes()))
}

/// Compute SHA-256 hex digest
#[inline]
pub fn sha256(data: &[u8]) -> String {
    hash_bytes(HashAlgorithm::Sha256, data)
}

/// Verify a file matches an expected digest
///
/// Streams the file content to avoid loading it entirely into memory.
pub fn verify_file(path: &Path, expected: &str, algorithm: HashAlgorithm) -> Result<()> {
    let mut hasher = Hasher::for_file(path, algorithm);
    if hasher.matches(Some(expected))? {
        Ok(())
    } else {
        Err(Error::ChecksumMismatch {
            expected: expected.to_string(),
            actual: hasher.digest()?.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_sha256_hash() {
        let hash = hash_bytes(HashAlgorithm::Sha256, b"Hello, World!");
        assert_eq!(
            hash,
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
        assert_eq!(hash.len(), HashAlgorithm::Sha256.hex_len());
    }

    #[test]
    fn test_output_lengths() {
        for algo in [
            HashAlgorithm::Md5,
            HashAlgorithm::Sha1,
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha512,
        ] {
            assert_eq!(hash_bytes(algo, b"").len(), algo.hex_len());
        }
    }

    #[test]
    fn test_sha1_known_value() {
        assert_eq!(
            hash_bytes(HashAlgorithm::Sha1, b"abc"),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_md5_leading_zero_padding() {
        // MD5("363") starts with a zero byte
        let hash = hash_bytes(HashAlgorithm::Md5, b"363");
        assert_eq!(hash, "00411460f7c92d2124a67ea0f4cb5f85");
    }

    #[test]
    fn test_algorithm_parse() {
        assert_eq!("sha256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("SHA-256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("SHA-1".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha1);
        assert_eq!("md5".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Md5);
        assert!(matches!(
            "whirlpool".parse::<HashAlgorithm>(),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn test_hasher_caches_until_reset() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"first").unwrap();
        file.flush().unwrap();

        let mut hasher = Hasher::for_file(file.path(), HashAlgorithm::Sha256);
        let first = hasher.digest().unwrap().to_string();
        assert_eq!(first, sha256(b"first"));

        file.write_all(b" and more").unwrap();
        file.flush().unwrap();
        assert_eq!(hasher.digest().unwrap(), first);

        hasher.reset();
        assert_eq!(hasher.digest().unwrap(), sha256(b"first and more"));
    }

    #[test]
    fn test_matches_case_insensitive() {
        let mut hasher = Hasher::for_bytes(b"test".to_vec(), HashAlgorithm::Sha256);
        let upper = sha256(b"test").to_uppercase();
        assert!(hasher.matches(Some(&upper)).unwrap());
    }

    #[test]
    fn test_absent_never_matches() {
        assert!(!digests_match(None, None));
        assert!(!digests_match(Some(""), Some("")));
        assert!(!digests_match(Some("abc"), None));
        assert!(!digests_match(None, Some("abc")));
        assert!(!digests_match(Some("  "), Some("abc")));
        assert!(digests_match(Some("ABC"), Some("abc")));

        let mut hasher = Hasher::for_bytes(Vec::new(), HashAlgorithm::Sha256);
        assert!(!hasher.matches(Some("")).unwrap());
        assert!(!hasher.matches(None).unwrap());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let mut hasher = Hasher::for_file("/nonexistent/file.apk", HashAlgorithm::Sha256);
        assert!(matches!(hasher.digest(), Err(Error::IoError(_))));
    }

    #[test]
    fn test_verify_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        file.flush().unwrap();

        let good = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
        assert!(verify_file(file.path(), good, HashAlgorithm::Sha256).is_ok());

        let wrong = "0000000000000000000000000000000000000000000000000000000000000000";
        let err = verify_file(file.path(), wrong, HashAlgorithm::Sha256).unwrap_err();
        match err {
            Error::ChecksumMismatch { expected, actual } => {
                assert_eq!(expected, wrong);
                assert_eq!(actual, good);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

// src/signing.rs

//! Repository signing-certificate verification
//!
//! Given the certificates embedded in a signed index archive and the
//! fingerprint a repository previously trusted, decide whether the archive
//! may be accepted. The verifier is stateless: persisting a newly trusted
//! fingerprint is the sync engine's job.

use crate::hash::{self, HashAlgorithm};
use x509_certificate::X509Certificate;

/// Readable subject of a DER-encoded certificate, for log messages
pub fn certificate_subject(certificate: &[u8]) -> Option<String> {
    let cert = X509Certificate::from_der(certificate).ok()?;
    cert.subject_name().user_friendly_str().ok()
}

/// Outcome of checking an artifact's certificates against a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationResult {
    /// One of the artifact certificates matches the trusted fingerprint
    TrustedMatch,
    /// Nothing was trusted before; this fingerprint should be persisted
    TrustOnFirstUse(String),
    /// The repository is pinned to a different certificate
    Mismatch,
    /// The artifact carries no certificate at all
    NoCertificateFound,
}

impl VerificationResult {
    /// Whether the artifact may be processed
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::TrustedMatch | Self::TrustOnFirstUse(_))
    }
}

/// Checks signing certificates against a trusted fingerprint
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureVerifier {
    algorithm: HashAlgorithm,
}

impl SignatureVerifier {
    /// Create a verifier that fingerprints certificates with `algorithm`
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Algorithm used for fingerprints
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Fingerprint of a DER-encoded certificate
    pub fn fingerprint(&self, certificate: &[u8]) -> String {
        hash::hash_bytes(self.algorithm, certificate)
    }

    /// Fingerprint of a hex-encoded certificate, as declared in `<repo pubkey>`
    ///
    /// Returns `None` for empty or non-hex input.
    pub fn fingerprint_hex_certificate(&self, certificate_hex: &str) -> Option<String> {
        let trimmed = certificate_hex.trim();
        if trimmed.is_empty() {
            return None;
        }
        hex::decode(trimmed)
            .ok()
            .map(|der| self.fingerprint(&der))
    }

    /// Verify artifact certificates against an optional trusted fingerprint
    pub fn verify<C: AsRef<[u8]>>(
        &self,
        certificates: &[C],
        trusted_fingerprint: Option<&str>,
    ) -> VerificationResult {
        if certificates.is_empty() {
            return VerificationResult::NoCertificateFound;
        }

        let mut fingerprints: Vec<String> = certificates
            .iter()
            .map(|cert| self.fingerprint(cert.as_ref()))
            .collect();

        match trusted_fingerprint.map(str::trim).filter(|fp| !fp.is_empty()) {
            Some(trusted) => {
                if fingerprints
                    .iter()
                    .any(|fp| hash::digests_match(Some(fp), Some(trusted)))
                {
                    VerificationResult::TrustedMatch
                } else {
                    VerificationResult::Mismatch
                }
            }
            None => VerificationResult::TrustOnFirstUse(fingerprints.swap_remove(0)),
        }
    }
}

// src/index/jar.rs

//! Signed index archives (`index.jar`)
//!
//! The archive follows the JAR signing layout:
//!
//! ```text
//! index.xml
//! META-INF/MANIFEST.MF   Name: index.xml / SHA-256-Digest: <base64>
//! META-INF/CERT.SF       SHA-256-Digest-Manifest: <base64>, per-entry digests
//! META-INF/CERT.RSA      PKCS#7 SignedData over CERT.SF (detached)
//! ```
//!
//! Verification checks the chain index.xml -> MANIFEST.MF -> .SF -> signature
//! block and returns the signing certificate of every verified block. Whether those
//! certificates are *trusted* is [`crate::signing::SignatureVerifier`]'s call.
//! An archive without any signature block yields no certificates.

use crate::error::{Error, Result};
use crate::hash::{self, HashAlgorithm};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use cryptographic_message_syntax::SignedData;
use std::io::{Cursor, Read};
use std::str::FromStr;
use tracing::debug;
use zip::ZipArchive;

/// Archive entry holding the index document
pub const INDEX_ENTRY: &str = "index.xml";

const MANIFEST_ENTRY: &str = "META-INF/MANIFEST.MF";

/// Signature block extensions, matched case-insensitively
const BLOCK_EXTENSIONS: [&str; 3] = [".RSA", ".DSA", ".EC"];

/// Contents of a verified archive
#[derive(Debug, Clone)]
pub struct SignedIndex {
    /// Raw `index.xml` bytes
    pub index_xml: Vec<u8>,
    /// DER signing certificates, one per verified signature block
    pub certificates: Vec<Vec<u8>>,
}

/// Unpack an `index.jar` and verify its signature chain
///
/// Structural problems (not a zip, no `index.xml`) are parse errors; a
/// digest or signature that does not check out is a verification error.
pub fn open_signed_index(bytes: &[u8]) -> Result<SignedIndex> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::ParseError(format!("invalid index archive: {e}")))?;

    let index_xml = read_entry(&mut archive, INDEX_ENTRY)?
        .ok_or_else(|| Error::ParseError(format!("index archive has no {INDEX_ENTRY}")))?;

    let blocks: Vec<String> = archive
        .file_names()
        .filter(|name| is_signature_block(name))
        .map(str::to_string)
        .collect();

    if blocks.is_empty() {
        debug!("Index archive carries no signature block");
        return Ok(SignedIndex {
            index_xml,
            certificates: Vec::new(),
        });
    }
    if blocks.len() > 1 {
        return Err(Error::VerificationError(format!(
            "index archive carries {} signature blocks, expected one",
            blocks.len()
        )));
    }

    let manifest_bytes = read_entry(&mut archive, MANIFEST_ENTRY)?.ok_or_else(|| {
        Error::VerificationError(format!("signed archive has no {MANIFEST_ENTRY}"))
    })?;
    let manifest = Manifest::parse(&manifest_bytes);

    let entry = manifest.section(INDEX_ENTRY).ok_or_else(|| {
        Error::VerificationError(format!("{MANIFEST_ENTRY} does not list {INDEX_ENTRY}"))
    })?;
    if !check_digests(&entry.attributes, "-Digest", &index_xml)? {
        return Err(Error::VerificationError(format!(
            "{MANIFEST_ENTRY} has no usable digest for {INDEX_ENTRY}"
        )));
    }

    let mut certificates = Vec::new();
    for block_name in blocks {
        let sf_name = signature_file_name(&block_name);
        let sf_bytes = read_entry(&mut archive, &sf_name)?.ok_or_else(|| {
            Error::VerificationError(format!("{block_name} has no matching {sf_name}"))
        })?;
        verify_signature_file(&sf_bytes, &manifest_bytes, &manifest)?;

        let block = read_entry(&mut archive, &block_name)?.unwrap_or_default();
        let signer = verify_signature_block(&block, &sf_bytes)
            .map_err(|e| Error::VerificationError(format!("{block_name}: {e}")))?;
        debug!("Verified {}", block_name);
        certificates.push(signer);
    }

    Ok(SignedIndex {
        index_xml,
        certificates,
    })
}

fn read_entry(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> Result<Option<Vec<u8>>> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => {
            return Err(Error::ParseError(format!(
                "failed to read {name} from index archive: {e}"
            )));
        }
    };
    let mut data = Vec::new();
    file.read_to_end(&mut data).map_err(|e| {
        Error::ParseError(format!("failed to read {name} from index archive: {e}"))
    })?;
    Ok(Some(data))
}

fn is_signature_block(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    upper.starts_with("META-INF/")
        && !upper["META-INF/".len()..].contains('/')
        && BLOCK_EXTENSIONS.iter().any(|ext| upper.ends_with(ext))
}

fn signature_file_name(block_name: &str) -> String {
    let stem = block_name
        .rsplit_once('.')
        .map_or(block_name, |(stem, _)| stem);
    format!("{stem}.SF")
}

/// The .SF must vouch for the manifest, either whole or per entry
fn verify_signature_file(
    sf_bytes: &[u8],
    manifest_bytes: &[u8],
    manifest: &Manifest,
) -> Result<()> {
    let sf = Manifest::parse(sf_bytes);

    if let Ok(true) = check_digests(&sf.main, "-Digest-Manifest", manifest_bytes) {
        return Ok(());
    }

    let sf_entry = sf.section(INDEX_ENTRY).ok_or_else(|| {
        Error::VerificationError(format!(
            "signature file neither matches the manifest nor lists {INDEX_ENTRY}"
        ))
    })?;
    let manifest_entry = manifest.section(INDEX_ENTRY).ok_or_else(|| {
        Error::VerificationError(format!("{MANIFEST_ENTRY} does not list {INDEX_ENTRY}"))
    })?;

    if check_digests(&sf_entry.attributes, "-Digest", &manifest_entry.raw)? {
        Ok(())
    } else {
        Err(Error::VerificationError(
            "signature file carries no usable manifest digest".to_string(),
        ))
    }
}

/// Verify the single signer of a PKCS#7 block over the .SF bytes
///
/// Returns the DER certificate that produced the signature. A block with
/// several signers, or with anything beside the signer's own certificate,
/// is rejected.
fn verify_signature_block(
    block: &[u8],
    sf_bytes: &[u8],
) -> std::result::Result<Vec<u8>, String> {
    let signed_data =
        SignedData::parse_ber(block).map_err(|e| format!("invalid signature block: {e}"))?;

    let mut signers = signed_data.signers();
    let signer = signers
        .next()
        .ok_or_else(|| "signature block has no signers".to_string())?;
    if signers.next().is_some() {
        return Err("signature block has more than one signer".to_string());
    }

    let certificates: Vec<_> = signed_data.certificates().collect();
    if certificates.len() != 1 {
        return Err(format!(
            "signature block carries {} certificates, expected exactly one",
            certificates.len()
        ));
    }
    let certificate = certificates[0];
    let (issuer, serial) = signer
        .certificate_issuer_and_serial()
        .ok_or_else(|| "signer does not identify its certificate".to_string())?;
    if certificate.issuer_name() != issuer || certificate.serial_number_asn1() != serial {
        return Err("signer does not match the embedded certificate".to_string());
    }

    let content = signer.signed_content(Some(sf_bytes));
    signer
        .verify_signature_with_signed_data_and_content(&signed_data, &content)
        .map_err(|e| format!("signature does not verify: {e}"))?;
    if signer.signed_attributes().is_some() {
        signer
            .verify_message_digest_with_content(sf_bytes)
            .map_err(|e| format!("signed digest does not match: {e}"))?;
    }

    Ok(certificate.constructed_data().to_vec())
}

/// Check every `<ALG><suffix>` attribute against `data`
///
/// Returns `Ok(false)` when no attribute names a supported algorithm and an
/// error when any supported digest disagrees.
fn check_digests(attributes: &[(String, String)], suffix: &str, data: &[u8]) -> Result<bool> {
    let mut verified = false;

    for (key, value) in attributes {
        let Some(prefix) = strip_suffix_ignore_case(key, suffix) else {
            continue;
        };
        let algorithm = match HashAlgorithm::from_str(prefix) {
            Ok(alg) if alg != HashAlgorithm::Md5 => alg,
            _ => continue,
        };

        let expected = BASE64
            .decode(value.trim())
            .map_err(|e| Error::VerificationError(format!("malformed {key}: {e}")))?;
        if expected != hash::digest_bytes(algorithm, data) {
            return Err(Error::VerificationError(format!("{key} does not match")));
        }
        verified = true;
    }

    Ok(verified)
}

fn strip_suffix_ignore_case<'k>(key: &'k str, suffix: &str) -> Option<&'k str> {
    let split = key.len().checked_sub(suffix.len())?;
    if !key.is_char_boundary(split) || !key[split..].eq_ignore_ascii_case(suffix) {
        return None;
    }
    let prefix = &key[..split];
    (!prefix.is_empty()).then_some(prefix)
}

/// A named manifest section with its exact bytes
struct Section {
    name: Option<String>,
    attributes: Vec<(String, String)>,
    /// Raw bytes including the terminating blank line
    raw: Vec<u8>,
}

/// Parsed MANIFEST.MF or .SF file
struct Manifest {
    main: Vec<(String, String)>,
    sections: Vec<Section>,
}

impl Manifest {
    fn parse(bytes: &[u8]) -> Self {
        let mut sections = Vec::new();
        let mut current = Section {
            name: None,
            attributes: Vec::new(),
            raw: Vec::new(),
        };
        let mut has_content = false;

        for line in split_lines_inclusive(bytes) {
            current.raw.extend_from_slice(line);
            let text = String::from_utf8_lossy(line);
            let text = text.trim_end_matches(['\r', '\n']);

            if text.is_empty() {
                if has_content {
                    sections.push(std::mem::replace(
                        &mut current,
                        Section {
                            name: None,
                            attributes: Vec::new(),
                            raw: Vec::new(),
                        },
                    ));
                    has_content = false;
                } else {
                    current.raw.clear();
                }
                continue;
            }

            has_content = true;
            if let Some(continuation) = text.strip_prefix(' ') {
                if let Some((_, value)) = current.attributes.last_mut() {
                    value.push_str(continuation);
                }
            } else if let Some((key, value)) = text.split_once(':') {
                current
                    .attributes
                    .push((key.trim().to_string(), value.trim_start().to_string()));
            }
        }
        if has_content {
            sections.push(current);
        }

        for section in &mut sections {
            section.name = section
                .attributes
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("Name"))
                .map(|(_, v)| v.clone());
        }

        // The first section is the main section unless it names an entry
        let main = if sections.first().is_some_and(|s| s.name.is_none()) {
            sections.remove(0).attributes
        } else {
            Vec::new()
        };

        Self { main, sections }
    }

    fn section(&self, name: &str) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| s.name.as_deref() == Some(name))
    }
}

fn split_lines_inclusive(bytes: &[u8]) -> impl Iterator<Item = &[u8]> {
    bytes.split_inclusive(|&b| b == b'\n')
}

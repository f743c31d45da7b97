/*++

Licensed under the Apache-2.0 license.

File Name:

    anchors.rs

Abstract:

    Trust anchor list: known-hash entries and trusted root certificates.

--*/

use crate::config::ConfigReader;
use crate::policy::validate_artifact_name;
use aegis_drivers::{Digest, HashAlgorithm};
use aegis_error::{AegisError, AegisResult};
use aegis_x509::Certificate;
use alloc::string::String;
use alloc::vec::Vec;

const KNOWN_HASH_PREFIX: &str = "hash.";

/// One trust anchor
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TrustAnchor {
    /// Expected digest of a named artifact
    KnownHash { artifact: String, digest: Digest },

    /// DER encoded trusted root certificate
    RootCertificate(Vec<u8>),
}

/// Ordered, read-only (once loaded) set of trust anchors for one boot attempt
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct TrustAnchorList {
    anchors: Vec<TrustAnchor>,
}

impl TrustAnchorList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load known-hash entries from configuration text
    ///
    /// Every entry has the form `hash.<artifact> = <alg>:<hex digest>`. The
    /// same artifact may be listed more than once; order is preserved.
    pub fn from_config(text: &str) -> AegisResult<Self> {
        let mut list = Self::new();
        for entry in ConfigReader::new(text) {
            let entry = entry?;
            let Some(artifact) = entry.key.strip_prefix(KNOWN_HASH_PREFIX) else {
                log::warn!("[anchors] line {}: unknown key {}", entry.line, entry.key);
                return Err(AegisError::CONFIG_UNKNOWN_KEY);
            };
            validate_artifact_name(artifact)?;
            let digest = parse_known_hash(entry.value).map_err(|err| {
                log::warn!("[anchors] line {}: bad digest for {}", entry.line, artifact);
                err
            })?;
            list.add_known_hash(artifact, digest)?;
        }
        log::info!("[anchors] loaded {} known-hash entries", list.len());
        Ok(list)
    }

    /// Append a known-hash entry
    pub fn add_known_hash(&mut self, artifact: &str, digest: Digest) -> AegisResult<()> {
        validate_artifact_name(artifact)?;
        self.anchors.push(TrustAnchor::KnownHash {
            artifact: String::from(artifact),
            digest,
        });
        Ok(())
    }

    /// Append a trusted root certificate
    ///
    /// # Arguments
    ///
    /// * `der` - DER certificate; it must parse and be a CA certificate
    pub fn add_root_certificate(&mut self, der: &[u8]) -> AegisResult<()> {
        let cert = Certificate::from_der(der)?;
        if !cert.is_ca() {
            return Err(AegisError::X509_ISSUER_NOT_CA);
        }
        self.anchors.push(TrustAnchor::RootCertificate(der.to_vec()));
        Ok(())
    }

    /// Expected digests for `artifact`, in configuration order
    pub fn known_hashes<'a>(&'a self, artifact: &'a str) -> impl Iterator<Item = &'a Digest> + 'a {
        self.anchors.iter().filter_map(move |anchor| match anchor {
            TrustAnchor::KnownHash {
                artifact: name,
                digest,
            } if name == artifact => Some(digest),
            _ => None,
        })
    }

    /// DER encodings of every trusted root
    pub fn root_certificates(&self) -> Vec<&[u8]> {
        self.anchors
            .iter()
            .filter_map(|anchor| match anchor {
                TrustAnchor::RootCertificate(der) => Some(der.as_slice()),
                _ => None,
            })
            .collect()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, TrustAnchor> {
        self.anchors.iter()
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

// `<alg>:<hex>`
fn parse_known_hash(value: &str) -> AegisResult<Digest> {
    let (alg, hex_digest) = value
        .split_once(':')
        .ok_or(AegisError::IMAGE_VERIFIER_INVALID_HASH)?;
    let alg = HashAlgorithm::from_name(alg.trim())?;
    let bytes = hex::decode(hex_digest.trim()).map_err(|_| AegisError::IMAGE_VERIFIER_INVALID_HASH)?;
    Digest::new(alg, &bytes).map_err(|_| AegisError::IMAGE_VERIFIER_INVALID_HASH)
}

/*++

Licensed under the Apache-2.0 license.

File Name:

   lib.rs

Abstract:

    Aegis secure boot gate: known-hash and signature verification of boot
    artifacts against a trust anchor list.

--*/
#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

mod anchors;
mod config;
mod policy;
mod verifier;

use aegis_drivers::{hash_oneshot, Digest, HashAlgorithm};
use aegis_error::{AegisError, AegisResult};

pub use anchors::{TrustAnchor, TrustAnchorList};
pub use config::{parse_bool, parse_u64, ConfigEntry, ConfigReader};
pub use policy::{ArtifactPolicy, Validator, MAX_ARTIFACT_NAME_LEN};
pub use verifier::SecureBootGate;

/// Encoding of an artifact signature
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SignatureScheme {
    /// DER ECDSA-Sig-Value
    EcdsaDer,

    /// RSASSA-PKCS1-v1_5
    RsaPkcs1v15,

    /// RSASSA-PSS, salt length equal to the digest length
    RsaPss,
}

/// Detached signature over an artifact
#[derive(Debug, Copy, Clone)]
pub struct SignatureEvidence<'a> {
    pub scheme: SignatureScheme,

    /// Digest the signature was computed over
    pub digest_algorithm: HashAlgorithm,

    pub signature: &'a [u8],

    /// DER certificates, signer first
    pub chain: &'a [&'a [u8]],
}

/// Outcome of a gate check
#[must_use]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Verdict {
    Allow,
    Deny(AegisError),
}

impl Verdict {
    pub fn is_allow(&self) -> bool {
        matches!(self, Verdict::Allow)
    }

    /// Convert into a result, `Deny` becoming its reason
    pub fn into_result(self) -> AegisResult<()> {
        match self {
            Verdict::Allow => Ok(()),
            Verdict::Deny(err) => Err(err),
        }
    }
}

/// Artifact Verification Environment
pub trait ArtifactVerificationEnv {
    /// Calculate the digest of an artifact
    fn digest(&self, alg: HashAlgorithm, data: &[u8]) -> AegisResult<Digest>;

    /// Current time in seconds since the Unix epoch, for certificate validity
    fn now(&self) -> u64;
}

/// Environment backed by the software digest engine and a fixed clock
#[derive(Debug, Copy, Clone)]
pub struct SoftwareEnv {
    pub now: u64,
}

impl ArtifactVerificationEnv for SoftwareEnv {
    fn digest(&self, alg: HashAlgorithm, data: &[u8]) -> AegisResult<Digest> {
        hash_oneshot(alg, data)
    }

    fn now(&self) -> u64 {
        self.now
    }
}

/// Verify an artifact with the software environment
///
/// # Arguments
///
/// * `artifact` - Artifact bytes
/// * `evidence` - Signature evidence, if any
/// * `anchors` - Trust anchors
/// * `policy` - Validators to apply
/// * `now` - Seconds since the Unix epoch
pub fn verify_artifact(
    artifact: &[u8],
    evidence: Option<&SignatureEvidence>,
    anchors: &TrustAnchorList,
    policy: &ArtifactPolicy,
    now: u64,
) -> Verdict {
    SecureBootGate::new(SoftwareEnv { now }).verify(artifact, evidence, anchors, policy)
}

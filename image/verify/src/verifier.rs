/*++

Licensed under the Apache-2.0 license.

File Name:

    verifier.rs

Abstract:

    This file is the main implementation of the secure boot gate.

--*/

use crate::*;
use aegis_drivers::{HexBytes, RsaSignatureScheme};
use aegis_x509::{ecdsa_signature_from_der, verify_chain, SubjectPublicKey};

/// Secure Boot Gate
pub struct SecureBootGate<Env: ArtifactVerificationEnv> {
    /// Verification Environment
    env: Env,
}

impl<Env: ArtifactVerificationEnv> SecureBootGate<Env> {
    /// Create a new instance `SecureBootGate`
    ///
    /// # Arguments
    ///
    /// * `env` - Environment
    pub fn new(env: Env) -> Self {
        Self { env }
    }

    /// Verify a boot artifact against the trust anchors
    ///
    /// Every range check in `policy` must pass and at least one hash or
    /// signature check must pass. Anything else, including a parse error or a
    /// missing trust anchor, yields `Deny`.
    ///
    /// # Arguments
    ///
    /// * `artifact` - Artifact bytes
    /// * `evidence` - Signature evidence, required by `SignatureCheck`
    /// * `anchors` - Trust anchors for this boot attempt
    /// * `policy` - Validators to apply
    ///
    /// # Returns
    ///
    /// * `Verdict` - `Allow` or `Deny` with the reason
    pub fn verify(
        &self,
        artifact: &[u8],
        evidence: Option<&SignatureEvidence>,
        anchors: &TrustAnchorList,
        policy: &ArtifactPolicy,
    ) -> Verdict {
        match self.evaluate(artifact, evidence, anchors, policy) {
            Ok(()) => {
                log::info!(
                    "[gate] allow {} ({} bytes)",
                    policy.name(),
                    artifact.len()
                );
                Verdict::Allow
            }
            Err(err) => {
                log::error!("[gate] deny {}: {}", policy.name(), err);
                Verdict::Deny(err)
            }
        }
    }

    fn evaluate(
        &self,
        artifact: &[u8],
        evidence: Option<&SignatureEvidence>,
        anchors: &TrustAnchorList,
        policy: &ArtifactPolicy,
    ) -> AegisResult<()> {
        let size = artifact.len() as u64;
        for validator in policy.validators() {
            if let Validator::RangeCheck { .. } = validator {
                if !validator.admits(size) {
                    return Err(AegisError::IMAGE_VERIFIER_SIZE_OUT_OF_RANGE);
                }
            }
        }

        let mut authenticated = false;
        let mut first_err = None;
        for validator in policy.validators() {
            let result = match validator {
                Validator::HashCheck => self.verify_known_hash(artifact, anchors, policy.name()),
                Validator::SignatureCheck => self.verify_signature(artifact, evidence, anchors),
                Validator::RangeCheck { .. } => continue,
            };
            match result {
                Ok(()) => authenticated = true,
                Err(err) => {
                    first_err.get_or_insert(err);
                }
            }
        }

        if authenticated {
            Ok(())
        } else {
            Err(first_err.unwrap_or(AegisError::IMAGE_VERIFIER_NO_AUTHENTICATING_VALIDATOR))
        }
    }

    /// Compare the artifact digest with every known-hash entry for `name`
    ///
    /// All entries are compared, in constant time, before deciding.
    fn verify_known_hash(
        &self,
        artifact: &[u8],
        anchors: &TrustAnchorList,
        name: &str,
    ) -> AegisResult<()> {
        let mut candidates = 0;
        let mut matched = false;
        let mut actual: Option<Digest> = None;
        for expected in anchors.known_hashes(name) {
            candidates += 1;
            let digest = match actual {
                Some(digest) if digest.algorithm() == expected.algorithm() => digest,
                _ => {
                    let digest = self.env.digest(expected.algorithm(), artifact)?;
                    actual = Some(digest);
                    digest
                }
            };
            matched |= digest.ct_eq(expected);
        }

        if candidates == 0 {
            return Err(AegisError::IMAGE_VERIFIER_TRUST_ANCHOR_MISSING);
        }
        if !matched {
            if let Some(digest) = actual {
                log::debug!("[gate] {} digest {}", name, HexBytes(digest.as_bytes()));
            }
            return Err(AegisError::IMAGE_VERIFIER_HASH_MISMATCH);
        }
        Ok(())
    }

    /// Verify the signature chain and the signature over the artifact digest
    fn verify_signature(
        &self,
        artifact: &[u8],
        evidence: Option<&SignatureEvidence>,
        anchors: &TrustAnchorList,
    ) -> AegisResult<()> {
        let evidence = evidence.ok_or(AegisError::IMAGE_VERIFIER_EVIDENCE_MISMATCH)?;
        let roots = anchors.root_certificates();
        if roots.is_empty() {
            return Err(AegisError::IMAGE_VERIFIER_NO_ROOT_CERTIFICATES);
        }

        let signer = verify_chain(evidence.chain, &roots, self.env.now())?;
        let digest = self.env.digest(evidence.digest_algorithm, artifact)?;

        let result = match (evidence.scheme, &signer) {
            (SignatureScheme::EcdsaDer, SubjectPublicKey::Ecdsa(key)) => {
                ecdsa_signature_from_der(key.curve(), evidence.signature)
                    .and_then(|sig| key.verify(digest.as_bytes(), &sig))
            }
            (SignatureScheme::RsaPkcs1v15, SubjectPublicKey::Rsa(key)) => {
                key.verify(RsaSignatureScheme::Pkcs1v15, &digest, evidence.signature)
            }
            (SignatureScheme::RsaPss, SubjectPublicKey::Rsa(key)) => {
                key.verify(RsaSignatureScheme::Pss, &digest, evidence.signature)
            }
            _ => return Err(AegisError::IMAGE_VERIFIER_UNSUPPORTED_SCHEME),
        };
        result.map_err(|_| AegisError::IMAGE_VERIFIER_SIGNATURE_INVALID)
    }
}

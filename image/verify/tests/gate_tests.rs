// Licensed under the Apache-2.0 license

use aegis_drivers::{hash_oneshot, EcdsaCurve, EcdsaPrivKey, HashAlgorithm};
use aegis_error::{AegisError, ErrorKind};
use aegis_image_verify::*;
use aegis_x509::ecdsa_signature_to_der;
use hex_literal::hex;

const ROOT_P384: &[u8] = include_bytes!("data/root_p384.der");
const INTERMEDIATE_P256: &[u8] = include_bytes!("data/intermediate_p256.der");
const LEAF_P256: &[u8] = include_bytes!("data/leaf_p256.der");
const ROGUE_ROOT: &[u8] = include_bytes!("data/rogue_root.der");
const RSA_ROOT: &[u8] = include_bytes!("data/rsa_root.der");
const LEAF_P521_RSA_ISSUED: &[u8] = include_bytes!("data/leaf_p521_rsa_issued.der");

const LEAF_P256_KEY: [u8; 32] =
    hex!("ecf812c5171614887793dafa1e787f66496deb8e91938b8d9eccb2c78568e847");
const LEAF_P521_KEY: [u8; 66] = hex!("0131f84e0f49237945678cdf0536cb2934c574a2b93ec6b0ee57a5b787395ceedf9d2cfbe145ffa248084d4459b0761abae5658629e2addc18c4abd473ad41c4ef79");

const KERNEL: &[u8] = b"\x7fELF kernel image for the gate tests";

// 2025-06-15
const NOW: u64 = 1_750_000_000;

fn sign(curve: EcdsaCurve, key: &[u8], alg: HashAlgorithm, data: &[u8]) -> Vec<u8> {
    let key = EcdsaPrivKey::from_bytes(curve, key).unwrap();
    let digest = hash_oneshot(alg, data).unwrap();
    ecdsa_signature_to_der(&key.sign(digest.as_bytes()).unwrap())
}

fn known_hash_anchors(name: &str, data: &[u8]) -> TrustAnchorList {
    let digest = hash_oneshot(HashAlgorithm::Sha256, data).unwrap();
    let text = format!("hash.{} = sha256:{}\n", name, hex::encode(digest.as_bytes()));
    TrustAnchorList::from_config(&text).unwrap()
}

fn root_anchors(roots: &[&[u8]]) -> TrustAnchorList {
    let mut anchors = TrustAnchorList::new();
    for root in roots {
        anchors.add_root_certificate(root).unwrap();
    }
    anchors
}

#[test]
fn test_known_hash_allow() {
    let anchors = known_hash_anchors("kernel", KERNEL);
    let policy = ArtifactPolicy::known_hash("kernel").unwrap();
    assert_eq!(
        verify_artifact(KERNEL, None, &anchors, &policy, NOW),
        Verdict::Allow
    );
}

#[test]
fn test_known_hash_deny() {
    let anchors = known_hash_anchors("kernel", KERNEL);
    let policy = ArtifactPolicy::known_hash("kernel").unwrap();

    let mut tampered = KERNEL.to_vec();
    tampered[4] ^= 0x20;
    let verdict = verify_artifact(&tampered, None, &anchors, &policy, NOW);
    assert_eq!(
        verdict,
        Verdict::Deny(AegisError::IMAGE_VERIFIER_HASH_MISMATCH)
    );
    assert_eq!(
        verdict.into_result().unwrap_err().kind(),
        ErrorKind::VerificationFailed
    );

    let initrd = ArtifactPolicy::known_hash("initrd").unwrap();
    assert_eq!(
        verify_artifact(KERNEL, None, &anchors, &initrd, NOW),
        Verdict::Deny(AegisError::IMAGE_VERIFIER_TRUST_ANCHOR_MISSING)
    );
    assert_eq!(
        verify_artifact(KERNEL, None, &TrustAnchorList::new(), &policy, NOW),
        Verdict::Deny(AegisError::IMAGE_VERIFIER_TRUST_ANCHOR_MISSING)
    );
}

#[test]
fn test_known_hash_any_entry_matches() {
    let sha512 = hash_oneshot(HashAlgorithm::Sha512, KERNEL).unwrap();
    let text = format!(
        "hash.kernel = sha256:{}\nhash.kernel = sha512:{}\n",
        "00".repeat(32),
        hex::encode(sha512.as_bytes())
    );
    let anchors = TrustAnchorList::from_config(&text).unwrap();
    let policy = ArtifactPolicy::known_hash("kernel").unwrap();
    assert!(verify_artifact(KERNEL, None, &anchors, &policy, NOW).is_allow());
}

#[test]
fn test_signature_allow() {
    let signature = sign(EcdsaCurve::P256, &LEAF_P256_KEY, HashAlgorithm::Sha256, KERNEL);
    let chain = [LEAF_P256, INTERMEDIATE_P256];
    let evidence = SignatureEvidence {
        scheme: SignatureScheme::EcdsaDer,
        digest_algorithm: HashAlgorithm::Sha256,
        signature: &signature,
        chain: &chain,
    };
    let anchors = root_anchors(&[RSA_ROOT, ROOT_P384]);
    let policy = ArtifactPolicy::signed("kernel").unwrap();
    assert_eq!(
        verify_artifact(KERNEL, Some(&evidence), &anchors, &policy, NOW),
        Verdict::Allow
    );
}

#[test]
fn test_signature_deny() {
    let signature = sign(EcdsaCurve::P256, &LEAF_P256_KEY, HashAlgorithm::Sha256, KERNEL);
    let chain = [LEAF_P256, INTERMEDIATE_P256];
    let evidence = SignatureEvidence {
        scheme: SignatureScheme::EcdsaDer,
        digest_algorithm: HashAlgorithm::Sha256,
        signature: &signature,
        chain: &chain,
    };
    let anchors = root_anchors(&[ROOT_P384]);
    let policy = ArtifactPolicy::signed("kernel").unwrap();

    let mut tampered = KERNEL.to_vec();
    tampered.push(0);
    assert_eq!(
        verify_artifact(&tampered, Some(&evidence), &anchors, &policy, NOW),
        Verdict::Deny(AegisError::IMAGE_VERIFIER_SIGNATURE_INVALID)
    );

    // Signature over a different digest algorithm than declared
    let wrong_alg = SignatureEvidence {
        digest_algorithm: HashAlgorithm::Sha384,
        ..evidence
    };
    assert_eq!(
        verify_artifact(KERNEL, Some(&wrong_alg), &anchors, &policy, NOW),
        Verdict::Deny(AegisError::IMAGE_VERIFIER_SIGNATURE_INVALID)
    );

    assert_eq!(
        verify_artifact(KERNEL, None, &anchors, &policy, NOW),
        Verdict::Deny(AegisError::IMAGE_VERIFIER_EVIDENCE_MISMATCH)
    );
    assert_eq!(
        verify_artifact(KERNEL, Some(&evidence), &TrustAnchorList::new(), &policy, NOW),
        Verdict::Deny(AegisError::IMAGE_VERIFIER_NO_ROOT_CERTIFICATES)
    );

    let rsa = SignatureEvidence {
        scheme: SignatureScheme::RsaPkcs1v15,
        ..evidence
    };
    assert_eq!(
        verify_artifact(KERNEL, Some(&rsa), &anchors, &policy, NOW),
        Verdict::Deny(AegisError::IMAGE_VERIFIER_UNSUPPORTED_SCHEME)
    );
}

#[test]
fn test_signature_chain_failures() {
    let signature = sign(EcdsaCurve::P256, &LEAF_P256_KEY, HashAlgorithm::Sha256, KERNEL);
    let chain = [LEAF_P256, INTERMEDIATE_P256];
    let evidence = SignatureEvidence {
        scheme: SignatureScheme::EcdsaDer,
        digest_algorithm: HashAlgorithm::Sha256,
        signature: &signature,
        chain: &chain,
    };
    let policy = ArtifactPolicy::signed("kernel").unwrap();

    // Same root name, different key
    assert_eq!(
        verify_artifact(KERNEL, Some(&evidence), &root_anchors(&[ROGUE_ROOT]), &policy, NOW),
        Verdict::Deny(AegisError::X509_SIGNATURE_INVALID)
    );
    assert_eq!(
        verify_artifact(KERNEL, Some(&evidence), &root_anchors(&[RSA_ROOT]), &policy, NOW),
        Verdict::Deny(AegisError::X509_CHAIN_INCOMPLETE)
    );

    // After the root expires
    let anchors = root_anchors(&[ROOT_P384]);
    assert_eq!(
        verify_artifact(KERNEL, Some(&evidence), &anchors, &policy, 3_000_000_000),
        Verdict::Deny(AegisError::X509_CERT_EXPIRED)
    );

    let leaf_only = [LEAF_P256];
    let short = SignatureEvidence {
        chain: &leaf_only,
        ..evidence
    };
    assert_eq!(
        verify_artifact(KERNEL, Some(&short), &anchors, &policy, NOW),
        Verdict::Deny(AegisError::X509_CHAIN_INCOMPLETE)
    );
}

#[test]
fn test_p521_signer_under_rsa_root() {
    let signature = sign(EcdsaCurve::P521, &LEAF_P521_KEY, HashAlgorithm::Sha512, KERNEL);
    let chain = [LEAF_P521_RSA_ISSUED];
    let evidence = SignatureEvidence {
        scheme: SignatureScheme::EcdsaDer,
        digest_algorithm: HashAlgorithm::Sha512,
        signature: &signature,
        chain: &chain,
    };
    let anchors = root_anchors(&[RSA_ROOT]);
    let policy = ArtifactPolicy::signed("initrd").unwrap();
    assert!(verify_artifact(KERNEL, Some(&evidence), &anchors, &policy, NOW).is_allow());

    let pss = SignatureEvidence {
        scheme: SignatureScheme::RsaPss,
        ..evidence
    };
    assert_eq!(
        verify_artifact(KERNEL, Some(&pss), &anchors, &policy, NOW),
        Verdict::Deny(AegisError::IMAGE_VERIFIER_UNSUPPORTED_SCHEME)
    );
}

#[test]
fn test_range_checks() {
    let anchors = known_hash_anchors("kernel", KERNEL);
    let len = KERNEL.len() as u64;

    let fits = ArtifactPolicy::known_hash("kernel")
        .unwrap()
        .with_size_range(1, len);
    assert!(verify_artifact(KERNEL, None, &anchors, &fits, NOW).is_allow());

    // A matching hash does not override a failed range check
    let too_small = ArtifactPolicy::known_hash("kernel")
        .unwrap()
        .with_size_range(len + 1, 1 << 20);
    assert_eq!(
        verify_artifact(KERNEL, None, &anchors, &too_small, NOW),
        Verdict::Deny(AegisError::IMAGE_VERIFIER_SIZE_OUT_OF_RANGE)
    );

    let range_only = ArtifactPolicy::new("kernel", &[Validator::range(0, 1 << 20)]).unwrap();
    assert_eq!(
        verify_artifact(KERNEL, None, &anchors, &range_only, NOW),
        Verdict::Deny(AegisError::IMAGE_VERIFIER_NO_AUTHENTICATING_VALIDATOR)
    );
    let empty = ArtifactPolicy::new("kernel", &[]).unwrap();
    assert!(!verify_artifact(KERNEL, None, &anchors, &empty, NOW).is_allow());
}

#[test]
fn test_hash_or_signature_policy() {
    let policy = ArtifactPolicy::new(
        "kernel",
        &[Validator::HashCheck, Validator::SignatureCheck],
    )
    .unwrap();

    // No known hash, valid signature
    let signature = sign(EcdsaCurve::P256, &LEAF_P256_KEY, HashAlgorithm::Sha256, KERNEL);
    let chain = [LEAF_P256, INTERMEDIATE_P256];
    let evidence = SignatureEvidence {
        scheme: SignatureScheme::EcdsaDer,
        digest_algorithm: HashAlgorithm::Sha256,
        signature: &signature,
        chain: &chain,
    };
    let anchors = root_anchors(&[ROOT_P384]);
    assert!(verify_artifact(KERNEL, Some(&evidence), &anchors, &policy, NOW).is_allow());

    // Neither passes, the first failure is reported
    assert_eq!(
        verify_artifact(KERNEL, None, &anchors, &policy, NOW),
        Verdict::Deny(AegisError::IMAGE_VERIFIER_TRUST_ANCHOR_MISSING)
    );
}

struct FailingEnv;

impl ArtifactVerificationEnv for FailingEnv {
    fn digest(&self, _alg: HashAlgorithm, _data: &[u8]) -> aegis_error::AegisResult<aegis_drivers::Digest> {
        Err(AegisError::DRIVER_DIGEST_UNSUPPORTED_ALGORITHM)
    }

    fn now(&self) -> u64 {
        NOW
    }
}

#[test]
fn test_environment_failure_denies() {
    let anchors = known_hash_anchors("kernel", KERNEL);
    let policy = ArtifactPolicy::known_hash("kernel").unwrap();
    let gate = SecureBootGate::new(FailingEnv);
    assert_eq!(
        gate.verify(KERNEL, None, &anchors, &policy),
        Verdict::Deny(AegisError::DRIVER_DIGEST_UNSUPPORTED_ALGORITHM)
    );
}

#[test]
fn test_root_anchor_must_be_ca() {
    let mut anchors = TrustAnchorList::new();
    assert_eq!(
        anchors.add_root_certificate(LEAF_P256),
        Err(AegisError::X509_ISSUER_NOT_CA)
    );
}

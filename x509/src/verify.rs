/*++

Licensed under the Apache-2.0 license.

File Name:

    verify.rs

Abstract:

    Certificate signature, validity and chain-of-trust verification.

--*/

use crate::cert::{Certificate, SignatureAlgorithm, SubjectPublicKey};
use crate::der_helper::*;
use aegis_drivers::{hash_oneshot, EcdsaCurve, EcdsaSignature, RsaSignatureScheme};
use aegis_error::{AegisError, AegisResult};
use alloc::vec::Vec;

/// Longest chain accepted, leaf included
pub const MAX_CHAIN_DEPTH: usize = 8;

/// Decode an ECDSA-Sig-Value `SEQUENCE { r INTEGER, s INTEGER }`
pub fn ecdsa_signature_from_der(curve: EcdsaCurve, der: &[u8]) -> AegisResult<EcdsaSignature> {
    let mut outer = DerReader::new(der);
    let mut seq = DerReader::new(outer.read(DER_SEQ_TAG)?);
    outer.finish()?;
    let r = seq.read_uint()?;
    let s = seq.read_uint()?;
    seq.finish()?;
    EcdsaSignature::from_scalars(curve, r, s)
}

/// Encode an ECDSA signature as `SEQUENCE { r INTEGER, s INTEGER }`
pub fn ecdsa_signature_to_der(sig: &EcdsaSignature) -> Vec<u8> {
    let mut body = Vec::new();
    der_encode_uint(sig.r(), &mut body);
    der_encode_uint(sig.s(), &mut body);
    let mut out = Vec::with_capacity(body.len() + 4);
    der_encode_tlv(DER_SEQ_TAG, &body, &mut out);
    out
}

/// Verify `signature` over `message` with a certificate public key
///
/// # Arguments
///
/// * `key` - Signer public key
/// * `alg` - Signature algorithm, must match the key type
/// * `message` - Signed bytes, hashed here with the algorithm's digest
/// * `signature` - DER ECDSA-Sig-Value or raw RSA signature
pub fn verify_signature(
    key: &SubjectPublicKey,
    alg: SignatureAlgorithm,
    message: &[u8],
    signature: &[u8],
) -> AegisResult<()> {
    let digest = hash_oneshot(alg.hash_algorithm(), message)?;
    let result = match key {
        SubjectPublicKey::Ecdsa(k) if alg.is_ecdsa() => ecdsa_signature_from_der(k.curve(), signature)
            .and_then(|sig| k.verify(digest.as_bytes(), &sig)),
        SubjectPublicKey::Rsa(k) if !alg.is_ecdsa() => {
            k.verify(RsaSignatureScheme::Pkcs1v15, &digest, signature)
        }
        _ => return Err(AegisError::X509_SIGNATURE_ALGORITHM_MISMATCH),
    };
    result.map_err(|_| AegisError::X509_SIGNATURE_INVALID)
}

/// Verify one certificate against its issuer
///
/// Checks, in order: the validity window at `now`, that the issuer's subject
/// matches the certificate's issuer, that the issuer is a CA, and finally
/// the signature.
///
/// # Arguments
///
/// * `cert` - Certificate to verify
/// * `issuer` - Candidate issuer certificate
/// * `now` - Seconds since the Unix epoch
pub fn verify_certificate(cert: &Certificate, issuer: &Certificate, now: u64) -> AegisResult<()> {
    cert.validity().check(now)?;
    if cert.issuer() != issuer.subject() {
        return Err(AegisError::X509_ISSUER_MISMATCH);
    }
    if !issuer.is_ca() {
        return Err(AegisError::X509_ISSUER_NOT_CA);
    }
    verify_signature(
        issuer.public_key(),
        cert.signature_algorithm(),
        cert.tbs(),
        cert.signature(),
    )
}

// `below` is the number of CA certificates between the issuer and the leaf
fn check_path_len(issuer: &Certificate, below: usize) -> AegisResult<()> {
    match issuer.basic_constraints().and_then(|bc| bc.path_len) {
        Some(max) if below > max as usize => Err(AegisError::X509_PATH_LEN_EXCEEDED),
        _ => Ok(()),
    }
}

/// Verify a chain from the leaf up to one of the trusted roots
///
/// # Arguments
///
/// * `chain` - DER certificates, leaf first, each issued by the next
/// * `trusted_roots` - DER root certificates
/// * `now` - Seconds since the Unix epoch
///
/// # Returns
///
/// * `SubjectPublicKey` - The leaf's public key
pub fn verify_chain(
    chain: &[&[u8]],
    trusted_roots: &[&[u8]],
    now: u64,
) -> AegisResult<SubjectPublicKey> {
    if chain.is_empty() {
        return Err(AegisError::X509_CHAIN_EMPTY);
    }
    if chain.len() > MAX_CHAIN_DEPTH {
        return Err(AegisError::X509_CHAIN_TOO_LONG);
    }

    let certs = chain
        .iter()
        .map(|der| Certificate::from_der(der))
        .collect::<AegisResult<Vec<_>>>()?;

    for (i, pair) in certs.windows(2).enumerate() {
        verify_certificate(&pair[0], &pair[1], now)?;
        check_path_len(&pair[1], i)?;
    }

    let last_index = certs.len() - 1;
    let last = &certs[last_index];

    // The chain may end with the trusted root itself
    if trusted_roots.iter().any(|root| *root == last.raw()) {
        last.validity().check(now)?;
        log::debug!("[x509] chain terminates in a trusted root");
        return Ok(certs[0].public_key().clone());
    }

    let mut first_err = None;
    for root_der in trusted_roots {
        let root = match Certificate::from_der(root_der) {
            Ok(root) => root,
            Err(err) => {
                log::warn!("[x509] skipping unparsable root: {}", err);
                continue;
            }
        };
        if root.subject() != last.issuer() {
            continue;
        }
        let result = root
            .validity()
            .check(now)
            .and_then(|_| verify_certificate(last, &root, now))
            .and_then(|_| check_path_len(&root, last_index));
        match result {
            Ok(()) => {
                log::debug!("[x509] chain of {} verified", certs.len());
                return Ok(certs[0].public_key().clone());
            }
            Err(err) => {
                first_err.get_or_insert(err);
            }
        }
    }

    if let Some(err) = first_err {
        return Err(err);
    }
    if last.is_self_issued() {
        Err(AegisError::X509_UNTRUSTED_ROOT)
    } else {
        Err(AegisError::X509_CHAIN_INCOMPLETE)
    }
}

/*++

Licensed under the Apache-2.0 license.

File Name:

    cert_bldr.rs

Abstract:

    X509 API to construct a Certificate from a "To Be Signed" blob and a
    signature.

--*/

use crate::cert::SignatureAlgorithm;
use crate::der_helper::*;
use crate::verify::ecdsa_signature_to_der;
use aegis_drivers::{hash_oneshot, EcdsaPrivKey, EcdsaSignature};
use aegis_error::{AegisError, AegisResult};
use alloc::vec::Vec;

/// Certificate builder
pub struct CertBuilder<'a> {
    tbs: &'a [u8],
    alg: SignatureAlgorithm,
}

impl<'a> CertBuilder<'a> {
    /// # Arguments
    ///
    /// * `tbs` - DER TBSCertificate, its signature field must name `alg`
    /// * `alg` - Signature algorithm
    pub fn new(tbs: &'a [u8], alg: SignatureAlgorithm) -> Self {
        Self { tbs, alg }
    }

    fn algorithm_identifier(&self, out: &mut Vec<u8>) {
        let mut body = Vec::new();
        der_encode_tlv(DER_OID_TAG, self.alg.oid(), &mut body);
        if !self.alg.is_ecdsa() {
            der_encode_tlv(DER_NULL_TAG, &[], &mut body);
        }
        der_encode_tlv(DER_SEQ_TAG, &body, out);
    }

    /// Build the certificate around an encoded signature value
    ///
    /// # Arguments
    ///
    /// * `signature` - DER ECDSA-Sig-Value or raw RSA signature
    pub fn build(&self, signature: &[u8]) -> Vec<u8> {
        let mut body = Vec::with_capacity(self.tbs.len() + signature.len() + 32);
        body.extend_from_slice(self.tbs);
        self.algorithm_identifier(&mut body);

        let mut bits = Vec::with_capacity(signature.len() + 1);
        bits.push(0);
        bits.extend_from_slice(signature);
        der_encode_tlv(DER_BIT_STR_TAG, &bits, &mut body);

        let mut cert = Vec::with_capacity(body.len() + 4);
        der_encode_tlv(DER_SEQ_TAG, &body, &mut cert);
        cert
    }

    /// Build the certificate around an ECDSA signature
    pub fn build_ecdsa(&self, sig: &EcdsaSignature) -> AegisResult<Vec<u8>> {
        if !self.alg.is_ecdsa() {
            return Err(AegisError::X509_SIGNATURE_ALGORITHM_MISMATCH);
        }
        Ok(self.build(&ecdsa_signature_to_der(sig)))
    }

    /// Sign the TBS with `key` and build the certificate
    pub fn sign_ecdsa(&self, key: &EcdsaPrivKey) -> AegisResult<Vec<u8>> {
        let digest = hash_oneshot(self.alg.hash_algorithm(), self.tbs)?;
        let sig = key.sign(digest.as_bytes())?;
        self.build_ecdsa(&sig)
    }
}

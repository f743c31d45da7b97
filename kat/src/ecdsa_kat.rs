/*++

Licensed under the Apache-2.0 license.

File Name:

    ecdsa_kat.rs

Abstract:

    File contains the Known Answer Tests (KAT) for ECDSA P-256 cryptography operations.

--*/

use aegis_drivers::{hash_oneshot, EcdsaCurve, EcdsaPrivKey, HashAlgorithm};
use aegis_error::{AegisError, AegisResult};
use hex_literal::hex;

const PRIV_KEY: [u8; 32] =
    hex!("c9afa9d845ba75166b5c215767b1d6934e50c3db36e89b127b8a622b120f6721");

const SIGNATURE_R: [u8; 32] =
    hex!("efd48b2aacb6a8fd1140dd9cd45e81d69d2c877b56aaf991c34d0ea84eaf3716");

const SIGNATURE_S: [u8; 32] =
    hex!("f7cb1c942d657c41d436c7a1b6e29f65f3e900dbb9aff4064dc4ab2f843acda8");

#[derive(Default, Debug)]
pub struct EcdsaKat {}

impl EcdsaKat {
    /// This function executes the Known Answer Tests (aka KAT) for ECDSA.
    ///
    /// Test vector source:
    /// RFC 6979 A.2.5, P-256 with SHA-256, message "sample"
    ///
    /// # Returns
    ///
    /// * `AegisResult` - Result denoting the KAT outcome.
    pub fn execute(&self) -> AegisResult<()> {
        let digest = hash_oneshot(HashAlgorithm::Sha256, b"sample")
            .map_err(|_| AegisError::KAT_ECDSA_SIGNATURE_MISMATCH)?;
        let priv_key = EcdsaPrivKey::from_bytes(EcdsaCurve::P256, &PRIV_KEY)
            .map_err(|_| AegisError::KAT_ECDSA_SIGNATURE_MISMATCH)?;

        let sig = priv_key
            .sign(digest.as_bytes())
            .map_err(|_| AegisError::KAT_ECDSA_SIGNATURE_MISMATCH)?;
        if sig.r() != SIGNATURE_R.as_slice() || sig.s() != SIGNATURE_S.as_slice() {
            return Err(AegisError::KAT_ECDSA_SIGNATURE_MISMATCH);
        }

        priv_key
            .public_key()
            .verify(digest.as_bytes(), &sig)
            .map_err(|_| AegisError::KAT_ECDSA_VERIFY_FAILURE)
    }
}

/*++

Licensed under the Apache-2.0 license.

File Name:

    sha3_kat.rs

Abstract:

    File contains the Known Answer Tests (KAT) for SHA3-256 cryptography operations.

--*/

use aegis_drivers::{hash_oneshot, HashAlgorithm};
use aegis_error::{AegisError, AegisResult};
use hex_literal::hex;

const EXPECTED_ABC: [u8; 32] = hex!(
    "3a985da74fe225b2045c172d6bd390bd855f086e3e9d525b46bfe24511431532"
);

#[derive(Default, Debug)]
pub struct Sha3Kat {}

impl Sha3Kat {
    /// This function executes the Known Answer Tests (aka KAT) for SHA3-256.
    ///
    /// Test vector source:
    /// FIPS 202 example values, SHA3-256 of "abc"
    ///
    /// # Returns
    ///
    /// * `AegisResult` - Result denoting the KAT outcome.
    pub fn execute(&self) -> AegisResult<()> {
        let digest = hash_oneshot(HashAlgorithm::Sha3_256, b"abc")
            .map_err(|_| AegisError::KAT_SHA3_256_DIGEST_MISMATCH)?;
        if digest.as_bytes() != EXPECTED_ABC.as_slice() {
            return Err(AegisError::KAT_SHA3_256_DIGEST_MISMATCH);
        }
        Ok(())
    }
}

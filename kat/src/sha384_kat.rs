/*++

Licensed under the Apache-2.0 license.

File Name:

    sha384_kat.rs

Abstract:

    File contains the Known Answer Tests (KAT) for SHA2-384 cryptography operations.

--*/

use aegis_drivers::{hash_oneshot, HashAlgorithm};
use aegis_error::{AegisError, AegisResult};
use hex_literal::hex;

const EXPECTED_ABC: [u8; 48] = hex!(
    "cb00753f45a35e8bb5a03d699ac65007272c32ab0eded1631a8b605a43ff5bed8086072ba1e7cc2358baeca134c825a7"
);

#[derive(Default, Debug)]
pub struct Sha384Kat {}

impl Sha384Kat {
    /// This function executes the Known Answer Tests (aka KAT) for SHA2-384.
    ///
    /// Test vector source:
    /// https://csrc.nist.gov/CSRC/media/Projects/Cryptographic-Algorithm-Validation-Program/documents/shs/shabytetestvectors.zip
    ///
    /// # Returns
    ///
    /// * `AegisResult` - Result denoting the KAT outcome.
    pub fn execute(&self) -> AegisResult<()> {
        let digest = hash_oneshot(HashAlgorithm::Sha384, b"abc")
            .map_err(|_| AegisError::KAT_SHA384_DIGEST_MISMATCH)?;
        if digest.as_bytes() != EXPECTED_ABC.as_slice() {
            return Err(AegisError::KAT_SHA384_DIGEST_MISMATCH);
        }
        Ok(())
    }
}

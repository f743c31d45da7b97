/*++

Licensed under the Apache-2.0 license.

File Name:

    sha512_kat.rs

Abstract:

    File contains the Known Answer Tests (KAT) for SHA2-512 cryptography operations.

--*/

use aegis_drivers::{hash_oneshot, HashAlgorithm};
use aegis_error::{AegisError, AegisResult};
use hex_literal::hex;

const EXPECTED_ABC: [u8; 64] = hex!(
    "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"
);

#[derive(Default, Debug)]
pub struct Sha512Kat {}

impl Sha512Kat {
    /// This function executes the Known Answer Tests (aka KAT) for SHA2-512.
    ///
    /// Test vector source:
    /// https://csrc.nist.gov/CSRC/media/Projects/Cryptographic-Algorithm-Validation-Program/documents/shs/shabytetestvectors.zip
    ///
    /// # Returns
    ///
    /// * `AegisResult` - Result denoting the KAT outcome.
    pub fn execute(&self) -> AegisResult<()> {
        let digest = hash_oneshot(HashAlgorithm::Sha512, b"abc")
            .map_err(|_| AegisError::KAT_SHA512_DIGEST_MISMATCH)?;
        if digest.as_bytes() != EXPECTED_ABC.as_slice() {
            return Err(AegisError::KAT_SHA512_DIGEST_MISMATCH);
        }
        Ok(())
    }
}

/*++

Licensed under the Apache-2.0 license.

File Name:

    blake2b_kat.rs

Abstract:

    File contains the Known Answer Tests (KAT) for BLAKE2b-512 cryptography operations.

--*/

use aegis_drivers::{hash_oneshot, HashAlgorithm};
use aegis_error::{AegisError, AegisResult};
use hex_literal::hex;

const EXPECTED_ABC: [u8; 64] = hex!(
    "ba80a53f981c4d0d6a2797b69f12f6e94c212f14685ac4b74b12bb6fdbffa2d17d87c5392aab792dc252d5de4533cc9518d38aa8dbf1925ab92386edd4009923"
);

#[derive(Default, Debug)]
pub struct Blake2bKat {}

impl Blake2bKat {
    /// This function executes the Known Answer Tests (aka KAT) for BLAKE2b-512.
    ///
    /// Test vector source:
    /// RFC 7693 Appendix A
    ///
    /// # Returns
    ///
    /// * `AegisResult` - Result denoting the KAT outcome.
    pub fn execute(&self) -> AegisResult<()> {
        let digest = hash_oneshot(HashAlgorithm::Blake2b, b"abc")
            .map_err(|_| AegisError::KAT_BLAKE2B_DIGEST_MISMATCH)?;
        if digest.as_bytes() != EXPECTED_ABC.as_slice() {
            return Err(AegisError::KAT_BLAKE2B_DIGEST_MISMATCH);
        }
        Ok(())
    }
}

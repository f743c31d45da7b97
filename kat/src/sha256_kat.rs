/*++

Licensed under the Apache-2.0 license.

File Name:

    sha256_kat.rs

Abstract:

    File contains the Known Answer Tests (KAT) for SHA-256 cryptography operations.

--*/

use aegis_drivers::{hash_oneshot, DigestContext, DigestOp, HashAlgorithm};
use aegis_error::{AegisError, AegisResult};
use hex_literal::hex;

const EXPECTED_NO_DATA: [u8; 32] =
    hex!("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");

const EXPECTED_ABC: [u8; 32] =
    hex!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");

#[derive(Default, Debug)]
pub struct Sha256Kat {}

impl Sha256Kat {
    /// This function executes the Known Answer Tests (aka KAT) for SHA256.
    ///
    /// Test vector source:
    /// https://csrc.nist.gov/CSRC/media/Projects/Cryptographic-Algorithm-Validation-Program/documents/shs/shabytetestvectors.zip
    ///
    /// # Returns
    ///
    /// * `AegisResult` - Result denoting the KAT outcome.
    pub fn execute(&self) -> AegisResult<()> {
        self.kat_no_data()?;
        self.kat_streaming()
    }

    fn kat_no_data(&self) -> AegisResult<()> {
        let digest = hash_oneshot(HashAlgorithm::Sha256, &[])
            .map_err(|_| AegisError::KAT_SHA256_DIGEST_MISMATCH)?;
        if digest.as_bytes() != EXPECTED_NO_DATA.as_slice() {
            return Err(AegisError::KAT_SHA256_DIGEST_MISMATCH);
        }
        Ok(())
    }

    // "abc" fed one byte at a time exercises the partial block buffer
    fn kat_streaming(&self) -> AegisResult<()> {
        let mut op = DigestContext::new(HashAlgorithm::Sha256);
        let digest = b"abc"
            .chunks(1)
            .try_for_each(|chunk| op.update(chunk))
            .and_then(|_| op.finalize())
            .map_err(|_| AegisError::KAT_SHA256_DIGEST_MISMATCH)?;
        if digest.as_bytes() != EXPECTED_ABC.as_slice() {
            return Err(AegisError::KAT_SHA256_DIGEST_MISMATCH);
        }
        Ok(())
    }
}

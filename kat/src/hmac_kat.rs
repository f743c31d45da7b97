/*++

Licensed under the Apache-2.0 license.

File Name:

    hmac_kat.rs

Abstract:

    File contains the Known Answer Tests (KAT) for HMAC-SHA256 and
    HMAC-SHA512 cryptography operations.

--*/

use aegis_drivers::{hmac, hmac_verify, HashAlgorithm};
use aegis_error::{AegisError, AegisResult};
use hex_literal::hex;

const KEY: &[u8] = b"Jefe";
const DATA: &[u8] = b"what do ya want for nothing?";

const EXPECTED_SHA256: [u8; 32] =
    hex!("5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843");

const EXPECTED_SHA512: [u8; 64] = hex!(
    "164b7a7bfcf819e2e395fbe73b56e0a387bd64222e831fd610270cd7ea250554"
    "9758bf75c05a994a6d034f65f8f0e6fdcaeab1a34d4a6b4b636e070a38bce737"
);

#[derive(Default, Debug)]
pub struct HmacKat {}

impl HmacKat {
    /// This function executes the Known Answer Tests (aka KAT) for HMAC.
    ///
    /// Test vector source:
    /// RFC 4231 test case 2
    ///
    /// # Returns
    ///
    /// * `AegisResult` - Result denoting the KAT outcome.
    pub fn execute(&self) -> AegisResult<()> {
        Self::kat(
            HashAlgorithm::Sha256,
            &EXPECTED_SHA256,
            AegisError::KAT_HMAC_SHA256_TAG_MISMATCH,
        )?;
        Self::kat(
            HashAlgorithm::Sha512,
            &EXPECTED_SHA512,
            AegisError::KAT_HMAC_SHA512_TAG_MISMATCH,
        )
    }

    fn kat(alg: HashAlgorithm, expected: &[u8], err: AegisError) -> AegisResult<()> {
        let tag = hmac(alg, KEY, DATA).map_err(|_| err)?;
        if tag.as_bytes() != expected {
            return Err(err);
        }

        // The verify path must reject a tag that differs in one bit
        let mut forged = [0u8; 64];
        let forged = &mut forged[..expected.len()];
        forged.copy_from_slice(expected);
        forged[0] ^= 1;
        if hmac_verify(alg, KEY, DATA, expected).is_err()
            || hmac_verify(alg, KEY, DATA, forged).is_ok()
        {
            return Err(err);
        }
        Ok(())
    }
}

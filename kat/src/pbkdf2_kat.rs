/*++

Licensed under the Apache-2.0 license.

File Name:

    pbkdf2_kat.rs

Abstract:

    File contains the Known Answer Tests (KAT) for PBKDF2-HMAC-SHA256.

--*/

use aegis_drivers::pbkdf2_hmac_sha256;
use aegis_error::{AegisError, AegisResult};
use hex_literal::hex;

const ROUNDS: u32 = 4096;
const EXPECTED: [u8; 32] =
    hex!("c5e478d59288c841aa530db6845c4c8d962893a001ce4e11a4963873aa98134a");

#[derive(Default, Debug)]
pub struct Pbkdf2Kat {}

impl Pbkdf2Kat {
    /// This function executes the Known Answer Tests (aka KAT) for PBKDF2.
    ///
    /// Test vector source:
    /// RFC 6070 "password"/"salt", c = 4096 inputs with HMAC-SHA256 as the PRF
    ///
    /// # Returns
    ///
    /// * `AegisResult` - Result denoting the KAT outcome.
    pub fn execute(&self) -> AegisResult<()> {
        let mut okm = [0u8; 32];
        pbkdf2_hmac_sha256(b"password", b"salt", ROUNDS, &mut okm)
            .map_err(|_| AegisError::KAT_PBKDF2_OUTPUT_MISMATCH)?;
        if okm != EXPECTED {
            return Err(AegisError::KAT_PBKDF2_OUTPUT_MISMATCH);
        }
        Ok(())
    }
}

/*++

Licensed under the Apache-2.0 license.

File Name:

    aes_cbc_kat.rs

Abstract:

    File contains the Known Answer Tests (KAT) for AES-128-CBC cryptography operations.

--*/

use aegis_drivers::{aes_cbc_decrypt, aes_cbc_encrypt, AesContext};
use aegis_error::{AegisError, AegisResult};
use hex_literal::hex;

const KEY: [u8; 16] = hex!("2b7e151628aed2a6abf7158809cf4f3c");
const IV: [u8; 16] = hex!("000102030405060708090a0b0c0d0e0f");
const PLAINTEXT: [u8; 32] =
    hex!("6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e51");
const CIPHERTEXT: [u8; 32] =
    hex!("7649abac8119b246cee98e9b12e9197d5086cb9b507219ee95db113a917678b2");

#[derive(Default, Debug)]
pub struct AesCbcKat {}

impl AesCbcKat {
    /// This function executes the Known Answer Tests (aka KAT) for AES-CBC.
    ///
    /// Test vector source:
    /// NIST SP 800-38A F.2.1, first two blocks
    ///
    /// # Returns
    ///
    /// * `AegisResult` - Result denoting the KAT outcome.
    pub fn execute(&self) -> AegisResult<()> {
        let ctx = AesContext::new(&KEY).map_err(|_| AegisError::KAT_AES_CBC_MISMATCH)?;

        let mut ciphertext = [0u8; 32];
        aes_cbc_encrypt(&ctx, &IV, &PLAINTEXT, &mut ciphertext)
            .map_err(|_| AegisError::KAT_AES_CBC_MISMATCH)?;
        if ciphertext != CIPHERTEXT {
            return Err(AegisError::KAT_AES_CBC_MISMATCH);
        }

        let mut plaintext = [0u8; 32];
        aes_cbc_decrypt(&ctx, &IV, &CIPHERTEXT, &mut plaintext)
            .map_err(|_| AegisError::KAT_AES_CBC_MISMATCH)?;
        if plaintext != PLAINTEXT {
            return Err(AegisError::KAT_AES_CBC_MISMATCH);
        }
        Ok(())
    }
}

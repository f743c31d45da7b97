/*++

Licensed under the Apache-2.0 license.

File Name:

    aes_gcm_kat.rs

Abstract:

    File contains the Known Answer Tests (KAT) for AES-128-GCM cryptography operations.

--*/

use aegis_drivers::{aes_gcm_decrypt, aes_gcm_encrypt, AesContext};
use aegis_error::{AegisError, AegisResult};
use hex_literal::hex;

const KEY: [u8; 16] = [0u8; 16];
const IV: [u8; 12] = [0u8; 12];
const PLAINTEXT: [u8; 16] = [0u8; 16];
const CIPHERTEXT: [u8; 16] = hex!("0388dace60b6a392f328c2b971b2fe78");
const TAG: [u8; 16] = hex!("ab6e47d42cec13bdf53a67b21257bddf");

#[derive(Default, Debug)]
pub struct AesGcmKat {}

impl AesGcmKat {
    /// This function executes the Known Answer Tests (aka KAT) for AES-GCM.
    ///
    /// Test vector source:
    /// McGrew and Viega, "The Galois/Counter Mode of Operation", test case 2
    ///
    /// # Returns
    ///
    /// * `AegisResult` - Result denoting the KAT outcome.
    pub fn execute(&self) -> AegisResult<()> {
        let ctx = AesContext::new(&KEY).map_err(|_| AegisError::KAT_AES_GCM_CIPHERTEXT_MISMATCH)?;
        self.encrypt(&ctx)?;
        self.decrypt(&ctx)
    }

    fn encrypt(&self, ctx: &AesContext) -> AegisResult<()> {
        let mut ciphertext = [0u8; 16];
        let tag = aes_gcm_encrypt(ctx, &IV, &[], &PLAINTEXT, &mut ciphertext)
            .map_err(|_| AegisError::KAT_AES_GCM_CIPHERTEXT_MISMATCH)?;
        if ciphertext != CIPHERTEXT {
            return Err(AegisError::KAT_AES_GCM_CIPHERTEXT_MISMATCH);
        }
        if tag != TAG {
            return Err(AegisError::KAT_AES_GCM_TAG_MISMATCH);
        }
        Ok(())
    }

    fn decrypt(&self, ctx: &AesContext) -> AegisResult<()> {
        let mut plaintext = [0xffu8; 16];
        aes_gcm_decrypt(ctx, &IV, &[], &CIPHERTEXT, &TAG, &mut plaintext)
            .map_err(|_| AegisError::KAT_AES_GCM_PLAINTEXT_MISMATCH)?;
        if plaintext != PLAINTEXT {
            return Err(AegisError::KAT_AES_GCM_PLAINTEXT_MISMATCH);
        }

        let mut bad_tag = TAG;
        bad_tag[15] ^= 0x80;
        if aes_gcm_decrypt(ctx, &IV, &[], &CIPHERTEXT, &bad_tag, &mut plaintext).is_ok() {
            return Err(AegisError::KAT_AES_GCM_TAG_MISMATCH);
        }
        Ok(())
    }
}

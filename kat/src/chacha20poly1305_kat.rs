/*++

Licensed under the Apache-2.0 license.

File Name:

    chacha20poly1305_kat.rs

Abstract:

    File contains the Known Answer Tests (KAT) for ChaCha20-Poly1305 AEAD operations.

--*/

use aegis_drivers::ChaCha20Poly1305Context;
use aegis_error::{AegisError, AegisResult};
use hex_literal::hex;

const KEY: [u8; 32] = hex!("808182838485868788898a8b8c8d8e8f909192939495969798999a9b9c9d9e9f");
const NONCE: [u8; 12] = hex!("070000004041424344454647");
const AAD: [u8; 12] = hex!("50515253c0c1c2c3c4c5c6c7");
const PLAINTEXT: &[u8; 114] = b"Ladies and Gentlemen of the class of '99: If I could offer you only one tip for the future, sunscreen would be it.";
const CIPHERTEXT: [u8; 114] = hex!(
    "d31a8d34648e60db7b86afbc53ef7ec2a4aded51296e08fea9e2b5a736ee62d6"
    "3dbea45e8ca9671282fafb69da92728b1a71de0a9e060b2905d6a5b67ecd3b36"
    "92ddbd7f2d778b8c9803aee328091b58fab324e4fad675945585808b4831d7bc"
    "3ff4def08e4b7a9de576d26586cec64b6116"
);
const TAG: [u8; 16] = hex!("1ae10b594f09e26a7e902ecbd0600691");

#[derive(Default, Debug)]
pub struct ChaCha20Poly1305Kat {}

impl ChaCha20Poly1305Kat {
    /// This function executes the Known Answer Tests (aka KAT) for ChaCha20-Poly1305.
    ///
    /// Test vector source:
    /// RFC 8439 section 2.8.2
    ///
    /// # Returns
    ///
    /// * `AegisResult` - Result denoting the KAT outcome.
    pub fn execute(&self) -> AegisResult<()> {
        let ctx = ChaCha20Poly1305Context::new(&KEY)
            .map_err(|_| AegisError::KAT_CHACHA20POLY1305_MISMATCH)?;

        let mut ciphertext = [0u8; 114];
        let tag = ctx
            .encrypt(&NONCE, &AAD, PLAINTEXT, &mut ciphertext)
            .map_err(|_| AegisError::KAT_CHACHA20POLY1305_MISMATCH)?;
        if ciphertext != CIPHERTEXT || tag != TAG {
            return Err(AegisError::KAT_CHACHA20POLY1305_MISMATCH);
        }

        let mut plaintext = [0u8; 114];
        ctx.decrypt(&NONCE, &AAD, &CIPHERTEXT, &TAG, &mut plaintext)
            .map_err(|_| AegisError::KAT_CHACHA20POLY1305_MISMATCH)?;
        if &plaintext != PLAINTEXT {
            return Err(AegisError::KAT_CHACHA20POLY1305_MISMATCH);
        }
        Ok(())
    }
}

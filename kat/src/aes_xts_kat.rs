/*++

Licensed under the Apache-2.0 license.

File Name:

    aes_xts_kat.rs

Abstract:

    File contains the Known Answer Tests (KAT) for AES-128-XTS cryptography operations.

--*/

use aegis_drivers::XtsContext;
use aegis_error::{AegisError, AegisResult};
use hex_literal::hex;

const DATA_KEY: [u8; 16] = [0x11; 16];
const TWEAK_KEY: [u8; 16] = [0x22; 16];
const SECTOR: u64 = 0x33_3333_3333;
const PLAINTEXT: [u8; 32] = [0x44; 32];
const CIPHERTEXT: [u8; 32] =
    hex!("c454185e6a16936e39334038acef838bfb186fff7480adc4289382ecd6d394f0");

#[derive(Default, Debug)]
pub struct AesXtsKat {}

impl AesXtsKat {
    /// This function executes the Known Answer Tests (aka KAT) for AES-XTS.
    ///
    /// Test vector source:
    /// IEEE 1619-2007 Annex B, vector 2
    ///
    /// # Returns
    ///
    /// * `AegisResult` - Result denoting the KAT outcome.
    pub fn execute(&self) -> AegisResult<()> {
        let ctx =
            XtsContext::new(&DATA_KEY, &TWEAK_KEY).map_err(|_| AegisError::KAT_AES_XTS_MISMATCH)?;
        let tweak = XtsContext::sector_tweak(SECTOR);

        let mut data = PLAINTEXT;
        ctx.encrypt_sector(&tweak, &mut data)
            .map_err(|_| AegisError::KAT_AES_XTS_MISMATCH)?;
        if data != CIPHERTEXT {
            return Err(AegisError::KAT_AES_XTS_MISMATCH);
        }

        ctx.decrypt_sector(&tweak, &mut data)
            .map_err(|_| AegisError::KAT_AES_XTS_MISMATCH)?;
        if data != PLAINTEXT {
            return Err(AegisError::KAT_AES_XTS_MISMATCH);
        }
        Ok(())
    }
}

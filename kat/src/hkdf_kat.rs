/*++

Licensed under the Apache-2.0 license.

File Name:

    hkdf_kat.rs

Abstract:

    File contains the Known Answer Tests (KAT) for HKDF-SHA256.

--*/

use aegis_drivers::{hkdf_expand, hkdf_extract};
use aegis_error::{AegisError, AegisResult};
use hex_literal::hex;
use zeroize::Zeroizing;

const IKM: [u8; 22] = [0x0b; 22];
const SALT: [u8; 13] = hex!("000102030405060708090a0b0c");
const INFO: [u8; 10] = hex!("f0f1f2f3f4f5f6f7f8f9");
const EXPECTED_PRK: [u8; 32] =
    hex!("077709362c2e32df0ddc3f0dc47bba6390b6c73bb50f9c3122ec844ad7c2b3e5");
const EXPECTED_OKM: [u8; 42] = hex!(
    "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf"
    "34007208d5b887185865"
);

#[derive(Default, Debug)]
pub struct HkdfKat {}

impl HkdfKat {
    /// This function executes the Known Answer Tests (aka KAT) for HKDF.
    ///
    /// Test vector source:
    /// RFC 5869 Appendix A.1
    ///
    /// # Returns
    ///
    /// * `AegisResult` - Result denoting the KAT outcome.
    pub fn execute(&self) -> AegisResult<()> {
        let prk = Zeroizing::new(
            hkdf_extract(&SALT, &IKM).map_err(|_| AegisError::KAT_HKDF_OUTPUT_MISMATCH)?,
        );
        if prk.as_bytes() != EXPECTED_PRK.as_slice() {
            return Err(AegisError::KAT_HKDF_OUTPUT_MISMATCH);
        }

        let mut okm = Zeroizing::new([0u8; 42]);
        hkdf_expand(prk.as_bytes(), &INFO, &mut okm[..])
            .map_err(|_| AegisError::KAT_HKDF_OUTPUT_MISMATCH)?;
        if *okm != EXPECTED_OKM {
            return Err(AegisError::KAT_HKDF_OUTPUT_MISMATCH);
        }
        Ok(())
    }
}

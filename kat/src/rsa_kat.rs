/*++

Licensed under the Apache-2.0 license.

File Name:

    rsa_kat.rs

Abstract:

    File contains the Known Answer Tests (KAT) for RSA-2048 signature verification.

--*/

use aegis_drivers::{hash_oneshot, HashAlgorithm, RsaPubKey, RsaSignatureScheme};
use aegis_error::{AegisError, AegisResult};
use hex_literal::hex;

const MODULUS: [u8; 256] = hex!(
    "c8b51520e8f11d51b9445bc90c766fd68c16ab523e985a96f6acc01e34332063"
    "df790ac356b1a972b6d0312ac26beb96cd66b99f8f4f5ec697911b1c03c64d06"
    "c2cd4413513fc32b9c82593f08b2e3b7b97d2a9e0cb590f1f3f75546d92e3cc7"
    "0bb499406cb6c8fc17877e21d0a232e04c0f72d084bf039d72d9c5db7ab963e8"
    "c3400700c53490922e9488206321cfea7c271923b8cf8c384b80367800951f6e"
    "2bcad266b170635a11e57544c6bc2a1b6e7f4a57c43de1615fed9b3e1c6383ec"
    "14f1e99de6827f893e809e16698e2de53c55c0831bde9a33b863f60570b57e4c"
    "c2a7a37f9a7b72630ec8d26b2a7c7279831dca677c45c04b37538126eb17b78d"
);

const EXPONENT: [u8; 3] = hex!("010001");

/// RSASSA-PKCS1-v1_5 signature over SHA-256("abc")
const SIGNATURE: [u8; 256] = hex!(
    "9148e7a63f5931ff42b9da9ace541b86001c6a48ed9039b0b56049bd4edb63a1"
    "f02d6202a44be3c16b4afbcff059f06279fdd57bb0e22e9971dfe53a4d1608af"
    "72e66c04f0b2af8be06c9afb914aa3c6d84b9ba1d494de3924d408b0bcb9e7de"
    "09393976cca85c5c29903de5c29773aca97c2eaeb2215cb66e6cefdad5c0b088"
    "8fd9bdcf11f710ef9dba87004417f93d3d359f27309d58d59f56ec0680a88451"
    "62724936cc7e858d2e289873d7104b35aa71fed2229d7ee12b4a50ae739c7eb9"
    "7f547d34ae9bb0854bf80d7748598a2e4bb82a35e7c47c2a3bd061b001f3317f"
    "0105061b5f61be0e06eb6a03210d5f0809326dae8fbab88b8fbe0da2bb3e6a5c"
);

#[derive(Default, Debug)]
pub struct RsaKat {}

impl RsaKat {
    /// This function executes the Known Answer Tests (aka KAT) for RSA.
    ///
    /// Test vector source:
    /// Key pair and signature generated offline with OpenSSL
    ///
    /// # Returns
    ///
    /// * `AegisResult` - Result denoting the KAT outcome.
    pub fn execute(&self) -> AegisResult<()> {
        let pub_key = RsaPubKey::from_be_bytes(&MODULUS, &EXPONENT)
            .map_err(|_| AegisError::KAT_RSA_VERIFY_FAILURE)?;
        let digest = hash_oneshot(HashAlgorithm::Sha256, b"abc")
            .map_err(|_| AegisError::KAT_RSA_VERIFY_FAILURE)?;

        pub_key
            .verify(RsaSignatureScheme::Pkcs1v15, &digest, &SIGNATURE)
            .map_err(|_| AegisError::KAT_RSA_VERIFY_FAILURE)?;

        let mut forged = SIGNATURE;
        forged[255] ^= 1;
        if pub_key
            .verify(RsaSignatureScheme::Pkcs1v15, &digest, &forged)
            .is_ok()
        {
            return Err(AegisError::KAT_RSA_VERIFY_FAILURE);
        }
        Ok(())
    }
}

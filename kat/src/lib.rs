/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the Aegis Known Answer Tests.

--*/

#![no_std]

mod aes_cbc_kat;
mod aes_gcm_kat;
mod aes_xts_kat;
mod blake2b_kat;
mod chacha20poly1305_kat;
mod ecdsa_kat;
mod hkdf_kat;
mod hmac_kat;
mod pbkdf2_kat;
mod rng_kat;
mod rsa_kat;
mod sha256_kat;
mod sha384_kat;
mod sha3_kat;
mod sha512_kat;

pub use aegis_error::{AegisError, AegisResult};
pub use aes_cbc_kat::AesCbcKat;
pub use aes_gcm_kat::AesGcmKat;
pub use aes_xts_kat::AesXtsKat;
pub use blake2b_kat::Blake2bKat;
pub use chacha20poly1305_kat::ChaCha20Poly1305Kat;
pub use ecdsa_kat::EcdsaKat;
pub use hkdf_kat::HkdfKat;
pub use hmac_kat::HmacKat;
pub use pbkdf2_kat::Pbkdf2Kat;
pub use rng_kat::RngKat;
pub use rsa_kat::RsaKat;
pub use sha256_kat::Sha256Kat;
pub use sha384_kat::Sha384Kat;
pub use sha3_kat::Sha3Kat;
pub use sha512_kat::Sha512Kat;

fn run(name: &str, kat: impl FnOnce() -> AegisResult<()>) -> AegisResult<()> {
    log::debug!("[kat] {}", name);
    kat().map_err(|err| {
        log::error!("[kat] {} failed: {}", name, err);
        err
    })
}

/// Execute every power-on known answer test
///
/// Digests run first since the MAC, KDF and signature tests depend on them.
///
/// # Returns
///
/// * `AegisResult` - First failure, if any
pub fn run_all() -> AegisResult<()> {
    run("SHA-256", || Sha256Kat::default().execute())?;
    run("SHA-384", || Sha384Kat::default().execute())?;
    run("SHA-512", || Sha512Kat::default().execute())?;
    run("SHA3-256", || Sha3Kat::default().execute())?;
    run("BLAKE2b", || Blake2bKat::default().execute())?;
    run("HMAC", || HmacKat::default().execute())?;
    run("AES-CBC", || AesCbcKat::default().execute())?;
    run("AES-GCM", || AesGcmKat::default().execute())?;
    run("AES-XTS", || AesXtsKat::default().execute())?;
    run("ChaCha20-Poly1305", || ChaCha20Poly1305Kat::default().execute())?;
    run("HKDF", || HkdfKat::default().execute())?;
    run("PBKDF2", || Pbkdf2Kat::default().execute())?;
    run("ECDSA", || EcdsaKat::default().execute())?;
    run("RSA", || RsaKat::default().execute())?;
    run("RNG", || RngKat::default().execute())?;
    log::info!("[kat] all known answer tests passed");
    Ok(())
}

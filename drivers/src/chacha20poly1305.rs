/*++

Licensed under the Apache-2.0 license.

File Name:

    chacha20poly1305.rs

Abstract:

    File contains API for ChaCha20-Poly1305 authenticated encryption (RFC 8439).

--*/

use crate::{AegisError, AegisResult};
use chacha20poly1305::aead::generic_array::GenericArray;
use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::ChaCha20Poly1305;
use zeroize::{Zeroize, Zeroizing};

pub const CHACHA20POLY1305_KEY_SIZE_BYTES: usize = 32;
pub const CHACHA20POLY1305_NONCE_SIZE_BYTES: usize = 12;
pub const CHACHA20POLY1305_TAG_SIZE_BYTES: usize = 16;

/// ChaCha20-Poly1305 key, zeroized on drop
pub struct ChaCha20Poly1305Context {
    key: Zeroizing<[u8; CHACHA20POLY1305_KEY_SIZE_BYTES]>,
}

impl ChaCha20Poly1305Context {
    pub fn new(key: &[u8]) -> AegisResult<Self> {
        let key: [u8; CHACHA20POLY1305_KEY_SIZE_BYTES] = key
            .try_into()
            .map_err(|_| AegisError::DRIVER_CHACHA20POLY1305_INVALID_KEY_SIZE)?;
        Ok(Self {
            key: Zeroizing::new(key),
        })
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(GenericArray::from_slice(&self.key[..]))
    }

    /// Encrypt and authenticate
    ///
    /// # Arguments
    ///
    /// * `nonce` - 12 byte nonce, must never repeat under the same key
    /// * `aad` - Additional authenticated data
    /// * `plaintext` - Plaintext
    /// * `output` - Ciphertext destination, at least `plaintext.len()` bytes
    ///
    /// # Returns
    ///
    /// * `[u8; 16]` - Poly1305 tag
    pub fn encrypt(
        &self,
        nonce: &[u8],
        aad: &[u8],
        plaintext: &[u8],
        output: &mut [u8],
    ) -> AegisResult<[u8; CHACHA20POLY1305_TAG_SIZE_BYTES]> {
        if nonce.len() != CHACHA20POLY1305_NONCE_SIZE_BYTES {
            return Err(AegisError::DRIVER_CHACHA20POLY1305_INVALID_NONCE_SIZE);
        }
        if output.len() < plaintext.len() {
            return Err(AegisError::DRIVER_CHACHA20POLY1305_BUFFER_TOO_SMALL);
        }
        let buf = &mut output[..plaintext.len()];
        buf.copy_from_slice(plaintext);
        match self
            .cipher()
            .encrypt_in_place_detached(GenericArray::from_slice(nonce), aad, buf)
        {
            Ok(tag) => Ok(tag.into()),
            Err(_) => {
                buf.zeroize();
                Err(AegisError::DRIVER_CHACHA20POLY1305_ENCRYPT_FAILED)
            }
        }
    }

    /// Verify and decrypt. The output is zeroized when the tag does not match.
    ///
    /// # Arguments
    ///
    /// * `nonce` - 12 byte nonce
    /// * `aad` - Additional authenticated data
    /// * `ciphertext` - Ciphertext
    /// * `tag` - 16 byte Poly1305 tag
    /// * `output` - Plaintext destination, at least `ciphertext.len()` bytes
    pub fn decrypt(
        &self,
        nonce: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
        output: &mut [u8],
    ) -> AegisResult<()> {
        if nonce.len() != CHACHA20POLY1305_NONCE_SIZE_BYTES {
            return Err(AegisError::DRIVER_CHACHA20POLY1305_INVALID_NONCE_SIZE);
        }
        if tag.len() != CHACHA20POLY1305_TAG_SIZE_BYTES {
            return Err(AegisError::DRIVER_CHACHA20POLY1305_INVALID_TAG_SIZE);
        }
        if output.len() < ciphertext.len() {
            return Err(AegisError::DRIVER_CHACHA20POLY1305_BUFFER_TOO_SMALL);
        }
        let buf = &mut output[..ciphertext.len()];
        buf.copy_from_slice(ciphertext);
        let result = self.cipher().decrypt_in_place_detached(
            GenericArray::from_slice(nonce),
            aad,
            buf,
            GenericArray::from_slice(tag),
        );
        if result.is_err() {
            buf.zeroize();
            log::warn!("[chacha20poly1305] tag mismatch");
            return Err(AegisError::DRIVER_CHACHA20POLY1305_TAG_MISMATCH);
        }
        Ok(())
    }
}

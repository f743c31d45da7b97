/*++

Licensed under the Apache-2.0 license.

File Name:

    aes_gcm.rs

Abstract:

    File contains API for AES-GCM authenticated encryption with a 96-bit IV
    and a detached 128-bit tag.

--*/

use crate::aes::AesContext;
use crate::{AegisError, AegisResult};
use aes_gcm::aead::consts::U12;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::AeadInPlace;
use aes_gcm::AesGcm;
use zeroize::Zeroize;

pub const AES_GCM_IV_SIZE_BYTES: usize = 12;
pub const AES_GCM_TAG_SIZE_BYTES: usize = 16;

fn check_args(iv: &[u8], input: &[u8], output: &[u8]) -> AegisResult<()> {
    if iv.len() != AES_GCM_IV_SIZE_BYTES {
        return Err(AegisError::DRIVER_AES_INVALID_IV_SIZE);
    }
    if output.len() < input.len() {
        return Err(AegisError::DRIVER_AES_BUFFER_TOO_SMALL);
    }
    Ok(())
}

/// Encrypt and authenticate
///
/// # Arguments
///
/// * `ctx` - Expanded AES-128 or AES-256 key
/// * `iv` - 12 byte IV, must never repeat under the same key
/// * `aad` - Additional authenticated data
/// * `plaintext` - Plaintext
/// * `output` - Ciphertext destination, at least `plaintext.len()` bytes
///
/// # Returns
///
/// * `[u8; 16]` - Authentication tag
pub fn aes_gcm_encrypt(
    ctx: &AesContext,
    iv: &[u8],
    aad: &[u8],
    plaintext: &[u8],
    output: &mut [u8],
) -> AegisResult<[u8; AES_GCM_TAG_SIZE_BYTES]> {
    check_args(iv, plaintext, output)?;
    let nonce = GenericArray::<u8, U12>::from_slice(iv);
    let buf = &mut output[..plaintext.len()];
    buf.copy_from_slice(plaintext);

    let result = match ctx {
        AesContext::Aes128(c) => {
            AesGcm::<aes::Aes128, U12>::from(c.clone()).encrypt_in_place_detached(nonce, aad, buf)
        }
        AesContext::Aes256(c) => {
            AesGcm::<aes::Aes256, U12>::from(c.clone()).encrypt_in_place_detached(nonce, aad, buf)
        }
    };
    match result {
        Ok(tag) => Ok(tag.into()),
        Err(_) => {
            buf.zeroize();
            Err(AegisError::DRIVER_AES_GCM_ENCRYPT_FAILED)
        }
    }
}

/// Verify and decrypt
///
/// The tag is checked before any plaintext is released. On mismatch the
/// output buffer is zeroized.
///
/// # Arguments
///
/// * `ctx` - Expanded AES-128 or AES-256 key
/// * `iv` - 12 byte IV
/// * `aad` - Additional authenticated data
/// * `ciphertext` - Ciphertext
/// * `tag` - 16 byte authentication tag
/// * `output` - Plaintext destination, at least `ciphertext.len()` bytes
pub fn aes_gcm_decrypt(
    ctx: &AesContext,
    iv: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
    output: &mut [u8],
) -> AegisResult<()> {
    check_args(iv, ciphertext, output)?;
    if tag.len() != AES_GCM_TAG_SIZE_BYTES {
        return Err(AegisError::DRIVER_AES_INVALID_TAG_SIZE);
    }
    let nonce = GenericArray::<u8, U12>::from_slice(iv);
    let tag = GenericArray::from_slice(tag);
    let buf = &mut output[..ciphertext.len()];
    buf.copy_from_slice(ciphertext);

    let result = match ctx {
        AesContext::Aes128(c) => AesGcm::<aes::Aes128, U12>::from(c.clone())
            .decrypt_in_place_detached(nonce, aad, buf, tag),
        AesContext::Aes256(c) => AesGcm::<aes::Aes256, U12>::from(c.clone())
            .decrypt_in_place_detached(nonce, aad, buf, tag),
    };
    if result.is_err() {
        buf.zeroize();
        log::warn!("[aes-gcm] tag mismatch");
        return Err(AegisError::DRIVER_AES_GCM_TAG_MISMATCH);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use proptest::prelude::*;

    const KEY_256: [u8; 32] =
        hex!("f0eaf7b41b42f4500635bc05d9cede11a5363d59a6288870f527bcffeb4d6e04");
    const IV_256: [u8; 12] = hex!("18f316781077a595c72d4c07");
    const AAD_256: [u8; 16] = hex!("42cade3a19204b7d4843628c425c2375");
    const PT_256: [u8; 32] =
        hex!("400fb5ef32083b3abea957c4f068abad50c8d86bbf9351fa72e7da5171df38f9");
    const CT_256: [u8; 32] =
        hex!("7a1b61009dce6b7cd4d1ea0203b179f1219dd5ce7407e12ea0a4c56c71bb791b");
    const TAG_256: [u8; 16] = hex!("4419180b0b963b7289a4fa3f45c535a3");

    #[test]
    fn test_gcm_256_vector() {
        let ctx = AesContext::new(&KEY_256).unwrap();
        let mut ct = [0u8; 32];
        let tag = aes_gcm_encrypt(&ctx, &IV_256, &AAD_256, &PT_256, &mut ct).unwrap();
        assert_eq!(ct, CT_256);
        assert_eq!(tag, TAG_256);

        let mut pt = [0u8; 32];
        aes_gcm_decrypt(&ctx, &IV_256, &AAD_256, &CT_256, &TAG_256, &mut pt).unwrap();
        assert_eq!(pt, PT_256);
    }

    #[test]
    fn test_gcm_128_vector() {
        let key: Vec<u8> = (0..16).collect();
        let iv: Vec<u8> = (0..12).collect();
        let ctx = AesContext::new(&key).unwrap();
        let mut ct = [0u8; 13];
        let tag = aes_gcm_encrypt(&ctx, &iv, b"hdr", b"measured boot", &mut ct).unwrap();
        assert_eq!(ct, hex!("fe09c6bd136992306bb00ee542"));
        assert_eq!(tag, hex!("39402bf19a7208c6455482dcb9e8b9d3"));
    }

    #[test]
    fn test_gcm_tampered_aad() {
        let ctx = AesContext::new(&KEY_256).unwrap();
        let mut pt = [0xffu8; 32];
        let mut aad = AAD_256;
        aad[0] ^= 0x80;
        assert_eq!(
            aes_gcm_decrypt(&ctx, &IV_256, &aad, &CT_256, &TAG_256, &mut pt),
            Err(AegisError::DRIVER_AES_GCM_TAG_MISMATCH)
        );
        assert_eq!(pt, [0u8; 32]);
    }

    #[test]
    fn test_gcm_arg_errors() {
        let ctx = AesContext::new(&KEY_256).unwrap();
        let mut out = [0u8; 32];
        assert_eq!(
            aes_gcm_encrypt(&ctx, &[0u8; 16], &[], &PT_256, &mut out),
            Err(AegisError::DRIVER_AES_INVALID_IV_SIZE)
        );
        assert_eq!(
            aes_gcm_encrypt(&ctx, &IV_256, &[], &PT_256, &mut out[..8]),
            Err(AegisError::DRIVER_AES_BUFFER_TOO_SMALL)
        );
        assert_eq!(
            aes_gcm_decrypt(&ctx, &IV_256, &AAD_256, &CT_256, &TAG_256[..12], &mut out),
            Err(AegisError::DRIVER_AES_INVALID_TAG_SIZE)
        );
    }

    proptest! {
        #[test]
        fn test_gcm_single_bit_flip(bit in 0usize..(48 * 8)) {
            let ctx = AesContext::new(&KEY_256).unwrap();
            let mut ct = CT_256;
            let mut tag = TAG_256;
            if bit < 256 {
                ct[bit / 8] ^= 1 << (bit % 8);
            } else {
                let b = bit - 256;
                tag[b / 8] ^= 1 << (b % 8);
            }
            let mut pt = [0u8; 32];
            let err = aes_gcm_decrypt(&ctx, &IV_256, &AAD_256, &ct, &tag, &mut pt).unwrap_err();
            prop_assert_eq!(err, AegisError::DRIVER_AES_GCM_TAG_MISMATCH);
            prop_assert_eq!(err.kind(), crate::ErrorKind::VerificationFailed);
            prop_assert_eq!(pt, [0u8; 32]);
        }

        #[test]
        fn test_gcm_random_roundtrip_and_flip(
            key in prop_oneof![
                prop::collection::vec(any::<u8>(), 16),
                prop::collection::vec(any::<u8>(), 32),
            ],
            iv in any::<[u8; 12]>(),
            aad in prop::collection::vec(any::<u8>(), 0..64),
            pt in prop::collection::vec(any::<u8>(), 0..256),
            flip in any::<prop::sample::Index>(),
        ) {
            let ctx = AesContext::new(&key).unwrap();
            let mut ct = vec![0u8; pt.len()];
            let mut tag = aes_gcm_encrypt(&ctx, &iv, &aad, &pt, &mut ct).unwrap();

            let mut out = vec![0xAAu8; ct.len()];
            aes_gcm_decrypt(&ctx, &iv, &aad, &ct, &tag, &mut out).unwrap();
            prop_assert_eq!(&out, &pt);

            let bit = flip.index((ct.len() + AES_GCM_TAG_SIZE_BYTES) * 8);
            if bit < ct.len() * 8 {
                ct[bit / 8] ^= 1 << (bit % 8);
            } else {
                let b = bit - ct.len() * 8;
                tag[b / 8] ^= 1 << (b % 8);
            }
            let mut out = vec![0xAAu8; ct.len()];
            let err = aes_gcm_decrypt(&ctx, &iv, &aad, &ct, &tag, &mut out).unwrap_err();
            prop_assert_eq!(err, AegisError::DRIVER_AES_GCM_TAG_MISMATCH);
            prop_assert_eq!(err.kind(), crate::ErrorKind::VerificationFailed);
            prop_assert!(out.iter().all(|&b| b == 0));
        }
    }
}

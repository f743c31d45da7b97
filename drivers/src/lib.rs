/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the Aegis crypto driver library: digest,
    symmetric, asymmetric and randomness engines.

--*/

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod aes;
pub mod aes_gcm;
pub mod chacha20poly1305;
pub mod csrng;
pub mod ct;
pub mod digest;
pub mod ecdsa;
pub mod hmac;
pub mod kdf;
pub mod key_material;
pub mod printer;
pub mod rsa;

pub use aegis_error::{AegisError, AegisResult, ErrorKind};
pub use crate::aes::{aes_cbc_decrypt, aes_cbc_encrypt, AesContext, XtsContext};
pub use crate::aes_gcm::{aes_gcm_decrypt, aes_gcm_encrypt};
pub use crate::chacha20poly1305::ChaCha20Poly1305Context;
#[cfg(feature = "std")]
pub use csrng::OsEntropy;
pub use csrng::{Csrng, DrbgStream, EntropySource};
pub use digest::{
    hash_oneshot, pcr_extend_value, Digest, DigestContext, DigestOp, HashAlgorithm,
    MAX_DIGEST_SIZE,
};
pub use ecdsa::{EcdsaCurve, EcdsaPrivKey, EcdsaPubKey, EcdsaSignature};
pub use hmac::{hmac, hmac_verify, HmacContext};
pub use kdf::{hkdf_expand, hkdf_extract, hkdf_sha256, pbkdf2_hmac_sha256, scrypt, ScryptParams};
pub use key_material::KeyMaterial;
pub use printer::HexBytes;
pub use crate::rsa::{RsaKeySize, RsaPrivKey, RsaPubKey, RsaSignatureScheme};

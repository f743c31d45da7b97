/*++

Licensed under the Apache-2.0 license.

File Name:

    key_material.rs

Abstract:

    Tagged union of the key types handled by the crypto engines.

--*/

use crate::aes::AesContext;
use crate::chacha20poly1305::ChaCha20Poly1305Context;
use crate::ecdsa::{EcdsaPrivKey, EcdsaPubKey};
use crate::rsa::{RsaPrivKey, RsaPubKey};
use crate::{AegisError, AegisResult};

/// Key material held by a caller. Secret variants zeroize on drop.
pub enum KeyMaterial {
    RsaPublic(RsaPubKey),
    RsaPrivate(RsaPrivKey),
    EcdsaPublic(EcdsaPubKey),
    EcdsaPrivate(EcdsaPrivKey),
    Aes(AesContext),
    ChaCha20Poly1305(ChaCha20Poly1305Context),
}

impl KeyMaterial {
    pub fn is_secret(&self) -> bool {
        !matches!(self, KeyMaterial::RsaPublic(_) | KeyMaterial::EcdsaPublic(_))
    }

    pub fn as_rsa_public(&self) -> AegisResult<RsaPubKey> {
        match self {
            KeyMaterial::RsaPublic(k) => Ok(k.clone()),
            KeyMaterial::RsaPrivate(k) => Ok(k.public_key()),
            _ => Err(AegisError::KEY_MATERIAL_WRONG_TYPE),
        }
    }

    pub fn as_rsa_private(&self) -> AegisResult<&RsaPrivKey> {
        match self {
            KeyMaterial::RsaPrivate(k) => Ok(k),
            _ => Err(AegisError::KEY_MATERIAL_WRONG_TYPE),
        }
    }

    pub fn as_ecdsa_public(&self) -> AegisResult<EcdsaPubKey> {
        match self {
            KeyMaterial::EcdsaPublic(k) => Ok(k.clone()),
            KeyMaterial::EcdsaPrivate(k) => Ok(k.public_key()),
            _ => Err(AegisError::KEY_MATERIAL_WRONG_TYPE),
        }
    }

    pub fn as_ecdsa_private(&self) -> AegisResult<&EcdsaPrivKey> {
        match self {
            KeyMaterial::EcdsaPrivate(k) => Ok(k),
            _ => Err(AegisError::KEY_MATERIAL_WRONG_TYPE),
        }
    }

    pub fn as_aes(&self) -> AegisResult<&AesContext> {
        match self {
            KeyMaterial::Aes(k) => Ok(k),
            _ => Err(AegisError::KEY_MATERIAL_WRONG_TYPE),
        }
    }

    pub fn as_chacha20poly1305(&self) -> AegisResult<&ChaCha20Poly1305Context> {
        match self {
            KeyMaterial::ChaCha20Poly1305(k) => Ok(k),
            _ => Err(AegisError::KEY_MATERIAL_WRONG_TYPE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecdsa::EcdsaCurve;

    #[test]
    fn test_accessors() {
        let key = EcdsaPrivKey::from_bytes(EcdsaCurve::P256, &[0x11; 32]).unwrap();
        let public = key.public_key();
        let km = KeyMaterial::EcdsaPrivate(key);
        assert!(km.is_secret());
        assert_eq!(km.as_ecdsa_public().unwrap(), public);
        assert!(km.as_ecdsa_private().is_ok());
        assert_eq!(km.as_aes().err(), Some(AegisError::KEY_MATERIAL_WRONG_TYPE));

        let km = KeyMaterial::EcdsaPublic(public);
        assert!(!km.is_secret());
        assert_eq!(
            km.as_ecdsa_private().err(),
            Some(AegisError::KEY_MATERIAL_WRONG_TYPE)
        );

        let km = KeyMaterial::Aes(AesContext::new(&[0u8; 16]).unwrap());
        assert_eq!(km.as_aes().map(|k| k.key_bits()), Ok(128));
        assert!(km.as_rsa_public().is_err());
    }
}

/*++

Licensed under the Apache-2.0 license.

File Name:

    rsa.rs

Abstract:

    File contains API for RSA-2048/4096 signatures (PKCS#1 v1.5 and PSS over a
    precomputed digest) and RSA-OAEP-SHA256 encryption.

--*/

use crate::digest::{Digest, HashAlgorithm};
use crate::{AegisError, AegisResult};
use alloc::vec;
use alloc::vec::Vec;
use rand_core::CryptoRngCore;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, Oaep, Pkcs1v15Sign, Pss};
use sha2::{Sha256, Sha384, Sha512};

/// Supported modulus sizes
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RsaKeySize {
    Rsa2048,
    Rsa4096,
}

impl RsaKeySize {
    pub fn bits(&self) -> usize {
        match self {
            RsaKeySize::Rsa2048 => 2048,
            RsaKeySize::Rsa4096 => 4096,
        }
    }

    pub fn bytes(&self) -> usize {
        self.bits() / 8
    }

    fn from_modulus_bytes(len: usize) -> AegisResult<Self> {
        match len {
            256 => Ok(RsaKeySize::Rsa2048),
            512 => Ok(RsaKeySize::Rsa4096),
            _ => Err(AegisError::DRIVER_RSA_UNSUPPORTED_KEY_SIZE),
        }
    }
}

/// RSA signature encodings
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RsaSignatureScheme {
    Pkcs1v15,
    Pss,
}

/// RSA public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPubKey {
    key: rsa::RsaPublicKey,
    size: RsaKeySize,
}

impl RsaPubKey {
    /// Create a public key from a big-endian modulus and exponent
    ///
    /// # Arguments
    ///
    /// * `n` - Modulus, 256 or 512 bytes once leading zeros are removed
    /// * `e` - Public exponent
    pub fn from_be_bytes(n: &[u8], e: &[u8]) -> AegisResult<Self> {
        let n = BigUint::from_bytes_be(n);
        let size = RsaKeySize::from_modulus_bytes(n.bits().div_ceil(8))?;
        let key = rsa::RsaPublicKey::new(n, BigUint::from_bytes_be(e))
            .map_err(|_| AegisError::DRIVER_RSA_INVALID_KEY)?;
        Ok(Self { key, size })
    }

    pub fn key_size(&self) -> RsaKeySize {
        self.size
    }

    /// Big-endian modulus, left padded to the key size
    pub fn modulus(&self) -> Vec<u8> {
        let raw = self.key.n().to_bytes_be();
        let mut out = vec![0u8; self.size.bytes() - raw.len()];
        out.extend_from_slice(&raw);
        out
    }

    pub fn exponent(&self) -> Vec<u8> {
        self.key.e().to_bytes_be()
    }

    /// Verify a signature over a precomputed digest
    ///
    /// # Arguments
    ///
    /// * `scheme` - Signature encoding
    /// * `digest` - SHA-256, SHA-384 or SHA-512 digest of the message
    /// * `signature` - Signature, exactly the modulus length
    pub fn verify(
        &self,
        scheme: RsaSignatureScheme,
        digest: &Digest,
        signature: &[u8],
    ) -> AegisResult<()> {
        if signature.len() != self.size.bytes() {
            return Err(AegisError::DRIVER_RSA_VERIFY_FAILED);
        }
        let result = match scheme {
            RsaSignatureScheme::Pkcs1v15 => {
                self.key
                    .verify(pkcs1v15_padding(digest)?, digest.as_bytes(), signature)
            }
            RsaSignatureScheme::Pss => {
                self.key
                    .verify(pss_padding(digest)?, digest.as_bytes(), signature)
            }
        };
        result.map_err(|_| AegisError::DRIVER_RSA_VERIFY_FAILED)
    }

    /// Encrypt with RSA-OAEP, SHA-256 for both the label hash and MGF1
    pub fn oaep_encrypt<R: CryptoRngCore>(&self, rng: &mut R, msg: &[u8]) -> AegisResult<Vec<u8>> {
        self.key
            .encrypt(rng, Oaep::new::<Sha256>(), msg)
            .map_err(|_| AegisError::DRIVER_RSA_ENCRYPT_FAILED)
    }
}

/// RSA private key. The key material is zeroized on drop.
#[derive(Clone)]
pub struct RsaPrivKey {
    key: rsa::RsaPrivateKey,
    size: RsaKeySize,
}

impl RsaPrivKey {
    /// Generate a fresh key pair with public exponent 65537
    pub fn generate<R: CryptoRngCore>(rng: &mut R, size: RsaKeySize) -> AegisResult<Self> {
        let key = rsa::RsaPrivateKey::new(rng, size.bits())
            .map_err(|_| AegisError::DRIVER_RSA_KEYGEN_FAILED)?;
        Ok(Self { key, size })
    }

    /// Create a private key from big-endian components
    ///
    /// # Arguments
    ///
    /// * `n` - Modulus
    /// * `e` - Public exponent
    /// * `d` - Private exponent
    /// * `p` - First prime
    /// * `q` - Second prime
    pub fn from_components(n: &[u8], e: &[u8], d: &[u8], p: &[u8], q: &[u8]) -> AegisResult<Self> {
        let n = BigUint::from_bytes_be(n);
        let size = RsaKeySize::from_modulus_bytes(n.bits().div_ceil(8))?;
        let key = rsa::RsaPrivateKey::from_components(
            n,
            BigUint::from_bytes_be(e),
            BigUint::from_bytes_be(d),
            vec![BigUint::from_bytes_be(p), BigUint::from_bytes_be(q)],
        )
        .map_err(|_| AegisError::DRIVER_RSA_INVALID_KEY)?;
        key.validate()
            .map_err(|_| AegisError::DRIVER_RSA_INVALID_KEY)?;
        Ok(Self { key, size })
    }

    pub fn key_size(&self) -> RsaKeySize {
        self.size
    }

    pub fn public_key(&self) -> RsaPubKey {
        RsaPubKey {
            key: self.key.to_public_key(),
            size: self.size,
        }
    }

    /// Sign a precomputed digest
    ///
    /// PKCS#1 v1.5 is deterministic. PSS draws a salt of the digest length
    /// from `rng`.
    pub fn sign<R: CryptoRngCore>(
        &self,
        rng: &mut R,
        scheme: RsaSignatureScheme,
        digest: &Digest,
    ) -> AegisResult<Vec<u8>> {
        let result = match scheme {
            RsaSignatureScheme::Pkcs1v15 => self
                .key
                .sign(pkcs1v15_padding(digest)?, digest.as_bytes()),
            RsaSignatureScheme::Pss => {
                self.key
                    .sign_with_rng(rng, pss_padding(digest)?, digest.as_bytes())
            }
        };
        result.map_err(|_| AegisError::DRIVER_RSA_SIGN_FAILED)
    }

    /// Decrypt an RSA-OAEP-SHA256 ciphertext
    pub fn oaep_decrypt(&self, ciphertext: &[u8]) -> AegisResult<Vec<u8>> {
        self.key
            .decrypt(Oaep::new::<Sha256>(), ciphertext)
            .map_err(|_| AegisError::DRIVER_RSA_DECRYPT_FAILED)
    }
}

fn pkcs1v15_padding(digest: &Digest) -> AegisResult<Pkcs1v15Sign> {
    match digest.algorithm() {
        HashAlgorithm::Sha256 => Ok(Pkcs1v15Sign::new::<Sha256>()),
        HashAlgorithm::Sha384 => Ok(Pkcs1v15Sign::new::<Sha384>()),
        HashAlgorithm::Sha512 => Ok(Pkcs1v15Sign::new::<Sha512>()),
        _ => Err(AegisError::DRIVER_RSA_UNSUPPORTED_HASH),
    }
}

fn pss_padding(digest: &Digest) -> AegisResult<Pss> {
    match digest.algorithm() {
        HashAlgorithm::Sha256 => Ok(Pss::new::<Sha256>()),
        HashAlgorithm::Sha384 => Ok(Pss::new::<Sha384>()),
        HashAlgorithm::Sha512 => Ok(Pss::new::<Sha512>()),
        _ => Err(AegisError::DRIVER_RSA_UNSUPPORTED_HASH),
    }
}

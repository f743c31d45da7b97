/*++

Licensed under the Apache-2.0 license.

File Name:

    ecdsa.rs

Abstract:

    File contains API for ECDSA signing and verification over the NIST P-256,
    P-384 and P-521 curves. Signatures are computed over a caller supplied
    digest with deterministic nonces (RFC 6979).

--*/

use crate::printer::HexBytes;
use crate::{AegisError, AegisResult};
use alloc::vec::Vec;
use core::fmt;
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use rand_core::CryptoRngCore;
use zeroize::Zeroizing;

const MAX_SCALAR_SIZE_BYTES: usize = 66;

const P256_ORDER: [u8; 32] = [
    0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xbc, 0xe6, 0xfa, 0xad, 0xa7, 0x17, 0x9e, 0x84, 0xf3, 0xb9, 0xca, 0xc2, 0xfc, 0x63, 0x25, 0x51,
];

const P384_ORDER: [u8; 48] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xc7, 0x63, 0x4d, 0x81, 0xf4, 0x37, 0x2d, 0xdf,
    0x58, 0x1a, 0x0d, 0xb2, 0x48, 0xb0, 0xa7, 0x7a, 0xec, 0xec, 0x19, 0x6a, 0xcc, 0xc5, 0x29, 0x73,
];

const P521_ORDER: [u8; 66] = [
    0x01, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xfa, 0x51, 0x86, 0x87, 0x83, 0xbf, 0x2f, 0x96, 0x6b, 0x7f, 0xcc, 0x01, 0x48, 0xf7, 0x09,
    0xa5, 0xd0, 0x3b, 0xb5, 0xc9, 0xb8, 0x89, 0x9c, 0x47, 0xae, 0xbb, 0x6f, 0xb7, 0x1e, 0x91, 0x38,
    0x64, 0x09,
];

/// Supported curves
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum EcdsaCurve {
    P256,
    P384,
    P521,
}

impl EcdsaCurve {
    /// Size of a scalar or field element in bytes
    pub fn scalar_len(&self) -> usize {
        match self {
            EcdsaCurve::P256 => 32,
            EcdsaCurve::P384 => 48,
            EcdsaCurve::P521 => 66,
        }
    }

    /// Big-endian group order
    pub fn order(&self) -> &'static [u8] {
        match self {
            EcdsaCurve::P256 => &P256_ORDER,
            EcdsaCurve::P384 => &P384_ORDER,
            EcdsaCurve::P521 => &P521_ORDER,
        }
    }

    // The prehash is truncated or padded to the field size, but must carry at
    // least half of it.
    fn check_prehash(&self, digest: &[u8]) -> AegisResult<()> {
        if digest.len() < self.scalar_len() / 2 || digest.len() > 64 {
            return Err(AegisError::DRIVER_ECDSA_INVALID_HASH_LEN);
        }
        Ok(())
    }
}

/// Fixed-size signature, `r || s` each left padded to the scalar size
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct EcdsaSignature {
    curve: EcdsaCurve,
    bytes: [u8; 2 * MAX_SCALAR_SIZE_BYTES],
}

impl EcdsaSignature {
    /// Parse a raw `r || s` signature
    pub fn from_raw(curve: EcdsaCurve, raw: &[u8]) -> AegisResult<Self> {
        let len = curve.scalar_len();
        if raw.len() != 2 * len {
            return Err(AegisError::DRIVER_ECDSA_INVALID_SIGNATURE_SIZE);
        }
        let mut bytes = [0u8; 2 * MAX_SCALAR_SIZE_BYTES];
        bytes[..2 * len].copy_from_slice(raw);
        Ok(Self { curve, bytes })
    }

    /// Build a signature from big-endian integers of any width, as found in
    /// DER encodings
    pub fn from_scalars(curve: EcdsaCurve, r: &[u8], s: &[u8]) -> AegisResult<Self> {
        let len = curve.scalar_len();
        let mut bytes = [0u8; 2 * MAX_SCALAR_SIZE_BYTES];
        for (src, dst) in [(r, 0), (s, len)] {
            let first = src.iter().position(|&b| b != 0).unwrap_or(src.len());
            let trimmed = &src[first..];
            if trimmed.len() > len {
                return Err(AegisError::DRIVER_ECDSA_SIGNATURE_OUT_OF_RANGE);
            }
            let start = dst + len - trimmed.len();
            bytes[start..dst + len].copy_from_slice(trimmed);
        }
        Ok(Self { curve, bytes })
    }

    pub fn curve(&self) -> EcdsaCurve {
        self.curve
    }

    pub fn r(&self) -> &[u8] {
        &self.bytes[..self.curve.scalar_len()]
    }

    pub fn s(&self) -> &[u8] {
        let len = self.curve.scalar_len();
        &self.bytes[len..2 * len]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..2 * self.curve.scalar_len()]
    }

    /// Both scalars must lie in `[1, n - 1]`
    pub fn check_range(&self) -> AegisResult<()> {
        let order = self.curve.order();
        for v in [self.r(), self.s()] {
            if v.iter().all(|&b| b == 0) || v >= order {
                return Err(AegisError::DRIVER_ECDSA_SIGNATURE_OUT_OF_RANGE);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for EcdsaSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcdsaSignature")
            .field("curve", &self.curve)
            .field("r", &HexBytes(self.r()))
            .field("s", &HexBytes(self.s()))
            .finish()
    }
}

/// ECDSA public key
#[derive(Clone)]
pub enum EcdsaPubKey {
    P256(p256::ecdsa::VerifyingKey),
    P384(p384::ecdsa::VerifyingKey),
    P521(p521::ecdsa::VerifyingKey),
}

impl EcdsaPubKey {
    /// Parse a SEC1 encoded point, compressed or uncompressed
    pub fn from_sec1(curve: EcdsaCurve, bytes: &[u8]) -> AegisResult<Self> {
        let key = match curve {
            EcdsaCurve::P256 => p256::ecdsa::VerifyingKey::from_sec1_bytes(bytes).map(Self::P256),
            EcdsaCurve::P384 => p384::ecdsa::VerifyingKey::from_sec1_bytes(bytes).map(Self::P384),
            EcdsaCurve::P521 => p521::ecdsa::VerifyingKey::from_sec1_bytes(bytes).map(Self::P521),
        };
        key.map_err(|_| AegisError::DRIVER_ECDSA_INVALID_PUBLIC_KEY)
    }

    pub fn curve(&self) -> EcdsaCurve {
        match self {
            EcdsaPubKey::P256(_) => EcdsaCurve::P256,
            EcdsaPubKey::P384(_) => EcdsaCurve::P384,
            EcdsaPubKey::P521(_) => EcdsaCurve::P521,
        }
    }

    /// SEC1 encoding of the point
    pub fn to_sec1(&self, compress: bool) -> Vec<u8> {
        match self {
            EcdsaPubKey::P256(k) => k.to_encoded_point(compress).as_bytes().to_vec(),
            EcdsaPubKey::P384(k) => k.to_encoded_point(compress).as_bytes().to_vec(),
            EcdsaPubKey::P521(k) => k.to_encoded_point(compress).as_bytes().to_vec(),
        }
    }

    /// Verify a signature over a precomputed digest
    ///
    /// # Arguments
    ///
    /// * `digest` - Message digest
    /// * `signature` - Signature on the same curve as the key
    pub fn verify(&self, digest: &[u8], signature: &EcdsaSignature) -> AegisResult<()> {
        let curve = self.curve();
        if signature.curve() != curve {
            return Err(AegisError::DRIVER_ECDSA_VERIFY_FAILED);
        }
        curve.check_prehash(digest)?;
        signature.check_range()?;

        let raw = signature.as_bytes();
        let result = match self {
            EcdsaPubKey::P256(k) => p256::ecdsa::Signature::from_slice(raw)
                .and_then(|sig| k.verify_prehash(digest, &sig)),
            EcdsaPubKey::P384(k) => p384::ecdsa::Signature::from_slice(raw)
                .and_then(|sig| k.verify_prehash(digest, &sig)),
            EcdsaPubKey::P521(k) => p521::ecdsa::Signature::from_slice(raw)
                .and_then(|sig| k.verify_prehash(digest, &sig)),
        };
        result.map_err(|_| AegisError::DRIVER_ECDSA_VERIFY_FAILED)
    }
}

impl PartialEq for EcdsaPubKey {
    fn eq(&self, other: &Self) -> bool {
        self.curve() == other.curve() && self.to_sec1(false) == other.to_sec1(false)
    }
}

impl Eq for EcdsaPubKey {}

impl fmt::Debug for EcdsaPubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcdsaPubKey")
            .field("curve", &self.curve())
            .field("point", &HexBytes(&self.to_sec1(true)))
            .finish()
    }
}

/// ECDSA private key. The scalar is zeroized on drop.
#[derive(Clone)]
pub enum EcdsaPrivKey {
    P256(p256::ecdsa::SigningKey),
    P384(p384::ecdsa::SigningKey),
    P521(p521::ecdsa::SigningKey),
}

impl EcdsaPrivKey {
    /// Generate a key pair
    pub fn generate<R: CryptoRngCore>(curve: EcdsaCurve, rng: &mut R) -> Self {
        match curve {
            EcdsaCurve::P256 => Self::P256(p256::ecdsa::SigningKey::random(rng)),
            EcdsaCurve::P384 => Self::P384(p384::ecdsa::SigningKey::random(rng)),
            EcdsaCurve::P521 => Self::P521(p521::ecdsa::SigningKey::random(rng)),
        }
    }

    /// Import a big-endian scalar of exactly the curve's scalar size
    pub fn from_bytes(curve: EcdsaCurve, scalar: &[u8]) -> AegisResult<Self> {
        if scalar.len() != curve.scalar_len() {
            return Err(AegisError::DRIVER_ECDSA_INVALID_PRIVATE_KEY);
        }
        let key = match curve {
            EcdsaCurve::P256 => p256::ecdsa::SigningKey::from_slice(scalar).map(Self::P256),
            EcdsaCurve::P384 => p384::ecdsa::SigningKey::from_slice(scalar).map(Self::P384),
            EcdsaCurve::P521 => p521::ecdsa::SigningKey::from_slice(scalar).map(Self::P521),
        };
        key.map_err(|_| AegisError::DRIVER_ECDSA_INVALID_PRIVATE_KEY)
    }

    pub fn curve(&self) -> EcdsaCurve {
        match self {
            EcdsaPrivKey::P256(_) => EcdsaCurve::P256,
            EcdsaPrivKey::P384(_) => EcdsaCurve::P384,
            EcdsaPrivKey::P521(_) => EcdsaCurve::P521,
        }
    }

    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(match self {
            EcdsaPrivKey::P256(k) => k.to_bytes().to_vec(),
            EcdsaPrivKey::P384(k) => k.to_bytes().to_vec(),
            EcdsaPrivKey::P521(k) => k.to_bytes().to_vec(),
        })
    }

    pub fn public_key(&self) -> EcdsaPubKey {
        match self {
            EcdsaPrivKey::P256(k) => EcdsaPubKey::P256(p256::ecdsa::VerifyingKey::from(k)),
            EcdsaPrivKey::P384(k) => EcdsaPubKey::P384(p384::ecdsa::VerifyingKey::from(k)),
            EcdsaPrivKey::P521(k) => EcdsaPubKey::P521(p521::ecdsa::VerifyingKey::from(k)),
        }
    }

    /// Sign a precomputed digest
    ///
    /// # Arguments
    ///
    /// * `digest` - Message digest, at least half the scalar size
    pub fn sign(&self, digest: &[u8]) -> AegisResult<EcdsaSignature> {
        let curve = self.curve();
        curve.check_prehash(digest)?;
        let sig = match self {
            EcdsaPrivKey::P256(k) => PrehashSigner::<p256::ecdsa::Signature>::sign_prehash(k, digest)
                .map(|s| s.to_bytes().to_vec()),
            EcdsaPrivKey::P384(k) => PrehashSigner::<p384::ecdsa::Signature>::sign_prehash(k, digest)
                .map(|s| s.to_bytes().to_vec()),
            EcdsaPrivKey::P521(k) => PrehashSigner::<p521::ecdsa::Signature>::sign_prehash(k, digest)
                .map(|s| s.to_bytes().to_vec()),
        }
        .map_err(|_| AegisError::DRIVER_ECDSA_SIGN_FAILED)?;
        EcdsaSignature::from_raw(curve, &sig)
    }
}

impl fmt::Debug for EcdsaPrivKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcdsaPrivKey")
            .field("curve", &self.curve())
            .finish_non_exhaustive()
    }
}

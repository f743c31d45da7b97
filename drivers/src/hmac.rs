/*++

Licensed under the Apache-2.0 license.

File Name:

    hmac.rs

Abstract:

    File contains API for HMAC-SHA256, HMAC-SHA384 and HMAC-SHA512
    operations built from two nested digest contexts (RFC 2104).

--*/

use crate::digest::{hash_oneshot, Digest, DigestContext, DigestOp, HashAlgorithm};
use crate::{AegisError, AegisResult};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

const HMAC_MAX_BLOCK_SIZE_BYTES: usize = 128;
const IPAD: u8 = 0x36;
const OPAD: u8 = 0x5c;

/// Streaming HMAC operation
pub struct HmacContext {
    /// Inner hash over `(K ^ ipad) || message`
    inner: DigestContext,

    /// Outer hash over `(K ^ opad) || inner`
    outer: DigestContext,

    finalized: bool,
}

impl HmacContext {
    /// Initialize a streaming HMAC operation
    ///
    /// # Arguments
    ///
    /// * `alg` - SHA-256, SHA-384 or SHA-512
    /// * `key` - HMAC key of any length, hashed first when longer than the block size
    pub fn new(alg: HashAlgorithm, key: &[u8]) -> AegisResult<Self> {
        if !matches!(
            alg,
            HashAlgorithm::Sha256 | HashAlgorithm::Sha384 | HashAlgorithm::Sha512
        ) {
            return Err(AegisError::DRIVER_HMAC_UNSUPPORTED_ALGORITHM);
        }

        let block_len = alg.block_len();
        let mut k0 = Zeroizing::new([0u8; HMAC_MAX_BLOCK_SIZE_BYTES]);
        if key.len() > block_len {
            let hashed = hash_oneshot(alg, key)?;
            k0[..hashed.len()].copy_from_slice(hashed.as_bytes());
        } else {
            k0[..key.len()].copy_from_slice(key);
        }

        let mut pad = Zeroizing::new([0u8; HMAC_MAX_BLOCK_SIZE_BYTES]);
        for (p, k) in pad.iter_mut().zip(k0.iter()).take(block_len) {
            *p = k ^ IPAD;
        }
        let mut inner = DigestContext::new(alg);
        inner.update(&pad[..block_len])?;

        for (p, k) in pad.iter_mut().zip(k0.iter()).take(block_len) {
            *p = k ^ OPAD;
        }
        let mut outer = DigestContext::new(alg);
        outer.update(&pad[..block_len])?;

        Ok(Self {
            inner,
            outer,
            finalized: false,
        })
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.inner.algorithm()
    }
}

impl DigestOp for HmacContext {
    fn update(&mut self, data: &[u8]) -> AegisResult<()> {
        if self.finalized {
            return Err(AegisError::DRIVER_HMAC_INVALID_STATE);
        }
        self.inner.update(data)
    }

    fn finalize(&mut self) -> AegisResult<Digest> {
        if self.finalized {
            return Err(AegisError::DRIVER_HMAC_INVALID_STATE);
        }
        self.finalized = true;
        let inner = self.inner.finalize()?;
        self.outer.update(inner.as_bytes())?;
        self.outer.finalize()
    }
}

/// Calculate the HMAC of `data` in one step
///
/// # Arguments
///
/// * `alg` - SHA-256, SHA-384 or SHA-512
/// * `key` - HMAC key
/// * `data` - Message
pub fn hmac(alg: HashAlgorithm, key: &[u8], data: &[u8]) -> AegisResult<Digest> {
    let mut ctx = HmacContext::new(alg, key)?;
    ctx.update(data)?;
    ctx.finalize()
}

/// Verify an HMAC tag in constant time
///
/// # Arguments
///
/// * `alg` - SHA-256, SHA-384 or SHA-512
/// * `key` - HMAC key
/// * `data` - Message
/// * `tag` - Expected tag, must be the full digest length
pub fn hmac_verify(alg: HashAlgorithm, key: &[u8], data: &[u8], tag: &[u8]) -> AegisResult<()> {
    let computed = hmac(alg, key, data)?;
    if tag.len() == computed.len() && bool::from(computed.as_bytes().ct_eq(tag)) {
        Ok(())
    } else {
        Err(AegisError::DRIVER_HMAC_VERIFY_FAILED)
    }
}

/*++

Licensed under the Apache-2.0 license.

File Name:

    kdf.rs

Abstract:

    File contains the key derivation functions: PBKDF2-HMAC-SHA256,
    HKDF-SHA256 (RFC 5869) and scrypt (RFC 7914).

--*/

use crate::digest::{Digest, DigestOp, HashAlgorithm};
use crate::hmac::{hmac, HmacContext};
use crate::{AegisError, AegisResult};
use zeroize::Zeroizing;

const HKDF_HASH_LEN: usize = 32;
const HKDF_MAX_OUTPUT_LEN: usize = 255 * HKDF_HASH_LEN;

/// Calculate PBKDF2-HMAC-SHA256.
///
/// # Arguments
///
/// * `password` - Password
/// * `salt` - Salt
/// * `rounds` - Iteration count, must be non-zero
/// * `okm` - Output key material, its length selects the derived length
pub fn pbkdf2_hmac_sha256(
    password: &[u8],
    salt: &[u8],
    rounds: u32,
    okm: &mut [u8],
) -> AegisResult<()> {
    if rounds == 0 {
        return Err(AegisError::DRIVER_PBKDF2_INVALID_ROUNDS);
    }
    if okm.is_empty() {
        return Err(AegisError::DRIVER_KDF_INVALID_OUTPUT_LEN);
    }
    pbkdf2::pbkdf2_hmac::<sha2::Sha256>(password, salt, rounds, okm);
    Ok(())
}

/// Calculate HKDF-Extract.
///
/// # Arguments
///
/// * `salt` - salt used to strengthen the extraction, may be empty
/// * `ikm` - the input keying material or shared secret, sometimes called Z
///
/// # Returns
///
/// * `Digest` - Pseudo random key
pub fn hkdf_extract(salt: &[u8], ikm: &[u8]) -> AegisResult<Digest> {
    // An empty salt is equivalent to HashLen zero bytes as an HMAC key.
    hmac(HashAlgorithm::Sha256, salt, ikm)
}

/// Calculate HKDF-Expand.
///
/// # Arguments
///
/// * `prk` - the pseudo random key material
/// * `info` - label used when expanding the key material. Sometimes called fixed info.
/// * `okm` - Location to store the output key material
pub fn hkdf_expand(prk: &[u8], info: &[u8], okm: &mut [u8]) -> AegisResult<()> {
    if okm.is_empty() {
        return Err(AegisError::DRIVER_KDF_INVALID_OUTPUT_LEN);
    }
    if okm.len() > HKDF_MAX_OUTPUT_LEN {
        return Err(AegisError::DRIVER_HKDF_OUTPUT_TOO_LONG);
    }

    let mut previous = Zeroizing::new([0u8; HKDF_HASH_LEN]);
    let mut previous_len = 0;
    for (i, chunk) in okm.chunks_mut(HKDF_HASH_LEN).enumerate() {
        let mut op = HmacContext::new(HashAlgorithm::Sha256, prk)?;
        op.update(&previous[..previous_len])?;
        op.update(info)?;
        op.update(&[(i + 1) as u8])?;
        let block = op.finalize()?;
        previous.copy_from_slice(block.as_bytes());
        previous_len = HKDF_HASH_LEN;
        chunk.copy_from_slice(&previous[..chunk.len()]);
    }
    Ok(())
}

/// Calculate HKDF extract-then-expand.
pub fn hkdf_sha256(salt: &[u8], ikm: &[u8], info: &[u8], okm: &mut [u8]) -> AegisResult<()> {
    let prk = Zeroizing::new(hkdf_extract(salt, ikm)?);
    hkdf_expand(prk.as_bytes(), info, okm)
}

/// scrypt cost parameters
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ScryptParams {
    /// log2 of the CPU/memory cost N
    pub log_n: u8,

    /// Block size
    pub r: u32,

    /// Parallelization
    pub p: u32,
}

/// Calculate scrypt.
///
/// # Arguments
///
/// * `password` - Password
/// * `salt` - Salt
/// * `params` - Cost parameters
/// * `okm` - Output key material, 10 to 64 bytes
pub fn scrypt(
    password: &[u8],
    salt: &[u8],
    params: &ScryptParams,
    okm: &mut [u8],
) -> AegisResult<()> {
    if !(10..=64).contains(&okm.len()) {
        return Err(AegisError::DRIVER_KDF_INVALID_OUTPUT_LEN);
    }
    let params = scrypt::Params::new(params.log_n, params.r, params.p, okm.len())
        .map_err(|_| AegisError::DRIVER_SCRYPT_INVALID_PARAMS)?;
    scrypt::scrypt(password, salt, &params, okm)
        .map_err(|_| AegisError::DRIVER_KDF_INVALID_OUTPUT_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_pbkdf2() {
        let mut okm = [0u8; 32];
        pbkdf2_hmac_sha256(b"password", b"salt", 1, &mut okm).unwrap();
        assert_eq!(
            okm,
            hex!("120fb6cffcf8b32c43e7225256c4f837a86548c92ccc35480805987cb70be17b")
        );
        pbkdf2_hmac_sha256(b"password", b"salt", 4096, &mut okm).unwrap();
        assert_eq!(
            okm,
            hex!("c5e478d59288c841aa530db6845c4c8d962893a001ce4e11a4963873aa98134a")
        );
        assert_eq!(
            pbkdf2_hmac_sha256(b"password", b"salt", 0, &mut okm),
            Err(AegisError::DRIVER_PBKDF2_INVALID_ROUNDS)
        );
    }

    // RFC 5869 test case 1
    #[test]
    fn test_hkdf_rfc5869_case1() {
        let ikm = [0x0bu8; 22];
        let salt = hex!("000102030405060708090a0b0c");
        let info = hex!("f0f1f2f3f4f5f6f7f8f9");
        let prk = hkdf_extract(&salt, &ikm).unwrap();
        assert_eq!(
            prk.as_bytes(),
            hex!("077709362c2e32df0ddc3f0dc47bba6390b6c73bb50f9c3122ec844ad7c2b3e5")
        );
        let mut okm = [0u8; 42];
        hkdf_sha256(&salt, &ikm, &info, &mut okm).unwrap();
        assert_eq!(
            okm,
            hex!("3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865")
        );
    }

    #[test]
    fn test_hkdf_limits() {
        let mut okm = vec![0u8; HKDF_MAX_OUTPUT_LEN + 1];
        assert_eq!(
            hkdf_expand(&[0u8; 32], b"", &mut okm),
            Err(AegisError::DRIVER_HKDF_OUTPUT_TOO_LONG)
        );
        assert_eq!(
            hkdf_expand(&[0u8; 32], b"", &mut []),
            Err(AegisError::DRIVER_KDF_INVALID_OUTPUT_LEN)
        );
    }

    // RFC 7914 section 12, first vector
    #[test]
    fn test_scrypt() {
        let mut okm = [0u8; 64];
        let params = ScryptParams {
            log_n: 4,
            r: 1,
            p: 1,
        };
        scrypt(b"", b"", &params, &mut okm).unwrap();
        assert_eq!(
            okm,
            hex!("77d6576238657b203b19ca42c18a0497f16b4844e3074ae8dfdffa3fede21442fcd0069ded0948f8326a753a0fc81f17e8d3e0fb2e0d3628cf35e20c38d18906")
        );

        let mut again = [0u8; 64];
        scrypt(b"", b"", &params, &mut again).unwrap();
        assert_eq!(okm, again);

        let bad = ScryptParams {
            log_n: 4,
            r: 0,
            p: 1,
        };
        assert_eq!(
            scrypt(b"", b"", &bad, &mut okm),
            Err(AegisError::DRIVER_SCRYPT_INVALID_PARAMS)
        );
        assert_eq!(
            scrypt(b"", b"", &params, &mut okm[..8]),
            Err(AegisError::DRIVER_KDF_INVALID_OUTPUT_LEN)
        );
    }
}

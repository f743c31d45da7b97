/*++

Licensed under the Apache-2.0 license.

File Name:

    digest.rs

Abstract:

    File contains API for streaming and one-shot hash operations
    (SHA-256, SHA-384, SHA-512, SHA3-256 and BLAKE2b).

--*/

use crate::printer::HexBytes;
use crate::{AegisError, AegisResult};
use blake2::Blake2b512;
use sha2::digest::consts::{U128, U64};
use sha2::digest::generic_array::GenericArray;
use sha3::Sha3_256;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// Largest digest produced by any supported algorithm
pub const MAX_DIGEST_SIZE: usize = 64;

const SHA256_BLOCK_BYTE_SIZE: usize = 64;
const SHA256_BLOCK_LEN_OFFSET: usize = 56;
const SHA512_BLOCK_BYTE_SIZE: usize = 128;
const SHA512_BLOCK_LEN_OFFSET: usize = 112;

const SHA256_IV: [u32; 8] = [
    0x6a09e667, 0xbb67ae85, 0x3c6ef372, 0xa54ff53a, 0x510e527f, 0x9b05688c, 0x1f83d9ab, 0x5be0cd19,
];
const SHA384_IV: [u64; 8] = [
    0xcbbb9d5dc1059ed8,
    0x629a292a367cd507,
    0x9159015a3070dd17,
    0x152fecd8f70e5939,
    0x67332667ffc00b31,
    0x8eb44a8768581511,
    0xdb0c2e0d64f98fa7,
    0x47b5481dbefa4fa4,
];
const SHA512_IV: [u64; 8] = [
    0x6a09e667f3bcc908,
    0xbb67ae8584caa73b,
    0x3c6ef372fe94f82b,
    0xa54ff53a5f1d36f1,
    0x510e527fade682d1,
    0x9b05688c2b3e6c1f,
    0x1f83d9abfb41bd6b,
    0x5be0cd19137e2179,
];

/// TPM 2.0 algorithm identifiers (TPM_ALG_ID)
pub const TPM_ALG_SHA256: u16 = 0x000B;
pub const TPM_ALG_SHA384: u16 = 0x000C;
pub const TPM_ALG_SHA512: u16 = 0x000D;
pub const TPM_ALG_SHA3_256: u16 = 0x0027;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
    Sha3_256,
    /// BLAKE2b with a 64-byte output
    Blake2b,
}

impl HashAlgorithm {
    /// Digest size in bytes
    pub const fn digest_len(self) -> usize {
        match self {
            HashAlgorithm::Sha256 | HashAlgorithm::Sha3_256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 | HashAlgorithm::Blake2b => 64,
        }
    }

    /// Internal block size in bytes (the HMAC block size)
    pub const fn block_len(self) -> usize {
        match self {
            HashAlgorithm::Sha256 => SHA256_BLOCK_BYTE_SIZE,
            HashAlgorithm::Sha384 | HashAlgorithm::Sha512 | HashAlgorithm::Blake2b => {
                SHA512_BLOCK_BYTE_SIZE
            }
            HashAlgorithm::Sha3_256 => 136,
        }
    }

    /// TPM algorithm identifier, `None` for algorithms that cannot back a PCR bank
    pub const fn tpm_alg_id(self) -> Option<u16> {
        match self {
            HashAlgorithm::Sha256 => Some(TPM_ALG_SHA256),
            HashAlgorithm::Sha384 => Some(TPM_ALG_SHA384),
            HashAlgorithm::Sha512 => Some(TPM_ALG_SHA512),
            HashAlgorithm::Sha3_256 => Some(TPM_ALG_SHA3_256),
            HashAlgorithm::Blake2b => None,
        }
    }

    pub fn from_tpm_alg_id(id: u16) -> AegisResult<Self> {
        match id {
            TPM_ALG_SHA256 => Ok(HashAlgorithm::Sha256),
            TPM_ALG_SHA384 => Ok(HashAlgorithm::Sha384),
            TPM_ALG_SHA512 => Ok(HashAlgorithm::Sha512),
            TPM_ALG_SHA3_256 => Ok(HashAlgorithm::Sha3_256),
            _ => Err(AegisError::DRIVER_DIGEST_UNKNOWN_TPM_ALG),
        }
    }

    /// Short lowercase name used in configuration files and logs
    pub const fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Sha3_256 => "sha3-256",
            HashAlgorithm::Blake2b => "blake2b",
        }
    }

    pub fn from_name(name: &str) -> AegisResult<Self> {
        match name {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha384" => Ok(HashAlgorithm::Sha384),
            "sha512" => Ok(HashAlgorithm::Sha512),
            "sha3-256" => Ok(HashAlgorithm::Sha3_256),
            "blake2b" => Ok(HashAlgorithm::Blake2b),
            _ => Err(AegisError::DRIVER_DIGEST_UNSUPPORTED_ALGORITHM),
        }
    }
}

/// Fixed-capacity digest value tagged with its algorithm.
///
/// Equality is evaluated in constant time.
#[derive(Copy, Clone)]
pub struct Digest {
    alg: HashAlgorithm,
    bytes: [u8; MAX_DIGEST_SIZE],
}

impl Digest {
    /// Create a digest from raw bytes
    ///
    /// # Arguments
    ///
    /// * `alg` - Algorithm that produced the bytes
    /// * `bytes` - Digest bytes, must be exactly `alg.digest_len()` long
    pub fn new(alg: HashAlgorithm, bytes: &[u8]) -> AegisResult<Self> {
        if bytes.len() != alg.digest_len() {
            return Err(AegisError::DRIVER_DIGEST_INVALID_LENGTH);
        }
        let mut result = Self::zero(alg);
        result.bytes[..bytes.len()].copy_from_slice(bytes);
        Ok(result)
    }

    /// All-zero digest, the reset value of a PCR
    pub const fn zero(alg: HashAlgorithm) -> Self {
        Self {
            alg,
            bytes: [0u8; MAX_DIGEST_SIZE],
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.alg
    }

    pub fn len(&self) -> usize {
        self.alg.digest_len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.alg.digest_len()]
    }

    /// Constant time comparison of algorithm and digest bytes
    pub fn ct_eq(&self, other: &Digest) -> bool {
        self.alg == other.alg && bool::from(self.as_bytes().ct_eq(other.as_bytes()))
    }
}

impl PartialEq for Digest {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other)
    }
}

impl Eq for Digest {}

impl Zeroize for Digest {
    fn zeroize(&mut self) {
        self.bytes.zeroize();
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl core::fmt::Debug for Digest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.alg.name(), HexBytes(self.as_bytes()))
    }
}

/// Streaming digest operation
pub trait DigestOp {
    /// Update the digest with data
    ///
    /// # Arguments
    ///
    /// * `data` - Data to used to update the digest
    fn update(&mut self, data: &[u8]) -> AegisResult<()>;

    /// Finalize the digest operation. Any further call fails with an
    /// invalid state error.
    fn finalize(&mut self) -> AegisResult<Digest>;
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum DigestState {
    /// Initial state
    Init,

    /// Pending state
    Pending,

    /// Final state
    Final,
}

enum Engine {
    Sha256([u32; 8]),
    Sha512([u64; 8]),
    Sha3(Sha3_256),
    Blake2b(Blake2b512),
    Finished,
}

/// Streaming hash state: accumulator words, byte counter and partial block buffer
pub struct DigestContext {
    /// Algorithm
    alg: HashAlgorithm,

    /// Compression engine
    engine: Engine,

    /// State
    state: DigestState,

    /// Staging buffer
    buf: [u8; SHA512_BLOCK_BYTE_SIZE],

    /// Current staging buffer index
    buf_idx: usize,

    /// Data size
    data_size: u64,
}

impl DigestContext {
    /// Initialize multi step digest operation
    ///
    /// # Arguments
    ///
    /// * `alg` - Hash algorithm
    pub fn new(alg: HashAlgorithm) -> Self {
        let engine = match alg {
            HashAlgorithm::Sha256 => Engine::Sha256(SHA256_IV),
            HashAlgorithm::Sha384 => Engine::Sha512(SHA384_IV),
            HashAlgorithm::Sha512 => Engine::Sha512(SHA512_IV),
            HashAlgorithm::Sha3_256 => Engine::Sha3(<Sha3_256 as sha3::Digest>::new()),
            HashAlgorithm::Blake2b => Engine::Blake2b(<Blake2b512 as blake2::Digest>::new()),
        };
        Self {
            alg,
            engine,
            state: DigestState::Init,
            buf: [0u8; SHA512_BLOCK_BYTE_SIZE],
            buf_idx: 0,
            data_size: 0,
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.alg
    }

    /// Finalize into a caller supplied buffer
    ///
    /// # Arguments
    ///
    /// * `out` - Output buffer, at least `digest_len()` bytes
    ///
    /// # Returns
    ///
    /// * `usize` - Number of bytes written
    pub fn finalize_into(&mut self, out: &mut [u8]) -> AegisResult<usize> {
        let len = self.alg.digest_len();
        if out.len() < len {
            return Err(AegisError::DRIVER_DIGEST_BUFFER_TOO_SMALL);
        }
        let digest = self.finalize()?;
        out[..len].copy_from_slice(digest.as_bytes());
        Ok(len)
    }

    fn block_len(&self) -> usize {
        match self.engine {
            Engine::Sha256(_) => SHA256_BLOCK_BYTE_SIZE,
            _ => SHA512_BLOCK_BYTE_SIZE,
        }
    }

    /// Compress one full block into the SHA-2 state
    ///
    /// # Arguments
    ///
    /// * `engine` - SHA-2 state words
    /// * `block` - Exactly one block of input
    fn compress(engine: &mut Engine, block: &[u8]) {
        match engine {
            Engine::Sha256(hash) => {
                let block = GenericArray::<u8, U64>::from_slice(block);
                sha2::compress256(hash, core::slice::from_ref(block));
            }
            Engine::Sha512(hash) => {
                let block = GenericArray::<u8, U128>::from_slice(block);
                sha2::compress512(hash, core::slice::from_ref(block));
            }
            _ => {}
        }
    }

    /// Append the SHA-2 padding and length then compress the remaining blocks
    fn digest_partial_block(&mut self) -> AegisResult<()> {
        let block_len = self.block_len();
        let len_offset = if block_len == SHA256_BLOCK_BYTE_SIZE {
            SHA256_BLOCK_LEN_OFFSET
        } else {
            SHA512_BLOCK_LEN_OFFSET
        };
        let bit_len = (self.data_size as u128) << 3;

        /// Set block length
        fn set_block_len(bit_len: u128, block: &mut [u8], block_len: usize) {
            if block_len == SHA256_BLOCK_BYTE_SIZE {
                block[SHA256_BLOCK_LEN_OFFSET..SHA256_BLOCK_BYTE_SIZE]
                    .copy_from_slice(&(bit_len as u64).to_be_bytes());
            } else {
                block[SHA512_BLOCK_LEN_OFFSET..SHA512_BLOCK_BYTE_SIZE]
                    .copy_from_slice(&bit_len.to_be_bytes());
            }
        }

        // PANIC-FREE: Following check optimizes the out of bounds
        // panic in indexing the `buf`
        if self.buf_idx >= block_len {
            return Err(AegisError::DRIVER_DIGEST_INVALID_STATE);
        }

        let idx = self.buf_idx;
        self.buf[idx..].fill(0);
        self.buf[idx] = 0b1000_0000;
        if idx < len_offset {
            set_block_len(bit_len, &mut self.buf, block_len);
        }
        Self::compress(&mut self.engine, &self.buf[..block_len]);

        // Add a padding block if one is needed
        if idx >= len_offset {
            self.buf.fill(0);
            set_block_len(bit_len, &mut self.buf, block_len);
            Self::compress(&mut self.engine, &self.buf[..block_len]);
        }
        Ok(())
    }

    /// Reset internal buffer state
    fn reset_buf_state(&mut self) {
        self.buf.fill(0);
        self.buf_idx = 0;
        self.state = DigestState::Pending;
    }
}

impl DigestOp for DigestContext {
    /// Update the digest with data
    ///
    /// # Arguments
    ///
    /// * `data` - Data to used to update the digest
    fn update(&mut self, data: &[u8]) -> AegisResult<()> {
        if self.state == DigestState::Final {
            return Err(AegisError::DRIVER_DIGEST_INVALID_STATE);
        }

        self.data_size = self
            .data_size
            .checked_add(data.len() as u64)
            .filter(|size| *size <= u64::MAX >> 3)
            .ok_or(AegisError::DRIVER_DIGEST_MAX_DATA)?;

        match &mut self.engine {
            Engine::Sha3(h) => {
                sha3::Digest::update(h, data);
                self.state = DigestState::Pending;
                return Ok(());
            }
            Engine::Blake2b(h) => {
                blake2::Digest::update(h, data);
                self.state = DigestState::Pending;
                return Ok(());
            }
            Engine::Finished => return Err(AegisError::DRIVER_DIGEST_INVALID_STATE),
            _ => {}
        }

        let block_len = self.block_len();
        let mut remaining = data;
        while !remaining.is_empty() {
            let take = core::cmp::min(block_len - self.buf_idx, remaining.len());
            let (head, tail) = remaining.split_at(take);

            // PANIC-FREE: Use get_mut() as the compiler cannot reason
            // about `buf_idx` to optimize out the panic.
            match self.buf.get_mut(self.buf_idx..self.buf_idx + take) {
                Some(dest) => dest.copy_from_slice(head),
                None => return Err(AegisError::DRIVER_DIGEST_INVALID_STATE),
            }
            self.buf_idx += take;
            remaining = tail;

            // If the buffer is full calculate the digest of accumulated data
            if self.buf_idx == block_len {
                Self::compress(&mut self.engine, &self.buf[..block_len]);
                self.reset_buf_state();
            }
        }

        if self.state == DigestState::Init && !data.is_empty() {
            self.state = DigestState::Pending;
        }
        Ok(())
    }

    fn finalize(&mut self) -> AegisResult<Digest> {
        if self.state == DigestState::Final {
            return Err(AegisError::DRIVER_DIGEST_INVALID_STATE);
        }

        if matches!(self.engine, Engine::Sha256(_) | Engine::Sha512(_)) {
            self.digest_partial_block()?;
        }

        let mut digest = Digest::zero(self.alg);
        let len = self.alg.digest_len();
        match core::mem::replace(&mut self.engine, Engine::Finished) {
            Engine::Sha256(mut hash) => {
                for (chunk, word) in digest.bytes[..len].chunks_exact_mut(4).zip(hash.iter()) {
                    chunk.copy_from_slice(&word.to_be_bytes());
                }
                hash.zeroize();
            }
            Engine::Sha512(mut hash) => {
                for (chunk, word) in digest.bytes[..len].chunks_exact_mut(8).zip(hash.iter()) {
                    chunk.copy_from_slice(&word.to_be_bytes());
                }
                hash.zeroize();
            }
            Engine::Sha3(h) => {
                digest.bytes[..len].copy_from_slice(&sha3::Digest::finalize(h));
            }
            Engine::Blake2b(h) => {
                digest.bytes[..len].copy_from_slice(&blake2::Digest::finalize(h));
            }
            Engine::Finished => return Err(AegisError::DRIVER_DIGEST_INVALID_STATE),
        }

        self.buf.zeroize();
        self.buf_idx = 0;
        self.state = DigestState::Final;
        Ok(digest)
    }
}

impl Drop for DigestContext {
    fn drop(&mut self) {
        self.buf.zeroize();
        match &mut self.engine {
            Engine::Sha256(hash) => hash.zeroize(),
            Engine::Sha512(hash) => hash.zeroize(),
            _ => {}
        }
    }
}

/// Calculate the digest of the buffer
///
/// # Arguments
///
/// * `alg` - Hash algorithm
/// * `data` - Buffer to calculate the digest over
pub fn hash_oneshot(alg: HashAlgorithm, data: &[u8]) -> AegisResult<Digest> {
    let mut ctx = DigestContext::new(alg);
    ctx.update(data)?;
    ctx.finalize()
}

/// Compute the PCR extend value `Hash(old || input)`
///
/// # Arguments
///
/// * `old` - Current register value, its algorithm selects the hash
/// * `input` - Measurement digest being extended
pub fn pcr_extend_value(old: &Digest, input: &[u8]) -> AegisResult<Digest> {
    if old.algorithm().tpm_alg_id().is_none() {
        return Err(AegisError::DRIVER_DIGEST_UNSUPPORTED_ALGORITHM);
    }
    let mut ctx = DigestContext::new(old.algorithm());
    ctx.update(old.as_bytes())?;
    ctx.update(input)?;
    ctx.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use proptest::prelude::*;

    const ALL: [HashAlgorithm; 5] = [
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha384,
        HashAlgorithm::Sha512,
        HashAlgorithm::Sha3_256,
        HashAlgorithm::Blake2b,
    ];

    #[test]
    fn test_sha256_empty() {
        let digest = hash_oneshot(HashAlgorithm::Sha256, &[]).unwrap();
        assert_eq!(
            digest.as_bytes(),
            hex!("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
        );
    }

    #[test]
    fn test_abc_vectors() {
        let expected: [(HashAlgorithm, &[u8]); 5] = [
            (
                HashAlgorithm::Sha256,
                &hex!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"),
            ),
            (
                HashAlgorithm::Sha384,
                &hex!("cb00753f45a35e8bb5a03d699ac65007272c32ab0eded1631a8b605a43ff5bed8086072ba1e7cc2358baeca134c825a7"),
            ),
            (
                HashAlgorithm::Sha512,
                &hex!("ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"),
            ),
            (
                HashAlgorithm::Sha3_256,
                &hex!("3a985da74fe225b2045c172d6bd390bd855f086e3e9d525b46bfe24511431532"),
            ),
            (
                HashAlgorithm::Blake2b,
                &hex!("ba80a53f981c4d0d6a2797b69f12f6e94c212f14685ac4b74b12bb6fdbffa2d17d87c5392aab792dc252d5de4533cc9518d38aa8dbf1925ab92386edd4009923"),
            ),
        ];
        for (alg, digest) in expected {
            assert_eq!(hash_oneshot(alg, b"abc").unwrap().as_bytes(), digest);
        }
    }

    #[test]
    fn test_padding_boundaries_match_reference() {
        // Lengths around the length-field offset exercise the extra padding block.
        for len in [55usize, 56, 63, 64, 65, 111, 112, 127, 128, 129] {
            let data: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let ours = hash_oneshot(HashAlgorithm::Sha256, &data).unwrap();
            let reference = <sha2::Sha256 as sha2::Digest>::digest(&data);
            assert_eq!(ours.as_bytes(), reference.as_slice(), "sha256 len {len}");

            let ours = hash_oneshot(HashAlgorithm::Sha384, &data).unwrap();
            let reference = <sha2::Sha384 as sha2::Digest>::digest(&data);
            assert_eq!(ours.as_bytes(), reference.as_slice(), "sha384 len {len}");

            let ours = hash_oneshot(HashAlgorithm::Sha512, &data).unwrap();
            let reference = <sha2::Sha512 as sha2::Digest>::digest(&data);
            assert_eq!(ours.as_bytes(), reference.as_slice(), "sha512 len {len}");
        }
    }

    #[test]
    fn test_finalize_twice_is_invalid_state() {
        for alg in ALL {
            let mut ctx = DigestContext::new(alg);
            ctx.update(b"data").unwrap();
            ctx.finalize().unwrap();
            assert_eq!(
                ctx.finalize(),
                Err(AegisError::DRIVER_DIGEST_INVALID_STATE)
            );
            assert_eq!(
                ctx.update(b"more"),
                Err(AegisError::DRIVER_DIGEST_INVALID_STATE)
            );
        }
    }

    #[test]
    fn test_finalize_into_buffer_too_small() {
        let mut ctx = DigestContext::new(HashAlgorithm::Sha512);
        let mut out = [0u8; 32];
        assert_eq!(
            ctx.finalize_into(&mut out),
            Err(AegisError::DRIVER_DIGEST_BUFFER_TOO_SMALL)
        );
        let mut out = [0u8; 64];
        assert_eq!(ctx.finalize_into(&mut out), Ok(64));
    }

    #[test]
    fn test_tpm_alg_ids() {
        for alg in ALL {
            if let Some(id) = alg.tpm_alg_id() {
                assert_eq!(HashAlgorithm::from_tpm_alg_id(id).unwrap(), alg);
            }
        }
        assert_eq!(HashAlgorithm::Blake2b.tpm_alg_id(), None);
        assert_eq!(
            HashAlgorithm::from_tpm_alg_id(0x0004),
            Err(AegisError::DRIVER_DIGEST_UNKNOWN_TPM_ALG)
        );
    }

    #[test]
    fn test_pcr_extend_value() {
        let zero = Digest::zero(HashAlgorithm::Sha256);
        let measurement = hash_oneshot(HashAlgorithm::Sha256, &[1, 2, 3, 4]).unwrap();
        let extended = pcr_extend_value(&zero, measurement.as_bytes()).unwrap();
        assert_eq!(
            extended.as_bytes(),
            hex!("220cee34fdd7f3cd918a35a45063e301bf55174a5bb652fe7a6a67b790fdd44d")
        );
        assert_eq!(
            pcr_extend_value(&Digest::zero(HashAlgorithm::Blake2b), &[]),
            Err(AegisError::DRIVER_DIGEST_UNSUPPORTED_ALGORITHM)
        );
    }

    #[test]
    fn test_digest_new_checks_length() {
        assert_eq!(
            Digest::new(HashAlgorithm::Sha256, &[0u8; 48]).err(),
            Some(AegisError::DRIVER_DIGEST_INVALID_LENGTH)
        );
        let a = Digest::new(HashAlgorithm::Sha256, &[7u8; 32]).unwrap();
        let b = Digest::new(HashAlgorithm::Sha3_256, &[7u8; 32]).unwrap();
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn streaming_matches_oneshot(data in proptest::collection::vec(any::<u8>(), 0..400), split in 0usize..400) {
            let k = split.min(data.len());
            for alg in ALL {
                let oneshot = hash_oneshot(alg, &data).unwrap();
                let mut ctx = DigestContext::new(alg);
                ctx.update(&data[..k]).unwrap();
                ctx.update(&data[k..]).unwrap();
                prop_assert_eq!(ctx.finalize().unwrap(), oneshot);
            }
        }
    }

    #[test]
    fn test_every_split_point() {
        let data: Vec<u8> = (0..300u32).map(|i| (i * 7) as u8).collect();
        for alg in ALL {
            let oneshot = hash_oneshot(alg, &data).unwrap();
            for k in 0..=data.len() {
                let mut ctx = DigestContext::new(alg);
                ctx.update(&data[..k]).unwrap();
                ctx.update(&data[k..]).unwrap();
                assert_eq!(ctx.finalize().unwrap(), oneshot, "{alg:?} split {k}");
            }
        }
    }
}

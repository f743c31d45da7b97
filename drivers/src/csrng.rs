/*++

Licensed under the Apache-2.0 license.

File Name:

    csrng.rs

Abstract:

    Software Cryptographically Secure Random Number Generator. A ChaCha20
    DRBG is seeded and periodically reseeded from a platform entropy source
    whose samples pass a repetition count health test.

--*/

use crate::digest::{DigestContext, DigestOp, HashAlgorithm};
use crate::{AegisError, AegisResult};
use rand_chacha::ChaCha20Rng;
use rand_core::{CryptoRng, RngCore, SeedableRng};
use zeroize::Zeroizing;

/// Entropy gathered per seed or reseed
const SEED_ENTROPY_BYTES: usize = 48;

/// DRBG output allowed between reseeds
const RESEED_INTERVAL_BYTES: u64 = 1 << 20;

/// Largest single `generate` request
pub const MAX_GENERATE_BYTES: usize = 64 * 1024;

/// SP 800-90B 4.4.1 cutoff for byte samples assuming 1 bit of min-entropy
/// per sample: 1 + ceil(20 / 1)
const REPETITION_COUNT_CUTOFF: u32 = 21;

/// Platform entropy collaborator
pub trait EntropySource {
    /// Fill `buf` with raw entropy
    ///
    /// # Errors
    ///
    /// Returns `DRIVER_RNG_ENTROPY_UNAVAILABLE` when the source cannot
    /// produce the requested amount.
    fn fill_entropy(&mut self, buf: &mut [u8]) -> AegisResult<()>;
}

impl<T: EntropySource + ?Sized> EntropySource for &mut T {
    fn fill_entropy(&mut self, buf: &mut [u8]) -> AegisResult<()> {
        (**self).fill_entropy(buf)
    }
}

/// Operating system entropy
#[cfg(feature = "std")]
#[derive(Default, Debug, Copy, Clone)]
pub struct OsEntropy;

#[cfg(feature = "std")]
impl EntropySource for OsEntropy {
    fn fill_entropy(&mut self, buf: &mut [u8]) -> AegisResult<()> {
        rand_core::OsRng
            .try_fill_bytes(buf)
            .map_err(|_| AegisError::DRIVER_RNG_ENTROPY_UNAVAILABLE)
    }
}

/// Repetition count test state, carried across samples
#[derive(Default, Debug)]
struct RepetitionCountTest {
    last: Option<u8>,
    count: u32,
}

impl RepetitionCountTest {
    fn check(&mut self, samples: &[u8]) -> AegisResult<()> {
        for &b in samples {
            if self.last == Some(b) {
                self.count += 1;
                if self.count >= REPETITION_COUNT_CUTOFF {
                    return Err(AegisError::DRIVER_RNG_HEALTH_TEST_FAILED);
                }
            } else {
                self.last = Some(b);
                self.count = 1;
            }
        }
        Ok(())
    }
}

/// Cryptographically Secure Random Number Generator
pub struct Csrng<E: EntropySource> {
    source: E,
    drbg: ChaCha20Rng,
    health: RepetitionCountTest,
    bytes_since_reseed: u64,
    reseed_counter: u64,
    failed: bool,
}

impl<E: EntropySource> Csrng<E> {
    /// Instantiate the generator
    ///
    /// # Arguments
    ///
    /// * `source` - Entropy source
    /// * `personalization` - Optional personalization string mixed into the seed
    pub fn new(mut source: E, personalization: &[u8]) -> AegisResult<Self> {
        let mut health = RepetitionCountTest::default();
        let seed = Self::condition(&mut source, &mut health, &[personalization])?;
        log::debug!("[csrng] instantiated");
        Ok(Self {
            source,
            drbg: ChaCha20Rng::from_seed(*seed),
            health,
            bytes_since_reseed: 0,
            reseed_counter: 0,
            failed: false,
        })
    }

    fn condition(
        source: &mut E,
        health: &mut RepetitionCountTest,
        additional: &[&[u8]],
    ) -> AegisResult<Zeroizing<[u8; 32]>> {
        let mut entropy = Zeroizing::new([0u8; SEED_ENTROPY_BYTES]);
        source.fill_entropy(&mut entropy[..])?;
        health.check(&entropy[..])?;

        let mut op = DigestContext::new(HashAlgorithm::Sha512);
        op.update(&entropy[..])?;
        for data in additional {
            op.update(data)?;
        }
        let digest = Zeroizing::new(op.finalize()?);
        let mut seed = Zeroizing::new([0u8; 32]);
        seed.copy_from_slice(&digest.as_bytes()[..32]);
        Ok(seed)
    }

    fn check_failed(&self) -> AegisResult<()> {
        if self.failed {
            return Err(AegisError::DRIVER_RNG_HEALTH_TEST_FAILED);
        }
        Ok(())
    }

    /// Mix fresh entropy into the generator state
    pub fn reseed(&mut self) -> AegisResult<()> {
        self.check_failed()?;
        let mut chain = Zeroizing::new([0u8; 32]);
        self.drbg.fill_bytes(&mut chain[..]);
        self.reseed_counter += 1;
        let counter = self.reseed_counter.to_be_bytes();
        match Self::condition(
            &mut self.source,
            &mut self.health,
            &[&chain[..], &counter[..]],
        ) {
            Ok(seed) => {
                self.drbg = ChaCha20Rng::from_seed(*seed);
                self.bytes_since_reseed = 0;
                Ok(())
            }
            Err(err) => {
                if err == AegisError::DRIVER_RNG_HEALTH_TEST_FAILED {
                    self.failed = true;
                }
                log::error!("[csrng] reseed failed: {}", err);
                Err(err)
            }
        }
    }

    fn reseed_if_due(&mut self, upcoming: u64) -> AegisResult<()> {
        self.check_failed()?;
        if self.bytes_since_reseed.saturating_add(upcoming) > RESEED_INTERVAL_BYTES {
            self.reseed()?;
        }
        Ok(())
    }

    /// Fill `out` with random bytes
    pub fn generate(&mut self, out: &mut [u8]) -> AegisResult<()> {
        if out.len() > MAX_GENERATE_BYTES {
            return Err(AegisError::DRIVER_RNG_REQUEST_TOO_LARGE);
        }
        self.reseed_if_due(out.len() as u64)?;
        self.drbg.fill_bytes(out);
        self.bytes_since_reseed += out.len() as u64;
        Ok(())
    }

    pub fn random_u32(&mut self) -> AegisResult<u32> {
        let mut buf = [0u8; 4];
        self.generate(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn random_u64(&mut self) -> AegisResult<u64> {
        let mut buf = [0u8; 8];
        self.generate(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Run `f` with an infallible `CryptoRngCore` view of the generator.
    ///
    /// Every read from the stream goes through `generate`, so the reseed
    /// interval is enforced inside `f` as well as between calls. A reseed
    /// that fails while `f` runs discards `f`'s result and returns the
    /// error.
    pub fn with_rng<T>(
        &mut self,
        f: impl FnOnce(&mut DrbgStream<'_, E>) -> T,
    ) -> AegisResult<T> {
        self.reseed_if_due(0)?;
        let mut stream = DrbgStream {
            rng: self,
            error: None,
        };
        let result = f(&mut stream);
        match stream.error {
            Some(err) => Err(err),
            None => Ok(result),
        }
    }

    /// Number of reseeds since instantiation
    pub fn reseed_count(&self) -> u64 {
        self.reseed_counter
    }
}

impl<E: EntropySource> Drop for Csrng<E> {
    fn drop(&mut self) {
        self.drbg = ChaCha20Rng::from_seed([0u8; 32]);
    }
}

/// Borrowed generator handed to key generation and randomized signing
pub struct DrbgStream<'a, E: EntropySource> {
    rng: &'a mut Csrng<E>,
    error: Option<AegisError>,
}

impl<E: EntropySource> DrbgStream<'_, E> {
    fn generate(&mut self, dest: &mut [u8]) -> AegisResult<()> {
        dest.chunks_mut(MAX_GENERATE_BYTES)
            .try_for_each(|chunk| self.rng.generate(chunk))
    }
}

impl<E: EntropySource> RngCore for DrbgStream<'_, E> {
    fn next_u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        self.fill_bytes(&mut buf);
        u32::from_le_bytes(buf)
    }

    fn next_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        self.fill_bytes(&mut buf);
        u64::from_le_bytes(buf)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        if let Err(err) = self.generate(dest) {
            // `with_rng` drops the result; the raw DRBG keeps `f` terminating
            log::error!("[csrng] stream reseed failed: {}", err);
            self.error.get_or_insert(err);
            self.rng.drbg.fill_bytes(dest);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.generate(dest).map_err(|err| {
            self.error.get_or_insert(err);
            rand_core::Error::from(core::num::NonZeroU32::from(err))
        })
    }
}

impl<E: EntropySource> CryptoRng for DrbgStream<'_, E> {}

/*++

Licensed under the Apache-2.0 license.

File Name:

    rng_kat.rs

Abstract:

    File contains the self tests for the CSRNG: deterministic instantiation
    and the entropy health test.

--*/

use aegis_drivers::{Csrng, EntropySource};
use aegis_error::{AegisError, AegisResult};

/// Deterministic entropy, every byte differs from its predecessor
struct PatternEntropy {
    next: u8,
}

impl EntropySource for PatternEntropy {
    fn fill_entropy(&mut self, buf: &mut [u8]) -> AegisResult<()> {
        for b in buf.iter_mut() {
            *b = self.next;
            self.next = self.next.wrapping_add(0x3b);
        }
        Ok(())
    }
}

/// Entropy source stuck at a single value
struct StuckEntropy;

impl EntropySource for StuckEntropy {
    fn fill_entropy(&mut self, buf: &mut [u8]) -> AegisResult<()> {
        buf.fill(0x5a);
        Ok(())
    }
}

#[derive(Default, Debug)]
pub struct RngKat {}

impl RngKat {
    /// This function executes the self tests for the random number generator.
    ///
    /// # Returns
    ///
    /// * `AegisResult` - Result denoting the KAT outcome.
    pub fn execute(&self) -> AegisResult<()> {
        self.kat_deterministic()?;
        self.kat_health_test()
    }

    fn generate(personalization: &[u8]) -> AegisResult<[u8; 64]> {
        let mut rng = Csrng::new(PatternEntropy { next: 0x01 }, personalization)?;
        let mut out = [0u8; 64];
        rng.generate(&mut out)?;
        Ok(out)
    }

    fn kat_deterministic(&self) -> AegisResult<()> {
        let first = Self::generate(b"aegis-kat").map_err(|_| AegisError::KAT_RNG_FAILURE)?;
        let second = Self::generate(b"aegis-kat").map_err(|_| AegisError::KAT_RNG_FAILURE)?;
        let other = Self::generate(b"aegis-kat-2").map_err(|_| AegisError::KAT_RNG_FAILURE)?;

        if first != second || first == other || first[..32] == first[32..] {
            return Err(AegisError::KAT_RNG_FAILURE);
        }
        if first.iter().all(|&b| b == 0) {
            return Err(AegisError::KAT_RNG_FAILURE);
        }
        Ok(())
    }

    fn kat_health_test(&self) -> AegisResult<()> {
        match Csrng::new(StuckEntropy, &[]) {
            Err(err) if err == AegisError::DRIVER_RNG_HEALTH_TEST_FAILED => Ok(()),
            _ => Err(AegisError::KAT_RNG_FAILURE),
        }
    }
}

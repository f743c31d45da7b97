/*++

Licensed under the Apache-2.0 license.

File Name:

    rng.rs

Abstract:

    TPM2_GetRandom as a platform entropy source for the software DRBG.

--*/

use crate::interface::{FirmwareTpm, PlatformIo};
use crate::transport::TpmTransport;
use aegis_drivers::EntropySource;
use aegis_error::{AegisError, AegisResult};

/// Entropy drawn from a ready TPM
pub struct TpmEntropy<'a, Io: PlatformIo, Fw: FirmwareTpm> {
    transport: &'a mut TpmTransport<Io, Fw>,
}

impl<'a, Io: PlatformIo, Fw: FirmwareTpm> TpmEntropy<'a, Io, Fw> {
    pub fn new(transport: &'a mut TpmTransport<Io, Fw>) -> Self {
        Self { transport }
    }
}

impl<Io: PlatformIo, Fw: FirmwareTpm> EntropySource for TpmEntropy<'_, Io, Fw> {
    fn fill_entropy(&mut self, buf: &mut [u8]) -> AegisResult<()> {
        self.transport.get_random(buf).map_err(|err| {
            log::warn!("[tpm] GetRandom failed: {}", err);
            AegisError::DRIVER_RNG_ENTROPY_UNAVAILABLE
        })
    }
}

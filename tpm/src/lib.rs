/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    TPM 2.0 transport for the boot trust core: wire codec, CRB/TIS/firmware
    interfaces, lifecycle state machine, PCR, quote and sealing commands,
    and a firmware-emulated device.

--*/
#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

mod commands;
pub mod emulated;
pub mod interface;
pub mod quote;
mod rng;
pub mod seal;
mod transport;
pub mod wire;

pub use commands::PcrValue;
pub use emulated::{EmulatedTpm, Fault, EMULATED_AK_HANDLE};
pub use interface::{
    detect_interface, CrbInterface, FirmwareTpm, NoFirmwareTpm, NoPlatformIo, PlatformIo,
    TisInterface, TpmInterface, TPM_BASE_ADDRESS,
};
pub use quote::{pcr_composite_digest, Quote, QuoteInfo, MAX_NONCE_SIZE};
pub use rng::TpmEntropy;
pub use seal::{SealedBlob, MAX_SEALED_DATA, STORAGE_PRIMARY_HANDLE};
pub use transport::{RetryPolicy, TpmState, TpmTransport};
pub use wire::PcrSelection;

/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    Measured boot for the bootloader: measurement ledger, TCG event log,
    boot policy and the stage-ordered orchestration of PCRs 8, 9 and 10.

--*/
#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

mod chain;
mod context;
mod ledger;
mod policy;
mod tcg_log;

pub use aegis_error::{AegisError, AegisResult};
pub use chain::{BootArtifact, BootChain};
pub use context::{
    BootStage, FinalizedBoot, MeasuredBootContext, MAX_PATH_LEN, MEASURED_PCRS, PCR_BOOTLOADER,
    PCR_INITRD, PCR_KERNEL, SEPARATOR_EVENT_DATA,
};
pub use ledger::{
    LedgerEntry, MeasurementLedger, EV_IPL, EV_NO_ACTION, EV_SEPARATOR, MAX_DIGESTS_PER_EVENT,
    MAX_EVENT_DATA_SIZE,
};
pub use policy::{BootPolicy, HardwarePolicy, DEFAULT_AK_HANDLE};
pub use tcg_log::SPEC_ID_SIGNATURE;

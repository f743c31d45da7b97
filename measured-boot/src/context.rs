/*++

Licensed under the Apache-2.0 license.

File Name:

    context.rs

Abstract:

    Measured boot orchestration. Each boot stage is hashed in every bank,
    extended into its fixed PCR and recorded in the ledger, in a fixed
    order, for one boot attempt.

--*/

use crate::ledger::{LedgerEntry, MeasurementLedger, EV_IPL, EV_SEPARATOR};
use crate::policy::{BootPolicy, HardwarePolicy};
use aegis_drivers::{hash_oneshot, pcr_extend_value, Digest, HashAlgorithm, HexBytes};
use aegis_error::{AegisError, AegisResult, ErrorKind};
use aegis_tpm::wire::PCR_COUNT;
use aegis_tpm::{
    FirmwareTpm, PcrSelection, PlatformIo, Quote, TpmState, TpmTransport, MAX_NONCE_SIZE,
};
use alloc::string::String;
use alloc::vec::Vec;
use core::mem;
use zeroize::Zeroize;

/// PCR receiving the bootloader and its configuration
pub const PCR_BOOTLOADER: u32 = 8;

/// PCR receiving the kernel and its command line
pub const PCR_KERNEL: u32 = 9;

/// PCR receiving the initial ramdisk
pub const PCR_INITRD: u32 = 10;

/// Registers owned by the bootloader
pub const MEASURED_PCRS: [u32; 3] = [PCR_BOOTLOADER, PCR_KERNEL, PCR_INITRD];

/// Longest kernel or initrd path
pub const MAX_PATH_LEN: usize = 255;

/// Data measured by the separator event
pub const SEPARATOR_EVENT_DATA: [u8; 4] = [0u8; 4];

/// Boot stages in measurement order
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum BootStage {
    Bootloader,
    Config,
    Kernel,
    Cmdline,
    Initrd,
    Separator,
}

impl BootStage {
    /// Registers the stage extends
    pub fn pcr_indices(&self) -> &'static [u32] {
        match self {
            BootStage::Bootloader | BootStage::Config => &[PCR_BOOTLOADER],
            BootStage::Kernel | BootStage::Cmdline => &[PCR_KERNEL],
            BootStage::Initrd => &[PCR_INITRD],
            BootStage::Separator => &MEASURED_PCRS,
        }
    }
}

fn shadow_slot(bank: usize, pcr_index: u32) -> usize {
    bank * MEASURED_PCRS.len() + (pcr_index - PCR_BOOTLOADER) as usize
}

fn shadow_value(
    banks: &[HashAlgorithm],
    shadow: &[Digest],
    index: u32,
    alg: HashAlgorithm,
) -> Option<Digest> {
    if !MEASURED_PCRS.contains(&index) {
        return None;
    }
    let bank = banks.iter().position(|&b| b == alg)?;
    shadow.get(shadow_slot(bank, index)).copied()
}

/// One event of a stage, before hashing
struct PendingEvent<'d> {
    pcr_index: u32,
    event_type: u32,
    data: &'d [u8],
    event_data: &'d [u8],
}

/// Measured boot context
///
/// Owns the ledger and the software shadow of PCRs 8 to 10 for one boot
/// attempt. Any failed step aborts the attempt: the ledger and shadow are
/// wiped and every later call fails with `MEASURED_BOOT_ABORTED`.
pub struct MeasuredBootContext<'a, Io: PlatformIo, Fw: FirmwareTpm> {
    tpm: Option<&'a mut TpmTransport<Io, Fw>>,
    banks: Vec<HashAlgorithm>,
    ledger: MeasurementLedger,
    shadow: Vec<Digest>,
    pcr_mask: u32,
    measurement_count: u32,
    last_stage: Option<BootStage>,
    boot_path: String,
    verify_extends: bool,
    ak_handle: u32,
    aborted: Option<AegisError>,
}

impl<'a, Io: PlatformIo, Fw: FirmwareTpm> MeasuredBootContext<'a, Io, Fw> {
    /// Begin a boot attempt
    ///
    /// A device that is not yet `Ready` is initialized. When the device is
    /// absent or unresponsive, `policy.hardware` decides between failing
    /// with the transport error (or `MEASURED_BOOT_NO_DEVICE`) and
    /// continuing with a software-only ledger.
    ///
    /// # Arguments
    ///
    /// * `tpm` - Trust-anchor transport, `None` when the platform has none
    /// * `policy` - Boot policy
    pub fn init(tpm: Option<&'a mut TpmTransport<Io, Fw>>, policy: &BootPolicy) -> AegisResult<Self> {
        if policy.banks.is_empty() || policy.banks.iter().any(|alg| alg.tpm_alg_id().is_none()) {
            return Err(AegisError::MEASURED_BOOT_UNSUPPORTED_BANK);
        }
        let ledger = MeasurementLedger::init(policy.ledger_capacity)?;

        let tpm = match tpm {
            Some(tpm) => match Self::bring_up(tpm, policy) {
                Ok(()) => Some(tpm),
                Err(err)
                    if err.kind() == ErrorKind::HardwareUnavailable
                        && policy.hardware == HardwarePolicy::HashOnly =>
                {
                    log::warn!("[measured-boot] {}, continuing hash-only", err);
                    None
                }
                Err(err) => {
                    log::error!("[measured-boot] trust-anchor device: {}", err);
                    return Err(err);
                }
            },
            None if policy.hardware == HardwarePolicy::HashOnly => {
                log::warn!("[measured-boot] no trust-anchor device, continuing hash-only");
                None
            }
            None => {
                log::error!("[measured-boot] no trust-anchor device");
                return Err(AegisError::MEASURED_BOOT_NO_DEVICE);
            }
        };

        let mut shadow = Vec::with_capacity(policy.banks.len() * MEASURED_PCRS.len());
        for &alg in &policy.banks {
            shadow.extend(MEASURED_PCRS.iter().map(|_| Digest::zero(alg)));
        }

        Ok(Self {
            tpm,
            banks: policy.banks.clone(),
            ledger,
            shadow,
            pcr_mask: 0,
            measurement_count: 0,
            last_stage: None,
            boot_path: String::new(),
            verify_extends: policy.verify_extends,
            ak_handle: policy.ak_handle,
            aborted: None,
        })
    }

    fn bring_up(tpm: &mut TpmTransport<Io, Fw>, policy: &BootPolicy) -> AegisResult<()> {
        if tpm.state() != TpmState::Ready {
            tpm.initialize()?;
        }
        for &alg in &policy.banks {
            if !tpm.has_pcr_bank(alg, &MEASURED_PCRS)? {
                log::error!("[measured-boot] {} bank not allocated", alg.name());
                return Err(AegisError::MEASURED_BOOT_UNSUPPORTED_BANK);
            }
            if !policy.verify_extends {
                continue;
            }
            for index in MEASURED_PCRS {
                let value = tpm.pcr_read(index, alg)?;
                if value.digest != Digest::zero(alg) {
                    log::error!(
                        "[measured-boot] PCR{} {} already extended before the bootloader",
                        index,
                        alg.name()
                    );
                    return Err(AegisError::MEASURED_BOOT_PCR_MISMATCH);
                }
            }
        }
        Ok(())
    }

    /// Measure the bootloader image into PCR 8
    pub fn measure_bootloader(&mut self, image: &[u8]) -> AegisResult<()> {
        self.measure(
            BootStage::Bootloader,
            None,
            &[PendingEvent {
                pcr_index: PCR_BOOTLOADER,
                event_type: EV_IPL,
                data: image,
                event_data: b"bootloader",
            }],
        )
    }

    /// Measure the configuration blob into PCR 8
    pub fn measure_config(&mut self, config: &[u8]) -> AegisResult<()> {
        self.measure(
            BootStage::Config,
            None,
            &[PendingEvent {
                pcr_index: PCR_BOOTLOADER,
                event_type: EV_IPL,
                data: config,
                event_data: b"config",
            }],
        )
    }

    /// Measure the kernel image into PCR 9, recording its path as event data
    pub fn measure_kernel(&mut self, image: &[u8], path: &str) -> AegisResult<()> {
        self.measure(
            BootStage::Kernel,
            Some(path),
            &[PendingEvent {
                pcr_index: PCR_KERNEL,
                event_type: EV_IPL,
                data: image,
                event_data: path.as_bytes(),
            }],
        )?;
        self.boot_path = String::from(path);
        Ok(())
    }

    /// Measure the kernel command line into PCR 9
    pub fn measure_cmdline(&mut self, cmdline: &[u8]) -> AegisResult<()> {
        self.measure(
            BootStage::Cmdline,
            None,
            &[PendingEvent {
                pcr_index: PCR_KERNEL,
                event_type: EV_IPL,
                data: cmdline,
                event_data: cmdline,
            }],
        )
    }

    /// Measure the initial ramdisk into PCR 10, recording its path as event data
    pub fn measure_initrd(&mut self, image: &[u8], path: &str) -> AegisResult<()> {
        self.measure(
            BootStage::Initrd,
            Some(path),
            &[PendingEvent {
                pcr_index: PCR_INITRD,
                event_type: EV_IPL,
                data: image,
                event_data: path.as_bytes(),
            }],
        )
    }

    /// Close the pre-OS measurements with an EV_SEPARATOR in PCRs 8, 9 and 10
    pub fn measure_separator(&mut self) -> AegisResult<()> {
        let events = MEASURED_PCRS.map(|pcr_index| PendingEvent {
            pcr_index,
            event_type: EV_SEPARATOR,
            data: &SEPARATOR_EVENT_DATA,
            event_data: &SEPARATOR_EVENT_DATA,
        });
        self.measure(BootStage::Separator, None, &events)
    }

    fn measure(
        &mut self,
        stage: BootStage,
        path: Option<&str>,
        events: &[PendingEvent],
    ) -> AegisResult<()> {
        if self.aborted.is_some() {
            return Err(AegisError::MEASURED_BOOT_ABORTED);
        }
        if let Some(last) = self.last_stage.filter(|&last| last >= stage) {
            log::error!("[measured-boot] {:?} measured after {:?}", stage, last);
            return Err(self.abort(AegisError::MEASURED_BOOT_OUT_OF_ORDER));
        }
        if matches!(path, Some(p) if p.len() > MAX_PATH_LEN) {
            return Err(self.abort(AegisError::MEASURED_BOOT_PATH_TOO_LONG));
        }

        match self.record(stage, events) {
            Ok(()) => {
                self.last_stage = Some(stage);
                Ok(())
            }
            Err(err) => Err(self.abort(err)),
        }
    }

    fn record(&mut self, stage: BootStage, events: &[PendingEvent]) -> AegisResult<()> {
        let mut entries = Vec::with_capacity(events.len());
        for event in events {
            let digests = self
                .banks
                .iter()
                .map(|&alg| hash_oneshot(alg, event.data))
                .collect::<AegisResult<Vec<_>>>()?;
            entries.push(LedgerEntry::new(
                event.pcr_index,
                event.event_type,
                &digests,
                event.event_data,
            )?);
        }

        // Room for the whole stage is checked before any register moves
        if self.ledger.remaining() < entries.len() {
            log::error!(
                "[measured-boot] {:?}: ledger full at {} entries",
                stage,
                self.ledger.capacity()
            );
            return Err(AegisError::LEDGER_FULL);
        }

        for entry in entries {
            self.extend(&entry)?;
            for digest in entry.digests() {
                log::info!(
                    "[measured-boot] {:?}: PCR{} {} {}",
                    stage,
                    entry.pcr_index(),
                    digest.algorithm().name(),
                    HexBytes(digest.as_bytes())
                );
            }
            self.pcr_mask |= 1 << entry.pcr_index();
            self.measurement_count += 1;
            self.ledger.append(entry)?;
        }
        Ok(())
    }

    fn extend(&mut self, entry: &LedgerEntry) -> AegisResult<()> {
        let pcr_index = entry.pcr_index();
        if let Some(tpm) = self.tpm.as_deref_mut() {
            tpm.pcr_extend(pcr_index, entry.digests())?;
        }

        for (bank, digest) in entry.digests().iter().enumerate() {
            let slot = shadow_slot(bank, pcr_index);
            self.shadow[slot] = pcr_extend_value(&self.shadow[slot], digest.as_bytes())?;
        }

        if !self.verify_extends {
            return Ok(());
        }
        if let Some(tpm) = self.tpm.as_deref_mut() {
            for (bank, &alg) in self.banks.iter().enumerate() {
                let value = tpm.pcr_read(pcr_index, alg)?;
                if !value.digest.ct_eq(&self.shadow[shadow_slot(bank, pcr_index)]) {
                    log::error!(
                        "[measured-boot] PCR{} {} read back {:?} diverges from the ledger",
                        pcr_index,
                        alg.name(),
                        value.digest
                    );
                    return Err(AegisError::MEASURED_BOOT_PCR_MISMATCH);
                }
            }
        }
        Ok(())
    }

    /// Abort the boot attempt and wipe the measurements
    ///
    /// # Returns
    ///
    /// * `AegisError` - `reason`, for propagation
    pub fn abort(&mut self, reason: AegisError) -> AegisError {
        if self.aborted.is_none() {
            log::error!("[measured-boot] boot attempt aborted: {}", reason);
            self.aborted = Some(reason);
            self.wipe();
        }
        reason
    }

    fn wipe(&mut self) {
        self.ledger.zeroize();
        self.shadow.iter_mut().for_each(Zeroize::zeroize);
        self.boot_path.zeroize();
        self.pcr_mask = 0;
    }

    /// Seal the ledger and end the measurement phase
    ///
    /// No separator is measured here; call `measure_separator` first when
    /// the pre-OS phase ends with this attempt.
    pub fn finalize(mut self) -> AegisResult<FinalizedBoot<'a, Io, Fw>> {
        if self.aborted.is_some() {
            return Err(AegisError::MEASURED_BOOT_ABORTED);
        }
        self.ledger.finalize()?;
        log::info!(
            "[measured-boot] finalized: {} measurements, PCR mask 0x{:x}",
            self.measurement_count,
            self.pcr_mask
        );
        Ok(FinalizedBoot {
            tpm: self.tpm.take(),
            banks: mem::take(&mut self.banks),
            ledger: mem::take(&mut self.ledger),
            shadow: mem::take(&mut self.shadow),
            pcr_mask: self.pcr_mask,
            measurement_count: self.measurement_count,
            boot_path: mem::take(&mut self.boot_path),
            ak_handle: self.ak_handle,
        })
    }

    pub fn ledger(&self) -> &MeasurementLedger {
        &self.ledger
    }

    /// Software value of a bootloader PCR
    pub fn pcr_value(&self, index: u32, alg: HashAlgorithm) -> Option<Digest> {
        shadow_value(&self.banks, &self.shadow, index, alg)
    }

    /// Bitmask of the PCRs extended so far
    pub fn pcr_mask(&self) -> u32 {
        self.pcr_mask
    }

    pub fn measurement_count(&self) -> u32 {
        self.measurement_count
    }

    pub fn last_stage(&self) -> Option<BootStage> {
        self.last_stage
    }

    /// Path of the measured kernel
    pub fn boot_path(&self) -> &str {
        &self.boot_path
    }

    pub fn banks(&self) -> &[HashAlgorithm] {
        &self.banks
    }

    /// Returns true if measurements reach a trust-anchor device
    pub fn has_device(&self) -> bool {
        self.tpm.is_some()
    }

    /// Reason the attempt was aborted, if it was
    pub fn abort_reason(&self) -> Option<AegisError> {
        self.aborted
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }
}

impl<Io: PlatformIo, Fw: FirmwareTpm> Drop for MeasuredBootContext<'_, Io, Fw> {
    fn drop(&mut self) {
        self.wipe();
    }
}

/// Sealed outcome of a boot attempt
pub struct FinalizedBoot<'a, Io: PlatformIo, Fw: FirmwareTpm> {
    tpm: Option<&'a mut TpmTransport<Io, Fw>>,
    banks: Vec<HashAlgorithm>,
    ledger: MeasurementLedger,
    shadow: Vec<Digest>,
    pcr_mask: u32,
    measurement_count: u32,
    boot_path: String,
    ak_handle: u32,
}

impl<Io: PlatformIo, Fw: FirmwareTpm> FinalizedBoot<'_, Io, Fw> {
    /// Sealed ledger
    pub fn ledger(&self) -> &MeasurementLedger {
        &self.ledger
    }

    /// Crypto-agile event log for the operating system
    pub fn event_log(&self) -> AegisResult<Vec<u8>> {
        self.ledger.to_vec()
    }

    /// Software value of a bootloader PCR
    pub fn pcr_value(&self, index: u32, alg: HashAlgorithm) -> Option<Digest> {
        shadow_value(&self.banks, &self.shadow, index, alg)
    }

    pub fn pcr_mask(&self) -> u32 {
        self.pcr_mask
    }

    pub fn measurement_count(&self) -> u32 {
        self.measurement_count
    }

    pub fn boot_path(&self) -> &str {
        &self.boot_path
    }

    pub fn has_device(&self) -> bool {
        self.tpm.is_some()
    }

    /// Register values a verifier should expect, replayed from the ledger
    ///
    /// # Arguments
    ///
    /// * `alg` - Bank
    /// * `indices` - PCRs, returned in ascending order without duplicates
    pub fn expected_pcr_values(&self, alg: HashAlgorithm, indices: &[u32]) -> AegisResult<Vec<Digest>> {
        let mut sorted = indices.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        sorted
            .into_iter()
            .map(|index| self.ledger.replay(index, alg))
            .collect()
    }

    /// Read a PCR from the device
    pub fn device_pcr(&mut self, index: u32, alg: HashAlgorithm) -> AegisResult<Digest> {
        let tpm = self
            .tpm
            .as_deref_mut()
            .ok_or(AegisError::MEASURED_BOOT_NO_DEVICE)?;
        Ok(tpm.pcr_read(index, alg)?.digest)
    }

    /// Request a quote over `indices` in the first bank
    ///
    /// # Arguments
    ///
    /// * `nonce` - Verifier challenge, 1 to 64 bytes
    /// * `indices` - PCRs to quote
    pub fn attest(&mut self, nonce: &[u8], indices: &[u32]) -> AegisResult<Quote> {
        if nonce.is_empty() || nonce.len() > MAX_NONCE_SIZE {
            return Err(AegisError::MEASURED_BOOT_INVALID_NONCE);
        }
        if indices.is_empty() || indices.iter().any(|&i| i >= PCR_COUNT) {
            return Err(AegisError::MEASURED_BOOT_INVALID_PCR_SELECTION);
        }
        let alg = *self
            .banks
            .first()
            .ok_or(AegisError::MEASURED_BOOT_UNSUPPORTED_BANK)?;
        let selection = PcrSelection::from_indices(alg, indices)
            .map_err(|_| AegisError::MEASURED_BOOT_INVALID_PCR_SELECTION)?;

        let tpm = self
            .tpm
            .as_deref_mut()
            .ok_or(AegisError::MEASURED_BOOT_NO_DEVICE)?;
        let quote = tpm.quote(self.ak_handle, nonce, &[selection])?;
        log::info!(
            "[measured-boot] quote over {} PCRs {:?}",
            alg.name(),
            selection.indices().collect::<Vec<_>>()
        );
        Ok(quote)
    }
}

impl<Io: PlatformIo, Fw: FirmwareTpm> Drop for FinalizedBoot<'_, Io, Fw> {
    fn drop(&mut self) {
        self.ledger.zeroize();
        self.shadow.iter_mut().for_each(Zeroize::zeroize);
        self.boot_path.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_tpm::{NoFirmwareTpm, NoPlatformIo};
    use hex_literal::hex;

    type SoftwareContext<'a> = MeasuredBootContext<'a, NoPlatformIo, NoFirmwareTpm>;

    fn hash_only() -> BootPolicy {
        BootPolicy {
            hardware: HardwarePolicy::HashOnly,
            ..BootPolicy::default()
        }
    }

    #[test]
    fn test_stage_pcrs() {
        assert_eq!(BootStage::Bootloader.pcr_indices(), &[8]);
        assert_eq!(BootStage::Config.pcr_indices(), &[8]);
        assert_eq!(BootStage::Kernel.pcr_indices(), &[9]);
        assert_eq!(BootStage::Cmdline.pcr_indices(), &[9]);
        assert_eq!(BootStage::Initrd.pcr_indices(), &[10]);
        assert_eq!(BootStage::Separator.pcr_indices(), &[8, 9, 10]);
        assert!(BootStage::Bootloader < BootStage::Separator);
    }

    #[test]
    fn test_fail_closed_without_device() {
        assert_eq!(
            SoftwareContext::init(None, &BootPolicy::default()).err(),
            Some(AegisError::MEASURED_BOOT_NO_DEVICE)
        );
    }

    #[test]
    fn test_hash_only_scenario() {
        let mut ctx = SoftwareContext::init(None, &hash_only()).unwrap();
        assert!(!ctx.has_device());

        ctx.measure_bootloader(&[0x01, 0x02, 0x03, 0x04]).unwrap();
        assert_eq!(
            ctx.pcr_value(8, HashAlgorithm::Sha256).unwrap().as_bytes(),
            hex!("220cee34fdd7f3cd918a35a45063e301bf55174a5bb652fe7a6a67b790fdd44d")
        );
        ctx.measure_config(&[]).unwrap();

        let done = ctx.finalize().unwrap();
        assert_eq!(
            done.pcr_value(8, HashAlgorithm::Sha256).unwrap().as_bytes(),
            hex!("149130382784392b988154b89fe444970d9d5921c643e58a30cd637b468270eb")
        );
        let entries = done.ledger().entries();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.pcr_index() == 8));
        assert_eq!(entries[0].event_data(), b"bootloader");
        assert_eq!(entries[1].event_data(), b"config");
        assert_eq!(done.pcr_mask(), 1 << 8);
        assert!(done.ledger().is_sealed());
    }

    #[test]
    fn test_out_of_order_aborts() {
        let mut ctx = SoftwareContext::init(None, &hash_only()).unwrap();
        ctx.measure_kernel(b"kernel", "/boot/vmlinuz").unwrap();
        assert_eq!(
            ctx.measure_config(b"late"),
            Err(AegisError::MEASURED_BOOT_OUT_OF_ORDER)
        );
        assert!(ctx.is_aborted());
        assert!(ctx.ledger().is_empty());
        assert_eq!(ctx.boot_path(), "");
        assert_eq!(
            ctx.measure_initrd(b"initrd", "/boot/initrd"),
            Err(AegisError::MEASURED_BOOT_ABORTED)
        );
        assert_eq!(ctx.finalize().err(), Some(AegisError::MEASURED_BOOT_ABORTED));
    }

    #[test]
    fn test_repeated_stage_rejected() {
        let mut ctx = SoftwareContext::init(None, &hash_only()).unwrap();
        ctx.measure_bootloader(b"a").unwrap();
        assert_eq!(
            ctx.measure_bootloader(b"b"),
            Err(AegisError::MEASURED_BOOT_OUT_OF_ORDER)
        );
    }

    #[test]
    fn test_path_too_long() {
        let mut ctx = SoftwareContext::init(None, &hash_only()).unwrap();
        let path = "p".repeat(MAX_PATH_LEN + 1);
        assert_eq!(
            ctx.measure_kernel(b"kernel", &path),
            Err(AegisError::MEASURED_BOOT_PATH_TOO_LONG)
        );
        assert_eq!(ctx.abort_reason(), Some(AegisError::MEASURED_BOOT_PATH_TOO_LONG));

        let mut ctx = SoftwareContext::init(None, &hash_only()).unwrap();
        let path = "p".repeat(MAX_PATH_LEN);
        ctx.measure_kernel(b"kernel", &path).unwrap();
        assert_eq!(ctx.boot_path(), path);
    }

    #[test]
    fn test_separator_needs_room_for_three() {
        let policy = BootPolicy {
            ledger_capacity: 3,
            ..hash_only()
        };
        let mut ctx = SoftwareContext::init(None, &policy).unwrap();
        ctx.measure_bootloader(b"boot").unwrap();
        assert_eq!(ctx.measure_separator(), Err(AegisError::LEDGER_FULL));
        assert!(ctx.is_aborted());
    }

    #[test]
    fn test_unsupported_bank() {
        let policy = BootPolicy {
            banks: vec![HashAlgorithm::Blake2b],
            ..hash_only()
        };
        assert_eq!(
            SoftwareContext::init(None, &policy).err(),
            Some(AegisError::MEASURED_BOOT_UNSUPPORTED_BANK)
        );
    }
}

/*++

Licensed under the Apache-2.0 license.

File Name:

    interface.rs

Abstract:

    TPM hardware interfaces: Command Response Buffer (CRB), the legacy
    FIFO/TIS register interface and firmware-emulated devices, plus the
    probing that selects one of them.

--*/

use crate::wire::{ResponseHeader, HEADER_SIZE, MAX_COMMAND_SIZE};
use crate::RetryPolicy;
use aegis_error::{AegisError, AegisResult};

/// Locality 0 register window of a PC client TPM
pub const TPM_BASE_ADDRESS: u64 = 0xFED4_0000;

/// Memory-mapped register access supplied by the platform
pub trait PlatformIo {
    fn read8(&mut self, addr: u64) -> u8;

    fn write8(&mut self, addr: u64, val: u8);

    fn read32(&mut self, addr: u64) -> u32;

    fn write32(&mut self, addr: u64, val: u32);

    /// Busy-wait for `us` microseconds
    fn delay_us(&mut self, us: u32);
}

/// Firmware-emulated TPM reached through a platform call rather than
/// registers
pub trait FirmwareTpm {
    /// Execute one command
    ///
    /// # Arguments
    ///
    /// * `command` - Complete command, header included
    /// * `response` - Response buffer
    ///
    /// # Returns
    ///
    /// * `usize` - Response length
    fn submit(&mut self, command: &[u8], response: &mut [u8]) -> AegisResult<usize>;
}

/// Platform without memory-mapped TPM registers; every read floats high
#[derive(Debug, Default)]
pub struct NoPlatformIo;

impl PlatformIo for NoPlatformIo {
    fn read8(&mut self, _addr: u64) -> u8 {
        0xFF
    }

    fn write8(&mut self, _addr: u64, _val: u8) {}

    fn read32(&mut self, _addr: u64) -> u32 {
        0xFFFF_FFFF
    }

    fn write32(&mut self, _addr: u64, _val: u32) {}

    fn delay_us(&mut self, _us: u32) {}
}

/// Platform without a firmware TPM
#[derive(Debug, Default)]
pub struct NoFirmwareTpm;

impl FirmwareTpm for NoFirmwareTpm {
    fn submit(&mut self, _command: &[u8], _response: &mut [u8]) -> AegisResult<usize> {
        Err(AegisError::TPM_NO_INTERFACE)
    }
}

/// Poll `predicate` every `poll_us` until it holds or `timeout_us` elapses
fn poll_until<Io: PlatformIo>(
    io: &mut Io,
    policy: &RetryPolicy,
    timeout_err: AegisError,
    mut predicate: impl FnMut(&mut Io) -> bool,
) -> AegisResult<()> {
    let mut waited = 0u32;
    loop {
        if predicate(io) {
            return Ok(());
        }
        if waited >= policy.timeout_us {
            return Err(timeout_err);
        }
        io.delay_us(policy.poll_us);
        waited = waited.saturating_add(policy.poll_us.max(1));
    }
}

mod crb {
    pub const LOC_CTRL: u64 = 0x08;
    pub const LOC_STS: u64 = 0x0C;
    pub const INTF_ID: u64 = 0x30;
    pub const CTRL_REQ: u64 = 0x40;
    pub const CTRL_STS: u64 = 0x44;
    pub const CTRL_CANCEL: u64 = 0x48;
    pub const CTRL_START: u64 = 0x4C;
    pub const CTRL_CMD_SIZE: u64 = 0x58;
    pub const CTRL_CMD_LADDR: u64 = 0x5C;
    pub const CTRL_CMD_HADDR: u64 = 0x60;
    pub const CTRL_RSP_SIZE: u64 = 0x64;
    pub const CTRL_RSP_ADDR: u64 = 0x68;

    pub const LOC_CTRL_REQUEST_ACCESS: u32 = 1 << 0;
    pub const LOC_CTRL_RELINQUISH: u32 = 1 << 1;
    pub const LOC_STS_GRANTED: u32 = 1 << 0;
    pub const INTF_TYPE_MASK: u32 = 0xF;
    pub const INTF_TYPE_CRB: u32 = 0x1;
    pub const CTRL_REQ_CMD_READY: u32 = 1 << 0;
    pub const CTRL_REQ_GO_IDLE: u32 = 1 << 1;
    pub const CTRL_STS_FATAL: u32 = 1 << 0;
}

/// Command Response Buffer interface
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct CrbInterface {
    base: u64,
    cmd_addr: u64,
    cmd_size: usize,
    rsp_addr: u64,
    rsp_size: usize,
}

impl CrbInterface {
    /// Returns true if the interface identifier at `base` reports a CRB
    pub fn probe(io: &mut impl PlatformIo, base: u64) -> bool {
        let id = io.read32(base + crb::INTF_ID);
        id != 0xFFFF_FFFF && id & crb::INTF_TYPE_MASK == crb::INTF_TYPE_CRB
    }

    /// Read the command and response buffer layout
    pub fn init(io: &mut impl PlatformIo, base: u64) -> AegisResult<Self> {
        let cmd_addr = u64::from(io.read32(base + crb::CTRL_CMD_LADDR))
            | u64::from(io.read32(base + crb::CTRL_CMD_HADDR)) << 32;
        let rsp_addr = u64::from(io.read32(base + crb::CTRL_RSP_ADDR))
            | u64::from(io.read32(base + crb::CTRL_RSP_ADDR + 4)) << 32;
        let cmd_size = io.read32(base + crb::CTRL_CMD_SIZE) as usize;
        let rsp_size = io.read32(base + crb::CTRL_RSP_SIZE) as usize;
        if cmd_size < HEADER_SIZE || rsp_size < HEADER_SIZE {
            return Err(AegisError::TPM_NO_INTERFACE);
        }
        Ok(Self {
            base,
            cmd_addr,
            cmd_size: cmd_size.min(MAX_COMMAND_SIZE),
            rsp_addr,
            rsp_size: rsp_size.min(MAX_COMMAND_SIZE),
        })
    }

    /// Execute one command
    pub fn exchange(
        &self,
        io: &mut impl PlatformIo,
        policy: &RetryPolicy,
        command: &[u8],
        response: &mut [u8],
    ) -> AegisResult<usize> {
        if command.len() > self.cmd_size {
            return Err(AegisError::TPM_COMMAND_TOO_LARGE);
        }
        let base = self.base;
        io.write32(base + crb::LOC_CTRL, crb::LOC_CTRL_REQUEST_ACCESS);
        poll_until(io, policy, AegisError::TPM_LOCALITY_UNAVAILABLE, |io| {
            io.read32(base + crb::LOC_STS) & crb::LOC_STS_GRANTED != 0
        })?;

        let result = self.transact(io, policy, command, response);

        io.write32(base + crb::CTRL_REQ, crb::CTRL_REQ_GO_IDLE);
        io.write32(base + crb::LOC_CTRL, crb::LOC_CTRL_RELINQUISH);
        result
    }

    fn transact(
        &self,
        io: &mut impl PlatformIo,
        policy: &RetryPolicy,
        command: &[u8],
        response: &mut [u8],
    ) -> AegisResult<usize> {
        let base = self.base;

        // The device clears cmdReady once it has left the idle state
        io.write32(base + crb::CTRL_REQ, crb::CTRL_REQ_CMD_READY);
        poll_until(io, policy, AegisError::TPM_TIMEOUT, |io| {
            io.read32(base + crb::CTRL_REQ) & crb::CTRL_REQ_CMD_READY == 0
        })?;
        if io.read32(base + crb::CTRL_STS) & crb::CTRL_STS_FATAL != 0 {
            return Err(AegisError::TPM_RC_FAILURE);
        }

        for (i, b) in command.iter().enumerate() {
            io.write8(self.cmd_addr + i as u64, *b);
        }
        io.write32(base + crb::CTRL_START, 1);
        let started = poll_until(io, policy, AegisError::TPM_TIMEOUT, |io| {
            io.read32(base + crb::CTRL_START) == 0
        });
        if let Err(err) = started {
            io.write32(base + crb::CTRL_CANCEL, 1);
            return Err(err);
        }

        let limit = self.rsp_size.min(response.len());
        if limit < HEADER_SIZE {
            return Err(AegisError::TPM_RESPONSE_TOO_SHORT);
        }
        for (i, b) in response[..HEADER_SIZE].iter_mut().enumerate() {
            *b = io.read8(self.rsp_addr + i as u64);
        }
        let len = ResponseHeader::decode(&response[..HEADER_SIZE])?.length as usize;
        if len > limit {
            return Err(AegisError::TPM_RESPONSE_LENGTH_MISMATCH);
        }
        for (i, b) in response[HEADER_SIZE..len].iter_mut().enumerate() {
            *b = io.read8(self.rsp_addr + (HEADER_SIZE + i) as u64);
        }
        Ok(len)
    }
}

mod tis {
    pub const ACCESS: u64 = 0x00;
    pub const STS: u64 = 0x18;
    pub const BURST_COUNT: u64 = 0x19;
    pub const DATA_FIFO: u64 = 0x24;
    pub const DID_VID: u64 = 0xF00;

    pub const ACCESS_REQUEST_USE: u8 = 1 << 1;
    pub const ACCESS_ACTIVE_LOCALITY: u8 = 1 << 5;
    pub const ACCESS_VALID: u8 = 1 << 7;

    pub const STS_VALID: u8 = 1 << 7;
    pub const STS_COMMAND_READY: u8 = 1 << 6;
    pub const STS_GO: u8 = 1 << 5;
    pub const STS_DATA_AVAIL: u8 = 1 << 4;
    pub const STS_EXPECT: u8 = 1 << 3;
}

/// Legacy FIFO (TIS) register interface
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TisInterface {
    base: u64,
}

impl TisInterface {
    /// Returns true if a FIFO interface answers at `base`
    pub fn probe(io: &mut impl PlatformIo, base: u64) -> bool {
        let access = io.read8(base + tis::ACCESS);
        let did_vid = io.read32(base + tis::DID_VID);
        access != 0xFF && access & tis::ACCESS_VALID != 0 && did_vid != 0 && did_vid != 0xFFFF_FFFF
    }

    pub fn new(base: u64) -> Self {
        Self { base }
    }

    fn burst_count(&self, io: &mut impl PlatformIo) -> usize {
        usize::from(io.read8(self.base + tis::BURST_COUNT))
            | usize::from(io.read8(self.base + tis::BURST_COUNT + 1)) << 8
    }

    fn status(&self, io: &mut impl PlatformIo) -> u8 {
        io.read8(self.base + tis::STS)
    }

    /// Execute one command
    pub fn exchange(
        &self,
        io: &mut impl PlatformIo,
        policy: &RetryPolicy,
        command: &[u8],
        response: &mut [u8],
    ) -> AegisResult<usize> {
        let base = self.base;
        if io.read8(base + tis::ACCESS) & tis::ACCESS_ACTIVE_LOCALITY == 0 {
            io.write8(base + tis::ACCESS, tis::ACCESS_REQUEST_USE);
            poll_until(io, policy, AegisError::TPM_LOCALITY_UNAVAILABLE, |io| {
                let access = io.read8(base + tis::ACCESS);
                access & (tis::ACCESS_VALID | tis::ACCESS_ACTIVE_LOCALITY)
                    == tis::ACCESS_VALID | tis::ACCESS_ACTIVE_LOCALITY
            })?;
        }

        let result = self.transact(io, policy, command, response);

        // Back to idle, then give up the locality
        io.write8(base + tis::STS, tis::STS_COMMAND_READY);
        io.write8(base + tis::ACCESS, tis::ACCESS_ACTIVE_LOCALITY);
        result
    }

    fn transact(
        &self,
        io: &mut impl PlatformIo,
        policy: &RetryPolicy,
        command: &[u8],
        response: &mut [u8],
    ) -> AegisResult<usize> {
        let base = self.base;
        io.write8(base + tis::STS, tis::STS_COMMAND_READY);
        poll_until(io, policy, AegisError::TPM_TIMEOUT, |io| {
            self.status(io) & tis::STS_COMMAND_READY != 0
        })?;

        let mut sent = 0;
        while sent < command.len() {
            let mut burst = 0;
            poll_until(io, policy, AegisError::TPM_TIMEOUT, |io| {
                burst = self.burst_count(io);
                burst > 0
            })?;
            let end = command.len().min(sent + burst);
            for b in &command[sent..end] {
                io.write8(base + tis::DATA_FIFO, *b);
            }
            sent = end;
        }
        poll_until(io, policy, AegisError::TPM_TIMEOUT, |io| {
            self.status(io) & tis::STS_VALID != 0
        })?;
        if self.status(io) & tis::STS_EXPECT != 0 {
            return Err(AegisError::TPM_COMMAND_LENGTH_MISMATCH);
        }

        io.write8(base + tis::STS, tis::STS_GO);
        poll_until(io, policy, AegisError::TPM_TIMEOUT, |io| {
            self.status(io) & (tis::STS_VALID | tis::STS_DATA_AVAIL)
                == tis::STS_VALID | tis::STS_DATA_AVAIL
        })?;

        if response.len() < HEADER_SIZE {
            return Err(AegisError::TPM_RESPONSE_TOO_SHORT);
        }
        self.read_fifo(io, policy, &mut response[..HEADER_SIZE])?;
        let len = ResponseHeader::decode(&response[..HEADER_SIZE])?.length as usize;
        if len > response.len() {
            return Err(AegisError::TPM_RESPONSE_LENGTH_MISMATCH);
        }
        self.read_fifo(io, policy, &mut response[HEADER_SIZE..len])?;
        Ok(len)
    }

    fn read_fifo(
        &self,
        io: &mut impl PlatformIo,
        policy: &RetryPolicy,
        out: &mut [u8],
    ) -> AegisResult<()> {
        let mut filled = 0;
        while filled < out.len() {
            let mut burst = 0;
            poll_until(io, policy, AegisError::TPM_TIMEOUT, |io| {
                burst = self.burst_count(io);
                burst > 0 && self.status(io) & tis::STS_DATA_AVAIL != 0
            })?;
            let end = out.len().min(filled + burst);
            for b in &mut out[filled..end] {
                *b = io.read8(self.base + tis::DATA_FIFO);
            }
            filled = end;
        }
        Ok(())
    }
}

/// Transport variant selected by detection, fixed for the boot attempt
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TpmInterface {
    Crb(CrbInterface),
    Tis(TisInterface),
    Firmware,
}

impl TpmInterface {
    pub fn name(&self) -> &'static str {
        match self {
            TpmInterface::Crb(_) => "crb",
            TpmInterface::Tis(_) => "tis",
            TpmInterface::Firmware => "firmware",
        }
    }
}

/// Probe the known interface types in order CRB, TIS, firmware and return
/// the first responsive one
///
/// # Arguments
///
/// * `io` - Register access, `None` on platforms without MMIO
/// * `base` - Locality 0 register window
/// * `firmware_present` - A firmware TPM is available as the last resort
pub fn detect_interface<Io: PlatformIo>(
    io: Option<&mut Io>,
    base: u64,
    firmware_present: bool,
) -> AegisResult<TpmInterface> {
    if let Some(io) = io {
        if CrbInterface::probe(io, base) {
            match CrbInterface::init(io, base) {
                Ok(crb) => return Ok(TpmInterface::Crb(crb)),
                Err(err) => log::warn!("[tpm] crb probe at 0x{:x}: {}", base, err),
            }
        }
        if TisInterface::probe(io, base) {
            return Ok(TpmInterface::Tis(TisInterface::new(base)));
        }
    }
    if firmware_present {
        return Ok(TpmInterface::Firmware);
    }
    Err(AegisError::TPM_NO_INTERFACE)
}

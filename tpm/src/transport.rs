/*++

Licensed under the Apache-2.0 license.

File Name:

    transport.rs

Abstract:

    TPM transport state machine. Owns the selected interface, enforces the
    Uninitialized -> InterfaceDetected -> Started -> Ready lifecycle and
    retries warning responses within a bounded budget.

--*/

use alloc::vec;
use alloc::vec::Vec;
use crate::interface::{
    detect_interface, FirmwareTpm, NoFirmwareTpm, NoPlatformIo, PlatformIo, TpmInterface,
    TPM_BASE_ADDRESS,
};
use crate::wire::*;
use aegis_error::{AegisError, AegisResult};

/// Transport lifecycle
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TpmState {
    Uninitialized,
    InterfaceDetected,
    Started,
    Ready,
}

/// Bounded retry and polling budget
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Reissues of a command after a warning response or a timeout
    pub retries: u32,

    /// Longest wait for any single register condition
    pub timeout_us: u32,

    /// Interval between register polls and between retries
    pub poll_us: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            timeout_us: 2_000_000,
            poll_us: 1000,
        }
    }
}

/// TPM transport
pub struct TpmTransport<Io: PlatformIo, Fw: FirmwareTpm> {
    io: Option<Io>,
    firmware: Option<Fw>,
    base: u64,
    policy: RetryPolicy,
    interface: Option<TpmInterface>,
    state: TpmState,
}

impl<Io: PlatformIo> TpmTransport<Io, NoFirmwareTpm> {
    /// Transport over memory-mapped registers only
    pub fn with_io(io: Io, policy: RetryPolicy) -> Self {
        Self::new(Some(io), None, policy)
    }
}

impl<Fw: FirmwareTpm> TpmTransport<NoPlatformIo, Fw> {
    /// Transport over a firmware TPM only
    pub fn with_firmware(firmware: Fw, policy: RetryPolicy) -> Self {
        Self::new(None, Some(firmware), policy)
    }
}

impl<Io: PlatformIo, Fw: FirmwareTpm> TpmTransport<Io, Fw> {
    /// Create a new transport
    ///
    /// # Arguments
    ///
    /// * `io` - Register access, `None` when the platform has no MMIO TPM
    /// * `firmware` - Firmware TPM, `None` when absent
    /// * `policy` - Retry and polling budget
    pub fn new(io: Option<Io>, firmware: Option<Fw>, policy: RetryPolicy) -> Self {
        Self {
            io,
            firmware,
            base: TPM_BASE_ADDRESS,
            policy,
            interface: None,
            state: TpmState::Uninitialized,
        }
    }

    /// Override the locality 0 register window
    pub fn with_base(mut self, base: u64) -> Self {
        self.base = base;
        self
    }

    pub fn state(&self) -> TpmState {
        self.state
    }

    pub fn interface(&self) -> Option<TpmInterface> {
        self.interface
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn io_mut(&mut self) -> Option<&mut Io> {
        self.io.as_mut()
    }

    pub fn firmware_mut(&mut self) -> Option<&mut Fw> {
        self.firmware.as_mut()
    }

    fn require_state(&self, allowed: &[TpmState]) -> AegisResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(AegisError::TPM_INVALID_STATE)
        }
    }

    pub(crate) fn require_ready(&self) -> AegisResult<()> {
        self.require_state(&[TpmState::Ready])
    }

    fn set_state(&mut self, state: TpmState) {
        log::info!("[tpm] {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Probe CRB, TIS and firmware interfaces in that order and bind the
    /// first responsive one for the rest of the boot attempt
    pub fn detect_interface(&mut self) -> AegisResult<TpmInterface> {
        self.require_state(&[TpmState::Uninitialized])?;
        match detect_interface(self.io.as_mut(), self.base, self.firmware.is_some()) {
            Ok(interface) => {
                log::info!("[tpm] selected {} interface", interface.name());
                self.interface = Some(interface);
                self.set_state(TpmState::InterfaceDetected);
                Ok(interface)
            }
            Err(err) => {
                log::warn!("[tpm] no responsive interface: {}", err);
                Err(err)
            }
        }
    }

    fn exchange(&mut self, command: &[u8], response: &mut [u8]) -> AegisResult<usize> {
        match self.interface {
            Some(TpmInterface::Crb(crb)) => {
                let io = self.io.as_mut().ok_or(AegisError::TPM_NO_INTERFACE)?;
                crb.exchange(io, &self.policy, command, response)
            }
            Some(TpmInterface::Tis(tis)) => {
                let io = self.io.as_mut().ok_or(AegisError::TPM_NO_INTERFACE)?;
                tis.exchange(io, &self.policy, command, response)
            }
            Some(TpmInterface::Firmware) => self
                .firmware
                .as_mut()
                .ok_or(AegisError::TPM_NO_INTERFACE)?
                .submit(command, response),
            None => Err(AegisError::TPM_INVALID_STATE),
        }
    }

    /// Send one command and return the successful response
    ///
    /// Warning codes (RETRY, YIELDED, TESTING) and interface timeouts are
    /// retried up to `RetryPolicy::retries` times. Any other non-success
    /// response code is returned as its `TPM_RC_*` error.
    ///
    /// # Arguments
    ///
    /// * `command` - Complete command, header included
    ///
    /// # Returns
    ///
    /// * `Vec<u8>` - Complete response, header included
    pub fn send_command(&mut self, command: &[u8]) -> AegisResult<Vec<u8>> {
        if self.state == TpmState::Uninitialized {
            return Err(AegisError::TPM_INVALID_STATE);
        }
        if command.len() > MAX_COMMAND_SIZE {
            return Err(AegisError::TPM_COMMAND_TOO_LARGE);
        }
        let header = CommandHeader::decode(command)?;

        let mut response = vec![0u8; MAX_COMMAND_SIZE];
        let mut attempt = 0;
        loop {
            let outcome = self.exchange(command, &mut response).and_then(|len| {
                let rsp = response.get(..len).ok_or(AegisError::TPM_RESPONSE_LENGTH_MISMATCH)?;
                let rsp_header = ResponseHeader::decode(rsp)?;
                if rsp_header.length as usize != len {
                    return Err(AegisError::TPM_RESPONSE_LENGTH_MISMATCH);
                }
                Ok((rsp_header.response_code, len))
            });
            let err = match outcome {
                Ok((TPM_RC_SUCCESS, len)) => {
                    response.truncate(len);
                    return Ok(response);
                }
                Ok((rc, _)) => AegisError::from_tpm_rc(rc),
                Err(err) => err,
            };

            if err == AegisError::TPM_RC_REBOOT {
                log::error!(
                    "[tpm] command 0x{:x}: device requires a platform reboot before further use",
                    header.code
                );
                return Err(err);
            }
            if !(err.is_tpm_retryable() || err == AegisError::TPM_TIMEOUT) {
                return Err(err);
            }
            if attempt >= self.policy.retries {
                log::error!(
                    "[tpm] command 0x{:x}: {} after {} retries",
                    header.code,
                    err,
                    attempt
                );
                return Err(AegisError::TPM_RETRIES_EXHAUSTED);
            }
            attempt += 1;
            log::warn!(
                "[tpm] command 0x{:x}: {}, retry {}/{}",
                header.code,
                err,
                attempt,
                self.policy.retries
            );
            let delay = self.policy.poll_us;
            if let Some(io) = self.io.as_mut() {
                io.delay_us(delay);
            }
        }
    }

    /// TPM2_Startup. An RC_INITIALIZE response means the device was already
    /// started by earlier firmware and is accepted.
    pub fn startup(&mut self, startup_type: u16) -> AegisResult<()> {
        self.require_state(&[TpmState::InterfaceDetected])?;
        let cmd = CommandBuilder::new(TPM_ST_NO_SESSIONS, TPM_CC_STARTUP)
            .u16(startup_type)
            .finish()?;
        match self.send_command(&cmd) {
            Ok(_) => {}
            Err(err) if err == AegisError::TPM_RC_INITIALIZE => {
                log::info!("[tpm] already started");
            }
            Err(err) => return Err(err),
        }
        self.set_state(TpmState::Started);
        Ok(())
    }

    /// TPM2_SelfTest
    pub fn self_test(&mut self, full: bool) -> AegisResult<()> {
        self.require_state(&[TpmState::Started, TpmState::Ready])?;
        let cmd = CommandBuilder::new(TPM_ST_NO_SESSIONS, TPM_CC_SELF_TEST)
            .u8(u8::from(full))
            .finish()?;
        self.send_command(&cmd)?;
        self.set_state(TpmState::Ready);
        Ok(())
    }

    /// Detect, start and self-test the device
    pub fn initialize(&mut self) -> AegisResult<()> {
        if self.state == TpmState::Uninitialized {
            self.detect_interface()?;
        }
        if self.state == TpmState::InterfaceDetected {
            self.startup(TPM_SU_CLEAR)?;
        }
        self.self_test(true)
    }

    /// TPM2_Shutdown, then release the interface
    pub fn shutdown(&mut self, shutdown_type: u16) -> AegisResult<()> {
        self.require_state(&[TpmState::Started, TpmState::Ready])?;
        let cmd = CommandBuilder::new(TPM_ST_NO_SESSIONS, TPM_CC_SHUTDOWN)
            .u16(shutdown_type)
            .finish()?;
        let result = self.send_command(&cmd).map(|_| ());
        self.interface = None;
        self.set_state(TpmState::Uninitialized);
        result
    }
}

// Licensed under the Apache-2.0 license

use aegis_drivers::{hash_oneshot, pcr_extend_value, Csrng, Digest, EntropySource, HashAlgorithm};
use aegis_error::{AegisError, ErrorKind};
use aegis_tpm::wire::{TPM_RC_FAILURE, TPM_RC_REBOOT, TPM_RC_RETRY, TPM_RC_YIELDED};
use aegis_tpm::*;

const SHA256: HashAlgorithm = HashAlgorithm::Sha256;
const SHA384: HashAlgorithm = HashAlgorithm::Sha384;

/// Register-level CRB device backed by the emulator
struct CrbSim {
    tpm: EmulatedTpm,
    buffer: Vec<u8>,
    granted: bool,
    stuck: bool,
    delays: u32,
}

const CRB_BUFFER: u64 = TPM_BASE_ADDRESS + 0x80;
const CRB_BUFFER_SIZE: usize = 0xF80;

impl CrbSim {
    fn new(tpm: EmulatedTpm) -> Self {
        Self {
            tpm,
            buffer: vec![0u8; CRB_BUFFER_SIZE],
            granted: false,
            stuck: false,
            delays: 0,
        }
    }
}

impl PlatformIo for CrbSim {
    fn read8(&mut self, addr: u64) -> u8 {
        match addr.checked_sub(CRB_BUFFER) {
            Some(off) if (off as usize) < CRB_BUFFER_SIZE => self.buffer[off as usize],
            _ => 0,
        }
    }

    fn write8(&mut self, addr: u64, val: u8) {
        if let Some(off) = addr.checked_sub(CRB_BUFFER) {
            if (off as usize) < CRB_BUFFER_SIZE {
                self.buffer[off as usize] = val;
            }
        }
    }

    fn read32(&mut self, addr: u64) -> u32 {
        match addr - TPM_BASE_ADDRESS {
            0x0C => u32::from(self.granted),
            0x30 => 0x0000_4011,
            0x4C => u32::from(self.stuck),
            0x58 | 0x64 => CRB_BUFFER_SIZE as u32,
            0x5C | 0x68 => CRB_BUFFER as u32,
            0x60 | 0x6C => (CRB_BUFFER >> 32) as u32,
            _ => 0,
        }
    }

    fn write32(&mut self, addr: u64, val: u32) {
        match addr - TPM_BASE_ADDRESS {
            0x08 if val & 1 != 0 => self.granted = true,
            0x08 if val & 2 != 0 => self.granted = false,
            0x4C if val == 1 && !self.stuck => {
                let len = u32::from_be_bytes([
                    self.buffer[2],
                    self.buffer[3],
                    self.buffer[4],
                    self.buffer[5],
                ]) as usize;
                let command = self.buffer[..len].to_vec();
                self.tpm.submit(&command, &mut self.buffer).unwrap();
            }
            _ => {}
        }
    }

    fn delay_us(&mut self, _us: u32) {
        self.delays += 1;
    }
}

/// Register-level FIFO device backed by the emulator
struct TisSim {
    tpm: EmulatedTpm,
    active: bool,
    ready: bool,
    command: Vec<u8>,
    response: Vec<u8>,
    read_pos: usize,
}

const TIS_BURST: u16 = 8;

impl TisSim {
    fn new(tpm: EmulatedTpm) -> Self {
        Self {
            tpm,
            active: false,
            ready: false,
            command: Vec::new(),
            response: Vec::new(),
            read_pos: 0,
        }
    }

    fn expects_more(&self) -> bool {
        if self.command.len() < 6 {
            return !self.command.is_empty();
        }
        let len = u32::from_be_bytes([
            self.command[2],
            self.command[3],
            self.command[4],
            self.command[5],
        ]) as usize;
        self.command.len() < len
    }

    fn data_avail(&self) -> bool {
        self.read_pos < self.response.len()
    }
}

impl PlatformIo for TisSim {
    fn read8(&mut self, addr: u64) -> u8 {
        match addr - TPM_BASE_ADDRESS {
            0x00 if self.active => 0xA0,
            0x00 => 0x80,
            0x18 => {
                let mut sts = 0x80;
                if self.ready {
                    sts |= 0x40;
                }
                if self.data_avail() {
                    sts |= 0x10;
                }
                if self.expects_more() {
                    sts |= 0x08;
                }
                sts
            }
            0x19 => TIS_BURST.to_le_bytes()[0],
            0x1A => TIS_BURST.to_le_bytes()[1],
            0x24 => {
                let b = self.response.get(self.read_pos).copied().unwrap_or(0xFF);
                self.read_pos += 1;
                b
            }
            _ => 0xFF,
        }
    }

    fn write8(&mut self, addr: u64, val: u8) {
        match addr - TPM_BASE_ADDRESS {
            0x00 if val & 0x02 != 0 => self.active = true,
            0x00 if val & 0x20 != 0 => self.active = false,
            0x18 if val & 0x40 != 0 => {
                self.ready = true;
                self.command.clear();
                self.response.clear();
                self.read_pos = 0;
            }
            0x18 if val & 0x20 != 0 => {
                let mut rsp = vec![0u8; 4096];
                let len = self.tpm.submit(&self.command, &mut rsp).unwrap();
                rsp.truncate(len);
                self.response = rsp;
                self.read_pos = 0;
                self.ready = false;
            }
            0x24 => self.command.push(val),
            _ => {}
        }
    }

    fn read32(&mut self, addr: u64) -> u32 {
        match addr - TPM_BASE_ADDRESS {
            0x30 => 0,
            0xF00 => 0x001D_1014,
            _ => 0xFFFF_FFFF,
        }
    }

    fn write32(&mut self, _addr: u64, _val: u32) {}

    fn delay_us(&mut self, _us: u32) {}
}

fn emulator() -> EmulatedTpm {
    EmulatedTpm::new(&[SHA256, SHA384]).unwrap()
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        retries: 3,
        timeout_us: 50,
        poll_us: 10,
    }
}

fn firmware_transport() -> TpmTransport<NoPlatformIo, EmulatedTpm> {
    let mut transport = TpmTransport::with_firmware(emulator(), fast_policy());
    transport.initialize().unwrap();
    transport
}

fn measurement(data: &[u8], alg: HashAlgorithm) -> Digest {
    hash_oneshot(alg, data).unwrap()
}

/// Extend and read back through any interface
fn exercise<Io: PlatformIo, Fw: FirmwareTpm>(transport: &mut TpmTransport<Io, Fw>) {
    assert_eq!(transport.state(), TpmState::Ready);
    assert_eq!(transport.manufacturer().unwrap(), *b"AEGS");
    assert!(transport.has_pcr_bank(SHA256, &[8, 9, 10]).unwrap());

    let m1 = measurement(b"bootloader", SHA256);
    let m2 = measurement(b"config", SHA256);
    transport.pcr_extend(8, &[m1]).unwrap();
    transport.pcr_extend(8, &[m2]).unwrap();

    let expected = pcr_extend_value(
        &pcr_extend_value(&Digest::zero(SHA256), m1.as_bytes()).unwrap(),
        m2.as_bytes(),
    )
    .unwrap();
    let value = transport.pcr_read(8, SHA256).unwrap();
    assert_eq!(value.index, 8);
    assert_eq!(value.algorithm(), SHA256);
    assert_eq!(value.digest, expected);

    assert_eq!(
        transport.pcr_read(9, SHA256).unwrap().digest,
        Digest::zero(SHA256)
    );
}

#[test]
fn test_firmware_interface() {
    let mut transport = firmware_transport();
    assert_eq!(transport.interface(), Some(TpmInterface::Firmware));
    exercise(&mut transport);
}

#[test]
fn test_crb_interface() {
    let mut transport = TpmTransport::with_io(CrbSim::new(emulator()), fast_policy());
    transport.initialize().unwrap();
    assert!(matches!(transport.interface(), Some(TpmInterface::Crb(_))));
    exercise(&mut transport);
    assert!(!transport.io_mut().unwrap().granted);
}

#[test]
fn test_tis_interface() {
    let mut transport = TpmTransport::with_io(TisSim::new(emulator()), fast_policy());
    transport.initialize().unwrap();
    assert_eq!(
        transport.interface(),
        Some(TpmInterface::Tis(TisInterface::new(TPM_BASE_ADDRESS)))
    );
    exercise(&mut transport);
    assert!(!transport.io_mut().unwrap().active);
}

#[test]
fn test_crb_preferred_over_firmware() {
    let mut transport = TpmTransport::new(
        Some(CrbSim::new(emulator())),
        Some(emulator()),
        fast_policy(),
    );
    assert!(matches!(
        transport.detect_interface(),
        Ok(TpmInterface::Crb(_))
    ));
    assert_eq!(transport.state(), TpmState::InterfaceDetected);
}

#[test]
fn test_no_interface() {
    let mut transport =
        TpmTransport::<NoPlatformIo, NoFirmwareTpm>::new(Some(NoPlatformIo), None, fast_policy());
    let err = transport.initialize().unwrap_err();
    assert_eq!(err, AegisError::TPM_NO_INTERFACE);
    assert_eq!(err.kind(), ErrorKind::HardwareUnavailable);
    assert_eq!(transport.state(), TpmState::Uninitialized);
}

#[test]
fn test_lifecycle_enforced() {
    let mut transport = TpmTransport::with_firmware(emulator(), fast_policy());
    assert_eq!(
        transport.pcr_read(8, SHA256),
        Err(AegisError::TPM_INVALID_STATE)
    );
    assert_eq!(
        transport.send_command(&[0x80, 0x01, 0, 0, 0, 0x0a, 0, 0, 0x01, 0x43]),
        Err(AegisError::TPM_INVALID_STATE)
    );
    assert_eq!(
        transport.startup(wire::TPM_SU_CLEAR),
        Err(AegisError::TPM_INVALID_STATE)
    );

    transport.detect_interface().unwrap();
    assert_eq!(
        transport.detect_interface(),
        Err(AegisError::TPM_INVALID_STATE)
    );
    assert_eq!(
        transport.pcr_extend(8, &[Digest::zero(SHA256)]),
        Err(AegisError::TPM_INVALID_STATE)
    );
    transport.startup(wire::TPM_SU_CLEAR).unwrap();
    assert_eq!(transport.state(), TpmState::Started);
    transport.self_test(true).unwrap();
    assert_eq!(transport.state(), TpmState::Ready);

    transport.shutdown(wire::TPM_SU_CLEAR).unwrap();
    assert_eq!(transport.state(), TpmState::Uninitialized);
    assert_eq!(transport.interface(), None);
    assert_eq!(
        transport.pcr_read(8, SHA256),
        Err(AegisError::TPM_INVALID_STATE)
    );

    // A second boot attempt on the same device
    transport.initialize().unwrap();
    assert_eq!(transport.state(), TpmState::Ready);
}

#[test]
fn test_startup_accepts_already_started() {
    let mut tpm = emulator();
    let mut rsp = [0u8; 32];
    tpm.submit(&[0x80, 0x01, 0, 0, 0, 0x0c, 0, 0, 0x01, 0x44, 0, 0], &mut rsp)
        .unwrap();
    assert!(tpm.is_started());

    let mut transport = TpmTransport::with_firmware(tpm, fast_policy());
    transport.initialize().unwrap();
    assert_eq!(transport.state(), TpmState::Ready);
}

#[test]
fn test_warnings_are_retried() {
    let mut transport = firmware_transport();
    let fw = transport.firmware_mut().unwrap();
    fw.inject(Fault::ResponseCode(TPM_RC_RETRY), 1);
    fw.inject(Fault::ResponseCode(TPM_RC_YIELDED), 1);
    fw.inject(Fault::Timeout, 1);
    let before = fw.commands_processed();

    transport.pcr_read(8, SHA256).unwrap();
    assert_eq!(
        transport.firmware_mut().unwrap().commands_processed() - before,
        4
    );
}

#[test]
fn test_retries_are_bounded() {
    let mut transport = firmware_transport();
    let fw = transport.firmware_mut().unwrap();
    fw.inject(Fault::ResponseCode(TPM_RC_RETRY), 4);
    let before = fw.commands_processed();

    let err = transport.pcr_read(8, SHA256).unwrap_err();
    assert_eq!(err, AegisError::TPM_RETRIES_EXHAUSTED);
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(
        transport.firmware_mut().unwrap().commands_processed() - before,
        4
    );

    // Exhausting one command leaves the transport usable
    assert_eq!(transport.state(), TpmState::Ready);
    transport.pcr_read(8, SHA256).unwrap();
}

#[test]
fn test_reboot_is_fatal() {
    let mut transport = firmware_transport();
    let fw = transport.firmware_mut().unwrap();
    fw.inject(Fault::ResponseCode(TPM_RC_REBOOT), 2);
    let before = fw.commands_processed();

    let err = transport.pcr_read(8, SHA256).unwrap_err();
    assert_eq!(err, AegisError::TPM_RC_REBOOT);
    assert_eq!(err.kind(), ErrorKind::Fatal);
    assert_eq!(
        transport.firmware_mut().unwrap().commands_processed() - before,
        1
    );
}

#[test]
fn test_error_codes_map_one_to_one() {
    let mut transport = firmware_transport();
    transport
        .firmware_mut()
        .unwrap()
        .inject(Fault::ResponseCode(TPM_RC_FAILURE), 1);
    assert_eq!(
        transport.pcr_read(8, SHA256),
        Err(AegisError::TPM_RC_FAILURE)
    );

    // TPM_RC_VALUE on parameter 1
    transport
        .firmware_mut()
        .unwrap()
        .inject(Fault::ResponseCode(0x1C4), 1);
    assert_eq!(
        transport.pcr_read(8, SHA256),
        Err(AegisError::TPM_RC_VALUE)
    );
}

#[test]
fn test_crb_timeout_exhausts_retries() {
    let mut sim = CrbSim::new(emulator());
    sim.stuck = true;
    let mut transport = TpmTransport::with_io(sim, fast_policy());
    assert_eq!(transport.initialize(), Err(AegisError::TPM_RETRIES_EXHAUSTED));
    assert_eq!(transport.state(), TpmState::InterfaceDetected);
    assert!(transport.io_mut().unwrap().delays > 0);
}

#[test]
fn test_pcr_errors() {
    let mut transport = TpmTransport::with_firmware(
        EmulatedTpm::new(&[SHA256]).unwrap(),
        fast_policy(),
    );
    transport.initialize().unwrap();
    assert!(!transport.has_pcr_bank(SHA384, &[8]).unwrap());
    assert_eq!(
        transport.pcr_read(8, SHA384),
        Err(AegisError::TPM_PCR_BANK_NOT_ALLOCATED)
    );
    assert_eq!(
        transport.pcr_extend(24, &[Digest::zero(SHA256)]),
        Err(AegisError::TPM_PCR_INDEX_INVALID)
    );
    assert_eq!(
        transport.pcr_read(24, SHA256),
        Err(AegisError::TPM_PCR_INDEX_INVALID)
    );
}

#[test]
fn test_multi_bank_extend() {
    let mut transport = firmware_transport();
    let digests = [
        measurement(b"kernel", SHA256),
        measurement(b"kernel", SHA384),
    ];
    transport.pcr_extend(9, &digests).unwrap();
    for d in &digests {
        let value = transport.pcr_read(9, d.algorithm()).unwrap();
        assert_eq!(
            value.digest,
            pcr_extend_value(&Digest::zero(d.algorithm()), d.as_bytes()).unwrap()
        );
    }
}

#[test]
fn test_quote() {
    let mut transport = firmware_transport();
    for (index, data) in [(8, &b"stub"[..]), (9, &b"kernel"[..]), (10, &b"initrd"[..])] {
        transport
            .pcr_extend(index, &[measurement(data, SHA256)])
            .unwrap();
    }
    let selection = PcrSelection::from_indices(SHA256, &[8, 9, 10]).unwrap();
    let nonce = [0xA5u8; 32];
    let quote = transport
        .quote(EMULATED_AK_HANDLE, &nonce, &[selection])
        .unwrap();

    let values: Vec<Digest> = [8, 9, 10]
        .iter()
        .map(|&i| transport.pcr_read(i, SHA256).unwrap().digest)
        .collect();
    let ak = transport.firmware_mut().unwrap().ak_public();
    let info = quote.verify(&ak, &nonce, &values).unwrap();
    assert_eq!(info.pcr_selections, vec![selection]);

    assert_eq!(
        quote.verify(&ak, &[0x5Au8; 32], &values),
        Err(AegisError::TPM_QUOTE_NONCE_MISMATCH)
    );
    let stale = vec![Digest::zero(SHA256); 3];
    assert_eq!(
        quote.verify(&ak, &nonce, &stale),
        Err(AegisError::TPM_QUOTE_PCR_DIGEST_MISMATCH)
    );

    assert_eq!(
        transport
            .quote(EMULATED_AK_HANDLE, &[0u8; 65], &[selection])
            .unwrap_err(),
        AegisError::TPM_NONCE_TOO_LARGE
    );
    assert_eq!(
        transport.quote(0x8101_0003, &nonce, &[selection]),
        Err(AegisError::TPM_RC_HANDLE)
    );
}

#[test]
fn test_entropy_source() {
    let mut transport = firmware_transport();
    let mut buf = [0u8; 100];
    TpmEntropy::new(&mut transport).fill_entropy(&mut buf).unwrap();
    assert!(buf.iter().any(|&b| b != 0));

    let mut rng = Csrng::new(TpmEntropy::new(&mut transport), b"aegis").unwrap();
    assert_ne!(rng.random_u64().unwrap(), rng.random_u64().unwrap());

    let mut cold = TpmTransport::with_firmware(emulator(), fast_policy());
    assert_eq!(
        Csrng::new(TpmEntropy::new(&mut cold), b"").err(),
        Some(AegisError::DRIVER_RNG_ENTROPY_UNAVAILABLE)
    );
}


#[test]
fn test_unseal_fails_after_pcr8_extend() {
    let mut transport = firmware_transport();
    transport
        .pcr_extend(8, &[measurement(b"bootloader", SHA256)])
        .unwrap();
    let selection = PcrSelection::from_indices(SHA256, &[8, 9]).unwrap();
    let secret = b"volume unlock key";
    let blob = transport.seal(secret, &selection).unwrap();

    let stored = SealedBlob::from_bytes(&blob.to_bytes().unwrap()).unwrap();
    assert_eq!(transport.unseal(&stored).unwrap().as_slice(), secret);
    assert_eq!(transport.unseal(&blob).unwrap().as_slice(), secret);

    transport
        .pcr_extend(8, &[measurement(b"unexpected", SHA256)])
        .unwrap();
    let err = transport.unseal(&blob).unwrap_err();
    assert_eq!(err, AegisError::TPM_RC_POLICY_FAIL);
    assert_eq!(err.kind(), ErrorKind::VerificationFailed);

    // Object and session are flushed on both paths
    assert_eq!(transport.firmware_mut().unwrap().transient_handles(), 0);
}

#[test]
fn test_seal_multi_bank_selection() {
    let mut transport = firmware_transport();
    transport
        .pcr_extend(10, &[measurement(b"initrd", SHA384)])
        .unwrap();
    let selection = PcrSelection::from_indices(SHA384, &[10]).unwrap();
    let blob = transport.seal(&[0x42; MAX_SEALED_DATA], &selection).unwrap();
    assert_eq!(
        transport.unseal(&blob).unwrap().as_slice(),
        &[0x42; MAX_SEALED_DATA][..]
    );

    // The SHA-256 bank is not part of the policy
    transport
        .pcr_extend(10, &[measurement(b"initrd", SHA256)])
        .unwrap();
    assert!(transport.unseal(&blob).is_ok());
}

#[test]
fn test_seal_errors() {
    let mut transport = firmware_transport();
    let selection = PcrSelection::from_indices(SHA256, &[8]).unwrap();
    assert_eq!(
        transport.seal(&[0u8; MAX_SEALED_DATA + 1], &selection),
        Err(AegisError::TPM_SEAL_DATA_TOO_LARGE)
    );
    assert_eq!(
        transport.seal(b"secret", &PcrSelection::from_indices(SHA256, &[]).unwrap()),
        Err(AegisError::TPM_PCR_INDEX_INVALID)
    );

    let mut blob = transport.seal(b"secret", &selection).unwrap();
    let last = blob.private.len() - 1;
    blob.private[last] ^= 0x01;
    assert_eq!(transport.unseal(&blob), Err(AegisError::TPM_RC_INTEGRITY));
    assert_eq!(transport.firmware_mut().unwrap().transient_handles(), 0);

    assert_eq!(
        SealedBlob::from_bytes(&[0x00, 0x00, 0x00, 0x01]),
        Err(AegisError::TPM_SEALED_BLOB_MALFORMED)
    );

    let mut cold = TpmTransport::with_firmware(emulator(), fast_policy());
    assert_eq!(
        cold.seal(b"secret", &selection),
        Err(AegisError::TPM_INVALID_STATE)
    );
}

// Licensed under the Apache-2.0 license

use aegis_drivers::{hash_oneshot, Digest, HashAlgorithm};
use aegis_error::{AegisError, ErrorKind};
use aegis_image_verify::{ArtifactPolicy, TrustAnchorList};
use aegis_measured_boot::*;
use aegis_tpm::wire::{TPM_RC_FAILURE, TPM_RC_RETRY};
use aegis_tpm::{
    EmulatedTpm, Fault, NoFirmwareTpm, NoPlatformIo, RetryPolicy, TpmState, TpmTransport,
};
use hex_literal::hex;

const SHA256: HashAlgorithm = HashAlgorithm::Sha256;
const SHA384: HashAlgorithm = HashAlgorithm::Sha384;

const STUB_PCR8: [u8; 32] = hex!("220cee34fdd7f3cd918a35a45063e301bf55174a5bb652fe7a6a67b790fdd44d");
const CONFIG_PCR8: [u8; 32] =
    hex!("149130382784392b988154b89fe444970d9d5921c643e58a30cd637b468270eb");

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        retries: 3,
        timeout_us: 50,
        poll_us: 10,
    }
}

fn transport(banks: &[HashAlgorithm]) -> TpmTransport<NoPlatformIo, EmulatedTpm> {
    TpmTransport::with_firmware(EmulatedTpm::new(banks).unwrap(), fast_retry())
}

fn policy(banks: &[HashAlgorithm]) -> BootPolicy {
    BootPolicy {
        banks: banks.to_vec(),
        retry: fast_retry(),
        ..BootPolicy::default()
    }
}

fn device_pcr(transport: &mut TpmTransport<NoPlatformIo, EmulatedTpm>, index: u32, alg: HashAlgorithm) -> Digest {
    transport.firmware_mut().unwrap().pcr_value(index, alg).unwrap()
}

fn full_boot<'a>(
    ctx: &mut MeasuredBootContext<'a, NoPlatformIo, EmulatedTpm>,
) -> Result<(), AegisError> {
    ctx.measure_bootloader(&[1, 2, 3, 4])?;
    ctx.measure_config(b"timeout=5\n")?;
    ctx.measure_kernel(b"kernel image", "/boot/vmlinuz-6.1")?;
    ctx.measure_cmdline(b"root=/dev/sda1 ro quiet")?;
    ctx.measure_initrd(b"initrd image", "/boot/initrd.img-6.1")?;
    ctx.measure_separator()
}

#[test]
fn test_stub_and_config_into_pcr8() {
    let mut tpm = transport(&[SHA256]);
    {
        let mut ctx = MeasuredBootContext::init(Some(&mut tpm), &policy(&[SHA256])).unwrap();
        assert!(ctx.has_device());

        ctx.measure_bootloader(&[0x01, 0x02, 0x03, 0x04]).unwrap();
        assert_eq!(ctx.pcr_value(PCR_BOOTLOADER, SHA256).unwrap().as_bytes(), STUB_PCR8);

        ctx.measure_config(&[]).unwrap();
        let done = ctx.finalize().unwrap();
        assert_eq!(done.pcr_value(PCR_BOOTLOADER, SHA256).unwrap().as_bytes(), CONFIG_PCR8);

        let entries = done.ledger().entries();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.pcr_index() == PCR_BOOTLOADER));
        assert!(entries.iter().all(|e| e.event_type() == EV_IPL));
        assert_eq!(
            entries[1].digest(SHA256).unwrap().as_bytes(),
            hex!("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
        );
        assert_eq!(done.measurement_count(), 2);
        assert_eq!(done.pcr_mask(), 1 << PCR_BOOTLOADER);
    }
    assert_eq!(device_pcr(&mut tpm, 8, SHA256).as_bytes(), CONFIG_PCR8);
    assert_eq!(device_pcr(&mut tpm, 9, SHA256), Digest::zero(SHA256));
}

#[test]
fn test_ledger_full_leaves_no_partial_entry() {
    let mut ledger = MeasurementLedger::init(8).unwrap();
    let digest = hash_oneshot(SHA256, b"event").unwrap();
    for _ in 0..8 {
        ledger
            .append(LedgerEntry::new(8, EV_IPL, &[digest], b"event").unwrap())
            .unwrap();
    }
    assert_eq!(
        ledger.append(LedgerEntry::new(8, EV_IPL, &[digest], b"overflow").unwrap()),
        Err(AegisError::LEDGER_FULL)
    );
    assert_eq!(ledger.len(), 8);
    assert!(ledger.entries().iter().all(|e| e.event_data() == b"event"));
}

#[test]
fn test_ledger_full_aborts_before_extend() {
    let mut tpm = transport(&[SHA256]);
    {
        let boot_policy = BootPolicy {
            ledger_capacity: 4,
            ..policy(&[SHA256])
        };
        let mut ctx = MeasuredBootContext::init(Some(&mut tpm), &boot_policy).unwrap();
        ctx.measure_bootloader(b"bootloader").unwrap();
        ctx.measure_config(b"config").unwrap();
        ctx.measure_kernel(b"kernel", "/boot/vmlinuz").unwrap();
        ctx.measure_cmdline(b"quiet").unwrap();
        assert_eq!(
            ctx.measure_initrd(b"initrd", "/boot/initrd"),
            Err(AegisError::LEDGER_FULL)
        );
        assert_eq!(ctx.abort_reason(), Some(AegisError::LEDGER_FULL));
        assert!(ctx.ledger().is_empty());
    }
    assert_eq!(device_pcr(&mut tpm, 10, SHA256), Digest::zero(SHA256));
}

#[test]
fn test_full_boot_matches_device() {
    let mut tpm = transport(&[SHA256, SHA384]);
    let mut expected = Vec::new();
    {
        let mut ctx = MeasuredBootContext::init(Some(&mut tpm), &policy(&[SHA256, SHA384])).unwrap();
        full_boot(&mut ctx).unwrap();
        assert_eq!(ctx.last_stage(), Some(BootStage::Separator));
        let done = ctx.finalize().unwrap();

        assert_eq!(done.ledger().len(), 8);
        assert_eq!(done.measurement_count(), 8);
        assert_eq!(done.pcr_mask(), 0b111 << 8);
        assert_eq!(done.boot_path(), "/boot/vmlinuz-6.1");

        for alg in [SHA256, SHA384] {
            let replayed = done.expected_pcr_values(alg, &[10, 8, 9, 8]).unwrap();
            assert_eq!(replayed.len(), 3);
            for (index, value) in MEASURED_PCRS.iter().zip(&replayed) {
                assert_eq!(done.pcr_value(*index, alg).as_ref(), Some(value));
            }
            expected.push((alg, replayed));
        }

        let entries = done.ledger().entries();
        assert_eq!(entries[2].event_data(), b"/boot/vmlinuz-6.1");
        assert_eq!(entries[3].event_data(), b"root=/dev/sda1 ro quiet");
        assert_eq!(
            entries[3].digest(SHA256),
            Some(&hash_oneshot(SHA256, b"root=/dev/sda1 ro quiet").unwrap())
        );
        let separators: Vec<u32> = entries
            .iter()
            .filter(|e| e.event_type() == EV_SEPARATOR)
            .map(|e| e.pcr_index())
            .collect();
        assert_eq!(separators, vec![8, 9, 10]);
    }
    for (alg, values) in expected {
        for (index, value) in MEASURED_PCRS.iter().zip(values) {
            assert_eq!(device_pcr(&mut tpm, *index, alg), value);
        }
    }
}

#[test]
fn test_out_of_order_aborts_attempt() {
    let mut tpm = transport(&[SHA256]);
    let mut ctx = MeasuredBootContext::init(Some(&mut tpm), &policy(&[SHA256])).unwrap();
    ctx.measure_bootloader(b"bootloader").unwrap();
    ctx.measure_kernel(b"kernel", "/boot/vmlinuz").unwrap();
    assert_eq!(
        ctx.measure_config(b"config"),
        Err(AegisError::MEASURED_BOOT_OUT_OF_ORDER)
    );
    assert!(ctx.is_aborted());
    assert!(ctx.ledger().is_empty());
    assert_eq!(ctx.pcr_value(8, SHA256), Some(Digest::zero(SHA256)));
    assert_eq!(
        ctx.measure_separator(),
        Err(AegisError::MEASURED_BOOT_ABORTED)
    );
    assert_eq!(ctx.finalize().err(), Some(AegisError::MEASURED_BOOT_ABORTED));
}

#[test]
fn test_stages_may_be_skipped() {
    let mut ctx = MeasuredBootContext::<NoPlatformIo, NoFirmwareTpm>::init(
        None,
        &BootPolicy {
            hardware: HardwarePolicy::HashOnly,
            ..BootPolicy::default()
        },
    )
    .unwrap();
    ctx.measure_bootloader(b"bootloader").unwrap();
    ctx.measure_kernel(b"kernel", "/vmlinuz").unwrap();
    ctx.measure_separator().unwrap();
    let done = ctx.finalize().unwrap();
    assert_eq!(done.ledger().len(), 5);
    assert_eq!(
        done.pcr_value(PCR_INITRD, SHA256),
        Some(
            aegis_drivers::pcr_extend_value(
                &Digest::zero(SHA256),
                hash_oneshot(SHA256, &SEPARATOR_EVENT_DATA).unwrap().as_bytes()
            )
            .unwrap()
        )
    );
}

#[test]
fn test_missing_device_policy() {
    let fail_closed = BootPolicy::default();
    assert_eq!(
        MeasuredBootContext::<NoPlatformIo, NoFirmwareTpm>::init(None, &fail_closed).err(),
        Some(AegisError::MEASURED_BOOT_NO_DEVICE)
    );

    let mut silent = TpmTransport::<NoPlatformIo, NoFirmwareTpm>::new(None, None, fast_retry());
    let err = MeasuredBootContext::init(Some(&mut silent), &fail_closed).err().unwrap();
    assert_eq!(err, AegisError::TPM_NO_INTERFACE);
    assert_eq!(err.kind(), ErrorKind::HardwareUnavailable);

    let hash_only = BootPolicy {
        hardware: HardwarePolicy::HashOnly,
        ..BootPolicy::default()
    };
    let mut silent = TpmTransport::<NoPlatformIo, NoFirmwareTpm>::new(None, None, fast_retry());
    let mut ctx = MeasuredBootContext::init(Some(&mut silent), &hash_only).unwrap();
    assert!(!ctx.has_device());
    ctx.measure_bootloader(&[1, 2, 3, 4]).unwrap();
    let mut done = ctx.finalize().unwrap();
    assert_eq!(done.pcr_value(8, SHA256).unwrap().as_bytes(), STUB_PCR8);
    assert_eq!(done.device_pcr(8, SHA256), Err(AegisError::MEASURED_BOOT_NO_DEVICE));
    assert_eq!(
        done.attest(&[1u8; 16], &[8]).err(),
        Some(AegisError::MEASURED_BOOT_NO_DEVICE)
    );
}

#[test]
fn test_hash_only_does_not_mask_device_faults() {
    let hash_only = BootPolicy {
        hardware: HardwarePolicy::HashOnly,
        ..policy(&[SHA256])
    };

    let mut tpm = transport(&[SHA256]);
    tpm.initialize().unwrap();
    tpm.firmware_mut()
        .unwrap()
        .inject(Fault::ResponseCode(TPM_RC_FAILURE), 1);
    assert_eq!(
        MeasuredBootContext::init(Some(&mut tpm), &hash_only).err(),
        Some(AegisError::TPM_RC_FAILURE)
    );

    let mut tpm = transport(&[SHA256]);
    tpm.initialize().unwrap();
    tpm.firmware_mut().unwrap().inject(Fault::Timeout, 4);
    assert_eq!(
        MeasuredBootContext::init(Some(&mut tpm), &hash_only).err(),
        Some(AegisError::TPM_RETRIES_EXHAUSTED)
    );
}

#[test]
fn test_warning_responses_are_retried() {
    let mut tpm = transport(&[SHA256]);
    tpm.initialize().unwrap();
    tpm.firmware_mut()
        .unwrap()
        .inject(Fault::ResponseCode(TPM_RC_RETRY), 2);
    let mut ctx = MeasuredBootContext::init(Some(&mut tpm), &policy(&[SHA256])).unwrap();
    ctx.measure_bootloader(&[1, 2, 3, 4]).unwrap();
    assert_eq!(ctx.pcr_value(8, SHA256).unwrap().as_bytes(), STUB_PCR8);
}

#[test]
fn test_device_initialized_on_demand() {
    let mut tpm = transport(&[SHA256]);
    assert_eq!(tpm.state(), TpmState::Uninitialized);
    drop(MeasuredBootContext::init(Some(&mut tpm), &policy(&[SHA256])).unwrap());
    assert_eq!(tpm.state(), TpmState::Ready);
}

#[test]
fn test_bank_not_allocated() {
    let mut tpm = transport(&[SHA256]);
    assert_eq!(
        MeasuredBootContext::init(Some(&mut tpm), &policy(&[SHA256, SHA384])).err(),
        Some(AegisError::MEASURED_BOOT_UNSUPPORTED_BANK)
    );
    assert_eq!(
        MeasuredBootContext::init(Some(&mut tpm), &policy(&[])).err(),
        Some(AegisError::MEASURED_BOOT_UNSUPPORTED_BANK)
    );
}

#[test]
fn test_stale_pcrs_detected() {
    let mut tpm = transport(&[SHA256]);
    tpm.initialize().unwrap();
    tpm.pcr_extend(9, &[hash_oneshot(SHA256, b"earlier").unwrap()])
        .unwrap();
    assert_eq!(
        MeasuredBootContext::init(Some(&mut tpm), &policy(&[SHA256])).err(),
        Some(AegisError::MEASURED_BOOT_PCR_MISMATCH)
    );

    let relaxed = BootPolicy {
        verify_extends: false,
        ..policy(&[SHA256])
    };
    assert!(MeasuredBootContext::init(Some(&mut tpm), &relaxed).is_ok());
}

#[test]
fn test_attestation_quote() {
    let mut tpm = transport(&[SHA256]);
    let ak = tpm.firmware_mut().unwrap().ak_public();
    let mut ctx = MeasuredBootContext::init(Some(&mut tpm), &policy(&[SHA256])).unwrap();
    full_boot(&mut ctx).unwrap();
    let mut done = ctx.finalize().unwrap();

    let nonce = [0x5Au8; 32];
    let quote = done.attest(&nonce, &[8, 9, 10]).unwrap();
    let expected = done.expected_pcr_values(SHA256, &[8, 9, 10]).unwrap();
    let info = quote.verify(&ak, &nonce, &expected).unwrap();
    assert_eq!(info.extra_data, nonce);

    assert_eq!(
        quote.verify(&ak, &nonce, &[Digest::zero(SHA256); 3]),
        Err(AegisError::TPM_QUOTE_PCR_DIGEST_MISMATCH)
    );
    assert_eq!(
        done.attest(&[], &[8]).err(),
        Some(AegisError::MEASURED_BOOT_INVALID_NONCE)
    );
    assert_eq!(
        done.attest(&[0u8; 65], &[8]).err(),
        Some(AegisError::MEASURED_BOOT_INVALID_NONCE)
    );
    assert_eq!(
        done.attest(&nonce, &[]).err(),
        Some(AegisError::MEASURED_BOOT_INVALID_PCR_SELECTION)
    );
    assert_eq!(
        done.attest(&nonce, &[24]).err(),
        Some(AegisError::MEASURED_BOOT_INVALID_PCR_SELECTION)
    );
}

#[test]
fn test_event_log_round_trip() {
    let mut tpm = transport(&[SHA256, SHA384]);
    let mut ctx = MeasuredBootContext::init(Some(&mut tpm), &policy(&[SHA256, SHA384])).unwrap();
    full_boot(&mut ctx).unwrap();
    let done = ctx.finalize().unwrap();

    let log = done.event_log().unwrap();
    assert_eq!(log.len(), done.ledger().serialized_len());
    let parsed = MeasurementLedger::parse(&log).unwrap();
    assert!(parsed.is_sealed());
    assert_eq!(parsed.entries(), done.ledger().entries());
    for index in MEASURED_PCRS {
        assert_eq!(
            parsed.replay(index, SHA384).unwrap(),
            done.pcr_value(index, SHA384).unwrap()
        );
    }
    assert_eq!(
        MeasurementLedger::parse(&log[..log.len() - 1]).err(),
        Some(AegisError::LEDGER_LOG_TRUNCATED)
    );
}

fn known_hash_anchors() -> TrustAnchorList {
    TrustAnchorList::from_config(
        "hash.stub = sha256:9f64a747e1b97f131fabb6b447296c9b6f0201e79fb3c5356e6c77e89b6a806a\n\
         hash.config = sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855\n",
    )
    .unwrap()
}

#[test]
fn test_boot_chain_admits_known_artifacts() {
    let mut tpm = transport(&[SHA256]);
    {
        let stub_policy = ArtifactPolicy::known_hash("stub").unwrap();
        let config_policy = ArtifactPolicy::known_hash("config").unwrap();
        let mut chain =
            BootChain::start(Some(&mut tpm), &policy(&[SHA256]), known_hash_anchors(), 0).unwrap();
        chain
            .load(BootStage::Bootloader, &BootArtifact::new(&[1, 2, 3, 4], &stub_policy))
            .unwrap();
        chain
            .load(BootStage::Config, &BootArtifact::new(&[], &config_policy))
            .unwrap();
        assert_eq!(
            chain.context().pcr_value(8, SHA256).unwrap().as_bytes(),
            CONFIG_PCR8
        );
        assert_eq!(
            chain.load(BootStage::Separator, &BootArtifact::new(&[], &config_policy)),
            Err(AegisError::MEASURED_BOOT_OUT_OF_ORDER)
        );

        let done = chain.finish().unwrap();
        assert_eq!(done.ledger().len(), 5);
        assert!(done.ledger().is_sealed());
    }
    assert_eq!(
        device_pcr(&mut tpm, 8, SHA256),
        aegis_drivers::pcr_extend_value(
            &Digest::new(SHA256, &CONFIG_PCR8).unwrap(),
            hash_oneshot(SHA256, &SEPARATOR_EVENT_DATA).unwrap().as_bytes()
        )
        .unwrap()
    );
}

#[test]
fn test_boot_chain_denial_aborts() {
    let mut tpm = transport(&[SHA256]);
    let stub_policy = ArtifactPolicy::known_hash("stub").unwrap();
    let kernel_policy = ArtifactPolicy::known_hash("kernel").unwrap();
    let mut chain =
        BootChain::start(Some(&mut tpm), &policy(&[SHA256]), known_hash_anchors(), 0).unwrap();

    assert_eq!(
        chain.load(BootStage::Bootloader, &BootArtifact::new(&[9, 9, 9, 9], &stub_policy)),
        Err(AegisError::IMAGE_VERIFIER_HASH_MISMATCH)
    );
    assert!(chain.context().is_aborted());
    assert_eq!(
        chain.load(
            BootStage::Kernel,
            &BootArtifact::new(b"kernel", &kernel_policy).with_path("/boot/vmlinuz")
        ),
        Err(AegisError::MEASURED_BOOT_ABORTED)
    );
    assert_eq!(chain.finish().err(), Some(AegisError::MEASURED_BOOT_ABORTED));
}

#[test]
fn test_boot_chain_unknown_artifact_denied() {
    let kernel_policy = ArtifactPolicy::known_hash("kernel").unwrap();
    let hash_only = BootPolicy {
        hardware: HardwarePolicy::HashOnly,
        ..BootPolicy::default()
    };
    let mut chain = BootChain::<NoPlatformIo, NoFirmwareTpm>::start(
        None,
        &hash_only,
        known_hash_anchors(),
        0,
    )
    .unwrap();
    assert_eq!(
        chain.load(BootStage::Kernel, &BootArtifact::new(b"kernel", &kernel_policy)),
        Err(AegisError::IMAGE_VERIFIER_TRUST_ANCHOR_MISSING)
    );
    assert_eq!(chain.context().ledger().len(), 0);
}

#[test]
fn test_boot_policy_from_config() {
    let boot_policy = BootPolicy::from_config(
        "tpm.unavailable = hash-only\nledger.capacity = 16\npcr.banks = sha256,sha384\n",
    )
    .unwrap();
    assert_eq!(boot_policy.hardware, HardwarePolicy::HashOnly);
    assert_eq!(boot_policy.ledger_capacity, 16);
    assert_eq!(boot_policy.banks, vec![SHA256, SHA384]);

    let mut tpm = transport(&[SHA256, SHA384]);
    let mut ctx = MeasuredBootContext::init(Some(&mut tpm), &boot_policy).unwrap();
    full_boot(&mut ctx).unwrap();
    assert_eq!(ctx.ledger().remaining(), 8);
}

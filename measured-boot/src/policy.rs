/*++

Licensed under the Apache-2.0 license.

File Name:

    policy.rs

Abstract:

    Boot policy: trust-anchor hardware absence handling, ledger capacity,
    transport retry budget and PCR banks, loaded from key = value
    configuration.

--*/

use aegis_drivers::HashAlgorithm;
use aegis_error::{AegisError, AegisResult};
use aegis_image_verify::{parse_bool, parse_u64, ConfigReader, Validator};
use aegis_tpm::RetryPolicy;
use alloc::vec;
use alloc::vec::Vec;

/// Conventional persistent handle of the attestation key
pub const DEFAULT_AK_HANDLE: u32 = 0x8101_0002;

const LEDGER_CAPACITY_RANGE: Validator = Validator::range(8, 1024);
const TPM_RETRIES_RANGE: Validator = Validator::range(1, 16);
const TPM_TIMEOUT_RANGE: Validator = Validator::range(1_000, 10_000_000);
const TPM_POLL_RANGE: Validator = Validator::range(1, 100_000);
const PERSISTENT_HANDLE_RANGE: Validator = Validator::range(0x8100_0000, 0x81FF_FFFF);

/// Reaction to a missing or unresponsive trust-anchor device
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum HardwarePolicy {
    /// Abort the boot attempt
    FailClosed,

    /// Continue with secure boot and a software-only ledger
    HashOnly,
}

impl HardwarePolicy {
    pub fn from_name(name: &str) -> AegisResult<Self> {
        match name {
            "fail-closed" => Ok(HardwarePolicy::FailClosed),
            "hash-only" => Ok(HardwarePolicy::HashOnly),
            _ => Err(AegisError::CONFIG_INVALID_VALUE),
        }
    }
}

/// Policy for one boot attempt
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BootPolicy {
    /// `tpm.unavailable`
    pub hardware: HardwarePolicy,

    /// `ledger.capacity`
    pub ledger_capacity: usize,

    /// `tpm.retries`, `tpm.timeout_us`, `tpm.poll_us`
    pub retry: RetryPolicy,

    /// `pcr.banks`, extended in this order
    pub banks: Vec<HashAlgorithm>,

    /// `measure.verify_extends`
    pub verify_extends: bool,

    /// `attest.key_handle`
    pub ak_handle: u32,
}

impl Default for BootPolicy {
    fn default() -> Self {
        Self {
            hardware: HardwarePolicy::FailClosed,
            ledger_capacity: 64,
            retry: RetryPolicy::default(),
            banks: vec![HashAlgorithm::Sha256],
            verify_extends: true,
            ak_handle: DEFAULT_AK_HANDLE,
        }
    }
}

fn ranged(value: &str, range: Validator) -> AegisResult<u64> {
    let value = parse_u64(value)?;
    if range.admits(value) {
        Ok(value)
    } else {
        Err(AegisError::CONFIG_VALUE_OUT_OF_RANGE)
    }
}

fn parse_banks(value: &str) -> AegisResult<Vec<HashAlgorithm>> {
    let mut banks = Vec::new();
    for name in value.split(',').map(str::trim) {
        let alg = HashAlgorithm::from_name(name).map_err(|_| AegisError::CONFIG_INVALID_VALUE)?;
        if alg.tpm_alg_id().is_none() || banks.contains(&alg) {
            return Err(AegisError::CONFIG_INVALID_VALUE);
        }
        banks.push(alg);
    }
    Ok(banks)
}

impl BootPolicy {
    /// Load a policy from configuration text
    ///
    /// Keys not present keep their default. Every key may appear once.
    ///
    /// | Key                      | Value                                   |
    /// |--------------------------|-----------------------------------------|
    /// | `tpm.unavailable`        | `fail-closed` or `hash-only`            |
    /// | `ledger.capacity`        | 8 to 1024                               |
    /// | `tpm.retries`            | 1 to 16                                 |
    /// | `tpm.timeout_us`         | 1000 to 10000000                        |
    /// | `tpm.poll_us`            | 1 to 100000, at most `tpm.timeout_us`   |
    /// | `pcr.banks`              | comma separated, e.g. `sha256,sha384`   |
    /// | `measure.verify_extends` | `true` or `false`                       |
    /// | `attest.key_handle`      | persistent handle, e.g. `0x81010002`    |
    pub fn from_config(text: &str) -> AegisResult<Self> {
        let mut policy = Self::default();
        let mut seen: Vec<&str> = Vec::new();

        for entry in ConfigReader::new(text) {
            let entry = entry?;
            if seen.contains(&entry.key) {
                log::warn!("[policy] line {}: duplicate key {}", entry.line, entry.key);
                return Err(AegisError::CONFIG_DUPLICATE_KEY);
            }
            seen.push(entry.key);

            let value = entry.value;
            let result = match entry.key {
                "tpm.unavailable" => HardwarePolicy::from_name(value).map(|v| policy.hardware = v),
                "ledger.capacity" => {
                    ranged(value, LEDGER_CAPACITY_RANGE).map(|v| policy.ledger_capacity = v as usize)
                }
                "tpm.retries" => ranged(value, TPM_RETRIES_RANGE).map(|v| policy.retry.retries = v as u32),
                "tpm.timeout_us" => {
                    ranged(value, TPM_TIMEOUT_RANGE).map(|v| policy.retry.timeout_us = v as u32)
                }
                "tpm.poll_us" => ranged(value, TPM_POLL_RANGE).map(|v| policy.retry.poll_us = v as u32),
                "pcr.banks" => parse_banks(value).map(|v| policy.banks = v),
                "measure.verify_extends" => parse_bool(value).map(|v| policy.verify_extends = v),
                "attest.key_handle" => {
                    ranged(value, PERSISTENT_HANDLE_RANGE).map(|v| policy.ak_handle = v as u32)
                }
                _ => Err(AegisError::CONFIG_UNKNOWN_KEY),
            };
            if let Err(err) = result {
                log::warn!("[policy] line {}: {} rejected: {}", entry.line, entry.key, err);
                return Err(err);
            }
        }

        if policy.retry.poll_us > policy.retry.timeout_us {
            log::warn!("[policy] tpm.poll_us exceeds tpm.timeout_us");
            return Err(AegisError::CONFIG_VALUE_OUT_OF_RANGE);
        }
        Ok(policy)
    }
}

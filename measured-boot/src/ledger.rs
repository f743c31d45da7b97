/*++

Licensed under the Apache-2.0 license.

File Name:

    ledger.rs

Abstract:

    Append-only, fixed-capacity measurement ledger. Entries are immutable
    once appended and the ledger can be sealed against further appends.

--*/

use aegis_drivers::{pcr_extend_value, Digest, HashAlgorithm};
use aegis_error::{AegisError, AegisResult};
use alloc::vec::Vec;
use zeroize::Zeroize;

/// Event type of a measurement that is logged but never extended
pub const EV_NO_ACTION: u32 = 0x0000_0003;

/// Event type separating pre-OS measurements from what follows
pub const EV_SEPARATOR: u32 = 0x0000_0004;

/// Event type of an initial program loader measurement
pub const EV_IPL: u32 = 0x0000_000D;

/// Largest event data carried by one entry
pub const MAX_EVENT_DATA_SIZE: usize = 4096;

/// Largest number of banks one entry may carry digests for
pub const MAX_DIGESTS_PER_EVENT: usize = 4;

/// One measured event
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LedgerEntry {
    pcr_index: u32,
    event_type: u32,
    digests: Vec<Digest>,
    event_data: Vec<u8>,
}

impl LedgerEntry {
    /// Create an entry
    ///
    /// # Arguments
    ///
    /// * `pcr_index` - Register the digests are extended into
    /// * `event_type` - TCG event type
    /// * `digests` - One digest per bank, each bank at most once
    /// * `event_data` - Event description, at most `MAX_EVENT_DATA_SIZE` bytes
    pub fn new(
        pcr_index: u32,
        event_type: u32,
        digests: &[Digest],
        event_data: &[u8],
    ) -> AegisResult<Self> {
        if digests.is_empty() || digests.len() > MAX_DIGESTS_PER_EVENT {
            return Err(AegisError::LEDGER_INVALID_DIGESTS);
        }
        for (i, digest) in digests.iter().enumerate() {
            let alg = digest.algorithm();
            if alg.tpm_alg_id().is_none()
                || digests[..i].iter().any(|d| d.algorithm() == alg)
            {
                return Err(AegisError::LEDGER_INVALID_DIGESTS);
            }
        }
        if event_data.len() > MAX_EVENT_DATA_SIZE {
            return Err(AegisError::LEDGER_EVENT_DATA_TOO_LARGE);
        }
        Ok(Self {
            pcr_index,
            event_type,
            digests: digests.to_vec(),
            event_data: event_data.to_vec(),
        })
    }

    pub fn pcr_index(&self) -> u32 {
        self.pcr_index
    }

    pub fn event_type(&self) -> u32 {
        self.event_type
    }

    pub fn digests(&self) -> &[Digest] {
        &self.digests
    }

    /// Digest recorded for the `alg` bank
    pub fn digest(&self, alg: HashAlgorithm) -> Option<&Digest> {
        self.digests.iter().find(|d| d.algorithm() == alg)
    }

    pub fn event_data(&self) -> &[u8] {
        &self.event_data
    }
}

impl Zeroize for LedgerEntry {
    fn zeroize(&mut self) {
        self.pcr_index = 0;
        self.event_type = 0;
        self.digests.iter_mut().for_each(Zeroize::zeroize);
        self.digests.clear();
        self.event_data.zeroize();
    }
}

/// Measurement ledger
///
/// The buffer is reserved up front and never grows past the capacity given
/// to `init`; an append beyond it fails with `LEDGER_FULL` and leaves the
/// ledger unchanged.
#[derive(Debug, Default)]
pub struct MeasurementLedger {
    entries: Vec<LedgerEntry>,
    capacity: usize,
    sealed: bool,
}

impl MeasurementLedger {
    /// Create a ledger holding at most `capacity` entries
    pub fn init(capacity: usize) -> AegisResult<Self> {
        if capacity == 0 {
            return Err(AegisError::LEDGER_INVALID_CAPACITY);
        }
        Ok(Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            sealed: false,
        })
    }

    /// Append an entry
    pub fn append(&mut self, entry: LedgerEntry) -> AegisResult<()> {
        if self.sealed {
            return Err(AegisError::LEDGER_SEALED);
        }
        if self.is_full() {
            log::error!(
                "[ledger] full at {} entries, PCR{} event dropped",
                self.capacity,
                entry.pcr_index
            );
            return Err(AegisError::LEDGER_FULL);
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries that can still be appended
    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.entries.len())
    }

    pub fn is_full(&self) -> bool {
        self.remaining() == 0
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Seal the ledger. Further appends fail with `LEDGER_SEALED`.
    ///
    /// # Returns
    ///
    /// * `&[LedgerEntry]` - Entries in append order
    pub fn finalize(&mut self) -> AegisResult<&[LedgerEntry]> {
        if self.sealed {
            return Err(AegisError::LEDGER_SEALED);
        }
        self.sealed = true;
        log::info!("[ledger] sealed with {} entries", self.entries.len());
        Ok(&self.entries)
    }

    /// Hash algorithms recorded in the ledger, in order of first appearance
    pub fn algorithms(&self) -> Vec<HashAlgorithm> {
        let mut algs = Vec::new();
        for digest in self.entries.iter().flat_map(|e| e.digests.iter()) {
            if !algs.contains(&digest.algorithm()) {
                algs.push(digest.algorithm());
            }
        }
        algs
    }

    /// Recompute the value of one register from the recorded digests
    ///
    /// # Arguments
    ///
    /// * `pcr_index` - Register to replay
    /// * `alg` - Bank to replay
    ///
    /// # Returns
    ///
    /// * `Digest` - Register value expected after every event, starting from zero
    pub fn replay(&self, pcr_index: u32, alg: HashAlgorithm) -> AegisResult<Digest> {
        let mut value = Digest::zero(alg);
        for entry in self
            .entries
            .iter()
            .filter(|e| e.pcr_index == pcr_index && e.event_type != EV_NO_ACTION)
        {
            let digest = entry.digest(alg).ok_or(AegisError::LEDGER_INVALID_DIGESTS)?;
            value = pcr_extend_value(&value, digest.as_bytes())?;
        }
        Ok(value)
    }

    pub(crate) fn from_parts(entries: Vec<LedgerEntry>, sealed: bool) -> Self {
        Self {
            capacity: entries.len().max(1),
            entries,
            sealed,
        }
    }
}

impl Zeroize for MeasurementLedger {
    fn zeroize(&mut self) {
        self.entries.iter_mut().for_each(Zeroize::zeroize);
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_drivers::hash_oneshot;
    use hex_literal::hex;

    fn sha256(data: &[u8]) -> Digest {
        hash_oneshot(HashAlgorithm::Sha256, data).unwrap()
    }

    fn entry(pcr: u32, data: &[u8]) -> LedgerEntry {
        LedgerEntry::new(pcr, EV_IPL, &[sha256(data)], b"test").unwrap()
    }

    #[test]
    fn test_entry_validation() {
        let d = sha256(b"x");
        assert_eq!(
            LedgerEntry::new(8, EV_IPL, &[], b""),
            Err(AegisError::LEDGER_INVALID_DIGESTS)
        );
        assert_eq!(
            LedgerEntry::new(8, EV_IPL, &[d, d], b""),
            Err(AegisError::LEDGER_INVALID_DIGESTS)
        );
        let blake = hash_oneshot(HashAlgorithm::Blake2b, b"x").unwrap();
        assert_eq!(
            LedgerEntry::new(8, EV_IPL, &[blake], b""),
            Err(AegisError::LEDGER_INVALID_DIGESTS)
        );
        assert_eq!(
            LedgerEntry::new(8, EV_IPL, &[d], &[0u8; MAX_EVENT_DATA_SIZE + 1]),
            Err(AegisError::LEDGER_EVENT_DATA_TOO_LARGE)
        );
        let sha384 = hash_oneshot(HashAlgorithm::Sha384, b"x").unwrap();
        let e = LedgerEntry::new(9, EV_IPL, &[d, sha384], b"kernel").unwrap();
        assert_eq!(e.digest(HashAlgorithm::Sha384), Some(&sha384));
        assert_eq!(e.digest(HashAlgorithm::Sha512), None);
    }

    #[test]
    fn test_zero_capacity() {
        assert_eq!(
            MeasurementLedger::init(0).unwrap_err(),
            AegisError::LEDGER_INVALID_CAPACITY
        );
    }

    #[test]
    fn test_full_leaves_no_partial_entry() {
        let mut ledger = MeasurementLedger::init(2).unwrap();
        ledger.append(entry(8, b"a")).unwrap();
        ledger.append(entry(8, b"b")).unwrap();
        assert!(ledger.is_full());
        let before = ledger.entries().to_vec();

        assert_eq!(ledger.append(entry(9, b"c")), Err(AegisError::LEDGER_FULL));
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.entries(), &before[..]);
    }

    #[test]
    fn test_sealed() {
        let mut ledger = MeasurementLedger::init(4).unwrap();
        ledger.append(entry(8, b"a")).unwrap();
        assert_eq!(ledger.finalize().unwrap().len(), 1);
        assert!(ledger.is_sealed());
        assert_eq!(ledger.append(entry(8, b"b")), Err(AegisError::LEDGER_SEALED));
        assert_eq!(ledger.finalize().unwrap_err(), AegisError::LEDGER_SEALED);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_replay() {
        let mut ledger = MeasurementLedger::init(8).unwrap();
        ledger.append(entry(8, &[1, 2, 3, 4])).unwrap();
        ledger
            .append(LedgerEntry::new(8, EV_NO_ACTION, &[sha256(b"ignored")], b"").unwrap())
            .unwrap();
        ledger.append(entry(9, b"kernel")).unwrap();
        ledger.append(entry(8, b"")).unwrap();

        assert_eq!(
            ledger.replay(8, HashAlgorithm::Sha256).unwrap().as_bytes(),
            hex!("149130382784392b988154b89fe444970d9d5921c643e58a30cd637b468270eb")
        );
        assert_eq!(
            ledger.replay(10, HashAlgorithm::Sha256).unwrap(),
            Digest::zero(HashAlgorithm::Sha256)
        );
        assert_eq!(
            ledger.replay(8, HashAlgorithm::Sha384),
            Err(AegisError::LEDGER_INVALID_DIGESTS)
        );
        assert_eq!(ledger.algorithms(), vec![HashAlgorithm::Sha256]);
    }

    #[test]
    fn test_zeroize() {
        let mut ledger = MeasurementLedger::init(2).unwrap();
        ledger.append(entry(8, b"a")).unwrap();
        ledger.zeroize();
        assert!(ledger.is_empty());
        assert_eq!(ledger.capacity(), 2);
    }
}

/*++

Licensed under the Apache-2.0 license.

File Name:

    tcg_log.rs

Abstract:

    TCG crypto-agile event log encoding and decoding of a measurement
    ledger (TCG PC Client Platform Firmware Profile, section 10).

--*/

use crate::ledger::{LedgerEntry, MeasurementLedger, EV_NO_ACTION};
use aegis_drivers::{Digest, HashAlgorithm};
use aegis_error::{AegisError, AegisResult};
use alloc::vec;
use alloc::vec::Vec;

/// `TCG_EfiSpecIDEvent.signature`
pub const SPEC_ID_SIGNATURE: [u8; 16] = *b"Spec ID Event03\0";

/// SHA-1 sized digest field of the legacy header event
const LEGACY_DIGEST_SIZE: usize = 20;

const SPEC_VERSION_MINOR: u8 = 0;
const SPEC_VERSION_MAJOR: u8 = 2;
const SPEC_ERRATA: u8 = 0;

/// UINTN is 64 bits
const UINTN_SIZE: u8 = 2;

// Offsets within the TCG_EfiSpecIDEvent body
const SPEC_ID_FIXED_SIZE: usize = 16 + 4 + 1 + 1 + 1 + 1 + 4;

/// Serialized size of the legacy `TCG_PCR_EVENT` header, event data excluded
const LEGACY_EVENT_HEADER_SIZE: usize = 4 + 4 + LEGACY_DIGEST_SIZE + 4;

fn spec_id_event_size(algs: &[HashAlgorithm]) -> usize {
    SPEC_ID_FIXED_SIZE + algs.len() * 4 + 1
}

fn event2_size(entry: &LedgerEntry) -> usize {
    4 + 4 + 4
        + entry
            .digests()
            .iter()
            .map(|d| 2 + d.len())
            .sum::<usize>()
        + 4
        + entry.event_data().len()
}

fn log_algorithms(ledger: &MeasurementLedger) -> Vec<HashAlgorithm> {
    let algs = ledger.algorithms();
    if algs.is_empty() {
        vec![HashAlgorithm::Sha256]
    } else {
        algs
    }
}

/// Little-endian writer over a caller supplied buffer
struct LogWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl LogWriter<'_> {
    fn bytes(&mut self, data: &[u8]) -> AegisResult<()> {
        let end = self
            .pos
            .checked_add(data.len())
            .ok_or(AegisError::LEDGER_BUFFER_TOO_SMALL)?;
        self.buf
            .get_mut(self.pos..end)
            .ok_or(AegisError::LEDGER_BUFFER_TOO_SMALL)?
            .copy_from_slice(data);
        self.pos = end;
        Ok(())
    }

    fn u8(&mut self, v: u8) -> AegisResult<()> {
        self.bytes(&[v])
    }

    fn u16(&mut self, v: u16) -> AegisResult<()> {
        self.bytes(&v.to_le_bytes())
    }

    fn u32(&mut self, v: u32) -> AegisResult<()> {
        self.bytes(&v.to_le_bytes())
    }
}

/// Little-endian reader, running out of input is `LEDGER_LOG_TRUNCATED`
struct LogReader<'a> {
    data: &'a [u8],
}

impl<'a> LogReader<'a> {
    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn bytes(&mut self, len: usize) -> AegisResult<&'a [u8]> {
        if self.data.len() < len {
            return Err(AegisError::LEDGER_LOG_TRUNCATED);
        }
        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        Ok(head)
    }

    fn u8(&mut self) -> AegisResult<u8> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> AegisResult<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> AegisResult<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

fn len_u32(len: usize) -> AegisResult<u32> {
    u32::try_from(len).map_err(|_| AegisError::LEDGER_EVENT_DATA_TOO_LARGE)
}

impl MeasurementLedger {
    /// Size of the serialized event log
    pub fn serialized_len(&self) -> usize {
        LEGACY_EVENT_HEADER_SIZE
            + spec_id_event_size(&log_algorithms(self))
            + self.entries().iter().map(event2_size).sum::<usize>()
    }

    /// Serialize as a crypto-agile event log
    ///
    /// The log opens with a legacy `TCG_PCR_EVENT` carrying the
    /// `TCG_EfiSpecIDEvent` that lists every bank, followed by one
    /// `TCG_PCR_EVENT2` per entry:
    ///
    /// | Field        | Encoding                                   |
    /// |--------------|--------------------------------------------|
    /// | pcrIndex     | u32                                        |
    /// | eventType    | u32                                        |
    /// | digests      | u32 count, then `{u16 algId, digest}` each |
    /// | eventSize    | u32                                        |
    /// | event        | `eventSize` bytes                          |
    ///
    /// All integers are little-endian.
    ///
    /// # Arguments
    ///
    /// * `out` - Destination, at least `serialized_len()` bytes
    ///
    /// # Returns
    ///
    /// * `usize` - Bytes written
    pub fn serialize(&self, out: &mut [u8]) -> AegisResult<usize> {
        if out.len() < self.serialized_len() {
            return Err(AegisError::LEDGER_BUFFER_TOO_SMALL);
        }
        let algs = log_algorithms(self);
        let mut w = LogWriter { buf: out, pos: 0 };

        w.u32(0)?;
        w.u32(EV_NO_ACTION)?;
        w.bytes(&[0u8; LEGACY_DIGEST_SIZE])?;
        w.u32(len_u32(spec_id_event_size(&algs))?)?;
        w.bytes(&SPEC_ID_SIGNATURE)?;
        w.u32(0)?;
        w.u8(SPEC_VERSION_MINOR)?;
        w.u8(SPEC_VERSION_MAJOR)?;
        w.u8(SPEC_ERRATA)?;
        w.u8(UINTN_SIZE)?;
        w.u32(len_u32(algs.len())?)?;
        for alg in &algs {
            w.u16(alg.tpm_alg_id().ok_or(AegisError::LEDGER_LOG_UNKNOWN_ALGORITHM)?)?;
            w.u16(alg.digest_len() as u16)?;
        }
        w.u8(0)?;

        for entry in self.entries() {
            w.u32(entry.pcr_index())?;
            w.u32(entry.event_type())?;
            w.u32(len_u32(entry.digests().len())?)?;
            for digest in entry.digests() {
                let id = digest
                    .algorithm()
                    .tpm_alg_id()
                    .ok_or(AegisError::LEDGER_LOG_UNKNOWN_ALGORITHM)?;
                w.u16(id)?;
                w.bytes(digest.as_bytes())?;
            }
            w.u32(len_u32(entry.event_data().len())?)?;
            w.bytes(entry.event_data())?;
        }
        Ok(w.pos)
    }

    /// Serialize into a new buffer
    pub fn to_vec(&self) -> AegisResult<Vec<u8>> {
        let mut out = vec![0u8; self.serialized_len()];
        let len = self.serialize(&mut out)?;
        out.truncate(len);
        Ok(out)
    }

    /// Parse a crypto-agile event log into a sealed ledger
    ///
    /// # Arguments
    ///
    /// * `log` - Serialized log, header event first
    pub fn parse(log: &[u8]) -> AegisResult<Self> {
        let mut r = LogReader { data: log };
        let algs = parse_header(&mut r)?;

        let mut entries = Vec::new();
        while !r.is_empty() {
            let pcr_index = r.u32()?;
            let event_type = r.u32()?;
            let count = r.u32()? as usize;
            if count > algs.len() {
                return Err(AegisError::LEDGER_INVALID_DIGESTS);
            }
            let mut digests = Vec::with_capacity(count);
            for _ in 0..count {
                let alg = HashAlgorithm::from_tpm_alg_id(r.u16()?)
                    .ok()
                    .filter(|alg| algs.contains(alg))
                    .ok_or(AegisError::LEDGER_LOG_UNKNOWN_ALGORITHM)?;
                digests.push(Digest::new(alg, r.bytes(alg.digest_len())?)?);
            }
            let size = r.u32()? as usize;
            let event_data = r.bytes(size)?;
            entries.push(LedgerEntry::new(pcr_index, event_type, &digests, event_data)?);
        }
        Ok(MeasurementLedger::from_parts(entries, true))
    }
}

/// Parse the legacy header event and return the banks it declares
fn parse_header(r: &mut LogReader) -> AegisResult<Vec<HashAlgorithm>> {
    let pcr_index = r.u32()?;
    let event_type = r.u32()?;
    let digest = r.bytes(LEGACY_DIGEST_SIZE)?;
    if pcr_index != 0 || event_type != EV_NO_ACTION || digest.iter().any(|&b| b != 0) {
        return Err(AegisError::LEDGER_LOG_BAD_HEADER);
    }
    let size = r.u32()? as usize;
    let mut event = LogReader {
        data: r.bytes(size)?,
    };

    if event.bytes(SPEC_ID_SIGNATURE.len())? != SPEC_ID_SIGNATURE {
        return Err(AegisError::LEDGER_LOG_BAD_HEADER);
    }
    let _platform_class = event.u32()?;
    let minor = event.u8()?;
    let major = event.u8()?;
    let _errata = event.u8()?;
    let _uintn_size = event.u8()?;
    if major != SPEC_VERSION_MAJOR || minor != SPEC_VERSION_MINOR {
        return Err(AegisError::LEDGER_LOG_BAD_HEADER);
    }

    let count = event.u32()? as usize;
    if count == 0 || count > crate::ledger::MAX_DIGESTS_PER_EVENT {
        return Err(AegisError::LEDGER_LOG_BAD_HEADER);
    }
    let mut algs = Vec::with_capacity(count);
    for _ in 0..count {
        let alg = HashAlgorithm::from_tpm_alg_id(event.u16()?)
            .map_err(|_| AegisError::LEDGER_LOG_UNKNOWN_ALGORITHM)?;
        if usize::from(event.u16()?) != alg.digest_len() || algs.contains(&alg) {
            return Err(AegisError::LEDGER_LOG_BAD_HEADER);
        }
        algs.push(alg);
    }
    let vendor_info_size = usize::from(event.u8()?);
    event.bytes(vendor_info_size)?;
    if !event.is_empty() {
        return Err(AegisError::LEDGER_LOG_BAD_HEADER);
    }
    Ok(algs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{EV_IPL, EV_SEPARATOR};
    use aegis_drivers::hash_oneshot;
    use hex_literal::hex;

    fn ledger() -> MeasurementLedger {
        let mut ledger = MeasurementLedger::init(4).unwrap();
        let stub = [
            hash_oneshot(HashAlgorithm::Sha256, &[1, 2, 3, 4]).unwrap(),
            hash_oneshot(HashAlgorithm::Sha384, &[1, 2, 3, 4]).unwrap(),
        ];
        ledger
            .append(LedgerEntry::new(8, EV_IPL, &stub, b"bootloader").unwrap())
            .unwrap();
        let sep = [
            hash_oneshot(HashAlgorithm::Sha256, &[0; 4]).unwrap(),
            hash_oneshot(HashAlgorithm::Sha384, &[0; 4]).unwrap(),
        ];
        ledger
            .append(LedgerEntry::new(8, EV_SEPARATOR, &sep, &[0; 4]).unwrap())
            .unwrap();
        ledger
    }

    #[test]
    fn test_header_layout() {
        let empty = MeasurementLedger::init(1).unwrap();
        let log = empty.to_vec().unwrap();
        assert_eq!(log.len(), empty.serialized_len());
        assert_eq!(
            log,
            [
                &[0u8, 0, 0, 0][..],
                &[3, 0, 0, 0],
                &[0; 20],
                &[33, 0, 0, 0],
                b"Spec ID Event03\0",
                &[0, 0, 0, 0],
                &[0, 2, 0, 2],
                &[1, 0, 0, 0],
                &[0x0b, 0x00, 0x20, 0x00],
                &[0],
            ]
            .concat()
        );
    }

    #[test]
    fn test_event2_layout() {
        let mut ledger = MeasurementLedger::init(1).unwrap();
        let digest = Digest::new(HashAlgorithm::Sha256, &[0xaa; 32]).unwrap();
        ledger
            .append(LedgerEntry::new(9, EV_IPL, &[digest], b"vmlinuz").unwrap())
            .unwrap();
        let log = ledger.to_vec().unwrap();
        let event = &log[LEGACY_EVENT_HEADER_SIZE + 33..];
        assert_eq!(&event[..4], &hex!("09000000"));
        assert_eq!(&event[4..8], &hex!("0d000000"));
        assert_eq!(&event[8..12], &hex!("01000000"));
        assert_eq!(&event[12..14], &hex!("0b00"));
        assert_eq!(&event[14..46], &[0xaa; 32]);
        assert_eq!(&event[46..50], &hex!("07000000"));
        assert_eq!(&event[50..], b"vmlinuz");
    }

    #[test]
    fn test_parse_round_trip() {
        let ledger = ledger();
        let log = ledger.to_vec().unwrap();
        let parsed = MeasurementLedger::parse(&log).unwrap();
        assert!(parsed.is_sealed());
        assert_eq!(parsed.entries(), ledger.entries());
        for alg in [HashAlgorithm::Sha256, HashAlgorithm::Sha384] {
            assert_eq!(parsed.replay(8, alg).unwrap(), ledger.replay(8, alg).unwrap());
        }
    }

    #[test]
    fn test_serialize_buffer_too_small() {
        let ledger = ledger();
        let mut out = vec![0u8; ledger.serialized_len() - 1];
        assert_eq!(
            ledger.serialize(&mut out),
            Err(AegisError::LEDGER_BUFFER_TOO_SMALL)
        );
    }

    #[test]
    fn test_parse_errors() {
        let log = ledger().to_vec().unwrap();

        assert_eq!(
            MeasurementLedger::parse(&log[..log.len() - 1]).unwrap_err(),
            AegisError::LEDGER_LOG_TRUNCATED
        );
        assert_eq!(
            MeasurementLedger::parse(&log[..10]).unwrap_err(),
            AegisError::LEDGER_LOG_TRUNCATED
        );

        let mut bad_type = log.clone();
        bad_type[4] = 4;
        assert_eq!(
            MeasurementLedger::parse(&bad_type).unwrap_err(),
            AegisError::LEDGER_LOG_BAD_HEADER
        );

        let mut bad_signature = log.clone();
        bad_signature[LEGACY_EVENT_HEADER_SIZE] = b's';
        assert_eq!(
            MeasurementLedger::parse(&bad_signature).unwrap_err(),
            AegisError::LEDGER_LOG_BAD_HEADER
        );

        // First algorithm id in the header becomes TPM_ALG_SM3_256
        let mut unknown_alg = log.clone();
        unknown_alg[LEGACY_EVENT_HEADER_SIZE + SPEC_ID_FIXED_SIZE] = 0x12;
        assert_eq!(
            MeasurementLedger::parse(&unknown_alg).unwrap_err(),
            AegisError::LEDGER_LOG_UNKNOWN_ALGORITHM
        );

        // First event's first digest tagged SHA-512, a bank the header omits
        let first_event = LEGACY_EVENT_HEADER_SIZE + SPEC_ID_FIXED_SIZE + 2 * 4 + 1;
        let mut undeclared = log;
        undeclared[first_event + 12] = 0x0d;
        assert_eq!(
            MeasurementLedger::parse(&undeclared).unwrap_err(),
            AegisError::LEDGER_LOG_UNKNOWN_ALGORITHM
        );
    }
}

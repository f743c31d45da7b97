/*++

Licensed under the Apache-2.0 license.

File Name:

    wire.rs

Abstract:

    TPM 2.0 command/response framing. Every structure is encoded and decoded
    explicitly, field by field, in big-endian order.

--*/

use aegis_drivers::{Digest, HashAlgorithm};
use aegis_error::{AegisError, AegisResult};
use alloc::vec::Vec;

pub const TPM_ST_NO_SESSIONS: u16 = 0x8001;
pub const TPM_ST_SESSIONS: u16 = 0x8002;
pub const TPM_ST_ATTEST_QUOTE: u16 = 0x8018;

/// `TPM_GENERATED_VALUE`, the magic at the start of every TPMS_ATTEST
pub const TPM_GENERATED_VALUE: u32 = 0xFF54_4347;

pub const TPM_CC_SELF_TEST: u32 = 0x0000_0143;
pub const TPM_CC_STARTUP: u32 = 0x0000_0144;
pub const TPM_CC_SHUTDOWN: u32 = 0x0000_0145;
pub const TPM_CC_CREATE: u32 = 0x0000_0153;
pub const TPM_CC_LOAD: u32 = 0x0000_0157;
pub const TPM_CC_QUOTE: u32 = 0x0000_0158;
pub const TPM_CC_UNSEAL: u32 = 0x0000_015E;
pub const TPM_CC_FLUSH_CONTEXT: u32 = 0x0000_0165;
pub const TPM_CC_START_AUTH_SESSION: u32 = 0x0000_0176;
pub const TPM_CC_GET_CAPABILITY: u32 = 0x0000_017A;
pub const TPM_CC_GET_RANDOM: u32 = 0x0000_017B;
pub const TPM_CC_PCR_READ: u32 = 0x0000_017E;
pub const TPM_CC_POLICY_PCR: u32 = 0x0000_017F;
pub const TPM_CC_PCR_EXTEND: u32 = 0x0000_0182;

pub const TPM_RC_SUCCESS: u32 = 0x000;
pub const TPM_RC_BAD_TAG: u32 = 0x01E;
pub const TPM_RC_INITIALIZE: u32 = 0x100;
pub const TPM_RC_FAILURE: u32 = 0x101;
pub const TPM_RC_REBOOT: u32 = 0x130;
pub const TPM_RC_COMMAND_CODE: u32 = 0x143;
pub const TPM_RC_POLICY_FAIL: u32 = 0x09D;
pub const TPM_RC_INTEGRITY: u32 = 0x09F;
pub const TPM_RC_YIELDED: u32 = 0x908;
pub const TPM_RC_TESTING: u32 = 0x90A;
pub const TPM_RC_RETRY: u32 = 0x922;

/// Format-one modifiers: error applies to a session, session number 1
pub const TPM_RC_S: u32 = 0x800;
pub const TPM_RC_1: u32 = 0x100;

/// Password authorization session handle
pub const TPM_RS_PW: u32 = 0x4000_0009;
pub const TPM_RH_NULL: u32 = 0x4000_0007;

pub const TPM_ST_CREATION: u16 = 0x8021;
pub const TPM_SE_POLICY: u8 = 0x01;

pub const TPM_ALG_KEYEDHASH: u16 = 0x0008;
pub const TPM_ALG_NULL: u16 = 0x0010;
pub const TPM_ALG_ECDSA: u16 = 0x0018;

pub const TPM_SU_CLEAR: u16 = 0x0000;
pub const TPM_SU_STATE: u16 = 0x0001;

pub const TPM_CAP_PCRS: u32 = 0x0000_0005;
pub const TPM_CAP_TPM_PROPERTIES: u32 = 0x0000_0006;

pub const TPM_PT_FAMILY_INDICATOR: u32 = 0x100;
pub const TPM_PT_REVISION: u32 = 0x102;
pub const TPM_PT_MANUFACTURER: u32 = 0x105;

/// Size of the command and response headers
pub const HEADER_SIZE: usize = 10;

/// Largest command or response exchanged with the device
pub const MAX_COMMAND_SIZE: usize = 4096;

/// PCRs implemented by a PC client TPM
pub const PCR_COUNT: u32 = 24;

/// `sizeofSelect` for 24 PCRs
pub const PCR_SELECT_SIZE: usize = 3;

/// Command header.
///
/// | Offset | Field  | Size |
/// |--------|--------|------|
/// | 0      | tag    | 2    |
/// | 2      | length | 4    |
/// | 6      | code   | 4    |
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct CommandHeader {
    pub tag: u16,

    /// Total command size, header included
    pub length: u32,

    pub code: u32,
}

impl CommandHeader {
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..2].copy_from_slice(&self.tag.to_be_bytes());
        out[2..6].copy_from_slice(&self.length.to_be_bytes());
        out[6..10].copy_from_slice(&self.code.to_be_bytes());
        out
    }

    /// Decode the header of a complete command
    ///
    /// The `length` field must equal `buf.len()`.
    pub fn decode(buf: &[u8]) -> AegisResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(AegisError::TPM_COMMAND_LENGTH_MISMATCH);
        }
        let header = Self {
            tag: be_u16(&buf[0..2]),
            length: be_u32(&buf[2..6]),
            code: be_u32(&buf[6..10]),
        };
        if header.length as usize != buf.len() {
            return Err(AegisError::TPM_COMMAND_LENGTH_MISMATCH);
        }
        Ok(header)
    }
}

/// Response header, same layout as [`CommandHeader`] with a response code
/// in place of the command code.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ResponseHeader {
    pub tag: u16,

    /// Total response size, header included
    pub length: u32,

    pub response_code: u32,
}

impl ResponseHeader {
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        CommandHeader {
            tag: self.tag,
            length: self.length,
            code: self.response_code,
        }
        .encode()
    }

    /// Decode a response header from the first `HEADER_SIZE` bytes of `buf`
    pub fn decode(buf: &[u8]) -> AegisResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(AegisError::TPM_RESPONSE_TOO_SHORT);
        }
        let header = Self {
            tag: be_u16(&buf[0..2]),
            length: be_u32(&buf[2..6]),
            response_code: be_u32(&buf[6..10]),
        };
        if header.tag != TPM_ST_NO_SESSIONS && header.tag != TPM_ST_SESSIONS {
            return Err(AegisError::TPM_RESPONSE_BAD_TAG);
        }
        let length = header.length as usize;
        if !(HEADER_SIZE..=MAX_COMMAND_SIZE).contains(&length) {
            return Err(AegisError::TPM_RESPONSE_LENGTH_MISMATCH);
        }
        Ok(header)
    }
}

fn be_u16(b: &[u8]) -> u16 {
    u16::from_be_bytes([b[0], b[1]])
}

fn be_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

/// Builds a command, patching the header length on `finish`
pub struct CommandBuilder {
    buf: Vec<u8>,
}

impl CommandBuilder {
    pub fn new(tag: u16, code: u32) -> Self {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(
            &CommandHeader {
                tag,
                length: 0,
                code,
            }
            .encode(),
        );
        Self { buf }
    }

    /// Builder for a bare structure, without a command header
    pub fn raw() -> Self {
        Self { buf: Vec::new() }
    }

    /// Bytes appended so far, without length patching
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn u8(&mut self, val: u8) -> &mut Self {
        self.buf.push(val);
        self
    }

    pub fn u16(&mut self, val: u16) -> &mut Self {
        self.buf.extend_from_slice(&val.to_be_bytes());
        self
    }

    pub fn u32(&mut self, val: u32) -> &mut Self {
        self.buf.extend_from_slice(&val.to_be_bytes());
        self
    }

    pub fn u64(&mut self, val: u64) -> &mut Self {
        self.buf.extend_from_slice(&val.to_be_bytes());
        self
    }

    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(data);
        self
    }

    /// Append a TPM2B: a u16 size followed by the bytes
    pub fn tpm2b(&mut self, data: &[u8]) -> AegisResult<&mut Self> {
        let size = u16::try_from(data.len()).map_err(|_| AegisError::TPM_COMMAND_TOO_LARGE)?;
        self.u16(size);
        Ok(self.bytes(data))
    }

    /// Append an authorization area holding one empty password session
    pub fn password_session(&mut self) -> &mut Self {
        self.session(TPM_RS_PW)
    }

    /// Append an authorization area holding one session with an empty nonce
    /// and hmac and `continueSession` clear
    pub fn session(&mut self, handle: u32) -> &mut Self {
        // handle + empty nonce + attributes + empty hmac
        self.u32(9).u32(handle).u16(0).u8(0).u16(0)
    }

    /// Append a TPML_PCR_SELECTION
    pub fn pcr_selections(&mut self, list: &[PcrSelection]) -> &mut Self {
        self.u32(list.len() as u32);
        for sel in list {
            sel.encode(&mut self.buf);
        }
        self
    }

    /// Append a TPML_DIGEST_VALUES
    pub fn digest_values(&mut self, digests: &[Digest]) -> AegisResult<&mut Self> {
        self.u32(digests.len() as u32);
        for digest in digests {
            let alg = digest
                .algorithm()
                .tpm_alg_id()
                .ok_or(AegisError::TPM_UNSUPPORTED_ALGORITHM)?;
            self.u16(alg).bytes(digest.as_bytes());
        }
        Ok(self)
    }

    /// Patch the length field and return the encoded command
    pub fn finish(&mut self) -> AegisResult<Vec<u8>> {
        if self.buf.len() > MAX_COMMAND_SIZE {
            return Err(AegisError::TPM_COMMAND_TOO_LARGE);
        }
        let len = self.buf.len() as u32;
        self.buf[2..6].copy_from_slice(&len.to_be_bytes());
        Ok(core::mem::take(&mut self.buf))
    }
}

/// Cursor over big-endian wire data
///
/// Running past the end yields `TPM_RESPONSE_MALFORMED`.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn bytes(&mut self, len: usize) -> AegisResult<&'a [u8]> {
        if len > self.buf.len() {
            return Err(AegisError::TPM_RESPONSE_MALFORMED);
        }
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    pub fn u8(&mut self) -> AegisResult<u8> {
        Ok(self.bytes(1)?[0])
    }

    pub fn u16(&mut self) -> AegisResult<u16> {
        Ok(be_u16(self.bytes(2)?))
    }

    pub fn u32(&mut self) -> AegisResult<u32> {
        Ok(be_u32(self.bytes(4)?))
    }

    pub fn u64(&mut self) -> AegisResult<u64> {
        let b = self.bytes(8)?;
        let mut val = [0u8; 8];
        val.copy_from_slice(b);
        Ok(u64::from_be_bytes(val))
    }

    /// Read a TPM2B and return its payload
    pub fn tpm2b(&mut self) -> AegisResult<&'a [u8]> {
        let size = self.u16()? as usize;
        self.bytes(size)
    }

    /// For a `TPM_ST_SESSIONS` response: read `parameterSize` and return a
    /// reader over exactly the parameter area. `self` is left at the
    /// authorization area.
    pub fn session_parameters(&mut self) -> AegisResult<WireReader<'a>> {
        let size = self.u32()? as usize;
        Ok(WireReader::new(self.bytes(size)?))
    }

    /// Read a TPML_PCR_SELECTION
    pub fn pcr_selections(&mut self) -> AegisResult<Vec<PcrSelection>> {
        let count = self.u32()?;
        if count > 16 {
            return Err(AegisError::TPM_RESPONSE_MALFORMED);
        }
        (0..count).map(|_| PcrSelection::decode(self)).collect()
    }

    /// Read a TPML_DIGEST (digests of `alg`)
    pub fn digest_list(&mut self, alg: HashAlgorithm) -> AegisResult<Vec<Digest>> {
        let count = self.u32()?;
        if count > 8 {
            return Err(AegisError::TPM_RESPONSE_MALFORMED);
        }
        (0..count)
            .map(|_| {
                Digest::new(alg, self.tpm2b()?).map_err(|_| AegisError::TPM_RESPONSE_MALFORMED)
            })
            .collect()
    }

    /// Read a TPML_DIGEST_VALUES
    pub fn digest_values(&mut self) -> AegisResult<Vec<Digest>> {
        let count = self.u32()?;
        if count > 8 {
            return Err(AegisError::TPM_RESPONSE_MALFORMED);
        }
        (0..count)
            .map(|_| {
                let alg = HashAlgorithm::from_tpm_alg_id(self.u16()?)
                    .map_err(|_| AegisError::TPM_UNSUPPORTED_ALGORITHM)?;
                Digest::new(alg, self.bytes(alg.digest_len())?)
            })
            .collect()
    }

    /// Fail unless every byte was consumed
    pub fn finish(&self) -> AegisResult<()> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(AegisError::TPM_RESPONSE_MALFORMED)
        }
    }
}

/// TPMS_PCR_SELECTION.
///
/// | Offset | Field          | Size |
/// |--------|----------------|------|
/// | 0      | hash           | 2    |
/// | 2      | sizeofSelect   | 1    |
/// | 3      | pcrSelect      | 3    |
///
/// Bit `n % 8` of `pcrSelect[n / 8]` selects PCR `n`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PcrSelection {
    pub hash_alg: u16,
    pub select: [u8; PCR_SELECT_SIZE],
}

impl PcrSelection {
    /// Empty selection for one bank
    pub fn new(alg: HashAlgorithm) -> AegisResult<Self> {
        let hash_alg = alg
            .tpm_alg_id()
            .ok_or(AegisError::TPM_UNSUPPORTED_ALGORITHM)?;
        Ok(Self {
            hash_alg,
            select: [0u8; PCR_SELECT_SIZE],
        })
    }

    /// Selection of `indices` in the `alg` bank
    pub fn from_indices(alg: HashAlgorithm, indices: &[u32]) -> AegisResult<Self> {
        let mut sel = Self::new(alg)?;
        for &index in indices {
            sel.select(index)?;
        }
        Ok(sel)
    }

    pub fn select(&mut self, index: u32) -> AegisResult<()> {
        if index >= PCR_COUNT {
            return Err(AegisError::TPM_PCR_INDEX_INVALID);
        }
        self.select[(index / 8) as usize] |= 1 << (index % 8);
        Ok(())
    }

    pub fn contains(&self, index: u32) -> bool {
        index < PCR_COUNT && self.select[(index / 8) as usize] & (1 << (index % 8)) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.select == [0u8; PCR_SELECT_SIZE]
    }

    /// Selected PCR indices in ascending order
    pub fn indices(&self) -> impl Iterator<Item = u32> + '_ {
        (0..PCR_COUNT).filter(move |&i| self.contains(i))
    }

    pub fn algorithm(&self) -> AegisResult<HashAlgorithm> {
        HashAlgorithm::from_tpm_alg_id(self.hash_alg).map_err(|_| AegisError::TPM_UNSUPPORTED_ALGORITHM)
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.hash_alg.to_be_bytes());
        out.push(PCR_SELECT_SIZE as u8);
        out.extend_from_slice(&self.select);
    }

    /// Decode one selection; bytes beyond the third must select nothing
    pub fn decode(r: &mut WireReader) -> AegisResult<Self> {
        let hash_alg = r.u16()?;
        let size = r.u8()? as usize;
        let bytes = r.bytes(size)?;
        let mut select = [0u8; PCR_SELECT_SIZE];
        for (i, b) in bytes.iter().enumerate() {
            match select.get_mut(i) {
                Some(s) => *s = *b,
                None if *b == 0 => {}
                None => return Err(AegisError::TPM_PCR_INDEX_INVALID),
            }
        }
        Ok(Self { hash_alg, select })
    }
}

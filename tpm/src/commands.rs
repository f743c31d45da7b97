/*++

Licensed under the Apache-2.0 license.

File Name:

    commands.rs

Abstract:

    TPM 2.0 commands issued by the boot trust core: GetCapability,
    GetRandom, PCR_Read, PCR_Extend and Quote. Sealing lives in seal.rs.

--*/

use alloc::vec::Vec;
use crate::interface::{FirmwareTpm, PlatformIo};
use crate::quote::{Quote, MAX_NONCE_SIZE};
use crate::transport::TpmTransport;
use crate::wire::*;
use aegis_drivers::{Digest, HashAlgorithm};
use aegis_error::{AegisError, AegisResult};

/// Bytes requested per TPM2_GetRandom
const GET_RANDOM_CHUNK: usize = 32;

/// Value of one PCR in one bank
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PcrValue {
    pub index: u32,
    pub digest: Digest,
}

impl PcrValue {
    pub fn algorithm(&self) -> HashAlgorithm {
        self.digest.algorithm()
    }
}

/// Strip the response header and check the tag the command expects
pub(crate) fn response_body(response: &[u8], tag: u16) -> AegisResult<WireReader<'_>> {
    let header = ResponseHeader::decode(response)?;
    if header.tag != tag {
        return Err(AegisError::TPM_RESPONSE_BAD_TAG);
    }
    let mut r = WireReader::new(response);
    r.bytes(HEADER_SIZE)?;
    Ok(r)
}

impl<Io: PlatformIo, Fw: FirmwareTpm> TpmTransport<Io, Fw> {
    fn get_capability(
        &mut self,
        capability: u32,
        property: u32,
        count: u32,
    ) -> AegisResult<Vec<u8>> {
        self.require_ready()?;
        let cmd = CommandBuilder::new(TPM_ST_NO_SESSIONS, TPM_CC_GET_CAPABILITY)
            .u32(capability)
            .u32(property)
            .u32(count)
            .finish()?;
        self.send_command(&cmd)
    }

    /// PCR banks allocated by the device
    pub fn pcr_banks(&mut self) -> AegisResult<Vec<PcrSelection>> {
        let response = self.get_capability(TPM_CAP_PCRS, 0, 1)?;
        let mut r = response_body(&response, TPM_ST_NO_SESSIONS)?;
        let _more_data = r.u8()?;
        if r.u32()? != TPM_CAP_PCRS {
            return Err(AegisError::TPM_RESPONSE_MALFORMED);
        }
        let banks = r.pcr_selections()?;
        r.finish()?;
        Ok(banks)
    }

    /// Returns true if the device allocates the `alg` bank with every PCR in
    /// `indices` selected
    pub fn has_pcr_bank(&mut self, alg: HashAlgorithm, indices: &[u32]) -> AegisResult<bool> {
        let Some(id) = alg.tpm_alg_id() else {
            return Ok(false);
        };
        Ok(self
            .pcr_banks()?
            .iter()
            .any(|bank| bank.hash_alg == id && indices.iter().all(|&i| bank.contains(i))))
    }

    /// Read one fixed TPM property
    pub fn get_property(&mut self, property: u32) -> AegisResult<u32> {
        let response = self.get_capability(TPM_CAP_TPM_PROPERTIES, property, 1)?;
        let mut r = response_body(&response, TPM_ST_NO_SESSIONS)?;
        let _more_data = r.u8()?;
        if r.u32()? != TPM_CAP_TPM_PROPERTIES {
            return Err(AegisError::TPM_RESPONSE_MALFORMED);
        }
        let count = r.u32()?;
        for _ in 0..count {
            let (tag, value) = (r.u32()?, r.u32()?);
            if tag == property {
                return Ok(value);
            }
        }
        Err(AegisError::TPM_RESPONSE_MALFORMED)
    }

    /// Four-character manufacturer identifier, e.g. `*b"IFX\0"`
    pub fn manufacturer(&mut self) -> AegisResult<[u8; 4]> {
        Ok(self.get_property(TPM_PT_MANUFACTURER)?.to_be_bytes())
    }

    /// Fill `out` from the device random number generator
    pub fn get_random(&mut self, out: &mut [u8]) -> AegisResult<()> {
        self.require_ready()?;
        for chunk in out.chunks_mut(GET_RANDOM_CHUNK) {
            let mut filled = 0;
            while filled < chunk.len() {
                let want = (chunk.len() - filled) as u16;
                let cmd = CommandBuilder::new(TPM_ST_NO_SESSIONS, TPM_CC_GET_RANDOM)
                    .u16(want)
                    .finish()?;
                let response = self.send_command(&cmd)?;
                let mut r = response_body(&response, TPM_ST_NO_SESSIONS)?;
                let bytes = r.tpm2b()?;
                r.finish()?;
                if bytes.is_empty() || bytes.len() > usize::from(want) {
                    return Err(AegisError::TPM_RESPONSE_MALFORMED);
                }
                chunk[filled..filled + bytes.len()].copy_from_slice(bytes);
                filled += bytes.len();
            }
        }
        Ok(())
    }

    /// TPM2_PCR_Read of a single PCR
    ///
    /// # Arguments
    ///
    /// * `index` - PCR index
    /// * `alg` - Bank
    pub fn pcr_read(&mut self, index: u32, alg: HashAlgorithm) -> AegisResult<PcrValue> {
        self.require_ready()?;
        let selection = PcrSelection::from_indices(alg, &[index])?;
        let cmd = CommandBuilder::new(TPM_ST_NO_SESSIONS, TPM_CC_PCR_READ)
            .pcr_selections(&[selection])
            .finish()?;
        let response = self.send_command(&cmd)?;
        let mut r = response_body(&response, TPM_ST_NO_SESSIONS)?;
        let _update_counter = r.u32()?;
        let selected = r.pcr_selections()?;
        let values = r.digest_list(alg)?;
        r.finish()?;

        // An unallocated bank comes back as an empty selection
        let returned = selected
            .iter()
            .any(|sel| sel.hash_alg == selection.hash_alg && sel.contains(index));
        match (returned, values.first()) {
            (true, Some(digest)) => Ok(PcrValue {
                index,
                digest: *digest,
            }),
            _ => Err(AegisError::TPM_PCR_BANK_NOT_ALLOCATED),
        }
    }

    /// TPM2_PCR_Extend of one PCR in every bank carried by `digests`
    ///
    /// # Arguments
    ///
    /// * `index` - PCR index
    /// * `digests` - One digest per bank
    pub fn pcr_extend(&mut self, index: u32, digests: &[Digest]) -> AegisResult<()> {
        self.require_ready()?;
        if index >= PCR_COUNT {
            return Err(AegisError::TPM_PCR_INDEX_INVALID);
        }
        let cmd = CommandBuilder::new(TPM_ST_SESSIONS, TPM_CC_PCR_EXTEND)
            .u32(index)
            .password_session()
            .digest_values(digests)?
            .finish()?;
        let response = self.send_command(&cmd)?;
        let mut r = response_body(&response, TPM_ST_SESSIONS)?;
        let params = r.session_parameters()?;
        params.finish()?;
        Ok(())
    }

    /// TPM2_Quote with the key's default signing scheme
    ///
    /// # Arguments
    ///
    /// * `ak_handle` - Persistent handle of an ECDSA attestation key
    /// * `nonce` - Qualifying data, at most 64 bytes
    /// * `selection` - PCRs to quote
    pub fn quote(
        &mut self,
        ak_handle: u32,
        nonce: &[u8],
        selection: &[PcrSelection],
    ) -> AegisResult<Quote> {
        self.require_ready()?;
        if nonce.len() > MAX_NONCE_SIZE {
            return Err(AegisError::TPM_NONCE_TOO_LARGE);
        }
        let cmd = CommandBuilder::new(TPM_ST_SESSIONS, TPM_CC_QUOTE)
            .u32(ak_handle)
            .password_session()
            .tpm2b(nonce)?
            .u16(TPM_ALG_NULL)
            .pcr_selections(selection)
            .finish()?;
        let response = self.send_command(&cmd)?;
        let mut r = response_body(&response, TPM_ST_SESSIONS)?;
        let mut params = r.session_parameters()?;
        let attest = params.tpm2b()?.to_vec();
        if params.u16()? != TPM_ALG_ECDSA {
            return Err(AegisError::TPM_QUOTE_UNSUPPORTED_SIGNATURE);
        }
        let hash_alg = HashAlgorithm::from_tpm_alg_id(params.u16()?)
            .map_err(|_| AegisError::TPM_QUOTE_UNSUPPORTED_SIGNATURE)?;
        let sig_r = params.tpm2b()?;
        let sig_s = params.tpm2b()?;
        params.finish()?;
        Ok(Quote::new(attest, hash_alg, sig_r, sig_s))
    }
}

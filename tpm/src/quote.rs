/*++

Licensed under the Apache-2.0 license.

File Name:

    quote.rs

Abstract:

    TPM2_Quote attestation structures: TPMS_ATTEST decode/encode and
    verification of a signed quote against an attestation key, a nonce and
    expected PCR values.

--*/

use alloc::vec::Vec;
use crate::wire::{PcrSelection, WireReader, TPM_GENERATED_VALUE, TPM_ST_ATTEST_QUOTE};
use aegis_drivers::ct::ct_eq;
use aegis_drivers::{
    Digest, DigestContext, DigestOp, EcdsaCurve, EcdsaPubKey, EcdsaSignature, HashAlgorithm,
};
use aegis_error::{AegisError, AegisResult};

/// Largest qualifying data accepted by TPM2_Quote
pub const MAX_NONCE_SIZE: usize = 64;

/// Decoded TPMS_ATTEST of type TPM_ST_ATTEST_QUOTE.
///
/// | Field            | Encoding                          |
/// |------------------|-----------------------------------|
/// | magic            | u32, TPM_GENERATED_VALUE          |
/// | type             | u16, TPM_ST_ATTEST_QUOTE          |
/// | qualifiedSigner  | TPM2B_NAME                        |
/// | extraData        | TPM2B_DATA, the caller's nonce    |
/// | clockInfo        | u64 clock, u32, u32, u8 safe      |
/// | firmwareVersion  | u64                               |
/// | pcrSelect        | TPML_PCR_SELECTION                |
/// | pcrDigest        | TPM2B_DIGEST                      |
///
/// All integers are big-endian.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct QuoteInfo {
    pub signer_name: Vec<u8>,
    pub extra_data: Vec<u8>,
    pub clock: u64,
    pub reset_count: u32,
    pub restart_count: u32,
    pub safe: bool,
    pub firmware_version: u64,
    pub pcr_selections: Vec<PcrSelection>,
    pub pcr_digest: Vec<u8>,
}

impl QuoteInfo {
    /// Decode a TPMS_ATTEST
    pub fn decode(attest: &[u8]) -> AegisResult<Self> {
        let mut r = WireReader::new(attest);
        if r.u32()? != TPM_GENERATED_VALUE || r.u16()? != TPM_ST_ATTEST_QUOTE {
            return Err(AegisError::TPM_QUOTE_MAGIC_INVALID);
        }
        let info = Self {
            signer_name: r.tpm2b()?.to_vec(),
            extra_data: r.tpm2b()?.to_vec(),
            clock: r.u64()?,
            reset_count: r.u32()?,
            restart_count: r.u32()?,
            safe: r.u8()? != 0,
            firmware_version: r.u64()?,
            pcr_selections: r.pcr_selections()?,
            pcr_digest: r.tpm2b()?.to_vec(),
        };
        r.finish()?;
        Ok(info)
    }

    /// Encode as a TPMS_ATTEST
    pub fn encode(&self) -> AegisResult<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(&TPM_GENERATED_VALUE.to_be_bytes());
        out.extend_from_slice(&TPM_ST_ATTEST_QUOTE.to_be_bytes());
        put_tpm2b(&mut out, &self.signer_name)?;
        put_tpm2b(&mut out, &self.extra_data)?;
        out.extend_from_slice(&self.clock.to_be_bytes());
        out.extend_from_slice(&self.reset_count.to_be_bytes());
        out.extend_from_slice(&self.restart_count.to_be_bytes());
        out.push(u8::from(self.safe));
        out.extend_from_slice(&self.firmware_version.to_be_bytes());
        out.extend_from_slice(&(self.pcr_selections.len() as u32).to_be_bytes());
        for sel in &self.pcr_selections {
            sel.encode(&mut out);
        }
        put_tpm2b(&mut out, &self.pcr_digest)?;
        Ok(out)
    }
}

fn put_tpm2b(out: &mut Vec<u8>, data: &[u8]) -> AegisResult<()> {
    let len = u16::try_from(data.len()).map_err(|_| AegisError::TPM_COMMAND_TOO_LARGE)?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(data);
    Ok(())
}

/// Digest over the concatenation of PCR values, in selection order
///
/// # Arguments
///
/// * `alg` - Hash algorithm of the attestation key's signing scheme
/// * `values` - PCR values, bank by bank, ascending index within a bank
pub fn pcr_composite_digest(alg: HashAlgorithm, values: &[Digest]) -> AegisResult<Digest> {
    let mut op = DigestContext::new(alg);
    for value in values {
        op.update(value.as_bytes())?;
    }
    op.finalize()
}

/// Signed quote returned by TPM2_Quote
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Quote {
    attest: Vec<u8>,
    hash_alg: HashAlgorithm,
    sig_r: Vec<u8>,
    sig_s: Vec<u8>,
}

impl Quote {
    /// # Arguments
    ///
    /// * `attest` - TPMS_ATTEST as signed
    /// * `hash_alg` - Hash of the ECDSA signing scheme
    /// * `sig_r` - Big-endian `r`
    /// * `sig_s` - Big-endian `s`
    pub fn new(attest: Vec<u8>, hash_alg: HashAlgorithm, sig_r: &[u8], sig_s: &[u8]) -> Self {
        Self {
            attest,
            hash_alg,
            sig_r: sig_r.to_vec(),
            sig_s: sig_s.to_vec(),
        }
    }

    /// Raw TPMS_ATTEST, the signed message
    pub fn attest(&self) -> &[u8] {
        &self.attest
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_alg
    }

    /// Signature scalars interpreted on `curve`
    pub fn signature(&self, curve: EcdsaCurve) -> AegisResult<EcdsaSignature> {
        EcdsaSignature::from_scalars(curve, &self.sig_r, &self.sig_s)
    }

    pub fn info(&self) -> AegisResult<QuoteInfo> {
        QuoteInfo::decode(&self.attest)
    }

    /// Verify the quote
    ///
    /// # Arguments
    ///
    /// * `ak` - Attestation public key
    /// * `nonce` - Qualifying data sent with the quote request
    /// * `pcr_values` - Expected values of the quoted PCRs in selection order
    ///
    /// # Returns
    ///
    /// * `QuoteInfo` - The verified attestation structure
    pub fn verify(
        &self,
        ak: &EcdsaPubKey,
        nonce: &[u8],
        pcr_values: &[Digest],
    ) -> AegisResult<QuoteInfo> {
        let info = self.info()?;

        let digest = aegis_drivers::hash_oneshot(self.hash_alg, &self.attest)?;
        self.signature(ak.curve())
            .and_then(|sig| ak.verify(digest.as_bytes(), &sig))
            .map_err(|_| AegisError::TPM_QUOTE_SIGNATURE_INVALID)?;

        if !ct_eq(&info.extra_data, nonce) {
            return Err(AegisError::TPM_QUOTE_NONCE_MISMATCH);
        }

        let composite = pcr_composite_digest(self.hash_alg, pcr_values)?;
        if !ct_eq(composite.as_bytes(), &info.pcr_digest) {
            return Err(AegisError::TPM_QUOTE_PCR_DIGEST_MISMATCH);
        }
        Ok(info)
    }
}

/*++

Licensed under the Apache-2.0 license.

File Name:

    seal.rs

Abstract:

    Sealing of small secrets to PCR values. Data is stored in a keyed-hash
    object under the storage primary key whose authPolicy is a PolicyPCR
    digest, so TPM2_Unseal succeeds only while the selected PCRs hold the
    values they had when the data was sealed.

--*/

use crate::commands::response_body;
use crate::interface::{FirmwareTpm, PlatformIo};
use crate::transport::TpmTransport;
use crate::wire::*;
use aegis_drivers::digest::TPM_ALG_SHA256;
use aegis_drivers::{hash_oneshot, Digest, HashAlgorithm};
use aegis_error::{AegisError, AegisResult};
use alloc::vec::Vec;
use zeroize::Zeroizing;

/// Persistent handle of the storage primary key
pub const STORAGE_PRIMARY_HANDLE: u32 = 0x8100_0001;

/// Largest secret a keyed-hash object holds (`MAX_SYM_DATA`)
pub const MAX_SEALED_DATA: usize = 128;

/// fixedTPM | fixedParent | noDA. userWithAuth is clear so only the
/// policy authorizes TPM2_Unseal.
pub const SEALED_OBJECT_ATTRIBUTES: u32 = 0x0000_0412;

/// Size of nonceCaller for policy sessions
const SESSION_NONCE_SIZE: usize = 16;

/// Digest of the concatenated PCR values, in selection order
pub fn pcr_values_digest(alg: HashAlgorithm, values: &[Digest]) -> AegisResult<Digest> {
    let mut concat = Vec::with_capacity(values.len() * alg.digest_len());
    for value in values {
        concat.extend_from_slice(value.as_bytes());
    }
    hash_oneshot(alg, &concat)
}

/// Extend a policy digest with TPM2_PolicyPCR:
/// `H(old || TPM_CC_PolicyPCR || TPML_PCR_SELECTION || pcr_digest)`
///
/// # Arguments
///
/// * `old` - Current policy digest, all zero for a fresh session
/// * `selection` - PCRs named by the policy
/// * `pcr_digest` - `pcr_values_digest` of the selected PCRs
pub fn policy_pcr_digest(
    old: &Digest,
    selection: &PcrSelection,
    pcr_digest: &Digest,
) -> AegisResult<Digest> {
    let mut buf = Vec::with_capacity(2 * old.len() + 14);
    buf.extend_from_slice(old.as_bytes());
    buf.extend_from_slice(&TPM_CC_POLICY_PCR.to_be_bytes());
    buf.extend_from_slice(&1u32.to_be_bytes());
    selection.encode(&mut buf);
    buf.extend_from_slice(pcr_digest.as_bytes());
    hash_oneshot(old.algorithm(), &buf)
}

/// TPMT_PUBLIC of a sealed data object.
///
/// | Field            | Size          |
/// |------------------|---------------|
/// | type             | 2             |
/// | nameAlg          | 2             |
/// | objectAttributes | 4             |
/// | authPolicy       | 2 + digest    |
/// | scheme           | 2             |
/// | unique           | 2 + digest    |
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SealedPublic {
    pub attributes: u32,
    pub auth_policy: Vec<u8>,
    pub unique: Vec<u8>,
}

impl SealedPublic {
    pub fn encode(&self) -> AegisResult<Vec<u8>> {
        let mut builder = CommandBuilder::raw();
        builder
            .u16(TPM_ALG_KEYEDHASH)
            .u16(TPM_ALG_SHA256)
            .u32(self.attributes)
            .tpm2b(&self.auth_policy)?
            .u16(TPM_ALG_NULL)
            .tpm2b(&self.unique)?;
        Ok(builder.into_bytes())
    }

    /// Decode a keyed-hash object with a SHA-256 name and no scheme
    pub fn decode(buf: &[u8]) -> AegisResult<Self> {
        let mut r = WireReader::new(buf);
        if r.u16()? != TPM_ALG_KEYEDHASH || r.u16()? != TPM_ALG_SHA256 {
            return Err(AegisError::TPM_SEALED_BLOB_MALFORMED);
        }
        let attributes = r.u32()?;
        let auth_policy = r.tpm2b()?.to_vec();
        if r.u16()? != TPM_ALG_NULL {
            return Err(AegisError::TPM_SEALED_BLOB_MALFORMED);
        }
        let unique = r.tpm2b()?.to_vec();
        r.finish()?;
        Ok(Self {
            attributes,
            auth_policy,
            unique,
        })
    }

    /// Object name: nameAlg followed by the digest of the public area
    pub fn name(encoded: &[u8]) -> AegisResult<Vec<u8>> {
        let mut name = Vec::with_capacity(2 + 32);
        name.extend_from_slice(&TPM_ALG_SHA256.to_be_bytes());
        name.extend_from_slice(hash_oneshot(HashAlgorithm::Sha256, encoded)?.as_bytes());
        Ok(name)
    }
}

/// Sealed data as returned by TPM2_Create, with the PCR selection needed to
/// satisfy its policy
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SealedBlob {
    pub selection: PcrSelection,

    /// TPM2B_PRIVATE payload, opaque outside the device
    pub private: Vec<u8>,

    /// TPM2B_PUBLIC payload
    pub public: Vec<u8>,
}

impl SealedBlob {
    /// Serialize for storage: TPML_PCR_SELECTION, TPM2B_PRIVATE, TPM2B_PUBLIC
    pub fn to_bytes(&self) -> AegisResult<Vec<u8>> {
        let mut builder = CommandBuilder::raw();
        builder
            .pcr_selections(&[self.selection])
            .tpm2b(&self.private)?
            .tpm2b(&self.public)?;
        Ok(builder.into_bytes())
    }

    pub fn from_bytes(buf: &[u8]) -> AegisResult<Self> {
        let parse = || -> AegisResult<Self> {
            let mut r = WireReader::new(buf);
            let selections = r.pcr_selections()?;
            let [selection] = selections[..] else {
                return Err(AegisError::TPM_SEALED_BLOB_MALFORMED);
            };
            let private = r.tpm2b()?.to_vec();
            let public = r.tpm2b()?.to_vec();
            r.finish()?;
            SealedPublic::decode(&public)?;
            Ok(Self {
                selection,
                private,
                public,
            })
        };
        parse().map_err(|_| AegisError::TPM_SEALED_BLOB_MALFORMED)
    }
}

impl<Io: PlatformIo, Fw: FirmwareTpm> TpmTransport<Io, Fw> {
    /// Seal `data` to the current values of the PCRs in `selection`
    ///
    /// # Arguments
    ///
    /// * `data` - Secret, at most `MAX_SEALED_DATA` bytes
    /// * `selection` - PCRs of one bank the secret is bound to
    pub fn seal(&mut self, data: &[u8], selection: &PcrSelection) -> AegisResult<SealedBlob> {
        self.require_ready()?;
        if data.len() > MAX_SEALED_DATA {
            return Err(AegisError::TPM_SEAL_DATA_TOO_LARGE);
        }
        if selection.is_empty() {
            return Err(AegisError::TPM_PCR_INDEX_INVALID);
        }
        let alg = selection.algorithm()?;
        let values = selection
            .indices()
            .map(|index| self.pcr_read(index, alg).map(|value| value.digest))
            .collect::<AegisResult<Vec<_>>>()?;
        let policy = policy_pcr_digest(
            &Digest::zero(HashAlgorithm::Sha256),
            selection,
            &pcr_values_digest(HashAlgorithm::Sha256, &values)?,
        )?;
        let template = SealedPublic {
            attributes: SEALED_OBJECT_ATTRIBUTES,
            auth_policy: policy.as_bytes().to_vec(),
            unique: Vec::new(),
        }
        .encode()?;

        // TPMS_SENSITIVE_CREATE: empty userAuth, then the data
        let mut sensitive = CommandBuilder::raw();
        sensitive.tpm2b(&[])?.tpm2b(data)?;
        let sensitive = Zeroizing::new(sensitive.into_bytes());

        let cmd = Zeroizing::new(
            CommandBuilder::new(TPM_ST_SESSIONS, TPM_CC_CREATE)
                .u32(STORAGE_PRIMARY_HANDLE)
                .password_session()
                .tpm2b(&sensitive)?
                .tpm2b(&template)?
                .tpm2b(&[])?
                .pcr_selections(&[])
                .finish()?,
        );
        let response = self.send_command(&cmd)?;
        let mut r = response_body(&response, TPM_ST_SESSIONS)?;
        let mut params = r.session_parameters()?;
        let private = params.tpm2b()?.to_vec();
        let public = params.tpm2b()?.to_vec();
        let _creation_data = params.tpm2b()?;
        let _creation_hash = params.tpm2b()?;
        let _ticket = (params.u16()?, params.u32()?, params.tpm2b()?);
        params.finish()?;

        let sealed = SealedPublic::decode(&public)?;
        if sealed.auth_policy != policy.as_bytes() {
            return Err(AegisError::TPM_RESPONSE_MALFORMED);
        }
        log::info!(
            "[tpm] sealed {} bytes to {} PCRs",
            data.len(),
            selection.indices().count()
        );
        Ok(SealedBlob {
            selection: *selection,
            private,
            public,
        })
    }

    /// Unseal `blob` through a PCR policy session
    ///
    /// Fails with `TPM_RC_POLICY_FAIL` once any selected PCR has changed
    /// since the data was sealed. Transient handles are flushed on every
    /// path.
    pub fn unseal(&mut self, blob: &SealedBlob) -> AegisResult<Zeroizing<Vec<u8>>> {
        self.require_ready()?;
        let object = self.load_sealed(blob)?;
        let result = self.unseal_object(object, &blob.selection);
        let flushed = self.flush_context(object);
        let data = result?;
        flushed?;
        Ok(data)
    }

    /// TPM2_Load under the storage primary key
    fn load_sealed(&mut self, blob: &SealedBlob) -> AegisResult<u32> {
        let cmd = CommandBuilder::new(TPM_ST_SESSIONS, TPM_CC_LOAD)
            .u32(STORAGE_PRIMARY_HANDLE)
            .password_session()
            .tpm2b(&blob.private)?
            .tpm2b(&blob.public)?
            .finish()?;
        let response = self.send_command(&cmd)?;
        let mut r = response_body(&response, TPM_ST_SESSIONS)?;
        let handle = r.u32()?;
        let mut params = r.session_parameters()?;
        let _name = params.tpm2b()?;
        params.finish()?;
        Ok(handle)
    }

    fn unseal_object(
        &mut self,
        object: u32,
        selection: &PcrSelection,
    ) -> AegisResult<Zeroizing<Vec<u8>>> {
        let session = self.start_policy_session()?;
        let result = self
            .policy_pcr(session, selection)
            .and_then(|_| self.unseal_with_session(object, session));
        if result.is_err() {
            // A successful Unseal already closed the session
            if let Err(err) = self.flush_context(session) {
                log::warn!("[tpm] flush of session 0x{:x} failed: {}", session, err);
            }
        }
        result
    }

    /// TPM2_StartAuthSession for an unbound, unsalted SHA-256 policy session
    fn start_policy_session(&mut self) -> AegisResult<u32> {
        let mut nonce = [0u8; SESSION_NONCE_SIZE];
        self.get_random(&mut nonce)?;
        let cmd = CommandBuilder::new(TPM_ST_NO_SESSIONS, TPM_CC_START_AUTH_SESSION)
            .u32(TPM_RH_NULL)
            .u32(TPM_RH_NULL)
            .tpm2b(&nonce)?
            .tpm2b(&[])?
            .u8(TPM_SE_POLICY)
            .u16(TPM_ALG_NULL)
            .u16(TPM_ALG_SHA256)
            .finish()?;
        let response = self.send_command(&cmd)?;
        let mut r = response_body(&response, TPM_ST_NO_SESSIONS)?;
        let handle = r.u32()?;
        let _nonce_tpm = r.tpm2b()?;
        r.finish()?;
        Ok(handle)
    }

    fn policy_pcr(&mut self, session: u32, selection: &PcrSelection) -> AegisResult<()> {
        let cmd = CommandBuilder::new(TPM_ST_NO_SESSIONS, TPM_CC_POLICY_PCR)
            .u32(session)
            .tpm2b(&[])?
            .pcr_selections(&[*selection])
            .finish()?;
        let response = self.send_command(&cmd)?;
        response_body(&response, TPM_ST_NO_SESSIONS)?.finish()
    }

    fn unseal_with_session(&mut self, object: u32, session: u32) -> AegisResult<Zeroizing<Vec<u8>>> {
        let cmd = CommandBuilder::new(TPM_ST_SESSIONS, TPM_CC_UNSEAL)
            .u32(object)
            .session(session)
            .finish()?;
        let response = Zeroizing::new(self.send_command(&cmd)?);
        let mut r = response_body(&response, TPM_ST_SESSIONS)?;
        let mut params = r.session_parameters()?;
        let data = Zeroizing::new(params.tpm2b()?.to_vec());
        params.finish()?;
        Ok(data)
    }

    /// TPM2_FlushContext of a transient object or session
    pub fn flush_context(&mut self, handle: u32) -> AegisResult<()> {
        self.require_ready()?;
        let cmd = CommandBuilder::new(TPM_ST_NO_SESSIONS, TPM_CC_FLUSH_CONTEXT)
            .u32(handle)
            .finish()?;
        let response = self.send_command(&cmd)?;
        response_body(&response, TPM_ST_NO_SESSIONS)?.finish()
    }
}

/*++

Licensed under the Apache-2.0 license.

File Name:

    emulated.rs

Abstract:

    Firmware-emulated TPM. Implements the command subset used by the boot
    trust core over the same wire format as a discrete device: PCR banks,
    a P-256 attestation key, sealed data objects with PCR policy sessions,
    and fault injection.

--*/

use alloc::vec;
use alloc::vec::Vec;
use crate::interface::FirmwareTpm;
use crate::quote::{pcr_composite_digest, QuoteInfo, MAX_NONCE_SIZE};
use crate::seal::{
    pcr_values_digest, policy_pcr_digest, SealedPublic, MAX_SEALED_DATA, STORAGE_PRIMARY_HANDLE,
};
use crate::wire::*;
use aegis_drivers::digest::TPM_ALG_SHA256;
use aegis_drivers::{
    aes_gcm_decrypt, aes_gcm_encrypt, hash_oneshot, hmac, pcr_extend_value, AesContext, Digest,
    EcdsaCurve, EcdsaPrivKey, EcdsaPubKey, HashAlgorithm,
};
use aegis_error::{AegisError, AegisResult};
use zeroize::Zeroizing;

/// Persistent handle of the emulated attestation key
pub const EMULATED_AK_HANDLE: u32 = 0x8101_0002;

/// `TPM_PT_MANUFACTURER` reported by the emulator
pub const EMULATED_MANUFACTURER: [u8; 4] = *b"AEGS";

const TPM_RC_HASH: u32 = 0x083;
const TPM_RC_VALUE: u32 = 0x084;
const TPM_RC_HANDLE: u32 = 0x08B;
const TPM_RC_SIZE: u32 = 0x095;
const TPM_RC_AUTH_SIZE: u32 = 0x144;
const TPM_RC_OBJECT_MEMORY: u32 = 0x902;
const TPM_RC_SESSION_MEMORY: u32 = 0x903;

/// "2.0\0"
const FAMILY_INDICATOR: u32 = 0x322E_3000;
const REVISION: u32 = 159;
const MAX_RANDOM_BYTES: u16 = 32;

const MAX_LOADED_OBJECTS: usize = 3;
const MAX_POLICY_SESSIONS: usize = 3;
const TRANSIENT_FIRST: u32 = 0x8000_0000;
const POLICY_SESSION_FIRST: u32 = 0x0300_0000;

/// Private area layout: IV, tag, then the encrypted seed and data
const SEED_SIZE: usize = 32;
const WRAP_IV_SIZE: usize = 12;
const WRAP_TAG_SIZE: usize = 16;
const NONCE_TPM_SIZE: usize = 16;

// Fixed P-256 scalar for the attestation key of a fresh emulator
const DEFAULT_AK_SCALAR: [u8; 32] = [
    0x6a, 0x3c, 0x1e, 0x5f, 0x90, 0x27, 0xb4, 0x48, 0xd1, 0x0e, 0x7c, 0x22, 0x9a, 0x53, 0xf6, 0x81,
    0x14, 0xc7, 0x3d, 0xa9, 0x5b, 0x60, 0xe2, 0x0f, 0x88, 0x31, 0x4d, 0xb7, 0x06, 0x9e, 0x72, 0x1b,
];

/// Fault injected into upcoming commands
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Fault {
    /// Answer with this response code instead of executing
    ResponseCode(u32),

    /// Produce no response
    Timeout,
}

/// Loaded sealed data object
struct SealedObject {
    handle: u32,
    auth_policy: Vec<u8>,
    data: Zeroizing<Vec<u8>>,
}

/// Open SHA-256 policy session
struct PolicySession {
    handle: u32,
    digest: Digest,
}

/// Response handle and parameter area of a successful command
struct Reply {
    handle: Option<u32>,
    params: Vec<u8>,
}

impl From<Vec<u8>> for Reply {
    fn from(params: Vec<u8>) -> Self {
        Self {
            handle: None,
            params,
        }
    }
}

/// Firmware-emulated TPM
pub struct EmulatedTpm {
    started: bool,
    banks: Vec<(HashAlgorithm, Vec<Digest>)>,
    ak: EcdsaPrivKey,
    rng_seed: Zeroizing<[u8; 32]>,
    rng_counter: u64,
    pcr_update_counter: u32,
    reset_count: u32,
    commands: u64,
    firmware_version: u64,
    faults: Vec<Fault>,
    objects: Vec<SealedObject>,
    sessions: Vec<PolicySession>,
    next_handle: u32,
}

impl EmulatedTpm {
    /// Create a powered-on, not yet started device
    ///
    /// # Arguments
    ///
    /// * `banks` - Allocated PCR banks
    pub fn new(banks: &[HashAlgorithm]) -> AegisResult<Self> {
        let banks = banks
            .iter()
            .map(|&alg| {
                alg.tpm_alg_id().ok_or(AegisError::TPM_UNSUPPORTED_ALGORITHM)?;
                Ok((alg, vec![Digest::zero(alg); PCR_COUNT as usize]))
            })
            .collect::<AegisResult<Vec<_>>>()?;
        Ok(Self {
            started: false,
            banks,
            ak: EcdsaPrivKey::from_bytes(EcdsaCurve::P256, &DEFAULT_AK_SCALAR)?,
            rng_seed: Zeroizing::new([0x5a; 32]),
            rng_counter: 0,
            pcr_update_counter: 0,
            reset_count: 0,
            commands: 0,
            firmware_version: 0x0001_0000_0000_0000,
            faults: Vec::new(),
            objects: Vec::new(),
            sessions: Vec::new(),
            next_handle: 0,
        })
    }

    /// Replace the attestation key
    pub fn with_attestation_key(mut self, key: EcdsaPrivKey) -> AegisResult<Self> {
        if key.curve() != EcdsaCurve::P256 {
            return Err(AegisError::TPM_QUOTE_UNSUPPORTED_SIGNATURE);
        }
        self.ak = key;
        Ok(self)
    }

    /// Seed for the GetRandom stream
    pub fn with_rng_seed(mut self, seed: [u8; 32]) -> Self {
        self.rng_seed = Zeroizing::new(seed);
        self
    }

    pub fn ak_public(&self) -> EcdsaPubKey {
        self.ak.public_key()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Commands received, including faulted ones
    pub fn commands_processed(&self) -> u64 {
        self.commands
    }

    /// Queue faults for the next commands, one per command
    pub fn inject(&mut self, fault: Fault, count: usize) {
        self.faults.extend(core::iter::repeat(fault).take(count));
    }

    /// Current value of a PCR, `None` for an unallocated bank
    pub fn pcr_value(&self, index: u32, alg: HashAlgorithm) -> Option<Digest> {
        self.bank(alg)?.get(index as usize).copied()
    }

    /// Loaded objects plus open sessions
    pub fn transient_handles(&self) -> usize {
        self.objects.len() + self.sessions.len()
    }

    /// Power cycle: registers return to zero, transient objects and
    /// sessions are lost and Startup is required again
    pub fn reset(&mut self) {
        self.objects.clear();
        self.sessions.clear();
        for (alg, pcrs) in &mut self.banks {
            pcrs.iter_mut().for_each(|pcr| *pcr = Digest::zero(*alg));
        }
        self.started = false;
        self.pcr_update_counter = 0;
        self.reset_count += 1;
    }

    fn bank(&self, alg: HashAlgorithm) -> Option<&Vec<Digest>> {
        self.banks.iter().find(|(a, _)| *a == alg).map(|(_, pcrs)| pcrs)
    }

    fn bank_by_id(&mut self, id: u16) -> Option<(HashAlgorithm, &mut Vec<Digest>)> {
        self.banks
            .iter_mut()
            .find(|(a, _)| a.tpm_alg_id() == Some(id))
            .map(|(a, pcrs)| (*a, pcrs))
    }

    fn execute(&mut self, command: &[u8]) -> AegisResult<Vec<u8>> {
        let header = CommandHeader::decode(command)?;
        if header.tag != TPM_ST_NO_SESSIONS && header.tag != TPM_ST_SESSIONS {
            return Ok(respond(TPM_ST_NO_SESSIONS, TPM_RC_BAD_TAG, &[]));
        }
        if !self.started && header.code != TPM_CC_STARTUP {
            return Ok(respond(TPM_ST_NO_SESSIONS, TPM_RC_INITIALIZE, &[]));
        }

        let mut r = WireReader::new(&command[HEADER_SIZE..]);
        let result = match header.code {
            TPM_CC_STARTUP => self.startup(&mut r).map(Reply::from),
            TPM_CC_SHUTDOWN => r.u16().map_err(|_| TPM_RC_SIZE).map(|_| {
                self.started = false;
                Reply::from(Vec::new())
            }),
            TPM_CC_SELF_TEST => r
                .u8()
                .map_err(|_| TPM_RC_SIZE)
                .map(|_| Reply::from(Vec::new())),
            TPM_CC_GET_CAPABILITY => self.get_capability(&mut r).map(Reply::from),
            TPM_CC_GET_RANDOM => self.get_random(&mut r).map(Reply::from),
            TPM_CC_PCR_READ => self.pcr_read(&mut r).map(Reply::from),
            TPM_CC_PCR_EXTEND => self.pcr_extend(&mut r).map(Reply::from),
            TPM_CC_QUOTE => self.quote(&mut r).map(Reply::from),
            TPM_CC_CREATE => self.create(&mut r).map(Reply::from),
            TPM_CC_LOAD => self.load(&mut r),
            TPM_CC_START_AUTH_SESSION => self.start_auth_session(&mut r),
            TPM_CC_POLICY_PCR => self.policy_pcr(&mut r).map(Reply::from),
            TPM_CC_UNSEAL => self.unseal(&mut r).map(Reply::from),
            TPM_CC_FLUSH_CONTEXT => self.flush_context(&mut r).map(Reply::from),
            code => {
                log::trace!("[emulated-tpm] unsupported command 0x{:x}", code);
                Err(TPM_RC_COMMAND_CODE)
            }
        };

        Ok(match result {
            Ok(reply) if header.tag == TPM_ST_SESSIONS => respond_with_session(&reply),
            Ok(reply) => {
                let mut body = Vec::with_capacity(4 + reply.params.len());
                if let Some(handle) = reply.handle {
                    body.extend_from_slice(&handle.to_be_bytes());
                }
                body.extend_from_slice(&reply.params);
                respond(TPM_ST_NO_SESSIONS, TPM_RC_SUCCESS, &body)
            }
            Err(rc) => respond(TPM_ST_NO_SESSIONS, rc, &[]),
        })
    }

    fn startup(&mut self, r: &mut WireReader) -> Result<Vec<u8>, u32> {
        let su = r.u16().map_err(|_| TPM_RC_SIZE)?;
        if self.started {
            return Err(TPM_RC_INITIALIZE);
        }
        if su != TPM_SU_CLEAR && su != TPM_SU_STATE {
            return Err(TPM_RC_VALUE);
        }
        self.started = true;
        Ok(Vec::new())
    }

    fn get_capability(&mut self, r: &mut WireReader) -> Result<Vec<u8>, u32> {
        let capability = r.u32().map_err(|_| TPM_RC_SIZE)?;
        let property = r.u32().map_err(|_| TPM_RC_SIZE)?;
        let _count = r.u32().map_err(|_| TPM_RC_SIZE)?;
        let mut out = vec![0u8];
        out.extend_from_slice(&capability.to_be_bytes());
        match capability {
            TPM_CAP_PCRS => {
                out.extend_from_slice(&(self.banks.len() as u32).to_be_bytes());
                for (alg, _) in &self.banks {
                    let indices: Vec<u32> = (0..PCR_COUNT).collect();
                    PcrSelection::from_indices(*alg, &indices)
                        .map_err(|_| TPM_RC_HASH)?
                        .encode(&mut out);
                }
            }
            TPM_CAP_TPM_PROPERTIES => {
                let value = match property {
                    TPM_PT_FAMILY_INDICATOR => Some(FAMILY_INDICATOR),
                    TPM_PT_REVISION => Some(REVISION),
                    TPM_PT_MANUFACTURER => Some(u32::from_be_bytes(EMULATED_MANUFACTURER)),
                    _ => None,
                };
                match value {
                    Some(value) => {
                        out.extend_from_slice(&1u32.to_be_bytes());
                        out.extend_from_slice(&property.to_be_bytes());
                        out.extend_from_slice(&value.to_be_bytes());
                    }
                    None => out.extend_from_slice(&0u32.to_be_bytes()),
                }
            }
            _ => return Err(TPM_RC_VALUE),
        }
        Ok(out)
    }

    /// Next 32 bytes of the device random stream
    fn random_block(&mut self) -> Result<Digest, u32> {
        self.rng_counter += 1;
        hmac(
            HashAlgorithm::Sha256,
            &self.rng_seed[..],
            &self.rng_counter.to_be_bytes(),
        )
        .map_err(|_| TPM_RC_FAILURE)
    }

    fn get_random(&mut self, r: &mut WireReader) -> Result<Vec<u8>, u32> {
        let requested = r.u16().map_err(|_| TPM_RC_SIZE)?.min(MAX_RANDOM_BYTES);
        let block = self.random_block()?;
        let mut out = Vec::with_capacity(2 + usize::from(requested));
        out.extend_from_slice(&requested.to_be_bytes());
        out.extend_from_slice(&block.as_bytes()[..usize::from(requested)]);
        Ok(out)
    }

    /// Selected values of allocated banks, in selection order
    fn selected_values(&self, selections: &[PcrSelection]) -> (Vec<PcrSelection>, Vec<Digest>) {
        let mut returned = Vec::new();
        let mut values = Vec::new();
        for sel in selections {
            let bank = sel.algorithm().ok().and_then(|alg| self.bank(alg));
            match bank {
                Some(pcrs) => {
                    returned.push(*sel);
                    values.extend(sel.indices().map(|i| pcrs[i as usize]));
                }
                None => returned.push(PcrSelection {
                    hash_alg: sel.hash_alg,
                    select: [0u8; PCR_SELECT_SIZE],
                }),
            }
        }
        (returned, values)
    }

    fn pcr_read(&mut self, r: &mut WireReader) -> Result<Vec<u8>, u32> {
        let selections = r.pcr_selections().map_err(|_| TPM_RC_SIZE)?;
        let (returned, values) = self.selected_values(&selections);
        if values.len() > 8 {
            return Err(TPM_RC_SIZE);
        }
        let mut out = Vec::new();
        out.extend_from_slice(&self.pcr_update_counter.to_be_bytes());
        out.extend_from_slice(&(returned.len() as u32).to_be_bytes());
        for sel in &returned {
            sel.encode(&mut out);
        }
        out.extend_from_slice(&(values.len() as u32).to_be_bytes());
        for value in &values {
            out.extend_from_slice(&(value.len() as u16).to_be_bytes());
            out.extend_from_slice(value.as_bytes());
        }
        Ok(out)
    }

    fn pcr_extend(&mut self, r: &mut WireReader) -> Result<Vec<u8>, u32> {
        let index = r.u32().map_err(|_| TPM_RC_SIZE)?;
        skip_auth_area(r)?;
        let count = r.u32().map_err(|_| TPM_RC_SIZE)?;
        if index >= PCR_COUNT {
            return Err(TPM_RC_VALUE);
        }
        if count > 8 {
            return Err(TPM_RC_SIZE);
        }
        for _ in 0..count {
            let id = r.u16().map_err(|_| TPM_RC_SIZE)?;
            let alg = HashAlgorithm::from_tpm_alg_id(id).map_err(|_| TPM_RC_HASH)?;
            let input = r.bytes(alg.digest_len()).map_err(|_| TPM_RC_SIZE)?;
            // Digests for banks that are not allocated are ignored
            if let Some((_, pcrs)) = self.bank_by_id(id) {
                let pcr = &mut pcrs[index as usize];
                *pcr = pcr_extend_value(pcr, input).map_err(|_| TPM_RC_HASH)?;
            }
        }
        self.pcr_update_counter = self.pcr_update_counter.wrapping_add(1);
        Ok(Vec::new())
    }

    fn quote(&mut self, r: &mut WireReader) -> Result<Vec<u8>, u32> {
        let handle = r.u32().map_err(|_| TPM_RC_SIZE)?;
        skip_auth_area(r)?;
        let nonce = r.tpm2b().map_err(|_| TPM_RC_SIZE)?;
        let scheme = r.u16().map_err(|_| TPM_RC_SIZE)?;
        if scheme != TPM_ALG_NULL {
            let _scheme_hash = r.u16().map_err(|_| TPM_RC_SIZE)?;
            if scheme != TPM_ALG_ECDSA {
                return Err(TPM_RC_VALUE);
            }
        }
        let selections = r.pcr_selections().map_err(|_| TPM_RC_SIZE)?;
        if handle != EMULATED_AK_HANDLE {
            return Err(TPM_RC_HANDLE);
        }
        if nonce.len() > MAX_NONCE_SIZE {
            return Err(TPM_RC_SIZE);
        }

        let ak_public = self.ak.public_key().to_sec1(false);
        let ak_name = hash_oneshot(HashAlgorithm::Sha256, &ak_public).map_err(|_| TPM_RC_FAILURE)?;
        let mut signer_name = Vec::from(TPM_ALG_SHA256.to_be_bytes());
        signer_name.extend_from_slice(ak_name.as_bytes());

        let (returned, values) = self.selected_values(&selections);
        let pcr_digest =
            pcr_composite_digest(HashAlgorithm::Sha256, &values).map_err(|_| TPM_RC_FAILURE)?;
        let info = QuoteInfo {
            signer_name,
            extra_data: nonce.to_vec(),
            clock: self.commands,
            reset_count: self.reset_count,
            restart_count: 0,
            safe: true,
            firmware_version: self.firmware_version,
            pcr_selections: returned,
            pcr_digest: pcr_digest.as_bytes().to_vec(),
        };
        let attest = info.encode().map_err(|_| TPM_RC_SIZE)?;
        let digest = hash_oneshot(HashAlgorithm::Sha256, &attest).map_err(|_| TPM_RC_FAILURE)?;
        let sig = self.ak.sign(digest.as_bytes()).map_err(|_| TPM_RC_FAILURE)?;

        let mut out = Vec::new();
        put_tpm2b(&mut out, &attest);
        out.extend_from_slice(&TPM_ALG_ECDSA.to_be_bytes());
        out.extend_from_slice(&TPM_ALG_SHA256.to_be_bytes());
        put_tpm2b(&mut out, sig.r());
        put_tpm2b(&mut out, sig.s());
        Ok(out)
    }

    /// AES-256-GCM key protecting private areas of objects under the
    /// storage primary key
    fn storage_key(&self) -> Result<AesContext, u32> {
        let key = hmac(
            HashAlgorithm::Sha256,
            &self.rng_seed[..],
            b"storage primary key",
        )
        .map_err(|_| TPM_RC_FAILURE)?;
        AesContext::new(key.as_bytes()).map_err(|_| TPM_RC_FAILURE)
    }

    fn allocate_handle(&mut self, first: u32) -> u32 {
        self.next_handle = (self.next_handle + 1) & 0x00FF_FFFF;
        first | self.next_handle
    }

    fn create(&mut self, r: &mut WireReader) -> Result<Vec<u8>, u32> {
        let parent = r.u32().map_err(|_| TPM_RC_SIZE)?;
        skip_auth_area(r)?;
        let sensitive_create = r.tpm2b().map_err(|_| TPM_RC_SIZE)?;
        let template = r.tpm2b().map_err(|_| TPM_RC_SIZE)?;
        let _outside_info = r.tpm2b().map_err(|_| TPM_RC_SIZE)?;
        let _creation_pcrs = r.pcr_selections().map_err(|_| TPM_RC_SIZE)?;
        if parent != STORAGE_PRIMARY_HANDLE {
            return Err(TPM_RC_HANDLE);
        }

        let mut s = WireReader::new(sensitive_create);
        let _user_auth = s.tpm2b().map_err(|_| TPM_RC_SIZE)?;
        let data = s.tpm2b().map_err(|_| TPM_RC_SIZE)?;
        s.finish().map_err(|_| TPM_RC_SIZE)?;
        if data.len() > MAX_SEALED_DATA {
            return Err(TPM_RC_SIZE);
        }
        let mut public = SealedPublic::decode(template).map_err(|_| TPM_RC_VALUE)?;

        let mut sensitive = Zeroizing::new(Vec::with_capacity(SEED_SIZE + data.len()));
        sensitive.extend_from_slice(self.random_block()?.as_bytes());
        sensitive.extend_from_slice(data);
        public.unique = hash_oneshot(HashAlgorithm::Sha256, &sensitive)
            .map_err(|_| TPM_RC_FAILURE)?
            .as_bytes()
            .to_vec();
        let out_public = public.encode().map_err(|_| TPM_RC_SIZE)?;
        let name = SealedPublic::name(&out_public).map_err(|_| TPM_RC_FAILURE)?;

        let iv = self.random_block()?;
        let iv = &iv.as_bytes()[..WRAP_IV_SIZE];
        let mut out_private = vec![0u8; WRAP_IV_SIZE + WRAP_TAG_SIZE + sensitive.len()];
        let (head, ciphertext) = out_private.split_at_mut(WRAP_IV_SIZE + WRAP_TAG_SIZE);
        let tag = aes_gcm_encrypt(&self.storage_key()?, iv, &name, &sensitive, ciphertext)
            .map_err(|_| TPM_RC_FAILURE)?;
        head[..WRAP_IV_SIZE].copy_from_slice(iv);
        head[WRAP_IV_SIZE..].copy_from_slice(&tag);

        let mut out = Vec::new();
        put_tpm2b(&mut out, &out_private);
        put_tpm2b(&mut out, &out_public);
        // Empty creation data and hash, null ticket
        put_tpm2b(&mut out, &[]);
        put_tpm2b(&mut out, &[]);
        out.extend_from_slice(&TPM_ST_CREATION.to_be_bytes());
        out.extend_from_slice(&TPM_RH_NULL.to_be_bytes());
        put_tpm2b(&mut out, &[]);
        Ok(out)
    }

    fn load(&mut self, r: &mut WireReader) -> Result<Reply, u32> {
        let parent = r.u32().map_err(|_| TPM_RC_SIZE)?;
        skip_auth_area(r)?;
        let private = r.tpm2b().map_err(|_| TPM_RC_SIZE)?;
        let public_area = r.tpm2b().map_err(|_| TPM_RC_SIZE)?;
        if parent != STORAGE_PRIMARY_HANDLE {
            return Err(TPM_RC_HANDLE);
        }
        let public = SealedPublic::decode(public_area).map_err(|_| TPM_RC_VALUE)?;
        if private.len() < WRAP_IV_SIZE + WRAP_TAG_SIZE + SEED_SIZE {
            return Err(TPM_RC_SIZE);
        }
        if self.objects.len() >= MAX_LOADED_OBJECTS {
            return Err(TPM_RC_OBJECT_MEMORY);
        }

        let name = SealedPublic::name(public_area).map_err(|_| TPM_RC_FAILURE)?;
        let (iv, rest) = private.split_at(WRAP_IV_SIZE);
        let (tag, ciphertext) = rest.split_at(WRAP_TAG_SIZE);
        let mut sensitive = Zeroizing::new(vec![0u8; ciphertext.len()]);
        aes_gcm_decrypt(&self.storage_key()?, iv, &name, ciphertext, tag, &mut sensitive)
            .map_err(|_| TPM_RC_INTEGRITY)?;
        let unique =
            hash_oneshot(HashAlgorithm::Sha256, &sensitive).map_err(|_| TPM_RC_FAILURE)?;
        if unique.as_bytes() != public.unique.as_slice() {
            return Err(TPM_RC_INTEGRITY);
        }

        let handle = self.allocate_handle(TRANSIENT_FIRST);
        self.objects.push(SealedObject {
            handle,
            auth_policy: public.auth_policy,
            data: Zeroizing::new(sensitive[SEED_SIZE..].to_vec()),
        });
        let mut params = Vec::new();
        put_tpm2b(&mut params, &name);
        Ok(Reply {
            handle: Some(handle),
            params,
        })
    }

    /// Unbound, unsalted policy sessions only
    fn start_auth_session(&mut self, r: &mut WireReader) -> Result<Reply, u32> {
        let tpm_key = r.u32().map_err(|_| TPM_RC_SIZE)?;
        let bind = r.u32().map_err(|_| TPM_RC_SIZE)?;
        let nonce_caller = r.tpm2b().map_err(|_| TPM_RC_SIZE)?;
        let salt = r.tpm2b().map_err(|_| TPM_RC_SIZE)?;
        let session_type = r.u8().map_err(|_| TPM_RC_SIZE)?;
        let symmetric = r.u16().map_err(|_| TPM_RC_SIZE)?;
        let auth_hash = r.u16().map_err(|_| TPM_RC_SIZE)?;
        if tpm_key != TPM_RH_NULL || bind != TPM_RH_NULL {
            return Err(TPM_RC_HANDLE);
        }
        if !(16..=32).contains(&nonce_caller.len()) {
            return Err(TPM_RC_SIZE);
        }
        if !salt.is_empty() || session_type != TPM_SE_POLICY || symmetric != TPM_ALG_NULL {
            return Err(TPM_RC_VALUE);
        }
        if auth_hash != TPM_ALG_SHA256 {
            return Err(TPM_RC_HASH);
        }
        if self.sessions.len() >= MAX_POLICY_SESSIONS {
            return Err(TPM_RC_SESSION_MEMORY);
        }

        let handle = self.allocate_handle(POLICY_SESSION_FIRST);
        self.sessions.push(PolicySession {
            handle,
            digest: Digest::zero(HashAlgorithm::Sha256),
        });
        let nonce_tpm = self.random_block()?;
        let mut params = Vec::new();
        put_tpm2b(&mut params, &nonce_tpm.as_bytes()[..NONCE_TPM_SIZE]);
        Ok(Reply {
            handle: Some(handle),
            params,
        })
    }

    /// One selection per policy assertion
    fn policy_pcr(&mut self, r: &mut WireReader) -> Result<Vec<u8>, u32> {
        let handle = r.u32().map_err(|_| TPM_RC_SIZE)?;
        let expected = r.tpm2b().map_err(|_| TPM_RC_SIZE)?;
        let selections = r.pcr_selections().map_err(|_| TPM_RC_SIZE)?;
        let [selection] = selections[..] else {
            return Err(TPM_RC_SIZE);
        };
        let alg = selection.algorithm().map_err(|_| TPM_RC_HASH)?;
        let pcrs = self.bank(alg).ok_or(TPM_RC_HASH)?;
        let values: Vec<Digest> = selection.indices().map(|i| pcrs[i as usize]).collect();
        let pcr_digest =
            pcr_values_digest(HashAlgorithm::Sha256, &values).map_err(|_| TPM_RC_FAILURE)?;
        if !expected.is_empty() && expected != pcr_digest.as_bytes() {
            return Err(TPM_RC_VALUE);
        }

        let session = self
            .sessions
            .iter_mut()
            .find(|s| s.handle == handle)
            .ok_or(TPM_RC_HANDLE)?;
        session.digest =
            policy_pcr_digest(&session.digest, &selection, &pcr_digest).map_err(|_| TPM_RC_FAILURE)?;
        Ok(Vec::new())
    }

    fn unseal(&mut self, r: &mut WireReader) -> Result<Vec<u8>, u32> {
        let handle = r.u32().map_err(|_| TPM_RC_SIZE)?;
        let (session_handle, continue_session) = auth_session(r)?;
        let object = self
            .objects
            .iter()
            .find(|o| o.handle == handle)
            .ok_or(TPM_RC_HANDLE)?;
        let index = self
            .sessions
            .iter()
            .position(|s| s.handle == session_handle)
            .ok_or(TPM_RC_HANDLE | TPM_RC_S | TPM_RC_1)?;
        if self.sessions[index].digest.as_bytes() != object.auth_policy.as_slice() {
            return Err(TPM_RC_POLICY_FAIL | TPM_RC_S | TPM_RC_1);
        }

        let mut out = Vec::with_capacity(2 + object.data.len());
        put_tpm2b(&mut out, &object.data);
        if !continue_session {
            self.sessions.remove(index);
        }
        Ok(out)
    }

    fn flush_context(&mut self, r: &mut WireReader) -> Result<Vec<u8>, u32> {
        let handle = r.u32().map_err(|_| TPM_RC_SIZE)?;
        if let Some(i) = self.objects.iter().position(|o| o.handle == handle) {
            self.objects.remove(i);
        } else if let Some(i) = self.sessions.iter().position(|s| s.handle == handle) {
            self.sessions.remove(i);
        } else {
            return Err(TPM_RC_HANDLE);
        }
        Ok(Vec::new())
    }
}

impl FirmwareTpm for EmulatedTpm {
    fn submit(&mut self, command: &[u8], response: &mut [u8]) -> AegisResult<usize> {
        self.commands += 1;
        let rsp = match self.faults.first().copied() {
            Some(fault) => {
                self.faults.remove(0);
                match fault {
                    Fault::ResponseCode(rc) => respond(TPM_ST_NO_SESSIONS, rc, &[]),
                    Fault::Timeout => return Err(AegisError::TPM_TIMEOUT),
                }
            }
            None => self.execute(command)?,
        };
        let out = response
            .get_mut(..rsp.len())
            .ok_or(AegisError::TPM_RESPONSE_LENGTH_MISMATCH)?;
        out.copy_from_slice(&rsp);
        Ok(rsp.len())
    }
}

fn skip_auth_area(r: &mut WireReader) -> Result<(), u32> {
    let size = r.u32().map_err(|_| TPM_RC_SIZE)?;
    r.bytes(size as usize).map_err(|_| TPM_RC_SIZE)?;
    Ok(())
}

/// Handle and `continueSession` of a single-session authorization area
fn auth_session(r: &mut WireReader) -> Result<(u32, bool), u32> {
    let size = r.u32().map_err(|_| TPM_RC_SIZE)?;
    let mut area = WireReader::new(r.bytes(size as usize).map_err(|_| TPM_RC_SIZE)?);
    let handle = area.u32().map_err(|_| TPM_RC_SIZE)?;
    let _nonce = area.tpm2b().map_err(|_| TPM_RC_SIZE)?;
    let attributes = area.u8().map_err(|_| TPM_RC_SIZE)?;
    let _hmac = area.tpm2b().map_err(|_| TPM_RC_SIZE)?;
    if !area.is_empty() {
        return Err(TPM_RC_AUTH_SIZE);
    }
    Ok((handle, attributes & 1 != 0))
}

fn put_tpm2b(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u16).to_be_bytes());
    out.extend_from_slice(data);
}

fn respond(tag: u16, rc: u32, params: &[u8]) -> Vec<u8> {
    let length = (HEADER_SIZE + params.len()) as u32;
    let mut out = Vec::with_capacity(length as usize);
    out.extend_from_slice(
        &ResponseHeader {
            tag,
            length,
            response_code: rc,
        }
        .encode(),
    );
    out.extend_from_slice(params);
    out
}

/// Sessions response: response handle, parameterSize, parameters, then one
/// session acknowledgement (empty nonce, continueSession, empty hmac)
fn respond_with_session(reply: &Reply) -> Vec<u8> {
    let mut body = Vec::with_capacity(8 + reply.params.len() + 5);
    if let Some(handle) = reply.handle {
        body.extend_from_slice(&handle.to_be_bytes());
    }
    body.extend_from_slice(&(reply.params.len() as u32).to_be_bytes());
    body.extend_from_slice(&reply.params);
    body.extend_from_slice(&[0x00, 0x00, 0x01, 0x00, 0x00]);
    respond(TPM_ST_SESSIONS, TPM_RC_SUCCESS, &body)
}

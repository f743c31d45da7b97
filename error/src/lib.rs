/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains API and macros used by the trust core for error handling.

--*/
#![cfg_attr(not(feature = "std"), no_std)]
use core::convert::From;
use core::fmt;
use core::num::{NonZeroU32, TryFromIntError};

/// Aegis Error Type
/// Derives debug, copy, clone, eq, and partial eq
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AegisError(pub NonZeroU32);

/// Error taxonomy every error code is classified into.
///
/// The boot-stage loader reports the kind together with the raw code when an
/// artifact is rejected.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorKind {
    InvalidParameter,
    BufferTooSmall,
    /// Signature, hash or tag mismatch. Always fail-closed.
    VerificationFailed,
    /// Algorithm, curve or mode unavailable.
    NotSupported,
    /// Trust-anchor device not found. Recoverable when policy allows.
    HardwareUnavailable,
    /// Header or table integrity.
    ChecksumMismatch,
    /// Fatal, an incomplete ledger invalidates attestation.
    LedgerFull,
    /// Operation on an already-finalized or wrong-phase object.
    InvalidState,
    ChainIncomplete,
    UntrustedRoot,
    /// Bounded retry or timeout budget exhausted for one operation.
    Timeout,
    /// Device or self-test failure with no local recovery.
    Fatal,
}

/// Macro to define error constants ensuring uniqueness
///
/// This macro takes a list of (name, value, kind, doc) tuples and generates
/// constant definitions for each error code, together with the kind and
/// description lookups.
#[macro_export]
macro_rules! define_error_constants {
    ($(($name:ident, $value:literal, $kind:ident, $doc:expr)),* $(,)?) => {
        $(
            #[doc = $doc]
            pub const $name: AegisError = AegisError::new_const($value);
        )*

        /// Taxonomy kind of this error code.
        pub fn kind(&self) -> ErrorKind {
            match self.0.get() {
                $($value => ErrorKind::$kind,)*
                _ => ErrorKind::Fatal,
            }
        }

        /// Returns true when `val` is one of the defined error codes.
        pub fn is_defined(val: u32) -> bool {
            matches!(val, $($value)|*)
        }

        /// Human readable description of this error code.
        pub fn description(&self) -> &'static str {
            match self.0.get() {
                $($value => $doc,)*
                _ => "Unknown error",
            }
        }

        #[cfg(test)]
        /// Returns a vector of all defined error constants for testing uniqueness
        pub fn all_constants() -> Vec<(&'static str, u32)> {
            vec![
                $(
                    (stringify!($name), $value),
                )*
            ]
        }
    };
}

impl AegisError {
    /// Create an aegis error; intended to only be used from const contexts, as we don't want
    /// runtime panics if val is zero. The preferred way to get an AegisError from a u32 is to
    /// use `AegisError::try_from()` from the `TryFrom` trait impl.
    const fn new_const(val: u32) -> Self {
        match NonZeroU32::new(val) {
            Some(val) => Self(val),
            None => panic!("AegisError cannot be 0"),
        }
    }

    /// Map a TPM 2.0 response code onto its dedicated error constant.
    ///
    /// Format-one codes drop the parameter/handle/session number so that,
    /// for example, `TPM_RC_VALUE` on parameter 1 and parameter 3 map to the
    /// same constant. Codes without a dedicated constant map to
    /// `TPM_RC_UNKNOWN`.
    ///
    /// # Arguments
    ///
    /// * `rc` - Non-zero response code from a response header
    pub fn from_tpm_rc(rc: u32) -> Self {
        const RC_FMT1: u32 = 0x080;
        let normalized = if rc & RC_FMT1 != 0 {
            RC_FMT1 | (rc & 0x3F)
        } else {
            rc & 0xFFF
        };
        let code = 0x000B_1000 | normalized;
        match AegisError::try_from(code) {
            Ok(err) if Self::is_defined(code) => err,
            _ => AegisError::TPM_RC_UNKNOWN,
        }
    }

    /// Returns true when this code is a TPM warning that may succeed if the
    /// command is simply reissued.
    pub fn is_tpm_retryable(&self) -> bool {
        *self == AegisError::TPM_RC_RETRY
            || *self == AegisError::TPM_RC_YIELDED
            || *self == AegisError::TPM_RC_TESTING
    }

    // Use the macro to define all error constants
    define_error_constants![
        (
            DRIVER_DIGEST_INVALID_STATE,
            0x0001_0001,
            InvalidState,
            "Digest context used after finalize"
        ),
        (
            DRIVER_DIGEST_UNSUPPORTED_ALGORITHM,
            0x0001_0002,
            NotSupported,
            "Digest algorithm not supported for this operation"
        ),
        (
            DRIVER_DIGEST_BUFFER_TOO_SMALL,
            0x0001_0003,
            BufferTooSmall,
            "Digest output buffer too small"
        ),
        (
            DRIVER_DIGEST_MAX_DATA,
            0x0001_0004,
            InvalidParameter,
            "Digest max data exceeded"
        ),
        (
            DRIVER_DIGEST_INVALID_LENGTH,
            0x0001_0005,
            InvalidParameter,
            "Digest length does not match algorithm"
        ),
        (
            DRIVER_DIGEST_UNKNOWN_TPM_ALG,
            0x0001_0006,
            NotSupported,
            "Unknown TPM hash algorithm identifier"
        ),
        (
            DRIVER_HMAC_UNSUPPORTED_ALGORITHM,
            0x0002_0001,
            NotSupported,
            "HMAC algorithm not supported"
        ),
        (
            DRIVER_HMAC_INVALID_STATE,
            0x0002_0002,
            InvalidState,
            "HMAC context used after finalize"
        ),
        (
            DRIVER_HMAC_BUFFER_TOO_SMALL,
            0x0002_0003,
            BufferTooSmall,
            "HMAC output buffer too small"
        ),
        (
            DRIVER_HMAC_VERIFY_FAILED,
            0x0002_0004,
            VerificationFailed,
            "HMAC tag mismatch"
        ),
        (
            DRIVER_AES_INVALID_KEY_SIZE,
            0x0003_0001,
            InvalidParameter,
            "AES key size must be 128 or 256 bits"
        ),
        (
            DRIVER_AES_INVALID_IV_SIZE,
            0x0003_0002,
            InvalidParameter,
            "AES IV has the wrong size for the mode"
        ),
        (
            DRIVER_AES_INVALID_DATA_SIZE,
            0x0003_0003,
            InvalidParameter,
            "AES data is not a whole number of blocks"
        ),
        (
            DRIVER_AES_BUFFER_TOO_SMALL,
            0x0003_0004,
            BufferTooSmall,
            "AES output buffer too small"
        ),
        (
            DRIVER_AES_GCM_TAG_MISMATCH,
            0x0003_0005,
            VerificationFailed,
            "AES-GCM authentication tag mismatch"
        ),
        (
            DRIVER_AES_GCM_ENCRYPT_FAILED,
            0x0003_0006,
            InvalidParameter,
            "AES-GCM input exceeds mode limits"
        ),
        (
            DRIVER_AES_XTS_INVALID_DATA_SIZE,
            0x0003_0007,
            InvalidParameter,
            "AES-XTS data unit shorter than one block"
        ),
        (
            DRIVER_AES_INVALID_TAG_SIZE,
            0x0003_0008,
            InvalidParameter,
            "AES-GCM tag must be 16 bytes"
        ),
        (
            DRIVER_CHACHA20POLY1305_INVALID_KEY_SIZE,
            0x0004_0001,
            InvalidParameter,
            "ChaCha20-Poly1305 key must be 32 bytes"
        ),
        (
            DRIVER_CHACHA20POLY1305_INVALID_NONCE_SIZE,
            0x0004_0002,
            InvalidParameter,
            "ChaCha20-Poly1305 nonce must be 12 bytes"
        ),
        (
            DRIVER_CHACHA20POLY1305_BUFFER_TOO_SMALL,
            0x0004_0003,
            BufferTooSmall,
            "ChaCha20-Poly1305 output buffer too small"
        ),
        (
            DRIVER_CHACHA20POLY1305_TAG_MISMATCH,
            0x0004_0004,
            VerificationFailed,
            "ChaCha20-Poly1305 authentication tag mismatch"
        ),
        (
            DRIVER_CHACHA20POLY1305_ENCRYPT_FAILED,
            0x0004_0005,
            InvalidParameter,
            "ChaCha20-Poly1305 input exceeds mode limits"
        ),
        (
            DRIVER_CHACHA20POLY1305_INVALID_TAG_SIZE,
            0x0004_0006,
            InvalidParameter,
            "ChaCha20-Poly1305 tag must be 16 bytes"
        ),
        (
            DRIVER_RSA_UNSUPPORTED_KEY_SIZE,
            0x0005_0001,
            NotSupported,
            "RSA key size must be 2048 or 4096 bits"
        ),
        (
            DRIVER_RSA_INVALID_KEY,
            0x0005_0002,
            InvalidParameter,
            "RSA key components are invalid"
        ),
        (
            DRIVER_RSA_UNSUPPORTED_HASH,
            0x0005_0003,
            NotSupported,
            "RSA scheme does not support this hash"
        ),
        (
            DRIVER_RSA_INVALID_HASH_LEN,
            0x0005_0004,
            InvalidParameter,
            "RSA prehash length does not match hash algorithm"
        ),
        (
            DRIVER_RSA_VERIFY_FAILED,
            0x0005_0005,
            VerificationFailed,
            "RSA signature verification failed"
        ),
        (
            DRIVER_RSA_SIGN_FAILED,
            0x0005_0006,
            InvalidParameter,
            "RSA signing failed"
        ),
        (
            DRIVER_RSA_ENCRYPT_FAILED,
            0x0005_0007,
            InvalidParameter,
            "RSA-OAEP message too long for key"
        ),
        (
            DRIVER_RSA_DECRYPT_FAILED,
            0x0005_0008,
            VerificationFailed,
            "RSA-OAEP decryption failed"
        ),
        (
            DRIVER_RSA_KEYGEN_FAILED,
            0x0005_0009,
            Fatal,
            "RSA key generation failed"
        ),
        (
            DRIVER_RSA_BUFFER_TOO_SMALL,
            0x0005_000A,
            BufferTooSmall,
            "RSA output buffer too small"
        ),
        (
            DRIVER_ECDSA_UNSUPPORTED_CURVE,
            0x0006_0001,
            NotSupported,
            "ECDSA curve not supported"
        ),
        (
            DRIVER_ECDSA_INVALID_PUBLIC_KEY,
            0x0006_0002,
            InvalidParameter,
            "ECDSA public key is not a valid curve point"
        ),
        (
            DRIVER_ECDSA_INVALID_PRIVATE_KEY,
            0x0006_0003,
            InvalidParameter,
            "ECDSA private scalar is out of range"
        ),
        (
            DRIVER_ECDSA_INVALID_SIGNATURE_SIZE,
            0x0006_0004,
            InvalidParameter,
            "ECDSA signature component has the wrong size"
        ),
        (
            DRIVER_ECDSA_SIGNATURE_OUT_OF_RANGE,
            0x0006_0005,
            VerificationFailed,
            "ECDSA signature r or s is zero or not below the curve order"
        ),
        (
            DRIVER_ECDSA_VERIFY_FAILED,
            0x0006_0006,
            VerificationFailed,
            "ECDSA signature verification failed"
        ),
        (
            DRIVER_ECDSA_SIGN_FAILED,
            0x0006_0007,
            InvalidParameter,
            "ECDSA signing failed"
        ),
        (
            DRIVER_ECDSA_INVALID_HASH_LEN,
            0x0006_0008,
            InvalidParameter,
            "ECDSA prehash shorter than half the field size"
        ),
        (
            DRIVER_ECDSA_BUFFER_TOO_SMALL,
            0x0006_0009,
            BufferTooSmall,
            "ECDSA output buffer too small"
        ),
        (
            DRIVER_ECDSA_KEYGEN_FAILED,
            0x0006_000A,
            Fatal,
            "ECDSA key generation failed"
        ),
        (
            DRIVER_PBKDF2_INVALID_ROUNDS,
            0x0007_0001,
            InvalidParameter,
            "PBKDF2 iteration count must be non-zero"
        ),
        (
            DRIVER_KDF_INVALID_OUTPUT_LEN,
            0x0007_0002,
            InvalidParameter,
            "KDF output length invalid"
        ),
        (
            DRIVER_HKDF_OUTPUT_TOO_LONG,
            0x0007_0003,
            InvalidParameter,
            "HKDF output longer than 255 hash blocks"
        ),
        (
            DRIVER_SCRYPT_INVALID_PARAMS,
            0x0007_0004,
            InvalidParameter,
            "scrypt N/r/p parameters invalid"
        ),
        (
            DRIVER_RNG_ENTROPY_UNAVAILABLE,
            0x0008_0001,
            Fatal,
            "Entropy source failed to deliver"
        ),
        (
            DRIVER_RNG_HEALTH_TEST_FAILED,
            0x0008_0002,
            Fatal,
            "Entropy repetition count health test failed"
        ),
        (
            DRIVER_RNG_REQUEST_TOO_LARGE,
            0x0008_0003,
            InvalidParameter,
            "Random byte request too large"
        ),
        (
            X509_DER_UNEXPECTED_TAG,
            0x0009_0001,
            InvalidParameter,
            "DER element has an unexpected tag"
        ),
        (
            X509_DER_INVALID_LENGTH,
            0x0009_0002,
            InvalidParameter,
            "DER length is truncated, indefinite or non-minimal"
        ),
        (
            X509_DER_TRAILING_DATA,
            0x0009_0003,
            InvalidParameter,
            "DER element followed by unexpected trailing bytes"
        ),
        (
            X509_DER_INVALID_INTEGER,
            0x0009_0004,
            InvalidParameter,
            "DER INTEGER is empty, negative or too large"
        ),
        (
            X509_DER_INVALID_BIT_STRING,
            0x0009_0005,
            InvalidParameter,
            "DER BIT STRING has unused bits"
        ),
        (
            X509_UNSUPPORTED_VERSION,
            0x0009_0006,
            NotSupported,
            "Certificate version not supported"
        ),
        (
            X509_UNSUPPORTED_SIGNATURE_ALGORITHM,
            0x0009_0007,
            NotSupported,
            "Certificate signature algorithm not supported"
        ),
        (
            X509_UNSUPPORTED_KEY_ALGORITHM,
            0x0009_0008,
            NotSupported,
            "Certificate public key algorithm not supported"
        ),
        (
            X509_SIGNATURE_ALGORITHM_MISMATCH,
            0x0009_0009,
            InvalidParameter,
            "Outer and TBS signature algorithms differ"
        ),
        (
            X509_INVALID_TIME,
            0x0009_000A,
            InvalidParameter,
            "Certificate validity time malformed"
        ),
        (
            X509_UNSUPPORTED_CRITICAL_EXTENSION,
            0x0009_000B,
            NotSupported,
            "Certificate carries an unrecognised critical extension"
        ),
        (
            X509_CERT_EXPIRED,
            0x0009_000C,
            VerificationFailed,
            "Certificate expired"
        ),
        (
            X509_CERT_NOT_YET_VALID,
            0x0009_000D,
            VerificationFailed,
            "Certificate not yet valid"
        ),
        (
            X509_ISSUER_MISMATCH,
            0x0009_000E,
            VerificationFailed,
            "Issuer subject does not match certificate issuer"
        ),
        (
            X509_SIGNATURE_INVALID,
            0x0009_000F,
            VerificationFailed,
            "Certificate signature invalid"
        ),
        (
            X509_ISSUER_NOT_CA,
            0x0009_0010,
            VerificationFailed,
            "Issuing certificate is not a CA"
        ),
        (
            X509_CHAIN_INCOMPLETE,
            0x0009_0011,
            ChainIncomplete,
            "Certificate chain does not reach a known root"
        ),
        (
            X509_UNTRUSTED_ROOT,
            0x0009_0012,
            UntrustedRoot,
            "Certificate chain ends in an untrusted root"
        ),
        (
            X509_CHAIN_TOO_LONG,
            0x0009_0013,
            InvalidParameter,
            "Certificate chain exceeds maximum depth"
        ),
        (
            X509_CHAIN_EMPTY,
            0x0009_0014,
            InvalidParameter,
            "Certificate chain is empty"
        ),
        (
            X509_UNSUPPORTED_CURVE,
            0x0009_0015,
            NotSupported,
            "Certificate EC curve not supported"
        ),
        (
            X509_BUFFER_TOO_SMALL,
            0x0009_0016,
            BufferTooSmall,
            "X.509 output buffer too small"
        ),
        (
            X509_PATH_LEN_EXCEEDED,
            0x0009_0017,
            ChainIncomplete,
            "X.509 issuer path length constraint exceeded"
        ),
        (
            IMAGE_VERIFIER_HASH_MISMATCH,
            0x000A_0001,
            VerificationFailed,
            "Artifact digest matches no known-hash trust anchor"
        ),
        (
            IMAGE_VERIFIER_TRUST_ANCHOR_MISSING,
            0x000A_0002,
            VerificationFailed,
            "No trust anchor configured for artifact"
        ),
        (
            IMAGE_VERIFIER_SIGNATURE_INVALID,
            0x000A_0003,
            VerificationFailed,
            "Artifact signature invalid"
        ),
        (
            IMAGE_VERIFIER_NO_ROOT_CERTIFICATES,
            0x000A_0004,
            UntrustedRoot,
            "No root certificates configured"
        ),
        (
            IMAGE_VERIFIER_SIZE_OUT_OF_RANGE,
            0x000A_0005,
            InvalidParameter,
            "Artifact size outside the configured range"
        ),
        (
            IMAGE_VERIFIER_NO_AUTHENTICATING_VALIDATOR,
            0x000A_0006,
            InvalidParameter,
            "Artifact policy has neither hash nor signature check"
        ),
        (
            IMAGE_VERIFIER_EVIDENCE_MISMATCH,
            0x000A_0007,
            InvalidParameter,
            "Evidence does not match the validator"
        ),
        (
            IMAGE_VERIFIER_UNSUPPORTED_SCHEME,
            0x000A_0008,
            NotSupported,
            "Signature scheme does not fit the signer key"
        ),
        (
            IMAGE_VERIFIER_INVALID_ARTIFACT_NAME,
            0x000A_0009,
            InvalidParameter,
            "Artifact name empty or too long"
        ),
        (
            IMAGE_VERIFIER_INVALID_HASH,
            0x000A_000A,
            InvalidParameter,
            "Known-hash entry malformed"
        ),
        (
            TPM_NO_INTERFACE,
            0x000B_0001,
            HardwareUnavailable,
            "No trust-anchor interface responded"
        ),
        (
            TPM_INVALID_STATE,
            0x000B_0002,
            InvalidState,
            "Transport is in the wrong state for this operation"
        ),
        (
            TPM_TIMEOUT,
            0x000B_0003,
            Timeout,
            "Trust-anchor device did not respond in time"
        ),
        (
            TPM_RETRIES_EXHAUSTED,
            0x000B_0004,
            Timeout,
            "Command retry budget exhausted"
        ),
        (
            TPM_COMMAND_TOO_LARGE,
            0x000B_0005,
            BufferTooSmall,
            "Command exceeds the transport buffer"
        ),
        (
            TPM_COMMAND_LENGTH_MISMATCH,
            0x000B_0006,
            InvalidParameter,
            "Command header length does not match the command size"
        ),
        (
            TPM_RESPONSE_TOO_SHORT,
            0x000B_0007,
            ChecksumMismatch,
            "Response shorter than its header"
        ),
        (
            TPM_RESPONSE_LENGTH_MISMATCH,
            0x000B_0008,
            ChecksumMismatch,
            "Response header length does not match the bytes received"
        ),
        (
            TPM_RESPONSE_BAD_TAG,
            0x000B_0009,
            ChecksumMismatch,
            "Response header tag invalid"
        ),
        (
            TPM_RESPONSE_MALFORMED,
            0x000B_000A,
            ChecksumMismatch,
            "Response parameters truncated or inconsistent"
        ),
        (
            TPM_PCR_INDEX_INVALID,
            0x000B_000B,
            InvalidParameter,
            "PCR index out of range"
        ),
        (
            TPM_PCR_BANK_NOT_ALLOCATED,
            0x000B_000C,
            NotSupported,
            "PCR bank not allocated on the device"
        ),
        (
            TPM_UNSUPPORTED_ALGORITHM,
            0x000B_000D,
            NotSupported,
            "Hash algorithm has no TPM identifier"
        ),
        (
            TPM_LOCALITY_UNAVAILABLE,
            0x000B_000E,
            HardwareUnavailable,
            "Locality 0 could not be acquired"
        ),
        (
            TPM_QUOTE_MAGIC_INVALID,
            0x000B_000F,
            VerificationFailed,
            "Attestation structure not generated by a TPM"
        ),
        (
            TPM_QUOTE_NONCE_MISMATCH,
            0x000B_0010,
            VerificationFailed,
            "Quote nonce does not match"
        ),
        (
            TPM_QUOTE_PCR_DIGEST_MISMATCH,
            0x000B_0011,
            VerificationFailed,
            "Quote PCR digest does not match expected values"
        ),
        (
            TPM_QUOTE_SIGNATURE_INVALID,
            0x000B_0012,
            VerificationFailed,
            "Quote signature invalid"
        ),
        (
            TPM_QUOTE_UNSUPPORTED_SIGNATURE,
            0x000B_0013,
            NotSupported,
            "Quote signature scheme not supported"
        ),
        (
            TPM_NONCE_TOO_LARGE,
            0x000B_0014,
            InvalidParameter,
            "Qualifying data longer than a digest"
        ),
        (
            TPM_EMULATOR_UNSUPPORTED_COMMAND,
            0x000B_0015,
            NotSupported,
            "Emulated device does not implement the command"
        ),
        (
            TPM_SEAL_DATA_TOO_LARGE,
            0x000B_0016,
            InvalidParameter,
            "Sealed data longer than a keyed-hash object holds"
        ),
        (
            TPM_SEALED_BLOB_MALFORMED,
            0x000B_0017,
            InvalidParameter,
            "Sealed blob truncated or malformed"
        ),
        (
            TPM_RC_INITIALIZE,
            0x000B_1100,
            InvalidState,
            "TPM_RC_INITIALIZE: device not started"
        ),
        (
            TPM_RC_FAILURE,
            0x000B_1101,
            Fatal,
            "TPM_RC_FAILURE: device in failure mode"
        ),
        (
            TPM_RC_DISABLED,
            0x000B_1120,
            HardwareUnavailable,
            "TPM_RC_DISABLED: device disabled"
        ),
        (
            TPM_RC_EXCLUSIVE,
            0x000B_1121,
            InvalidState,
            "TPM_RC_EXCLUSIVE: audit session conflict"
        ),
        (
            TPM_RC_AUTH_TYPE,
            0x000B_1124,
            InvalidParameter,
            "TPM_RC_AUTH_TYPE: authorization type invalid"
        ),
        (
            TPM_RC_AUTH_MISSING,
            0x000B_1125,
            InvalidParameter,
            "TPM_RC_AUTH_MISSING: authorization session missing"
        ),
        (
            TPM_RC_POLICY,
            0x000B_1126,
            VerificationFailed,
            "TPM_RC_POLICY: policy failure"
        ),
        (
            TPM_RC_PCR,
            0x000B_1127,
            InvalidParameter,
            "TPM_RC_PCR: PCR check failed"
        ),
        (
            TPM_RC_PCR_CHANGED,
            0x000B_1128,
            InvalidState,
            "TPM_RC_PCR_CHANGED: PCRs changed during policy session"
        ),
        (
            TPM_RC_UPGRADE,
            0x000B_112D,
            InvalidState,
            "TPM_RC_UPGRADE: field upgrade in progress"
        ),
        (
            TPM_RC_TOO_MANY_CONTEXTS,
            0x000B_112E,
            InvalidState,
            "TPM_RC_TOO_MANY_CONTEXTS: context limit reached"
        ),
        (
            TPM_RC_AUTH_UNAVAILABLE,
            0x000B_112F,
            InvalidParameter,
            "TPM_RC_AUTH_UNAVAILABLE: authValue or authPolicy unavailable"
        ),
        (
            TPM_RC_REBOOT,
            0x000B_1130,
            Fatal,
            "TPM_RC_REBOOT: device requires a reboot"
        ),
        (
            TPM_RC_COMMAND_CODE,
            0x000B_1143,
            NotSupported,
            "TPM_RC_COMMAND_CODE: command not implemented"
        ),
        (
            TPM_RC_BAD_TAG,
            0x000B_101E,
            InvalidParameter,
            "TPM_RC_BAD_TAG: command tag invalid"
        ),
        (
            TPM_RC_HASH,
            0x000B_1083,
            NotSupported,
            "TPM_RC_HASH: hash algorithm not supported"
        ),
        (
            TPM_RC_VALUE,
            0x000B_1084,
            InvalidParameter,
            "TPM_RC_VALUE: parameter value out of range"
        ),
        (
            TPM_RC_HANDLE,
            0x000B_108B,
            InvalidParameter,
            "TPM_RC_HANDLE: handle invalid"
        ),
        (
            TPM_RC_SIGNATURE,
            0x000B_109B,
            VerificationFailed,
            "TPM_RC_SIGNATURE: signature invalid"
        ),
        (
            TPM_RC_POLICY_FAIL,
            0x000B_109D,
            VerificationFailed,
            "TPM_RC_POLICY_FAIL: policy digest does not match the object"
        ),
        (
            TPM_RC_INTEGRITY,
            0x000B_109F,
            VerificationFailed,
            "TPM_RC_INTEGRITY: object integrity check failed"
        ),
        (
            TPM_RC_SIZE,
            0x000B_1095,
            InvalidParameter,
            "TPM_RC_SIZE: structure size invalid"
        ),
        (
            TPM_RC_YIELDED,
            0x000B_1908,
            Timeout,
            "TPM_RC_YIELDED: command yielded"
        ),
        (
            TPM_RC_TESTING,
            0x000B_190A,
            Timeout,
            "TPM_RC_TESTING: self test in progress"
        ),
        (
            TPM_RC_RETRY,
            0x000B_1922,
            Timeout,
            "TPM_RC_RETRY: device busy"
        ),
        (
            TPM_RC_UNKNOWN,
            0x000B_1FFF,
            Fatal,
            "Unrecognised TPM response code"
        ),
        (
            LEDGER_FULL,
            0x000C_0001,
            LedgerFull,
            "Measurement ledger capacity exhausted"
        ),
        (
            LEDGER_SEALED,
            0x000C_0002,
            InvalidState,
            "Measurement ledger already finalized"
        ),
        (
            LEDGER_INVALID_CAPACITY,
            0x000C_0003,
            InvalidParameter,
            "Measurement ledger capacity must be non-zero"
        ),
        (
            LEDGER_EVENT_DATA_TOO_LARGE,
            0x000C_0004,
            InvalidParameter,
            "Event data exceeds the per-entry limit"
        ),
        (
            LEDGER_INVALID_DIGESTS,
            0x000C_0005,
            InvalidParameter,
            "Entry digest list empty, oversized or duplicated"
        ),
        (
            LEDGER_BUFFER_TOO_SMALL,
            0x000C_0006,
            BufferTooSmall,
            "Event log output buffer too small"
        ),
        (
            LEDGER_LOG_TRUNCATED,
            0x000C_0007,
            ChecksumMismatch,
            "Serialized event log truncated"
        ),
        (
            LEDGER_LOG_BAD_HEADER,
            0x000C_0008,
            ChecksumMismatch,
            "Serialized event log Spec ID header invalid"
        ),
        (
            LEDGER_LOG_UNKNOWN_ALGORITHM,
            0x000C_0009,
            ChecksumMismatch,
            "Event log digest algorithm not declared in header"
        ),
        (
            MEASURED_BOOT_OUT_OF_ORDER,
            0x000D_0001,
            InvalidState,
            "Boot stage measured out of order"
        ),
        (
            MEASURED_BOOT_PATH_TOO_LONG,
            0x000D_0002,
            InvalidParameter,
            "Artifact path longer than 255 bytes"
        ),
        (
            MEASURED_BOOT_PCR_MISMATCH,
            0x000D_0003,
            ChecksumMismatch,
            "PCR read back does not match the ledger replay"
        ),
        (
            MEASURED_BOOT_NO_DEVICE,
            0x000D_0004,
            HardwareUnavailable,
            "Operation needs a trust-anchor device"
        ),
        (
            MEASURED_BOOT_INVALID_NONCE,
            0x000D_0005,
            InvalidParameter,
            "Attestation nonce must be 1 to 64 bytes"
        ),
        (
            MEASURED_BOOT_INVALID_PCR_SELECTION,
            0x000D_0006,
            InvalidParameter,
            "PCR selection empty or out of range"
        ),
        (
            MEASURED_BOOT_UNSUPPORTED_BANK,
            0x000D_0007,
            NotSupported,
            "Hash algorithm cannot back a PCR bank"
        ),
        (
            MEASURED_BOOT_ABORTED,
            0x000D_0008,
            InvalidState,
            "Boot attempt already aborted"
        ),
        (
            KAT_SHA256_DIGEST_MISMATCH,
            0x000E_0001,
            Fatal,
            "SHA-256 known answer test failed"
        ),
        (
            KAT_SHA384_DIGEST_MISMATCH,
            0x000E_0002,
            Fatal,
            "SHA-384 known answer test failed"
        ),
        (
            KAT_SHA512_DIGEST_MISMATCH,
            0x000E_0003,
            Fatal,
            "SHA-512 known answer test failed"
        ),
        (
            KAT_SHA3_256_DIGEST_MISMATCH,
            0x000E_0004,
            Fatal,
            "SHA3-256 known answer test failed"
        ),
        (
            KAT_BLAKE2B_DIGEST_MISMATCH,
            0x000E_0005,
            Fatal,
            "BLAKE2b known answer test failed"
        ),
        (
            KAT_HMAC_SHA256_TAG_MISMATCH,
            0x000E_0006,
            Fatal,
            "HMAC-SHA256 known answer test failed"
        ),
        (
            KAT_HMAC_SHA512_TAG_MISMATCH,
            0x000E_0007,
            Fatal,
            "HMAC-SHA512 known answer test failed"
        ),
        (
            KAT_AES_CBC_MISMATCH,
            0x000E_0008,
            Fatal,
            "AES-CBC known answer test failed"
        ),
        (
            KAT_AES_GCM_CIPHERTEXT_MISMATCH,
            0x000E_0009,
            Fatal,
            "AES-GCM known answer test ciphertext mismatch"
        ),
        (
            KAT_AES_GCM_TAG_MISMATCH,
            0x000E_000A,
            Fatal,
            "AES-GCM known answer test tag mismatch"
        ),
        (
            KAT_AES_GCM_PLAINTEXT_MISMATCH,
            0x000E_000B,
            Fatal,
            "AES-GCM known answer test plaintext mismatch"
        ),
        (
            KAT_AES_XTS_MISMATCH,
            0x000E_000C,
            Fatal,
            "AES-XTS known answer test failed"
        ),
        (
            KAT_CHACHA20POLY1305_MISMATCH,
            0x000E_000D,
            Fatal,
            "ChaCha20-Poly1305 known answer test failed"
        ),
        (
            KAT_HKDF_OUTPUT_MISMATCH,
            0x000E_000E,
            Fatal,
            "HKDF known answer test failed"
        ),
        (
            KAT_PBKDF2_OUTPUT_MISMATCH,
            0x000E_000F,
            Fatal,
            "PBKDF2 known answer test failed"
        ),
        (
            KAT_ECDSA_SIGNATURE_MISMATCH,
            0x000E_0010,
            Fatal,
            "ECDSA known answer test signature mismatch"
        ),
        (
            KAT_ECDSA_VERIFY_FAILURE,
            0x000E_0011,
            Fatal,
            "ECDSA known answer test verify failed"
        ),
        (
            KAT_RSA_VERIFY_FAILURE,
            0x000E_0012,
            Fatal,
            "RSA known answer test verify failed"
        ),
        (
            KAT_RNG_FAILURE,
            0x000E_0013,
            Fatal,
            "Random generator self test failed"
        ),
        (
            CONFIG_MALFORMED_LINE,
            0x000F_0001,
            InvalidParameter,
            "Configuration line is not key = value"
        ),
        (
            CONFIG_UNKNOWN_KEY,
            0x000F_0002,
            InvalidParameter,
            "Configuration key not recognised"
        ),
        (
            CONFIG_INVALID_VALUE,
            0x000F_0003,
            InvalidParameter,
            "Configuration value cannot be parsed"
        ),
        (
            CONFIG_VALUE_OUT_OF_RANGE,
            0x000F_0004,
            InvalidParameter,
            "Configuration value outside the permitted range"
        ),
        (
            CONFIG_DUPLICATE_KEY,
            0x000F_0005,
            InvalidParameter,
            "Configuration key given twice"
        ),
        (
            KEY_MATERIAL_WRONG_TYPE,
            0x0010_0001,
            InvalidParameter,
            "Key material variant does not fit the operation"
        ),
    ];
}

impl fmt::Display for AegisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{:08x} ({:?}): {}",
            self.0.get(),
            self.kind(),
            self.description()
        )
    }
}

impl From<core::num::NonZeroU32> for crate::AegisError {
    fn from(val: core::num::NonZeroU32) -> Self {
        crate::AegisError(val)
    }
}

impl From<AegisError> for core::num::NonZeroU32 {
    fn from(val: AegisError) -> Self {
        val.0
    }
}

impl From<AegisError> for u32 {
    fn from(val: AegisError) -> Self {
        core::num::NonZeroU32::from(val).get()
    }
}

impl TryFrom<u32> for AegisError {
    type Error = TryFromIntError;
    fn try_from(val: u32) -> Result<Self, TryFromIntError> {
        match NonZeroU32::try_from(val) {
            Ok(val) => Ok(AegisError(val)),
            Err(err) => Err(err),
        }
    }
}

pub type AegisResult<T> = Result<T, AegisError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_try_from() {
        assert!(AegisError::try_from(0).is_err());
        assert_eq!(
            Ok(AegisError::DRIVER_DIGEST_INVALID_STATE),
            AegisError::try_from(0x0001_0001)
        );
    }

    #[test]
    fn test_error_constants_uniqueness() {
        let constants = AegisError::all_constants();
        let mut error_values = HashSet::new();
        let mut duplicates = Vec::new();

        for (name, value) in constants {
            if !error_values.insert(value) {
                duplicates.push((name, value));
            }
        }

        assert!(
            duplicates.is_empty(),
            "Found duplicate error codes: {:?}",
            duplicates
        );
    }

    #[test]
    fn test_kind() {
        assert_eq!(AegisError::LEDGER_FULL.kind(), ErrorKind::LedgerFull);
        assert_eq!(
            AegisError::X509_CHAIN_INCOMPLETE.kind(),
            ErrorKind::ChainIncomplete
        );
        assert_eq!(
            AegisError::X509_UNTRUSTED_ROOT.kind(),
            ErrorKind::UntrustedRoot
        );
        assert_eq!(
            AegisError::TPM_NO_INTERFACE.kind(),
            ErrorKind::HardwareUnavailable
        );
        assert_eq!(
            AegisError::DRIVER_AES_GCM_TAG_MISMATCH.kind(),
            ErrorKind::VerificationFailed
        );
        assert_eq!(
            AegisError::try_from(0x0ABC_0001).unwrap().kind(),
            ErrorKind::Fatal
        );
    }

    #[test]
    fn test_from_tpm_rc() {
        assert_eq!(AegisError::from_tpm_rc(0x101), AegisError::TPM_RC_FAILURE);
        assert_eq!(AegisError::from_tpm_rc(0x130), AegisError::TPM_RC_REBOOT);
        assert_eq!(AegisError::from_tpm_rc(0x922), AegisError::TPM_RC_RETRY);
        // TPM_RC_VALUE + TPM_RC_P + TPM_RC_1
        assert_eq!(AegisError::from_tpm_rc(0x1C4), AegisError::TPM_RC_VALUE);
        assert_eq!(AegisError::from_tpm_rc(0x2C4), AegisError::TPM_RC_VALUE);
        assert_eq!(AegisError::from_tpm_rc(0x12A), AegisError::TPM_RC_UNKNOWN);
        // TPM_RC_POLICY_FAIL + TPM_RC_S + TPM_RC_1
        assert_eq!(AegisError::from_tpm_rc(0x99D), AegisError::TPM_RC_POLICY_FAIL);
        assert!(AegisError::TPM_RC_TESTING.is_tpm_retryable());
        assert!(!AegisError::TPM_RC_REBOOT.is_tpm_retryable());
    }

    #[test]
    fn test_display() {
        let s = format!("{}", AegisError::LEDGER_FULL);
        assert!(s.starts_with("0x000c0001 (LedgerFull)"));
    }
}

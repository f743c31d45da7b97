/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    Main entry point for Aegis X509 related functionality: DER parsing,
    certificate parsing and chain-of-trust verification.

--*/

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

mod cert;
mod cert_bldr;
mod der_helper;
mod verify;

pub use cert::{
    BasicConstraints, Certificate, KeyUsage, SignatureAlgorithm, SubjectPublicKey, Validity,
};
pub use cert_bldr::CertBuilder;
pub use der_helper::{
    der_encode_len, der_encode_tlv, der_encode_uint, DerReader, DerTlv, DER_BIT_STR_TAG,
    DER_INTEGER_TAG, DER_OCTET_STR_TAG, DER_OID_TAG, DER_SEQ_TAG,
};
pub use verify::{
    ecdsa_signature_from_der, ecdsa_signature_to_der, verify_certificate, verify_chain,
    verify_signature, MAX_CHAIN_DEPTH,
};

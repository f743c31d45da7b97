/*++

Licensed under the Apache-2.0 license.

File Name:

    cert.rs

Abstract:

    X.509 v3 certificate parser. Fields borrow from the input DER so the
    signed portion can be re-verified byte for byte.

--*/

use crate::der_helper::*;
use aegis_drivers::{EcdsaCurve, EcdsaPubKey, HashAlgorithm, RsaPubKey};
use aegis_error::{AegisError, AegisResult};

const OID_ECDSA_WITH_SHA256: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x03, 0x02];
const OID_ECDSA_WITH_SHA384: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x03, 0x03];
const OID_ECDSA_WITH_SHA512: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x03, 0x04];
const OID_SHA256_WITH_RSA: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x0b];
const OID_SHA384_WITH_RSA: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x0c];
const OID_SHA512_WITH_RSA: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x0d];

const OID_RSA_ENCRYPTION: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01];
const OID_EC_PUBLIC_KEY: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01];
const OID_CURVE_P256: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07];
const OID_CURVE_P384: &[u8] = &[0x2b, 0x81, 0x04, 0x00, 0x22];
const OID_CURVE_P521: &[u8] = &[0x2b, 0x81, 0x04, 0x00, 0x23];

const OID_SUBJECT_KEY_ID: &[u8] = &[0x55, 0x1d, 0x0e];
const OID_KEY_USAGE: &[u8] = &[0x55, 0x1d, 0x0f];
const OID_SUBJECT_ALT_NAME: &[u8] = &[0x55, 0x1d, 0x11];
const OID_BASIC_CONSTRAINTS: &[u8] = &[0x55, 0x1d, 0x13];
const OID_AUTHORITY_KEY_ID: &[u8] = &[0x55, 0x1d, 0x23];
const OID_EXT_KEY_USAGE: &[u8] = &[0x55, 0x1d, 0x25];

/// Certificate signature algorithms
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SignatureAlgorithm {
    EcdsaSha256,
    EcdsaSha384,
    EcdsaSha512,
    RsaPkcs1Sha256,
    RsaPkcs1Sha384,
    RsaPkcs1Sha512,
}

impl SignatureAlgorithm {
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        match self {
            Self::EcdsaSha256 | Self::RsaPkcs1Sha256 => HashAlgorithm::Sha256,
            Self::EcdsaSha384 | Self::RsaPkcs1Sha384 => HashAlgorithm::Sha384,
            Self::EcdsaSha512 | Self::RsaPkcs1Sha512 => HashAlgorithm::Sha512,
        }
    }

    pub fn is_ecdsa(&self) -> bool {
        matches!(
            self,
            Self::EcdsaSha256 | Self::EcdsaSha384 | Self::EcdsaSha512
        )
    }

    pub fn oid(&self) -> &'static [u8] {
        match self {
            Self::EcdsaSha256 => OID_ECDSA_WITH_SHA256,
            Self::EcdsaSha384 => OID_ECDSA_WITH_SHA384,
            Self::EcdsaSha512 => OID_ECDSA_WITH_SHA512,
            Self::RsaPkcs1Sha256 => OID_SHA256_WITH_RSA,
            Self::RsaPkcs1Sha384 => OID_SHA384_WITH_RSA,
            Self::RsaPkcs1Sha512 => OID_SHA512_WITH_RSA,
        }
    }

    /// Parse an AlgorithmIdentifier. ECDSA carries no parameters, RSA
    /// carries NULL or nothing.
    fn from_algorithm_identifier(value: &[u8]) -> AegisResult<Self> {
        let mut r = DerReader::new(value);
        let oid = r.read(DER_OID_TAG)?;
        let alg = match oid {
            OID_ECDSA_WITH_SHA256 => Self::EcdsaSha256,
            OID_ECDSA_WITH_SHA384 => Self::EcdsaSha384,
            OID_ECDSA_WITH_SHA512 => Self::EcdsaSha512,
            OID_SHA256_WITH_RSA => Self::RsaPkcs1Sha256,
            OID_SHA384_WITH_RSA => Self::RsaPkcs1Sha384,
            OID_SHA512_WITH_RSA => Self::RsaPkcs1Sha512,
            _ => return Err(AegisError::X509_UNSUPPORTED_SIGNATURE_ALGORITHM),
        };
        if !alg.is_ecdsa() {
            r.read_optional(DER_NULL_TAG)?;
        }
        r.finish()?;
        Ok(alg)
    }
}

/// Public key carried in subjectPublicKeyInfo
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectPublicKey {
    Ecdsa(EcdsaPubKey),
    Rsa(RsaPubKey),
}

impl SubjectPublicKey {
    fn parse(spki: &[u8]) -> AegisResult<Self> {
        let mut r = DerReader::new(spki);
        let mut alg = DerReader::new(r.read(DER_SEQ_TAG)?);
        let key_bits = r.read_bit_string()?;
        r.finish()?;

        match alg.read(DER_OID_TAG)? {
            OID_EC_PUBLIC_KEY => {
                let curve = match alg.read(DER_OID_TAG)? {
                    OID_CURVE_P256 => EcdsaCurve::P256,
                    OID_CURVE_P384 => EcdsaCurve::P384,
                    OID_CURVE_P521 => EcdsaCurve::P521,
                    _ => return Err(AegisError::X509_UNSUPPORTED_CURVE),
                };
                alg.finish()?;
                Ok(Self::Ecdsa(EcdsaPubKey::from_sec1(curve, key_bits)?))
            }
            OID_RSA_ENCRYPTION => {
                alg.read_optional(DER_NULL_TAG)?;
                alg.finish()?;
                let mut outer = DerReader::new(key_bits);
                let mut rsa = DerReader::new(outer.read(DER_SEQ_TAG)?);
                outer.finish()?;
                let n = rsa.read_uint()?;
                let e = rsa.read_uint()?;
                rsa.finish()?;
                Ok(Self::Rsa(RsaPubKey::from_be_bytes(n, e)?))
            }
            _ => Err(AegisError::X509_UNSUPPORTED_KEY_ALGORITHM),
        }
    }
}

/// Validity window in seconds since the Unix epoch, both bounds inclusive
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Validity {
    pub not_before: u64,
    pub not_after: u64,
}

impl Validity {
    pub fn check(&self, now: u64) -> AegisResult<()> {
        if now < self.not_before {
            return Err(AegisError::X509_CERT_NOT_YET_VALID);
        }
        if now > self.not_after {
            return Err(AegisError::X509_CERT_EXPIRED);
        }
        Ok(())
    }
}

/// basicConstraints extension
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct BasicConstraints {
    pub ca: bool,
    pub path_len: Option<u32>,
}

/// keyUsage bits, bit 0 is digitalSignature
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct KeyUsage(pub u16);

impl KeyUsage {
    pub const DIGITAL_SIGNATURE: u16 = 1 << 0;
    pub const KEY_CERT_SIGN: u16 = 1 << 5;

    pub fn contains(&self, bits: u16) -> bool {
        self.0 & bits == bits
    }
}

/// Parsed X.509 certificate
#[derive(Debug, Clone)]
pub struct Certificate<'a> {
    raw: &'a [u8],
    tbs: &'a [u8],
    version: u32,
    serial: &'a [u8],
    issuer: &'a [u8],
    subject: &'a [u8],
    validity: Validity,
    public_key: SubjectPublicKey,
    basic_constraints: Option<BasicConstraints>,
    key_usage: Option<KeyUsage>,
    signature_algorithm: SignatureAlgorithm,
    signature: &'a [u8],
}

impl<'a> Certificate<'a> {
    /// Parse a DER encoded certificate
    ///
    /// # Arguments
    ///
    /// * `der` - Certificate bytes, nothing may follow the outer SEQUENCE
    pub fn from_der(der: &'a [u8]) -> AegisResult<Self> {
        let mut outer = DerReader::new(der);
        let cert_tlv = outer.read_tlv()?;
        if cert_tlv.tag != DER_SEQ_TAG {
            return Err(AegisError::X509_DER_UNEXPECTED_TAG);
        }
        outer.finish()?;

        let mut cert = DerReader::new(cert_tlv.value);
        let tbs = cert.read_raw(DER_SEQ_TAG)?;
        let signature_algorithm =
            SignatureAlgorithm::from_algorithm_identifier(cert.read(DER_SEQ_TAG)?)?;
        let signature = cert.read_bit_string()?;
        cert.finish()?;

        let mut r = DerReader::new(DerReader::new(tbs).read(DER_SEQ_TAG)?);
        let version = match r.read_optional(DER_CONTEXT_0_TAG)? {
            Some(v) => {
                let mut v = DerReader::new(v);
                let version = v.read_u32()?.saturating_add(1);
                v.finish()?;
                version
            }
            None => 1,
        };
        if version > 3 {
            return Err(AegisError::X509_UNSUPPORTED_VERSION);
        }
        let serial = r.read_uint()?;
        let tbs_alg = SignatureAlgorithm::from_algorithm_identifier(r.read(DER_SEQ_TAG)?)?;
        if tbs_alg != signature_algorithm {
            return Err(AegisError::X509_SIGNATURE_ALGORITHM_MISMATCH);
        }
        let issuer = r.read_raw(DER_SEQ_TAG)?;
        let validity = parse_validity(r.read(DER_SEQ_TAG)?)?;
        let subject = r.read_raw(DER_SEQ_TAG)?;
        let public_key = SubjectPublicKey::parse(r.read_raw(DER_SEQ_TAG)?)?;

        // issuerUniqueID [1] and subjectUniqueID [2] are skipped
        for tag in [0x81, 0x82] {
            if r.peek_tag() == Some(tag) {
                r.read_tlv()?;
            }
        }

        let mut basic_constraints = None;
        let mut key_usage = None;
        if let Some(ext) = r.read_optional(DER_CONTEXT_3_TAG)? {
            if version != 3 {
                return Err(AegisError::X509_UNSUPPORTED_VERSION);
            }
            let mut ext = DerReader::new(ext);
            let list = ext.read(DER_SEQ_TAG)?;
            ext.finish()?;
            parse_extensions(list, &mut basic_constraints, &mut key_usage)?;
        }
        r.finish()?;

        Ok(Self {
            raw: der,
            tbs,
            version,
            serial,
            issuer,
            subject,
            validity,
            public_key,
            basic_constraints,
            key_usage,
            signature_algorithm,
            signature,
        })
    }

    /// Complete certificate encoding
    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    /// Signed portion, the TBSCertificate SEQUENCE
    pub fn tbs(&self) -> &'a [u8] {
        self.tbs
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn serial(&self) -> &'a [u8] {
        self.serial
    }

    /// Raw DER of the issuer Name
    pub fn issuer(&self) -> &'a [u8] {
        self.issuer
    }

    /// Raw DER of the subject Name
    pub fn subject(&self) -> &'a [u8] {
        self.subject
    }

    pub fn validity(&self) -> Validity {
        self.validity
    }

    pub fn public_key(&self) -> &SubjectPublicKey {
        &self.public_key
    }

    pub fn basic_constraints(&self) -> Option<BasicConstraints> {
        self.basic_constraints
    }

    pub fn key_usage(&self) -> Option<KeyUsage> {
        self.key_usage
    }

    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        self.signature_algorithm
    }

    /// Contents of the signatureValue BIT STRING
    pub fn signature(&self) -> &'a [u8] {
        self.signature
    }

    pub fn is_self_issued(&self) -> bool {
        self.issuer == self.subject
    }

    /// May this certificate sign other certificates
    pub fn is_ca(&self) -> bool {
        let ca = self.basic_constraints.map_or(false, |bc| bc.ca);
        let usage = self
            .key_usage
            .map_or(true, |ku| ku.contains(KeyUsage::KEY_CERT_SIGN));
        ca && usage
    }
}

fn parse_extensions(
    list: &[u8],
    basic_constraints: &mut Option<BasicConstraints>,
    key_usage: &mut Option<KeyUsage>,
) -> AegisResult<()> {
    let mut list = DerReader::new(list);
    while !list.is_empty() {
        let mut ext = DerReader::new(list.read(DER_SEQ_TAG)?);
        let oid = ext.read(DER_OID_TAG)?;
        let critical = if ext.peek_tag() == Some(DER_BOOLEAN_TAG) {
            ext.read_bool()?
        } else {
            false
        };
        let value = ext.read(DER_OCTET_STR_TAG)?;
        ext.finish()?;

        match oid {
            OID_BASIC_CONSTRAINTS => {
                let mut outer = DerReader::new(value);
                let mut bc = DerReader::new(outer.read(DER_SEQ_TAG)?);
                outer.finish()?;
                let ca = if bc.peek_tag() == Some(DER_BOOLEAN_TAG) {
                    bc.read_bool()?
                } else {
                    false
                };
                let path_len = if bc.peek_tag() == Some(DER_INTEGER_TAG) {
                    Some(bc.read_u32()?)
                } else {
                    None
                };
                bc.finish()?;
                *basic_constraints = Some(BasicConstraints { ca, path_len });
            }
            OID_KEY_USAGE => {
                let mut ku = DerReader::new(value);
                let (_, bits) = ku.read_bit_string_bits()?;
                ku.finish()?;
                let mut usage = 0u16;
                for (i, b) in bits.iter().take(2).enumerate() {
                    // Bit 0 is the most significant bit of the first octet
                    usage |= (b.reverse_bits() as u16) << (8 * i);
                }
                *key_usage = Some(KeyUsage(usage));
            }
            OID_SUBJECT_KEY_ID | OID_AUTHORITY_KEY_ID | OID_SUBJECT_ALT_NAME
            | OID_EXT_KEY_USAGE => {}
            _ if critical => {
                log::warn!("[x509] unrecognized critical extension");
                return Err(AegisError::X509_UNSUPPORTED_CRITICAL_EXTENSION);
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_validity(value: &[u8]) -> AegisResult<Validity> {
    let mut r = DerReader::new(value);
    let not_before = parse_time(&mut r)?;
    let not_after = parse_time(&mut r)?;
    r.finish()?;
    Ok(Validity {
        not_before,
        not_after,
    })
}

fn parse_time(r: &mut DerReader) -> AegisResult<u64> {
    let tlv = r.read_tlv()?;
    let (year, rest) = match (tlv.tag, tlv.value.len()) {
        // YYMMDDHHMMSSZ
        (DER_UTC_TIME_TAG, 13) => {
            let yy = digits(&tlv.value[..2])?;
            let year = if yy >= 50 { 1900 + yy } else { 2000 + yy };
            (year, &tlv.value[2..])
        }
        // YYYYMMDDHHMMSSZ
        (DER_GENERALIZED_TIME_TAG, 15) => (digits(&tlv.value[..4])?, &tlv.value[4..]),
        _ => return Err(AegisError::X509_INVALID_TIME),
    };
    if rest[10] != b'Z' {
        return Err(AegisError::X509_INVALID_TIME);
    }
    let month = digits(&rest[0..2])?;
    let day = digits(&rest[2..4])?;
    let hour = digits(&rest[4..6])?;
    let minute = digits(&rest[6..8])?;
    let second = digits(&rest[8..10])?;
    if year < 1970
        || !(1..=12).contains(&month)
        || day == 0
        || day > days_in_month(year, month)
        || hour > 23
        || minute > 59
        || second > 59
    {
        return Err(AegisError::X509_INVALID_TIME);
    }
    let days = days_from_civil(year, month, day);
    Ok(days * 86400 + hour * 3600 + minute * 60 + second)
}

fn digits(s: &[u8]) -> AegisResult<u64> {
    s.iter().try_fold(0u64, |acc, &c| {
        if c.is_ascii_digit() {
            Ok(acc * 10 + (c - b'0') as u64)
        } else {
            Err(AegisError::X509_INVALID_TIME)
        }
    })
}

fn is_leap(year: u64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: u64, month: u64) -> u64 {
    match month {
        2 if is_leap(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// Days since 1970-01-01 for a date on or after it
fn days_from_civil(year: u64, month: u64, day: u64) -> u64 {
    let mut days = 0;
    for y in 1970..year {
        days += if is_leap(y) { 366 } else { 365 };
    }
    for m in 1..month {
        days += days_in_month(year, m);
    }
    days + day - 1
}

/*++

Licensed under the Apache-2.0 license.

File Name:

    der_helper.rs

Abstract:

    Helpers for reading and encoding the DER subset used by X.509
    certificates.

--*/

use aegis_error::{AegisError, AegisResult};
use alloc::vec::Vec;

pub const DER_BOOLEAN_TAG: u8 = 0x01;
pub const DER_INTEGER_TAG: u8 = 0x02;
pub const DER_BIT_STR_TAG: u8 = 0x03;
pub const DER_OCTET_STR_TAG: u8 = 0x04;
pub const DER_NULL_TAG: u8 = 0x05;
pub const DER_OID_TAG: u8 = 0x06;
pub const DER_UTC_TIME_TAG: u8 = 0x17;
pub const DER_GENERALIZED_TIME_TAG: u8 = 0x18;
pub const DER_SEQ_TAG: u8 = 0x30;
pub const DER_CONTEXT_0_TAG: u8 = 0xa0;
pub const DER_CONTEXT_3_TAG: u8 = 0xa3;

/// A single tag-length-value element
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DerTlv<'a> {
    pub tag: u8,

    /// Contents octets
    pub value: &'a [u8],

    /// Complete encoding including tag and length
    pub raw: &'a [u8],
}

/// Forward-only reader over a DER buffer
#[derive(Debug, Clone)]
pub struct DerReader<'a> {
    data: &'a [u8],
}

impl<'a> DerReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn peek_tag(&self) -> Option<u8> {
        self.data.first().copied()
    }

    /// Read the next element whatever its tag
    pub fn read_tlv(&mut self) -> AegisResult<DerTlv<'a>> {
        let tag = *self
            .data
            .first()
            .ok_or(AegisError::X509_DER_INVALID_LENGTH)?;
        // Multi-byte tags are not used by X.509
        if tag & 0x1f == 0x1f {
            return Err(AegisError::X509_DER_UNEXPECTED_TAG);
        }
        let (len, header) = decode_length(self.data.get(1..).unwrap_or_default())?;
        let total = 1 + header + len;
        let raw = self
            .data
            .get(..total)
            .ok_or(AegisError::X509_DER_INVALID_LENGTH)?;
        let value = &raw[1 + header..];
        self.data = &self.data[total..];
        Ok(DerTlv { tag, value, raw })
    }

    /// Read an element with the expected tag and return its contents
    pub fn read(&mut self, tag: u8) -> AegisResult<&'a [u8]> {
        Ok(self.read_expected(tag)?.value)
    }

    /// Read an element with the expected tag and return its full encoding
    pub fn read_raw(&mut self, tag: u8) -> AegisResult<&'a [u8]> {
        Ok(self.read_expected(tag)?.raw)
    }

    fn read_expected(&mut self, tag: u8) -> AegisResult<DerTlv<'a>> {
        if self.peek_tag() != Some(tag) {
            return Err(AegisError::X509_DER_UNEXPECTED_TAG);
        }
        self.read_tlv()
    }

    /// Read an element only if the next tag matches
    pub fn read_optional(&mut self, tag: u8) -> AegisResult<Option<&'a [u8]>> {
        if self.peek_tag() == Some(tag) {
            self.read(tag).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Read a non-negative INTEGER, returning its big-endian magnitude without
    /// the sign octet
    pub fn read_uint(&mut self) -> AegisResult<&'a [u8]> {
        let value = self.read(DER_INTEGER_TAG)?;
        match value {
            [] => Err(AegisError::X509_DER_INVALID_INTEGER),
            [b, ..] if *b & 0x80 != 0 => Err(AegisError::X509_DER_INVALID_INTEGER),
            [0, b, ..] if *b & 0x80 == 0 => Err(AegisError::X509_DER_INVALID_INTEGER),
            [0, rest @ ..] if !rest.is_empty() => Ok(rest),
            _ => Ok(value),
        }
    }

    /// Read a small non-negative INTEGER
    pub fn read_u32(&mut self) -> AegisResult<u32> {
        let value = self.read_uint()?;
        if value.len() > 4 {
            return Err(AegisError::X509_DER_INVALID_INTEGER);
        }
        Ok(value.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32))
    }

    /// Read a BIT STRING, returning the unused bit count and the contents
    pub fn read_bit_string_bits(&mut self) -> AegisResult<(u8, &'a [u8])> {
        let value = self.read(DER_BIT_STR_TAG)?;
        let (&unused, bits) = value
            .split_first()
            .ok_or(AegisError::X509_DER_INVALID_BIT_STRING)?;
        if unused > 7 || (bits.is_empty() && unused != 0) {
            return Err(AegisError::X509_DER_INVALID_BIT_STRING);
        }
        Ok((unused, bits))
    }

    /// Read a BIT STRING that must be a whole number of octets
    pub fn read_bit_string(&mut self) -> AegisResult<&'a [u8]> {
        match self.read_bit_string_bits()? {
            (0, bits) => Ok(bits),
            _ => Err(AegisError::X509_DER_INVALID_BIT_STRING),
        }
    }

    pub fn read_bool(&mut self) -> AegisResult<bool> {
        match self.read(DER_BOOLEAN_TAG)? {
            [0x00] => Ok(false),
            [0xff] => Ok(true),
            _ => Err(AegisError::X509_DER_INVALID_LENGTH),
        }
    }

    /// Fail if any data remains
    pub fn finish(&self) -> AegisResult<()> {
        if self.data.is_empty() {
            Ok(())
        } else {
            Err(AegisError::X509_DER_TRAILING_DATA)
        }
    }
}

/// Decode a DER length, returning the length and the number of octets used
fn decode_length(data: &[u8]) -> AegisResult<(usize, usize)> {
    let first = *data.first().ok_or(AegisError::X509_DER_INVALID_LENGTH)?;
    if first < 0x80 {
        return Ok((first as usize, 1));
    }
    let count = (first & 0x7f) as usize;
    // Indefinite lengths and lengths above 16 MiB are rejected
    if count == 0 || count > 3 {
        return Err(AegisError::X509_DER_INVALID_LENGTH);
    }
    let bytes = data
        .get(1..1 + count)
        .ok_or(AegisError::X509_DER_INVALID_LENGTH)?;
    if bytes[0] == 0 {
        return Err(AegisError::X509_DER_INVALID_LENGTH);
    }
    let len = bytes.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize);
    if len < 0x80 {
        return Err(AegisError::X509_DER_INVALID_LENGTH);
    }
    Ok((len, 1 + count))
}

#[inline(never)]
fn trim_leading_zeros(val: &[u8]) -> &[u8] {
    match val.iter().position(|&b| b != 0) {
        Some(i) => &val[i..],
        // If everything is 0, then we need len 1, and 0 as value
        None => val.get(..1).unwrap_or(&[0]),
    }
}

/// Encode a DER length
pub fn der_encode_len(len: usize, out: &mut Vec<u8>) {
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let be = len.to_be_bytes();
        let bytes = trim_leading_zeros(&be);
        out.push(0x80 | bytes.len() as u8);
        out.extend_from_slice(bytes);
    }
}

/// Encode a complete tag-length-value element
pub fn der_encode_tlv(tag: u8, value: &[u8], out: &mut Vec<u8>) {
    out.push(tag);
    der_encode_len(value.len(), out);
    out.extend_from_slice(value);
}

/// DER encode an unsigned big-endian integer
pub fn der_encode_uint(val: &[u8], out: &mut Vec<u8>) {
    let sub_val = trim_leading_zeros(val);
    let pad = sub_val.first().map_or(false, |b| *b > 127);
    out.push(DER_INTEGER_TAG);
    der_encode_len(sub_val.len() + pad as usize, out);
    if pad {
        out.push(0);
    }
    out.extend_from_slice(sub_val);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_nested() {
        let der = [0x30, 0x06, 0x02, 0x01, 0x05, 0x01, 0x01, 0xff];
        let mut outer = DerReader::new(&der);
        let seq = outer.read(DER_SEQ_TAG).unwrap();
        outer.finish().unwrap();
        let mut inner = DerReader::new(seq);
        assert_eq!(inner.read_u32().unwrap(), 5);
        assert!(inner.read_bool().unwrap());
        assert!(inner.is_empty());
    }

    #[test]
    fn test_integers() {
        assert_eq!(
            DerReader::new(&[0x02, 0x02, 0x00, 0x80]).read_uint().unwrap(),
            &[0x80]
        );
        assert_eq!(DerReader::new(&[0x02, 0x01, 0x00]).read_uint().unwrap(), &[0]);
        // Negative
        assert_eq!(
            DerReader::new(&[0x02, 0x01, 0x80]).read_uint(),
            Err(AegisError::X509_DER_INVALID_INTEGER)
        );
        // Non-minimal
        assert_eq!(
            DerReader::new(&[0x02, 0x02, 0x00, 0x01]).read_uint(),
            Err(AegisError::X509_DER_INVALID_INTEGER)
        );
    }

    #[test]
    fn test_lengths() {
        let mut long = vec![0x04, 0x81, 0x80];
        long.extend_from_slice(&[0xaa; 0x80]);
        assert_eq!(DerReader::new(&long).read(DER_OCTET_STR_TAG).unwrap().len(), 0x80);

        // Non-minimal long form
        assert_eq!(
            DerReader::new(&[0x04, 0x81, 0x01, 0x00]).read_tlv(),
            Err(AegisError::X509_DER_INVALID_LENGTH)
        );
        // Indefinite
        assert_eq!(
            DerReader::new(&[0x30, 0x80, 0x00, 0x00]).read_tlv(),
            Err(AegisError::X509_DER_INVALID_LENGTH)
        );
        // Truncated
        assert_eq!(
            DerReader::new(&[0x04, 0x05, 0x00]).read_tlv(),
            Err(AegisError::X509_DER_INVALID_LENGTH)
        );
        assert_eq!(
            DerReader::new(&[0x05, 0x00]).read(DER_SEQ_TAG),
            Err(AegisError::X509_DER_UNEXPECTED_TAG)
        );
    }

    #[test]
    fn test_bit_string() {
        assert_eq!(
            DerReader::new(&[0x03, 0x02, 0x05, 0xa0])
                .read_bit_string_bits()
                .unwrap(),
            (5, &[0xa0][..])
        );
        assert_eq!(
            DerReader::new(&[0x03, 0x02, 0x05, 0xa0]).read_bit_string(),
            Err(AegisError::X509_DER_INVALID_BIT_STRING)
        );
    }

    #[test]
    fn test_encode() {
        let mut out = Vec::new();
        der_encode_uint(&[0x00, 0x00, 0x85], &mut out);
        assert_eq!(out, [0x02, 0x02, 0x00, 0x85]);

        out.clear();
        der_encode_uint(&[0, 0], &mut out);
        assert_eq!(out, [0x02, 0x01, 0x00]);

        out.clear();
        der_encode_tlv(DER_OCTET_STR_TAG, &[0x11; 300], &mut out);
        assert_eq!(&out[..4], &[0x04, 0x82, 0x01, 0x2c]);
        assert_eq!(DerReader::new(&out).read(DER_OCTET_STR_TAG).unwrap(), &[0x11; 300]);
    }
}

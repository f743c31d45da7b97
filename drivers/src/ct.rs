/*++

Licensed under the Apache-2.0 license.

File Name:

    ct.rs

Abstract:

    Constant-time comparison and secure erase helpers.

--*/

use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// Compare two byte strings without an early exit on the first difference.
///
/// Only the lengths are compared in variable time; lengths are public.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    bool::from(a.ct_eq(b))
}

/// Overwrite `buf` with zeros in a way the optimizer will not elide
pub fn secure_zero(buf: &mut [u8]) {
    buf.zeroize();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ct_eq() {
        assert!(ct_eq(b"", b""));
        assert!(ct_eq(b"abc", b"abc"));
        assert!(!ct_eq(b"abc", b"abd"));
        assert!(!ct_eq(b"abc", b"abcd"));
    }

    #[test]
    fn test_secure_zero() {
        let mut buf = [0xffu8; 24];
        secure_zero(&mut buf);
        assert_eq!(buf, [0u8; 24]);
    }
}

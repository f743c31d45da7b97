/*++

Licensed under the Apache-2.0 license.

File Name:

    printer.rs

Abstract:

    File contains support routines to render binary values inside log lines

--*/
use core::fmt;

/// Renders a byte slice as lowercase hex without allocating
pub struct HexBytes<'a>(pub &'a [u8]);

impl fmt::Display for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &x in self.0.iter() {
            let c = x >> 4;
            if c < 10 {
                fmt::Write::write_char(f, (c + b'0') as char)?;
            } else {
                fmt::Write::write_char(f, (c - 10 + b'a') as char)?;
            }
            let c = x & 0xf;
            if c < 10 {
                fmt::Write::write_char(f, (c + b'0') as char)?;
            } else {
                fmt::Write::write_char(f, (c - 10 + b'a') as char)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_bytes() {
        assert_eq!(format!("{}", HexBytes(&[0x00, 0x1f, 0xa0, 0xff])), "001fa0ff");
        assert_eq!(format!("{}", HexBytes(&[])), "");
    }
}

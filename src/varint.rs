//! Variable-length integer encoding/decoding for cell fields.
//!
//! Keys and payload sizes inside cells use a 7-bit continuation format:
//! - The high bit of each byte indicates if more bytes follow
//! - At most 4 bytes are used, so the value domain is 28 bits
//! - Cells store the fixed 4-byte form, keeping every field at a fixed
//!   offset regardless of the value

use crate::error::{LarchError, Result};

/// Largest value a 4-byte varint can carry (28 data bits).
pub const MAX_VARINT32: u32 = 0x0FFF_FFFF;

/// Number of bytes the fixed cell form always occupies.
pub const VARINT32_FIXED_LEN: usize = 4;

/// Read a varint from a byte slice, returning (value, bytes_consumed).
///
/// Errors with `VarintOverflow` if the fourth byte still has its
/// continuation bit set, or the slice ends mid-varint.
pub fn read_varint32(buf: &[u8]) -> Result<(u32, usize)> {
    let mut value: u32 = 0;
    for i in 0..VARINT32_FIXED_LEN {
        let byte = *buf.get(i).ok_or(LarchError::VarintOverflow)?;
        value = (value << 7) | (byte & 0x7f) as u32;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(LarchError::VarintOverflow)
}

/// Write a varint in its minimal form, returning the number of bytes written.
pub fn write_varint32(buf: &mut [u8], value: u32) -> Result<usize> {
    if value > MAX_VARINT32 {
        return Err(LarchError::VarintOverflow);
    }
    if value <= 0x7f {
        buf[0] = value as u8;
        return Ok(1);
    }
    if value <= 0x3fff {
        buf[0] = ((value >> 7) as u8) | 0x80;
        buf[1] = (value & 0x7f) as u8;
        return Ok(2);
    }
    if value <= 0x1fffff {
        buf[0] = ((value >> 14) as u8) | 0x80;
        buf[1] = ((value >> 7) as u8) | 0x80;
        buf[2] = (value & 0x7f) as u8;
        return Ok(3);
    }
    buf[0] = ((value >> 21) as u8) | 0x80;
    buf[1] = ((value >> 14) as u8) | 0x80;
    buf[2] = ((value >> 7) as u8) | 0x80;
    buf[3] = (value & 0x7f) as u8;
    Ok(4)
}

/// Write a varint in the fixed 4-byte form cells use on disk.
///
/// Leading bytes carry the continuation bit even when the value would fit
/// in fewer bytes, so a cell's key is always at the same offset.
pub fn write_varint32_fixed(buf: &mut [u8], value: u32) -> Result<()> {
    if value > MAX_VARINT32 {
        return Err(LarchError::VarintOverflow);
    }
    buf[0] = ((value >> 21) as u8) | 0x80;
    buf[1] = ((value >> 14) as u8) | 0x80;
    buf[2] = ((value >> 7) as u8) | 0x80;
    buf[3] = (value & 0x7f) as u8;
    Ok(())
}

/// Calculate the number of bytes the minimal encoding needs.
pub fn varint32_len(value: u32) -> usize {
    if value <= 0x7f {
        1
    } else if value <= 0x3fff {
        2
    } else if value <= 0x1fffff {
        3
    } else {
        4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_roundtrip() {
        let test_values: Vec<u32> = vec![
            0,
            1,
            127,
            128,
            255,
            256,
            16383,
            16384,
            2097151,
            2097152,
            MAX_VARINT32,
        ];
        for val in test_values {
            let mut buf = [0u8; 4];
            let written = write_varint32(&mut buf, val).unwrap();
            let (read_val, read_len) = read_varint32(&buf[..written]).unwrap();
            assert_eq!(val, read_val, "roundtrip failed for {}", val);
            assert_eq!(written, read_len, "length mismatch for {}", val);
            assert_eq!(written, varint32_len(val));
        }
    }

    #[test]
    fn test_fixed_form_roundtrip() {
        for val in [0u32, 1, 127, 128, 20000, MAX_VARINT32] {
            let mut buf = [0u8; 4];
            write_varint32_fixed(&mut buf, val).unwrap();
            let (read_val, read_len) = read_varint32(&buf).unwrap();
            assert_eq!(val, read_val);
            assert_eq!(read_len, VARINT32_FIXED_LEN);
        }
    }

    #[test]
    fn test_fixed_form_bytes() {
        let mut buf = [0u8; 4];
        write_varint32_fixed(&mut buf, 1).unwrap();
        assert_eq!(buf, [0x80, 0x80, 0x80, 0x01]);

        write_varint32_fixed(&mut buf, 10).unwrap();
        assert_eq!(buf, [0x80, 0x80, 0x80, 0x0A]);
    }

    #[test]
    fn test_overflow_on_write() {
        let mut buf = [0u8; 4];
        assert!(matches!(
            write_varint32(&mut buf, MAX_VARINT32 + 1),
            Err(LarchError::VarintOverflow)
        ));
        assert!(matches!(
            write_varint32_fixed(&mut buf, u32::MAX),
            Err(LarchError::VarintOverflow)
        ));
    }

    #[test]
    fn test_overflow_on_read() {
        // Four continuation bits in a row: too long for 32 bits.
        let buf = [0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        assert!(matches!(
            read_varint32(&buf),
            Err(LarchError::VarintOverflow)
        ));
        // Truncated input.
        let buf = [0x80, 0x80];
        assert!(matches!(
            read_varint32(&buf),
            Err(LarchError::VarintOverflow)
        ));
    }

    #[test]
    fn test_varint_single_byte() {
        let mut buf = [0u8; 4];
        assert_eq!(write_varint32(&mut buf, 0).unwrap(), 1);
        assert_eq!(buf[0], 0);

        assert_eq!(write_varint32(&mut buf, 127).unwrap(), 1);
        assert_eq!(buf[0], 127);
    }
}

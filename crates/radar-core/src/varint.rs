//! Avro Binary Primitives
//!
//! Avro encodes every `int` and `long` as a ZigZag-mapped variable-length
//! integer, and every `bytes`/`string` as a `long` length followed by the raw
//! bytes. The REST proxy binary RecordSet envelope is written entirely with
//! these primitives, so they live here rather than inside the Avro crate.
//!
//! ## Varint Encoding
//! - Each byte carries 7 bits of data and 1 continuation bit
//! - Small values (|n| < 64) take a single byte
//!
//! ## ZigZag Encoding
//! Maps signed integers onto unsigned ones so small negatives stay small:
//! - 0 → 0, -1 → 1, 1 → 2, -2 → 3, 2 → 4, etc.
//!
//! An Avro `int` is zig-zagged on 32 bits, a `long` on 64 bits. For every
//! `i32` both produce the same bytes, so [`put_int`] just widens.
//!
//! ## Usage
//! ```ignore
//! let mut buf = BytesMut::new();
//! put_int(&mut buf, 2);          // [4]
//! put_string(&mut buf, "b");     // [2, b'b']
//! let value = get_long(&mut buf.as_ref())?;
//! ```

use crate::error::{Error, Result};
use bytes::{Buf, BufMut};

/// Encode a signed integer as a varint (ZigZag encoding)
pub fn encode_varint(buf: &mut impl BufMut, value: i64) {
    let unsigned = ((value << 1) ^ (value >> 63)) as u64;

    encode_varint_u64(buf, unsigned);
}

/// Encode an unsigned integer as a varint
pub fn encode_varint_u64(buf: &mut impl BufMut, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;

        if value != 0 {
            byte |= 0x80; // continuation bit
        }

        buf.put_u8(byte);

        if value == 0 {
            break;
        }
    }
}

/// Decode a ZigZag varint to a signed integer
pub fn decode_varint(buf: &mut impl Buf) -> Result<i64> {
    let unsigned = decode_varint_u64(buf)?;

    let value = (unsigned >> 1) as i64;
    if (unsigned & 1) != 0 {
        Ok(!value)
    } else {
        Ok(value)
    }
}

/// Decode a varint to an unsigned integer
pub fn decode_varint_u64(buf: &mut impl Buf) -> Result<u64> {
    let mut value: u64 = 0;
    let mut shift = 0;

    loop {
        if !buf.has_remaining() {
            return Err(Error::UnexpectedEof);
        }
        let byte = buf.get_u8();
        value |= ((byte & 0x7F) as u64) << shift;

        if (byte & 0x80) == 0 {
            return Ok(value);
        }

        shift += 7;

        if shift >= 64 {
            return Err(Error::VarintOverflow);
        }
    }
}

/// Write an Avro `int`.
pub fn put_int(buf: &mut impl BufMut, value: i32) {
    encode_varint(buf, i64::from(value));
}

/// Write an Avro `long`.
pub fn put_long(buf: &mut impl BufMut, value: i64) {
    encode_varint(buf, value);
}

/// Write Avro `bytes`: length followed by content.
pub fn put_bytes(buf: &mut impl BufMut, value: &[u8]) {
    encode_varint(buf, value.len() as i64);
    buf.put_slice(value);
}

/// Write an Avro `string` as UTF-8 `bytes`.
pub fn put_string(buf: &mut impl BufMut, value: &str) {
    put_bytes(buf, value.as_bytes());
}

/// Read an Avro `long`.
pub fn get_long(buf: &mut impl Buf) -> Result<i64> {
    decode_varint(buf)
}

/// Read an Avro `int`, rejecting values outside the 32-bit range.
pub fn get_int(buf: &mut impl Buf) -> Result<i32> {
    let value = decode_varint(buf)?;
    i32::try_from(value).map_err(|_| Error::IntOverflow(value))
}

/// Read Avro `bytes`.
pub fn get_bytes(buf: &mut impl Buf) -> Result<Vec<u8>> {
    let len = decode_varint(buf)?;
    let len = usize::try_from(len).map_err(|_| Error::NegativeLength(len))?;
    if buf.remaining() < len {
        return Err(Error::UnexpectedEof);
    }
    let mut out = vec![0u8; len];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

/// Read an Avro `string`.
pub fn get_string(buf: &mut impl Buf) -> Result<String> {
    let raw = get_bytes(buf)?;
    String::from_utf8(raw).map_err(|e| Error::InvalidUtf8(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_varint_small_values() {
        for value in [0i64, 5, -5, 63, -64] {
            let mut buf = BytesMut::new();
            encode_varint(&mut buf, value);
            assert_eq!(buf.len(), 1);

            let mut cursor = buf.as_ref();
            assert_eq!(decode_varint(&mut cursor).unwrap(), value);
        }
    }

    #[test]
    fn test_varint_i64_boundaries() {
        for value in [i64::MAX, i64::MIN, i64::MIN + 1, -1_000_000, 1_000_000] {
            let mut buf = BytesMut::new();
            encode_varint(&mut buf, value);
            let mut cursor = buf.as_ref();
            assert_eq!(decode_varint(&mut cursor).unwrap(), value);
            assert_eq!(cursor.len(), 0);
        }
    }

    #[test]
    fn test_zigzag_encoding_pattern() {
        let pairs: Vec<(i64, u8)> = vec![(0, 0), (-1, 1), (1, 2), (-2, 3), (2, 4), (20, 40)];
        for (signed, expected) in pairs {
            let mut buf = BytesMut::new();
            encode_varint(&mut buf, signed);
            assert_eq!(buf.as_ref(), &[expected], "zigzag of {}", signed);
        }
    }

    #[test]
    fn test_varint_u64_power_of_two_boundaries() {
        let boundaries = [
            (1u64 << 7, 2),
            (1u64 << 14, 3),
            (1u64 << 21, 4),
            (1u64 << 28, 5),
            (1u64 << 63, 10),
        ];
        for (value, expected_bytes) in boundaries {
            let mut buf = BytesMut::new();
            encode_varint_u64(&mut buf, value);
            assert_eq!(buf.len(), expected_bytes, "value {}", value);
            let mut cursor = buf.as_ref();
            assert_eq!(decode_varint_u64(&mut cursor).unwrap(), value);
        }
    }

    #[test]
    fn test_int_matches_32_bit_zigzag() {
        // 32-bit zigzag of i32::MIN is u32::MAX: five bytes, all payload bits set
        let mut buf = BytesMut::new();
        put_int(&mut buf, i32::MIN);
        assert_eq!(buf.as_ref(), &[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);

        let mut cursor = buf.as_ref();
        assert_eq!(get_int(&mut cursor).unwrap(), i32::MIN);
    }

    #[test]
    fn test_string_is_length_prefixed() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "b");
        assert_eq!(buf.as_ref(), &[2, b'b']);

        let mut cursor = buf.as_ref();
        assert_eq!(get_string(&mut cursor).unwrap(), "b");
    }

    #[test]
    fn test_decode_truncated_input() {
        let data = [0x80u8, 0x80];
        let mut cursor = &data[..];
        assert!(matches!(
            decode_varint(&mut cursor),
            Err(Error::UnexpectedEof)
        ));

        let data = [10u8, b'a'];
        let mut cursor = &data[..];
        assert!(matches!(get_bytes(&mut cursor), Err(Error::UnexpectedEof)));
    }

    #[test]
    fn test_decode_overlong_varint() {
        let data = [0xFFu8; 11];
        let mut cursor = &data[..];
        assert!(matches!(
            decode_varint_u64(&mut cursor),
            Err(Error::VarintOverflow)
        ));
    }

    #[test]
    fn test_get_int_rejects_long_values() {
        let mut buf = BytesMut::new();
        put_long(&mut buf, i64::from(i32::MAX) + 1);
        let mut cursor = buf.as_ref();
        assert!(matches!(get_int(&mut cursor), Err(Error::IntOverflow(_))));
    }
}

use crate::error::{Error, Result};
use std::io::{self, Read, Write};

/// Encodes `value` as a packed (LEB128-style) unsigned integer: 7 bits of
/// payload per byte, high bit set on every byte but the last. 1–9 bytes for
/// the full `u64` range. Used for fragment indices, parcel sequences and
/// length prefixes inside fragments (§4.1).
pub fn write_packed_uint<W: Write>(mut writer: W, mut value: u64) -> Result<()> {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        writer.write_all(&[byte])?;
        if value == 0 {
            break;
        }
    }
    Ok(())
}

/// Returns the number of bytes `write_packed_uint` would emit for `value`.
pub fn packed_uint_len(mut value: u64) -> usize {
    let mut len = 1;
    value >>= 7;
    while value != 0 {
        len += 1;
        value >>= 7;
    }
    len
}

/// Decodes a packed unsigned integer. Rejects inputs whose implied byte count
/// would run past 9 bytes (the max for a `u64`) — a malformed or adversarial
/// stream cannot force unbounded reads.
pub fn read_packed_uint<R: Read>(mut reader: R) -> Result<u64> {
    let mut value: u64 = 0;
    let mut shift: u32 = 0;

    for _ in 0..9 {
        let mut byte = [0u8; 1];
        match reader.read_exact(&mut byte) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(Error::Malformed("packed uint: truncated"));
            }
            Err(err) => return Err(err.into()),
        }
        let byte = byte[0];
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }

    Err(Error::Malformed("packed uint: exceeds 9-byte limit"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: u64) {
        let mut buf = Vec::new();
        write_packed_uint(&mut buf, value).unwrap();
        assert_eq!(buf.len(), packed_uint_len(value));
        let decoded = read_packed_uint(&buf[..]).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn boundary_values() {
        for value in [0u64, 1, 127, 128, 16383, 16384, u32::MAX as u64, u64::MAX] {
            round_trip(value);
        }
    }

    #[test]
    fn single_byte_for_small_values() {
        let mut buf = Vec::new();
        write_packed_uint(&mut buf, 100).unwrap();
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn truncated_input_is_malformed() {
        let err = read_packed_uint(&[0x80u8][..]).unwrap_err();
        assert!(matches!(err, Error::Malformed(_)));
    }

    #[test]
    fn oversized_input_is_malformed() {
        let bytes = [0x80u8; 10];
        let err = read_packed_uint(&bytes[..]).unwrap_err();
        assert!(matches!(err, Error::Malformed(_)));
    }
}

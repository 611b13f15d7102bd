//! URL-safe base64, hand-rolled to the same "no bincode, no surprise crate
//! behavior for a wire format a foreign client has to match" philosophy the
//! teacher applies to its own packet codecs. Padding (`=`) is always emitted
//! on encode and accepted-or-absent on decode.

use crate::error::Error;

const ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

pub fn encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() + 2) / 3 * 4);
    for chunk in data.chunks(3) {
        let b0 = chunk[0];
        let b1 = *chunk.get(1).unwrap_or(&0);
        let b2 = *chunk.get(2).unwrap_or(&0);

        out.push(ALPHABET[(b0 >> 2) as usize] as char);
        out.push(ALPHABET[(((b0 & 0x03) << 4) | (b1 >> 4)) as usize] as char);
        out.push(if chunk.len() > 1 {
            ALPHABET[(((b1 & 0x0f) << 2) | (b2 >> 6)) as usize] as char
        } else {
            '='
        });
        out.push(if chunk.len() > 2 {
            ALPHABET[(b2 & 0x3f) as usize] as char
        } else {
            '='
        });
    }
    out
}

fn decode_char(c: u8) -> Option<u8> {
    match c {
        b'A'..=b'Z' => Some(c - b'A'),
        b'a'..=b'z' => Some(c - b'a' + 26),
        b'0'..=b'9' => Some(c - b'0' + 52),
        b'-' => Some(62),
        b'_' => Some(63),
        _ => None,
    }
}

pub fn decode(input: &str) -> Result<Vec<u8>, Error> {
    let trimmed = input.trim_end_matches('=');
    let bytes = trimmed.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() * 3 / 4 + 3);

    for chunk in bytes.chunks(4) {
        let mut values = [0u8; 4];
        for (i, &c) in chunk.iter().enumerate() {
            values[i] = decode_char(c).ok_or(Error::Malformed("base64: invalid character"))?;
        }

        out.push((values[0] << 2) | (values[1] >> 4));
        if chunk.len() > 2 {
            out.push((values[1] << 4) | (values[2] >> 2));
        }
        if chunk.len() > 3 {
            out.push((values[2] << 6) | values[3]);
        }
    }

    Ok(out)
}

/// `serde(with = "base64")` support for fixed-size byte array fields, mirroring
/// `flux::session::server::SessionKey`'s serde helpers.
pub mod serde_fixed {
    use super::{decode, encode};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S, const N: usize>(bytes: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&encode(bytes))
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = <&str>::deserialize(deserializer)?;
        let decoded = decode(raw).map_err(de::Error::custom)?;
        if decoded.len() != N {
            return Err(de::Error::custom(format!(
                "expected {} decoded bytes, got {}",
                N,
                decoded.len()
            )));
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&decoded);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_various_lengths() {
        for len in 0..=40 {
            let data: Vec<u8> = (0..len as u8).collect();
            let encoded = encode(&data);
            let decoded = decode(&encoded).unwrap();
            assert_eq!(decoded, data, "len={}", len);
        }
    }

    #[test]
    fn padding_present_on_encode() {
        assert_eq!(encode(b"a"), "YQ==");
        assert_eq!(encode(b"ab"), "YWI=");
        assert_eq!(encode(b"abc"), "YWJj");
    }

    #[test]
    fn decode_without_padding() {
        assert_eq!(decode("YQ").unwrap(), b"a");
    }

    #[test]
    fn url_safe_alphabet_round_trips() {
        let data = [0xfb, 0xff, 0xbf];
        let encoded = encode(&data);
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        assert_eq!(decode(&encoded).unwrap(), data);
    }
}

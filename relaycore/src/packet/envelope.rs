//! Binds a packet header to its AEAD-sealed body for every packet kind
//! except `REQUEST`, which carries its own connect-token encryption and
//! skips this envelope entirely (§4.3).

use super::{envelope_associated_data, PacketKind};
use crate::codec::PacketHeader;
use crate::crypto::{self, KEY_SIZE, MAC_SIZE};
use crate::error::{Error, Result};
use std::io::Cursor;

/// Encodes `header.encode() || AEAD-seal(plaintext)`, using `header.sequence`
/// as the nonce input and `version ‖ protocol_id ‖ header_byte` as the
/// associated data.
pub fn encrypt(
    header: &PacketHeader,
    plaintext: &[u8],
    version: &[u8; 13],
    protocol_id: u64,
    key: &[u8; KEY_SIZE],
) -> Result<Vec<u8>> {
    if matches!(header.kind, PacketKind::Request) {
        return Err(Error::IllegalState("REQUEST packets are not AEAD-enveloped"));
    }

    let mut out = Vec::new();
    header.encode(&mut out)?;
    let header_byte = out[0];

    let ad = envelope_associated_data(version, protocol_id, header_byte);
    let mut cipher = vec![0u8; plaintext.len() + MAC_SIZE];
    crypto::encrypt(&mut cipher, plaintext, key, header.sequence, &ad);
    out.extend_from_slice(&cipher);
    Ok(out)
}

/// Reads just the plaintext header, returning its kind and sequence without
/// touching the sealed body. Lets a caller check the sequence against its
/// replay window *before* paying for AEAD verification (§3): a replayed
/// sequence is then rejected for the cost of a header parse rather than a
/// full decrypt.
pub fn peek_header(bytes: &[u8]) -> Result<(PacketKind, u64)> {
    if bytes.is_empty() {
        return Err(Error::Malformed("envelope: empty packet"));
    }
    let mut cursor = Cursor::new(bytes);
    let header = PacketHeader::decode(&mut cursor)?;
    if matches!(header.kind, PacketKind::Request) {
        return Err(Error::IllegalState("REQUEST packets are not AEAD-enveloped"));
    }
    Ok((header.kind, header.sequence))
}

/// Decodes a header and opens its sealed body. Returns the header's kind and
/// sequence alongside the recovered plaintext.
pub fn decrypt(
    bytes: &[u8],
    version: &[u8; 13],
    protocol_id: u64,
    key: &[u8; KEY_SIZE],
) -> Result<(PacketKind, u64, Vec<u8>)> {
    if bytes.is_empty() {
        return Err(Error::Malformed("envelope: empty packet"));
    }
    let header_byte = bytes[0];

    let mut cursor = Cursor::new(bytes);
    let header = PacketHeader::decode(&mut cursor)?;
    if matches!(header.kind, PacketKind::Request) {
        return Err(Error::IllegalState("REQUEST packets are not AEAD-enveloped"));
    }
    let header_len = cursor.position() as usize;

    let cipher = &bytes[header_len..];
    if cipher.len() < MAC_SIZE {
        return Err(Error::Malformed("envelope: body shorter than MAC"));
    }

    let ad = envelope_associated_data(version, protocol_id, header_byte);
    let mut plain = vec![0u8; cipher.len() - MAC_SIZE];
    if !crypto::decrypt(&mut plain, cipher, key, header.sequence, &ad) {
        return Err(Error::CryptoFailed);
    }

    Ok((header.kind, header.sequence, plain))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERSION: [u8; 13] = crate::codec::token::VERSION;

    #[test]
    fn round_trip() {
        let key = [5u8; KEY_SIZE];
        let header = PacketHeader { kind: PacketKind::Payload, sequence: 77 };
        let sealed = encrypt(&header, b"parcel fragment bytes", &VERSION, 9, &key).unwrap();

        let (kind, sequence, plain) = decrypt(&sealed, &VERSION, 9, &key).unwrap();
        assert_eq!(kind, PacketKind::Payload);
        assert_eq!(sequence, 77);
        assert_eq!(plain, b"parcel fragment bytes");
    }

    #[test]
    fn wrong_protocol_id_fails() {
        let key = [5u8; KEY_SIZE];
        let header = PacketHeader { kind: PacketKind::KeepAlive, sequence: 1 };
        let sealed = encrypt(&header, b"body", &VERSION, 9, &key).unwrap();
        assert!(decrypt(&sealed, &VERSION, 10, &key).is_err());
    }

    #[test]
    fn request_kind_rejected() {
        let key = [5u8; KEY_SIZE];
        let header = PacketHeader { kind: PacketKind::Request, sequence: 0 };
        assert!(encrypt(&header, b"", &VERSION, 9, &key).is_err());
    }

    #[test]
    fn tampered_body_fails() {
        let key = [5u8; KEY_SIZE];
        let header = PacketHeader { kind: PacketKind::Disconnect, sequence: 3 };
        let mut sealed = encrypt(&header, b"", &VERSION, 9, &key).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert!(decrypt(&sealed, &VERSION, 9, &key).is_err());
    }

    #[test]
    fn peek_header_reads_sequence_without_the_key() {
        let key = [5u8; KEY_SIZE];
        let header = PacketHeader { kind: PacketKind::Payload, sequence: 200 };
        let sealed = encrypt(&header, b"fragment", &VERSION, 9, &key).unwrap();

        let (kind, sequence) = peek_header(&sealed).unwrap();
        assert_eq!(kind, PacketKind::Payload);
        assert_eq!(sequence, 200);
    }

    #[test]
    fn tampered_body_leaves_peeked_sequence_readable() {
        let key = [5u8; KEY_SIZE];
        let header = PacketHeader { kind: PacketKind::Payload, sequence: 9 };
        let mut sealed = encrypt(&header, b"x", &VERSION, 9, &key).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;

        let (_, sequence) = peek_header(&sealed).unwrap();
        assert_eq!(sequence, 9);
        assert!(decrypt(&sealed, &VERSION, 9, &key).is_err());
    }
}

use crate::codec::token::{PrivateToken, ENCRYPTED_PRIVATE_SIZE};
use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// `REQUEST` is the one packet variant whose header is the sentinel class
/// byte `0` and which has no sequence field of its own — it carries the
/// client's connect-token public fields plus the still-encrypted private
/// section, exactly as it appears inside the token (§4.6, §6).
pub struct RequestPacket {
    pub version: [u8; 13],
    pub protocol_id: u64,
    pub expire_timestamp: u64,
    pub nonce: [u8; 24],
    pub encrypted_private: [u8; ENCRYPTED_PRIVATE_SIZE],
}

impl RequestPacket {
    pub const SIZE: usize = 13 + 8 + 8 + 24 + ENCRYPTED_PRIVATE_SIZE;

    pub fn encode<W: Write>(&self, mut w: W) -> Result<()> {
        w.write_all(&self.version)?;
        w.write_u64::<LittleEndian>(self.protocol_id)?;
        w.write_u64::<LittleEndian>(self.expire_timestamp)?;
        w.write_all(&self.nonce)?;
        w.write_all(&self.encrypted_private)?;
        Ok(())
    }

    pub fn decode<R: Read>(mut r: R) -> Result<RequestPacket> {
        let mut version = [0u8; 13];
        r.read_exact(&mut version)
            .map_err(|_| Error::Malformed("request: truncated version"))?;
        let protocol_id = r
            .read_u64::<LittleEndian>()
            .map_err(|_| Error::Malformed("request: truncated protocol_id"))?;
        let expire_timestamp = r
            .read_u64::<LittleEndian>()
            .map_err(|_| Error::Malformed("request: truncated expire_timestamp"))?;
        let mut nonce = [0u8; 24];
        r.read_exact(&mut nonce)
            .map_err(|_| Error::Malformed("request: truncated nonce"))?;
        let mut encrypted_private = [0u8; ENCRYPTED_PRIVATE_SIZE];
        r.read_exact(&mut encrypted_private)
            .map_err(|_| Error::Malformed("request: truncated private section"))?;

        Ok(RequestPacket {
            version,
            protocol_id,
            expire_timestamp,
            nonce,
            encrypted_private,
        })
    }

    /// Decrypts and validates the private section, consuming `self`.
    pub fn into_private(self, server_key: &[u8; crate::crypto::KEY_SIZE]) -> Result<PrivateToken> {
        PrivateToken::decrypt(
            &self.encrypted_private,
            &self.version,
            self.protocol_id,
            self.expire_timestamp,
            &self.nonce,
            server_key,
        )
    }
}

//! Connect-token wire codec (§3, §6): a fixed 2048-byte structure whose
//! private section is AEAD-sealed under the server's private key. Encode is
//! bijective with decode given the key; any tampered byte in the private
//! section fails AEAD verification without revealing partial plaintext.

use crate::crypto::{self, KEY_SIZE, MAC_SIZE};
use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::convert::TryInto;
use std::io::{Cursor, Read, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// `"RELAYNET 1.0\0"` — 12 printable bytes plus a trailing nul, matching the
/// fixed 13-byte version tag slot in the public token header.
pub const VERSION: [u8; 13] = *b"RELAYNET 1.0\0";

pub const MAX_ADDRESSES: usize = 32;
pub const USER_DATA_SIZE: usize = 256;
pub const NONCE_SIZE: usize = 24;

/// Plaintext size of the private section before the AEAD tag is appended.
pub const PRIVATE_PLAINTEXT_SIZE: usize = 1024;
pub const ENCRYPTED_PRIVATE_SIZE: usize = PRIVATE_PLAINTEXT_SIZE + MAC_SIZE;

const OFFSET_VERSION: usize = 0;
const OFFSET_PROTOCOL_ID: usize = 13;
const OFFSET_CREATE_TIMESTAMP: usize = 21;
const OFFSET_EXPIRE_TIMESTAMP: usize = 29;
const OFFSET_NONCE: usize = 37;
const OFFSET_PRIVATE: usize = 61;
/// Public (client-readable) copy of the timeout and address list. The
/// client has no way to decrypt the private section, so it needs its own
/// plaintext copy to know where to send `REQUEST` and what idle timeout to
/// expect; the server trusts the private section's copy as authoritative
/// and never reads this one.
const OFFSET_TIMEOUT_SECONDS: usize = OFFSET_PRIVATE + ENCRYPTED_PRIVATE_SIZE;
const OFFSET_ADDRESS_COUNT: usize = OFFSET_TIMEOUT_SECONDS + 4;
const OFFSET_ADDRESSES: usize = OFFSET_ADDRESS_COUNT + 1;
const OFFSET_CLIENT_TO_SERVER_KEY: usize = 1984;
const OFFSET_SERVER_TO_CLIENT_KEY: usize = 2016;

pub const TOKEN_SIZE: usize = 2048;

/// The public fields of a connect token, readable without the server's
/// private key. `decode_public` validates these before any decryption is
/// attempted.
#[derive(Debug)]
pub struct PublicToken {
    pub version: [u8; 13],
    pub protocol_id: u64,
    pub create_timestamp: u64,
    pub expire_timestamp: u64,
    pub nonce: [u8; NONCE_SIZE],
}

/// The server-private portion of a connect token, decrypted from the
/// AEAD-sealed private section.
#[derive(Clone, Debug)]
pub struct PrivateToken {
    pub client_id: i64,
    /// Idle timeout in seconds; negative means no idle timeout.
    pub timeout_seconds: i32,
    pub addresses: Vec<SocketAddr>,
    pub client_to_server_key: [u8; KEY_SIZE],
    pub server_to_client_key: [u8; KEY_SIZE],
    pub user_data: [u8; USER_DATA_SIZE],
}

impl PrivateToken {
    fn encode_plaintext(&self) -> Result<[u8; PRIVATE_PLAINTEXT_SIZE]> {
        if self.addresses.is_empty() || self.addresses.len() > MAX_ADDRESSES {
            return Err(Error::InvalidArgument("token address count must be 1..=32"));
        }

        let mut buf = [0u8; PRIVATE_PLAINTEXT_SIZE];
        {
            let mut cursor = Cursor::new(&mut buf[..]);
            cursor.write_i64::<LittleEndian>(self.client_id)?;
            cursor.write_i32::<LittleEndian>(self.timeout_seconds)?;
            cursor.write_u8(self.addresses.len() as u8)?;
            for addr in &self.addresses {
                write_address(&mut cursor, addr)?;
            }
            cursor.write_all(&self.client_to_server_key)?;
            cursor.write_all(&self.server_to_client_key)?;
            cursor.write_all(&self.user_data)?;
        }
        Ok(buf)
    }

    fn decode_plaintext(plain: &[u8; PRIVATE_PLAINTEXT_SIZE]) -> Result<PrivateToken> {
        let mut cursor = Cursor::new(&plain[..]);
        let client_id = cursor.read_i64::<LittleEndian>()?;
        let timeout_seconds = cursor.read_i32::<LittleEndian>()?;
        let address_count = cursor.read_u8()? as usize;

        if address_count == 0 || address_count > MAX_ADDRESSES {
            return Err(Error::Malformed("token: address count out of range"));
        }

        let mut addresses = Vec::with_capacity(address_count);
        for _ in 0..address_count {
            addresses.push(read_address(&mut cursor)?);
        }

        let mut client_to_server_key = [0u8; KEY_SIZE];
        cursor.read_exact(&mut client_to_server_key)?;
        let mut server_to_client_key = [0u8; KEY_SIZE];
        cursor.read_exact(&mut server_to_client_key)?;
        let mut user_data = [0u8; USER_DATA_SIZE];
        cursor.read_exact(&mut user_data)?;

        Ok(PrivateToken {
            client_id,
            timeout_seconds,
            addresses,
            client_to_server_key,
            server_to_client_key,
            user_data,
        })
    }

    /// Encrypts this private token under `server_key`, using `nonce` (the
    /// public token's 24-byte nonce field, truncated to the 12 bytes the
    /// chosen IETF AEAD construction requires) and associated data
    /// `version ‖ protocol_id ‖ expire_timestamp`.
    pub fn encrypt(
        &self,
        version: &[u8; 13],
        protocol_id: u64,
        expire_timestamp: u64,
        nonce: &[u8; NONCE_SIZE],
        server_key: &[u8; KEY_SIZE],
    ) -> Result<[u8; ENCRYPTED_PRIVATE_SIZE]> {
        let plaintext = self.encode_plaintext()?;
        let ad = associated_data(version, protocol_id, expire_timestamp);

        let mut out = [0u8; ENCRYPTED_PRIVATE_SIZE];
        crypto::encrypt_with_nonce(&mut out, &plaintext, server_key, &aead_nonce(nonce), &ad);
        Ok(out)
    }

    /// Decrypts and parses a private section. Returns a recoverable error on
    /// tag mismatch without revealing partial plaintext (the failed `decrypt`
    /// writes into a buffer this function drops without decoding).
    pub fn decrypt(
        encrypted: &[u8; ENCRYPTED_PRIVATE_SIZE],
        version: &[u8; 13],
        protocol_id: u64,
        expire_timestamp: u64,
        nonce: &[u8; NONCE_SIZE],
        server_key: &[u8; KEY_SIZE],
    ) -> Result<PrivateToken> {
        let ad = associated_data(version, protocol_id, expire_timestamp);
        let mut plain = [0u8; PRIVATE_PLAINTEXT_SIZE];

        if !crypto::decrypt_with_nonce(&mut plain, encrypted, server_key, &aead_nonce(nonce), &ad) {
            return Err(Error::CryptoFailed);
        }

        Self::decode_plaintext(&plain)
    }
}

fn aead_nonce(token_nonce: &[u8; NONCE_SIZE]) -> [u8; crypto::NONCE_SIZE] {
    let mut nonce = [0u8; crypto::NONCE_SIZE];
    nonce.copy_from_slice(&token_nonce[..crypto::NONCE_SIZE]);
    nonce
}

fn associated_data(version: &[u8; 13], protocol_id: u64, expire_timestamp: u64) -> Vec<u8> {
    let mut ad = Vec::with_capacity(13 + 8 + 8);
    ad.extend_from_slice(version);
    ad.extend_from_slice(&protocol_id.to_le_bytes());
    ad.extend_from_slice(&expire_timestamp.to_le_bytes());
    ad
}

fn write_address<W: Write>(mut w: W, addr: &SocketAddr) -> Result<()> {
    match addr.ip() {
        IpAddr::V4(v4) => {
            w.write_u8(1)?;
            w.write_all(&v4.octets())?;
        }
        IpAddr::V6(v6) => {
            w.write_u8(2)?;
            w.write_all(&v6.octets())?;
        }
    }
    w.write_u16::<LittleEndian>(addr.port())?;
    Ok(())
}

fn read_address<R: Read>(mut r: R) -> Result<SocketAddr> {
    let tag = r.read_u8()?;
    let ip = match tag {
        1 => {
            let mut octets = [0u8; 4];
            r.read_exact(&mut octets)?;
            IpAddr::V4(Ipv4Addr::from(octets))
        }
        2 => {
            let mut octets = [0u8; 16];
            r.read_exact(&mut octets)?;
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        _ => return Err(Error::Malformed("token: unknown address type tag")),
    };
    let port = r.read_u16::<LittleEndian>()?;
    Ok(SocketAddr::new(ip, port))
}

/// The full 2048-byte connect token, as handed to a client over whatever
/// out-of-band channel the application uses (HTTP token distribution is
/// explicitly out of scope for this crate).
pub struct ConnectToken {
    pub protocol_id: u64,
    pub create_timestamp: u64,
    pub expire_timestamp: u64,
    pub nonce: [u8; NONCE_SIZE],
    pub encrypted_private: [u8; ENCRYPTED_PRIVATE_SIZE],
    /// Public copy of the idle timeout; see `OFFSET_TIMEOUT_SECONDS`.
    pub timeout_seconds: i32,
    /// Public copy of the address list; see `OFFSET_ADDRESSES`.
    pub addresses: Vec<SocketAddr>,
    pub client_to_server_key: [u8; KEY_SIZE],
    pub server_to_client_key: [u8; KEY_SIZE],
}

impl ConnectToken {
    /// Builds and seals a fresh connect token for `client_id`, following the
    /// teacher's `Authenticator::create_token` generation flow (random key
    /// pair, AEAD-seal the private section) adapted to the UDP wire layout.
    pub fn generate(
        client_id: i64,
        timeout_seconds: i32,
        addresses: Vec<SocketAddr>,
        user_data: [u8; USER_DATA_SIZE],
        protocol_id: u64,
        expire_timestamp: u64,
        create_timestamp: u64,
        server_key: &[u8; KEY_SIZE],
    ) -> Result<(ConnectToken, PrivateToken)> {
        let mut client_to_server_key = [0u8; KEY_SIZE];
        let mut server_to_client_key = [0u8; KEY_SIZE];
        crypto::random_bytes(&mut client_to_server_key);
        crypto::random_bytes(&mut server_to_client_key);

        let mut nonce = [0u8; NONCE_SIZE];
        crypto::random_bytes(&mut nonce);

        let private = PrivateToken {
            client_id,
            timeout_seconds,
            addresses: addresses.clone(),
            client_to_server_key,
            server_to_client_key,
            user_data,
        };

        let encrypted_private =
            private.encrypt(&VERSION, protocol_id, expire_timestamp, &nonce, server_key)?;

        let token = ConnectToken {
            protocol_id,
            create_timestamp,
            expire_timestamp,
            nonce,
            encrypted_private,
            timeout_seconds,
            addresses,
            client_to_server_key,
            server_to_client_key,
        };

        Ok((token, private))
    }

    pub fn encode(&self) -> Result<[u8; TOKEN_SIZE]> {
        if self.addresses.is_empty() || self.addresses.len() > MAX_ADDRESSES {
            return Err(Error::InvalidArgument("token address count must be 1..=32"));
        }

        let mut buf = [0u8; TOKEN_SIZE];
        buf[OFFSET_VERSION..OFFSET_VERSION + 13].copy_from_slice(&VERSION);
        buf[OFFSET_PROTOCOL_ID..OFFSET_PROTOCOL_ID + 8]
            .copy_from_slice(&self.protocol_id.to_le_bytes());
        buf[OFFSET_CREATE_TIMESTAMP..OFFSET_CREATE_TIMESTAMP + 8]
            .copy_from_slice(&self.create_timestamp.to_le_bytes());
        buf[OFFSET_EXPIRE_TIMESTAMP..OFFSET_EXPIRE_TIMESTAMP + 8]
            .copy_from_slice(&self.expire_timestamp.to_le_bytes());
        buf[OFFSET_NONCE..OFFSET_NONCE + NONCE_SIZE].copy_from_slice(&self.nonce);
        buf[OFFSET_PRIVATE..OFFSET_PRIVATE + ENCRYPTED_PRIVATE_SIZE]
            .copy_from_slice(&self.encrypted_private);
        buf[OFFSET_TIMEOUT_SECONDS..OFFSET_TIMEOUT_SECONDS + 4]
            .copy_from_slice(&self.timeout_seconds.to_le_bytes());
        buf[OFFSET_ADDRESS_COUNT] = self.addresses.len() as u8;
        {
            let mut cursor = Cursor::new(&mut buf[OFFSET_ADDRESSES..OFFSET_CLIENT_TO_SERVER_KEY]);
            for addr in &self.addresses {
                write_address(&mut cursor, addr)?;
            }
        }
        buf[OFFSET_CLIENT_TO_SERVER_KEY..OFFSET_CLIENT_TO_SERVER_KEY + KEY_SIZE]
            .copy_from_slice(&self.client_to_server_key);
        buf[OFFSET_SERVER_TO_CLIENT_KEY..OFFSET_SERVER_TO_CLIENT_KEY + KEY_SIZE]
            .copy_from_slice(&self.server_to_client_key);
        Ok(buf)
    }

    /// Parses and validates the public fields only — version tag and current
    /// time versus `expire_timestamp`. Must succeed before any attempt to
    /// decrypt the private section (§3 invariant).
    pub fn decode_public(bytes: &[u8], now_ms: u64) -> Result<PublicToken> {
        if bytes.len() != TOKEN_SIZE {
            return Err(Error::Malformed("token: wrong size"));
        }

        let mut version = [0u8; 13];
        version.copy_from_slice(&bytes[OFFSET_VERSION..OFFSET_VERSION + 13]);
        if version != VERSION {
            return Err(Error::Malformed("token: version mismatch"));
        }

        let protocol_id = u64::from_le_bytes(
            bytes[OFFSET_PROTOCOL_ID..OFFSET_PROTOCOL_ID + 8]
                .try_into()
                .unwrap(),
        );
        let create_timestamp = u64::from_le_bytes(
            bytes[OFFSET_CREATE_TIMESTAMP..OFFSET_CREATE_TIMESTAMP + 8]
                .try_into()
                .unwrap(),
        );
        let expire_timestamp = u64::from_le_bytes(
            bytes[OFFSET_EXPIRE_TIMESTAMP..OFFSET_EXPIRE_TIMESTAMP + 8]
                .try_into()
                .unwrap(),
        );

        if now_ms > expire_timestamp {
            return Err(Error::ConnectTimedOut);
        }

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[OFFSET_NONCE..OFFSET_NONCE + NONCE_SIZE]);

        Ok(PublicToken {
            version,
            protocol_id,
            create_timestamp,
            expire_timestamp,
            nonce,
        })
    }

    /// Parses the full token, including client-side keys, without touching
    /// the still-encrypted private section. Used client-side after
    /// `decode_public` succeeds.
    pub fn decode(bytes: &[u8], now_ms: u64) -> Result<ConnectToken> {
        let public = Self::decode_public(bytes, now_ms)?;

        let mut encrypted_private = [0u8; ENCRYPTED_PRIVATE_SIZE];
        encrypted_private
            .copy_from_slice(&bytes[OFFSET_PRIVATE..OFFSET_PRIVATE + ENCRYPTED_PRIVATE_SIZE]);

        let mut client_to_server_key = [0u8; KEY_SIZE];
        client_to_server_key.copy_from_slice(
            &bytes[OFFSET_CLIENT_TO_SERVER_KEY..OFFSET_CLIENT_TO_SERVER_KEY + KEY_SIZE],
        );
        let mut server_to_client_key = [0u8; KEY_SIZE];
        server_to_client_key.copy_from_slice(
            &bytes[OFFSET_SERVER_TO_CLIENT_KEY..OFFSET_SERVER_TO_CLIENT_KEY + KEY_SIZE],
        );

        let timeout_seconds = i32::from_le_bytes(
            bytes[OFFSET_TIMEOUT_SECONDS..OFFSET_TIMEOUT_SECONDS + 4]
                .try_into()
                .unwrap(),
        );
        let address_count = bytes[OFFSET_ADDRESS_COUNT] as usize;
        if address_count == 0 || address_count > MAX_ADDRESSES {
            return Err(Error::Malformed("token: address count out of range"));
        }
        let mut cursor = Cursor::new(&bytes[OFFSET_ADDRESSES..OFFSET_CLIENT_TO_SERVER_KEY]);
        let mut addresses = Vec::with_capacity(address_count);
        for _ in 0..address_count {
            addresses.push(read_address(&mut cursor)?);
        }

        Ok(ConnectToken {
            protocol_id: public.protocol_id,
            create_timestamp: public.create_timestamp,
            expire_timestamp: public.expire_timestamp,
            nonce: public.nonce,
            encrypted_private,
            timeout_seconds,
            addresses,
            client_to_server_key,
            server_to_client_key,
        })
    }
}

//! The challenge token a server seals and a client blindly echoes back to
//! prove it can round-trip a server-sealed blob without the server keeping
//! per-in-flight-request state (§3).

use crate::codec::token::USER_DATA_SIZE;
use crate::crypto::{self, KEY_SIZE, MAC_SIZE};
use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

const PLAINTEXT_SIZE: usize = 8 + USER_DATA_SIZE;
pub const ENCRYPTED_SIZE: usize = PLAINTEXT_SIZE + MAC_SIZE;

pub struct ChallengeToken {
    pub client_id: i64,
    pub user_data: [u8; USER_DATA_SIZE],
}

impl ChallengeToken {
    pub fn encrypt(
        &self,
        sequence: u64,
        challenge_key: &[u8; KEY_SIZE],
    ) -> [u8; ENCRYPTED_SIZE] {
        let mut plain = [0u8; PLAINTEXT_SIZE];
        {
            let mut cursor = Cursor::new(&mut plain[..]);
            cursor.write_i64::<LittleEndian>(self.client_id).unwrap();
            cursor.write_all(&self.user_data).unwrap();
        }

        let mut out = [0u8; ENCRYPTED_SIZE];
        crypto::encrypt(&mut out, &plain, challenge_key, sequence, &[]);
        out
    }

    pub fn decrypt(
        encrypted: &[u8; ENCRYPTED_SIZE],
        sequence: u64,
        challenge_key: &[u8; KEY_SIZE],
    ) -> Result<ChallengeToken> {
        let mut plain = [0u8; PLAINTEXT_SIZE];
        if !crypto::decrypt(&mut plain, encrypted, challenge_key, sequence, &[]) {
            return Err(Error::CryptoFailed);
        }

        let mut cursor = Cursor::new(&plain[..]);
        let client_id = cursor.read_i64::<LittleEndian>()?;
        let mut user_data = [0u8; USER_DATA_SIZE];
        cursor.read_exact(&mut user_data)?;

        Ok(ChallengeToken { client_id, user_data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let key = [3u8; KEY_SIZE];
        let token = ChallengeToken {
            client_id: 42,
            user_data: [7u8; USER_DATA_SIZE],
        };
        let encrypted = token.encrypt(1, &key);
        let decoded = ChallengeToken::decrypt(&encrypted, 1, &key).unwrap();
        assert_eq!(decoded.client_id, 42);
        assert_eq!(decoded.user_data, [7u8; USER_DATA_SIZE]);
    }

    #[test]
    fn wrong_sequence_fails() {
        let key = [3u8; KEY_SIZE];
        let token = ChallengeToken {
            client_id: 42,
            user_data: [0u8; USER_DATA_SIZE],
        };
        let encrypted = token.encrypt(1, &key);
        assert!(ChallengeToken::decrypt(&encrypted, 2, &key).is_err());
    }
}

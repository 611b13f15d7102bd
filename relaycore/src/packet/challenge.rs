use crate::error::Result;
use crate::protocol::challenge_token::ENCRYPTED_SIZE as CHALLENGE_SIZE;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Server → client. Carries a server-sealed challenge token the client must
/// echo back unmodified in `RESPONSE` (§3).
pub struct ChallengePacket {
    pub token_sequence: u64,
    pub encrypted_token: [u8; CHALLENGE_SIZE],
}

impl ChallengePacket {
    pub const SIZE: usize = 8 + CHALLENGE_SIZE;

    pub fn encode<W: Write>(&self, mut w: W) -> Result<()> {
        w.write_u64::<LittleEndian>(self.token_sequence)?;
        w.write_all(&self.encrypted_token)?;
        Ok(())
    }

    pub fn decode<R: Read>(mut r: R) -> Result<ChallengePacket> {
        let token_sequence = r.read_u64::<LittleEndian>()?;
        let mut encrypted_token = [0u8; CHALLENGE_SIZE];
        r.read_exact(&mut encrypted_token)?;
        Ok(ChallengePacket { token_sequence, encrypted_token })
    }
}

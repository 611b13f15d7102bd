use crate::error::Result;
use std::io::{Read, Write};

/// Server → client, empty body: the handshake was rejected (§3, §7
/// `ConnectResult::Denied`).
pub struct DeniedPacket;

impl DeniedPacket {
    pub fn encode<W: Write>(&self, _w: W) -> Result<()> {
        Ok(())
    }

    pub fn decode<R: Read>(_r: R) -> Result<DeniedPacket> {
        Ok(DeniedPacket)
    }
}

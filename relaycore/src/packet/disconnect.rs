use crate::error::Result;
use std::io::{Read, Write};

/// Either direction, empty body: a deliberate session teardown (§3). Sent in
/// a small burst to defeat packet loss (§4.6).
pub struct DisconnectPacket;

impl DisconnectPacket {
    pub fn encode<W: Write>(&self, _w: W) -> Result<()> {
        Ok(())
    }

    pub fn decode<R: Read>(_r: R) -> Result<DisconnectPacket> {
        Ok(DisconnectPacket)
    }
}

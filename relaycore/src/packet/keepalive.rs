use crate::error::Result;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Either direction: carries the client id, and — server to client only —
/// the server's wall clock at send time, which the client uses to compute
/// its clock offset (§4.7 "Clock-offset estimation"). Clients send `0` for
/// `server_time_ms`; it is ignored on the server side.
pub struct KeepAlivePacket {
    pub client_id: u64,
    pub server_time_ms: u64,
}

impl KeepAlivePacket {
    pub const SIZE: usize = 16;

    pub fn encode<W: Write>(&self, mut w: W) -> Result<()> {
        w.write_u64::<LittleEndian>(self.client_id)?;
        w.write_u64::<LittleEndian>(self.server_time_ms)?;
        Ok(())
    }

    pub fn decode<R: Read>(mut r: R) -> Result<KeepAlivePacket> {
        let client_id = r.read_u64::<LittleEndian>()?;
        let server_time_ms = r.read_u64::<LittleEndian>()?;
        Ok(KeepAlivePacket { client_id, server_time_ms })
    }
}

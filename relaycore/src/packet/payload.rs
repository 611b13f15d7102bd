use crate::error::Result;
use std::io::{Read, Write};

/// Either direction: an opaque byte range that, once decrypted, is handed
/// straight to the delivery engine's fragment reader. The protocol layer
/// does not interpret it beyond length-prefix free pass-through — fragment
/// structure is the delivery engine's concern (§4.3, §4.7).
pub struct PayloadPacket {
    pub body: Vec<u8>,
}

impl PayloadPacket {
    pub fn encode<W: Write>(&self, mut w: W) -> Result<()> {
        w.write_all(&self.body)?;
        Ok(())
    }

    pub fn decode<R: Read>(mut r: R) -> Result<PayloadPacket> {
        let mut body = Vec::new();
        r.read_to_end(&mut body)?;
        Ok(PayloadPacket { body })
    }
}

//! Packet variants, their plaintext bodies and the dispatch table that binds
//! a wire `PacketKind` to its encode/decode/envelope behavior (§4.3).

mod challenge;
mod denied;
mod disconnect;
pub mod envelope;
mod keepalive;
mod payload;
mod request;
mod response;

pub use challenge::ChallengePacket;
pub use denied::DeniedPacket;
pub use disconnect::DisconnectPacket;
pub use keepalive::KeepAlivePacket;
pub use payload::PayloadPacket;
pub use request::RequestPacket;
pub use response::ResponsePacket;

use crate::error::{Error, Result};

/// The 4-bit packet type tag (low nibble of the header byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Request = 0,
    Denied = 1,
    Challenge = 2,
    Response = 3,
    KeepAlive = 4,
    Payload = 5,
    Disconnect = 6,
}

impl PacketKind {
    #[inline]
    pub fn from_tag(tag: u8) -> Result<PacketKind> {
        match tag {
            0 => Ok(PacketKind::Request),
            1 => Ok(PacketKind::Denied),
            2 => Ok(PacketKind::Challenge),
            3 => Ok(PacketKind::Response),
            4 => Ok(PacketKind::KeepAlive),
            5 => Ok(PacketKind::Payload),
            6 => Ok(PacketKind::Disconnect),
            _ => Err(Error::Malformed("packet: unknown type tag")),
        }
    }

    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// Computes the AEAD associated data for any non-REQUEST packet envelope:
/// `version ‖ protocol_id ‖ header_byte` (§4.3).
pub fn envelope_associated_data(version: &[u8; 13], protocol_id: u64, header_byte: u8) -> Vec<u8> {
    let mut ad = Vec::with_capacity(13 + 8 + 1);
    ad.extend_from_slice(version);
    ad.extend_from_slice(&protocol_id.to_le_bytes());
    ad.push(header_byte);
    ad
}

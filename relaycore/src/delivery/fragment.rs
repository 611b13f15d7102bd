//! Wire layout for one fragment inside a `PAYLOAD` packet body (§4.7, §6).

use crate::codec::varint::{read_packed_uint, write_packed_uint};
use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Delivery mode, encoded as the low 2 bits of the fragment's mode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Unreliable = 0b00,
    Sequenced = 0b01,
    Reliable = 0b10,
}

impl Mode {
    fn from_bits(bits: u8) -> Result<Mode> {
        match bits {
            0b00 => Ok(Mode::Unreliable),
            0b01 => Ok(Mode::Sequenced),
            0b10 => Ok(Mode::Reliable),
            _ => Err(Error::Malformed("fragment: unknown delivery mode")),
        }
    }
}

const LAST_FRAGMENT_BIT: u8 = 0b0000_0100;
const HAS_ACK_BIT: u8 = 0b0000_1000;
const ACK_ONLY_BIT: u8 = 0b0001_0000;

/// Reliable-mode ACK piggyback: the highest contiguous fragment index the
/// sender has confirmed received, plus a 16-bit forward bitmap for fragments
/// just past it. This is the crate's resolution of the open ACK-format
/// question in the spec's design notes, chosen to fit the ≤15-byte per
/// fragment metadata budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckPiggyback {
    pub ack_through: u64,
    pub ack_bits: u16,
}

#[derive(Clone, Debug)]
pub struct Fragment {
    pub mode: Mode,
    pub parcel_seq: u64,
    pub fragment_index: u64,
    pub last_fragment: bool,
    /// Present only on the first fragment (`fragment_index == 0`) of a parcel.
    pub total_fragments: Option<u64>,
    pub payload: Vec<u8>,
    /// Present only in `Mode::Reliable`.
    pub ack: Option<AckPiggyback>,
    /// A standalone carrier for `ack`, with no parcel data of its own —
    /// for flushing a pending RELIABLE ack when no outbound application
    /// traffic is available to piggyback it on (§4.7 "dedicated small
    /// keep-alive-like packets"). Never reassembled or delivered.
    pub ack_only: bool,
}

impl Fragment {
    pub fn encode<W: Write>(&self, mut w: W) -> Result<()> {
        let mut mode_byte = self.mode as u8;
        if self.last_fragment {
            mode_byte |= LAST_FRAGMENT_BIT;
        }
        if self.mode == Mode::Reliable && self.ack.is_some() {
            mode_byte |= HAS_ACK_BIT;
        }
        if self.ack_only {
            mode_byte |= ACK_ONLY_BIT;
        }
        w.write_all(&[mode_byte])?;

        if self.ack_only {
            let ack = self.ack.ok_or(Error::InvalidArgument("ack-only fragment must carry an ack"))?;
            write_packed_uint(&mut w, ack.ack_through)?;
            w.write_u16::<LittleEndian>(ack.ack_bits)?;
            return Ok(());
        }

        write_packed_uint(&mut w, self.parcel_seq)?;
        write_packed_uint(&mut w, self.fragment_index)?;

        if self.fragment_index == 0 {
            let total = self
                .total_fragments
                .ok_or(Error::InvalidArgument("first fragment must carry total_fragments"))?;
            write_packed_uint(&mut w, total)?;
        }

        write_packed_uint(&mut w, self.payload.len() as u64)?;
        w.write_all(&self.payload)?;

        if self.mode == Mode::Reliable {
            if let Some(ack) = &self.ack {
                write_packed_uint(&mut w, ack.ack_through)?;
                w.write_u16::<LittleEndian>(ack.ack_bits)?;
            }
        }

        Ok(())
    }

    pub fn decode<R: Read>(mut r: R) -> Result<Fragment> {
        let mut mode_byte = [0u8; 1];
        r.read_exact(&mut mode_byte)
            .map_err(|_| Error::Malformed("fragment: truncated mode byte"))?;
        let mode_byte = mode_byte[0];

        let mode = Mode::from_bits(mode_byte & 0b0000_0011)?;
        let last_fragment = mode_byte & LAST_FRAGMENT_BIT != 0;
        let has_ack = mode_byte & HAS_ACK_BIT != 0;
        let ack_only = mode_byte & ACK_ONLY_BIT != 0;

        if ack_only {
            let ack_through = read_packed_uint(&mut r)?;
            let ack_bits = r
                .read_u16::<LittleEndian>()
                .map_err(|_| Error::Malformed("fragment: truncated ack bits"))?;
            return Ok(Fragment {
                mode,
                parcel_seq: 0,
                fragment_index: 0,
                last_fragment: true,
                total_fragments: None,
                payload: Vec::new(),
                ack: Some(AckPiggyback { ack_through, ack_bits }),
                ack_only: true,
            });
        }

        let parcel_seq = read_packed_uint(&mut r)?;
        let fragment_index = read_packed_uint(&mut r)?;

        let total_fragments = if fragment_index == 0 {
            Some(read_packed_uint(&mut r)?)
        } else {
            None
        };

        let length = read_packed_uint(&mut r)? as usize;
        let mut payload = vec![0u8; length];
        r.read_exact(&mut payload)
            .map_err(|_| Error::Malformed("fragment: truncated payload"))?;

        let ack = if mode == Mode::Reliable && has_ack {
            let ack_through = read_packed_uint(&mut r)?;
            let ack_bits = r
                .read_u16::<LittleEndian>()
                .map_err(|_| Error::Malformed("fragment: truncated ack bits"))?;
            Some(AckPiggyback { ack_through, ack_bits })
        } else {
            None
        };

        Ok(Fragment {
            mode,
            parcel_seq,
            fragment_index,
            last_fragment,
            total_fragments,
            payload,
            ack,
            ack_only: false,
        })
    }
}

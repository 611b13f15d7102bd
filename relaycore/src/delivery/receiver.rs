//! Inbound side of the delivery engine for one channel: reassembles
//! fragments, applies the per-mode acceptance rule, and for RELIABLE
//! channels accumulates the ACK piggyback to attach to outbound traffic
//! (§4.7 "Receiver").

use super::bus::RecvBus;
use super::fragment::{AckPiggyback, Fragment, Mode};
use super::parcel::ParcelReader;
use crate::error::Result;

const ACK_BITMAP_SPAN: u64 = 16;

pub struct Receiver {
    reader: ParcelReader,
    bus: RecvBus,
    mode: Mode,
    ack_through: Option<u64>,
    ack_bits: u16,
    /// Set whenever `ack_through`/`ack_bits` advance, cleared by
    /// `take_pending_ack`; lets a caller flush a standalone ack only when
    /// there's something new to report instead of every heartbeat tick.
    ack_dirty: bool,
}

impl Receiver {
    pub fn new(mode: Mode, max_pending_parcels: usize) -> Receiver {
        Receiver {
            reader: ParcelReader::new(max_pending_parcels),
            bus: RecvBus::new(mode),
            mode,
            ack_through: None,
            ack_bits: 0,
            ack_dirty: false,
        }
    }

    /// Feeds one inbound fragment in. Returns the reassembled body if this
    /// fragment completed its parcel and the parcel passed the bus's
    /// acceptance rule (fresh for SEQUENCED, first-seen for RELIABLE).
    pub fn accept_fragment(&mut self, fragment: Fragment) -> Result<Option<Vec<u8>>> {
        let parcel_seq = fragment.parcel_seq;
        let body = match self.reader.accept(fragment)? {
            Some(body) => body,
            None => return Ok(None),
        };

        if self.mode == Mode::Reliable {
            self.record_ack(parcel_seq);
        }

        if self.bus.accept_parcel(parcel_seq) {
            Ok(Some(body))
        } else {
            Ok(None)
        }
    }

    fn record_ack(&mut self, parcel_seq: u64) {
        match self.ack_through {
            None => self.ack_through = Some(parcel_seq),
            Some(through) if parcel_seq == through + 1 => {
                let mut new_through = parcel_seq;
                // Fold any bits already set immediately past the old edge
                // into the new contiguous run, sliding the bitmap down.
                let mut bits = self.ack_bits;
                loop {
                    let next_bit = new_through - through - 1;
                    if next_bit >= ACK_BITMAP_SPAN || bits & (1 << next_bit) == 0 {
                        break;
                    }
                    new_through += 1;
                    bits &= !(1 << next_bit);
                }
                self.ack_through = Some(new_through);
                self.ack_bits = bits >> (new_through - through).min(ACK_BITMAP_SPAN);
            }
            Some(through) if parcel_seq > through => {
                let offset = parcel_seq - through - 1;
                if offset < ACK_BITMAP_SPAN {
                    self.ack_bits |= 1 << offset;
                }
            }
            _ => return,
        }
        self.ack_dirty = true;
    }

    /// Current ACK piggyback to attach to the next outbound fragment on
    /// this channel's RELIABLE pair. `None` until at least one parcel has
    /// been accepted.
    pub fn ack_piggyback(&self) -> Option<AckPiggyback> {
        self.ack_through.map(|ack_through| AckPiggyback {
            ack_through,
            ack_bits: self.ack_bits,
        })
    }

    /// Takes the pending ack for a standalone flush, clearing the dirty
    /// flag. Returns `None` both when there is nothing to ack yet and when
    /// the ack already went out piggybacked on application traffic, so a
    /// caller can flush on a timer without resending the same ack forever.
    pub fn take_pending_ack(&mut self) -> Option<AckPiggyback> {
        if !self.ack_dirty {
            return None;
        }
        self.ack_dirty = false;
        self.ack_piggyback()
    }

    pub fn pending_count(&self) -> usize {
        self.reader.pending_count()
    }
}

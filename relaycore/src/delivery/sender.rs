//! Outbound side of the delivery engine for one channel: splits submitted
//! messages into fragments, and for RELIABLE channels tracks which parcels
//! are still unacknowledged and due for retransmission (§4.7 "Sender").

use super::bus::SendBus;
use super::fragment::{AckPiggyback, Fragment, Mode};
use super::parcel::ParcelWriter;
use crate::error::Result;
use hashbrown::HashMap;
use std::time::Duration;

struct PendingReliable {
    fragments: Vec<Fragment>,
    last_sent_ms: u64,
}

pub struct Sender {
    bus: SendBus,
    fragment_capacity: usize,
    pending: HashMap<u64, PendingReliable>,
}

impl Sender {
    pub fn new(mode: Mode, fragment_capacity: usize) -> Sender {
        Sender {
            bus: SendBus::new(mode),
            fragment_capacity,
            pending: HashMap::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.bus.mode()
    }

    /// Splits `body` into fragments for immediate transmission. RELIABLE
    /// channels also keep a copy around until acknowledged.
    pub fn submit(&mut self, body: &[u8], now_ms: u64, ack: Option<AckPiggyback>) -> Result<(u64, Vec<Fragment>)> {
        let parcel_seq = self.bus.next_sequence();
        let fragments = ParcelWriter::split(body, parcel_seq, self.bus.mode(), self.fragment_capacity, ack)?;

        if self.bus.mode() == Mode::Reliable {
            self.pending.insert(
                parcel_seq,
                PendingReliable {
                    fragments: fragments.clone(),
                    last_sent_ms: now_ms,
                },
            );
        }

        Ok((parcel_seq, fragments))
    }

    /// Applies a received ACK piggyback: every parcel at or below
    /// `ack_through`, plus any set bit in `ack_bits` (parcel
    /// `ack_through + 1 + i`), is considered delivered and dropped from the
    /// retransmission table. Returns the largest round-trip time observed
    /// among the parcels this ack just newly confirmed, if any, for the
    /// caller to fold into its RTT estimate.
    pub fn ack(&mut self, ack: AckPiggyback, now_ms: u64) -> Option<Duration> {
        let mut acked = Vec::new();
        for &seq in self.pending.keys() {
            if seq <= ack.ack_through {
                acked.push(seq);
            }
        }
        for i in 0..16u64 {
            if ack.ack_bits & (1 << i) != 0 {
                acked.push(ack.ack_through + 1 + i);
            }
        }

        let mut sample_ms = None;
        for seq in acked {
            if let Some(pending) = self.pending.remove(&seq) {
                let rtt = now_ms.saturating_sub(pending.last_sent_ms);
                sample_ms = Some(sample_ms.map_or(rtt, |existing: u64| existing.max(rtt)));
            }
        }
        sample_ms.map(Duration::from_millis)
    }

    /// Fragments for parcels whose retransmit timer has elapsed, bumping
    /// their send time to `now_ms`. No-op for non-RELIABLE channels.
    pub fn due_retransmits(&mut self, now_ms: u64, rto_ms: u64) -> Vec<Fragment> {
        let mut due = Vec::new();
        for pending in self.pending.values_mut() {
            if now_ms.saturating_sub(pending.last_sent_ms) >= rto_ms {
                pending.last_sent_ms = now_ms;
                due.extend(pending.fragments.iter().map(clone_fragment));
            }
        }
        due
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

fn clone_fragment(f: &Fragment) -> Fragment {
    Fragment {
        mode: f.mode,
        parcel_seq: f.parcel_seq,
        fragment_index: f.fragment_index,
        last_fragment: f.last_fragment,
        total_fragments: f.total_fragments,
        payload: f.payload.clone(),
        ack: f.ack,
        ack_only: f.ack_only,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreliable_submit_keeps_nothing_pending() {
        let mut sender = Sender::new(Mode::Unreliable, 32);
        let (_, fragments) = sender.submit(b"hello", 0, None).unwrap();
        assert!(!fragments.is_empty());
        assert_eq!(sender.pending_count(), 0);
    }

    #[test]
    fn reliable_submit_tracks_until_acked() {
        let mut sender = Sender::new(Mode::Reliable, 32);
        let (seq, _) = sender.submit(b"hello world", 0, None).unwrap();
        assert_eq!(sender.pending_count(), 1);

        let rtt = sender.ack(AckPiggyback { ack_through: seq, ack_bits: 0 }, 40);
        assert_eq!(sender.pending_count(), 0);
        assert_eq!(rtt, Some(Duration::from_millis(40)));
    }

    #[test]
    fn retransmits_only_after_rto_elapses() {
        let mut sender = Sender::new(Mode::Reliable, 32);
        sender.submit(b"hello", 0, None).unwrap();

        assert!(sender.due_retransmits(50, 100).is_empty());
        assert!(!sender.due_retransmits(150, 100).is_empty());
    }

    #[test]
    fn ack_bits_clear_out_of_order_parcels() {
        let mut sender = Sender::new(Mode::Reliable, 32);
        sender.submit(b"a", 0, None).unwrap();
        sender.submit(b"b", 0, None).unwrap();
        sender.submit(b"c", 0, None).unwrap();
        assert_eq!(sender.pending_count(), 3);

        // Ack parcel 2 out of order (bit 1 of the forward bitmap past 0).
        sender.ack(AckPiggyback { ack_through: 0, ack_bits: 0b10 }, 0);
        assert_eq!(sender.pending_count(), 2);
    }

    #[test]
    fn repeated_ack_only_samples_rtt_for_newly_confirmed_parcels() {
        let mut sender = Sender::new(Mode::Reliable, 32);
        sender.submit(b"a", 0, None).unwrap();

        let first = sender.ack(AckPiggyback { ack_through: 0, ack_bits: 0 }, 40);
        assert_eq!(first, Some(Duration::from_millis(40)));

        let second = sender.ack(AckPiggyback { ack_through: 0, ack_bits: 0 }, 80);
        assert_eq!(second, None);
    }
}

//! Bookkeeping counters exposed read-only via `Socket::stats()` (§12). Pure
//! accounting: no exporter, no aggregation window, nothing that touches the
//! network on its own.

use crate::packet::PacketKind;
use std::sync::atomic::{AtomicU64, Ordering};

const PACKET_KIND_COUNT: usize = 7;

fn kind_index(kind: PacketKind) -> usize {
    kind.tag() as usize
}

/// One atomic counter per `PacketKind`, indexed by its wire tag.
struct PerKindCounters {
    counts: [AtomicU64; PACKET_KIND_COUNT],
}

impl PerKindCounters {
    fn new() -> PerKindCounters {
        PerKindCounters { counts: Default::default() }
    }

    fn incr(&self, kind: PacketKind) {
        self.counts[kind_index(kind)].fetch_add(1, Ordering::Relaxed);
    }

    fn get(&self, kind: PacketKind) -> u64 {
        self.counts[kind_index(kind)].load(Ordering::Relaxed)
    }
}

/// Process-wide-per-socket counters. Every field is an independent atomic so
/// readers never block writers; a snapshot taken mid-update may see counters
/// advance at slightly different points but each individual value is exact.
pub struct Counters {
    sent: PerKindCounters,
    received: PerKindCounters,
    dropped: PerKindCounters,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    aead_failures: AtomicU64,
    replay_rejections: AtomicU64,
    fragments_retransmitted: AtomicU64,
    parcels_delivered_reliable: AtomicU64,
    parcels_delivered_unreliable: AtomicU64,
    parcels_delivered_sequenced: AtomicU64,
}

impl Counters {
    pub fn new() -> Counters {
        Counters {
            sent: PerKindCounters::new(),
            received: PerKindCounters::new(),
            dropped: PerKindCounters::new(),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            aead_failures: AtomicU64::new(0),
            replay_rejections: AtomicU64::new(0),
            fragments_retransmitted: AtomicU64::new(0),
            parcels_delivered_reliable: AtomicU64::new(0),
            parcels_delivered_unreliable: AtomicU64::new(0),
            parcels_delivered_sequenced: AtomicU64::new(0),
        }
    }

    pub fn on_packet_sent(&self, kind: PacketKind, wire_len: usize) {
        self.sent.incr(kind);
        self.bytes_sent.fetch_add(wire_len as u64, Ordering::Relaxed);
    }

    pub fn on_packet_received(&self, kind: PacketKind, wire_len: usize) {
        self.received.incr(kind);
        self.bytes_received.fetch_add(wire_len as u64, Ordering::Relaxed);
    }

    pub fn on_packet_dropped(&self, kind: PacketKind) {
        self.dropped.incr(kind);
    }

    pub fn on_aead_failure(&self) {
        self.aead_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_replay_rejected(&self) {
        self.replay_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_fragment_retransmitted(&self) {
        self.fragments_retransmitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_parcel_delivered(&self, mode: crate::delivery::Mode) {
        use crate::delivery::Mode;
        let counter = match mode {
            Mode::Unreliable => &self.parcels_delivered_unreliable,
            Mode::Sequenced => &self.parcels_delivered_sequenced,
            Mode::Reliable => &self.parcels_delivered_reliable,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sent(&self, kind: PacketKind) -> u64 {
        self.sent.get(kind)
    }

    pub fn received(&self, kind: PacketKind) -> u64 {
        self.received.get(kind)
    }

    pub fn dropped(&self, kind: PacketKind) -> u64 {
        self.dropped.get(kind)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn aead_failures(&self) -> u64 {
        self.aead_failures.load(Ordering::Relaxed)
    }

    pub fn replay_rejections(&self) -> u64 {
        self.replay_rejections.load(Ordering::Relaxed)
    }

    pub fn fragments_retransmitted(&self) -> u64 {
        self.fragments_retransmitted.load(Ordering::Relaxed)
    }

    pub fn parcels_delivered(&self, mode: crate::delivery::Mode) -> u64 {
        use crate::delivery::Mode;
        match mode {
            Mode::Unreliable => self.parcels_delivered_unreliable.load(Ordering::Relaxed),
            Mode::Sequenced => self.parcels_delivered_sequenced.load(Ordering::Relaxed),
            Mode::Reliable => self.parcels_delivered_reliable.load(Ordering::Relaxed),
        }
    }
}

impl Default for Counters {
    fn default() -> Counters {
        Counters::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::Mode;

    #[test]
    fn per_kind_counters_stay_independent() {
        let counters = Counters::new();
        counters.on_packet_sent(PacketKind::Payload, 100);
        counters.on_packet_sent(PacketKind::KeepAlive, 20);
        assert_eq!(counters.sent(PacketKind::Payload), 1);
        assert_eq!(counters.sent(PacketKind::KeepAlive), 1);
        assert_eq!(counters.sent(PacketKind::Request), 0);
        assert_eq!(counters.bytes_sent(), 120);
    }

    #[test]
    fn parcel_delivery_counts_split_by_mode() {
        let counters = Counters::new();
        counters.on_parcel_delivered(Mode::Reliable);
        counters.on_parcel_delivered(Mode::Reliable);
        counters.on_parcel_delivered(Mode::Unreliable);
        assert_eq!(counters.parcels_delivered(Mode::Reliable), 2);
        assert_eq!(counters.parcels_delivered(Mode::Unreliable), 1);
        assert_eq!(counters.parcels_delivered(Mode::Sequenced), 0);
    }

    #[test]
    fn failure_counters_are_distinct() {
        let counters = Counters::new();
        counters.on_aead_failure();
        counters.on_replay_rejected();
        counters.on_replay_rejected();
        assert_eq!(counters.aead_failures(), 1);
        assert_eq!(counters.replay_rejections(), 2);
    }
}

//! Splits an outbound message into fragments and reassembles inbound
//! fragments back into a message (§4.7 "Fragmentation / reassembly").

use super::fragment::{AckPiggyback, Fragment, Mode};
use crate::error::{Error, Result};
use hashbrown::HashMap;

/// Packed-uint metadata is variable width; this is the nominal allowance a
/// caller should subtract from its packet body budget before dividing the
/// remainder into fragment payload capacity.
pub const FRAGMENT_METADATA_BUDGET: usize = 15;

/// Hard wire ceiling: `total_fragments` and `fragment_index` travel as
/// packed uints but the reassembly table indexes fragments with a `u16`.
pub const MAX_FRAGMENTS_PER_PARCEL: usize = 65_535;

/// The crate's recommended default for a 1200-byte MTU; callers are free to
/// negotiate a different split as long as it stays under the hard ceiling.
pub const DEFAULT_MAX_FRAGMENTS_PER_PARCEL: usize = 222;

pub struct ParcelWriter;

impl ParcelWriter {
    /// Splits `body` into fragments of at most `fragment_capacity` payload
    /// bytes each, tagged with `parcel_seq` and `mode`. `ack` is attached to
    /// every fragment when `mode` is `Reliable`.
    pub fn split(
        body: &[u8],
        parcel_seq: u64,
        mode: Mode,
        fragment_capacity: usize,
        ack: Option<AckPiggyback>,
    ) -> Result<Vec<Fragment>> {
        if fragment_capacity == 0 {
            return Err(Error::InvalidArgument("fragment capacity must be nonzero"));
        }

        let total_fragments = if body.is_empty() {
            1
        } else {
            (body.len() + fragment_capacity - 1) / fragment_capacity
        };
        if total_fragments > MAX_FRAGMENTS_PER_PARCEL {
            return Err(Error::MessageOverflow);
        }

        let mut fragments = Vec::with_capacity(total_fragments);
        for index in 0..total_fragments {
            let start = index * fragment_capacity;
            let end = (start + fragment_capacity).min(body.len());
            let payload = body[start..end].to_vec();
            let is_last = index + 1 == total_fragments;

            fragments.push(Fragment {
                mode,
                parcel_seq,
                fragment_index: index as u64,
                last_fragment: is_last,
                total_fragments: if index == 0 { Some(total_fragments as u64) } else { None },
                payload,
                ack: if mode == Mode::Reliable { ack } else { None },
                ack_only: false,
            });
        }

        Ok(fragments)
    }
}

/// Reassembly state for one in-flight parcel.
struct PendingParcel {
    total_fragments: usize,
    received: HashMap<u64, Vec<u8>>,
}

impl PendingParcel {
    fn is_complete(&self) -> bool {
        self.received.len() == self.total_fragments
    }

    fn assemble(&self) -> Vec<u8> {
        let mut body = Vec::new();
        for index in 0..self.total_fragments as u64 {
            if let Some(chunk) = self.received.get(&index) {
                body.extend_from_slice(chunk);
            }
        }
        body
    }
}

/// Reassembles fragments belonging to a single bus, keyed by parcel sequence.
/// Completed or superseded parcels are evicted; an unbounded number of
/// never-completed parcels is avoided by the caller enforcing `max_pending`.
pub struct ParcelReader {
    pending: HashMap<u64, PendingParcel>,
    max_pending: usize,
}

impl ParcelReader {
    pub fn new(max_pending: usize) -> ParcelReader {
        ParcelReader {
            pending: HashMap::new(),
            max_pending,
        }
    }

    /// Feeds one fragment in. Returns the assembled body once every fragment
    /// of its parcel has arrived.
    pub fn accept(&mut self, fragment: Fragment) -> Result<Option<Vec<u8>>> {
        let total_fragments = if let Some(total) = fragment.total_fragments {
            total as usize
        } else if let Some(existing) = self.pending.get(&fragment.parcel_seq) {
            existing.total_fragments
        } else {
            return Err(Error::Malformed("parcel: first fragment missing total_fragments"));
        };

        if total_fragments == 0 || total_fragments > MAX_FRAGMENTS_PER_PARCEL {
            return Err(Error::Malformed("parcel: invalid total_fragments"));
        }

        if !self.pending.contains_key(&fragment.parcel_seq) && self.pending.len() >= self.max_pending {
            return Err(Error::MessageOverflow);
        }

        let entry = self.pending.entry(fragment.parcel_seq).or_insert_with(|| PendingParcel {
            total_fragments,
            received: HashMap::new(),
        });

        if fragment.fragment_index as usize >= entry.total_fragments {
            return Err(Error::Malformed("parcel: fragment index out of range"));
        }

        entry.received.insert(fragment.fragment_index, fragment.payload);

        if entry.is_complete() {
            let body = entry.assemble();
            self.pending.remove(&fragment.parcel_seq);
            Ok(Some(body))
        } else {
            Ok(None)
        }
    }

    /// Drops reassembly state for a parcel sequence that will never arrive
    /// in full (superseded by a later SEQUENCED parcel, for instance).
    pub fn discard(&mut self, parcel_seq: u64) {
        self.pending.remove(&parcel_seq);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_reassemble_round_trips() {
        let body: Vec<u8> = (0..500u32).map(|n| (n % 256) as u8).collect();
        let fragments = ParcelWriter::split(&body, 1, Mode::Reliable, 64, None).unwrap();
        assert!(fragments.len() > 1);

        let mut reader = ParcelReader::new(8);
        let mut result = None;
        for fragment in fragments {
            result = reader.accept(fragment).unwrap();
        }
        assert_eq!(result.unwrap(), body);
        assert_eq!(reader.pending_count(), 0);
    }

    #[test]
    fn empty_body_produces_single_empty_fragment() {
        let fragments = ParcelWriter::split(&[], 1, Mode::Unreliable, 64, None).unwrap();
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].last_fragment);
    }

    #[test]
    fn out_of_order_fragments_reassemble() {
        let body: Vec<u8> = (0..300u32).map(|n| (n % 256) as u8).collect();
        let mut fragments = ParcelWriter::split(&body, 9, Mode::Sequenced, 50, None).unwrap();
        fragments.reverse();

        let mut reader = ParcelReader::new(8);
        let mut result = None;
        for fragment in fragments {
            result = reader.accept(fragment).unwrap();
        }
        assert_eq!(result.unwrap(), body);
    }

    #[test]
    fn oversized_parcel_rejected() {
        let capacity = 1;
        let body = vec![0u8; MAX_FRAGMENTS_PER_PARCEL + 1];
        let err = ParcelWriter::split(&body, 1, Mode::Unreliable, capacity, None).unwrap_err();
        assert!(matches!(err, Error::MessageOverflow));
    }

    #[test]
    fn too_many_pending_parcels_rejected() {
        let mut reader = ParcelReader::new(1);
        let first = Fragment {
            mode: Mode::Unreliable,
            parcel_seq: 1,
            fragment_index: 0,
            last_fragment: false,
            total_fragments: Some(2),
            payload: vec![1],
            ack: None,
            ack_only: false,
        };
        reader.accept(first).unwrap();

        let second = Fragment {
            mode: Mode::Unreliable,
            parcel_seq: 2,
            fragment_index: 0,
            last_fragment: false,
            total_fragments: Some(2),
            payload: vec![2],
            ack: None,
            ack_only: false,
        };
        let err = reader.accept(second).unwrap_err();
        assert!(matches!(err, Error::MessageOverflow));
    }
}

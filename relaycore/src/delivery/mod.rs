//! Fragmentation, reassembly, and per-mode delivery guarantees layered on
//! top of the raw PAYLOAD packet stream (§4.7).

pub mod bus;
pub mod clockoffset;
pub mod fragment;
pub mod parcel;
pub mod receiver;
pub mod rtt;
pub mod sender;

pub use clockoffset::ClockOffsetEstimator;
pub use fragment::{AckPiggyback, Fragment, Mode};
pub use parcel::{DEFAULT_MAX_FRAGMENTS_PER_PARCEL, FRAGMENT_METADATA_BUDGET, MAX_FRAGMENTS_PER_PARCEL};
pub use receiver::Receiver;
pub use rtt::RttEstimator;
pub use sender::Sender;

/// Default MTU assumption used to size `FRAGMENT_CAPACITY` (§4.7, scenario
/// 4 in the testable-properties section uses this same figure).
pub const DEFAULT_MTU: usize = 1200;

/// Payload bytes available per fragment after the packet header's worst
/// case (1 tag byte + 8 sequence bytes), the AEAD tag, and the fragment
/// metadata budget are subtracted from `DEFAULT_MTU`.
pub const DEFAULT_FRAGMENT_CAPACITY: usize =
    DEFAULT_MTU - 9 - crate::crypto::MAC_SIZE - FRAGMENT_METADATA_BUDGET;

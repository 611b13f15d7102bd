//! Per-channel delivery-mode bookkeeping (§4.7). A "bus" is one channel's
//! state for one direction of traffic: outbound sequence assignment plus,
//! for SEQUENCED and RELIABLE, the acceptance rule that decides whether an
//! inbound parcel gets handed to the application or dropped.

use super::fragment::Mode;
use crate::windows::SlidingWindow;

const RELIABLE_DEDUP_WINDOW: u64 = 1024;

/// Assigns outbound parcel sequence numbers for one channel.
pub struct SendBus {
    mode: Mode,
    next_seq: u64,
}

impl SendBus {
    pub fn new(mode: Mode) -> SendBus {
        SendBus { mode, next_seq: 0 }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn next_sequence(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        seq
    }
}

enum RecvRule {
    /// UNRELIABLE: every completed parcel is delivered, no ordering kept.
    Unreliable,
    /// SEQUENCED: only the newest parcel seen is delivered; anything at or
    /// behind the highest accepted sequence is dropped.
    Sequenced { highest_accepted: Option<u64> },
    /// RELIABLE: every parcel is delivered exactly once, in any order the
    /// reassembly completes in; a trailing window suppresses retransmit
    /// duplicates.
    Reliable { seen: SlidingWindow },
}

/// Inbound acceptance state for one channel.
pub struct RecvBus {
    rule: RecvRule,
}

impl RecvBus {
    pub fn new(mode: Mode) -> RecvBus {
        let rule = match mode {
            Mode::Unreliable => RecvRule::Unreliable,
            Mode::Sequenced => RecvRule::Sequenced { highest_accepted: None },
            Mode::Reliable => RecvRule::Reliable {
                seen: SlidingWindow::new(RELIABLE_DEDUP_WINDOW),
            },
        };
        RecvBus { rule }
    }

    /// Called once a parcel's reassembly has produced a complete body.
    /// Returns `true` if it should be delivered to the application.
    pub fn accept_parcel(&mut self, parcel_seq: u64) -> bool {
        match &mut self.rule {
            RecvRule::Unreliable => true,
            RecvRule::Sequenced { highest_accepted } => match *highest_accepted {
                Some(highest) if parcel_seq <= highest => false,
                _ => {
                    *highest_accepted = Some(parcel_seq);
                    true
                }
            },
            RecvRule::Reliable { seen } => seen.accept(parcel_seq),
        }
    }

    /// For SEQUENCED buses: whether a parcel still being reassembled should
    /// be abandoned because a newer parcel has since been fully accepted.
    pub fn is_stale(&self, parcel_seq: u64) -> bool {
        match &self.rule {
            RecvRule::Sequenced { highest_accepted: Some(highest) } => parcel_seq <= *highest,
            _ => false,
        }
    }
}

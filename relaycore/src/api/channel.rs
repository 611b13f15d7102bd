//! Thin façade over one bus's sender/receiver pair (§4.8 "Channel").

use crate::delivery::{Fragment, Mode, Receiver, Sender};
use crate::error::Result;
use std::time::Duration;

const DEFAULT_MAX_PENDING_PARCELS: usize = 64;

pub struct Channel {
    fragment_capacity: usize,
    sender: Sender,
    receiver: Receiver,
}

impl Channel {
    pub fn new(mode: Mode, fragment_capacity: usize) -> Channel {
        Channel {
            fragment_capacity,
            sender: Sender::new(mode, fragment_capacity),
            receiver: Receiver::new(mode, DEFAULT_MAX_PENDING_PARCELS),
        }
    }

    pub fn mode(&self) -> Mode {
        self.sender.mode()
    }

    /// Switches the channel's delivery mode. Any fragments in flight under
    /// the old mode are abandoned rather than translated — reassembly state
    /// keyed to one mode's acceptance rule doesn't carry meaning under
    /// another's.
    pub fn set_mode(&mut self, mode: Mode) {
        self.sender = Sender::new(mode, self.fragment_capacity);
        self.receiver = Receiver::new(mode, DEFAULT_MAX_PENDING_PARCELS);
    }

    /// Splits `body` into fragments, piggybacking this channel's pending ACK
    /// if it's RELIABLE.
    pub fn submit(&mut self, body: &[u8], now_ms: u64) -> Result<(u64, Vec<Fragment>)> {
        let ack = self.receiver.take_pending_ack();
        self.sender.submit(body, now_ms, ack)
    }

    /// Feeds one inbound fragment, applying any ACK it carries to this
    /// channel's sender before attempting reassembly. Returns the reassembled
    /// body (if any) alongside the RTT sample the ack just confirmed (if
    /// any), so a caller can feed both the application layer and the
    /// session's RTT estimator from a single inbound fragment. An ack-only
    /// fragment carries no parcel data and is never handed to the receiver.
    pub fn accept_fragment(&mut self, fragment: Fragment, now_ms: u64) -> Result<(Option<Vec<u8>>, Option<Duration>)> {
        let rtt_sample = match fragment.ack {
            Some(ack) => self.sender.ack(ack, now_ms),
            None => None,
        };
        if fragment.ack_only {
            return Ok((None, rtt_sample));
        }
        let body = self.receiver.accept_fragment(fragment)?;
        Ok((body, rtt_sample))
    }

    pub fn due_retransmits(&mut self, now_ms: u64, rto_ms: u64) -> Vec<Fragment> {
        self.sender.due_retransmits(now_ms, rto_ms)
    }

    /// A standalone carrier for this channel's pending RELIABLE ack, for a
    /// caller to send when there's nothing else going out to piggyback it
    /// on. `None` when there's no new ack to report.
    pub fn flush_ack(&mut self) -> Option<Fragment> {
        let ack = self.receiver.take_pending_ack()?;
        Some(Fragment {
            mode: self.mode(),
            parcel_seq: 0,
            fragment_index: 0,
            last_fragment: true,
            total_fragments: None,
            payload: Vec::new(),
            ack: Some(ack),
            ack_only: true,
        })
    }

    pub fn pending_send_count(&self) -> usize {
        self.sender.pending_count()
    }

    pub fn pending_recv_count(&self) -> usize {
        self.receiver.pending_count()
    }
}

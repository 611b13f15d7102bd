//! One connected peer as seen by the public API: channels, RTT/clock-offset
//! estimates, and a generation-tagged handle so a caller holding a stale
//! reference gets `SESSION_INVALID` instead of touching a slot that has
//! since been reused (§4.8 "Session").

use crate::api::channel::Channel;
use crate::codec::token::USER_DATA_SIZE;
use crate::delivery::{ClockOffsetEstimator, Mode, RttEstimator};
use crate::error::{Error, Result};
use hashbrown::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Connected,
    Disconnected,
}

/// An opaque reference to a session slot. Equality includes the signature,
/// so a handle captured before a disconnect-then-reconnect-into-the-same-slot
/// no longer matches the new occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    index: usize,
    signature: u64,
}

impl SessionHandle {
    #[cfg(test)]
    pub(crate) fn for_test(index: usize, signature: u64) -> SessionHandle {
        SessionHandle { index, signature }
    }
}

pub struct Session {
    remote: SocketAddr,
    client_id: i64,
    user_data: [u8; USER_DATA_SIZE],
    state: SessionState,
    channels: Vec<Channel>,
    rtt: RttEstimator,
    clock_offset: ClockOffsetEstimator,
}

impl Session {
    fn new(remote: SocketAddr, client_id: i64, user_data: [u8; USER_DATA_SIZE], channel_modes: &[Mode], fragment_capacity: usize) -> Session {
        Session {
            remote,
            client_id,
            user_data,
            state: SessionState::Connecting,
            channels: channel_modes.iter().map(|&mode| Channel::new(mode, fragment_capacity)).collect(),
            rtt: RttEstimator::new(),
            clock_offset: ClockOffsetEstimator::new(),
        }
    }

    pub fn get_client_id(&self) -> i64 {
        self.client_id
    }

    pub fn get_address(&self) -> SocketAddr {
        self.remote
    }

    pub fn user_data(&self) -> &[u8; USER_DATA_SIZE] {
        &self.user_data
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Mean and variance of the round-trip estimate, zero until the first
    /// sample lands.
    pub fn get_rtt(&self) -> (Duration, Duration) {
        (self.rtt.smoothed_rtt().unwrap_or_default(), self.rtt.rtt_variance())
    }

    pub fn note_rtt_sample(&mut self, measurement: Duration) {
        self.rtt.sample(measurement);
    }

    pub fn retransmit_timeout(&self) -> Duration {
        self.rtt.retransmit_timeout()
    }

    /// Lets the socket drive the CONNECTING→CONNECTED transition once its
    /// handshake completes; not meaningful to call from outside `api`.
    pub(crate) fn force_state(&mut self, state: SessionState) {
        self.state = state;
    }

    pub fn note_clock_offset_sample(&mut self, client_send_ms: u64, client_recv_ms: u64, server_time_ms: u64) {
        self.clock_offset.sample(client_send_ms, client_recv_ms, server_time_ms);
    }

    pub fn synchronized_time(&self, local_ms: u64) -> Option<u64> {
        self.clock_offset.offset_ms().map(|_| self.clock_offset.to_server_time(local_ms))
    }

    pub fn get_channel(&mut self, index: usize) -> Result<&mut Channel> {
        self.channels.get_mut(index).ok_or(Error::ChannelInvalid)
    }

    pub fn set_channel_mode(&mut self, index: usize, mode: Mode) -> Result<()> {
        let channel = self.get_channel(index)?;
        channel.set_mode(mode);
        Ok(())
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

struct Slot {
    session: Option<Session>,
    signature: u64,
}

/// Arena-with-generation-tag table of live sessions. One instance lives
/// inside a socket; indices are reused on disconnect, signatures are not.
pub struct SessionTable {
    slots: Vec<Slot>,
    free: Vec<usize>,
    next_signature: u64,
    by_addr: HashMap<SocketAddr, SessionHandle>,
}

impl SessionTable {
    pub fn new() -> SessionTable {
        SessionTable {
            slots: Vec::new(),
            free: Vec::new(),
            next_signature: 1,
            by_addr: HashMap::new(),
        }
    }

    pub fn insert(
        &mut self,
        remote: SocketAddr,
        client_id: i64,
        user_data: [u8; USER_DATA_SIZE],
        channel_modes: &[Mode],
        fragment_capacity: usize,
    ) -> SessionHandle {
        let signature = self.next_signature;
        self.next_signature += 1;
        let session = Session::new(remote, client_id, user_data, channel_modes, fragment_capacity);

        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index] = Slot { session: Some(session), signature };
                index
            }
            None => {
                self.slots.push(Slot { session: Some(session), signature });
                self.slots.len() - 1
            }
        };

        let handle = SessionHandle { index, signature };
        self.by_addr.insert(remote, handle);
        handle
    }

    fn slot(&self, handle: SessionHandle) -> Result<&Slot> {
        let slot = self.slots.get(handle.index).ok_or(Error::SessionInvalid)?;
        if slot.signature != handle.signature || slot.session.is_none() {
            return Err(Error::SessionInvalid);
        }
        Ok(slot)
    }

    pub fn get(&self, handle: SessionHandle) -> Result<&Session> {
        Ok(self.slot(handle)?.session.as_ref().unwrap())
    }

    pub fn get_mut(&mut self, handle: SessionHandle) -> Result<&mut Session> {
        let slot = self.slots.get_mut(handle.index).ok_or(Error::SessionInvalid)?;
        if slot.signature != handle.signature || slot.session.is_none() {
            return Err(Error::SessionInvalid);
        }
        Ok(slot.session.as_mut().unwrap())
    }

    pub fn find_by_addr(&self, addr: &SocketAddr) -> Option<SessionHandle> {
        self.by_addr.get(addr).copied()
    }

    /// Removes the session occupying `handle`'s slot, if it still matches.
    /// The slot becomes reusable, but with a fresh signature on next
    /// `insert`, so any handle copy still held elsewhere reads as invalid.
    pub fn remove(&mut self, handle: SessionHandle) -> Result<Session> {
        let slot = self.slots.get_mut(handle.index).ok_or(Error::SessionInvalid)?;
        if slot.signature != handle.signature {
            return Err(Error::SessionInvalid);
        }
        let session = slot.session.take().ok_or(Error::SessionInvalid)?;
        self.by_addr.remove(&session.remote);
        self.free.push(handle.index);
        Ok(session)
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (SessionHandle, &Session)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.session.as_ref().map(|session| (SessionHandle { index, signature: slot.signature }, session))
        })
    }
}

impl Default for SessionTable {
    fn default() -> SessionTable {
        SessionTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn insert_then_get_round_trips() {
        let mut table = SessionTable::new();
        let handle = table.insert(addr(1), 42, [0u8; USER_DATA_SIZE], &[Mode::Unreliable], 64);
        assert_eq!(table.get(handle).unwrap().get_client_id(), 42);
    }

    #[test]
    fn stale_handle_after_remove_is_invalid() {
        let mut table = SessionTable::new();
        let handle = table.insert(addr(1), 1, [0u8; USER_DATA_SIZE], &[Mode::Unreliable], 64);
        table.remove(handle).unwrap();
        assert!(matches!(table.get(handle), Err(Error::SessionInvalid)));
    }

    #[test]
    fn reused_slot_gets_a_fresh_signature() {
        let mut table = SessionTable::new();
        let first = table.insert(addr(1), 1, [0u8; USER_DATA_SIZE], &[Mode::Unreliable], 64);
        table.remove(first).unwrap();
        let second = table.insert(addr(2), 2, [0u8; USER_DATA_SIZE], &[Mode::Unreliable], 64);

        assert_ne!(first, second);
        assert!(matches!(table.get(first), Err(Error::SessionInvalid)));
        assert_eq!(table.get(second).unwrap().get_client_id(), 2);
    }

    #[test]
    fn find_by_addr_locates_the_current_occupant() {
        let mut table = SessionTable::new();
        let handle = table.insert(addr(9), 7, [0u8; USER_DATA_SIZE], &[Mode::Unreliable], 64);
        assert_eq!(table.find_by_addr(&addr(9)), Some(handle));
        assert_eq!(table.find_by_addr(&addr(10)), None);
    }

    #[test]
    fn set_channel_mode_rejects_out_of_range_index() {
        let mut table = SessionTable::new();
        let handle = table.insert(addr(1), 1, [0u8; USER_DATA_SIZE], &[Mode::Unreliable], 64);
        let session = table.get_mut(handle).unwrap();
        assert!(matches!(session.set_channel_mode(5, Mode::Reliable), Err(Error::ChannelInvalid)));
    }
}

//! Per-connection state kept by the protocol engine on either side of the
//! handshake (§4.6 "Protocol engine").

use super::replay::ReplayGuard;
use crate::crypto::KEY_SIZE;
use crate::codec::token::USER_DATA_SIZE;
use std::net::SocketAddr;
use std::time::Duration;

/// Server-side lifecycle. `Empty` exists only as the logical predecessor to
/// `RequestAccepted`; once a peer is removed from the server's table there
/// is no lingering `Empty` record to revisit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerPeerState {
    Empty,
    RequestAccepted,
    Challenged,
    Connected,
    Disconnecting,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    SendingRequest,
    SendingResponse,
    Connected,
    Disconnecting,
}

/// One client as tracked by the server: negotiated keys, sequence state,
/// and the timers that drive timeout and keep-alive.
pub struct ServerPeer {
    pub remote: SocketAddr,
    pub client_id: i64,
    pub state: ServerPeerState,
    pub client_to_server_key: [u8; KEY_SIZE],
    pub server_to_client_key: [u8; KEY_SIZE],
    pub user_data: [u8; USER_DATA_SIZE],
    pub timeout_seconds: i32,
    pub inbound_replay: ReplayGuard,
    pub outbound_sequence: u64,
    pub challenge_sequence: u64,
    pub last_recv_ms: u64,
    pub last_send_ms: u64,
}

impl ServerPeer {
    pub fn new(
        remote: SocketAddr,
        client_id: i64,
        client_to_server_key: [u8; KEY_SIZE],
        server_to_client_key: [u8; KEY_SIZE],
        user_data: [u8; USER_DATA_SIZE],
        timeout_seconds: i32,
        now_ms: u64,
    ) -> ServerPeer {
        ServerPeer {
            remote,
            client_id,
            state: ServerPeerState::RequestAccepted,
            client_to_server_key,
            server_to_client_key,
            user_data,
            timeout_seconds,
            inbound_replay: ReplayGuard::new(),
            outbound_sequence: 0,
            challenge_sequence: 0,
            last_recv_ms: now_ms,
            last_send_ms: now_ms,
        }
    }

    pub fn next_outbound_sequence(&mut self) -> u64 {
        let seq = self.outbound_sequence;
        self.outbound_sequence += 1;
        seq
    }

    pub fn touch_recv(&mut self, now_ms: u64) {
        self.last_recv_ms = now_ms;
    }

    pub fn touch_send(&mut self, now_ms: u64) {
        self.last_send_ms = now_ms;
    }

    /// `true` once `now_ms` has exceeded the negotiated idle timeout since
    /// the last packet was received from this peer. A negative
    /// `timeout_seconds` (netcode.io convention for "never time out") always
    /// returns `false`.
    pub fn is_idle_timed_out(&self, now_ms: u64) -> bool {
        if self.timeout_seconds < 0 {
            return false;
        }
        let timeout = Duration::from_secs(self.timeout_seconds as u64);
        Duration::from_millis(now_ms.saturating_sub(self.last_recv_ms)) >= timeout
    }

    pub fn is_connected(&self) -> bool {
        self.state == ServerPeerState::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[test]
    fn starts_in_request_accepted() {
        let peer = ServerPeer::new(addr(), 1, [0; KEY_SIZE], [0; KEY_SIZE], [0; USER_DATA_SIZE], 5, 0);
        assert_eq!(peer.state, ServerPeerState::RequestAccepted);
    }

    #[test]
    fn idle_timeout_respects_negative_sentinel() {
        let peer = ServerPeer::new(addr(), 1, [0; KEY_SIZE], [0; KEY_SIZE], [0; USER_DATA_SIZE], -1, 0);
        assert!(!peer.is_idle_timed_out(1_000_000_000));
    }

    #[test]
    fn idle_timeout_trips_after_threshold() {
        let mut peer = ServerPeer::new(addr(), 1, [0; KEY_SIZE], [0; KEY_SIZE], [0; USER_DATA_SIZE], 5, 0);
        peer.touch_recv(1000);
        assert!(!peer.is_idle_timed_out(3000));
        assert!(peer.is_idle_timed_out(6001));
    }

    #[test]
    fn outbound_sequence_increments() {
        let mut peer = ServerPeer::new(addr(), 1, [0; KEY_SIZE], [0; KEY_SIZE], [0; USER_DATA_SIZE], 5, 0);
        assert_eq!(peer.next_outbound_sequence(), 0);
        assert_eq!(peer.next_outbound_sequence(), 1);
    }
}

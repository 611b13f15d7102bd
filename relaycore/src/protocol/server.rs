//! Server-side half of the handshake and connected-session state machine
//! (§4.6). One `Server` instance serves one bound socket; it holds no I/O of
//! its own — callers hand it decoded packets and get back the bytes of
//! whatever reply packet (if any) should be sent to which address.

use super::challenge_token::ChallengeToken;
use super::peer::{ServerPeer, ServerPeerState};
use crate::codec::token::USER_DATA_SIZE;
use crate::codec::PacketHeader;
use crate::crypto::{self, KEY_SIZE};
use crate::error::{Error, Result};
use crate::packet::{self, ChallengePacket, DeniedPacket, PacketKind, RequestPacket, ResponsePacket};
use hashbrown::HashMap;
use std::net::SocketAddr;

pub struct ServerConfig {
    pub protocol_id: u64,
    pub server_key: [u8; KEY_SIZE],
    pub max_clients: usize,
    /// The address(es) the server expects its own connect tokens to list;
    /// a request whose token doesn't include it is rejected as foreign.
    pub bind_addr: SocketAddr,
}

pub struct Server {
    config: ServerConfig,
    challenge_key: [u8; KEY_SIZE],
    peers: HashMap<SocketAddr, ServerPeer>,
}

/// Outcome of feeding the server one inbound REQUEST or RESPONSE packet.
pub enum HandshakeEvent {
    /// Send these bytes back to the sender; no session state change yet.
    Reply(Vec<u8>),
    /// The client completed the handshake; send the accompanying bytes (if
    /// any) and consider the peer connected.
    Connected { client_id: i64, user_data: [u8; USER_DATA_SIZE], reply: Option<Vec<u8>> },
    /// Silently drop the packet (e.g. a malformed or unauthenticated retry).
    Ignore,
}

impl Server {
    pub fn new(config: ServerConfig) -> Server {
        let mut challenge_key = [0u8; KEY_SIZE];
        crypto::random_bytes(&mut challenge_key);
        Server { config, challenge_key, peers: HashMap::new() }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn peer(&self, remote: &SocketAddr) -> Option<&ServerPeer> {
        self.peers.get(remote)
    }

    pub fn peer_mut(&mut self, remote: &SocketAddr) -> Option<&mut ServerPeer> {
        self.peers.get_mut(remote)
    }

    /// Handles an inbound REQUEST packet (§4.6 "Request acceptance rules").
    pub fn handle_request(&mut self, remote: SocketAddr, request: RequestPacket, now_ms: u64) -> Result<HandshakeEvent> {
        if request.protocol_id != self.config.protocol_id {
            return Ok(HandshakeEvent::Ignore);
        }
        if now_ms > request.expire_timestamp {
            return Ok(HandshakeEvent::Ignore);
        }

        let private = match request.clone().into_private(&self.config.server_key) {
            Ok(private) => private,
            Err(_) => return Ok(HandshakeEvent::Ignore),
        };

        if !private.addresses.iter().any(|addr| *addr == self.config.bind_addr) {
            return Ok(HandshakeEvent::Ignore);
        }

        if let Some(existing) = self.peers.get(&remote) {
            if existing.client_id == private.client_id && existing.state != ServerPeerState::Disconnected {
                return self.issue_challenge(remote, now_ms);
            }
        }

        if self.peers.len() >= self.config.max_clients {
            let denied = self.encode_unkeyed(PacketKind::Denied, &DeniedPacket, &private.server_to_client_key, 0)?;
            return Ok(HandshakeEvent::Reply(denied));
        }

        let peer = ServerPeer::new(
            remote,
            private.client_id,
            private.client_to_server_key,
            private.server_to_client_key,
            private.user_data,
            private.timeout_seconds,
            now_ms,
        );
        self.peers.insert(remote, peer);

        self.issue_challenge(remote, now_ms)
    }

    fn issue_challenge(&mut self, remote: SocketAddr, now_ms: u64) -> Result<HandshakeEvent> {
        let challenge_key = self.challenge_key;
        let peer = self.peers.get_mut(&remote).ok_or(Error::IllegalState("peer vanished mid-handshake"))?;
        peer.state = ServerPeerState::Challenged;
        peer.touch_recv(now_ms);

        let token = ChallengeToken { client_id: peer.client_id, user_data: peer.user_data };
        let token_sequence = peer.challenge_sequence;
        peer.challenge_sequence += 1;
        let encrypted_token = token.encrypt(token_sequence, &challenge_key);

        let challenge = ChallengePacket { token_sequence, encrypted_token };
        let mut body = Vec::new();
        challenge.encode(&mut body)?;

        let sequence = peer.next_outbound_sequence();
        let server_to_client_key = peer.server_to_client_key;
        let header = PacketHeader { kind: PacketKind::Challenge, sequence };
        let bytes = packet::envelope::encrypt(&header, &body, &crate::codec::token::VERSION, self.config.protocol_id, &server_to_client_key)?;
        peer.touch_send(now_ms);

        Ok(HandshakeEvent::Reply(bytes))
    }

    /// Handles an inbound, already-unenveloped RESPONSE packet body plus the
    /// header sequence it arrived under (§4.6 "Response acceptance").
    pub fn handle_response(&mut self, remote: SocketAddr, response: ResponsePacket, now_ms: u64) -> Result<HandshakeEvent> {
        let challenge_key = self.challenge_key;
        let peer = match self.peers.get_mut(&remote) {
            Some(peer) if peer.state == ServerPeerState::Challenged => peer,
            _ => return Ok(HandshakeEvent::Ignore),
        };

        let token = match ChallengeToken::decrypt(&response.encrypted_token, response.token_sequence, &challenge_key) {
            Ok(token) => token,
            Err(_) => return Ok(HandshakeEvent::Ignore),
        };

        if token.client_id != peer.client_id {
            return Ok(HandshakeEvent::Ignore);
        }

        peer.state = ServerPeerState::Connected;
        peer.touch_recv(now_ms);

        // Acknowledge the connection immediately with a keep-alive rather
        // than waiting for the next periodic tick, so the client doesn't
        // sit without a session handle until the first scheduled interval.
        let client_id = peer.client_id;
        let user_data = peer.user_data;
        let mut body = Vec::new();
        crate::packet::KeepAlivePacket { client_id: client_id as u64, server_time_ms: now_ms }.encode(&mut body)?;
        let sequence = peer.next_outbound_sequence();
        let server_to_client_key = peer.server_to_client_key;
        let header = PacketHeader { kind: PacketKind::KeepAlive, sequence };
        let bytes = packet::envelope::encrypt(&header, &body, &crate::codec::token::VERSION, self.config.protocol_id, &server_to_client_key)?;
        let peer = self.peers.get_mut(&remote).ok_or(Error::IllegalState("peer vanished mid-handshake"))?;
        peer.touch_send(now_ms);

        Ok(HandshakeEvent::Connected { client_id, user_data, reply: Some(bytes) })
    }

    /// Seals an outbound application packet (KEEP_ALIVE, PAYLOAD, DISCONNECT)
    /// for a connected peer.
    pub fn encode_for_peer(&mut self, remote: SocketAddr, kind: PacketKind, body: &[u8], now_ms: u64) -> Result<Vec<u8>> {
        let protocol_id = self.config.protocol_id;
        let peer = self.peers.get_mut(&remote).ok_or(Error::SessionInvalid)?;
        let sequence = peer.next_outbound_sequence();
        let header = PacketHeader { kind, sequence };
        let bytes = packet::envelope::encrypt(&header, body, &crate::codec::token::VERSION, protocol_id, &peer.server_to_client_key)?;
        peer.touch_send(now_ms);
        Ok(bytes)
    }

    /// Opens an inbound application packet from a connected peer, enforcing
    /// replay protection. The replay window is checked against the
    /// plaintext header *before* AEAD verification runs, so a replayed
    /// sequence costs a header parse rather than a full decrypt (§3); the
    /// window is only committed once that verification actually succeeds, so
    /// a forged packet can never burn a legitimate future sequence number.
    pub fn decode_from_peer(&mut self, remote: SocketAddr, bytes: &[u8], now_ms: u64) -> Result<(PacketKind, Vec<u8>)> {
        let protocol_id = self.config.protocol_id;
        let peer = self.peers.get_mut(&remote).ok_or(Error::SessionInvalid)?;

        let (_, sequence) = packet::envelope::peek_header(bytes)?;
        if !peer.inbound_replay.would_accept(sequence) {
            return Err(Error::Malformed("peer: replayed sequence"));
        }

        let (kind, sequence, plain) = packet::envelope::decrypt(bytes, &crate::codec::token::VERSION, protocol_id, &peer.client_to_server_key)?;
        peer.inbound_replay.commit(sequence);
        peer.touch_recv(now_ms);
        Ok((kind, plain))
    }

    /// Seals a rejection for a request whose token decrypted fine but whose
    /// server was already full. Uses a throwaway sequence since the client
    /// has no established session to reuse one from.
    fn encode_unkeyed(&self, kind: PacketKind, packet: &DeniedPacket, key: &[u8; KEY_SIZE], sequence: u64) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        packet.encode(&mut body)?;
        let header = PacketHeader { kind, sequence };
        packet::envelope::encrypt(&header, &body, &crate::codec::token::VERSION, self.config.protocol_id, key)
    }

    /// Drains keep-alives due and peers that have exceeded their idle
    /// timeout (§4.6 "Timeouts", "Keep-alives").
    pub fn tick(&mut self, now_ms: u64, keepalive_interval_ms: u64) -> (Vec<(SocketAddr, Vec<u8>)>, Vec<SocketAddr>) {
        let mut keepalives = Vec::new();
        let mut timed_out = Vec::new();

        for (addr, peer) in self.peers.iter() {
            if !peer.is_connected() {
                continue;
            }
            if peer.is_idle_timed_out(now_ms) {
                timed_out.push(*addr);
            } else if now_ms.saturating_sub(peer.last_send_ms) >= keepalive_interval_ms {
                keepalives.push(*addr);
            }
        }

        let mut packets = Vec::with_capacity(keepalives.len());
        for addr in keepalives {
            let client_id = self.peers[&addr].client_id as u64;
            let mut body = Vec::new();
            let keepalive = crate::packet::KeepAlivePacket { client_id, server_time_ms: now_ms };
            if keepalive.encode(&mut body).is_ok() {
                if let Ok(bytes) = self.encode_for_peer(addr, PacketKind::KeepAlive, &body, now_ms) {
                    packets.push((addr, bytes));
                }
            }
        }

        for addr in &timed_out {
            self.peers.remove(addr);
        }

        (packets, timed_out)
    }

    pub fn disconnect(&mut self, remote: &SocketAddr) {
        if let Some(peer) = self.peers.get_mut(remote) {
            peer.state = ServerPeerState::Disconnecting;
        }
    }

    pub fn remove(&mut self, remote: &SocketAddr) {
        self.peers.remove(remote);
    }
}

impl Clone for RequestPacket {
    fn clone(&self) -> RequestPacket {
        RequestPacket {
            version: self.version,
            protocol_id: self.protocol_id,
            expire_timestamp: self.expire_timestamp,
            nonce: self.nonce,
            encrypted_private: self.encrypted_private,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::token::ConnectToken;

    fn server() -> Server {
        Server::new(ServerConfig {
            protocol_id: 0x1234,
            server_key: [1u8; KEY_SIZE],
            max_clients: 2,
            bind_addr: "127.0.0.1:9000".parse().unwrap(),
        })
    }

    fn make_request(server_key: &[u8; KEY_SIZE], protocol_id: u64, now_ms: u64) -> RequestPacket {
        let (token, _private) = ConnectToken::generate(
            42,
            5,
            vec!["127.0.0.1:9000".parse().unwrap()],
            [0u8; USER_DATA_SIZE],
            protocol_id,
            now_ms + 10_000,
            now_ms,
            server_key,
        )
        .unwrap();

        RequestPacket {
            version: crate::codec::token::VERSION,
            protocol_id: token.protocol_id,
            expire_timestamp: token.expire_timestamp,
            nonce: token.nonce,
            encrypted_private: token.encrypted_private,
        }
    }

    #[test]
    fn request_then_response_connects() {
        let mut srv = server();
        let request = make_request(&srv.config.server_key, srv.config.protocol_id, 0);
        let remote: SocketAddr = "127.0.0.1:5000".parse().unwrap();

        let event = srv.handle_request(remote, request, 0).unwrap();
        let challenge_bytes = match event {
            HandshakeEvent::Reply(bytes) => bytes,
            _ => panic!("expected challenge reply"),
        };

        let peer = srv.peer(&remote).unwrap();
        let (kind, _seq, plain) =
            packet::envelope::decrypt(&challenge_bytes, &crate::codec::token::VERSION, srv.config.protocol_id, &peer.server_to_client_key).unwrap();
        assert_eq!(kind, PacketKind::Challenge);
        let challenge = ChallengePacket::decode(&plain[..]).unwrap();

        let response = ResponsePacket { token_sequence: challenge.token_sequence, encrypted_token: challenge.encrypted_token };
        let event = srv.handle_response(remote, response, 10).unwrap();
        assert!(matches!(event, HandshakeEvent::Connected { client_id: 42, .. }));
        assert!(srv.peer(&remote).unwrap().is_connected());
    }

    #[test]
    fn foreign_protocol_id_ignored() {
        let mut srv = server();
        let mut request = make_request(&srv.config.server_key, srv.config.protocol_id, 0);
        request.protocol_id += 1;
        let remote: SocketAddr = "127.0.0.1:5001".parse().unwrap();
        let event = srv.handle_request(remote, request, 0).unwrap();
        assert!(matches!(event, HandshakeEvent::Ignore));
    }

    #[test]
    fn server_full_denies_new_clients() {
        let mut srv = server();
        for i in 0..2 {
            let request = make_request(&srv.config.server_key, srv.config.protocol_id, 0);
            let remote: SocketAddr = format!("127.0.0.1:{}", 6000 + i).parse().unwrap();
            srv.handle_request(remote, request, 0).unwrap();
        }
        let request = make_request(&srv.config.server_key, srv.config.protocol_id, 0);
        let remote: SocketAddr = "127.0.0.1:6099".parse().unwrap();
        let event = srv.handle_request(remote, request, 0).unwrap();
        assert!(matches!(event, HandshakeEvent::Reply(_)));
        assert_eq!(srv.peer_count(), 2);
    }
}

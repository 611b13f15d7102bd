//! Client-side half of the handshake and connected-session state machine
//! (§4.6). Drives one connect attempt through the token's address list.

use super::peer::ClientState;
use crate::codec::token::ConnectToken;
use crate::codec::PacketHeader;
use crate::error::{ConnectResult, Error, Result};
use crate::packet::{self, ChallengePacket, PacketKind, RequestPacket, ResponsePacket};
use crate::protocol::replay::ReplayGuard;
use std::net::SocketAddr;

/// Default per-address connect attempt budget used when a token carries no
/// idle timeout (`timeout_seconds < 0`), in milliseconds.
const DEFAULT_ATTEMPT_BUDGET_MS: u64 = 5_000;
/// How often an un-acknowledged REQUEST is resent to the current address
/// while waiting for a CHALLENGE.
const REQUEST_RESEND_INTERVAL_MS: u64 = 250;

pub struct Client {
    token: ConnectToken,
    address_index: usize,
    state: ClientState,
    outbound_sequence: u64,
    inbound_replay: ReplayGuard,
    last_send_ms: u64,
    last_recv_ms: u64,
    pending_challenge: Option<ChallengePacket>,
    /// When the current address's attempt budget started; reset on every
    /// `advance_to_next_address`.
    attempt_started_ms: u64,
    timed_out: bool,
    denied: bool,
}

impl Client {
    pub fn new(token: ConnectToken) -> Client {
        Client {
            token,
            address_index: 0,
            state: ClientState::Disconnected,
            outbound_sequence: 0,
            inbound_replay: ReplayGuard::new(),
            last_send_ms: 0,
            last_recv_ms: 0,
            pending_challenge: None,
            attempt_started_ms: 0,
            timed_out: false,
            denied: false,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Current server address to attempt, cycling the token's address list
    /// on timeout (§4.6: "iterate token's address list").
    pub fn current_server(&self) -> SocketAddr {
        self.token.addresses[self.address_index]
    }

    /// Each address gets an independent attempt budget bounded by the
    /// token's negotiated timeout (§4.6 "client side").
    pub fn attempt_budget_ms(&self) -> u64 {
        if self.token.timeout_seconds < 0 {
            DEFAULT_ATTEMPT_BUDGET_MS
        } else {
            (self.token.timeout_seconds as u64) * 1000
        }
    }

    /// Whether the current address's attempt budget has elapsed while still
    /// waiting on a CHALLENGE.
    pub fn attempt_expired(&self, now_ms: u64) -> bool {
        self.state == ClientState::SendingRequest
            && now_ms.saturating_sub(self.attempt_started_ms) >= self.attempt_budget_ms()
    }

    /// Whether a REQUEST resend to the current address is due.
    pub fn resend_due(&self, now_ms: u64) -> bool {
        self.state == ClientState::SendingRequest
            && now_ms.saturating_sub(self.last_send_ms) >= REQUEST_RESEND_INTERVAL_MS
    }

    pub fn advance_to_next_address(&mut self) -> Result<()> {
        self.address_index += 1;
        if self.address_index >= self.token.addresses.len() {
            self.timed_out = true;
            return Err(Error::ConnectTimedOut);
        }
        self.state = ClientState::Disconnected;
        Ok(())
    }

    /// Builds the REQUEST packet for the current address and starts that
    /// address's attempt budget.
    pub fn build_request(&mut self, now_ms: u64) -> Vec<u8> {
        self.state = ClientState::SendingRequest;
        self.attempt_started_ms = now_ms;
        self.encode_request(now_ms)
    }

    /// Rebuilds the same REQUEST for a resend, without resetting the
    /// attempt budget's clock.
    pub fn resend_request(&mut self, now_ms: u64) -> Vec<u8> {
        self.encode_request(now_ms)
    }

    fn encode_request(&mut self, now_ms: u64) -> Vec<u8> {
        self.last_send_ms = now_ms;

        let request = RequestPacket {
            version: crate::codec::token::VERSION,
            protocol_id: self.token.protocol_id,
            expire_timestamp: self.token.expire_timestamp,
            nonce: self.token.nonce,
            encrypted_private: self.token.encrypted_private,
        };
        let mut bytes = Vec::new();
        request.encode(&mut bytes).expect("encoding to a Vec cannot fail");
        bytes
    }

    /// Feeds an inbound CHALLENGE envelope; returns the RESPONSE bytes to
    /// send back.
    pub fn handle_challenge(&mut self, bytes: &[u8], now_ms: u64) -> Result<Vec<u8>> {
        let (_, peeked_sequence) = packet::envelope::peek_header(bytes)?;
        if !self.inbound_replay.would_accept(peeked_sequence) {
            return Err(Error::Malformed("client: replayed CHALLENGE"));
        }

        let (kind, sequence, plain) = packet::envelope::decrypt(
            bytes,
            &crate::codec::token::VERSION,
            self.token.protocol_id,
            &self.token.server_to_client_key,
        )?;
        if kind != PacketKind::Challenge {
            return Err(Error::Malformed("client: expected CHALLENGE"));
        }
        self.inbound_replay.commit(sequence);

        let challenge = ChallengePacket::decode(&plain[..])?;
        self.pending_challenge = Some(ChallengePacket {
            token_sequence: challenge.token_sequence,
            encrypted_token: challenge.encrypted_token,
        });
        self.state = ClientState::SendingResponse;
        self.last_recv_ms = now_ms;

        let response = ResponsePacket {
            token_sequence: challenge.token_sequence,
            encrypted_token: challenge.encrypted_token,
        };
        let mut body = Vec::new();
        response.encode(&mut body)?;

        let header = PacketHeader { kind: PacketKind::Response, sequence: self.next_outbound_sequence() };
        let sealed = packet::envelope::encrypt(
            &header,
            &body,
            &crate::codec::token::VERSION,
            self.token.protocol_id,
            &self.token.client_to_server_key,
        )?;
        self.last_send_ms = now_ms;
        Ok(sealed)
    }

    /// Feeds an inbound application packet once connected (KEEP_ALIVE,
    /// PAYLOAD, DISCONNECT, or an early DENIED).
    pub fn handle_packet(&mut self, bytes: &[u8], now_ms: u64) -> Result<(PacketKind, Vec<u8>)> {
        let (_, peeked_sequence) = packet::envelope::peek_header(bytes)?;
        if !self.inbound_replay.would_accept(peeked_sequence) {
            return Err(Error::Malformed("client: replayed packet"));
        }

        let (kind, sequence, plain) = packet::envelope::decrypt(
            bytes,
            &crate::codec::token::VERSION,
            self.token.protocol_id,
            &self.token.server_to_client_key,
        )?;
        self.inbound_replay.commit(sequence);

        match kind {
            PacketKind::Denied => {
                self.state = ClientState::Disconnected;
                self.denied = true;
            }
            _ => {
                if self.state == ClientState::SendingResponse {
                    self.state = ClientState::Connected;
                }
                self.last_recv_ms = now_ms;
            }
        }

        Ok((kind, plain))
    }

    pub fn encode_outbound(&mut self, kind: PacketKind, body: &[u8], now_ms: u64) -> Result<Vec<u8>> {
        let header = PacketHeader { kind, sequence: self.next_outbound_sequence() };
        let sealed = packet::envelope::encrypt(
            &header,
            body,
            &crate::codec::token::VERSION,
            self.token.protocol_id,
            &self.token.client_to_server_key,
        )?;
        self.last_send_ms = now_ms;
        Ok(sealed)
    }

    fn next_outbound_sequence(&mut self) -> u64 {
        let seq = self.outbound_sequence;
        self.outbound_sequence += 1;
        seq
    }

    /// The handshake outcome to surface via `on_connect_result`, once one is
    /// settled. `None` while the attempt is still in flight.
    pub fn connect_result(&self) -> Option<ConnectResult> {
        if self.denied {
            Some(ConnectResult::Denied)
        } else if self.timed_out {
            Some(ConnectResult::TimedOut)
        } else if self.state == ClientState::Connected {
            Some(ConnectResult::Connected)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::token::USER_DATA_SIZE;
    use crate::crypto::KEY_SIZE;
    use crate::protocol::server::{HandshakeEvent, Server, ServerConfig};

    fn handshake(protocol_id: u64) -> (Server, Client, SocketAddr) {
        let server_key = [6u8; KEY_SIZE];
        let bind_addr: SocketAddr = "127.0.0.1:7777".parse().unwrap();
        let (token, _private) = ConnectToken::generate(
            900,
            10,
            vec![bind_addr],
            [0u8; USER_DATA_SIZE],
            protocol_id,
            1_000_000,
            0,
            &server_key,
        )
        .unwrap();

        let server = Server::new(ServerConfig { protocol_id, server_key, max_clients: 4, bind_addr });
        let client = Client::new(token);
        (server, client, bind_addr)
    }

    #[test]
    fn full_handshake_reaches_connected_on_both_sides() {
        let (mut server, mut client, _bind_addr) = handshake(0xfeed);
        let remote: SocketAddr = "127.0.0.1:4000".parse().unwrap();

        let request_bytes = client.build_request(0);
        let request = RequestPacket::decode(&request_bytes[..]).unwrap();

        let challenge_bytes = match server.handle_request(remote, request, 0).unwrap() {
            HandshakeEvent::Reply(bytes) => bytes,
            _ => panic!("expected a challenge reply"),
        };

        let response_bytes = client.handle_challenge(&challenge_bytes, 1).unwrap();
        let (kind, _seq, plain) = packet::envelope::decrypt(
            &response_bytes,
            &crate::codec::token::VERSION,
            0xfeed,
            &client.token.client_to_server_key,
        )
        .unwrap();
        assert_eq!(kind, PacketKind::Response);
        let response = ResponsePacket::decode(&plain[..]).unwrap();

        let event = server.handle_response(remote, response, 2).unwrap();
        assert!(matches!(event, HandshakeEvent::Connected { client_id: 900, .. }));
        assert!(server.peer(&remote).unwrap().is_connected());
        assert_eq!(client.state(), ClientState::SendingResponse);
    }
}

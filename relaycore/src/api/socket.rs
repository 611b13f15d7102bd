//! Socket: the top-level handle an application holds (§4.8 "Socket"). Wraps
//! one adapter and, once started, exactly one of a client or server protocol
//! engine plus the sessions that engine produces.

use crate::adapter::{Adapter, AdapterEvents};
use crate::api::message::Message;
use crate::api::session::{SessionHandle, SessionState, SessionTable};
use crate::codec::token::{ConnectToken, USER_DATA_SIZE};
use crate::crypto::KEY_SIZE;
use crate::delivery::{self, Mode};
use crate::error::{ConnectResult, Error, Result};
use crate::packet::{KeepAlivePacket, PacketKind, RequestPacket, ResponsePacket};
use crate::protocol::client::Client;
use crate::protocol::peer::ClientState;
use crate::protocol::server::{HandshakeEvent, Server, ServerConfig};
use crate::sequencer::{Sequencer, SequencerTask};
use crate::stats::Counters;
use hashbrown::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

const KEEPALIVE_INTERVAL_DIVISOR: u64 = 4;
const DEFAULT_TIMEOUT_SECONDS: u64 = 15;
/// Minimum burst size for DISCONNECT packets (§4.6: "at least 10").
const DISCONNECT_BURST: usize = 10;

/// One parcel delivered to the application after passing a channel's
/// acceptance rule.
#[derive(Clone)]
pub struct DeliveredMessage {
    pub session: SessionHandle,
    pub channel_index: usize,
    pub body: Vec<u8>,
}

enum Role {
    Idle,
    Client { client: Client, session: Option<SessionHandle>, last_keepalive_sent_ms: Option<u64> },
    Server { server: Server },
}

/// Gathers raw datagrams from one `Adapter::poll` call so they can be
/// processed against `&mut Socket` afterward without a double borrow.
struct RecvBuffer {
    events: Vec<(SocketAddr, Vec<u8>)>,
}

impl AdapterEvents for RecvBuffer {
    fn on_recv(&mut self, from: SocketAddr, data: &[u8]) {
        self.events.push((from, data.to_vec()));
    }

    fn on_send_complete(&mut self, _to: SocketAddr, _result: Result<()>) {}
}

pub struct Socket {
    adapter: Box<dyn Adapter>,
    channel_modes: Vec<Mode>,
    fragment_capacity: usize,
    role: Role,
    sessions: SessionTable,
    plugin_sessions: HashSet<SessionHandle>,
    on_plugin_send: Option<Box<dyn FnMut(SessionHandle, &Message)>>,
    sequencer: Sequencer,
    stopped: bool,
    stats: Counters,
}

impl Socket {
    pub fn create(adapter: Box<dyn Adapter>, channel_modes: Vec<Mode>) -> Socket {
        Socket {
            adapter,
            channel_modes,
            fragment_capacity: delivery::DEFAULT_FRAGMENT_CAPACITY,
            role: Role::Idle,
            sessions: SessionTable::new(),
            plugin_sessions: HashSet::new(),
            on_plugin_send: None,
            sequencer: Sequencer::new(),
            stopped: false,
            stats: Counters::new(),
        }
    }

    /// Read-only accounting: packet/byte counts, AEAD and replay failures,
    /// retransmits, and parcels delivered per mode (§12).
    pub fn stats(&self) -> &Counters {
        &self.stats
    }

    pub fn set_plugin_send_handler<F>(&mut self, handler: F)
    where
        F: FnMut(SessionHandle, &Message) + 'static,
    {
        self.on_plugin_send = Some(Box::new(handler));
    }

    pub fn mark_plugin_session(&mut self, handle: SessionHandle) {
        self.plugin_sessions.insert(handle);
    }

    /// Starts client role: parses `connect_token_bytes` and sends the first
    /// REQUEST immediately. Exactly one of `connect`/`listen` may be active.
    pub fn connect(&mut self, connect_token_bytes: &[u8], now_ms: u64) -> Result<()> {
        if !matches!(self.role, Role::Idle) {
            return Err(Error::IllegalState("socket: already started"));
        }
        if !self.adapter.capabilities().client_encrypted {
            return Err(Error::IllegalState("adapter: does not support encrypted client traffic"));
        }
        let token = ConnectToken::decode(connect_token_bytes, now_ms)?;
        let mut client = Client::new(token);
        let request = client.build_request(now_ms);
        let server_addr = client.current_server();
        self.stats.on_packet_sent(PacketKind::Request, request.len());
        self.adapter.send(server_addr, &request)?;
        self.role = Role::Client { client, session: None, last_keepalive_sent_ms: None };
        Ok(())
    }

    /// Starts server role, accepting connections addressed to `bind_addr`.
    pub fn listen(&mut self, server_key: [u8; KEY_SIZE], protocol_id: u64, max_clients: usize, bind_addr: SocketAddr) -> Result<()> {
        if !matches!(self.role, Role::Idle) {
            return Err(Error::IllegalState("socket: already started"));
        }
        if !self.adapter.capabilities().server_encrypted {
            return Err(Error::IllegalState("adapter: does not support encrypted server traffic"));
        }
        self.role = Role::Server {
            server: Server::new(ServerConfig { protocol_id, server_key, max_clients, bind_addr }),
        };
        Ok(())
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.adapter.local_addr()
    }

    /// The socket's current clock: server returns raw `hrtime`, client
    /// returns its best synchronized estimate of the server's clock, or `0`
    /// before the first clock-offset sample lands.
    pub fn time(&self, hrtime_ms: u64) -> u64 {
        match self.current_client_session() {
            Some(handle) => self.sessions.get(handle).ok().and_then(|s| s.synchronized_time(hrtime_ms)).unwrap_or(0),
            None if matches!(self.role, Role::Client { .. }) => 0,
            None => hrtime_ms,
        }
    }

    pub fn session(&self, handle: SessionHandle) -> Result<&crate::api::session::Session> {
        self.sessions.get(handle)
    }

    pub fn session_mut(&mut self, handle: SessionHandle) -> Result<&mut crate::api::session::Session> {
        self.sessions.get_mut(handle)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn client_session(&self) -> Option<SessionHandle> {
        self.current_client_session()
    }

    /// Looks up a connected peer's handle by the client id its connect
    /// token carried. Useful for a server application that wants to target
    /// a specific peer (e.g. for a broadcast) without tracking handles
    /// itself as they arrive.
    pub fn session_by_client_id(&self, client_id: i64) -> Option<SessionHandle> {
        self.sessions.iter().find(|(_, session)| session.get_client_id() == client_id).map(|(handle, _)| handle)
    }

    /// The outcome of an in-progress or settled client connect attempt
    /// (§4.8, §7 `CONNECT_DENIED`/`CONNECT_TIMED_OUT`). `None` on a server
    /// socket or before the attempt has settled.
    pub fn connect_result(&self) -> Option<ConnectResult> {
        match &self.role {
            Role::Client { client, .. } => client.connect_result(),
            _ => None,
        }
    }

    /// Drains the adapter, advances the handshake and delivery state
    /// machines, and returns every payload that just completed reassembly.
    pub fn poll(&mut self, now_ms: u64) -> Result<Vec<DeliveredMessage>> {
        if self.stopped {
            return Ok(Vec::new());
        }

        let mut buffer = RecvBuffer { events: Vec::new() };
        self.adapter.poll(&mut buffer)?;

        let mut delivered = Vec::new();
        for (from, bytes) in buffer.events {
            self.handle_datagram(from, &bytes, now_ms, &mut delivered)?;
        }

        self.run_heartbeat(now_ms)?;
        self.run_retransmits(now_ms)?;
        self.run_sequencer(now_ms);

        Ok(delivered)
    }

    /// Runs every task queued since the previous `poll`. Disconnects and
    /// stop requests go through here rather than acting immediately so a
    /// callback triggered mid-dispatch never observes a session disappear
    /// out from under it (§4.9).
    fn run_sequencer(&mut self, now_ms: u64) {
        for task in self.sequencer.drain() {
            match task {
                SequencerTask::DisconnectSession(handle) => {
                    let _ = self.disconnect_session_now(handle, now_ms);
                }
                SequencerTask::StopSocket => self.stop_now(now_ms),
            }
        }
    }

    fn handle_datagram(&mut self, from: SocketAddr, bytes: &[u8], now_ms: u64, delivered: &mut Vec<DeliveredMessage>) -> Result<()> {
        // Header byte 0 is the REQUEST sentinel; every other packet kind is
        // AEAD-enveloped and has a nonzero header byte (§6).
        let is_request = bytes.first() == Some(&0);

        match (&mut self.role, is_request) {
            (Role::Idle, _) => Ok(()),
            (Role::Server { .. }, true) => {
                let request = RequestPacket::decode(bytes)?;
                self.handle_server_request(from, request, now_ms)
            }
            (Role::Server { .. }, false) => self.handle_server_packet(from, bytes, now_ms, delivered),
            (Role::Client { .. }, true) => Ok(()), // a client never receives REQUEST packets
            (Role::Client { .. }, false) => self.handle_client_packet(bytes, now_ms, delivered),
        }
    }

    fn handle_server_request(&mut self, from: SocketAddr, request: RequestPacket, now_ms: u64) -> Result<()> {
        let server = match &mut self.role {
            Role::Server { server } => server,
            _ => return Ok(()),
        };
        self.stats.on_packet_received(PacketKind::Request, 0);
        match server.handle_request(from, request, now_ms)? {
            HandshakeEvent::Reply(bytes) => {
                // Either a CHALLENGE or a DENIED, depending on whether the
                // server was full; the byte count is what matters for stats.
                self.stats.on_packet_sent(PacketKind::Challenge, bytes.len());
                self.adapter.send(from, &bytes).ok();
                Ok(())
            }
            HandshakeEvent::Connected { .. } | HandshakeEvent::Ignore => Ok(()),
        }
    }

    /// One envelope decode handles both in-progress RESPONSE packets and
    /// already-connected application traffic, since both are sealed under
    /// the same per-peer key and the server tracks one peer table
    /// regardless of handshake progress.
    fn handle_server_packet(&mut self, from: SocketAddr, bytes: &[u8], now_ms: u64, delivered: &mut Vec<DeliveredMessage>) -> Result<()> {
        let server = match &mut self.role {
            Role::Server { server } => server,
            _ => return Ok(()),
        };
        let (kind, plain) = match server.decode_from_peer(from, bytes, now_ms) {
            Ok(result) => result,
            Err(Error::CryptoFailed) => {
                self.stats.on_aead_failure();
                return Ok(());
            }
            Err(Error::Malformed(_)) => {
                self.stats.on_replay_rejected();
                return Ok(());
            }
            Err(_) => return Ok(()), // unknown peer, dropped silently
        };
        self.stats.on_packet_received(kind, bytes.len());

        if kind == PacketKind::Response {
            let response = ResponsePacket::decode(&plain[..])?;
            return match server.handle_response(from, response, now_ms)? {
                HandshakeEvent::Connected { client_id, user_data, reply } => {
                    let handle = self.sessions.insert(from, client_id, user_data, &self.channel_modes, self.fragment_capacity);
                    self.sessions.get_mut(handle)?.force_state(SessionState::Connected);
                    if let Some(bytes) = reply {
                        self.stats.on_packet_sent(PacketKind::KeepAlive, bytes.len());
                        self.adapter.send(from, &bytes).ok();
                    }
                    Ok(())
                }
                HandshakeEvent::Reply(bytes) => {
                    self.adapter.send(from, &bytes).ok();
                    Ok(())
                }
                HandshakeEvent::Ignore => Ok(()),
            };
        }

        let handle = match self.sessions.find_by_addr(&from) {
            Some(handle) => handle,
            None => return Ok(()),
        };
        self.dispatch_application_packet(handle, kind, plain, now_ms, delivered)
    }

    fn handle_client_packet(&mut self, bytes: &[u8], now_ms: u64, delivered: &mut Vec<DeliveredMessage>) -> Result<()> {
        let state = match &self.role {
            Role::Client { client, .. } => client.state(),
            _ => return Ok(()),
        };

        if state == ClientState::SendingRequest {
            let (response_bytes, addr) = match &mut self.role {
                Role::Client { client, .. } => (client.handle_challenge(bytes, now_ms)?, client.current_server()),
                _ => unreachable!(),
            };
            self.stats.on_packet_received(PacketKind::Challenge, bytes.len());
            self.stats.on_packet_sent(PacketKind::Response, response_bytes.len());
            self.adapter.send(addr, &response_bytes)?;
            return Ok(());
        }

        let (kind, plain) = match &mut self.role {
            Role::Client { client, .. } => client.handle_packet(bytes, now_ms)?,
            _ => unreachable!(),
        };
        self.stats.on_packet_received(kind, bytes.len());

        if kind == PacketKind::Denied {
            return Ok(());
        }

        self.ensure_client_session();
        let handle = match self.current_client_session() {
            Some(handle) => handle,
            None => return Ok(()),
        };

        if kind == PacketKind::KeepAlive {
            let keepalive = KeepAlivePacket::decode(&plain[..])?;
            self.sample_client_clock_offset(keepalive.server_time_ms, now_ms);
            return Ok(());
        }

        self.dispatch_application_packet(handle, kind, plain, now_ms, delivered)
    }

    fn ensure_client_session(&mut self) {
        if let Role::Client { client, session, .. } = &mut self.role {
            if session.is_none() {
                let handle = self.sessions.insert(client.current_server(), 0, [0u8; USER_DATA_SIZE], &self.channel_modes, self.fragment_capacity);
                *session = Some(handle);
            }
        }
        if let Some(handle) = self.current_client_session() {
            if let Ok(session) = self.sessions.get_mut(handle) {
                session.force_state(SessionState::Connected);
            }
        }
    }

    fn current_client_session(&self) -> Option<SessionHandle> {
        match &self.role {
            Role::Client { session, .. } => *session,
            _ => None,
        }
    }

    fn sample_client_clock_offset(&mut self, server_time_ms: u64, now_ms: u64) {
        let sent_ms = match &self.role {
            Role::Client { last_keepalive_sent_ms: Some(sent), .. } => *sent,
            _ => return,
        };
        if let Some(handle) = self.current_client_session() {
            if let Ok(session) = self.sessions.get_mut(handle) {
                session.note_clock_offset_sample(sent_ms, now_ms, server_time_ms);
                session.note_rtt_sample(Duration::from_millis(now_ms.saturating_sub(sent_ms)));
            }
        }
    }

    fn dispatch_application_packet(
        &mut self,
        handle: SessionHandle,
        kind: PacketKind,
        plain: Vec<u8>,
        now_ms: u64,
        delivered: &mut Vec<DeliveredMessage>,
    ) -> Result<()> {
        match kind {
            PacketKind::Payload => {
                if plain.is_empty() {
                    return Ok(());
                }
                let channel_index = plain[0] as usize;
                let fragment = delivery::Fragment::decode(&plain[1..])?;
                let session = self.sessions.get_mut(handle)?;
                let mode = session.get_channel(channel_index)?.mode();
                let channel = session.get_channel(channel_index)?;
                let (body, rtt_sample) = channel.accept_fragment(fragment, now_ms)?;
                if let Some(sample) = rtt_sample {
                    session.note_rtt_sample(sample);
                }
                if let Some(body) = body {
                    self.stats.on_parcel_delivered(mode);
                    delivered.push(DeliveredMessage { session: handle, channel_index, body });
                }
                Ok(())
            }
            PacketKind::Disconnect => {
                self.sessions.remove(handle).ok();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn run_heartbeat(&mut self, now_ms: u64) -> Result<()> {
        match &mut self.role {
            Role::Server { server } => {
                let keepalive_interval_ms = DEFAULT_TIMEOUT_SECONDS * 1000 / KEEPALIVE_INTERVAL_DIVISOR;
                let (keepalives, timed_out) = server.tick(now_ms, keepalive_interval_ms);
                for (addr, bytes) in keepalives {
                    self.stats.on_packet_sent(PacketKind::KeepAlive, bytes.len());
                    self.adapter.send(addr, &bytes).ok();
                }
                for addr in timed_out {
                    if let Some(handle) = self.sessions.find_by_addr(&addr) {
                        self.sessions.remove(handle).ok();
                    }
                }
                Ok(())
            }
            Role::Client { client, last_keepalive_sent_ms, .. } if client.state() == ClientState::Connected => {
                let interval_ms = DEFAULT_TIMEOUT_SECONDS * 1000 / KEEPALIVE_INTERVAL_DIVISOR;
                let due = last_keepalive_sent_ms.map(|sent| now_ms.saturating_sub(sent) >= interval_ms).unwrap_or(true);
                if due {
                    let mut body = Vec::new();
                    KeepAlivePacket { client_id: 0, server_time_ms: 0 }.encode(&mut body)?;
                    let bytes = client.encode_outbound(PacketKind::KeepAlive, &body, now_ms)?;
                    let addr = client.current_server();
                    self.stats.on_packet_sent(PacketKind::KeepAlive, bytes.len());
                    self.adapter.send(addr, &bytes)?;
                    *last_keepalive_sent_ms = Some(now_ms);
                }
                Ok(())
            }
            Role::Client { client, .. } if client.state() == ClientState::SendingRequest => self.run_client_request_retry(now_ms),
            _ => Ok(()),
        }
    }

    /// Resends the REQUEST while a CHALLENGE is outstanding, and once the
    /// current address's attempt budget elapses, rotates to the token's next
    /// address (or settles the attempt as timed out) (§4.6).
    fn run_client_request_retry(&mut self, now_ms: u64) -> Result<()> {
        let client = match &mut self.role {
            Role::Client { client, .. } => client,
            _ => return Ok(()),
        };

        if client.attempt_expired(now_ms) {
            if client.advance_to_next_address().is_ok() {
                let request = client.build_request(now_ms);
                let addr = client.current_server();
                self.stats.on_packet_sent(PacketKind::Request, request.len());
                self.adapter.send(addr, &request)?;
            }
            return Ok(());
        }

        if client.resend_due(now_ms) {
            let request = client.resend_request(now_ms);
            let addr = client.current_server();
            self.stats.on_packet_sent(PacketKind::Request, request.len());
            self.adapter.send(addr, &request)?;
        }
        Ok(())
    }

    fn run_retransmits(&mut self, now_ms: u64) -> Result<()> {
        let addrs_and_handles: Vec<(SocketAddr, SessionHandle)> =
            self.sessions.iter().map(|(handle, session)| (session.get_address(), handle)).collect();

        for (addr, handle) in addrs_and_handles {
            let (rto_ms, channel_count) = {
                let session = self.sessions.get(handle)?;
                (session.retransmit_timeout().as_millis() as u64, session.channel_count())
            };

            for channel_index in 0..channel_count {
                let mut fragments = {
                    let session = self.sessions.get_mut(handle)?;
                    let channel = session.get_channel(channel_index)?;
                    channel.due_retransmits(now_ms, rto_ms)
                };
                // Flush a standalone ack when there's nothing else due for
                // this channel, so a one-directional RELIABLE receiver still
                // reports delivery back to its sender (§4.7).
                if let Some(ack_fragment) = {
                    let session = self.sessions.get_mut(handle)?;
                    let channel = session.get_channel(channel_index)?;
                    channel.flush_ack()
                } {
                    fragments.push(ack_fragment);
                }
                for fragment in fragments {
                    let mut body = vec![channel_index as u8];
                    fragment.encode(&mut body)?;
                    if let Ok(bytes) = self.encode_application_packet(addr, PacketKind::Payload, &body, now_ms) {
                        self.stats.on_fragment_retransmitted();
                        self.stats.on_packet_sent(PacketKind::Payload, bytes.len());
                        self.adapter.send(addr, &bytes).ok();
                    }
                }
            }
        }
        Ok(())
    }

    fn encode_application_packet(&mut self, addr: SocketAddr, kind: PacketKind, body: &[u8], now_ms: u64) -> Result<Vec<u8>> {
        match &mut self.role {
            Role::Server { server } => server.encode_for_peer(addr, kind, body, now_ms),
            Role::Client { client, .. } => client.encode_outbound(kind, body, now_ms),
            Role::Idle => Err(Error::IllegalState("socket: not started")),
        }
    }

    /// Broadcasts `message` on `channel_index` to `sessions`, per the
    /// partitioning algorithm: connected-vs-disconnected, then
    /// builtin-vs-plugin among the connected. Returns the number of
    /// successful hand-offs.
    pub fn send(&mut self, channel_index: usize, message: &Message, sessions: &[SessionHandle], now_ms: u64) -> Result<usize> {
        message.finish();
        let body = message.body()?;

        let connected: Vec<SessionHandle> =
            sessions.iter().copied().filter(|handle| self.sessions.get(*handle).map(|s| s.is_connected()).unwrap_or(false)).collect();

        let (builtin, plugin): (Vec<SessionHandle>, Vec<SessionHandle>) =
            connected.into_iter().partition(|handle| !self.plugin_sessions.contains(handle));

        let mut sent_count = 0usize;

        for handle in builtin {
            if self.send_builtin(channel_index, &body, handle, now_ms).is_ok() {
                sent_count += 1;
            }
        }

        for handle in plugin {
            if let Some(on_plugin_send) = &mut self.on_plugin_send {
                on_plugin_send(handle, message);
                sent_count += 1;
            }
        }

        Ok(sent_count)
    }

    fn send_builtin(&mut self, channel_index: usize, body: &[u8], handle: SessionHandle, now_ms: u64) -> Result<()> {
        let addr = self.sessions.get(handle)?.get_address();
        let fragments = {
            let session = self.sessions.get_mut(handle)?;
            let channel = session.get_channel(channel_index)?;
            channel.submit(body, now_ms)?.1
        };

        for fragment in fragments {
            let mut wire_body = vec![channel_index as u8];
            fragment.encode(&mut wire_body)?;
            let bytes = self.encode_application_packet(addr, PacketKind::Payload, &wire_body, now_ms)?;
            self.stats.on_packet_sent(PacketKind::Payload, bytes.len());
            self.adapter.send(addr, &bytes)?;
        }
        Ok(())
    }

    /// Queues the session for teardown on the next `poll` rather than
    /// tearing it down inline (§4.9 "Sequencer").
    pub fn disconnect_session(&mut self, handle: SessionHandle) {
        self.sequencer.submit(SequencerTask::DisconnectSession(handle));
    }

    fn disconnect_session_now(&mut self, handle: SessionHandle, now_ms: u64) -> Result<()> {
        let addr = self.sessions.get(handle)?.get_address();
        // Sent as a burst rather than once, to improve the odds the peer
        // notices before its own idle timeout.
        for _ in 0..DISCONNECT_BURST {
            if let Ok(bytes) = self.encode_application_packet(addr, PacketKind::Disconnect, &[], now_ms) {
                self.stats.on_packet_sent(PacketKind::Disconnect, bytes.len());
                self.adapter.send(addr, &bytes).ok();
            }
        }
        self.sessions.remove(handle)?;
        Ok(())
    }

    /// Queues full socket teardown for the next `poll`.
    pub fn stop(&mut self) {
        self.sequencer.submit(SequencerTask::StopSocket);
    }

    fn stop_now(&mut self, now_ms: u64) {
        if self.stopped {
            return;
        }
        let handles: Vec<SessionHandle> = self.sessions.iter().map(|(handle, _)| handle).collect();
        for handle in handles {
            let _ = self.disconnect_session_now(handle, now_ms);
        }
        self.role = Role::Idle;
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

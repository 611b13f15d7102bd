//! Pluggable I/O boundary between the protocol/delivery engine and the
//! operating system (§4.4 "Adapter"). The default is UDP sockets; tests use
//! an in-process adapter that can drop, reorder, and delay packets.

pub mod udp;

use crate::error::Result;
use std::net::SocketAddr;

/// Capability flags an adapter advertises for which handshake directions it
/// can actually carry (§4.4). The engine refuses to start a role the
/// adapter's capabilities don't cover a packet for: a plain UDP socket
/// carries AEAD-sealed traffic in both directions and nothing else, while an
/// adapter fronting an already-encrypted transport (a VPN tunnel, say) might
/// only need to carry plaintext.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdapterCapabilities {
    /// Can carry AEAD-sealed packets sent by a client.
    pub client_encrypted: bool,
    /// Can carry AEAD-sealed packets sent by a server.
    pub server_encrypted: bool,
    /// Can carry plaintext packets sent by a client.
    pub client_unencrypted: bool,
    /// Can carry plaintext packets sent by a server.
    pub server_unencrypted: bool,
}

/// Callbacks the engine registers with an adapter. Implemented as a plain
/// trait rather than boxed closures so adapters can be driven from a single
/// owning struct without heap allocation per event.
pub trait AdapterEvents {
    fn on_recv(&mut self, from: SocketAddr, data: &[u8]);
    fn on_send_complete(&mut self, to: SocketAddr, result: Result<()>);
}

/// A transport the engine can send and receive datagrams through.
pub trait Adapter {
    fn capabilities(&self) -> AdapterCapabilities;

    /// Sends one datagram; may return `Error::WouldBlock` under backpressure.
    fn send(&mut self, to: SocketAddr, data: &[u8]) -> Result<()>;

    /// Drains whatever is ready to read without blocking, dispatching each
    /// datagram to `events.on_recv`.
    fn poll(&mut self, events: &mut dyn AdapterEvents) -> Result<()>;

    fn local_addr(&self) -> Result<SocketAddr>;
}

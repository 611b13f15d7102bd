//! The connection protocol engine: connect-token handshake, replay
//! protection, and the connected-session packet encrypt/decrypt dispatch
//! built on top of the codec and packet layers (§4.6).

pub mod challenge_token;
pub mod client;
pub mod peer;
pub mod replay;
pub mod server;

pub use challenge_token::ChallengeToken;
pub use client::Client;
pub use peer::{ClientState, ServerPeer, ServerPeerState};
pub use replay::ReplayGuard;
pub use server::{HandshakeEvent, Server, ServerConfig};

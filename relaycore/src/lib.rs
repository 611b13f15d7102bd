//! Secure UDP connection handshake and reliable/ordered delivery for
//! real-time applications. A connect token proves a client was authorized
//! out-of-band (by a web backend, typically); `Socket` carries it through a
//! request/challenge/response handshake and then multiplexes the connection
//! into independently-configured channels, each unreliable, sequenced, or
//! reliable-ordered.

pub mod adapter;
pub mod api;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod delivery;
pub mod error;
pub mod logging;
pub mod packet;
pub mod platform;
pub mod protocol;
pub mod sequencer;
pub mod stats;
pub mod windows;

pub use api::{Channel, DeliveredMessage, Message, Session, SessionHandle, SessionState, Socket};
pub use codec::ConnectToken;
pub use delivery::Mode;
pub use error::{ConnectResult, Error, Result};
pub use stats::Counters;

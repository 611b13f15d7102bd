//! Public application-facing surface: sockets, sessions, channels, and
//! messages (§4.8).

pub mod channel;
pub mod message;
pub mod session;
pub mod socket;

pub use channel::Channel;
pub use message::Message;
pub use session::{Session, SessionHandle, SessionState, SessionTable};
pub use socket::{DeliveredMessage, Socket};

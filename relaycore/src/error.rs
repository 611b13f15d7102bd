use std::fmt;
use std::io;

/// Errors surfaced synchronously to an application-driven API call.
///
/// Errors derived from untrusted network input (`Malformed`, `CryptoFailed`)
/// are never constructed by the public API — they are consumed internally by
/// the protocol/delivery layer and never escape past a packet boundary (see
/// the propagation policy in the crate's error handling design).
#[derive(Debug)]
pub enum Error {
    InvalidArgument(&'static str),
    IllegalState(&'static str),
    MessageOverflow,
    MessageUnderflow,
    SessionInvalid,
    ChannelInvalid,
    ConnectDenied,
    ConnectTimedOut,
    Malformed(&'static str),
    CryptoFailed,
    /// The underlying operation would block; not a failure.
    WouldBlock,
    Io(io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Error::IllegalState(msg) => write!(f, "illegal state: {}", msg),
            Error::MessageOverflow => write!(f, "message write past capacity"),
            Error::MessageUnderflow => write!(f, "message read past end"),
            Error::SessionInvalid => write!(f, "session handle is stale"),
            Error::ChannelInvalid => write!(f, "channel index out of range"),
            Error::ConnectDenied => write!(f, "connection denied"),
            Error::ConnectTimedOut => write!(f, "connection timed out"),
            Error::Malformed(msg) => write!(f, "malformed wire data: {}", msg),
            Error::CryptoFailed => write!(f, "AEAD verification failed"),
            Error::WouldBlock => write!(f, "operation would block"),
            Error::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    #[inline]
    fn from(io_error: io::Error) -> Self {
        match io_error.kind() {
            io::ErrorKind::WouldBlock => Error::WouldBlock,
            _ => Error::Io(io_error),
        }
    }
}

/// Outcome of a connect attempt, surfaced via `on_connect_result`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectResult {
    Connected,
    Denied,
    TimedOut,
}

//! Wire codecs: packed (variable-length) integers, base64, the connect-token
//! layout and the packet header. Manual `Read`/`Write`-driven serialization,
//! following the teacher's "can't use bincode, the other side isn't Rust"
//! design note (`t51core/src/net/mod.rs`).

pub mod base64;
pub mod header;
pub mod token;
pub mod varint;

pub use header::PacketHeader;
pub use token::{ConnectToken, PrivateToken};
pub use varint::{read_packed_uint, write_packed_uint, packed_uint_len};

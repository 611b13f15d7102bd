//! TOML-backed configuration for the server and client demo binaries
//! (§ ambient stack). The library itself is configured in-process through
//! `Socket::listen`/`connect`; this module exists for the processes that
//! wrap it and need to load their settings from a file on disk.

use serde_derive::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:28008";
pub const DEFAULT_PROTOCOL_ID: u64 = 0x52_45_4c_41_59_43_4f_52; // "RELAYCOR"
pub const DEFAULT_MAX_CLIENTS: usize = 256;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 15;

#[derive(Serialize, Deserialize)]
pub struct ServerSection {
    pub bind_addr: SocketAddr,
    pub protocol_id: u64,
    pub max_clients: usize,
    pub timeout_seconds: u64,
    /// Hex-encoded 32-byte server key; kept as a string in the file so the
    /// config can be checked in without binary noise.
    pub server_key_hex: String,
}

#[derive(Serialize, Deserialize)]
pub struct ChannelSection {
    pub mode: String,
}

#[derive(Serialize, Deserialize)]
pub struct RelayConfig {
    pub server: ServerSection,
    pub channels: Vec<ChannelSection>,
}

impl Default for RelayConfig {
    fn default() -> RelayConfig {
        RelayConfig {
            server: ServerSection {
                bind_addr: DEFAULT_BIND_ADDR.parse().unwrap(),
                protocol_id: DEFAULT_PROTOCOL_ID,
                max_clients: DEFAULT_MAX_CLIENTS,
                timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
                server_key_hex: "0".repeat(64),
            },
            channels: vec![ChannelSection { mode: "reliable".to_string() }],
        }
    }
}

impl RelayConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> RelayConfig {
        serdeconv::from_toml_file(path).expect("error loading relaycore configuration file")
    }

    pub fn server_key(&self) -> [u8; crate::crypto::KEY_SIZE] {
        decode_hex_key(&self.server.server_key_hex)
    }

    pub fn channel_modes(&self) -> Vec<crate::delivery::Mode> {
        self.channels.iter().map(|c| parse_mode(&c.mode)).collect()
    }
}

fn parse_mode(text: &str) -> crate::delivery::Mode {
    use crate::delivery::Mode;
    match text {
        "unreliable" => Mode::Unreliable,
        "sequenced" => Mode::Sequenced,
        "reliable" => Mode::Reliable,
        other => panic!("relaycore: unknown channel mode '{other}' in config"),
    }
}

fn decode_hex_key(hex: &str) -> [u8; crate::crypto::KEY_SIZE] {
    let mut key = [0u8; crate::crypto::KEY_SIZE];
    assert_eq!(hex.len(), crate::crypto::KEY_SIZE * 2, "relaycore: server key must be {} hex chars", crate::crypto::KEY_SIZE * 2);
    for (index, byte) in key.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[index * 2..index * 2 + 2], 16).expect("relaycore: server key is not valid hex");
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_a_reliable_channel() {
        let config = RelayConfig::default();
        assert_eq!(config.channel_modes(), vec![crate::delivery::Mode::Reliable]);
    }

    #[test]
    fn all_zero_hex_key_decodes_to_zero_bytes() {
        let config = RelayConfig::default();
        assert_eq!(config.server_key(), [0u8; crate::crypto::KEY_SIZE]);
    }

    #[test]
    #[should_panic(expected = "unknown channel mode")]
    fn unknown_mode_panics() {
        parse_mode("bogus");
    }
}

//! AEAD, checksum and RNG primitives. No bespoke cryptography lives here —
//! everything is a thin, constant-time wrapper over libsodium's
//! ChaCha20-Poly1305 (IETF) AEAD and generichash (Blake2b), the same pairing
//! the teacher's session/token code uses for its own connection tokens.

mod aead;
mod checksum;
mod random;

pub use aead::{
    decrypt, decrypt_with_nonce, encrypt, encrypt_with_nonce, make_nonce, KEY_SIZE, MAC_SIZE,
    NONCE_SIZE,
};
pub use checksum::checksum;
pub use random::{random_bytes, random_u64};

use ctor::ctor;

/// Initializes the sodium runtime exactly once, before any other code in the
/// process can call into it. Mirrors `server/lib/flux/src/crypto.rs`'s
/// `#[ctor] fn INIT_SODIUM`.
#[ctor]
fn init_sodium() {
    unsafe {
        if libsodium_sys::sodium_init() < 0 {
            panic!("relaycore: libsodium initialization failed");
        }
    }
}

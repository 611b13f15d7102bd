use byteorder::{LittleEndian, WriteBytesExt};

pub const KEY_SIZE: usize = libsodium_sys::crypto_aead_chacha20poly1305_IETF_KEYBYTES as usize;
pub const NONCE_SIZE: usize = libsodium_sys::crypto_aead_chacha20poly1305_IETF_NPUBBYTES as usize;
pub const MAC_SIZE: usize = libsodium_sys::crypto_aead_chacha20poly1305_IETF_ABYTES as usize;

const NONCE_SEQ_OFFSET: usize = NONCE_SIZE - 8;

/// Builds the 12-byte AEAD nonce for a given packet sequence: the low 8 bytes
/// hold `sequence` little-endian, the remaining high bytes are zero. The
/// sequence number doubles as the nonce input for its direction, so reusing
/// one per (key, direction) pair is what replay protection (§4.6) guards
/// against.
#[inline]
pub fn make_nonce(sequence: u64) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    (&mut nonce[NONCE_SEQ_OFFSET..])
        .write_u64::<LittleEndian>(sequence)
        .expect("nonce buffer is exactly NONCE_SIZE bytes");
    nonce
}

/// Encrypts `plain` in place into `dst`, appending a `MAC_SIZE`-byte tag.
/// `dst` must be exactly `plain.len() + MAC_SIZE` bytes.
#[inline]
pub fn encrypt(
    dst: &mut [u8],
    plain: &[u8],
    key: &[u8; KEY_SIZE],
    nonce: u64,
    associated_data: &[u8],
) {
    encrypt_with_nonce(dst, plain, key, &make_nonce(nonce), associated_data)
}

/// As `encrypt`, but takes the raw `NONCE_SIZE`-byte nonce directly instead of
/// deriving it from a packet sequence. Used by the connect-token codec, whose
/// nonce is a random value carried in the token rather than a monotonic
/// per-direction sequence.
#[inline]
pub fn encrypt_with_nonce(
    dst: &mut [u8],
    plain: &[u8],
    key: &[u8; KEY_SIZE],
    nonce_bytes: &[u8; NONCE_SIZE],
    associated_data: &[u8],
) {
    assert_eq!(
        dst.len(),
        plain.len() + MAC_SIZE,
        "encrypt destination must be plaintext length + MAC_SIZE"
    );

    unsafe {
        libsodium_sys::crypto_aead_chacha20poly1305_ietf_encrypt(
            dst.as_mut_ptr(),
            std::ptr::null_mut(),
            plain.as_ptr(),
            plain.len() as u64,
            associated_data.as_ptr(),
            associated_data.len() as u64,
            std::ptr::null(),
            nonce_bytes.as_ptr(),
            key.as_ptr(),
        );
    }
}

/// Verifies and decrypts `cipher` (which includes the trailing MAC) into
/// `dst`. Returns `false` on tag mismatch; `dst` content is unspecified in
/// that case and must not be read by the caller (the AEAD failure must not
/// reveal partial plaintext).
#[inline]
#[must_use]
pub fn decrypt(
    dst: &mut [u8],
    cipher: &[u8],
    key: &[u8; KEY_SIZE],
    nonce: u64,
    associated_data: &[u8],
) -> bool {
    decrypt_with_nonce(dst, cipher, key, &make_nonce(nonce), associated_data)
}

/// As `decrypt`, but takes the raw `NONCE_SIZE`-byte nonce directly. See
/// `encrypt_with_nonce`.
#[inline]
#[must_use]
pub fn decrypt_with_nonce(
    dst: &mut [u8],
    cipher: &[u8],
    key: &[u8; KEY_SIZE],
    nonce_bytes: &[u8; NONCE_SIZE],
    associated_data: &[u8],
) -> bool {
    assert_eq!(
        cipher.len(),
        dst.len() + MAC_SIZE,
        "decrypt source must be plaintext length + MAC_SIZE"
    );

    let result = unsafe {
        libsodium_sys::crypto_aead_chacha20poly1305_ietf_decrypt(
            dst.as_mut_ptr(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            cipher.as_ptr(),
            cipher.len() as u64,
            associated_data.as_ptr(),
            associated_data.len() as u64,
            nonce_bytes.as_ptr(),
            key.as_ptr(),
        )
    };

    result == 0
}

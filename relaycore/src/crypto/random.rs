use byteorder::{LittleEndian, ByteOrder};

/// Fills `out` with cryptographically secure random bytes, matching
/// `flux::crypto::random_bytes`.
#[inline]
pub fn random_bytes(out: &mut [u8]) {
    if out.is_empty() {
        return;
    }
    unsafe {
        libsodium_sys::randombytes_buf(out.as_mut_ptr() as *mut std::ffi::c_void, out.len());
    }
}

/// Draws a random `u64`, used for nonces and session signatures.
#[inline]
pub fn random_u64() -> u64 {
    let mut bytes = [0u8; 8];
    random_bytes(&mut bytes);
    LittleEndian::read_u64(&bytes)
}

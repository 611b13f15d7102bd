/// Default digest length for the Blake2b checksum used on framing that is
/// not already covered by an AEAD tag.
pub const CHECKSUM_SIZE: usize = 16;

/// Computes a Blake2b checksum (via libsodium's generichash) of `data`.
#[inline]
pub fn checksum(data: &[u8]) -> [u8; CHECKSUM_SIZE] {
    let mut out = [0u8; CHECKSUM_SIZE];
    unsafe {
        libsodium_sys::crypto_generichash(
            out.as_mut_ptr(),
            CHECKSUM_SIZE,
            data.as_ptr(),
            data.len() as u64,
            std::ptr::null(),
            0,
        );
    }
    out
}

//! Monotonic and wall clock access, isolated behind one module so the rest
//! of the engine never calls `Instant::now`/`SystemTime::now` directly
//! (§4.5 "Platform").

use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// High-resolution monotonic timestamp in milliseconds since an arbitrary
/// epoch fixed at process start. Only valid for measuring durations within
/// one process lifetime.
pub fn hrtime_ms(epoch: Instant) -> u64 {
    epoch.elapsed().as_millis() as u64
}

/// Wall-clock milliseconds since the Unix epoch, used for connect-token
/// expiry comparisons.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

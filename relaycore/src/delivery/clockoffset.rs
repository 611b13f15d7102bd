//! Client-side wall-clock offset estimation against the server, driven by
//! keep-alive round trips (§4.7 "Clock-offset estimation"). Used so the
//! client can reason about server timestamps (e.g. connect-token expiry)
//! without trusting its own clock to already agree with the server's.

const SMOOTHING_NUM: i64 = 1;
const SMOOTHING_DEN: i64 = 8;

pub struct ClockOffsetEstimator {
    offset_ms: Option<i64>,
}

impl ClockOffsetEstimator {
    pub fn new() -> ClockOffsetEstimator {
        ClockOffsetEstimator { offset_ms: None }
    }

    /// Folds in one keep-alive round trip: `client_send_ms` and
    /// `client_recv_ms` bracket the request, `server_time_ms` was the
    /// server's clock at the moment it replied. Assumes symmetric latency.
    pub fn sample(&mut self, client_send_ms: u64, client_recv_ms: u64, server_time_ms: u64) {
        let rtt = client_recv_ms.saturating_sub(client_send_ms);
        let estimate = server_time_ms as i64 + (rtt as i64) / 2 - client_recv_ms as i64;

        self.offset_ms = Some(match self.offset_ms {
            None => estimate,
            Some(prev) => prev + (estimate - prev) * SMOOTHING_NUM / SMOOTHING_DEN,
        });
    }

    /// Best current estimate of `server_clock - local_clock`, in
    /// milliseconds. `None` until at least one sample has been taken.
    pub fn offset_ms(&self) -> Option<i64> {
        self.offset_ms
    }

    /// Converts a local wall-clock millisecond timestamp to the
    /// corresponding server-clock timestamp, using the current estimate (or
    /// treating the clocks as aligned if no estimate exists yet).
    pub fn to_server_time(&self, local_ms: u64) -> u64 {
        let offset = self.offset_ms.unwrap_or(0);
        (local_ms as i64 + offset).max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_samples_is_none() {
        let estimator = ClockOffsetEstimator::new();
        assert_eq!(estimator.offset_ms(), None);
    }

    #[test]
    fn converges_to_stable_offset() {
        let mut estimator = ClockOffsetEstimator::new();
        // Server clock is consistently 5000ms ahead; 20ms round trips.
        for t in (0..2000u64).step_by(20) {
            estimator.sample(t, t + 20, t + 10 + 5000);
        }
        let offset = estimator.offset_ms().unwrap();
        assert!((offset - 5000).abs() < 50, "offset={}", offset);
    }

    #[test]
    fn to_server_time_uses_offset() {
        let mut estimator = ClockOffsetEstimator::new();
        estimator.sample(0, 20, 5010);
        let server_time = estimator.to_server_time(1_000);
        assert!(server_time > 1_000);
    }
}

//! RTT estimation and retransmit timeout, Jacobson/Karels EMA (§4.7,
//! "RTT estimation").

use std::time::Duration;

const ALPHA_NUM: u32 = 1;
const ALPHA_DEN: u32 = 8;
const BETA_NUM: u32 = 1;
const BETA_DEN: u32 = 4;

const MIN_RTO: Duration = Duration::from_millis(100);
const MAX_RTO: Duration = Duration::from_secs(60);

pub struct RttEstimator {
    srtt: Option<Duration>,
    rttvar: Duration,
}

impl RttEstimator {
    pub fn new() -> RttEstimator {
        RttEstimator {
            srtt: None,
            rttvar: Duration::from_millis(0),
        }
    }

    /// Folds one round-trip measurement into the estimate.
    pub fn sample(&mut self, measurement: Duration) {
        match self.srtt {
            None => {
                self.srtt = Some(measurement);
                self.rttvar = measurement / 2;
            }
            Some(srtt) => {
                let delta = if measurement > srtt {
                    measurement - srtt
                } else {
                    srtt - measurement
                };
                self.rttvar = self.rttvar - self.rttvar / BETA_DEN + delta * BETA_NUM / BETA_DEN;
                let adjustment = if measurement > srtt {
                    (measurement - srtt) * ALPHA_NUM / ALPHA_DEN
                } else {
                    (srtt - measurement) * ALPHA_NUM / ALPHA_DEN
                };
                self.srtt = Some(if measurement > srtt {
                    srtt + adjustment
                } else {
                    srtt - adjustment
                });
            }
        }
    }

    pub fn smoothed_rtt(&self) -> Option<Duration> {
        self.srtt
    }

    pub fn rtt_variance(&self) -> Duration {
        self.rttvar
    }

    /// Retransmit timeout: `srtt + 4*rttvar`, clamped to `[100ms, 60s]`.
    /// Before any sample has been taken, returns the floor.
    pub fn retransmit_timeout(&self) -> Duration {
        let srtt = match self.srtt {
            Some(srtt) => srtt,
            None => return MIN_RTO,
        };
        let rto = srtt + self.rttvar * 4;
        rto.clamp(MIN_RTO, MAX_RTO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_samples_returns_floor() {
        let estimator = RttEstimator::new();
        assert_eq!(estimator.retransmit_timeout(), MIN_RTO);
    }

    #[test]
    fn converges_toward_stable_rtt() {
        let mut estimator = RttEstimator::new();
        for _ in 0..50 {
            estimator.sample(Duration::from_millis(40));
        }
        let srtt = estimator.smoothed_rtt().unwrap();
        assert!(srtt.as_millis() >= 38 && srtt.as_millis() <= 42, "{:?}", srtt);
    }

    #[test]
    fn rto_widens_with_jitter() {
        let mut estimator = RttEstimator::new();
        for ms in [20, 80, 20, 80, 20, 80] {
            estimator.sample(Duration::from_millis(ms));
        }
        assert!(estimator.retransmit_timeout() > Duration::from_millis(80));
    }

    #[test]
    fn rto_is_clamped_to_ceiling() {
        let mut estimator = RttEstimator::new();
        estimator.sample(Duration::from_secs(120));
        estimator.sample(Duration::from_millis(1));
        assert!(estimator.retransmit_timeout() <= MAX_RTO);
    }
}

//! A monotonic sliding-window sequence acceptor, shared by packet-level
//! replay protection (§4.6) and reliable-bus duplicate suppression (§4.7).
//! Both need the same shape: accept a sequence number if it is newer than
//! the trailing edge of the window and has not been seen before, then mark
//! it seen and slide the window forward.

const WORD_BITS: u64 = 64;

pub struct SlidingWindow {
    size: u64,
    words: Vec<u64>,
    high_water: Option<u64>,
}

impl SlidingWindow {
    pub fn new(size: u64) -> SlidingWindow {
        assert!(size > 0, "window size must be nonzero");
        let word_count = ((size + WORD_BITS - 1) / WORD_BITS) as usize;
        SlidingWindow {
            size,
            words: vec![0u64; word_count],
            high_water: None,
        }
    }

    pub fn high_water(&self) -> Option<u64> {
        self.high_water
    }

    fn bit(&self, seq: u64) -> (usize, u64) {
        let slot = seq % self.size;
        ((slot / WORD_BITS) as usize, 1u64 << (slot % WORD_BITS))
    }

    fn is_set(&self, seq: u64) -> bool {
        let (word, mask) = self.bit(seq);
        self.words[word] & mask != 0
    }

    fn set(&mut self, seq: u64) {
        let (word, mask) = self.bit(seq);
        self.words[word] |= mask;
    }

    fn clear(&mut self, seq: u64) {
        let (word, mask) = self.bit(seq);
        self.words[word] &= !mask;
    }

    /// Reports whether `seq` would be accepted: newer than `high_water -
    /// size` and not already marked. Does not mutate state, so a caller can
    /// check a sequence before paying for whatever expensive verification
    /// gates actually recording it (e.g. AEAD) without poisoning the window
    /// on a failed verification.
    pub fn would_accept(&self, seq: u64) -> bool {
        match self.high_water {
            None => true,
            Some(high) => {
                if seq + self.size <= high {
                    return false;
                }
                if seq <= high {
                    return !self.is_set(seq);
                }
                true
            }
        }
    }

    /// Records `seq` as seen, sliding the window forward if `seq` is past
    /// the current high-water mark. Callers must have already confirmed
    /// `would_accept(seq)`; this does not re-check.
    pub fn commit(&mut self, seq: u64) {
        match self.high_water {
            None => {
                self.set(seq);
                self.high_water = Some(seq);
            }
            Some(high) => {
                if seq <= high {
                    self.set(seq);
                    return;
                }

                // seq > high: slide the window forward, clearing the bits
                // that fall out of range so stale hits don't linger.
                let mut clear_from = high + 1;
                if seq - high > self.size {
                    clear_from = seq - self.size + 1;
                    // Window moved further than its own span; every bit is stale.
                    for word in self.words.iter_mut() {
                        *word = 0;
                    }
                } else {
                    while clear_from < seq {
                        self.clear(clear_from);
                        clear_from += 1;
                    }
                }
                self.set(seq);
                self.high_water = Some(seq);
            }
        }
    }

    /// Checks and records `seq` in one call, for callers with no reason to
    /// split the two steps apart (e.g. reliable-bus dedup, which isn't
    /// gating anything expensive on the result).
    pub fn accept(&mut self, seq: u64) -> bool {
        if !self.would_accept(seq) {
            return false;
        }
        self.commit(seq);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_strictly_increasing_sequence() {
        let mut window = SlidingWindow::new(64);
        for seq in 0..100 {
            assert!(window.accept(seq));
        }
    }

    #[test]
    fn rejects_duplicate() {
        let mut window = SlidingWindow::new(64);
        assert!(window.accept(5));
        assert!(!window.accept(5));
    }

    #[test]
    fn accepts_reordered_within_window() {
        let mut window = SlidingWindow::new(64);
        assert!(window.accept(10));
        assert!(window.accept(8));
        assert!(!window.accept(8));
    }

    #[test]
    fn rejects_too_old() {
        let mut window = SlidingWindow::new(64);
        assert!(window.accept(100));
        assert!(!window.accept(30));
    }

    #[test]
    fn large_jump_resets_window_without_false_accepts() {
        let mut window = SlidingWindow::new(64);
        assert!(window.accept(0));
        assert!(window.accept(1_000_000));
        assert!(!window.accept(999_999 - 64));
        assert!(window.accept(1_000_001));
    }
}

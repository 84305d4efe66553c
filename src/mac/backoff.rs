//! Truncated binary exponential backoff

use rand_core::RngCore;

use crate::timer::{bits_to_time, SimTime};

/// Backoff slot selection
#[derive(Clone, PartialEq, Debug)]
pub struct BackoffScheduler {
    range_limit: u32,
    slot_time: SimTime,
}

impl BackoffScheduler {
    /// Create a scheduler with slots of `slot_bits` at `bitrate`
    pub fn new(range_limit: u32, slot_bits: u64, bitrate: u64) -> Self {
        Self {
            range_limit: range_limit.min(31),
            slot_time: bits_to_time(slot_bits, bitrate),
        }
    }

    /// Number of slots to choose from after `retries` collisions
    pub fn range(&self, retries: u32) -> u32 {
        1 << retries.min(self.range_limit)
    }

    /// Pick a slot uniformly in `[0, range(retries))`
    pub fn slot<R: RngCore>(&self, retries: u32, rng: &mut R) -> u32 {
        // Ranges are powers of two so the modulo is unbiased
        rng.next_u32() % self.range(retries)
    }

    pub fn delay(&self, slot: u32) -> SimTime {
        slot as SimTime * self.slot_time
    }

    pub fn slot_time(&self) -> SimTime {
        self.slot_time
    }
}

#[cfg(test)]
mod test {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::timer::PS_PER_NS;

    #[test]
    fn range_doubles_until_limit() {
        let b = BackoffScheduler::new(10, 512, 100_000_000);

        assert_eq!(b.range(0), 1);
        assert_eq!(b.range(1), 2);
        assert_eq!(b.range(2), 4);
        assert_eq!(b.range(9), 512);
        assert_eq!(b.range(10), 1024);
        assert_eq!(b.range(15), 1024);
        assert_eq!(b.range(16), 1024);
    }

    #[test]
    fn slots_stay_in_range() {
        let b = BackoffScheduler::new(10, 512, 100_000_000);
        let mut rng = StdRng::seed_from_u64(7);

        for retries in 0..17 {
            let range = b.range(retries);
            let mut seen_max = false;

            for _ in 0..range * 32 {
                let s = b.slot(retries, &mut rng);
                assert!(s < range);
                seen_max |= s == range - 1;
            }

            assert!(seen_max, "slot {} never chosen for {} retries", range - 1, retries);
        }
    }

    #[test]
    fn delay_is_linear_in_slots() {
        let b = BackoffScheduler::new(10, 512, 100_000_000);

        assert_eq!(b.slot_time(), 5_120 * PS_PER_NS);
        assert_eq!(b.delay(0), 0);
        assert_eq!(b.delay(1), 5_120 * PS_PER_NS);
        assert_eq!(b.delay(1023), 1023 * 5_120 * PS_PER_NS);
    }
}

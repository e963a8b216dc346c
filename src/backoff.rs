//! Binary exponential backoff, grounded in `CsmaNetDevice`'s `m_backoff` (ns-3's
//! `Backoff` helper): a uniform draw over an exponentially growing window, clamped to
//! `[min_slots, max_slots]`, with a ceiling on how far the window can grow and a hard cap on
//! retries.

use core::time::Duration;
use rand::Rng;

/// Tunables for [`BackoffController`]. `Default` mirrors ns-3's `CsmaNetDevice` attribute
/// defaults (1 byte-time slot, 1..1024 slots, ceiling 10, 1000 retries before the packet is
/// dropped).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffParams {
    pub slot_time: Duration,
    pub min_slots: u32,
    pub max_slots: u32,
    pub ceiling: u32,
    pub max_retries: u32,
}

impl Default for BackoffParams {
    fn default() -> Self {
        Self {
            slot_time: Duration::from_micros(1),
            min_slots: 1,
            max_slots: 1024,
            ceiling: 10,
            max_retries: 1000,
        }
    }
}

/// Per-device backoff state. One `BackoffController` lives inside each
/// [`crate::device::CsmaDevice`]; it is reset on every successful transmission.
#[derive(Debug, Clone)]
pub struct BackoffController {
    params: BackoffParams,
    retries: u32,
}

impl BackoffController {
    pub fn new(params: BackoffParams) -> Self {
        Self { params, retries: 0 }
    }

    /// Draws a uniform `k` in `[0, 2^min(retries, ceiling))`, clamps it to
    /// `[min_slots, max_slots]`, and returns `k * slot_time`.
    pub fn next_delay(&self) -> Duration {
        self.next_delay_with(&mut rand::thread_rng())
    }

    /// Testable variant of [`Self::next_delay`] taking an explicit RNG.
    pub fn next_delay_with(&self, rng: &mut impl Rng) -> Duration {
        let exponent = self.retries.min(self.params.ceiling);
        // 2^31 safely fits u32; ceiling is expected to stay well under 31.
        let window = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        let k = if window <= 1 {
            0
        } else {
            rng.gen_range(0..window)
        };
        let slots = k.clamp(self.params.min_slots, self.params.max_slots);
        self.params.slot_time * slots
    }

    pub fn record_attempt(&mut self) {
        self.retries += 1;
    }

    pub fn reset(&mut self) {
        self.retries = 0;
    }

    pub fn exhausted(&self) -> bool {
        self.retries >= self.params.max_retries
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn delay_always_within_min_max_slots() {
        let params = BackoffParams {
            slot_time: Duration::from_micros(10),
            min_slots: 2,
            max_slots: 6,
            ceiling: 4,
            max_retries: 16,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut backoff = BackoffController::new(params);
        for _ in 0..32 {
            let delay = backoff.next_delay_with(&mut rng);
            assert!(delay >= params.slot_time * params.min_slots);
            assert!(delay <= params.slot_time * params.max_slots);
            backoff.record_attempt();
        }
    }

    #[test]
    fn exhausted_follows_max_retries() {
        let mut backoff = BackoffController::new(BackoffParams {
            max_retries: 3,
            ..Default::default()
        });
        assert!(!backoff.exhausted());
        for _ in 0..3 {
            backoff.record_attempt();
        }
        assert!(backoff.exhausted());
    }

    #[test]
    fn reset_clears_retries() {
        let mut backoff = BackoffController::new(BackoffParams::default());
        backoff.record_attempt();
        backoff.record_attempt();
        backoff.reset();
        assert_eq!(backoff.retries(), 0);
    }
}

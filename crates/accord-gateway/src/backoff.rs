//! Exponential backoff with full jitter for reconnection delays.
//!
//! `delay = random(0, min(cap, base * 2^attempt))`.

use std::time::Duration;

/// Exponential backoff calculator with full jitter.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    base_ms: u64,
    max_ms: u64,
    attempt: u32,
}

impl Backoff {
    /// Create a calculator from base and cap.
    pub(crate) fn new(base: Duration, max: Duration) -> Self {
        Self {
            base_ms: u64::try_from(base.as_millis()).unwrap_or(u64::MAX),
            max_ms: u64::try_from(max.as_millis()).unwrap_or(u64::MAX),
            attempt: 0,
        }
    }

    /// Compute the next delay and advance the attempt.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let exp = self
            .base_ms
            .saturating_mul(1u64.checked_shl(self.attempt).unwrap_or(u64::MAX));
        let capped = exp.min(self.max_ms);
        let jittered = if capped == 0 {
            0
        } else {
            fastrand::u64(0..=capped)
        };
        self.attempt = self.attempt.saturating_add(1);
        Duration::from_millis(jittered)
    }

    /// Start over after a successful session.
    pub(crate) fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Delays computed since the last reset.
    pub(crate) fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// A uniformly random duration in `[min, max]`.
pub(crate) fn random_between(min: Duration, max: Duration) -> Duration {
    let lo = u64::try_from(min.as_millis()).unwrap_or(u64::MAX);
    let hi = u64::try_from(max.as_millis()).unwrap_or(u64::MAX).max(lo);
    Duration::from_millis(fastrand::u64(lo..=hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn first_delay_bounded_by_base() {
        for _ in 0..100 {
            let mut b = Backoff::new(ms(1000), ms(60_000));
            assert!(b.next_delay() <= ms(1000));
        }
    }

    #[test]
    fn attempt_advances() {
        let mut b = Backoff::new(ms(1000), ms(60_000));
        let _ = b.next_delay();
        let _ = b.next_delay();
        assert_eq!(b.attempt(), 2);
    }

    #[test]
    fn delay_capped_at_max() {
        let mut b = Backoff::new(ms(1000), ms(5000));
        for _ in 0..20 {
            assert!(b.next_delay() <= ms(5000));
        }
    }

    #[test]
    fn reset_resets_attempt() {
        let mut b = Backoff::new(ms(1000), ms(60_000));
        for _ in 0..5 {
            let _ = b.next_delay();
        }
        b.reset();
        assert_eq!(b.attempt(), 0);
    }

    #[test]
    fn zero_base_produces_zero_delay() {
        let mut b = Backoff::new(Duration::ZERO, Duration::ZERO);
        for _ in 0..10 {
            assert_eq!(b.next_delay(), Duration::ZERO);
        }
    }

    #[test]
    fn attempt_saturates() {
        let mut b = Backoff::new(ms(1000), ms(60_000));
        b.attempt = u32::MAX;
        assert!(b.next_delay() <= ms(60_000));
        assert_eq!(b.attempt, u32::MAX);
    }

    #[test]
    fn random_between_stays_in_range() {
        for _ in 0..100 {
            let d = random_between(ms(1000), ms(5000));
            assert!(d >= ms(1000) && d <= ms(5000));
        }
        assert_eq!(random_between(ms(7), ms(3)), ms(7));
    }
}

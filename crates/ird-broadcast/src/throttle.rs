//! Size/time throttling of outbound notifications.
//!
//! The throttler accumulates the sizes of accepted notifications inside a
//! refractory window. Once the accumulated size passes the limit, further
//! notifications are throttled until the window has elapsed. The reset is
//! lazy — observed on the next call rather than driven by a timer.

use std::time::{Duration, Instant};

/// Accumulating size/time throttle window.
#[derive(Debug)]
pub struct Throttler {
    size_limit: u64,
    refractory_period: Duration,
    accumulated_size: u64,
    window_start: Instant,
}

impl Throttler {
    pub fn new(size_limit: u64, refractory_period: Duration) -> Self {
        Self {
            size_limit,
            refractory_period,
            accumulated_size: 0,
            window_start: Instant::now(),
        }
    }

    /// Whether outbound notifications should currently be held back.
    pub fn should_throttle(&mut self) -> bool {
        self.should_throttle_at(Instant::now())
    }

    /// Clock-injected form of [`Self::should_throttle`].
    pub fn should_throttle_at(&mut self, now: Instant) -> bool {
        self.maybe_reset(now);
        self.accumulated_size > self.size_limit
    }

    /// Record the size of an accepted notification.
    pub fn add_report_size(&mut self, bytes: u64) {
        self.add_report_size_at(bytes, Instant::now());
    }

    /// Clock-injected form of [`Self::add_report_size`].
    pub fn add_report_size_at(&mut self, bytes: u64, now: Instant) {
        self.maybe_reset(now);
        self.accumulated_size = self.accumulated_size.saturating_add(bytes);
    }

    pub fn accumulated_size(&self) -> u64 {
        self.accumulated_size
    }

    fn maybe_reset(&mut self, now: Instant) {
        if now > self.window_start + self.refractory_period {
            self.accumulated_size = 0;
            self.window_start = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_past_limit() {
        let start = Instant::now();
        let mut t = Throttler::new(100, Duration::from_millis(1000));
        t.add_report_size_at(60, start);
        assert!(!t.should_throttle_at(start));
        t.add_report_size_at(60, start);
        assert!(t.should_throttle_at(start));
    }

    #[test]
    fn test_refractory_period_resets_lazily() {
        let start = Instant::now();
        let mut t = Throttler::new(100, Duration::from_millis(1000));
        t.add_report_size_at(60, start);
        t.add_report_size_at(60, start);
        assert!(t.should_throttle_at(start));

        // Window elapsed: the next observation clears the accumulator.
        let later = start + Duration::from_millis(1500);
        assert!(!t.should_throttle_at(later));
        assert_eq!(t.accumulated_size(), 0);

        // Accumulating past the limit throttles again.
        t.add_report_size_at(101, later);
        assert!(t.should_throttle_at(later));
    }

    #[test]
    fn test_exactly_at_limit_is_not_throttled() {
        let start = Instant::now();
        let mut t = Throttler::new(100, Duration::from_millis(1000));
        t.add_report_size_at(100, start);
        assert!(!t.should_throttle_at(start));
    }

    #[test]
    fn test_add_after_window_starts_fresh_window() {
        let start = Instant::now();
        let mut t = Throttler::new(100, Duration::from_millis(100));
        t.add_report_size_at(200, start);
        let later = start + Duration::from_millis(250);
        t.add_report_size_at(10, later);
        assert!(!t.should_throttle_at(later));
        assert_eq!(t.accumulated_size(), 10);
    }
}

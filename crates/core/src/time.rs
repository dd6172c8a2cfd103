//! Clocks used for latency measurement and metric timestamps
//!
//! Stores take an `Arc<dyn Clock>` at construction. Production code uses
//! [`SystemClock`]; tests use [`MockClock`] and advance it by hand.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Source of wall-clock milliseconds and monotonic nanoseconds.
pub trait Clock: Send + Sync {
    /// Milliseconds since Unix epoch.
    fn milliseconds(&self) -> i64;

    /// Monotonic nanoseconds; only differences are meaningful.
    fn nanoseconds(&self) -> i64;
}

/// System time.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a system clock.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn milliseconds(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default()
    }

    fn nanoseconds(&self) -> i64 {
        self.origin.elapsed().as_nanos() as i64
    }
}

/// Manually driven clock for tests.
///
/// Every `nanoseconds` read advances the clock by `auto_tick_ns` so that
/// timed sections measure a non-zero latency.
#[derive(Debug)]
pub struct MockClock {
    nanos: AtomicI64,
    auto_tick_ns: i64,
}

impl MockClock {
    /// Clock starting at `start_ms` with no auto tick.
    pub fn new(start_ms: i64) -> Self {
        Self {
            nanos: AtomicI64::new(start_ms.saturating_mul(1_000_000)),
            auto_tick_ns: 0,
        }
    }

    /// Clock starting at `start_ms` that advances `tick_ns` per nanosecond read.
    pub fn with_auto_tick(start_ms: i64, tick_ns: i64) -> Self {
        Self {
            nanos: AtomicI64::new(start_ms.saturating_mul(1_000_000)),
            auto_tick_ns: tick_ns,
        }
    }

    /// Advance by `ms` milliseconds.
    pub fn sleep(&self, ms: i64) {
        self.nanos.fetch_add(ms.saturating_mul(1_000_000), Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn milliseconds(&self) -> i64 {
        self.nanos.load(Ordering::SeqCst) / 1_000_000
    }

    fn nanoseconds(&self) -> i64 {
        self.nanos.fetch_add(self.auto_tick_ns, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_clock_sleep() {
        let clock = MockClock::new(1_000);
        assert_eq!(clock.milliseconds(), 1_000);
        clock.sleep(250);
        assert_eq!(clock.milliseconds(), 1_250);
    }

    #[test]
    fn test_mock_clock_auto_tick() {
        let clock = MockClock::with_auto_tick(0, 10);
        let a = clock.nanoseconds();
        let b = clock.nanoseconds();
        assert_eq!(b - a, 10);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.nanoseconds();
        let b = clock.nanoseconds();
        assert!(b >= a);
        assert!(clock.milliseconds() > 0);
    }
}

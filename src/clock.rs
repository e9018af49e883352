//! Wall-clock abstraction
//!
//! Reputation decay and placement metadata depend on the current time.
//! Components take an injected [`Clock`] so tests can drive time by hand.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of wall-clock timestamps
pub trait Clock: Send + Sync + fmt::Debug {
    /// Milliseconds since the UNIX epoch
    fn now_ms(&self) -> u64;
}

/// Clock backed by `SystemTime`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually advanced clock for deterministic tests
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        self.now_ms.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Hours elapsed between two millisecond timestamps; zero if `later` is earlier
pub fn elapsed_hours(earlier_ms: u64, later_ms: u64) -> f64 {
    later_ms.saturating_sub(earlier_ms) as f64 / 3_600_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.now_ms(), 3_000);
    }

    #[test]
    fn test_elapsed_hours() {
        assert_eq!(elapsed_hours(0, 7_200_000), 2.0);
        // Clock skew never produces negative elapsed time
        assert_eq!(elapsed_hours(5_000, 1_000), 0.0);
    }
}

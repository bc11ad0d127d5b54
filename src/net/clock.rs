//! Time source for network timeouts
//!
//! The crate has no timer of its own. Integrators hand a [`Clock`] to the
//! [`StackHandle`](crate::net::StackHandle); the DNS fallback measures its
//! exchange timeout against it.

use core::sync::atomic::{AtomicU64, Ordering};

/// Monotonic millisecond clock
pub trait Clock: Send + Sync {
    /// Milliseconds since an arbitrary fixed point
    fn now_ms(&self) -> u64;
}

/// Clock advanced by a periodic timer interrupt
pub struct TickClock {
    millis: AtomicU64,
    period_ms: u64,
}

impl TickClock {
    /// A clock whose `tick` is called every `period_ms` milliseconds
    pub const fn new(period_ms: u64) -> Self {
        Self {
            millis: AtomicU64::new(0),
            period_ms,
        }
    }

    // Called by timer interrupt
    pub fn tick(&self) {
        self.millis.fetch_add(self.period_ms, Ordering::Relaxed);
    }
}

impl Clock for TickClock {
    fn now_ms(&self) -> u64 {
        self.millis.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_clock_advances_by_period() {
        let clock = TickClock::new(10);
        assert_eq!(clock.now_ms(), 0);
        clock.tick();
        clock.tick();
        assert_eq!(clock.now_ms(), 20);
    }
}

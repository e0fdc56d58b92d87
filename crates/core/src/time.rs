use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Clock abstraction so simulations and tests control scheduling timestamps.
pub trait TimeSource: Send + Sync {
    /// Microseconds since the Unix epoch (or simulation start).
    fn now_us(&self) -> u64;
}

pub struct WallClock;

impl TimeSource for WallClock {
    fn now_us(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64
    }
}

/// Manually advanced clock for simulations.
#[derive(Default)]
pub struct SimulatedClock {
    now_us: AtomicU64,
}

impl SimulatedClock {
    pub fn new(start_us: u64) -> Self {
        Self {
            now_us: AtomicU64::new(start_us),
        }
    }

    pub fn set(&self, now_us: u64) {
        self.now_us.store(now_us, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_us: u64) {
        self.now_us.fetch_add(delta_us, Ordering::SeqCst);
    }
}

impl TimeSource for SimulatedClock {
    fn now_us(&self) -> u64 {
        self.now_us.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_clock_advances() {
        let clock = SimulatedClock::new(1000);
        assert_eq!(clock.now_us(), 1000);
        clock.advance(500);
        assert_eq!(clock.now_us(), 1500);
        clock.set(42);
        assert_eq!(clock.now_us(), 42);
    }

    #[test]
    fn wall_clock_is_after_2024() {
        // Should be after 2024-01-01.
        assert!(WallClock.now_us() > 1_704_067_200_000_000);
    }
}

//! Monotonic time and busy delays

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Millisecond clock plus the blocking delays the scan loop uses
pub trait Clock: Send + Sync {
    /// Milliseconds since an arbitrary fixed start
    fn now_ms(&self) -> u64;
    fn delay_ms(&self, ms: u64);
    fn delay_us(&self, us: u64);
}

/// Wall clock backed by `Instant`
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn delay_ms(&self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }

    fn delay_us(&self, us: u64) {
        // Sub-millisecond sleeps overshoot badly; spin instead
        let until = Instant::now() + Duration::from_micros(us);
        while Instant::now() < until {
            std::hint::spin_loop();
        }
    }
}

/// Test clock: time only moves when advanced or delayed
#[derive(Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance_ms(&self, ms: u64) {
        self.micros.fetch_add(ms * 1000, Ordering::SeqCst);
    }

    pub fn set_ms(&self, ms: u64) {
        self.micros.store(ms * 1000, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.micros.load(Ordering::SeqCst) / 1000
    }

    fn delay_ms(&self, ms: u64) {
        self.advance_ms(ms);
    }

    fn delay_us(&self, us: u64) {
        self.micros.fetch_add(us, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_delays_advance_time() {
        let clock = ManualClock::new();
        clock.delay_ms(5);
        assert_eq!(clock.now_ms(), 5);
        for _ in 0..150 {
            clock.delay_us(10);
        }
        assert_eq!(clock.now_ms(), 6);
        clock.set_ms(100);
        assert_eq!(clock.now_ms(), 100);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let before = clock.now_ms();
        clock.delay_ms(2);
        assert!(clock.now_ms() >= before + 2);
    }
}

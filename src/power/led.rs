//! Status LED

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::state::RuntimeFlags;
use crate::system::Clock;

/// Length of one low-battery blink pattern
pub const BLINK_CYCLE_MS: u64 = 1_700;

pub trait StatusLed: Send + Sync {
    fn set(&self, on: bool);
}

/// Double blink: on 1000-1200 ms and 1300-1500 ms of each cycle
pub fn low_battery_blink(now_ms: u64) -> bool {
    let phase = now_ms % BLINK_CYCLE_MS;
    (1_000..1_200).contains(&phase) || (1_300..1_500).contains(&phase)
}

/// Logs LED transitions
#[derive(Default)]
pub struct LogLed {
    on: AtomicBool,
}

impl LogLed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::Acquire)
    }
}

impl StatusLed for LogLed {
    fn set(&self, on: bool) {
        if self.on.swap(on, Ordering::AcqRel) != on {
            debug!("[led] {}", if on { "on" } else { "off" });
        }
    }
}

/// Drive the LED from the low battery flag, forever
pub async fn run_led(
    led: Arc<dyn StatusLed>,
    flags: Arc<RuntimeFlags>,
    clock: Arc<dyn Clock>,
    period: Duration,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        led.set(flags.is_low_battery() && low_battery_blink(clock.now_ms()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, false)]
    #[case(999, false)]
    #[case(1_000, true)]
    #[case(1_199, true)]
    #[case(1_200, false)]
    #[case(1_300, true)]
    #[case(1_499, true)]
    #[case(1_500, false)]
    #[case(1_700 + 1_100, true)]
    fn test_blink_pattern(#[case] now: u64, #[case] on: bool) {
        assert_eq!(low_battery_blink(now), on);
    }

    #[tokio::test]
    async fn test_led_follows_low_battery() {
        use crate::system::ManualClock;

        let led = Arc::new(LogLed::new());
        let flags = Arc::new(RuntimeFlags::new());
        let clock = ManualClock::new();
        clock.set_ms(1_100);

        let task = tokio::spawn(run_led(
            led.clone(),
            flags.clone(),
            Arc::new(clock.clone()),
            Duration::from_millis(50),
        ));
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!led.is_on());

        flags.set_low_battery(true);
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(led.is_on());
        task.abort();
    }
}

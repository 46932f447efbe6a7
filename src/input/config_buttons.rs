//! Fixed-function configuration buttons: short press, long press, and the
//! two-button factory reset

use tracing::{debug, info};

use crate::device::CONFIG_BUTTON_COUNT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigButtonEvent {
    /// Released before the long press threshold
    Short(usize),
    /// Held to the long press threshold (fires while still held)
    Long(usize),
    /// Both buttons held; seconds left before reset
    ResetCountdown(u8),
    ResetCancelled,
    FactoryReset,
}

#[derive(Debug, Clone, Copy)]
struct Countdown {
    started_ms: u64,
    announced: u8,
}

pub struct ConfigButtons {
    long_press_ms: u64,
    countdown_ms: u64,
    was_pressed: [bool; CONFIG_BUTTON_COUNT],
    press_times: [Option<u64>; CONFIG_BUTTON_COUNT],
    long_press_fired: [bool; CONFIG_BUTTON_COUNT],
    countdown: Option<Countdown>,
    /// Set once both buttons were held; single-button actions stay off until all are up
    combo_seen: bool,
}

impl ConfigButtons {
    pub fn new(long_press_ms: u64, countdown_secs: u64) -> Self {
        Self {
            long_press_ms,
            countdown_ms: countdown_secs * 1000,
            was_pressed: [false; CONFIG_BUTTON_COUNT],
            press_times: [None; CONFIG_BUTTON_COUNT],
            long_press_fired: [false; CONFIG_BUTTON_COUNT],
            countdown: None,
            combo_seen: false,
        }
    }

    /// Feed the current button levels; call once per scan cycle
    pub fn update(&mut self, now_ms: u64, pressed: [bool; CONFIG_BUTTON_COUNT]) -> Vec<ConfigButtonEvent> {
        let mut events = Vec::new();
        let all_down = pressed.iter().all(|&p| p);

        if all_down {
            if !self.combo_seen {
                self.combo_seen = true;
                let secs = self.countdown_secs_left(0);
                info!("Factory reset in {}s, release to cancel", secs);
                self.countdown = Some(Countdown {
                    started_ms: now_ms,
                    announced: secs,
                });
                events.push(ConfigButtonEvent::ResetCountdown(secs));
            } else if let Some(mut countdown) = self.countdown {
                let elapsed = now_ms.saturating_sub(countdown.started_ms);
                if elapsed >= self.countdown_ms {
                    self.countdown = None;
                    events.push(ConfigButtonEvent::FactoryReset);
                } else {
                    let secs = self.countdown_secs_left(elapsed);
                    if secs != countdown.announced {
                        countdown.announced = secs;
                        events.push(ConfigButtonEvent::ResetCountdown(secs));
                    }
                    self.countdown = Some(countdown);
                }
            }
        } else if self.countdown.take().is_some() {
            info!("Factory reset cancelled");
            events.push(ConfigButtonEvent::ResetCancelled);
        }

        for button in 0..CONFIG_BUTTON_COUNT {
            let down = pressed[button];
            let was_down = self.was_pressed[button];

            if down && !was_down {
                self.press_times[button] = Some(now_ms);
                self.long_press_fired[button] = false;
            } else if down {
                let held = self.press_times[button].map(|t| now_ms.saturating_sub(t));
                if !self.combo_seen
                    && !self.long_press_fired[button]
                    && held.is_some_and(|h| h >= self.long_press_ms)
                {
                    self.long_press_fired[button] = true;
                    debug!("Config button {} long press", button);
                    events.push(ConfigButtonEvent::Long(button));
                }
            } else if was_down {
                self.press_times[button] = None;
                if !self.combo_seen && !self.long_press_fired[button] {
                    debug!("Config button {} short press", button);
                    events.push(ConfigButtonEvent::Short(button));
                }
            }
        }

        self.was_pressed = pressed;
        if pressed.iter().all(|&p| !p) {
            self.combo_seen = false;
        }
        events
    }

    fn countdown_secs_left(&self, elapsed_ms: u64) -> u8 {
        let remaining = self.countdown_ms.saturating_sub(elapsed_ms);
        remaining.div_ceil(1000).min(u8::MAX as u64) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buttons() -> ConfigButtons {
        ConfigButtons::new(1_000, 3)
    }

    #[test]
    fn test_short_press_on_release() {
        let mut b = buttons();
        assert!(b.update(0, [true, false]).is_empty());
        assert!(b.update(200, [true, false]).is_empty());
        assert_eq!(b.update(300, [false, false]), vec![ConfigButtonEvent::Short(0)]);
    }

    #[test]
    fn test_long_press_fires_once_while_held() {
        let mut b = buttons();
        b.update(0, [false, true]);
        assert!(b.update(900, [false, true]).is_empty());
        assert_eq!(b.update(1_000, [false, true]), vec![ConfigButtonEvent::Long(1)]);
        assert!(b.update(1_500, [false, true]).is_empty());
        assert!(b.update(1_600, [false, false]).is_empty());
    }

    #[test]
    fn test_both_buttons_count_down_to_reset() {
        let mut b = buttons();
        assert_eq!(
            b.update(0, [true, true]),
            vec![ConfigButtonEvent::ResetCountdown(3)]
        );
        assert!(b.update(500, [true, true]).is_empty());
        assert_eq!(
            b.update(1_000, [true, true]),
            vec![ConfigButtonEvent::ResetCountdown(2)]
        );
        assert_eq!(
            b.update(2_000, [true, true]),
            vec![ConfigButtonEvent::ResetCountdown(1)]
        );
        assert_eq!(b.update(3_000, [true, true]), vec![ConfigButtonEvent::FactoryReset]);
        assert!(b.update(4_000, [true, true]).is_empty());
        // Releasing after the reset fires nothing
        assert!(b.update(4_100, [false, false]).is_empty());
    }

    #[test]
    fn test_release_cancels_countdown() {
        let mut b = buttons();
        b.update(0, [true, true]);
        assert_eq!(
            b.update(1_500, [true, false]),
            vec![ConfigButtonEvent::ResetCancelled]
        );
        // No long press for the button still held after the combo
        assert!(b.update(2_500, [true, false]).is_empty());
        assert!(b.update(2_600, [false, false]).is_empty());

        // Normal behavior once everything is up
        b.update(3_000, [true, false]);
        assert_eq!(b.update(3_100, [false, false]), vec![ConfigButtonEvent::Short(0)]);
    }
}

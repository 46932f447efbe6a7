//! Tap-toggle layer switching
//!
//! Pressing a `TT_n` key switches to layer n while it is held:
//! - hold past the window and release: back to the original layer
//! - tap once: layer n stays for one window, then the original returns
//! - tap, then press again within the window: layer n locks until the
//!   key is tapped once more

/// Matrix position
pub type Position = (usize, usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapOutcome {
    Stay,
    /// Switch back to this layer
    Restore(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Held after the first press
    Held,
    /// Released quickly; waiting for a second press
    Pending,
    /// Held after the second press
    Locking,
    Locked,
    /// Pressed while locked; restores on release
    Unlocking,
}

#[derive(Debug, Clone, Copy)]
struct Active {
    position: Position,
    original: usize,
    target: usize,
    since_ms: u64,
    phase: Phase,
}

#[derive(Debug)]
pub struct TapToggle {
    window_ms: u64,
    active: Option<Active>,
}

impl TapToggle {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            active: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// True if `position` is the key that started the toggle
    pub fn owns(&self, position: Position) -> bool {
        self.active.is_some_and(|a| a.position == position)
    }

    pub fn target(&self) -> Option<usize> {
        self.active.map(|a| a.target)
    }

    pub fn original(&self) -> Option<usize> {
        self.active.map(|a| a.original)
    }

    /// The `TT_n` key at `position` went down while no toggle was active
    pub fn activate(&mut self, position: Position, original: usize, target: usize, now_ms: u64) {
        self.active = Some(Active {
            position,
            original,
            target,
            since_ms: now_ms,
            phase: Phase::Held,
        });
    }

    /// The owning key went down again
    pub fn on_press(&mut self, now_ms: u64) -> TapOutcome {
        let Some(mut active) = self.active else {
            return TapOutcome::Stay;
        };
        match active.phase {
            Phase::Pending if now_ms.saturating_sub(active.since_ms) < self.window_ms => {
                active.phase = Phase::Locking;
            }
            Phase::Pending => return self.finish(),
            Phase::Locked => active.phase = Phase::Unlocking,
            Phase::Held | Phase::Locking | Phase::Unlocking => {}
        }
        self.active = Some(active);
        TapOutcome::Stay
    }

    /// The owning key went up
    pub fn on_release(&mut self, now_ms: u64) -> TapOutcome {
        let Some(mut active) = self.active else {
            return TapOutcome::Stay;
        };
        match active.phase {
            Phase::Held if now_ms.saturating_sub(active.since_ms) < self.window_ms => {
                active.phase = Phase::Pending;
                active.since_ms = now_ms;
            }
            Phase::Held | Phase::Unlocking => return self.finish(),
            Phase::Locking => active.phase = Phase::Locked,
            Phase::Pending | Phase::Locked => {}
        }
        self.active = Some(active);
        TapOutcome::Stay
    }

    /// Expire a pending single tap
    pub fn tick(&mut self, now_ms: u64) -> TapOutcome {
        match self.active {
            Some(active)
                if active.phase == Phase::Pending
                    && now_ms.saturating_sub(active.since_ms) >= self.window_ms =>
            {
                self.finish()
            }
            _ => TapOutcome::Stay,
        }
    }

    /// Forget any toggle without restoring
    pub fn reset(&mut self) {
        self.active = None;
    }

    fn finish(&mut self) -> TapOutcome {
        match self.active.take() {
            Some(active) => TapOutcome::Restore(active.original),
            None => TapOutcome::Stay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POS: Position = (2, 3);

    fn toggled() -> TapToggle {
        let mut tt = TapToggle::new(300);
        tt.activate(POS, 0, 2, 1_000);
        tt
    }

    #[test]
    fn test_hold_restores_on_release() {
        let mut tt = toggled();
        assert_eq!(tt.tick(1_500), TapOutcome::Stay);
        assert_eq!(tt.on_release(1_500), TapOutcome::Restore(0));
        assert!(!tt.is_active());
    }

    #[test]
    fn test_single_tap_restores_after_window() {
        let mut tt = toggled();
        assert_eq!(tt.on_release(1_100), TapOutcome::Stay);
        assert_eq!(tt.target(), Some(2));
        assert_eq!(tt.tick(1_300), TapOutcome::Stay);
        assert_eq!(tt.tick(1_400), TapOutcome::Restore(0));
        assert!(!tt.is_active());
    }

    #[test]
    fn test_double_tap_locks_until_next_tap() {
        let mut tt = toggled();
        tt.on_release(1_100);
        assert_eq!(tt.on_press(1_200), TapOutcome::Stay);
        assert_eq!(tt.on_release(1_250), TapOutcome::Stay);

        // Stays locked well past the window
        assert_eq!(tt.tick(60_000), TapOutcome::Stay);
        assert!(tt.owns(POS));

        assert_eq!(tt.on_press(60_100), TapOutcome::Stay);
        assert_eq!(tt.on_release(60_150), TapOutcome::Restore(0));
    }

    #[test]
    fn test_late_second_press_restores() {
        let mut tt = toggled();
        tt.on_release(1_100);
        assert_eq!(tt.on_press(1_500), TapOutcome::Restore(0));
        assert!(!tt.is_active());
    }

    #[test]
    fn test_owns_and_reset() {
        let mut tt = toggled();
        assert!(tt.owns(POS));
        assert!(!tt.owns((0, 0)));
        assert_eq!(tt.original(), Some(0));
        tt.reset();
        assert!(!tt.is_active());
        assert_eq!(tt.on_release(2_000), TapOutcome::Stay);
    }
}

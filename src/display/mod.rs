//! Status display output

mod status;

pub use status::{battery_text, StatusComposer, StatusScreen, CONFIG_UPDATED_MS};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

use crate::input::HidSink;
use crate::layout::SharedLayout;
use crate::state::RuntimeFlags;
use crate::system::Clock;

/// A small text display
pub trait StatusDisplay: Send + Sync {
    fn show(&self, screen: &StatusScreen);
    fn blank(&self);
    fn set_inverted(&self, inverted: bool);
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Shown {
    Blank,
    Screen(StatusScreen),
}

/// Writes screen changes to the log
pub struct LogDisplay {
    shown: Mutex<Option<Shown>>,
    inverted: AtomicBool,
}

impl Default for LogDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl LogDisplay {
    pub fn new() -> Self {
        Self {
            shown: Mutex::new(None),
            inverted: AtomicBool::new(false),
        }
    }

    /// Returns true if `next` differs from what is on screen
    fn replace(&self, next: Shown) -> bool {
        let mut shown = self.shown.lock().unwrap_or_else(|e| e.into_inner());
        if shown.as_ref() == Some(&next) {
            return false;
        }
        *shown = Some(next);
        true
    }
}

impl StatusDisplay for LogDisplay {
    fn show(&self, screen: &StatusScreen) {
        if self.replace(Shown::Screen(screen.clone())) {
            info!("[display] {} | {}", screen.header, screen.body);
        }
    }

    fn blank(&self) {
        if self.replace(Shown::Blank) {
            info!("[display] (blank)");
        }
    }

    fn set_inverted(&self, inverted: bool) {
        if self.inverted.swap(inverted, Ordering::AcqRel) != inverted {
            debug!("[display] inverted: {}", inverted);
        }
    }
}

/// Keeps the last frame in memory
#[derive(Default)]
pub struct MemoryDisplay {
    screen: Mutex<Option<StatusScreen>>,
    inverted: AtomicBool,
}

impl MemoryDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// None while blank
    pub fn current(&self) -> Option<StatusScreen> {
        self.screen.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted.load(Ordering::Acquire)
    }
}

impl StatusDisplay for MemoryDisplay {
    fn show(&self, screen: &StatusScreen) {
        *self.screen.lock().unwrap_or_else(|e| e.into_inner()) = Some(screen.clone());
    }

    fn blank(&self) {
        *self.screen.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn set_inverted(&self, inverted: bool) {
        self.inverted.store(inverted, Ordering::Release);
    }
}

/// Everything the display task reads from
#[derive(Clone)]
pub struct DisplaySources {
    pub flags: Arc<RuntimeFlags>,
    pub layout: Arc<SharedLayout>,
    pub sink: Arc<dyn HidSink>,
    pub clock: Arc<dyn Clock>,
}

/// Render one frame
pub fn refresh(display: &dyn StatusDisplay, composer: &StatusComposer, sources: &DisplaySources) {
    let flags = &sources.flags;
    if flags.is_screen_disabled() || flags.is_screen_asleep() {
        display.blank();
        return;
    }
    display.set_inverted(flags.is_screen_inverted());
    let layout = sources.layout.snapshot();
    let screen = composer.compose(
        flags,
        &layout,
        sources.sink.is_connected(),
        sources.clock.now_ms(),
    );
    display.show(&screen);
}

/// Refresh the display on a fixed period, forever
pub async fn run_display(
    display: Arc<dyn StatusDisplay>,
    composer: StatusComposer,
    sources: DisplaySources,
    period: Duration,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        refresh(display.as_ref(), &composer, &sources);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::RecordingSink;
    use crate::layout::LayoutTable;
    use crate::system::ManualClock;

    fn sources() -> (DisplaySources, Arc<RuntimeFlags>, Arc<RecordingSink>) {
        let flags = Arc::new(RuntimeFlags::new());
        let sink = Arc::new(RecordingSink::new());
        let sources = DisplaySources {
            flags: flags.clone(),
            layout: Arc::new(SharedLayout::new(LayoutTable::build(&[], &[], 0))),
            sink: sink.clone(),
            clock: Arc::new(ManualClock::new()),
        };
        (sources, flags, sink)
    }

    #[test]
    fn test_refresh_shows_key_info() {
        let (sources, flags, _) = sources();
        let display = MemoryDisplay::new();
        flags.set_key_info("Copy");
        refresh(&display, &StatusComposer::new(5), &sources);
        let screen = display.current().unwrap();
        assert_eq!(screen.body, "Copy");
        assert_eq!(screen.header, "Reading battery...");
    }

    #[test]
    fn test_disabled_and_asleep_blank() {
        let (sources, flags, _) = sources();
        let display = MemoryDisplay::new();
        let composer = StatusComposer::new(5);

        flags.toggle_screen_disabled();
        refresh(&display, &composer, &sources);
        assert!(display.current().is_none());

        flags.toggle_screen_disabled();
        flags.set_screen_asleep(true);
        refresh(&display, &composer, &sources);
        assert!(display.current().is_none());

        flags.set_screen_asleep(false);
        refresh(&display, &composer, &sources);
        assert!(display.current().is_some());
    }

    #[test]
    fn test_inversion_forwarded() {
        let (sources, flags, _) = sources();
        let display = MemoryDisplay::new();
        flags.toggle_screen_inverted();
        refresh(&display, &StatusComposer::new(5), &sources);
        assert!(display.is_inverted());
    }

    #[test]
    fn test_disconnected_transport() {
        let (sources, _, sink) = sources();
        let display = MemoryDisplay::new();
        sink.set_connected(false);
        refresh(&display, &StatusComposer::new(5), &sources);
        assert_eq!(display.current().unwrap().body, "Connecting...");
    }

    #[test]
    fn test_log_display_dedups() {
        let display = LogDisplay::new();
        let screen = StatusScreen {
            header: "50%".into(),
            body: "A".into(),
        };
        assert!(display.replace(Shown::Screen(screen.clone())));
        assert!(!display.replace(Shown::Screen(screen)));
        assert!(display.replace(Shown::Blank));
    }
}

//! Power management: battery, status LED, idle sleep and restarts

mod battery;
mod led;
mod supervisor;

pub use battery::{voltage_to_percent, BatteryGauge, BatteryReading, SimulatedGauge, SysfsGauge};
pub use led::{low_battery_blink, run_led, LogLed, StatusLed, BLINK_CYCLE_MS};
pub use supervisor::{Peripherals, PowerState, Supervisor, SupervisorSettings};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// What ends a deep sleep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeSource {
    /// Any matrix input in the mask going active
    Matrix { mask: u64 },
    /// A timer; used as a quick reboot
    Timer(Duration),
}

/// Platform power primitives. Both sleep and restart end the current run;
/// the next boot starts from persisted state.
pub trait PowerControl: Send + Sync {
    fn deep_sleep(&self, wake: WakeSource);
    fn restart(&self);
    fn is_externally_powered(&self) -> bool;
}

/// Records requests instead of acting on them
pub struct RecordingPower {
    wakes: Mutex<Vec<WakeSource>>,
    restarts: AtomicUsize,
    external: AtomicBool,
}

impl RecordingPower {
    pub fn new(externally_powered: bool) -> Self {
        Self {
            wakes: Mutex::new(Vec::new()),
            restarts: AtomicUsize::new(0),
            external: AtomicBool::new(externally_powered),
        }
    }

    pub fn wakes(&self) -> Vec<WakeSource> {
        self.wakes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }
}

impl PowerControl for RecordingPower {
    fn deep_sleep(&self, wake: WakeSource) {
        self.wakes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(wake);
    }

    fn restart(&self) {
        self.restarts.fetch_add(1, Ordering::SeqCst);
    }

    fn is_externally_powered(&self) -> bool {
        self.external.load(Ordering::SeqCst)
    }
}

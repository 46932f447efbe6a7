//! Idle, sleep and battery supervision

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::battery::{voltage_to_percent, BatteryGauge};
use super::led::StatusLed;
use super::{PowerControl, WakeSource};
use crate::config::Config;
use crate::display::StatusDisplay;
use crate::input::HidSink;
use crate::layout::SharedLayout;
use crate::state::{PowerRequest, RuntimeFlags};
use crate::store::{ConfigStore, RetainedStore};
use crate::system::Clock;

/// Delay before the timer wake that implements a quick reboot
const REBOOT_WAKE: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Awake,
    /// Display blanked; everything else running
    ScreenSleep,
    /// Deep sleep, restart or factory reset has been handed to the power control
    Halted,
}

#[derive(Debug, Clone, Copy)]
pub struct SupervisorSettings {
    pub sleep_timeout_ms: u64,
    pub screen_sleep_timeout_ms: Option<u64>,
    pub battery_interval_ms: u64,
    pub min_voltage: f32,
    pub full_voltage: f32,
    pub low_threshold_percent: u8,
    pub wake_mask: u64,
}

impl From<&Config> for SupervisorSettings {
    fn from(config: &Config) -> Self {
        Self {
            sleep_timeout_ms: config.power.sleep_timeout().as_millis() as u64,
            screen_sleep_timeout_ms: config
                .power
                .screen_sleep_timeout()
                .map(|d| d.as_millis() as u64),
            battery_interval_ms: config.battery.sample_interval_secs * 1000,
            min_voltage: config.battery.min_voltage,
            full_voltage: config.battery.full_voltage,
            low_threshold_percent: config.battery.low_threshold_percent,
            wake_mask: config.power.wake_mask,
        }
    }
}

/// Peripherals quiesced before sleeping
#[derive(Clone)]
pub struct Peripherals {
    pub sink: Arc<dyn HidSink>,
    pub display: Arc<dyn StatusDisplay>,
    pub led: Arc<dyn StatusLed>,
}

pub struct Supervisor {
    flags: Arc<RuntimeFlags>,
    layout: Arc<SharedLayout>,
    store: ConfigStore,
    retained: Arc<RetainedStore>,
    peripherals: Peripherals,
    power: Arc<dyn PowerControl>,
    gauge: Box<dyn BatteryGauge>,
    settings: SupervisorSettings,
    last_battery_sample: Option<u64>,
    state: PowerState,
}

impl Supervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        flags: Arc<RuntimeFlags>,
        layout: Arc<SharedLayout>,
        store: ConfigStore,
        retained: Arc<RetainedStore>,
        peripherals: Peripherals,
        power: Arc<dyn PowerControl>,
        gauge: Box<dyn BatteryGauge>,
        settings: SupervisorSettings,
    ) -> Self {
        Self {
            flags,
            layout,
            store,
            retained,
            peripherals,
            power,
            gauge,
            settings,
            last_battery_sample: None,
            state: PowerState::Awake,
        }
    }

    pub fn state(&self) -> PowerState {
        self.state
    }

    /// Evaluate requests, battery and idle once
    pub fn tick(&mut self, now_ms: u64) -> PowerState {
        if self.state == PowerState::Halted {
            return self.state;
        }

        if let Some(request) = self.flags.take_power_request() {
            match request {
                PowerRequest::Sleep => self.sleep(WakeSource::Matrix {
                    mask: self.settings.wake_mask,
                }),
                PowerRequest::ToggleBootMode => self.toggle_boot_mode(),
                PowerRequest::FactoryReset => self.factory_reset(),
            }
            return self.state;
        }

        let due = self
            .last_battery_sample
            .map_or(true, |at| now_ms.saturating_sub(at) >= self.settings.battery_interval_ms);
        if due {
            self.sample_battery();
            self.last_battery_sample = Some(now_ms);
        }

        self.check_idle(now_ms);
        self.state
    }

    /// Tick on a fixed period until halted
    pub async fn run(mut self, clock: Arc<dyn Clock>, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if self.tick(clock.now_ms()) == PowerState::Halted {
                break;
            }
        }
    }

    fn sample_battery(&mut self) {
        let reading = self.gauge.read();
        let external = reading.externally_powered || self.power.is_externally_powered();
        self.flags.set_charging(reading.charging);
        self.flags.set_externally_powered(external);

        let Some(voltage) = reading.voltage else {
            self.flags.set_low_battery(false);
            return;
        };
        let percent = voltage_to_percent(
            voltage,
            self.settings.min_voltage,
            self.settings.full_voltage,
        );
        let low = percent < self.settings.low_threshold_percent;
        if low && !self.flags.is_low_battery() {
            warn!("Battery low: {}% ({:.2}V)", percent, voltage);
        }
        self.flags.set_battery_percentage(percent);
        self.flags.set_low_battery(low);
        self.peripherals.sink.set_battery_level(percent);
    }

    fn check_idle(&mut self, now_ms: u64) {
        let idle = self.flags.idle_ms(now_ms);
        let caffeinated = self.flags.is_caffeinated();

        if !caffeinated
            && !self.flags.is_externally_powered()
            && idle >= self.settings.sleep_timeout_ms
        {
            info!("Idle for {}s, going to sleep", idle / 1000);
            self.sleep(WakeSource::Matrix {
                mask: self.settings.wake_mask,
            });
            return;
        }

        let screen_idle = !caffeinated
            && self
                .settings
                .screen_sleep_timeout_ms
                .is_some_and(|timeout| idle >= timeout);
        match (self.state, screen_idle) {
            (PowerState::Awake, true) => {
                info!("Screen sleep");
                self.flags.set_screen_asleep(true);
                self.state = PowerState::ScreenSleep;
            }
            (PowerState::ScreenSleep, false) => {
                info!("Screen wake");
                self.flags.set_screen_asleep(false);
                self.state = PowerState::Awake;
            }
            _ => {}
        }
    }

    /// A tap-toggled layer is temporary; the retained index already holds the layer under it
    fn persist_layout(&self) {
        if self.flags.tap_toggled_layer().is_some() {
            return;
        }
        let index = self.layout.snapshot().index;
        if let Err(e) = self.retained.set_layout_index(index) {
            error!("Failed to persist layout index before sleep: {}", e);
        }
    }

    fn quiesce(&self) {
        self.peripherals.sink.release_all();
        self.peripherals.display.blank();
        self.peripherals.led.set(false);
        self.flags.set_screen_asleep(true);
    }

    fn sleep(&mut self, wake: WakeSource) {
        self.persist_layout();
        self.quiesce();
        self.state = PowerState::Halted;
        info!("Entering deep sleep ({:?})", wake);
        self.power.deep_sleep(wake);
    }

    fn toggle_boot_mode(&mut self) {
        match self.retained.toggle_boot_mode() {
            Ok(mode) => {
                info!("Next boot: {:?} mode", mode);
                self.sleep(WakeSource::Timer(REBOOT_WAKE));
            }
            Err(e) => error!("Failed to toggle boot mode: {}", e),
        }
    }

    fn factory_reset(&mut self) {
        warn!("Factory reset");
        if let Err(e) = self.store.reset_to_defaults() {
            error!("Failed to reset configuration: {}", e);
        }
        if let Err(e) = self.retained.clear() {
            error!("Failed to clear retained state: {}", e);
        }
        self.quiesce();
        self.state = PowerState::Halted;
        self.power.restart();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::MemoryDisplay;
    use crate::input::{HidCall, RecordingSink};
    use crate::layout::LayoutTable;
    use crate::power::{BatteryReading, LogLed, RecordingPower, SimulatedGauge};
    use crate::store::{BootMode, DocumentLimits, LayerConfig, MemoryStorage, ParsedConfig};

    struct Rig {
        supervisor: Supervisor,
        flags: Arc<RuntimeFlags>,
        sink: Arc<RecordingSink>,
        power: Arc<RecordingPower>,
        gauge: SimulatedGauge,
        retained: Arc<RetainedStore>,
        store: ConfigStore,
        layout: Arc<SharedLayout>,
    }

    fn settings() -> SupervisorSettings {
        SupervisorSettings {
            sleep_timeout_ms: 600_000,
            screen_sleep_timeout_ms: Some(180_000),
            battery_interval_ms: 5_000,
            min_voltage: 3.4,
            full_voltage: 4.0,
            low_threshold_percent: 20,
            wake_mask: 0b11111,
        }
    }

    fn rig() -> Rig {
        let storage = Arc::new(MemoryStorage::new());
        let config = Config::default();
        let store = ConfigStore::new(storage.clone(), DocumentLimits::from_config(&config));
        let retained = Arc::new(RetainedStore::new(storage));
        let flags = Arc::new(RuntimeFlags::new());
        let sink = Arc::new(RecordingSink::new());
        let power = Arc::new(RecordingPower::new(false));
        let gauge = SimulatedGauge::new(BatteryReading {
            voltage: Some(3.85),
            ..Default::default()
        });
        let layers = vec![
            LayerConfig::empty("One", config.matrix.rows, config.matrix.cols),
            LayerConfig::empty("Two", config.matrix.rows, config.matrix.cols),
        ];
        let layout = Arc::new(SharedLayout::new(LayoutTable::build(&layers, &[], 1)));

        let supervisor = Supervisor::new(
            flags.clone(),
            layout.clone(),
            store.clone(),
            retained.clone(),
            Peripherals {
                sink: sink.clone(),
                display: Arc::new(MemoryDisplay::new()),
                led: Arc::new(LogLed::new()),
            },
            power.clone(),
            Box::new(gauge.clone()),
            settings(),
        );
        Rig {
            supervisor,
            flags,
            sink,
            power,
            gauge,
            retained,
            store,
            layout,
        }
    }

    #[test]
    fn test_sleeps_at_timeout_not_before() {
        let mut rig = rig();
        rig.flags.touch(1_000);
        assert_ne!(rig.supervisor.tick(600_999), PowerState::Halted);
        assert!(rig.power.wakes().is_empty());

        assert_eq!(rig.supervisor.tick(601_000), PowerState::Halted);
        assert_eq!(
            rig.power.wakes(),
            vec![WakeSource::Matrix { mask: 0b11111 }]
        );
        assert_eq!(rig.retained.load().layout_index, 1);
        assert!(rig.sink.calls().contains(&HidCall::ReleaseAll));

        // Terminal
        rig.supervisor.tick(2_000_000);
        assert_eq!(rig.power.wakes().len(), 1);
    }

    #[test]
    fn test_sleep_while_tap_toggled_keeps_base_layer() {
        let mut rig = rig();
        // Layer 1 is published only as a tap-toggle over layer 0
        rig.flags.set_tap_toggled(Some(1));
        rig.flags.request_power(PowerRequest::Sleep);
        assert_eq!(rig.supervisor.tick(10), PowerState::Halted);
        assert_eq!(rig.layout.snapshot().index, 1);
        assert_eq!(rig.retained.load().layout_index, 0);
    }

    #[test]
    fn test_caffeinated_and_external_power_stay_awake() {
        let mut rig = rig();
        rig.flags.toggle_caffeinated();
        assert_eq!(rig.supervisor.tick(10_000_000), PowerState::Awake);

        rig.flags.toggle_caffeinated();
        rig.gauge.set(BatteryReading {
            voltage: Some(3.9),
            charging: false,
            externally_powered: true,
        });
        assert_ne!(rig.supervisor.tick(20_000_000), PowerState::Halted);
        assert!(rig.power.wakes().is_empty());
    }

    #[test]
    fn test_screen_sleep_and_wake() {
        let mut rig = rig();
        rig.flags.touch(0);
        assert_eq!(rig.supervisor.tick(179_999), PowerState::Awake);
        assert_eq!(rig.supervisor.tick(180_000), PowerState::ScreenSleep);
        assert!(rig.flags.is_screen_asleep());

        rig.flags.touch(200_000);
        assert_eq!(rig.supervisor.tick(200_100), PowerState::Awake);
        assert!(!rig.flags.is_screen_asleep());
    }

    #[test]
    fn test_battery_sampling() {
        let mut rig = rig();
        rig.supervisor.tick(0);
        assert_eq!(rig.flags.battery_percentage(), 75);
        assert!(!rig.flags.is_low_battery());
        assert_eq!(rig.sink.take(), vec![HidCall::BatteryLevel(75)]);

        rig.gauge.set(BatteryReading {
            voltage: Some(3.45),
            ..Default::default()
        });
        rig.supervisor.tick(4_999);
        assert_eq!(rig.flags.battery_percentage(), 75);

        rig.supervisor.tick(5_000);
        assert_eq!(rig.flags.battery_percentage(), 8);
        assert!(rig.flags.is_low_battery());
    }

    #[test]
    fn test_boot_mode_toggle_reboots_on_timer() {
        let mut rig = rig();
        rig.flags.request_power(PowerRequest::ToggleBootMode);
        assert_eq!(rig.supervisor.tick(10), PowerState::Halted);
        assert_eq!(rig.retained.load().boot_mode, BootMode::Config);
        assert_eq!(rig.power.wakes(), vec![WakeSource::Timer(REBOOT_WAKE)]);
    }

    #[test]
    fn test_factory_reset() {
        let mut rig = rig();
        rig.store
            .save_document(&ParsedConfig::Layers(vec![LayerConfig::empty("Custom", 5, 7)]))
            .unwrap();
        rig.retained.set_layout_index(1).unwrap();

        rig.flags.request_power(PowerRequest::FactoryReset);
        assert_eq!(rig.supervisor.tick(10), PowerState::Halted);
        assert_eq!(rig.power.restarts(), 1);
        assert_eq!(rig.store.load_layers().unwrap()[0].title, "Default");
        assert_eq!(rig.retained.load().layout_index, 0);
    }
}

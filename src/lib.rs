pub mod config;
pub mod device;
pub mod display;
pub mod error;
pub mod input;
pub mod keycode;
pub mod layout;
pub mod power;
pub mod state;
pub mod store;
pub mod system;
pub mod web;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use config::Config;
use device::{RotaryEncoder, SimulatedKeypad};
use display::{run_display, DisplaySources, LogDisplay, StatusComposer, StatusDisplay};
use input::{HidSink, LogSink, Scanner, TransportRouter};
use layout::{LayoutManager, LayoutTable, SharedLayout};
use power::{
    run_led, BatteryGauge, BatteryReading, LogLed, Peripherals, PowerControl, SimulatedGauge,
    StatusLed, Supervisor, SupervisorSettings, SysfsGauge,
};
use state::RuntimeFlags;
use store::{BootMode, ConfigStore, DocumentLimits, FileStorage, RetainedStore};
use system::{Clock, HostPower, SystemClock};

/// Display and LED refresh period
const UI_TICK: Duration = Duration::from_millis(50);

/// Command-line overrides
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Storage directory instead of the configured one
    pub storage_dir: Option<PathBuf>,
    /// Start in Config Mode regardless of the retained boot mode
    pub force_config_mode: bool,
    /// Drive the simulated keypad from stdin
    pub console: bool,
}

/// Open the configured storage and write default documents where missing
pub fn open_store(config: &Config, storage_dir: Option<&Path>) -> Result<(ConfigStore, Arc<RetainedStore>)> {
    let dir = match storage_dir {
        Some(dir) => dir.to_path_buf(),
        None => config.storage.resolve_dir()?,
    };
    let storage = Arc::new(FileStorage::open(&dir).context("storage unavailable")?);
    let store = ConfigStore::new(storage.clone(), DocumentLimits::from_config(config));
    if store.ensure_defaults()? {
        info!("Wrote default configuration to {}", dir.display());
    }
    Ok((store, Arc::new(RetainedStore::new(storage))))
}

/// Main application struct
pub struct App {
    config: Config,
    options: Options,
    boot_mode: BootMode,
    store: ConfigStore,
    retained: Arc<RetainedStore>,
    flags: Arc<RuntimeFlags>,
    shared: Arc<SharedLayout>,
    layouts: Option<LayoutManager>,
    keypad: SimulatedKeypad,
    sink: Arc<dyn HidSink>,
    clock: Arc<dyn Clock>,
    display: Arc<dyn StatusDisplay>,
    led: Arc<dyn StatusLed>,
    power: Arc<dyn PowerControl>,
    scan_running: Option<Arc<AtomicBool>>,
    scan_thread: Option<std::thread::JoinHandle<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl App {
    /// Create a new application instance
    pub async fn new(config: Config, options: Options) -> Result<Self> {
        let (store, retained) = open_store(&config, options.storage_dir.as_deref())?;

        let boot_mode = if options.force_config_mode {
            BootMode::Config
        } else {
            retained.load().boot_mode
        };

        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        let flags = Arc::new(RuntimeFlags::new());
        flags.touch(clock.now_ms());

        let shared = Arc::new(SharedLayout::new(LayoutTable::build(&[], &[], 0)));
        let layouts = LayoutManager::open(store.clone(), retained.clone(), shared.clone());

        let sink: Arc<dyn HidSink> = Arc::new(TransportRouter::new(
            Arc::new(LogSink::new("ble")),
            usb_transport(),
            flags.clone(),
        ));

        Ok(Self {
            boot_mode,
            store,
            retained,
            flags,
            shared,
            layouts: Some(layouts),
            keypad: SimulatedKeypad::new(),
            sink,
            clock,
            display: Arc::new(LogDisplay::new()),
            led: Arc::new(LogLed::new()),
            power: Arc::new(HostPower::new(config.power.external_power)),
            scan_running: None,
            scan_thread: None,
            tasks: Vec::new(),
            config,
            options,
        })
    }

    pub fn boot_mode(&self) -> BootMode {
        self.boot_mode
    }

    /// Run until the supervisor halts (sleep, reboot) or the web server fails
    pub async fn run(&mut self) -> Result<()> {
        match self.boot_mode {
            BootMode::Keypad => self.run_keypad().await,
            BootMode::Config => self.run_config_mode().await,
        }
    }

    async fn run_keypad(&mut self) -> Result<()> {
        info!("Starting in keypad mode");
        self.start_input()?;

        self.spawn_ui(StatusComposer::new(self.config.device.status_idle_secs));
        let period = Duration::from_millis(self.config.power.supervisor_tick_ms);
        self.supervisor().run(self.clock.clone(), period).await;
        Ok(())
    }

    async fn run_config_mode(&mut self) -> Result<()> {
        info!("Starting in config mode");
        // No key activity while configuring; keep the device awake
        if !self.flags.is_caffeinated() {
            self.flags.toggle_caffeinated();
        }

        // Keys stay live so uploads apply and FN combos can leave Config Mode
        self.start_input()?;

        let web_config = self.config.web.clone();
        let composer = StatusComposer::new(self.config.device.status_idle_secs).with_network_line(
            format!("http://{}.local:{}", web_config.hostname, web_config.port),
        );
        self.spawn_ui(composer);

        let period = Duration::from_millis(self.config.power.supervisor_tick_ms);
        let supervisor = self.supervisor();
        let clock = self.clock.clone();
        self.tasks
            .push(tokio::spawn(async move { supervisor.run(clock, period).await }));

        let state = Arc::new(web::AppState {
            store: self.store.clone(),
            flags: self.flags.clone(),
            layout: self.shared.clone(),
            retained: self.retained.clone(),
            device_name: self.config.device.name.clone(),
            hostname: web_config.hostname.clone(),
        });
        web::start_server(&web_config, state).await
    }

    fn start_input(&mut self) -> Result<()> {
        self.start_scanner()?;
        if self.options.console {
            device::console::spawn(self.keypad.clone())?;
        }
        Ok(())
    }

    fn start_scanner(&mut self) -> Result<()> {
        let layouts = self
            .layouts
            .take()
            .context("scanner already started")?;
        let mut scanner = Scanner::new(
            Box::new(self.keypad.matrix()),
            self.sink.clone(),
            self.flags.clone(),
            self.clock.clone(),
            layouts,
            &self.config,
        )
        .with_config_buttons(Box::new(self.keypad.config_buttons()))
        .with_encoder(RotaryEncoder::new(Box::new(self.keypad.encoder())));

        self.scan_running = Some(scanner.running());
        let handle = std::thread::Builder::new()
            .name("matrix-scan".to_string())
            .spawn(move || scanner.run())?;
        self.scan_thread = Some(handle);
        Ok(())
    }

    fn spawn_ui(&mut self, composer: StatusComposer) {
        let sources = DisplaySources {
            flags: self.flags.clone(),
            layout: self.shared.clone(),
            sink: self.sink.clone(),
            clock: self.clock.clone(),
        };
        self.tasks.push(tokio::spawn(run_display(
            self.display.clone(),
            composer,
            sources,
            UI_TICK,
        )));
        self.tasks.push(tokio::spawn(run_led(
            self.led.clone(),
            self.flags.clone(),
            self.clock.clone(),
            UI_TICK,
        )));
    }

    fn supervisor(&self) -> Supervisor {
        Supervisor::new(
            self.flags.clone(),
            self.shared.clone(),
            self.store.clone(),
            self.retained.clone(),
            Peripherals {
                sink: self.sink.clone(),
                display: self.display.clone(),
                led: self.led.clone(),
            },
            self.power.clone(),
            battery_gauge(),
            SupervisorSettings::from(&self.config),
        )
    }

    /// Gracefully shutdown the application
    pub async fn shutdown(&mut self) {
        info!("Shutting down macropad...");

        if let Some(running) = self.scan_running.take() {
            running.store(false, Ordering::Release);
        }
        if let Some(handle) = self.scan_thread.take() {
            match tokio::task::spawn_blocking(move || handle.join()).await {
                Ok(Ok(())) => {}
                _ => error!("Scan thread did not stop cleanly"),
            }
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }

        self.sink.release_all();
        if self.flags.tap_toggled_layer().is_none() {
            let index = self.shared.snapshot().index;
            if let Err(e) = self.retained.set_layout_index(index) {
                warn!("Failed to persist layout index: {}", e);
            }
        }
        self.display.blank();
        self.led.set(false);

        info!("Shutdown complete");
    }
}

#[cfg(feature = "host-keys")]
fn usb_transport() -> Arc<dyn HidSink> {
    match input::EnigoSink::new() {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            warn!("Keystroke injection unavailable, logging instead: {}", e);
            Arc::new(LogSink::new("usb"))
        }
    }
}

#[cfg(not(feature = "host-keys"))]
fn usb_transport() -> Arc<dyn HidSink> {
    Arc::new(LogSink::new("usb"))
}

fn battery_gauge() -> Box<dyn BatteryGauge> {
    match SysfsGauge::discover(Path::new(SysfsGauge::ROOT)) {
        Some(gauge) => Box::new(gauge),
        None => {
            info!("No battery found, assuming mains power");
            Box::new(SimulatedGauge::new(BatteryReading {
                voltage: None,
                charging: false,
                externally_powered: true,
            }))
        }
    }
}

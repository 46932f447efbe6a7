use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
    pub matrix: MatrixConfig,
    pub timing: TimingConfig,
    pub power: PowerConfig,
    pub battery: BatteryConfig,
    pub storage: StorageConfig,
    pub web: WebConfig,
}

impl Config {
    /// Load configuration from file or create default
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path, writing defaults if missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")?;
        Ok(PathBuf::from(home).join(".config/macropad/config.toml"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Name advertised by the BLE transport
    pub name: String,
    /// Seconds without input before the display falls back to the layout title
    pub status_idle_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "Macropad".to_string(),
            status_idle_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixConfig {
    pub rows: usize,
    pub cols: usize,
    /// Pause between full scan cycles
    pub scan_interval_ms: u64,
    /// Settle time after driving a row, before reading columns
    pub row_settle_us: u64,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            rows: 5,
            cols: 7,
            scan_interval_ms: 10,
            row_settle_us: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Pause after a global action so a held combo does not repeat
    pub global_action_debounce_ms: u64,
    /// Pause after macro playback
    pub macro_settle_ms: u64,
    /// How long a keystroke chord is held before release
    pub chord_hold_ms: u64,
    /// Gap between the key downs of a chord
    pub chord_key_gap_us: u64,
    pub tap_toggle_window_ms: u64,
    /// Config button hold time for the alternate action
    pub long_press_ms: u64,
    pub factory_reset_countdown_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            global_action_debounce_ms: 300,
            macro_settle_ms: 100,
            chord_hold_ms: 50,
            chord_key_gap_us: 10,
            tap_toggle_window_ms: 300,
            long_press_ms: 1000,
            factory_reset_countdown_secs: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerConfig {
    pub sleep_timeout_secs: u64,
    /// Blank the display after this much idle time (0 disables)
    pub screen_sleep_timeout_secs: u64,
    pub supervisor_tick_ms: u64,
    /// Column inputs allowed to wake the device from deep sleep
    pub wake_mask: u64,
    /// Treat the device as externally powered (never auto-sleeps)
    pub external_power: bool,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            sleep_timeout_secs: 600,
            screen_sleep_timeout_secs: 180,
            supervisor_tick_ms: 100,
            wake_mask: 0x7f,
            external_power: false,
        }
    }
}

impl PowerConfig {
    pub fn sleep_timeout(&self) -> Duration {
        Duration::from_secs(self.sleep_timeout_secs)
    }

    pub fn screen_sleep_timeout(&self) -> Option<Duration> {
        (self.screen_sleep_timeout_secs > 0)
            .then(|| Duration::from_secs(self.screen_sleep_timeout_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryConfig {
    pub sample_interval_secs: u64,
    pub min_voltage: f32,
    pub full_voltage: f32,
    pub low_threshold_percent: u8,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: 5,
            min_voltage: 3.4,
            full_voltage: 4.0,
            low_threshold_percent: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the JSON documents; empty means the default data dir
    pub dir: String,
    pub max_document_bytes: usize,
    pub max_nesting_depth: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: String::new(),
            max_document_bytes: 16 * 1024,
            max_nesting_depth: 5,
        }
    }
}

impl StorageConfig {
    /// Resolve the storage directory
    pub fn resolve_dir(&self) -> Result<PathBuf> {
        if !self.dir.is_empty() {
            return Ok(PathBuf::from(&self.dir));
        }
        let home = std::env::var("HOME")?;
        Ok(PathBuf::from(home).join(".local/share/macropad"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub bind: String,
    pub port: u16,
    /// Name shown on the status display while in config mode
    pub hostname: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
            hostname: "macropad".to_string(),
        }
    }
}

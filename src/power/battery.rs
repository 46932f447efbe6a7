//! Battery sampling

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// One sample from a gauge
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatteryReading {
    /// None when there is no battery to measure
    pub voltage: Option<f32>,
    pub charging: bool,
    pub externally_powered: bool,
}

pub trait BatteryGauge: Send {
    fn read(&mut self) -> BatteryReading;
}

/// Linear map from voltage to a 0-100 percentage
pub fn voltage_to_percent(voltage: f32, min_voltage: f32, full_voltage: f32) -> u8 {
    if full_voltage <= min_voltage {
        return if voltage >= full_voltage { 100 } else { 0 };
    }
    let fraction = (voltage - min_voltage) / (full_voltage - min_voltage);
    (fraction * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Reads a Linux power supply from sysfs
pub struct SysfsGauge {
    battery: PathBuf,
    mains: Option<PathBuf>,
}

impl SysfsGauge {
    pub const ROOT: &'static str = "/sys/class/power_supply";

    /// Find the first battery (and mains adapter, if any) under `root`
    pub fn discover(root: &Path) -> Option<Self> {
        let mut battery = None;
        let mut mains = None;
        let mut entries: Vec<PathBuf> = fs::read_dir(root)
            .ok()?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .collect();
        entries.sort();

        for path in entries {
            match read_trimmed(&path.join("type")).as_deref() {
                Some("Battery") if battery.is_none() => battery = Some(path),
                Some("Mains") if mains.is_none() => mains = Some(path),
                _ => {}
            }
        }
        let battery = battery?;
        debug!("Using battery at {}", battery.display());
        Some(Self { battery, mains })
    }
}

impl BatteryGauge for SysfsGauge {
    fn read(&mut self) -> BatteryReading {
        // voltage_now is in microvolts
        let voltage = read_trimmed(&self.battery.join("voltage_now"))
            .and_then(|v| v.parse::<f32>().ok())
            .map(|uv| uv / 1_000_000.0);
        let status = read_trimmed(&self.battery.join("status")).unwrap_or_default();
        let mains_online = self
            .mains
            .as_ref()
            .and_then(|m| read_trimmed(&m.join("online")))
            .is_some_and(|v| v == "1");

        BatteryReading {
            voltage,
            charging: status == "Charging",
            externally_powered: mains_online || status == "Full",
        }
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

/// A gauge whose reading is set by hand; shared between clones
#[derive(Clone, Default)]
pub struct SimulatedGauge {
    reading: Arc<Mutex<BatteryReading>>,
}

impl SimulatedGauge {
    pub fn new(reading: BatteryReading) -> Self {
        Self {
            reading: Arc::new(Mutex::new(reading)),
        }
    }

    pub fn set(&self, reading: BatteryReading) {
        *self.reading.lock().unwrap_or_else(|e| e.into_inner()) = reading;
    }
}

impl BatteryGauge for SimulatedGauge {
    fn read(&mut self) -> BatteryReading {
        *self.reading.lock().unwrap_or_else(|e| e.into_inner())
    }
}

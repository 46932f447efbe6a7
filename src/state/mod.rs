mod manager;

pub use manager::{OutputMode, PowerRequest, RuntimeFlags, BATTERY_UNKNOWN};

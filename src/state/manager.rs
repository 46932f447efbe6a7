use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use tokio::sync::watch;
use tracing::debug;

/// Battery percentage before the first reading
pub const BATTERY_UNKNOWN: u8 = 101;

const NO_LAYOUT_REQUEST: i64 = i64::MIN;
const NO_TIMESTAMP: u64 = u64::MAX;

/// Active HID transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Ble,
    Usb,
}

impl OutputMode {
    pub fn toggled(self) -> Self {
        match self {
            OutputMode::Ble => OutputMode::Usb,
            OutputMode::Usb => OutputMode::Ble,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            OutputMode::Ble => 0,
            OutputMode::Usb => 1,
        }
    }

    fn from_u8(value: u8) -> Self {
        if value == 1 {
            OutputMode::Usb
        } else {
            OutputMode::Ble
        }
    }
}

/// Power transitions requested by input, carried out by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerRequest {
    Sleep,
    ToggleBootMode,
    FactoryReset,
}

impl PowerRequest {
    fn to_u8(self) -> u8 {
        match self {
            PowerRequest::Sleep => 1,
            PowerRequest::ToggleBootMode => 2,
            PowerRequest::FactoryReset => 3,
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(PowerRequest::Sleep),
            2 => Some(PowerRequest::ToggleBootMode),
            3 => Some(PowerRequest::FactoryReset),
            _ => None,
        }
    }
}

/// Runtime state shared between the scan thread and the async tasks.
///
/// Every field is an atomic or a channel with a single writer:
/// - scan thread: fn, output lock, tap toggle, caffeinated, output mode,
///   screen invert/disable, activity, key info, reset countdown
/// - supervisor: battery, low battery, charging, external power, screen sleep
/// - web server: keymap update and layout requests (consumed by the scan thread)
///
/// Power requests come from both the scan thread and the web server and are
/// consumed by the supervisor; the first pending request wins.
pub struct RuntimeFlags {
    fn_pressed: AtomicBool,
    output_locked: AtomicBool,
    tap_toggled: AtomicBool,
    tap_layer: AtomicUsize,
    caffeinated: AtomicBool,
    output_mode: AtomicU8,
    screen_inverted: AtomicBool,
    screen_disabled: AtomicBool,
    screen_asleep: AtomicBool,
    last_activity_ms: AtomicU64,
    config_updated_at_ms: AtomicU64,
    battery_percentage: AtomicU8,
    low_battery: AtomicBool,
    charging: AtomicBool,
    externally_powered: AtomicBool,
    keymaps_need_update: AtomicBool,
    layout_request: AtomicI64,
    power_request: AtomicU8,
    reset_countdown: AtomicU8,
    key_info: watch::Sender<String>,
}

impl Default for RuntimeFlags {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeFlags {
    pub fn new() -> Self {
        let (key_info, _) = watch::channel(String::new());
        Self {
            fn_pressed: AtomicBool::new(false),
            output_locked: AtomicBool::new(false),
            tap_toggled: AtomicBool::new(false),
            tap_layer: AtomicUsize::new(0),
            caffeinated: AtomicBool::new(false),
            output_mode: AtomicU8::new(OutputMode::default().to_u8()),
            screen_inverted: AtomicBool::new(false),
            screen_disabled: AtomicBool::new(false),
            screen_asleep: AtomicBool::new(false),
            last_activity_ms: AtomicU64::new(0),
            config_updated_at_ms: AtomicU64::new(NO_TIMESTAMP),
            battery_percentage: AtomicU8::new(BATTERY_UNKNOWN),
            low_battery: AtomicBool::new(false),
            charging: AtomicBool::new(false),
            externally_powered: AtomicBool::new(false),
            keymaps_need_update: AtomicBool::new(false),
            layout_request: AtomicI64::new(NO_LAYOUT_REQUEST),
            power_request: AtomicU8::new(0),
            reset_countdown: AtomicU8::new(0),
            key_info,
        }
    }

    // === Modifiers ===

    pub fn is_fn_pressed(&self) -> bool {
        self.fn_pressed.load(Ordering::Acquire)
    }

    pub fn set_fn_pressed(&self, pressed: bool) {
        self.fn_pressed.store(pressed, Ordering::Release);
    }

    pub fn is_output_locked(&self) -> bool {
        self.output_locked.load(Ordering::Acquire)
    }

    /// Flip the output lock, returning the new value
    pub fn toggle_output_locked(&self) -> bool {
        !self.output_locked.fetch_xor(true, Ordering::AcqRel)
    }

    /// Layer a tap-toggle key switched to, if one is active
    pub fn tap_toggled_layer(&self) -> Option<usize> {
        self.tap_toggled
            .load(Ordering::Acquire)
            .then(|| self.tap_layer.load(Ordering::Acquire))
    }

    pub fn set_tap_toggled(&self, layer: Option<usize>) {
        if let Some(layer) = layer {
            self.tap_layer.store(layer, Ordering::Release);
        }
        self.tap_toggled.store(layer.is_some(), Ordering::Release);
    }

    pub fn is_caffeinated(&self) -> bool {
        self.caffeinated.load(Ordering::Acquire)
    }

    pub fn toggle_caffeinated(&self) -> bool {
        !self.caffeinated.fetch_xor(true, Ordering::AcqRel)
    }

    pub fn output_mode(&self) -> OutputMode {
        OutputMode::from_u8(self.output_mode.load(Ordering::Acquire))
    }

    pub fn set_output_mode(&self, mode: OutputMode) {
        self.output_mode.store(mode.to_u8(), Ordering::Release);
    }

    // === Screen ===

    pub fn is_screen_inverted(&self) -> bool {
        self.screen_inverted.load(Ordering::Acquire)
    }

    pub fn toggle_screen_inverted(&self) -> bool {
        !self.screen_inverted.fetch_xor(true, Ordering::AcqRel)
    }

    pub fn is_screen_disabled(&self) -> bool {
        self.screen_disabled.load(Ordering::Acquire)
    }

    pub fn toggle_screen_disabled(&self) -> bool {
        !self.screen_disabled.fetch_xor(true, Ordering::AcqRel)
    }

    pub fn is_screen_asleep(&self) -> bool {
        self.screen_asleep.load(Ordering::Acquire)
    }

    pub fn set_screen_asleep(&self, asleep: bool) {
        self.screen_asleep.store(asleep, Ordering::Release);
    }

    // === Activity ===

    /// Record input activity, resetting the idle timer
    pub fn touch(&self, now_ms: u64) {
        self.last_activity_ms.store(now_ms, Ordering::Release);
    }

    pub fn last_activity_ms(&self) -> u64 {
        self.last_activity_ms.load(Ordering::Acquire)
    }

    pub fn idle_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_activity_ms())
    }

    pub fn mark_config_updated(&self, now_ms: u64) {
        self.config_updated_at_ms.store(now_ms, Ordering::Release);
    }

    /// When the last configuration apply happened
    pub fn config_updated_at(&self) -> Option<u64> {
        let at = self.config_updated_at_ms.load(Ordering::Acquire);
        (at != NO_TIMESTAMP).then_some(at)
    }

    pub fn set_key_info(&self, info: &str) {
        self.key_info.send_replace(info.to_string());
    }

    pub fn key_info(&self) -> String {
        self.key_info.borrow().clone()
    }

    pub fn subscribe_key_info(&self) -> watch::Receiver<String> {
        self.key_info.subscribe()
    }

    // === Battery ===

    pub fn battery_percentage(&self) -> u8 {
        self.battery_percentage.load(Ordering::Acquire)
    }

    pub fn set_battery_percentage(&self, percent: u8) {
        self.battery_percentage.store(percent, Ordering::Release);
    }

    pub fn is_low_battery(&self) -> bool {
        self.low_battery.load(Ordering::Acquire)
    }

    pub fn set_low_battery(&self, low: bool) {
        self.low_battery.store(low, Ordering::Release);
    }

    pub fn is_charging(&self) -> bool {
        self.charging.load(Ordering::Acquire)
    }

    pub fn set_charging(&self, charging: bool) {
        self.charging.store(charging, Ordering::Release);
    }

    pub fn is_externally_powered(&self) -> bool {
        self.externally_powered.load(Ordering::Acquire)
    }

    pub fn set_externally_powered(&self, powered: bool) {
        self.externally_powered.store(powered, Ordering::Release);
    }

    // === Requests ===

    /// Ask the scan loop to reload the documents on its next tick
    pub fn request_keymap_update(&self) {
        self.keymaps_need_update.store(true, Ordering::Release);
    }

    pub fn keymaps_need_update(&self) -> bool {
        self.keymaps_need_update.load(Ordering::Acquire)
    }

    /// Consume a pending keymap update
    pub fn take_keymap_update(&self) -> bool {
        self.keymaps_need_update.swap(false, Ordering::AcqRel)
    }

    pub fn request_layout(&self, index: i64) {
        self.layout_request.store(index, Ordering::Release);
    }

    pub fn take_layout_request(&self) -> Option<i64> {
        let index = self.layout_request.swap(NO_LAYOUT_REQUEST, Ordering::AcqRel);
        (index != NO_LAYOUT_REQUEST).then_some(index)
    }

    /// Queue a power request. Returns false, leaving the pending one in place,
    /// if the supervisor has not consumed the previous request yet.
    pub fn request_power(&self, request: PowerRequest) -> bool {
        let queued = self
            .power_request
            .compare_exchange(0, request.to_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if !queued {
            debug!("Dropping {:?}, a power request is already pending", request);
        }
        queued
    }

    pub fn take_power_request(&self) -> Option<PowerRequest> {
        PowerRequest::from_u8(self.power_request.swap(0, Ordering::AcqRel))
    }

    /// Seconds left on the factory reset countdown, if one is running
    pub fn reset_countdown(&self) -> Option<u8> {
        let secs = self.reset_countdown.load(Ordering::Acquire);
        (secs > 0).then_some(secs)
    }

    pub fn set_reset_countdown(&self, secs: Option<u8>) {
        self.reset_countdown
            .store(secs.unwrap_or(0), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggles_return_new_value() {
        let flags = RuntimeFlags::new();
        assert!(flags.toggle_caffeinated());
        assert!(flags.is_caffeinated());
        assert!(!flags.toggle_caffeinated());
        assert!(flags.toggle_output_locked());
        assert!(flags.is_output_locked());
    }

    #[test]
    fn test_keymap_update_consumed_once() {
        let flags = RuntimeFlags::new();
        assert!(!flags.take_keymap_update());
        flags.request_keymap_update();
        assert!(flags.keymaps_need_update());
        assert!(flags.take_keymap_update());
        assert!(!flags.take_keymap_update());
    }

    #[test]
    fn test_layout_request_accepts_negative() {
        let flags = RuntimeFlags::new();
        flags.request_layout(-3);
        assert_eq!(flags.take_layout_request(), Some(-3));
        assert_eq!(flags.take_layout_request(), None);
    }

    #[test]
    fn test_power_request_roundtrip() {
        let flags = RuntimeFlags::new();
        assert_eq!(flags.take_power_request(), None);
        flags.request_power(PowerRequest::ToggleBootMode);
        assert_eq!(
            flags.take_power_request(),
            Some(PowerRequest::ToggleBootMode)
        );
        assert_eq!(flags.take_power_request(), None);
    }

    #[test]
    fn test_pending_power_request_is_not_replaced() {
        let flags = RuntimeFlags::new();
        assert!(flags.request_power(PowerRequest::Sleep));
        assert!(!flags.request_power(PowerRequest::ToggleBootMode));
        assert_eq!(flags.take_power_request(), Some(PowerRequest::Sleep));

        assert!(flags.request_power(PowerRequest::ToggleBootMode));
        assert_eq!(
            flags.take_power_request(),
            Some(PowerRequest::ToggleBootMode)
        );
    }

    #[test]
    fn test_tap_toggle_layer() {
        let flags = RuntimeFlags::new();
        assert_eq!(flags.tap_toggled_layer(), None);
        flags.set_tap_toggled(Some(2));
        assert_eq!(flags.tap_toggled_layer(), Some(2));
        flags.set_tap_toggled(None);
        assert_eq!(flags.tap_toggled_layer(), None);
    }

    #[test]
    fn test_idle_and_battery_defaults() {
        let flags = RuntimeFlags::new();
        flags.touch(1_000);
        assert_eq!(flags.idle_ms(4_000), 3_000);
        assert_eq!(flags.idle_ms(500), 0);
        assert_eq!(flags.battery_percentage(), BATTERY_UNKNOWN);
        assert_eq!(flags.config_updated_at(), None);
    }

    #[test]
    fn test_key_info_notifies_subscribers() {
        let flags = RuntimeFlags::new();
        let mut rx = flags.subscribe_key_info();
        flags.set_key_info("A");
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), "A");
        assert_eq!(flags.key_info(), "A");
    }

    #[test]
    fn test_output_mode_toggle() {
        let flags = RuntimeFlags::new();
        assert_eq!(flags.output_mode(), OutputMode::Ble);
        flags.set_output_mode(flags.output_mode().toggled());
        assert_eq!(flags.output_mode(), OutputMode::Usb);
    }
}

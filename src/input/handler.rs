//! Matrix scanner and key state machine

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::device::{
    global_action_at, ConfigButtonIo, EncoderEvent, GlobalAction, Level, MatrixIo, RotaryEncoder,
    CONFIG_BUTTON_LONG, CONFIG_BUTTON_SHORT,
};
use crate::layout::{KeyAction, LayoutManager, LayoutTable};
use crate::state::{OutputMode, PowerRequest, RuntimeFlags};
use crate::system::Clock;

use super::config_buttons::{ConfigButtonEvent, ConfigButtons};
use super::keystrokes::HidSink;
use super::macros::{MacroPlayer, MacroTiming};
use super::tap_toggle::{TapOutcome, TapToggle};

#[derive(Debug, Clone, Copy)]
pub struct ScanTiming {
    pub rows: usize,
    pub cols: usize,
    pub scan_interval_ms: u64,
    pub row_settle_us: u64,
    pub global_action_debounce_ms: u64,
    pub tap_toggle_window_ms: u64,
    pub long_press_ms: u64,
    pub factory_reset_countdown_secs: u64,
}

impl From<&Config> for ScanTiming {
    fn from(config: &Config) -> Self {
        Self {
            rows: config.matrix.rows,
            cols: config.matrix.cols,
            scan_interval_ms: config.matrix.scan_interval_ms,
            row_settle_us: config.matrix.row_settle_us,
            global_action_debounce_ms: config.timing.global_action_debounce_ms,
            tap_toggle_window_ms: config.timing.tap_toggle_window_ms,
            long_press_ms: config.timing.long_press_ms,
            factory_reset_countdown_secs: config.timing.factory_reset_countdown_secs,
        }
    }
}

/// What a held position did when it went down, so its release can undo it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Engaged {
    Idle,
    Key(u8),
    Fn,
    /// Handled on press; nothing to undo
    Consumed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    /// The layer changed or a global action ran; start a fresh cycle
    EndCycle,
}

/// Scans the matrix and turns edges into HID output.
///
/// Owns a working copy of the published layout table so `pressed` state
/// never leaks to other readers.
pub struct Scanner {
    matrix: Box<dyn MatrixIo>,
    sink: Arc<dyn HidSink>,
    flags: Arc<RuntimeFlags>,
    clock: Arc<dyn Clock>,
    layouts: LayoutManager,
    table: LayoutTable,
    engaged: Vec<Vec<Engaged>>,
    tap: TapToggle,
    player: MacroPlayer,
    timing: ScanTiming,
    config_buttons: Option<(Box<dyn ConfigButtonIo>, ConfigButtons)>,
    encoder: Option<RotaryEncoder>,
    running: Arc<AtomicBool>,
}

impl Scanner {
    pub fn new(
        matrix: Box<dyn MatrixIo>,
        sink: Arc<dyn HidSink>,
        flags: Arc<RuntimeFlags>,
        clock: Arc<dyn Clock>,
        layouts: LayoutManager,
        config: &Config,
    ) -> Self {
        let timing = ScanTiming::from(config);
        let table = (*layouts.shared().snapshot()).clone();
        Self {
            matrix,
            sink,
            flags,
            clock,
            layouts,
            table,
            engaged: vec![vec![Engaged::Idle; timing.cols]; timing.rows],
            tap: TapToggle::new(timing.tap_toggle_window_ms),
            player: MacroPlayer::new(MacroTiming::from(&config.timing)),
            timing,
            config_buttons: None,
            encoder: None,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn with_config_buttons(mut self, io: Box<dyn ConfigButtonIo>) -> Self {
        let buttons = ConfigButtons::new(
            self.timing.long_press_ms,
            self.timing.factory_reset_countdown_secs,
        );
        self.config_buttons = Some((io, buttons));
        self
    }

    pub fn with_encoder(mut self, encoder: RotaryEncoder) -> Self {
        self.encoder = Some(encoder);
        self
    }

    /// Clearing the returned flag stops [`Scanner::run`] after the current cycle
    pub fn running(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// The working table, including pressed state
    pub fn table(&self) -> &LayoutTable {
        &self.table
    }

    /// Scan until stopped
    pub fn run(&mut self) {
        info!(
            "Scanning {}x{} matrix every {}ms",
            self.timing.rows, self.timing.cols, self.timing.scan_interval_ms
        );
        while self.running.load(Ordering::Acquire) {
            self.scan_cycle();
            self.clock.delay_ms(self.timing.scan_interval_ms);
        }
        self.sink.release_all();
        info!("Matrix scan stopped");
    }

    /// One pass over every position, plus pending requests and side inputs
    pub fn scan_cycle(&mut self) {
        let now = self.clock.now_ms();
        self.apply_requests(now);

        if let TapOutcome::Restore(layer) = self.tap.tick(now) {
            self.restore_layer(layer);
        }

        self.poll_config_buttons(now);
        self.poll_encoder();

        for row in 0..self.timing.rows {
            self.matrix.drive_row(row, Level::Active);
            self.clock.delay_us(self.timing.row_settle_us);

            let mut flow = Flow::Continue;
            for col in 0..self.timing.cols {
                flow = if self.matrix.read_column(col).is_active() {
                    self.on_active(row, col)
                } else {
                    self.on_inactive(row, col)
                };
                self.clock.delay_us(self.timing.row_settle_us);
                if flow == Flow::EndCycle {
                    break;
                }
            }

            self.matrix.drive_row(row, Level::Inactive);
            self.clock.delay_us(self.timing.row_settle_us);
            if flow == Flow::EndCycle {
                break;
            }
        }
    }

    fn output_enabled(&self) -> bool {
        !self.flags.is_output_locked() && self.sink.is_connected()
    }

    fn apply_requests(&mut self, now: u64) {
        if self.flags.take_keymap_update() {
            match self.layouts.reload() {
                Ok(()) => {
                    let index = self.tap.original().unwrap_or(self.table.index);
                    self.clear_tap_toggle();
                    let table = self.layouts.rebuild(index);
                    self.adopt(&table);
                    self.flags.mark_config_updated(now);
                    self.flags.touch(now);
                    info!("Configuration applied");
                }
                Err(e) => warn!("Keeping previous layout, new configuration rejected: {}", e),
            }
        }

        if let Some(index) = self.flags.take_layout_request() {
            self.clear_tap_toggle();
            let table = self.layouts.switch_layout_to(index);
            self.adopt(&table);
            self.flags.touch(now);
        }
    }

    fn on_active(&mut self, row: usize, col: usize) -> Flow {
        let now = self.clock.now_ms();
        self.flags.touch(now);

        if self.tap.owns((row, col)) {
            return match self.table.grid.get_mut(row).and_then(|r| r.get_mut(col)) {
                Some(key) if !key.pressed => {
                    key.pressed = true;
                    if let TapOutcome::Restore(layer) = self.tap.on_press(now) {
                        self.restore_layer(layer);
                        return Flow::EndCycle;
                    }
                    Flow::Continue
                }
                _ => Flow::Continue,
            };
        }

        let Some(key) = self.table.binding(row, col) else {
            return Flow::Continue;
        };
        if key.pressed {
            return Flow::Continue;
        }
        let (action, code, label) = (key.action, key.key_code, key.label.clone());
        self.table.grid[row][col].pressed = true;
        self.engaged[row][col] = Engaged::Consumed;

        match action {
            KeyAction::Fn => {
                self.engaged[row][col] = Engaged::Fn;
                self.flags.set_fn_pressed(true);
                Flow::Continue
            }
            _ if self.flags.is_fn_pressed() => match global_action_at(row, col) {
                Some(global) => {
                    self.run_global_action(global);
                    Flow::EndCycle
                }
                None => Flow::Continue,
            },
            KeyAction::Macro(slot) => {
                let Some(binding) = self.table.macros.get(slot).cloned() else {
                    return Flow::Continue;
                };
                let info = if binding.label.is_empty() { &label } else { &binding.label };
                self.flags.set_key_info(info);
                let emit = self.output_enabled();
                self.player
                    .play(&binding, self.sink.as_ref(), self.clock.as_ref(), emit);
                Flow::Continue
            }
            KeyAction::TapToggle(target) => {
                if self.tap.is_active() {
                    return Flow::Continue;
                }
                debug!("Tap-toggle to layer {}", target);
                self.tap.activate((row, col), self.table.index, target, now);
                self.flags.set_tap_toggled(Some(target));
                let table = self.layouts.show(target);
                self.adopt(&table);
                Flow::EndCycle
            }
            KeyAction::Standard => {
                if code != 0 && self.output_enabled() {
                    self.sink.press(code);
                    self.engaged[row][col] = Engaged::Key(code);
                }
                self.flags.set_key_info(&label);
                Flow::Continue
            }
        }
    }

    fn on_inactive(&mut self, row: usize, col: usize) -> Flow {
        let Some(key) = self.table.grid.get_mut(row).and_then(|r| r.get_mut(col)) else {
            return Flow::Continue;
        };
        if !key.pressed {
            return Flow::Continue;
        }
        key.pressed = false;

        if self.tap.owns((row, col)) {
            if let TapOutcome::Restore(layer) = self.tap.on_release(self.clock.now_ms()) {
                self.restore_layer(layer);
                return Flow::EndCycle;
            }
            return Flow::Continue;
        }

        match std::mem::replace(&mut self.engaged[row][col], Engaged::Idle) {
            Engaged::Key(code) => self.sink.release(code),
            Engaged::Fn => self.flags.set_fn_pressed(false),
            Engaged::Idle | Engaged::Consumed => {}
        }
        Flow::Continue
    }

    fn run_global_action(&mut self, action: GlobalAction) {
        let on_off = |on: bool| if on { "ON" } else { "OFF" };
        let info = match action {
            GlobalAction::Sleep => {
                self.flags.request_power(PowerRequest::Sleep);
                action.label().to_string()
            }
            GlobalAction::ToggleBootMode => {
                self.flags.request_power(PowerRequest::ToggleBootMode);
                action.label().to_string()
            }
            GlobalAction::ToggleOutputLock => {
                let locked = self.flags.toggle_output_locked();
                if locked {
                    self.sink.release_all();
                }
                format!("{}: {}", action.label(), on_off(locked))
            }
            GlobalAction::ToggleCaffeinated => {
                let on = self.flags.toggle_caffeinated();
                format!("{}: {}", action.label(), on_off(on))
            }
            GlobalAction::SwitchOutputMode => {
                self.sink.release_all();
                let mode = self.flags.output_mode().toggled();
                self.flags.set_output_mode(mode);
                let name = match mode {
                    OutputMode::Ble => "BLE",
                    OutputMode::Usb => "USB",
                };
                format!("{}: {}", action.label(), name)
            }
            GlobalAction::NextLayout => {
                self.clear_tap_toggle();
                let table = self.layouts.switch_layout();
                self.adopt(&table);
                format!("Layout: {}", table.title)
            }
            GlobalAction::ToggleScreenInvert => {
                let on = self.flags.toggle_screen_inverted();
                format!("{}: {}", action.label(), on_off(on))
            }
            GlobalAction::ToggleScreenDisabled => {
                let on = self.flags.toggle_screen_disabled();
                format!("{}: {}", action.label(), on_off(on))
            }
        };
        info!("{}", info);
        self.flags.set_key_info(&info);
        self.clock.delay_ms(self.timing.global_action_debounce_ms);
    }

    fn clear_tap_toggle(&mut self) {
        self.tap.reset();
        self.flags.set_tap_toggled(None);
    }

    fn restore_layer(&mut self, layer: usize) {
        debug!("Tap-toggle restoring layer {}", layer);
        self.flags.set_tap_toggled(None);
        let table = self.layouts.show(layer);
        self.adopt(&table);
    }

    /// Swap in a freshly published table. Keycodes sent under the old table are
    /// released; held positions stay held so they do not fire the new binding.
    fn adopt(&mut self, table: &LayoutTable) {
        let mut next = table.clone();
        for (row, keys) in self.table.grid.iter().enumerate() {
            for (col, key) in keys.iter().enumerate() {
                if !key.pressed {
                    continue;
                }
                if let Some(Engaged::Key(code)) = self.engaged.get(row).and_then(|r| r.get(col)) {
                    self.sink.release(*code);
                    self.engaged[row][col] = Engaged::Consumed;
                }
                if let Some(new_key) = next.grid.get_mut(row).and_then(|r| r.get_mut(col)) {
                    new_key.pressed = true;
                }
            }
        }
        self.table = next;
    }

    fn poll_config_buttons(&mut self, now: u64) {
        let Some((io, buttons)) = self.config_buttons.as_mut() else {
            return;
        };
        let events = buttons.update(now, io.read_buttons());
        for event in events {
            self.flags.touch(now);
            match event {
                ConfigButtonEvent::Short(button) => {
                    if let Some(&action) = CONFIG_BUTTON_SHORT.get(button) {
                        self.run_global_action(action);
                    }
                }
                ConfigButtonEvent::Long(button) => {
                    if let Some(&action) = CONFIG_BUTTON_LONG.get(button) {
                        self.run_global_action(action);
                    }
                }
                ConfigButtonEvent::ResetCountdown(secs) => {
                    self.flags.set_reset_countdown(Some(secs));
                }
                ConfigButtonEvent::ResetCancelled => {
                    self.flags.set_reset_countdown(None);
                }
                ConfigButtonEvent::FactoryReset => {
                    self.flags.set_reset_countdown(None);
                    self.flags.request_power(PowerRequest::FactoryReset);
                }
            }
        }
    }

    fn poll_encoder(&mut self) {
        let Some(encoder) = self.encoder.as_mut() else {
            return;
        };
        let events = encoder.poll();
        if events.is_empty() {
            return;
        }

        self.flags.touch(self.clock.now_ms());
        let emit = self.output_enabled();
        let Some(rotary) = self.table.rotary.as_mut() else {
            return;
        };

        for event in events {
            match event {
                EncoderEvent::Clockwise | EncoderEvent::CounterClockwise => {
                    let (code, label) = if event == EncoderEvent::Clockwise {
                        (rotary.clockwise_code, &rotary.clockwise_label)
                    } else {
                        (rotary.counter_clockwise_code, &rotary.counter_clockwise_label)
                    };
                    if emit && code != 0 {
                        self.sink.press(code);
                        self.sink.release(code);
                    }
                    self.flags.set_key_info(label);
                }
                EncoderEvent::ButtonDown => {
                    if !rotary.button_pressed {
                        rotary.button_pressed = true;
                        if emit && rotary.button_code != 0 {
                            self.sink.press(rotary.button_code);
                        }
                        self.flags.set_key_info(&rotary.button_label);
                    }
                }
                EncoderEvent::ButtonUp => {
                    if rotary.button_pressed {
                        rotary.button_pressed = false;
                        if rotary.button_code != 0 {
                            self.sink.release(rotary.button_code);
                        }
                    }
                }
            }
        }
    }
}

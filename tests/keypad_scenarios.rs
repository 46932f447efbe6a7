//! End-to-end keypad scenarios on the default 5x7 grid

use std::sync::Arc;

use macropad::config::Config;
use macropad::device::{RotaryEncoder, SimulatedKeypad};
use macropad::display::MemoryDisplay;
use macropad::input::{HidCall, RecordingSink, Scanner};
use macropad::layout::{LayoutManager, LayoutTable, SharedLayout};
use macropad::power::{
    BatteryReading, LogLed, Peripherals, PowerState, RecordingPower, SimulatedGauge, Supervisor,
    SupervisorSettings, WakeSource,
};
use macropad::state::RuntimeFlags;
use macropad::store::{
    ConfigStore, DocumentKind, DocumentLimits, LayerConfig, MemoryStorage, RetainedStore,
};
use macropad::system::ManualClock;

const FN: (usize, usize) = (4, 6);
const TT_NUMBERS: (usize, usize) = (4, 5);
const MACRO_3: (usize, usize) = (4, 0);

struct Keypad {
    config: Config,
    scanner: Scanner,
    keypad: SimulatedKeypad,
    sink: Arc<RecordingSink>,
    flags: Arc<RuntimeFlags>,
    clock: ManualClock,
    shared: Arc<SharedLayout>,
    store: ConfigStore,
    retained: Arc<RetainedStore>,
}

impl Keypad {
    fn tap(&mut self, (row, col): (usize, usize)) {
        self.press((row, col));
        self.release((row, col));
    }

    fn press(&mut self, (row, col): (usize, usize)) {
        self.keypad.press(row, col);
        self.scanner.scan_cycle();
    }

    fn release(&mut self, (row, col): (usize, usize)) {
        self.keypad.release(row, col);
        self.scanner.scan_cycle();
    }

    fn supervisor(&self, power: Arc<RecordingPower>) -> Supervisor {
        Supervisor::new(
            self.flags.clone(),
            self.shared.clone(),
            self.store.clone(),
            self.retained.clone(),
            Peripherals {
                sink: self.sink.clone(),
                display: Arc::new(MemoryDisplay::new()),
                led: Arc::new(LogLed::new()),
            },
            power,
            Box::new(SimulatedGauge::new(BatteryReading {
                voltage: Some(3.9),
                ..Default::default()
            })),
            SupervisorSettings::from(&self.config),
        )
    }
}

fn layer(title: &str, first_code: u8) -> LayerConfig {
    let mut layer = LayerConfig::empty(title, 5, 7);
    for row in 0..4 {
        for col in 0..7 {
            let code = first_code + (row * 7 + col) as u8;
            layer.keymap[row][col] = code;
            layer.key_info[row][col] = format!("{}{}", title, code);
        }
    }
    layer.key_info[4][5] = "TT_1".to_string();
    layer.key_info[4][6] = "FN".to_string();
    layer
}

fn keyconfig_json() -> String {
    let mut main = layer("Main", 4);
    main.key_info[0][0] = "A".to_string();
    main.key_info[4][0] = "MACRO_3".to_string();
    let layers = vec![main, layer("Numbers", 0x1e), layer("Media", 0x3a)];
    serde_json::to_string(&layers).unwrap()
}

const MACROS_JSON: &str = r#"[
    {"name": "", "type": 0, "keyStrokes": []},
    {"name": "", "type": 0, "keyStrokes": []},
    {"name": "", "type": 0, "keyStrokes": []},
    {"name": "Greeting", "type": 1, "stringContent": "hello"}
]"#;

fn keypad() -> Keypad {
    let config = Config::default();
    let storage = Arc::new(MemoryStorage::new());
    let store = ConfigStore::new(storage.clone(), DocumentLimits::from_config(&config));
    store
        .put_raw(DocumentKind::KeyConfig, &keyconfig_json())
        .unwrap();
    store.put_raw(DocumentKind::Macros, MACROS_JSON).unwrap();

    let retained = Arc::new(RetainedStore::new(storage));
    let shared = Arc::new(SharedLayout::new(LayoutTable::build(&[], &[], 0)));
    let layouts = LayoutManager::open(store.clone(), retained.clone(), shared.clone());

    let keypad = SimulatedKeypad::new();
    let sink = Arc::new(RecordingSink::new());
    let flags = Arc::new(RuntimeFlags::new());
    let clock = ManualClock::new();
    let scanner = Scanner::new(
        Box::new(keypad.matrix()),
        sink.clone(),
        flags.clone(),
        Arc::new(clock.clone()),
        layouts,
        &config,
    )
    .with_config_buttons(Box::new(keypad.config_buttons()))
    .with_encoder(RotaryEncoder::new(Box::new(keypad.encoder())));

    Keypad {
        config,
        scanner,
        keypad,
        sink,
        flags,
        clock,
        shared,
        store,
        retained,
    }
}

#[test]
fn test_key_press_sends_one_press_and_one_release() {
    let mut pad = keypad();
    pad.press((0, 0));
    pad.scanner.scan_cycle();
    assert_eq!(pad.flags.key_info(), "A");

    pad.release((0, 0));
    pad.scanner.scan_cycle();
    assert_eq!(pad.sink.take(), vec![HidCall::Press(4), HidCall::Release(4)]);
}

#[test]
fn test_macro_slot_types_text_once() {
    let mut pad = keypad();
    pad.press(MACRO_3);
    pad.scanner.scan_cycle();
    pad.release(MACRO_3);

    assert_eq!(pad.sink.take(), vec![HidCall::Print("hello".to_string())]);
    assert_eq!(pad.flags.key_info(), "Greeting");
}

#[test]
fn test_uploaded_keyconfig_applies_on_next_cycle() {
    let mut pad = keypad();
    let mut layers: Vec<LayerConfig> = serde_json::from_str(&keyconfig_json()).unwrap();
    layers[0].keymap[0][0] = 0x29;
    layers[0].key_info[0][0] = "Esc".to_string();
    pad.store
        .put_raw(DocumentKind::KeyConfig, &serde_json::to_string(&layers).unwrap())
        .unwrap();

    let generation = pad.shared.generation();
    pad.flags.request_keymap_update();
    pad.scanner.scan_cycle();
    assert_eq!(pad.shared.generation(), generation + 1);
    assert!(!pad.flags.keymaps_need_update());

    pad.press((0, 0));
    assert_eq!(pad.sink.take(), vec![HidCall::Press(0x29)]);
    assert_eq!(pad.flags.key_info(), "Esc");
}

#[test]
fn test_oversized_upload_is_rejected_and_layout_kept() {
    let mut pad = keypad();
    let body = format!("[\"{}\"]", "x".repeat(pad.config.storage.max_document_bytes));
    assert!(pad.store.put_raw(DocumentKind::KeyConfig, &body).is_err());

    pad.flags.request_keymap_update();
    pad.scanner.scan_cycle();
    pad.tap((0, 1));
    assert_eq!(pad.sink.take(), vec![HidCall::Press(5), HidCall::Release(5)]);
}

#[test]
fn test_layout_requests_clamp_and_fn_wraps() {
    let mut pad = keypad();
    pad.flags.request_layout(99);
    pad.scanner.scan_cycle();
    assert_eq!(pad.shared.snapshot().title, "Media");
    assert_eq!(pad.retained.load().layout_index, 2);

    pad.press(FN);
    pad.tap((0, 4));
    pad.release(FN);
    assert_eq!(pad.shared.snapshot().index, 0);

    pad.flags.request_layout(-3);
    pad.scanner.scan_cycle();
    assert_eq!(pad.shared.snapshot().index, 0);
}

#[test]
fn test_tap_toggle_hold_uses_other_layer() {
    let mut pad = keypad();
    pad.press(TT_NUMBERS);
    assert_eq!(pad.shared.snapshot().title, "Numbers");

    pad.tap((0, 0));
    assert_eq!(
        pad.sink.take(),
        vec![HidCall::Press(0x1e), HidCall::Release(0x1e)]
    );

    pad.clock.advance_ms(1_000);
    pad.release(TT_NUMBERS);
    assert_eq!(pad.shared.snapshot().title, "Main");
    assert_eq!(pad.flags.tap_toggled_layer(), None);
}

#[test]
fn test_output_lock_tracks_keys_without_sending() {
    let mut pad = keypad();
    pad.press(FN);
    pad.tap((0, 1));
    pad.release(FN);
    assert!(pad.flags.is_output_locked());
    pad.sink.take();

    pad.press((1, 0));
    assert!(pad.scanner.table().grid[1][0].pressed);
    pad.release((1, 0));
    assert!(pad.sink.calls().is_empty());
}

#[test]
fn test_idle_keypad_goes_to_sleep() {
    let mut pad = keypad();
    pad.tap((0, 0));
    let active_at = pad.flags.last_activity_ms();

    let power = Arc::new(RecordingPower::new(false));
    let mut supervisor = pad.supervisor(power.clone());
    let timeout = pad.config.power.sleep_timeout().as_millis() as u64;

    assert_ne!(supervisor.tick(active_at + timeout - 1), PowerState::Halted);
    assert_eq!(supervisor.tick(active_at + timeout), PowerState::Halted);
    assert_eq!(
        power.wakes(),
        vec![WakeSource::Matrix {
            mask: pad.config.power.wake_mask
        }]
    );
    assert!(pad.sink.calls().contains(&HidCall::ReleaseAll));
}

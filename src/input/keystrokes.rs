//! HID output sinks: where key events go

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::keycode;
use crate::state::{OutputMode, RuntimeFlags};

/// Destination for keyboard events, implemented by each HID transport
pub trait HidSink: Send + Sync {
    fn press(&self, code: u8);
    fn release(&self, code: u8);
    fn release_all(&self);
    /// Type text, one key down/up per character
    fn print(&self, text: &str);
    /// Type text followed by Enter
    fn println(&self, text: &str);
    fn set_battery_level(&self, percent: u8);
    fn is_connected(&self) -> bool;
}

/// One call made on a [`RecordingSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HidCall {
    Press(u8),
    Release(u8),
    ReleaseAll,
    Print(String),
    Println(String),
    BatteryLevel(u8),
}

/// Records every call; used by tests and the status CLI
pub struct RecordingSink {
    calls: Mutex<Vec<HidCall>>,
    connected: AtomicBool,
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<HidCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Return and clear the recorded calls
    pub fn take(&self) -> Vec<HidCall> {
        std::mem::take(&mut *self.calls.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn record(&self, call: HidCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }
}

impl HidSink for RecordingSink {
    fn press(&self, code: u8) {
        self.record(HidCall::Press(code));
    }

    fn release(&self, code: u8) {
        self.record(HidCall::Release(code));
    }

    fn release_all(&self) {
        self.record(HidCall::ReleaseAll);
    }

    fn print(&self, text: &str) {
        self.record(HidCall::Print(text.to_string()));
    }

    fn println(&self, text: &str) {
        self.record(HidCall::Println(text.to_string()));
    }

    fn set_battery_level(&self, percent: u8) {
        self.record(HidCall::BatteryLevel(percent));
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Logs key events instead of sending them
pub struct LogSink {
    name: &'static str,
    battery: AtomicU8,
}

impl LogSink {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            battery: AtomicU8::new(0),
        }
    }
}

impl HidSink for LogSink {
    fn press(&self, code: u8) {
        info!(
            "[{}] key down 0x{:02x} ({})",
            self.name,
            code,
            keycode::name(code).unwrap_or_default()
        );
    }

    fn release(&self, code: u8) {
        debug!("[{}] key up 0x{:02x}", self.name, code);
    }

    fn release_all(&self) {
        debug!("[{}] release all", self.name);
    }

    fn print(&self, text: &str) {
        info!("[{}] type {:?}", self.name, text);
    }

    fn println(&self, text: &str) {
        info!("[{}] type {:?} + Enter", self.name, text);
    }

    fn set_battery_level(&self, percent: u8) {
        if self.battery.swap(percent, Ordering::Relaxed) != percent {
            debug!("[{}] battery level {}%", self.name, percent);
        }
    }

    fn is_connected(&self) -> bool {
        true
    }
}

/// Forwards to the transport selected by the runtime output mode
pub struct TransportRouter {
    ble: Arc<dyn HidSink>,
    usb: Arc<dyn HidSink>,
    flags: Arc<RuntimeFlags>,
}

impl TransportRouter {
    pub fn new(ble: Arc<dyn HidSink>, usb: Arc<dyn HidSink>, flags: Arc<RuntimeFlags>) -> Self {
        Self { ble, usb, flags }
    }

    fn active(&self) -> &Arc<dyn HidSink> {
        match self.flags.output_mode() {
            OutputMode::Ble => &self.ble,
            OutputMode::Usb => &self.usb,
        }
    }
}

impl HidSink for TransportRouter {
    fn press(&self, code: u8) {
        self.active().press(code);
    }

    fn release(&self, code: u8) {
        self.active().release(code);
    }

    fn release_all(&self) {
        self.active().release_all();
    }

    fn print(&self, text: &str) {
        self.active().print(text);
    }

    fn println(&self, text: &str) {
        self.active().println(text);
    }

    fn set_battery_level(&self, percent: u8) {
        self.ble.set_battery_level(percent);
        self.usb.set_battery_level(percent);
    }

    fn is_connected(&self) -> bool {
        self.active().is_connected()
    }
}

#[cfg(feature = "host-keys")]
pub use host::EnigoSink;

#[cfg(feature = "host-keys")]
mod host {
    use enigo::{Direction, Enigo, Key as EnigoKey, Keyboard, Settings};
    use std::collections::HashSet;
    use std::sync::mpsc;
    use tracing::{debug, warn};

    use super::HidSink;
    use crate::keycode::{self, KeyUsage, Modifier, NamedKey};

    enum Command {
        Press(u8),
        Release(u8),
        ReleaseAll,
        Text { text: String, enter: bool },
    }

    /// Injects keystrokes into the host session.
    ///
    /// Enigo runs on its own thread; the sink only queues commands.
    pub struct EnigoSink {
        tx: mpsc::Sender<Command>,
    }

    impl EnigoSink {
        pub fn new() -> anyhow::Result<Self> {
            let (tx, rx) = mpsc::channel::<Command>();
            let (ready_tx, ready_rx) = mpsc::channel();

            std::thread::Builder::new()
                .name("hid-enigo".to_string())
                .spawn(move || {
                    let mut enigo = match Enigo::new(&Settings::default()) {
                        Ok(enigo) => {
                            let _ = ready_tx.send(Ok(()));
                            enigo
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e.to_string()));
                            return;
                        }
                    };
                    let mut held: HashSet<u8> = HashSet::new();
                    for command in rx {
                        run(&mut enigo, &mut held, command);
                    }
                })?;

            ready_rx
                .recv()?
                .map_err(|e| anyhow::anyhow!("Failed to initialize Enigo: {}", e))?;
            Ok(Self { tx })
        }

        fn send(&self, command: Command) {
            if self.tx.send(command).is_err() {
                warn!("Keystroke thread has stopped");
            }
        }
    }

    fn to_enigo(code: u8) -> Option<EnigoKey> {
        let key = match keycode::classify(code)? {
            KeyUsage::Char(ch) => EnigoKey::Unicode(ch),
            KeyUsage::Named(named) => match named {
                NamedKey::Enter => EnigoKey::Return,
                NamedKey::Escape => EnigoKey::Escape,
                NamedKey::Backspace => EnigoKey::Backspace,
                NamedKey::Tab => EnigoKey::Tab,
                NamedKey::Space => EnigoKey::Unicode(' '),
                NamedKey::CapsLock => EnigoKey::CapsLock,
                NamedKey::Function(n) => match n {
                    1 => EnigoKey::F1,
                    2 => EnigoKey::F2,
                    3 => EnigoKey::F3,
                    4 => EnigoKey::F4,
                    5 => EnigoKey::F5,
                    6 => EnigoKey::F6,
                    7 => EnigoKey::F7,
                    8 => EnigoKey::F8,
                    9 => EnigoKey::F9,
                    10 => EnigoKey::F10,
                    11 => EnigoKey::F11,
                    _ => EnigoKey::F12,
                },
                NamedKey::Insert => return None,
                NamedKey::Home => EnigoKey::Home,
                NamedKey::PageUp => EnigoKey::PageUp,
                NamedKey::Delete => EnigoKey::Delete,
                NamedKey::End => EnigoKey::End,
                NamedKey::PageDown => EnigoKey::PageDown,
                NamedKey::Right => EnigoKey::RightArrow,
                NamedKey::Left => EnigoKey::LeftArrow,
                NamedKey::Down => EnigoKey::DownArrow,
                NamedKey::Up => EnigoKey::UpArrow,
            },
            KeyUsage::Modifier { modifier, .. } => match modifier {
                Modifier::Ctrl => EnigoKey::Control,
                Modifier::Shift => EnigoKey::Shift,
                Modifier::Alt => EnigoKey::Alt,
                Modifier::Gui => EnigoKey::Meta,
            },
        };
        Some(key)
    }

    fn run(enigo: &mut Enigo, held: &mut HashSet<u8>, command: Command) {
        match command {
            Command::Press(code) => match to_enigo(code) {
                Some(key) => {
                    if enigo.key(key, Direction::Press).is_ok() {
                        held.insert(code);
                    }
                }
                None => debug!("No host key for usage 0x{:02x}", code),
            },
            Command::Release(code) => {
                if held.remove(&code) {
                    if let Some(key) = to_enigo(code) {
                        let _ = enigo.key(key, Direction::Release);
                    }
                }
            }
            Command::ReleaseAll => {
                for code in held.drain() {
                    if let Some(key) = to_enigo(code) {
                        let _ = enigo.key(key, Direction::Release);
                    }
                }
            }
            Command::Text { text, enter } => {
                let _ = enigo.text(&text);
                if enter {
                    let _ = enigo.key(EnigoKey::Return, Direction::Click);
                }
            }
        }
    }

    impl HidSink for EnigoSink {
        fn press(&self, code: u8) {
            self.send(Command::Press(code));
        }

        fn release(&self, code: u8) {
            self.send(Command::Release(code));
        }

        fn release_all(&self) {
            self.send(Command::ReleaseAll);
        }

        fn print(&self, text: &str) {
            self.send(Command::Text {
                text: text.to_string(),
                enter: false,
            });
        }

        fn println(&self, text: &str) {
            self.send(Command::Text {
                text: text.to_string(),
                enter: true,
            });
        }

        fn set_battery_level(&self, _percent: u8) {}

        fn is_connected(&self) -> bool {
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> (TransportRouter, Arc<RecordingSink>, Arc<RecordingSink>, Arc<RuntimeFlags>) {
        let ble = Arc::new(RecordingSink::new());
        let usb = Arc::new(RecordingSink::new());
        let flags = Arc::new(RuntimeFlags::new());
        (
            TransportRouter::new(ble.clone(), usb.clone(), flags.clone()),
            ble,
            usb,
            flags,
        )
    }

    #[test]
    fn test_router_follows_output_mode() {
        let (router, ble, usb, flags) = router();
        router.press(4);
        flags.set_output_mode(OutputMode::Usb);
        router.release(4);

        assert_eq!(ble.calls(), vec![HidCall::Press(4)]);
        assert_eq!(usb.calls(), vec![HidCall::Release(4)]);
    }

    #[test]
    fn test_battery_goes_to_both() {
        let (router, ble, usb, _) = router();
        router.set_battery_level(55);
        assert_eq!(ble.calls(), vec![HidCall::BatteryLevel(55)]);
        assert_eq!(usb.calls(), vec![HidCall::BatteryLevel(55)]);
    }

    #[test]
    fn test_connection_of_active_transport() {
        let (router, ble, _, flags) = router();
        ble.set_connected(false);
        assert!(!router.is_connected());
        flags.set_output_mode(OutputMode::Usb);
        assert!(router.is_connected());
    }

    #[test]
    fn test_recording_take_clears() {
        let sink = RecordingSink::new();
        sink.print("hi");
        assert_eq!(sink.take(), vec![HidCall::Print("hi".to_string())]);
        assert!(sink.calls().is_empty());
    }
}

pub mod config_buttons;
mod handler;
pub mod keystrokes;
pub mod macros;
pub mod tap_toggle;

pub use handler::{ScanTiming, Scanner};
pub use keystrokes::{HidCall, HidSink, LogSink, RecordingSink, TransportRouter};
#[cfg(feature = "host-keys")]
pub use keystrokes::EnigoSink;

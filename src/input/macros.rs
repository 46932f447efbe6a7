//! Macro playback

use tracing::debug;

use super::keystrokes::HidSink;
use crate::config::TimingConfig;
use crate::layout::MacroBinding;
use crate::store::MacroKind;
use crate::system::Clock;

#[derive(Debug, Clone, Copy)]
pub struct MacroTiming {
    pub key_gap_us: u64,
    pub chord_hold_ms: u64,
    pub settle_ms: u64,
}

impl From<&TimingConfig> for MacroTiming {
    fn from(timing: &TimingConfig) -> Self {
        Self {
            key_gap_us: timing.chord_key_gap_us,
            chord_hold_ms: timing.chord_hold_ms,
            settle_ms: timing.macro_settle_ms,
        }
    }
}

impl Default for MacroTiming {
    fn default() -> Self {
        Self::from(&TimingConfig::default())
    }
}

pub struct MacroPlayer {
    timing: MacroTiming,
}

impl MacroPlayer {
    pub fn new(timing: MacroTiming) -> Self {
        Self { timing }
    }

    /// Play a macro slot. `emit` is false while output is locked or the
    /// transport is down: nothing is sent but timing is unchanged.
    pub fn play(&self, binding: &MacroBinding, sink: &dyn HidSink, clock: &dyn Clock, emit: bool) {
        if binding.is_empty() {
            debug!("Empty macro slot");
        } else if emit {
            match binding.kind {
                MacroKind::KeystrokeChord => {
                    for &code in binding.key_codes.iter().filter(|&&c| c != 0) {
                        sink.press(code);
                        clock.delay_us(self.timing.key_gap_us);
                    }
                    clock.delay_ms(self.timing.chord_hold_ms);
                    sink.release_all();
                }
                MacroKind::TextLiteral => sink.print(&binding.text),
                MacroKind::TextLiteralWithEnter => sink.println(&binding.text),
            }
            debug!("Played macro '{}'", binding.label);
        }
        clock.delay_ms(self.timing.settle_ms);
    }
}

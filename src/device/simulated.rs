//! In-process keypad used on hosts without matrix hardware and in tests

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use super::protocol::{ConfigButtonIo, EncoderIo, Level, MatrixIo, CONFIG_BUTTON_COUNT};

/// A/B levels in clockwise order
const GRAY_SEQUENCE: [(Level, Level); 4] = [
    (Level::Inactive, Level::Inactive),
    (Level::Inactive, Level::Active),
    (Level::Active, Level::Active),
    (Level::Active, Level::Inactive),
];

#[derive(Default)]
struct SimState {
    pressed: HashSet<(usize, usize)>,
    config_buttons: [bool; CONFIG_BUTTON_COUNT],
    encoder_position: usize,
    encoder_button: bool,
}

/// Shared control surface of the simulated keypad
#[derive(Clone, Default)]
pub struct SimulatedKeypad {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedKeypad {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn press(&self, row: usize, col: usize) {
        self.state().pressed.insert((row, col));
    }

    pub fn release(&self, row: usize, col: usize) {
        self.state().pressed.remove(&(row, col));
    }

    pub fn release_all(&self) {
        self.state().pressed.clear();
    }

    pub fn is_pressed(&self, row: usize, col: usize) -> bool {
        self.state().pressed.contains(&(row, col))
    }

    pub fn set_config_button(&self, button: usize, pressed: bool) {
        if let Some(slot) = self.state().config_buttons.get_mut(button) {
            *slot = pressed;
        }
    }

    /// Move the encoder one quadrature step
    pub fn turn(&self, clockwise: bool) {
        let mut state = self.state();
        let len = GRAY_SEQUENCE.len();
        state.encoder_position = if clockwise {
            (state.encoder_position + 1) % len
        } else {
            (state.encoder_position + len - 1) % len
        };
    }

    pub fn set_encoder_button(&self, pressed: bool) {
        self.state().encoder_button = pressed;
    }

    pub fn matrix(&self) -> SimulatedMatrix {
        SimulatedMatrix {
            keypad: self.clone(),
            driven_row: None,
        }
    }

    pub fn config_buttons(&self) -> SimulatedConfigButtons {
        SimulatedConfigButtons {
            keypad: self.clone(),
        }
    }

    pub fn encoder(&self) -> SimulatedEncoder {
        SimulatedEncoder {
            keypad: self.clone(),
        }
    }
}

/// Matrix pins backed by a [`SimulatedKeypad`]
pub struct SimulatedMatrix {
    keypad: SimulatedKeypad,
    driven_row: Option<usize>,
}

impl MatrixIo for SimulatedMatrix {
    fn drive_row(&mut self, row: usize, level: Level) {
        match level {
            Level::Active => self.driven_row = Some(row),
            Level::Inactive if self.driven_row == Some(row) => self.driven_row = None,
            Level::Inactive => {}
        }
    }

    fn read_column(&mut self, col: usize) -> Level {
        match self.driven_row {
            Some(row) if self.keypad.is_pressed(row, col) => Level::Active,
            _ => Level::Inactive,
        }
    }
}

pub struct SimulatedConfigButtons {
    keypad: SimulatedKeypad,
}

impl ConfigButtonIo for SimulatedConfigButtons {
    fn read_buttons(&mut self) -> [bool; CONFIG_BUTTON_COUNT] {
        self.keypad.state().config_buttons
    }
}

pub struct SimulatedEncoder {
    keypad: SimulatedKeypad,
}

impl EncoderIo for SimulatedEncoder {
    fn read_phases(&mut self) -> (Level, Level) {
        GRAY_SEQUENCE[self.keypad.state().encoder_position]
    }

    fn read_button(&mut self) -> Level {
        if self.keypad.state().encoder_button {
            Level::Active
        } else {
            Level::Inactive
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::encoder::{EncoderEvent, RotaryEncoder};

    #[test]
    fn test_only_driven_row_reads_active() {
        let keypad = SimulatedKeypad::new();
        let mut matrix = keypad.matrix();
        keypad.press(1, 2);

        assert_eq!(matrix.read_column(2), Level::Inactive);
        matrix.drive_row(0, Level::Active);
        assert_eq!(matrix.read_column(2), Level::Inactive);
        matrix.drive_row(0, Level::Inactive);
        matrix.drive_row(1, Level::Active);
        assert_eq!(matrix.read_column(2), Level::Active);
        assert_eq!(matrix.read_column(1), Level::Inactive);
        matrix.drive_row(1, Level::Inactive);
        assert_eq!(matrix.read_column(2), Level::Inactive);
    }

    #[test]
    fn test_turns_decode_to_direction() {
        let keypad = SimulatedKeypad::new();
        let mut encoder = RotaryEncoder::new(Box::new(keypad.encoder()));

        keypad.turn(true);
        assert_eq!(encoder.poll(), vec![EncoderEvent::Clockwise]);
        keypad.turn(true);
        assert_eq!(encoder.poll(), vec![EncoderEvent::Clockwise]);
        keypad.turn(false);
        assert_eq!(encoder.poll(), vec![EncoderEvent::CounterClockwise]);
        assert!(encoder.poll().is_empty());
    }

    #[test]
    fn test_config_buttons() {
        let keypad = SimulatedKeypad::new();
        let mut buttons = keypad.config_buttons();
        keypad.set_config_button(1, true);
        keypad.set_config_button(9, true);
        assert_eq!(buttons.read_buttons(), [false, true]);
    }
}

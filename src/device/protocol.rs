//! Hardware capabilities the runtime needs from the keypad
//!
//! Matrix wiring: rows are outputs driven `Active` one at a time, columns
//! are inputs read while a row is driven. A position reads `Active` when
//! its switch connects the driven row to the column.

/// Logical level of a row output or column input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Active,
    Inactive,
}

impl Level {
    pub fn is_active(self) -> bool {
        self == Level::Active
    }
}

/// Row/column access to the key matrix
pub trait MatrixIo: Send {
    fn drive_row(&mut self, row: usize, level: Level);
    fn read_column(&mut self, col: usize) -> Level;
}

/// The fixed-function configuration buttons
pub trait ConfigButtonIo: Send {
    /// Pressed state of each button, in button order
    fn read_buttons(&mut self) -> [bool; CONFIG_BUTTON_COUNT];
}

/// Quadrature pins and push switch of a rotary encoder
pub trait EncoderIo: Send {
    /// Levels of the A and B pins
    fn read_phases(&mut self) -> (Level, Level);
    fn read_button(&mut self) -> Level;
}

pub const CONFIG_BUTTON_COUNT: usize = 2;

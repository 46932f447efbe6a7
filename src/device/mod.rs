mod buttons;
pub mod console;
pub mod encoder;
mod protocol;
mod simulated;

pub use buttons::*;
pub use encoder::{EncoderEvent, QuadratureDecoder, RotaryEncoder};
pub use protocol::*;
pub use simulated::{SimulatedConfigButtons, SimulatedEncoder, SimulatedKeypad, SimulatedMatrix};

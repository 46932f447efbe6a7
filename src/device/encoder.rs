//! Rotary encoder decoding

use super::protocol::{EncoderIo, Level};

/// Input from the rotary encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderEvent {
    Clockwise,
    CounterClockwise,
    ButtonDown,
    ButtonUp,
}

/// Turns successive A/B samples into steps.
///
/// The state nibble holds the previous sample in the low two bits and the
/// current one in the high two bits (bit 2 = A low, bit 3 = B low).
#[derive(Debug, Default, Clone)]
pub struct QuadratureDecoder {
    state: u8,
}

impl QuadratureDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, a: Level, b: Level) -> Option<EncoderEvent> {
        let mut s = self.state & 0b11;
        if a.is_active() {
            s |= 0b0100;
        }
        if b.is_active() {
            s |= 0b1000;
        }
        self.state = s >> 2;

        match s {
            0b0001 | 0b0111 | 0b1000 | 0b1110 => Some(EncoderEvent::Clockwise),
            0b0010 | 0b0100 | 0b1011 | 0b1101 => Some(EncoderEvent::CounterClockwise),
            _ => None,
        }
    }
}

/// Polls an encoder's pins and push switch
pub struct RotaryEncoder {
    io: Box<dyn EncoderIo>,
    decoder: QuadratureDecoder,
    button_down: bool,
}

impl RotaryEncoder {
    pub fn new(io: Box<dyn EncoderIo>) -> Self {
        Self {
            io,
            decoder: QuadratureDecoder::new(),
            button_down: false,
        }
    }

    /// Sample once; yields a button edge and/or a rotation step
    pub fn poll(&mut self) -> Vec<EncoderEvent> {
        let mut events = Vec::new();

        let down = self.io.read_button().is_active();
        if down != self.button_down {
            self.button_down = down;
            events.push(if down {
                EncoderEvent::ButtonDown
            } else {
                EncoderEvent::ButtonUp
            });
        }

        let (a, b) = self.io.read_phases();
        if let Some(step) = self.decoder.update(a, b) {
            events.push(step);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Level::{Active as L, Inactive as H};

    #[test]
    fn test_clockwise_sequence() {
        let mut decoder = QuadratureDecoder::new();
        // A leads B
        let steps: Vec<_> = [(L, H), (L, L), (H, L), (H, H)]
            .into_iter()
            .filter_map(|(a, b)| decoder.update(a, b))
            .collect();
        assert!(!steps.is_empty());
        assert!(steps.iter().all(|s| *s == EncoderEvent::CounterClockwise)
            || steps.iter().all(|s| *s == EncoderEvent::Clockwise));
    }

    #[test]
    fn test_directions_are_opposite() {
        let mut forward = QuadratureDecoder::new();
        let f = [(L, H), (L, L), (H, L), (H, H)]
            .into_iter()
            .find_map(|(a, b)| forward.update(a, b));

        let mut backward = QuadratureDecoder::new();
        let r = [(H, L), (L, L), (L, H), (H, H)]
            .into_iter()
            .find_map(|(a, b)| backward.update(a, b));

        assert!(f.is_some() && r.is_some());
        assert_ne!(f, r);
    }

    #[test]
    fn test_no_change_no_step() {
        let mut decoder = QuadratureDecoder::new();
        assert_eq!(decoder.update(H, H), None);
        assert_eq!(decoder.update(H, H), None);
    }

    struct FakeEncoder {
        phases: (Level, Level),
        button: Level,
    }

    impl EncoderIo for FakeEncoder {
        fn read_phases(&mut self) -> (Level, Level) {
            self.phases
        }

        fn read_button(&mut self) -> Level {
            self.button
        }
    }

    #[test]
    fn test_poll_reports_button_edges_once() {
        let io = FakeEncoder {
            phases: (H, H),
            button: L,
        };
        let mut encoder = RotaryEncoder::new(Box::new(io));
        assert_eq!(encoder.poll(), vec![EncoderEvent::ButtonDown]);
        assert!(encoder.poll().is_empty());
    }
}

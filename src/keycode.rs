//! HID keyboard usage codes (usage page 0x07)

pub const KEY_A: u8 = 0x04;
pub const KEY_ENTER: u8 = 0x28;
pub const KEY_ESCAPE: u8 = 0x29;
pub const KEY_BACKSPACE: u8 = 0x2A;
pub const KEY_TAB: u8 = 0x2B;
pub const KEY_SPACE: u8 = 0x2C;
pub const KEY_CAPS_LOCK: u8 = 0x39;
pub const KEY_F1: u8 = 0x3A;
pub const KEY_F12: u8 = 0x45;
pub const KEY_INSERT: u8 = 0x49;
pub const KEY_HOME: u8 = 0x4A;
pub const KEY_PAGE_UP: u8 = 0x4B;
pub const KEY_DELETE: u8 = 0x4C;
pub const KEY_END: u8 = 0x4D;
pub const KEY_PAGE_DOWN: u8 = 0x4E;
pub const KEY_RIGHT: u8 = 0x4F;
pub const KEY_LEFT: u8 = 0x50;
pub const KEY_DOWN: u8 = 0x51;
pub const KEY_UP: u8 = 0x52;
pub const KEY_LEFT_CTRL: u8 = 0xE0;
pub const KEY_RIGHT_GUI: u8 = 0xE7;

/// Non-printing keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedKey {
    Enter,
    Escape,
    Backspace,
    Tab,
    Space,
    CapsLock,
    /// F1..F12
    Function(u8),
    Insert,
    Home,
    PageUp,
    Delete,
    End,
    PageDown,
    Right,
    Left,
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Ctrl,
    Shift,
    Alt,
    Gui,
}

/// What a usage code means to a host keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUsage {
    /// A printing key, by its unshifted character
    Char(char),
    Named(NamedKey),
    /// `right` distinguishes the right-hand modifier
    Modifier { modifier: Modifier, right: bool },
}

const PUNCTUATION: [(u8, char); 11] = [
    (0x2D, '-'),
    (0x2E, '='),
    (0x2F, '['),
    (0x30, ']'),
    (0x31, '\\'),
    (0x33, ';'),
    (0x34, '\''),
    (0x35, '`'),
    (0x36, ','),
    (0x37, '.'),
    (0x38, '/'),
];

/// Classify a usage code, `None` for codes without a host equivalent
pub fn classify(code: u8) -> Option<KeyUsage> {
    let usage = match code {
        0x04..=0x1D => KeyUsage::Char((b'a' + (code - KEY_A)) as char),
        0x1E..=0x26 => KeyUsage::Char((b'1' + (code - 0x1E)) as char),
        0x27 => KeyUsage::Char('0'),
        KEY_ENTER => KeyUsage::Named(NamedKey::Enter),
        KEY_ESCAPE => KeyUsage::Named(NamedKey::Escape),
        KEY_BACKSPACE => KeyUsage::Named(NamedKey::Backspace),
        KEY_TAB => KeyUsage::Named(NamedKey::Tab),
        KEY_SPACE => KeyUsage::Named(NamedKey::Space),
        KEY_CAPS_LOCK => KeyUsage::Named(NamedKey::CapsLock),
        KEY_F1..=KEY_F12 => KeyUsage::Named(NamedKey::Function(code - KEY_F1 + 1)),
        KEY_INSERT => KeyUsage::Named(NamedKey::Insert),
        KEY_HOME => KeyUsage::Named(NamedKey::Home),
        KEY_PAGE_UP => KeyUsage::Named(NamedKey::PageUp),
        KEY_DELETE => KeyUsage::Named(NamedKey::Delete),
        KEY_END => KeyUsage::Named(NamedKey::End),
        KEY_PAGE_DOWN => KeyUsage::Named(NamedKey::PageDown),
        KEY_RIGHT => KeyUsage::Named(NamedKey::Right),
        KEY_LEFT => KeyUsage::Named(NamedKey::Left),
        KEY_DOWN => KeyUsage::Named(NamedKey::Down),
        KEY_UP => KeyUsage::Named(NamedKey::Up),
        KEY_LEFT_CTRL..=KEY_RIGHT_GUI => {
            let offset = code - KEY_LEFT_CTRL;
            let modifier = match offset % 4 {
                0 => Modifier::Ctrl,
                1 => Modifier::Shift,
                2 => Modifier::Alt,
                _ => Modifier::Gui,
            };
            KeyUsage::Modifier {
                modifier,
                right: offset >= 4,
            }
        }
        _ => {
            let (_, ch) = PUNCTUATION.iter().find(|(c, _)| *c == code)?;
            KeyUsage::Char(*ch)
        }
    };
    Some(usage)
}

/// Human readable name of a usage code
pub fn name(code: u8) -> Option<String> {
    let name = match classify(code)? {
        KeyUsage::Char(ch) => ch.to_ascii_uppercase().to_string(),
        KeyUsage::Named(NamedKey::Function(n)) => format!("F{}", n),
        KeyUsage::Named(key) => format!("{:?}", key),
        KeyUsage::Modifier { modifier, right } => {
            format!("{}{:?}", if right { "Right" } else { "Left" }, modifier)
        }
    };
    Some(name)
}

/// Every usage code with a name, in code order
pub fn catalog() -> Vec<(u8, String)> {
    (0..=u8::MAX)
        .filter_map(|code| name(code).map(|name| (code, name)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters_and_digits() {
        assert_eq!(classify(0x04), Some(KeyUsage::Char('a')));
        assert_eq!(classify(0x1D), Some(KeyUsage::Char('z')));
        assert_eq!(classify(0x1E), Some(KeyUsage::Char('1')));
        assert_eq!(classify(0x27), Some(KeyUsage::Char('0')));
    }

    #[test]
    fn test_named_and_modifiers() {
        assert_eq!(classify(KEY_ENTER), Some(KeyUsage::Named(NamedKey::Enter)));
        assert_eq!(
            classify(0x45),
            Some(KeyUsage::Named(NamedKey::Function(12)))
        );
        assert_eq!(
            classify(0xE5),
            Some(KeyUsage::Modifier {
                modifier: Modifier::Shift,
                right: true
            })
        );
    }

    #[test]
    fn test_unknown_codes() {
        assert_eq!(classify(0x00), None);
        assert_eq!(classify(0x32), None);
        assert_eq!(name(0xA0), None);
    }

    #[test]
    fn test_names() {
        assert_eq!(name(0x04).as_deref(), Some("A"));
        assert_eq!(name(0x4C).as_deref(), Some("Delete"));
        assert_eq!(name(0xE0).as_deref(), Some("LeftCtrl"));
        assert_eq!(name(0x38).as_deref(), Some("/"));
    }

    #[test]
    fn test_catalog_is_sorted_and_complete() {
        let catalog = catalog();
        assert!(catalog.windows(2).all(|w| w[0].0 < w[1].0));
        // letters, digits, punctuation, named keys, F-keys, modifiers
        assert_eq!(catalog.len(), 26 + 10 + 11 + 16 + 12 + 8);
    }
}

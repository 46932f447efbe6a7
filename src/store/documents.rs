//! Serialized shapes of the persisted JSON documents

use serde::{Deserialize, Serialize};

/// Number of macro slots
pub const MACRO_SLOTS: usize = 20;
/// Keycodes per keystroke chord
pub const CHORD_KEYS: usize = 6;
/// Rotary arrays are `[button, counter-clockwise, clockwise]`
pub const ROTARY_ENTRIES: usize = 3;

/// One layer of the `keyconfig` document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerConfig {
    pub title: String,
    pub keymap: Vec<Vec<u8>>,
    pub key_info: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotary_map: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotary_info: Option<Vec<String>>,
}

impl LayerConfig {
    /// A layer with no bindings
    pub fn empty(title: &str, rows: usize, cols: usize) -> Self {
        Self {
            title: title.to_string(),
            keymap: vec![vec![0; cols]; rows],
            key_info: vec![vec![String::new(); cols]; rows],
            rotary_map: None,
            rotary_info: None,
        }
    }

    /// Check grid dimensions and rotary array lengths
    pub fn validate(&self, rows: usize, cols: usize) -> Result<(), String> {
        if self.keymap.len() != rows || self.keymap.iter().any(|row| row.len() != cols) {
            return Err(format!(
                "layer '{}': keymap must be {}x{}",
                self.title, rows, cols
            ));
        }
        if self.key_info.len() != rows || self.key_info.iter().any(|row| row.len() != cols) {
            return Err(format!(
                "layer '{}': keyInfo must be {}x{}",
                self.title, rows, cols
            ));
        }
        match (&self.rotary_map, &self.rotary_info) {
            (None, None) => Ok(()),
            (Some(map), Some(info)) if map.len() == ROTARY_ENTRIES && info.len() == ROTARY_ENTRIES => {
                Ok(())
            }
            _ => Err(format!(
                "layer '{}': rotaryMap and rotaryInfo must both have {} entries",
                self.title, ROTARY_ENTRIES
            )),
        }
    }
}

/// What a macro slot plays back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MacroKind {
    /// Press every keycode together, then release all
    #[default]
    KeystrokeChord,
    /// Type the text
    TextLiteral,
    /// Type the text followed by Enter
    TextLiteralWithEnter,
}

impl TryFrom<u8> for MacroKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MacroKind::KeystrokeChord),
            1 => Ok(MacroKind::TextLiteral),
            2 => Ok(MacroKind::TextLiteralWithEnter),
            other => Err(format!("unknown macro type {}", other)),
        }
    }
}

impl From<MacroKind> for u8 {
    fn from(kind: MacroKind) -> u8 {
        match kind {
            MacroKind::KeystrokeChord => 0,
            MacroKind::TextLiteral => 1,
            MacroKind::TextLiteralWithEnter => 2,
        }
    }
}

/// One entry of the `macros` document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MacroKind,
    #[serde(default)]
    pub string_content: String,
    #[serde(default)]
    pub key_strokes: Vec<u8>,
}

impl MacroConfig {
    /// Keycodes padded with zeros to the chord width
    pub fn chord(&self) -> [u8; CHORD_KEYS] {
        let mut codes = [0u8; CHORD_KEYS];
        for (slot, code) in codes.iter_mut().zip(&self.key_strokes) {
            *slot = *code;
        }
        codes
    }
}

/// Validate the whole macros document
pub fn validate_macros(macros: &[MacroConfig]) -> Result<(), String> {
    if macros.len() > MACRO_SLOTS {
        return Err(format!(
            "{} macros defined, at most {} allowed",
            macros.len(),
            MACRO_SLOTS
        ));
    }
    if let Some(m) = macros.iter().find(|m| m.key_strokes.len() > CHORD_KEYS) {
        return Err(format!(
            "macro '{}' has {} keystrokes, at most {} allowed",
            m.name,
            m.key_strokes.len(),
            CHORD_KEYS
        ));
    }
    Ok(())
}

/// The `system` document: network credentials and last paired host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemConfig {
    #[serde(default)]
    pub ssid: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_device: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_uses_camel_case_keys() {
        let json = r#"{"title":"Main","keymap":[[4]],"keyInfo":[["A"]],
            "rotaryMap":[0,128,129],"rotaryInfo":["","Vol-","Vol+"]}"#;
        let layer: LayerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(layer.key_info[0][0], "A");
        assert_eq!(layer.rotary_map, Some(vec![0, 128, 129]));
        assert!(layer.validate(1, 1).is_ok());
    }

    #[test]
    fn test_layer_dimension_mismatch() {
        let mut layer = LayerConfig::empty("Main", 2, 3);
        assert!(layer.validate(2, 3).is_ok());
        layer.keymap[1].pop();
        assert!(layer.validate(2, 3).unwrap_err().contains("keymap"));
    }

    #[test]
    fn test_rotary_arrays_must_pair() {
        let mut layer = LayerConfig::empty("Main", 1, 1);
        layer.rotary_map = Some(vec![0, 1, 2]);
        assert!(layer.validate(1, 1).is_err());
        layer.rotary_info = Some(vec![String::new(); 3]);
        assert!(layer.validate(1, 1).is_ok());
    }

    #[test]
    fn test_macro_type_is_numeric() {
        let json = r#"{"name":"hi","type":2,"stringContent":"hello","keyStrokes":[]}"#;
        let m: MacroConfig = serde_json::from_str(json).unwrap();
        assert_eq!(m.kind, MacroKind::TextLiteralWithEnter);
        assert!(serde_json::to_string(&m).unwrap().contains(r#""type":2"#));

        let bad = r#"{"name":"hi","type":7}"#;
        assert!(serde_json::from_str::<MacroConfig>(bad).is_err());
    }

    #[test]
    fn test_chord_zero_fills() {
        let m = MacroConfig {
            name: "copy".to_string(),
            kind: MacroKind::KeystrokeChord,
            string_content: String::new(),
            key_strokes: vec![0xe0, 0x06],
        };
        assert_eq!(m.chord(), [0xe0, 0x06, 0, 0, 0, 0]);
    }

    #[test]
    fn test_validate_macros_limits() {
        let m = MacroConfig {
            name: "x".to_string(),
            kind: MacroKind::KeystrokeChord,
            string_content: String::new(),
            key_strokes: vec![1; 7],
        };
        assert!(validate_macros(std::slice::from_ref(&m)).is_err());

        let ok = MacroConfig {
            key_strokes: vec![1; 6],
            ..m
        };
        assert!(validate_macros(&vec![ok; MACRO_SLOTS]).is_ok());
    }
}

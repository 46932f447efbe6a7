//! Layout Table: the live key, macro and rotary bindings of the active layer

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{error, info, warn};

use crate::error::ConfigResult;
use crate::store::documents::{CHORD_KEYS, MACRO_SLOTS};
use crate::store::{ConfigStore, LayerConfig, MacroConfig, MacroKind, RetainedStore};

/// Label of the modifier key gating global actions
pub const FN_LABEL: &str = "FN";
const MACRO_PREFIX: &str = "MACRO_";
const TAP_TOGGLE_PREFIX: &str = "TT_";

/// What pressing a position does, decided when the layer is loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Send the binding's keycode
    Standard,
    /// Hold to turn the matrix into the global action table
    Fn,
    /// Play a macro slot
    Macro(usize),
    /// Temporarily switch to another layer
    TapToggle(usize),
}

impl KeyAction {
    pub fn from_label(label: &str, layer_count: usize) -> Self {
        if label == FN_LABEL {
            return KeyAction::Fn;
        }
        if let Some(suffix) = label.strip_prefix(MACRO_PREFIX) {
            return match suffix.parse::<usize>() {
                Ok(slot) if slot < MACRO_SLOTS => KeyAction::Macro(slot),
                _ => {
                    warn!("Ignoring macro binding '{}': no such slot", label);
                    KeyAction::Standard
                }
            };
        }
        if let Some(suffix) = label.strip_prefix(TAP_TOGGLE_PREFIX) {
            return match suffix.parse::<usize>() {
                Ok(layer) if layer < layer_count => KeyAction::TapToggle(layer),
                _ => {
                    warn!("Ignoring tap-toggle binding '{}': no such layer", label);
                    KeyAction::Standard
                }
            };
        }
        KeyAction::Standard
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBinding {
    pub key_code: u8,
    pub label: String,
    pub action: KeyAction,
    pub pressed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroBinding {
    pub kind: MacroKind,
    pub key_codes: [u8; CHORD_KEYS],
    pub label: String,
    pub text: String,
}

impl MacroBinding {
    fn empty() -> Self {
        Self {
            kind: MacroKind::KeystrokeChord,
            key_codes: [0; CHORD_KEYS],
            label: String::new(),
            text: String::new(),
        }
    }

    fn from_config(config: &MacroConfig) -> Self {
        Self {
            kind: config.kind,
            key_codes: config.chord(),
            label: config.name.clone(),
            text: config.string_content.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.key_codes.iter().all(|&c| c == 0) && self.text.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotaryBinding {
    pub button_code: u8,
    pub button_label: String,
    pub button_pressed: bool,
    pub clockwise_code: u8,
    pub clockwise_label: String,
    pub counter_clockwise_code: u8,
    pub counter_clockwise_label: String,
}

impl RotaryBinding {
    fn from_layer(layer: &LayerConfig) -> Option<Self> {
        match (&layer.rotary_map, &layer.rotary_info) {
            (Some(map), Some(info)) if map.len() >= 3 && info.len() >= 3 => Some(Self {
                button_code: map[0],
                button_label: info[0].clone(),
                button_pressed: false,
                counter_clockwise_code: map[1],
                counter_clockwise_label: info[1].clone(),
                clockwise_code: map[2],
                clockwise_label: info[2].clone(),
            }),
            _ => None,
        }
    }
}

/// The bindings of one layer plus the macro slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutTable {
    pub index: usize,
    pub title: String,
    /// Titles of every layer, in selection order
    pub titles: Vec<String>,
    pub grid: Vec<Vec<KeyBinding>>,
    pub rotary: Option<RotaryBinding>,
    pub macros: Vec<MacroBinding>,
}

impl LayoutTable {
    /// Build the table for `index`; out-of-range indices select layer 0
    pub fn build(layers: &[LayerConfig], macros: &[MacroConfig], index: usize) -> Self {
        let index = if index < layers.len() { index } else { 0 };
        let titles: Vec<String> = layers.iter().map(|l| l.title.clone()).collect();

        let Some(layer) = layers.get(index) else {
            return Self {
                index: 0,
                title: String::new(),
                titles,
                grid: Vec::new(),
                rotary: None,
                macros: vec![MacroBinding::empty(); MACRO_SLOTS],
            };
        };

        let grid = layer
            .keymap
            .iter()
            .zip(&layer.key_info)
            .map(|(codes, labels)| {
                codes
                    .iter()
                    .zip(labels)
                    .map(|(&key_code, label)| KeyBinding {
                        key_code,
                        label: label.clone(),
                        action: KeyAction::from_label(label, layers.len()),
                        pressed: false,
                    })
                    .collect()
            })
            .collect();

        let mut slots = vec![MacroBinding::empty(); MACRO_SLOTS];
        for (slot, config) in slots.iter_mut().zip(macros) {
            *slot = MacroBinding::from_config(config);
        }

        Self {
            index,
            title: layer.title.clone(),
            titles,
            grid,
            rotary: RotaryBinding::from_layer(layer),
            macros: slots,
        }
    }

    pub fn layer_count(&self) -> usize {
        self.titles.len()
    }

    pub fn binding(&self, row: usize, col: usize) -> Option<&KeyBinding> {
        self.grid.get(row)?.get(col)
    }

    pub fn find_layout_index(&self, title: &str) -> Option<usize> {
        self.titles.iter().position(|t| t == title)
    }
}

/// The published table. Readers get a consistent snapshot; writers swap in a whole new table.
pub struct SharedLayout {
    current: RwLock<Arc<LayoutTable>>,
    generation: AtomicU64,
}

impl SharedLayout {
    pub fn new(table: LayoutTable) -> Self {
        Self {
            current: RwLock::new(Arc::new(table)),
            generation: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> Arc<LayoutTable> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn publish(&self, table: Arc<LayoutTable>) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = table;
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of publishes so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

/// Owns the loaded documents and rebuilds the table. Lives on the scan thread.
pub struct LayoutManager {
    store: ConfigStore,
    retained: Arc<RetainedStore>,
    shared: Arc<SharedLayout>,
    layers: Vec<LayerConfig>,
    macros: Vec<MacroConfig>,
}

impl LayoutManager {
    /// Load the documents and publish the layer remembered across sleep.
    ///
    /// Unreadable documents fall back to a single empty layer rather than failing boot.
    pub fn open(
        store: ConfigStore,
        retained: Arc<RetainedStore>,
        shared: Arc<SharedLayout>,
    ) -> Self {
        let limits = store.limits();
        let mut manager = Self {
            store,
            retained,
            shared,
            layers: vec![LayerConfig::empty("Default", limits.rows, limits.cols)],
            macros: Vec::new(),
        };
        if let Err(e) = manager.reload() {
            error!("Failed to load configuration, using an empty layout: {}", e);
        }
        let index = manager.retained.load().layout_index;
        manager.rebuild(index);
        manager
    }

    /// Re-read both documents. On any error the previously loaded documents stay in use.
    pub fn reload(&mut self) -> ConfigResult<()> {
        let layers = self.store.load_layers()?;
        let macros = self.store.load_macros()?;
        info!(
            "Loaded {} layer(s) and {} macro(s)",
            layers.len(),
            macros.len()
        );
        self.layers = layers;
        self.macros = macros;
        Ok(())
    }

    /// Build and publish the table for `index`, persisting the index first
    pub fn rebuild(&mut self, index: usize) -> Arc<LayoutTable> {
        let index = if index < self.layers.len() { index } else { 0 };

        if let Err(e) = self.retained.set_layout_index(index) {
            error!("Failed to persist layout index {}: {}", index, e);
        }
        self.show(index)
    }

    /// Build and publish the table for `index` without persisting it.
    /// Used for tap-toggle layers, which never survive a sleep.
    pub fn show(&mut self, index: usize) -> Arc<LayoutTable> {
        let index = if index < self.layers.len() { index } else { 0 };
        let table = Arc::new(LayoutTable::build(&self.layers, &self.macros, index));
        info!("Layout: {} ({}/{})", table.title, index + 1, table.layer_count());
        self.shared.publish(table.clone());
        table
    }

    /// Advance to the next layer, wrapping to the first
    pub fn switch_layout(&mut self) -> Arc<LayoutTable> {
        let next = self.current_index() + 1;
        self.rebuild(if next < self.layer_count() { next } else { 0 })
    }

    /// Switch to an explicit layer, clamping into range
    pub fn switch_layout_to(&mut self, index: i64) -> Arc<LayoutTable> {
        let last = self.layer_count().saturating_sub(1) as i64;
        self.rebuild(index.clamp(0, last) as usize)
    }

    pub fn find_layout_index(&self, title: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.title == title)
    }

    pub fn current_index(&self) -> usize {
        self.shared.snapshot().index
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn shared(&self) -> Arc<SharedLayout> {
        self.shared.clone()
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }
}

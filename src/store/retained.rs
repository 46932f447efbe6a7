//! State that survives deep sleep: the active layout and the boot mode

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::warn;

use super::storage::Storage;
use crate::error::StorageError;

const RETAINED_BLOB: &str = "retained";

/// Which runtime the next boot enters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BootMode {
    /// Matrix scanning and HID output
    #[default]
    Keypad,
    /// Web configuration server
    Config,
}

impl BootMode {
    pub fn toggled(self) -> Self {
        match self {
            BootMode::Keypad => BootMode::Config,
            BootMode::Config => BootMode::Keypad,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetainedState {
    pub layout_index: usize,
    pub boot_mode: BootMode,
}

/// Serialized read-modify-write access to the retained record
pub struct RetainedStore {
    storage: Arc<dyn Storage>,
    lock: Mutex<()>,
}

impl RetainedStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            lock: Mutex::new(()),
        }
    }

    /// Current record; a missing or unreadable record reads as the default
    pub fn load(&self) -> RetainedState {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.read_unlocked()
    }

    fn read_unlocked(&self) -> RetainedState {
        match self.storage.read(RETAINED_BLOB) {
            Ok(Some(data)) => serde_json::from_slice(&data).unwrap_or_else(|e| {
                warn!("Retained state is corrupt, using defaults: {}", e);
                RetainedState::default()
            }),
            Ok(None) => RetainedState::default(),
            Err(e) => {
                warn!("Failed to read retained state: {}", e);
                RetainedState::default()
            }
        }
    }

    /// Apply `f` to the record and write it back before returning
    pub fn update(
        &self,
        f: impl FnOnce(&mut RetainedState),
    ) -> Result<RetainedState, StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut state = self.read_unlocked();
        f(&mut state);
        let data = serde_json::to_vec(&state).map_err(|e| StorageError::WriteFailed {
            name: RETAINED_BLOB.to_string(),
            reason: e.to_string(),
        })?;
        self.storage.write(RETAINED_BLOB, &data)?;
        Ok(state)
    }

    pub fn set_layout_index(&self, index: usize) -> Result<(), StorageError> {
        self.update(|state| state.layout_index = index).map(|_| ())
    }

    /// Flip the boot mode, returning the mode the next boot will use
    pub fn toggle_boot_mode(&self) -> Result<BootMode, StorageError> {
        self.update(|state| state.boot_mode = state.boot_mode.toggled())
            .map(|state| state.boot_mode)
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.storage.remove(RETAINED_BLOB)
    }
}

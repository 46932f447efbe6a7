//! Configuration Store: named JSON documents with size and nesting budgets

pub mod documents;
pub mod retained;
pub mod storage;

use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{ConfigError, ConfigResult, StorageError};

pub use documents::{LayerConfig, MacroConfig, MacroKind, SystemConfig};
pub use retained::{BootMode, RetainedState, RetainedStore};
pub use storage::{FileStorage, MemoryStorage, Storage};

/// The documents the store knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    KeyConfig,
    Macros,
    System,
}

impl DocumentKind {
    pub fn name(self) -> &'static str {
        match self {
            DocumentKind::KeyConfig => "keyconfig",
            DocumentKind::Macros => "macros",
            DocumentKind::System => "system",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keyconfig" => Ok(DocumentKind::KeyConfig),
            "macros" => Ok(DocumentKind::Macros),
            "system" => Ok(DocumentKind::System),
            other => Err(format!("unknown document type '{}'", other)),
        }
    }
}

/// A validated document
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedConfig {
    Layers(Vec<LayerConfig>),
    Macros(Vec<MacroConfig>),
    System(SystemConfig),
}

impl ParsedConfig {
    pub fn kind(&self) -> DocumentKind {
        match self {
            ParsedConfig::Layers(_) => DocumentKind::KeyConfig,
            ParsedConfig::Macros(_) => DocumentKind::Macros,
            ParsedConfig::System(_) => DocumentKind::System,
        }
    }
}

/// Budgets and shape constraints applied to every document
#[derive(Debug, Clone, Copy)]
pub struct DocumentLimits {
    pub max_bytes: usize,
    pub max_depth: usize,
    pub rows: usize,
    pub cols: usize,
}

impl DocumentLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_bytes: config.storage.max_document_bytes,
            max_depth: config.storage.max_nesting_depth,
            rows: config.matrix.rows,
            cols: config.matrix.cols,
        }
    }
}

/// Byte usage of the storage, for the storage listing endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct StorageUsage {
    pub files: Vec<(String, u64)>,
    pub used_bytes: u64,
}

/// Loads, validates and saves the configuration documents
#[derive(Clone)]
pub struct ConfigStore {
    storage: Arc<dyn Storage>,
    limits: DocumentLimits,
}

impl ConfigStore {
    pub fn new(storage: Arc<dyn Storage>, limits: DocumentLimits) -> Self {
        Self { storage, limits }
    }

    pub fn limits(&self) -> DocumentLimits {
        self.limits
    }

    pub fn storage(&self) -> Arc<dyn Storage> {
        self.storage.clone()
    }

    /// Load and validate a stored document
    pub fn load_document(&self, kind: DocumentKind) -> ConfigResult<ParsedConfig> {
        let data = self
            .storage
            .read(kind.name())?
            .ok_or_else(|| ConfigError::NotFound(kind.name().to_string()))?;
        self.parse(kind, &data)
    }

    pub fn load_layers(&self) -> ConfigResult<Vec<LayerConfig>> {
        match self.load_document(DocumentKind::KeyConfig)? {
            ParsedConfig::Layers(layers) => Ok(layers),
            other => Err(mismatch(DocumentKind::KeyConfig, &other)),
        }
    }

    pub fn load_macros(&self) -> ConfigResult<Vec<MacroConfig>> {
        match self.load_document(DocumentKind::Macros)? {
            ParsedConfig::Macros(macros) => Ok(macros),
            other => Err(mismatch(DocumentKind::Macros, &other)),
        }
    }

    /// The system document, or an empty one when none was saved yet
    pub fn load_system(&self) -> ConfigResult<SystemConfig> {
        match self.load_document(DocumentKind::System) {
            Ok(ParsedConfig::System(system)) => Ok(system),
            Ok(other) => Err(mismatch(DocumentKind::System, &other)),
            Err(ConfigError::NotFound(_)) => Ok(SystemConfig::default()),
            Err(e) => Err(e),
        }
    }

    /// Validate and persist a document. Over-budget documents are rejected before any write.
    pub fn save_document(&self, document: &ParsedConfig) -> ConfigResult<()> {
        let kind = document.kind();
        let data = match document {
            ParsedConfig::Layers(layers) => serde_json::to_vec(layers),
            ParsedConfig::Macros(macros) => serde_json::to_vec(macros),
            ParsedConfig::System(system) => serde_json::to_vec(system),
        }
        .map_err(|e| ConfigError::Invalid {
            document: kind.name().to_string(),
            reason: e.to_string(),
        })?;

        // Same checks a load would apply, so a saved document always loads back
        self.parse(kind, &data)?;
        self.write(kind, &data)
    }

    /// Raw JSON of a stored document
    pub fn get_raw(&self, kind: DocumentKind) -> ConfigResult<Value> {
        let data = self
            .storage
            .read(kind.name())?
            .ok_or_else(|| ConfigError::NotFound(kind.name().to_string()))?;
        serde_json::from_slice(&data).map_err(|e| ConfigError::Parse {
            document: kind.name().to_string(),
            reason: e.to_string(),
        })
    }

    /// Replace a document with an uploaded body
    pub fn put_raw(&self, kind: DocumentKind, body: &str) -> ConfigResult<()> {
        self.parse(kind, body.as_bytes())?;
        self.write(kind, body.as_bytes())?;
        info!("Stored new {} document ({} bytes)", kind, body.len());
        Ok(())
    }

    /// Write default documents for any that are missing. Returns true if anything was written.
    pub fn ensure_defaults(&self) -> ConfigResult<bool> {
        let mut wrote = false;
        if self.storage.read(DocumentKind::KeyConfig.name())?.is_none() {
            self.save_document(&self.default_layers())?;
            wrote = true;
        }
        if self.storage.read(DocumentKind::Macros.name())?.is_none() {
            self.save_document(&ParsedConfig::Macros(Vec::new()))?;
            wrote = true;
        }
        Ok(wrote)
    }

    /// Overwrite the key and macro documents with defaults and forget network settings
    pub fn reset_to_defaults(&self) -> ConfigResult<()> {
        self.save_document(&self.default_layers())?;
        self.save_document(&ParsedConfig::Macros(Vec::new()))?;
        self.storage.remove(DocumentKind::System.name())?;
        info!("Configuration reset to defaults");
        Ok(())
    }

    pub fn usage(&self) -> Result<StorageUsage, StorageError> {
        let files = self.storage.list()?;
        let used_bytes = files.iter().map(|(_, size)| size).sum();
        Ok(StorageUsage { files, used_bytes })
    }

    fn default_layers(&self) -> ParsedConfig {
        ParsedConfig::Layers(vec![LayerConfig::empty(
            "Default",
            self.limits.rows,
            self.limits.cols,
        )])
    }

    fn write(&self, kind: DocumentKind, data: &[u8]) -> ConfigResult<()> {
        self.check_size(kind, data.len())?;
        self.storage.write(kind.name(), data)?;
        debug!("Wrote {} ({} bytes)", kind, data.len());
        Ok(())
    }

    fn check_size(&self, kind: DocumentKind, size: usize) -> ConfigResult<()> {
        if size > self.limits.max_bytes {
            return Err(ConfigError::TooLarge {
                document: kind.name().to_string(),
                size,
                limit: self.limits.max_bytes,
            });
        }
        Ok(())
    }

    /// Size check, JSON parse, nesting check, typed decode, shape validation
    pub fn parse(&self, kind: DocumentKind, data: &[u8]) -> ConfigResult<ParsedConfig> {
        self.check_size(kind, data.len())?;

        let document = kind.name().to_string();
        let parse_err = |reason: String| ConfigError::Parse {
            document: document.clone(),
            reason,
        };

        let value: Value = serde_json::from_slice(data).map_err(|e| parse_err(e.to_string()))?;
        let depth = nesting_depth(&value);
        if depth > self.limits.max_depth {
            return Err(parse_err(format!(
                "nesting depth {} exceeds limit {}",
                depth, self.limits.max_depth
            )));
        }

        let invalid = |reason: String| ConfigError::Invalid {
            document: document.clone(),
            reason,
        };

        match kind {
            DocumentKind::KeyConfig => {
                let layers: Vec<LayerConfig> =
                    serde_json::from_value(value).map_err(|e| parse_err(e.to_string()))?;
                if layers.is_empty() {
                    return Err(invalid("at least one layer is required".to_string()));
                }
                for layer in &layers {
                    layer
                        .validate(self.limits.rows, self.limits.cols)
                        .map_err(invalid)?;
                }
                Ok(ParsedConfig::Layers(layers))
            }
            DocumentKind::Macros => {
                let macros: Vec<MacroConfig> =
                    serde_json::from_value(value).map_err(|e| parse_err(e.to_string()))?;
                documents::validate_macros(&macros).map_err(invalid)?;
                Ok(ParsedConfig::Macros(macros))
            }
            DocumentKind::System => {
                let system: SystemConfig =
                    serde_json::from_value(value).map_err(|e| parse_err(e.to_string()))?;
                Ok(ParsedConfig::System(system))
            }
        }
    }
}

fn mismatch(expected: DocumentKind, got: &ParsedConfig) -> ConfigError {
    ConfigError::Invalid {
        document: expected.name().to_string(),
        reason: format!("decoded as {}", got.kind()),
    }
}

/// Containers count one level each; scalars count zero
fn nesting_depth(value: &Value) -> usize {
    match value {
        Value::Array(items) => 1 + items.iter().map(nesting_depth).max().unwrap_or(0),
        Value::Object(map) => 1 + map.values().map(nesting_depth).max().unwrap_or(0),
        _ => 0,
    }
}

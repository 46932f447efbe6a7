use thiserror::Error;

/// Failures of the persistent blob storage
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage unavailable at {path}: {source}")]
    Unavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read '{name}': {source}")]
    ReadFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write '{name}': {reason}")]
    WriteFailed { name: String, reason: String },
}

/// Failures loading, validating or saving a configuration document.
///
/// None of these are fatal to the scan loop: the previously published
/// layout stays active.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("document '{0}' not found")]
    NotFound(String),

    #[error("document '{document}' is {size} bytes, over the {limit} byte budget")]
    TooLarge {
        document: String,
        size: usize,
        limit: usize,
    },

    #[error("failed to parse '{document}': {reason}")]
    Parse { document: String, reason: String },

    #[error("invalid '{document}': {reason}")]
    Invalid { document: String, reason: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ConfigError {
    /// Short status string for API clients
    pub fn status(&self) -> &'static str {
        match self {
            ConfigError::NotFound(_) => "not found",
            ConfigError::TooLarge { .. } => "overflowed",
            ConfigError::Parse { .. } => "parse error",
            ConfigError::Invalid { .. } => "invalid document",
            ConfigError::Storage(StorageError::WriteFailed { .. }) => "failed to write file",
            ConfigError::Storage(_) => "failed to open file",
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

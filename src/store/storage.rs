//! Named blob storage backing the configuration documents

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::StorageError;

/// Persistent storage of named byte blobs
pub trait Storage: Send + Sync {
    /// Read a blob, `Ok(None)` if it does not exist
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError>;
    /// Replace a blob. Returns only after the data is durable.
    fn write(&self, name: &str, data: &[u8]) -> Result<(), StorageError>;
    fn remove(&self, name: &str) -> Result<(), StorageError>;
    /// All blobs with their sizes in bytes
    fn list(&self) -> Result<Vec<(String, u64)>, StorageError>;
}

/// A directory of `<name>.json` files
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open (creating if needed) the storage directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StorageError::Unavailable {
            path: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }
}

impl Storage for FileStorage {
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(self.path_for(name)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::ReadFailed {
                name: name.to_string(),
                source,
            }),
        }
    }

    fn write(&self, name: &str, data: &[u8]) -> Result<(), StorageError> {
        let write_failed = |e: std::io::Error| StorageError::WriteFailed {
            name: name.to_string(),
            reason: e.to_string(),
        };

        // Sibling temp file, then rename over the target
        let target = self.path_for(name);
        let tmp = self.dir.join(format!(".{}.json.tmp", name));
        {
            use std::io::Write;
            let mut file = fs::File::create(&tmp).map_err(write_failed)?;
            file.write_all(data).map_err(write_failed)?;
            file.sync_all().map_err(write_failed)?;
        }
        fs::rename(&tmp, &target).map_err(write_failed)
    }

    fn remove(&self, name: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::WriteFailed {
                name: name.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn list(&self) -> Result<Vec<(String, u64)>, StorageError> {
        let read_failed = |source| StorageError::ReadFailed {
            name: self.dir.display().to_string(),
            source,
        };

        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(read_failed)? {
            let entry = entry.map_err(read_failed)?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem.starts_with('.') {
                continue;
            }
            let size = entry.metadata().map_err(read_failed)?.len();
            entries.push((stem.to_string(), size));
        }
        entries.sort();
        Ok(entries)
    }
}

/// In-memory storage, used by tests and by `--validate`
#[derive(Default)]
pub struct MemoryStorage {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn blobs(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.blobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Storage for MemoryStorage {
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.blobs().get(name).cloned())
    }

    fn write(&self, name: &str, data: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteFailed {
                name: name.to_string(),
                reason: "storage is read-only".to_string(),
            });
        }
        self.blobs().insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), StorageError> {
        self.blobs().remove(name);
        Ok(())
    }

    fn list(&self) -> Result<Vec<(String, u64)>, StorageError> {
        Ok(self
            .blobs()
            .iter()
            .map(|(name, data)| (name.clone(), data.len() as u64))
            .collect())
    }
}

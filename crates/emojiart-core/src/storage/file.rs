//! File-based storage implementation.

use super::{BoxFuture, Storage, StorageError, StorageResult};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::fs;
use std::path::{Path, PathBuf};

/// Key bytes percent-encoded in file names: everything outside `[A-Za-z0-9_-]`.
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_');

/// Stores each key as a `<percent-encoded key>.json` file in one directory.
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    /// Create a new file storage with the given base directory.
    ///
    /// Creates the directory if it doesn't exist.
    pub fn new(base_path: PathBuf) -> StorageResult<Self> {
        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(|e| {
                StorageError::Io(format!("Failed to create storage directory: {}", e))
            })?;
        }
        Ok(Self { base_path })
    }

    /// Create file storage in the default location.
    ///
    /// On Unix: `~/.local/share/emojiart/documents/`
    /// On Windows: `%LOCALAPPDATA%\emojiart\documents\`
    pub fn default_location() -> StorageResult<Self> {
        Self::new(default_storage_dir()?)
    }

    fn key_path(&self, key: &str) -> PathBuf {
        // Percent-encoding keeps distinct keys distinct and out of parent dirs.
        let safe = utf8_percent_encode(key, KEY_ENCODE_SET);
        self.base_path.join(format!("{}.json", safe))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

/// Platform data directory used when no storage directory is configured.
pub fn default_storage_dir() -> StorageResult<PathBuf> {
    let base = dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| StorageError::Io("Could not determine home directory".to_string()))?;
    Ok(base.join("emojiart").join("documents"))
}

impl Storage for FileStorage {
    fn save(&self, key: &str, bytes: Vec<u8>) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.key_path(key);
        Box::pin(async move {
            fs::write(&path, bytes).map_err(|e| {
                StorageError::Io(format!("Failed to write {}: {}", path.display(), e))
            })
        })
    }

    fn load(&self, key: &str) -> BoxFuture<'_, StorageResult<Vec<u8>>> {
        let path = self.key_path(key);
        let key = key.to_string();
        Box::pin(async move {
            if !path.exists() {
                return Err(StorageError::NotFound(key));
            }
            fs::read(&path).map_err(|e| {
                StorageError::Io(format!("Failed to read {}: {}", path.display(), e))
            })
        })
    }

    fn delete(&self, key: &str) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.key_path(key);
        Box::pin(async move {
            if path.exists() {
                fs::remove_file(&path).map_err(|e| {
                    StorageError::Io(format!("Failed to delete {}: {}", path.display(), e))
                })?;
            }
            Ok(())
        })
    }
}

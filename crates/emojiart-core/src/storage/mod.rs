//! Storage abstraction for persistence.
//!
//! The document layer only sees raw encoded bytes keyed by document id; the
//! backend decides where they live.

mod autosave;
mod file;
mod memory;

pub use autosave::AutoSaver;
pub use file::{FileStorage, default_storage_dir};
pub use memory::MemoryStorage;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Document not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed future for async storage operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Shared handle to a storage backend.
pub type SharedStorage = Arc<dyn Storage>;

/// Persistence port for encoded documents.
///
/// Implementations can store bytes in memory, on the filesystem, or in any
/// key-value service. Saves overwrite prior state for the key.
pub trait Storage: Send + Sync {
    /// Save bytes under a key.
    fn save(&self, key: &str, bytes: Vec<u8>) -> BoxFuture<'_, StorageResult<()>>;

    /// Load the bytes stored under a key.
    fn load(&self, key: &str) -> BoxFuture<'_, StorageResult<Vec<u8>>>;

    /// Delete a key. Missing keys are not an error.
    fn delete(&self, key: &str) -> BoxFuture<'_, StorageResult<()>>;
}

/// Load bytes, mapping `NotFound` to `None`.
pub fn load_optional(storage: &dyn Storage, key: &str) -> StorageResult<Option<Vec<u8>>> {
    match pollster::block_on(storage.load(key)) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(StorageError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

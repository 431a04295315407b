//! Write-behind persistence.
//!
//! Every model mutation hands the full encoded state to the [`AutoSaver`],
//! which writes it on a background thread without blocking the caller.
//! Jobs run in submission order, so the last write for a key wins.

use super::{SharedStorage, StorageResult};
use std::sync::mpsc::{Sender, channel};
use std::thread::{self, JoinHandle};

enum Job {
    Save { key: String, bytes: Vec<u8> },
    Delete { key: String },
    Flush(Sender<()>),
}

/// Fire-and-forget writer in front of a storage backend.
pub struct AutoSaver {
    storage: SharedStorage,
    jobs: Option<Sender<Job>>,
    thread: Option<JoinHandle<()>>,
}

impl AutoSaver {
    /// Start the writer thread for the given backend.
    pub fn new(storage: SharedStorage) -> Self {
        let (tx, rx) = channel::<Job>();
        let backend = storage.clone();
        let handle = thread::spawn(move || {
            for job in rx {
                match job {
                    Job::Save { key, bytes } => {
                        let len = bytes.len();
                        match pollster::block_on(backend.save(&key, bytes)) {
                            Ok(()) => log::debug!("Saved {} ({} bytes)", key, len),
                            Err(e) => log::error!("Failed to save {}: {}", key, e),
                        }
                    }
                    Job::Delete { key } => {
                        if let Err(e) = pollster::block_on(backend.delete(&key)) {
                            log::error!("Failed to delete {}: {}", key, e);
                        }
                    }
                    Job::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            log::debug!("Autosave thread exiting");
        });
        Self {
            storage,
            jobs: Some(tx),
            thread: Some(handle),
        }
    }

    fn submit(&self, job: Job) {
        let sent = self.jobs.as_ref().map(|tx| tx.send(job).is_ok()).unwrap_or(false);
        if !sent {
            log::error!("Autosave thread is gone; dropping write");
        }
    }

    /// Queue a write of `bytes` under `key`.
    pub fn save(&self, key: &str, bytes: Vec<u8>) {
        self.submit(Job::Save {
            key: key.to_string(),
            bytes,
        });
    }

    /// Queue removal of `key`.
    pub fn delete(&self, key: &str) {
        self.submit(Job::Delete { key: key.to_string() });
    }

    /// Block until every job queued so far has been written.
    pub fn flush(&self) {
        let (tx, rx) = channel();
        self.submit(Job::Flush(tx));
        let _ = rx.recv();
    }

    /// Load synchronously from the backend, bypassing the queue.
    ///
    /// Call [`AutoSaver::flush`] first if pending writes must be visible.
    pub fn load(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        super::load_optional(self.storage.as_ref(), key)
    }

    /// Get a reference to the storage backend.
    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }
}

impl Drop for AutoSaver {
    fn drop(&mut self) {
        // Closing the channel lets the thread drain remaining jobs and exit.
        self.jobs.take();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

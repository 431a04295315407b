//! Named collection of documents sharing one storage backend.

use crate::background::{ImageCrateDecoder, ImageDecoder, ImageFetcher, SchemeFetcher};
use crate::config::EditorConfig;
use crate::document::{DocumentServices, EmojiArtDocument, palettes_key};
use crate::storage::{AutoSaver, FileStorage, SharedStorage, StorageResult};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

/// Name given to documents created without one.
pub const UNTITLED: &str = "Untitled";

/// Errors from store operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    DocumentNotFound(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Handle to a document in a [`DocumentStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentRef(String);

impl DocumentRef {
    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Storage key holding a store's id -> name index.
pub fn store_index_key(store_name: &str) -> String {
    format!("__store__{}", store_name)
}

/// Open documents keyed by id, each with a unique display name.
pub struct DocumentStore {
    name: String,
    services: DocumentServices,
    names: BTreeMap<String, String>,
    documents: HashMap<String, EmojiArtDocument>,
}

impl DocumentStore {
    /// Restore a store and reopen every document in its index.
    ///
    /// A missing or malformed index yields an empty store.
    pub fn open(
        name: &str,
        storage: SharedStorage,
        fetcher: Arc<dyn ImageFetcher>,
        decoder: Arc<dyn ImageDecoder>,
        config: EditorConfig,
    ) -> Self {
        let services = DocumentServices {
            saver: Arc::new(AutoSaver::new(storage)),
            fetcher,
            decoder,
            config,
        };

        let names: BTreeMap<String, String> = match services.saver.load(&store_index_key(name)) {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                log::warn!("Index for store {} is malformed ({}); starting empty", name, e);
                BTreeMap::new()
            }),
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                log::warn!("Failed to load index for store {}: {}", name, e);
                BTreeMap::new()
            }
        };

        let documents = names
            .keys()
            .map(|id| (id.clone(), EmojiArtDocument::open(id, services.clone())))
            .collect();

        log::info!("Opened store {} with {} documents", name, names.len());

        Self {
            name: name.to_string(),
            services,
            names,
            documents,
        }
    }

    /// Open a store backed by files, fetching backgrounds over any
    /// supported scheme.
    ///
    /// Files live in `config.storage_dir`, or the platform data directory
    /// when unset.
    pub fn open_on_disk(name: &str, config: EditorConfig) -> StorageResult<Self> {
        let storage = match &config.storage_dir {
            Some(dir) => FileStorage::new(dir.clone())?,
            None => FileStorage::default_location()?,
        };
        Ok(Self::open(
            name,
            Arc::new(storage),
            Arc::new(SchemeFetcher::default()),
            Arc::new(ImageCrateDecoder),
            config,
        ))
    }

    pub fn store_name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// All documents, sorted by name then id.
    pub fn list_documents(&self) -> Vec<DocumentRef> {
        let mut entries: Vec<(&String, &String)> = self.names.iter().collect();
        entries.sort_by(|(a_id, a_name), (b_id, b_name)| {
            a_name.cmp(b_name).then_with(|| a_id.cmp(b_id))
        });
        entries
            .into_iter()
            .map(|(id, _)| DocumentRef(id.clone()))
            .collect()
    }

    /// Create an empty document. The name is made unique within the store.
    pub fn create_document(&mut self, name: Option<&str>) -> DocumentRef {
        let document = EmojiArtDocument::new(self.services.clone());
        let id = document.id().to_string();
        let name = self.unique_name(name.unwrap_or(UNTITLED), None);
        log::info!("Created document {} ({})", name, id);

        self.names.insert(id.clone(), name);
        self.documents.insert(id.clone(), document);
        self.save_index();
        DocumentRef(id)
    }

    pub fn name(&self, document: &DocumentRef) -> Option<&str> {
        self.names.get(document.id()).map(String::as_str)
    }

    /// Rename a document. Returns the name actually given, which may carry a
    /// numeric suffix if `name` is taken by another document.
    pub fn rename(&mut self, document: &DocumentRef, name: &str) -> StoreResult<String> {
        if !self.names.contains_key(document.id()) {
            return Err(StoreError::DocumentNotFound(document.id().to_string()));
        }
        let name = self.unique_name(name, Some(document.id()));
        log::info!("Renamed document {} to {}", document.id(), name);
        self.names.insert(document.id().to_string(), name.clone());
        self.save_index();
        Ok(name)
    }

    /// Close a document and remove everything persisted for it.
    pub fn delete(&mut self, document: &DocumentRef) -> StoreResult<()> {
        let id = document.id();
        let Some(name) = self.names.remove(id) else {
            return Err(StoreError::DocumentNotFound(id.to_string()));
        };
        self.documents.remove(id);
        self.services.saver.delete(id);
        self.services.saver.delete(&palettes_key(id));
        self.save_index();
        log::info!("Deleted document {} ({})", name, id);
        Ok(())
    }

    pub fn document(&self, document: &DocumentRef) -> Option<&EmojiArtDocument> {
        self.documents.get(document.id())
    }

    pub fn document_mut(&mut self, document: &DocumentRef) -> Option<&mut EmojiArtDocument> {
        self.documents.get_mut(document.id())
    }

    /// Apply finished background fetches for every open document.
    ///
    /// Returns the number of documents whose background changed.
    pub fn pump(&mut self) -> usize {
        self.documents
            .values_mut()
            .map(|d| d.poll_background())
            .filter(|changed| *changed)
            .count()
    }

    /// Block until every pending write has reached storage.
    pub fn flush(&self) {
        self.services.saver.flush();
    }

    fn unique_name(&self, wanted: &str, owner: Option<&str>) -> String {
        let wanted = wanted.trim();
        let wanted = if wanted.is_empty() { UNTITLED } else { wanted };
        let taken = |candidate: &str| {
            self.names
                .iter()
                .any(|(id, name)| Some(id.as_str()) != owner && name == candidate)
        };
        if !taken(wanted) {
            return wanted.to_string();
        }
        (2..)
            .map(|n| format!("{} {}", wanted, n))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| wanted.to_string())
    }

    fn save_index(&self) {
        match serde_json::to_vec(&self.names) {
            Ok(bytes) => self.services.saver.save(&store_index_key(&self.name), bytes),
            Err(e) => log::error!("Failed to encode index for store {}: {}", self.name, e),
        }
    }
}

//! EmojiArt Core Library
//!
//! Platform-agnostic document model, editing intents and view logic for
//! EmojiArt: emojis placed over a background image fetched from a URL.

pub mod background;
pub mod config;
pub mod document;
pub mod geometry;
pub mod model;
pub mod palette;
pub mod session;
pub mod storage;
pub mod store;

pub use background::{
    BackgroundState, CompletionOutcome, DecodedImage, FetchError, ImageCrateDecoder, ImageDecoder,
    ImageFetcher, SchemeFetcher,
};
pub use config::{ConfigError, EditorConfig};
pub use document::{DocumentEvent, DocumentServices, EmojiArtDocument, SubscriptionId};
pub use geometry::ViewTransform;
pub use model::{Emoji, EmojiArt, EmojiId, ModelError};
pub use palette::PaletteSet;
pub use session::{DropPayload, Scene, Session};
pub use storage::{AutoSaver, FileStorage, MemoryStorage, Storage, StorageError};
pub use store::{DocumentRef, DocumentStore, StoreError};

//! Document intent layer.
//!
//! [`EmojiArtDocument`] owns one [`EmojiArt`] value. Every mutation goes
//! through an intent method here, which persists the full encoding through
//! the [`AutoSaver`] and notifies subscribers.

use crate::background::{
    BackgroundLoader, BackgroundState, CompletionOutcome, DecodedImage, FetchError, ImageDecoder,
    ImageFetcher,
};
use crate::config::EditorConfig;
use crate::model::{EmojiArt, EmojiId, ModelResult};
use crate::palette::PaletteSet;
use crate::storage::AutoSaver;
use kurbo::{Point, Vec2};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

/// Change notifications published by a document.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentEvent {
    /// Emojis or the background URL changed.
    ModelChanged,
    /// A background fetch started; any previous image is gone.
    BackgroundLoading { url: Url },
    /// The background image for `url` is available.
    BackgroundLoaded { url: Url, image: DecodedImage },
    /// There is no background image (no URL, or the fetch failed).
    BackgroundCleared,
    PalettesChanged,
}

/// Handle returned by [`EmojiArtDocument::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&DocumentEvent)>;

/// Collaborators a document needs: persistence, fetching and decoding.
#[derive(Clone)]
pub struct DocumentServices {
    pub saver: Arc<AutoSaver>,
    pub fetcher: Arc<dyn ImageFetcher>,
    pub decoder: Arc<dyn ImageDecoder>,
    pub config: EditorConfig,
}

/// Storage key for a document's palettes.
pub fn palettes_key(document_id: &str) -> String {
    format!("{}_palettes", document_id)
}

/// Unwrap search-result links of the form `...?imgurl=<encoded url>`.
pub fn normalize_image_url(url: Url) -> Url {
    let inner = url
        .query_pairs()
        .find(|(key, _)| key == "imgurl")
        .and_then(|(_, value)| Url::parse(&value).ok());
    inner.unwrap_or(url)
}

/// One open EmojiArt document.
pub struct EmojiArtDocument {
    id: String,
    emoji_art: EmojiArt,
    palettes: PaletteSet,
    background: BackgroundLoader,
    services: DocumentServices,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
}

impl EmojiArtDocument {
    /// Create a document with a fresh id and nothing persisted yet.
    pub fn new(services: DocumentServices) -> Self {
        Self::open(&Uuid::new_v4().to_string(), services)
    }

    /// Restore a document from storage.
    ///
    /// Missing or malformed state yields an empty document; neither is an
    /// error for the caller. A stored background URL starts fetching.
    pub fn open(id: &str, services: DocumentServices) -> Self {
        let emoji_art = match services.saver.load(id) {
            Ok(Some(bytes)) => EmojiArt::decode(&bytes).unwrap_or_else(|e| {
                log::warn!("Document {} could not be restored ({}); starting empty", id, e);
                EmojiArt::new()
            }),
            Ok(None) => EmojiArt::new(),
            Err(e) => {
                log::warn!("Failed to load document {}: {}", id, e);
                EmojiArt::new()
            }
        };

        let palettes = match services.saver.load(&palettes_key(id)) {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                log::warn!("Palettes for {} are malformed ({}); reseeding", id, e);
                PaletteSet::seeded(&services.config.default_palette)
            }),
            _ => PaletteSet::seeded(&services.config.default_palette),
        };

        log::info!("Opened document {} with {} emojis", id, emoji_art.len());

        let mut background =
            BackgroundLoader::new(services.fetcher.clone(), services.decoder.clone());
        background.load(emoji_art.background_url().cloned());

        Self {
            id: id.to_string(),
            emoji_art,
            palettes,
            background,
            services,
            subscribers: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn emoji_art(&self) -> &EmojiArt {
        &self.emoji_art
    }

    pub fn config(&self) -> &EditorConfig {
        &self.services.config
    }

    pub fn encode(&self) -> ModelResult<Vec<u8>> {
        self.emoji_art.encode()
    }

    // Subscriptions

    /// Register a callback for every [`DocumentEvent`].
    pub fn subscribe(&mut self, callback: impl FnMut(&DocumentEvent) + 'static) -> SubscriptionId {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub, _)| *sub != id);
        self.subscribers.len() != before
    }

    fn notify(&mut self, event: DocumentEvent) {
        for (_, callback) in self.subscribers.iter_mut() {
            callback(&event);
        }
    }

    fn persist(&self) {
        match self.emoji_art.encode() {
            Ok(bytes) => self.services.saver.save(&self.id, bytes),
            Err(e) => log::error!("Failed to encode document {}: {}", self.id, e),
        }
    }

    fn model_changed(&mut self) {
        self.persist();
        self.notify(DocumentEvent::ModelChanged);
    }

    // Intents

    /// Add an emoji at a document-space location.
    ///
    /// Coordinates and size are truncated to integers. Returns `None` if the
    /// model rejects the emoji (empty text or non-positive size).
    pub fn add_emoji(&mut self, text: &str, location: Point, size: f64) -> Option<EmojiId> {
        match self
            .emoji_art
            .add_emoji(text, location.x as i64, location.y as i64, size as i64)
        {
            Ok(emoji) => {
                self.model_changed();
                Some(emoji.id())
            }
            Err(e) => {
                log::warn!("Rejected emoji {:?}: {}", text, e);
                None
            }
        }
    }

    /// Move an emoji by a document-space offset, saturating at the integer
    /// range. Unknown ids are ignored.
    pub fn move_emoji(&mut self, id: EmojiId, offset: Vec2) -> bool {
        let Some(emoji) = self.emoji_art.emoji_mut(id) else {
            return false;
        };
        emoji.x = emoji.x.saturating_add(offset.x as i64);
        emoji.y = emoji.y.saturating_add(offset.y as i64);
        self.model_changed();
        true
    }

    /// Scale an emoji's size, rounding half to even.
    ///
    /// The result never drops below the configured minimum size. Unknown ids
    /// and non-finite factors are ignored.
    pub fn scale_emoji(&mut self, id: EmojiId, factor: f64) -> bool {
        if !factor.is_finite() {
            return false;
        }
        let min_size = self.services.config.min_emoji_size.max(1);
        let Some(emoji) = self.emoji_art.emoji_mut(id) else {
            return false;
        };
        let scaled = (emoji.size as f64 * factor).round_ties_even() as i64;
        emoji.size = scaled.max(min_size);
        self.model_changed();
        true
    }

    /// Delete an emoji. Unknown ids are ignored.
    pub fn delete_emoji(&mut self, id: EmojiId) -> bool {
        if self.emoji_art.delete_emoji(id).is_none() {
            return false;
        }
        self.model_changed();
        true
    }

    /// Replace the background URL and start fetching it.
    ///
    /// The cached image is dropped immediately, even if the URL is unchanged.
    pub fn set_background_url(&mut self, url: Option<Url>) {
        let url = url.map(normalize_image_url);
        self.emoji_art.set_background(url.clone());
        self.model_changed();

        self.background.load(url.clone());
        match url {
            Some(url) => self.notify(DocumentEvent::BackgroundLoading { url }),
            None => self.notify(DocumentEvent::BackgroundCleared),
        }
    }

    pub fn background_url(&self) -> Option<&Url> {
        self.emoji_art.background_url()
    }

    // Background image

    pub fn background_state(&self) -> &BackgroundState {
        self.background.state()
    }

    pub fn background_image(&self) -> Option<&DecodedImage> {
        self.background.state().image()
    }

    /// Why the background is empty, if its fetch failed.
    pub fn background_error(&self) -> Option<&FetchError> {
        self.background.last_error()
    }

    /// True while a background fetch for the current URL is in flight.
    pub fn is_loading(&self) -> bool {
        self.background.state().is_loading()
    }

    fn background_changed(&mut self) {
        let event = match self.background.state() {
            BackgroundState::Loaded { url, image } => DocumentEvent::BackgroundLoaded {
                url: url.clone(),
                image: *image,
            },
            BackgroundState::Loading(url) => DocumentEvent::BackgroundLoading { url: url.clone() },
            BackgroundState::Empty => DocumentEvent::BackgroundCleared,
        };
        self.notify(event);
    }

    /// Apply finished background fetches. Call from the owning thread.
    ///
    /// Returns `true` if the background state changed.
    pub fn poll_background(&mut self) -> bool {
        let changed = self.background.poll();
        if changed {
            self.background_changed();
        }
        changed
    }

    /// Block until the next fetch completion arrives, then apply it.
    pub fn wait_for_completion(&mut self, timeout: Duration) -> Option<CompletionOutcome> {
        let outcome = self.background.wait(timeout);
        if outcome == Some(CompletionOutcome::Applied) {
            self.background_changed();
        }
        outcome
    }

    /// Block until the current background resolves to loaded or empty.
    pub fn wait_for_background(&mut self, timeout: Duration) -> bool {
        let changed = self.background.wait_settled(timeout);
        if changed {
            self.background_changed();
        }
        changed
    }

    // Palettes

    pub fn palettes(&self) -> &PaletteSet {
        &self.palettes
    }

    fn persist_palettes(&mut self) {
        match serde_json::to_vec(&self.palettes) {
            Ok(bytes) => self.services.saver.save(&palettes_key(&self.id), bytes),
            Err(e) => log::error!("Failed to encode palettes for {}: {}", self.id, e),
        }
        self.notify(DocumentEvent::PalettesChanged);
    }

    /// Add emoji characters to a palette; returns the updated palette.
    pub fn add_emoji_to_palette(&mut self, emoji: &str, palette: &str) -> String {
        let updated = self.palettes.add_emoji(emoji, palette);
        self.persist_palettes();
        updated
    }

    pub fn rename_palette(&mut self, palette: &str, name: &str) -> bool {
        let renamed = self.palettes.rename(palette, name);
        if renamed {
            self.persist_palettes();
        }
        renamed
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::background::testing::png_bytes;
    use crate::model::EmojiArt;
    use std::cell::RefCell;
    use std::rc::Rc;

    const WAIT: Duration = Duration::from_secs(5);

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn reopen(doc: &EmojiArtDocument) -> EmojiArtDocument {
        doc.services.saver.flush();
        EmojiArtDocument::open(doc.id(), doc.services.clone())
    }

    #[test]
    fn test_add_scale_move_scenario() {
        let (_, services) = gated_services();
        let mut doc = EmojiArtDocument::new(services);

        let id = doc.add_emoji("🌎", Point::ZERO, 40.0).unwrap();
        assert_eq!(id, EmojiId(1));
        let emoji = doc.emoji_art().emoji(id).unwrap();
        assert_eq!((emoji.x, emoji.y, emoji.size), (0, 0, 40));

        assert!(doc.scale_emoji(id, 2.0));
        assert_eq!(doc.emoji_art().emoji(id).unwrap().size, 80);

        assert!(doc.move_emoji(id, Vec2::new(10.0, -5.0)));
        let emoji = doc.emoji_art().emoji(id).unwrap();
        assert_eq!((emoji.x, emoji.y), (10, -5));
    }

    #[test]
    fn test_add_truncates_location() {
        let (_, services) = gated_services();
        let mut doc = EmojiArtDocument::new(services);
        let id = doc.add_emoji("a", Point::new(10.9, -3.7), 40.6).unwrap();
        let emoji = doc.emoji_art().emoji(id).unwrap();
        assert_eq!((emoji.x, emoji.y, emoji.size), (10, -3, 40));
        assert!(doc.add_emoji("", Point::ZERO, 40.0).is_none());
        assert!(doc.add_emoji("b", Point::ZERO, 0.4).is_none());
    }

    #[test]
    fn test_scale_rounds_half_to_even() {
        let (_, services) = gated_services();
        let mut doc = EmojiArtDocument::new(services);
        let a = doc.add_emoji("a", Point::ZERO, 5.0).unwrap();
        let b = doc.add_emoji("b", Point::ZERO, 7.0).unwrap();
        doc.scale_emoji(a, 0.5); // 2.5 -> 2
        doc.scale_emoji(b, 0.5); // 3.5 -> 4
        assert_eq!(doc.emoji_art().emoji(a).unwrap().size, 2);
        assert_eq!(doc.emoji_art().emoji(b).unwrap().size, 4);
    }

    #[test]
    fn test_scale_inverse_within_one() {
        let (_, services) = gated_services();
        let mut doc = EmojiArtDocument::new(services);
        for size in [3.0, 17.0, 40.0, 99.0, 250.0] {
            for factor in [1.5, 0.7, 2.0, 3.3, 0.9] {
                let id = doc.add_emoji("x", Point::ZERO, size).unwrap();
                doc.scale_emoji(id, factor);
                doc.scale_emoji(id, 1.0 / factor);
                let after = doc.emoji_art().emoji(id).unwrap().size;
                assert!((after - size as i64).abs() <= 1, "{size} * {factor}: {after}");
            }
        }
    }

    #[test]
    fn test_scale_clamps_to_minimum() {
        let (_, services) = gated_services();
        let mut doc = EmojiArtDocument::new(services);
        let id = doc.add_emoji("a", Point::ZERO, 3.0).unwrap();
        for _ in 0..10 {
            doc.scale_emoji(id, 0.1);
        }
        assert_eq!(doc.emoji_art().emoji(id).unwrap().size, 1);
        doc.scale_emoji(id, -4.0);
        assert_eq!(doc.emoji_art().emoji(id).unwrap().size, 1);
        assert!(!doc.scale_emoji(id, f64::NAN));
    }

    #[test]
    fn test_unknown_ids_are_noops() {
        let (_, services) = gated_services();
        let mut doc = EmojiArtDocument::new(services);
        doc.add_emoji("a", Point::ZERO, 40.0).unwrap();
        let before = doc.emoji_art().clone();
        assert!(!doc.move_emoji(EmojiId(42), Vec2::new(1.0, 1.0)));
        assert!(!doc.scale_emoji(EmojiId(42), 2.0));
        assert!(!doc.delete_emoji(EmojiId(42)));
        assert_eq!(doc.emoji_art(), &before);
    }

    #[test]
    fn test_mutations_persist_and_restore() {
        let (_, services) = gated_services();
        let mut doc = EmojiArtDocument::new(services);
        let a = doc.add_emoji("🌎", Point::new(1.0, 2.0), 40.0).unwrap();
        let b = doc.add_emoji("🌻", Point::new(-5.0, 6.0), 30.0).unwrap();
        doc.move_emoji(a, Vec2::new(3.0, 3.0));
        doc.delete_emoji(b);

        let restored = reopen(&doc);
        assert_eq!(restored.emoji_art(), doc.emoji_art());
        assert_eq!(restored.id(), doc.id());
    }

    #[test]
    fn test_malformed_state_restores_empty() {
        let (_, services) = gated_services();
        services.saver.save("broken", b"{not json".to_vec());
        services.saver.flush();
        let doc = EmojiArtDocument::open("broken", services);
        assert_eq!(doc.emoji_art(), &EmojiArt::new());
    }

    #[test]
    fn test_missing_state_restores_empty() {
        let (_, services) = gated_services();
        let doc = EmojiArtDocument::open("never-saved", services);
        assert!(doc.emoji_art().is_empty());
        assert_eq!(doc.background_state(), &BackgroundState::Empty);
    }

    #[test]
    fn test_background_race_keeps_latest() {
        let (fetcher, services) = gated_services();
        let mut doc = EmojiArtDocument::new(services);
        let release_a = fetcher.gate("https://img.test/a.png");
        let release_b = fetcher.gate("https://img.test/b.png");

        doc.set_background_url(Some(url("https://img.test/a.png")));
        doc.set_background_url(Some(url("https://img.test/b.png")));
        assert!(doc.is_loading());

        release_a.send(Ok(png_bytes(10, 10))).unwrap();
        assert_eq!(doc.wait_for_completion(WAIT), Some(CompletionOutcome::Discarded));
        assert!(doc.background_image().is_none());

        release_b.send(Ok(png_bytes(30, 20))).unwrap();
        assert!(doc.wait_for_background(WAIT));
        assert_eq!(doc.background_image(), Some(&DecodedImage::new(30, 20)));
        assert_eq!(doc.background_url(), Some(&url("https://img.test/b.png")));
    }

    #[test]
    fn test_setting_background_clears_image() {
        let (fetcher, services) = gated_services();
        let mut doc = EmojiArtDocument::new(services);
        fetcher.gate("https://img.test/a.png").send(Ok(png_bytes(4, 4))).unwrap();
        doc.set_background_url(Some(url("https://img.test/a.png")));
        doc.wait_for_background(WAIT);
        assert!(doc.background_image().is_some());

        let _pending = fetcher.gate("https://img.test/a.png");
        doc.set_background_url(Some(url("https://img.test/a.png")));
        assert!(doc.background_image().is_none());
        assert!(doc.is_loading());

        doc.set_background_url(None);
        assert_eq!(doc.background_state(), &BackgroundState::Empty);
        assert!(doc.background_url().is_none());
    }

    #[test]
    fn test_move_emoji_saturates() {
        let (_, services) = gated_services();
        let mut doc = EmojiArtDocument::new(services);
        let id = doc.add_emoji("🌎", Point::new(10.0, -10.0), 40.0).unwrap();

        assert!(doc.move_emoji(id, Vec2::new(f64::MAX, f64::MIN)));
        let emoji = doc.emoji_art().emoji(id).unwrap();
        assert_eq!((emoji.x, emoji.y), (i64::MAX, i64::MIN));

        assert!(doc.move_emoji(id, Vec2::new(1e300, -1e300)));
        let emoji = doc.emoji_art().emoji(id).unwrap();
        assert_eq!((emoji.x, emoji.y), (i64::MAX, i64::MIN));
    }

    #[test]
    fn test_background_fetch_failure_is_not_fatal() {
        // No gate registered, so the fetch fails straight away.
        let (_fetcher, services) = gated_services();
        let mut doc = EmojiArtDocument::new(services);
        doc.set_background_url(Some(url("https://img.test/missing.png")));
        assert!(doc.wait_for_background(WAIT));
        assert_eq!(doc.background_state(), &BackgroundState::Empty);
        assert!(!doc.is_loading());
        assert!(matches!(doc.background_error(), Some(FetchError::Io(_))));
    }

    #[test]
    fn test_restored_background_is_fetched() {
        let (fetcher, services) = gated_services();
        let mut doc = EmojiArtDocument::new(services);
        let _first = fetcher.gate("https://img.test/a.png");
        doc.set_background_url(Some(url("https://img.test/a.png")));

        fetcher.gate("https://img.test/a.png").send(Ok(png_bytes(6, 2))).unwrap();
        let mut restored = reopen(&doc);
        assert!(restored.is_loading());
        restored.wait_for_background(WAIT);
        assert_eq!(restored.background_image(), Some(&DecodedImage::new(6, 2)));
    }

    #[test]
    fn test_imgurl_is_unwrapped() {
        let wrapped = url(
            "https://www.google.com/imgres?imgurl=https%3A%2F%2Fimg.test%2Fcat.jpg&imgrefurl=x",
        );
        assert_eq!(normalize_image_url(wrapped), url("https://img.test/cat.jpg"));
        let plain = url("https://img.test/dog.jpg?size=large");
        assert_eq!(normalize_image_url(plain.clone()), plain);
    }

    #[test]
    fn test_subscribers_see_events() {
        let (fetcher, services) = gated_services();
        let mut doc = EmojiArtDocument::new(services);
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        let sub = doc.subscribe(move |e| sink.borrow_mut().push(e.clone()));

        doc.add_emoji("a", Point::ZERO, 40.0);
        fetcher.gate("https://img.test/a.png").send(Ok(png_bytes(2, 3))).unwrap();
        doc.set_background_url(Some(url("https://img.test/a.png")));
        doc.wait_for_background(WAIT);

        assert_eq!(
            *events.borrow(),
            vec![
                DocumentEvent::ModelChanged,
                DocumentEvent::ModelChanged,
                DocumentEvent::BackgroundLoading { url: url("https://img.test/a.png") },
                DocumentEvent::BackgroundLoaded {
                    url: url("https://img.test/a.png"),
                    image: DecodedImage::new(2, 3),
                },
            ]
        );

        assert!(doc.unsubscribe(sub));
        doc.add_emoji("b", Point::ZERO, 40.0);
        assert_eq!(events.borrow().len(), 4);
    }

    #[test]
    fn test_palettes_persist() {
        let (_, services) = gated_services();
        let mut doc = EmojiArtDocument::new(services);
        let default = doc.palettes().default_palette().to_string();
        let updated = doc.add_emoji_to_palette("🚀", &default);
        assert!(doc.rename_palette(&updated, "Space"));

        let restored = reopen(&doc);
        assert_eq!(restored.palettes().default_palette(), updated);
        assert_eq!(restored.palettes().name(&updated), Some("Space"));
    }
}

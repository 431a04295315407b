//! The EmojiArt value model: a background reference plus a flat list of
//! emoji stickers.

use kurbo::Point;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;
use url::Url;

/// Model errors.
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("Malformed document: {0}")]
    MalformedDocument(String),
    #[error("Encoding error: {0}")]
    Encode(String),
    #[error("Emoji text must not be empty")]
    EmptyText,
    #[error("Emoji size must be positive, got {0}")]
    NonPositiveSize(i64),
}

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Identifier of an emoji, unique within one [`EmojiArt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmojiId(pub u64);

impl fmt::Display for EmojiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A text sticker placed relative to the centre of the background.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emoji {
    id: EmojiId,
    pub text: String,
    pub x: i64,
    pub y: i64,
    pub size: i64,
}

impl Emoji {
    pub fn id(&self) -> EmojiId {
        self.id
    }

    /// Position in document space.
    pub fn location(&self) -> Point {
        Point::new(self.x as f64, self.y as f64)
    }

    pub fn font_size(&self) -> f64 {
        self.size as f64
    }
}

/// Background URL plus emoji stickers in z-order (front-most last).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmojiArt {
    #[serde(rename = "backgroundURL", default)]
    background_url: Option<Url>,
    #[serde(default)]
    emojis: Vec<Emoji>,
    /// Last id handed out. Never decreases, so ids are not reused.
    #[serde(rename = "uniqueEmojiId", default)]
    unique_emoji_id: u64,
    #[serde(skip)]
    index: HashMap<EmojiId, usize>,
}

impl EmojiArt {
    /// Create an empty document with no background.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn background_url(&self) -> Option<&Url> {
        self.background_url.as_ref()
    }

    /// Replace the background URL. Emojis are untouched.
    pub fn set_background(&mut self, url: Option<Url>) {
        self.background_url = url;
    }

    /// Emojis back to front.
    pub fn emojis(&self) -> &[Emoji] {
        &self.emojis
    }

    pub fn emoji(&self, id: EmojiId) -> Option<&Emoji> {
        self.index.get(&id).map(|&i| &self.emojis[i])
    }

    pub(crate) fn emoji_mut(&mut self, id: EmojiId) -> Option<&mut Emoji> {
        let i = *self.index.get(&id)?;
        self.emojis.get_mut(i)
    }

    pub fn contains(&self, id: EmojiId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.emojis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emojis.is_empty()
    }

    /// Append a new emoji with a fresh id. It becomes the front-most one.
    pub fn add_emoji(&mut self, text: &str, x: i64, y: i64, size: i64) -> ModelResult<Emoji> {
        if text.is_empty() {
            return Err(ModelError::EmptyText);
        }
        if size <= 0 {
            return Err(ModelError::NonPositiveSize(size));
        }
        self.unique_emoji_id += 1;
        let emoji = Emoji {
            id: EmojiId(self.unique_emoji_id),
            text: text.to_string(),
            x,
            y,
            size,
        };
        self.index.insert(emoji.id, self.emojis.len());
        self.emojis.push(emoji.clone());
        Ok(emoji)
    }

    /// Remove an emoji. Unknown ids are ignored.
    pub fn delete_emoji(&mut self, id: EmojiId) -> Option<Emoji> {
        let i = self.index.remove(&id)?;
        let removed = self.emojis.remove(i);
        self.reindex();
        Some(removed)
    }

    fn reindex(&mut self) {
        self.index = self
            .emojis
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id, i))
            .collect();
    }

    /// Encode to the persisted JSON form.
    pub fn encode(&self) -> ModelResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ModelError::Encode(e.to_string()))
    }

    /// Decode from the persisted JSON form.
    pub fn decode(bytes: &[u8]) -> ModelResult<Self> {
        let mut art: Self = serde_json::from_slice(bytes)
            .map_err(|e| ModelError::MalformedDocument(e.to_string()))?;

        let mut seen = HashSet::new();
        for emoji in &art.emojis {
            if !seen.insert(emoji.id) {
                return Err(ModelError::MalformedDocument(format!(
                    "duplicate emoji id {}",
                    emoji.id
                )));
            }
        }

        // Older encodings may lack the counter; never hand out a live id.
        let max_id = art.emojis.iter().map(|e| e.id.0).max().unwrap_or(0);
        art.unique_emoji_id = art.unique_emoji_id.max(max_id);
        art.reindex();
        Ok(art)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_art() {
        let art = EmojiArt::new();
        assert!(art.is_empty());
        assert!(art.background_url().is_none());
    }

    #[test]
    fn test_ids_strictly_increasing() {
        let mut art = EmojiArt::new();
        let ids: Vec<EmojiId> = ["🌎", "🌻", "🐼", "🥐"]
            .iter()
            .map(|t| art.add_emoji(t, 0, 0, 40).unwrap().id())
            .collect();
        assert_eq!(ids[0], EmojiId(1));
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_ids_not_reused_after_delete() {
        let mut art = EmojiArt::new();
        let first = art.add_emoji("🌎", 0, 0, 40).unwrap().id();
        let second = art.add_emoji("🌻", 0, 0, 40).unwrap().id();
        art.delete_emoji(second);
        let third = art.add_emoji("🐼", 0, 0, 40).unwrap().id();
        assert!(third > second);
        assert!(art.contains(first));
        assert!(!art.contains(second));
    }

    #[test]
    fn test_add_appends_front_most() {
        let mut art = EmojiArt::new();
        art.add_emoji("a", 1, 2, 3).unwrap();
        let b = art.add_emoji("b", 4, 5, 6).unwrap();
        assert_eq!(art.emojis().last(), Some(&b));
        assert_eq!(b.location(), Point::new(4.0, 5.0));
    }

    #[test]
    fn test_add_rejects_invalid() {
        let mut art = EmojiArt::new();
        assert_eq!(art.add_emoji("", 0, 0, 40), Err(ModelError::EmptyText));
        assert_eq!(art.add_emoji("x", 0, 0, 0), Err(ModelError::NonPositiveSize(0)));
        assert!(art.is_empty());
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let mut art = EmojiArt::new();
        art.add_emoji("a", 0, 0, 10).unwrap();
        assert!(art.delete_emoji(EmojiId(99)).is_none());
        assert_eq!(art.len(), 1);
    }

    #[test]
    fn test_lookup_after_delete_in_middle() {
        let mut art = EmojiArt::new();
        let a = art.add_emoji("a", 0, 0, 10).unwrap().id();
        let b = art.add_emoji("b", 1, 1, 10).unwrap().id();
        let c = art.add_emoji("c", 2, 2, 10).unwrap().id();
        art.delete_emoji(b);
        assert_eq!(art.emoji(a).map(|e| e.text.as_str()), Some("a"));
        assert_eq!(art.emoji(c).map(|e| e.text.as_str()), Some("c"));
        assert!(art.emoji(b).is_none());
    }

    #[test]
    fn test_set_background_keeps_emojis() {
        let mut art = EmojiArt::new();
        art.add_emoji("a", 0, 0, 10).unwrap();
        art.set_background(Some(Url::parse("https://example.com/bg.png").unwrap()));
        assert_eq!(art.len(), 1);
        assert_eq!(art.background_url().unwrap().as_str(), "https://example.com/bg.png");
    }

    #[test]
    fn test_encode_decode_preserves_everything() {
        let mut art = EmojiArt::new();
        art.set_background(Some(Url::parse("file:///tmp/bg.jpg").unwrap()));
        art.add_emoji("🌎", -10, 20, 40).unwrap();
        let gone = art.add_emoji("🌻", 0, 0, 40).unwrap().id();
        art.add_emoji("🐼", 300, -7, 12).unwrap();
        art.delete_emoji(gone);

        let decoded = EmojiArt::decode(&art.encode().unwrap()).unwrap();
        assert_eq!(decoded, art);

        let mut decoded = decoded;
        let next = decoded.add_emoji("🥐", 0, 0, 40).unwrap().id();
        assert_eq!(next, EmojiId(4));
    }

    #[test]
    fn test_encode_decode_empty() {
        let art = EmojiArt::new();
        assert_eq!(EmojiArt::decode(&art.encode().unwrap()).unwrap(), art);
    }

    #[test]
    fn test_encoding_shape() {
        let mut art = EmojiArt::new();
        art.add_emoji("🌎", 1, 2, 3).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&art.encode().unwrap()).unwrap();
        assert!(value["backgroundURL"].is_null());
        assert_eq!(value["emojis"][0]["id"], 1);
        assert_eq!(value["emojis"][0]["text"], "🌎");
        assert_eq!(value["emojis"][0]["size"], 3);
    }

    #[test]
    fn test_decode_absent_fields_and_counter() {
        let json = br#"{"emojis":[{"id":7,"text":"x","x":0,"y":0,"size":5}]}"#;
        let mut art = EmojiArt::decode(json).unwrap();
        assert!(art.background_url().is_none());
        assert_eq!(art.add_emoji("y", 0, 0, 5).unwrap().id(), EmojiId(8));
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(
            EmojiArt::decode(b"not json"),
            Err(ModelError::MalformedDocument(_))
        ));
        assert!(matches!(
            EmojiArt::decode(br#"{"emojis":[{"id":"x"}]}"#),
            Err(ModelError::MalformedDocument(_))
        ));
        let dup = br#"{"emojis":[
            {"id":1,"text":"a","x":0,"y":0,"size":5},
            {"id":1,"text":"b","x":0,"y":0,"size":5}]}"#;
        assert!(matches!(EmojiArt::decode(dup), Err(ModelError::MalformedDocument(_))));
    }
}

//! Named emoji palettes offered alongside a document.
//!
//! A palette is identified by its emoji string, the same string a palette
//! chooser hands back when stepping through palettes.

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// Fallback palette returned when no palettes exist.
pub const EMPTY_PALETTE: &str = "⚠️";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Palette {
    emojis: String,
    name: String,
}

/// Ordered collection of named palettes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteSet {
    palettes: Vec<Palette>,
}

impl PaletteSet {
    /// Palette set seeded with `default_palette` followed by a few stock ones.
    pub fn seeded(default_palette: &str) -> Self {
        let mut set = Self { palettes: Vec::new() };
        set.insert(default_palette, "Favorites");
        set.insert("🐶🐱🐹🐰🦊🐼🐨🐯🐸🐵🐧🐦🐤🦆🦅🦇🐺", "Animals");
        set.insert("🍏🍎🍐🍊🍋🍌🍉🍇🍓🫐🍈🍒🥐🥬", "Food");
        set.insert("⚽🏀🏈⚾🎾🏐🏉🥏🎱🏓", "Activities");
        set
    }

    fn insert(&mut self, emojis: &str, name: &str) {
        if emojis.is_empty() || self.position(emojis).is_some() {
            return;
        }
        self.palettes.push(Palette {
            emojis: emojis.to_string(),
            name: name.to_string(),
        });
    }

    fn position(&self, palette: &str) -> Option<usize> {
        self.palettes.iter().position(|p| p.emojis == palette)
    }

    pub fn len(&self) -> usize {
        self.palettes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.palettes.is_empty()
    }

    /// Emoji strings of every palette, in order.
    pub fn palettes(&self) -> impl Iterator<Item = &str> {
        self.palettes.iter().map(|p| p.emojis.as_str())
    }

    pub fn default_palette(&self) -> &str {
        self.palettes
            .first()
            .map(|p| p.emojis.as_str())
            .unwrap_or(EMPTY_PALETTE)
    }

    pub fn name(&self, palette: &str) -> Option<&str> {
        self.position(palette).map(|i| self.palettes[i].name.as_str())
    }

    /// Next palette, wrapping around. Unknown palettes yield the default.
    pub fn palette_after(&self, palette: &str) -> &str {
        match self.position(palette) {
            Some(i) => &self.palettes[(i + 1) % self.palettes.len()].emojis,
            None => self.default_palette(),
        }
    }

    /// Previous palette, wrapping around. Unknown palettes yield the default.
    pub fn palette_before(&self, palette: &str) -> &str {
        match self.position(palette) {
            Some(i) => {
                let len = self.palettes.len();
                &self.palettes[(i + len - 1) % len].emojis
            }
            None => self.default_palette(),
        }
    }

    /// Prepend `emoji` to `palette`, keeping one copy of each emoji.
    ///
    /// An emoji already in the palette moves to the front. Returns the new
    /// palette string, which replaces the old one in place and keeps its
    /// name. An unknown palette is created unnamed.
    pub fn add_emoji(&mut self, emoji: &str, palette: &str) -> String {
        let mut seen: Vec<&str> = Vec::new();
        for grapheme in emoji.graphemes(true).chain(palette.graphemes(true)) {
            if !seen.contains(&grapheme) {
                seen.push(grapheme);
            }
        }
        let updated = seen.concat();
        match self.position(palette) {
            Some(i) => {
                self.palettes[i].emojis = updated.clone();
                // Merging may collide with another palette's string.
                let duplicate = self
                    .palettes
                    .iter()
                    .enumerate()
                    .find(|(j, p)| *j != i && p.emojis == updated)
                    .map(|(j, _)| j);
                if let Some(j) = duplicate {
                    self.palettes.remove(j);
                }
            }
            None => self.insert(&updated, ""),
        }
        updated
    }

    /// Rename a palette. Unknown palettes are ignored.
    pub fn rename(&mut self, palette: &str, name: &str) -> bool {
        match self.position(palette) {
            Some(i) => {
                self.palettes[i].name = name.to_string();
                true
            }
            None => false,
        }
    }

    /// Split a palette into individual emoji (grapheme clusters).
    pub fn emojis(palette: &str) -> Vec<String> {
        palette.graphemes(true).map(String::from).collect()
    }
}

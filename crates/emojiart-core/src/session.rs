//! Per-view interaction state.
//!
//! A [`Session`] holds what one open view of a document needs but the
//! document itself never persists: the selection, the steady-state pan and
//! zoom, and the deltas of gestures still in flight. Gesture deltas only
//! reach the document when the gesture ends.

use crate::background::DecodedImage;
use crate::document::{DocumentEvent, EmojiArtDocument};
use crate::geometry::{ViewTransform, viewport_center};
use crate::model::EmojiId;
use kurbo::{Point, Rect, Size, Vec2};
use std::collections::HashSet;
use url::Url;

fn is_valid_scale(scale: f64) -> bool {
    scale.is_finite() && scale > 0.0
}

/// Something dropped onto the canvas from outside.
#[derive(Debug, Clone, PartialEq)]
pub enum DropPayload {
    Url(Url),
    Text(String),
}

/// Where and how large to draw the background image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackgroundPlacement {
    /// Screen position of the image centre.
    pub center: Point,
    pub scale: f64,
    pub image: DecodedImage,
}

/// Where and how large to draw one emoji.
#[derive(Debug, Clone, PartialEq)]
pub struct EmojiPlacement {
    pub id: EmojiId,
    pub text: String,
    /// Screen position of the emoji centre.
    pub position: Point,
    pub font_size: f64,
    pub selected: bool,
}

impl EmojiPlacement {
    /// Square of side `font_size` around the emoji.
    pub fn bounds(&self) -> Rect {
        Rect::from_center_size(self.position, Size::new(self.font_size, self.font_size))
    }
}

/// Everything a view needs to draw one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub background: Option<BackgroundPlacement>,
    /// Back to front. Empty while the background is loading.
    pub emojis: Vec<EmojiPlacement>,
    pub is_loading: bool,
}

impl Scene {
    /// Front-most emoji under a screen point.
    pub fn emoji_at(&self, point: Point) -> Option<EmojiId> {
        self.emojis
            .iter()
            .rev()
            .find(|e| e.bounds().contains(point))
            .map(|e| e.id)
    }
}

/// Selection, pan/zoom and in-flight gesture state for one view.
#[derive(Debug, Clone)]
pub struct Session {
    selection: HashSet<EmojiId>,
    steady: ViewTransform,
    /// Live pinch factor, 1.0 when idle.
    gesture_zoom: f64,
    /// Live two-finger pan in document units.
    gesture_pan: Vec2,
    /// Live drag of the selected emojis in document units.
    gesture_emoji_offset: Vec2,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            selection: HashSet::new(),
            steady: ViewTransform::default(),
            gesture_zoom: 1.0,
            gesture_pan: Vec2::ZERO,
            gesture_emoji_offset: Vec2::ZERO,
        }
    }

    // Selection

    pub fn selection(&self) -> &HashSet<EmojiId> {
        &self.selection
    }

    pub fn is_selected(&self, id: EmojiId) -> bool {
        self.selection.contains(&id)
    }

    /// Tap on empty canvas.
    pub fn tap_canvas(&mut self) {
        self.selection.clear();
    }

    /// Tap on an emoji toggles it without touching other selections.
    pub fn tap_emoji(&mut self, id: EmojiId) {
        if !self.selection.remove(&id) {
            self.selection.insert(id);
        }
    }

    /// Drop selected ids that no longer exist in the document.
    pub fn prune_selection(&mut self, document: &EmojiArtDocument) {
        let art = document.emoji_art();
        self.selection.retain(|id| art.contains(*id));
    }

    /// Delete an emoji and forget it in the selection.
    pub fn delete_emoji(&mut self, document: &mut EmojiArtDocument, id: EmojiId) -> bool {
        self.selection.remove(&id);
        document.delete_emoji(id)
    }

    // Pan and zoom

    /// Last committed pan and zoom.
    pub fn steady_state(&self) -> ViewTransform {
        self.steady
    }

    /// Steady zoom times the live pinch factor.
    pub fn zoom_scale(&self) -> f64 {
        self.steady.zoom * self.gesture_zoom
    }

    /// Pan including any live pan gesture, in screen pixels.
    pub fn pan_offset(&self) -> Vec2 {
        (self.steady.pan + self.gesture_pan) * self.zoom_scale()
    }

    /// Transform in effect right now, live gestures included.
    pub fn live_transform(&self) -> ViewTransform {
        ViewTransform::new(self.steady.pan + self.gesture_pan, self.zoom_scale())
    }

    /// True when no gesture is in flight.
    pub fn is_idle(&self) -> bool {
        self.gesture_zoom == 1.0
            && self.gesture_pan == Vec2::ZERO
            && self.gesture_emoji_offset == Vec2::ZERO
    }

    /// Zoom an image to fit the viewport and reset pan.
    pub fn zoom_to_fit(&mut self, image: Option<&DecodedImage>, viewport: Size) -> bool {
        match image {
            Some(image) => self.steady.zoom_to_fit(image.size(), viewport),
            None => false,
        }
    }

    /// Double tap fits the current background.
    pub fn double_tap(&mut self, document: &EmojiArtDocument, viewport: Size) -> bool {
        self.zoom_to_fit(document.background_image(), viewport)
    }

    /// React to document events; a freshly loaded background is zoomed to fit.
    pub fn handle_event(&mut self, event: &DocumentEvent, viewport: Size) {
        if let DocumentEvent::BackgroundLoaded { image, .. } = event {
            self.zoom_to_fit(Some(image), viewport);
        }
    }

    // Gestures

    /// Live pinch factor. Factors that are not finite and positive are
    /// ignored so the zoom stays invertible.
    pub fn pinch_changed(&mut self, scale: f64) {
        if is_valid_scale(self.steady.zoom * scale) {
            self.gesture_zoom = scale;
        }
    }

    /// Commit a pinch: the view zoom if nothing is selected, otherwise the
    /// size of every selected emoji.
    ///
    /// Returns `false` and commits nothing for a factor that is not finite
    /// and positive.
    pub fn pinch_ended(&mut self, document: &mut EmojiArtDocument, scale: f64) -> bool {
        self.gesture_zoom = 1.0;
        if !is_valid_scale(scale) {
            return false;
        }
        if self.selection.is_empty() {
            let zoom = self.steady.zoom * scale;
            if !is_valid_scale(zoom) {
                return false;
            }
            self.steady.zoom = zoom;
        } else {
            for id in self.sorted_selection() {
                document.scale_emoji(id, scale);
            }
        }
        true
    }

    /// Two-finger pan; `translation` is in screen pixels.
    pub fn pan_changed(&mut self, translation: Vec2) {
        self.gesture_pan = translation / self.zoom_scale();
    }

    pub fn pan_ended(&mut self, translation: Vec2) {
        self.steady.pan += translation / self.zoom_scale();
        self.gesture_pan = Vec2::ZERO;
    }

    /// Drag that started on `origin`; `translation` is in screen pixels.
    ///
    /// Only a drag that starts on a selected emoji moves anything.
    pub fn emoji_drag_changed(&mut self, origin: EmojiId, translation: Vec2) {
        self.gesture_emoji_offset = if self.is_selected(origin) {
            translation / self.zoom_scale()
        } else {
            Vec2::ZERO
        };
    }

    /// Commit a drag. Every selected emoji gets the same document-space delta.
    ///
    /// Returns the number of emojis moved.
    pub fn emoji_drag_ended(
        &mut self,
        document: &mut EmojiArtDocument,
        origin: EmojiId,
        translation: Vec2,
    ) -> usize {
        self.gesture_emoji_offset = Vec2::ZERO;
        if !self.is_selected(origin) {
            return 0;
        }
        let delta = translation / self.zoom_scale();
        self.sorted_selection()
            .into_iter()
            .filter(|&id| document.move_emoji(id, delta))
            .count()
    }

    fn sorted_selection(&self) -> Vec<EmojiId> {
        let mut ids: Vec<EmojiId> = self.selection.iter().copied().collect();
        ids.sort();
        ids
    }

    // Drops

    /// Convert a drop location in screen space to document space.
    pub fn drop_location(&self, screen_point: Point, viewport: Size) -> Point {
        self.live_transform().to_document(screen_point, viewport)
    }

    /// Handle an external drop. A URL becomes the background; otherwise each
    /// text payload becomes an emoji at the drop point.
    ///
    /// Returns `false` if nothing usable was dropped.
    pub fn drop_payloads(
        &mut self,
        document: &mut EmojiArtDocument,
        payloads: &[DropPayload],
        screen_point: Point,
        viewport: Size,
    ) -> bool {
        let url = payloads.iter().find_map(|p| match p {
            DropPayload::Url(url) => Some(url.clone()),
            DropPayload::Text(_) => None,
        });
        if let Some(url) = url {
            document.set_background_url(Some(url));
            return true;
        }

        let location = self.drop_location(screen_point, viewport);
        let size = document.config().default_emoji_size as f64;
        let mut found = false;
        for payload in payloads {
            if let DropPayload::Text(text) = payload {
                found |= document.add_emoji(text, location, size).is_some();
            }
        }
        found
    }

    // Rendering

    /// Compute screen placements for the document.
    ///
    /// With an empty selection everything follows the live zoom. Otherwise
    /// the background and unselected emojis stay at the steady zoom and only
    /// selected emojis grow or shrink with the pinch.
    pub fn scene(&self, document: &EmojiArtDocument, viewport: Size) -> Scene {
        let live = self.zoom_scale();
        let pinned = if self.selection.is_empty() {
            live
        } else {
            self.steady.zoom
        };
        let center = viewport_center(viewport);
        let pan = self.pan_offset();

        let background = document.background_image().map(|image| BackgroundPlacement {
            center: center + pan,
            scale: pinned,
            image: *image,
        });

        let is_loading = document.is_loading();
        let emojis = if is_loading {
            Vec::new()
        } else {
            document
                .emoji_art()
                .emojis()
                .iter()
                .map(|emoji| {
                    let selected = self.is_selected(emoji.id());
                    let mut position = center + emoji.location().to_vec2() * pinned + pan;
                    if selected {
                        position += self.gesture_emoji_offset * live;
                    }
                    let scale = if selected { live } else { pinned };
                    EmojiPlacement {
                        id: emoji.id(),
                        text: emoji.text.clone(),
                        position,
                        font_size: emoji.font_size() * scale,
                        selected,
                    }
                })
                .collect()
        };

        Scene {
            background,
            emojis,
            is_loading,
        }
    }
}

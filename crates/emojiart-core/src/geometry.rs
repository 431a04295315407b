//! View transform for pan/zoom between document space and screen space.
//!
//! Document space is centred on the background image: the origin sits in the
//! middle of the image, independent of the current pan and zoom. Screen space
//! is pixel coordinates inside the viewport.

use kurbo::{Affine, Point, Size, Vec2};
use serde::{Deserialize, Serialize};

/// Pan/zoom pair that maps document space onto a viewport.
///
/// `pan` is expressed in document units, so the on-screen offset it causes is
/// `pan * zoom`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewTransform {
    /// Translation in document units.
    pub pan: Vec2,
    /// Scale factor from document units to screen pixels.
    pub zoom: f64,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            pan: Vec2::ZERO,
            zoom: 1.0,
        }
    }
}

/// Centre of a viewport in screen coordinates.
pub fn viewport_center(viewport: Size) -> Point {
    Point::new(viewport.width / 2.0, viewport.height / 2.0)
}

impl ViewTransform {
    /// Create a transform with the given pan and zoom.
    pub fn new(pan: Vec2, zoom: f64) -> Self {
        Self { pan, zoom }
    }

    /// Affine transform mapping document space to screen space.
    pub fn transform(&self, viewport: Size) -> Affine {
        Affine::translate(viewport_center(viewport).to_vec2())
            * Affine::scale(self.zoom)
            * Affine::translate(self.pan)
    }

    /// Affine transform mapping screen space back to document space.
    pub fn inverse_transform(&self, viewport: Size) -> Affine {
        Affine::translate(-self.pan)
            * Affine::scale(1.0 / self.zoom)
            * Affine::translate(-viewport_center(viewport).to_vec2())
    }

    /// Convert a document point to screen coordinates.
    pub fn to_screen(&self, document_point: Point, viewport: Size) -> Point {
        let center = viewport_center(viewport);
        Point::new(
            document_point.x * self.zoom + center.x + self.pan.x * self.zoom,
            document_point.y * self.zoom + center.y + self.pan.y * self.zoom,
        )
    }

    /// Convert a screen point to document coordinates.
    ///
    /// Exact inverse of [`ViewTransform::to_screen`]: subtract the viewport
    /// centre, subtract the scaled pan, then divide by zoom.
    pub fn to_document(&self, screen_point: Point, viewport: Size) -> Point {
        let center = viewport_center(viewport);
        let offset = self.screen_offset();
        let x = screen_point.x - center.x - offset.x;
        let y = screen_point.y - center.y - offset.y;
        Point::new(x / self.zoom, y / self.zoom)
    }

    /// Pan expressed in screen pixels.
    pub fn screen_offset(&self) -> Vec2 {
        self.pan * self.zoom
    }

    /// Fit an image of the given natural size inside the viewport.
    ///
    /// Sets zoom to `min(w / iw, h / ih)` and resets pan. Returns `false` and
    /// leaves the transform alone when either size is degenerate.
    pub fn zoom_to_fit(&mut self, image: Size, viewport: Size) -> bool {
        if image.width <= 0.0 || image.height <= 0.0 {
            return false;
        }
        if viewport.width <= 0.0 || viewport.height <= 0.0 {
            return false;
        }
        let horizontal = viewport.width / image.width;
        let vertical = viewport.height / image.height;
        self.pan = Vec2::ZERO;
        self.zoom = horizontal.min(vertical);
        true
    }
}

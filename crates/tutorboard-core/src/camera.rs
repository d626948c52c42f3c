//! View transform for zoom and pan.
//!
//! Only input capture and display go through the camera. Everything stored
//! or transmitted is in unscaled canvas coordinates, so peers at different
//! zoom levels converge on the same drawing.

use crate::config::WhiteboardConfig;
use kurbo::{Affine, Point, Vec2};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Pan offset in screen pixels.
    pub offset: Vec2,
    pub zoom: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub zoom_step: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            zoom: 1.0,
            min_zoom: 0.5,
            max_zoom: 3.0,
            zoom_step: 0.25,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &WhiteboardConfig) -> Self {
        Self {
            min_zoom: config.min_zoom,
            max_zoom: config.max_zoom,
            zoom_step: config.zoom_step,
            ..Self::default()
        }
    }

    /// Canvas to screen.
    pub fn transform(&self) -> Affine {
        Affine::translate(self.offset) * Affine::scale(self.zoom)
    }

    /// Screen to canvas.
    pub fn inverse_transform(&self) -> Affine {
        Affine::scale(1.0 / self.zoom) * Affine::translate(-self.offset)
    }

    /// `(p - offset) / zoom`
    pub fn screen_to_canvas(&self, screen: Point) -> Point {
        self.inverse_transform() * screen
    }

    pub fn canvas_to_screen(&self, canvas: Point) -> Point {
        self.transform() * canvas
    }

    pub fn pan(&mut self, delta: Vec2) {
        self.offset += delta;
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom.clamp(self.min_zoom, self.max_zoom);
    }

    pub fn zoom_in(&mut self) {
        self.set_zoom(self.zoom + self.zoom_step);
    }

    pub fn zoom_out(&mut self) {
        self.set_zoom(self.zoom - self.zoom_step);
    }

    /// Back to zoom 1 with no pan.
    pub fn reset(&mut self) {
        self.offset = Vec2::ZERO;
        self.zoom = 1.0;
    }

    /// Zoom as a whole percentage for display.
    pub fn zoom_percent(&self) -> u32 {
        (self.zoom * 100.0).round() as u32
    }
}

//! Whiteboard configuration.

use crate::color::Rgba;
use crate::history::MAX_HISTORY;
use crate::tools::Style;
use serde::{Deserialize, Serialize};

/// Settings for one whiteboard instance. Every field has a default, so a
/// partial JSON document is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WhiteboardConfig {
    /// Surface width in canvas units (pixels at zoom 1).
    pub width: u32,
    pub height: u32,
    pub background: Rgba,
    pub history_limit: usize,
    pub default_style: Style,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub zoom_step: f64,
    /// Font size used for text entered with the text tool.
    pub font_size: f64,
}

impl Default for WhiteboardConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            background: Rgba::white(),
            history_limit: MAX_HISTORY,
            default_style: Style::default(),
            min_zoom: 0.5,
            max_zoom: 3.0,
            zoom_step: 0.25,
            font_size: 18.0,
        }
    }
}

impl WhiteboardConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}

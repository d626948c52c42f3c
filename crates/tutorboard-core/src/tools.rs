//! Tool and style state for the whiteboard.

use crate::color::{Rgba, STICKY_COLORS};
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

/// Available tools. Exactly one is active per client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Select,
    #[default]
    Pen,
    Highlighter,
    Eraser,
    Text,
    Shape,
    Laser,
    Sticky,
    Pan,
}

impl Tool {
    pub const ALL: [Tool; 9] = [
        Tool::Select,
        Tool::Pen,
        Tool::Highlighter,
        Tool::Eraser,
        Tool::Text,
        Tool::Shape,
        Tool::Sticky,
        Tool::Laser,
        Tool::Pan,
    ];

    /// Tools that lay down freehand strokes segment by segment.
    pub fn is_freehand(self) -> bool {
        matches!(self, Tool::Pen | Tool::Highlighter | Tool::Eraser)
    }

    /// Tools whose pointer events never reach the raster canvas.
    pub fn bypasses_canvas(self) -> bool {
        matches!(self, Tool::Select | Tool::Laser | Tool::Sticky | Tool::Pan)
    }

    /// Keyboard shortcut for this tool.
    pub fn shortcut(self) -> &'static str {
        match self {
            Tool::Select => "V",
            Tool::Pen => "P",
            Tool::Highlighter => "H",
            Tool::Eraser => "E",
            Tool::Text => "T",
            Tool::Shape => "S",
            Tool::Sticky => "N",
            Tool::Laser => "L",
            Tool::Pan => "Space",
        }
    }

    /// Map a pressed key to a tool, case-insensitively.
    pub fn from_shortcut(key: &str) -> Option<Tool> {
        if key == " " || key.eq_ignore_ascii_case("space") {
            return Some(Tool::Pan);
        }
        Tool::ALL
            .into_iter()
            .find(|tool| tool != &Tool::Pan && tool.shortcut().eq_ignore_ascii_case(key))
    }

    pub fn label(self) -> &'static str {
        match self {
            Tool::Select => "Select",
            Tool::Pen => "Pen",
            Tool::Highlighter => "Highlighter",
            Tool::Eraser => "Eraser",
            Tool::Text => "Text",
            Tool::Shape => "Shapes",
            Tool::Sticky => "Sticky Note",
            Tool::Laser => "Laser Pointer",
            Tool::Pan => "Pan",
        }
    }
}

/// Shape kinds supported by the shape tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    #[default]
    Rectangle,
    Circle,
    Line,
    Arrow,
    Triangle,
}

/// Style applied to newly started operations.
///
/// Captured by value when a gesture begins, so later toolbar changes never
/// touch an in-flight or historical operation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Style {
    pub color: Rgba,
    pub line_width: f64,
    pub opacity: f64,
    pub selected_shape: ShapeKind,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            color: Rgba::new(0x1e, 0x1e, 0x1e, 255),
            line_width: 4.0,
            opacity: 1.0,
            selected_shape: ShapeKind::Rectangle,
        }
    }
}

impl Style {
    /// Clamp opacity into [0, 1] and width to a positive value.
    pub fn sanitized(mut self) -> Self {
        self.opacity = if self.opacity.is_finite() {
            self.opacity.clamp(0.0, 1.0)
        } else {
            1.0
        };
        if !self.line_width.is_finite() || self.line_width <= 0.0 {
            self.line_width = 1.0;
        }
        self
    }
}

/// Pick a sticky note color from the palette at random.
pub fn random_sticky_color() -> Rgba {
    sticky_color_from(&mut rand::rng())
}

pub fn sticky_color_from<R: Rng + ?Sized>(rng: &mut R) -> Rgba {
    STICKY_COLORS
        .choose(rng)
        .and_then(|hex| Rgba::parse(hex))
        .unwrap_or(Rgba::white())
}

//! Wire actions: the serializable record of every drawing and object mutation.

use crate::color::Rgba;
use crate::objects::{CanvasDocument, DocumentPatch, StickyNote, StickyPatch};
use crate::tools::{ShapeKind, Style, Tool};
use kurbo::Point;
use serde::{Deserialize, Serialize};

/// One atomic mutation exchanged between peers.
///
/// Every variant is self-contained: applying it needs nothing beyond the
/// target surface (or object store).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum WhiteboardAction {
    /// A freehand stroke begins.
    Start {
        point: Point,
        tool: Tool,
        color: Rgba,
        line_width: f64,
        opacity: f64,
    },
    /// One segment of a freehand stroke.
    Draw {
        from: Point,
        to: Point,
        tool: Tool,
        color: Rgba,
        line_width: f64,
        opacity: f64,
    },
    /// A freehand stroke is finished.
    End,
    Shape {
        shape_type: ShapeKind,
        start: Point,
        end: Point,
        color: Rgba,
        line_width: f64,
        opacity: f64,
    },
    /// Text whose first baseline starts at (x, y).
    Text {
        text: String,
        x: f64,
        y: f64,
        font_size: f64,
        color: Rgba,
        opacity: f64,
    },
    Image {
        src: String,
        x: f64,
        y: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<f64>,
    },
    Clear,
    StickyAdd {
        note: StickyNote,
    },
    StickyUpdate {
        id: String,
        updates: StickyPatch,
    },
    StickyDelete {
        id: String,
    },
    DocAdd {
        doc: CanvasDocument,
    },
    DocUpdate {
        doc_id: String,
        updates: DocumentPatch,
    },
    DocRemove {
        doc_id: String,
    },
}

impl WhiteboardAction {
    pub fn start(point: Point, tool: Tool, style: &Style) -> Self {
        Self::Start {
            point,
            tool,
            color: style.color,
            line_width: style.line_width,
            opacity: style.opacity,
        }
    }

    pub fn draw(from: Point, to: Point, tool: Tool, style: &Style) -> Self {
        Self::Draw {
            from,
            to,
            tool,
            color: style.color,
            line_width: style.line_width,
            opacity: style.opacity,
        }
    }

    pub fn shape(kind: ShapeKind, start: Point, end: Point, style: &Style) -> Self {
        Self::Shape {
            shape_type: kind,
            start,
            end,
            color: style.color,
            line_width: style.line_width,
            opacity: style.opacity,
        }
    }

    /// Parse an action from loosely typed JSON.
    ///
    /// Unknown `type`s and malformed payloads yield `None` so newer peers can't
    /// break older ones.
    pub fn from_value(value: serde_json::Value) -> Option<Self> {
        let kind = value.get("type").and_then(|t| t.as_str()).unwrap_or("<missing>").to_string();
        match serde_json::from_value(value) {
            Ok(action) => Some(action),
            Err(e) => {
                log::debug!("Ignoring action of type {kind}: {e}");
                None
            }
        }
    }

    /// The wire `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Draw { .. } => "draw",
            Self::End => "end",
            Self::Shape { .. } => "shape",
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::Clear => "clear",
            Self::StickyAdd { .. } => "sticky-add",
            Self::StickyUpdate { .. } => "sticky-update",
            Self::StickyDelete { .. } => "sticky-delete",
            Self::DocAdd { .. } => "doc-add",
            Self::DocUpdate { .. } => "doc-update",
            Self::DocRemove { .. } => "doc-remove",
        }
    }

    /// Whether this targets the object store rather than the raster surface.
    pub fn is_object_action(&self) -> bool {
        matches!(
            self,
            Self::StickyAdd { .. }
                | Self::StickyUpdate { .. }
                | Self::StickyDelete { .. }
                | Self::DocAdd { .. }
                | Self::DocUpdate { .. }
                | Self::DocRemove { .. }
        )
    }
}

/// Outbound side of every local mutation.
///
/// The canvas and the object operations push each produced action here
/// exactly once; the remote-apply path never gets a sink, so it cannot echo.
pub trait ActionSink {
    fn emit(&mut self, action: WhiteboardAction);
}

impl ActionSink for Vec<WhiteboardAction> {
    fn emit(&mut self, action: WhiteboardAction) {
        self.push(action);
    }
}

/// Collects emitted actions until drained.
#[derive(Debug, Default)]
pub struct Outbox {
    pending: Vec<WhiteboardAction>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&mut self) -> Vec<WhiteboardAction> {
        std::mem::take(&mut self.pending)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl ActionSink for Outbox {
    fn emit(&mut self, action: WhiteboardAction) {
        self.pending.push(action);
    }
}

//! Sticky notes and documents layered over the raster canvas.
//!
//! These stay structured: they are addressed by id, patched field by field
//! and never rasterized. Concurrent patches to the same id are last-write-wins.

use crate::action::WhiteboardAction;
use crate::color::Rgba;
use kurbo::{Point, Rect, Size};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Default sticky note size.
pub const STICKY_SIZE: Size = Size::new(150.0, 100.0);

/// Where a document lands when first sent to the canvas.
pub const DOCUMENT_ORIGIN: Point = Point::new(80.0, 80.0);

/// Default document size.
pub const DOCUMENT_SIZE: Size = Size::new(420.0, 520.0);

/// Smallest size a document can be resized to.
pub const DOCUMENT_MIN_SIZE: Size = Size::new(200.0, 150.0);

/// How much of a document must stay inside the surface while dragging.
pub const DOCUMENT_VISIBLE_MARGIN: f64 = 50.0;

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// A positioned sticky note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StickyNote {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub content: String,
    pub color: Rgba,
}

impl StickyNote {
    /// An empty note centered on `at`.
    pub fn centered_at(at: Point, color: Rgba) -> Self {
        Self {
            id: new_id(),
            x: at.x - STICKY_SIZE.width / 2.0,
            y: at.y - STICKY_SIZE.height / 2.0,
            width: STICKY_SIZE.width,
            height: STICKY_SIZE.height,
            content: String::new(),
            color,
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.x + self.width, self.y + self.height)
    }

    /// Overwrite every field the patch carries.
    pub fn apply(&mut self, patch: &StickyPatch) {
        if let Some(x) = patch.x {
            self.x = x;
        }
        if let Some(y) = patch.y {
            self.y = y;
        }
        if let Some(width) = patch.width {
            self.width = width;
        }
        if let Some(height) = patch.height {
            self.height = height;
        }
        if let Some(content) = &patch.content {
            self.content.clone_from(content);
        }
        if let Some(color) = patch.color {
            self.color = color;
        }
    }

    /// Position after dragging to `to`, kept fully inside `surface`.
    pub fn clamped_position(&self, to: Point, surface: Size) -> Point {
        Point::new(
            to.x.min(surface.width - self.width).max(0.0),
            to.y.min(surface.height - self.height).max(0.0),
        )
    }
}

/// Partial update of a sticky note.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StickyPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Rgba>,
}

impl StickyPatch {
    pub fn position(at: Point) -> Self {
        Self { x: Some(at.x), y: Some(at.y), ..Self::default() }
    }

    pub fn content(content: impl Into<String>) -> Self {
        Self { content: Some(content.into()), ..Self::default() }
    }

    pub fn color(color: Rgba) -> Self {
        Self { color: Some(color), ..Self::default() }
    }
}

/// A multi-page document shown as a movable, resizable panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasDocument {
    pub id: String,
    pub name: String,
    /// Page images as data URIs.
    pub page_images: Vec<String>,
    /// 1-based page number.
    pub current_page: usize,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CanvasDocument {
    /// A document at the default position and size, open on page 1.
    pub fn new(name: impl Into<String>, page_images: Vec<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            page_images,
            current_page: 1,
            x: DOCUMENT_ORIGIN.x,
            y: DOCUMENT_ORIGIN.y,
            width: DOCUMENT_SIZE.width,
            height: DOCUMENT_SIZE.height,
        }
    }

    pub fn page_count(&self) -> usize {
        self.page_images.len()
    }

    /// Image for the current page, if any.
    pub fn current_image(&self) -> Option<&str> {
        self.current_page
            .checked_sub(1)
            .and_then(|i| self.page_images.get(i))
            .map(String::as_str)
    }

    /// Clamp a requested page into `[1, page_count]`.
    pub fn clamp_page(&self, page: usize) -> usize {
        page.clamp(1, self.page_count().max(1))
    }

    pub fn next_page(&self) -> usize {
        self.clamp_page(self.current_page + 1)
    }

    pub fn previous_page(&self) -> usize {
        self.clamp_page(self.current_page.saturating_sub(1))
    }

    /// Position after dragging to `to`; at least a margin of the panel stays on the surface.
    pub fn clamped_position(&self, to: Point, surface: Size) -> Point {
        let margin = DOCUMENT_VISIBLE_MARGIN;
        Point::new(
            to.x.min(surface.width - margin).max(margin - self.width),
            to.y.min(surface.height - margin).max(margin - self.height),
        )
    }

    /// Size after a resize gesture, respecting the minimum.
    pub fn clamped_size(size: Size) -> Size {
        Size::new(
            size.width.max(DOCUMENT_MIN_SIZE.width),
            size.height.max(DOCUMENT_MIN_SIZE.height),
        )
    }

    pub fn apply(&mut self, patch: &DocumentPatch) {
        if let Some(name) = &patch.name {
            self.name.clone_from(name);
        }
        if let Some(pages) = &patch.page_images {
            self.page_images.clone_from(pages);
        }
        if let Some(page) = patch.current_page {
            self.current_page = page;
        }
        if let Some(x) = patch.x {
            self.x = x;
        }
        if let Some(y) = patch.y {
            self.y = y;
        }
        if let Some(width) = patch.width {
            self.width = width;
        }
        if let Some(height) = patch.height {
            self.height = height;
        }
    }
}

/// Partial update of a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_images: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_page: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

impl DocumentPatch {
    pub fn position(at: Point) -> Self {
        Self { x: Some(at.x), y: Some(at.y), ..Self::default() }
    }

    pub fn size(size: Size) -> Self {
        Self { width: Some(size.width), height: Some(size.height), ..Self::default() }
    }

    pub fn page(page: usize) -> Self {
        Self { current_page: Some(page), ..Self::default() }
    }
}

/// Keyed collection of overlay objects, in creation order.
#[derive(Debug, Clone, Default)]
pub struct ObjectStore {
    stickies: HashMap<String, StickyNote>,
    sticky_order: Vec<String>,
    documents: HashMap<String, CanvasDocument>,
    document_order: Vec<String>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sticky(&self, id: &str) -> Option<&StickyNote> {
        self.stickies.get(id)
    }

    pub fn document(&self, id: &str) -> Option<&CanvasDocument> {
        self.documents.get(id)
    }

    /// Sticky notes, oldest first.
    pub fn stickies(&self) -> impl Iterator<Item = &StickyNote> {
        self.sticky_order.iter().filter_map(|id| self.stickies.get(id))
    }

    /// Documents, oldest first.
    pub fn documents(&self) -> impl Iterator<Item = &CanvasDocument> {
        self.document_order.iter().filter_map(|id| self.documents.get(id))
    }

    pub fn sticky_count(&self) -> usize {
        self.stickies.len()
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stickies.is_empty() && self.documents.is_empty()
    }

    /// Insert or replace a note.
    pub fn add_sticky(&mut self, note: StickyNote) {
        if !self.stickies.contains_key(&note.id) {
            self.sticky_order.push(note.id.clone());
        }
        self.stickies.insert(note.id.clone(), note);
    }

    pub fn update_sticky(&mut self, id: &str, patch: &StickyPatch) -> bool {
        match self.stickies.get_mut(id) {
            Some(note) => {
                note.apply(patch);
                true
            }
            None => false,
        }
    }

    pub fn remove_sticky(&mut self, id: &str) -> Option<StickyNote> {
        let removed = self.stickies.remove(id)?;
        self.sticky_order.retain(|other| other != id);
        Some(removed)
    }

    /// Insert or replace a document.
    pub fn add_document(&mut self, doc: CanvasDocument) {
        if !self.documents.contains_key(&doc.id) {
            self.document_order.push(doc.id.clone());
        }
        self.documents.insert(doc.id.clone(), doc);
    }

    pub fn update_document(&mut self, id: &str, patch: &DocumentPatch) -> bool {
        match self.documents.get_mut(id) {
            Some(doc) => {
                doc.apply(patch);
                true
            }
            None => false,
        }
    }

    pub fn remove_document(&mut self, id: &str) -> Option<CanvasDocument> {
        let removed = self.documents.remove(id)?;
        self.document_order.retain(|other| other != id);
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.stickies.clear();
        self.sticky_order.clear();
        self.documents.clear();
        self.document_order.clear();
    }

    /// Apply an object action (and `clear`). Returns false for actions this
    /// store does not handle or ids it does not know.
    pub fn apply(&mut self, action: &WhiteboardAction) -> bool {
        match action {
            WhiteboardAction::StickyAdd { note } => {
                self.add_sticky(note.clone());
                true
            }
            WhiteboardAction::StickyUpdate { id, updates } => self.update_sticky(id, updates),
            WhiteboardAction::StickyDelete { id } => self.remove_sticky(id).is_some(),
            WhiteboardAction::DocAdd { doc } => {
                self.add_document(doc.clone());
                true
            }
            WhiteboardAction::DocUpdate { doc_id, updates } => self.update_document(doc_id, updates),
            WhiteboardAction::DocRemove { doc_id } => self.remove_document(doc_id).is_some(),
            WhiteboardAction::Clear => {
                self.clear();
                true
            }
            _ => false,
        }
    }
}

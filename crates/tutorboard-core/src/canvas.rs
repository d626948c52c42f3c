//! The raster canvas: a committed surface, a preview overlay and undo history.

use crate::action::{ActionSink, WhiteboardAction};
use crate::color::Rgba;
use crate::config::WhiteboardConfig;
use crate::error::MediaResult;
use crate::geometry::compute_shape_outline;
use crate::history::History;
use crate::media::{self, ExportFormat, JPEG_QUALITY, Placement};
use crate::raster::{BlockGlyphs, CoverageMask, GlyphRasterizer, Paint, Surface};
use crate::tools::{ShapeKind, Style, Tool};
use image::RgbaImage;
use kurbo::{Point, Size};

/// Highlighter strokes are this translucent regardless of the style.
pub const HIGHLIGHTER_OPACITY: f64 = 0.3;

/// Highlighter width relative to the style's line width.
pub const HIGHLIGHTER_WIDTH_FACTOR: f64 = 4.0;

/// Eraser width relative to the style's line width.
pub const ERASER_WIDTH_FACTOR: f64 = 3.0;

/// Distance between text baselines, in multiples of the font size.
pub const TEXT_LINE_HEIGHT: f64 = 1.4;

/// Font size used when a remote text action omits one.
pub const DEFAULT_FONT_SIZE: f64 = 16.0;

/// Inserted images are scaled to fit within this share of the surface.
pub const IMAGE_FIT_RATIO: f64 = 0.8;

/// Maximum chord length when flattening circles.
const CURVE_TOLERANCE: f64 = 1.0;

/// Paint and effective width for a freehand segment drawn with `tool`.
pub fn stroke_paint(tool: Tool, color: Rgba, line_width: f64, opacity: f64) -> (Paint, f64) {
    match tool {
        Tool::Eraser => (Paint::erase(), line_width * ERASER_WIDTH_FACTOR),
        Tool::Highlighter => (
            Paint::multiply(color, HIGHLIGHTER_OPACITY),
            line_width * HIGHLIGHTER_WIDTH_FACTOR,
        ),
        _ => (Paint::normal(color, opacity), line_width),
    }
}

/// Size of an image scaled to fit within [`IMAGE_FIT_RATIO`] of `surface`.
/// Never upscales.
pub fn fit_image_size(width: f64, height: f64, surface: Size) -> Size {
    if width <= 0.0 || height <= 0.0 {
        return Size::ZERO;
    }
    let ratio = (surface.width * IMAGE_FIT_RATIO / width)
        .min(surface.height * IMAGE_FIT_RATIO / height)
        .min(1.0);
    Size::new(width * ratio, height * ratio)
}

#[derive(Debug, Clone, Copy)]
struct ActiveStroke {
    last: Point,
    tool: Tool,
    style: Style,
}

/// Pixel state of one whiteboard.
///
/// Local operations take an [`ActionSink`] and emit exactly the wire actions
/// peers need; [`RasterCanvas::apply_remote`] replays those actions and emits
/// nothing.
pub struct RasterCanvas {
    committed: Surface,
    overlay: Surface,
    background: Rgba,
    history: History,
    stroke: Option<ActiveStroke>,
    glyphs: Box<dyn GlyphRasterizer>,
}

impl std::fmt::Debug for RasterCanvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterCanvas")
            .field("committed", &self.committed)
            .field("background", &self.background)
            .field("history_len", &self.history.len())
            .field("stroking", &self.stroke.is_some())
            .finish()
    }
}

impl RasterCanvas {
    /// A blank canvas filled with `background`.
    pub fn new(width: u32, height: u32, background: Rgba, history_limit: usize) -> Self {
        let committed = Surface::filled(width, height, background);
        Self {
            history: History::new(committed.clone(), history_limit),
            overlay: Surface::new(width, height),
            committed,
            background,
            stroke: None,
            glyphs: Box::new(BlockGlyphs),
        }
    }

    pub fn from_config(config: &WhiteboardConfig) -> Self {
        Self::new(config.width, config.height, config.background, config.history_limit)
    }

    /// Use a different text rasterizer.
    pub fn with_glyphs(mut self, glyphs: Box<dyn GlyphRasterizer>) -> Self {
        self.glyphs = glyphs;
        self
    }

    pub fn width(&self) -> u32 {
        self.committed.width()
    }

    pub fn height(&self) -> u32 {
        self.committed.height()
    }

    pub fn size(&self) -> Size {
        Size::new(f64::from(self.width()), f64::from(self.height()))
    }

    pub fn background(&self) -> Rgba {
        self.background
    }

    pub fn committed(&self) -> &Surface {
        &self.committed
    }

    pub fn overlay(&self) -> &Surface {
        &self.overlay
    }

    /// Committed surface with the overlay flattened on top, for display.
    pub fn composed(&self) -> Surface {
        let mut out = self.committed.clone();
        out.draw_surface(&self.overlay);
        out
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn is_stroking(&self) -> bool {
        self.stroke.is_some()
    }

    fn push_history(&mut self) {
        self.history.push(self.committed.clone());
    }

    fn draw_segment(&mut self, from: Point, to: Point, tool: Tool, color: Rgba, line_width: f64, opacity: f64) {
        let (paint, width) = stroke_paint(tool, color, line_width, opacity);
        let mask = CoverageMask::segment(from, to, width, self.width(), self.height());
        self.committed.fill_mask(&mask, &paint);
    }

    fn draw_text(&mut self, text: &str, x: f64, y: f64, font_size: f64, color: Rgba, opacity: f64) {
        let paint = Paint::normal(color, opacity);
        for (i, line) in text.split('\n').enumerate() {
            let baseline = Point::new(x, y + i as f64 * TEXT_LINE_HEIGHT * font_size);
            let mask = self.glyphs.rasterize_line(line, baseline, font_size, self.width(), self.height());
            self.committed.fill_mask(&mask, &paint);
        }
    }

    // --- Freehand strokes ---

    /// Start a freehand stroke. Ignored for tools that don't draw freehand.
    pub fn begin_stroke(&mut self, point: Point, tool: Tool, style: &Style, sink: &mut dyn ActionSink) -> bool {
        if !tool.is_freehand() {
            return false;
        }
        let style = style.sanitized();
        self.stroke = Some(ActiveStroke { last: point, tool, style });
        sink.emit(WhiteboardAction::start(point, tool, &style));
        true
    }

    /// Draw one segment from the previous point to `point` and emit it.
    pub fn extend_stroke(&mut self, point: Point, sink: &mut dyn ActionSink) -> bool {
        let Some(stroke) = self.stroke else {
            return false;
        };
        let s = stroke.style;
        self.draw_segment(stroke.last, point, stroke.tool, s.color, s.line_width, s.opacity);
        sink.emit(WhiteboardAction::draw(stroke.last, point, stroke.tool, &s));
        self.stroke = Some(ActiveStroke { last: point, ..stroke });
        true
    }

    /// Finish the stroke: push one history entry and emit `end`.
    pub fn end_stroke(&mut self, sink: &mut dyn ActionSink) -> bool {
        if self.stroke.take().is_none() {
            return false;
        }
        self.push_history();
        sink.emit(WhiteboardAction::End);
        true
    }

    // --- Shapes ---

    /// Render a shape to the overlay only. Emits nothing.
    pub fn preview_shape(&mut self, kind: ShapeKind, start: Point, end: Point, style: &Style) {
        self.overlay.clear();
        let style = style.sanitized();
        stroke_shape(&mut self.overlay, kind, start, end, &style);
    }

    pub fn clear_overlay(&mut self) {
        self.overlay.clear();
    }

    /// Render a shape onto the committed surface, clear the overlay, push
    /// history and emit one `shape` action.
    pub fn commit_shape(
        &mut self,
        kind: ShapeKind,
        start: Point,
        end: Point,
        style: &Style,
        sink: &mut dyn ActionSink,
    ) {
        let style = style.sanitized();
        stroke_shape(&mut self.committed, kind, start, end, &style);
        self.overlay.clear();
        self.push_history();
        sink.emit(WhiteboardAction::shape(kind, start, end, &style));
    }

    // --- Images and text ---

    /// Draw an already decoded image, fitted and centered unless placed.
    pub fn insert_image(&mut self, src: String, image: &RgbaImage, placement: Placement, sink: &mut dyn ActionSink) {
        let (w, h) = image.dimensions();
        let size = fit_image_size(f64::from(w), f64::from(h), self.size());
        let x = placement.x.unwrap_or((self.size().width - size.width) / 2.0);
        let y = placement.y.unwrap_or((self.size().height - size.height) / 2.0);
        self.committed.draw_image(image, x, y, size.width, size.height);
        self.push_history();
        sink.emit(WhiteboardAction::Image {
            src,
            x,
            y,
            width: Some(size.width),
            height: Some(size.height),
        });
    }

    /// Draw text whose first baseline starts at `at`. Blank text is ignored.
    pub fn insert_text(
        &mut self,
        text: &str,
        at: Point,
        font_size: f64,
        style: &Style,
        sink: &mut dyn ActionSink,
    ) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        let style = style.sanitized();
        self.draw_text(text, at.x, at.y, font_size, style.color, style.opacity);
        self.push_history();
        sink.emit(WhiteboardAction::Text {
            text: text.to_string(),
            x: at.x,
            y: at.y,
            font_size,
            color: style.color,
            opacity: style.opacity,
        });
        true
    }

    /// Fill with the background, push history and emit `clear`.
    pub fn clear(&mut self, sink: &mut dyn ActionSink) {
        self.committed.fill(self.background);
        self.push_history();
        sink.emit(WhiteboardAction::Clear);
    }

    /// Back to a blank surface with a fresh history, as if newly created.
    /// A stroke in progress is kept.
    pub fn reset(&mut self) {
        self.committed.fill(self.background);
        self.overlay.clear();
        self.history = History::new(self.committed.clone(), self.history.limit());
    }

    // --- History ---

    /// Restore the previous snapshot. Local only; never emits.
    pub fn undo(&mut self) -> bool {
        match self.history.undo() {
            Some(snapshot) => self.committed.restore_from(snapshot),
            None => false,
        }
    }

    /// Restore the next snapshot. Local only; never emits.
    pub fn redo(&mut self) -> bool {
        match self.history.redo() {
            Some(snapshot) => self.committed.restore_from(snapshot),
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // --- Replay ---

    /// Reproduce a peer's action on the committed surface.
    ///
    /// `start` and `draw` never touch history; `end`, `shape`, `text`,
    /// `image` and `clear` push one entry, like their local counterparts.
    /// Object actions are not handled here. Returns whether the action was
    /// applied.
    pub fn apply_remote(&mut self, action: &WhiteboardAction) -> bool {
        match action {
            WhiteboardAction::Start { .. } => true,
            WhiteboardAction::Draw { from, to, tool, color, line_width, opacity } => {
                self.draw_segment(*from, *to, *tool, *color, *line_width, *opacity);
                true
            }
            WhiteboardAction::End => {
                self.push_history();
                true
            }
            WhiteboardAction::Shape { shape_type, start, end, color, line_width, opacity } => {
                let style = Style {
                    color: *color,
                    line_width: *line_width,
                    opacity: *opacity,
                    selected_shape: *shape_type,
                }
                .sanitized();
                stroke_shape(&mut self.committed, *shape_type, *start, *end, &style);
                self.push_history();
                true
            }
            WhiteboardAction::Text { text, x, y, font_size, color, opacity } => {
                let font_size = if *font_size > 0.0 { *font_size } else { DEFAULT_FONT_SIZE };
                self.draw_text(text, *x, *y, font_size, *color, *opacity);
                self.push_history();
                true
            }
            WhiteboardAction::Image { src, x, y, width, height } => match media::decode_image(src) {
                Ok(image) => {
                    let (w, h) = image.dimensions();
                    let width = width.unwrap_or(f64::from(w));
                    let height = height.unwrap_or(f64::from(h));
                    self.committed.draw_image(&image, *x, *y, width, height);
                    self.push_history();
                    true
                }
                Err(e) => {
                    log::warn!("Skipping remote image: {e}");
                    false
                }
            },
            // A local stroke in progress keeps going over the blank surface.
            WhiteboardAction::Clear => {
                self.committed.fill(self.background);
                self.overlay.clear();
                self.push_history();
                true
            }
            _ => false,
        }
    }

    // --- Export ---

    /// The committed surface as a data URI. Overlay content is not included.
    pub fn export(&self, format: ExportFormat) -> MediaResult<String> {
        let bytes = match format {
            ExportFormat::Png => media::encode_png(&self.committed)?,
            ExportFormat::Jpeg => media::encode_jpeg(&self.committed, self.background, JPEG_QUALITY)?,
        };
        Ok(media::encode_data_uri(&bytes, format.image_format().mime_type()))
    }
}

fn stroke_shape(surface: &mut Surface, kind: ShapeKind, start: Point, end: Point, style: &Style) {
    let outline = compute_shape_outline(kind, start, end);
    let mask = CoverageMask::stroke(
        &outline.polylines(CURVE_TOLERANCE),
        style.line_width,
        surface.width(),
        surface.height(),
    );
    surface.fill_mask(&mask, &Paint::normal(style.color, style.opacity));
}

//! Text rasterization seam.

use super::CoverageMask;
use kurbo::{Point, Rect};

/// Turns one line of text into coverage on a surface.
///
/// Font shaping is out of scope for the core; hosts with a real font stack
/// plug it in here. `origin` is the left end of the alphabetic baseline.
pub trait GlyphRasterizer: Send + Sync {
    fn rasterize_line(&self, line: &str, origin: Point, font_size: f64, clip_w: u32, clip_h: u32) -> CoverageMask;
}

/// Fallback rasterizer drawing every visible character as a solid cell.
///
/// Deterministic and dependency-free, so replays match pixel for pixel.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockGlyphs;

impl BlockGlyphs {
    /// Horizontal advance per character, in em.
    pub const ADVANCE: f64 = 0.6;
    /// Cell width, in em.
    pub const CELL_WIDTH: f64 = 0.5;
    /// Cell height above the baseline, in em.
    pub const CELL_HEIGHT: f64 = 0.7;
}

impl GlyphRasterizer for BlockGlyphs {
    fn rasterize_line(&self, line: &str, origin: Point, font_size: f64, clip_w: u32, clip_h: u32) -> CoverageMask {
        let count = line.chars().count() as f64;
        let area = Rect::new(
            origin.x,
            origin.y - font_size * Self::CELL_HEIGHT,
            origin.x + count * font_size * Self::ADVANCE,
            origin.y,
        );
        let mut mask = CoverageMask::new(area, clip_w, clip_h);
        for (i, ch) in line.chars().enumerate() {
            if ch.is_whitespace() {
                continue;
            }
            let left = origin.x + i as f64 * font_size * Self::ADVANCE;
            mask.fill_rect(Rect::new(
                left,
                origin.y - font_size * Self::CELL_HEIGHT,
                left + font_size * Self::CELL_WIDTH,
                origin.y,
            ));
        }
        mask
    }
}

//! CPU pixel surfaces and compositing.
//!
//! Surfaces hold straight (non-premultiplied) RGBA8 pixels. Every write goes
//! through [`Surface::composite`], which implements the three modes the
//! whiteboard needs: normal source-over, multiply (highlighter) and
//! destination-out (eraser). Compositing is plain `f64` arithmetic with
//! explicit rounding, so identical inputs produce identical bytes on every peer.

mod mask;
mod text;

pub use mask::CoverageMask;
pub use text::{BlockGlyphs, GlyphRasterizer};

use crate::color::Rgba;
use image::RgbaImage;
use kurbo::Rect;
use peniko::{BlendMode, Compose, Mix};
use std::fmt;

/// How a source color is combined with the destination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Paint {
    pub color: Rgba,
    /// Extra alpha multiplier in [0, 1].
    pub opacity: f64,
    pub blend: BlendMode,
}

impl Paint {
    /// Source-over with the given opacity.
    pub fn normal(color: Rgba, opacity: f64) -> Self {
        Self { color, opacity, blend: BlendMode::new(Mix::Normal, Compose::SrcOver) }
    }

    /// Multiply blend, then source-over.
    pub fn multiply(color: Rgba, opacity: f64) -> Self {
        Self { color, opacity, blend: BlendMode::new(Mix::Multiply, Compose::SrcOver) }
    }

    /// Destination-out: removes coverage from the destination.
    pub fn erase() -> Self {
        Self {
            color: Rgba::black(),
            opacity: 1.0,
            blend: BlendMode::new(Mix::Normal, Compose::DestOut),
        }
    }
}

/// A fixed-size RGBA8 pixel buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct Surface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl Surface {
    /// Fully transparent surface.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    /// Surface filled with a single color.
    pub fn filled(width: u32, height: u32, color: Rgba) -> Self {
        let mut surface = Self::new(width, height);
        surface.fill(color);
        surface
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height))
    }

    /// Raw RGBA bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = self.index(x, y);
        let p = &self.pixels[i..i + 4];
        Some(Rgba::new(p[0], p[1], p[2], p[3]))
    }

    /// Overwrite every pixel.
    pub fn fill(&mut self, color: Rgba) {
        let rgba = color.to_array();
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }

    /// Reset every pixel to transparent.
    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    /// Replace the contents with another surface of the same size.
    /// Returns `false` (and leaves the surface alone) on a size mismatch.
    pub fn restore_from(&mut self, other: &Surface) -> bool {
        if other.width != self.width || other.height != self.height {
            return false;
        }
        self.pixels.copy_from_slice(&other.pixels);
        true
    }

    /// Whether every pixel equals `color`.
    pub fn is_uniform(&self, color: Rgba) -> bool {
        let rgba = color.to_array();
        self.pixels.chunks_exact(4).all(|px| px == rgba)
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    /// Blend one source sample into pixel (x, y). `coverage` scales the source alpha.
    pub fn composite(&mut self, x: u32, y: u32, paint: &Paint, coverage: f64) {
        if x >= self.width || y >= self.height {
            return;
        }
        let sa = f64::from(paint.color.a) / 255.0 * paint.opacity.clamp(0.0, 1.0) * coverage.clamp(0.0, 1.0);
        if sa <= 0.0 {
            return;
        }
        let i = self.index(x, y);
        let dst = &mut self.pixels[i..i + 4];
        let da = f64::from(dst[3]) / 255.0;

        if paint.blend.compose == Compose::DestOut {
            let out_a = da * (1.0 - sa);
            if out_a <= 0.0 {
                dst.fill(0);
            } else {
                dst[3] = to_byte(out_a);
            }
            return;
        }

        let out_a = sa + da * (1.0 - sa);
        let src = [paint.color.r, paint.color.g, paint.color.b];
        for (channel, &s) in dst.iter_mut().take(3).zip(src.iter()) {
            let cs = f64::from(s) / 255.0;
            let cb = f64::from(*channel) / 255.0;
            let mixed = match paint.blend.mix {
                Mix::Multiply => cs * cb,
                _ => cs,
            };
            let co = sa * ((1.0 - da) * cs + da * mixed) + (1.0 - sa) * da * cb;
            *channel = to_byte(co / out_a);
        }
        dst[3] = to_byte(out_a);
    }

    /// Composite a coverage mask with a single paint.
    pub fn fill_mask(&mut self, mask: &CoverageMask, paint: &Paint) {
        for (x, y, coverage) in mask.samples() {
            if x >= 0 && y >= 0 {
                self.composite(x as u32, y as u32, paint, f64::from(coverage));
            }
        }
    }

    /// Draw an image with its top-left corner at (x, y), resampled to `width`×`height`.
    ///
    /// Only the part that lands on the surface is resampled, so the work is
    /// bounded by the surface size whatever the requested placement.
    pub fn draw_image(&mut self, image: &RgbaImage, x: f64, y: f64, width: f64, height: f64) {
        let (img_w, img_h) = image.dimensions();
        if img_w == 0 || img_h == 0 || ![x, y, width, height].iter().all(|v| v.is_finite()) {
            return;
        }
        let target_w = width.round();
        let target_h = height.round();
        if target_w < 1.0 || target_h < 1.0 {
            return;
        }
        let left = x.round();
        let top = y.round();
        let visible = Rect::new(left, top, left + target_w, top + target_h).intersect(self.bounds());
        if visible.width() < 1.0 || visible.height() < 1.0 {
            return;
        }

        // Source rows and columns that map onto the visible part.
        let scale_x = f64::from(img_w) / target_w;
        let scale_y = f64::from(img_h) / target_h;
        let src_x0 = (((visible.x0 - left) * scale_x).floor() as u32).min(img_w - 1);
        let src_y0 = (((visible.y0 - top) * scale_y).floor() as u32).min(img_h - 1);
        let src_x1 = (((visible.x1 - left) * scale_x).ceil() as u32).clamp(src_x0 + 1, img_w);
        let src_y1 = (((visible.y1 - top) * scale_y).ceil() as u32).clamp(src_y0 + 1, img_h);

        let out_w = visible.width() as u32;
        let out_h = visible.height() as u32;
        let crop = image::imageops::crop_imm(image, src_x0, src_y0, src_x1 - src_x0, src_y1 - src_y0).to_image();
        let source = if crop.dimensions() == (out_w, out_h) {
            crop
        } else {
            image::imageops::resize(&crop, out_w, out_h, image::imageops::FilterType::Triangle)
        };

        let dx0 = visible.x0 as u32;
        let dy0 = visible.y0 as u32;
        for (sx, sy, px) in source.enumerate_pixels() {
            let paint = Paint::normal(Rgba::new(px[0], px[1], px[2], px[3]), 1.0);
            self.composite(dx0 + sx, dy0 + sy, &paint, 1.0);
        }
    }

    /// Composite `other` over this surface (used to flatten the overlay for display).
    pub fn draw_surface(&mut self, other: &Surface) {
        let w = self.width.min(other.width);
        let h = self.height.min(other.height);
        for y in 0..h {
            for x in 0..w {
                if let Some(px) = other.pixel(x, y) {
                    if px.a > 0 {
                        self.composite(x, y, &Paint::normal(px, 1.0), 1.0);
                    }
                }
            }
        }
    }

    /// Copy into an `image` buffer.
    pub fn to_image(&self) -> RgbaImage {
        // Length always matches width * height * 4.
        RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }
}

fn to_byte(v: f64) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

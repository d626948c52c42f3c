//! Coverage masks for strokes and filled cells.

use crate::geometry::Polyline;
use kurbo::{Line, Point, Rect};

/// Per-pixel coverage in [0, 1] over a clipped pixel rectangle.
///
/// Overlapping segments of one stroke take the max coverage rather than
/// summing, so a translucent polyline does not darken at its joints.
#[derive(Debug, Clone)]
pub struct CoverageMask {
    x0: i64,
    y0: i64,
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl CoverageMask {
    /// Empty mask over `area`, clipped to a `clip_w`×`clip_h` surface.
    pub fn new(area: Rect, clip_w: u32, clip_h: u32) -> Self {
        let x0 = (area.x0.floor() as i64).max(0);
        let y0 = (area.y0.floor() as i64).max(0);
        let x1 = (area.x1.ceil() as i64).min(i64::from(clip_w));
        let y1 = (area.y1.ceil() as i64).min(i64::from(clip_h));
        let width = (x1 - x0).max(0) as usize;
        let height = (y1 - y0).max(0) as usize;
        Self { x0, y0, width, height, data: vec![0.0; width * height] }
    }

    /// Round-capped, round-joined stroke of the given polylines.
    pub fn stroke(polylines: &[Polyline], line_width: f64, clip_w: u32, clip_h: u32) -> Self {
        let half = (line_width / 2.0).max(0.5);
        let area = polylines
            .iter()
            .flat_map(|p| p.points.iter())
            .fold(None::<Rect>, |acc, &p| {
                Some(acc.map_or_else(|| Rect::from_points(p, p), |r| r.union_pt(p)))
            })
            .unwrap_or(Rect::ZERO)
            .inflate(half + 1.0, half + 1.0);
        let mut mask = Self::new(area, clip_w, clip_h);
        for polyline in polylines {
            if polyline.points.len() == 1 {
                let p = polyline.points[0];
                mask.add_segment(Line::new(p, p), half);
            }
            for segment in polyline.segments() {
                mask.add_segment(segment, half);
            }
        }
        mask
    }

    /// Single round-capped segment.
    pub fn segment(from: Point, to: Point, line_width: f64, clip_w: u32, clip_h: u32) -> Self {
        Self::stroke(&[Polyline::open(vec![from, to])], line_width, clip_w, clip_h)
    }

    fn add_segment(&mut self, segment: Line, half: f64) {
        let reach = half + 1.0;
        let bx0 = ((segment.p0.x.min(segment.p1.x) - reach).floor() as i64).max(self.x0);
        let by0 = ((segment.p0.y.min(segment.p1.y) - reach).floor() as i64).max(self.y0);
        let bx1 = ((segment.p0.x.max(segment.p1.x) + reach).ceil() as i64).min(self.x0 + self.width as i64);
        let by1 = ((segment.p0.y.max(segment.p1.y) + reach).ceil() as i64).min(self.y0 + self.height as i64);
        for py in by0..by1 {
            for px in bx0..bx1 {
                let center = Point::new(px as f64 + 0.5, py as f64 + 0.5);
                let d = distance_to_segment(center, segment);
                let coverage = (half + 0.5 - d).clamp(0.0, 1.0) as f32;
                if coverage > 0.0 {
                    let i = (py - self.y0) as usize * self.width + (px - self.x0) as usize;
                    if coverage > self.data[i] {
                        self.data[i] = coverage;
                    }
                }
            }
        }
    }

    /// Mark every pixel whose center lies inside `rect` as fully covered.
    pub fn fill_rect(&mut self, rect: Rect) {
        let rect = rect.abs();
        for py in 0..self.height {
            for px in 0..self.width {
                let cx = (self.x0 + px as i64) as f64 + 0.5;
                let cy = (self.y0 + py as i64) as f64 + 0.5;
                if cx >= rect.x0 && cx < rect.x1 && cy >= rect.y0 && cy < rect.y1 {
                    self.data[py * self.width + px] = 1.0;
                }
            }
        }
    }

    /// Non-zero samples as (x, y, coverage) in surface coordinates.
    pub fn samples(&self) -> impl Iterator<Item = (i64, i64, f32)> + '_ {
        self.data.iter().enumerate().filter(|(_, c)| **c > 0.0).map(move |(i, &c)| {
            let x = self.x0 + (i % self.width) as i64;
            let y = self.y0 + (i / self.width) as i64;
            (x, y, c)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.data.iter().all(|c| *c <= 0.0)
    }
}

/// Euclidean distance from `p` to the segment (degenerate segments act as points).
pub fn distance_to_segment(p: Point, segment: Line) -> f64 {
    let d = segment.p1 - segment.p0;
    let len_sq = d.hypot2();
    if len_sq < f64::EPSILON {
        return p.distance(segment.p0);
    }
    let t = ((p - segment.p0).dot(d) / len_sq).clamp(0.0, 1.0);
    p.distance(segment.p0 + d * t)
}

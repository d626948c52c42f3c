//! Shape outline math.
//!
//! Pure functions turning the two points of a drag gesture into the outline
//! of a rectangle, circle, line, arrow or triangle. Nothing here touches pixels.

use crate::tools::ShapeKind;
use kurbo::{BezPath, Circle, Line, Point, Rect, Shape as KurboShape, Vec2};
use std::f64::consts::{PI, TAU};

/// Length of each arrowhead barb at 1.0 scale.
pub const ARROW_HEAD_LENGTH: f64 = 15.0;

/// Half-angle between the shaft and each barb.
pub const ARROW_HEAD_ANGLE: f64 = PI / 6.0;

/// Drawing instructions for a shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShapeOutline {
    /// Axis-aligned box from `origin`; `width`/`height` keep their sign.
    Rectangle { origin: Point, width: f64, height: f64 },
    Circle { center: Point, radius: f64 },
    Line(Line),
    Arrow { shaft: Line, head: [Line; 2] },
    /// Apex followed by the two base corners.
    Triangle([Point; 3]),
}

/// An open or closed chain of points, ready to be stroked.
#[derive(Debug, Clone, PartialEq)]
pub struct Polyline {
    pub points: Vec<Point>,
    pub closed: bool,
}

impl Polyline {
    pub fn open(points: Vec<Point>) -> Self {
        Self { points, closed: false }
    }

    pub fn closed(points: Vec<Point>) -> Self {
        Self { points, closed: true }
    }

    /// Consecutive segments, including the closing one when closed.
    pub fn segments(&self) -> impl Iterator<Item = Line> + '_ {
        let closing = match (self.closed, self.points.first(), self.points.last()) {
            (true, Some(&first), Some(&last)) if self.points.len() > 2 => Some(Line::new(last, first)),
            _ => None,
        };
        self.points
            .windows(2)
            .map(|pair| Line::new(pair[0], pair[1]))
            .chain(closing)
    }
}

/// Compute the outline of `kind` spanned by a drag from `start` to `end`.
pub fn compute_shape_outline(kind: ShapeKind, start: Point, end: Point) -> ShapeOutline {
    let width = end.x - start.x;
    let height = end.y - start.y;
    match kind {
        ShapeKind::Rectangle => ShapeOutline::Rectangle { origin: start, width, height },
        ShapeKind::Circle => ShapeOutline::Circle {
            center: start.midpoint(end),
            radius: start.distance(end) / 2.0,
        },
        ShapeKind::Line => ShapeOutline::Line(Line::new(start, end)),
        ShapeKind::Arrow => ShapeOutline::Arrow {
            shaft: Line::new(start, end),
            head: arrowhead(start, end, ARROW_HEAD_LENGTH),
        },
        ShapeKind::Triangle => ShapeOutline::Triangle([
            Point::new(start.x + width / 2.0, start.y),
            Point::new(start.x, end.y),
            Point::new(end.x, end.y),
        ]),
    }
}

/// The two barbs of an arrowhead anchored at `end`, rotated to the shaft angle.
pub fn arrowhead(start: Point, end: Point, length: f64) -> [Line; 2] {
    let angle = (end.y - start.y).atan2(end.x - start.x);
    let barb = |offset: f64| {
        let a = angle + offset;
        Line::new(end, end - Vec2::new(length * a.cos(), length * a.sin()))
    };
    [barb(-ARROW_HEAD_ANGLE), barb(ARROW_HEAD_ANGLE)]
}

impl ShapeOutline {
    /// Normalized bounding box.
    pub fn bounds(&self) -> Rect {
        match *self {
            ShapeOutline::Rectangle { origin, width, height } => {
                Rect::from_points(origin, origin + Vec2::new(width, height))
            }
            ShapeOutline::Circle { center, radius } => Circle::new(center, radius).bounding_box(),
            ShapeOutline::Line(line) => Rect::from_points(line.p0, line.p1),
            ShapeOutline::Arrow { shaft, head } => head
                .iter()
                .fold(Rect::from_points(shaft.p0, shaft.p1), |acc, barb| acc.union_pt(barb.p1)),
            ShapeOutline::Triangle([a, b, c]) => Rect::from_points(a, b).union_pt(c),
        }
    }

    /// Flatten into stroke-ready polylines. `tolerance` bounds the chord length used for circles.
    pub fn polylines(&self, tolerance: f64) -> Vec<Polyline> {
        match *self {
            ShapeOutline::Rectangle { origin, width, height } => {
                let far = origin + Vec2::new(width, height);
                vec![Polyline::closed(vec![
                    origin,
                    Point::new(far.x, origin.y),
                    far,
                    Point::new(origin.x, far.y),
                ])]
            }
            ShapeOutline::Circle { center, radius } => {
                let chord = tolerance.max(0.25);
                let steps = ((TAU * radius) / chord).ceil().clamp(12.0, 720.0) as usize;
                let points = (0..steps)
                    .map(|i| {
                        let theta = TAU * i as f64 / steps as f64;
                        Point::new(center.x + radius * theta.cos(), center.y + radius * theta.sin())
                    })
                    .collect();
                vec![Polyline::closed(points)]
            }
            ShapeOutline::Line(line) => vec![Polyline::open(vec![line.p0, line.p1])],
            ShapeOutline::Arrow { shaft, head } => {
                let mut lines = vec![Polyline::open(vec![shaft.p0, shaft.p1])];
                lines.extend(head.iter().map(|barb| Polyline::open(vec![barb.p0, barb.p1])));
                lines
            }
            ShapeOutline::Triangle(points) => vec![Polyline::closed(points.to_vec())],
        }
    }

    /// Vector path of the outline, for renderers that stroke paths themselves.
    pub fn to_path(&self) -> BezPath {
        match *self {
            ShapeOutline::Circle { center, radius } => Circle::new(center, radius).to_path(0.1),
            _ => {
                let mut path = BezPath::new();
                for polyline in self.polylines(1.0) {
                    let mut points = polyline.points.iter();
                    if let Some(&first) = points.next() {
                        path.move_to(first);
                        for &p in points {
                            path.line_to(p);
                        }
                        if polyline.closed {
                            path.close_path();
                        }
                    }
                }
                path
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_circle_from_diameter() {
        let outline = compute_shape_outline(ShapeKind::Circle, Point::new(0.0, 0.0), Point::new(10.0, 0.0));
        match outline {
            ShapeOutline::Circle { center, radius } => {
                assert_eq!(center, Point::new(5.0, 0.0));
                assert!(close(radius, 5.0));
            }
            other => panic!("expected circle, got {other:?}"),
        }
    }

    #[test]
    fn test_inverted_rectangle_bounds() {
        let outline =
            compute_shape_outline(ShapeKind::Rectangle, Point::new(0.0, 0.0), Point::new(-5.0, 10.0));
        let bounds = outline.bounds();
        assert_eq!((bounds.x0, bounds.x1), (-5.0, 0.0));
        assert_eq!((bounds.y0, bounds.y1), (0.0, 10.0));
    }

    #[test]
    fn test_arrowhead_angle_and_length() {
        let outline = compute_shape_outline(ShapeKind::Arrow, Point::new(0.0, 0.0), Point::new(100.0, 0.0));
        let ShapeOutline::Arrow { shaft, head } = outline else {
            panic!("expected arrow");
        };
        let shaft_dir = (shaft.p0 - shaft.p1).normalize();
        for barb in head {
            let v = barb.p1 - barb.p0;
            assert!(close(v.hypot(), ARROW_HEAD_LENGTH));
            let cos = v.normalize().dot(shaft_dir);
            assert!(close(cos.acos(), PI / 6.0));
        }
        // Barbs mirror each other across the shaft.
        assert!(close(head[0].p1.y, -head[1].p1.y));
        assert!(close(head[0].p1.x, 100.0 - 15.0 * (PI / 6.0).cos()));
    }

    #[test]
    fn test_triangle_apex_and_base() {
        let outline =
            compute_shape_outline(ShapeKind::Triangle, Point::new(10.0, 10.0), Point::new(30.0, 40.0));
        assert_eq!(
            outline,
            ShapeOutline::Triangle([Point::new(20.0, 10.0), Point::new(10.0, 40.0), Point::new(30.0, 40.0)])
        );
    }

    #[test]
    fn test_closed_polyline_segments() {
        let outline = compute_shape_outline(ShapeKind::Rectangle, Point::new(0.0, 0.0), Point::new(4.0, 2.0));
        let polylines = outline.polylines(1.0);
        assert_eq!(polylines.len(), 1);
        assert_eq!(polylines[0].segments().count(), 4);

        let arrow = compute_shape_outline(ShapeKind::Arrow, Point::new(0.0, 0.0), Point::new(50.0, 50.0));
        let segments: usize = arrow.polylines(1.0).iter().map(|p| p.segments().count()).sum();
        assert_eq!(segments, 3);
    }

    #[test]
    fn test_circle_polyline_stays_on_radius() {
        let outline = compute_shape_outline(ShapeKind::Circle, Point::new(0.0, 0.0), Point::new(40.0, 0.0));
        for p in &outline.polylines(1.0)[0].points {
            assert!(close(p.distance(Point::new(20.0, 0.0)), 20.0));
        }
    }
}

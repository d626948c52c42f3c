//! Pointer input state machine.
//!
//! Turns pointer events plus the active tool into canvas primitives. Tools
//! that don't draw (select, laser, sticky, pan) never touch the canvas; their
//! intent comes back as an [`InputEvent`] for the shell to handle.

use crate::action::ActionSink;
use crate::camera::Camera;
use crate::canvas::RasterCanvas;
use crate::tools::{ShapeKind, Style, Tool};
use kurbo::{Point, Vec2};
use std::collections::VecDeque;
use std::time::Duration;

/// Number of positions kept in the laser trail.
pub const LASER_TRAIL_LENGTH: usize = 20;

/// How often the laser trail loses its oldest point.
pub const LASER_DECAY_INTERVAL: Duration = Duration::from_millis(50);

/// Gesture state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum InputState {
    #[default]
    Idle,
    /// A freehand stroke is in progress on the canvas.
    Drawing,
    /// Shape tool held down; only the overlay changes.
    ShapePreview {
        kind: ShapeKind,
        start: Point,
        current: Point,
        style: Style,
    },
    /// Waiting for text to be typed at `at`.
    TextEntry { at: Point },
    /// Sticky tool pressed; the note is placed on release.
    StickyPlacement { at: Point },
}

/// Intent that the shell handles outside the raster canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// Move the view by a screen-space delta.
    PanBy(Vec2),
    LaserMoved(Point),
    TextRequested(Point),
    StickyRequested(Point),
}

/// Drives a [`RasterCanvas`] from pointer input.
#[derive(Debug, Clone)]
pub struct InputController {
    tool: Tool,
    style: Style,
    state: InputState,
    pan_anchor: Option<Point>,
}

impl InputController {
    pub fn new(tool: Tool, style: Style) -> Self {
        Self { tool, style, state: InputState::Idle, pan_anchor: None }
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    /// Style for operations started from now on. In-flight gestures keep
    /// the style they captured.
    pub fn style_mut(&mut self) -> &mut Style {
        &mut self.style
    }

    pub fn state(&self) -> &InputState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == InputState::Idle && self.pan_anchor.is_none()
    }

    /// Switch tools, finishing a stroke or discarding a preview first.
    pub fn set_tool(&mut self, tool: Tool, canvas: &mut RasterCanvas, sink: &mut dyn ActionSink) {
        if tool == self.tool {
            return;
        }
        self.finish_gesture(canvas, sink);
        self.tool = tool;
    }

    /// End whatever gesture is in progress. Strokes are kept, shape previews
    /// and pending text or sticky placements are dropped.
    pub fn finish_gesture(&mut self, canvas: &mut RasterCanvas, sink: &mut dyn ActionSink) {
        match self.state {
            InputState::Drawing => {
                canvas.end_stroke(sink);
            }
            InputState::ShapePreview { .. } => canvas.clear_overlay(),
            InputState::Idle | InputState::TextEntry { .. } | InputState::StickyPlacement { .. } => {}
        }
        self.state = InputState::Idle;
        self.pan_anchor = None;
    }

    pub fn pointer_down(
        &mut self,
        screen: Point,
        camera: &Camera,
        canvas: &mut RasterCanvas,
        sink: &mut dyn ActionSink,
    ) -> Option<InputEvent> {
        let point = camera.screen_to_canvas(screen);
        match self.tool {
            tool if tool.is_freehand() => {
                if canvas.begin_stroke(point, tool, &self.style, sink) {
                    self.state = InputState::Drawing;
                }
                None
            }
            Tool::Shape => {
                self.state = InputState::ShapePreview {
                    kind: self.style.selected_shape,
                    start: point,
                    current: point,
                    style: self.style,
                };
                None
            }
            Tool::Text => {
                self.state = InputState::TextEntry { at: point };
                Some(InputEvent::TextRequested(point))
            }
            Tool::Sticky => {
                self.state = InputState::StickyPlacement { at: point };
                None
            }
            Tool::Pan => {
                self.pan_anchor = Some(screen);
                None
            }
            Tool::Laser => Some(InputEvent::LaserMoved(point)),
            _ => None,
        }
    }

    pub fn pointer_move(
        &mut self,
        screen: Point,
        camera: &Camera,
        canvas: &mut RasterCanvas,
        sink: &mut dyn ActionSink,
    ) -> Option<InputEvent> {
        let point = camera.screen_to_canvas(screen);
        if let Some(anchor) = self.pan_anchor {
            self.pan_anchor = Some(screen);
            return Some(InputEvent::PanBy(screen - anchor));
        }
        match &mut self.state {
            InputState::Drawing => {
                canvas.extend_stroke(point, sink);
                None
            }
            InputState::ShapePreview { kind, start, current, style } => {
                *current = point;
                canvas.preview_shape(*kind, *start, point, style);
                None
            }
            _ if self.tool == Tool::Laser => Some(InputEvent::LaserMoved(point)),
            _ => None,
        }
    }

    pub fn pointer_up(
        &mut self,
        screen: Point,
        camera: &Camera,
        canvas: &mut RasterCanvas,
        sink: &mut dyn ActionSink,
    ) -> Option<InputEvent> {
        let point = camera.screen_to_canvas(screen);
        self.pan_anchor = None;
        match self.state {
            InputState::Drawing => {
                canvas.end_stroke(sink);
                self.state = InputState::Idle;
                None
            }
            InputState::ShapePreview { kind, start, style, .. } => {
                canvas.commit_shape(kind, start, point, &style, sink);
                self.state = InputState::Idle;
                None
            }
            InputState::StickyPlacement { at } => {
                self.state = InputState::Idle;
                Some(InputEvent::StickyRequested(at))
            }
            InputState::Idle | InputState::TextEntry { .. } => None,
        }
    }

    /// Draw the typed text at the pending position. Returns whether anything was drawn.
    pub fn submit_text(
        &mut self,
        text: &str,
        font_size: f64,
        canvas: &mut RasterCanvas,
        sink: &mut dyn ActionSink,
    ) -> bool {
        let InputState::TextEntry { at } = self.state else {
            return false;
        };
        self.state = InputState::Idle;
        canvas.insert_text(text, at, font_size, &self.style, sink)
    }

    pub fn cancel_text(&mut self) {
        if matches!(self.state, InputState::TextEntry { .. }) {
            self.state = InputState::Idle;
        }
    }
}

impl Default for InputController {
    fn default() -> Self {
        Self::new(Tool::default(), Style::default())
    }
}

/// Fading trail of recent laser positions. Never leaves this client.
#[derive(Debug, Clone, Default)]
pub struct LaserPointer {
    trail: VecDeque<Point>,
}

impl LaserPointer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, point: Point) {
        self.trail.push_back(point);
        while self.trail.len() > LASER_TRAIL_LENGTH {
            self.trail.pop_front();
        }
    }

    /// Drop the oldest point. Call once per [`LASER_DECAY_INTERVAL`].
    pub fn decay(&mut self) {
        self.trail.pop_front();
    }

    pub fn clear(&mut self) {
        self.trail.clear();
    }

    /// Oldest first.
    pub fn trail(&self) -> impl Iterator<Item = &Point> {
        self.trail.iter()
    }

    pub fn head(&self) -> Option<Point> {
        self.trail.back().copied()
    }

    pub fn len(&self) -> usize {
        self.trail.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trail.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Outbox, WhiteboardAction};
    use crate::color::Rgba;

    fn setup(tool: Tool) -> (InputController, Camera, RasterCanvas, Outbox) {
        (
            InputController::new(tool, Style::default()),
            Camera::new(),
            RasterCanvas::new(200, 200, Rgba::white(), 50),
            Outbox::new(),
        )
    }

    #[test]
    fn test_freehand_gesture() {
        let (mut input, camera, mut canvas, mut out) = setup(Tool::Pen);
        input.pointer_down(Point::new(10.0, 10.0), &camera, &mut canvas, &mut out);
        assert_eq!(input.state(), &InputState::Drawing);
        input.pointer_move(Point::new(20.0, 10.0), &camera, &mut canvas, &mut out);
        input.pointer_up(Point::new(20.0, 10.0), &camera, &mut canvas, &mut out);
        assert!(input.is_idle());
        let kinds: Vec<&str> = out.take().iter().map(WhiteboardAction::kind).collect();
        assert_eq!(kinds, vec!["start", "draw", "end"]);
    }

    #[test]
    fn test_input_is_mapped_through_camera() {
        let (mut input, mut camera, mut canvas, mut out) = setup(Tool::Pen);
        camera.offset = Vec2::new(10.0, 0.0);
        camera.zoom = 2.0;
        input.pointer_down(Point::new(30.0, 40.0), &camera, &mut canvas, &mut out);
        let actions = out.take();
        assert!(matches!(actions.first(), Some(WhiteboardAction::Start { point, .. }) if *point == Point::new(10.0, 20.0)));
    }

    #[test]
    fn test_shape_preview_emits_only_on_release() {
        let (mut input, camera, mut canvas, mut out) = setup(Tool::Shape);
        input.pointer_down(Point::new(0.0, 0.0), &camera, &mut canvas, &mut out);
        for x in 1..=10 {
            input.pointer_move(Point::new(f64::from(x) * 10.0, 50.0), &camera, &mut canvas, &mut out);
            assert!(!canvas.overlay().is_uniform(Rgba::transparent()));
        }
        assert!(out.is_empty());
        input.pointer_up(Point::new(100.0, 50.0), &camera, &mut canvas, &mut out);
        assert_eq!(out.len(), 1);
        assert!(canvas.overlay().is_uniform(Rgba::transparent()));
        assert!(input.is_idle());
    }

    #[test]
    fn test_style_is_captured_at_gesture_start() {
        let (mut input, camera, mut canvas, mut out) = setup(Tool::Shape);
        input.pointer_down(Point::new(0.0, 0.0), &camera, &mut canvas, &mut out);
        input.style_mut().color = Rgba::new(0, 255, 0, 255);
        input.pointer_up(Point::new(40.0, 40.0), &camera, &mut canvas, &mut out);
        let actions = out.take();
        let [WhiteboardAction::Shape { color, .. }] = actions.as_slice() else {
            panic!("expected one shape");
        };
        assert_eq!(*color, Style::default().color);
    }

    #[test]
    fn test_tool_switch_mid_gesture() {
        let (mut input, camera, mut canvas, mut out) = setup(Tool::Pen);
        input.pointer_down(Point::new(10.0, 10.0), &camera, &mut canvas, &mut out);
        input.pointer_move(Point::new(30.0, 30.0), &camera, &mut canvas, &mut out);
        input.set_tool(Tool::Shape, &mut canvas, &mut out);
        assert!(input.is_idle());
        assert_eq!(out.take().last(), Some(&WhiteboardAction::End));

        input.pointer_down(Point::new(10.0, 10.0), &camera, &mut canvas, &mut out);
        input.pointer_move(Point::new(60.0, 60.0), &camera, &mut canvas, &mut out);
        input.set_tool(Tool::Select, &mut canvas, &mut out);
        assert!(canvas.overlay().is_uniform(Rgba::transparent()));
        assert!(out.is_empty());
        // Release after the switch is harmless.
        assert_eq!(input.pointer_up(Point::new(60.0, 60.0), &camera, &mut canvas, &mut out), None);
    }

    #[test]
    fn test_non_drawing_tools_bypass_canvas() {
        let (mut input, camera, mut canvas, mut out) = setup(Tool::Pan);
        input.pointer_down(Point::new(10.0, 10.0), &camera, &mut canvas, &mut out);
        let event = input.pointer_move(Point::new(15.0, 7.0), &camera, &mut canvas, &mut out);
        assert_eq!(event, Some(InputEvent::PanBy(Vec2::new(5.0, -3.0))));
        input.pointer_up(Point::new(15.0, 7.0), &camera, &mut canvas, &mut out);

        input.set_tool(Tool::Laser, &mut canvas, &mut out);
        let event = input.pointer_move(Point::new(3.0, 4.0), &camera, &mut canvas, &mut out);
        assert_eq!(event, Some(InputEvent::LaserMoved(Point::new(3.0, 4.0))));

        input.set_tool(Tool::Sticky, &mut canvas, &mut out);
        input.pointer_down(Point::new(50.0, 60.0), &camera, &mut canvas, &mut out);
        let event = input.pointer_up(Point::new(50.0, 60.0), &camera, &mut canvas, &mut out);
        assert_eq!(event, Some(InputEvent::StickyRequested(Point::new(50.0, 60.0))));

        assert!(out.is_empty());
        assert!(canvas.committed().is_uniform(Rgba::white()));
    }

    #[test]
    fn test_text_entry() {
        let (mut input, camera, mut canvas, mut out) = setup(Tool::Text);
        let event = input.pointer_down(Point::new(20.0, 40.0), &camera, &mut canvas, &mut out);
        assert_eq!(event, Some(InputEvent::TextRequested(Point::new(20.0, 40.0))));
        assert!(input.submit_text("hi", 18.0, &mut canvas, &mut out));
        assert!(!input.submit_text("again", 18.0, &mut canvas, &mut out));
        let actions = out.take();
        assert!(matches!(actions.as_slice(), [WhiteboardAction::Text { x, y, .. }] if (*x, *y) == (20.0, 40.0)));
    }

    #[test]
    fn test_laser_trail_is_bounded_and_decays() {
        let mut laser = LaserPointer::new();
        for i in 0..30 {
            laser.push(Point::new(f64::from(i), 0.0));
        }
        assert_eq!(laser.len(), LASER_TRAIL_LENGTH);
        assert_eq!(laser.trail().next(), Some(&Point::new(10.0, 0.0)));
        assert_eq!(laser.head(), Some(Point::new(29.0, 0.0)));
        laser.decay();
        assert_eq!(laser.len(), LASER_TRAIL_LENGTH - 1);
        laser.clear();
        assert!(laser.is_empty());
    }
}

//! The whiteboard session: one canvas, its overlay objects, the local input
//! pipeline and the sync session, wired together.
//!
//! Every local mutation goes out through the [`SyncSession`] exactly once.
//! Peer actions come back through [`Whiteboard::handle_message`] or
//! [`Whiteboard::pump`] and are applied without re-emitting.

use crate::action::{ActionSink, WhiteboardAction};
use crate::camera::Camera;
use crate::canvas::RasterCanvas;
use crate::color::Rgba;
use crate::config::WhiteboardConfig;
use crate::error::{MediaResult, RecordingError};
use crate::input::{InputController, InputEvent, LaserPointer};
use crate::media::{
    self, ExportFormat, ImageEvent, ImageLoader, MathRenderer, PageRasterizer, Placement, RasterizedDocument,
};
use crate::objects::{CanvasDocument, DocumentPatch, ObjectStore, StickyNote, StickyPatch};
use crate::recording::{CaptureBackend, Recorder};
use crate::sync::{SyncEvent, SyncSession, Transport};
use crate::tools::{ShapeKind, Style, Tool, random_sticky_color};
use kurbo::{Point, Size};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A transient, non-blocking message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, message: message.into() }
    }
}

/// Modifier keys held during a key press.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub ctrl: bool,
    pub shift: bool,
    /// Cmd on macOS.
    pub meta: bool,
}

impl Modifiers {
    pub const NONE: Self = Self { ctrl: false, shift: false, meta: false };

    pub fn command(self) -> bool {
        self.ctrl || self.meta
    }
}

pub struct Whiteboard {
    config: WhiteboardConfig,
    canvas: RasterCanvas,
    objects: ObjectStore,
    input: InputController,
    camera: Camera,
    laser: LaserPointer,
    images: ImageLoader,
    sync: SyncSession,
    recorder: Option<Recorder>,
    notices: Vec<Notice>,
}

impl Whiteboard {
    pub fn new(config: WhiteboardConfig, session_id: impl Into<String>) -> Self {
        let canvas = RasterCanvas::from_config(&config);
        let camera = Camera::from_config(&config);
        let input = InputController::new(Tool::default(), config.default_style.sanitized());
        Self {
            config,
            canvas,
            objects: ObjectStore::new(),
            input,
            camera,
            laser: LaserPointer::new(),
            images: ImageLoader::new(),
            sync: SyncSession::new(session_id),
            recorder: None,
            notices: Vec::new(),
        }
    }

    pub fn config(&self) -> &WhiteboardConfig {
        &self.config
    }

    pub fn canvas(&self) -> &RasterCanvas {
        &self.canvas
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn laser(&self) -> &LaserPointer {
        &self.laser
    }

    pub fn input(&self) -> &InputController {
        &self.input
    }

    pub fn sync(&self) -> &SyncSession {
        &self.sync
    }

    pub fn sync_mut(&mut self) -> &mut SyncSession {
        &mut self.sync
    }

    fn surface_size(&self) -> Size {
        self.canvas.size()
    }

    // --- Notices ---

    pub fn notify(&mut self, notice: Notice) {
        match notice.level {
            NoticeLevel::Info => log::info!("{}", notice.message),
            NoticeLevel::Error => log::warn!("{}", notice.message),
        }
        self.notices.push(notice);
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    // --- Toolbar ---

    pub fn tool(&self) -> Tool {
        self.input.tool()
    }

    pub fn style(&self) -> &Style {
        self.input.style()
    }

    pub fn set_tool(&mut self, tool: Tool) {
        if tool != Tool::Laser {
            self.laser.clear();
        }
        self.input.set_tool(tool, &mut self.canvas, &mut self.sync);
    }

    pub fn set_color(&mut self, color: Rgba) {
        self.input.style_mut().color = color;
    }

    pub fn set_line_width(&mut self, width: f64) {
        let style = self.input.style_mut();
        style.line_width = width;
        *style = style.sanitized();
    }

    pub fn set_opacity(&mut self, opacity: f64) {
        let style = self.input.style_mut();
        style.opacity = opacity;
        *style = style.sanitized();
    }

    pub fn set_shape(&mut self, kind: ShapeKind) {
        self.input.style_mut().selected_shape = kind;
    }

    /// Handle a key press. Returns whether it was consumed.
    pub fn handle_key(&mut self, key: &str, modifiers: Modifiers) -> bool {
        if modifiers.command() {
            if key.eq_ignore_ascii_case("z") {
                if modifiers.shift {
                    self.redo();
                } else {
                    self.undo();
                }
                return true;
            }
            return false;
        }
        match Tool::from_shortcut(key) {
            Some(tool) => {
                self.set_tool(tool);
                true
            }
            None => false,
        }
    }

    // --- Pointer input ---

    pub fn pointer_down(&mut self, screen: Point) {
        let event = self.input.pointer_down(screen, &self.camera, &mut self.canvas, &mut self.sync);
        self.route(event);
    }

    pub fn pointer_move(&mut self, screen: Point) {
        let event = self.input.pointer_move(screen, &self.camera, &mut self.canvas, &mut self.sync);
        self.route(event);
    }

    pub fn pointer_up(&mut self, screen: Point) {
        let event = self.input.pointer_up(screen, &self.camera, &mut self.canvas, &mut self.sync);
        self.route(event);
    }

    fn route(&mut self, event: Option<InputEvent>) {
        match event {
            Some(InputEvent::PanBy(delta)) => self.camera.pan(delta),
            Some(InputEvent::LaserMoved(point)) => self.laser.push(point),
            Some(InputEvent::StickyRequested(point)) => {
                self.add_sticky_at(point);
            }
            Some(InputEvent::TextRequested(_)) | None => {}
        }
    }

    /// Draw text at the position picked with the text tool.
    pub fn submit_text(&mut self, text: &str) -> bool {
        let font_size = self.config.font_size;
        self.input.submit_text(text, font_size, &mut self.canvas, &mut self.sync)
    }

    pub fn cancel_text(&mut self) {
        self.input.cancel_text();
    }

    // --- Sticky notes ---

    /// Create a note centred on `at`. Returns its id.
    pub fn add_sticky_at(&mut self, at: Point) -> String {
        let note = StickyNote::centered_at(at, random_sticky_color());
        let id = note.id.clone();
        self.objects.add_sticky(note.clone());
        self.sync.emit(WhiteboardAction::StickyAdd { note });
        id
    }

    pub fn update_sticky(&mut self, id: &str, patch: StickyPatch) -> bool {
        if !self.objects.update_sticky(id, &patch) {
            return false;
        }
        self.sync.emit(WhiteboardAction::StickyUpdate { id: id.to_string(), updates: patch });
        true
    }

    /// Drag a note, keeping it inside the surface.
    pub fn move_sticky(&mut self, id: &str, to: Point) -> bool {
        let surface = self.surface_size();
        let Some(to) = self.objects.sticky(id).map(|note| note.clamped_position(to, surface)) else {
            return false;
        };
        self.update_sticky(id, StickyPatch::position(to))
    }

    pub fn delete_sticky(&mut self, id: &str) -> bool {
        if self.objects.remove_sticky(id).is_none() {
            return false;
        }
        self.sync.emit(WhiteboardAction::StickyDelete { id: id.to_string() });
        true
    }

    // --- Documents ---

    /// Put a whole rasterized document on the board. Returns its id.
    pub fn add_document(&mut self, source: &RasterizedDocument) -> Option<String> {
        if source.page_images.is_empty() {
            self.notify(Notice::error(format!("{} has no pages to show", source.name)));
            return None;
        }
        let doc = CanvasDocument::new(source.name.clone(), source.page_images.clone());
        let id = doc.id.clone();
        self.objects.add_document(doc.clone());
        self.sync.emit(WhiteboardAction::DocAdd { doc });
        Some(id)
    }

    pub fn update_document(&mut self, id: &str, patch: DocumentPatch) -> bool {
        if !self.objects.update_document(id, &patch) {
            return false;
        }
        self.sync.emit(WhiteboardAction::DocUpdate { doc_id: id.to_string(), updates: patch });
        true
    }

    /// Drag a document, keeping part of it on screen.
    pub fn move_document(&mut self, id: &str, to: Point) -> bool {
        let surface = self.surface_size();
        let Some(to) = self.objects.document(id).map(|doc| doc.clamped_position(to, surface)) else {
            return false;
        };
        self.update_document(id, DocumentPatch::position(to))
    }

    pub fn resize_document(&mut self, id: &str, size: Size) -> bool {
        self.update_document(id, DocumentPatch::size(CanvasDocument::clamped_size(size)))
    }

    pub fn go_to_page(&mut self, id: &str, page: usize) -> bool {
        let Some(page) = self.objects.document(id).map(|doc| doc.clamp_page(page)) else {
            return false;
        };
        self.update_document(id, DocumentPatch::page(page))
    }

    pub fn next_page(&mut self, id: &str) -> bool {
        match self.objects.document(id).map(CanvasDocument::next_page) {
            Some(page) => self.update_document(id, DocumentPatch::page(page)),
            None => false,
        }
    }

    pub fn previous_page(&mut self, id: &str) -> bool {
        match self.objects.document(id).map(CanvasDocument::previous_page) {
            Some(page) => self.update_document(id, DocumentPatch::page(page)),
            None => false,
        }
    }

    pub fn remove_document(&mut self, id: &str) -> bool {
        if self.objects.remove_document(id).is_none() {
            return false;
        }
        self.sync.emit(WhiteboardAction::DocRemove { doc_id: id.to_string() });
        true
    }

    // --- Uploads and images ---

    /// Queue a data URI for decoding. It is committed by a later [`poll`](Self::poll).
    pub fn insert_image(&mut self, src: impl Into<String>, placement: Placement) -> u64 {
        self.images.request(src, placement)
    }

    pub fn upload_image(&mut self, bytes: &[u8], placement: Placement) -> Option<u64> {
        match media::image_data_uri(bytes) {
            Ok(src) => Some(self.insert_image(src, placement)),
            Err(e) => {
                self.notify(Notice::error(format!("Failed to load image: {e}")));
                None
            }
        }
    }

    /// Rasterize an uploaded PDF. The caller decides whether to send a page
    /// or the whole document.
    pub fn upload_pdf(&mut self, rasterizer: &dyn PageRasterizer, name: &str, pdf: &[u8]) -> Option<RasterizedDocument> {
        match media::rasterize_document(rasterizer, name, pdf) {
            Ok(doc) => Some(doc),
            Err(e) => {
                self.notify(Notice::error(format!("Failed to process PDF: {e}")));
                None
            }
        }
    }

    /// Insert one page of a rasterized document as an image.
    pub fn insert_pdf_page(&mut self, doc: &RasterizedDocument, page: usize, placement: Placement) -> Option<u64> {
        match doc.page(page) {
            Some(src) => Some(self.insert_image(src, placement)),
            None => {
                self.notify(Notice::error(format!("{} has no page {page}", doc.name)));
                None
            }
        }
    }

    pub fn insert_math(&mut self, renderer: &dyn MathRenderer, latex: &str, placement: Placement) -> Option<u64> {
        let latex = latex.trim();
        if latex.is_empty() {
            return None;
        }
        match renderer.render(latex).and_then(|bytes| media::image_data_uri(&bytes)) {
            Ok(src) => Some(self.insert_image(src, placement)),
            Err(e) => {
                self.notify(Notice::error(format!("Failed to render equation: {e}")));
                None
            }
        }
    }

    pub fn pending_images(&self) -> usize {
        self.images.pending()
    }

    fn handle_image_event(&mut self, event: ImageEvent) {
        match event {
            ImageEvent::Decoded { src, image, placement, .. } => {
                self.canvas.insert_image(src, &image, placement, &mut self.sync);
            }
            ImageEvent::Failed { ticket, error } => {
                log::debug!("Image request {ticket} failed");
                self.notify(Notice::error(format!("Failed to load image: {error}")));
            }
        }
    }

    /// Commit finished image decodes without blocking. Returns how many completed.
    pub fn poll_images(&mut self) -> usize {
        let events = self.images.poll_events();
        let count = events.len();
        for event in events {
            self.handle_image_event(event);
        }
        count
    }

    /// Block until every queued image is committed or `timeout` passes.
    pub fn flush_images(&mut self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while self.images.pending() > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.images.wait_event(remaining) {
                Some(event) => self.handle_image_event(event),
                None => break,
            }
        }
    }

    /// Periodic housekeeping: commit decoded images and fade the laser trail.
    pub fn tick(&mut self) {
        self.poll_images();
        self.laser.decay();
    }

    // --- Board commands ---

    /// Wipe the canvas, the preview layer and every overlay object.
    pub fn clear(&mut self) {
        self.input.finish_gesture(&mut self.canvas, &mut self.sync);
        self.canvas.clear_overlay();
        self.objects.clear();
        self.canvas.clear(&mut self.sync);
    }

    pub fn undo(&mut self) -> bool {
        self.canvas.undo()
    }

    pub fn redo(&mut self) -> bool {
        self.canvas.redo()
    }

    pub fn export(&self, format: ExportFormat) -> MediaResult<String> {
        self.canvas.export(format)
    }

    pub fn zoom_in(&mut self) {
        self.camera.zoom_in();
    }

    pub fn zoom_out(&mut self) {
        self.camera.zoom_out();
    }

    pub fn reset_view(&mut self) {
        self.camera.reset();
    }

    // --- Sync ---

    /// Apply a peer action to the canvas or the object store.
    pub fn apply_remote(&mut self, action: &WhiteboardAction) -> bool {
        match action {
            WhiteboardAction::Clear => {
                self.objects.clear();
                self.canvas.apply_remote(action)
            }
            action if action.is_object_action() => self.objects.apply(action),
            action => self.canvas.apply_remote(action),
        }
    }

    /// Rebuild from scratch: blank canvas, fresh undo history, no objects.
    fn reset_board(&mut self) {
        self.canvas.reset();
        self.objects.clear();
    }

    fn apply_all(&mut self, actions: Vec<WhiteboardAction>) {
        if self.sync.take_resync() {
            log::debug!("Rebuilding board from session history");
            self.reset_board();
        }
        for action in &actions {
            if !self.apply_remote(action) {
                log::debug!("Peer {} action had no effect", action.kind());
            }
        }
    }

    /// Handle one raw frame from the relay.
    pub fn handle_message(&mut self, json: &str) {
        let actions = self.sync.handle_message(json);
        self.apply_all(actions);
    }

    pub fn handle_event(&mut self, event: SyncEvent) {
        let lost = matches!(event, SyncEvent::Error { .. } | SyncEvent::Disconnected) && self.sync.is_connected();
        let actions = self.sync.handle_event(event);
        self.apply_all(actions);
        if lost {
            self.notify(Notice::error("Connection lost, changes stay on this board"));
        }
    }

    /// Exchange messages with `transport`: apply what arrived, then send
    /// what is queued. A failed send switches to local-only mode.
    pub fn pump(&mut self, transport: &mut dyn Transport) {
        for event in transport.poll_events() {
            self.handle_event(event);
        }
        for msg in self.sync.take_outgoing() {
            if let Err(e) = transport.send(&msg) {
                self.sync.degrade(&e.to_string());
                self.notify(Notice::error(format!("Sync unavailable: {e}")));
                break;
            }
        }
    }

    // --- Recording ---

    pub fn attach_recorder(&mut self, backend: Box<dyn CaptureBackend>) {
        if let Some(mut old) = self.recorder.replace(Recorder::new(backend)) {
            old.teardown();
        }
    }

    pub fn recorder(&self) -> Option<&Recorder> {
        self.recorder.as_ref()
    }

    pub fn recorder_mut(&mut self) -> Option<&mut Recorder> {
        self.recorder.as_mut()
    }

    pub fn start_recording(&mut self) -> Result<(), RecordingError> {
        let recorder = self
            .recorder
            .as_mut()
            .ok_or_else(|| RecordingError::Capture("no capture backend attached".to_string()))?;
        match recorder.start() {
            Err(RecordingError::Cancelled) => {
                self.notify(Notice::info("Recording cancelled"));
                Err(RecordingError::Cancelled)
            }
            other => other,
        }
    }

    /// Leave the session: stop any capture and drop the sync channel.
    /// Relay history is left alone.
    pub fn teardown(&mut self) {
        self.input.finish_gesture(&mut self.canvas, &mut self.sync);
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.teardown();
        }
        self.sync.disconnect();
        self.laser.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MediaError, SyncError};
    use crate::media::{encode_png, image_data_uri};
    use crate::raster::Surface;
    use crate::recording::RecordingState;
    use crate::sync::{ClientMessage, ServerMessage};
    use kurbo::Vec2;
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    const WAIT: Duration = Duration::from_secs(5);

    fn board() -> Whiteboard {
        Whiteboard::new(WhiteboardConfig::default().with_size(200, 150), "lesson-1")
    }

    fn png_bytes(width: u32, height: u32, color: Rgba) -> Vec<u8> {
        encode_png(&Surface::filled(width, height, color)).unwrap()
    }

    /// In-memory stand-in for the relay server.
    #[derive(Default)]
    struct Relay {
        history: Vec<Value>,
    }

    impl Relay {
        fn connect(&mut self, board: &mut Whiteboard) {
            board.handle_event(SyncEvent::Connected);
            self.deliver(board, &mut []);
        }

        /// Route everything `from` queued: history requests are answered to
        /// `from` only, actions are recorded and fanned out to `peers`.
        fn deliver(&mut self, from: &mut Whiteboard, peers: &mut [&mut Whiteboard]) {
            for raw in from.sync_mut().take_outgoing() {
                match serde_json::from_str::<ClientMessage>(&raw).unwrap() {
                    ClientMessage::WhiteboardRequestHistory { .. } => {
                        let reply = ServerMessage::WhiteboardHistory { history: self.history.clone() };
                        from.handle_message(&serde_json::to_string(&reply).unwrap());
                    }
                    ClientMessage::WhiteboardAction { action, .. } => {
                        self.history.push(action.clone());
                        let frame = serde_json::to_string(&ServerMessage::WhiteboardAction { action }).unwrap();
                        for peer in peers.iter_mut() {
                            peer.handle_message(&frame);
                        }
                    }
                }
            }
        }
    }

    fn same_pixels(a: &Whiteboard, b: &Whiteboard) -> bool {
        a.canvas().committed().pixels() == b.canvas().committed().pixels()
    }

    fn scribble(board: &mut Whiteboard) {
        board.set_tool(Tool::Pen);
        board.set_color(Rgba::new(200, 0, 0, 255));
        board.pointer_down(Point::new(20.0, 20.0));
        board.pointer_move(Point::new(80.0, 40.0));
        board.pointer_move(Point::new(120.0, 100.0));
        board.pointer_up(Point::new(120.0, 100.0));

        board.set_tool(Tool::Shape);
        board.set_shape(ShapeKind::Circle);
        board.pointer_down(Point::new(30.0, 90.0));
        board.pointer_move(Point::new(70.0, 130.0));
        board.pointer_up(Point::new(70.0, 130.0));
    }

    #[test]
    fn test_peers_converge_on_live_actions() {
        let mut relay = Relay::default();
        let mut alice = board();
        let mut bob = board();
        relay.connect(&mut alice);
        relay.connect(&mut bob);

        scribble(&mut alice);
        relay.deliver(&mut alice, &mut [&mut bob]);

        assert!(!alice.canvas().committed().is_uniform(Rgba::white()));
        assert!(same_pixels(&alice, &bob));
        // Nothing is echoed back to the sender.
        assert!(!alice.sync().has_outgoing());
    }

    #[test]
    fn test_late_joiner_replays_history() {
        let mut relay = Relay::default();
        let mut alice = board();
        relay.connect(&mut alice);
        scribble(&mut alice);
        let note = alice.add_sticky_at(Point::new(100.0, 60.0));
        alice.update_sticky(&note, StickyPatch::content("Homework: p. 12"));
        relay.deliver(&mut alice, &mut []);

        let mut carol = board();
        relay.connect(&mut carol);

        assert!(same_pixels(&alice, &carol));
        assert_eq!(carol.objects().sticky(&note).map(|n| n.content.as_str()), Some("Homework: p. 12"));
    }

    fn highlight(board: &mut Whiteboard) {
        board.set_tool(Tool::Highlighter);
        board.set_color(Rgba::new(255, 255, 0, 255));
        board.pointer_down(Point::new(20.0, 50.0));
        board.pointer_move(Point::new(150.0, 50.0));
        board.pointer_up(Point::new(150.0, 50.0));
    }

    #[test]
    fn test_rejoin_matches_fresh_joiner() {
        let mut relay = Relay::default();
        let mut alice = board();
        let mut bob = board();
        relay.connect(&mut alice);
        relay.connect(&mut bob);

        highlight(&mut alice);
        alice.add_sticky_at(Point::new(60.0, 60.0));
        relay.deliver(&mut alice, &mut [&mut bob]);

        bob.handle_event(SyncEvent::Disconnected);
        assert_eq!(bob.take_notices().len(), 1);
        relay.connect(&mut bob);

        let mut carol = board();
        relay.connect(&mut carol);
        assert!(same_pixels(&bob, &carol));
        assert!(same_pixels(&alice, &bob));
        assert_eq!(bob.objects().sticky_count(), 1);
        // Undo history restarts from the replayed board.
        assert_eq!(bob.canvas().history().len(), carol.canvas().history().len());
    }

    #[test]
    fn test_own_actions_during_history_request_survive_rebuild() {
        let mut relay = Relay::default();
        let mut alice = board();
        relay.connect(&mut alice);
        highlight(&mut alice);
        relay.deliver(&mut alice, &mut []);

        let mut bob = board();
        bob.handle_event(SyncEvent::Connected);
        let request = bob.sync_mut().take_outgoing();
        scribble(&mut bob);
        // The history was snapshotted before bob's drawing reached the relay.
        let reply = ServerMessage::WhiteboardHistory { history: relay.history.clone() };
        relay.deliver(&mut bob, &mut [&mut alice]);
        bob.handle_message(&serde_json::to_string(&reply).unwrap());
        assert_eq!(request.len(), 1);

        assert!(same_pixels(&alice, &bob));
    }

    #[test]
    fn test_remote_clear_mid_stroke_keeps_gesture() {
        let mut relay = Relay::default();
        let mut alice = board();
        let mut bob = board();
        relay.connect(&mut alice);
        relay.connect(&mut bob);

        alice.set_tool(Tool::Pen);
        alice.set_color(Rgba::new(255, 0, 0, 255));
        alice.pointer_down(Point::new(10.0, 10.0));
        alice.pointer_move(Point::new(50.0, 10.0));
        relay.deliver(&mut alice, &mut [&mut bob]);

        bob.clear();
        relay.deliver(&mut bob, &mut [&mut alice]);

        alice.pointer_move(Point::new(50.0, 100.0));
        alice.pointer_up(Point::new(50.0, 100.0));
        let kinds: Vec<String> = alice
            .sync_mut()
            .take_outgoing()
            .iter()
            .map(|raw| match serde_json::from_str::<ClientMessage>(raw).unwrap() {
                ClientMessage::WhiteboardAction { action, .. } => action["type"].as_str().unwrap_or("").to_string(),
                ClientMessage::WhiteboardRequestHistory { .. } => "history".to_string(),
            })
            .collect();
        assert_eq!(kinds, vec!["draw", "end"]);
        assert_eq!(alice.canvas().committed().pixel(50, 60), Some(Rgba::new(255, 0, 0, 255)));
        assert_eq!(alice.canvas().committed().pixel(30, 10), Some(Rgba::white()));
    }

    #[test]
    fn test_clear_twice_empties_objects_each_time() {
        let mut relay = Relay::default();
        let mut alice = board();
        let mut bob = board();
        relay.connect(&mut alice);
        relay.connect(&mut bob);

        alice.add_sticky_at(Point::new(50.0, 50.0));
        relay.deliver(&mut alice, &mut [&mut bob]);
        assert!(bob.apply_remote(&WhiteboardAction::Clear));
        assert!(bob.objects().is_empty());

        let page = image_data_uri(&png_bytes(4, 4, Rgba::white())).unwrap();
        let source = RasterizedDocument { name: "notes.pdf".into(), page_count: 1, page_images: vec![page] };
        alice.add_sticky_at(Point::new(80.0, 80.0));
        alice.add_document(&source);
        relay.deliver(&mut alice, &mut [&mut bob]);
        assert_eq!(bob.objects().sticky_count(), 1);
        assert_eq!(bob.objects().document_count(), 1);

        assert!(bob.apply_remote(&WhiteboardAction::Clear));
        assert!(bob.objects().is_empty());
        assert!(bob.canvas().committed().is_uniform(Rgba::white()));
    }

    #[test]
    fn test_sticky_tool_places_note_on_release() {
        let mut relay = Relay::default();
        let mut alice = board();
        let mut bob = board();
        relay.connect(&mut alice);
        relay.connect(&mut bob);

        alice.set_tool(Tool::Sticky);
        alice.pointer_down(Point::new(100.0, 75.0));
        assert_eq!(alice.objects().sticky_count(), 0);
        alice.pointer_up(Point::new(100.0, 75.0));

        let note = alice.objects().stickies().next().cloned().unwrap();
        assert_eq!((note.x, note.y), (25.0, 25.0));
        assert!(alice.canvas().committed().is_uniform(Rgba::white()));

        alice.move_sticky(&note.id, Point::new(500.0, -40.0));
        let moved = alice.objects().sticky(&note.id).unwrap();
        assert_eq!((moved.x, moved.y), (200.0 - 150.0, 0.0));

        relay.deliver(&mut alice, &mut [&mut bob]);
        assert_eq!(bob.objects().sticky(&note.id), alice.objects().sticky(&note.id));

        assert!(alice.delete_sticky(&note.id));
        assert!(!alice.delete_sticky(&note.id));
        relay.deliver(&mut alice, &mut [&mut bob]);
        assert_eq!(bob.objects().sticky_count(), 0);
    }

    #[test]
    fn test_document_lifecycle() {
        let mut relay = Relay::default();
        let mut alice = board();
        let mut bob = board();
        relay.connect(&mut alice);
        relay.connect(&mut bob);

        let page = image_data_uri(&png_bytes(4, 4, Rgba::white())).unwrap();
        let source = RasterizedDocument { name: "worksheet.pdf".into(), page_count: 3, page_images: vec![page; 3] };
        let id = alice.add_document(&source).unwrap();

        assert!(alice.previous_page(&id));
        assert_eq!(alice.objects().document(&id).unwrap().current_page, 1);
        alice.go_to_page(&id, 99);
        assert_eq!(alice.objects().document(&id).unwrap().current_page, 3);
        alice.next_page(&id);
        assert_eq!(alice.objects().document(&id).unwrap().current_page, 3);

        alice.resize_document(&id, Size::new(10.0, 10.0));
        let doc = alice.objects().document(&id).unwrap();
        assert_eq!((doc.width, doc.height), (200.0, 150.0));

        relay.deliver(&mut alice, &mut [&mut bob]);
        assert_eq!(bob.objects().document(&id), alice.objects().document(&id));

        alice.remove_document(&id);
        relay.deliver(&mut alice, &mut [&mut bob]);
        assert_eq!(bob.objects().document_count(), 0);

        let empty = RasterizedDocument { name: "blank.pdf".into(), page_count: 0, page_images: Vec::new() };
        assert!(alice.add_document(&empty).is_none());
        assert_eq!(alice.take_notices().len(), 1);
    }

    #[test]
    fn test_laser_stays_local_and_clears_on_tool_change() {
        let mut relay = Relay::default();
        let mut alice = board();
        relay.connect(&mut alice);

        alice.set_tool(Tool::Laser);
        alice.pointer_down(Point::new(10.0, 10.0));
        alice.pointer_move(Point::new(20.0, 10.0));
        assert_eq!(alice.laser().len(), 2);
        assert!(!alice.sync().has_outgoing());
        assert!(alice.canvas().committed().is_uniform(Rgba::white()));

        alice.tick();
        assert_eq!(alice.laser().len(), 1);

        alice.pointer_move(Point::new(30.0, 10.0));
        alice.set_tool(Tool::Pen);
        assert!(alice.laser().is_empty());
    }

    #[test]
    fn test_pan_tool_moves_view_only() {
        let mut alice = board();
        alice.set_tool(Tool::Pan);
        alice.pointer_down(Point::new(50.0, 50.0));
        alice.pointer_move(Point::new(70.0, 45.0));
        alice.pointer_up(Point::new(70.0, 45.0));
        assert_eq!(alice.camera().offset, Vec2::new(20.0, -5.0));

        alice.zoom_in();
        assert_eq!(alice.camera().zoom, 1.25);
        alice.reset_view();
        assert_eq!(alice.camera().offset, Vec2::ZERO);
        assert!(alice.canvas().committed().is_uniform(Rgba::white()));
    }

    #[test]
    fn test_shortcuts() {
        let mut alice = board();
        assert!(alice.handle_key("h", Modifiers::NONE));
        assert_eq!(alice.tool(), Tool::Highlighter);
        assert!(alice.handle_key(" ", Modifiers::NONE));
        assert_eq!(alice.tool(), Tool::Pan);
        assert!(!alice.handle_key("q", Modifiers::NONE));

        alice.set_tool(Tool::Pen);
        alice.pointer_down(Point::new(10.0, 10.0));
        alice.pointer_move(Point::new(100.0, 100.0));
        alice.pointer_up(Point::new(100.0, 100.0));
        let drawn = alice.canvas().committed().clone();

        let ctrl = Modifiers { ctrl: true, ..Modifiers::NONE };
        assert!(alice.handle_key("z", ctrl));
        assert!(alice.canvas().committed().is_uniform(Rgba::white()));
        assert!(alice.handle_key("Z", Modifiers { meta: true, shift: true, ..Modifiers::NONE }));
        assert_eq!(alice.canvas().committed(), &drawn);
        assert_eq!(alice.tool(), Tool::Pen);
    }

    #[test]
    fn test_clear_wipes_objects_for_everyone() {
        let mut relay = Relay::default();
        let mut alice = board();
        let mut bob = board();
        relay.connect(&mut alice);
        relay.connect(&mut bob);

        scribble(&mut alice);
        alice.add_sticky_at(Point::new(80.0, 80.0));
        relay.deliver(&mut alice, &mut [&mut bob]);
        assert_eq!(bob.objects().sticky_count(), 1);

        bob.clear();
        relay.deliver(&mut bob, &mut [&mut alice]);
        for board in [&alice, &bob] {
            assert!(board.objects().is_empty());
            assert!(board.canvas().committed().is_uniform(Rgba::white()));
        }
    }

    #[test]
    fn test_image_upload_commits_after_decode() {
        let mut relay = Relay::default();
        let mut alice = board();
        let mut bob = board();
        relay.connect(&mut alice);
        relay.connect(&mut bob);

        let ticket = alice.upload_image(&png_bytes(20, 10, Rgba::new(0, 0, 255, 255)), Placement::at(5.0, 5.0));
        assert!(ticket.is_some());
        alice.flush_images(WAIT);
        assert_eq!(alice.pending_images(), 0);
        assert_eq!(alice.canvas().committed().pixel(10, 10), Some(Rgba::new(0, 0, 255, 255)));

        relay.deliver(&mut alice, &mut [&mut bob]);
        assert!(same_pixels(&alice, &bob));

        assert!(alice.upload_image(b"plain text", Placement::centered()).is_none());
        let notices = alice.take_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
    }

    #[test]
    fn test_broken_data_uri_reports_after_decode() {
        let mut alice = board();
        alice.insert_image("data:image/png;base64,AAAA", Placement::centered());
        alice.flush_images(WAIT);
        assert!(alice.canvas().committed().is_uniform(Rgba::white()));
        assert_eq!(alice.take_notices().len(), 1);
    }

    struct FixedMath(Result<Vec<u8>, ()>);

    impl MathRenderer for FixedMath {
        fn render(&self, _latex: &str) -> MediaResult<Vec<u8>> {
            self.0.clone().map_err(|_| MediaError::MathRender("unknown command".into()))
        }
    }

    #[test]
    fn test_math_insert() {
        let mut alice = board();
        let ok = FixedMath(Ok(png_bytes(8, 8, Rgba::black())));
        assert!(alice.insert_math(&ok, "   ", Placement::centered()).is_none());
        assert!(alice.insert_math(&ok, r"\frac{a}{b}", Placement::centered()).is_some());
        alice.flush_images(WAIT);
        assert_eq!(alice.canvas().committed().pixel(100, 75), Some(Rgba::black()));

        let broken = FixedMath(Err(()));
        assert!(alice.insert_math(&broken, r"\oops", Placement::centered()).is_none());
        assert!(alice.take_notices()[0].message.starts_with("Failed to render equation"));
    }

    struct FlakyTransport {
        connected_once: bool,
        sent: Vec<String>,
        fail: bool,
    }

    impl Transport for FlakyTransport {
        fn send(&mut self, msg: &str) -> Result<(), SyncError> {
            if self.fail {
                return Err(SyncError::Transport("broken pipe".into()));
            }
            self.sent.push(msg.to_string());
            Ok(())
        }

        fn poll_events(&mut self) -> Vec<SyncEvent> {
            if self.connected_once {
                return Vec::new();
            }
            self.connected_once = true;
            vec![SyncEvent::Connected]
        }
    }

    #[test]
    fn test_pump_sends_and_degrades_on_failure() {
        let mut transport = FlakyTransport { connected_once: false, sent: Vec::new(), fail: false };
        let mut alice = board();
        alice.pump(&mut transport);
        assert!(alice.sync().is_connected());
        assert_eq!(transport.sent.len(), 1);

        transport.fail = true;
        alice.add_sticky_at(Point::new(50.0, 50.0));
        alice.pump(&mut transport);
        assert!(alice.sync().is_local_only());
        assert_eq!(alice.take_notices().len(), 1);

        // Drawing keeps working locally.
        scribble(&mut alice);
        assert!(!alice.canvas().committed().is_uniform(Rgba::white()));
        assert!(!alice.sync().has_outgoing());
    }

    struct FakeCapture(Arc<Mutex<Vec<&'static str>>>);

    impl CaptureBackend for FakeCapture {
        fn start(&mut self) -> Result<(), RecordingError> {
            self.0.lock().unwrap().push("start");
            Ok(())
        }

        fn pause(&mut self) -> Result<(), RecordingError> {
            Ok(())
        }

        fn resume(&mut self) -> Result<(), RecordingError> {
            Ok(())
        }

        fn stop(&mut self) -> Result<Vec<u8>, RecordingError> {
            self.0.lock().unwrap().push("stop");
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_teardown_stops_recording_and_sync() {
        let mut relay = Relay::default();
        let mut alice = board();
        relay.connect(&mut alice);
        assert!(alice.start_recording().is_err());

        let calls = Arc::new(Mutex::new(Vec::new()));
        alice.attach_recorder(Box::new(FakeCapture(calls.clone())));
        alice.start_recording().unwrap();
        assert_eq!(alice.recorder().map(Recorder::state), Some(RecordingState::Recording));

        alice.teardown();
        assert_eq!(*calls.lock().unwrap(), vec!["start", "stop"]);
        assert!(!alice.sync().is_connected());
        assert_eq!(alice.recorder().map(Recorder::state), Some(RecordingState::Idle));
        // Relay history survives.
        assert!(relay.history.is_empty());
    }
}

//! Tutorboard Core Library
//!
//! Drawing state, raster model and synchronization engine for a shared
//! tutoring whiteboard. Platform-agnostic apart from the native WebSocket
//! transport.

pub mod action;
pub mod camera;
pub mod canvas;
pub mod color;
pub mod config;
pub mod error;
pub mod geometry;
pub mod history;
pub mod input;
pub mod media;
pub mod objects;
pub mod raster;
pub mod recording;
pub mod sync;
pub mod tools;
#[cfg(not(target_arch = "wasm32"))]
pub mod transport;
pub mod whiteboard;

pub use action::{ActionSink, Outbox, WhiteboardAction};
pub use camera::Camera;
pub use canvas::RasterCanvas;
pub use color::Rgba;
pub use config::WhiteboardConfig;
pub use error::{MediaError, RecordingError, SyncError};
pub use history::{History, MAX_HISTORY};
pub use input::{InputController, InputEvent, InputState, LaserPointer};
pub use media::{ExportFormat, ImageLoader, MathRenderer, PageRasterizer, Placement, RasterizedDocument};
pub use objects::{CanvasDocument, DocumentPatch, ObjectStore, StickyNote, StickyPatch};
pub use raster::{BlockGlyphs, GlyphRasterizer, Surface};
pub use recording::{CaptureBackend, Recorder, RecordingState, VideoBlob};
pub use sync::{ClientMessage, ConnectionState, ServerMessage, SyncEvent, SyncSession, Transport};
pub use tools::{ShapeKind, Style, Tool};
#[cfg(not(target_arch = "wasm32"))]
pub use transport::NativeWebSocket;
pub use whiteboard::{Modifiers, Notice, NoticeLevel, Whiteboard};

//! Screen recording lifecycle.
//!
//! Capturing the rendered board is platform work and lives behind
//! [`CaptureBackend`]. [`Recorder`] owns the state machine and the elapsed
//! timer, and hands out the finished clip as a [`VideoBlob`].

use crate::error::RecordingError;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub const RECORDING_MIME: &str = "video/webm";

/// Something that can capture the rendered board into a video stream.
pub trait CaptureBackend: Send {
    /// Begin capturing. Returns [`RecordingError::Cancelled`] if the user
    /// declines the capture prompt.
    fn start(&mut self) -> Result<(), RecordingError>;

    fn pause(&mut self) -> Result<(), RecordingError>;

    fn resume(&mut self) -> Result<(), RecordingError>;

    /// Finish capturing and return the encoded video.
    fn stop(&mut self) -> Result<Vec<u8>, RecordingError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingState {
    #[default]
    Idle,
    Recording,
    Paused,
    Stopped,
}

impl RecordingState {
    fn name(self) -> &'static str {
        match self {
            RecordingState::Idle => "idle",
            RecordingState::Recording => "recording",
            RecordingState::Paused => "paused",
            RecordingState::Stopped => "stopped",
        }
    }
}

/// A finished recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoBlob {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
    /// Unix millis at the moment capture stopped.
    pub created_at: u64,
}

impl VideoBlob {
    pub fn new(bytes: Vec<u8>, created_at: u64) -> Self {
        Self { bytes, mime: RECORDING_MIME, created_at }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Suggested download name.
    pub fn file_name(&self) -> String {
        format!("whiteboard-recording-{}.webm", self.created_at)
    }

    /// Write the clip to `path`. If `path` is a directory the suggested
    /// file name is used inside it. Returns the path written.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<PathBuf, RecordingError> {
        let path = path.as_ref();
        let target = if path.is_dir() { path.join(self.file_name()) } else { path.to_path_buf() };
        fs::write(&target, &self.bytes)?;
        log::info!("Saved recording ({} bytes) to {}", self.bytes.len(), target.display());
        Ok(target)
    }
}

/// Format a duration as `HH:MM:SS`, dropping fractional seconds.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub struct Recorder {
    backend: Box<dyn CaptureBackend>,
    state: RecordingState,
    /// Time recorded before the current running span.
    accumulated: Duration,
    running_since: Option<Instant>,
    blob: Option<VideoBlob>,
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("state", &self.state)
            .field("accumulated", &self.accumulated)
            .field("blob", &self.blob.as_ref().map(VideoBlob::len))
            .finish()
    }
}

impl Recorder {
    pub fn new(backend: Box<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            state: RecordingState::Idle,
            accumulated: Duration::ZERO,
            running_since: None,
            blob: None,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, RecordingState::Recording | RecordingState::Paused)
    }

    /// The finished clip, once stopped.
    pub fn blob(&self) -> Option<&VideoBlob> {
        self.blob.as_ref()
    }

    pub fn take_blob(&mut self) -> Option<VideoBlob> {
        let blob = self.blob.take();
        if blob.is_some() {
            self.reset();
        }
        blob
    }

    fn require_state(&self, action: &'static str, allowed: &[RecordingState]) -> Result<(), RecordingError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(RecordingError::InvalidState { action, state: self.state.name() })
        }
    }

    pub fn start(&mut self) -> Result<(), RecordingError> {
        self.start_at(Instant::now())
    }

    fn start_at(&mut self, now: Instant) -> Result<(), RecordingError> {
        self.require_state("start", &[RecordingState::Idle])?;
        match self.backend.start() {
            Ok(()) => {}
            Err(RecordingError::Cancelled) => {
                log::info!("Recording cancelled");
                return Err(RecordingError::Cancelled);
            }
            Err(e) => return Err(e),
        }
        self.accumulated = Duration::ZERO;
        self.running_since = Some(now);
        self.state = RecordingState::Recording;
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), RecordingError> {
        self.pause_at(Instant::now())
    }

    fn pause_at(&mut self, now: Instant) -> Result<(), RecordingError> {
        self.require_state("pause", &[RecordingState::Recording])?;
        self.backend.pause()?;
        self.bank(now);
        self.state = RecordingState::Paused;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), RecordingError> {
        self.resume_at(Instant::now())
    }

    fn resume_at(&mut self, now: Instant) -> Result<(), RecordingError> {
        self.require_state("resume", &[RecordingState::Paused])?;
        self.backend.resume()?;
        self.running_since = Some(now);
        self.state = RecordingState::Recording;
        Ok(())
    }

    /// Stop capturing and keep the clip for download.
    pub fn stop(&mut self) -> Result<&VideoBlob, RecordingError> {
        self.stop_at(Instant::now())
    }

    fn stop_at(&mut self, now: Instant) -> Result<&VideoBlob, RecordingError> {
        self.require_state("stop", &[RecordingState::Recording, RecordingState::Paused])?;
        self.bank(now);
        let result = self.backend.stop();
        self.state = RecordingState::Stopped;
        let bytes = match result {
            Ok(bytes) => bytes,
            Err(e) => {
                self.reset();
                return Err(e);
            }
        };
        log::debug!("Recording stopped after {}", format_elapsed(self.accumulated));
        Ok(&*self.blob.insert(VideoBlob::new(bytes, now_millis())))
    }

    /// Throw away the finished clip and reset the timer.
    pub fn discard(&mut self) -> Result<(), RecordingError> {
        self.require_state("discard", &[RecordingState::Stopped])?;
        self.reset();
        Ok(())
    }

    /// Stop an active capture without keeping anything.
    pub fn teardown(&mut self) {
        if self.is_active() {
            if let Err(e) = self.backend.stop() {
                log::warn!("Failed to stop capture on teardown: {e}");
            }
        }
        self.reset();
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed_at(Instant::now())
    }

    fn elapsed_at(&self, now: Instant) -> Duration {
        match self.running_since {
            Some(since) => self.accumulated + now.saturating_duration_since(since),
            None => self.accumulated,
        }
    }

    /// Elapsed recording time as `HH:MM:SS`.
    pub fn elapsed_label(&self) -> String {
        format_elapsed(self.elapsed())
    }

    fn bank(&mut self, now: Instant) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += now.saturating_duration_since(since);
        }
    }

    fn reset(&mut self) {
        self.state = RecordingState::Idle;
        self.accumulated = Duration::ZERO;
        self.running_since = None;
        self.blob = None;
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.teardown();
    }
}

//! Error types shared across the core crate.

use thiserror::Error;

/// Failures while decoding, encoding or rasterizing embedded media.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Invalid data URI: {0}")]
    InvalidDataUri(String),
    #[error("Base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),
    #[error("PNG encode failed: {0}")]
    Encode(String),
    #[error("Document rasterization failed: {0}")]
    Rasterize(String),
    #[error("Math rendering failed: {0}")]
    MathRender(String),
}

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Failures on the messaging channel.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Not connected")]
    NotConnected,
    #[error("Already connected")]
    AlreadyConnected,
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Failures in the screen-recording lifecycle.
#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("Cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },
    #[error("Capture cancelled by user")]
    Cancelled,
    #[error("Capture failed: {0}")]
    Capture(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

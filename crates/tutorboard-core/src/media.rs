//! Embedded media: data URIs, image decode and encode, and upload pipelines.
//!
//! PDF rasterization and LaTeX typesetting are external; they plug in through
//! [`PageRasterizer`] and [`MathRenderer`] and hand back encoded images.

use crate::color::Rgba;
use crate::error::{MediaError, MediaResult};
use crate::raster::Surface;
use base64::{Engine, engine::general_purpose::STANDARD};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Render scale used when rasterizing PDF pages.
pub const PDF_RENDER_SCALE: f64 = 1.5;

/// Maximum number of PDF pages rasterized per upload.
pub const MAX_PDF_PAGES: usize = 50;

/// JPEG export quality.
pub const JPEG_QUALITY: u8 = 95;

/// Encoded image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormat {
    Png,
    Jpeg,
    WebP,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::WebP => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::WebP => "webp",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(ImageFormat::Png),
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "webp" => Some(ImageFormat::WebP),
            _ => None,
        }
    }

    /// Sniff the format from the leading bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0x89, b'P', b'N', b'G']) {
            Some(ImageFormat::Png)
        } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            Some(ImageFormat::WebP)
        } else {
            None
        }
    }
}

/// Formats the canvas can be exported as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Png,
    Jpeg,
}

impl ExportFormat {
    pub fn image_format(self) -> ImageFormat {
        match self {
            ExportFormat::Png => ImageFormat::Png,
            ExportFormat::Jpeg => ImageFormat::Jpeg,
        }
    }

    /// Suggested download name, e.g. `whiteboard-1700000000000.png`.
    pub fn file_name(self, timestamp_millis: u64) -> String {
        format!("whiteboard-{timestamp_millis}.{}", self.image_format().extension())
    }
}

/// `data:<mime>;base64,<payload>`
pub fn encode_data_uri(bytes: &[u8], mime: &str) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Wrap raw image bytes as a data URI, sniffing the MIME type.
pub fn image_data_uri(bytes: &[u8]) -> MediaResult<String> {
    let format = ImageFormat::from_magic_bytes(bytes)
        .ok_or_else(|| MediaError::InvalidDataUri("unrecognized image format".to_string()))?;
    Ok(encode_data_uri(bytes, format.mime_type()))
}

/// Split a base64 data URI into its MIME type and decoded bytes.
pub fn decode_data_uri(uri: &str) -> MediaResult<(String, Vec<u8>)> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| MediaError::InvalidDataUri("missing data: prefix".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| MediaError::InvalidDataUri("missing payload separator".to_string()))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| MediaError::InvalidDataUri(format!("not base64 encoded: {header}")))?;
    let bytes = STANDARD.decode(payload.trim())?;
    Ok((mime.to_string(), bytes))
}

/// Decode a data URI into RGBA pixels.
pub fn decode_image(src: &str) -> MediaResult<RgbaImage> {
    let (_, bytes) = decode_data_uri(src)?;
    Ok(image::load_from_memory(&bytes)?.to_rgba8())
}

/// Encode a surface as PNG.
pub fn encode_png(surface: &Surface) -> MediaResult<Vec<u8>> {
    let mut png_data = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut png_data, surface.width(), surface.height());
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder
            .write_header()
            .map_err(|e| MediaError::Encode(e.to_string()))?;
        writer
            .write_image_data(surface.pixels())
            .map_err(|e| MediaError::Encode(e.to_string()))?;
    }
    Ok(png_data)
}

/// Encode a surface as JPEG, flattened onto `matte` (JPEG has no alpha).
pub fn encode_jpeg(surface: &Surface, matte: Rgba, quality: u8) -> MediaResult<Vec<u8>> {
    let mut flat = Surface::filled(surface.width(), surface.height(), matte);
    flat.draw_surface(surface);
    let rgb = image::DynamicImage::ImageRgba8(flat.to_image()).to_rgb8();
    let mut out = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality).encode_image(&rgb)?;
    Ok(out)
}

/// Result of rasterizing an uploaded PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RasterizedDocument {
    pub name: String,
    /// Pages in the source file, which may exceed the rendered pages.
    pub page_count: usize,
    /// Rendered pages as PNG data URIs.
    pub page_images: Vec<String>,
}

impl RasterizedDocument {
    /// Data URI of a 1-based page.
    pub fn page(&self, page: usize) -> Option<&str> {
        page.checked_sub(1)
            .and_then(|i| self.page_images.get(i))
            .map(String::as_str)
    }
}

/// External PDF renderer.
pub trait PageRasterizer {
    fn page_count(&self, pdf: &[u8]) -> MediaResult<usize>;

    /// Render a 1-based page at `scale`, returning encoded image bytes.
    fn render_page(&self, pdf: &[u8], page: usize, scale: f64) -> MediaResult<Vec<u8>>;
}

/// Render up to [`MAX_PDF_PAGES`] pages of `pdf`.
pub fn rasterize_document(
    rasterizer: &dyn PageRasterizer,
    name: &str,
    pdf: &[u8],
) -> MediaResult<RasterizedDocument> {
    let page_count = rasterizer.page_count(pdf)?;
    let page_images = (1..=page_count.min(MAX_PDF_PAGES))
        .map(|page| {
            let bytes = rasterizer.render_page(pdf, page, PDF_RENDER_SCALE)?;
            image_data_uri(&bytes)
        })
        .collect::<MediaResult<Vec<_>>>()?;
    log::debug!("Rasterized {} of {page_count} pages from {name}", page_images.len());
    Ok(RasterizedDocument { name: name.to_string(), page_count, page_images })
}

/// External LaTeX typesetter.
pub trait MathRenderer {
    /// Render `latex` to encoded image bytes.
    fn render(&self, latex: &str) -> MediaResult<Vec<u8>>;
}

/// Where a decoded image should land; `None` means centered.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Placement {
    pub x: Option<f64>,
    pub y: Option<f64>,
}

impl Placement {
    pub fn centered() -> Self {
        Self::default()
    }

    pub fn at(x: f64, y: f64) -> Self {
        Self { x: Some(x), y: Some(y) }
    }
}

/// Outcome of a background decode.
#[derive(Debug)]
pub enum ImageEvent {
    Decoded {
        ticket: u64,
        src: String,
        image: RgbaImage,
        placement: Placement,
    },
    Failed {
        ticket: u64,
        error: MediaError,
    },
}

struct DecodeJob {
    ticket: u64,
    src: String,
    placement: Placement,
}

/// Decodes data URIs on a background thread so gestures stay responsive.
///
/// Completions are collected with [`ImageLoader::poll_events`] in the order
/// they were requested.
pub struct ImageLoader {
    job_tx: Option<Sender<DecodeJob>>,
    event_rx: Receiver<ImageEvent>,
    next_ticket: u64,
    pending: usize,
    worker: Option<JoinHandle<()>>,
}

impl ImageLoader {
    pub fn new() -> Self {
        let (job_tx, job_rx) = channel::<DecodeJob>();
        let (event_tx, event_rx) = channel::<ImageEvent>();
        let worker = thread::spawn(move || {
            for job in job_rx {
                let event = match decode_image(&job.src) {
                    Ok(image) => ImageEvent::Decoded {
                        ticket: job.ticket,
                        src: job.src,
                        image,
                        placement: job.placement,
                    },
                    Err(error) => ImageEvent::Failed { ticket: job.ticket, error },
                };
                if event_tx.send(event).is_err() {
                    break;
                }
            }
        });
        Self {
            job_tx: Some(job_tx),
            event_rx,
            next_ticket: 0,
            pending: 0,
            worker: Some(worker),
        }
    }

    /// Queue `src` for decoding. Returns a ticket identifying the completion.
    pub fn request(&mut self, src: impl Into<String>, placement: Placement) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let job = DecodeJob { ticket, src: src.into(), placement };
        match &self.job_tx {
            Some(tx) if tx.send(job).is_ok() => self.pending += 1,
            _ => log::warn!("Image decoder is gone, dropping request {ticket}"),
        }
        ticket
    }

    /// Number of requests without a completion yet.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Drain finished decodes without blocking.
    pub fn poll_events(&mut self) -> Vec<ImageEvent> {
        let events: Vec<ImageEvent> = self.event_rx.try_iter().collect();
        self.pending = self.pending.saturating_sub(events.len());
        events
    }

    /// Block until the next completion or the timeout.
    pub fn wait_event(&mut self, timeout: Duration) -> Option<ImageEvent> {
        if self.pending == 0 {
            return None;
        }
        match self.event_rx.recv_timeout(timeout) {
            Ok(event) => {
                self.pending -= 1;
                Some(event)
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl Default for ImageLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ImageLoader {
    fn drop(&mut self) {
        self.job_tx = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

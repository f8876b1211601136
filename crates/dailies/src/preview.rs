//! Preview thumbnails for progress payloads and first frames.
//!
//! Payloads are base64-encoded image files. Decoding never fails loudly: a
//! payload that cannot be turned into a thumbnail yields
//! [`Preview::Unavailable`] so the caller can show a placeholder.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// Bounding box thumbnails are scaled into
pub const PREVIEW_WIDTH: u32 = 640;
pub const PREVIEW_HEIGHT: u32 = 480;

/// Text shown in place of a thumbnail that could not be decoded
pub const UNAVAILABLE_TEXT: &str = "Preview not available";

/// A decoded thumbnail, or the placeholder sentinel
#[derive(Debug, Clone, PartialEq)]
pub enum Preview {
    Ready(DynamicImage),
    Unavailable,
}

impl Preview {
    pub fn is_available(&self) -> bool {
        matches!(self, Preview::Ready(_))
    }

    pub fn image(&self) -> Option<&DynamicImage> {
        match self {
            Preview::Ready(image) => Some(image),
            Preview::Unavailable => None,
        }
    }

    /// Save the thumbnail as PNG; returns `false` for the placeholder
    ///
    /// Saving the placeholder removes whatever thumbnail `path` held, so a
    /// stale frame is never left behind.
    pub fn save_png(&self, path: &Path) -> Result<bool, image::ImageError> {
        match self {
            Preview::Ready(image) => {
                image.save_with_format(path, ImageFormat::Png)?;
                Ok(true)
            }
            Preview::Unavailable => match std::fs::remove_file(path) {
                Ok(()) => Ok(false),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
                Err(e) => Err(e.into()),
            },
        }
    }
}

/// Decode a payload into a thumbnail fitting the preview box.
///
/// The aspect ratio is kept and Lanczos3 resampling is used.
pub fn decode_preview(payload: &str) -> Preview {
    let payload = payload.trim();
    if payload.is_empty() {
        return Preview::Unavailable;
    }

    let bytes = match BASE64.decode(payload) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "preview payload is not valid base64");
            return Preview::Unavailable;
        }
    };

    match image::load_from_memory(&bytes) {
        Ok(image) => {
            Preview::Ready(image.resize(PREVIEW_WIDTH, PREVIEW_HEIGHT, FilterType::Lanczos3))
        }
        Err(e) => {
            debug!(error = %e, "preview payload is not a decodable image");
            Preview::Unavailable
        }
    }
}

/// Encode an image file on disk as a preview payload.
///
/// A file that cannot be read gives an empty payload, which decodes to
/// [`Preview::Unavailable`].
pub fn encode_file_payload(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => BASE64.encode(bytes),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "could not read frame for preview");
            String::new()
        }
    }
}

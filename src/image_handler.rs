//! Loading and encoding of the raster images that flow through the crate.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use crate::error::{CarouselError, Result};

/// How long a load may take before it is treated as failed.
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(15);

/// Where a background image comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    /// `data:<mime>;base64,<payload>` as produced by the generation service
    /// and stored in the mockup store.
    DataUrl(String),
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl ImageSource {
    /// Interpret a textual image reference: data URLs are kept inline,
    /// anything else is taken as a filesystem path.
    pub fn parse(reference: &str) -> Self {
        let trimmed = reference.trim();
        if trimmed.starts_with("data:") {
            ImageSource::DataUrl(trimmed.to_string())
        } else {
            ImageSource::Path(PathBuf::from(trimmed))
        }
    }

    /// Raw encoded bytes of the image, without decoding them.
    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        match self {
            ImageSource::DataUrl(url) => decode_data_url(url).map(|(_, bytes)| bytes),
            ImageSource::Path(path) => std::fs::read(path).map_err(|e| {
                CarouselError::ImageLoad(format!("cannot read {}: {}", path.display(), e))
            }),
            ImageSource::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}

impl From<&str> for ImageSource {
    fn from(reference: &str) -> Self {
        ImageSource::parse(reference)
    }
}

/// Split a base64 data URL into its mime type and decoded payload.
pub fn decode_data_url(url: &str) -> Result<(String, Vec<u8>)> {
    let rest = url
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| CarouselError::ImageLoad("not a data URL".into()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| CarouselError::ImageLoad("data URL has no payload".into()))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| CarouselError::ImageLoad("only base64 data URLs are supported".into()))?;

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| CarouselError::ImageLoad(format!("invalid base64 payload: {}", e)))?;
    Ok((mime.to_string(), bytes))
}

/// Encode image bytes as a data URL, sniffing the mime type from the content.
pub fn encode_data_url(bytes: &[u8]) -> Result<String> {
    let format = image::guess_format(bytes)
        .map_err(|e| CarouselError::ImageLoad(format!("unrecognised image data: {}", e)))?;
    Ok(format!(
        "data:{};base64,{}",
        format.to_mime_type(),
        STANDARD.encode(bytes)
    ))
}

/// Load image from bytes (supports PNG, JPEG, WebP, etc.)
pub fn load_image_from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| CarouselError::ImageLoad(format!("decode failed: {}", e)))?;
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(CarouselError::ImageLoad("image has no pixels".into()));
    }
    Ok(img)
}

/// Decode `source` on a worker thread, giving up after `timeout`.
///
/// A source that never finishes decoding is reported as an
/// [`CarouselError::ImageLoad`] instead of blocking the caller.
///
/// The worker is detached: after a timeout it keeps running until its
/// decode finishes and the result is dropped, so callers should decode each
/// source once and reuse the image.
pub fn load_image(source: ImageSource, timeout: Duration) -> Result<DynamicImage> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("image-decode".into())
        .spawn(move || {
            let decoded = source
                .read_bytes()
                .and_then(|bytes| load_image_from_bytes(&bytes));
            // The receiver is gone if the caller already timed out.
            let _ = tx.send(decoded);
        })
        .map_err(|e| CarouselError::ImageLoad(format!("cannot start decoder: {}", e)))?;

    match rx.recv_timeout(timeout) {
        Ok(decoded) => decoded,
        Err(RecvTimeoutError::Timeout) => Err(CarouselError::ImageLoad(format!(
            "timed out after {:?}",
            timeout
        ))),
        Err(RecvTimeoutError::Disconnected) => {
            Err(CarouselError::ImageLoad("decoder exited without a result".into()))
        }
    }
}

/// Save image to PNG bytes
pub fn save_image_to_bytes(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

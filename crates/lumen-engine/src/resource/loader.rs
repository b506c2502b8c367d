//! Injected image sources.
//!
//! The engine never decodes or fetches images itself. URL loads go through an
//! [`ImageLoader`] that is polled once per frame, encoded bytes through a
//! [`TextureDecoder`].

use std::collections::HashMap;
use std::task::Poll;

use thiserror::Error;

use crate::device::TextureFormat;

/// Decoded, tightly packed pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub pixels: Vec<u8>,
}

impl ImageData {
    pub fn rgba(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self { width, height, format: TextureFormat::Rgba, pixels }
    }

    /// Single-color RGBA image.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba.repeat((width * height) as usize);
        Self::rgba(width, height, pixels)
    }
}

/// Fetches images by URL. `poll` is called once per frame until it is ready.
pub trait ImageLoader {
    fn poll(&mut self, url: &str) -> Poll<Result<ImageData, String>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("no decoder for {0}")]
    Unsupported(String),
    #[error("corrupt image: {0}")]
    Corrupt(String),
}

/// Turns encoded bytes (PNG, KTX, ...) into pixels.
pub trait TextureDecoder {
    fn decode(&self, bytes: &[u8], mime: Option<&str>) -> Result<ImageData, DecodeError>;
}

/// Decoder installed by default: recognizes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDecoder;

impl TextureDecoder for NoDecoder {
    fn decode(&self, _bytes: &[u8], mime: Option<&str>) -> Result<ImageData, DecodeError> {
        Err(DecodeError::Unsupported(mime.unwrap_or("unknown format").to_string()))
    }
}

// ── In-memory loader ──────────────────────────────────────────────────────

/// Loader serving images from a map, with optional per-request latency.
///
/// Unknown URLs fail with `"not found: <url>"`.
#[derive(Debug, Default)]
pub struct MemoryImageLoader {
    images: HashMap<String, ImageData>,
    latency: u32,
    waited: HashMap<String, u32>,
}

impl MemoryImageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `Pending` polls before a request completes.
    pub fn with_latency(mut self, polls: u32) -> Self {
        self.latency = polls;
        self
    }

    pub fn insert(&mut self, url: impl Into<String>, image: ImageData) {
        self.images.insert(url.into(), image);
    }
}

impl ImageLoader for MemoryImageLoader {
    fn poll(&mut self, url: &str) -> Poll<Result<ImageData, String>> {
        let waited = self.waited.entry(url.to_string()).or_insert(0);
        if *waited < self.latency {
            *waited += 1;
            return Poll::Pending;
        }
        self.waited.remove(url);
        Poll::Ready(self.images.get(url).cloned().ok_or_else(|| format!("not found: {}", url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_then_ready() {
        let mut l = MemoryImageLoader::new().with_latency(2);
        l.insert("a.png", ImageData::solid(1, 1, [1, 2, 3, 4]));
        assert!(l.poll("a.png").is_pending());
        assert!(l.poll("a.png").is_pending());
        match l.poll("a.png") {
            Poll::Ready(Ok(img)) => assert_eq!(img.pixels, vec![1, 2, 3, 4]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn missing_url_fails() {
        let mut l = MemoryImageLoader::new();
        assert_eq!(l.poll("nope"), Poll::Ready(Err("not found: nope".to_string())));
    }

    #[test]
    fn default_decoder_is_unsupported() {
        let err = NoDecoder.decode(&[0x89, b'P'], Some("image/png")).unwrap_err();
        assert_eq!(err, DecodeError::Unsupported("image/png".to_string()));
    }
}

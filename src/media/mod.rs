//! Frame types and JPEG handling
//!
//! This module provides:
//! - Decoded frames as produced by a frame source
//! - Encoded frames as published to viewers
//! - JPEG encode/decode helpers
//! - An MJPEG byte-stream splitter

pub mod jpeg;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};
use tokio::time::Instant;

use crate::error::ReadError;

pub use jpeg::JpegSplitter;

/// One decoded image from a source
#[derive(Debug, Clone)]
pub struct Frame {
    /// Pixel data
    pub image: RgbImage,
    /// When the frame was read from the transport
    pub captured_at: Instant,
}

impl Frame {
    /// Wrap an image captured now
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// A re-encoded frame ready for viewers
///
/// Cheap to share: the JPEG payload is reference counted.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Monotonic per-handler sequence number, starting at 1
    pub sequence: u64,
    /// JPEG payload
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    /// Capture time of the source frame
    pub captured_at: Instant,
    /// Whether motion was active when this frame was processed
    pub motion: bool,
}

/// Number of pixels in a `width` x `height` image, without `u32` overflow
pub fn pixel_count(width: u32, height: u32) -> usize {
    width as usize * height as usize
}

/// Encode an RGB image as JPEG
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Bytes, image::ImageError> {
    let mut out = Vec::with_capacity(pixel_count(image.width(), image.height()) / 8);
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    encoder.encode_image(image)?;
    Ok(Bytes::from(out))
}

/// Decode a JPEG into an RGB image
///
/// A zero-sized result is reported as [`ReadError::EmptyFrame`], the same
/// as any other unhealthy upstream.
pub fn decode_jpeg(data: &[u8]) -> Result<RgbImage, ReadError> {
    let image = image::load_from_memory_with_format(data, ImageFormat::Jpeg)?.to_rgb8();
    if image.width() == 0 || image.height() == 0 {
        return Err(ReadError::EmptyFrame);
    }
    Ok(image)
}

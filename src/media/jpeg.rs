//! MJPEG byte-stream splitting
//!
//! An image pipe carries back-to-back JPEG files with no framing of its own.
//! Each frame runs from the SOI marker (`FF D8`) to the EOI marker
//! (`FF D9`); entropy-coded data never contains a bare `FF D9` because of
//! byte stuffing, so scanning for markers is enough.

use bytes::{Bytes, BytesMut};

use crate::error::ReadError;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Default upper bound for a single buffered frame (16MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Incremental JPEG frame splitter
#[derive(Debug)]
pub struct JpegSplitter {
    buf: BytesMut,
    /// Bytes after SOI already scanned for EOI
    scanned: usize,
    max_frame_size: usize,
}

impl JpegSplitter {
    /// Create a new splitter with the default size limit
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a new splitter with a custom size limit
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(64 * 1024),
            scanned: 0,
            max_frame_size,
        }
    }

    /// Buffer to read transport bytes into
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Append bytes
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Drop everything buffered
    pub fn clear(&mut self) {
        self.buf.clear();
        self.scanned = 0;
    }

    /// Number of bytes currently buffered
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Extract the next complete JPEG, if one is buffered
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, ReadError> {
        if self.scanned == 0 {
            match find(&self.buf, &SOI, 0) {
                Some(start) => {
                    let _ = self.buf.split_to(start);
                }
                None => {
                    // Keep a trailing 0xFF, it may start a marker
                    let keep = usize::from(self.buf.last() == Some(&0xFF));
                    let drop = self.buf.len() - keep;
                    let _ = self.buf.split_to(drop);
                    return Ok(None);
                }
            }
            self.scanned = SOI.len();
        }

        // Resume one byte early in case a marker straddled two reads
        let from = self.scanned.saturating_sub(1).max(SOI.len());
        match find(&self.buf, &EOI, from) {
            Some(end) => {
                self.scanned = 0;
                Ok(Some(self.buf.split_to(end + EOI.len()).freeze()))
            }
            None => {
                self.scanned = self.buf.len();
                if self.buf.len() > self.max_frame_size {
                    self.clear();
                    return Err(ReadError::Decode(format!(
                        "frame exceeds {} bytes without end marker",
                        self.max_frame_size
                    )));
                }
                Ok(None)
            }
        }
    }
}

impl Default for JpegSplitter {
    fn default() -> Self {
        Self::new()
    }
}

fn find(haystack: &[u8], needle: &[u8; 2], from: usize) -> Option<usize> {
    if haystack.len() < from + 2 {
        return None;
    }
    haystack[from..]
        .windows(2)
        .position(|w| w == needle)
        .map(|pos| pos + from)
}

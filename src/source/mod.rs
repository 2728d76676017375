//! Upstream frame sources
//!
//! A [`FrameSource`] wraps exactly one network connection to one camera feed
//! at one quality level. It knows how to dial, read decoded frames and hang
//! up, but never retries on its own: the owning stream handler decides when
//! to dial again.
//!
//! ```text
//!   SourceFactory::create(source, key)
//!           │
//!           ▼
//!   ┌──────────────┐ connect()  ┌────────────┐ read_frame() ┌──────────┐
//!   │ Disconnected │──────────► │ Connecting │────────────► │ Streaming│
//!   └──────────────┘            └────────────┘              └────┬─────┘
//!           ▲                                                   │ ReadError
//!           └───────────────────── close() ◄────────────────────┘
//! ```

pub mod address;
pub mod ffmpeg;

use std::future::Future;
use std::sync::Arc;

use crate::error::{ConnectionError, ReadError};
use crate::media::Frame;
use crate::settings::SourceConfig;

pub use address::{address_for_quality, redact_address};
pub use ffmpeg::{FfmpegOptions, FfmpegSource, FfmpegSourceFactory};

/// Opaque identifier of a configured source
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(Arc<str>);

impl SourceId {
    /// Create a new source id
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SourceId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// Quality variant of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Quality {
    /// Main (full resolution) stream
    Primary,
    /// Sub (reduced resolution) stream
    Secondary,
}

impl Quality {
    /// Name used in URLs ("main" / "sub")
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Primary => "main",
            Quality::Secondary => "sub",
        }
    }

    /// Parse a quality name, accepting both URL and long forms
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "main" | "primary" => Some(Quality::Primary),
            "sub" | "secondary" => Some(Quality::Secondary),
            _ => None,
        }
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one logical upstream connection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceKey {
    /// Configured source
    pub source_id: SourceId,
    /// Requested quality
    pub quality: Quality,
}

impl SourceKey {
    /// Create a new source key
    pub fn new(source_id: impl Into<SourceId>, quality: Quality) -> Self {
        Self {
            source_id: source_id.into(),
            quality,
        }
    }
}

impl std::fmt::Display for SourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.source_id, self.quality)
    }
}

/// One connection to one upstream feed
///
/// Implementations must not retry internally. Timeouts for `connect` and
/// `read_frame` are applied by the caller, so both futures must be safe to
/// drop at any await point; `close` is always called afterwards.
pub trait FrameSource: Send + 'static {
    /// Open the transport
    fn connect(&mut self) -> impl Future<Output = Result<(), ConnectionError>> + Send;

    /// Wait for the next decoded frame
    fn read_frame(&mut self) -> impl Future<Output = Result<Frame, ReadError>> + Send;

    /// Release the transport. Must be idempotent.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Builds the [`FrameSource`] for a key
///
/// The registry calls `create` exactly once per stream handler it starts.
pub trait SourceFactory: Send + Sync + 'static {
    type Source: FrameSource;

    /// Create an unconnected source for `key`
    fn create(&self, source: &SourceConfig, key: &SourceKey) -> Self::Source;
}

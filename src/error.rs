//! Error types
//!
//! Every failure in the pipeline is recoverable. Connection and read errors
//! drive a handler into its retry loop, detector errors fall back to the
//! unannotated frame, and config errors skip a single source entry.

use std::fmt;
use std::time::Duration;

use crate::registry::RegistryError;

/// Failure to open an upstream transport
#[derive(Debug)]
pub enum ConnectionError {
    /// The source address could not be used to dial
    InvalidAddress(String),
    /// The transport process could not be started
    Spawn(std::io::Error),
    /// No frame arrived within the connect timeout
    Timeout(Duration),
    /// Upstream closed before delivering a first frame
    Closed,
    /// Upstream delivered data that was not a usable first frame
    BadFirstFrame(ReadError),
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::InvalidAddress(msg) => write!(f, "Invalid source address: {}", msg),
            ConnectionError::Spawn(e) => write!(f, "Failed to start transport: {}", e),
            ConnectionError::Timeout(d) => {
                write!(f, "Connect timed out after {:.1}s", d.as_secs_f64())
            }
            ConnectionError::Closed => write!(f, "Upstream closed during connect"),
            ConnectionError::BadFirstFrame(e) => write!(f, "Unusable first frame: {}", e),
        }
    }
}

impl std::error::Error for ConnectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConnectionError::Spawn(e) => Some(e),
            ConnectionError::BadFirstFrame(e) => Some(e),
            _ => None,
        }
    }
}

/// Mid-stream failure of an open transport
#[derive(Debug)]
pub enum ReadError {
    /// Upstream reached end of stream
    Eof,
    /// Transport I/O failure
    Io(std::io::Error),
    /// Frame bytes could not be decoded
    Decode(String),
    /// Decoded frame has a zero dimension
    EmptyFrame,
    /// No frame arrived within the read timeout
    Timeout(Duration),
    /// `read_frame` was called without an open transport
    NotConnected,
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadError::Eof => write!(f, "End of stream"),
            ReadError::Io(e) => write!(f, "Transport read failed: {}", e),
            ReadError::Decode(msg) => write!(f, "Frame decode failed: {}", msg),
            ReadError::EmptyFrame => write!(f, "Frame has zero width or height"),
            ReadError::Timeout(d) => write!(f, "No frame for {:.1}s", d.as_secs_f64()),
            ReadError::NotConnected => write!(f, "Transport not connected"),
        }
    }
}

impl std::error::Error for ReadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReadError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ReadError {
    fn from(err: std::io::Error) -> Self {
        ReadError::Io(err)
    }
}

impl From<image::ImageError> for ReadError {
    fn from(err: image::ImageError) -> Self {
        ReadError::Decode(err.to_string())
    }
}

/// Failure inside the motion annotation pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorError {
    /// The background model rejected the frame
    Model(String),
    /// Mask and frame sizes disagree
    MaskMismatch {
        frame: (u32, u32),
        mask: (u32, u32),
    },
    /// Input frame has a zero dimension
    EmptyFrame,
}

impl fmt::Display for DetectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorError::Model(msg) => write!(f, "Background model error: {}", msg),
            DetectorError::MaskMismatch { frame, mask } => write!(
                f,
                "Mask {}x{} does not match frame {}x{}",
                mask.0, mask.1, frame.0, frame.1
            ),
            DetectorError::EmptyFrame => write!(f, "Empty frame"),
        }
    }
}

impl std::error::Error for DetectorError {}

/// Configuration problem
#[derive(Debug)]
pub enum ConfigError {
    /// A single source entry is malformed
    InvalidSource { index: usize, reason: String },
    /// Configuration could not be read or parsed
    Load(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidSource { index, reason } => {
                write!(f, "Invalid source #{}: {}", index, reason)
            }
            ConfigError::Load(msg) => write!(f, "Failed to load configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Load(err.to_string())
    }
}

/// Crate-level error
#[derive(Debug)]
pub enum Error {
    Connection(ConnectionError),
    Read(ReadError),
    Detector(DetectorError),
    Config(ConfigError),
    Registry(RegistryError),
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e),
            Error::Read(e) => write!(f, "Read error: {}", e),
            Error::Detector(e) => write!(f, "Detector error: {}", e),
            Error::Config(e) => write!(f, "Config error: {}", e),
            Error::Registry(e) => write!(f, "Registry error: {}", e),
            Error::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<ReadError> for Error {
    fn from(err: ReadError) -> Self {
        Error::Read(err)
    }
}

impl From<DetectorError> for Error {
    fn from(err: DetectorError) -> Self {
        Error::Detector(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<RegistryError> for Error {
    fn from(err: RegistryError) -> Self {
        Error::Registry(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

/// Result alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

//! rtsp-mux: single-connection camera fan-out
//!
//! Opens at most one upstream connection per camera and quality level, no
//! matter how many viewers are watching, and re-publishes the feed as a
//! sequence of JPEG frames. Each frame can optionally be annotated with
//! motion regions computed against an adaptive background model.
//!
//! # Architecture
//!
//! ```text
//!  ┌────────────┐      ┌───────────────┐      ┌────────────────┐
//!  │ FrameSource│─────►│ StreamHandler │─────►│  LatestFrame   │──► ViewerStream
//!  │ (one conn) │      │  worker task  │      │  (JPEG slot)   │──► ViewerStream
//!  └────────────┘      │ MotionDetector│      └────────────────┘──► ViewerStream
//!                      └───────────────┘
//!                              ▲
//!                  acquire /   │   release + grace period
//!                      ┌───────┴────────┐
//!                      │ StreamRegistry │
//!                      └────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use rtsp_mux::{AppConfig, Quality, StreamRegistry};
//!
//! # async fn run() -> rtsp_mux::Result<()> {
//! let config = AppConfig::load("cameras.json")?;
//! let registry = StreamRegistry::from_config(&config);
//! let _cleanup = registry.spawn_cleanup_task();
//!
//! let mut viewer = registry.open_stream("1", Quality::Primary, true)?;
//! while let Some(part) = viewer.next_part().await {
//!     // write `part` to an HTTP response body
//!     # let _ = part;
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod handler;
pub mod media;
pub mod motion;
pub mod registry;
pub mod settings;
pub mod source;
pub mod stream;

pub use error::{ConfigError, ConnectionError, DetectorError, Error, ReadError, Result};
pub use handler::{HandlerConfig, HandlerHealth, HandlerPhase, MotionStatus, StreamHandler};
pub use media::{EncodedFrame, Frame};
pub use motion::{MotionConfig, MotionDetector, MotionState, Sensitivity};
pub use registry::{RegistryConfig, RegistryError, StreamRegistry, StreamStats};
pub use settings::{AppConfig, CameraInfo, SourceConfig};
pub use source::{FfmpegSourceFactory, FrameSource, Quality, SourceFactory, SourceId, SourceKey};
pub use stream::{MotionStatusReport, ViewerStream, MULTIPART_CONTENT_TYPE};

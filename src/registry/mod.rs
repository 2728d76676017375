//! Stream registry
//!
//! The registry owns one [`StreamHandler`](crate::handler::StreamHandler) per
//! source key and reference-counts its viewers, so any number of viewers of
//! the same camera share a single upstream connection.
//!
//! # Architecture
//!
//! ```text
//!                        StreamRegistry (Clone)
//!                   ┌──────────────────────────────┐
//!                   │ streams: HashMap<SourceKey,  │
//!                   │   StreamEntry {              │
//!                   │     handler: Arc<Handler>,   │
//!                   │     idle_since,              │
//!                   │   }>                         │
//!                   └──────────────┬───────────────┘
//!                                  │
//!         ┌────────────────────────┼────────────────────────┐
//!         │                        │                        │
//!         ▼                        ▼                        ▼
//!    [ViewerStream]          [ViewerStream]          [status poll]
//!    acquire / release       acquire / release       motion_status()
//!         │                        │
//!         └──► handler.latest ◄────┘     (one FrameSource per key)
//! ```
//!
//! # Grace period
//!
//! When the last viewer of a key leaves, the handler keeps running for the
//! grace period. A viewer arriving in that window reuses the open connection;
//! otherwise the handler is retired and its transport closed.

pub mod config;
pub mod entry;
pub mod error;
pub mod store;

pub use config::RegistryConfig;
pub use entry::{StreamEntry, StreamState, StreamStats};
pub use error::RegistryError;
pub use store::StreamRegistry;

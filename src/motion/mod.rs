//! Motion detection and frame annotation
//!
//! Each stream handler owns at most one [`MotionDetector`]. Frames pass
//! through a background model, the resulting foreground mask is cleaned up
//! and split into regions, and regions large enough to matter are boxed on
//! the frame together with a text marker.
//!
//! ```text
//!   RgbImage ──► BackgroundModel::apply ──► mask (0 / 127 / 255)
//!                                              │
//!                                  clean_mask (threshold, close, open)
//!                                              │
//!                                   find_regions (area >= min_area)
//!                                              │
//!                        any region? ──► last_motion_at = now
//!                                              │
//!                 now - last_motion_at <= debounce ──► boxes + marker
//! ```
//!
//! Detection failures are never fatal: the frame passes through untouched
//! and motion is reported inactive.

pub mod background;
pub mod config;
pub mod detector;
pub mod overlay;
pub mod regions;

pub use background::{AdaptiveBackground, BackgroundModel};
pub use config::{MotionConfig, Sensitivity};
pub use detector::{Detection, MotionDetector};
pub use regions::MotionRegion;

/// Externally visible detector state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionState {
    /// Background model is still converging
    Calibrating,
    /// No motion within the debounce window
    Idle,
    /// Motion seen within the debounce window
    Active,
}

impl MotionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MotionState::Calibrating => "calibrating",
            MotionState::Idle => "idle",
            MotionState::Active => "active",
        }
    }
}

impl std::fmt::Display for MotionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

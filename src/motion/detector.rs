//! Per-handler motion detector

use image::RgbImage;
use tokio::time::Instant;

use crate::error::DetectorError;

use super::background::{AdaptiveBackground, BackgroundModel};
use super::config::MotionConfig;
use super::overlay::{draw_marker, draw_regions};
use super::regions::{clean_mask, find_regions, MotionRegion};
use super::MotionState;

/// Result of processing one frame
#[derive(Debug, Clone)]
pub struct Detection {
    /// Annotated frame, or the input frame unchanged
    pub frame: RgbImage,
    /// Whether motion is currently active (debounced)
    pub motion_active: bool,
    /// Regions found in this frame
    pub regions: Vec<MotionRegion>,
}

/// Stateful motion detector
///
/// Owned by exactly one stream handler and fed frames in order. The model is
/// not shared, so creating a fresh detector always restarts calibration.
pub struct MotionDetector {
    config: MotionConfig,
    model: Box<dyn BackgroundModel>,
    started_at: Instant,
    last_motion_at: Option<Instant>,
}

impl MotionDetector {
    /// Create a detector with the built-in adaptive background model
    pub fn new(config: MotionConfig) -> Self {
        let model = AdaptiveBackground::from_config(&config);
        Self::with_model(config, Box::new(model))
    }

    /// Create a detector with a custom background model
    pub fn with_model(config: MotionConfig, model: Box<dyn BackgroundModel>) -> Self {
        Self {
            config,
            model,
            started_at: Instant::now(),
            last_motion_at: None,
        }
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    /// Process a frame at the current time
    pub fn process(&mut self, frame: RgbImage) -> Detection {
        self.process_at(frame, Instant::now())
    }

    /// Process a frame observed at `now`
    ///
    /// Never fails: if detection goes wrong, the frame is returned untouched
    /// with motion reported inactive.
    pub fn process_at(&mut self, mut frame: RgbImage, now: Instant) -> Detection {
        let regions = match self.detect(&frame) {
            Ok(regions) => regions,
            Err(e) => {
                tracing::warn!(error = %e, "Motion detection failed, passing frame through");
                return Detection {
                    frame,
                    motion_active: false,
                    regions: Vec::new(),
                };
            }
        };

        if !regions.is_empty() {
            self.last_motion_at = Some(now);
        }

        let motion_active = self.is_active_at(now);
        if motion_active {
            draw_regions(&mut frame, &regions);
            draw_marker(&mut frame);
        }

        Detection {
            frame,
            motion_active,
            regions,
        }
    }

    /// Whether the last detection is still within the debounce window
    pub fn is_active_at(&self, now: Instant) -> bool {
        self.active_until().is_some_and(|until| now <= until)
    }

    /// Instant after which motion stops being reported, if any was seen
    pub fn active_until(&self) -> Option<Instant> {
        self.last_motion_at.map(|t| t + self.config.debounce)
    }

    /// End of the calibration period
    pub fn calibrated_at(&self) -> Instant {
        self.started_at + self.config.calibration
    }

    pub fn state_at(&self, now: Instant) -> MotionState {
        if now < self.calibrated_at() {
            MotionState::Calibrating
        } else if self.is_active_at(now) {
            MotionState::Active
        } else {
            MotionState::Idle
        }
    }

    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<MotionRegion>, DetectorError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(DetectorError::EmptyFrame);
        }

        let mask = self.model.apply(frame)?;
        if mask.dimensions() != frame.dimensions() {
            return Err(DetectorError::MaskMismatch {
                frame: frame.dimensions(),
                mask: mask.dimensions(),
            });
        }

        let cleaned = clean_mask(&mask);
        Ok(find_regions(&cleaned, self.config.min_area))
    }
}

impl std::fmt::Debug for MotionDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionDetector")
            .field("config", &self.config)
            .field("started_at", &self.started_at)
            .field("last_motion_at", &self.last_motion_at)
            .finish_non_exhaustive()
    }
}

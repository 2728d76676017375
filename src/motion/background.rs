//! Adaptive background model
//!
//! Each pixel keeps a running Gaussian (RGB mean, shared variance). A pixel
//! whose squared distance from the mean exceeds `threshold * variance` is
//! foreground, unless it looks like a darker copy of the background, in
//! which case it is marked as shadow.

use image::{GrayImage, RgbImage};

use crate::error::DetectorError;
use crate::media::pixel_count;

use super::config::MotionConfig;

/// Mask value for background pixels
pub const BACKGROUND: u8 = 0;
/// Mask value for shadow pixels
pub const SHADOW: u8 = 127;
/// Mask value for foreground pixels
pub const FOREGROUND: u8 = 255;

const VAR_INIT: f32 = 15.0;
const VAR_MIN: f32 = 4.0;
const VAR_MAX: f32 = 75.0;
const SHADOW_TAU: f32 = 0.5;

/// A background-subtraction model
///
/// `apply` feeds one frame and returns a mask of the same size using
/// [`BACKGROUND`], [`SHADOW`] and [`FOREGROUND`].
pub trait BackgroundModel: Send {
    fn apply(&mut self, frame: &RgbImage) -> Result<GrayImage, DetectorError>;
}

/// Per-pixel running Gaussian background model
pub struct AdaptiveBackground {
    history: u32,
    var_threshold: f32,
    detect_shadows: bool,
    width: u32,
    height: u32,
    frames_seen: u32,
    mean: Vec<f32>,
    variance: Vec<f32>,
}

impl AdaptiveBackground {
    /// Create an empty model; it initialises itself from the first frame
    pub fn new(history: u32, var_threshold: f32, detect_shadows: bool) -> Self {
        Self {
            history: history.max(1),
            var_threshold,
            detect_shadows,
            width: 0,
            height: 0,
            frames_seen: 0,
            mean: Vec::new(),
            variance: Vec::new(),
        }
    }

    pub fn from_config(config: &MotionConfig) -> Self {
        Self::new(
            config.history,
            config.sensitivity.variance_threshold(),
            config.detect_shadows,
        )
    }

    /// Frames incorporated since the last reset
    pub fn frames_seen(&self) -> u32 {
        self.frames_seen
    }

    fn reset(&mut self, frame: &RgbImage) {
        self.width = frame.width();
        self.height = frame.height();
        self.frames_seen = 1;
        self.mean = frame.as_raw().iter().map(|&v| f32::from(v)).collect();
        self.variance = vec![VAR_INIT; pixel_count(self.width, self.height)];
    }

    fn is_shadow(&self, pixel: [f32; 3], mean: [f32; 3], variance: f32) -> bool {
        let norm2: f32 = mean.iter().map(|m| m * m).sum();
        if norm2 <= f32::EPSILON {
            return false;
        }

        let dot: f32 = pixel.iter().zip(mean.iter()).map(|(p, m)| p * m).sum();
        let a = dot / norm2;
        if !(SHADOW_TAU..=1.0).contains(&a) {
            return false;
        }

        let dist2a: f32 = pixel
            .iter()
            .zip(mean.iter())
            .map(|(p, m)| {
                let d = p - a * m;
                d * d
            })
            .sum();

        dist2a < self.var_threshold * variance * a * a
    }
}

impl BackgroundModel for AdaptiveBackground {
    fn apply(&mut self, frame: &RgbImage) -> Result<GrayImage, DetectorError> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Err(DetectorError::EmptyFrame);
        }

        if self.frames_seen == 0 || (width, height) != (self.width, self.height) {
            self.reset(frame);
            return Ok(GrayImage::new(width, height));
        }

        self.frames_seen = (self.frames_seen + 1).min(self.history);
        let alpha = 1.0 / self.frames_seen as f32;

        let mut mask = GrayImage::new(width, height);
        let pixels = frame.as_raw().chunks_exact(3);
        let mask_out = mask.iter_mut();

        for (i, (rgb, out)) in pixels.zip(mask_out).enumerate() {
            let pixel = [f32::from(rgb[0]), f32::from(rgb[1]), f32::from(rgb[2])];
            let base = i * 3;
            let mean = [self.mean[base], self.mean[base + 1], self.mean[base + 2]];
            let variance = self.variance[i];

            let diff = [pixel[0] - mean[0], pixel[1] - mean[1], pixel[2] - mean[2]];
            let dist2 = diff.iter().map(|d| d * d).sum::<f32>();

            *out = if dist2 < self.var_threshold * variance {
                BACKGROUND
            } else if self.detect_shadows && self.is_shadow(pixel, mean, variance) {
                SHADOW
            } else {
                FOREGROUND
            };

            for c in 0..3 {
                self.mean[base + c] += alpha * diff[c];
            }
            self.variance[i] = (variance + alpha * (dist2 - variance)).clamp(VAR_MIN, VAR_MAX);
        }

        Ok(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn uniform(value: u8) -> RgbImage {
        RgbImage::from_pixel(32, 32, Rgb([value, value, value]))
    }

    fn with_square(base: u8, square: u8) -> RgbImage {
        let mut frame = uniform(base);
        for y in 8..16 {
            for x in 8..16 {
                frame.put_pixel(x, y, Rgb([square, square, square]));
            }
        }
        frame
    }

    fn trained_model() -> AdaptiveBackground {
        let mut model = AdaptiveBackground::new(500, 16.0, true);
        for _ in 0..10 {
            model.apply(&uniform(100)).unwrap();
        }
        model
    }

    #[test]
    fn test_first_frame_is_background() {
        let mut model = AdaptiveBackground::new(500, 16.0, true);
        let mask = model.apply(&uniform(100)).unwrap();

        assert!(mask.pixels().all(|p| p[0] == BACKGROUND));
        assert_eq!(model.frames_seen(), 1);
    }

    #[test]
    fn test_static_scene_stays_background() {
        let mut model = trained_model();
        let mask = model.apply(&uniform(100)).unwrap();
        assert!(mask.pixels().all(|p| p[0] == BACKGROUND));
    }

    #[test]
    fn test_bright_object_is_foreground() {
        let mut model = trained_model();
        let mask = model.apply(&with_square(100, 250)).unwrap();

        assert_eq!(mask.get_pixel(10, 10)[0], FOREGROUND);
        assert_eq!(mask.get_pixel(0, 0)[0], BACKGROUND);
        let count = mask.pixels().filter(|p| p[0] == FOREGROUND).count();
        assert_eq!(count, 64);
    }

    #[test]
    fn test_darkened_area_is_shadow() {
        let mut model = trained_model();
        let mask = model.apply(&with_square(100, 70)).unwrap();

        assert_eq!(mask.get_pixel(10, 10)[0], SHADOW);
        assert_eq!(mask.get_pixel(20, 20)[0], BACKGROUND);
    }

    #[test]
    fn test_shadows_disabled() {
        let mut model = AdaptiveBackground::new(500, 16.0, false);
        for _ in 0..10 {
            model.apply(&uniform(100)).unwrap();
        }
        let mask = model.apply(&with_square(100, 70)).unwrap();
        assert_eq!(mask.get_pixel(10, 10)[0], FOREGROUND);
    }

    #[test]
    fn test_resolution_change_resets() {
        let mut model = trained_model();
        let frame = RgbImage::from_pixel(16, 16, Rgb([250, 250, 250]));
        let mask = model.apply(&frame).unwrap();

        assert_eq!(mask.dimensions(), (16, 16));
        assert!(mask.pixels().all(|p| p[0] == BACKGROUND));
        assert_eq!(model.frames_seen(), 1);
    }

    #[test]
    fn test_empty_frame_rejected() {
        let mut model = AdaptiveBackground::new(500, 16.0, true);
        let result = model.apply(&RgbImage::new(0, 0));
        assert_eq!(result.unwrap_err(), DetectorError::EmptyFrame);
    }
}

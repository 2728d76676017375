//! Motion detector configuration

use std::time::Duration;

/// Detector sensitivity
///
/// Maps to the background model's variance threshold: a lower threshold
/// classifies smaller deviations as foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sensitivity {
    Low,
    #[default]
    Medium,
    High,
}

impl Sensitivity {
    /// Squared-distance threshold, in units of pixel variance
    pub fn variance_threshold(&self) -> f32 {
        match self {
            Sensitivity::Low => 32.0,
            Sensitivity::Medium => 16.0,
            Sensitivity::High => 8.0,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Sensitivity::Low),
            "medium" => Some(Sensitivity::Medium),
            "high" => Some(Sensitivity::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sensitivity::Low => "low",
            Sensitivity::Medium => "medium",
            Sensitivity::High => "high",
        }
    }
}

/// Motion detector options
#[derive(Debug, Clone)]
pub struct MotionConfig {
    /// Background model sensitivity
    pub sensitivity: Sensitivity,

    /// Regions smaller than this (px²) are ignored
    pub min_area: f64,

    /// How long "motion active" stays set after the last detection
    pub debounce: Duration,

    /// Time after (re)creation during which the model is still converging
    pub calibration: Duration,

    /// Number of frames the background model averages over
    pub history: u32,

    /// Whether shadow pixels are recognised (and ignored)
    pub detect_shadows: bool,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            sensitivity: Sensitivity::Medium,
            min_area: 500.0,
            debounce: Duration::from_secs(2),
            calibration: Duration::from_secs(5),
            history: 500,
            detect_shadows: true,
        }
    }
}

impl MotionConfig {
    /// Set the sensitivity
    pub fn sensitivity(mut self, sensitivity: Sensitivity) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    /// Set the minimum region area
    pub fn min_area(mut self, area: f64) -> Self {
        self.min_area = area.max(0.0);
        self
    }

    /// Set the debounce window
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Set the calibration period
    pub fn calibration(mut self, calibration: Duration) -> Self {
        self.calibration = calibration;
        self
    }

    /// Set the background history length
    pub fn history(mut self, frames: u32) -> Self {
        self.history = frames.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MotionConfig::default();

        assert_eq!(config.sensitivity, Sensitivity::Medium);
        assert_eq!(config.min_area, 500.0);
        assert_eq!(config.debounce, Duration::from_secs(2));
        assert_eq!(config.history, 500);
        assert!(config.detect_shadows);
    }

    #[test]
    fn test_sensitivity_thresholds() {
        assert_eq!(Sensitivity::Low.variance_threshold(), 32.0);
        assert_eq!(Sensitivity::Medium.variance_threshold(), 16.0);
        assert_eq!(Sensitivity::High.variance_threshold(), 8.0);
    }

    #[test]
    fn test_sensitivity_parse() {
        assert_eq!(Sensitivity::parse("HIGH"), Some(Sensitivity::High));
        assert_eq!(Sensitivity::parse(" low "), Some(Sensitivity::Low));
        assert_eq!(Sensitivity::parse("extreme"), None);
    }

    #[test]
    fn test_builder_chaining() {
        let config = MotionConfig::default()
            .sensitivity(Sensitivity::High)
            .min_area(-5.0)
            .debounce(Duration::from_millis(500))
            .history(0);

        assert_eq!(config.sensitivity, Sensitivity::High);
        assert_eq!(config.min_area, 0.0);
        assert_eq!(config.debounce, Duration::from_millis(500));
        assert_eq!(config.history, 1);
    }
}

//! Stream handler configuration

use std::time::Duration;

use crate::motion::MotionConfig;

/// Stream handler options
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// JPEG quality for frames published to viewers (1-100)
    pub jpeg_quality: u8,

    /// Fixed wait between a failure and the next connect attempt
    pub retry_interval: Duration,

    /// Connect must deliver a usable first frame within this time
    pub connect_timeout: Duration,

    /// A streaming transport that stays silent this long is treated as dead
    pub read_timeout: Duration,

    /// Options for the per-handler motion detector
    pub motion: MotionConfig,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 80,
            retry_interval: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
            motion: MotionConfig::default(),
        }
    }
}

impl HandlerConfig {
    /// Set the output JPEG quality
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Set the retry interval
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the read timeout
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the motion detector options
    pub fn motion(mut self, motion: MotionConfig) -> Self {
        self.motion = motion;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HandlerConfig::default();

        assert_eq!(config.jpeg_quality, 80);
        assert_eq!(config.retry_interval, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.read_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_quality_clamped() {
        assert_eq!(HandlerConfig::default().jpeg_quality(0).jpeg_quality, 1);
        assert_eq!(HandlerConfig::default().jpeg_quality(250).jpeg_quality, 100);
    }
}

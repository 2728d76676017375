//! Registry configuration

use std::time::Duration;

/// Registry options
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// How long a handler with no viewers is kept before it is retired
    pub grace_period: Duration,

    /// Interval of the background cleanup sweep
    pub cleanup_interval: Duration,

    /// Motion detection state for newly created handlers
    pub motion_default: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(5),
            cleanup_interval: Duration::from_secs(1),
            motion_default: false,
        }
    }
}

impl RegistryConfig {
    /// Set the grace period
    pub fn grace_period(mut self, period: Duration) -> Self {
        self.grace_period = period;
        self
    }

    /// Set the cleanup interval
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Set the initial motion state of new handlers
    pub fn motion_default(mut self, enabled: bool) -> Self {
        self.motion_default = enabled;
        self
    }
}

//! Stream entry and state types
//!
//! This module defines the per-key state stored in the registry.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::handler::{HandlerPhase, MotionStatus, StreamHandler};

/// State of a stream entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// At least one viewer holds the stream
    Active,
    /// No viewers, waiting for the grace period to expire
    GracePeriod,
}

/// Entry for a single key in the registry
#[derive(Debug)]
pub struct StreamEntry {
    /// The handler serving this key
    pub handler: Arc<StreamHandler>,

    /// When the last viewer left (for grace period tracking)
    pub idle_since: Option<Instant>,

    /// When the entry was created
    pub created_at: Instant,

    /// Current entry state
    pub state: StreamState,
}

impl StreamEntry {
    pub(super) fn new(handler: Arc<StreamHandler>) -> Self {
        Self {
            handler,
            idle_since: None,
            created_at: Instant::now(),
            state: StreamState::Active,
        }
    }

    /// Get the number of viewers
    pub fn viewer_count(&self) -> u32 {
        self.handler.viewer_count()
    }

    pub(super) fn mark_active(&mut self) {
        self.idle_since = None;
        self.state = StreamState::Active;
    }

    pub(super) fn mark_idle(&mut self, now: Instant) {
        self.idle_since = Some(now);
        self.state = StreamState::GracePeriod;
    }

    /// Whether the grace period has run out with nobody watching
    pub(super) fn is_expired(&self, now: Instant, grace_period: Duration) -> bool {
        if self.viewer_count() > 0 {
            return false;
        }
        if self.handler.is_retired() {
            return true;
        }
        self.idle_since.is_some_and(|since| now.duration_since(since) >= grace_period)
    }

    pub fn stats(&self) -> StreamStats {
        let health = self.handler.health();
        StreamStats {
            viewer_count: self.viewer_count(),
            state: self.state,
            phase: health.phase,
            connect_attempts: health.connect_attempts,
            consecutive_failures: health.consecutive_failures,
            frames_published: health.frames_published,
            last_frame_at: health.last_frame_at,
            motion: self.handler.motion_status(),
        }
    }
}

/// Statistics for a stream
#[derive(Debug, Clone)]
pub struct StreamStats {
    /// Number of active viewers
    pub viewer_count: u32,
    /// Current entry state
    pub state: StreamState,
    /// Handler lifecycle phase
    pub phase: HandlerPhase,
    pub connect_attempts: u64,
    pub consecutive_failures: u32,
    pub frames_published: u64,
    /// When the last frame was published
    pub last_frame_at: Option<Instant>,
    pub motion: MotionStatus,
}

impl StreamStats {
    /// Whether the stream is delivering frames right now
    pub fn is_online(&self) -> bool {
        self.phase == HandlerPhase::Streaming
    }
}

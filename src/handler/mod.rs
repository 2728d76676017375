//! Per-source stream handler
//!
//! A [`StreamHandler`] owns exactly one [`FrameSource`] and runs a single
//! background task that connects, reads, annotates, encodes and publishes
//! frames. Any number of viewers read the latest published frame without
//! touching the upstream connection.
//!
//! # Lifecycle
//!
//! ```text
//!              spawn
//!                │
//!                ▼
//!          ┌──────────┐  connect ok   ┌───────────┐
//!          │ Starting │─────────────► │ Streaming │◄──────┐
//!          └────┬─────┘               └─────┬─────┘       │
//!               │ connect failed            │ read error  │ connect ok
//!               ▼                           ▼             │
//!          ┌──────────────────────────────────────┐       │
//!          │ Retrying (wait retry_interval, dial) │───────┘
//!          └──────────────────────────────────────┘
//!
//!   retire() from any state ──► Retired (transport closed, detector dropped)
//! ```
//!
//! Motion detection can be switched on and off at any time without touching
//! the connection. Every switch from off to on starts a fresh detector.

pub mod config;
pub mod latest;
mod worker;

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::media::EncodedFrame;
use crate::motion::MotionState;
use crate::source::{FrameSource, SourceKey};

pub use config::HandlerConfig;
pub use latest::LatestFrame;

use worker::Worker;

/// Lifecycle phase of a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerPhase {
    /// First connect attempt in progress
    Starting,
    /// Transport open, frames flowing
    Streaming,
    /// Waiting to reconnect, or reconnecting, after a failure
    Retrying,
    /// Stopped for good
    Retired,
}

impl HandlerPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerPhase::Starting => "starting",
            HandlerPhase::Streaming => "streaming",
            HandlerPhase::Retrying => "retrying",
            HandlerPhase::Retired => "retired",
        }
    }
}

impl std::fmt::Display for HandlerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a handler's connection health
#[derive(Debug, Clone)]
pub struct HandlerHealth {
    pub phase: HandlerPhase,
    /// Connect attempts since the handler started
    pub connect_attempts: u64,
    /// Failures since the last successful connect
    pub consecutive_failures: u32,
    pub frames_published: u64,
    /// When the most recent frame was published
    pub last_frame_at: Option<Instant>,
    /// Most recent connect or read failure
    pub last_error: Option<String>,
}

impl Default for HandlerHealth {
    fn default() -> Self {
        Self {
            phase: HandlerPhase::Starting,
            connect_attempts: 0,
            consecutive_failures: 0,
            frames_published: 0,
            last_frame_at: None,
            last_error: None,
        }
    }
}

/// Motion capability and current detection result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionStatus {
    pub enabled: bool,
    pub active: bool,
    /// `None` while detection is disabled
    pub state: Option<MotionState>,
}

impl MotionStatus {
    pub const DISABLED: MotionStatus = MotionStatus {
        enabled: false,
        active: false,
        state: None,
    };
}

/// Detector timing as last published by the worker
#[derive(Debug, Clone, Default)]
pub(crate) struct MotionSnapshot {
    /// Enable generation the detector belongs to
    epoch: u64,
    calibrated_at: Option<Instant>,
    active_until: Option<Instant>,
}

/// State shared between the handler and its worker task
#[derive(Debug)]
pub(crate) struct Shared {
    latest: LatestFrame,
    motion_enabled: AtomicBool,
    /// Bumped on every off-to-on switch
    motion_epoch: AtomicU64,
    motion: ArcSwap<MotionSnapshot>,
    health: ArcSwap<HandlerHealth>,
    /// Cancelled once the worker has fully stopped
    done: CancellationToken,
}

/// Shared, reconnecting reader for one source key
#[derive(Debug)]
pub struct StreamHandler {
    key: SourceKey,
    shared: Arc<Shared>,
    viewers: AtomicU32,
    motion_toggle: Mutex<()>,
    cancel: CancellationToken,
    created_at: Instant,
}

impl StreamHandler {
    /// Start a handler for `source`
    ///
    /// Must be called from within a Tokio runtime. The first connect attempt
    /// starts immediately.
    pub fn spawn<S: FrameSource>(
        key: SourceKey,
        source: S,
        config: HandlerConfig,
        motion_enabled: bool,
    ) -> Arc<Self> {
        let shared = Arc::new(Shared {
            latest: LatestFrame::new(),
            motion_enabled: AtomicBool::new(motion_enabled),
            motion_epoch: AtomicU64::new(u64::from(motion_enabled)),
            motion: ArcSwap::from_pointee(MotionSnapshot::default()),
            health: ArcSwap::from_pointee(HandlerHealth::default()),
            done: CancellationToken::new(),
        });
        let cancel = CancellationToken::new();

        let worker = Worker::new(
            key.clone(),
            source,
            config,
            Arc::clone(&shared),
            cancel.clone(),
        );
        tokio::spawn(worker.run());

        tracing::debug!(stream = %key, motion = motion_enabled, "Stream handler spawned");

        Arc::new(Self {
            key,
            shared,
            viewers: AtomicU32::new(0),
            motion_toggle: Mutex::new(()),
            cancel,
            created_at: Instant::now(),
        })
    }

    pub fn key(&self) -> &SourceKey {
        &self.key
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Most recently published frame, if any
    pub fn latest_frame(&self) -> Option<Arc<EncodedFrame>> {
        self.shared.latest.load()
    }

    /// Wait for a frame newer than sequence `after`
    ///
    /// Returns `None` once the handler is retired.
    pub async fn next_frame_after(&self, after: u64) -> Option<Arc<EncodedFrame>> {
        self.shared.latest.wait_newer(after).await
    }

    /// Switch motion detection on or off
    ///
    /// Never touches the upstream connection. Switching on always starts a
    /// new detector that calibrates from scratch.
    pub fn set_motion_enabled(&self, enabled: bool) {
        let _guard = self.motion_toggle.lock();
        let was_enabled = self.shared.motion_enabled.load(Ordering::Acquire);
        if was_enabled == enabled {
            return;
        }

        if enabled {
            self.shared.motion_epoch.fetch_add(1, Ordering::AcqRel);
        }
        self.shared.motion_enabled.store(enabled, Ordering::Release);

        tracing::info!(stream = %self.key, enabled = enabled, "Motion detection toggled");
    }

    pub fn motion_enabled(&self) -> bool {
        self.shared.motion_enabled.load(Ordering::Acquire)
    }

    /// Current motion status
    pub fn motion_status(&self) -> MotionStatus {
        self.motion_status_at(Instant::now())
    }

    /// Motion status as of `now`
    pub fn motion_status_at(&self, now: Instant) -> MotionStatus {
        if !self.motion_enabled() {
            return MotionStatus::DISABLED;
        }

        let epoch = self.shared.motion_epoch.load(Ordering::Acquire);
        let snapshot = self.shared.motion.load();

        // The worker has not processed a frame with the current detector yet
        let calibrated_at = match snapshot.calibrated_at {
            Some(at) if snapshot.epoch == epoch => at,
            _ => {
                return MotionStatus {
                    enabled: true,
                    active: false,
                    state: Some(MotionState::Calibrating),
                }
            }
        };

        let active = snapshot.active_until.is_some_and(|until| now <= until);
        let state = if now < calibrated_at {
            MotionState::Calibrating
        } else if active {
            MotionState::Active
        } else {
            MotionState::Idle
        };

        MotionStatus {
            enabled: true,
            active,
            state: Some(state),
        }
    }

    /// Register a viewer; returns the new viewer count
    pub fn acquire(&self) -> u32 {
        self.viewers.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Unregister a viewer; returns the remaining viewer count
    pub fn release(&self) -> u32 {
        let prev = self
            .viewers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or(0);
        prev.saturating_sub(1)
    }

    pub fn viewer_count(&self) -> u32 {
        self.viewers.load(Ordering::Acquire)
    }

    /// Connection health snapshot
    pub fn health(&self) -> HandlerHealth {
        HandlerHealth::clone(&self.shared.health.load())
    }

    pub fn phase(&self) -> HandlerPhase {
        self.shared.health.load().phase
    }

    /// Stop the handler
    ///
    /// Interrupts any pending connect, read or retry wait. The transport is
    /// closed and the detector released by the worker as it exits.
    pub fn retire(&self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!(stream = %self.key, "Stream handler retiring");
            self.cancel.cancel();
        }
    }

    /// Whether `retire` has been requested
    pub fn is_retired(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait until the worker has fully stopped
    pub async fn wait_retired(&self) {
        self.shared.done.cancelled().await
    }
}

impl Drop for StreamHandler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

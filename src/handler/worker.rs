//! Handler background task

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{ConnectionError, ReadError};
use crate::media::{encode_jpeg, EncodedFrame, Frame};
use crate::motion::MotionDetector;
use crate::source::{FrameSource, SourceKey};

use super::{HandlerConfig, HandlerHealth, HandlerPhase, MotionSnapshot, Shared};

enum Attempt {
    Connected,
    Failed,
    Cancelled,
}

/// Output of the blocking annotate + encode step
struct Processed {
    detector: Option<MotionDetector>,
    encoded: Result<bytes::Bytes, image::ImageError>,
    dimensions: (u32, u32),
    motion: bool,
}

pub(super) struct Worker<S: FrameSource> {
    key: SourceKey,
    source: S,
    config: HandlerConfig,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    detector: Option<MotionDetector>,
    detector_epoch: u64,
    sequence: u64,
    health: HandlerHealth,
}

impl<S: FrameSource> Worker<S> {
    pub(super) fn new(
        key: SourceKey,
        source: S,
        config: HandlerConfig,
        shared: Arc<Shared>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            key,
            source,
            config,
            shared,
            cancel,
            detector: None,
            detector_epoch: 0,
            sequence: 0,
            health: HandlerHealth::default(),
        }
    }

    pub(super) async fn run(mut self) {
        // Signals completion even if the task unwinds
        let _done = self.shared.done.clone().drop_guard();

        loop {
            match self.connect().await {
                Attempt::Connected => {
                    if !self.stream().await {
                        break;
                    }
                }
                Attempt::Failed => {}
                Attempt::Cancelled => break,
            }

            if !self.wait_retry().await {
                break;
            }
        }

        self.finish().await;
    }

    async fn connect(&mut self) -> Attempt {
        self.health.connect_attempts += 1;
        self.publish_health();

        let timeout = self.config.connect_timeout;
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Attempt::Cancelled,
            r = tokio::time::timeout(timeout, self.source.connect()) => r,
        };

        let error = match result {
            Ok(Ok(())) => {
                tracing::info!(
                    stream = %self.key,
                    attempts = self.health.connect_attempts,
                    "Source connected"
                );
                self.health.consecutive_failures = 0;
                self.health.last_error = None;
                self.set_phase(HandlerPhase::Streaming);
                return Attempt::Connected;
            }
            Ok(Err(e)) => e,
            Err(_) => ConnectionError::Timeout(timeout),
        };

        self.fail(error.to_string()).await;
        tracing::warn!(
            stream = %self.key,
            error = %error,
            failures = self.health.consecutive_failures,
            retry_in_secs = self.config.retry_interval.as_secs_f64(),
            "Connect failed"
        );
        Attempt::Failed
    }

    /// Read until the transport fails. Returns `false` if cancelled.
    async fn stream(&mut self) -> bool {
        let read_timeout = self.config.read_timeout;

        loop {
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return false,
                r = tokio::time::timeout(read_timeout, self.source.read_frame()) => r,
            };

            let error = match result {
                Ok(Ok(frame)) if frame.width() == 0 || frame.height() == 0 => {
                    ReadError::EmptyFrame
                }
                Ok(Ok(frame)) => {
                    self.process(frame).await;
                    continue;
                }
                Ok(Err(e)) => e,
                Err(_) => ReadError::Timeout(read_timeout),
            };

            self.fail(error.to_string()).await;
            tracing::warn!(
                stream = %self.key,
                error = %error,
                frames = self.health.frames_published,
                retry_in_secs = self.config.retry_interval.as_secs_f64(),
                "Stream read failed, reconnecting"
            );
            return true;
        }
    }

    /// Returns `false` if cancelled during the wait
    async fn wait_retry(&mut self) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(self.config.retry_interval) => true,
        }
    }

    async fn fail(&mut self, reason: String) {
        self.health.consecutive_failures += 1;
        self.health.last_error = Some(reason);
        self.source.close().await;
        self.set_phase(HandlerPhase::Retrying);
    }

    async fn process(&mut self, frame: Frame) {
        self.sync_detector();

        let mut detector = self.detector.take();
        let quality = self.config.jpeg_quality;
        let captured_at = frame.captured_at;

        let job = tokio::task::spawn_blocking(move || {
            let (image, motion) = match detector.as_mut() {
                Some(d) => {
                    let detection = d.process_at(frame.image, captured_at);
                    (detection.frame, detection.motion_active)
                }
                None => (frame.image, false),
            };
            Processed {
                detector,
                encoded: encode_jpeg(&image, quality),
                dimensions: image.dimensions(),
                motion,
            }
        });

        let processed = match job.await {
            Ok(processed) => processed,
            Err(e) => {
                // Detector is gone with the task; the next frame recreates it
                tracing::error!(stream = %self.key, error = %e, "Frame processing task failed");
                return;
            }
        };

        self.detector = processed.detector;
        self.publish_motion(processed.motion);

        let data = match processed.encoded {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(stream = %self.key, error = %e, "JPEG encode failed, frame dropped");
                return;
            }
        };

        self.sequence += 1;
        let (width, height) = processed.dimensions;
        self.shared.latest.publish(EncodedFrame {
            sequence: self.sequence,
            data,
            width,
            height,
            captured_at,
            motion: processed.motion,
        });

        self.health.frames_published += 1;
        self.health.last_frame_at = Some(Instant::now());
        self.publish_health();
    }

    /// Create or drop the detector to match the motion flag
    fn sync_detector(&mut self) {
        if !self.shared.motion_enabled.load(Ordering::Acquire) {
            if self.detector.take().is_some() {
                self.shared.motion.store(Arc::new(MotionSnapshot::default()));
                tracing::debug!(stream = %self.key, "Motion detector released");
            }
            return;
        }

        let epoch = self.shared.motion_epoch.load(Ordering::Acquire);
        if self.detector.is_none() || self.detector_epoch != epoch {
            self.detector = Some(MotionDetector::new(self.config.motion.clone()));
            self.detector_epoch = epoch;
            tracing::debug!(stream = %self.key, epoch = epoch, "Motion detector started");
        }
    }

    fn publish_motion(&self, motion: bool) {
        let Some(detector) = self.detector.as_ref() else {
            return;
        };

        self.shared.motion.store(Arc::new(MotionSnapshot {
            epoch: self.detector_epoch,
            calibrated_at: Some(detector.calibrated_at()),
            active_until: if motion { detector.active_until() } else { None },
        }));
    }

    fn set_phase(&mut self, phase: HandlerPhase) {
        if self.health.phase != phase {
            tracing::debug!(
                stream = %self.key,
                from = %self.health.phase,
                to = %phase,
                "Handler phase"
            );
        }
        self.health.phase = phase;
        self.publish_health();
    }

    fn publish_health(&self) {
        self.shared.health.store(Arc::new(self.health.clone()));
    }

    async fn finish(mut self) {
        self.source.close().await;
        self.detector = None;
        self.set_phase(HandlerPhase::Retired);
        self.shared.latest.close();

        tracing::info!(
            stream = %self.key,
            frames = self.health.frames_published,
            "Stream handler retired"
        );
    }
}

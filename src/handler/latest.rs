//! Latest-frame slot
//!
//! Single writer, many readers. Readers always see the most recent frame and
//! never block the writer; a slow reader simply skips intermediate frames.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::Notify;

use crate::media::EncodedFrame;

/// Holds the most recently published frame of a stream
#[derive(Debug, Default)]
pub struct LatestFrame {
    slot: ArcSwapOption<EncodedFrame>,
    notify: Notify,
    closed: AtomicBool,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame and wake all waiting readers
    pub fn publish(&self, frame: EncodedFrame) {
        self.slot.store(Some(Arc::new(frame)));
        self.notify.notify_waiters();
    }

    /// Current frame, if any has been published
    pub fn load(&self) -> Option<Arc<EncodedFrame>> {
        self.slot.load_full()
    }

    /// Sequence number of the current frame (0 before the first publish)
    pub fn sequence(&self) -> u64 {
        self.slot.load().as_ref().map_or(0, |f| f.sequence)
    }

    /// Mark the slot as finished; waiting readers return `None`
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Wait for a frame with a sequence number greater than `after`
    ///
    /// Returns `None` once the slot is closed and nothing newer is available.
    pub async fn wait_newer(&self, after: u64) -> Option<Arc<EncodedFrame>> {
        loop {
            // Register interest before checking, so a publish between the
            // check and the await is not missed
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(frame) = self.load() {
                if frame.sequence > after {
                    return Some(frame);
                }
            }
            if self.is_closed() {
                return None;
            }

            notified.await;
        }
    }
}

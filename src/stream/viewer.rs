//! Per-viewer stream handle

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::Stream;

use crate::handler::{MotionStatus, StreamHandler};
use crate::media::EncodedFrame;
use crate::registry::StreamRegistry;
use crate::source::{FfmpegSourceFactory, SourceFactory, SourceKey};

use super::multipart::encode_part;

/// One viewer's subscription to a stream
///
/// Holds a viewer reference on the handler for as long as it lives; dropping
/// it (or calling [`close`](Self::close)) releases the reference.
pub struct ViewerStream<F: SourceFactory = FfmpegSourceFactory> {
    registry: StreamRegistry<F>,
    key: SourceKey,
    handler: Arc<StreamHandler>,
    last_sequence: u64,
    released: bool,
}

impl<F: SourceFactory> ViewerStream<F> {
    pub(crate) fn new(
        registry: StreamRegistry<F>,
        key: SourceKey,
        handler: Arc<StreamHandler>,
    ) -> Self {
        Self {
            registry,
            key,
            handler,
            last_sequence: 0,
            released: false,
        }
    }

    pub fn key(&self) -> &SourceKey {
        &self.key
    }

    pub fn handler(&self) -> &Arc<StreamHandler> {
        &self.handler
    }

    /// Sequence number of the last frame delivered (0 before the first)
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Wait for a frame newer than the last one delivered
    ///
    /// Frames published while the viewer was busy are skipped. Returns
    /// `None` once the handler is retired.
    pub async fn next_frame(&mut self) -> Option<Arc<EncodedFrame>> {
        let frame = self.handler.next_frame_after(self.last_sequence).await?;
        self.last_sequence = frame.sequence;
        Some(frame)
    }

    /// Like [`next_frame`](Self::next_frame), framed as a multipart part
    pub async fn next_part(&mut self) -> Option<Bytes> {
        let frame = self.next_frame().await?;
        Some(encode_part(&frame.data))
    }

    /// Turn the viewer into a stream of multipart parts
    ///
    /// When no newer frame arrives within `resend_after` (the upstream is
    /// down or stalled), the latest frame is sent again so a closed client
    /// connection still surfaces as a write error. Dropping the stream
    /// releases the viewer.
    pub fn into_parts(
        self,
        resend_after: Duration,
    ) -> impl Stream<Item = Bytes> + Send + 'static {
        futures_util::stream::unfold(self, move |mut viewer| async move {
            loop {
                match tokio::time::timeout(resend_after, viewer.next_part()).await {
                    Ok(Some(part)) => return Some((part, viewer)),
                    Ok(None) => return None,
                    Err(_) => {
                        if let Some(frame) = viewer.handler.latest_frame() {
                            return Some((encode_part(&frame.data), viewer));
                        }
                    }
                }
            }
        })
    }

    pub fn motion_status(&self) -> MotionStatus {
        self.handler.motion_status()
    }

    /// Stop viewing
    pub fn close(self) {
        drop(self);
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.registry.release_handler(&self.key, &self.handler);
        }
    }
}

impl<F: SourceFactory> Drop for ViewerStream<F> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<F: SourceFactory> std::fmt::Debug for ViewerStream<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewerStream")
            .field("key", &self.key)
            .field("last_sequence", &self.last_sequence)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures_util::StreamExt;
    use image::{Rgb, RgbImage};
    use tokio_test::{assert_pending, assert_ready};

    use super::*;
    use crate::error::{ConnectionError, ReadError};
    use crate::handler::{HandlerConfig, HandlerPhase};
    use crate::media::Frame;
    use crate::registry::{RegistryConfig, RegistryError, StreamState};
    use crate::settings::SourceConfig;
    use crate::source::{FrameSource, Quality};

    /// Serves `frames` frames, then stalls, or with `outage` set fails and
    /// refuses every later dial
    struct FiniteSource {
        frames: usize,
        outage: bool,
    }

    impl FrameSource for FiniteSource {
        async fn connect(&mut self) -> Result<(), ConnectionError> {
            if self.outage && self.frames == 0 {
                return Err(ConnectionError::Closed);
            }
            Ok(())
        }

        async fn read_frame(&mut self) -> Result<Frame, ReadError> {
            if self.frames == 0 {
                if self.outage {
                    return Err(ReadError::Eof);
                }
                std::future::pending::<()>().await;
            }
            self.frames -= 1;
            tokio::time::sleep(Duration::from_millis(40)).await;
            Ok(Frame::new(RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]))))
        }

        async fn close(&mut self) {}
    }

    struct FiniteFactory {
        frames: usize,
        outage: bool,
        created: Arc<AtomicUsize>,
    }

    impl SourceFactory for FiniteFactory {
        type Source = FiniteSource;

        fn create(&self, _source: &SourceConfig, _key: &SourceKey) -> FiniteSource {
            self.created.fetch_add(1, Ordering::SeqCst);
            FiniteSource {
                frames: self.frames,
                outage: self.outage,
            }
        }
    }

    fn registry(frames: usize) -> (StreamRegistry<FiniteFactory>, Arc<AtomicUsize>) {
        registry_with(frames, false)
    }

    fn registry_with(
        frames: usize,
        outage: bool,
    ) -> (StreamRegistry<FiniteFactory>, Arc<AtomicUsize>) {
        let created = Arc::new(AtomicUsize::new(0));
        let factory = FiniteFactory {
            frames,
            outage,
            created: Arc::clone(&created),
        };
        let registry = StreamRegistry::with_config(
            factory,
            vec![SourceConfig::new("cam", "rtsp://10.0.0.5:554/ch0")],
            HandlerConfig::default().read_timeout(Duration::from_secs(3600)),
            RegistryConfig::default(),
        );
        (registry, created)
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_in_order() {
        let (registry, _) = registry(usize::MAX);
        let mut viewer = registry.open_stream("cam", Quality::Primary, false).unwrap();

        let first = viewer.next_frame().await.unwrap();
        let second = viewer.next_frame().await.unwrap();
        assert!(second.sequence > first.sequence);
        assert_eq!(viewer.last_sequence(), second.sequence);

        let part = viewer.next_part().await.unwrap();
        assert!(part.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n"));
        assert!(part.ends_with(b"\xFF\xD9\r\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_newer_frame() {
        let (registry, _) = registry(1);
        let mut viewer = registry.open_stream("cam", Quality::Primary, false).unwrap();

        let frame = viewer.next_frame().await.unwrap();
        assert_eq!(frame.sequence, 1);

        // The source has stalled: no newer frame, no repeat
        let mut next = tokio_test::task::spawn(viewer.next_frame());
        assert_pending!(next.poll());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_pending!(next.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases() {
        let (registry, created) = registry(usize::MAX);
        let key = SourceKey::new("cam", Quality::Primary);

        let a = registry.open_stream("cam", Quality::Primary, false).unwrap();
        let b = registry.open_stream("cam", Quality::Primary, false).unwrap();
        assert!(Arc::ptr_eq(a.handler(), b.handler()));
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(a.handler().viewer_count(), 2);

        drop(a);
        assert_eq!(b.handler().viewer_count(), 1);

        b.close();
        let stats = registry.get_stream_stats(&key).unwrap();
        assert_eq!(stats.viewer_count, 0);
        assert_eq!(stats.state, StreamState::GracePeriod);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_applies_motion_flag() {
        let (registry, _) = registry(usize::MAX);

        let viewer = registry.open_stream("cam", Quality::Primary, true).unwrap();
        assert!(viewer.motion_status().enabled);

        let other = registry.open_stream("cam", Quality::Primary, false).unwrap();
        assert!(!viewer.motion_status().enabled);
        assert!(Arc::ptr_eq(viewer.handler(), other.handler()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_parts_repeat_last_frame_during_outage() {
        let (registry, _) = registry_with(1, true);
        let key = SourceKey::new("cam", Quality::Primary);
        let viewer = registry.open_stream("cam", Quality::Primary, false).unwrap();
        let handler = Arc::clone(viewer.handler());
        let mut parts = Box::pin(viewer.into_parts(Duration::from_secs(1)));

        let first = parts.next().await.unwrap();
        let again = parts.next().await.unwrap();
        assert_eq!(first, again);
        assert_eq!(handler.phase(), HandlerPhase::Retrying);

        // Client went away while the source is down
        drop(parts);
        let stats = registry.get_stream_stats(&key).unwrap();
        assert_eq!(stats.viewer_count, 0);
        assert_eq!(stats.state, StreamState::GracePeriod);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(handler.is_retired());
        assert_eq!(registry.stream_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parts_end_when_retired() {
        let (registry, _) = registry(usize::MAX);
        let viewer = registry.open_stream("cam", Quality::Primary, false).unwrap();
        let mut parts = Box::pin(viewer.into_parts(Duration::from_secs(1)));

        assert!(parts.next().await.is_some());
        registry.shutdown().await;
        assert!(parts.next().await.is_none());
    }

    #[tokio::test]
    async fn test_open_unknown_source() {
        let (registry, created) = registry(1);
        let result = registry.open_stream("missing", Quality::Primary, false);

        assert!(matches!(result, Err(RegistryError::UnknownSource(_))));
        assert_eq!(created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retired_handler_ends_stream() {
        let (registry, _) = registry(usize::MAX);
        let mut viewer = registry.open_stream("cam", Quality::Primary, false).unwrap();
        assert!(viewer.next_frame().await.is_some());

        registry.shutdown().await;

        let mut next = tokio_test::task::spawn(viewer.next_frame());
        let frame = assert_ready!(next.poll());
        assert!(frame.is_none());
    }
}

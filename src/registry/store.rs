//! Stream registry implementation
//!
//! The central registry that maps source keys to running stream handlers and
//! reference-counts their viewers.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::handler::{HandlerConfig, HandlerHealth, MotionStatus, StreamHandler};
use crate::settings::{AppConfig, SourceConfig};
use crate::source::{
    redact_address, FfmpegSourceFactory, Quality, SourceFactory, SourceId, SourceKey,
};
use crate::stream::{MotionStatusReport, ViewerStream};

use super::config::RegistryConfig;
use super::entry::{StreamEntry, StreamStats};
use super::error::RegistryError;

/// Central registry for all active streams
///
/// Cheap to clone; clones share the same set of handlers. The mapping is
/// guarded by one mutex that is only held for lookups, inserts and refcount
/// changes. Retiring a handler only signals its task, which finishes on its
/// own.
pub struct StreamRegistry<F: SourceFactory = FfmpegSourceFactory> {
    inner: Arc<Inner<F>>,
}

struct Inner<F> {
    /// Map of source key to stream entry
    streams: Mutex<HashMap<SourceKey, StreamEntry>>,

    /// Configured sources
    sources: HashMap<SourceId, SourceConfig>,

    factory: F,
    handler_config: HandlerConfig,
    config: RegistryConfig,
}

impl StreamRegistry<FfmpegSourceFactory> {
    /// Create a registry dialling cameras through ffmpeg
    pub fn from_config(app: &AppConfig) -> Self {
        Self::with_config(
            FfmpegSourceFactory::default(),
            app.sources.iter().cloned(),
            app.handler.clone(),
            app.registry.clone(),
        )
    }
}

impl<F: SourceFactory> StreamRegistry<F> {
    /// Create a new stream registry with default configuration
    pub fn new(factory: F, sources: impl IntoIterator<Item = SourceConfig>) -> Self {
        Self::with_config(
            factory,
            sources,
            HandlerConfig::default(),
            RegistryConfig::default(),
        )
    }

    /// Create a new stream registry with custom configuration
    pub fn with_config(
        factory: F,
        sources: impl IntoIterator<Item = SourceConfig>,
        handler_config: HandlerConfig,
        config: RegistryConfig,
    ) -> Self {
        let sources = sources.into_iter().map(|s| (s.id.clone(), s)).collect();

        Self {
            inner: Arc::new(Inner {
                streams: Mutex::new(HashMap::new()),
                sources,
                factory,
                handler_config,
                config,
            }),
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Configured source by id
    pub fn source(&self, id: &SourceId) -> Option<&SourceConfig> {
        self.inner.sources.get(id)
    }

    /// Get the handler for `key`, starting one if needed
    ///
    /// Increments the viewer count; every successful call must be paired
    /// with a [`release`](Self::release). Must be called from within a Tokio
    /// runtime.
    pub fn acquire(&self, key: &SourceKey) -> Result<Arc<StreamHandler>, RegistryError> {
        let source = self
            .inner
            .sources
            .get(&key.source_id)
            .filter(|s| s.is_available())
            .ok_or_else(|| RegistryError::UnknownSource(key.source_id.clone()))?;

        let mut streams = self.inner.streams.lock();

        if let Some(entry) = streams.get_mut(key) {
            if !entry.handler.is_retired() {
                let viewers = entry.handler.acquire();
                entry.mark_active();

                tracing::debug!(stream = %key, viewers = viewers, "Viewer added");
                return Ok(Arc::clone(&entry.handler));
            }
        }

        let transport = self.inner.factory.create(source, key);
        let handler = StreamHandler::spawn(
            key.clone(),
            transport,
            self.inner.handler_config.clone(),
            self.inner.config.motion_default,
        );
        handler.acquire();
        streams.insert(key.clone(), StreamEntry::new(Arc::clone(&handler)));

        tracing::info!(
            stream = %key,
            address = %redact_address(&source.address_for(key.quality)),
            streams = streams.len(),
            "Stream handler created"
        );

        Ok(handler)
    }

    /// Drop one viewer of `key`
    ///
    /// When the last viewer leaves, the handler is retired after the grace
    /// period unless someone acquires it again in the meantime.
    pub fn release(&self, key: &SourceKey) {
        let mut streams = self.inner.streams.lock();
        let Some(entry) = streams.get_mut(key) else {
            return;
        };

        // An unmatched release must not restart the grace period
        if entry.viewer_count() == 0 {
            tracing::debug!(stream = %key, "Release without viewers ignored");
            return;
        }
        let remaining = entry.handler.release();
        self.after_release(key, entry, remaining);
    }

    /// Release a viewer of a specific handler
    ///
    /// If the key has since been taken over by a newer handler, only the old
    /// handler's count is touched.
    pub(crate) fn release_handler(&self, key: &SourceKey, handler: &Arc<StreamHandler>) {
        let mut streams = self.inner.streams.lock();
        let remaining = handler.release();

        match streams.get_mut(key) {
            Some(entry) if Arc::ptr_eq(&entry.handler, handler) => {
                self.after_release(key, entry, remaining);
            }
            _ => {
                if remaining == 0 {
                    handler.retire();
                }
            }
        }
    }

    fn after_release(&self, key: &SourceKey, entry: &mut StreamEntry, remaining: u32) {
        tracing::debug!(stream = %key, viewers = remaining, "Viewer removed");

        if remaining == 0 {
            entry.mark_idle(Instant::now());
            tracing::info!(
                stream = %key,
                grace_period_secs = self.inner.config.grace_period.as_secs_f64(),
                "Last viewer left, entering grace period"
            );
            self.schedule_reap();
        }
    }

    /// Run a cleanup pass once the grace period has elapsed
    fn schedule_reap(&self) {
        // Without a runtime the periodic cleanup task is the only reaper
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let inner = Arc::downgrade(&self.inner);
        let grace_period = self.inner.config.grace_period;
        runtime.spawn(async move {
            tokio::time::sleep(grace_period).await;
            if let Some(inner) = Weak::upgrade(&inner) {
                inner.cleanup();
            }
        });
    }

    /// Switch motion detection for a running handler
    pub fn set_motion(&self, key: &SourceKey, enabled: bool) -> Result<(), RegistryError> {
        let streams = self.inner.streams.lock();
        let entry = streams
            .get(key)
            .ok_or_else(|| RegistryError::StreamNotFound(key.clone()))?;

        entry.handler.set_motion_enabled(enabled);
        Ok(())
    }

    /// Motion status of `key`; disabled if no handler is running
    pub fn motion_status(&self, key: &SourceKey) -> MotionStatus {
        self.handler(key).map_or(MotionStatus::DISABLED, |h| h.motion_status())
    }

    /// Motion status of a source key, in reporting form
    pub fn query_motion_status(
        &self,
        source_id: impl Into<SourceId>,
        quality: Quality,
    ) -> MotionStatusReport {
        let key = SourceKey::new(source_id, quality);
        MotionStatusReport::new(&key, self.motion_status(&key))
    }

    /// Connection health of `key`, if a handler is running
    pub fn health(&self, key: &SourceKey) -> Option<HandlerHealth> {
        self.handler(key).map(|h| h.health())
    }

    /// Running handler for `key`, without registering a viewer
    pub fn handler(&self, key: &SourceKey) -> Option<Arc<StreamHandler>> {
        let streams = self.inner.streams.lock();
        streams.get(key).map(|entry| Arc::clone(&entry.handler))
    }

    /// Get stream statistics
    pub fn get_stream_stats(&self, key: &SourceKey) -> Option<StreamStats> {
        let streams = self.inner.streams.lock();
        streams.get(key).map(StreamEntry::stats)
    }

    /// Statistics for every entry, sorted by key
    pub fn all_stats(&self) -> Vec<(SourceKey, StreamStats)> {
        let streams = self.inner.streams.lock();
        let mut stats: Vec<_> = streams
            .iter()
            .map(|(key, entry)| (key.clone(), entry.stats()))
            .collect();
        stats.sort_by(|(a, _), (b, _)| (&a.source_id, a.quality).cmp(&(&b.source_id, b.quality)));
        stats
    }

    /// Get total number of entries
    pub fn stream_count(&self) -> usize {
        self.inner.streams.lock().len()
    }

    /// Run cleanup once
    ///
    /// Retires and removes entries that have had no viewers for longer than
    /// the grace period, and entries whose handler was retired externally.
    pub fn cleanup(&self) {
        self.inner.cleanup();
    }

    /// Spawn background cleanup task
    ///
    /// The task stops on its own once every clone of the registry is dropped.
    pub fn spawn_cleanup_task(&self) -> tokio::task::JoinHandle<()> {
        let inner = Arc::downgrade(&self.inner);
        let interval = self.inner.config.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match Weak::upgrade(&inner) {
                    Some(inner) => inner.cleanup(),
                    None => break,
                }
            }
        })
    }

    /// Open a viewer stream
    ///
    /// Acquires the handler for (`source_id`, `quality`) and applies the
    /// requested motion setting to it.
    pub fn open_stream(
        &self,
        source_id: impl Into<SourceId>,
        quality: Quality,
        motion: bool,
    ) -> Result<ViewerStream<F>, RegistryError> {
        let key = SourceKey::new(source_id, quality);
        let handler = self.acquire(&key)?;
        handler.set_motion_enabled(motion);
        Ok(ViewerStream::new(self.clone(), key, handler))
    }

    /// Retire every handler and wait for their tasks to finish
    pub async fn shutdown(&self) {
        let handlers: Vec<_> = {
            let mut streams = self.inner.streams.lock();
            streams.drain().map(|(_, entry)| entry.handler).collect()
        };

        for handler in &handlers {
            handler.retire();
        }
        for handler in &handlers {
            handler.wait_retired().await;
        }

        tracing::info!(streams = handlers.len(), "Registry shut down");
    }
}

impl<F: SourceFactory> Inner<F> {
    fn cleanup(&self) {
        let now = Instant::now();
        let grace_period = self.config.grace_period;
        let mut removed = Vec::new();

        {
            let mut streams = self.streams.lock();
            streams.retain(|key, entry| {
                let expired = entry.is_expired(now, grace_period);
                if expired {
                    removed.push((key.clone(), Arc::clone(&entry.handler)));
                }
                !expired
            });
        }

        for (key, handler) in removed {
            handler.retire();
            tracing::info!(stream = %key, "Stream removed by cleanup");
        }
    }
}

impl<F: SourceFactory> Clone for StreamRegistry<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: SourceFactory> std::fmt::Debug for StreamRegistry<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRegistry")
            .field("sources", &self.inner.sources.len())
            .field("streams", &self.stream_count())
            .field("config", &self.inner.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use image::{Rgb, RgbImage};

    use super::*;
    use crate::error::{ConnectionError, ReadError};
    use crate::handler::HandlerPhase;
    use crate::media::Frame;
    use crate::registry::StreamState;
    use crate::source::FrameSource;

    #[derive(Default)]
    struct Counters {
        created: AtomicUsize,
        connects: AtomicUsize,
        closes: AtomicUsize,
    }

    struct TestSource {
        counters: Arc<Counters>,
    }

    impl FrameSource for TestSource {
        async fn connect(&mut self) -> Result<(), ConnectionError> {
            self.counters.connects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn read_frame(&mut self) -> Result<Frame, ReadError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Frame::new(RgbImage::from_pixel(16, 16, Rgb([10, 20, 30]))))
        }

        async fn close(&mut self) {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Clone, Default)]
    struct TestFactory {
        counters: Arc<Counters>,
    }

    impl SourceFactory for TestFactory {
        type Source = TestSource;

        fn create(&self, _source: &SourceConfig, _key: &SourceKey) -> TestSource {
            self.counters.created.fetch_add(1, Ordering::SeqCst);
            TestSource {
                counters: Arc::clone(&self.counters),
            }
        }
    }

    fn registry(factory: TestFactory) -> StreamRegistry<TestFactory> {
        let sources = vec![
            SourceConfig::new("1", "rtsp://10.0.0.5:554/ch0"),
            SourceConfig::new("2", "rtsp://10.0.0.6:554/ch0").disabled(),
        ];
        let config = RegistryConfig::default().grace_period(Duration::from_secs(5));
        StreamRegistry::with_config(factory, sources, HandlerConfig::default(), config)
    }

    fn key() -> SourceKey {
        SourceKey::new("1", Quality::Primary)
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_reuses_handler() {
        let factory = TestFactory::default();
        let registry = registry(factory.clone());

        let a = registry.acquire(&key()).unwrap();
        let b = registry.acquire(&key()).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.viewer_count(), 2);
        assert_eq!(registry.stream_count(), 1);
        assert_eq!(factory.counters.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_qualities_are_separate_keys() {
        let factory = TestFactory::default();
        let registry = registry(factory.clone());

        let main = registry.acquire(&key()).unwrap();
        let sub = registry
            .acquire(&SourceKey::new("1", Quality::Secondary))
            .unwrap();

        assert!(!Arc::ptr_eq(&main, &sub));
        assert_eq!(registry.stream_count(), 2);
        assert_eq!(factory.counters.created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_and_disabled_sources() {
        let registry = registry(TestFactory::default());

        let unknown = registry.acquire(&SourceKey::new("9", Quality::Primary));
        assert_eq!(
            unknown.unwrap_err(),
            RegistryError::UnknownSource(SourceId::new("9"))
        );

        let disabled = registry.acquire(&SourceKey::new("2", Quality::Primary));
        assert!(matches!(disabled, Err(RegistryError::UnknownSource(_))));
        assert_eq!(registry.stream_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_period() {
        let factory = TestFactory::default();
        let registry = registry(factory.clone());

        let handler = registry.acquire(&key()).unwrap();
        registry.release(&key());

        let stats = registry.get_stream_stats(&key()).unwrap();
        assert_eq!(stats.state, StreamState::GracePeriod);
        assert_eq!(stats.viewer_count, 0);

        // Still inside the grace period
        tokio::time::sleep(Duration::from_secs(4)).await;
        registry.cleanup();
        assert_eq!(registry.stream_count(), 1);
        assert!(!handler.is_retired());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(registry.stream_count(), 0);
        handler.wait_retired().await;
        assert_eq!(handler.phase(), HandlerPhase::Retired);
        assert!(factory.counters.closes.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extra_release_keeps_grace_deadline() {
        let registry = registry(TestFactory::default());

        let handler = registry.acquire(&key()).unwrap();
        registry.release(&key());
        tokio::time::sleep(Duration::from_secs(3)).await;

        // Unmatched release while already idle
        registry.release(&key());
        assert_eq!(handler.viewer_count(), 0);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(handler.is_retired());
        assert_eq!(registry.stream_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reacquire_during_grace_period() {
        let factory = TestFactory::default();
        let registry = registry(factory.clone());

        let first = registry.acquire(&key()).unwrap();
        registry.release(&key());
        tokio::time::sleep(Duration::from_secs(3)).await;

        let second = registry.acquire(&key()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        // The reap scheduled by the first release finds the entry active
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(registry.stream_count(), 1);
        assert!(!second.is_retired());
        assert_eq!(factory.counters.created.load(Ordering::SeqCst), 1);
        assert_eq!(factory.counters.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retired_handler_is_replaced() {
        let factory = TestFactory::default();
        let registry = registry(factory.clone());

        let first = registry.acquire(&key()).unwrap();
        first.retire();

        let second = registry.acquire(&key()).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(factory.counters.created.load(Ordering::SeqCst), 2);

        // A stale release must not affect the new handler
        registry.release_handler(&key(), &first);
        assert_eq!(second.viewer_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_motion_status() {
        let registry = registry(TestFactory::default());

        assert_eq!(registry.motion_status(&key()), MotionStatus::DISABLED);
        assert_eq!(
            registry.set_motion(&key(), true),
            Err(RegistryError::StreamNotFound(key()))
        );

        let _handler = registry.acquire(&key()).unwrap();
        registry.set_motion(&key(), true).unwrap();
        assert!(registry.motion_status(&key()).enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown() {
        let factory = TestFactory::default();
        let registry = registry(factory.clone());

        let handler = registry.acquire(&key()).unwrap();
        registry.shutdown().await;

        assert_eq!(registry.stream_count(), 0);
        assert_eq!(handler.phase(), HandlerPhase::Retired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task() {
        let factory = TestFactory::default();
        let registry = registry(factory.clone());
        let task = registry.spawn_cleanup_task();

        let handler = registry.acquire(&key()).unwrap();
        handler.release();
        // Idle without going through `release`, so only the sweep can reap it
        registry.inner.streams.lock().get_mut(&key()).unwrap().mark_idle(Instant::now());

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(registry.stream_count(), 0);
        assert!(handler.is_retired());

        drop(registry);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(task.is_finished());
    }
}

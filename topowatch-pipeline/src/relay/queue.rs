//! Single-consumer relay queue
//!
//! Upstream handlers must return almost immediately, while processing a change
//! (diffing, serialisation, network delivery) can take arbitrarily long. The
//! relay queue sits between the two: subscription callbacks only push onto an
//! unbounded channel, and one consumer task drains it in arrival order.
//!
//! Several subscriptions (one per resource type) may feed the same queue; their
//! events interleave in whatever order they were enqueued.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use topowatch_core::models::{ChangeEvent, DeleteNotice, RawObject};
use tracing::{debug, error, info, warn};

use super::item::RelayItem;
use crate::error::{Error, Result};
use crate::processor::EventProcessor;
use crate::watcher::ResourceEventHandler;

#[derive(Debug, Default)]
struct QueueStats {
    enqueued: AtomicU64,
    processed: AtomicU64,
    dropped: AtomicU64,
    depth: AtomicUsize,
    above_high_water: AtomicBool,
}

/// Point-in-time counters for a relay queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueMetrics {
    pub enqueued: u64,
    pub processed: u64,
    pub dropped: u64,
    pub depth: usize,
}

/// Marks a dequeued item as done when dropped, so the depth is released
/// exactly once whether processing finished, failed or panicked.
struct DoneGuard<'a> {
    stats: &'a QueueStats,
    high_water_mark: usize,
}

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        let depth = self.stats.depth.fetch_sub(1, Ordering::AcqRel) - 1;
        if depth <= self.high_water_mark {
            self.stats.above_high_water.store(false, Ordering::Release);
        }
    }
}

pub struct RelayQueue {
    name: String,
    tx: mpsc::UnboundedSender<RelayItem>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<RelayItem>>>,
    processor: Arc<dyn EventProcessor>,
    stats: QueueStats,
    high_water_mark: usize,
    cancel_token: CancellationToken,
}

impl RelayQueue {
    /// Create a queue feeding `processor`
    ///
    /// `high_water_mark` only controls when a backlog warning is logged; the
    /// queue itself is unbounded so producers never wait on the consumer.
    pub fn new(
        name: impl Into<String>,
        processor: Arc<dyn EventProcessor>,
        high_water_mark: usize,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            name: name.into(),
            tx,
            rx: Mutex::new(Some(rx)),
            processor,
            stats: QueueStats::default(),
            high_water_mark,
            cancel_token: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn processor(&self) -> &Arc<dyn EventProcessor> {
        &self.processor
    }

    /// Push an item for the consumer. A no-op once the queue is stopped.
    pub fn enqueue(&self, item: RelayItem) {
        if self.cancel_token.is_cancelled() {
            debug!(queue = %self.name, kind = ?item.kind(), "Relay queue stopped, ignoring item");
            return;
        }

        let depth = self.stats.depth.fetch_add(1, Ordering::AcqRel) + 1;
        if self.tx.send(item).is_err() {
            self.stats.depth.fetch_sub(1, Ordering::AcqRel);
            debug!(queue = %self.name, "Relay queue receiver gone, ignoring item");
            return;
        }
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);

        if depth > self.high_water_mark
            && !self.stats.above_high_water.swap(true, Ordering::AcqRel)
        {
            warn!(
                queue = %self.name,
                depth = depth,
                high_water_mark = self.high_water_mark,
                "Relay queue backlog above high-water mark"
            );
        }
    }

    /// Drain the queue until stopped, handing each item to the processor.
    ///
    /// Only one consumer may ever run; a second call returns
    /// [`Error::AlreadyRunning`]. Shutdown is observed between items, so an
    /// item already being processed always finishes.
    pub async fn run(&self) -> Result<()> {
        let mut rx = self
            .rx
            .lock()
            .take()
            .ok_or_else(|| Error::AlreadyRunning(self.name.clone()))?;

        info!(queue = %self.name, processor = %self.processor.name(), "Relay queue consumer started");

        loop {
            let item = tokio::select! {
                biased;
                () = self.cancel_token.cancelled() => break,
                item = rx.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            let _done = DoneGuard {
                stats: &self.stats,
                high_water_mark: self.high_water_mark,
            };

            let kind = item.kind();
            match ChangeEvent::try_from(item) {
                Ok(event) => {
                    self.processor.process(event).await;
                    self.stats.processed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    error!(
                        queue = %self.name,
                        kind = ?kind,
                        error = %e,
                        "Item in relay queue has wrong format, dropping"
                    );
                }
            }
        }

        // release whatever was still queued so depth reads 0 after shutdown
        rx.close();
        let mut discarded = 0usize;
        while rx.try_recv().is_ok() {
            drop(DoneGuard {
                stats: &self.stats,
                high_water_mark: self.high_water_mark,
            });
            discarded += 1;
        }

        info!(queue = %self.name, discarded = discarded, "Quitting relay queue consumer");
        Ok(())
    }

    /// Run the consumer on its own task
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = queue.run().await {
                error!(queue = %queue.name, error = %e, "Relay queue consumer failed to start");
            }
        })
    }

    /// Signal shutdown. Items still queued are discarded.
    pub fn stop(&self) {
        info!(queue = %self.name, "Stopping relay queue");
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    #[must_use]
    pub fn metrics(&self) -> QueueMetrics {
        QueueMetrics {
            enqueued: self.stats.enqueued.load(Ordering::Relaxed),
            processed: self.stats.processed.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
            depth: self.stats.depth.load(Ordering::Acquire),
        }
    }
}

impl ResourceEventHandler for RelayQueue {
    fn on_add(&self, object: RawObject) {
        self.enqueue(RelayItem::Added(object));
    }

    fn on_update(&self, old: RawObject, new: RawObject) {
        self.enqueue(RelayItem::Updated { old, new });
    }

    fn on_delete(&self, notice: DeleteNotice) {
        self.enqueue(RelayItem::Deleted(notice));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{object, RecordingProcessor};
    use serde_json::json;
    use std::time::{Duration, Instant};
    use topowatch_core::models::ChangeKind;

    fn raw(name: &str) -> RawObject {
        Arc::new(object("Deployment", name, &[]))
    }

    #[tokio::test]
    async fn test_fifo_order_single_producer() {
        let (processor, mut rx) = RecordingProcessor::new("recorder");
        let queue = Arc::new(RelayQueue::new("test", processor, 100));
        let handle = queue.spawn();

        for i in 0..50 {
            queue.on_add(raw(&format!("obj-{i}")));
        }

        for i in 0..50 {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.object().unwrap().name(), format!("obj-{i}"));
        }

        queue.stop();
        handle.await.unwrap();
        assert_eq!(queue.metrics().processed, 50);
        assert_eq!(queue.metrics().depth, 0);
    }

    #[tokio::test]
    async fn test_enqueue_does_not_wait_for_slow_consumer() {
        let (processor, _rx) = RecordingProcessor::with_delay("slow", Duration::from_secs(5));
        let queue = Arc::new(RelayQueue::new("test", processor, 10_000));
        let _handle = queue.spawn();

        let started = Instant::now();
        for i in 0..1_000 {
            queue.on_add(raw(&format!("obj-{i}")));
        }
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(queue.metrics().enqueued, 1_000);

        queue.stop();
    }

    #[tokio::test]
    async fn test_malformed_item_is_dropped_and_processing_continues() {
        let (processor, mut rx) = RecordingProcessor::new("recorder");
        let queue = Arc::new(RelayQueue::new("test", processor, 100));
        let handle = queue.spawn();

        queue.on_add(Arc::new(json!({"not": "an object"})));
        queue.on_update(raw("good"), raw("good"));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), ChangeKind::Updated);

        queue.stop();
        handle.await.unwrap();

        let metrics = queue.metrics();
        assert_eq!(metrics.dropped, 1);
        assert_eq!(metrics.processed, 1);
        assert_eq!(metrics.depth, 0);
    }

    #[tokio::test]
    async fn test_enqueue_after_stop_is_noop() {
        let (processor, _rx) = RecordingProcessor::new("recorder");
        let queue = RelayQueue::new("test", processor, 100);

        queue.stop();
        queue.on_delete(DeleteNotice::Object(raw("gone")));

        assert!(queue.is_stopped());
        assert_eq!(queue.metrics().enqueued, 0);
        assert_eq!(queue.metrics().depth, 0);
    }

    #[tokio::test]
    async fn test_single_consumer_only() {
        let (processor, _rx) = RecordingProcessor::new("recorder");
        let queue = Arc::new(RelayQueue::new("test", processor, 100));
        let handle = queue.spawn();

        // give the first consumer a chance to claim the receiver
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(matches!(queue.run().await, Err(Error::AlreadyRunning(_))));

        queue.stop();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_lets_in_flight_item_finish() {
        let (processor, mut rx) =
            RecordingProcessor::with_delay("slow", Duration::from_millis(100));
        let queue = Arc::new(RelayQueue::new("test", processor, 100));
        let handle = queue.spawn();

        queue.on_add(raw("first"));
        queue.on_add(raw("second"));

        // first item is now being processed
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.stop();
        handle.await.unwrap();

        assert_eq!(rx.recv().await.unwrap().object().unwrap().name(), "first");
        assert!(rx.try_recv().is_err());

        let metrics = queue.metrics();
        assert_eq!(metrics.enqueued, 2);
        assert_eq!(metrics.processed, 1);
        // the discarded second item no longer counts as backlog
        assert_eq!(metrics.depth, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 250;

        let (processor, mut rx) = RecordingProcessor::new("recorder");
        let queue = Arc::new(RelayQueue::new("test", processor, 10_000));
        let handle = queue.spawn();

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move {
                    for n in 0..PER_PRODUCER {
                        queue.on_add(raw(&format!("p{p}-{n}")));
                        if n % 16 == 0 {
                            tokio::task::yield_now().await;
                        }
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }

        let mut next = [0usize; PRODUCERS];
        for _ in 0..PRODUCERS * PER_PRODUCER {
            let event = rx.recv().await.unwrap();
            let name = event.object().unwrap().name().to_string();
            let (p, n) = name[1..].split_once('-').unwrap();
            let (p, n): (usize, usize) = (p.parse().unwrap(), n.parse().unwrap());
            // per-producer order survives interleaving
            assert_eq!(n, next[p], "producer {p} out of order");
            next[p] += 1;
        }
        assert_eq!(next, [PER_PRODUCER; PRODUCERS]);

        queue.stop();
        handle.await.unwrap();
        assert!(rx.try_recv().is_err());

        let metrics = queue.metrics();
        assert_eq!(metrics.enqueued, (PRODUCERS * PER_PRODUCER) as u64);
        assert_eq!(metrics.processed, (PRODUCERS * PER_PRODUCER) as u64);
        assert_eq!(metrics.depth, 0);
    }
}

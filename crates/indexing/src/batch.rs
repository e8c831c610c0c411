//! Time-or-size triggered document batching
//!
//! Documents accumulate until the batch size is reached (immediate flush) or
//! the periodic flusher fires. The flush callback owns error handling for the
//! batch; a failed flush loses that batch and the stream redelivery policy
//! governs retries. Documents never survive process exit.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use memsearch_core::{Document, Result, SearchError};

/// Batch queue configuration.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Flush as soon as this many documents are queued
    pub batch_size: usize,
    /// Periodic flush interval
    pub flush_interval_ms: u64,
    /// Hard cap on queued documents
    pub max_queue_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            flush_interval_ms: 5_000,
            max_queue_size: 1_000,
        }
    }
}

type FlushFuture = Pin<Box<dyn Future<Output = usize> + Send>>;
type FlushCallback = Arc<dyn Fn(Vec<Document>) -> FlushFuture + Send + Sync>;

/// Size/time triggered batch queue with a single-writer drain.
pub struct BatchQueue {
    config: BatchConfig,
    queue: Mutex<Vec<Document>>,
    flush_callback: FlushCallback,
    flusher: SyncMutex<Option<JoinHandle<()>>>,
}

impl BatchQueue {
    pub fn new<F, Fut>(config: BatchConfig, flush_callback: F) -> Arc<Self>
    where
        F: Fn(Vec<Document>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = usize> + Send + 'static,
    {
        Arc::new(Self {
            config,
            queue: Mutex::new(Vec::new()),
            flush_callback: Arc::new(move |docs| Box::pin(flush_callback(docs)) as FlushFuture),
            flusher: SyncMutex::new(None),
        })
    }

    /// Start the periodic flusher.
    pub fn start(self: &Arc<Self>) {
        let queue = Arc::clone(self);
        let interval = Duration::from_millis(self.config.flush_interval_ms);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so the interval is
            // measured from start
            ticker.tick().await;
            loop {
                ticker.tick().await;
                queue.flush().await;
            }
        });
        *self.flusher.lock() = Some(handle);
    }

    /// Enqueue a document. Flushes immediately when the queue reaches the
    /// batch size. Fails with `QueueFull` when the queue is at capacity.
    pub async fn add(&self, document: Document) -> Result<()> {
        let should_flush = {
            let mut queue = self.queue.lock().await;
            if queue.len() >= self.config.max_queue_size {
                return Err(SearchError::QueueFull);
            }
            queue.push(document);
            queue.len() >= self.config.batch_size
        };

        if should_flush {
            self.flush().await;
        }
        Ok(())
    }

    /// Flush whatever is queued. A flush with an empty queue is a no-op.
    pub async fn flush(&self) -> usize {
        let batch = {
            let mut queue = self.queue.lock().await;
            if queue.is_empty() {
                return 0;
            }
            std::mem::take(&mut *queue)
        };

        let size = batch.len();
        tracing::debug!(size, "Flushing document batch");
        (self.flush_callback)(batch).await
    }

    /// Current queue length.
    pub async fn queue_size(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Stop the periodic flusher and drain once.
    pub async fn stop(&self) {
        if let Some(handle) = self.flusher.lock().take() {
            handle.abort();
        }
        self.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn doc(id: &str) -> Document {
        Document::new(id, "content", "t1")
    }

    fn counting_queue(config: BatchConfig) -> (Arc<BatchQueue>, Arc<AtomicUsize>) {
        let flushed = Arc::new(AtomicUsize::new(0));
        let flushed_clone = Arc::clone(&flushed);
        let queue = BatchQueue::new(config, move |docs: Vec<Document>| {
            let flushed = Arc::clone(&flushed_clone);
            async move {
                flushed.fetch_add(docs.len(), Ordering::SeqCst);
                docs.len()
            }
        });
        (queue, flushed)
    }

    #[tokio::test]
    async fn test_size_triggered_flush() {
        let (queue, flushed) = counting_queue(BatchConfig {
            batch_size: 2,
            flush_interval_ms: 60_000,
            max_queue_size: 10,
        });

        queue.add(doc("a")).await.unwrap();
        assert_eq!(flushed.load(Ordering::SeqCst), 0);
        assert_eq!(queue.queue_size().await, 1);

        queue.add(doc("b")).await.unwrap();
        assert_eq!(flushed.load(Ordering::SeqCst), 2);
        assert_eq!(queue.queue_size().await, 0);
    }

    #[tokio::test]
    async fn test_queue_full() {
        let (queue, _) = counting_queue(BatchConfig {
            batch_size: 100,
            flush_interval_ms: 60_000,
            max_queue_size: 2,
        });

        queue.add(doc("a")).await.unwrap();
        queue.add(doc("b")).await.unwrap();
        assert!(matches!(
            queue.add(doc("c")).await,
            Err(SearchError::QueueFull)
        ));
        assert_eq!(queue.queue_size().await, 2);
    }

    #[tokio::test]
    async fn test_empty_flush_noop() {
        let (queue, flushed) = counting_queue(BatchConfig::default());
        assert_eq!(queue.flush().await, 0);
        assert_eq!(flushed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_drains() {
        let (queue, flushed) = counting_queue(BatchConfig {
            batch_size: 100,
            flush_interval_ms: 60_000,
            max_queue_size: 100,
        });

        queue.add(doc("a")).await.unwrap();
        queue.add(doc("b")).await.unwrap();
        queue.stop().await;

        assert_eq!(flushed.load(Ordering::SeqCst), 2);
        assert_eq!(queue.queue_size().await, 0);
    }

    #[tokio::test]
    async fn test_adds_minus_flushes_equals_queue_size() {
        let (queue, flushed) = counting_queue(BatchConfig {
            batch_size: 3,
            flush_interval_ms: 60_000,
            max_queue_size: 100,
        });

        let mut adds = 0usize;
        for i in 0..8 {
            queue.add(doc(&format!("d{i}"))).await.unwrap();
            adds += 1;
            let size = queue.queue_size().await;
            assert_eq!(adds - flushed.load(Ordering::SeqCst), size);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_flush() {
        let (queue, flushed) = counting_queue(BatchConfig {
            batch_size: 100,
            flush_interval_ms: 1_000,
            max_queue_size: 100,
        });
        queue.start();

        queue.add(doc("a")).await.unwrap();
        assert_eq!(flushed.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(flushed.load(Ordering::SeqCst), 1);
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_flush_callback_failure_drops_batch() {
        // Callback reporting zero indexed documents: the batch is gone
        // either way and the queue keeps accepting
        let queue = BatchQueue::new(
            BatchConfig {
                batch_size: 1,
                flush_interval_ms: 60_000,
                max_queue_size: 10,
            },
            |_docs: Vec<Document>| async move { 0 },
        );

        queue.add(doc("a")).await.unwrap();
        assert_eq!(queue.queue_size().await, 0);
        queue.add(doc("b")).await.unwrap();
        assert_eq!(queue.queue_size().await, 0);
    }
}

//! Turn-finalized event consumer
//!
//! Durable JetStream subscription on the turn-finalized subject. Each
//! message is parsed into a turn document, enqueued into the batch queue,
//! and acknowledged after the enqueue succeeds (before the actual index
//! upsert). Malformed messages are acknowledged and dropped; a full queue
//! NAKs the message for redelivery after backoff.
//!
//! Lifecycle side channel: `consumer_ready` on start, periodic
//! `consumer_heartbeat`, `consumer_disconnected` on stop. Every status
//! publish is best-effort.

use std::sync::Arc;
use std::time::Duration;

use async_nats::jetstream::{self, consumer::pull::Config as PullConfig, AckKind};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use memsearch_core::{ConsumerStatus, Result, SearchError, StatusPublisher};

use crate::batch::{BatchConfig, BatchQueue};
use crate::turns::{parse_turn_finalized, TurnsIndexer};

/// Consumer configuration.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Subject carrying turn-finalized events
    pub subject: String,
    /// Durable consumer group
    pub group_id: String,
    /// Stream name backing the subject
    pub stream_name: String,
    /// Heartbeat period for the status side channel
    pub heartbeat_interval_ms: u64,
    /// Instance id reported on the side channel
    pub service_id: String,
    /// Redelivery backoff for NAKed messages
    pub nak_delay_ms: u64,
    /// Batch queue configuration
    pub batch: BatchConfig,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            subject: "memory.turns.finalized".to_string(),
            group_id: "search-turns-indexer".to_string(),
            stream_name: "memory-turns".to_string(),
            heartbeat_interval_ms: 10_000,
            service_id: uuid::Uuid::new_v4().to_string()[..8].to_string(),
            nak_delay_ms: 5_000,
            batch: BatchConfig::default(),
        }
    }
}

/// Publishes consumer status events to the observatory subject.
pub struct NatsStatusPublisher {
    client: async_nats::Client,
    subject: String,
}

impl NatsStatusPublisher {
    pub fn new(client: async_nats::Client, subject: impl Into<String>) -> Self {
        Self {
            client,
            subject: subject.into(),
        }
    }
}

#[async_trait]
impl StatusPublisher for NatsStatusPublisher {
    async fn publish_consumer_status(
        &self,
        status: ConsumerStatus,
        group_id: &str,
        service_id: &str,
    ) -> Result<()> {
        let payload = serde_json::json!({
            "type": status,
            "group_id": group_id,
            "service_id": service_id,
            "timestamp": chrono::Utc::now().timestamp_millis(),
        });

        self.client
            .publish(self.subject.clone(), serde_json::to_vec(&payload).unwrap_or_default().into())
            .await
            .map_err(|e| SearchError::StoreUnavailable(format!("status publish failed: {e}")))
    }
}

/// Consumes turn-finalized events and feeds the batch queue.
pub struct TurnFinalizedConsumer {
    client: async_nats::Client,
    indexer: Arc<TurnsIndexer>,
    status: Option<Arc<dyn StatusPublisher>>,
    config: ConsumerConfig,
    shutdown: watch::Sender<bool>,
}

impl TurnFinalizedConsumer {
    pub fn new(
        client: async_nats::Client,
        indexer: Arc<TurnsIndexer>,
        status: Option<Arc<dyn StatusPublisher>>,
        config: ConsumerConfig,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            client,
            indexer,
            status,
            config,
            shutdown,
        }
    }

    /// Signal the running consumer to stop.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Run the consumer until `stop` is called or the stream ends.
    ///
    /// Owns the batch queue for its lifetime: created at start, drained on
    /// stop. Queued documents never survive the process.
    pub async fn run(&self) -> Result<()> {
        tracing::info!(
            subject = %self.config.subject,
            group = %self.config.group_id,
            service = %self.config.service_id,
            "Starting turn-finalized consumer"
        );

        let indexer = Arc::clone(&self.indexer);
        let queue = BatchQueue::new(self.config.batch.clone(), move |docs| {
            let indexer = Arc::clone(&indexer);
            async move { indexer.index_documents(docs).await }
        });
        queue.start();

        self.publish_status(ConsumerStatus::ConsumerReady).await;
        let heartbeat = self.spawn_heartbeat();

        let result = self.consume_loop(&queue).await;

        heartbeat.abort();
        queue.stop().await;
        self.publish_status(ConsumerStatus::ConsumerDisconnected).await;

        if let Err(err) = self.client.flush().await {
            tracing::warn!(error = %err, "Failed to flush stream connection on stop");
        }

        tracing::info!("Turn-finalized consumer stopped");
        result
    }

    async fn consume_loop(&self, queue: &Arc<BatchQueue>) -> Result<()> {
        let jetstream = jetstream::new(self.client.clone());

        let stream = jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: self.config.stream_name.clone(),
                subjects: vec![self.config.subject.clone()],
                ..Default::default()
            })
            .await
            .map_err(|e| SearchError::StoreUnavailable(format!("stream setup failed: {e}")))?;

        let consumer = stream
            .get_or_create_consumer(
                &self.config.group_id,
                PullConfig {
                    durable_name: Some(self.config.group_id.clone()),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| SearchError::StoreUnavailable(format!("consumer setup failed: {e}")))?;

        let mut messages = consumer
            .messages()
            .await
            .map_err(|e| SearchError::StoreUnavailable(format!("message stream failed: {e}")))?;

        let mut shutdown = self.shutdown.subscribe();

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                message = messages.next() => {
                    let Some(message) = message else { break };
                    let message = match message {
                        Ok(message) => message,
                        Err(err) => {
                            tracing::warn!(error = %err, "Stream message error");
                            continue;
                        }
                    };
                    self.handle_message(queue, message).await;
                }
            }
        }

        Ok(())
    }

    async fn handle_message(
        &self,
        queue: &Arc<BatchQueue>,
        message: jetstream::Message,
    ) {
        match enqueue_event(queue, &message.payload).await {
            Ok(id) => {
                tracing::debug!(turn_id = %id, "Enqueued turn document");
                if let Err(err) = message.ack().await {
                    tracing::warn!(error = %err, "Failed to ack message");
                }
            }
            Err(SearchError::QueueFull) => {
                // Redeliver after backoff; the document is not lost
                tracing::warn!("Batch queue full, NAKing message for redelivery");
                let delay = Duration::from_millis(self.config.nak_delay_ms);
                if let Err(err) = message.ack_with(AckKind::Nak(Some(delay))).await {
                    tracing::warn!(error = %err, "Failed to NAK message");
                }
            }
            Err(err) => {
                // Poison pill: ack so it is not redelivered forever
                tracing::warn!(error = %err, "Dropping malformed turn message");
                if let Err(err) = message.ack().await {
                    tracing::warn!(error = %err, "Failed to ack malformed message");
                }
            }
        }
    }

    fn spawn_heartbeat(&self) -> JoinHandle<()> {
        let status = self.status.clone();
        let group_id = self.config.group_id.clone();
        let service_id = self.config.service_id.clone();
        let interval = Duration::from_millis(self.config.heartbeat_interval_ms);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Some(status) = &status {
                    if let Err(err) = status
                        .publish_consumer_status(
                            ConsumerStatus::ConsumerHeartbeat,
                            &group_id,
                            &service_id,
                        )
                        .await
                    {
                        tracing::warn!(error = %err, "Failed to publish heartbeat");
                    }
                }
            }
        })
    }

    async fn publish_status(&self, status: ConsumerStatus) {
        if let Some(publisher) = &self.status {
            if let Err(err) = publisher
                .publish_consumer_status(
                    status,
                    &self.config.group_id,
                    &self.config.service_id,
                )
                .await
            {
                tracing::warn!(error = %err, status = ?status, "Failed to publish consumer status");
            }
        }
    }
}

/// Parse a raw event payload and enqueue the resulting document. Returns the
/// turn id on success.
pub async fn enqueue_event(queue: &Arc<BatchQueue>, payload: &[u8]) -> Result<String> {
    let data: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|e| SearchError::ParseError(format!("invalid event JSON: {e}")))?;

    let document = parse_turn_finalized(&data)?;
    let id = document.id.clone();
    queue.add(document).await?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use memsearch_core::Document;
    use parking_lot::Mutex;

    fn collecting_queue(
        batch_size: usize,
        max: usize,
    ) -> (Arc<BatchQueue>, Arc<Mutex<Vec<Document>>>) {
        let collected = Arc::new(Mutex::new(Vec::new()));
        let collected_clone = Arc::clone(&collected);
        let queue = BatchQueue::new(
            BatchConfig {
                batch_size,
                flush_interval_ms: 60_000,
                max_queue_size: max,
            },
            move |docs: Vec<Document>| {
                let collected = Arc::clone(&collected_clone);
                async move {
                    let count = docs.len();
                    collected.lock().extend(docs);
                    count
                }
            },
        );
        (queue, collected)
    }

    #[tokio::test]
    async fn test_enqueue_event_batch_of_one_flushes() {
        let (queue, collected) = collecting_queue(1, 10);

        let payload = serde_json::json!({
            "id": "t1",
            "tenant_id": "o1",
            "user_content": "fix it",
            "assistant_content": "done",
            "reasoning_preview": ""
        });

        let id = enqueue_event(&queue, payload.to_string().as_bytes())
            .await
            .unwrap();
        assert_eq!(id, "t1");

        let docs = collected.lock();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "User: fix it\n\nAssistant: done");
        assert_eq!(docs[0].tenant_id, "o1");
        assert_eq!(docs[0].metadata["type"], "turn");
        assert_eq!(docs[0].metadata["has_reasoning"], false);
    }

    #[tokio::test]
    async fn test_enqueue_event_malformed_json() {
        let (queue, _) = collecting_queue(10, 10);
        let err = enqueue_event(&queue, b"not json").await.unwrap_err();
        assert!(matches!(err, SearchError::ParseError(_)));
    }

    #[tokio::test]
    async fn test_enqueue_event_missing_tenant() {
        let (queue, _) = collecting_queue(10, 10);
        let payload = serde_json::json!({"id": "t1", "user_content": "hi"});
        let err = enqueue_event(&queue, payload.to_string().as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::ParseError(_)));
    }

    #[tokio::test]
    async fn test_enqueue_event_queue_full() {
        let (queue, _) = collecting_queue(10, 1);
        let payload = |id: &str| {
            serde_json::json!({"id": id, "tenant_id": "o1", "user_content": "hi"}).to_string()
        };

        enqueue_event(&queue, payload("t1").as_bytes()).await.unwrap();
        let err = enqueue_event(&queue, payload("t2").as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::QueueFull));
    }

    #[test]
    fn test_default_config() {
        let config = ConsumerConfig::default();
        assert_eq!(config.subject, "memory.turns.finalized");
        assert_eq!(config.group_id, "search-turns-indexer");
        assert_eq!(config.service_id.len(), 8);
    }
}

//! Turn ingest flow: event payload -> batch queue -> indexer -> store upsert.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use memsearch_config::EmbedderSettings;
use memsearch_core::{
    IndexedPoint, Prefetch, RankedPoint, Result, SparseVec, StoreFilter, VectorStore,
};
use memsearch_embedders::EmbedderFactory;
use memsearch_indexing::{enqueue_event, BatchConfig, BatchQueue, TurnsIndexer, TurnsIndexerConfig};

#[derive(Default)]
struct RecordingStore {
    upserts: Mutex<Vec<(String, Vec<IndexedPoint>)>>,
}

#[async_trait]
impl VectorStore for RecordingStore {
    async fn upsert(&self, collection: &str, points: Vec<IndexedPoint>) -> Result<()> {
        self.upserts.lock().push((collection.to_string(), points));
        Ok(())
    }

    async fn query(
        &self,
        _collection: &str,
        _vector_name: &str,
        _vector: Vec<f32>,
        _filter: &StoreFilter,
        _limit: usize,
        _score_threshold: Option<f32>,
    ) -> Result<Vec<RankedPoint>> {
        Ok(Vec::new())
    }

    async fn query_sparse(
        &self,
        _collection: &str,
        _field: &str,
        _vector: SparseVec,
        _filter: &StoreFilter,
        _limit: usize,
        _score_threshold: Option<f32>,
    ) -> Result<Vec<RankedPoint>> {
        Ok(Vec::new())
    }

    async fn fuse(
        &self,
        _collection: &str,
        _prefetches: Vec<Prefetch>,
        _filter: &StoreFilter,
        _limit: usize,
    ) -> Result<Vec<RankedPoint>> {
        Ok(Vec::new())
    }
}

fn indexer_over(store: Arc<RecordingStore>, enable_sparse: bool) -> Arc<TurnsIndexer> {
    let embedders = Arc::new(EmbedderFactory::new(EmbedderSettings {
        enable_sparse,
        ..Default::default()
    }));
    Arc::new(TurnsIndexer::new(
        store,
        embedders,
        TurnsIndexerConfig::default(),
    ))
}

#[tokio::test]
async fn consumer_ingest_single_upsert_with_turn_payload() {
    let store = Arc::new(RecordingStore::default());
    let indexer = indexer_over(Arc::clone(&store), true);

    let indexer_for_flush = Arc::clone(&indexer);
    let queue = BatchQueue::new(
        BatchConfig {
            batch_size: 1,
            flush_interval_ms: 60_000,
            max_queue_size: 10,
        },
        move |docs| {
            let indexer = Arc::clone(&indexer_for_flush);
            async move { indexer.index_documents(docs).await }
        },
    );

    let event = serde_json::json!({
        "id": "t1",
        "tenant_id": "o1",
        "user_content": "fix it",
        "assistant_content": "done",
        "reasoning_preview": ""
    });
    enqueue_event(&queue, event.to_string().as_bytes())
        .await
        .unwrap();

    let upserts = store.upserts.lock();
    assert_eq!(upserts.len(), 1);

    let (collection, points) = &upserts[0];
    assert_eq!(collection, "turns");
    assert_eq!(points.len(), 1);

    let point = &points[0];
    assert_eq!(point.id, "t1");
    assert_eq!(
        point.payload.get("content").and_then(|v| v.as_str()),
        Some("User: fix it\n\nAssistant: done")
    );
    assert_eq!(
        point.payload.get("tenant_id").and_then(|v| v.as_str()),
        Some("o1")
    );
    assert_eq!(
        point.payload.get("type").and_then(|v| v.as_str()),
        Some("turn")
    );
    assert_eq!(
        point.payload.get("has_reasoning").and_then(|v| v.as_bool()),
        Some(false)
    );

    // Dense + sparse vectors under turn-family names; colbert off by default
    assert_eq!(point.vectors.dense.len(), 1);
    assert_eq!(point.vectors.dense[0].0, "turn_dense");
    assert_eq!(point.vectors.sparse.len(), 1);
    assert_eq!(point.vectors.sparse[0].0, "turn_sparse");
    assert!(point.vectors.multi.is_empty());
}

#[tokio::test]
async fn indexer_empty_batch_returns_zero() {
    let store = Arc::new(RecordingStore::default());
    let indexer = indexer_over(Arc::clone(&store), true);
    assert_eq!(indexer.index_documents(Vec::new()).await, 0);
    assert!(store.upserts.lock().is_empty());
}

#[tokio::test]
async fn indexer_drops_sparse_when_embedder_disabled() {
    let store = Arc::new(RecordingStore::default());
    // Config asks for sparse but the factory has it disabled: index
    // dense-only instead of failing the batch
    let indexer = indexer_over(Arc::clone(&store), false);

    let doc = memsearch_core::Document::new("t9", "User: hello", "o1");
    assert_eq!(indexer.index_documents(vec![doc]).await, 1);

    let upserts = store.upserts.lock();
    let point = &upserts[0].1[0];
    assert_eq!(point.vectors.dense.len(), 1);
    assert!(point.vectors.sparse.is_empty());
}

#[tokio::test]
async fn indexer_embeddings_stay_aligned_with_documents() {
    let store = Arc::new(RecordingStore::default());
    let indexer = indexer_over(Arc::clone(&store), true);

    let docs: Vec<memsearch_core::Document> = (0..4)
        .map(|i| {
            memsearch_core::Document::new(
                format!("t{i}"),
                format!("User: message number {i}"),
                "o1",
            )
        })
        .collect();

    assert_eq!(indexer.index_documents(docs).await, 4);

    let upserts = store.upserts.lock();
    let points = &upserts[0].1;
    for (i, point) in points.iter().enumerate() {
        assert_eq!(point.id, format!("t{i}"));
        assert_eq!(
            point.payload.get("content").and_then(|v| v.as_str()),
            Some(format!("User: message number {i}").as_str())
        );
    }
}

struct FailingStore;

#[async_trait]
impl VectorStore for FailingStore {
    async fn upsert(&self, _collection: &str, _points: Vec<IndexedPoint>) -> Result<()> {
        Err(memsearch_core::SearchError::StoreUnavailable(
            "down".to_string(),
        ))
    }

    async fn query(
        &self,
        _collection: &str,
        _vector_name: &str,
        _vector: Vec<f32>,
        _filter: &StoreFilter,
        _limit: usize,
        _score_threshold: Option<f32>,
    ) -> Result<Vec<RankedPoint>> {
        Ok(Vec::new())
    }

    async fn query_sparse(
        &self,
        _collection: &str,
        _field: &str,
        _vector: SparseVec,
        _filter: &StoreFilter,
        _limit: usize,
        _score_threshold: Option<f32>,
    ) -> Result<Vec<RankedPoint>> {
        Ok(Vec::new())
    }

    async fn fuse(
        &self,
        _collection: &str,
        _prefetches: Vec<Prefetch>,
        _filter: &StoreFilter,
        _limit: usize,
    ) -> Result<Vec<RankedPoint>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn indexer_failed_upsert_returns_zero() {
    let embedders = Arc::new(EmbedderFactory::new(EmbedderSettings::default()));
    let indexer = TurnsIndexer::new(
        Arc::new(FailingStore),
        embedders,
        TurnsIndexerConfig::default(),
    );

    let doc = memsearch_core::Document::new("t1", "User: hello", "o1");
    assert_eq!(indexer.index_documents(vec![doc]).await, 0);
}

//! End-to-end retriever pipeline tests against a scripted store.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use memsearch_config::{EmbedderSettings, RerankerSettings, SearchSettings};
use memsearch_core::{
    IndexedPoint, Payload, Prefetch, QueryVector, RankedPoint, Result, SearchFilters,
    SearchQuery, SearchStrategy, SparseVec, StoreFilter, VectorStore,
};
use memsearch_embedders::EmbedderFactory;
use memsearch_retrieval::{RerankerRouter, SearchRetriever};

/// One recorded store call, for asserting dispatch shapes.
#[derive(Debug, Clone)]
enum StoreCall {
    Query {
        collection: String,
        vector_name: String,
        limit: usize,
        threshold: Option<f32>,
        tenant: Option<String>,
    },
    QuerySparse {
        field: String,
        limit: usize,
        threshold: Option<f32>,
    },
    Fuse {
        collection: String,
        prefetch_fields: Vec<String>,
        prefetch_limits: Vec<usize>,
        limit: usize,
        tenant: Option<String>,
    },
}

/// Store stub returning a scripted response and recording every call.
struct ScriptedStore {
    response: Vec<RankedPoint>,
    calls: Mutex<Vec<StoreCall>>,
}

impl ScriptedStore {
    fn new(response: Vec<RankedPoint>) -> Self {
        Self {
            response,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl VectorStore for ScriptedStore {
    async fn upsert(&self, _collection: &str, _points: Vec<IndexedPoint>) -> Result<()> {
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        vector_name: &str,
        _vector: Vec<f32>,
        filter: &StoreFilter,
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<RankedPoint>> {
        self.calls.lock().push(StoreCall::Query {
            collection: collection.to_string(),
            vector_name: vector_name.to_string(),
            limit,
            threshold: score_threshold,
            tenant: filter.tenant_id().map(str::to_string),
        });
        Ok(self.response.clone())
    }

    async fn query_sparse(
        &self,
        _collection: &str,
        field: &str,
        _vector: SparseVec,
        _filter: &StoreFilter,
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<RankedPoint>> {
        self.calls.lock().push(StoreCall::QuerySparse {
            field: field.to_string(),
            limit,
            threshold: score_threshold,
        });
        Ok(self.response.clone())
    }

    async fn fuse(
        &self,
        collection: &str,
        prefetches: Vec<Prefetch>,
        filter: &StoreFilter,
        limit: usize,
    ) -> Result<Vec<RankedPoint>> {
        self.calls.lock().push(StoreCall::Fuse {
            collection: collection.to_string(),
            prefetch_fields: prefetches.iter().map(|p| p.field.clone()).collect(),
            prefetch_limits: prefetches.iter().map(|p| p.limit).collect(),
            limit,
            tenant: filter.tenant_id().map(str::to_string),
        });
        // Sanity on branch vector kinds: one dense, one sparse
        assert!(prefetches
            .iter()
            .any(|p| matches!(p.vector, QueryVector::Dense(_))));
        assert!(prefetches
            .iter()
            .any(|p| matches!(p.vector, QueryVector::Sparse(_))));
        Ok(self.response.clone())
    }
}

fn point(id: &str, score: f32, content: &str) -> RankedPoint {
    let mut payload = Payload::new();
    payload.insert("content".to_string(), content.into());
    payload.insert("tenant_id".to_string(), "t1".into());
    RankedPoint {
        id: id.to_string(),
        score,
        payload,
    }
}

fn retriever_over(store: Arc<ScriptedStore>) -> SearchRetriever {
    let embedders = Arc::new(EmbedderFactory::new(EmbedderSettings::default()));
    let router = Arc::new(RerankerRouter::new(
        RerankerSettings::default(),
        Arc::clone(&embedders),
        None,
    ));
    SearchRetriever::new(
        store,
        embedders,
        router,
        SearchSettings::default(),
        "memories",
        "turns",
    )
}

fn tenant_query(text: &str) -> SearchQuery {
    SearchQuery::new(text).with_filters(SearchFilters::for_tenant("t1"))
}

#[tokio::test]
async fn dense_search_no_rerank_preserves_scores() {
    let store = Arc::new(ScriptedStore::new(vec![
        point("p1", 0.91, "pods evicted under pressure"),
        point("p2", 0.80, "eviction thresholds"),
        point("p3", 0.42, "unrelated"),
    ]));
    let retriever = retriever_over(Arc::clone(&store));

    let mut query = tenant_query("kubernetes pod eviction").with_limit(3);
    query.strategy = Some(SearchStrategy::Dense);

    let results = retriever.search(&query).await.unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].id, "p1");
    assert!((results[0].score - 0.91).abs() < 1e-6);
    assert!((results[1].score - 0.80).abs() < 1e-6);
    assert!((results[2].score - 0.42).abs() < 1e-6);
    assert!(results.iter().all(|r| !r.degraded));
    assert!(results.iter().all(|r| r.fusion_score.is_none()));

    // Default dense threshold applied, tenant filter dispatched
    match &store.calls()[0] {
        StoreCall::Query {
            collection,
            vector_name,
            limit,
            threshold,
            tenant,
        } => {
            assert_eq!(collection, "memories");
            assert_eq!(vector_name, "text_dense");
            assert_eq!(*limit, 3);
            assert!(threshold.is_some());
            assert_eq!(tenant.as_deref(), Some("t1"));
        }
        other => panic!("expected dense query, got {other:?}"),
    }
}

#[tokio::test]
async fn hybrid_search_two_prefetches_no_threshold() {
    let store = Arc::new(ScriptedStore::new(vec![
        point("a", 0.016, "one"),
        point("b", 0.015, "two"),
        point("c", 0.013, "three"),
        point("d", 0.012, "four"),
        point("e", 0.010, "five"),
    ]));
    let retriever = retriever_over(Arc::clone(&store));

    let mut query = tenant_query("kubernetes pod eviction").with_limit(5);
    query.strategy = Some(SearchStrategy::Hybrid);
    query.threshold = Some(0.9); // must be ignored on hybrid

    let results = retriever.search(&query).await.unwrap();
    assert_eq!(results.len(), 5);

    match &store.calls()[0] {
        StoreCall::Fuse {
            collection,
            prefetch_fields,
            prefetch_limits,
            limit,
            tenant,
        } => {
            assert_eq!(collection, "memories");
            assert_eq!(prefetch_fields.len(), 2);
            assert!(prefetch_fields.contains(&"text_dense".to_string()));
            assert!(prefetch_fields.contains(&"text_sparse".to_string()));
            assert_eq!(prefetch_limits, &vec![10, 10]);
            assert_eq!(*limit, 5);
            assert_eq!(tenant.as_deref(), Some("t1"));
        }
        other => panic!("expected fuse call, got {other:?}"),
    }
}

#[tokio::test]
async fn rerank_depth_oversamples_store_fetch() {
    let store = Arc::new(ScriptedStore::new(vec![point(
        "only",
        0.9,
        "eviction threshold",
    )]));
    let retriever = retriever_over(Arc::clone(&store));

    let mut query = tenant_query("eviction threshold").with_limit(1);
    query.strategy = Some(SearchStrategy::Dense);
    query.rerank = true;
    query.rerank_depth = 50;

    let results = retriever.search(&query).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].reranker_score.is_some());
    assert!(results[0].fusion_score.is_some());

    match &store.calls()[0] {
        StoreCall::Query { limit, .. } => assert_eq!(*limit, 50),
        other => panic!("expected dense query, got {other:?}"),
    }
}

#[tokio::test]
async fn explicit_threshold_overrides_default() {
    let store = Arc::new(ScriptedStore::new(vec![point("p", 0.9, "text")]));
    let retriever = retriever_over(Arc::clone(&store));

    let mut query = tenant_query("query").with_limit(1);
    query.strategy = Some(SearchStrategy::Dense);
    query.threshold = Some(0.77);

    retriever.search(&query).await.unwrap();

    match &store.calls()[0] {
        StoreCall::Query { threshold, .. } => assert_eq!(*threshold, Some(0.77)),
        other => panic!("expected dense query, got {other:?}"),
    }
}

#[tokio::test]
async fn sparse_strategy_uses_sparse_field() {
    let store = Arc::new(ScriptedStore::new(vec![point("p", 1.5, "text")]));
    let retriever = retriever_over(Arc::clone(&store));

    let mut query = tenant_query("\"exact phrase\"").with_limit(1);
    query.strategy = Some(SearchStrategy::Sparse);

    retriever.search(&query).await.unwrap();

    match &store.calls()[0] {
        StoreCall::QuerySparse {
            field, threshold, ..
        } => {
            assert_eq!(field, "text_sparse");
            assert!(threshold.is_some());
        }
        other => panic!("expected sparse query, got {other:?}"),
    }
}

#[tokio::test]
async fn code_type_filter_selects_code_field() {
    let store = Arc::new(ScriptedStore::new(vec![point("p", 0.9, "fn main() {}")]));
    let retriever = retriever_over(Arc::clone(&store));

    let mut filters = SearchFilters::for_tenant("t1");
    filters.doc_type = Some("code".to_string());
    let mut query = SearchQuery::new("parseQuery usage").with_filters(filters);
    query.strategy = Some(SearchStrategy::Dense);

    retriever.search(&query).await.unwrap();

    match &store.calls()[0] {
        StoreCall::Query { vector_name, .. } => assert_eq!(vector_name, "code_dense"),
        other => panic!("expected dense query, got {other:?}"),
    }
}

#[tokio::test]
async fn turn_search_uses_turn_vector_family() {
    let store = Arc::new(ScriptedStore::new(vec![point("t", 0.8, "User: hi")]));
    let retriever = retriever_over(Arc::clone(&store));

    let mut query = tenant_query("hi").with_limit(1);
    query.strategy = Some(SearchStrategy::Dense);

    retriever.search_turns(&query).await.unwrap();

    match &store.calls()[0] {
        StoreCall::Query {
            collection,
            vector_name,
            ..
        } => {
            assert_eq!(collection, "turns");
            assert_eq!(vector_name, "turn_dense");
        }
        other => panic!("expected dense query, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_tenant_rejected_before_store_access() {
    let store = Arc::new(ScriptedStore::new(vec![point("p", 0.9, "text")]));
    let retriever = retriever_over(Arc::clone(&store));

    let query = SearchQuery::new("no filters at all");
    assert!(retriever.search(&query).await.is_err());
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn scores_monotonically_non_increasing() {
    let store = Arc::new(ScriptedStore::new(vec![
        point("a", 0.3, "one"),
        point("b", 0.9, "two"),
        point("c", 0.6, "three"),
    ]));
    let retriever = retriever_over(store);

    let mut query = tenant_query("anything").with_limit(3);
    query.strategy = Some(SearchStrategy::Dense);

    let results = retriever.search(&query).await.unwrap();
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn conflict_candidates_fixed_shape() {
    let store = Arc::new(ScriptedStore::new(vec![point("m", 0.7, "remembered")]));
    let retriever = retriever_over(Arc::clone(&store));

    let results = retriever
        .conflict_candidates("new memory content", "t1", Some("proj"))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);

    match &store.calls()[0] {
        StoreCall::Query {
            limit, threshold, ..
        } => {
            assert_eq!(*limit, 10);
            assert_eq!(*threshold, Some(0.65));
        }
        other => panic!("expected dense query, got {other:?}"),
    }
}

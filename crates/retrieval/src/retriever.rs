//! Core search retriever
//!
//! Executes dense, sparse, and hybrid retrieval with optional multi-tier
//! reranking:
//! - Strategy selection (explicit, deployment default, or classifier)
//! - Per-strategy score thresholds (never applied to rank-based RRF scores)
//! - Oversampling when reranking is enabled
//! - Tenant-scoped filter composition for every store call
//! - Graceful degradation when the reranker misbehaves

use std::sync::Arc;

use memsearch_config::SearchSettings;
use memsearch_core::{
    sort_results, DenseEmbedder, Prefetch, QueryVector, RankedPoint, RerankerTier, Result,
    SearchError, SearchFilters, SearchQuery, SearchResultItem, SearchStrategy, SparseEmbedder,
    StoreFilter, VectorStore,
};
use memsearch_embedders::EmbedderFactory;

use crate::classifier::QueryClassifier;
use crate::constants::{
    CODE_DENSE_FIELD, CONFLICT_LIMIT, CONFLICT_SCORE_THRESHOLD, TEXT_DENSE_FIELD,
    TEXT_SPARSE_FIELD, TURN_DENSE_FIELD, TURN_SPARSE_FIELD,
};
use crate::rerank::RerankerRouter;

/// Which collection family a search runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetCollection {
    /// Generic memory collection (`text_*`/`code_*` vector family)
    Memory,
    /// Turn collection (`turn_*` vector family)
    Turns,
}

/// Main search retriever.
pub struct SearchRetriever {
    store: Arc<dyn VectorStore>,
    embedders: Arc<EmbedderFactory>,
    router: Arc<RerankerRouter>,
    classifier: QueryClassifier,
    settings: SearchSettings,
    memory_collection: String,
    turn_collection: String,
}

impl SearchRetriever {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedders: Arc<EmbedderFactory>,
        router: Arc<RerankerRouter>,
        settings: SearchSettings,
        memory_collection: impl Into<String>,
        turn_collection: impl Into<String>,
    ) -> Self {
        Self {
            store,
            embedders,
            router,
            classifier: QueryClassifier::new(),
            settings,
            memory_collection: memory_collection.into(),
            turn_collection: turn_collection.into(),
        }
    }

    /// Search the generic memory collection.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResultItem>> {
        self.search_collection(query, TargetCollection::Memory).await
    }

    /// Search the turn collection (complete conversation turns).
    pub async fn search_turns(&self, query: &SearchQuery) -> Result<Vec<SearchResultItem>> {
        self.search_collection(query, TargetCollection::Turns).await
    }

    async fn search_collection(
        &self,
        query: &SearchQuery,
        target: TargetCollection,
    ) -> Result<Vec<SearchResultItem>> {
        if query.limit == 0 {
            return Err(SearchError::InvalidArgument(
                "limit must be at least 1".to_string(),
            ));
        }

        // Oversample when reranking so the reranker has room to reshuffle
        let fetch_limit = if query.rerank {
            query.rerank_depth.max(query.limit)
        } else {
            query.limit
        };

        let strategy = self.effective_strategy(query);
        let threshold = self.effective_threshold(query, strategy);
        let filter = build_store_filter(query.filters.as_ref())?;

        // Code queries hit the code-tuned dense field on the memory
        // collection; the turn collection has a single dense field.
        let is_code_search = query
            .filters
            .as_ref()
            .and_then(|f| f.doc_type.as_deref())
            .map(|t| t == "code")
            .unwrap_or(false);

        let (collection, dense_field, sparse_field) = match target {
            TargetCollection::Memory => (
                self.memory_collection.as_str(),
                if is_code_search {
                    CODE_DENSE_FIELD
                } else {
                    TEXT_DENSE_FIELD
                },
                TEXT_SPARSE_FIELD,
            ),
            TargetCollection::Turns => (
                self.turn_collection.as_str(),
                TURN_DENSE_FIELD,
                TURN_SPARSE_FIELD,
            ),
        };

        let raw_results = match strategy {
            SearchStrategy::Dense => {
                self.search_dense(
                    &query.text,
                    collection,
                    dense_field,
                    &filter,
                    fetch_limit,
                    threshold,
                )
                .await?
            }
            SearchStrategy::Sparse => {
                self.search_sparse(
                    &query.text,
                    collection,
                    sparse_field,
                    &filter,
                    fetch_limit,
                    threshold,
                )
                .await?
            }
            SearchStrategy::Hybrid => {
                self.search_hybrid(
                    &query.text,
                    collection,
                    dense_field,
                    sparse_field,
                    &filter,
                    fetch_limit,
                )
                .await?
            }
        };

        tracing::debug!(
            strategy = %strategy,
            fetch_limit,
            results = raw_results.len(),
            "Retrieved raw results"
        );

        if query.rerank && !raw_results.is_empty() {
            return Ok(self.apply_reranking(query, raw_results).await);
        }

        let mut items = map_raw_results(raw_results.into_iter().take(query.limit));
        sort_results(&mut items);
        Ok(items)
    }

    /// Nearest-neighbour memories for dedup-before-write checks. Fixed
    /// threshold and limit; dense retrieval only.
    pub async fn conflict_candidates(
        &self,
        content: &str,
        tenant_id: &str,
        project: Option<&str>,
    ) -> Result<Vec<SearchResultItem>> {
        let mut filters = SearchFilters::for_tenant(tenant_id);
        filters.project = project.map(str::to_string);
        let filter = build_store_filter(Some(&filters))?;

        let results = self
            .search_dense(
                content,
                &self.memory_collection,
                TEXT_DENSE_FIELD,
                &filter,
                CONFLICT_LIMIT,
                Some(CONFLICT_SCORE_THRESHOLD),
            )
            .await?;

        let mut items = map_raw_results(results.into_iter());
        sort_results(&mut items);
        Ok(items)
    }

    fn effective_strategy(&self, query: &SearchQuery) -> SearchStrategy {
        if let Some(strategy) = query.strategy {
            return strategy;
        }
        // The classifier only auto-selects when the deployment default is
        // hybrid; a dense default is a deliberate ops choice (e.g. sparse
        // embeddings unavailable) and must stick.
        if self.settings.default_strategy == SearchStrategy::Hybrid {
            self.classifier.classify(&query.text).strategy
        } else {
            self.settings.default_strategy
        }
    }

    /// Per-strategy threshold. Hybrid fusion returns rank-derived scores, so
    /// no threshold ever applies there.
    fn effective_threshold(&self, query: &SearchQuery, strategy: SearchStrategy) -> Option<f32> {
        match strategy {
            SearchStrategy::Dense => {
                Some(query.threshold.unwrap_or(self.settings.min_score_dense))
            }
            SearchStrategy::Sparse => {
                Some(query.threshold.unwrap_or(self.settings.min_score_sparse))
            }
            SearchStrategy::Hybrid => None,
        }
    }

    async fn search_dense(
        &self,
        text: &str,
        collection: &str,
        vector_field: &str,
        filter: &StoreFilter,
        limit: usize,
        threshold: Option<f32>,
    ) -> Result<Vec<RankedPoint>> {
        let embedder = if vector_field == CODE_DENSE_FIELD {
            self.embedders.get_code_embedder().await?
        } else {
            self.embedders.get_text_embedder().await?
        };
        let vector = embedder.embed_query(text).await?;

        self.store
            .query(collection, vector_field, vector, filter, limit, threshold)
            .await
    }

    async fn search_sparse(
        &self,
        text: &str,
        collection: &str,
        sparse_field: &str,
        filter: &StoreFilter,
        limit: usize,
        threshold: Option<f32>,
    ) -> Result<Vec<RankedPoint>> {
        let sparse_embedder = self.embedders.get_sparse_embedder().await?;
        let vector = embed_sparse_blocking(sparse_embedder, text.to_string()).await?;

        self.store
            .query_sparse(collection, sparse_field, vector, filter, limit, threshold)
            .await
    }

    async fn search_hybrid(
        &self,
        text: &str,
        collection: &str,
        dense_field: &str,
        sparse_field: &str,
        filter: &StoreFilter,
        limit: usize,
    ) -> Result<Vec<RankedPoint>> {
        let dense_embedder = if dense_field == CODE_DENSE_FIELD {
            self.embedders.get_code_embedder().await?
        } else {
            self.embedders.get_text_embedder().await?
        };
        let sparse_embedder = self.embedders.get_sparse_embedder().await?;

        // Dense embedding is async; sparse term weighting is CPU-bound and
        // runs on the blocking pool. Join both before dispatching.
        let (dense_vector, sparse_vector) = tokio::join!(
            dense_embedder.embed_query(text),
            embed_sparse_blocking(sparse_embedder, text.to_string()),
        );
        let dense_vector = dense_vector?;
        let sparse_vector = sparse_vector?;

        let prefetches = vec![
            Prefetch {
                field: dense_field.to_string(),
                vector: QueryVector::Dense(dense_vector),
                limit: limit * 2,
            },
            Prefetch {
                field: sparse_field.to_string(),
                vector: QueryVector::Sparse(sparse_vector),
                limit: limit * 2,
            },
        ];

        self.store.fuse(collection, prefetches, filter, limit).await
    }

    async fn apply_reranking(
        &self,
        query: &SearchQuery,
        raw_results: Vec<RankedPoint>,
    ) -> Vec<SearchResultItem> {
        let documents: Vec<String> = raw_results
            .iter()
            .map(|point| {
                point
                    .payload
                    .get("content")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            })
            .collect();

        let tier = self.select_reranker_tier(&query.text, query.rerank_tier);

        let outcome = self
            .router
            .rerank(
                &query.text,
                &documents,
                tier,
                query.limit,
                self.router.default_timeout_ms(),
                Some(RerankerTier::Fast),
            )
            .await;

        tracing::debug!(
            tier = %outcome.actual_tier,
            degraded = outcome.degraded,
            candidates = raw_results.len(),
            returned = outcome.ranked.len(),
            "Reranking completed"
        );

        let mut items = Vec::with_capacity(outcome.ranked.len().min(query.limit));
        for ranked in outcome.ranked.iter().take(query.limit) {
            let Some(original) = raw_results.get(ranked.original_index) else {
                continue;
            };
            items.push(SearchResultItem {
                id: original.id.clone(),
                score: ranked.score,
                fusion_score: Some(original.score),
                reranker_score: Some(ranked.score),
                rerank_tier: Some(outcome.actual_tier),
                payload: original.payload.clone(),
                degraded: outcome.degraded,
                degraded_reason: outcome
                    .degraded
                    .then(|| format!("reranker tier {}", outcome.actual_tier)),
            });
        }

        sort_results(&mut items);
        items
    }

    /// Tier auto-selection from query features when none was requested.
    fn select_reranker_tier(
        &self,
        query_text: &str,
        explicit_tier: Option<RerankerTier>,
    ) -> RerankerTier {
        if let Some(tier) = explicit_tier {
            return tier;
        }

        let classification = self.classifier.classify_complexity(query_text);

        if classification.features.has_code {
            return RerankerTier::Code;
        }

        // Semantic questions benefit from token-level late interaction
        if classification.features.is_question && !classification.features.has_quotes {
            return RerankerTier::Colbert;
        }

        match classification.complexity {
            memsearch_core::QueryComplexity::Simple => RerankerTier::Fast,
            _ => RerankerTier::Accurate,
        }
    }
}

/// Run blocking sparse term weighting on the worker pool.
async fn embed_sparse_blocking(
    embedder: Arc<dyn SparseEmbedder>,
    text: String,
) -> Result<memsearch_core::SparseVec> {
    tokio::task::spawn_blocking(move || embedder.embed_query(&text))
        .await
        .map_err(|e| SearchError::EmbedderUnavailable(format!("sparse embedding task failed: {e}")))?
}

/// Compose the store filter. The tenant equality is always first; a missing
/// tenant is a fatal caller error.
pub fn build_store_filter(filters: Option<&SearchFilters>) -> Result<StoreFilter> {
    let Some(filters) = filters else {
        return Err(SearchError::Unauthorized(
            "search filters with tenant_id are required for tenant isolation".to_string(),
        ));
    };

    if filters.tenant_id.is_empty() {
        return Err(SearchError::Unauthorized(
            "tenant_id is required for tenant isolation".to_string(),
        ));
    }

    let mut filter = StoreFilter::new().eq("tenant_id", filters.tenant_id.clone());

    if let Some(ref session_id) = filters.session_id {
        filter = filter.eq("session_id", session_id.clone());
    }
    if let Some(ref doc_type) = filters.doc_type {
        filter = filter.eq("type", doc_type.clone());
    }
    if let Some(range) = filters.time_range {
        filter.must.push(memsearch_core::FieldCondition::Range {
            key: "timestamp".to_string(),
            gte: Some(range.start),
            lte: Some(range.end),
            gt: None,
        });
    }
    if let Some(vt_end_after) = filters.vt_end_after {
        filter.must.push(memsearch_core::FieldCondition::Range {
            key: "vt_end".to_string(),
            gte: None,
            lte: None,
            gt: Some(vt_end_after),
        });
    }
    if let Some(ref project) = filters.project {
        filter = filter.eq("project", project.clone());
    }

    Ok(filter)
}

fn map_raw_results(results: impl Iterator<Item = RankedPoint>) -> Vec<SearchResultItem> {
    results
        .map(|point| SearchResultItem {
            id: point.id,
            score: point.score,
            fusion_score: None,
            reranker_score: None,
            rerank_tier: None,
            payload: point.payload,
            degraded: false,
            degraded_reason: None,
        })
        .collect()
}

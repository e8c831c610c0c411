//! Session-aware hierarchical retrieval
//!
//! Two-stage retrieval for conversational corpora: session summaries form a
//! higher-level index, so the query first selects the most relevant sessions
//! and then retrieves turns inside each of them. Gathered turns carry their
//! session context and are optionally reranked across the full set.

use std::sync::Arc;

use futures::future::join_all;
use parking_lot::RwLock;

use memsearch_core::{
    sort_results, DenseEmbedder, RerankerTier, Result, SearchQuery, SearchResultItem, StoreFilter,
    VectorStore,
};
use memsearch_embedders::EmbedderFactory;

use crate::constants::{TEXT_DENSE_FIELD, TURN_DENSE_FIELD};
use crate::rerank::RerankerRouter;
use crate::retriever::build_store_filter;

/// Session-aware retrieval configuration.
#[derive(Debug, Clone)]
pub struct SessionAwareConfig {
    /// Sessions selected in stage 1
    pub top_sessions: usize,
    /// Turns retrieved per matched session in stage 2
    pub turns_per_session: usize,
    /// Final result count after rerank/sort
    pub final_top_k: usize,
    /// Collection holding session summaries
    pub session_collection: String,
    /// Collection holding indexed turns
    pub turn_collection: String,
    /// Minimum session match score for stage 1
    pub session_score_threshold: f32,
    /// Run stage-2 retrievals concurrently
    pub parallel_turn_retrieval: bool,
}

impl Default for SessionAwareConfig {
    fn default() -> Self {
        Self {
            top_sessions: 5,
            turns_per_session: 3,
            final_top_k: 10,
            session_collection: "sessions".to_string(),
            turn_collection: "turns".to_string(),
            session_score_threshold: 0.3,
            parallel_turn_retrieval: true,
        }
    }
}

/// A stage-1 session match.
#[derive(Debug, Clone)]
pub struct SessionMatch {
    pub session_id: String,
    pub summary: String,
    pub score: f32,
}

/// Two-stage session-aware retriever.
pub struct SessionAwareRetriever {
    store: Arc<dyn VectorStore>,
    embedders: Arc<EmbedderFactory>,
    router: Option<Arc<RerankerRouter>>,
    config: RwLock<SessionAwareConfig>,
}

impl SessionAwareRetriever {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedders: Arc<EmbedderFactory>,
        router: Option<Arc<RerankerRouter>>,
        config: SessionAwareConfig,
    ) -> Self {
        Self {
            store,
            embedders,
            router,
            config: RwLock::new(config),
        }
    }

    pub fn config(&self) -> SessionAwareConfig {
        self.config.read().clone()
    }

    pub fn set_config(&self, config: SessionAwareConfig) {
        *self.config.write() = config;
    }

    /// Hierarchical retrieval: session selection, per-session turn
    /// retrieval, optional rerank across the gathered set.
    pub async fn retrieve(&self, query: &SearchQuery) -> Result<Vec<SearchResultItem>> {
        let config = self.config();
        let filter = build_store_filter(query.filters.as_ref())?;

        let sessions = self.retrieve_sessions(&query.text, &filter, &config).await?;
        if sessions.is_empty() {
            tracing::debug!("No sessions above threshold, returning empty result");
            return Ok(Vec::new());
        }

        let turns = self
            .retrieve_turns(&query.text, &filter, &sessions, &config)
            .await?;

        self.finalize(&query.text, turns, &config).await
    }

    /// Stage 1: select the most relevant sessions by summary similarity.
    async fn retrieve_sessions(
        &self,
        text: &str,
        filter: &StoreFilter,
        config: &SessionAwareConfig,
    ) -> Result<Vec<SessionMatch>> {
        let embedder = self.embedders.get_text_embedder().await?;
        let vector = embedder.embed_query(text).await?;

        let points = self
            .store
            .query(
                &config.session_collection,
                TEXT_DENSE_FIELD,
                vector,
                filter,
                config.top_sessions,
                Some(config.session_score_threshold),
            )
            .await?;

        let sessions: Vec<SessionMatch> = points
            .into_iter()
            .filter_map(|point| {
                let session_id = point
                    .payload
                    .get("session_id")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| point.id.clone());
                let summary = point
                    .payload
                    .get("summary")
                    .or_else(|| point.payload.get("content"))
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                if session_id.is_empty() {
                    None
                } else {
                    Some(SessionMatch {
                        session_id,
                        summary,
                        score: point.score,
                    })
                }
            })
            .collect();

        tracing::debug!(matched = sessions.len(), "Stage 1 session selection done");
        Ok(sessions)
    }

    /// Stage 2: retrieve turns inside every matched session. A failing
    /// per-session retrieval only costs that session its turns.
    async fn retrieve_turns(
        &self,
        text: &str,
        filter: &StoreFilter,
        sessions: &[SessionMatch],
        config: &SessionAwareConfig,
    ) -> Result<Vec<SearchResultItem>> {
        let embedder = self.embedders.get_text_embedder().await?;
        let vector = embedder.embed_query(text).await?;

        let mut all_turns = Vec::new();

        if config.parallel_turn_retrieval {
            let retrievals = sessions.iter().map(|session| {
                let vector = vector.clone();
                async move {
                    (
                        session,
                        self.turns_for_session(session, vector, filter, config).await,
                    )
                }
            });
            for (session, outcome) in join_all(retrievals).await {
                match outcome {
                    Ok(mut turns) => all_turns.append(&mut turns),
                    Err(err) => {
                        tracing::warn!(
                            session_id = %session.session_id,
                            error = %err,
                            "Turn retrieval failed for session"
                        );
                    }
                }
            }
        } else {
            for session in sessions {
                match self
                    .turns_for_session(session, vector.clone(), filter, config)
                    .await
                {
                    Ok(mut turns) => all_turns.append(&mut turns),
                    Err(err) => {
                        tracing::warn!(
                            session_id = %session.session_id,
                            error = %err,
                            "Turn retrieval failed for session"
                        );
                    }
                }
            }
        }

        Ok(all_turns)
    }

    async fn turns_for_session(
        &self,
        session: &SessionMatch,
        vector: Vec<f32>,
        filter: &StoreFilter,
        config: &SessionAwareConfig,
    ) -> Result<Vec<SearchResultItem>> {
        let mut session_filter = filter.clone();
        session_filter = session_filter.eq("session_id", session.session_id.clone());

        let points = self
            .store
            .query(
                &config.turn_collection,
                TURN_DENSE_FIELD,
                vector,
                &session_filter,
                config.turns_per_session,
                None,
            )
            .await?;

        Ok(points
            .into_iter()
            .map(|point| {
                let mut item = SearchResultItem {
                    id: point.id,
                    score: point.score,
                    fusion_score: None,
                    reranker_score: None,
                    rerank_tier: None,
                    payload: point.payload,
                    degraded: false,
                    degraded_reason: None,
                };
                // Attach session context to every turn
                item.payload
                    .insert("session_id".to_string(), session.session_id.clone().into());
                item.payload
                    .insert("session_summary".to_string(), session.summary.clone().into());
                item.payload.insert(
                    "session_score".to_string(),
                    serde_json::Number::from_f64(session.score as f64)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null),
                );
                item
            })
            .collect())
    }

    /// Rerank across the full gathered set when it overflows `final_top_k`
    /// and a reranker is configured; otherwise sort by score.
    async fn finalize(
        &self,
        query_text: &str,
        mut turns: Vec<SearchResultItem>,
        config: &SessionAwareConfig,
    ) -> Result<Vec<SearchResultItem>> {
        if turns.len() > config.final_top_k {
            if let Some(router) = &self.router {
                let documents: Vec<String> =
                    turns.iter().map(|t| t.content().to_string()).collect();

                let outcome = router
                    .rerank(
                        query_text,
                        &documents,
                        RerankerTier::Accurate,
                        config.final_top_k,
                        router.default_timeout_ms(),
                        Some(RerankerTier::Fast),
                    )
                    .await;

                if !outcome.degraded {
                    let mut reranked = Vec::with_capacity(config.final_top_k);
                    for ranked in outcome.ranked.iter().take(config.final_top_k) {
                        if let Some(original) = turns.get(ranked.original_index) {
                            let mut item = original.clone();
                            item.fusion_score = Some(item.score);
                            item.score = ranked.score;
                            item.reranker_score = Some(ranked.score);
                            item.rerank_tier = Some(outcome.actual_tier);
                            reranked.push(item);
                        }
                    }
                    sort_results(&mut reranked);
                    return Ok(reranked);
                }

                tracing::warn!("Session rerank degraded, falling back to score ordering");
            }
        }

        sort_results(&mut turns);
        turns.truncate(config.final_top_k);
        Ok(turns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = SessionAwareConfig::default();
        assert_eq!(config.top_sessions, 5);
        assert_eq!(config.turns_per_session, 3);
        assert_eq!(config.final_top_k, 10);
        assert!((config.session_score_threshold - 0.3).abs() < f32::EPSILON);
        assert!(config.parallel_turn_retrieval);
    }

    #[test]
    fn test_config_update() {
        let store: Arc<dyn VectorStore> = Arc::new(NullStore);
        let retriever = SessionAwareRetriever::new(
            store,
            Arc::new(EmbedderFactory::new(Default::default())),
            None,
            SessionAwareConfig::default(),
        );
        let mut config = retriever.config();
        config.top_sessions = 8;
        retriever.set_config(config);
        assert_eq!(retriever.config().top_sessions, 8);
    }

    struct NullStore;

    #[async_trait::async_trait]
    impl VectorStore for NullStore {
        async fn upsert(
            &self,
            _collection: &str,
            _points: Vec<memsearch_core::IndexedPoint>,
        ) -> Result<()> {
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
        ) -> Result<Vec<memsearch_core::RankedPoint>> {
            Ok(Vec::new())
        }

        async fn query_sparse(
            &self,
            _collection: &str,
            _field: &str,
            _vector: memsearch_core::SparseVec,
            _filter: &StoreFilter,
            _limit: usize,
            _score_threshold: Option<f32>,
        ) -> Result<Vec<memsearch_core::RankedPoint>> {
            Ok(Vec::new())
        }

        async fn fuse(
            &self,
            _collection: &str,
            _prefetches: Vec<memsearch_core::Prefetch>,
            _filter: &StoreFilter,
            _limit: usize,
        ) -> Result<Vec<memsearch_core::RankedPoint>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_no_sessions_returns_empty() {
        let store: Arc<dyn VectorStore> = Arc::new(NullStore);
        let retriever = SessionAwareRetriever::new(
            store,
            Arc::new(EmbedderFactory::new(Default::default())),
            None,
            SessionAwareConfig::default(),
        );

        let query = SearchQuery::new("anything")
            .with_filters(memsearch_core::SearchFilters::for_tenant("t1"));
        let results = retriever.retrieve(&query).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_missing_tenant_rejected() {
        let store: Arc<dyn VectorStore> = Arc::new(NullStore);
        let retriever = SessionAwareRetriever::new(
            store,
            Arc::new(EmbedderFactory::new(Default::default())),
            None,
            SessionAwareConfig::default(),
        );

        let query = SearchQuery::new("anything");
        assert!(retriever.retrieve(&query).await.is_err());
    }
}

//! Application state
//!
//! Explicit dependency struct threaded through the router; no globals. All
//! shared components are `Arc`ed and safe for concurrent handlers.

use std::sync::Arc;

use parking_lot::RwLock;

use memsearch_config::Settings;
use memsearch_core::LanguageModel;
use memsearch_embedders::EmbedderFactory;
use memsearch_retrieval::{
    QdrantStore, RerankerRouter, SearchRetriever, SessionAwareConfig, SessionAwareRetriever,
};

use crate::auth::TokenTable;

/// Shared state across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Configuration (read-mostly)
    pub config: Arc<RwLock<Settings>>,
    /// Qdrant facade, also used for admin collection management
    pub store: Arc<QdrantStore>,
    /// Embedder factory
    pub embedders: Arc<EmbedderFactory>,
    /// Reranker router
    pub router: Arc<RerankerRouter>,
    /// Core retriever
    pub retriever: Arc<SearchRetriever>,
    /// Session-aware retriever
    pub session_retriever: Arc<SessionAwareRetriever>,
    /// Optional LLM backend for query expansion
    pub llm: Option<Arc<dyn LanguageModel>>,
    /// Bearer-token table
    pub tokens: Arc<TokenTable>,
}

impl AppState {
    /// Wire the full component graph from settings and a connected store.
    pub fn new(
        settings: Settings,
        store: Arc<QdrantStore>,
        llm: Option<Arc<dyn LanguageModel>>,
    ) -> Self {
        let embedders = Arc::new(EmbedderFactory::new(settings.embedder.clone()));
        let router = Arc::new(RerankerRouter::new(
            settings.reranker.clone(),
            Arc::clone(&embedders),
            llm.clone(),
        ));

        let retriever = Arc::new(SearchRetriever::new(
            store.clone(),
            Arc::clone(&embedders),
            Arc::clone(&router),
            settings.search.clone(),
            settings.qdrant.memory_collection.clone(),
            settings.qdrant.turn_collection.clone(),
        ));

        let session_retriever = Arc::new(SessionAwareRetriever::new(
            store.clone(),
            Arc::clone(&embedders),
            Some(Arc::clone(&router)),
            SessionAwareConfig {
                top_sessions: settings.session.top_sessions,
                turns_per_session: settings.session.turns_per_session,
                final_top_k: settings.session.final_top_k,
                session_score_threshold: settings.session.score_threshold,
                parallel_turn_retrieval: settings.session.parallel_turn_retrieval,
                turn_collection: settings.qdrant.turn_collection.clone(),
                ..Default::default()
            },
        ));

        let tokens = Arc::new(TokenTable::from_entries(&settings.server.auth_tokens));

        Self {
            config: Arc::new(RwLock::new(settings)),
            store,
            embedders,
            router,
            retriever,
            session_retriever,
            llm,
            tokens,
        }
    }
}

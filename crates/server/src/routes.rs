//! HTTP endpoints

use std::time::Instant;

use axum::{
    extract::{Json, Path, State},
    http::header::HeaderValue,
    http::Method,
    routing::{get, post},
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use memsearch_core::{
    DenseEmbedder, Document, IndexedPoint, NamedVectors, SearchError, SearchFilters, SearchQuery,
    SearchResultItem, SparseEmbedder, VectorStore,
};
use memsearch_retrieval::{
    ExpansionStrategy, MultiQueryConfig, MultiQueryRetriever, SessionAwareRetriever,
};

use crate::auth::{auth_middleware, TenantContext};
use crate::error::ApiError;
use crate::metrics::{metrics_handler, record_indexed, record_search, record_search_latency};
use crate::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(&state.config.read().server.cors_origins);

    Router::new()
        // Search endpoints
        .route("/search/query", post(search_query))
        .route("/search/multi-query", post(search_multi_query))
        .route("/search/session-aware", post(search_session_aware))
        .route("/search/embed", post(embed_text))
        .route("/search/index-memory", post(index_memory))
        .route("/search/conflict-candidates", post(conflict_candidates))
        // Admin endpoints
        .route("/admin/:collection_name/recreate", post(recreate_collection))
        // Probes (unauthenticated, never touch the retriever)
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        // Middleware (auth runs before handlers, after CORS)
        .layer(axum::middleware::from_fn(auth_middleware))
        .layer(Extension(state.tokens.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!(origin = %origin, "Invalid CORS origin");
                None
            })
        })
        .collect();

    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Force the authenticated tenant onto the query filters, overriding
/// whatever the client sent.
fn scope_to_tenant(query: &mut SearchQuery, tenant: &TenantContext) {
    match query.filters.as_mut() {
        Some(filters) => filters.tenant_id = tenant.tenant_id.clone(),
        None => query.filters = Some(SearchFilters::for_tenant(tenant.tenant_id.clone())),
    }
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    #[serde(flatten)]
    query: SearchQuery,
    /// Optional collection override ("memories" or "turns")
    #[serde(default)]
    collection: Option<String>,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    results: Vec<SearchResultItem>,
    total: usize,
    took_ms: u64,
}

impl SearchResponse {
    fn new(results: Vec<SearchResultItem>, started: Instant) -> Self {
        Self {
            total: results.len(),
            results,
            took_ms: started.elapsed().as_millis() as u64,
        }
    }
}

async fn search_query(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Json(mut request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let started = Instant::now();
    scope_to_tenant(&mut request.query, &tenant);

    let turn_collection = state.config.read().qdrant.turn_collection.clone();
    let results = match request.collection.as_deref() {
        Some(name) if name == turn_collection => {
            state.retriever.search_turns(&request.query).await?
        }
        Some(name) if name == state.config.read().qdrant.memory_collection => {
            state.retriever.search(&request.query).await?
        }
        Some(other) => {
            return Err(SearchError::InvalidArgument(format!(
                "unknown collection: {other}"
            ))
            .into())
        }
        None => state.retriever.search(&request.query).await?,
    };

    let strategy = request
        .query
        .strategy
        .map(|s| s.to_string())
        .unwrap_or_else(|| "auto".to_string());
    record_search(
        "query",
        &strategy,
        results.iter().any(|r| r.degraded),
    );
    let response = SearchResponse::new(results, started);
    record_search_latency("query", response.took_ms);
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct MultiQueryRequest {
    #[serde(flatten)]
    query: SearchQuery,
    #[serde(default)]
    num_variations: Option<usize>,
    #[serde(default)]
    strategies: Option<Vec<ExpansionStrategy>>,
    #[serde(default)]
    include_original: Option<bool>,
    #[serde(default)]
    rrf_k: Option<u32>,
}

async fn search_multi_query(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Json(mut request): Json<MultiQueryRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let started = Instant::now();
    scope_to_tenant(&mut request.query, &tenant);

    let defaults = state.config.read().multi_query.clone();
    let num_variations = request.num_variations.unwrap_or(defaults.num_variations);
    if !(1..=10).contains(&num_variations) {
        return Err(SearchError::InvalidArgument(format!(
            "num_variations must be between 1 and 10, got {num_variations}"
        ))
        .into());
    }
    let rrf_k = request.rrf_k.unwrap_or(defaults.rrf_k);
    if rrf_k == 0 {
        return Err(SearchError::InvalidArgument("rrf_k must be positive".to_string()).into());
    }

    let mut config = MultiQueryConfig {
        num_variations,
        include_original: request.include_original.unwrap_or(defaults.include_original),
        rrf_k,
        ..Default::default()
    };
    if let Some(strategies) = request.strategies {
        config.strategies = strategies;
    }

    let retriever = MultiQueryRetriever::new(state.retriever.clone(), state.llm.clone(), config);
    let results = retriever.search(&request.query).await?;

    record_search(
        "multi-query",
        "expanded",
        results.iter().any(|r| r.degraded),
    );
    let response = SearchResponse::new(results, started);
    record_search_latency("multi-query", response.took_ms);
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct SessionAwareRequest {
    query: String,
    #[serde(default)]
    top_sessions: Option<usize>,
    #[serde(default)]
    turns_per_session: Option<usize>,
    #[serde(default)]
    final_top_k: Option<usize>,
}

async fn search_session_aware(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Json(request): Json<SessionAwareRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let started = Instant::now();

    let mut config = state.session_retriever.config();
    if let Some(top_sessions) = request.top_sessions {
        config.top_sessions = top_sessions;
    }
    if let Some(turns_per_session) = request.turns_per_session {
        config.turns_per_session = turns_per_session;
    }
    if let Some(final_top_k) = request.final_top_k {
        config.final_top_k = final_top_k;
    }
    if config.top_sessions == 0 || config.final_top_k == 0 {
        return Err(SearchError::InvalidArgument(
            "top_sessions and final_top_k must be at least 1".to_string(),
        )
        .into());
    }

    let retriever = SessionAwareRetriever::new(
        state.store.clone(),
        state.embedders.clone(),
        Some(state.router.clone()),
        config,
    );

    let query = SearchQuery::new(request.query)
        .with_filters(SearchFilters::for_tenant(tenant.tenant_id.clone()));
    let results = retriever.retrieve(&query).await?;

    record_search(
        "session-aware",
        "hierarchical",
        results.iter().any(|r| r.degraded),
    );
    let response = SearchResponse::new(results, started);
    record_search_latency("session-aware", response.took_ms);
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct EmbedRequest {
    text: String,
    embedder_type: EmbedderType,
    #[serde(default)]
    is_query: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum EmbedderType {
    Text,
    Code,
    Sparse,
}

#[derive(Debug, Serialize)]
struct EmbedResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    embedding: Option<Vec<f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    indices: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    values: Option<Vec<f32>>,
    dimensions: usize,
    took_ms: u64,
}

async fn embed_text(
    State(state): State<AppState>,
    Json(request): Json<EmbedRequest>,
) -> Result<Json<EmbedResponse>, ApiError> {
    let started = Instant::now();

    let response = match request.embedder_type {
        EmbedderType::Text | EmbedderType::Code => {
            let embedder = match request.embedder_type {
                EmbedderType::Text => state.embedders.get_text_embedder().await?,
                _ => state.embedders.get_code_embedder().await?,
            };
            let embedding = if request.is_query {
                embedder.embed_query(&request.text).await?
            } else {
                let texts = [request.text.clone()];
                embedder
                    .embed_documents(&texts)
                    .await?
                    .into_iter()
                    .next()
                    .unwrap_or_default()
            };
            EmbedResponse {
                dimensions: embedding.len(),
                embedding: Some(embedding),
                indices: None,
                values: None,
                took_ms: started.elapsed().as_millis() as u64,
            }
        }
        EmbedderType::Sparse => {
            let embedder = state.embedders.get_sparse_embedder().await?;
            let text = request.text.clone();
            let vector =
                tokio::task::spawn_blocking(move || embedder.embed_query(&text))
                    .await
                    .map_err(|e| {
                        SearchError::EmbedderUnavailable(format!("sparse task failed: {e}"))
                    })??;
            EmbedResponse {
                dimensions: vector.len(),
                embedding: None,
                indices: Some(vector.indices),
                values: Some(vector.values),
                took_ms: started.elapsed().as_millis() as u64,
            }
        }
    };

    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct IndexMemoryResponse {
    id: String,
    indexed: bool,
    took_ms: u64,
}

async fn index_memory(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Json(mut document): Json<Document>,
) -> Result<Json<IndexMemoryResponse>, ApiError> {
    let started = Instant::now();

    if document.content.is_empty() {
        return Err(SearchError::InvalidArgument("content must not be empty".to_string()).into());
    }
    if document.id.is_empty() {
        document.id = Uuid::new_v4().to_string();
    }
    document.tenant_id = tenant.tenant_id.clone();

    let dense = state
        .embedders
        .get_text_embedder()
        .await?
        .embed_query(&document.content)
        .await?;

    let mut vectors = NamedVectors::default().with_dense("text_dense", dense);
    match state.embedders.get_sparse_embedder().await {
        Ok(embedder) => {
            let content = document.content.clone();
            let sparse = tokio::task::spawn_blocking(move || embedder.embed_query(&content))
                .await
                .map_err(|e| {
                    SearchError::EmbedderUnavailable(format!("sparse task failed: {e}"))
                })??;
            vectors = vectors.with_sparse("text_sparse", sparse);
        }
        Err(SearchError::EmbedderUnavailable(reason)) => {
            tracing::debug!(reason, "Indexing memory without sparse vector");
        }
        Err(err) => return Err(err.into()),
    }

    let mut payload = document.metadata.clone();
    payload.insert("content".to_string(), document.content.clone().into());
    payload.insert("tenant_id".to_string(), document.tenant_id.clone().into());
    if let Some(ref session_id) = document.session_id {
        payload.insert("session_id".to_string(), session_id.clone().into());
    }

    let collection = state.config.read().qdrant.memory_collection.clone();
    state
        .store
        .upsert(
            &collection,
            vec![IndexedPoint {
                id: document.id.clone(),
                vectors,
                payload,
            }],
        )
        .await?;

    record_indexed(1);
    Ok(Json(IndexMemoryResponse {
        id: document.id,
        indexed: true,
        took_ms: started.elapsed().as_millis() as u64,
    }))
}

#[derive(Debug, Deserialize)]
struct ConflictCandidatesRequest {
    content: String,
    #[serde(default)]
    project: Option<String>,
}

async fn conflict_candidates(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Json(request): Json<ConflictCandidatesRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let started = Instant::now();

    let results = state
        .retriever
        .conflict_candidates(
            &request.content,
            &tenant.tenant_id,
            request.project.as_deref(),
        )
        .await?;

    Ok(Json(SearchResponse::new(results, started)))
}

#[derive(Debug, Serialize)]
struct RecreateResponse {
    collection: String,
    recreated: bool,
}

async fn recreate_collection(
    State(state): State<AppState>,
    Path(collection_name): Path<String>,
) -> Result<Json<RecreateResponse>, ApiError> {
    state.store.recreate_collection(&collection_name).await?;
    Ok(Json(RecreateResponse {
        collection: collection_name,
        recreated: true,
    }))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn readiness_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ready",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

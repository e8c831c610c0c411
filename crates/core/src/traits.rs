//! Trait seams for pluggable backends
//!
//! The service talks to all of its collaborators through these traits so the
//! retrieval pipeline can be exercised with stub implementations in tests.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::ConsumerStatus;
use crate::vectors::{IndexedPoint, MultiVec, Prefetch, RankedPoint, SparseVec, StoreFilter};

/// Narrow facade over the vector store.
///
/// Collections and vector names are passed positionally and never inferred.
/// Operations fail with `StoreUnavailable` (connection/timeout) or
/// `StoreRejected` (invalid filter or name); retries are the caller's policy.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create or replace indexed points.
    async fn upsert(&self, collection: &str, points: Vec<IndexedPoint>) -> Result<()>;

    /// Single dense-vector retrieval.
    async fn query(
        &self,
        collection: &str,
        vector_name: &str,
        vector: Vec<f32>,
        filter: &StoreFilter,
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<RankedPoint>>;

    /// Single sparse-vector retrieval.
    async fn query_sparse(
        &self,
        collection: &str,
        field: &str,
        vector: SparseVec,
        filter: &StoreFilter,
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<RankedPoint>>;

    /// Server-side RRF fusion over prefetch sub-retrievals. Scores are
    /// rank-derived, so no threshold parameter exists here by design of the
    /// interface.
    async fn fuse(
        &self,
        collection: &str,
        prefetches: Vec<Prefetch>,
        filter: &StoreFilter,
        limit: usize,
    ) -> Result<Vec<RankedPoint>>;
}

/// Dense (fixed-length) embedding backend.
#[async_trait]
pub trait DenseEmbedder: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    fn dim(&self) -> usize;
}

/// Sparse term-weight embedding backend.
///
/// Term-weight generation is CPU-bound and blocking; callers move it onto a
/// worker pool (`spawn_blocking`) rather than awaiting it on the scheduler.
pub trait SparseEmbedder: Send + Sync {
    fn embed_query(&self, text: &str) -> Result<SparseVec>;
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<SparseVec>>;
}

/// Late-interaction (per-token matrix) embedding backend.
#[async_trait]
pub trait MultiVectorEmbedder: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<MultiVec>;
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<MultiVec>>;
}

/// One reranked candidate, tied back to its position in the input slice.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedDocument {
    pub original_index: usize,
    pub score: f32,
}

/// A single reranker tier implementation.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Score `documents` against `query` and return at most `top_k` entries
    /// sorted by score descending.
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_k: usize,
    ) -> Result<Vec<RankedDocument>>;

    /// Cost of one call in cents, for the rate-limit gate. Zero for local
    /// tiers.
    fn cost_cents(&self, _documents: usize) -> f64 {
        0.0
    }
}

/// Token usage reported by a language-model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A prompt-completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: usize,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            max_tokens: 1024,
            temperature: 0.0,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// A completed language-model response with usage accounting.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

/// Language-model backend used for query expansion and listwise reranking.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;
}

/// Publish-only side channel for consumer lifecycle events. Every publish is
/// best-effort: failures are logged by callers, never propagated.
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn publish_consumer_status(
        &self,
        status: ConsumerStatus,
        group_id: &str,
        service_id: &str,
    ) -> Result<()>;
}

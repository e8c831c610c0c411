//! Core traits and types for the memsearch retrieval service
//!
//! This crate provides the foundational pieces shared by every other crate:
//! - Typed error taxonomy with graceful-degradation classes
//! - Document and search entities (queries, filters, result items)
//! - Vector types (dense, sparse, multi-vector) and indexed points
//! - Trait seams for the pluggable backends (vector store, embedders,
//!   rerankers, language model, status publisher)

pub mod document;
pub mod error;
pub mod traits;
pub mod types;
pub mod vectors;

pub use document::{assemble_turn_content, Document};
pub use error::{RateLimitKind, Result, SearchError};
pub use traits::{
    Completion, CompletionRequest, DenseEmbedder, LanguageModel, MultiVectorEmbedder,
    RankedDocument, Reranker, SparseEmbedder, StatusPublisher, TokenUsage, VectorStore,
};
pub use types::{
    sort_results, ConsumerStatus, Payload, QueryComplexity, RerankerTier, SearchFilters,
    SearchQuery, SearchResultItem, SearchStrategy, TimeRange,
};
pub use vectors::{
    FieldCondition, IndexedPoint, MultiVec, NamedVectors, Prefetch, QueryVector, RankedPoint,
    SparseVec, StoreFilter,
};

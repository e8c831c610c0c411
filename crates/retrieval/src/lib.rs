//! Retrieval pipeline with hybrid search and multi-tier reranking
//!
//! Features:
//! - Dense, sparse, and hybrid (server-side RRF) retrieval over Qdrant
//! - Automatic strategy selection via a lexical query classifier
//! - Multi-tier reranking with timeout, rate limiting, and graceful
//!   degradation
//! - LLM-driven query expansion with client-side RRF fusion
//! - Two-stage session-aware hierarchical retrieval
//! - Session aggregation and content deduplication post-processing

pub mod classifier;
pub mod constants;
pub mod multi_query;
pub mod postprocess;
pub mod rerank;
pub mod retriever;
pub mod session_aware;
pub mod store;

pub use classifier::{Classification, QueryClassifier, QueryFeatures};
pub use multi_query::{
    rrf_fusion, ExpansionStrategy, MultiQueryConfig, MultiQueryRetriever, UsageTotals,
};
pub use postprocess::{aggregate_by_session, deduplicate_results};
pub use rerank::{
    HourlyRateLimiter, LlmReranker, RateLimitUsage, RerankOutcome, RerankerRouter,
};
pub use retriever::{build_store_filter, SearchRetriever, TargetCollection};
pub use session_aware::{SessionAwareConfig, SessionAwareRetriever, SessionMatch};
pub use store::{QdrantStore, StoreConfig};

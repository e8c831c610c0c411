//! Embedding backends and the lazy embedder factory
//!
//! Features:
//! - Feature-hash dense embeddings for text and code fields
//! - Sparse term-weight embeddings built on tantivy's analyzer pipeline
//! - Per-token multi-vector embeddings for late interaction (optional)
//! - Lazy, cached factory: each kind is constructed once on first use and
//!   shared across concurrent callers

pub mod colbert;
pub mod dense;
pub mod factory;
pub mod sparse;

pub use colbert::TokenHashMultiEmbedder;
pub use dense::{DenseEmbedderConfig, HashDenseEmbedder, TextField};
pub use factory::{EmbedderFactory, EmbedderKind};
pub use sparse::TermWeightEmbedder;

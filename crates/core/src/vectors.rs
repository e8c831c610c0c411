//! Vector types and store-facing point/filter structures
//!
//! These are the neutral shapes exchanged with the vector store behind the
//! `VectorStore` trait; the concrete client converts them to its wire types.

use serde::{Deserialize, Serialize};

use crate::types::Payload;

/// Term-weight map in parallel-array form (index -> weight).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVec {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVec {
    pub fn new(indices: Vec<u32>, values: Vec<f32>) -> Self {
        debug_assert_eq!(indices.len(), values.len());
        Self { indices, values }
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }
}

/// Per-token embedding matrix for late-interaction retrieval.
pub type MultiVec = Vec<Vec<f32>>;

/// A query-side vector for one retrieval branch.
#[derive(Debug, Clone)]
pub enum QueryVector {
    Dense(Vec<f32>),
    Sparse(SparseVec),
}

/// Named vectors attached to an indexed point.
#[derive(Debug, Clone, Default)]
pub struct NamedVectors {
    pub dense: Vec<(String, Vec<f32>)>,
    pub sparse: Vec<(String, SparseVec)>,
    pub multi: Vec<(String, MultiVec)>,
}

impl NamedVectors {
    pub fn with_dense(mut self, name: impl Into<String>, vector: Vec<f32>) -> Self {
        self.dense.push((name.into(), vector));
        self
    }

    pub fn with_sparse(mut self, name: impl Into<String>, vector: SparseVec) -> Self {
        self.sparse.push((name.into(), vector));
        self
    }

    pub fn with_multi(mut self, name: impl Into<String>, vectors: MultiVec) -> Self {
        self.multi.push((name.into(), vectors));
        self
    }
}

/// A point to upsert: id, named vectors, payload.
#[derive(Debug, Clone)]
pub struct IndexedPoint {
    pub id: String,
    pub vectors: NamedVectors,
    pub payload: Payload,
}

/// A ranked hit coming back from the store. Non-string ids are stringified
/// at the client boundary.
#[derive(Debug, Clone)]
pub struct RankedPoint {
    pub id: String,
    pub score: f32,
    pub payload: Payload,
}

/// One sub-retrieval inside a fused query.
#[derive(Debug, Clone)]
pub struct Prefetch {
    pub field: String,
    pub vector: QueryVector,
    pub limit: usize,
}

/// A single field condition inside a store filter conjunction.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldCondition {
    /// Exact keyword match
    Eq { key: String, value: serde_json::Value },
    /// Inclusive range over a numeric field
    Range {
        key: String,
        gte: Option<i64>,
        lte: Option<i64>,
        gt: Option<i64>,
    },
}

/// Conjunction (`must`) of field conditions dispatched with every store
/// query. The tenant equality is always the first condition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreFilter {
    pub must: Vec<FieldCondition>,
}

impl StoreFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.must.push(FieldCondition::Eq {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Find the tenant equality condition, if present.
    pub fn tenant_id(&self) -> Option<&str> {
        self.must.iter().find_map(|c| match c {
            FieldCondition::Eq { key, value } if key == "tenant_id" => value.as_str(),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_vec_len() {
        let v = SparseVec::new(vec![1, 5, 9], vec![0.5, 0.2, 0.1]);
        assert_eq!(v.len(), 3);
        assert!(!v.is_empty());
    }

    #[test]
    fn test_store_filter_tenant_lookup() {
        let filter = StoreFilter::new()
            .eq("tenant_id", "t1")
            .eq("type", "turn");
        assert_eq!(filter.tenant_id(), Some("t1"));
        assert_eq!(filter.must.len(), 2);
    }

    #[test]
    fn test_named_vectors_builder() {
        let vectors = NamedVectors::default()
            .with_dense("turn_dense", vec![0.1, 0.2])
            .with_sparse("turn_sparse", SparseVec::new(vec![3], vec![1.0]));
        assert_eq!(vectors.dense.len(), 1);
        assert_eq!(vectors.sparse[0].0, "turn_sparse");
    }
}

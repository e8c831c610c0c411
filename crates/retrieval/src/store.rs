//! Vector store client over Qdrant
//!
//! Thin typed facade implementing the `VectorStore` trait: upsert,
//! single-vector query, sparse query, and prefetch+RRF fusion. Also owns the
//! canonical collection schemas used by the admin recreate endpoint.

use qdrant_client::qdrant::{
    value::Kind, Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, Distance,
    FieldType, Filter, Fusion, MultiVectorComparator, MultiVectorConfig, NamedVectors, PointStruct,
    PrefetchQueryBuilder, Query, QueryPointsBuilder, Range, ScoredPoint,
    SparseVectorParamsBuilder, SparseVectorsConfigBuilder, Vector, VectorInput,
    VectorParamsBuilder, VectorsConfigBuilder,
};
use qdrant_client::{Payload as QdrantPayload, Qdrant, QdrantError};

use async_trait::async_trait;

use memsearch_config::QdrantSettings;
use memsearch_core::{
    FieldCondition, IndexedPoint, Payload, Prefetch, QueryVector, RankedPoint, Result,
    SearchError, SparseVec, StoreFilter, VectorStore,
};

use crate::constants::{
    CODE_DENSE_FIELD, TEXT_COLBERT_FIELD, TEXT_DENSE_FIELD, TEXT_SPARSE_FIELD, TURN_COLBERT_FIELD,
    TURN_DENSE_FIELD, TURN_SPARSE_FIELD,
};

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Qdrant endpoint
    pub endpoint: String,
    /// API key (optional)
    pub api_key: Option<String>,
    /// Memory collection name
    pub memory_collection: String,
    /// Turn collection name
    pub turn_collection: String,
    /// Dense vector dimension
    pub dense_dim: u64,
    /// Late-interaction vector dimension
    pub colbert_dim: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:6334".to_string(),
            api_key: None,
            memory_collection: "memories".to_string(),
            turn_collection: "turns".to_string(),
            dense_dim: 384,
            colbert_dim: 128,
        }
    }
}

impl StoreConfig {
    pub fn from_settings(settings: &QdrantSettings, dense_dim: usize) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            api_key: settings.api_key.clone(),
            memory_collection: settings.memory_collection.clone(),
            turn_collection: settings.turn_collection.clone(),
            dense_dim: dense_dim as u64,
            colbert_dim: 128,
        }
    }
}

/// Qdrant-backed vector store client
pub struct QdrantStore {
    client: Qdrant,
    config: StoreConfig,
}

impl QdrantStore {
    /// Connect to Qdrant.
    pub fn new(config: StoreConfig) -> Result<Self> {
        let mut builder = Qdrant::from_url(&config.endpoint);

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
            tracing::info!("Qdrant connection using API key authentication");
        }

        let client = builder
            .build()
            .map_err(|e| SearchError::StoreUnavailable(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Whether a collection name belongs to the known set.
    pub fn is_known_collection(&self, name: &str) -> bool {
        name == self.config.memory_collection || name == self.config.turn_collection
    }

    /// Drop and recreate a known collection with its canonical schema and
    /// payload indices. Unknown names are an `InvalidArgument`.
    pub async fn recreate_collection(&self, name: &str) -> Result<()> {
        if !self.is_known_collection(name) {
            return Err(SearchError::InvalidArgument(format!(
                "unknown collection: {name}"
            )));
        }

        let exists = self
            .client
            .collection_exists(name)
            .await
            .map_err(map_store_error)?;
        if exists {
            self.client
                .delete_collection(name)
                .await
                .map_err(map_store_error)?;
        }

        if name == self.config.turn_collection {
            self.create_turn_collection().await?;
        } else {
            self.create_memory_collection().await?;
        }

        tracing::info!(collection = name, "Recreated collection");
        Ok(())
    }

    /// Create any known collection that does not exist yet.
    pub async fn ensure_collections(&self) -> Result<()> {
        for name in [
            self.config.memory_collection.clone(),
            self.config.turn_collection.clone(),
        ] {
            let exists = self
                .client
                .collection_exists(&name)
                .await
                .map_err(map_store_error)?;
            if !exists {
                if name == self.config.turn_collection {
                    self.create_turn_collection().await?;
                } else {
                    self.create_memory_collection().await?;
                }
                tracing::info!(collection = %name, "Created collection");
            }
        }
        Ok(())
    }

    async fn create_turn_collection(&self) -> Result<()> {
        let name = &self.config.turn_collection;

        let mut vectors = VectorsConfigBuilder::default();
        vectors.add_named_vector_params(
            TURN_DENSE_FIELD,
            VectorParamsBuilder::new(self.config.dense_dim, Distance::Cosine),
        );
        vectors.add_named_vector_params(
            TURN_COLBERT_FIELD,
            VectorParamsBuilder::new(self.config.colbert_dim, Distance::Cosine)
                .multivector_config(MultiVectorConfig {
                    comparator: MultiVectorComparator::MaxSim as i32,
                }),
        );

        let mut sparse = SparseVectorsConfigBuilder::default();
        sparse.add_named_vector_params(TURN_SPARSE_FIELD, SparseVectorParamsBuilder::default());

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(vectors)
                    .sparse_vectors_config(sparse),
            )
            .await
            .map_err(map_store_error)?;

        for (field, field_type) in [
            ("tenant_id", FieldType::Keyword),
            ("session_id", FieldType::Keyword),
            ("type", FieldType::Keyword),
            ("timestamp", FieldType::Integer),
        ] {
            self.client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    name, field, field_type,
                ))
                .await
                .map_err(map_store_error)?;
        }

        Ok(())
    }

    async fn create_memory_collection(&self) -> Result<()> {
        let name = &self.config.memory_collection;

        let mut vectors = VectorsConfigBuilder::default();
        vectors.add_named_vector_params(
            TEXT_DENSE_FIELD,
            VectorParamsBuilder::new(self.config.dense_dim, Distance::Cosine),
        );
        vectors.add_named_vector_params(
            CODE_DENSE_FIELD,
            VectorParamsBuilder::new(self.config.dense_dim, Distance::Cosine),
        );
        vectors.add_named_vector_params(
            TEXT_COLBERT_FIELD,
            VectorParamsBuilder::new(self.config.colbert_dim, Distance::Cosine)
                .multivector_config(MultiVectorConfig {
                    comparator: MultiVectorComparator::MaxSim as i32,
                }),
        );

        let mut sparse = SparseVectorsConfigBuilder::default();
        sparse.add_named_vector_params(TEXT_SPARSE_FIELD, SparseVectorParamsBuilder::default());

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(vectors)
                    .sparse_vectors_config(sparse),
            )
            .await
            .map_err(map_store_error)?;

        for (field, field_type) in [
            ("tenant_id", FieldType::Keyword),
            ("project", FieldType::Keyword),
            ("type", FieldType::Keyword),
            ("vt_end", FieldType::Integer),
            ("timestamp", FieldType::Integer),
        ] {
            self.client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    name, field, field_type,
                ))
                .await
                .map_err(map_store_error)?;
        }

        Ok(())
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn upsert(&self, collection: &str, points: Vec<IndexedPoint>) -> Result<()> {
        let points: Vec<PointStruct> = points.into_iter().map(to_point_struct).collect();

        self.client
            .upsert_points(qdrant_client::qdrant::UpsertPointsBuilder::new(
                collection, points,
            ))
            .await
            .map_err(map_store_error)?;

        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        vector_name: &str,
        vector: Vec<f32>,
        filter: &StoreFilter,
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<RankedPoint>> {
        let mut builder = QueryPointsBuilder::new(collection)
            .query(Query::new_nearest(vector))
            .using(vector_name)
            .limit(limit as u64)
            .with_payload(true)
            .filter(to_qdrant_filter(filter));

        if let Some(threshold) = score_threshold {
            builder = builder.score_threshold(threshold);
        }

        let response = self.client.query(builder).await.map_err(map_store_error)?;
        Ok(response.result.into_iter().map(to_ranked_point).collect())
    }

    async fn query_sparse(
        &self,
        collection: &str,
        field: &str,
        vector: SparseVec,
        filter: &StoreFilter,
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<RankedPoint>> {
        let mut builder = QueryPointsBuilder::new(collection)
            .query(Query::new_nearest(VectorInput::new_sparse(
                vector.indices,
                vector.values,
            )))
            .using(field)
            .limit(limit as u64)
            .with_payload(true)
            .filter(to_qdrant_filter(filter));

        if let Some(threshold) = score_threshold {
            builder = builder.score_threshold(threshold);
        }

        let response = self.client.query(builder).await.map_err(map_store_error)?;
        Ok(response.result.into_iter().map(to_ranked_point).collect())
    }

    async fn fuse(
        &self,
        collection: &str,
        prefetches: Vec<Prefetch>,
        filter: &StoreFilter,
        limit: usize,
    ) -> Result<Vec<RankedPoint>> {
        let mut builder = QueryPointsBuilder::new(collection)
            .query(Query::new_fusion(Fusion::Rrf))
            .limit(limit as u64)
            .with_payload(true)
            .filter(to_qdrant_filter(filter));

        for prefetch in prefetches {
            let query = match prefetch.vector {
                QueryVector::Dense(v) => Query::new_nearest(v),
                QueryVector::Sparse(v) => {
                    Query::new_nearest(VectorInput::new_sparse(v.indices, v.values))
                }
            };
            builder = builder.add_prefetch(
                PrefetchQueryBuilder::default()
                    .query(query)
                    .using(prefetch.field)
                    .limit(prefetch.limit as u64),
            );
        }

        let response = self.client.query(builder).await.map_err(map_store_error)?;
        Ok(response.result.into_iter().map(to_ranked_point).collect())
    }
}

fn to_point_struct(point: IndexedPoint) -> PointStruct {
    let mut vectors = NamedVectors::default();
    for (name, vector) in point.vectors.dense {
        vectors = vectors.add_vector(name, Vector::new_dense(vector));
    }
    for (name, vector) in point.vectors.sparse {
        vectors = vectors.add_vector(name, Vector::new_sparse(vector.indices, vector.values));
    }
    for (name, matrix) in point.vectors.multi {
        vectors = vectors.add_vector(name, Vector::new_multi(matrix));
    }

    let payload = QdrantPayload::try_from(serde_json::Value::Object(point.payload))
        .unwrap_or_else(|_| QdrantPayload::new());

    PointStruct::new(point.id, vectors, payload)
}

fn to_ranked_point(point: ScoredPoint) -> RankedPoint {
    let id = point
        .id
        .and_then(|pid| pid.point_id_options)
        .map(|options| match options {
            qdrant_client::qdrant::point_id::PointIdOptions::Uuid(u) => u,
            qdrant_client::qdrant::point_id::PointIdOptions::Num(n) => n.to_string(),
        })
        .unwrap_or_default();

    let mut payload = Payload::new();
    for (key, value) in point.payload {
        payload.insert(key, qdrant_value_to_json(value));
    }

    RankedPoint {
        id,
        score: point.score,
        payload,
    }
}

fn qdrant_value_to_json(value: qdrant_client::qdrant::Value) -> serde_json::Value {
    match value.kind {
        Some(Kind::NullValue(_)) | None => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::IntegerValue(i)) => serde_json::Value::from(i),
        Some(Kind::DoubleValue(d)) => {
            serde_json::Number::from_f64(d).map_or(serde_json::Value::Null, serde_json::Value::Number)
        }
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.into_iter().map(qdrant_value_to_json).collect())
        }
        Some(Kind::StructValue(map)) => serde_json::Value::Object(
            map.fields
                .into_iter()
                .map(|(k, v)| (k, qdrant_value_to_json(v)))
                .collect(),
        ),
    }
}

fn to_qdrant_filter(filter: &StoreFilter) -> Filter {
    let mut conditions = Vec::with_capacity(filter.must.len());

    for condition in &filter.must {
        match condition {
            FieldCondition::Eq { key, value } => {
                let condition = match value {
                    serde_json::Value::String(s) => Condition::matches(key.clone(), s.clone()),
                    serde_json::Value::Bool(b) => Condition::matches(key.clone(), *b),
                    serde_json::Value::Number(n) => {
                        Condition::matches(key.clone(), n.as_i64().unwrap_or_default())
                    }
                    other => Condition::matches(key.clone(), other.to_string()),
                };
                conditions.push(condition);
            }
            FieldCondition::Range { key, gte, lte, gt } => {
                conditions.push(Condition::range(
                    key.clone(),
                    Range {
                        gte: gte.map(|v| v as f64),
                        lte: lte.map(|v| v as f64),
                        gt: gt.map(|v| v as f64),
                        lt: None,
                    },
                ));
            }
        }
    }

    Filter::must(conditions)
}

fn map_store_error(err: QdrantError) -> SearchError {
    match err {
        QdrantError::ResponseError { status } => {
            // Connection-class grpc codes are retryable; structural
            // rejections are not
            let code = format!("{:?}", status.code());
            match code.as_str() {
                "Unavailable" | "DeadlineExceeded" | "Cancelled" => {
                    SearchError::StoreUnavailable(status.to_string())
                }
                _ => SearchError::StoreRejected(status.to_string()),
            }
        }
        QdrantError::Io(e) => SearchError::StoreUnavailable(e.to_string()),
        other => SearchError::StoreRejected(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_collections() {
        let config = StoreConfig::default();
        assert_eq!(config.memory_collection, "memories");
        assert_eq!(config.turn_collection, "turns");
    }

    #[test]
    fn test_filter_conversion_preserves_order() {
        let filter = StoreFilter::new()
            .eq("tenant_id", "t1")
            .eq("type", "turn");
        let qdrant_filter = to_qdrant_filter(&filter);
        assert_eq!(qdrant_filter.must.len(), 2);
    }

    #[test]
    fn test_qdrant_value_conversion() {
        use qdrant_client::qdrant::Value;

        let value = Value {
            kind: Some(Kind::StringValue("hello".to_string())),
        };
        assert_eq!(qdrant_value_to_json(value), serde_json::json!("hello"));

        let value = Value {
            kind: Some(Kind::IntegerValue(42)),
        };
        assert_eq!(qdrant_value_to_json(value), serde_json::json!(42));
    }
}

//! Turn-level document indexing
//!
//! Indexes complete conversation turns (user + assistant + reasoning) as
//! multi-vector points: dense always, sparse and late-interaction when
//! enabled. Embedding kinds run in parallel per batch and stay aligned with
//! their documents.

use std::sync::Arc;

use serde_json::Value;

use memsearch_core::{
    assemble_turn_content, DenseEmbedder, Document, IndexedPoint, MultiVec, MultiVectorEmbedder,
    NamedVectors, Result, SearchError, SparseEmbedder, SparseVec, VectorStore,
};
use memsearch_embedders::EmbedderFactory;

/// Turn indexer configuration.
#[derive(Debug, Clone)]
pub struct TurnsIndexerConfig {
    /// Target collection
    pub collection_name: String,
    /// Dense vector field
    pub dense_vector_name: String,
    /// Sparse vector field
    pub sparse_vector_name: String,
    /// Late-interaction vector field
    pub colbert_vector_name: String,
    /// Generate sparse embeddings
    pub enable_sparse: bool,
    /// Generate late-interaction embeddings
    pub enable_colbert: bool,
}

impl Default for TurnsIndexerConfig {
    fn default() -> Self {
        Self {
            collection_name: "turns".to_string(),
            dense_vector_name: "turn_dense".to_string(),
            sparse_vector_name: "turn_sparse".to_string(),
            colbert_vector_name: "turn_colbert".to_string(),
            enable_sparse: true,
            enable_colbert: false,
        }
    }
}

/// Indexes turn documents with multi-vector embeddings.
pub struct TurnsIndexer {
    store: Arc<dyn VectorStore>,
    embedders: Arc<EmbedderFactory>,
    config: TurnsIndexerConfig,
}

impl TurnsIndexer {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedders: Arc<EmbedderFactory>,
        config: TurnsIndexerConfig,
    ) -> Self {
        Self {
            store,
            embedders,
            config,
        }
    }

    /// Index a batch of turn documents.
    ///
    /// Returns the number of upserted points; a failed batch is logged and
    /// counted as zero (the stream redelivery policy governs retries).
    pub async fn index_documents(&self, documents: Vec<Document>) -> usize {
        if documents.is_empty() {
            return 0;
        }

        tracing::info!(count = documents.len(), "Indexing turn document batch");

        match self.embed_and_upsert(&documents).await {
            Ok(count) => {
                tracing::info!(count, "Indexed turn documents");
                count
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to index turn batch");
                0
            }
        }
    }

    async fn embed_and_upsert(&self, documents: &[Document]) -> Result<usize> {
        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();

        let dense_embedder = self.embedders.get_text_embedder().await?;

        // The three embedding kinds run in parallel; each output stays
        // index-aligned with its document.
        let (dense, sparse, colbert) = tokio::join!(
            dense_embedder.embed_documents(&texts),
            self.embed_sparse_batch(&texts),
            self.embed_colbert_batch(&texts),
        );
        let dense = dense?;
        let sparse = sparse?;
        let colbert = colbert?;

        let points: Vec<IndexedPoint> = documents
            .iter()
            .enumerate()
            .map(|(i, doc)| {
                self.build_point(
                    doc,
                    dense[i].clone(),
                    sparse.as_ref().map(|s| s[i].clone()),
                    colbert.as_ref().and_then(|c| {
                        let rows = c[i].clone();
                        (!rows.is_empty()).then_some(rows)
                    }),
                )
            })
            .collect();

        let count = points.len();
        self.store
            .upsert(&self.config.collection_name, points)
            .await?;
        Ok(count)
    }

    /// Sparse embeddings for the batch, or `None` when disabled. Term
    /// weighting is blocking and runs on the worker pool.
    async fn embed_sparse_batch(&self, texts: &[String]) -> Result<Option<Vec<SparseVec>>> {
        if !self.config.enable_sparse {
            return Ok(None);
        }
        let embedder = match self.embedders.get_sparse_embedder().await {
            Ok(embedder) => embedder,
            Err(SearchError::EmbedderUnavailable(reason)) => {
                tracing::warn!(reason, "Sparse embedder unavailable, indexing dense-only");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let texts = texts.to_vec();
        let vectors = tokio::task::spawn_blocking(move || {
            SparseEmbedder::embed_documents(embedder.as_ref(), &texts)
        })
        .await
        .map_err(|e| SearchError::EmbedderUnavailable(format!("sparse batch task failed: {e}")))??;

        Ok(Some(vectors))
    }

    /// Late-interaction embeddings for the batch, or `None` when disabled.
    async fn embed_colbert_batch(&self, texts: &[String]) -> Result<Option<Vec<MultiVec>>> {
        if !self.config.enable_colbert {
            return Ok(None);
        }
        let embedder = match self.embedders.get_multi_vector_embedder().await {
            Ok(embedder) => embedder,
            Err(SearchError::EmbedderUnavailable(reason)) => {
                tracing::warn!(reason, "Multi-vector embedder unavailable, skipping colbert field");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        Ok(Some(embedder.embed_documents(texts).await?))
    }

    fn build_point(
        &self,
        doc: &Document,
        dense: Vec<f32>,
        sparse: Option<SparseVec>,
        colbert: Option<MultiVec>,
    ) -> IndexedPoint {
        let mut vectors =
            NamedVectors::default().with_dense(self.config.dense_vector_name.clone(), dense);
        if let Some(sparse) = sparse {
            vectors = vectors.with_sparse(self.config.sparse_vector_name.clone(), sparse);
        }
        if let Some(colbert) = colbert {
            vectors = vectors.with_multi(self.config.colbert_vector_name.clone(), colbert);
        }

        let mut payload = doc.metadata.clone();
        payload.insert("content".to_string(), doc.content.clone().into());
        payload.insert("tenant_id".to_string(), doc.tenant_id.clone().into());
        if let Some(ref session_id) = doc.session_id {
            payload.insert("session_id".to_string(), session_id.clone().into());
        }

        IndexedPoint {
            id: doc.id.clone(),
            vectors,
            payload,
        }
    }
}

/// Parse a turn-finalized event into a turn document.
///
/// Required: non-empty `id`, non-empty `tenant_id`, and at least one of the
/// content parts. Anything else is a `ParseError`; the consumer logs and
/// drops those messages.
pub fn parse_turn_finalized(data: &Value) -> Result<Document> {
    let id = data
        .get("id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SearchError::ParseError("missing turn id".to_string()))?;

    let tenant_id = data
        .get("tenant_id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            SearchError::ParseError(format!(
                "missing tenant_id in turn_finalized event {id}"
            ))
        })?;

    let str_field = |key: &str| -> &str {
        data.get(key).and_then(Value::as_str).unwrap_or_default()
    };
    let user_content = str_field("user_content");
    let assistant_content = str_field("assistant_content");
    let reasoning_preview = str_field("reasoning_preview");

    let content = assemble_turn_content(user_content, assistant_content, reasoning_preview);
    if content.is_empty() {
        return Err(SearchError::ParseError(format!(
            "no content in turn_finalized event {id}"
        )));
    }

    let mut metadata = memsearch_core::Payload::new();
    metadata.insert("type".to_string(), "turn".into());
    metadata.insert(
        "sequence_index".to_string(),
        data.get("sequence_index").cloned().unwrap_or(0.into()),
    );
    metadata.insert(
        "tool_calls".to_string(),
        data.get("tool_calls")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new())),
    );
    metadata.insert(
        "files_touched".to_string(),
        data.get("files_touched")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new())),
    );
    metadata.insert("has_code".to_string(), content.contains("```").into());
    metadata.insert(
        "has_reasoning".to_string(),
        (!reasoning_preview.is_empty()).into(),
    );
    metadata.insert(
        "input_tokens".to_string(),
        data.get("input_tokens").cloned().unwrap_or(0.into()),
    );
    metadata.insert(
        "output_tokens".to_string(),
        data.get("output_tokens").cloned().unwrap_or(0.into()),
    );
    metadata.insert(
        "timestamp".to_string(),
        data.get("timestamp").cloned().unwrap_or(0.into()),
    );

    let mut document = Document::new(id, content, tenant_id);
    document.metadata = metadata;
    document.session_id = data
        .get("session_id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(document)
}

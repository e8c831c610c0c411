//! Late-interaction multi-vector embeddings
//!
//! One small dense vector per token, capped at `max_tokens`. Similarity is
//! computed by the store (or the colbert reranker tier) as sum-of-max over
//! rows.

use async_trait::async_trait;

use memsearch_core::{MultiVec, MultiVectorEmbedder, Result};

use crate::dense::{DenseEmbedderConfig, HashDenseEmbedder, TextField};

/// Per-token feature-hash embedder.
pub struct TokenHashMultiEmbedder {
    token_embedder: HashDenseEmbedder,
    max_tokens: usize,
}

impl TokenHashMultiEmbedder {
    pub fn new(dim: usize, max_tokens: usize) -> Self {
        Self {
            token_embedder: HashDenseEmbedder::new(DenseEmbedderConfig {
                dim,
                normalize: true,
                field: TextField::Text,
            }),
            max_tokens,
        }
    }

    async fn embed(&self, text: &str) -> Result<MultiVec> {
        use memsearch_core::DenseEmbedder;

        let mut rows = Vec::new();
        for token in text.split_whitespace().take(self.max_tokens) {
            rows.push(self.token_embedder.embed_query(token).await?);
        }
        Ok(rows)
    }
}

impl Default for TokenHashMultiEmbedder {
    fn default() -> Self {
        Self::new(128, 256)
    }
}

#[async_trait]
impl MultiVectorEmbedder for TokenHashMultiEmbedder {
    async fn embed_query(&self, text: &str) -> Result<MultiVec> {
        self.embed(text).await
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<MultiVec>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_one_row_per_token() {
        let embedder = TokenHashMultiEmbedder::new(64, 16);
        let rows = MultiVectorEmbedder::embed_query(&embedder, "three token query")
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.len() == 64));
    }

    #[tokio::test]
    async fn test_token_cap() {
        let embedder = TokenHashMultiEmbedder::new(32, 2);
        let rows = MultiVectorEmbedder::embed_query(&embedder, "a b c d e")
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_text_empty_matrix() {
        let embedder = TokenHashMultiEmbedder::default();
        let rows = MultiVectorEmbedder::embed_query(&embedder, "").await.unwrap();
        assert!(rows.is_empty());
    }
}

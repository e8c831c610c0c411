//! Dense embeddings
//!
//! Deterministic feature-hash embeddings: each token is hashed into the
//! embedding space and accumulated, then the vector is L2-normalized. The
//! code variant additionally splits identifiers so `camelCase` and
//! `snake_case` tokens land near their word parts.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;

use memsearch_core::{DenseEmbedder, Result};

/// Which content family the embedder targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Text,
    Code,
}

/// Dense embedder configuration
#[derive(Debug, Clone)]
pub struct DenseEmbedderConfig {
    /// Embedding dimension
    pub dim: usize,
    /// Normalize to unit length
    pub normalize: bool,
    /// Target content family
    pub field: TextField,
}

impl Default for DenseEmbedderConfig {
    fn default() -> Self {
        Self {
            dim: 384,
            normalize: true,
            field: TextField::Text,
        }
    }
}

/// Feature-hash dense embedder
pub struct HashDenseEmbedder {
    config: DenseEmbedderConfig,
}

impl HashDenseEmbedder {
    pub fn new(config: DenseEmbedderConfig) -> Self {
        Self { config }
    }

    pub fn text(dim: usize) -> Self {
        Self::new(DenseEmbedderConfig {
            dim,
            ..Default::default()
        })
    }

    pub fn code(dim: usize) -> Self {
        Self::new(DenseEmbedderConfig {
            dim,
            field: TextField::Code,
            ..Default::default()
        })
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.config.dim];

        for token in self.tokens(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.config.dim as u64) as usize;
            // Low bit of the hash picks the sign so collisions cancel
            // rather than pile up.
            let sign = if (h >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            embedding[idx] += sign;
        }

        if self.config.normalize {
            let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for v in &mut embedding {
                    *v /= norm;
                }
            }
        }

        embedding
    }

    fn tokens(&self, text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        for raw in text.split(|c: char| !c.is_alphanumeric() && c != '_') {
            if raw.is_empty() {
                continue;
            }
            tokens.push(raw.to_lowercase());
            if self.config.field == TextField::Code {
                tokens.extend(split_identifier(raw));
            }
        }
        tokens
    }
}

/// Split an identifier into its camelCase / snake_case word parts.
fn split_identifier(ident: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();

    for c in ident.chars() {
        if c == '_' {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
        } else if c.is_uppercase() && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
            current.push(c.to_ascii_lowercase());
        } else {
            current.push(c.to_ascii_lowercase());
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }

    // Only useful when the identifier actually split into several words
    if parts.len() > 1 {
        parts
    } else {
        Vec::new()
    }
}

#[async_trait]
impl DenseEmbedder for HashDenseEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    fn dim(&self) -> usize {
        self.config.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_embedding_is_normalized() {
        let embedder = HashDenseEmbedder::text(384);
        let embedding = embedder.embed_query("kubernetes pod eviction").await.unwrap();
        assert_eq!(embedding.len(), 384);
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_embedding_deterministic() {
        let embedder = HashDenseEmbedder::text(128);
        let a = embedder.embed_query("same input").await.unwrap();
        let b = embedder.embed_query("same input").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_batch_alignment() {
        let embedder = HashDenseEmbedder::text(64);
        let texts = vec!["first".to_string(), "second".to_string()];
        let batch = embedder.embed_documents(&texts).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], embedder.embed_query("first").await.unwrap());
        assert_eq!(batch[1], embedder.embed_query("second").await.unwrap());
    }

    #[test]
    fn test_split_identifier() {
        assert_eq!(split_identifier("getUserName"), vec!["get", "user", "name"]);
        assert_eq!(split_identifier("parse_query"), vec!["parse", "query"]);
        assert!(split_identifier("single").is_empty());
    }
}

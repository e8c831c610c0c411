//! Embedder factory
//!
//! Lazily constructs and caches one embedder per kind. Construction is
//! guarded so two racing callers share a single build, and every embedder
//! then lives for the process lifetime. Disabled kinds return
//! `EmbedderUnavailable` so callers can pick an alternative strategy.

use std::sync::Arc;

use tokio::sync::OnceCell;

use memsearch_config::EmbedderSettings;
use memsearch_core::{
    DenseEmbedder, MultiVectorEmbedder, Result, SearchError, SparseEmbedder,
};

use crate::colbert::TokenHashMultiEmbedder;
use crate::dense::HashDenseEmbedder;
use crate::sparse::TermWeightEmbedder;

/// The embedder kinds the factory hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedderKind {
    TextDense,
    CodeDense,
    Sparse,
    MultiVector,
}

impl std::fmt::Display for EmbedderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbedderKind::TextDense => write!(f, "text_dense"),
            EmbedderKind::CodeDense => write!(f, "code_dense"),
            EmbedderKind::Sparse => write!(f, "sparse"),
            EmbedderKind::MultiVector => write!(f, "multi_vector"),
        }
    }
}

/// Lazy, cached embedder factory.
pub struct EmbedderFactory {
    settings: EmbedderSettings,
    text_dense: OnceCell<Arc<dyn DenseEmbedder>>,
    code_dense: OnceCell<Arc<dyn DenseEmbedder>>,
    sparse: OnceCell<Arc<dyn SparseEmbedder>>,
    multi: OnceCell<Arc<dyn MultiVectorEmbedder>>,
}

impl EmbedderFactory {
    pub fn new(settings: EmbedderSettings) -> Self {
        Self {
            settings,
            text_dense: OnceCell::new(),
            code_dense: OnceCell::new(),
            sparse: OnceCell::new(),
            multi: OnceCell::new(),
        }
    }

    /// Generic dense embedder for text content.
    pub async fn get_text_embedder(&self) -> Result<Arc<dyn DenseEmbedder>> {
        let dim = self.settings.dense_dim;
        let embedder = self
            .text_dense
            .get_or_init(|| async move {
                tracing::info!(dim, "Loading text dense embedder");
                Arc::new(HashDenseEmbedder::text(dim)) as Arc<dyn DenseEmbedder>
            })
            .await;
        Ok(Arc::clone(embedder))
    }

    /// Dense embedder tuned for code content.
    pub async fn get_code_embedder(&self) -> Result<Arc<dyn DenseEmbedder>> {
        let dim = self.settings.dense_dim;
        let embedder = self
            .code_dense
            .get_or_init(|| async move {
                tracing::info!(dim, "Loading code dense embedder");
                Arc::new(HashDenseEmbedder::code(dim)) as Arc<dyn DenseEmbedder>
            })
            .await;
        Ok(Arc::clone(embedder))
    }

    /// Sparse term-weight embedder. Optional: disabled deployments get an
    /// `EmbedderUnavailable` error and must fall back to dense-only search.
    pub async fn get_sparse_embedder(&self) -> Result<Arc<dyn SparseEmbedder>> {
        if !self.settings.enable_sparse {
            return Err(SearchError::EmbedderUnavailable(
                "sparse embedder disabled in configuration".to_string(),
            ));
        }
        let embedder = self
            .sparse
            .get_or_init(|| async {
                tracing::info!("Loading sparse term-weight embedder");
                Arc::new(TermWeightEmbedder::new()) as Arc<dyn SparseEmbedder>
            })
            .await;
        Ok(Arc::clone(embedder))
    }

    /// Late-interaction embedder. Optional; off by default.
    pub async fn get_multi_vector_embedder(&self) -> Result<Arc<dyn MultiVectorEmbedder>> {
        if !self.settings.enable_colbert {
            return Err(SearchError::EmbedderUnavailable(
                "multi-vector embedder disabled in configuration".to_string(),
            ));
        }
        let embedder = self
            .multi
            .get_or_init(|| async {
                tracing::info!("Loading multi-vector embedder");
                Arc::new(TokenHashMultiEmbedder::default()) as Arc<dyn MultiVectorEmbedder>
            })
            .await;
        Ok(Arc::clone(embedder))
    }

    /// Whether a kind is enabled for this deployment.
    pub fn is_enabled(&self, kind: EmbedderKind) -> bool {
        match kind {
            EmbedderKind::TextDense | EmbedderKind::CodeDense => true,
            EmbedderKind::Sparse => self.settings.enable_sparse,
            EmbedderKind::MultiVector => self.settings.enable_colbert,
        }
    }

    /// Eagerly construct every enabled embedder (startup preload).
    pub async fn preload(&self) -> Result<()> {
        self.get_text_embedder().await?;
        self.get_code_embedder().await?;
        if self.settings.enable_sparse {
            self.get_sparse_embedder().await?;
        }
        if self.settings.enable_colbert {
            self.get_multi_vector_embedder().await?;
        }
        tracing::info!("Embedder preload complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(sparse: bool, colbert: bool) -> EmbedderSettings {
        EmbedderSettings {
            enable_sparse: sparse,
            enable_colbert: colbert,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_lazy_instances_are_shared() {
        let factory = EmbedderFactory::new(settings(true, false));
        let a = factory.get_text_embedder().await.unwrap();
        let b = factory.get_text_embedder().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_disabled_sparse_returns_unavailable() {
        let factory = EmbedderFactory::new(settings(false, false));
        let result = factory.get_sparse_embedder().await;
        assert!(matches!(result, Err(SearchError::EmbedderUnavailable(_))));
    }

    #[tokio::test]
    async fn test_disabled_colbert_returns_unavailable() {
        let factory = EmbedderFactory::new(settings(true, false));
        let result = factory.get_multi_vector_embedder().await;
        assert!(matches!(result, Err(SearchError::EmbedderUnavailable(_))));
    }

    #[tokio::test]
    async fn test_preload_builds_enabled_kinds() {
        let factory = EmbedderFactory::new(settings(true, true));
        factory.preload().await.unwrap();
        assert!(factory.sparse.get().is_some());
        assert!(factory.multi.get().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_first_use_single_construction() {
        let factory = Arc::new(EmbedderFactory::new(settings(true, false)));
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let factory = Arc::clone(&factory);
                tokio::spawn(async move { factory.get_text_embedder().await.unwrap() })
            })
            .collect();

        let mut instances = Vec::new();
        for task in tasks {
            instances.push(task.await.unwrap());
        }
        for pair in instances.windows(2) {
            assert!(Arc::ptr_eq(&pair[0], &pair[1]));
        }
    }
}

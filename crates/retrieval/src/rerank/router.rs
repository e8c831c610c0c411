//! Reranker router
//!
//! Owns the tier registry. Each tier is a lazy slot constructed on first use
//! and shared by concurrent callers. A rerank call runs inside a cancellable
//! deadline and, for the paid tier, behind the hourly rate-limit gate. On
//! timeout, rate limiting, or any runtime error the router either chains to
//! the fallback tier (once) or synthesizes a uniform-score degraded result.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;

use memsearch_config::RerankerSettings;
use memsearch_core::{
    LanguageModel, RankedDocument, Reranker, RerankerTier, Result, SearchError,
};
use memsearch_embedders::EmbedderFactory;

use super::llm::LlmReranker;
use super::rate_limit::{HourlyRateLimiter, RateLimitUsage};
use super::tiers::{ColbertReranker, CrossEncoderReranker, ScoringProfile};

/// Result of a routed rerank call.
#[derive(Debug, Clone)]
pub struct RerankOutcome {
    /// Ranked entries pointing back into the input document slice
    pub ranked: Vec<RankedDocument>,
    /// Tier that actually produced the scores
    pub actual_tier: RerankerTier,
    /// True when a fallback tier or the uniform-score path was taken
    pub degraded: bool,
}

/// Router over the five reranker tiers.
pub struct RerankerRouter {
    settings: RerankerSettings,
    embedder_factory: Arc<EmbedderFactory>,
    llm: Option<Arc<dyn LanguageModel>>,
    rate_limiter: HourlyRateLimiter,
    fast: OnceCell<Arc<dyn Reranker>>,
    accurate: OnceCell<Arc<dyn Reranker>>,
    code: OnceCell<Arc<dyn Reranker>>,
    colbert: OnceCell<Arc<dyn Reranker>>,
    llm_tier: OnceCell<Arc<dyn Reranker>>,
}

impl RerankerRouter {
    pub fn new(
        settings: RerankerSettings,
        embedder_factory: Arc<EmbedderFactory>,
        llm: Option<Arc<dyn LanguageModel>>,
    ) -> Self {
        let rate_limiter = HourlyRateLimiter::new(
            settings.rate_limit_requests_per_hour,
            settings.rate_limit_budget_cents,
        );
        Self {
            settings,
            embedder_factory,
            llm,
            rate_limiter,
            fast: OnceCell::new(),
            accurate: OnceCell::new(),
            code: OnceCell::new(),
            colbert: OnceCell::new(),
            llm_tier: OnceCell::new(),
        }
    }

    /// Default per-call deadline from configuration.
    pub fn default_timeout_ms(&self) -> u64 {
        self.settings.timeout_ms
    }

    /// Current rate-limit window usage.
    pub fn rate_limit_usage(&self) -> RateLimitUsage {
        self.rate_limiter.usage()
    }

    /// Drop all recorded rate-limit usage.
    pub fn reset_rate_limiter(&self) {
        self.rate_limiter.reset();
    }

    /// Rerank `documents` against `query` with the requested tier.
    ///
    /// Never fails: every failure class degrades, either by chaining once to
    /// `fallback_tier` or by returning each input document at score 0.5 in
    /// original order with `degraded` set.
    pub async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        tier: RerankerTier,
        top_k: usize,
        timeout_ms: u64,
        fallback_tier: Option<RerankerTier>,
    ) -> RerankOutcome {
        self.rerank_with_depth(query, documents, tier, top_k, timeout_ms, fallback_tier, 0)
            .await
    }

    /// Rerank several queries against the same tier, sequentially, sharing
    /// the degradation semantics of `rerank`.
    pub async fn rerank_batch(
        &self,
        queries: &[String],
        documents: &[String],
        tier: RerankerTier,
        top_k: usize,
        timeout_ms: u64,
        fallback_tier: Option<RerankerTier>,
    ) -> Vec<RerankOutcome> {
        let mut outcomes = Vec::with_capacity(queries.len());
        for query in queries {
            outcomes.push(
                self.rerank(query, documents, tier, top_k, timeout_ms, fallback_tier)
                    .await,
            );
        }
        outcomes
    }

    fn rerank_with_depth<'a>(
        &'a self,
        query: &'a str,
        documents: &'a [String],
        tier: RerankerTier,
        top_k: usize,
        timeout_ms: u64,
        fallback_tier: Option<RerankerTier>,
        depth: u8,
    ) -> Pin<Box<dyn Future<Output = RerankOutcome> + Send + 'a>> {
        Box::pin(async move {
            if documents.is_empty() {
                return RerankOutcome {
                    ranked: Vec::new(),
                    actual_tier: tier,
                    degraded: false,
                };
            }

            match self.run_tier(query, documents, tier, top_k, timeout_ms).await {
                Ok(ranked) => RerankOutcome {
                    ranked,
                    actual_tier: tier,
                    degraded: false,
                },
                Err(err) => {
                    log_failure(tier, &err);

                    // Depth is bounded at 1 so a broken fallback tier cannot
                    // chain forever.
                    match fallback_tier {
                        Some(fallback) if fallback != tier && depth < 1 => {
                            tracing::warn!(
                                tier = %tier,
                                fallback = %fallback,
                                "Reranker tier failed, chaining to fallback"
                            );
                            let mut outcome = self
                                .rerank_with_depth(
                                    query, documents, fallback, top_k, timeout_ms, None,
                                    depth + 1,
                                )
                                .await;
                            outcome.degraded = true;
                            outcome
                        }
                        _ => Self::uniform_degraded(documents, tier),
                    }
                }
            }
        })
    }

    /// Each input document at score 0.5 in original order.
    fn uniform_degraded(documents: &[String], tier: RerankerTier) -> RerankOutcome {
        RerankOutcome {
            ranked: (0..documents.len())
                .map(|i| RankedDocument {
                    original_index: i,
                    score: 0.5,
                })
                .collect(),
            actual_tier: tier,
            degraded: true,
        }
    }

    async fn run_tier(
        &self,
        query: &str,
        documents: &[String],
        tier: RerankerTier,
        top_k: usize,
        timeout_ms: u64,
    ) -> Result<Vec<RankedDocument>> {
        let reranker = self.load_tier(tier).await?;

        // Only the paid tier goes through the rate-limit gate
        if tier == RerankerTier::Llm {
            self.rate_limiter
                .check_and_record(reranker.cost_cents(documents.len()))?;
        }

        match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            reranker.rerank(query, documents, top_k),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SearchError::RerankerTimeout { timeout_ms }),
        }
    }

    /// Acquire or construct a tier. Construction is shared by concurrent
    /// first-users; a failed construction surfaces as a runtime error.
    async fn load_tier(&self, tier: RerankerTier) -> Result<Arc<dyn Reranker>> {
        match tier {
            RerankerTier::Fast => {
                let slot = self
                    .fast
                    .get_or_init(|| async {
                        tracing::info!("Loading fast reranker tier");
                        Arc::new(CrossEncoderReranker::new(ScoringProfile::Fast))
                            as Arc<dyn Reranker>
                    })
                    .await;
                Ok(Arc::clone(slot))
            }
            RerankerTier::Accurate => {
                let slot = self
                    .accurate
                    .get_or_init(|| async {
                        tracing::info!("Loading accurate reranker tier");
                        Arc::new(CrossEncoderReranker::new(ScoringProfile::Accurate))
                            as Arc<dyn Reranker>
                    })
                    .await;
                Ok(Arc::clone(slot))
            }
            RerankerTier::Code => {
                let slot = self
                    .code
                    .get_or_init(|| async {
                        tracing::info!("Loading code reranker tier");
                        Arc::new(CrossEncoderReranker::new(ScoringProfile::Code))
                            as Arc<dyn Reranker>
                    })
                    .await;
                Ok(Arc::clone(slot))
            }
            RerankerTier::Colbert => {
                let factory = Arc::clone(&self.embedder_factory);
                let slot = self
                    .colbert
                    .get_or_try_init(|| async move {
                        tracing::info!("Loading colbert reranker tier");
                        let embedder = factory.get_multi_vector_embedder().await?;
                        Ok::<_, SearchError>(
                            Arc::new(ColbertReranker::new(embedder)) as Arc<dyn Reranker>
                        )
                    })
                    .await?;
                Ok(Arc::clone(slot))
            }
            RerankerTier::Llm => {
                let llm = self.llm.clone();
                let slot = self
                    .llm_tier
                    .get_or_try_init(|| async move {
                        tracing::info!("Loading llm reranker tier");
                        let llm = llm.ok_or_else(|| {
                            SearchError::RerankerError(
                                "no language model configured for llm tier".to_string(),
                            )
                        })?;
                        Ok::<_, SearchError>(
                            Arc::new(LlmReranker::new(llm)) as Arc<dyn Reranker>
                        )
                    })
                    .await?;
                Ok(Arc::clone(slot))
            }
        }
    }
}

fn log_failure(tier: RerankerTier, err: &SearchError) {
    match err {
        SearchError::RerankerTimeout { timeout_ms } => {
            tracing::warn!(tier = %tier, timeout_ms, "Reranker timed out");
        }
        SearchError::RateLimitExceeded {
            kind,
            retry_after_s,
        } => {
            tracing::warn!(tier = %tier, kind = %kind, retry_after_s, "Reranker rate limited");
        }
        other => {
            tracing::warn!(tier = %tier, error = %other, "Reranker failed");
        }
    }
}

//! Search entities: strategies, tiers, filters, queries, result items

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Free-form payload map carried by indexed points and result items.
pub type Payload = serde_json::Map<String, Value>;

/// Retrieval strategy. Unknown strings are rejected at the serde edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    Dense,
    Sparse,
    Hybrid,
}

impl std::fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchStrategy::Dense => write!(f, "dense"),
            SearchStrategy::Sparse => write!(f, "sparse"),
            SearchStrategy::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// Reranker tier, ordered roughly by latency/quality trade-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RerankerTier {
    Fast,
    Accurate,
    Code,
    Colbert,
    Llm,
}

impl std::fmt::Display for RerankerTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RerankerTier::Fast => write!(f, "fast"),
            RerankerTier::Accurate => write!(f, "accurate"),
            RerankerTier::Code => write!(f, "code"),
            RerankerTier::Colbert => write!(f, "colbert"),
            RerankerTier::Llm => write!(f, "llm"),
        }
    }
}

/// Query complexity class from the lexical classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryComplexity {
    Simple,
    Moderate,
    Complex,
}

/// Inclusive millisecond time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

/// Search filters. `tenant_id` is mandatory; a query without tenant context
/// is rejected before any store access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchFilters {
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vt_end_after: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

impl SearchFilters {
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            session_id: None,
            doc_type: None,
            time_range: None,
            vt_end_after: None,
            project: None,
        }
    }
}

fn default_limit() -> usize {
    10
}

fn default_rerank_depth() -> usize {
    20
}

/// A search request against one collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<SearchFilters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<SearchStrategy>,
    #[serde(default)]
    pub rerank: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_tier: Option<RerankerTier>,
    #[serde(default = "default_rerank_depth")]
    pub rerank_depth: usize,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            limit: default_limit(),
            threshold: None,
            filters: None,
            strategy: None,
            rerank: false,
            rerank_tier: None,
            rerank_depth: default_rerank_depth(),
        }
    }

    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

/// One search hit as returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub id: String,
    /// Final score; replaced by the reranker score when reranking ran
    pub score: f32,
    /// Pre-rerank score (dense/sparse similarity or RRF rank score)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fusion_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reranker_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_tier: Option<RerankerTier>,
    #[serde(default)]
    pub payload: Payload,
    #[serde(default)]
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
}

impl SearchResultItem {
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
            fusion_score: None,
            reranker_score: None,
            rerank_tier: None,
            payload: Payload::new(),
            degraded: false,
            degraded_reason: None,
        }
    }

    /// Session the hit belongs to, when its payload carries one.
    pub fn session_id(&self) -> Option<&str> {
        self.payload.get("session_id").and_then(Value::as_str)
    }

    /// Text content of the hit, empty if the payload lacks it.
    pub fn content(&self) -> &str {
        self.payload
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or("")
    }
}

/// Sort results by final score descending, ties broken by id ascending.
pub fn sort_results(results: &mut [SearchResultItem]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Consumer lifecycle status published on the side channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerStatus {
    ConsumerReady,
    ConsumerHeartbeat,
    ConsumerDisconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_serde_roundtrip() {
        let s: SearchStrategy = serde_json::from_str("\"hybrid\"").unwrap();
        assert_eq!(s, SearchStrategy::Hybrid);
        assert_eq!(serde_json::to_string(&s).unwrap(), "\"hybrid\"");
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let result: std::result::Result<SearchStrategy, _> = serde_json::from_str("\"fuzzy\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_tier_rejected() {
        let result: std::result::Result<RerankerTier, _> = serde_json::from_str("\"turbo\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_query_defaults() {
        let query: SearchQuery = serde_json::from_str(r#"{"text": "hello"}"#).unwrap();
        assert_eq!(query.limit, 10);
        assert_eq!(query.rerank_depth, 20);
        assert!(!query.rerank);
        assert!(query.strategy.is_none());
    }

    #[test]
    fn test_sort_results_ties_break_by_id() {
        let mut results = vec![
            SearchResultItem::new("b", 0.5),
            SearchResultItem::new("a", 0.5),
            SearchResultItem::new("c", 0.9),
        ];
        sort_results(&mut results);
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_consumer_status_serde() {
        assert_eq!(
            serde_json::to_string(&ConsumerStatus::ConsumerReady).unwrap(),
            "\"consumer_ready\""
        );
    }
}

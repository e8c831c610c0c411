//! Error taxonomy for the retrieval service
//!
//! Every dependency failure maps onto one of these kinds so callers can
//! pattern-match and pick a degradation path instead of catching broadly.

use thiserror::Error;

/// Which rate-limit cap was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitKind {
    /// Hourly request count cap
    Requests,
    /// Hourly cost budget cap (cents)
    Budget,
}

impl std::fmt::Display for RateLimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitKind::Requests => write!(f, "requests"),
            RateLimitKind::Budget => write!(f, "budget"),
        }
    }
}

/// Service-wide error type.
///
/// The degradation policy is driven by these variants:
/// - `RerankerTimeout` / `RateLimitExceeded` / `RerankerError` are recovered
///   inside the reranker router (fallback tier or uniform-score results)
/// - `ExpansionFailed` is recovered by falling back to single-query search
/// - `StoreUnavailable` is retryable by the caller; `StoreRejected` is not
/// - `InvalidArgument` / `Unauthorized` are surfaced eagerly, never retried
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("vector store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("vector store rejected request: {0}")]
    StoreRejected(String),

    #[error("embedder unavailable: {0}")]
    EmbedderUnavailable(String),

    #[error("reranker timed out after {timeout_ms}ms")]
    RerankerTimeout { timeout_ms: u64 },

    #[error("rate limit exceeded ({kind}), retry after {retry_after_s}s")]
    RateLimitExceeded {
        kind: RateLimitKind,
        retry_after_s: u64,
    },

    #[error("reranker error: {0}")]
    RerankerError(String),

    #[error("query expansion failed: {0}")]
    ExpansionFailed(String),

    #[error("batch queue full")]
    QueueFull,

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("llm error: {0}")]
    Llm(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl SearchError {
    /// True for the failure classes the reranker router recovers locally.
    pub fn is_rerank_recoverable(&self) -> bool {
        matches!(
            self,
            SearchError::RerankerTimeout { .. }
                | SearchError::RateLimitExceeded { .. }
                | SearchError::RerankerError(_)
        )
    }
}

/// Convenience result alias used across the workspace.
pub type Result<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rerank_recoverable_classes() {
        assert!(SearchError::RerankerTimeout { timeout_ms: 50 }.is_rerank_recoverable());
        assert!(SearchError::RateLimitExceeded {
            kind: RateLimitKind::Budget,
            retry_after_s: 60,
        }
        .is_rerank_recoverable());
        assert!(SearchError::RerankerError("boom".into()).is_rerank_recoverable());
        assert!(!SearchError::InvalidArgument("bad".into()).is_rerank_recoverable());
        assert!(!SearchError::StoreUnavailable("down".into()).is_rerank_recoverable());
    }

    #[test]
    fn test_rate_limit_display() {
        let err = SearchError::RateLimitExceeded {
            kind: RateLimitKind::Requests,
            retry_after_s: 120,
        };
        assert_eq!(
            err.to_string(),
            "rate limit exceeded (requests), retry after 120s"
        );
    }
}

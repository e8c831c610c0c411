//! Multi-tier reranking
//!
//! A registry of lazily constructed reranker tiers behind a router that adds
//! per-call deadlines, an hourly rate-limit gate for the paid tier, one level
//! of fallback chaining, and uniform-score degradation when nothing else is
//! left.

mod llm;
mod rate_limit;
mod router;
mod tiers;

pub use llm::{LlmRerankUsage, LlmReranker};
pub use rate_limit::{HourlyRateLimiter, RateLimitUsage};
pub use router::{RerankOutcome, RerankerRouter};
pub use tiers::{ColbertReranker, CrossEncoderReranker, ScoringProfile};

//! HTTP server for the memsearch retrieval service
//!
//! Axum router with bearer-token authentication resolving a tenant per
//! request, Prometheus metrics, and the search/index/admin endpoints.
//! Health, readiness, and metrics probes are unauthenticated and never touch
//! the retriever.

pub mod auth;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;

pub use auth::{auth_middleware, TenantContext};
pub use error::ApiError;
pub use metrics::init_metrics;
pub use routes::create_router;
pub use state::AppState;

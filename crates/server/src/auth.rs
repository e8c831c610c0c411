//! Bearer-token authentication
//!
//! A static token table from configuration maps each bearer token to a
//! tenant id. Every authenticated request carries a `TenantContext` in its
//! extensions; handlers never see a request without a validated non-empty
//! tenant. Probe endpoints (health, readiness, metrics) bypass auth.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Paths that bypass authentication. None of them reach the retriever.
const PUBLIC_PATHS: &[&str] = &["/health", "/ready", "/metrics"];

/// Tenant resolved from the bearer token.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant_id: String,
}

/// Token -> tenant lookup table.
#[derive(Debug, Clone, Default)]
pub struct TokenTable {
    tokens: HashMap<String, String>,
}

impl TokenTable {
    /// Parse `token=tenant` entries from configuration. Malformed entries
    /// are skipped with a warning.
    pub fn from_entries(entries: &[String]) -> Self {
        let mut tokens = HashMap::new();
        for entry in entries {
            match entry.split_once('=') {
                Some((token, tenant)) if !token.is_empty() && !tenant.is_empty() => {
                    tokens.insert(token.to_string(), tenant.to_string());
                }
                _ => tracing::warn!("Skipping malformed auth token entry"),
            }
        }
        Self { tokens }
    }

    pub fn resolve(&self, token: &str) -> Option<&str> {
        self.tokens
            .iter()
            .find(|(stored, _)| constant_time_compare(stored.as_bytes(), token.as_bytes()))
            .map(|(_, tenant)| tenant.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Authentication middleware.
///
/// Checks `Authorization: Bearer <token>` against the token table and
/// attaches the resolved `TenantContext`. 401 on missing or unknown tokens.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let path = request.uri().path();
    if PUBLIC_PATHS.iter().any(|p| path.starts_with(p)) {
        return next.run(request).await;
    }

    let Some(table) = request.extensions().get::<Arc<TokenTable>>().cloned() else {
        tracing::error!("Token table extension missing from request");
        return (StatusCode::INTERNAL_SERVER_ERROR, "server auth not configured")
            .into_response();
    };

    if table.is_empty() {
        tracing::error!("Authentication has no configured tokens; rejecting request");
        return (StatusCode::UNAUTHORIZED, "no tenants configured").into_response();
    }

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token.and_then(|t| table.resolve(t)) {
        Some(tenant_id) if !tenant_id.is_empty() => {
            request.extensions_mut().insert(TenantContext {
                tenant_id: tenant_id.to_string(),
            });
            next.run(request).await
        }
        _ => {
            tracing::warn!(path = %path, "Rejected request with missing or invalid bearer token");
            (StatusCode::UNAUTHORIZED, "invalid bearer token").into_response()
        }
    }
}

/// Constant-time byte comparison to keep token checks timing-safe.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_table_parsing() {
        let table = TokenTable::from_entries(&[
            "secret-a=tenant-a".to_string(),
            "secret-b=tenant-b".to_string(),
            "malformed".to_string(),
            "=empty".to_string(),
        ]);
        assert_eq!(table.resolve("secret-a"), Some("tenant-a"));
        assert_eq!(table.resolve("secret-b"), Some("tenant-b"));
        assert_eq!(table.resolve("malformed"), None);
        assert_eq!(table.resolve("unknown"), None);
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare(b"abc", b"abc"));
        assert!(!constant_time_compare(b"abc", b"abd"));
        assert!(!constant_time_compare(b"abc", b"abcd"));
    }

    #[test]
    fn test_public_paths() {
        assert!(PUBLIC_PATHS.contains(&"/health"));
        assert!(PUBLIC_PATHS.contains(&"/ready"));
        assert!(PUBLIC_PATHS.contains(&"/metrics"));
    }
}

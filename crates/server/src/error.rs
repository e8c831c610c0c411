//! HTTP mapping for service errors

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use memsearch_core::SearchError;

/// Error wrapper carrying the HTTP status mapping for service errors.
#[derive(Debug)]
pub struct ApiError(pub SearchError);

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SearchError::InvalidArgument(_) | SearchError::ParseError(_) => {
                StatusCode::BAD_REQUEST
            }
            // A mode that needs a disabled embedder is a caller error
            SearchError::EmbedderUnavailable(_) => StatusCode::BAD_REQUEST,
            SearchError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            SearchError::Forbidden(_) => StatusCode::FORBIDDEN,
            SearchError::StoreUnavailable(_) | SearchError::QueueFull => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            SearchError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, status = %status, "Request rejected");
        }

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_for(err: SearchError) -> StatusCode {
        ApiError(err).into_response().status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(SearchError::InvalidArgument("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(SearchError::Unauthorized("x".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_for(SearchError::StoreUnavailable("x".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(SearchError::StoreRejected("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(SearchError::EmbedderUnavailable("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_for(SearchError::QueueFull), StatusCode::SERVICE_UNAVAILABLE);
    }
}

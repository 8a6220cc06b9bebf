//! Error types for the scheduler and the HTTP surface.
//!
//! `ApiError` implements `IntoResponse` so handlers can return it and still
//! answer with the right status code. `SyncError` is what a failed
//! calendar sync reports; callers log it and keep the previous state.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error type for HTTP handlers
#[derive(Debug, Error)]
pub enum ApiError {
    /// Caller is not the registered notification channel
    #[error("Forbidden: {0}")]
    Forbidden(String),
}

impl ApiError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
        };

        (status, Json(ErrorResponse { error: error_message })).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Why a calendar sync did not replace the current schedule.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to fetch calendar events for {day}")]
    Fetch {
        day: NaiveDate,
        #[source]
        source: anyhow::Error,
    },

    /// Midnight or end of day falls into a gap of the configured timezone.
    #[error("cannot compute the bounds of {0} in the configured timezone")]
    DayBounds(NaiveDate),
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn test_forbidden_renders_json_body() {
        let response = ApiError::forbidden("unknown notification channel").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, serde_json::json!({"error": "unknown notification channel"}));
    }
}
